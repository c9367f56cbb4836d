//! Stateless scheduling pass.
//!
//! Each externally triggered pass re-derives everything from the store:
//!
//! 1. load every job
//! 2. split into reclaimable (`in-progress`, not updated within the
//!    staleness threshold) and `queued`
//! 3. if anything is reclaimable, run only those; otherwise run queued jobs
//! 4. run at most `batch_size` jobs concurrently; the rest wait for a later pass
//!
//! Runnable jobs of a group that already failed are marked failed without
//! running. A job's failure is recorded on the job and never aborts the pass.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::barrier::{BarrierOutcome, GroupBarrier};
use super::job::{GroupStatus, Job, JobStatus, MemberStatus};
use super::queue::JobStore;
use crate::auth::TriggerAuth;
use crate::config::AppConfig;
use crate::error::SchedulerError;
use crate::github::RepoProvider;
use crate::llm::ContentGenerator;
use crate::metrics;

/// Which tier a pass worked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PassMode {
    /// Stale `in-progress` jobs.
    Reclaim,
    Queued,
    /// Nothing to do.
    Idle,
}

impl fmt::Display for PassMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassMode::Reclaim => write!(f, "reclaim"),
            PassMode::Queued => write!(f, "queued"),
            PassMode::Idle => write!(f, "idle"),
        }
    }
}

/// Outcome of one job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
    /// A store write failed; the job keeps whatever state was last written.
    Aborted,
}

/// Summary of a scheduling pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub mode: PassMode,
    pub started_at: DateTime<Utc>,
    /// Jobs found in the store.
    pub total_jobs: usize,
    pub reclaimable: usize,
    pub queued: usize,
    /// Jobs executed this pass.
    pub selected: usize,
    /// Eligible jobs left for a later pass.
    pub deferred: usize,
    /// Jobs of already-failed groups, failed without running.
    pub cancelled: usize,
    pub completed: usize,
    pub failed: usize,
    pub aborted: usize,
    pub groups_finalized: usize,
    pub groups_failed: usize,
    pub duration_ms: u64,
}

/// The jobs one pass will run.
#[derive(Debug)]
pub struct Selection {
    pub mode: PassMode,
    pub batch: Vec<Job>,
    pub reclaimable: usize,
    pub queued: usize,
    pub deferred: usize,
}

/// Picks the batch for a pass.
///
/// Reclaimable jobs take priority over queued ones; within a tier the
/// oldest job goes first.
pub fn select_batch(
    jobs: Vec<Job>,
    now: DateTime<Utc>,
    stale_after: Duration,
    batch_size: usize,
) -> Selection {
    let (mut reclaimable, mut queued): (Vec<Job>, Vec<Job>) = jobs
        .into_iter()
        .filter(|j| is_runnable(j, now, stale_after))
        .partition(|j| j.status == JobStatus::InProgress);

    let reclaimable_count = reclaimable.len();
    let queued_count = queued.len();

    let (mode, mut batch) = if !reclaimable.is_empty() {
        reclaimable.sort_by_key(|j| j.updated_at);
        (PassMode::Reclaim, reclaimable)
    } else if !queued.is_empty() {
        queued.sort_by_key(|j| j.created_at);
        (PassMode::Queued, queued)
    } else {
        (PassMode::Idle, Vec::new())
    };

    let deferred = batch.len().saturating_sub(batch_size);
    batch.truncate(batch_size);

    Selection {
        mode,
        batch,
        reclaimable: reclaimable_count,
        queued: queued_count,
        deferred,
    }
}

/// Runs scheduling passes against the shared store.
pub struct Scheduler {
    jobs: JobStore,
    provider: Arc<dyn RepoProvider>,
    generator: Arc<dyn ContentGenerator>,
    barrier: GroupBarrier,
    stale_after: Duration,
    batch_size: usize,
    worker_id: String,
}

impl Scheduler {
    pub fn new(
        jobs: JobStore,
        provider: Arc<dyn RepoProvider>,
        generator: Arc<dyn ContentGenerator>,
        barrier: GroupBarrier,
    ) -> Self {
        let defaults = AppConfig::default();
        Self {
            jobs,
            provider,
            generator,
            barrier,
            stale_after: defaults.stale_after,
            batch_size: defaults.batch_size,
            worker_id: format!("pass-{}", Uuid::new_v4()),
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Authenticates a trigger, then runs a pass.
    ///
    /// An unauthorized trigger returns before the store is touched.
    pub async fn trigger(
        &self,
        auth: &TriggerAuth,
        provided_secret: Option<&str>,
    ) -> Result<PassReport, SchedulerError> {
        auth.verify(provided_secret)?;
        self.run_pass().await
    }

    pub async fn run_pass(&self) -> Result<PassReport, SchedulerError> {
        let start = Instant::now();
        let started_at = Utc::now();

        let mut all = self.jobs.list_jobs().await?;
        let total_jobs = all.len();
        let cancelled = self.cancel_failed_group_jobs(&mut all, started_at).await?;
        let finished_groups = terminal_groups(&all);
        let selection = select_batch(all, started_at, self.stale_after, self.batch_size);

        let mut report = PassReport {
            mode: selection.mode,
            started_at,
            total_jobs,
            reclaimable: selection.reclaimable,
            queued: selection.queued,
            selected: selection.batch.len(),
            deferred: selection.deferred,
            cancelled,
            completed: 0,
            failed: 0,
            aborted: 0,
            groups_finalized: 0,
            groups_failed: 0,
            duration_ms: 0,
        };

        info!(
            worker_id = %self.worker_id,
            mode = %selection.mode,
            total_jobs,
            reclaimable = selection.reclaimable,
            queued = selection.queued,
            selected = report.selected,
            deferred = selection.deferred,
            cancelled,
            "Starting scheduling pass"
        );

        let mode = selection.mode;
        let executions = selection.batch.into_iter().map(|job| self.execute(job, mode));
        let results = futures::future::join_all(executions).await;

        for (outcome, barrier) in results {
            match outcome {
                JobOutcome::Completed => report.completed += 1,
                JobOutcome::Failed => report.failed += 1,
                JobOutcome::Aborted => report.aborted += 1,
            }
            count_barrier(&mut report, barrier);
        }

        // Groups whose last job finished in an earlier pass but whose
        // finalization did not go through.
        for (group_id, expected) in finished_groups {
            match self.sweep_group(group_id, &expected).await {
                Ok(outcome) => count_barrier(&mut report, Some(outcome)),
                Err(e) => warn!(group_id = %group_id, error = %e, "Group sweep failed"),
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            worker_id = %self.worker_id,
            mode = %report.mode,
            completed = report.completed,
            failed = report.failed,
            aborted = report.aborted,
            groups_finalized = report.groups_finalized,
            groups_failed = report.groups_failed,
            duration_ms = report.duration_ms,
            "Scheduling pass finished"
        );
        Ok(report)
    }

    /// Evaluates the barrier for a group only if it is still pending.
    ///
    /// Markers that lag behind their job's terminal status (the invocation
    /// died between the two writes) are rewritten first.
    async fn sweep_group(
        &self,
        group_id: Uuid,
        expected: &[(Uuid, MemberStatus)],
    ) -> Result<BarrierOutcome, SchedulerError> {
        match self.jobs.get_group(group_id).await? {
            Some(record) if record.status == GroupStatus::Pending => {}
            _ => return Ok(BarrierOutcome::AlreadyFinalized),
        }

        let current: HashMap<Uuid, MemberStatus> =
            self.jobs.members(group_id).await?.into_iter().collect();
        for (job_id, status) in expected {
            let marker = current.get(job_id).copied();
            if marker != Some(*status) {
                warn!(
                    group_id = %group_id,
                    job_id = %job_id,
                    marker = ?marker,
                    expected = %status,
                    "Repairing membership marker"
                );
                self.jobs.set_member(group_id, *job_id, *status).await?;
            }
        }
        Ok(self.barrier.evaluate(group_id).await?)
    }

    /// Fails runnable jobs whose group is already `failed`, without
    /// fetching or generating anything for them.
    async fn cancel_failed_group_jobs(
        &self,
        jobs: &mut [Job],
        now: DateTime<Utc>,
    ) -> Result<usize, SchedulerError> {
        let mut failed_groups: HashMap<Uuid, bool> = HashMap::new();
        let mut cancelled = 0;

        for job in jobs.iter_mut() {
            if !is_runnable(job, now, self.stale_after) {
                continue;
            }
            let group_failed = match failed_groups.get(&job.group_id) {
                Some(failed) => *failed,
                None => {
                    let failed = matches!(
                        self.jobs.get_group(job.group_id).await?,
                        Some(record) if record.status == GroupStatus::Failed
                    );
                    failed_groups.insert(job.group_id, failed);
                    failed
                }
            };
            if !group_failed {
                continue;
            }

            job.fail("group already failed");
            match self.record_outcome(job).await {
                Ok(()) => {
                    cancelled += 1;
                    debug!(job_id = %job.id, group_id = %job.group_id, "Skipped job of failed group");
                }
                Err(e) => warn!(job_id = %job.id, error = %e, "Failed to cancel job of failed group"),
            }
        }
        Ok(cancelled)
    }

    /// Runs one job to a terminal state, then evaluates its group's barrier.
    ///
    /// Never fails: errors are recorded on the job or logged.
    pub async fn execute(
        &self,
        mut job: Job,
        mode: PassMode,
    ) -> (JobOutcome, Option<BarrierOutcome>) {
        let start = Instant::now();
        let job_id = job.id;
        let group_id = job.group_id;

        if mode == PassMode::Reclaim {
            warn!(
                worker_id = %self.worker_id,
                job_id = %job_id,
                last_update = %job.updated_at,
                "Reclaiming stale job"
            );
        }

        job.start();
        if let Err(e) = self.jobs.put_job(&job).await {
            error!(job_id = %job_id, error = %e, "Failed to mark job in-progress");
            return (JobOutcome::Aborted, None);
        }

        metrics::job_started();
        let generated = self.run_generation(&job).await;
        metrics::job_finished();

        let outcome = match generated {
            Ok(result) => {
                job.complete(result);
                JobOutcome::Completed
            }
            Err(message) => {
                warn!(job_id = %job_id, path = %job.file.path, error = %message, "Job failed");
                job.fail(message);
                JobOutcome::Failed
            }
        };

        if let Err(e) = self.record_outcome(&job).await {
            error!(job_id = %job_id, error = %e, "Failed to record job outcome");
            return (JobOutcome::Aborted, None);
        }

        let label = if outcome == JobOutcome::Completed {
            "completed"
        } else {
            "failed"
        };
        metrics::record_job_executed(label, &mode.to_string(), start.elapsed());
        debug!(
            worker_id = %self.worker_id,
            job_id = %job_id,
            group_id = %group_id,
            outcome = label,
            duration_ms = start.elapsed().as_millis() as u64,
            "Job finished"
        );

        let barrier = match self.barrier.evaluate(group_id).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(group_id = %group_id, error = %e, "Barrier evaluation failed");
                None
            }
        };
        (outcome, barrier)
    }

    async fn run_generation(&self, job: &Job) -> Result<serde_json::Value, String> {
        let content = self
            .provider
            .fetch_text(&job.file)
            .await
            .map_err(|e| e.to_string())?;
        self.generator
            .generate(&job.file.path, &content)
            .await
            .map_err(|e| e.to_string())
    }

    /// Job record first, then its marker, so the barrier never sees a
    /// `completed` marker without a result.
    async fn record_outcome(&self, job: &Job) -> Result<(), SchedulerError> {
        self.jobs.put_job(job).await?;
        self.jobs
            .set_member(job.group_id, job.id, MemberStatus::from(job.status))
            .await?;
        Ok(())
    }
}

fn count_barrier(report: &mut PassReport, outcome: Option<BarrierOutcome>) {
    match outcome {
        Some(BarrierOutcome::Finalized(_)) => report.groups_finalized += 1,
        Some(BarrierOutcome::GroupFailed { .. }) => report.groups_failed += 1,
        _ => {}
    }
}

fn is_runnable(job: &Job, now: DateTime<Utc>, stale_after: Duration) -> bool {
    job.status == JobStatus::Queued || job.is_stale(now, stale_after)
}

/// Groups in which every listed job is terminal, with the marker each job
/// should have.
fn terminal_groups(jobs: &[Job]) -> BTreeMap<Uuid, Vec<(Uuid, MemberStatus)>> {
    let mut groups: HashMap<Uuid, Option<Vec<(Uuid, MemberStatus)>>> = HashMap::new();
    for job in jobs {
        let entry = groups.entry(job.group_id).or_insert_with(|| Some(Vec::new()));
        if !job.status.is_terminal() {
            *entry = None;
        } else if let Some(members) = entry {
            members.push((job.id, MemberStatus::from(job.status)));
        }
    }
    groups
        .into_iter()
        .filter_map(|(id, members)| members.map(|m| (id, m)))
        .collect()
}
