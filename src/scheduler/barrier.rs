//! Group completion barrier.
//!
//! Evaluated after every job execution. A group is finalized once, by
//! whichever evaluation wins the set-if-absent claim on the group's
//! `finalized` key:
//!
//! - every marker `completed`: the artifact is assembled, stored and the
//!   group record becomes `completed`
//! - any marker `failed`: the group record becomes `failed` and no artifact
//!   is written
//!
//! If finalization errors after the claim, the claim is released so a later
//! evaluation can retry.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::job::{GroupRecord, GroupStatus, JobStatus, MemberStatus};
use super::queue::JobStore;
use crate::error::ArtifactError;
use crate::export::{Artifact, ArtifactSink, StoredArtifact};
use crate::github::RepoProvider;
use crate::metrics;

/// Result of one barrier evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum BarrierOutcome {
    /// Some members are still queued or executing, or the enqueuer has not
    /// finished writing the group.
    Waiting { remaining: usize },
    /// This evaluation wrote the artifact.
    Finalized(StoredArtifact),
    /// This evaluation marked the group failed.
    GroupFailed { failed: usize },
    /// The group was already finalized, or another evaluation holds the claim.
    AlreadyFinalized,
}

pub struct GroupBarrier {
    jobs: JobStore,
    provider: Arc<dyn RepoProvider>,
    sink: Arc<dyn ArtifactSink>,
    /// Written into the claim key for diagnostics.
    owner: String,
}

impl GroupBarrier {
    pub fn new(
        jobs: JobStore,
        provider: Arc<dyn RepoProvider>,
        sink: Arc<dyn ArtifactSink>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            jobs,
            provider,
            sink,
            owner: owner.into(),
        }
    }

    pub async fn evaluate(&self, group_id: Uuid) -> Result<BarrierOutcome, ArtifactError> {
        let Some(mut record) = self.jobs.get_group(group_id).await? else {
            debug!(group_id = %group_id, "Group record not written yet");
            return Ok(BarrierOutcome::Waiting { remaining: 0 });
        };
        if record.status != GroupStatus::Pending {
            return Ok(BarrierOutcome::AlreadyFinalized);
        }

        let members = self.jobs.members(group_id).await?;
        let mut completed = Vec::with_capacity(members.len());
        let mut queued = 0;
        let mut failed = 0;
        for (job_id, status) in members {
            match status {
                MemberStatus::Completed => completed.push(job_id),
                MemberStatus::Queued => queued += 1,
                MemberStatus::Failed => failed += 1,
            }
        }

        if failed > 0 {
            return self.fail_group(&mut record, failed).await;
        }

        let seen = completed.len() + queued;
        if queued > 0 || seen < record.job_count {
            return Ok(BarrierOutcome::Waiting {
                remaining: queued + record.job_count.saturating_sub(seen),
            });
        }

        if !self.jobs.claim_finalization(group_id, &self.owner).await? {
            debug!(group_id = %group_id, "Finalization claimed elsewhere");
            return Ok(BarrierOutcome::AlreadyFinalized);
        }

        match self.finalize(&mut record, &completed).await {
            Ok(stored) => {
                metrics::record_group_finalized("completed");
                info!(
                    group_id = %group_id,
                    repo = %record.coordinate(),
                    artifact = %stored.name,
                    files = completed.len(),
                    "Group finalized"
                );
                Ok(BarrierOutcome::Finalized(stored))
            }
            Err(e) => {
                error!(group_id = %group_id, error = %e, "Finalization failed, releasing claim");
                if let Err(release) = self.jobs.release_finalization(group_id).await {
                    warn!(group_id = %group_id, error = %release, "Failed to release finalization claim");
                }
                Err(e)
            }
        }
    }

    async fn finalize(
        &self,
        record: &mut GroupRecord,
        job_ids: &[Uuid],
    ) -> Result<StoredArtifact, ArtifactError> {
        let mut results = Vec::with_capacity(job_ids.len());
        for job_id in job_ids {
            let job = self
                .jobs
                .get_job(*job_id)
                .await?
                .filter(|j| j.status == JobStatus::Completed)
                .ok_or_else(|| ArtifactError::MissingResult {
                    job_id: job_id.to_string(),
                })?;
            let result = job.result.ok_or_else(|| ArtifactError::MissingResult {
                job_id: job_id.to_string(),
            })?;
            results.push((job.file.path, result));
        }

        let repo = record.coordinate();
        let metadata = self.provider.repo_metadata(&repo).await?;
        let artifact = Artifact::assemble(record.group_id, &repo, results, metadata);
        let stored = self.sink.store(&artifact).await?;

        record.mark_completed(Some(stored.name.clone()));
        self.jobs.put_group(record).await?;
        Ok(stored)
    }

    async fn fail_group(
        &self,
        record: &mut GroupRecord,
        failed: usize,
    ) -> Result<BarrierOutcome, ArtifactError> {
        if !self
            .jobs
            .claim_finalization(record.group_id, &self.owner)
            .await?
        {
            return Ok(BarrierOutcome::AlreadyFinalized);
        }

        record.mark_failed(format!("{} job(s) failed", failed));
        if let Err(e) = self.jobs.put_group(record).await {
            error!(group_id = %record.group_id, error = %e, "Failed to mark group failed, releasing claim");
            if let Err(release) = self.jobs.release_finalization(record.group_id).await {
                warn!(group_id = %record.group_id, error = %release, "Failed to release finalization claim");
            }
            return Err(e.into());
        }

        metrics::record_group_finalized("failed");
        warn!(
            group_id = %record.group_id,
            repo = %record.coordinate(),
            failed,
            "Group failed"
        );
        Ok(BarrierOutcome::GroupFailed { failed })
    }
}
