//! Turns a repository into one group of per-file jobs.
//!
//! Only files whose fingerprint changed since the last enqueue get a job.
//! Write order within a call:
//!
//! 1. membership markers (`queued`)
//! 2. group record
//! 3. job records
//! 4. fingerprints
//!
//! No job is visible to a scheduling pass before the group's full marker set
//! exists, so the barrier never sees a partial group. Fingerprints are
//! written last: a crash before step 4 re-queues the same files next time,
//! which costs duplicate work only.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, info};
use uuid::Uuid;

use super::classify::classify;
use super::fingerprint::FingerprintStore;
use crate::config::TraversalLimits;
use crate::error::EnqueueError;
use crate::github::{FileRef, RepoCoordinate, RepoLister, RepoProvider};
use crate::metrics;
use crate::scheduler::{GroupRecord, Job, JobStore, MemberStatus};

/// Concurrent fingerprint lookups per enqueue call.
const FINGERPRINT_CONCURRENCY: usize = 8;

/// Outcome of one enqueue call.
#[derive(Debug, Clone, Serialize)]
pub struct EnqueueReport {
    pub group_id: Uuid,
    pub repo: String,
    /// Files returned by the lister.
    pub listed: usize,
    pub non_processable: usize,
    pub unchanged: usize,
    pub created: usize,
}

pub struct Enqueuer {
    provider: Arc<dyn RepoProvider>,
    jobs: JobStore,
    fingerprints: FingerprintStore,
    limits: TraversalLimits,
}

impl Enqueuer {
    pub fn new(
        provider: Arc<dyn RepoProvider>,
        jobs: JobStore,
        fingerprints: FingerprintStore,
        limits: TraversalLimits,
    ) -> Self {
        Self {
            provider,
            jobs,
            fingerprints,
            limits,
        }
    }

    /// Enqueues every changed file of `repo` (optionally under `subpath`).
    ///
    /// Listing and fingerprint lookups complete before anything is written,
    /// so a failure in either leaves no trace in the store.
    pub async fn enqueue(
        &self,
        repo: &RepoCoordinate,
        subpath: Option<&str>,
    ) -> Result<EnqueueReport, EnqueueError> {
        let group_id = Uuid::new_v4();
        let lister = RepoLister::new(self.provider.as_ref(), self.limits.clone());
        let files = lister.list_files(repo, subpath).await?;
        let listed = files.len();

        let candidates: Vec<FileRef> = files
            .into_iter()
            .filter(|f| classify(&f.path).is_processable())
            .collect();
        let non_processable = listed - candidates.len();

        let changed = self.changed_files(repo, candidates).await?;
        let unchanged = listed - non_processable - changed.len();

        let jobs: Vec<(Job, String)> = changed
            .into_iter()
            .map(|(file, fp)| (Job::new(group_id, repo, file), fp))
            .collect();

        for (job, _) in &jobs {
            self.jobs
                .set_member(group_id, job.id, MemberStatus::Queued)
                .await?;
        }
        self.jobs
            .put_group(&GroupRecord::new(group_id, repo, jobs.len()))
            .await?;
        for (job, _) in &jobs {
            self.jobs.put_job(job).await?;
            metrics::record_job_enqueued(&repo.full_name());
            debug!(job_id = %job.id, group_id = %group_id, path = %job.file.path, "Job queued");
        }
        for (job, fp) in &jobs {
            self.fingerprints.set(repo, &job.file.path, fp).await?;
        }

        info!(
            repo = %repo,
            group_id = %group_id,
            listed,
            non_processable,
            unchanged,
            created = jobs.len(),
            "Enqueued repository"
        );

        Ok(EnqueueReport {
            group_id,
            repo: repo.full_name(),
            listed,
            non_processable,
            unchanged,
            created: jobs.len(),
        })
    }

    /// Files whose latest fingerprint differs from the stored one, paired
    /// with that latest fingerprint.
    async fn changed_files(
        &self,
        repo: &RepoCoordinate,
        candidates: Vec<FileRef>,
    ) -> Result<Vec<(FileRef, String)>, EnqueueError> {
        let sem = Arc::new(Semaphore::new(FINGERPRINT_CONCURRENCY));
        let lookups = candidates.into_iter().map(|file| {
            let sem = sem.clone();
            async move {
                let _permit = sem.acquire().await;
                let latest = self
                    .provider
                    .latest_fingerprint(repo, &file.path)
                    .await
                    .map_err(|source| EnqueueError::Fingerprint {
                        path: file.path.clone(),
                        source,
                    })?;
                let stored = self.fingerprints.get(repo, &file.path).await?;
                let changed = stored.as_deref() != Some(latest.as_str());
                Ok::<_, EnqueueError>(changed.then_some((file, latest)))
            }
        });

        let results = futures::future::join_all(lookups).await;
        let mut changed = Vec::new();
        for result in results {
            if let Some(entry) = result? {
                changed.push(entry);
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::lister::tests::FakeTree;
    use crate::scheduler::{GroupStatus, JobStatus};
    use crate::storage::{KvStore, MemoryStore};

    fn repo() -> RepoCoordinate {
        RepoCoordinate::new("octo", "demo")
    }

    fn setup(tree: FakeTree) -> (Enqueuer, JobStore, FingerprintStore) {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let jobs = JobStore::new(kv.clone(), "digest");
        let fps = FingerprintStore::new(kv, "digest");
        let enqueuer = Enqueuer::new(
            Arc::new(tree),
            jobs.clone(),
            fps.clone(),
            TraversalLimits::default(),
        );
        (enqueuer, jobs, fps)
    }

    #[tokio::test]
    async fn test_non_processable_files_are_excluded() {
        let (enqueuer, jobs, _) = setup(FakeTree::with_files(&["a.js", "b.png", "dir/c.json"]));

        let report = enqueuer.enqueue(&repo(), None).await.unwrap();
        assert_eq!(report.listed, 3);
        assert_eq!(report.non_processable, 1);
        assert_eq!(report.created, 2);

        let mut paths: Vec<String> = jobs
            .list_jobs()
            .await
            .unwrap()
            .into_iter()
            .map(|j| j.file.path)
            .collect();
        paths.sort();
        assert_eq!(paths, vec!["a.js", "dir/c.json"]);
    }

    #[tokio::test]
    async fn test_creates_one_job_and_fingerprint_per_file() {
        let files = ["a.js", "b.rs", "dir/c.json", "dir/sub/d.md", "e.css"];
        let (enqueuer, jobs, fps) = setup(FakeTree::with_files(&files));

        let report = enqueuer.enqueue(&repo(), None).await.unwrap();
        let all = jobs.list_jobs().await.unwrap();

        assert_eq!(all.len(), files.len());
        assert_eq!(fps.count(&repo()).await.unwrap(), files.len());
        assert!(all.iter().all(|j| j.status == JobStatus::Queued));
        assert!(all.iter().all(|j| j.group_id == report.group_id));

        let summary = jobs.group_summary(report.group_id).await.unwrap();
        assert_eq!(summary.queued, files.len());
        let record = summary.record.unwrap();
        assert_eq!(record.job_count, files.len());
        assert_eq!(record.status, GroupStatus::Pending);
    }

    #[tokio::test]
    async fn test_rerun_with_same_fingerprints_is_noop() {
        let (enqueuer, jobs, _) = setup(FakeTree::with_files(&["a.js", "dir/c.json"]));

        enqueuer.enqueue(&repo(), None).await.unwrap();
        let second = enqueuer.enqueue(&repo(), None).await.unwrap();

        assert_eq!(second.created, 0);
        assert_eq!(second.unchanged, 2);
        assert_eq!(jobs.list_jobs().await.unwrap().len(), 2);

        // The empty group is complete immediately.
        let record = jobs.get_group(second.group_id).await.unwrap().unwrap();
        assert_eq!(record.status, GroupStatus::Completed);
        assert_eq!(record.job_count, 0);
    }

    #[tokio::test]
    async fn test_only_changed_file_is_requeued() {
        let (enqueuer, jobs, fps) = setup(FakeTree::with_files(&["a.js", "dir/c.json"]));
        fps.set(&repo(), "a.js", "sha-a.js").await.unwrap();
        fps.set(&repo(), "dir/c.json", "sha-old").await.unwrap();

        let report = enqueuer.enqueue(&repo(), None).await.unwrap();
        assert_eq!(report.created, 1);
        let all = jobs.list_jobs().await.unwrap();
        assert_eq!(all[0].file.path, "dir/c.json");
        assert_eq!(
            fps.get(&repo(), "dir/c.json").await.unwrap().as_deref(),
            Some("sha-dir/c.json")
        );
    }

    #[tokio::test]
    async fn test_listing_failure_writes_nothing() {
        let mut tree = FakeTree::with_files(&["a.js", "dir/c.json"]);
        tree.failing_dirs.push("dir".to_string());
        let (enqueuer, jobs, fps) = setup(tree);

        let err = enqueuer.enqueue(&repo(), None).await.unwrap_err();
        assert!(matches!(err, EnqueueError::Listing(_)));
        assert!(jobs.list_jobs().await.unwrap().is_empty());
        assert_eq!(fps.count(&repo()).await.unwrap(), 0);
    }
}
