//! End-to-end flow against the in-memory store: enqueue, scheduling passes,
//! stale recovery and group finalization.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tempfile::TempDir;
use uuid::Uuid;

use repo_digest::config::TraversalLimits;
use repo_digest::error::{FetchError, GenerationError};
use repo_digest::export::{ArtifactSink, FsArtifactSink, MemoryArtifactSink};
use repo_digest::github::{FileRef, RemoteEntry, RepoCoordinate, RepoProvider};
use repo_digest::ingest::{Enqueuer, FingerprintStore};
use repo_digest::llm::ContentGenerator;
use repo_digest::scheduler::{
    GroupBarrier, GroupStatus, JobStatus, JobStore, PassMode, Scheduler,
};
use repo_digest::storage::{KvStore, MemoryStore};

/// Serves a flat set of files as a remote tree.
struct StaticRepo {
    files: HashMap<String, String>,
    revision: Mutex<String>,
}

impl StaticRepo {
    fn new(paths: &[&str]) -> Self {
        Self {
            files: paths
                .iter()
                .map(|p| (p.to_string(), format!("// {}\n", p)))
                .collect(),
            revision: Mutex::new("r1".to_string()),
        }
    }

    fn bump_revision(&self, revision: &str) {
        *self.revision.lock().unwrap() = revision.to_string();
    }
}

#[async_trait]
impl RepoProvider for StaticRepo {
    async fn list_dir(
        &self,
        _repo: &RepoCoordinate,
        path: &str,
    ) -> Result<Vec<RemoteEntry>, FetchError> {
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };
        let mut entries: Vec<RemoteEntry> = Vec::new();
        for file in self.files.keys() {
            let Some(rest) = file.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    let dir_path = format!("{}{}", prefix, dir);
                    if !entries.iter().any(|e| e.path == dir_path) {
                        entries.push(RemoteEntry::dir(dir_path));
                    }
                }
                None => entries.push(RemoteEntry::file(file.clone(), format!("mem://{}", file))),
            }
        }
        Ok(entries)
    }

    async fn latest_fingerprint(
        &self,
        _repo: &RepoCoordinate,
        path: &str,
    ) -> Result<String, FetchError> {
        Ok(format!("{}:{}", self.revision.lock().unwrap(), path))
    }

    async fn fetch_text(&self, file: &FileRef) -> Result<String, FetchError> {
        self.files
            .get(&file.path)
            .cloned()
            .ok_or_else(|| FetchError::RequestFailed(format!("no such file {}", file.path)))
    }

    async fn download(&self, file: &FileRef, dest: &Path) -> Result<(), FetchError> {
        let body = self.fetch_text(file).await?;
        tokio::fs::write(dest, body).await?;
        Ok(())
    }

    async fn repo_metadata(&self, repo: &RepoCoordinate) -> Result<Value, FetchError> {
        Ok(json!({ "full_name": repo.full_name(), "default_branch": "main" }))
    }
}

#[derive(Default)]
struct CountingGenerator {
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl ContentGenerator for CountingGenerator {
    async fn generate(&self, path: &str, content: &str) -> Result<Value, GenerationError> {
        self.calls.lock().unwrap().push(path.to_string());
        tokio::task::yield_now().await;
        Ok(json!({ "summary": format!("{} bytes", content.len()) }))
    }
}

struct Harness {
    repo: RepoCoordinate,
    provider: Arc<StaticRepo>,
    jobs: JobStore,
    fingerprints: FingerprintStore,
    generator: Arc<CountingGenerator>,
}

impl Harness {
    fn new(paths: &[&str]) -> Self {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        Self {
            repo: RepoCoordinate::new("octo", "demo"),
            provider: Arc::new(StaticRepo::new(paths)),
            jobs: JobStore::new(kv.clone(), "digest"),
            fingerprints: FingerprintStore::new(kv, "digest"),
            generator: Arc::new(CountingGenerator::default()),
        }
    }

    fn enqueuer(&self) -> Enqueuer {
        Enqueuer::new(
            self.provider.clone(),
            self.jobs.clone(),
            self.fingerprints.clone(),
            TraversalLimits::default(),
        )
    }

    fn scheduler(&self, sink: Arc<dyn ArtifactSink>) -> Scheduler {
        let barrier = GroupBarrier::new(
            self.jobs.clone(),
            self.provider.clone(),
            sink,
            format!("test-{}", Uuid::new_v4()),
        );
        Scheduler::new(
            self.jobs.clone(),
            self.provider.clone(),
            self.generator.clone(),
            barrier,
        )
    }
}

#[tokio::test]
async fn test_enqueue_process_and_finalize() {
    let h = Harness::new(&["a.js", "b.png", "dir/c.json"]);
    let out = TempDir::new().unwrap();
    let sink = Arc::new(FsArtifactSink::new(out.path()));

    let report = h.enqueuer().enqueue(&h.repo, None).await.unwrap();
    assert_eq!(report.created, 2);
    assert_eq!(report.non_processable, 1);

    let pass = h.scheduler(sink.clone()).run_pass().await.unwrap();
    assert_eq!(pass.mode, PassMode::Queued);
    assert_eq!(pass.completed, 2);
    assert_eq!(pass.groups_finalized, 1);

    let record = h.jobs.get_group(report.group_id).await.unwrap().unwrap();
    assert_eq!(record.status, GroupStatus::Completed);
    let name = record.artifact.unwrap();
    assert_eq!(name, format!("octo__demo__{}", report.group_id));

    let doc = sink.load(&name).await.unwrap();
    let keys: Vec<&String> = doc.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["a.js", "dir/c.json", "metadata"]);
    assert_eq!(doc["metadata"]["full_name"], "octo/demo");

    // Nothing changed upstream: the next enqueue is an empty, complete group.
    let again = h.enqueuer().enqueue(&h.repo, None).await.unwrap();
    assert_eq!(again.created, 0);
    let summary = h.jobs.group_summary(again.group_id).await.unwrap();
    assert_eq!(summary.total(), 0);
    assert_eq!(summary.record.unwrap().status, GroupStatus::Completed);
}

#[tokio::test]
async fn test_new_revision_requeues_files() {
    let h = Harness::new(&["a.js", "b.rs"]);
    let sink = Arc::new(MemoryArtifactSink::new());

    h.enqueuer().enqueue(&h.repo, None).await.unwrap();
    h.scheduler(sink.clone()).run_pass().await.unwrap();

    h.provider.bump_revision("r2");
    let report = h.enqueuer().enqueue(&h.repo, None).await.unwrap();
    assert_eq!(report.created, 2);

    h.scheduler(sink.clone()).run_pass().await.unwrap();
    assert_eq!(sink.artifacts().await.len(), 2);
}

#[tokio::test]
async fn test_abandoned_job_is_reclaimed_first() {
    let h = Harness::new(&["a.js", "b.js", "c.js"]);
    let sink = Arc::new(MemoryArtifactSink::new());
    let report = h.enqueuer().enqueue(&h.repo, None).await.unwrap();

    // A worker picked up one job seven minutes ago and died.
    let mut jobs = h.jobs.list_jobs().await.unwrap();
    jobs.sort_by(|a, b| a.file.path.cmp(&b.file.path));
    let mut abandoned = jobs[1].clone();
    abandoned.start();
    abandoned.updated_at = Utc::now() - chrono::Duration::minutes(7);
    h.jobs.put_job(&abandoned).await.unwrap();

    let scheduler = h.scheduler(sink.clone());
    let first = scheduler.run_pass().await.unwrap();
    assert_eq!(first.mode, PassMode::Reclaim);
    assert_eq!(first.selected, 1);
    assert_eq!(*h.generator.calls.lock().unwrap(), vec!["b.js".to_string()]);

    let reclaimed = h.jobs.get_job(abandoned.id).await.unwrap().unwrap();
    assert_eq!(reclaimed.status, JobStatus::Completed);
    assert_eq!(reclaimed.attempts, 2);

    let second = scheduler.run_pass().await.unwrap();
    assert_eq!(second.mode, PassMode::Queued);
    assert_eq!(second.completed, 2);

    let artifacts = sink.artifacts().await;
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].group_id, report.group_id);
    assert_eq!(artifacts[0].file_count(), 3);
}

#[tokio::test]
async fn test_overlapping_passes_finalize_once() {
    let h = Harness::new(&["a.js", "b.js", "c.js", "d.js"]);
    let sink = Arc::new(MemoryArtifactSink::new());
    let report = h.enqueuer().enqueue(&h.repo, None).await.unwrap();

    // Two invocations overlap and both pick up every queued job.
    let (s1, s2) = (h.scheduler(sink.clone()), h.scheduler(sink.clone()));
    let (r1, r2) = tokio::join!(s1.run_pass(), s2.run_pass());
    r1.unwrap();
    r2.unwrap();

    // A follow-up pass sweeps the group if both evaluations lost the race.
    h.scheduler(sink.clone()).run_pass().await.unwrap();

    assert_eq!(sink.artifacts().await.len(), 1);
    let record = h.jobs.get_group(report.group_id).await.unwrap().unwrap();
    assert_eq!(record.status, GroupStatus::Completed);
}

#[tokio::test]
async fn test_subpath_enqueue_and_checkout() {
    let h = Harness::new(&["a.js", "dir/c.json", "dir/sub/d.md"]);

    let report = h.enqueuer().enqueue(&h.repo, Some("dir")).await.unwrap();
    assert_eq!(report.created, 2);

    let dest = TempDir::new().unwrap();
    let lister = repo_digest::github::RepoLister::new(h.provider.as_ref(), TraversalLimits::default());
    let written = lister.checkout(&h.repo, Some("dir"), dest.path()).await.unwrap();
    assert_eq!(written, 2);
    assert!(dest.path().join("sub/d.md").exists());
}
