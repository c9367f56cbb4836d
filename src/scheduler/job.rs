//! Job and group records.
//!
//! - `Job`: one unit of work processing a single remote file
//! - `JobStatus`: lifecycle of a job (`queued`, `in-progress`, `completed`, `failed`)
//! - `MemberStatus`: value of a group membership marker
//! - `GroupRecord`: explicit group state (`pending`, `completed`, `failed`)

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::github::{FileRef, RepoCoordinate};

/// Status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::InProgress => "in-progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether no further transition is expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of a `(group, job)` membership marker.
///
/// A marker stays `queued` while its job is executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberStatus {
    Queued,
    Completed,
    Failed,
}

impl MemberStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberStatus::Queued => "queued",
            MemberStatus::Completed => "completed",
            MemberStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(MemberStatus::Queued),
            "completed" => Ok(MemberStatus::Completed),
            "failed" => Ok(MemberStatus::Failed),
            other => Err(format!("unknown member status '{}'", other)),
        }
    }
}

impl From<JobStatus> for MemberStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Queued | JobStatus::InProgress => MemberStatus::Queued,
            JobStatus::Completed => MemberStatus::Completed,
            JobStatus::Failed => MemberStatus::Failed,
        }
    }
}

/// A unit of work: process one file of one repository.
///
/// `updated_at` is the only staleness signal and is refreshed by every
/// status transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub file: FileRef,
    pub group_id: Uuid,
    pub owner: String,
    pub repo: String,
    pub status: JobStatus,
    /// Generation result, set on completion.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Failure message, set when the job fails.
    #[serde(default)]
    pub error: Option<String>,
    /// Executions started so far, reclamations included.
    #[serde(default)]
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Creates a queued job with a fresh id.
    pub fn new(group_id: Uuid, repo: &RepoCoordinate, file: FileRef) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            file,
            group_id,
            owner: repo.owner.clone(),
            repo: repo.repo.clone(),
            status: JobStatus::Queued,
            result: None,
            error: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn coordinate(&self) -> RepoCoordinate {
        RepoCoordinate::new(&self.owner, &self.repo)
    }

    /// Enters `in-progress`, clearing the outcome of any earlier execution.
    pub fn start(&mut self) {
        self.attempts += 1;
        self.result = None;
        self.error = None;
        self.transition(JobStatus::InProgress);
    }

    pub fn complete(&mut self, result: serde_json::Value) {
        self.result = Some(result);
        self.error = None;
        self.transition(JobStatus::Completed);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.result = None;
        self.error = Some(error.into());
        self.transition(JobStatus::Failed);
    }

    fn transition(&mut self, status: JobStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// An `in-progress` job whose last update is older than `threshold`.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        if self.status != JobStatus::InProgress {
            return false;
        }
        let Ok(threshold) = chrono::Duration::from_std(threshold) else {
            return false;
        };
        now.signed_duration_since(self.updated_at) > threshold
    }
}

/// Explicit state of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupStatus::Pending => write!(f, "pending"),
            GroupStatus::Completed => write!(f, "completed"),
            GroupStatus::Failed => write!(f, "failed"),
        }
    }
}

/// The batch of jobs created by one enqueue call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub group_id: Uuid,
    pub owner: String,
    pub repo: String,
    pub status: GroupStatus,
    /// Number of membership markers; fixed once the enqueuer finishes.
    pub job_count: usize,
    /// Name of the artifact written on completion.
    #[serde(default)]
    pub artifact: Option<String>,
    /// Reason the group failed.
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GroupRecord {
    pub fn new(group_id: Uuid, repo: &RepoCoordinate, job_count: usize) -> Self {
        let now = Utc::now();
        // A group with nothing to do is complete from the start.
        let status = if job_count == 0 {
            GroupStatus::Completed
        } else {
            GroupStatus::Pending
        };
        Self {
            group_id,
            owner: repo.owner.clone(),
            repo: repo.repo.clone(),
            status,
            job_count,
            artifact: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn coordinate(&self) -> RepoCoordinate {
        RepoCoordinate::new(&self.owner, &self.repo)
    }

    pub fn mark_completed(&mut self, artifact: Option<String>) {
        self.status = GroupStatus::Completed;
        self.artifact = artifact;
        self.error = None;
        self.updated_at = Utc::now();
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = GroupStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }
}
