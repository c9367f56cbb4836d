//! Job store on top of the shared key-value store.
//!
//! # Key layout
//!
//! - `{prefix}:job:{job_id}`: JSON job record
//! - `{prefix}:group:{group_id}:member:{job_id}`: membership marker (`queued|completed|failed`)
//! - `{prefix}:group:{group_id}:record`: JSON group record
//! - `{prefix}:group:{group_id}:finalized`: finalization claim, created with set-if-absent
//!
//! Every write is a full overwrite of one key. Concurrent writers race and
//! the last write wins.

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use super::job::{GroupRecord, Job, MemberStatus};
use crate::error::StoreError;
use crate::storage::{decode, get_json, set_json, KvStore};

/// Marker counts and record of one group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupSummary {
    pub group_id: Uuid,
    pub record: Option<GroupRecord>,
    pub queued: usize,
    pub completed: usize,
    pub failed: usize,
}

impl GroupSummary {
    pub fn total(&self) -> usize {
        self.queued + self.completed + self.failed
    }

    /// Every marker reads `completed`. Vacuously true for an empty group.
    pub fn all_completed(&self) -> bool {
        self.queued == 0 && self.failed == 0
    }
}

/// Persistence for jobs, membership markers and group records.
#[derive(Clone)]
pub struct JobStore {
    store: Arc<dyn KvStore>,
    prefix: String,
}

impl JobStore {
    pub fn new(store: Arc<dyn KvStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// The underlying key-value store.
    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn job_prefix(&self) -> String {
        format!("{}:job:", self.prefix)
    }

    fn job_key(&self, job_id: Uuid) -> String {
        format!("{}:job:{}", self.prefix, job_id)
    }

    fn member_prefix(&self, group_id: Uuid) -> String {
        format!("{}:group:{}:member:", self.prefix, group_id)
    }

    fn member_key(&self, group_id: Uuid, job_id: Uuid) -> String {
        format!("{}{}", self.member_prefix(group_id), job_id)
    }

    fn group_key(&self, group_id: Uuid) -> String {
        format!("{}:group:{}:record", self.prefix, group_id)
    }

    fn finalized_key(&self, group_id: Uuid) -> String {
        format!("{}:group:{}:finalized", self.prefix, group_id)
    }

    pub async fn put_job(&self, job: &Job) -> Result<(), StoreError> {
        set_json(self.store.as_ref(), &self.job_key(job.id), job).await
    }

    pub async fn get_job(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        get_json(self.store.as_ref(), &self.job_key(job_id)).await
    }

    /// Loads every job in the store.
    ///
    /// Records that fail to decode are logged and skipped so one bad key
    /// cannot stall every pass.
    pub async fn list_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let keys = self.store.scan_prefix(&self.job_prefix()).await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let values = self.store.get_many(&keys).await?;
        let mut jobs = Vec::with_capacity(keys.len());
        for (key, raw) in keys.iter().zip(values) {
            // Deleted between scan and read.
            let Some(raw) = raw else { continue };
            match decode::<Job>(key, &raw) {
                Ok(job) => jobs.push(job),
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable job record"),
            }
        }
        Ok(jobs)
    }

    pub async fn set_member(
        &self,
        group_id: Uuid,
        job_id: Uuid,
        status: MemberStatus,
    ) -> Result<(), StoreError> {
        self.store
            .set(&self.member_key(group_id, job_id), status.as_str())
            .await
    }

    /// Reads every membership marker of a group.
    pub async fn members(&self, group_id: Uuid) -> Result<Vec<(Uuid, MemberStatus)>, StoreError> {
        let prefix = self.member_prefix(group_id);
        let keys = self.store.scan_prefix(&prefix).await?;
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let values = self.store.get_many(&keys).await?;
        let mut members = Vec::with_capacity(keys.len());
        for (key, raw) in keys.iter().zip(values) {
            let Some(raw) = raw else { continue };
            let corrupt = |reason: String| StoreError::CorruptRecord {
                key: key.clone(),
                reason,
            };
            let job_id = key
                .strip_prefix(&prefix)
                .and_then(|id| Uuid::parse_str(id).ok())
                .ok_or_else(|| corrupt("member key does not end in a job id".to_string()))?;
            let status = raw.parse::<MemberStatus>().map_err(corrupt)?;
            members.push((job_id, status));
        }
        Ok(members)
    }

    pub async fn put_group(&self, group: &GroupRecord) -> Result<(), StoreError> {
        set_json(self.store.as_ref(), &self.group_key(group.group_id), group).await
    }

    pub async fn get_group(&self, group_id: Uuid) -> Result<Option<GroupRecord>, StoreError> {
        get_json(self.store.as_ref(), &self.group_key(group_id)).await
    }

    /// Record plus marker counts for a group.
    pub async fn group_summary(&self, group_id: Uuid) -> Result<GroupSummary, StoreError> {
        let record = self.get_group(group_id).await?;
        let mut summary = GroupSummary {
            group_id,
            record,
            queued: 0,
            completed: 0,
            failed: 0,
        };
        for (_, status) in self.members(group_id).await? {
            match status {
                MemberStatus::Queued => summary.queued += 1,
                MemberStatus::Completed => summary.completed += 1,
                MemberStatus::Failed => summary.failed += 1,
            }
        }
        Ok(summary)
    }

    /// Atomically claims the right to finalize a group.
    ///
    /// Exactly one caller gets `true` until the claim is released.
    pub async fn claim_finalization(&self, group_id: Uuid, owner: &str) -> Result<bool, StoreError> {
        self.store
            .set_if_absent(&self.finalized_key(group_id), owner)
            .await
    }

    /// Drops a claim whose finalization did not finish.
    pub async fn release_finalization(&self, group_id: Uuid) -> Result<(), StoreError> {
        self.store.delete(&self.finalized_key(group_id)).await
    }
}
