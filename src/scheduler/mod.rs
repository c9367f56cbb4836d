//! Job scheduling without a coordinator process.
//!
//! All state lives in the shared key-value store; every pass re-derives its
//! decisions from it:
//!
//! - **JobStore**: job records, group membership markers and group records
//! - **Scheduler**: stateless pass that reclaims stale jobs before starting queued ones
//! - **GroupBarrier**: finalizes a group once every member completed (or any failed)
//!
//! # Architecture
//!
//! ```text
//!   enqueue ──► ┌────────────────────┐ ◄── trigger (shared secret)
//!               │  Key-value store   │          │
//!               │  jobs / markers /  │     ┌────▼─────┐
//!               │  groups / claims   │ ◄───│  pass    │── fetch ─► provider
//!               └────────────────────┘     │ (≤ 50)   │── generate
//!                         ▲                └────┬─────┘
//!                         │                     │ after each job
//!                         └──── barrier ◄───────┘
//!                                  │
//!                                  ▼
//!                              artifact sink
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use repo_digest::scheduler::{GroupBarrier, JobStore, Scheduler};
//!
//! let jobs = JobStore::new(store.clone(), "digest");
//! let barrier = GroupBarrier::new(jobs.clone(), provider.clone(), sink, "tick");
//! let scheduler = Scheduler::new(jobs, provider, generator, barrier);
//! let report = scheduler.trigger(&auth, Some(secret)).await?;
//! println!("{} completed, {} failed", report.completed, report.failed);
//! ```

pub mod barrier;
pub mod job;
pub mod queue;
pub mod worker;

pub use barrier::{BarrierOutcome, GroupBarrier};
pub use job::{GroupRecord, GroupStatus, Job, JobStatus, MemberStatus};
pub use queue::{GroupSummary, JobStore};
pub use worker::{select_batch, JobOutcome, PassMode, PassReport, Scheduler, Selection};
