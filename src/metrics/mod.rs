//! Metrics module for Prometheus-based monitoring.
//!
//! Recording helpers are no-ops until [`init_metrics`] has been called, so
//! library code can record unconditionally.
//!
//! # Example
//!
//! ```ignore
//! use repo_digest::metrics::{init_metrics, export_metrics};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! // ... run a scheduling pass ...
//! println!("{}", export_metrics());
//! ```

pub mod prometheus;

use std::time::Duration;

pub use self::prometheus::{
    export_metrics, init_metrics, FETCH_RETRIES, GROUPS_FINALIZED, JOBS_ENQUEUED, JOBS_EXECUTED,
    JOBS_IN_PROGRESS, JOB_DURATION, REGISTRY,
};

pub fn record_job_enqueued(repo: &str) {
    if let Some(c) = JOBS_ENQUEUED.get() {
        c.with_label_values(&[repo]).inc();
    }
}

/// Records a finished execution; `mode` is `queued` or `reclaim`.
pub fn record_job_executed(outcome: &str, mode: &str, duration: Duration) {
    if let Some(c) = JOBS_EXECUTED.get() {
        c.with_label_values(&[outcome, mode]).inc();
    }
    if let Some(h) = JOB_DURATION.get() {
        h.with_label_values(&[outcome]).observe(duration.as_secs_f64());
    }
}

pub fn record_group_finalized(outcome: &str) {
    if let Some(c) = GROUPS_FINALIZED.get() {
        c.with_label_values(&[outcome]).inc();
    }
}

pub fn record_fetch_retry() {
    if let Some(c) = FETCH_RETRIES.get() {
        c.inc();
    }
}

pub fn job_started() {
    if let Some(g) = JOBS_IN_PROGRESS.get() {
        g.inc();
    }
}

pub fn job_finished() {
    if let Some(g) = JOBS_IN_PROGRESS.get() {
        g.dec();
    }
}
