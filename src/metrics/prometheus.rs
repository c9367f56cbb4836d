//! Prometheus metrics registration and export.
//!
//! Metrics are process-local; each invocation can print its own counters
//! (see the global `--emit-metrics` flag).

use prometheus::{Counter, CounterVec, Encoder, Gauge, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::{Mutex, OnceLock};

/// Serializes initialization so every static comes from the same registry.
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Registry holding every repo-digest metric.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Jobs created by the enqueuer, labeled by repository.
pub static JOBS_ENQUEUED: OnceLock<CounterVec> = OnceLock::new();

/// Job executions, labeled by outcome (completed, failed) and mode (queued, reclaim).
pub static JOBS_EXECUTED: OnceLock<CounterVec> = OnceLock::new();

/// Job execution duration in seconds.
pub static JOB_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Group finalizations, labeled by outcome (completed, failed).
pub static GROUPS_FINALIZED: OnceLock<CounterVec> = OnceLock::new();

/// Retries performed by the fetch primitive.
pub static FETCH_RETRIES: OnceLock<Counter> = OnceLock::new();

/// Jobs currently executing in this process.
pub static JOBS_IN_PROGRESS: OnceLock<Gauge> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Calling this more than once keeps the first registration.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let jobs_enqueued = CounterVec::new(
        Opts::new("repo_digest_jobs_enqueued_total", "Jobs created by the enqueuer"),
        &["repo"],
    )?;

    let jobs_executed = CounterVec::new(
        Opts::new("repo_digest_jobs_executed_total", "Job executions by outcome"),
        &["outcome", "mode"],
    )?;

    let job_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "repo_digest_job_duration_seconds",
            "Job execution duration in seconds",
        )
        .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 180.0, 360.0]),
        &["outcome"],
    )?;

    let groups_finalized = CounterVec::new(
        Opts::new("repo_digest_groups_finalized_total", "Group finalizations by outcome"),
        &["outcome"],
    )?;

    let fetch_retries = Counter::new(
        "repo_digest_fetch_retries_total",
        "Retries performed by the fetch primitive",
    )?;

    let jobs_in_progress = Gauge::new(
        "repo_digest_jobs_in_progress",
        "Jobs currently executing in this process",
    )?;

    registry.register(Box::new(jobs_enqueued.clone()))?;
    registry.register(Box::new(jobs_executed.clone()))?;
    registry.register(Box::new(job_duration.clone()))?;
    registry.register(Box::new(groups_finalized.clone()))?;
    registry.register(Box::new(fetch_retries.clone()))?;
    registry.register(Box::new(jobs_in_progress.clone()))?;

    let _ = REGISTRY.set(registry);
    let _ = JOBS_ENQUEUED.set(jobs_enqueued);
    let _ = JOBS_EXECUTED.set(jobs_executed);
    let _ = JOB_DURATION.set(job_duration);
    let _ = GROUPS_FINALIZED.set(groups_finalized);
    let _ = FETCH_RETRIES.set(fetch_retries);
    let _ = JOBS_IN_PROGRESS.set(jobs_in_progress);

    tracing::debug!("Prometheus metrics initialized");
    Ok(())
}

/// Export all registered metrics in Prometheus text format.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics_idempotent() {
        assert!(init_metrics().is_ok());
        assert!(init_metrics().is_ok());
        assert!(REGISTRY.get().is_some());
    }

    #[test]
    fn test_export_after_recording() {
        let _ = init_metrics();
        crate::metrics::record_job_enqueued("octo/demo");
        let text = export_metrics();
        assert!(!text.starts_with("# Error"));
        assert!(text.contains("repo_digest_jobs_enqueued_total"));
    }
}
