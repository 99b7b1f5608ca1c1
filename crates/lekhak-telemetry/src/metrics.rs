//! Prometheus-backed worker metrics.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Every per-job counter is tagged `{queue, source, job_type}` so one
//!   registry serves all queue modes.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use prometheus::core::Collector;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use serde::Serialize;

const JOB_LABELS: &[&str] = &["queue", "source", "job_type"];

/// Prometheus-backed metrics registry shared across the worker.
#[derive(Clone)]
pub struct WorkerMetrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    jobs_received_total: IntCounterVec,
    jobs_completed_total: IntCounterVec,
    jobs_failed_total: IntCounterVec,
    jobs_cancelled_total: IntCounterVec,
    dispatch_latency_ms: HistogramVec,
}

/// Point-in-time totals for health reporting and tests.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerMetricsSnapshot {
    /// Jobs popped from any queue.
    pub jobs_received_total: u64,
    /// Jobs that reached COMPLETED.
    pub jobs_completed_total: u64,
    /// Jobs that exhausted their budget and went to a dead-letter queue.
    pub jobs_failed_total: u64,
    /// Jobs that observed a cancellation request.
    pub jobs_cancelled_total: u64,
}

impl WorkerMetrics {
    /// Construct a registry with the worker collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any collector cannot be registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let jobs_received_total = IntCounterVec::new(
            Opts::new("worker_jobs_received_total", "Jobs popped from a queue"),
            JOB_LABELS,
        )?;
        let jobs_completed_total = IntCounterVec::new(
            Opts::new("worker_jobs_completed_total", "Jobs completed successfully"),
            JOB_LABELS,
        )?;
        let jobs_failed_total = IntCounterVec::new(
            Opts::new(
                "worker_jobs_failed_total",
                "Jobs dead-lettered after exhausting retries",
            ),
            JOB_LABELS,
        )?;
        let jobs_cancelled_total = IntCounterVec::new(
            Opts::new("worker_jobs_cancelled_total", "Jobs cancelled by operators"),
            JOB_LABELS,
        )?;
        let dispatch_latency_ms = HistogramVec::new(
            HistogramOpts::new(
                "worker_dispatch_latency_ms",
                "Wall time of one job dispatch in milliseconds",
            )
            .buckets(vec![
                100.0, 500.0, 1_000.0, 5_000.0, 15_000.0, 60_000.0, 300_000.0, 900_000.0,
            ]),
            JOB_LABELS,
        )?;

        registry.register(Box::new(jobs_received_total.clone()))?;
        registry.register(Box::new(jobs_completed_total.clone()))?;
        registry.register(Box::new(jobs_failed_total.clone()))?;
        registry.register(Box::new(jobs_cancelled_total.clone()))?;
        registry.register(Box::new(dispatch_latency_ms.clone()))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                jobs_received_total,
                jobs_completed_total,
                jobs_failed_total,
                jobs_cancelled_total,
                dispatch_latency_ms,
            }),
        })
    }

    /// Count a popped job.
    pub fn inc_received(&self, queue: &str, source: &str, job_type: &str) {
        self.inner
            .jobs_received_total
            .with_label_values(&[queue, source, job_type])
            .inc();
    }

    /// Count a completed job.
    pub fn inc_completed(&self, queue: &str, source: &str, job_type: &str) {
        self.inner
            .jobs_completed_total
            .with_label_values(&[queue, source, job_type])
            .inc();
    }

    /// Count a dead-lettered job.
    pub fn inc_failed(&self, queue: &str, source: &str, job_type: &str) {
        self.inner
            .jobs_failed_total
            .with_label_values(&[queue, source, job_type])
            .inc();
    }

    /// Count a cancelled job.
    pub fn inc_cancelled(&self, queue: &str, source: &str, job_type: &str) {
        self.inner
            .jobs_cancelled_total
            .with_label_values(&[queue, source, job_type])
            .inc();
    }

    /// Record the wall time of one dispatch.
    pub fn observe_dispatch_latency(
        &self,
        queue: &str,
        source: &str,
        job_type: &str,
        duration: Duration,
    ) {
        self.inner
            .dispatch_latency_ms
            .with_label_values(&[queue, source, job_type])
            .observe(duration.as_secs_f64() * 1_000.0);
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or produces invalid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .context("failed to encode Prometheus metrics")?;
        String::from_utf8(buffer).context("metrics output was not valid UTF-8")
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn sum(vec: &IntCounterVec) -> u64 {
        vec.collect()
            .iter()
            .flat_map(prometheus::proto::MetricFamily::get_metric)
            .map(|metric| metric.get_counter().value() as u64)
            .sum()
    }

    /// Take a point-in-time snapshot of the job counters, summed over tags.
    #[must_use]
    pub fn snapshot(&self) -> WorkerMetricsSnapshot {
        WorkerMetricsSnapshot {
            jobs_received_total: Self::sum(&self.inner.jobs_received_total),
            jobs_completed_total: Self::sum(&self.inner.jobs_completed_total),
            jobs_failed_total: Self::sum(&self.inner.jobs_failed_total),
            jobs_cancelled_total: Self::sum(&self.inner.jobs_cancelled_total),
        }
    }
}
