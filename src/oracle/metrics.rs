//! In-process metrics for the investigator.
//!
//! Counters and a running pipeline duration, readable as a snapshot. There is
//! no exporter; the binary logs a summary on shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

pub const INVESTIGATIONS: &str = "investigations_total";
pub const CACHE_HITS: &str = "cache_hits_total";
pub const FAST_PATH_HITS: &str = "fast_path_hits_total";
pub const DEGRADED_SOURCES: &str = "degraded_sources_total";
pub const REASONING_FAILURES: &str = "reasoning_failures_total";
pub const RATE_LIMITED: &str = "rate_limited_total";
pub const REGISTRY_FLAGS: &str = "registry_flags_total";

#[derive(Debug, Default)]
struct InternalMetrics {
    counters: HashMap<String, u64>,
    pipeline_runs: u64,
    pipeline_time: Duration,
    last_update: Option<Instant>,
}

/// Shared metrics collector. Cloning shares the same counters.
#[derive(Debug, Clone, Default)]
pub struct InvestigationMetrics {
    metrics: Arc<RwLock<InternalMetrics>>,
}

impl InvestigationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip(self), fields(metric = %name))]
    pub async fn increment_counter(&self, name: &str) {
        self.add(name, 1).await;
    }

    pub async fn add(&self, name: &str, value: u64) {
        if value == 0 {
            return;
        }
        let mut metrics = self.metrics.write().await;
        *metrics.counters.entry(name.to_string()).or_insert(0) += value;
        metrics.last_update = Some(Instant::now());
        debug!("Counter {} += {}", name, value);
    }

    /// Record the duration of one full evidence pipeline.
    pub async fn record_pipeline_time(&self, duration: Duration) {
        let mut metrics = self.metrics.write().await;
        metrics.pipeline_runs += 1;
        metrics.pipeline_time += duration;
        metrics.last_update = Some(Instant::now());
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let metrics = self.metrics.read().await;
        let mean_pipeline_ms = if metrics.pipeline_runs == 0 {
            0.0
        } else {
            metrics.pipeline_time.as_secs_f64() * 1000.0 / metrics.pipeline_runs as f64
        };

        MetricsSnapshot {
            counters: metrics.counters.clone(),
            pipeline_runs: metrics.pipeline_runs,
            mean_pipeline_ms,
        }
    }

    /// Log a one-line summary of the current counters.
    pub async fn log_summary(&self) {
        let snapshot = self.snapshot().await;
        info!(
            investigations = snapshot.counter(INVESTIGATIONS),
            cache_hits = snapshot.counter(CACHE_HITS),
            fast_path = snapshot.counter(FAST_PATH_HITS),
            degraded_sources = snapshot.counter(DEGRADED_SOURCES),
            reasoning_failures = snapshot.counter(REASONING_FAILURES),
            rate_limited = snapshot.counter(RATE_LIMITED),
            registry_flags = snapshot.counter(REGISTRY_FLAGS),
            mean_pipeline_ms = snapshot.mean_pipeline_ms,
            "Investigation metrics summary"
        );
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub pipeline_runs: u64,
    pub mean_pipeline_ms: f64,
}

impl MetricsSnapshot {
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }
}
