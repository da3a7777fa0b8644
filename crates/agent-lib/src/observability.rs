//! Prometheus metrics for the discovery loop
//!
//! Metrics are registered once in the default registry and shared through
//! cheap [`DiscoveryMetrics`] handles.

use crate::stats::StatKind;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Tick latency buckets (in seconds); ticks are dominated by remote calls
const TICK_LATENCY_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

static GLOBAL_METRICS: OnceLock<DiscoveryMetricsInner> = OnceLock::new();

struct DiscoveryMetricsInner {
    tick_latency_seconds: Histogram,
    ticks: IntCounter,
    failed_ticks: IntCounter,
    targets_published: IntGauge,
    cache_entries: IntGaugeVec,
    cache_lookups: IntCounterVec,
    api_calls: IntCounterVec,
}

impl DiscoveryMetricsInner {
    fn new() -> Self {
        Self {
            tick_latency_seconds: register_histogram!(
                "ecs_sd_tick_latency_seconds",
                "Time spent running one discovery tick",
                TICK_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register tick_latency_seconds"),

            ticks: register_int_counter!("ecs_sd_ticks_total", "Total number of discovery ticks")
                .expect("Failed to register ticks_total"),

            failed_ticks: register_int_counter!(
                "ecs_sd_failed_ticks_total",
                "Discovery ticks aborted by an error"
            )
            .expect("Failed to register failed_ticks_total"),

            targets_published: register_int_gauge!(
                "ecs_sd_targets_published",
                "Scrape targets in the last published result file"
            )
            .expect("Failed to register targets_published"),

            cache_entries: register_int_gauge_vec!(
                "ecs_sd_cache_entries",
                "Entries held by the discovery caches",
                &["cache"]
            )
            .expect("Failed to register cache_entries"),

            cache_lookups: register_int_counter_vec!(
                "ecs_sd_cache_lookups_total",
                "Discovery cache lookups by outcome",
                &["cache", "result"]
            )
            .expect("Failed to register cache_lookups_total"),

            api_calls: register_int_counter_vec!(
                "ecs_sd_api_calls_total",
                "Cloud API calls issued by discovery",
                &["call"]
            )
            .expect("Failed to register api_calls_total"),
        }
    }
}

/// Handle to the process-wide discovery metrics
#[derive(Clone)]
pub struct DiscoveryMetrics {
    _private: (),
}

impl Default for DiscoveryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DiscoveryMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(DiscoveryMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &DiscoveryMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_tick_latency(&self, duration_secs: f64) {
        self.inner().tick_latency_seconds.observe(duration_secs);
    }

    pub fn inc_ticks(&self) {
        self.inner().ticks.inc();
    }

    pub fn inc_failed_ticks(&self) {
        self.inner().failed_ticks.inc();
    }

    pub fn set_targets_published(&self, count: i64) {
        self.inner().targets_published.set(count);
    }

    /// Fold a tick's counters into the exported metrics
    pub fn record_stats(&self, stats: &BTreeMap<StatKind, usize>) {
        for (kind, &value) in stats {
            match kind {
                StatKind::TaskDefinitionCacheSize => {
                    self.set_cache_entries("task_definition", value)
                }
                StatKind::HostCacheSize => self.set_cache_entries("host", value),
                StatKind::TaskDefinitionCacheHit => {
                    self.add_cache_lookups("task_definition", "hit", value)
                }
                StatKind::TaskDefinitionCacheMiss => {
                    self.add_cache_lookups("task_definition", "miss", value)
                }
                StatKind::HostCacheHit => self.add_cache_lookups("host", "hit", value),
                StatKind::HostCacheMiss => self.add_cache_lookups("host", "miss", value),
                StatKind::DiscoveredTargets => {}
                _ => self
                    .inner()
                    .api_calls
                    .with_label_values(&[kind.as_str()])
                    .inc_by(value as u64),
            }
        }
    }

    fn set_cache_entries(&self, cache: &str, value: usize) {
        self.inner()
            .cache_entries
            .with_label_values(&[cache])
            .set(value as i64);
    }

    fn add_cache_lookups(&self, cache: &str, result: &str, value: usize) {
        self.inner()
            .cache_lookups
            .with_label_values(&[cache, result])
            .inc_by(value as u64);
    }

    pub fn ticks(&self) -> u64 {
        self.inner().ticks.get()
    }

    pub fn failed_ticks(&self) -> u64 {
        self.inner().failed_ticks.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handles_share_registry() {
        let first = DiscoveryMetrics::new();
        let second = DiscoveryMetrics::new();

        let before = second.ticks();
        first.inc_ticks();
        assert!(second.ticks() > before);
    }

    #[test]
    fn test_record_stats() {
        let metrics = DiscoveryMetrics::new();
        let mut stats = BTreeMap::new();
        stats.insert(StatKind::ListTasks, 3);
        stats.insert(StatKind::HostCacheSize, 7);
        stats.insert(StatKind::HostCacheMiss, 2);
        metrics.record_stats(&stats);

        let families = prometheus::gather();
        let cache = families
            .iter()
            .find(|f| f.get_name() == "ecs_sd_cache_entries")
            .unwrap();
        let host = cache
            .get_metric()
            .iter()
            .find(|m| m.get_label().iter().any(|l| l.get_value() == "host"))
            .unwrap();
        assert_eq!(host.get_gauge().get_value(), 7.0);

        assert!(families.iter().any(|f| f.get_name() == "ecs_sd_api_calls_total"));

        let lookups = families
            .iter()
            .find(|f| f.get_name() == "ecs_sd_cache_lookups_total")
            .unwrap();
        let host_misses = lookups
            .get_metric()
            .iter()
            .find(|m| {
                let labels = m.get_label();
                labels.iter().any(|l| l.get_value() == "host")
                    && labels.iter().any(|l| l.get_value() == "miss")
            })
            .unwrap();
        assert!(host_misses.get_counter().get_value() >= 2.0);
    }
}
