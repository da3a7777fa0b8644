//! Per-tick diagnostic counters
//!
//! Counters are reset at the start of every tick and logged once when the
//! tick completes. They are diagnostics only and never drive behaviour.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

/// Counter names tracked during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatKind {
    ListTasks,
    DescribeTasks,
    DescribeTaskDefinition,
    ListServices,
    DescribeServices,
    DescribeContainerInstances,
    DescribeInstances,
    TaskDefinitionCacheHit,
    TaskDefinitionCacheMiss,
    HostCacheHit,
    HostCacheMiss,
    TaskDefinitionCacheSize,
    HostCacheSize,
    DiscoveredTargets,
}

impl StatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatKind::ListTasks => "api_list_tasks",
            StatKind::DescribeTasks => "api_describe_tasks",
            StatKind::DescribeTaskDefinition => "api_describe_task_definition",
            StatKind::ListServices => "api_list_services",
            StatKind::DescribeServices => "api_describe_services",
            StatKind::DescribeContainerInstances => "api_describe_container_instances",
            StatKind::DescribeInstances => "api_describe_instances",
            StatKind::TaskDefinitionCacheHit => "cache_hit_task_definition",
            StatKind::TaskDefinitionCacheMiss => "cache_miss_task_definition",
            StatKind::HostCacheHit => "cache_hit_host",
            StatKind::HostCacheMiss => "cache_miss_host",
            StatKind::TaskDefinitionCacheSize => "cache_size_task_definition",
            StatKind::HostCacheSize => "cache_size_host",
            StatKind::DiscoveredTargets => "discovered_targets",
        }
    }
}

impl fmt::Display for StatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named counter accumulator shared by all stages
#[derive(Debug, Default)]
pub struct ProcessorStats {
    counters: DashMap<StatKind, usize>,
}

impl ProcessorStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter by one
    pub fn add(&self, kind: StatKind) {
        self.add_count(kind, 1);
    }

    /// Increment a counter by `count`
    pub fn add_count(&self, kind: StatKind, count: usize) {
        *self.counters.entry(kind).or_insert(0) += count;
    }

    /// Overwrite a gauge-style counter such as a cache size
    pub fn set(&self, kind: StatKind, value: usize) {
        self.counters.insert(kind, value);
    }

    pub fn get(&self, kind: StatKind) -> usize {
        self.counters.get(&kind).map(|v| *v).unwrap_or(0)
    }

    /// Clear all counters for the next tick
    pub fn reset(&self) {
        self.counters.clear();
    }

    /// Sorted copy of the current counters
    pub fn snapshot(&self) -> BTreeMap<StatKind, usize> {
        self.counters.iter().map(|r| (*r.key(), *r.value())).collect()
    }

    /// Log the current counters as one structured event
    pub fn show(&self, cluster: &str) {
        let summary = self
            .snapshot()
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");

        info!(cluster = %cluster, stats = %summary, "Discovery tick statistics");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_reset() {
        let stats = ProcessorStats::new();
        stats.add(StatKind::ListTasks);
        stats.add(StatKind::ListTasks);
        stats.add_count(StatKind::DiscoveredTargets, 5);

        assert_eq!(stats.get(StatKind::ListTasks), 2);
        assert_eq!(stats.get(StatKind::DiscoveredTargets), 5);
        assert_eq!(stats.get(StatKind::DescribeTasks), 0);

        stats.reset();
        assert!(stats.snapshot().is_empty());
    }

    #[test]
    fn test_set_overwrites() {
        let stats = ProcessorStats::new();
        stats.set(StatKind::HostCacheSize, 10);
        stats.set(StatKind::HostCacheSize, 3);
        assert_eq!(stats.get(StatKind::HostCacheSize), 3);
    }

    #[test]
    fn test_snapshot_is_ordered() {
        let stats = ProcessorStats::new();
        stats.add(StatKind::DiscoveredTargets);
        stats.add(StatKind::ListTasks);

        let keys: Vec<_> = stats.snapshot().into_keys().collect();
        assert_eq!(keys, vec![StatKind::ListTasks, StatKind::DiscoveredTargets]);
    }
}
