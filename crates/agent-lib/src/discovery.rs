//! Discovery loop
//!
//! Drives the pipeline once per `sd_frequency` until shutdown. A failed
//! tick is logged and reported to the health registry; the previously
//! published result file stays in place and the next tick retries. A result
//! file that keeps failing to publish marks the publisher unhealthy.

use crate::api::EcsApi;
use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, Result};
use crate::health::{components, HealthRegistry};
use crate::observability::DiscoveryMetrics;
use crate::pipeline::Pipeline;
use crate::stats::{ProcessorStats, StatKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

/// Consecutive failed publishes after which the publisher is unhealthy
pub const PUBLISH_FAILURE_THRESHOLD: u32 = 3;

/// Outcome of one successful tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickSummary {
    /// Tasks that reached the export stage
    pub tasks: usize,
    /// Targets written to the result file
    pub targets: usize,
    pub elapsed: Duration,
}

pub struct DiscoveryLoop {
    config: DiscoveryConfig,
    pipeline: Pipeline,
    stats: Arc<ProcessorStats>,
    health: HealthRegistry,
    metrics: DiscoveryMetrics,
    frequency: Duration,
    publish_failures: u32,
}

impl DiscoveryLoop {
    /// Validate the configuration and assemble the pipeline. Nothing is
    /// started if either step fails.
    pub fn new(
        config: DiscoveryConfig,
        api: Arc<dyn EcsApi>,
        health: HealthRegistry,
    ) -> Result<Self> {
        config.validate()?;
        let frequency = config.frequency()?;
        let stats = Arc::new(ProcessorStats::new());
        let pipeline = Pipeline::new(&config, api, stats.clone())?;

        Ok(Self {
            config,
            pipeline,
            stats,
            health,
            metrics: DiscoveryMetrics::new(),
            frequency,
            publish_failures: 0,
        })
    }

    pub fn frequency(&self) -> Duration {
        self.frequency
    }

    pub fn stats(&self) -> &Arc<ProcessorStats> {
        &self.stats
    }

    /// Run ticks until a shutdown signal arrives. Shutdown is only observed
    /// between ticks.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            cluster = %self.config.target_cluster,
            region = %self.config.cluster_region,
            frequency_secs = self.frequency.as_secs_f64(),
            result_file = %self.config.result_file.display(),
            "Starting ECS service discovery loop"
        );

        self.health.register(components::DISCOVERY).await;
        self.health.register(components::PUBLISHER).await;

        let mut ticker = interval(self.frequency);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Errors are already logged and reported
                    let _ = self.tick().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down ECS service discovery loop");
                    break;
                }
            }
        }
    }

    /// Run the pipeline once and report the outcome
    pub async fn tick(&mut self) -> Result<TickSummary> {
        self.stats.reset();
        let start = Instant::now();

        let result = self.pipeline.run().await;
        let elapsed = start.elapsed();

        self.metrics.inc_ticks();
        self.metrics.observe_tick_latency(elapsed.as_secs_f64());
        self.metrics.record_stats(&self.stats.snapshot());
        self.stats.show(&self.config.target_cluster);

        let outcome = match result {
            Ok(records) => {
                self.publish_failures = 0;
                let targets = self.stats.get(StatKind::DiscoveredTargets);
                self.metrics.set_targets_published(targets as i64);
                self.health.set_healthy(components::DISCOVERY).await;
                self.health.set_healthy(components::PUBLISHER).await;

                info!(
                    cluster = %self.config.target_cluster,
                    tasks = records.len(),
                    targets,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Discovery tick complete"
                );
                Ok(TickSummary {
                    tasks: records.len(),
                    targets,
                    elapsed,
                })
            }
            Err(e) => {
                self.metrics.inc_failed_ticks();
                match e {
                    DiscoveryError::Io { .. } | DiscoveryError::Serialize(_) => {
                        self.publish_failures += 1;
                        if self.publish_failures >= PUBLISH_FAILURE_THRESHOLD {
                            error!(
                                result_file = %self.config.result_file.display(),
                                failures = self.publish_failures,
                                "Result file cannot be published"
                            );
                            self.health
                                .set_unhealthy(components::PUBLISHER, e.to_string())
                                .await;
                        } else {
                            self.health
                                .set_degraded(components::PUBLISHER, e.to_string())
                                .await;
                        }
                    }
                    _ => {
                        self.publish_failures = 0;
                        self.health
                            .set_degraded(components::DISCOVERY, e.to_string())
                            .await;
                    }
                }

                warn!(
                    cluster = %self.config.target_cluster,
                    error = %e,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Discovery tick failed, keeping previous result file"
                );
                Err(e)
            }
        };

        self.health.set_ready(true).await;
        outcome
    }
}

/// Builder for the discovery loop
pub struct DiscoveryLoopBuilder {
    config: Option<DiscoveryConfig>,
    api: Option<Arc<dyn EcsApi>>,
    health: HealthRegistry,
}

impl DiscoveryLoopBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            api: None,
            health: HealthRegistry::new(),
        }
    }

    pub fn config(mut self, config: DiscoveryConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the cloud API the pipeline queries
    pub fn api(mut self, api: Arc<dyn EcsApi>) -> Self {
        self.api = Some(api);
        self
    }

    /// Report into an existing health registry
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn build(self) -> Result<DiscoveryLoop> {
        let config = self
            .config
            .ok_or_else(|| DiscoveryError::Config("Discovery configuration is required".into()))?;
        let api = self
            .api
            .ok_or_else(|| DiscoveryError::Config("Cloud API client is required".into()))?;

        DiscoveryLoop::new(config, api, self.health)
    }
}

impl Default for DiscoveryLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{InventorySnapshot, StaticInventory};
    use crate::config::TaskDefinitionConfig;
    use crate::health::ComponentStatus;
    use crate::models::{
        Attachment, ContainerDefinition, KeyValuePair, LaunchType, NetworkMode, PortMapping, Task,
        TaskDefinition, ENI_ATTACHMENT_TYPE, PRIVATE_IPV4_DETAIL,
    };
    use crate::target::read_targets;
    use tempfile::TempDir;

    const DEFINITION_ARN: &str = "arn:aws:ecs:us-east-2:211220956907:task-definition/nginx:1";

    fn config(dir: &TempDir) -> DiscoveryConfig {
        DiscoveryConfig {
            frequency: "10ms".to_string(),
            target_cluster: "ExampleCluster".to_string(),
            cluster_region: "us-east-2".to_string(),
            result_file: dir.path().join("targets.yaml"),
            task_definitions: vec![TaskDefinitionConfig {
                arn_pattern: ".*:task-definition/nginx:[0-9]+".to_string(),
                metrics_ports: "9113".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    fn inventory() -> Arc<StaticInventory> {
        Arc::new(StaticInventory::new(InventorySnapshot {
            cluster: "ExampleCluster".to_string(),
            tasks: vec![Task {
                task_arn: Some(
                    "arn:aws:ecs:us-east-2:211220956907:task/ExampleCluster/abc".to_string(),
                ),
                task_definition_arn: Some(DEFINITION_ARN.to_string()),
                launch_type: Some(LaunchType::Fargate),
                attachments: vec![Attachment {
                    attachment_type: Some(ENI_ATTACHMENT_TYPE.to_string()),
                    details: vec![KeyValuePair {
                        name: Some(PRIVATE_IPV4_DETAIL.to_string()),
                        value: Some("10.0.0.7".to_string()),
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            }],
            task_definitions: vec![TaskDefinition {
                task_definition_arn: Some(DEFINITION_ARN.to_string()),
                family: Some("nginx".to_string()),
                revision: 1,
                network_mode: Some(NetworkMode::Awsvpc),
                container_definitions: vec![ContainerDefinition {
                    name: Some("nginx-exporter".to_string()),
                    port_mappings: vec![PortMapping {
                        container_port: Some(9113),
                        host_port: Some(9113),
                    }],
                    ..Default::default()
                }],
            }],
            ..Default::default()
        }))
    }

    #[test]
    fn test_builder_requires_api() {
        let dir = TempDir::new().unwrap();
        let result = DiscoveryLoopBuilder::new().config(config(&dir)).build();
        assert!(matches!(result, Err(DiscoveryError::Config(_))));
    }

    #[test]
    fn test_invalid_config_never_builds() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.task_definitions.clear();

        let result = DiscoveryLoopBuilder::new()
            .config(config)
            .api(inventory())
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_pattern_never_builds() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.task_definitions[0].arn_pattern = "(".to_string();

        let result = DiscoveryLoopBuilder::new()
            .config(config)
            .api(inventory())
            .build();
        assert!(matches!(result, Err(DiscoveryError::InvalidPattern { .. })));
    }

    #[tokio::test]
    async fn test_tick_publishes_and_reports_health() {
        let dir = TempDir::new().unwrap();
        let health = HealthRegistry::new();
        let mut discovery = DiscoveryLoopBuilder::new()
            .config(config(&dir))
            .api(inventory())
            .health(health.clone())
            .build()
            .unwrap();
        assert_eq!(discovery.frequency(), Duration::from_millis(10));

        let summary = discovery.tick().await.unwrap();
        assert_eq!(summary.tasks, 1);
        assert_eq!(summary.targets, 1);

        let targets = read_targets(&dir.path().join("targets.yaml")).unwrap();
        assert_eq!(targets[0].address(), "10.0.0.7:9113");

        assert!(health.readiness().await.ready);
        assert_eq!(
            health.status(components::DISCOVERY).await,
            Some(ComponentStatus::Healthy)
        );
    }

    #[tokio::test]
    async fn test_failed_tick_degrades_discovery() {
        let dir = TempDir::new().unwrap();
        let api = inventory();
        let health = HealthRegistry::new();
        let mut discovery = DiscoveryLoop::new(config(&dir), api.clone(), health.clone()).unwrap();

        discovery.tick().await.unwrap();
        api.fail(StatKind::DescribeTasks).await;
        assert!(discovery.tick().await.is_err());

        assert_eq!(
            health.status(components::DISCOVERY).await,
            Some(ComponentStatus::Degraded)
        );
        assert!(health.readiness().await.ready);
        assert_eq!(read_targets(&dir.path().join("targets.yaml")).unwrap().len(), 1);

        api.recover(StatKind::DescribeTasks).await;
        discovery.tick().await.unwrap();
        assert_eq!(
            health.status(components::DISCOVERY).await,
            Some(ComponentStatus::Healthy)
        );
    }

    #[tokio::test]
    async fn test_repeated_publish_failures_make_publisher_unhealthy() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let mut config = config(&dir);
        config.result_file = blocker.join("targets.yaml");
        let health = HealthRegistry::new();
        let mut discovery = DiscoveryLoop::new(config, inventory(), health.clone()).unwrap();

        for _ in 1..PUBLISH_FAILURE_THRESHOLD {
            assert!(matches!(
                discovery.tick().await,
                Err(DiscoveryError::Io { .. })
            ));
        }
        assert_eq!(
            health.status(components::PUBLISHER).await,
            Some(ComponentStatus::Degraded)
        );
        assert!(health.readiness().await.ready);

        assert!(discovery.tick().await.is_err());
        assert_eq!(
            health.status(components::PUBLISHER).await,
            Some(ComponentStatus::Unhealthy)
        );
        assert!(!health.readiness().await.ready);

        std::fs::remove_file(&blocker).unwrap();
        discovery.tick().await.unwrap();
        assert_eq!(
            health.status(components::PUBLISHER).await,
            Some(ComponentStatus::Healthy)
        );
        assert!(health.readiness().await.ready);
        assert!(blocker.join("targets.yaml").exists());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let discovery =
            DiscoveryLoop::new(config(&dir), inventory(), HealthRegistry::new()).unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(discovery.run(shutdown_rx));

        // First tick fires immediately
        let path = dir.path().join("targets.yaml");
        for _ in 0..100 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(path.exists());

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
