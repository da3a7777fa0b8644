//! ECS service discovery library
//!
//! Discovers Prometheus scrape targets among the running tasks of an ECS
//! cluster and publishes them as a file-based service discovery target list.
//!
//! - Task inventory, definition, service and host resolution
//! - Label, task-definition and service-name discovery rules
//! - Deduplicated export with atomic publication
//! - Health checks and Prometheus metrics for the discovery loop

pub mod api;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod rules;
pub mod stats;
pub mod target;
pub mod task;

pub use api::{EcsApi, EcsClient, InventorySnapshot, StaticInventory};
pub use config::DiscoveryConfig;
pub use discovery::{DiscoveryLoop, DiscoveryLoopBuilder, TickSummary};
pub use error::{DiscoveryError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use observability::DiscoveryMetrics;
pub use rules::DiscoveryRules;
pub use target::ScrapeTarget;
