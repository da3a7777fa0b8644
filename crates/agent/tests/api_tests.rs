//! Integration tests for the agent API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use ecs_sd_agent::api::{create_router, AppState};
use ecs_sd_lib::{
    config::TaskDefinitionConfig,
    health::components,
    models::{LaunchType, Task},
    DiscoveryConfig, DiscoveryLoop, DiscoveryMetrics, HealthRegistry, InventorySnapshot,
    StaticInventory,
};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::DISCOVERY).await;
    health_registry.register(components::PUBLISHER).await;

    let state = Arc::new(AppState::new(health_registry, DiscoveryMetrics::new()));
    let router = create_router(state.clone());

    (router, state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, health) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["components"]["discovery"]["status"], "healthy");
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_degraded(components::DISCOVERY, "Failed to list task ARNs for ExampleCluster")
        .await;

    let (status, health) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
    assert_eq!(
        health["components"]["discovery"]["message"],
        "Failed to list task ARNs for ExampleCluster"
    );
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .set_unhealthy(components::PUBLISHER, "result directory is read-only")
        .await;

    let (status, health) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_returns_503_before_first_tick() {
    let (app, _state) = setup_test_app().await;

    let (status, readiness) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_readyz_after_discovery_tick() {
    let dir = tempfile::tempdir().unwrap();
    let config = DiscoveryConfig {
        target_cluster: "ExampleCluster".to_string(),
        cluster_region: "us-east-2".to_string(),
        result_file: dir.path().join("targets.yaml"),
        task_definitions: vec![TaskDefinitionConfig {
            arn_pattern: ".*".to_string(),
            metrics_ports: "9404".to_string(),
            ..Default::default()
        }],
        ..Default::default()
    };
    let inventory = StaticInventory::new(InventorySnapshot {
        cluster: "ExampleCluster".to_string(),
        tasks: vec![Task {
            task_arn: Some(
                "arn:aws:ecs:us-east-2:211220956907:task/ExampleCluster/abc".to_string(),
            ),
            launch_type: Some(LaunchType::Fargate),
            ..Default::default()
        }],
        ..Default::default()
    });

    let (app, state) = setup_test_app().await;
    let mut discovery =
        DiscoveryLoop::new(config, Arc::new(inventory), state.health_registry.clone()).unwrap();
    discovery.tick().await.unwrap();

    let (status, readiness) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);
}

#[tokio::test]
async fn test_readyz_returns_503_when_ready_but_unhealthy() {
    let (app, state) = setup_test_app().await;

    state.health_registry.set_ready(true).await;
    state
        .health_registry
        .set_unhealthy(components::PUBLISHER, "Failed")
        .await;

    let (status, _) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app().await;

    // The registry is process-wide and shared with other tests
    state.metrics.inc_ticks();

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    assert!(text.contains("ecs_sd_ticks_total"));
    assert!(text.contains("ecs_sd_targets_published"));
    assert!(text.contains("ecs_sd_tick_latency_seconds"));
}
