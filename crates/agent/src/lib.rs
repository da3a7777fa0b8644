//! ECS service discovery agent
//!
//! Process wrapper around the discovery loop: configuration loading and the
//! health/metrics HTTP server.

pub mod api;
pub mod config;
