//! HTTP request handlers shared by gateway deployments.

pub mod health;

pub use health::{ProbeResult, health_check, readiness_response};
