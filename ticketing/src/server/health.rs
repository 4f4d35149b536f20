//! Readiness endpoint for the ticketing server.
//!
//! Liveness is the web crate's `health_check`; readiness runs every
//! registered [`Probe`](crate::providers::Probe) concurrently.

use super::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use cinema_web::handlers::health::{ProbeResult, ReadinessResponse, readiness_response};
use futures::future::join_all;

/// Readiness check endpoint.
///
/// ```bash
/// curl http://localhost:8080/ready
/// # {"ready":true,"checks":[{"name":"database","ready":true}]}
/// ```
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let checks = join_all(state.probes.iter().map(|probe| async move {
        match probe.check().await {
            Ok(()) => ProbeResult::ready(probe.name()),
            Err(e) => {
                tracing::warn!(probe = probe.name(), error = %e, "Readiness probe failed");
                ProbeResult::failed(probe.name(), e.public_message())
            }
        }
    }))
    .await;

    readiness_response(checks)
}
