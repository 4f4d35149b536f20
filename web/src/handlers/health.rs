//! Health check endpoints.
//!
//! `/health` is liveness only. Readiness is computed by the application from
//! its own probes and rendered with [`readiness_response`].

use axum::{Json, http::StatusCode};
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: &'static str,
    /// Service version
    pub version: &'static str,
}

/// Liveness endpoint. Does not touch dependencies.
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"ok","version":"0.1.0"}
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// Result of probing one dependency.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    /// Dependency name, e.g. `database`
    pub name: String,
    /// Whether it answered
    pub ready: bool,
    /// Failure detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeResult {
    /// A dependency that answered
    #[must_use]
    pub fn ready(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ready: true,
            error: None,
        }
    }

    /// A dependency that did not answer
    #[must_use]
    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ready: false,
            error: Some(error.into()),
        }
    }
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    /// Overall readiness status
    pub ready: bool,
    /// Individual probes
    pub checks: Vec<ProbeResult>,
}

/// 200 when every probe is ready, 503 otherwise.
#[must_use]
pub fn readiness_response(checks: Vec<ProbeResult>) -> (StatusCode, Json<ReadinessResponse>) {
    let ready = checks.iter().all(|c| c.ready);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ReadinessResponse { ready, checks }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn liveness_is_always_ok() {
        let (status, Json(body)) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
    }

    #[test]
    fn any_failed_probe_makes_the_service_unready() {
        let (status, Json(body)) = readiness_response(vec![
            ProbeResult::ready("database"),
            ProbeResult::failed("sweeper", "stopped"),
        ]);
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!body.ready);

        let (status, _) = readiness_response(vec![ProbeResult::ready("database")]);
        assert_eq!(status, StatusCode::OK);
    }
}
