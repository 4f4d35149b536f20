//! Correlation-id middleware.
//!
//! Every request gets a correlation id:
//!
//! 1. Taken from the `X-Correlation-ID` header when the caller (or an edge
//!    proxy) supplied a usable one, otherwise a fresh UUID v4
//! 2. Stored in request extensions as [`CorrelationId`]
//! 3. Recorded on an `http_request` tracing span wrapping the handler, so
//!    every log line of the request (including downstream calls) carries it
//! 4. Echoed back in the response header
//!
//! # Example
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/graphql", post(graphql_handler))
//!     .layer(correlation_id_layer());
//! ```

use crate::extractors::CorrelationId;
use axum::{extract::Request, http::HeaderValue, response::Response};
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::Instrument;

/// Header name for correlation ID.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Longest caller-supplied correlation id that is accepted as-is.
const MAX_CORRELATION_ID_LEN: usize = 128;

/// Create a layer that adds correlation ID tracking to all requests.
#[must_use]
pub const fn correlation_id_layer() -> CorrelationIdLayer {
    CorrelationIdLayer
}

/// Layer for correlation ID tracking.
#[derive(Clone, Debug)]
pub struct CorrelationIdLayer;

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = CorrelationIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationIdMiddleware { inner }
    }
}

/// Middleware service for correlation ID tracking.
#[derive(Clone, Debug)]
pub struct CorrelationIdMiddleware<S> {
    inner: S,
}

/// Accepts header values made of visible ASCII, up to a sane length.
fn usable_header(value: &HeaderValue) -> Option<String> {
    let text = value.to_str().ok()?.trim();
    let usable = !text.is_empty()
        && text.len() <= MAX_CORRELATION_ID_LEN
        && text.bytes().all(|b| b.is_ascii_graphic());
    usable.then(|| text.to_string())
}

impl<S> Service<Request> for CorrelationIdMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let correlation_id = req
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(usable_header)
            .map_or_else(CorrelationId::generate, CorrelationId);

        req.extensions_mut().insert(correlation_id.clone());

        let span = tracing::info_span!(
            "http_request",
            correlation_id = %correlation_id,
            method = %req.method(),
            uri = %req.uri(),
        );

        let fut = self.inner.call(req);

        Box::pin(async move {
            let mut response = fut.instrument(span).await?;

            if let Ok(header_value) = HeaderValue::from_str(correlation_id.as_str()) {
                response
                    .headers_mut()
                    .insert(CORRELATION_ID_HEADER, header_value);
            }

            Ok(response)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, http::Request, routing::get};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route(
                "/echo",
                get(|id: CorrelationId| async move { id.as_str().to_string() }),
            )
            .layer(correlation_id_layer())
    }

    #[tokio::test]
    async fn generates_an_id_when_missing() {
        let request = Request::builder().uri("/echo").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();

        let header = response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .expect("correlation id header")
            .to_str()
            .unwrap();
        assert!(uuid::Uuid::parse_str(header).is_ok());
    }

    #[tokio::test]
    async fn preserves_caller_supplied_id() {
        let request = Request::builder()
            .uri("/echo")
            .header(CORRELATION_ID_HEADER, "edge-7f3a")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        assert_eq!(
            response.headers().get(CORRELATION_ID_HEADER).unwrap(),
            "edge-7f3a"
        );
    }

    #[tokio::test]
    async fn replaces_unusable_ids() {
        let request = Request::builder()
            .uri("/echo")
            .header(CORRELATION_ID_HEADER, "has spaces in it")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();

        let header = response
            .headers()
            .get(CORRELATION_ID_HEADER)
            .unwrap()
            .to_str()
            .unwrap();
        assert_ne!(header, "has spaces in it");
    }
}
