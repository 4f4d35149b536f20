//! Router configuration for the ticketing server.

use super::health::readiness_check;
use super::state::AppState;
use crate::gateway::{RequestContext, TicketingSchema};
use async_graphql_axum::{rejection::GraphQLRejection, GraphQLRequest, GraphQLResponse};
use axum::{
    Router,
    extract::State,
    routing::{get, post},
};
use cinema_web::{
    AppError, Authorization, CorrelationId, WebResult, correlation_id_layer, handlers::health_check,
};
use tower_http::trace::TraceLayer;

/// Executes one GraphQL request with the caller's headers attached.
///
/// A body that is not a GraphQL request never reaches the executor and gets
/// a `400` with the `{code, message}` error body.
pub async fn graphql_handler(
    State(schema): State<TicketingSchema>,
    authorization: Authorization,
    correlation_id: CorrelationId,
    request: Result<GraphQLRequest, GraphQLRejection>,
) -> WebResult<GraphQLResponse> {
    let request = request.map_err(|GraphQLRejection(err)| {
        tracing::debug!(error = %err, "Rejected malformed GraphQL request");
        AppError::bad_request(format!("malformed GraphQL request: {err}"))
    })?;
    let request = request.into_inner().data(RequestContext {
        authorization,
        correlation_id: correlation_id.0,
    });
    Ok(schema.execute(request).await.into())
}

/// Build the complete Axum router.
///
/// - `POST /graphql`
/// - `GET /health` (liveness), `GET /ready` (store reachability)
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/graphql", post(graphql_handler))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}
