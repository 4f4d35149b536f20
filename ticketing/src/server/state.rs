//! Application state for the ticketing HTTP server.

use crate::gateway::TicketingSchema;
use crate::providers::Probe;
use axum::extract::FromRef;
use std::sync::Arc;

/// State shared by all HTTP handlers. Cloned per request; every field is
/// reference-counted.
#[derive(Clone)]
pub struct AppState {
    /// GraphQL schema holding the gateway
    pub schema: TicketingSchema,

    /// Dependencies checked by `/ready`
    pub probes: Arc<Vec<Arc<dyn Probe>>>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(schema: TicketingSchema, probes: Vec<Arc<dyn Probe>>) -> Self {
        Self {
            schema,
            probes: Arc::new(probes),
        }
    }
}

impl FromRef<AppState> for TicketingSchema {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.schema.clone()
    }
}
