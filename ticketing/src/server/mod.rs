//! HTTP server module for the ticketing gateway.
//!
//! - Application state shared by handlers
//! - `POST /graphql`
//! - Liveness and readiness endpoints

pub mod health;
pub mod routes;
pub mod state;

pub use health::readiness_check;
pub use routes::{build_router, graphql_handler};
pub use state::AppState;
