//! Axum integration for the cinema ticketing gateway.
//!
//! The gateway's public surface is a single GraphQL endpoint, but the HTTP
//! shell around it still needs the usual plumbing:
//!
//! - [`AppError`]: `{code, message}` JSON errors for non-GraphQL routes,
//!   built from the shared [`cinema_core::Error`] taxonomy
//! - [`correlation_id_layer`]: correlation ids on every request and span
//! - [`Authorization`] and [`CorrelationId`] extractors
//! - Liveness and readiness handlers
//!
//! # Request Flow
//!
//! ```text
//! request ─► correlation id layer ─► trace layer ─► handler
//!                 │                                   │
//!                 └── span{correlation_id} ◄──────────┘ logs, downstream calls
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;

// Re-export key types for convenience
pub use error::AppError;
pub use extractors::{Authorization, CorrelationId};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
