//! Custom Axum extractors.
//!
//! - [`CorrelationId`]: the request's correlation id (set by the middleware)
//! - [`Authorization`]: the raw `Authorization` header, kept verbatim so the
//!   gateway can forward it unchanged to downstream services

use crate::middleware::CORRELATION_ID_HEADER;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use std::convert::Infallible;
use std::fmt;
use uuid::Uuid;

/// Correlation ID for request tracing.
///
/// Read from request extensions when the middleware is installed, else from
/// the `X-Correlation-ID` header, else freshly generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    /// A fresh UUID v4 correlation id
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The id as text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(id) = parts.extensions.get::<Self>() {
            return Ok(id.clone());
        }

        let id = parts
            .headers
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map_or_else(Self::generate, |s| Self(s.to_string()));

        Ok(id)
    }
}

/// The caller's `Authorization` header, untouched.
///
/// Absence is not a rejection: public operations (register, login) run
/// without one, and the gateway's auth gate decides per operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Authorization(pub Option<String>);

impl Authorization {
    /// The bearer credential, if the header uses the `Bearer` scheme.
    #[must_use]
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.0.as_deref()?.trim();
        let (scheme, token) = value.split_once(' ')?;
        let token = token.trim();
        (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
    }

    /// The raw header value, for forwarding.
    #[must_use]
    pub fn header_value(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

impl<S> FromRequestParts<S> for Authorization
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);

        Ok(Self(value))
    }
}
