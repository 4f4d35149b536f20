//! Error taxonomy shared by every component.
//!
//! Each variant maps onto one stable, machine-readable code (see
//! [`Error::code`]) and one [`ErrorCategory`], which decides how the gateway
//! propagates it:
//!
//! | Category | Codes | Propagation |
//! |---|---|---|
//! | Authentication | `AUTHENTICATION_REQUIRED`, `INVALID_TOKEN`, `FORBIDDEN` | verbatim |
//! | Validation | `BAD_INPUT`, `NOT_FOUND` | verbatim |
//! | State | `ILLEGAL_STATE`, `SEATS_UNAVAILABLE`, `RESERVATION_LOST`, `CANCEL_WINDOW_EXPIRED`, `ILLEGAL_SEAT_TRANSITION` | verbatim |
//! | Coupon | `COUPON_*` | verbatim |
//! | Availability | `UPSTREAM_UNAVAILABLE`, `TIMEOUT` | `{success: false, error}` slices in fan-outs |
//! | Internal | `INTERNAL_ERROR` | logged, replaced by a generic message |

use serde::{Deserialize, Serialize};

/// Result type used throughout the ticketing components.
pub type Result<T> = std::result::Result<T, Error>;

/// How an error is surfaced to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Missing or rejected credentials
    Authentication,
    /// Malformed or unknown input
    Validation,
    /// The requested transition is not allowed from the current state
    State,
    /// Coupon cannot be applied
    Coupon,
    /// A downstream service is unreachable or too slow
    Availability,
    /// Unexpected failure (storage, serialization)
    Internal,
}

/// Errors produced by the ticketing components and the gateway.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No bearer credential was supplied
    #[error("authentication required")]
    AuthenticationRequired,

    /// The bearer credential was rejected by the user service
    #[error("invalid or expired token")]
    InvalidToken,

    /// The caller is authenticated but lacks the required role or ownership
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Malformed request input
    #[error("{0}")]
    BadInput(String),

    /// A referenced record does not exist
    #[error("{entity} {id} not found")]
    NotFound {
        /// Kind of record
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// The record's status does not allow the operation
    #[error("{0}")]
    IllegalState(String),

    /// At least one requested seat is not available
    #[error("seats unavailable: {}", .seats.join(", "))]
    SeatsUnavailable {
        /// The offending seats
        seats: Vec<String>,
    },

    /// The booking no longer holds its reservation
    #[error("reservation lost for seats: {}", .seats.join(", "))]
    ReservationLost {
        /// Seats no longer reserved for the booking
        seats: Vec<String>,
    },

    /// The 2-hour cancellation window has elapsed
    #[error("payment {payment_id} can no longer be cancelled")]
    CancelWindowExpired {
        /// Payment the caller tried to cancel
        payment_id: String,
    },

    /// A seat state machine transition outside the allowed set
    #[error("seat {seat} cannot move from {from} to {to}")]
    IllegalSeatTransition {
        /// Seat number
        seat: String,
        /// Current state
        from: String,
        /// Requested state
        to: String,
    },

    /// No coupon with this code
    #[error("coupon {code} does not exist")]
    CouponUnknown {
        /// Coupon code
        code: String,
    },

    /// The coupon's validity has passed
    #[error("coupon {code} has expired")]
    CouponExpired {
        /// Coupon code
        code: String,
    },

    /// The coupon has been deactivated
    #[error("coupon {code} is not active")]
    CouponInactive {
        /// Coupon code
        code: String,
    },

    /// The user already redeemed this coupon
    #[error("coupon {code} has already been used")]
    CouponAlreadyUsed {
        /// Coupon code
        code: String,
    },

    /// No redemptions left
    #[error("coupon {code} is out of stock")]
    CouponOutOfStock {
        /// Coupon code
        code: String,
    },

    /// A downstream service could not be reached or answered with garbage
    #[error("{service} unavailable")]
    UpstreamUnavailable {
        /// Service name, e.g. `movie service`
        service: String,
    },

    /// A downstream call exceeded its deadline
    #[error("{service} timed out")]
    Timeout {
        /// Service name
        service: String,
    },

    /// Unexpected failure; the message is logged, never shown to clients
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a `NOT_FOUND` error
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Creates an `INTERNAL_ERROR` from any displayable cause
    #[must_use]
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        Self::Internal(cause.to_string())
    }

    /// Creates an `UPSTREAM_UNAVAILABLE` error for the named service
    #[must_use]
    pub fn unavailable(service: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            service: service.into(),
        }
    }

    /// The stable error code exposed to clients.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::BadInput(_) => "BAD_INPUT",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::IllegalState(_) => "ILLEGAL_STATE",
            Self::SeatsUnavailable { .. } => "SEATS_UNAVAILABLE",
            Self::ReservationLost { .. } => "RESERVATION_LOST",
            Self::CancelWindowExpired { .. } => "CANCEL_WINDOW_EXPIRED",
            Self::IllegalSeatTransition { .. } => "ILLEGAL_SEAT_TRANSITION",
            Self::CouponUnknown { .. } => "COUPON_UNKNOWN",
            Self::CouponExpired { .. } => "COUPON_EXPIRED",
            Self::CouponInactive { .. } => "COUPON_INACTIVE",
            Self::CouponAlreadyUsed { .. } => "COUPON_ALREADY_USED",
            Self::CouponOutOfStock { .. } => "COUPON_OUT_OF_STOCK",
            Self::UpstreamUnavailable { .. } => "UPSTREAM_UNAVAILABLE",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// The category that decides propagation.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthenticationRequired | Self::InvalidToken | Self::Forbidden(_) => {
                ErrorCategory::Authentication
            }
            Self::BadInput(_) | Self::NotFound { .. } => ErrorCategory::Validation,
            Self::IllegalState(_)
            | Self::SeatsUnavailable { .. }
            | Self::ReservationLost { .. }
            | Self::CancelWindowExpired { .. }
            | Self::IllegalSeatTransition { .. } => ErrorCategory::State,
            Self::CouponUnknown { .. }
            | Self::CouponExpired { .. }
            | Self::CouponInactive { .. }
            | Self::CouponAlreadyUsed { .. }
            | Self::CouponOutOfStock { .. } => ErrorCategory::Coupon,
            Self::UpstreamUnavailable { .. } | Self::Timeout { .. } => ErrorCategory::Availability,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    /// Whether the error means a downstream could not answer.
    #[must_use]
    pub const fn is_availability(&self) -> bool {
        matches!(self.category(), ErrorCategory::Availability)
    }

    /// Message safe to show to clients. Internal details are withheld.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }

    /// Seats attached to seat-related errors.
    #[must_use]
    pub fn seats(&self) -> Option<&[String]> {
        match self {
            Self::SeatsUnavailable { seats } | Self::ReservationLost { seats } => Some(seats),
            _ => None,
        }
    }

    /// Rebuilds an error reported by a downstream GraphQL service.
    ///
    /// Codes without a payload in the message (authentication, validation,
    /// availability) are reconstructed exactly; anything else keeps the
    /// downstream message as `BAD_INPUT` so it still reaches the caller
    /// verbatim.
    #[must_use]
    pub fn from_remote(code: Option<&str>, message: &str, service: &str) -> Self {
        match code {
            Some("AUTHENTICATION_REQUIRED" | "UNAUTHENTICATED") => Self::AuthenticationRequired,
            Some("INVALID_TOKEN") => Self::InvalidToken,
            Some("FORBIDDEN") => Self::Forbidden(message.to_string()),
            Some("NOT_FOUND") => Self::NotFound {
                entity: "record",
                id: message.to_string(),
            },
            Some("ILLEGAL_STATE") => Self::IllegalState(message.to_string()),
            Some("UPSTREAM_UNAVAILABLE") => Self::unavailable(service),
            Some("TIMEOUT") => Self::Timeout {
                service: service.to_string(),
            },
            _ => Self::BadInput(message.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::AuthenticationRequired.code(), "AUTHENTICATION_REQUIRED");
        assert_eq!(
            Error::SeatsUnavailable {
                seats: vec!["B5".into()]
            }
            .code(),
            "SEATS_UNAVAILABLE"
        );
        assert_eq!(Error::internal("boom").code(), "INTERNAL_ERROR");
    }

    #[test]
    fn seat_errors_list_offending_seats() {
        let err = Error::SeatsUnavailable {
            seats: vec!["B5".into(), "B6".into()],
        };
        assert_eq!(err.to_string(), "seats unavailable: B5, B6");
        assert_eq!(err.seats(), Some(&["B5".to_string(), "B6".to_string()][..]));
    }

    #[test]
    fn internal_details_are_not_public() {
        let err = Error::internal("connection reset by peer");
        assert_eq!(err.public_message(), "internal error");
        assert_eq!(err.category(), ErrorCategory::Internal);
    }

    #[test]
    fn availability_errors_are_flagged() {
        assert!(Error::unavailable("movie service").is_availability());
        assert!(
            Error::Timeout {
                service: "cinema service".into()
            }
            .is_availability()
        );
        assert!(!Error::InvalidToken.is_availability());
    }

    #[test]
    fn remote_codes_map_back_to_variants() {
        assert_eq!(
            Error::from_remote(Some("INVALID_TOKEN"), "bad token", "user service"),
            Error::InvalidToken
        );
        assert_eq!(
            Error::from_remote(None, "email taken", "user service"),
            Error::BadInput("email taken".into())
        );
    }
}
