//! # Cinema Core
//!
//! Shared building blocks for the cinema ticketing backend.
//!
//! Every component of the system (seat inventory, bookings, payments, loyalty
//! and the gateway) speaks in terms of the types defined here:
//!
//! - **Identifiers**: strongly-typed ids so a `BookingId` can never be passed
//!   where a `PaymentId` is expected
//! - **Money**: integer cents with checked arithmetic and percentage discounts
//! - **Environment**: the [`environment::Clock`] abstraction injected into
//!   every component so deadlines are testable
//! - **Errors**: one [`Error`] type whose variants map onto the stable error
//!   codes exposed to GraphQL clients
//!
//! ## Example
//!
//! ```
//! use cinema_core::{Error, ErrorCategory, Money};
//!
//! let total = Money::from_dollars(50).checked_mul(2).unwrap_or_default();
//! assert_eq!(total.discount(20), Money::from_dollars(20));
//!
//! let err = Error::CouponOutOfStock { code: "SUMMER".into() };
//! assert_eq!(err.code(), "COUPON_OUT_OF_STOCK");
//! assert_eq!(err.category(), ErrorCategory::Coupon);
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod environment;
pub mod error;
pub mod ids;
pub mod money;

pub use environment::{Clock, SystemClock};
pub use error::{Error, ErrorCategory, Result};
pub use ids::{AuditoriumId, BookingId, CouponId, MovieId, PaymentId, ShowtimeId, UserId};
pub use money::Money;
