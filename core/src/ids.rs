//! Strongly-typed identifiers.
//!
//! Two families exist:
//!
//! - **Numeric ids** (`i64`) for records owned by external collaborators or
//!   allocated by the database sequence: users, movies, auditoriums,
//!   showtimes. The loyalty coupon code embeds the numeric user id.
//! - **UUID ids** for records this system mints itself: bookings, payments,
//!   coupons. A booking id is generated before seats are reserved so it can
//!   tag the reservation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw numeric id
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// Returns the raw numeric id
            #[must_use]
            pub const fn get(&self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map(Self)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random id
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create an id from a `Uuid`
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s.trim()).map(Self)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a user account held by the user service
    UserId
);
numeric_id!(
    /// Identifier of a movie held by the movie service
    MovieId
);
numeric_id!(
    /// Identifier of an auditorium held by the cinema service
    AuditoriumId
);
numeric_id!(
    /// Identifier of a published showtime
    ShowtimeId
);

uuid_id!(
    /// Identifier of a booking, also used to tag its seat reservation
    BookingId
);
uuid_id!(
    /// Identifier of a payment
    PaymentId
);
uuid_id!(
    /// Identifier of a coupon
    CouponId
);

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_parse_and_display() {
        let id: UserId = " 42 ".parse().unwrap();
        assert_eq!(id, UserId::new(42));
        assert_eq!(id.to_string(), "42");
        assert!("forty-two".parse::<UserId>().is_err());
    }

    #[test]
    fn uuid_ids_are_unique_and_serialize_transparently() {
        let a = BookingId::new();
        let b = BookingId::new();
        assert_ne!(a, b);

        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, format!("\"{a}\""));
        let back: BookingId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }
}
