//! Booking store trait.

use crate::types::{Booking, BookingStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cinema_core::{BookingId, Result, UserId};

/// Booking store.
///
/// Status changes go through [`BookingStore::transition`], a compare-and-set
/// on the current status, so concurrent confirm/cancel/expiry attempts have
/// exactly one winner.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Persists a new booking.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails or the id already exists.
    async fn insert(&self, booking: &Booking) -> Result<()>;

    /// Loads a booking.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn get(&self, id: BookingId) -> Result<Option<Booking>>;

    /// A user's bookings, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn for_user(&self, user_id: UserId) -> Result<Vec<Booking>>;

    /// Every booking, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn all(&self) -> Result<Vec<Booking>>;

    /// Moves the booking from `from` to `to` if it is currently in `from`.
    ///
    /// Returns the updated booking, or `None` when the booking is missing or
    /// in another status.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn transition(
        &self,
        id: BookingId,
        from: BookingStatus,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Booking>>;

    /// `PENDING` bookings created before `cutoff`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn pending_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Booking>>;
}
