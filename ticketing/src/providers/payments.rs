//! Payment store trait.

use crate::types::{Payment, PaymentStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cinema_core::{BookingId, PaymentId, Result, UserId};

/// Payment store.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Persists a new payment.
    ///
    /// # Errors
    ///
    /// `ILLEGAL_STATE` when the booking already has a pending or paid
    /// payment; storage errors otherwise.
    async fn insert(&self, payment: &Payment) -> Result<()>;

    /// Loads a payment.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn get(&self, id: PaymentId) -> Result<Option<Payment>>;

    /// A user's payments, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn for_user(&self, user_id: UserId) -> Result<Vec<Payment>>;

    /// Payments made for one booking, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn for_booking(&self, booking_id: BookingId) -> Result<Vec<Payment>>;

    /// Every payment, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn all(&self) -> Result<Vec<Payment>>;

    /// Compare-and-set status change. `None` when the payment is missing or
    /// not in `from`.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn transition(
        &self,
        id: PaymentId,
        from: PaymentStatus,
        to: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Payment>>;

    /// Attaches `proof` and moves a pending payment to `paid` in one step.
    /// `None` when the payment is missing or not pending.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn attach_proof(
        &self,
        id: PaymentId,
        proof: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Payment>>;

    /// Moves every pending payment without proof created before `cutoff` to
    /// `failed` and returns them.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn fail_stale(&self, cutoff: DateTime<Utc>, at: DateTime<Utc>) -> Result<Vec<Payment>>;

    /// Marks a `paid` or `refunded` payment as settled: its booking outcome
    /// and loyalty bookkeeping are done.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn mark_settled(&self, id: PaymentId, at: DateTime<Utc>) -> Result<()>;

    /// `paid` or `refunded` payments never marked settled whose last change
    /// is older than `cutoff`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn unsettled(&self, cutoff: DateTime<Utc>) -> Result<Vec<Payment>>;
}
