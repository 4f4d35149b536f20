//! Payment manager: proof upload, cancellation window, expiry and refunds.
//!
//! ```text
//! pending ──proof──► paid ──reservation lost──► refunded
//!    │
//!    ├──user cancel (< 2h)──► cancelled
//!    ├──booking cancelled───► cancelled
//!    └──no proof (> 24h)────► failed
//! ```
//!
//! A payment reaching `paid` asks the booking manager to confirm; only a
//! confirmed booking counts toward loyalty.

use crate::aggregates::booking::{BookingManager, ConfirmOutcome};
use crate::aggregates::loyalty::LoyaltyEngine;
use crate::metrics;
use crate::providers::PaymentStore;
use crate::types::{
    Booking, BookingStatus, CancelReason, Coupon, MAX_PROOF_BYTES, Payment, PaymentMethod,
    PaymentStatus,
};
use chrono::{DateTime, Duration, Utc};
use cinema_core::{BookingId, Clock, Error, Money, PaymentId, Result, UserId};
use std::sync::Arc;

/// How long an approved payment may stay unsettled before the sweeper
/// finishes it.
pub const SETTLE_GRACE_MINUTES: i64 = 5;

/// Input for a new payment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewPayment {
    /// Payer, who must own the booking
    pub user_id: UserId,
    /// Booking to pay for
    pub booking_id: BookingId,
    /// Must equal the booking total
    pub amount: Money,
    /// Payment method
    pub method: PaymentMethod,
}

/// Result of uploading a payment proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProofOutcome {
    /// The payment, `paid` or `refunded`
    pub payment: Payment,
    /// The booking, `PAID` or `CANCELLED`
    pub booking: Booking,
    /// Loyalty coupon earned by this payment
    pub reward: Option<Coupon>,
}

/// Environment dependencies for the payment manager
#[derive(Clone)]
pub struct PaymentEnvironment {
    /// Clock for deadlines and timestamps
    pub clock: Arc<dyn Clock>,
    /// How long a pending payment may be cancelled by its owner
    pub cancel_window: Duration,
    /// How long a payment may wait for proof
    pub payment_expiry: Duration,
}

impl PaymentEnvironment {
    /// Creates a new `PaymentEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, cancel_window: Duration, payment_expiry: Duration) -> Self {
        Self {
            clock,
            cancel_window,
            payment_expiry,
        }
    }
}

/// Payment manager component.
#[derive(Clone)]
pub struct PaymentManager {
    store: Arc<dyn PaymentStore>,
    bookings: BookingManager,
    loyalty: LoyaltyEngine,
    env: PaymentEnvironment,
}

impl PaymentManager {
    /// Creates the manager
    #[must_use]
    pub fn new(
        store: Arc<dyn PaymentStore>,
        bookings: BookingManager,
        loyalty: LoyaltyEngine,
        env: PaymentEnvironment,
    ) -> Self {
        Self {
            store,
            bookings,
            loyalty,
            env,
        }
    }

    /// Creates a pending payment for a pending booking.
    ///
    /// # Errors
    ///
    /// - `NOT_FOUND` / `FORBIDDEN` when the booking is missing or not the user's
    /// - `ILLEGAL_STATE` when the booking is not pending or already has an
    ///   active payment
    /// - `BAD_INPUT` when the amount differs from the booking total
    pub async fn create(&self, input: NewPayment) -> Result<Payment> {
        let booking = self.bookings.get_owned(input.user_id, input.booking_id).await?;
        if booking.status != BookingStatus::Pending {
            return Err(Error::IllegalState(format!(
                "booking {} is {}, not PENDING",
                booking.id, booking.status
            )));
        }
        if input.amount != booking.total_price {
            return Err(Error::BadInput(format!(
                "payment amount {} does not match booking total {}",
                input.amount, booking.total_price
            )));
        }

        let now = self.env.clock.now();
        let payment = Payment {
            id: PaymentId::new(),
            user_id: input.user_id,
            booking_id: booking.id,
            amount: input.amount,
            method: input.method,
            status: PaymentStatus::Pending,
            proof: None,
            created_at: now,
            updated_at: now,
        };
        self.store.insert(&payment).await?;

        metrics::record_payment("pending");
        tracing::info!(
            payment_id = %payment.id,
            booking_id = %payment.booking_id,
            amount = %payment.amount,
            method = payment.method.as_str(),
            "Payment created"
        );
        Ok(payment)
    }

    /// Attaches proof to a pending payment, which approves it, then confirms
    /// the booking. A booking that lost its seats gets its payment refunded.
    ///
    /// When a step after the approval fails, the payment stays `paid` and
    /// unsettled; [`settle_stalled`](Self::settle_stalled) finishes it.
    ///
    /// # Errors
    ///
    /// - `NOT_FOUND` / `FORBIDDEN` for a missing or foreign payment
    /// - `BAD_INPUT` for an empty or oversized proof
    /// - `ILLEGAL_STATE` when the payment is not pending
    pub async fn upload_proof(
        &self,
        user_id: UserId,
        payment_id: PaymentId,
        proof: &str,
    ) -> Result<ProofOutcome> {
        let payment = self.get_owned(user_id, payment_id).await?;
        if proof.trim().is_empty() {
            return Err(Error::BadInput("payment proof is empty".into()));
        }
        if proof.len() > MAX_PROOF_BYTES {
            return Err(Error::BadInput(format!(
                "payment proof exceeds {MAX_PROOF_BYTES} bytes"
            )));
        }

        let now = self.env.clock.now();
        let paid = self
            .store
            .attach_proof(payment.id, proof, now)
            .await?
            .ok_or_else(|| not_pending(&payment))?;
        metrics::record_payment("paid");
        tracing::info!(payment_id = %paid.id, booking_id = %paid.booking_id, "Payment proof accepted");

        self.settle(paid).await
    }

    /// Finishes a `paid` or `refunded` payment: confirms its booking, counts
    /// it toward loyalty or refunds it, then marks it settled. Every step is
    /// idempotent, so a payment left half-way by a failure can be settled
    /// again.
    async fn settle(&self, payment: Payment) -> Result<ProofOutcome> {
        let outcome = match payment.status {
            PaymentStatus::Paid => match self.bookings.confirm(payment.booking_id).await? {
                ConfirmOutcome::Confirmed(booking) => {
                    let tally = self.loyalty.record_payment(payment.user_id, payment.id).await?;
                    if tally.counted {
                        metrics::record_revenue(payment.amount.cents());
                    }
                    ProofOutcome {
                        payment,
                        booking,
                        reward: tally.reward,
                    }
                }
                ConfirmOutcome::ReservationLost { booking, seats } => {
                    tracing::warn!(
                        payment_id = %payment.id,
                        booking_id = %booking.id,
                        lost = ?seats,
                        "Seats lost after payment, refunding"
                    );
                    let refunded = self.refund(&payment).await?;
                    ProofOutcome {
                        payment: refunded,
                        booking,
                        reward: None,
                    }
                }
            },
            PaymentStatus::Refunded => {
                self.loyalty
                    .record_refund(payment.user_id, payment.id)
                    .await?;
                let booking = self.bookings.get(payment.booking_id).await?;
                ProofOutcome {
                    payment,
                    booking,
                    reward: None,
                }
            }
            _ => return Err(not_pending(&payment)),
        };

        self.store
            .mark_settled(outcome.payment.id, self.env.clock.now())
            .await?;
        Ok(outcome)
    }

    /// Settles payments that were approved or refunded at least
    /// [`SETTLE_GRACE_MINUTES`] before `now` but never finished, for example
    /// because confirming the booking failed.
    ///
    /// Failures are logged and retried on the next pass.
    ///
    /// # Errors
    ///
    /// Returns error if listing the payments fails.
    pub async fn settle_stalled(&self, now: DateTime<Utc>) -> Result<Vec<ProofOutcome>> {
        let cutoff = now - Duration::minutes(SETTLE_GRACE_MINUTES);
        let mut settled = Vec::new();
        for payment in self.store.unsettled(cutoff).await? {
            let payment_id = payment.id;
            match self.settle(payment).await {
                Ok(outcome) => {
                    tracing::info!(
                        payment_id = %payment_id,
                        status = %outcome.payment.status,
                        booking_status = %outcome.booking.status,
                        "Stalled payment settled"
                    );
                    settled.push(outcome);
                }
                Err(err) => tracing::error!(
                    payment_id = %payment_id,
                    error = %err,
                    "Failed to settle payment"
                ),
            }
        }
        Ok(settled)
    }

    /// Refunds a paid payment whose booking could not be confirmed.
    async fn refund(&self, payment: &Payment) -> Result<Payment> {
        let now = self.env.clock.now();
        let refunded = self
            .store
            .transition(payment.id, PaymentStatus::Paid, PaymentStatus::Refunded, now)
            .await?
            .ok_or_else(|| {
                Error::IllegalState(format!("payment {} is no longer paid", payment.id))
            })?;
        self.loyalty
            .record_refund(refunded.user_id, refunded.id)
            .await?;
        metrics::record_refund(refunded.amount.cents());
        tracing::info!(payment_id = %refunded.id, amount = %refunded.amount, "Payment refunded");
        Ok(refunded)
    }

    /// Cancels the user's pending payment inside the cancellation window and
    /// cancels its booking.
    ///
    /// # Errors
    ///
    /// - `NOT_FOUND` / `FORBIDDEN` for a missing or foreign payment
    /// - `ILLEGAL_STATE` when the payment is not pending
    /// - `CANCEL_WINDOW_EXPIRED` once the window has passed
    pub async fn cancel(&self, user_id: UserId, payment_id: PaymentId) -> Result<Payment> {
        let payment = self.get_owned(user_id, payment_id).await?;
        if payment.status != PaymentStatus::Pending {
            return Err(not_pending(&payment));
        }
        let now = self.env.clock.now();
        if now - payment.created_at >= self.env.cancel_window {
            return Err(Error::CancelWindowExpired {
                payment_id: payment.id.to_string(),
            });
        }

        let cancelled = self
            .store
            .transition(payment.id, PaymentStatus::Pending, PaymentStatus::Cancelled, now)
            .await?
            .ok_or_else(|| not_pending(&payment))?;
        metrics::record_payment("cancelled");
        tracing::info!(payment_id = %cancelled.id, "Payment cancelled by user");

        self.bookings
            .cancel(cancelled.booking_id, CancelReason::PaymentCancelled)
            .await?;
        Ok(cancelled)
    }

    /// Cancels the pending payment of a booking that was cancelled.
    ///
    /// Returns the voided payment, or `None` when there was none.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn void_for_booking(&self, booking_id: BookingId) -> Result<Option<Payment>> {
        let now = self.env.clock.now();
        for payment in self.store.for_booking(booking_id).await? {
            if payment.status != PaymentStatus::Pending {
                continue;
            }
            if let Some(voided) = self
                .store
                .transition(payment.id, PaymentStatus::Pending, PaymentStatus::Cancelled, now)
                .await?
            {
                metrics::record_payment("cancelled");
                tracing::info!(payment_id = %voided.id, booking_id = %booking_id, "Payment voided");
                return Ok(Some(voided));
            }
        }
        Ok(None)
    }

    /// Fails pending payments that waited longer than the expiry without
    /// proof and cancels their bookings.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<Vec<Payment>> {
        let failed = self
            .store
            .fail_stale(now - self.env.payment_expiry, now)
            .await?;
        for payment in &failed {
            metrics::record_payment("failed");
            tracing::info!(
                payment_id = %payment.id,
                booking_id = %payment.booking_id,
                "Payment expired without proof"
            );
            if let Err(err) = self
                .bookings
                .cancel(payment.booking_id, CancelReason::PaymentExpired)
                .await
            {
                tracing::error!(
                    booking_id = %payment.booking_id,
                    error = %err,
                    "Failed to cancel booking of expired payment"
                );
            }
        }
        Ok(failed)
    }

    /// Loads a payment.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` for an unknown payment.
    pub async fn get(&self, id: PaymentId) -> Result<Payment> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found("payment", id))
    }

    /// Loads a payment made by `user_id`.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` for an unknown payment, `FORBIDDEN` for someone else's.
    pub async fn get_owned(&self, user_id: UserId, id: PaymentId) -> Result<Payment> {
        let payment = self.get(id).await?;
        if payment.user_id != user_id {
            return Err(Error::Forbidden(format!("payment {id} belongs to another user")));
        }
        Ok(payment)
    }

    /// A user's payments, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn for_user(&self, user_id: UserId) -> Result<Vec<Payment>> {
        self.store.for_user(user_id).await
    }

    /// Every payment, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn all(&self) -> Result<Vec<Payment>> {
        self.store.all().await
    }
}

fn not_pending(payment: &Payment) -> Error {
    Error::IllegalState(format!(
        "payment {} is {}, not pending",
        payment.id, payment.status
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::aggregates::booking::{BookingEnvironment, NewBooking};
    use crate::aggregates::inventory::{InventoryEnvironment, SeatInventory};
    use crate::aggregates::loyalty::{LoyaltyEnvironment, LoyaltyPolicy};
    use crate::config::LoyaltyConfig;
    use crate::stores::{
        InMemoryBookingStore, InMemoryLoyaltyStore, InMemoryPaymentStore, InMemorySeatStore,
    };
    use crate::types::{NewShowtime, SeatLayout};
    use cinema_core::{AuditoriumId, MovieId, ShowtimeId};
    use cinema_testing::ManualClock;

    struct Fixture {
        clock: ManualClock,
        bookings: BookingManager,
        payments: PaymentManager,
        showtime: ShowtimeId,
    }

    async fn fixture() -> Fixture {
        let clock = ManualClock::new(cinema_testing::test_clock_start());
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());
        let inventory = SeatInventory::new(
            Arc::new(InMemorySeatStore::new()),
            InventoryEnvironment::new(shared.clone()),
        );
        let loyalty = LoyaltyEngine::new(
            Arc::new(InMemoryLoyaltyStore::new()),
            LoyaltyPolicy::new(LoyaltyConfig::default()),
            LoyaltyEnvironment::new(shared.clone()),
        );
        let bookings = BookingManager::new(
            Arc::new(InMemoryBookingStore::new()),
            inventory.clone(),
            loyalty.clone(),
            BookingEnvironment::new(shared.clone(), Duration::hours(24)),
        );
        let payments = PaymentManager::new(
            Arc::new(InMemoryPaymentStore::new()),
            bookings.clone(),
            loyalty,
            PaymentEnvironment::new(shared, Duration::hours(2), Duration::hours(24)),
        );
        let showtime = inventory
            .publish_showtime(
                NewShowtime {
                    movie_id: MovieId::new(1),
                    auditorium_id: AuditoriumId::new(1),
                    start_time: clock.now() + Duration::days(1),
                    unit_price: Money::from_dollars(10),
                },
                &SeatLayout::Explicit(vec!["A1".into(), "A2".into(), "A3".into()]),
            )
            .await
            .unwrap()
            .id;
        Fixture {
            clock,
            bookings,
            payments,
            showtime,
        }
    }

    async fn booked(f: &Fixture, seat: &str) -> (Booking, Payment) {
        let booking = f
            .bookings
            .create(NewBooking {
                user_id: UserId::new(5),
                showtime_id: f.showtime,
                seat_numbers: vec![seat.to_string()],
                coupon_code: None,
            })
            .await
            .unwrap();
        let payment = f
            .payments
            .create(NewPayment {
                user_id: UserId::new(5),
                booking_id: booking.id,
                amount: booking.total_price,
                method: PaymentMethod::BankTransfer,
            })
            .await
            .unwrap();
        (booking, payment)
    }

    #[tokio::test]
    async fn amount_must_match_and_one_active_payment_per_booking() {
        let f = fixture().await;
        let (booking, _) = booked(&f, "A1").await;

        let err = f
            .payments
            .create(NewPayment {
                user_id: UserId::new(5),
                booking_id: booking.id,
                amount: booking.total_price,
                method: PaymentMethod::CreditCard,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ILLEGAL_STATE");

        let (other, _) = booked(&f, "A2").await;
        f.payments.void_for_booking(other.id).await.unwrap();
        let err = f
            .payments
            .create(NewPayment {
                user_id: UserId::new(5),
                booking_id: other.id,
                amount: Money::from_dollars(1),
                method: PaymentMethod::CreditCard,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BAD_INPUT");
    }

    #[tokio::test]
    async fn proof_upload_pays_booking() {
        let f = fixture().await;
        let (_, payment) = booked(&f, "A1").await;

        let outcome = f
            .payments
            .upload_proof(UserId::new(5), payment.id, "receipt-001")
            .await
            .unwrap();
        assert_eq!(outcome.payment.status, PaymentStatus::Paid);
        assert_eq!(outcome.booking.status, BookingStatus::Paid);
        assert!(outcome.reward.is_none());

        let err = f
            .payments
            .upload_proof(UserId::new(5), payment.id, "again")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ILLEGAL_STATE");
    }

    #[tokio::test]
    async fn proofs_are_owner_only_and_bounded() {
        let f = fixture().await;
        let (_, payment) = booked(&f, "A1").await;

        let err = f
            .payments
            .upload_proof(UserId::new(6), payment.id, "receipt")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");

        let err = f
            .payments
            .upload_proof(UserId::new(5), payment.id, "  ")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BAD_INPUT");
    }

    #[tokio::test]
    async fn cancel_window_is_two_hours() {
        let f = fixture().await;
        let (booking, payment) = booked(&f, "A1").await;

        f.clock.advance(Duration::hours(3));
        let err = f.payments.cancel(UserId::new(5), payment.id).await.unwrap_err();
        assert_eq!(err.code(), "CANCEL_WINDOW_EXPIRED");

        let (booking2, payment2) = booked(&f, "A2").await;
        f.clock.advance(Duration::minutes(30));
        let cancelled = f.payments.cancel(UserId::new(5), payment2.id).await.unwrap();
        assert_eq!(cancelled.status, PaymentStatus::Cancelled);
        assert_eq!(
            f.bookings.get(booking2.id).await.unwrap().status,
            BookingStatus::Cancelled
        );
        assert_eq!(
            f.bookings.get(booking.id).await.unwrap().status,
            BookingStatus::Pending
        );
    }

    #[tokio::test]
    async fn stale_payments_fail_and_cancel_their_booking() {
        let f = fixture().await;
        let (booking, payment) = booked(&f, "A3").await;

        f.clock.advance(Duration::hours(24) + Duration::seconds(1));
        let failed = f.payments.expire_stale(f.clock.now()).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(f.payments.get(payment.id).await.unwrap().status, PaymentStatus::Failed);
        assert_eq!(
            f.bookings.get(booking.id).await.unwrap().status,
            BookingStatus::Cancelled
        );
        assert!(f.payments.expire_stale(f.clock.now()).await.unwrap().is_empty());
    }
}
