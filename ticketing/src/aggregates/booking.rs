//! Booking manager: booking lifecycle coupled to seat holds and coupons.
//!
//! ```text
//! PENDING ──confirm──► PAID
//!    │
//!    └──cancel / expire / abort / reservation lost──► CANCELLED
//! ```
//!
//! Every status change is a compare-and-set on the stored status, so a
//! confirmation racing a cancellation or a sweep has exactly one winner.

use crate::aggregates::inventory::SeatInventory;
use crate::aggregates::loyalty::LoyaltyEngine;
use crate::metrics;
use crate::providers::BookingStore;
use crate::types::{Booking, BookingStatus, CancelReason, parse_seat_request, seat_labels};
use chrono::{DateTime, Duration, Utc};
use cinema_core::{BookingId, Clock, Error, Result, ShowtimeId, UserId};
use std::sync::Arc;

/// Input for a new booking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewBooking {
    /// Owner
    pub user_id: UserId,
    /// Showtime to book
    pub showtime_id: ShowtimeId,
    /// Requested seat labels, as sent by the client
    pub seat_numbers: Vec<String>,
    /// Coupon to redeem
    pub coupon_code: Option<String>,
}

/// Result of confirming a booking after payment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Seats booked, booking `PAID`
    Confirmed(Booking),
    /// The hold was gone; the booking is `CANCELLED` and its seats released
    ReservationLost {
        /// The cancelled booking
        booking: Booking,
        /// Seats that were no longer held
        seats: Vec<String>,
    },
}

/// Environment dependencies for the booking manager
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Clock for timestamps and hold expiry
    pub clock: Arc<dyn Clock>,
    /// How long a pending booking holds its seats
    pub reservation_ttl: Duration,
}

impl BookingEnvironment {
    /// Creates a new `BookingEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, reservation_ttl: Duration) -> Self {
        Self {
            clock,
            reservation_ttl,
        }
    }
}

/// Booking manager component.
#[derive(Clone)]
pub struct BookingManager {
    store: Arc<dyn BookingStore>,
    inventory: SeatInventory,
    loyalty: LoyaltyEngine,
    env: BookingEnvironment,
}

impl BookingManager {
    /// Creates the manager
    #[must_use]
    pub fn new(
        store: Arc<dyn BookingStore>,
        inventory: SeatInventory,
        loyalty: LoyaltyEngine,
        env: BookingEnvironment,
    ) -> Self {
        Self {
            store,
            inventory,
            loyalty,
            env,
        }
    }

    /// Creates a `PENDING` booking: seats reserved, coupon redeemed.
    ///
    /// Steps run in order and each later failure undoes the earlier ones:
    /// validate seats and price, quote the coupon, reserve the seats, redeem
    /// the coupon, persist the booking.
    ///
    /// # Errors
    ///
    /// - `BAD_INPUT` for an invalid seat request
    /// - `NOT_FOUND` for an unknown showtime
    /// - `SEATS_UNAVAILABLE` when any seat is taken
    /// - `COUPON_*` when the coupon cannot be used
    pub async fn create(&self, input: NewBooking) -> Result<Booking> {
        let seats = parse_seat_request(&input.seat_numbers)?;
        let showtime = self.inventory.showtime(input.showtime_id).await?;
        let count = u32::try_from(seats.len())
            .map_err(|_| Error::BadInput("too many seats".into()))?;
        let gross = showtime
            .unit_price
            .checked_mul(count)
            .ok_or_else(|| Error::BadInput("booking total overflows".into()))?;

        let coupon_code = input
            .coupon_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
            .map(str::to_string);
        let total = match &coupon_code {
            Some(code) => self.loyalty.quote(input.user_id, code, gross).await?.final_amount,
            None => gross,
        };

        let booking_id = BookingId::new();
        self.inventory
            .reserve(showtime.id, &seats, booking_id, self.env.reservation_ttl)
            .await?;

        if let Some(code) = &coupon_code {
            if let Err(err) = self.loyalty.redeem(input.user_id, code).await {
                self.inventory.release(showtime.id, &seats, booking_id).await?;
                return Err(err);
            }
        }

        let now = self.env.clock.now();
        let booking = Booking {
            id: booking_id,
            user_id: input.user_id,
            showtime_id: showtime.id,
            seat_numbers: seats,
            status: BookingStatus::Pending,
            total_price: total,
            coupon_code,
            created_at: now,
            updated_at: now,
        };

        if let Err(err) = self.store.insert(&booking).await {
            tracing::error!(booking_id = %booking_id, error = %err, "Failed to persist booking");
            self.undo_holds(&booking).await;
            return Err(err);
        }

        metrics::record_booking("created");
        tracing::info!(
            booking_id = %booking.id,
            user_id = %booking.user_id,
            showtime_id = %booking.showtime_id,
            seats = ?seat_labels(&booking.seat_numbers),
            total = %booking.total_price,
            coupon = ?booking.coupon_code,
            "Booking created"
        );
        Ok(booking)
    }

    /// Releases seats and restores the coupon of a booking that could not be
    /// completed. Failures are logged; the sweeps catch leftovers.
    async fn undo_holds(&self, booking: &Booking) {
        if let Err(err) = self
            .inventory
            .release(booking.showtime_id, &booking.seat_numbers, booking.id)
            .await
        {
            tracing::error!(booking_id = %booking.id, error = %err, "Failed to release seats");
        }
        if let Some(code) = &booking.coupon_code {
            if let Err(err) = self.loyalty.restore(booking.user_id, code).await {
                tracing::error!(booking_id = %booking.id, error = %err, "Failed to restore coupon");
            }
        }
    }

    /// Books the seats of a paid booking.
    ///
    /// Confirming a `PAID` booking again returns it unchanged.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` for an unknown booking; storage errors otherwise.
    pub async fn confirm(&self, id: BookingId) -> Result<ConfirmOutcome> {
        let booking = self.get(id).await?;
        match booking.status {
            BookingStatus::Paid => return Ok(ConfirmOutcome::Confirmed(booking)),
            BookingStatus::Cancelled => {
                return Ok(ConfirmOutcome::ReservationLost {
                    seats: seat_labels(&booking.seat_numbers),
                    booking,
                });
            }
            BookingStatus::Pending => {}
        }

        match self
            .inventory
            .confirm(booking.showtime_id, &booking.seat_numbers, booking.id)
            .await
        {
            Ok(()) => {}
            Err(Error::ReservationLost { seats }) => {
                let booking = self
                    .cancel_with(&booking, CancelReason::ReservationLost)
                    .await?;
                return Ok(ConfirmOutcome::ReservationLost { booking, seats });
            }
            Err(err) => return Err(err),
        }

        let now = self.env.clock.now();
        if let Some(paid) = self
            .store
            .transition(id, BookingStatus::Pending, BookingStatus::Paid, now)
            .await?
        {
            metrics::record_booking("paid");
            tracing::info!(booking_id = %id, total = %paid.total_price, "Booking paid");
            return Ok(ConfirmOutcome::Confirmed(paid));
        }

        // Lost the race against a cancellation: the seats go back.
        let current = self.get(id).await?;
        if current.status == BookingStatus::Paid {
            return Ok(ConfirmOutcome::Confirmed(current));
        }
        self.inventory
            .release(current.showtime_id, &current.seat_numbers, current.id)
            .await?;
        tracing::warn!(booking_id = %id, status = %current.status, "Booking changed during confirmation");
        Ok(ConfirmOutcome::ReservationLost {
            seats: seat_labels(&current.seat_numbers),
            booking: current,
        })
    }

    /// Cancels a `PENDING` booking and releases its seats.
    ///
    /// An already cancelled booking is returned unchanged.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` for an unknown booking, `ILLEGAL_STATE` for a paid one.
    pub async fn cancel(&self, id: BookingId, reason: CancelReason) -> Result<Booking> {
        let booking = self.get(id).await?;
        self.cancel_with(&booking, reason).await
    }

    async fn cancel_with(&self, booking: &Booking, reason: CancelReason) -> Result<Booking> {
        match booking.status {
            BookingStatus::Cancelled => return Ok(booking.clone()),
            BookingStatus::Paid => {
                return Err(Error::IllegalState(format!(
                    "booking {} is already paid",
                    booking.id
                )));
            }
            BookingStatus::Pending => {}
        }

        let now = self.env.clock.now();
        let Some(cancelled) = self
            .store
            .transition(booking.id, BookingStatus::Pending, BookingStatus::Cancelled, now)
            .await?
        else {
            // Someone else moved it first; report where it ended up.
            let current = self.get(booking.id).await?;
            return match current.status {
                BookingStatus::Cancelled => Ok(current),
                _ => Err(Error::IllegalState(format!(
                    "booking {} is {}",
                    current.id, current.status
                ))),
            };
        };

        self.inventory
            .release(cancelled.showtime_id, &cancelled.seat_numbers, cancelled.id)
            .await?;
        metrics::record_booking_cancelled(reason.as_str());
        tracing::info!(booking_id = %cancelled.id, reason = reason.as_str(), "Booking cancelled");
        Ok(cancelled)
    }

    /// Compensates a booking whose workflow failed after creation: cancels
    /// it, releases its seats and restores its coupon.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` for an unknown booking, `ILLEGAL_STATE` for a paid one.
    pub async fn abort(&self, id: BookingId) -> Result<Booking> {
        let booking = self.get(id).await?;
        let cancelled = self.cancel_with(&booking, CancelReason::Compensation).await?;
        if let Some(code) = &cancelled.coupon_code {
            self.loyalty.restore(cancelled.user_id, code).await?;
        }
        Ok(cancelled)
    }

    /// Cancels a booking whose seat hold expired. `None` when the booking is
    /// not pending.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn expire(&self, id: BookingId) -> Result<Option<Booking>> {
        let Some(booking) = self.store.get(id).await? else {
            tracing::warn!(booking_id = %id, "Expired hold has no booking");
            return Ok(None);
        };
        if booking.status != BookingStatus::Pending {
            return Ok(None);
        }
        match self.cancel_with(&booking, CancelReason::ReservationExpired).await {
            Ok(cancelled) => Ok(Some(cancelled)),
            Err(Error::IllegalState(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Releases holds that expired before `now` and cancels their bookings.
    ///
    /// Pending bookings older than the reservation TTL are cancelled too,
    /// which catches bookings whose seats an earlier pass released before
    /// failing to cancel them. A booking that fails to cancel is logged and
    /// left for the next pass.
    ///
    /// Returns the bookings cancelled by this pass.
    ///
    /// # Errors
    ///
    /// Returns error if releasing holds or listing bookings fails.
    pub async fn expire_reservations(&self, now: DateTime<Utc>) -> Result<Vec<Booking>> {
        let mut cancelled = Vec::new();
        for hold in self.inventory.sweep(now).await? {
            self.expire_logged(hold.booking_id, &mut cancelled).await;
        }

        let stale = self
            .store
            .pending_created_before(now - self.env.reservation_ttl)
            .await?;
        for booking in stale {
            self.expire_logged(booking.id, &mut cancelled).await;
        }
        Ok(cancelled)
    }

    async fn expire_logged(&self, id: BookingId, cancelled: &mut Vec<Booking>) {
        match self.expire(id).await {
            Ok(Some(booking)) => cancelled.push(booking),
            Ok(None) => {}
            Err(err) => {
                tracing::error!(booking_id = %id, error = %err, "Failed to expire booking");
            }
        }
    }

    /// Loads a booking.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` for an unknown booking.
    pub async fn get(&self, id: BookingId) -> Result<Booking> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| Error::not_found("booking", id))
    }

    /// Loads a booking owned by `user_id`.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` for an unknown booking, `FORBIDDEN` for someone else's.
    pub async fn get_owned(&self, user_id: UserId, id: BookingId) -> Result<Booking> {
        let booking = self.get(id).await?;
        if booking.user_id != user_id {
            return Err(Error::Forbidden(format!("booking {id} belongs to another user")));
        }
        Ok(booking)
    }

    /// A user's bookings, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn for_user(&self, user_id: UserId) -> Result<Vec<Booking>> {
        self.store.for_user(user_id).await
    }

    /// Every booking, newest first.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn all(&self) -> Result<Vec<Booking>> {
        self.store.all().await
    }
}
