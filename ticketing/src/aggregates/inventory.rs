//! Seat inventory: showtimes and the per-seat state machine.
//!
//! The inventory is the only component that writes seat state. Bookings hold
//! seats through [`SeatInventory::reserve`] under their own id; the
//! reservation sweep hands expired holds back to the booking manager.

use crate::metrics;
use crate::providers::SeatStore;
use crate::types::{ExpiredHold, NewShowtime, SeatLayout, SeatNumber, SeatStatus, Showtime, seat_labels};
use chrono::{DateTime, Duration, Utc};
use cinema_core::{BookingId, Clock, Error, Result, ShowtimeId};
use std::sync::Arc;

/// Environment dependencies for the seat inventory
#[derive(Clone)]
pub struct InventoryEnvironment {
    /// Clock for hold expiry and timestamps
    pub clock: Arc<dyn Clock>,
}

impl InventoryEnvironment {
    /// Creates a new `InventoryEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// Seat inventory component.
#[derive(Clone)]
pub struct SeatInventory {
    store: Arc<dyn SeatStore>,
    env: InventoryEnvironment,
}

impl SeatInventory {
    /// Creates the inventory over `store`
    #[must_use]
    pub fn new(store: Arc<dyn SeatStore>, env: InventoryEnvironment) -> Self {
        Self { store, env }
    }

    /// Publishes a showtime with one `AVAILABLE` seat per layout seat.
    ///
    /// # Errors
    ///
    /// `BAD_INPUT` for an invalid layout; storage errors otherwise.
    pub async fn publish_showtime(
        &self,
        showtime: NewShowtime,
        layout: &SeatLayout,
    ) -> Result<Showtime> {
        let seats = layout.seat_numbers()?;
        let created = self
            .store
            .insert_showtime(showtime, &seats, self.env.clock.now())
            .await?;

        tracing::info!(
            showtime_id = %created.id,
            movie_id = %created.movie_id,
            seats = seats.len(),
            "Showtime published"
        );
        Ok(created)
    }

    /// Loads a showtime.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` when it does not exist.
    pub async fn showtime(&self, id: ShowtimeId) -> Result<Showtime> {
        self.store
            .showtime(id)
            .await?
            .ok_or_else(|| Error::not_found("showtime", id))
    }

    /// All showtimes by start time.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn showtimes(&self) -> Result<Vec<Showtime>> {
        self.store.showtimes().await
    }

    /// Every seat of a showtime with its state.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` for an unknown showtime.
    pub async fn seat_map(&self, showtime_id: ShowtimeId) -> Result<Vec<SeatStatus>> {
        self.showtime(showtime_id).await?;
        self.store.seats(showtime_id).await
    }

    /// Deletes a showtime that has no held seats.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` for an unknown showtime, `ILLEGAL_STATE` while seats are
    /// reserved or booked.
    pub async fn delete_showtime(&self, id: ShowtimeId) -> Result<()> {
        if !self.store.delete_showtime(id).await? {
            return Err(Error::not_found("showtime", id));
        }
        tracing::info!(showtime_id = %id, "Showtime deleted");
        Ok(())
    }

    /// Reserves every seat for `booking_id` for `ttl`, or none.
    ///
    /// Returns the hold expiry.
    ///
    /// # Errors
    ///
    /// - `NOT_FOUND` for an unknown showtime
    /// - `BAD_INPUT` for seats the showtime does not have
    /// - `SEATS_UNAVAILABLE` listing every taken seat
    pub async fn reserve(
        &self,
        showtime_id: ShowtimeId,
        seats: &[SeatNumber],
        booking_id: BookingId,
        ttl: Duration,
    ) -> Result<DateTime<Utc>> {
        self.showtime(showtime_id).await?;
        let until = self.env.clock.now() + ttl;

        match self.store.reserve(showtime_id, seats, booking_id, until).await {
            Ok(()) => {
                metrics::record_seats("reserved", seats.len());
                tracing::debug!(
                    showtime_id = %showtime_id,
                    booking_id = %booking_id,
                    seats = ?seat_labels(seats),
                    until = %until,
                    "Seats reserved"
                );
                Ok(until)
            }
            Err(err @ Error::SeatsUnavailable { .. }) => {
                metrics::record_seat_conflict();
                tracing::info!(
                    showtime_id = %showtime_id,
                    booking_id = %booking_id,
                    taken = ?err.seats(),
                    "Reservation rejected"
                );
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Books the seats held by `booking_id`.
    ///
    /// # Errors
    ///
    /// `RESERVATION_LOST` listing seats the booking no longer holds.
    pub async fn confirm(
        &self,
        showtime_id: ShowtimeId,
        seats: &[SeatNumber],
        booking_id: BookingId,
    ) -> Result<()> {
        match self.store.confirm(showtime_id, seats, booking_id).await {
            Ok(()) => {
                metrics::record_seats("booked", seats.len());
                tracing::debug!(booking_id = %booking_id, "Seats booked");
                Ok(())
            }
            Err(err) => {
                if let Error::ReservationLost { seats } = &err {
                    tracing::warn!(booking_id = %booking_id, lost = ?seats, "Reservation lost");
                }
                Err(err)
            }
        }
    }

    /// Returns the booking's seats to availability. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn release(
        &self,
        showtime_id: ShowtimeId,
        seats: &[SeatNumber],
        booking_id: BookingId,
    ) -> Result<Vec<SeatNumber>> {
        let released = self.store.release(showtime_id, seats, booking_id).await?;
        if !released.is_empty() {
            metrics::record_seats("released", released.len());
            tracing::debug!(
                booking_id = %booking_id,
                seats = ?seat_labels(&released),
                "Seats released"
            );
        }
        Ok(released)
    }

    /// Drops holds that expired before `now`, grouped by booking.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<Vec<ExpiredHold>> {
        let expired = self.store.expire_holds(now).await?;
        let seats: usize = expired.iter().map(|hold| hold.seats.len()).sum();
        if seats > 0 {
            metrics::record_seats("expired", seats);
            tracing::info!(bookings = expired.len(), seats, "Expired seat holds released");
        }
        Ok(expired)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::stores::InMemorySeatStore;
    use crate::types::SeatStateKind;
    use cinema_core::{AuditoriumId, Money, MovieId};
    use cinema_testing::ManualClock;

    fn inventory(clock: &ManualClock) -> SeatInventory {
        SeatInventory::new(
            Arc::new(InMemorySeatStore::new()),
            InventoryEnvironment::new(Arc::new(clock.clone())),
        )
    }

    async fn publish(inventory: &SeatInventory, clock: &ManualClock) -> Showtime {
        inventory
            .publish_showtime(
                NewShowtime {
                    movie_id: MovieId::new(1),
                    auditorium_id: AuditoriumId::new(1),
                    start_time: clock.now() + Duration::days(3),
                    unit_price: Money::from_dollars(12),
                },
                &SeatLayout::Grid {
                    rows: vec!["A".into(), "B".into()],
                    seats_per_row: 4,
                },
            )
            .await
            .unwrap()
    }

    fn seats(labels: &[&str]) -> Vec<SeatNumber> {
        labels.iter().map(|l| SeatNumber::parse(l).unwrap()).collect()
    }

    #[tokio::test]
    async fn competing_reservations_have_one_winner() {
        let clock = ManualClock::new(cinema_testing::test_clock_start());
        let inventory = inventory(&clock);
        let showtime = publish(&inventory, &clock).await;

        let first = BookingId::new();
        inventory
            .reserve(showtime.id, &seats(&["A1", "A2"]), first, Duration::hours(24))
            .await
            .unwrap();

        let err = inventory
            .reserve(showtime.id, &seats(&["A2", "A3"]), BookingId::new(), Duration::hours(24))
            .await
            .unwrap_err();
        assert_eq!(err.seats(), Some(&["A2".to_string()][..]));

        let map = inventory.seat_map(showtime.id).await.unwrap();
        let reserved: Vec<&str> = map
            .iter()
            .filter(|s| s.state.kind() == SeatStateKind::Reserved)
            .map(|s| s.seat_number.as_str())
            .collect();
        assert_eq!(reserved, vec!["A1", "A2"]);
    }

    #[tokio::test]
    async fn unknown_showtime_is_not_found() {
        let clock = ManualClock::new(cinema_testing::test_clock_start());
        let inventory = inventory(&clock);
        let err = inventory
            .reserve(ShowtimeId::new(99), &seats(&["A1"]), BookingId::new(), Duration::hours(1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn sweep_releases_only_expired_holds() {
        let clock = ManualClock::new(cinema_testing::test_clock_start());
        let inventory = inventory(&clock);
        let showtime = publish(&inventory, &clock).await;

        let stale = BookingId::new();
        inventory
            .reserve(showtime.id, &seats(&["A1"]), stale, Duration::hours(1))
            .await
            .unwrap();
        let fresh = BookingId::new();
        inventory
            .reserve(showtime.id, &seats(&["B1"]), fresh, Duration::hours(24))
            .await
            .unwrap();

        clock.advance(Duration::hours(2));
        let expired = inventory.sweep(clock.now()).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].booking_id, stale);

        // Running the sweep again finds nothing.
        assert!(inventory.sweep(clock.now()).await.unwrap().is_empty());
    }
}
