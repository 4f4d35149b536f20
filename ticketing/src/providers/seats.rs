//! Seat inventory store trait and the transition planning shared by its
//! implementations.

use crate::types::{
    ExpiredHold, NewShowtime, SeatEvent, SeatNumber, SeatState, SeatStatus, Showtime, seat_labels,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cinema_core::{BookingId, Error, Result, ShowtimeId};

/// Seat inventory store.
///
/// # Implementation Notes
///
/// - `reserve` and `confirm` are all-or-nothing over the requested seats
/// - Implementations serialize concurrent operations touching the same seat
/// - `release` and `expire_holds` are idempotent
#[async_trait]
pub trait SeatStore: Send + Sync {
    /// Creates a showtime with every seat `AVAILABLE` and returns it with its
    /// assigned id.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn insert_showtime(
        &self,
        showtime: NewShowtime,
        seats: &[SeatNumber],
        at: DateTime<Utc>,
    ) -> Result<Showtime>;

    /// Loads a showtime.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn showtime(&self, id: ShowtimeId) -> Result<Option<Showtime>>;

    /// All showtimes ordered by start time.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn showtimes(&self) -> Result<Vec<Showtime>>;

    /// Removes a showtime and its seats.
    ///
    /// Returns `false` if it did not exist.
    ///
    /// # Errors
    ///
    /// `ILLEGAL_STATE` while any seat is reserved or booked.
    async fn delete_showtime(&self, id: ShowtimeId) -> Result<bool>;

    /// Every seat of a showtime, ordered by seat number.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn seats(&self, showtime_id: ShowtimeId) -> Result<Vec<SeatStatus>>;

    /// Reserves all `seats` for `booking_id` until `until`, or none of them.
    ///
    /// # Errors
    ///
    /// - `SEATS_UNAVAILABLE` listing every seat that is not `AVAILABLE`
    /// - `BAD_INPUT` for seats the showtime does not have
    async fn reserve(
        &self,
        showtime_id: ShowtimeId,
        seats: &[SeatNumber],
        booking_id: BookingId,
        until: DateTime<Utc>,
    ) -> Result<()>;

    /// Books all `seats` reserved by `booking_id`, or none of them.
    ///
    /// Seats already booked by the same booking count as confirmed.
    ///
    /// # Errors
    ///
    /// `RESERVATION_LOST` listing every seat no longer held by the booking.
    async fn confirm(
        &self,
        showtime_id: ShowtimeId,
        seats: &[SeatNumber],
        booking_id: BookingId,
    ) -> Result<()>;

    /// Returns the booking's seats among `seats` to `AVAILABLE` and lists the
    /// seats that changed.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn release(
        &self,
        showtime_id: ShowtimeId,
        seats: &[SeatNumber],
        booking_id: BookingId,
    ) -> Result<Vec<SeatNumber>>;

    /// Drops every hold with `reserved_until < now`, grouped by booking.
    ///
    /// # Errors
    ///
    /// Returns error if storage fails.
    async fn expire_holds(&self, now: DateTime<Utc>) -> Result<Vec<ExpiredHold>>;
}

// ============================================================================
// Transition planning
// ============================================================================

/// New states for the requested seats of a reservation.
///
/// `current` looks up a seat's state; `None` means the showtime has no such
/// seat.
///
/// # Errors
///
/// `BAD_INPUT` for unknown seats, otherwise `SEATS_UNAVAILABLE` listing every
/// seat the state machine refuses.
pub fn plan_reserve<F>(
    seats: &[SeatNumber],
    booking_id: BookingId,
    until: DateTime<Utc>,
    current: F,
) -> Result<Vec<(SeatNumber, SeatState)>>
where
    F: Fn(&SeatNumber) -> Option<SeatState>,
{
    let event = SeatEvent::Reserve { booking_id, until };
    let mut unknown = Vec::new();
    let mut taken = Vec::new();
    let mut planned = Vec::with_capacity(seats.len());

    for seat in seats {
        match current(seat) {
            None => unknown.push(seat.clone()),
            Some(state) => match state.apply(seat, event) {
                Ok(next) => planned.push((seat.clone(), next)),
                Err(_) => taken.push(seat.clone()),
            },
        }
    }

    if !unknown.is_empty() {
        return Err(Error::BadInput(format!(
            "unknown seats: {}",
            seat_labels(&unknown).join(", ")
        )));
    }
    if !taken.is_empty() {
        return Err(Error::SeatsUnavailable {
            seats: seat_labels(&taken),
        });
    }
    Ok(planned)
}

/// New states for confirming a booking's seats. Seats already booked by the
/// booking are left out of the plan.
///
/// # Errors
///
/// `RESERVATION_LOST` listing every seat the booking no longer holds.
pub fn plan_confirm<F>(
    seats: &[SeatNumber],
    booking_id: BookingId,
    current: F,
) -> Result<Vec<(SeatNumber, SeatState)>>
where
    F: Fn(&SeatNumber) -> Option<SeatState>,
{
    let event = SeatEvent::Confirm { booking_id };
    let mut lost = Vec::new();
    let mut planned = Vec::with_capacity(seats.len());

    for seat in seats {
        match current(seat) {
            Some(SeatState::Booked { booking_id: owner }) if owner == booking_id => {}
            Some(state) => match state.apply(seat, event) {
                Ok(next) => planned.push((seat.clone(), next)),
                Err(_) => lost.push(seat.clone()),
            },
            None => lost.push(seat.clone()),
        }
    }

    if !lost.is_empty() {
        return Err(Error::ReservationLost {
            seats: seat_labels(&lost),
        });
    }
    Ok(planned)
}

/// Seats among `seats` that `booking_id` still holds and can release.
pub fn plan_release<F>(seats: &[SeatNumber], booking_id: BookingId, current: F) -> Vec<SeatNumber>
where
    F: Fn(&SeatNumber) -> Option<SeatState>,
{
    let event = SeatEvent::Release { booking_id };
    let mut releasable = Vec::new();
    for seat in seats {
        if current(seat).is_some_and(|state| state.apply(seat, event).is_ok()) {
            releasable.push(seat.clone());
        }
    }
    releasable
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn seats(labels: &[&str]) -> Vec<SeatNumber> {
        labels.iter().map(|l| SeatNumber::parse(l).unwrap()).collect()
    }

    fn until() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap()
    }

    #[test]
    fn reserve_reports_every_taken_seat() {
        let other = BookingId::new();
        let mut map = HashMap::new();
        for seat in seats(&["A1", "A2", "A3"]) {
            map.insert(seat, SeatState::Available);
        }
        map.insert(
            SeatNumber::parse("A2").unwrap(),
            SeatState::Booked { booking_id: other },
        );

        let err = plan_reserve(&seats(&["A1", "A2"]), BookingId::new(), until(), |s| {
            map.get(s).cloned()
        })
        .unwrap_err();
        assert_eq!(
            err,
            Error::SeatsUnavailable {
                seats: vec!["A2".into()]
            }
        );

        let err = plan_reserve(&seats(&["Z9"]), BookingId::new(), until(), |s| {
            map.get(s).cloned()
        })
        .unwrap_err();
        assert_eq!(err.code(), "BAD_INPUT");
    }

    #[test]
    fn confirm_skips_seats_already_booked_by_the_same_booking() {
        let booking = BookingId::new();
        let mut map = HashMap::new();
        let [a1, a2] = <[SeatNumber; 2]>::try_from(seats(&["A1", "A2"])).unwrap();
        map.insert(a1.clone(), SeatState::Booked { booking_id: booking });
        map.insert(
            a2.clone(),
            SeatState::Reserved {
                booking_id: booking,
                until: until(),
            },
        );

        let plan = plan_confirm(&[a1, a2.clone()], booking, |s| map.get(s).cloned()).unwrap();
        assert_eq!(plan, vec![(a2, SeatState::Booked { booking_id: booking })]);
    }

    #[test]
    fn confirm_fails_when_the_hold_is_gone() {
        let booking = BookingId::new();
        let a1 = SeatNumber::parse("A1").unwrap();
        let err = plan_confirm(&[a1], booking, |_| Some(SeatState::Available)).unwrap_err();
        assert_eq!(err.code(), "RESERVATION_LOST");
    }

    #[test]
    fn release_only_touches_the_bookings_seats() {
        let booking = BookingId::new();
        let mut map = HashMap::new();
        let [a1, a2, a3] = <[SeatNumber; 3]>::try_from(seats(&["A1", "A2", "A3"])).unwrap();
        map.insert(a1.clone(), SeatState::Booked { booking_id: booking });
        map.insert(
            a2.clone(),
            SeatState::Reserved {
                booking_id: BookingId::new(),
                until: until(),
            },
        );
        map.insert(a3.clone(), SeatState::Available);

        let released = plan_release(&[a1.clone(), a2, a3], booking, |s| map.get(s).cloned());
        assert_eq!(released, vec![a1]);
    }
}
