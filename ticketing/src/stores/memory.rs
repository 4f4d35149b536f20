//! In-memory stores.
//!
//! Each store keeps its tables behind one `tokio::sync::Mutex`; every trait
//! method takes the lock once and validates before mutating, so an operation
//! either applies completely or not at all. Used by tests and by
//! `STORAGE_BACKEND=memory`.

use crate::providers::{
    BookingStore, LoyaltyStore, PaymentStore, PaymentTally, Probe, REWARD_CODE_ATTEMPTS, RewardFn,
    SeatStore, reward_codes_exhausted,
    seats::{plan_confirm, plan_release, plan_reserve},
};
use crate::types::{
    Booking, BookingStatus, Coupon, CouponDeactivation, CouponPatch, ExpiredHold, NewShowtime,
    Payment, PaymentStatus, SeatNumber, SeatState, SeatStatus, Showtime, UserPaymentCount,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cinema_core::{BookingId, CouponId, Error, PaymentId, Result, ShowtimeId, UserId};
use std::collections::{BTreeMap, HashMap, HashSet};
use tokio::sync::Mutex;

// ============================================================================
// Seats
// ============================================================================

#[derive(Default)]
struct SeatTables {
    next_showtime_id: i64,
    showtimes: BTreeMap<ShowtimeId, Showtime>,
    seats: HashMap<ShowtimeId, BTreeMap<SeatNumber, SeatState>>,
}

/// In-memory [`SeatStore`].
#[derive(Default)]
pub struct InMemorySeatStore {
    tables: Mutex<SeatTables>,
}

impl InMemorySeatStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SeatStore for InMemorySeatStore {
    async fn insert_showtime(
        &self,
        showtime: NewShowtime,
        seats: &[SeatNumber],
        at: DateTime<Utc>,
    ) -> Result<Showtime> {
        let mut tables = self.tables.lock().await;
        tables.next_showtime_id += 1;
        let id = ShowtimeId::new(tables.next_showtime_id);
        let created = Showtime {
            id,
            movie_id: showtime.movie_id,
            auditorium_id: showtime.auditorium_id,
            start_time: showtime.start_time,
            unit_price: showtime.unit_price,
            created_at: at,
        };
        tables.showtimes.insert(id, created.clone());
        tables.seats.insert(
            id,
            seats
                .iter()
                .map(|seat| (seat.clone(), SeatState::Available))
                .collect(),
        );
        Ok(created)
    }

    async fn showtime(&self, id: ShowtimeId) -> Result<Option<Showtime>> {
        Ok(self.tables.lock().await.showtimes.get(&id).cloned())
    }

    async fn showtimes(&self) -> Result<Vec<Showtime>> {
        let tables = self.tables.lock().await;
        let mut showtimes: Vec<Showtime> = tables.showtimes.values().cloned().collect();
        showtimes.sort_by_key(|s| (s.start_time, s.id));
        Ok(showtimes)
    }

    async fn delete_showtime(&self, id: ShowtimeId) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        if !tables.showtimes.contains_key(&id) {
            return Ok(false);
        }
        let held = tables
            .seats
            .get(&id)
            .is_some_and(|seats| seats.values().any(|s| s.booking_id().is_some()));
        if held {
            return Err(Error::IllegalState(format!(
                "showtime {id} has reserved or booked seats"
            )));
        }
        tables.showtimes.remove(&id);
        tables.seats.remove(&id);
        Ok(true)
    }

    async fn seats(&self, showtime_id: ShowtimeId) -> Result<Vec<SeatStatus>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .seats
            .get(&showtime_id)
            .map(|seats| {
                seats
                    .iter()
                    .map(|(seat_number, state)| SeatStatus {
                        showtime_id,
                        seat_number: seat_number.clone(),
                        state: state.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn reserve(
        &self,
        showtime_id: ShowtimeId,
        seats: &[SeatNumber],
        booking_id: BookingId,
        until: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let map = tables
            .seats
            .get_mut(&showtime_id)
            .ok_or_else(|| Error::not_found("showtime", showtime_id))?;
        let plan = plan_reserve(seats, booking_id, until, |s| map.get(s).cloned())?;
        map.extend(plan);
        Ok(())
    }

    async fn confirm(
        &self,
        showtime_id: ShowtimeId,
        seats: &[SeatNumber],
        booking_id: BookingId,
    ) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let map = tables
            .seats
            .get_mut(&showtime_id)
            .ok_or_else(|| Error::not_found("showtime", showtime_id))?;
        let plan = plan_confirm(seats, booking_id, |s| map.get(s).cloned())?;
        map.extend(plan);
        Ok(())
    }

    async fn release(
        &self,
        showtime_id: ShowtimeId,
        seats: &[SeatNumber],
        booking_id: BookingId,
    ) -> Result<Vec<SeatNumber>> {
        let mut tables = self.tables.lock().await;
        let Some(map) = tables.seats.get_mut(&showtime_id) else {
            return Ok(Vec::new());
        };
        let released = plan_release(seats, booking_id, |s| map.get(s).cloned());
        for seat in &released {
            map.insert(seat.clone(), SeatState::Available);
        }
        Ok(released)
    }

    async fn expire_holds(&self, now: DateTime<Utc>) -> Result<Vec<ExpiredHold>> {
        let mut tables = self.tables.lock().await;
        let mut groups: BTreeMap<(ShowtimeId, BookingId), Vec<SeatNumber>> = BTreeMap::new();

        for (showtime_id, seats) in &mut tables.seats {
            for (seat, state) in seats.iter_mut() {
                if let SeatState::Reserved { booking_id, until } = state {
                    if *until < now {
                        groups
                            .entry((*showtime_id, *booking_id))
                            .or_default()
                            .push(seat.clone());
                        *state = SeatState::Available;
                    }
                }
            }
        }

        Ok(groups
            .into_iter()
            .map(|((showtime_id, booking_id), seats)| ExpiredHold {
                showtime_id,
                booking_id,
                seats,
            })
            .collect())
    }
}

// ============================================================================
// Bookings
// ============================================================================

/// In-memory [`BookingStore`].
#[derive(Default)]
pub struct InMemoryBookingStore {
    bookings: Mutex<HashMap<BookingId, Booking>>,
}

impl InMemoryBookingStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T, K: Ord>(mut rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    rows.sort_by_key(|row| std::cmp::Reverse(key(row)));
    rows
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<()> {
        let mut bookings = self.bookings.lock().await;
        if bookings.contains_key(&booking.id) {
            return Err(Error::internal(format!("booking {} already exists", booking.id)));
        }
        bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>> {
        Ok(self.bookings.lock().await.get(&id).cloned())
    }

    async fn for_user(&self, user_id: UserId) -> Result<Vec<Booking>> {
        let bookings = self.bookings.lock().await;
        let rows = bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |b: &Booking| (b.created_at, b.id)))
    }

    async fn all(&self) -> Result<Vec<Booking>> {
        let rows = self.bookings.lock().await.values().cloned().collect();
        Ok(newest_first(rows, |b: &Booking| (b.created_at, b.id)))
    }

    async fn transition(
        &self,
        id: BookingId,
        from: BookingStatus,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Booking>> {
        let mut bookings = self.bookings.lock().await;
        match bookings.get_mut(&id) {
            Some(booking) if booking.status == from => {
                booking.status = to;
                booking.updated_at = at;
                Ok(Some(booking.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn pending_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Booking>> {
        let bookings = self.bookings.lock().await;
        let mut rows: Vec<Booking> = bookings
            .values()
            .filter(|b| b.status == BookingStatus::Pending && b.created_at < cutoff)
            .cloned()
            .collect();
        rows.sort_by_key(|b| (b.created_at, b.id));
        Ok(rows)
    }
}

// ============================================================================
// Payments
// ============================================================================

/// In-memory [`PaymentStore`].
#[derive(Default)]
pub struct InMemoryPaymentStore {
    payments: Mutex<HashMap<PaymentId, Payment>>,
    // Locked after `payments` when both are needed.
    settled: Mutex<HashSet<PaymentId>>,
}

impl InMemoryPaymentStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, payment: &Payment) -> Result<()> {
        let mut payments = self.payments.lock().await;
        let active = payments
            .values()
            .any(|p| p.booking_id == payment.booking_id && p.status.is_active());
        if active {
            return Err(Error::IllegalState(format!(
                "booking {} already has an active payment",
                payment.booking_id
            )));
        }
        payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.payments.lock().await.get(&id).cloned())
    }

    async fn for_user(&self, user_id: UserId) -> Result<Vec<Payment>> {
        let payments = self.payments.lock().await;
        let rows = payments
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |p: &Payment| (p.created_at, p.id)))
    }

    async fn for_booking(&self, booking_id: BookingId) -> Result<Vec<Payment>> {
        let payments = self.payments.lock().await;
        let rows = payments
            .values()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |p: &Payment| (p.created_at, p.id)))
    }

    async fn all(&self) -> Result<Vec<Payment>> {
        let rows = self.payments.lock().await.values().cloned().collect();
        Ok(newest_first(rows, |p: &Payment| (p.created_at, p.id)))
    }

    async fn transition(
        &self,
        id: PaymentId,
        from: PaymentStatus,
        to: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Payment>> {
        let mut payments = self.payments.lock().await;
        match payments.get_mut(&id) {
            Some(payment) if payment.status == from => {
                payment.status = to;
                payment.updated_at = at;
                Ok(Some(payment.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn attach_proof(
        &self,
        id: PaymentId,
        proof: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Payment>> {
        let mut payments = self.payments.lock().await;
        match payments.get_mut(&id) {
            Some(payment) if payment.status == PaymentStatus::Pending => {
                payment.proof = Some(proof.to_string());
                payment.status = PaymentStatus::Paid;
                payment.updated_at = at;
                Ok(Some(payment.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn fail_stale(&self, cutoff: DateTime<Utc>, at: DateTime<Utc>) -> Result<Vec<Payment>> {
        let mut payments = self.payments.lock().await;
        let mut failed = Vec::new();
        for payment in payments.values_mut() {
            if payment.status == PaymentStatus::Pending
                && payment.proof.is_none()
                && payment.created_at < cutoff
            {
                payment.status = PaymentStatus::Failed;
                payment.updated_at = at;
                failed.push(payment.clone());
            }
        }
        failed.sort_by_key(|p| (p.created_at, p.id));
        Ok(failed)
    }

    async fn mark_settled(&self, id: PaymentId, _at: DateTime<Utc>) -> Result<()> {
        self.settled.lock().await.insert(id);
        Ok(())
    }

    async fn unsettled(&self, cutoff: DateTime<Utc>) -> Result<Vec<Payment>> {
        let payments = self.payments.lock().await;
        let settled = self.settled.lock().await;
        let mut rows: Vec<Payment> = payments
            .values()
            .filter(|p| matches!(p.status, PaymentStatus::Paid | PaymentStatus::Refunded))
            .filter(|p| p.updated_at < cutoff && !settled.contains(&p.id))
            .cloned()
            .collect();
        rows.sort_by_key(|p| (p.updated_at, p.id));
        Ok(rows)
    }
}

// ============================================================================
// Loyalty & coupons
// ============================================================================

struct LedgerEntry {
    user_id: UserId,
    refunded: bool,
}

#[derive(Default)]
struct LoyaltyTables {
    counts: HashMap<UserId, UserPaymentCount>,
    ledger: HashMap<PaymentId, LedgerEntry>,
    coupons: HashMap<CouponId, Coupon>,
    codes: HashMap<String, CouponId>,
    usages: HashMap<(UserId, CouponId), DateTime<Utc>>,
}

impl LoyaltyTables {
    fn progress(&self, user_id: UserId) -> UserPaymentCount {
        self.counts
            .get(&user_id)
            .copied()
            .unwrap_or_else(|| UserPaymentCount::zero(user_id))
    }

    fn insert_coupon(&mut self, coupon: &Coupon) -> Result<()> {
        if self.codes.contains_key(&coupon.code) {
            return Err(Error::BadInput(format!(
                "coupon code {} already exists",
                coupon.code
            )));
        }
        self.codes.insert(coupon.code.clone(), coupon.id);
        self.coupons.insert(coupon.id, coupon.clone());
        Ok(())
    }
}

/// In-memory [`LoyaltyStore`].
#[derive(Default)]
pub struct InMemoryLoyaltyStore {
    tables: Mutex<LoyaltyTables>,
}

impl InMemoryLoyaltyStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LoyaltyStore for InMemoryLoyaltyStore {
    async fn record_payment(
        &self,
        user_id: UserId,
        payment_id: PaymentId,
        _at: DateTime<Utc>,
        reward: &RewardFn,
    ) -> Result<PaymentTally> {
        let mut tables = self.tables.lock().await;
        if tables.ledger.contains_key(&payment_id) {
            return Ok(PaymentTally {
                counted: false,
                progress: tables.progress(user_id),
                reward: None,
            });
        }

        let mut progress = tables.progress(user_id);
        progress.payment_count = progress.payment_count.saturating_add(1);

        let mut issued = None;
        for _ in 0..REWARD_CODE_ATTEMPTS {
            match reward(&progress) {
                Some((_, coupon)) if tables.codes.contains_key(&coupon.code) => {}
                drawn => {
                    issued = Some(drawn);
                    break;
                }
            }
        }
        let issued = issued.ok_or_else(|| reward_codes_exhausted(user_id))?;
        if let Some((milestone, coupon)) = &issued {
            tables.insert_coupon(coupon)?;
            progress.last_coupon_milestone = *milestone;
        }

        tables.ledger.insert(
            payment_id,
            LedgerEntry {
                user_id,
                refunded: false,
            },
        );
        tables.counts.insert(user_id, progress);

        Ok(PaymentTally {
            counted: true,
            progress,
            reward: issued.map(|(_, coupon)| coupon),
        })
    }

    async fn record_refund(
        &self,
        user_id: UserId,
        payment_id: PaymentId,
        _at: DateTime<Utc>,
    ) -> Result<Option<UserPaymentCount>> {
        let mut tables = self.tables.lock().await;
        match tables.ledger.get_mut(&payment_id) {
            Some(entry) if entry.user_id == user_id && !entry.refunded => entry.refunded = true,
            _ => return Ok(None),
        }
        let mut progress = tables.progress(user_id);
        progress.payment_count = progress.payment_count.saturating_sub(1);
        tables.counts.insert(user_id, progress);
        Ok(Some(progress))
    }

    async fn progress(&self, user_id: UserId) -> Result<UserPaymentCount> {
        Ok(self.tables.lock().await.progress(user_id))
    }

    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()> {
        self.tables.lock().await.insert_coupon(coupon)
    }

    async fn coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .codes
            .get(code)
            .and_then(|id| tables.coupons.get(id))
            .cloned())
    }

    async fn coupon(&self, id: CouponId) -> Result<Option<Coupon>> {
        Ok(self.tables.lock().await.coupons.get(&id).cloned())
    }

    async fn coupons(&self) -> Result<Vec<Coupon>> {
        let rows = self.tables.lock().await.coupons.values().cloned().collect();
        Ok(newest_first(rows, |c: &Coupon| (c.created_at, c.id)))
    }

    async fn coupons_issued_to(&self, user_id: UserId) -> Result<Vec<Coupon>> {
        let tables = self.tables.lock().await;
        let rows = tables
            .coupons
            .values()
            .filter(|c| c.issued_to == Some(user_id))
            .cloned()
            .collect();
        Ok(newest_first(rows, |c: &Coupon| (c.created_at, c.id)))
    }

    async fn has_used(&self, user_id: UserId, coupon_id: CouponId) -> Result<bool> {
        Ok(self
            .tables
            .lock()
            .await
            .usages
            .contains_key(&(user_id, coupon_id)))
    }

    async fn update_coupon(&self, id: CouponId, patch: &CouponPatch) -> Result<Option<Coupon>> {
        let mut tables = self.tables.lock().await;
        let Some(coupon) = tables.coupons.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = &patch.name {
            coupon.name.clone_from(name);
        }
        if let Some(percent) = patch.discount_percent {
            coupon.discount_percent = percent;
        }
        if let Some(valid_until) = patch.valid_until {
            coupon.valid_until = valid_until;
        }
        if let Some(stock) = patch.stock {
            coupon.stock = stock;
        }
        if let Some(is_active) = patch.is_active {
            coupon.is_active = is_active;
            coupon.deactivated_by = (!is_active).then_some(CouponDeactivation::Admin);
        }
        Ok(Some(coupon.clone()))
    }

    async fn redeem(&self, user_id: UserId, code: &str, at: DateTime<Utc>) -> Result<Coupon> {
        let mut tables = self.tables.lock().await;
        let id = *tables.codes.get(code).ok_or_else(|| Error::CouponUnknown {
            code: code.to_string(),
        })?;
        let used = tables.usages.contains_key(&(user_id, id));
        let coupon = tables
            .coupons
            .get_mut(&id)
            .ok_or_else(|| Error::internal(format!("coupon index points at missing {id}")))?;

        coupon.check_redeemable(at, used)?;
        let before = coupon.clone();
        coupon.stock -= 1;
        if coupon.stock == 0 {
            coupon.is_active = false;
            coupon.deactivated_by = Some(CouponDeactivation::OutOfStock);
        }
        tables.usages.insert((user_id, id), at);
        Ok(before)
    }

    async fn restore(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.tables.lock().await;
        if tables.usages.remove(&(user_id, coupon_id)).is_none() {
            return Ok(false);
        }
        if let Some(coupon) = tables.coupons.get_mut(&coupon_id) {
            if coupon.reactivates_on_restore(at) {
                coupon.is_active = true;
                coupon.deactivated_by = None;
            }
            coupon.stock = coupon.stock.saturating_add(1);
        }
        Ok(true)
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tables = self.tables.lock().await;
        let mut count = 0;
        for coupon in tables.coupons.values_mut() {
            if coupon.is_active && coupon.valid_until < now {
                coupon.is_active = false;
                coupon.deactivated_by = Some(CouponDeactivation::Expired);
                count += 1;
            }
        }
        Ok(count)
    }
}

/// Readiness probe for the memory backend: always ready.
pub struct MemoryProbe;

#[async_trait]
impl Probe for MemoryProbe {
    fn name(&self) -> &'static str {
        "storage"
    }

    async fn check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::SeatNumber;
    use chrono::{Duration, TimeZone};
    use cinema_core::{AuditoriumId, Money, MovieId};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn seats(labels: &[&str]) -> Vec<SeatNumber> {
        labels.iter().map(|l| SeatNumber::parse(l).unwrap()).collect()
    }

    async fn showtime(store: &InMemorySeatStore) -> ShowtimeId {
        store
            .insert_showtime(
                NewShowtime {
                    movie_id: MovieId::new(1),
                    auditorium_id: AuditoriumId::new(1),
                    start_time: now() + Duration::days(3),
                    unit_price: Money::from_dollars(50),
                },
                &seats(&["A1", "A2", "A3"]),
                now(),
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn failed_reservation_changes_nothing() {
        let store = InMemorySeatStore::new();
        let id = showtime(&store).await;
        let first = BookingId::new();
        store
            .reserve(id, &seats(&["A2"]), first, now() + Duration::hours(24))
            .await
            .unwrap();

        let err = store
            .reserve(id, &seats(&["A1", "A2"]), BookingId::new(), now())
            .await
            .unwrap_err();
        assert_eq!(err.seats(), Some(&["A2".to_string()][..]));

        let a1 = store
            .seats(id)
            .await
            .unwrap()
            .into_iter()
            .find(|s| s.seat_number.as_str() == "A1")
            .unwrap();
        assert_eq!(a1.state, SeatState::Available);
    }

    #[tokio::test]
    async fn expiry_groups_seats_by_booking_and_is_idempotent() {
        let store = InMemorySeatStore::new();
        let id = showtime(&store).await;
        let booking = BookingId::new();
        store
            .reserve(id, &seats(&["A1", "A3"]), booking, now() + Duration::hours(24))
            .await
            .unwrap();

        assert!(store.expire_holds(now()).await.unwrap().is_empty());

        let later = now() + Duration::hours(25);
        let expired = store.expire_holds(later).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].booking_id, booking);
        assert_eq!(expired[0].seats, seats(&["A1", "A3"]));
        assert!(store.expire_holds(later).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn showtimes_with_held_seats_cannot_be_deleted() {
        let store = InMemorySeatStore::new();
        let id = showtime(&store).await;
        store
            .reserve(id, &seats(&["A1"]), BookingId::new(), now() + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(
            store.delete_showtime(id).await.unwrap_err().code(),
            "ILLEGAL_STATE"
        );
        assert!(!store.delete_showtime(ShowtimeId::new(99)).await.unwrap());
    }

    fn coupon(code: &str, stock: u32) -> Coupon {
        Coupon {
            id: CouponId::new(),
            code: code.into(),
            name: code.into(),
            discount_percent: 10,
            valid_until: now() + Duration::days(30),
            is_active: true,
            deactivated_by: None,
            stock,
            issued_to: None,
            created_at: now(),
        }
    }

    #[tokio::test]
    async fn taken_reward_codes_are_drawn_again() {
        let store = InMemoryLoyaltyStore::new();
        store.insert_coupon(&coupon("LOYALTY-TAKEN", 1)).await.unwrap();

        let draws = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = std::sync::Arc::clone(&draws);
        let reward = move |progress: &UserPaymentCount| {
            let draw = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let code = if draw == 0 { "LOYALTY-TAKEN" } else { "LOYALTY-FRESH" };
            Some((progress.payment_count, coupon(code, 1)))
        };

        let tally = store
            .record_payment(UserId::new(5), PaymentId::new(), now(), &reward)
            .await
            .unwrap();
        assert_eq!(tally.reward.unwrap().code, "LOYALTY-FRESH");
        assert_eq!(tally.progress.last_coupon_milestone, 1);
        assert_eq!(draws.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn payment_is_not_counted_when_no_reward_code_is_free() {
        let store = InMemoryLoyaltyStore::new();
        store.insert_coupon(&coupon("LOYALTY-TAKEN", 1)).await.unwrap();
        let user = UserId::new(5);
        let payment = PaymentId::new();

        let always_taken =
            |progress: &UserPaymentCount| Some((progress.payment_count, coupon("LOYALTY-TAKEN", 1)));
        let err = store
            .record_payment(user, payment, now(), &always_taken)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert_eq!(store.progress(user).await.unwrap().payment_count, 0);

        let fresh =
            |progress: &UserPaymentCount| Some((progress.payment_count, coupon("LOYALTY-NEW", 1)));
        let tally = store.record_payment(user, payment, now(), &fresh).await.unwrap();
        assert!(tally.counted);
        assert_eq!(tally.progress.payment_count, 1);
    }

    #[tokio::test]
    async fn restore_reopens_only_coupons_that_sold_out() {
        let store = InMemoryLoyaltyStore::new();
        let user = UserId::new(3);

        let sold_out = coupon("LAST", 1);
        store.insert_coupon(&sold_out).await.unwrap();
        store.redeem(user, "LAST", now()).await.unwrap();
        let exhausted = store.coupon(sold_out.id).await.unwrap().unwrap();
        assert!(!exhausted.is_active);
        assert_eq!(exhausted.deactivated_by, Some(CouponDeactivation::OutOfStock));

        assert!(store.restore(user, sold_out.id, now()).await.unwrap());
        let reopened = store.coupon(sold_out.id).await.unwrap().unwrap();
        assert!(reopened.is_active);
        assert_eq!(reopened.deactivated_by, None);
        assert_eq!(reopened.stock, 1);

        let withdrawn = coupon("WITHDRAWN", 1);
        store.insert_coupon(&withdrawn).await.unwrap();
        store.redeem(user, "WITHDRAWN", now()).await.unwrap();
        store
            .update_coupon(
                withdrawn.id,
                &CouponPatch {
                    is_active: Some(false),
                    ..CouponPatch::default()
                },
            )
            .await
            .unwrap();

        assert!(store.restore(user, withdrawn.id, now()).await.unwrap());
        let still_off = store.coupon(withdrawn.id).await.unwrap().unwrap();
        assert!(!still_off.is_active);
        assert_eq!(still_off.deactivated_by, Some(CouponDeactivation::Admin));
        assert_eq!(still_off.stock, 1);
    }
}
