//! Domain types for the cinema ticketing system.
//!
//! Value objects, entities and status enums shared by the seat inventory,
//! booking, payment and loyalty components. Identifiers and [`Money`] live in
//! `cinema-core`.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use cinema_core::{
    AuditoriumId, BookingId, CouponId, Error, Money, MovieId, PaymentId, Result, ShowtimeId,
    UserId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Most seats a single booking may hold.
pub const MAX_SEATS_PER_BOOKING: usize = 10;

/// Largest accepted payment proof, in bytes.
pub const MAX_PROOF_BYTES: usize = 5 * 1024 * 1024;

// ============================================================================
// Seats
// ============================================================================

/// A seat label such as `B5`: row letters followed by a number.
///
/// Labels are normalized to upper case so `b5` and `B5` address the same seat.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatNumber(String);

impl SeatNumber {
    /// Parses and normalizes a seat label.
    ///
    /// # Errors
    ///
    /// Returns `BAD_INPUT` when the label is empty, longer than 8 characters or
    /// contains anything but ASCII letters and digits.
    pub fn parse(raw: &str) -> Result<Self> {
        let label = raw.trim().to_ascii_uppercase();
        if label.is_empty() || label.len() > 8 || !label.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(Error::BadInput(format!("invalid seat number '{raw}'")));
        }
        Ok(Self(label))
    }

    /// The normalized label
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeatNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parses a client seat request into a sorted, duplicate-free set.
///
/// # Errors
///
/// `BAD_INPUT` for an empty request, a duplicate, an invalid label or more
/// than [`MAX_SEATS_PER_BOOKING`] seats.
pub fn parse_seat_request(raw: &[String]) -> Result<Vec<SeatNumber>> {
    if raw.is_empty() {
        return Err(Error::BadInput("at least one seat is required".into()));
    }
    let mut seats = BTreeSet::new();
    for label in raw {
        let seat = SeatNumber::parse(label)?;
        if !seats.insert(seat.clone()) {
            return Err(Error::BadInput(format!("seat {seat} requested twice")));
        }
    }
    if seats.len() > MAX_SEATS_PER_BOOKING {
        return Err(Error::BadInput(format!(
            "at most {MAX_SEATS_PER_BOOKING} seats per booking"
        )));
    }
    Ok(seats.into_iter().collect())
}

/// Seat names of a set, for error payloads and logs.
#[must_use]
pub fn seat_labels(seats: &[SeatNumber]) -> Vec<String> {
    seats.iter().map(ToString::to_string).collect()
}

/// How an auditorium's seats are laid out when a showtime is published.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeatLayout {
    /// Every row has the same number of seats: `A1..A{n}`, `B1..`
    Grid {
        /// Row labels in order
        rows: Vec<String>,
        /// Seats in each row
        seats_per_row: u16,
    },
    /// An arbitrary list of seat labels
    Explicit(Vec<String>),
}

impl SeatLayout {
    /// Expands the layout into seat numbers.
    ///
    /// # Errors
    ///
    /// `BAD_INPUT` for an empty layout, invalid labels or duplicates.
    pub fn seat_numbers(&self) -> Result<Vec<SeatNumber>> {
        let labels: Vec<String> = match self {
            Self::Grid {
                rows,
                seats_per_row,
            } => rows
                .iter()
                .flat_map(|row| (1..=*seats_per_row).map(move |n| format!("{}{n}", row.trim())))
                .collect(),
            Self::Explicit(labels) => labels.clone(),
        };
        if labels.is_empty() {
            return Err(Error::BadInput("seat layout is empty".into()));
        }
        let mut seats = BTreeSet::new();
        for label in &labels {
            let seat = SeatNumber::parse(label)?;
            if !seats.insert(seat.clone()) {
                return Err(Error::BadInput(format!("seat {seat} appears twice in layout")));
            }
        }
        Ok(seats.into_iter().collect())
    }
}

/// Coarse seat state, as shown on a seat map.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, async_graphql::Enum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStateKind {
    /// Free to reserve
    Available,
    /// Held for a pending booking
    Reserved,
    /// Sold to a paid booking
    Booked,
}

impl SeatStateKind {
    /// Storage representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Reserved => "RESERVED",
            Self::Booked => "BOOKED",
        }
    }
}

impl fmt::Display for SeatStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SeatStateKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "AVAILABLE" => Ok(Self::Available),
            "RESERVED" => Ok(Self::Reserved),
            "BOOKED" => Ok(Self::Booked),
            other => Err(Error::internal(format!("unknown seat state '{other}'"))),
        }
    }
}

/// State of one seat for one showtime.
///
/// The owning booking exists exactly in the `Reserved` and `Booked` variants.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeatState {
    /// Free to reserve
    Available,
    /// Held for a pending booking until `until`
    Reserved {
        /// Owning booking
        booking_id: BookingId,
        /// Hold expiry
        until: DateTime<Utc>,
    },
    /// Sold to a paid booking
    Booked {
        /// Owning booking
        booking_id: BookingId,
    },
}

/// Inputs to the seat state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeatEvent {
    /// Hold the seat for a booking
    Reserve {
        /// Booking taking the hold
        booking_id: BookingId,
        /// Hold expiry
        until: DateTime<Utc>,
    },
    /// Turn the booking's hold into a sale
    Confirm {
        /// Booking that paid
        booking_id: BookingId,
    },
    /// Give the seat back (cancellation or refund)
    Release {
        /// Booking giving the seat back
        booking_id: BookingId,
    },
    /// Drop an expired hold
    Expire {
        /// Sweep time
        now: DateTime<Utc>,
    },
}

impl SeatEvent {
    const fn target(&self) -> SeatStateKind {
        match self {
            Self::Reserve { .. } => SeatStateKind::Reserved,
            Self::Confirm { .. } => SeatStateKind::Booked,
            Self::Release { .. } | Self::Expire { .. } => SeatStateKind::Available,
        }
    }
}

impl SeatState {
    /// The coarse state
    #[must_use]
    pub const fn kind(&self) -> SeatStateKind {
        match self {
            Self::Available => SeatStateKind::Available,
            Self::Reserved { .. } => SeatStateKind::Reserved,
            Self::Booked { .. } => SeatStateKind::Booked,
        }
    }

    /// The owning booking, if any
    #[must_use]
    pub const fn booking_id(&self) -> Option<BookingId> {
        match self {
            Self::Available => None,
            Self::Reserved { booking_id, .. } | Self::Booked { booking_id } => Some(*booking_id),
        }
    }

    /// Hold expiry for reserved seats
    #[must_use]
    pub const fn reserved_until(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Reserved { until, .. } => Some(*until),
            _ => None,
        }
    }

    /// Whether `booking_id` owns this seat (reserved or booked)
    #[must_use]
    pub fn is_held_by(&self, booking_id: BookingId) -> bool {
        self.booking_id() == Some(booking_id)
    }

    /// Applies one event to the seat state machine.
    ///
    /// Allowed transitions:
    ///
    /// ```text
    /// AVAILABLE ──reserve──► RESERVED ──confirm──► BOOKED
    ///     ▲                     │                    │
    ///     └──release / expire───┘                    │
    ///     └──────────────release (refund)────────────┘
    /// ```
    ///
    /// # Errors
    ///
    /// `ILLEGAL_SEAT_TRANSITION` for anything else, including events from a
    /// booking that does not own the seat and expiry of a live hold.
    pub fn apply(&self, seat: &SeatNumber, event: SeatEvent) -> Result<Self> {
        let next = match (self, event) {
            (Self::Available, SeatEvent::Reserve { booking_id, until }) => {
                Some(Self::Reserved { booking_id, until })
            }
            (Self::Reserved { booking_id: owner, .. }, SeatEvent::Confirm { booking_id })
                if *owner == booking_id =>
            {
                Some(Self::Booked { booking_id })
            }
            (
                Self::Reserved { booking_id: owner, .. } | Self::Booked { booking_id: owner },
                SeatEvent::Release { booking_id },
            ) if *owner == booking_id => Some(Self::Available),
            (Self::Reserved { until, .. }, SeatEvent::Expire { now }) if *until < now => {
                Some(Self::Available)
            }
            _ => None,
        };

        next.ok_or_else(|| Error::IllegalSeatTransition {
            seat: seat.to_string(),
            from: self.kind().to_string(),
            to: event.target().to_string(),
        })
    }
}

/// A seat and its state, as stored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatStatus {
    /// Showtime the seat belongs to
    pub showtime_id: ShowtimeId,
    /// Seat label
    pub seat_number: SeatNumber,
    /// Current state
    pub state: SeatState,
}

/// Seats of one booking dropped by a reservation sweep.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpiredHold {
    /// Showtime of the seats
    pub showtime_id: ShowtimeId,
    /// Booking that held them
    pub booking_id: BookingId,
    /// Seats returned to availability
    pub seats: Vec<SeatNumber>,
}

// ============================================================================
// Showtimes
// ============================================================================

/// A scheduled screening with a per-seat price.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Showtime {
    /// Showtime id
    pub id: ShowtimeId,
    /// Movie being screened
    pub movie_id: MovieId,
    /// Auditorium hosting it
    pub auditorium_id: AuditoriumId,
    /// Start time
    pub start_time: DateTime<Utc>,
    /// Price of one seat
    pub unit_price: Money,
    /// When it was published
    pub created_at: DateTime<Utc>,
}

/// Admin input for publishing a showtime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewShowtime {
    /// Movie being screened
    pub movie_id: MovieId,
    /// Auditorium hosting it
    pub auditorium_id: AuditoriumId,
    /// Start time
    pub start_time: DateTime<Utc>,
    /// Price of one seat
    pub unit_price: Money,
}

// ============================================================================
// Bookings
// ============================================================================

/// Booking lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, async_graphql::Enum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    /// Seats reserved, waiting for payment
    Pending,
    /// Paid, seats booked
    Paid,
    /// Cancelled, seats released
    Cancelled,
}

impl BookingStatus {
    /// Storage representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(Error::internal(format!("unknown booking status '{other}'"))),
        }
    }
}

/// Why a booking was cancelled. Used for logs and metrics labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// The user cancelled the booking
    UserRequested,
    /// The user cancelled the payment inside the window
    PaymentCancelled,
    /// No proof arrived within the payment deadline
    PaymentExpired,
    /// The seat hold expired
    ReservationExpired,
    /// Confirmation found the seats no longer held
    ReservationLost,
    /// The booking workflow failed after the booking was created
    Compensation,
}

impl CancelReason {
    /// Label value
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UserRequested => "user_requested",
            Self::PaymentCancelled => "payment_cancelled",
            Self::PaymentExpired => "payment_expired",
            Self::ReservationExpired => "reservation_expired",
            Self::ReservationLost => "reservation_lost",
            Self::Compensation => "compensation",
        }
    }
}

/// A booking of one or more seats for a showtime.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking id (also tags the seat reservation)
    pub id: BookingId,
    /// Owner
    pub user_id: UserId,
    /// Showtime booked
    pub showtime_id: ShowtimeId,
    /// Seats, sorted and distinct
    pub seat_numbers: Vec<SeatNumber>,
    /// Lifecycle status
    pub status: BookingStatus,
    /// Price after any coupon discount
    pub total_price: Money,
    /// Coupon redeemed at creation
    pub coupon_code: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Payments
// ============================================================================

/// Payment lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, async_graphql::Enum)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Waiting for proof
    Pending,
    /// Proof accepted
    Paid,
    /// No proof before the deadline
    Failed,
    /// Cancelled by the user
    Cancelled,
    /// Money returned after the booking could not be confirmed
    Refunded,
}

impl PaymentStatus {
    /// Storage representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }

    /// Pending or paid: the payment still stands for its booking
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Paid)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            other => Err(Error::internal(format!("unknown payment status '{other}'"))),
        }
    }
}

/// How the user pays.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, async_graphql::Enum,
)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Bank transfer, proven by an uploaded receipt
    #[default]
    BankTransfer,
    /// Card payment, proven by the processor's receipt
    CreditCard,
    /// E-wallet transfer, proven by a screenshot
    EWallet,
}

impl PaymentMethod {
    /// Storage representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BankTransfer => "bank_transfer",
            Self::CreditCard => "credit_card",
            Self::EWallet => "e_wallet",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bank_transfer" => Ok(Self::BankTransfer),
            "credit_card" => Ok(Self::CreditCard),
            "e_wallet" => Ok(Self::EWallet),
            other => Err(Error::BadInput(format!("unknown payment method '{other}'"))),
        }
    }
}

/// A payment for one booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Payment id
    pub id: PaymentId,
    /// Payer
    pub user_id: UserId,
    /// Booking paid for
    pub booking_id: BookingId,
    /// Amount, equal to the booking total
    pub amount: Money,
    /// Payment method
    pub method: PaymentMethod,
    /// Lifecycle status
    pub status: PaymentStatus,
    /// Uploaded proof (receipt reference or encoded image)
    pub proof: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// Loyalty & coupons
// ============================================================================

/// Per-user successful payment counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPaymentCount {
    /// User
    pub user_id: UserId,
    /// Counted paid payments
    pub payment_count: u32,
    /// Highest milestone already rewarded
    pub last_coupon_milestone: u32,
}

impl UserPaymentCount {
    /// A user with no counted payments
    #[must_use]
    pub const fn zero(user_id: UserId) -> Self {
        Self {
            user_id,
            payment_count: 0,
            last_coupon_milestone: 0,
        }
    }
}

/// A discount coupon, either created by an admin or issued by the loyalty
/// program.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    /// Coupon id
    pub id: CouponId,
    /// Unique redemption code
    pub code: String,
    /// Display name
    pub name: String,
    /// Discount in percent, `1..=100`
    pub discount_percent: u8,
    /// Last instant the coupon can be used
    pub valid_until: DateTime<Utc>,
    /// Soft-delete flag; cleared when stock runs out or validity passes
    pub is_active: bool,
    /// Why `is_active` was cleared; `None` while active
    pub deactivated_by: Option<CouponDeactivation>,
    /// Remaining redemptions
    pub stock: u32,
    /// Recipient of a loyalty coupon
    pub issued_to: Option<UserId>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    /// Checks everything but per-user usage, in the order clients see them:
    /// out of stock, inactive, expired.
    ///
    /// A coupon the sweep deactivated for passing its validity still reports
    /// `COUPON_EXPIRED`.
    ///
    /// # Errors
    ///
    /// The matching `COUPON_*` error.
    pub fn check_usable(&self, now: DateTime<Utc>) -> Result<()> {
        let code = || self.code.clone();
        if self.stock == 0 {
            return Err(Error::CouponOutOfStock { code: code() });
        }
        let expired = self.valid_until < now;
        let swept = expired && self.deactivated_by == Some(CouponDeactivation::Expired);
        if !self.is_active && !swept {
            return Err(Error::CouponInactive { code: code() });
        }
        if expired {
            return Err(Error::CouponExpired { code: code() });
        }
        Ok(())
    }

    /// Whether a returned redemption may switch the coupon back on: only
    /// when running out of stock is what switched it off.
    #[must_use]
    pub fn reactivates_on_restore(&self, now: DateTime<Utc>) -> bool {
        !self.is_active
            && self.deactivated_by == Some(CouponDeactivation::OutOfStock)
            && self.valid_until >= now
    }

    /// [`check_usable`](Self::check_usable) plus the one-use-per-user rule.
    ///
    /// # Errors
    ///
    /// The matching `COUPON_*` error.
    pub fn check_redeemable(&self, now: DateTime<Utc>, already_used: bool) -> Result<()> {
        self.check_usable(now)?;
        if already_used {
            return Err(Error::CouponAlreadyUsed {
                code: self.code.clone(),
            });
        }
        Ok(())
    }
}

/// Reason a coupon was deactivated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponDeactivation {
    /// Last unit redeemed
    OutOfStock,
    /// Validity passed, found by the sweep
    Expired,
    /// Switched off by an admin
    Admin,
}

impl CouponDeactivation {
    /// Storage representation
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OutOfStock => "out_of_stock",
            Self::Expired => "expired",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for CouponDeactivation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CouponDeactivation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "out_of_stock" => Ok(Self::OutOfStock),
            "expired" => Ok(Self::Expired),
            "admin" => Ok(Self::Admin),
            other => Err(Error::internal(format!("unknown coupon deactivation '{other}'"))),
        }
    }
}

/// Admin input for a new coupon.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCoupon {
    /// Unique code
    pub code: String,
    /// Display name
    pub name: String,
    /// Discount in percent
    pub discount_percent: u8,
    /// Validity end
    pub valid_until: DateTime<Utc>,
    /// Number of redemptions
    pub stock: u32,
}

/// Admin changes to an existing coupon; `None` leaves a field alone.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponPatch {
    /// New name
    pub name: Option<String>,
    /// New discount
    pub discount_percent: Option<u8>,
    /// New validity end
    pub valid_until: Option<DateTime<Utc>>,
    /// New stock
    pub stock: Option<u32>,
    /// Activate or deactivate
    pub is_active: Option<bool>,
}

/// A user's redemption of a coupon.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponUsage {
    /// User
    pub user_id: UserId,
    /// Coupon
    pub coupon_id: CouponId,
    /// Redemption time
    pub used_at: DateTime<Utc>,
}

/// Checks percent bounds for coupon input.
///
/// # Errors
///
/// `BAD_INPUT` unless `percent` is in `1..=100`.
pub fn validate_discount_percent(percent: u8) -> Result<()> {
    if percent == 0 || percent > 100 {
        return Err(Error::BadInput(format!(
            "discount percent must be between 1 and 100, got {percent}"
        )));
    }
    Ok(())
}

/// Last second of the UTC year containing `now`.
#[must_use]
pub fn end_of_year(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), 12, 31, 23, 59, 59)
        .single()
        .unwrap_or(now)
}
