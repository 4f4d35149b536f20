//! Gateway orchestrator.
//!
//! The single public entry point. It authenticates callers against the user
//! service, fans composite reads out to the catalog and the seat inventory,
//! and runs the booking workflow across the in-process components:
//!
//! ```text
//! createBooking ─► BookingManager::create ─► PaymentManager::create
//!                          ▲                          │ fails
//!                          └── BookingManager::abort ◄┘
//! ```
//!
//! GraphQL resolvers in [`schema`] are thin: they parse arguments, call one
//! [`Gateway`] method and shape the result.

pub mod auth;
pub mod clients;
pub mod downstream;
pub mod schema;

pub use auth::{AuthSession, Identity, Role, UserDirectory, require_admin, require_auth};
pub use clients::{
    Catalog, Cinema, CinemaInput, Movie, MovieInput, RemoteCatalog, RemoteUserDirectory,
};
pub use downstream::RemoteService;
pub use schema::{RequestContext, TicketingSchema, build_schema};

use crate::aggregates::{
    BookingManager, CouponQuote, LoyaltyEngine, LoyaltyProgress, NewBooking, NewPayment,
    PaymentManager, ProofOutcome, SeatInventory,
};
use crate::types::{
    Booking, CancelReason, Coupon, CouponPatch, NewCoupon, NewShowtime, Payment, PaymentMethod,
    SeatLayout, SeatStatus, Showtime,
};
use cinema_core::{BookingId, CouponId, Error, Money, PaymentId, Result, ShowtimeId};
use cinema_web::Authorization;
use std::sync::Arc;

/// Service labels used in slice errors.
pub const USER_SERVICE: &str = "user service";
/// Movie catalog label
pub const MOVIE_SERVICE: &str = "movie service";
/// Cinema catalog label
pub const CINEMA_SERVICE: &str = "cinema service";
/// Showtime listing label
pub const SHOWTIME_SERVICE: &str = "showtime service";

/// One part of a composite read: `{success, error, data}`.
#[derive(Clone, Debug, PartialEq)]
pub struct Slice<T> {
    /// Whether `data` is present
    pub success: bool,
    /// Client-facing failure
    pub error: Option<String>,
    /// The payload
    pub data: Option<T>,
}

impl<T> Slice<T> {
    /// Wraps the outcome of one downstream read.
    ///
    /// Availability failures read `<service> unavailable`; internal failures
    /// are logged and masked.
    pub fn from_result(service: &str, result: Result<T>) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                error: None,
                data: Some(data),
            },
            Err(err) => {
                let message = if err.is_availability() {
                    format!("{service} unavailable")
                } else {
                    if matches!(err, Error::Internal(_)) {
                        tracing::error!(service, error = %err, "Slice failed");
                    }
                    err.public_message()
                };
                Self {
                    success: false,
                    error: Some(message),
                    data: None,
                }
            }
        }
    }
}

/// The `browse` fan-out.
#[derive(Clone, Debug)]
pub struct Browse {
    /// From the movie service
    pub movies: Slice<Vec<Movie>>,
    /// From the cinema service
    pub cinemas: Slice<Vec<Cinema>>,
    /// From the seat inventory
    pub showtimes: Slice<Vec<Showtime>>,
}

/// A booking request as sent by the client.
#[derive(Clone, Debug)]
pub struct BookingRequest {
    /// Showtime to book
    pub showtime_id: ShowtimeId,
    /// Seat labels
    pub seat_numbers: Vec<String>,
    /// Optional coupon
    pub coupon_code: Option<String>,
    /// Payment method for the pending payment
    pub payment_method: PaymentMethod,
}

/// Result of the booking workflow.
#[derive(Clone, Debug)]
pub struct Checkout {
    /// The pending booking
    pub booking: Booking,
    /// Its pending payment
    pub payment: Payment,
}

/// Orchestrates the remote collaborators and the in-process components.
#[derive(Clone)]
pub struct Gateway {
    users: Arc<dyn UserDirectory>,
    catalog: Arc<dyn Catalog>,
    inventory: SeatInventory,
    bookings: BookingManager,
    payments: PaymentManager,
    loyalty: LoyaltyEngine,
}

impl Gateway {
    /// Creates the gateway
    #[must_use]
    pub fn new(
        users: Arc<dyn UserDirectory>,
        catalog: Arc<dyn Catalog>,
        inventory: SeatInventory,
        bookings: BookingManager,
        payments: PaymentManager,
        loyalty: LoyaltyEngine,
    ) -> Self {
        Self {
            users,
            catalog,
            inventory,
            bookings,
            payments,
            loyalty,
        }
    }

    // ------------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------------

    /// Resolves the caller.
    ///
    /// # Errors
    ///
    /// See [`require_auth`].
    pub async fn authenticate(&self, authorization: &Authorization) -> Result<Identity> {
        require_auth(self.users.as_ref(), authorization).await
    }

    /// Resolves the caller and requires the admin role.
    ///
    /// # Errors
    ///
    /// See [`require_auth`]; `FORBIDDEN` for non-admins.
    pub async fn authenticate_admin(&self, authorization: &Authorization) -> Result<Identity> {
        let identity = self.authenticate(authorization).await?;
        require_admin(&identity)?;
        Ok(identity)
    }

    /// Registers through the user service.
    ///
    /// # Errors
    ///
    /// Propagates the user service's error.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<AuthSession> {
        self.users.register(username, email, password).await
    }

    /// Signs in through the user service.
    ///
    /// # Errors
    ///
    /// Propagates the user service's error.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession> {
        self.users.login(email, password).await
    }

    /// Lists accounts (admin), forwarding the caller's header.
    ///
    /// # Errors
    ///
    /// Authentication errors, or the user service's error.
    pub async fn users(&self, authorization: &Authorization) -> Result<Vec<Identity>> {
        self.authenticate_admin(authorization).await?;
        let header = authorization
            .header_value()
            .ok_or(Error::AuthenticationRequired)?;
        self.users.users(header).await
    }

    // ------------------------------------------------------------------------
    // Fan-out reads
    // ------------------------------------------------------------------------

    /// Movies slice
    pub async fn movies(&self, authorization: &Authorization) -> Slice<Vec<Movie>> {
        Slice::from_result(
            MOVIE_SERVICE,
            self.catalog.movies(authorization.header_value()).await,
        )
    }

    /// Cinemas slice
    pub async fn cinemas(&self, authorization: &Authorization) -> Slice<Vec<Cinema>> {
        Slice::from_result(
            CINEMA_SERVICE,
            self.catalog.cinemas(authorization.header_value()).await,
        )
    }

    /// Showtimes slice
    pub async fn showtimes(&self) -> Slice<Vec<Showtime>> {
        Slice::from_result(SHOWTIME_SERVICE, self.inventory.showtimes().await)
    }

    /// Movies, cinemas and showtimes, fetched concurrently. A failing source
    /// only fails its own slice.
    pub async fn browse(&self, authorization: &Authorization) -> Browse {
        let (movies, cinemas, showtimes) = futures::join!(
            self.movies(authorization),
            self.cinemas(authorization),
            self.showtimes()
        );
        Browse {
            movies,
            cinemas,
            showtimes,
        }
    }

    /// Seat map of a showtime.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` for an unknown showtime.
    pub async fn seat_map(&self, showtime_id: ShowtimeId) -> Result<Vec<SeatStatus>> {
        self.inventory.seat_map(showtime_id).await
    }

    // ------------------------------------------------------------------------
    // Booking workflow
    // ------------------------------------------------------------------------

    /// Creates a booking and its pending payment.
    ///
    /// If the payment cannot be created the booking is aborted (seats
    /// released, coupon restored) and the payment failure is returned.
    ///
    /// # Errors
    ///
    /// The first failing step's error.
    pub async fn create_booking(&self, caller: &Identity, request: BookingRequest) -> Result<Checkout> {
        let booking = self
            .bookings
            .create(NewBooking {
                user_id: caller.user_id,
                showtime_id: request.showtime_id,
                seat_numbers: request.seat_numbers,
                coupon_code: request.coupon_code,
            })
            .await?;

        let payment = self
            .payments
            .create(NewPayment {
                user_id: caller.user_id,
                booking_id: booking.id,
                amount: booking.total_price,
                method: request.payment_method,
            })
            .await;

        match payment {
            Ok(payment) => Ok(Checkout { booking, payment }),
            Err(cause) => {
                tracing::warn!(
                    booking_id = %booking.id,
                    error = %cause,
                    "Payment creation failed, aborting booking"
                );
                if let Err(err) = self.bookings.abort(booking.id).await {
                    tracing::error!(booking_id = %booking.id, error = %err, "Booking abort failed");
                }
                Err(cause)
            }
        }
    }

    /// Attaches payment proof; the result carries any loyalty reward.
    ///
    /// # Errors
    ///
    /// See [`PaymentManager::upload_proof`].
    pub async fn upload_payment_proof(
        &self,
        caller: &Identity,
        payment_id: PaymentId,
        proof: &str,
    ) -> Result<ProofOutcome> {
        self.payments.upload_proof(caller.user_id, payment_id, proof).await
    }

    /// Cancels a pending payment inside its window, and with it the booking.
    ///
    /// # Errors
    ///
    /// See [`PaymentManager::cancel`].
    pub async fn cancel_payment(&self, caller: &Identity, payment_id: PaymentId) -> Result<Payment> {
        self.payments.cancel(caller.user_id, payment_id).await
    }

    /// Cancels a pending booking and voids its pending payment.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` / `FORBIDDEN` for a missing or foreign booking,
    /// `ILLEGAL_STATE` for a paid booking.
    pub async fn cancel_booking(&self, caller: &Identity, booking_id: BookingId) -> Result<Booking> {
        self.bookings.get_owned(caller.user_id, booking_id).await?;
        let booking = self
            .bookings
            .cancel(booking_id, CancelReason::UserRequested)
            .await?;
        if let Some(payment) = self.payments.void_for_booking(booking_id).await? {
            tracing::info!(payment_id = %payment.id, %booking_id, "Payment voided with its booking");
        }
        Ok(booking)
    }

    /// Redeems a coupon against an amount.
    ///
    /// # Errors
    ///
    /// `COUPON_*` errors.
    pub async fn apply_coupon(&self, caller: &Identity, code: &str, amount: Money) -> Result<CouponQuote> {
        self.loyalty.apply(caller.user_id, code, amount).await
    }

    // ------------------------------------------------------------------------
    // Caller's records
    // ------------------------------------------------------------------------

    /// Caller's bookings
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub async fn my_bookings(&self, caller: &Identity) -> Result<Vec<Booking>> {
        self.bookings.for_user(caller.user_id).await
    }

    /// Caller's payments
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub async fn my_payments(&self, caller: &Identity) -> Result<Vec<Payment>> {
        self.payments.for_user(caller.user_id).await
    }

    /// Caller's loyalty progress
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub async fn my_loyalty(&self, caller: &Identity) -> Result<LoyaltyProgress> {
        self.loyalty.progress(caller.user_id).await
    }

    /// One of the caller's bookings; admins may read any.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` / `FORBIDDEN`.
    pub async fn booking(&self, caller: &Identity, id: BookingId) -> Result<Booking> {
        if caller.is_admin() {
            self.bookings.get(id).await
        } else {
            self.bookings.get_owned(caller.user_id, id).await
        }
    }

    /// One of the caller's payments; admins may read any.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` / `FORBIDDEN`.
    pub async fn payment(&self, caller: &Identity, id: PaymentId) -> Result<Payment> {
        if caller.is_admin() {
            self.payments.get(id).await
        } else {
            self.payments.get_owned(caller.user_id, id).await
        }
    }

    // ------------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------------

    /// Every booking
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub async fn all_bookings(&self) -> Result<Vec<Booking>> {
        self.bookings.all().await
    }

    /// Every payment
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub async fn all_payments(&self) -> Result<Vec<Payment>> {
        self.payments.all().await
    }

    /// Publishes a showtime with its seats.
    ///
    /// # Errors
    ///
    /// `BAD_INPUT` for an invalid layout.
    pub async fn create_showtime(&self, input: NewShowtime, layout: &SeatLayout) -> Result<Showtime> {
        self.inventory.publish_showtime(input, layout).await
    }

    /// Removes an unsold showtime.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, or `ILLEGAL_STATE` while seats are held.
    pub async fn delete_showtime(&self, id: ShowtimeId) -> Result<()> {
        self.inventory.delete_showtime(id).await
    }

    /// Every coupon
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub async fn coupons(&self) -> Result<Vec<Coupon>> {
        self.loyalty.coupons().await
    }

    /// Creates a coupon.
    ///
    /// # Errors
    ///
    /// `BAD_INPUT` for invalid or duplicate input.
    pub async fn create_coupon(&self, input: NewCoupon) -> Result<Coupon> {
        self.loyalty.create_coupon(input).await
    }

    /// Updates a coupon.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`, `BAD_INPUT`.
    pub async fn update_coupon(&self, id: CouponId, patch: CouponPatch) -> Result<Coupon> {
        self.loyalty.update_coupon(id, patch).await
    }

    /// Soft-deletes a coupon.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND`.
    pub async fn deactivate_coupon(&self, id: CouponId) -> Result<Coupon> {
        self.loyalty.deactivate_coupon(id).await
    }

    /// The remote catalog, for forwarded admin mutations
    #[must_use]
    pub fn catalog(&self) -> &dyn Catalog {
        self.catalog.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn availability_failures_name_the_service() {
        let slice: Slice<Vec<Movie>> = Slice::from_result(
            MOVIE_SERVICE,
            Err(Error::Timeout {
                service: MOVIE_SERVICE.into(),
            }),
        );
        assert!(!slice.success);
        assert_eq!(slice.error.as_deref(), Some("movie service unavailable"));
        assert!(slice.data.is_none());
    }

    #[test]
    fn internal_failures_are_masked() {
        let slice: Slice<Vec<Showtime>> =
            Slice::from_result(SHOWTIME_SERVICE, Err(Error::internal("pool timed out")));
        assert_eq!(slice.error.as_deref(), Some("internal error"));
    }

    #[test]
    fn successful_slices_carry_data() {
        let slice = Slice::from_result(CINEMA_SERVICE, Ok(vec![1, 2]));
        assert!(slice.success);
        assert_eq!(slice.data, Some(vec![1, 2]));
        assert_eq!(slice.error, None);
    }
}
