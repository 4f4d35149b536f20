//! Static GraphQL schema.
//!
//! Resolvers read the caller's `Authorization` header from the
//! [`RequestContext`] attached per request, run the auth gate the operation
//! needs, and delegate to the [`Gateway`]. Errors carry
//! `extensions.code` (and `extensions.seats` for seat conflicts).

use super::{
    BookingRequest, Browse, Cinema, CinemaInput, Gateway, Identity, Movie, MovieInput, Role,
    Slice, USER_SERVICE,
};
use crate::aggregates::{CouponQuote, LoyaltyProgress, ProofOutcome};
use crate::types::{
    Booking, BookingStatus, Coupon, CouponPatch, NewCoupon, NewShowtime, Payment, PaymentMethod,
    PaymentStatus, SeatLayout, SeatStateKind, SeatStatus, Showtime,
};
use async_graphql::{
    Context, EmptySubscription, ErrorExtensions, InputObject, Object, Schema, SimpleObject, ID,
};
use chrono::{DateTime, Utc};
use cinema_core::{Error, ErrorCategory, Money, Result};
use cinema_web::Authorization;
use std::str::FromStr;

/// The gateway's schema type.
pub type TicketingSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Builds the schema over `gateway`.
#[must_use]
pub fn build_schema(gateway: Gateway) -> TicketingSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(gateway)
        .limit_depth(16)
        .finish()
}

/// Per-request data attached by the HTTP handler.
#[derive(Clone, Debug, Default)]
pub struct RequestContext {
    /// The caller's header, forwarded verbatim downstream
    pub authorization: Authorization,
    /// Correlation id of the HTTP request
    pub correlation_id: String,
}

static ANONYMOUS: Authorization = Authorization(None);

fn gateway<'a>(ctx: &Context<'a>) -> async_graphql::Result<&'a Gateway> {
    ctx.data::<Gateway>()
}

fn authorization<'a>(ctx: &Context<'a>) -> &'a Authorization {
    ctx.data_opt::<RequestContext>()
        .map_or(&ANONYMOUS, |request| &request.authorization)
}

async fn caller(ctx: &Context<'_>) -> async_graphql::Result<Identity> {
    gateway(ctx)?.authenticate(authorization(ctx)).await.graphql()
}

async fn admin(ctx: &Context<'_>) -> async_graphql::Result<Identity> {
    gateway(ctx)?
        .authenticate_admin(authorization(ctx))
        .await
        .graphql()
}

fn forwarded_header<'a>(ctx: &Context<'a>) -> async_graphql::Result<&'a str> {
    authorization(ctx)
        .header_value()
        .ok_or(Error::AuthenticationRequired)
        .graphql()
}

// ============================================================================
// Error mapping
// ============================================================================

/// Converts a domain error into a GraphQL error with `extensions.code`.
#[must_use]
pub fn graphql_error(err: &Error) -> async_graphql::Error {
    if matches!(err.category(), ErrorCategory::Internal) {
        tracing::error!(error = %err, "Request failed");
    }
    let code = err.code();
    let seats = err.seats().map(<[String]>::to_vec);
    async_graphql::Error::new(err.public_message()).extend_with(move |_, extensions| {
        extensions.set("code", code);
        if let Some(seats) = &seats {
            extensions.set("seats", seats.clone());
        }
    })
}

trait GraphqlResult<T> {
    fn graphql(self) -> async_graphql::Result<T>;
}

impl<T> GraphqlResult<T> for Result<T> {
    fn graphql(self) -> async_graphql::Result<T> {
        self.map_err(|err| graphql_error(&err))
    }
}

fn parse_id<T: FromStr>(id: &ID, entity: &str) -> async_graphql::Result<T> {
    id.trim()
        .parse()
        .map_err(|_| Error::BadInput(format!("invalid {entity} id '{}'", id.as_str())))
        .graphql()
}

fn parse_amount(amount: f64) -> async_graphql::Result<Money> {
    Money::from_decimal(amount)
        .ok_or_else(|| Error::BadInput(format!("invalid amount {amount}")))
        .graphql()
}

fn to_percent(value: i32) -> Result<u8> {
    u8::try_from(value)
        .map_err(|_| Error::BadInput(format!("discount percent must be between 1 and 100, got {value}")))
}

fn to_stock(value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::BadInput(format!("stock must not be negative, got {value}")))
}

// ============================================================================
// Views
// ============================================================================

/// An account.
#[derive(SimpleObject)]
#[graphql(name = "User")]
pub struct UserView {
    id: ID,
    username: String,
    email: String,
    role: Role,
}

impl From<Identity> for UserView {
    fn from(identity: Identity) -> Self {
        Self {
            id: ID(identity.user_id.to_string()),
            username: identity.username,
            email: identity.email,
            role: identity.role,
        }
    }
}

/// Result of `register` and `login`.
#[derive(SimpleObject)]
pub struct AuthPayload {
    success: bool,
    error: Option<String>,
    token: Option<String>,
    user: Option<UserView>,
}

/// A showtime.
#[derive(SimpleObject)]
#[graphql(name = "Showtime")]
pub struct ShowtimeView {
    id: ID,
    movie_id: ID,
    auditorium_id: ID,
    start_time: DateTime<Utc>,
    unit_price: f64,
}

impl From<Showtime> for ShowtimeView {
    fn from(showtime: Showtime) -> Self {
        Self {
            id: ID(showtime.id.to_string()),
            movie_id: ID(showtime.movie_id.to_string()),
            auditorium_id: ID(showtime.auditorium_id.to_string()),
            start_time: showtime.start_time,
            unit_price: showtime.unit_price.to_decimal(),
        }
    }
}

/// One seat on a seat map. The holder is not disclosed.
#[derive(SimpleObject)]
#[graphql(name = "Seat")]
pub struct SeatView {
    seat_number: String,
    status: SeatStateKind,
    reserved_until: Option<DateTime<Utc>>,
}

impl From<SeatStatus> for SeatView {
    fn from(seat: SeatStatus) -> Self {
        Self {
            seat_number: seat.seat_number.to_string(),
            status: seat.state.kind(),
            reserved_until: seat.state.reserved_until(),
        }
    }
}

/// A booking.
#[derive(SimpleObject)]
#[graphql(name = "Booking")]
pub struct BookingView {
    id: ID,
    user_id: ID,
    showtime_id: ID,
    seat_numbers: Vec<String>,
    status: BookingStatus,
    total_price: f64,
    coupon_code: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Booking> for BookingView {
    fn from(booking: Booking) -> Self {
        Self {
            id: ID(booking.id.to_string()),
            user_id: ID(booking.user_id.to_string()),
            showtime_id: ID(booking.showtime_id.to_string()),
            seat_numbers: booking.seat_numbers.iter().map(ToString::to_string).collect(),
            status: booking.status,
            total_price: booking.total_price.to_decimal(),
            coupon_code: booking.coupon_code,
            created_at: booking.created_at,
            updated_at: booking.updated_at,
        }
    }
}

/// A payment. The proof itself is never echoed back.
#[derive(SimpleObject)]
#[graphql(name = "Payment")]
pub struct PaymentView {
    id: ID,
    user_id: ID,
    booking_id: ID,
    amount: f64,
    method: PaymentMethod,
    status: PaymentStatus,
    has_proof: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Payment> for PaymentView {
    fn from(payment: Payment) -> Self {
        Self {
            id: ID(payment.id.to_string()),
            user_id: ID(payment.user_id.to_string()),
            booking_id: ID(payment.booking_id.to_string()),
            amount: payment.amount.to_decimal(),
            method: payment.method,
            status: payment.status,
            has_proof: payment.proof.is_some(),
            created_at: payment.created_at,
            updated_at: payment.updated_at,
        }
    }
}

/// A coupon.
#[derive(SimpleObject)]
#[graphql(name = "Coupon")]
pub struct CouponView {
    id: ID,
    code: String,
    name: String,
    discount_percent: u8,
    valid_until: DateTime<Utc>,
    is_active: bool,
    stock: u32,
    issued_to: Option<ID>,
    created_at: DateTime<Utc>,
}

impl From<Coupon> for CouponView {
    fn from(coupon: Coupon) -> Self {
        Self {
            id: ID(coupon.id.to_string()),
            code: coupon.code,
            name: coupon.name,
            discount_percent: coupon.discount_percent,
            valid_until: coupon.valid_until,
            is_active: coupon.is_active,
            stock: coupon.stock,
            issued_to: coupon.issued_to.map(|user| ID(user.to_string())),
            created_at: coupon.created_at,
        }
    }
}

/// Result of `applyCoupon`.
#[derive(SimpleObject)]
pub struct CouponApplication {
    code: String,
    discount_percent: u8,
    discount_amount: f64,
    final_amount: f64,
}

impl From<CouponQuote> for CouponApplication {
    fn from(quote: CouponQuote) -> Self {
        Self {
            code: quote.coupon.code,
            discount_percent: quote.coupon.discount_percent,
            discount_amount: quote.discount.to_decimal(),
            final_amount: quote.final_amount.to_decimal(),
        }
    }
}

/// A user's loyalty standing.
#[derive(SimpleObject)]
pub struct LoyaltyStatus {
    payment_count: u32,
    last_coupon_milestone: u32,
    next_milestone: u32,
    coupons: Vec<CouponView>,
}

impl From<LoyaltyProgress> for LoyaltyStatus {
    fn from(progress: LoyaltyProgress) -> Self {
        Self {
            payment_count: progress.count.payment_count,
            last_coupon_milestone: progress.count.last_coupon_milestone,
            next_milestone: progress.next_milestone,
            coupons: progress.coupons.into_iter().map(Into::into).collect(),
        }
    }
}

/// Result of `createBooking`.
#[derive(SimpleObject)]
pub struct CheckoutPayload {
    booking: BookingView,
    payment: PaymentView,
}

/// Result of `uploadPaymentProof`. `reward` is the loyalty coupon issued by
/// this payment, if any.
#[derive(SimpleObject)]
pub struct ProofPayload {
    payment: PaymentView,
    booking: BookingView,
    reward: Option<CouponView>,
}

impl From<ProofOutcome> for ProofPayload {
    fn from(outcome: ProofOutcome) -> Self {
        Self {
            payment: outcome.payment.into(),
            booking: outcome.booking.into(),
            reward: outcome.reward.map(Into::into),
        }
    }
}

/// Movies slice.
#[derive(SimpleObject)]
pub struct MoviesResult {
    success: bool,
    error: Option<String>,
    data: Option<Vec<Movie>>,
}

/// Cinemas slice.
#[derive(SimpleObject)]
pub struct CinemasResult {
    success: bool,
    error: Option<String>,
    data: Option<Vec<Cinema>>,
}

/// Showtimes slice.
#[derive(SimpleObject)]
pub struct ShowtimesResult {
    success: bool,
    error: Option<String>,
    data: Option<Vec<ShowtimeView>>,
}

impl From<Slice<Vec<Movie>>> for MoviesResult {
    fn from(slice: Slice<Vec<Movie>>) -> Self {
        Self {
            success: slice.success,
            error: slice.error,
            data: slice.data,
        }
    }
}

impl From<Slice<Vec<Cinema>>> for CinemasResult {
    fn from(slice: Slice<Vec<Cinema>>) -> Self {
        Self {
            success: slice.success,
            error: slice.error,
            data: slice.data,
        }
    }
}

impl From<Slice<Vec<Showtime>>> for ShowtimesResult {
    fn from(slice: Slice<Vec<Showtime>>) -> Self {
        Self {
            success: slice.success,
            error: slice.error,
            data: slice
                .data
                .map(|showtimes| showtimes.into_iter().map(Into::into).collect()),
        }
    }
}

/// Result of `browse`.
#[derive(SimpleObject)]
pub struct BrowseResult {
    movies: MoviesResult,
    cinemas: CinemasResult,
    showtimes: ShowtimesResult,
}

impl From<Browse> for BrowseResult {
    fn from(browse: Browse) -> Self {
        Self {
            movies: browse.movies.into(),
            cinemas: browse.cinemas.into(),
            showtimes: browse.showtimes.into(),
        }
    }
}

// ============================================================================
// Inputs
// ============================================================================

/// Admin input for `createShowtime`. Give either `rows` with `seatsPerRow`,
/// or an explicit `seatNumbers` list.
#[derive(InputObject)]
pub struct CreateShowtimeInput {
    movie_id: ID,
    auditorium_id: ID,
    start_time: DateTime<Utc>,
    unit_price: f64,
    rows: Option<Vec<String>>,
    seats_per_row: Option<u16>,
    seat_numbers: Option<Vec<String>>,
}

impl CreateShowtimeInput {
    fn layout(&self) -> Result<SeatLayout> {
        match (&self.rows, self.seats_per_row, &self.seat_numbers) {
            (Some(rows), Some(seats_per_row), None) => Ok(SeatLayout::Grid {
                rows: rows.clone(),
                seats_per_row,
            }),
            (None, None, Some(labels)) => Ok(SeatLayout::Explicit(labels.clone())),
            _ => Err(Error::BadInput(
                "give either rows with seatsPerRow, or seatNumbers".into(),
            )),
        }
    }
}

/// Admin input for `createCoupon`.
#[derive(InputObject)]
pub struct CreateCouponInput {
    code: String,
    name: String,
    discount_percent: i32,
    valid_until: DateTime<Utc>,
    stock: i32,
}

/// Admin input for `updateCoupon`; omitted fields are left alone.
#[derive(InputObject)]
pub struct UpdateCouponInput {
    name: Option<String>,
    discount_percent: Option<i32>,
    valid_until: Option<DateTime<Utc>>,
    stock: Option<i32>,
    is_active: Option<bool>,
}

impl UpdateCouponInput {
    fn into_patch(self) -> Result<CouponPatch> {
        Ok(CouponPatch {
            name: self.name,
            discount_percent: self.discount_percent.map(to_percent).transpose()?,
            valid_until: self.valid_until,
            stock: self.stock.map(to_stock).transpose()?,
            is_active: self.is_active,
        })
    }
}

// ============================================================================
// Query
// ============================================================================

/// Read operations.
pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// The signed-in account
    async fn me(&self, ctx: &Context<'_>) -> async_graphql::Result<UserView> {
        Ok(caller(ctx).await?.into())
    }

    /// Movies from the movie service
    async fn movies(&self, ctx: &Context<'_>) -> async_graphql::Result<MoviesResult> {
        caller(ctx).await?;
        Ok(gateway(ctx)?.movies(authorization(ctx)).await.into())
    }

    /// Cinemas from the cinema service
    async fn cinemas(&self, ctx: &Context<'_>) -> async_graphql::Result<CinemasResult> {
        caller(ctx).await?;
        Ok(gateway(ctx)?.cinemas(authorization(ctx)).await.into())
    }

    /// Published showtimes
    async fn showtimes(&self, ctx: &Context<'_>) -> async_graphql::Result<ShowtimesResult> {
        caller(ctx).await?;
        Ok(gateway(ctx)?.showtimes().await.into())
    }

    /// Movies, cinemas and showtimes in one round trip
    async fn browse(&self, ctx: &Context<'_>) -> async_graphql::Result<BrowseResult> {
        caller(ctx).await?;
        Ok(gateway(ctx)?.browse(authorization(ctx)).await.into())
    }

    /// Seat states of a showtime
    async fn seat_map(&self, ctx: &Context<'_>, showtime_id: ID) -> async_graphql::Result<Vec<SeatView>> {
        caller(ctx).await?;
        let id = parse_id(&showtime_id, "showtime")?;
        let seats = gateway(ctx)?.seat_map(id).await.graphql()?;
        Ok(seats.into_iter().map(Into::into).collect())
    }

    /// The caller's bookings, newest first
    async fn my_bookings(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<BookingView>> {
        let identity = caller(ctx).await?;
        let bookings = gateway(ctx)?.my_bookings(&identity).await.graphql()?;
        Ok(bookings.into_iter().map(Into::into).collect())
    }

    /// The caller's payments, newest first
    async fn my_payments(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<PaymentView>> {
        let identity = caller(ctx).await?;
        let payments = gateway(ctx)?.my_payments(&identity).await.graphql()?;
        Ok(payments.into_iter().map(Into::into).collect())
    }

    /// The caller's loyalty standing
    async fn my_loyalty(&self, ctx: &Context<'_>) -> async_graphql::Result<LoyaltyStatus> {
        let identity = caller(ctx).await?;
        Ok(gateway(ctx)?.my_loyalty(&identity).await.graphql()?.into())
    }

    /// One booking
    async fn booking(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<BookingView> {
        let identity = caller(ctx).await?;
        let id = parse_id(&id, "booking")?;
        Ok(gateway(ctx)?.booking(&identity, id).await.graphql()?.into())
    }

    /// One payment
    async fn payment(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<PaymentView> {
        let identity = caller(ctx).await?;
        let id = parse_id(&id, "payment")?;
        Ok(gateway(ctx)?.payment(&identity, id).await.graphql()?.into())
    }

    /// Every account (admin)
    async fn users(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<UserView>> {
        let users = gateway(ctx)?.users(authorization(ctx)).await.graphql()?;
        Ok(users.into_iter().map(Into::into).collect())
    }

    /// Every booking (admin)
    async fn all_bookings(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<BookingView>> {
        admin(ctx).await?;
        let bookings = gateway(ctx)?.all_bookings().await.graphql()?;
        Ok(bookings.into_iter().map(Into::into).collect())
    }

    /// Every payment (admin)
    async fn all_payments(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<PaymentView>> {
        admin(ctx).await?;
        let payments = gateway(ctx)?.all_payments().await.graphql()?;
        Ok(payments.into_iter().map(Into::into).collect())
    }

    /// Every coupon (admin)
    async fn coupons(&self, ctx: &Context<'_>) -> async_graphql::Result<Vec<CouponView>> {
        admin(ctx).await?;
        let coupons = gateway(ctx)?.coupons().await.graphql()?;
        Ok(coupons.into_iter().map(Into::into).collect())
    }
}

// ============================================================================
// Mutation
// ============================================================================

fn auth_payload(result: Result<super::AuthSession>) -> AuthPayload {
    let slice = Slice::from_result(USER_SERVICE, result);
    let (token, user) = slice
        .data
        .map_or((None, None), |session| (Some(session.token), Some(session.user.into())));
    AuthPayload {
        success: slice.success,
        error: slice.error,
        token,
        user,
    }
}

/// Write operations.
pub struct MutationRoot;

#[Object]
impl MutationRoot {
    /// Creates an account
    async fn register(
        &self,
        ctx: &Context<'_>,
        username: String,
        email: String,
        password: String,
    ) -> async_graphql::Result<AuthPayload> {
        let result = gateway(ctx)?.register(&username, &email, &password).await;
        Ok(auth_payload(result))
    }

    /// Signs in
    async fn login(
        &self,
        ctx: &Context<'_>,
        email: String,
        password: String,
    ) -> async_graphql::Result<AuthPayload> {
        let result = gateway(ctx)?.login(&email, &password).await;
        Ok(auth_payload(result))
    }

    /// Reserves seats, redeems the coupon and opens a pending payment
    async fn create_booking(
        &self,
        ctx: &Context<'_>,
        showtime_id: ID,
        seat_numbers: Vec<String>,
        coupon_code: Option<String>,
        payment_method: Option<PaymentMethod>,
    ) -> async_graphql::Result<CheckoutPayload> {
        let identity = caller(ctx).await?;
        let request = BookingRequest {
            showtime_id: parse_id(&showtime_id, "showtime")?,
            seat_numbers,
            coupon_code: coupon_code.filter(|code| !code.trim().is_empty()),
            payment_method: payment_method.unwrap_or_default(),
        };
        let checkout = gateway(ctx)?
            .create_booking(&identity, request)
            .await
            .graphql()?;
        Ok(CheckoutPayload {
            booking: checkout.booking.into(),
            payment: checkout.payment.into(),
        })
    }

    /// Uploads payment proof, which approves the payment
    async fn upload_payment_proof(
        &self,
        ctx: &Context<'_>,
        payment_id: ID,
        proof: String,
    ) -> async_graphql::Result<ProofPayload> {
        let identity = caller(ctx).await?;
        let id = parse_id(&payment_id, "payment")?;
        Ok(gateway(ctx)?
            .upload_payment_proof(&identity, id, &proof)
            .await
            .graphql()?
            .into())
    }

    /// Cancels a pending payment within two hours of its creation
    async fn cancel_payment(&self, ctx: &Context<'_>, payment_id: ID) -> async_graphql::Result<PaymentView> {
        let identity = caller(ctx).await?;
        let id = parse_id(&payment_id, "payment")?;
        Ok(gateway(ctx)?.cancel_payment(&identity, id).await.graphql()?.into())
    }

    /// Cancels a pending booking
    async fn cancel_booking(&self, ctx: &Context<'_>, booking_id: ID) -> async_graphql::Result<BookingView> {
        let identity = caller(ctx).await?;
        let id = parse_id(&booking_id, "booking")?;
        Ok(gateway(ctx)?.cancel_booking(&identity, id).await.graphql()?.into())
    }

    /// Redeems a coupon against an amount
    async fn apply_coupon(
        &self,
        ctx: &Context<'_>,
        code: String,
        amount: f64,
    ) -> async_graphql::Result<CouponApplication> {
        let identity = caller(ctx).await?;
        let amount = parse_amount(amount)?;
        Ok(gateway(ctx)?
            .apply_coupon(&identity, &code, amount)
            .await
            .graphql()?
            .into())
    }

    /// Publishes a showtime (admin)
    async fn create_showtime(
        &self,
        ctx: &Context<'_>,
        input: CreateShowtimeInput,
    ) -> async_graphql::Result<ShowtimeView> {
        admin(ctx).await?;
        let layout = input.layout().graphql()?;
        let showtime = NewShowtime {
            movie_id: parse_id(&input.movie_id, "movie")?,
            auditorium_id: parse_id(&input.auditorium_id, "auditorium")?,
            start_time: input.start_time,
            unit_price: parse_amount(input.unit_price)?,
        };
        Ok(gateway(ctx)?
            .create_showtime(showtime, &layout)
            .await
            .graphql()?
            .into())
    }

    /// Removes an unsold showtime (admin)
    async fn delete_showtime(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<bool> {
        admin(ctx).await?;
        let id = parse_id(&id, "showtime")?;
        gateway(ctx)?.delete_showtime(id).await.graphql()?;
        Ok(true)
    }

    /// Creates a movie (admin, forwarded)
    async fn create_movie(&self, ctx: &Context<'_>, input: MovieInput) -> async_graphql::Result<Movie> {
        admin(ctx).await?;
        let header = forwarded_header(ctx)?;
        gateway(ctx)?.catalog().create_movie(&input, header).await.graphql()
    }

    /// Updates a movie (admin, forwarded)
    async fn update_movie(
        &self,
        ctx: &Context<'_>,
        id: ID,
        input: MovieInput,
    ) -> async_graphql::Result<Movie> {
        admin(ctx).await?;
        let header = forwarded_header(ctx)?;
        gateway(ctx)?
            .catalog()
            .update_movie(&id, &input, header)
            .await
            .graphql()
    }

    /// Deletes a movie (admin, forwarded)
    async fn delete_movie(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<bool> {
        admin(ctx).await?;
        let header = forwarded_header(ctx)?;
        gateway(ctx)?.catalog().delete_movie(&id, header).await.graphql()
    }

    /// Creates a cinema (admin, forwarded)
    async fn create_cinema(&self, ctx: &Context<'_>, input: CinemaInput) -> async_graphql::Result<Cinema> {
        admin(ctx).await?;
        let header = forwarded_header(ctx)?;
        gateway(ctx)?.catalog().create_cinema(&input, header).await.graphql()
    }

    /// Updates a cinema (admin, forwarded)
    async fn update_cinema(
        &self,
        ctx: &Context<'_>,
        id: ID,
        input: CinemaInput,
    ) -> async_graphql::Result<Cinema> {
        admin(ctx).await?;
        let header = forwarded_header(ctx)?;
        gateway(ctx)?
            .catalog()
            .update_cinema(&id, &input, header)
            .await
            .graphql()
    }

    /// Deletes a cinema (admin, forwarded)
    async fn delete_cinema(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<bool> {
        admin(ctx).await?;
        let header = forwarded_header(ctx)?;
        gateway(ctx)?.catalog().delete_cinema(&id, header).await.graphql()
    }

    /// Creates a coupon (admin)
    async fn create_coupon(
        &self,
        ctx: &Context<'_>,
        input: CreateCouponInput,
    ) -> async_graphql::Result<CouponView> {
        admin(ctx).await?;
        let coupon = NewCoupon {
            code: input.code,
            name: input.name,
            discount_percent: to_percent(input.discount_percent).graphql()?,
            valid_until: input.valid_until,
            stock: to_stock(input.stock).graphql()?,
        };
        Ok(gateway(ctx)?.create_coupon(coupon).await.graphql()?.into())
    }

    /// Updates a coupon (admin)
    async fn update_coupon(
        &self,
        ctx: &Context<'_>,
        id: ID,
        input: UpdateCouponInput,
    ) -> async_graphql::Result<CouponView> {
        admin(ctx).await?;
        let id = parse_id(&id, "coupon")?;
        let patch = input.into_patch().graphql()?;
        Ok(gateway(ctx)?.update_coupon(id, patch).await.graphql()?.into())
    }

    /// Deactivates a coupon (admin)
    async fn deactivate_coupon(&self, ctx: &Context<'_>, id: ID) -> async_graphql::Result<CouponView> {
        admin(ctx).await?;
        let id = parse_id(&id, "coupon")?;
        Ok(gateway(ctx)?.deactivate_coupon(id).await.graphql()?.into())
    }
}
