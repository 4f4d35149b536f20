//! `PostgreSQL` bookings.

use super::{cents_from_db, cents_to_db, storage};
use crate::providers::BookingStore;
use crate::types::{Booking, BookingStatus, SeatNumber, seat_labels};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cinema_core::{BookingId, Result, ShowtimeId, UserId};
use sqlx::PgPool;
use uuid::Uuid;

/// Bookings in the `bookings` table.
#[derive(Clone)]
pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    /// Store over `pool`
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: i64,
    showtime_id: i64,
    seat_numbers: Vec<String>,
    status: String,
    total_price_cents: i64,
    coupon_code: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = cinema_core::Error;

    fn try_from(row: BookingRow) -> Result<Self> {
        let seat_numbers = row
            .seat_numbers
            .iter()
            .map(|label| SeatNumber::parse(label))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            id: BookingId::from_uuid(row.id),
            user_id: UserId::new(row.user_id),
            showtime_id: ShowtimeId::new(row.showtime_id),
            seat_numbers,
            status: row.status.parse()?,
            total_price: cents_from_db(row.total_price_cents),
            coupon_code: row.coupon_code,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const COLUMNS: &str = "id, user_id, showtime_id, seat_numbers, status, total_price_cents, \
                       coupon_code, created_at, updated_at";

fn convert(rows: Vec<BookingRow>) -> Result<Vec<Booking>> {
    rows.into_iter().map(Booking::try_from).collect()
}

#[async_trait]
impl BookingStore for PostgresBookingStore {
    async fn insert(&self, booking: &Booking) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO bookings ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(booking.id.as_uuid())
        .bind(booking.user_id.get())
        .bind(booking.showtime_id.get())
        .bind(seat_labels(&booking.seat_numbers))
        .bind(booking.status.as_str())
        .bind(cents_to_db(booking.total_price)?)
        .bind(booking.coupon_code.as_deref())
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage("Failed to insert booking"))?;
        Ok(())
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>> {
        let row: Option<BookingRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM bookings WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(storage("Failed to load booking"))?;
        row.map(Booking::try_from).transpose()
    }

    async fn for_user(&self, user_id: UserId) -> Result<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM bookings WHERE user_id = $1 ORDER BY created_at DESC, id"
        ))
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to list user bookings"))?;
        convert(rows)
    }

    async fn all(&self) -> Result<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM bookings ORDER BY created_at DESC, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to list bookings"))?;
        convert(rows)
    }

    async fn transition(
        &self,
        id: BookingId,
        from: BookingStatus,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(&format!(
            "UPDATE bookings SET status = $3, updated_at = $4
             WHERE id = $1 AND status = $2
             RETURNING {COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("Failed to update booking status"))?;
        row.map(Booking::try_from).transpose()
    }

    async fn pending_created_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM bookings
             WHERE status = $1 AND created_at < $2
             ORDER BY created_at, id"
        ))
        .bind(BookingStatus::Pending.as_str())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to list stale bookings"))?;
        convert(rows)
    }
}
