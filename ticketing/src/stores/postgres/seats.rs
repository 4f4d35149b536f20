//! `PostgreSQL` seat inventory.

use super::{cents_from_db, cents_to_db, storage};
use crate::providers::SeatStore;
use crate::providers::seats::{plan_confirm, plan_release, plan_reserve};
use crate::types::{
    ExpiredHold, NewShowtime, SeatNumber, SeatState, SeatStateKind, SeatStatus, Showtime,
    seat_labels,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cinema_core::{AuditoriumId, BookingId, Error, MovieId, Result, ShowtimeId};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Seat inventory in the `showtimes` and `seat_statuses` tables.
#[derive(Clone)]
pub struct PostgresSeatStore {
    pool: PgPool,
}

impl PostgresSeatStore {
    /// Store over `pool`
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Locks the showtime's requested seats in seat order and returns their
    /// current states.
    async fn lock_seats(
        tx: &mut Transaction<'_, Postgres>,
        showtime_id: ShowtimeId,
        seats: &[SeatNumber],
    ) -> Result<HashMap<SeatNumber, SeatState>> {
        let rows: Vec<SeatRow> = sqlx::query_as(
            "SELECT showtime_id, seat_number, status, booking_id, reserved_until
             FROM seat_statuses
             WHERE showtime_id = $1 AND seat_number = ANY($2)
             ORDER BY seat_number
             FOR UPDATE",
        )
        .bind(showtime_id.get())
        .bind(seat_labels(seats))
        .fetch_all(&mut **tx)
        .await
        .map_err(storage("Failed to lock seats"))?;

        rows.into_iter()
            .map(|row| {
                let status = row.into_status()?;
                Ok((status.seat_number, status.state))
            })
            .collect()
    }

    async fn write_states(
        tx: &mut Transaction<'_, Postgres>,
        showtime_id: ShowtimeId,
        plan: &[(SeatNumber, SeatState)],
    ) -> Result<()> {
        for (seat, state) in plan {
            sqlx::query(
                "UPDATE seat_statuses
                 SET status = $3, booking_id = $4, reserved_until = $5
                 WHERE showtime_id = $1 AND seat_number = $2",
            )
            .bind(showtime_id.get())
            .bind(seat.as_str())
            .bind(state.kind().as_str())
            .bind(state.booking_id().map(|id| *id.as_uuid()))
            .bind(state.reserved_until())
            .execute(&mut **tx)
            .await
            .map_err(storage("Failed to update seat"))?;
        }
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ShowtimeRow {
    id: i64,
    movie_id: i64,
    auditorium_id: i64,
    start_time: DateTime<Utc>,
    unit_price_cents: i64,
    created_at: DateTime<Utc>,
}

impl From<ShowtimeRow> for Showtime {
    fn from(row: ShowtimeRow) -> Self {
        Self {
            id: ShowtimeId::new(row.id),
            movie_id: MovieId::new(row.movie_id),
            auditorium_id: AuditoriumId::new(row.auditorium_id),
            start_time: row.start_time,
            unit_price: cents_from_db(row.unit_price_cents),
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    showtime_id: i64,
    seat_number: String,
    status: String,
    booking_id: Option<Uuid>,
    reserved_until: Option<DateTime<Utc>>,
}

impl SeatRow {
    fn into_status(self) -> Result<SeatStatus> {
        let kind: SeatStateKind = self.status.parse()?;
        let state = match (kind, self.booking_id, self.reserved_until) {
            (SeatStateKind::Available, _, _) => SeatState::Available,
            (SeatStateKind::Reserved, Some(id), Some(until)) => SeatState::Reserved {
                booking_id: BookingId::from_uuid(id),
                until,
            },
            (SeatStateKind::Booked, Some(id), _) => SeatState::Booked {
                booking_id: BookingId::from_uuid(id),
            },
            _ => {
                return Err(Error::internal(format!(
                    "seat {} of showtime {} is {kind} without an owner",
                    self.seat_number, self.showtime_id
                )));
            }
        };
        Ok(SeatStatus {
            showtime_id: ShowtimeId::new(self.showtime_id),
            seat_number: SeatNumber::parse(&self.seat_number)?,
            state,
        })
    }
}

const SHOWTIME_COLUMNS: &str =
    "id, movie_id, auditorium_id, start_time, unit_price_cents, created_at";

#[async_trait]
impl SeatStore for PostgresSeatStore {
    async fn insert_showtime(
        &self,
        showtime: NewShowtime,
        seats: &[SeatNumber],
        at: DateTime<Utc>,
    ) -> Result<Showtime> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;

        let row: ShowtimeRow = sqlx::query_as(&format!(
            "INSERT INTO showtimes (movie_id, auditorium_id, start_time, unit_price_cents, created_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {SHOWTIME_COLUMNS}"
        ))
        .bind(showtime.movie_id.get())
        .bind(showtime.auditorium_id.get())
        .bind(showtime.start_time)
        .bind(cents_to_db(showtime.unit_price)?)
        .bind(at)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage("Failed to insert showtime"))?;

        sqlx::query(
            "INSERT INTO seat_statuses (showtime_id, seat_number, status)
             SELECT $1, seat, 'AVAILABLE' FROM UNNEST($2::text[]) AS seat",
        )
        .bind(row.id)
        .bind(seat_labels(seats))
        .execute(&mut *tx)
        .await
        .map_err(storage("Failed to insert seats"))?;

        tx.commit()
            .await
            .map_err(storage("Failed to commit showtime"))?;
        Ok(row.into())
    }

    async fn showtime(&self, id: ShowtimeId) -> Result<Option<Showtime>> {
        let row: Option<ShowtimeRow> = sqlx::query_as(&format!(
            "SELECT {SHOWTIME_COLUMNS} FROM showtimes WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("Failed to load showtime"))?;
        Ok(row.map(Into::into))
    }

    async fn showtimes(&self) -> Result<Vec<Showtime>> {
        let rows: Vec<ShowtimeRow> = sqlx::query_as(&format!(
            "SELECT {SHOWTIME_COLUMNS} FROM showtimes ORDER BY start_time, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to list showtimes"))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_showtime(&self, id: ShowtimeId) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT id FROM showtimes WHERE id = $1 FOR UPDATE")
                .bind(id.get())
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage("Failed to lock showtime"))?;
        if exists.is_none() {
            return Ok(false);
        }

        let held: Vec<String> = sqlx::query_scalar(
            "SELECT seat_number FROM seat_statuses
             WHERE showtime_id = $1 AND status <> 'AVAILABLE'
             ORDER BY seat_number
             FOR UPDATE",
        )
        .bind(id.get())
        .fetch_all(&mut *tx)
        .await
        .map_err(storage("Failed to check held seats"))?;
        if !held.is_empty() {
            return Err(Error::IllegalState(format!(
                "showtime {id} still has {} reserved or booked seats",
                held.len()
            )));
        }

        sqlx::query("DELETE FROM showtimes WHERE id = $1")
            .bind(id.get())
            .execute(&mut *tx)
            .await
            .map_err(storage("Failed to delete showtime"))?;
        tx.commit()
            .await
            .map_err(storage("Failed to commit showtime deletion"))?;
        Ok(true)
    }

    async fn seats(&self, showtime_id: ShowtimeId) -> Result<Vec<SeatStatus>> {
        let rows: Vec<SeatRow> = sqlx::query_as(
            "SELECT showtime_id, seat_number, status, booking_id, reserved_until
             FROM seat_statuses
             WHERE showtime_id = $1
             ORDER BY seat_number",
        )
        .bind(showtime_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to load seats"))?;
        rows.into_iter().map(SeatRow::into_status).collect()
    }

    async fn reserve(
        &self,
        showtime_id: ShowtimeId,
        seats: &[SeatNumber],
        booking_id: BookingId,
        until: DateTime<Utc>,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;
        let current = Self::lock_seats(&mut tx, showtime_id, seats).await?;
        let plan = plan_reserve(seats, booking_id, until, |s| current.get(s).cloned())?;
        Self::write_states(&mut tx, showtime_id, &plan).await?;
        tx.commit()
            .await
            .map_err(storage("Failed to commit reservation"))
    }

    async fn confirm(
        &self,
        showtime_id: ShowtimeId,
        seats: &[SeatNumber],
        booking_id: BookingId,
    ) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;
        let current = Self::lock_seats(&mut tx, showtime_id, seats).await?;
        let plan = plan_confirm(seats, booking_id, |s| current.get(s).cloned())?;
        Self::write_states(&mut tx, showtime_id, &plan).await?;
        tx.commit()
            .await
            .map_err(storage("Failed to commit confirmation"))
    }

    async fn release(
        &self,
        showtime_id: ShowtimeId,
        seats: &[SeatNumber],
        booking_id: BookingId,
    ) -> Result<Vec<SeatNumber>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;
        let current = Self::lock_seats(&mut tx, showtime_id, seats).await?;
        let released = plan_release(seats, booking_id, |s| current.get(s).cloned());
        let plan: Vec<(SeatNumber, SeatState)> = released
            .iter()
            .map(|seat| (seat.clone(), SeatState::Available))
            .collect();
        Self::write_states(&mut tx, showtime_id, &plan).await?;
        tx.commit()
            .await
            .map_err(storage("Failed to commit release"))?;
        Ok(released)
    }

    async fn expire_holds(&self, now: DateTime<Utc>) -> Result<Vec<ExpiredHold>> {
        let rows: Vec<(i64, String, Uuid)> = sqlx::query_as(
            "WITH expired AS (
                 SELECT showtime_id, seat_number, booking_id
                 FROM seat_statuses
                 WHERE status = 'RESERVED' AND reserved_until < $1
                 ORDER BY showtime_id, seat_number
                 FOR UPDATE SKIP LOCKED
             )
             UPDATE seat_statuses s
             SET status = 'AVAILABLE', booking_id = NULL, reserved_until = NULL
             FROM expired e
             WHERE s.showtime_id = e.showtime_id AND s.seat_number = e.seat_number
             RETURNING e.showtime_id, e.seat_number, e.booking_id",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to expire seat holds"))?;

        let mut groups: BTreeMap<(ShowtimeId, BookingId), Vec<SeatNumber>> = BTreeMap::new();
        for (showtime_id, seat, booking_id) in rows {
            groups
                .entry((ShowtimeId::new(showtime_id), BookingId::from_uuid(booking_id)))
                .or_default()
                .push(SeatNumber::parse(&seat)?);
        }
        Ok(groups
            .into_iter()
            .map(|((showtime_id, booking_id), mut seats)| {
                seats.sort();
                ExpiredHold {
                    showtime_id,
                    booking_id,
                    seats,
                }
            })
            .collect())
    }
}
