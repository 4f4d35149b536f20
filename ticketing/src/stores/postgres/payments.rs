//! `PostgreSQL` payments.

use super::{cents_from_db, cents_to_db, is_unique_violation, storage};
use crate::providers::PaymentStore;
use crate::types::{Payment, PaymentStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cinema_core::{BookingId, Error, PaymentId, Result, UserId};
use sqlx::PgPool;
use uuid::Uuid;

/// Payments in the `payments` table.
///
/// The partial unique index `payments_one_active_per_booking` enforces a
/// single pending or paid payment per booking.
#[derive(Clone)]
pub struct PostgresPaymentStore {
    pool: PgPool,
}

impl PostgresPaymentStore {
    /// Store over `pool`
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    user_id: i64,
    booking_id: Uuid,
    amount_cents: i64,
    method: String,
    status: String,
    proof: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = Error;

    fn try_from(row: PaymentRow) -> Result<Self> {
        Ok(Self {
            id: PaymentId::from_uuid(row.id),
            user_id: UserId::new(row.user_id),
            booking_id: BookingId::from_uuid(row.booking_id),
            amount: cents_from_db(row.amount_cents),
            method: row
                .method
                .parse()
                .map_err(|e: Error| Error::internal(e.to_string()))?,
            status: row.status.parse()?,
            proof: row.proof,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const COLUMNS: &str =
    "id, user_id, booking_id, amount_cents, method, status, proof, created_at, updated_at";

fn convert(rows: Vec<PaymentRow>) -> Result<Vec<Payment>> {
    rows.into_iter().map(Payment::try_from).collect()
}

#[async_trait]
impl PaymentStore for PostgresPaymentStore {
    async fn insert(&self, payment: &Payment) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO payments ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
        ))
        .bind(payment.id.as_uuid())
        .bind(payment.user_id.get())
        .bind(payment.booking_id.as_uuid())
        .bind(cents_to_db(payment.amount)?)
        .bind(payment.method.as_str())
        .bind(payment.status.as_str())
        .bind(payment.proof.as_deref())
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::IllegalState(format!(
                    "booking {} already has an active payment",
                    payment.booking_id
                ))
            } else {
                Error::internal(format!("Failed to insert payment: {e}"))
            }
        })?;
        Ok(())
    }

    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        let row: Option<PaymentRow> =
            sqlx::query_as(&format!("SELECT {COLUMNS} FROM payments WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(storage("Failed to load payment"))?;
        row.map(Payment::try_from).transpose()
    }

    async fn for_user(&self, user_id: UserId) -> Result<Vec<Payment>> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM payments WHERE user_id = $1 ORDER BY created_at DESC, id"
        ))
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to list user payments"))?;
        convert(rows)
    }

    async fn for_booking(&self, booking_id: BookingId) -> Result<Vec<Payment>> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM payments WHERE booking_id = $1 ORDER BY created_at DESC, id"
        ))
        .bind(booking_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to list booking payments"))?;
        convert(rows)
    }

    async fn all(&self) -> Result<Vec<Payment>> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM payments ORDER BY created_at DESC, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to list payments"))?;
        convert(rows)
    }

    async fn transition(
        &self,
        id: PaymentId,
        from: PaymentStatus,
        to: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Payment>> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "UPDATE payments SET status = $3, updated_at = $4
             WHERE id = $1 AND status = $2
             RETURNING {COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("Failed to update payment status"))?;
        row.map(Payment::try_from).transpose()
    }

    async fn attach_proof(
        &self,
        id: PaymentId,
        proof: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Payment>> {
        let row: Option<PaymentRow> = sqlx::query_as(&format!(
            "UPDATE payments SET proof = $2, status = 'paid', updated_at = $3
             WHERE id = $1 AND status = 'pending'
             RETURNING {COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(proof)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("Failed to attach payment proof"))?;
        row.map(Payment::try_from).transpose()
    }

    async fn fail_stale(&self, cutoff: DateTime<Utc>, at: DateTime<Utc>) -> Result<Vec<Payment>> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "UPDATE payments SET status = 'failed', updated_at = $2
             WHERE status = 'pending' AND proof IS NULL AND created_at < $1
             RETURNING {COLUMNS}"
        ))
        .bind(cutoff)
        .bind(at)
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to expire payments"))?;
        convert(rows)
    }

    async fn mark_settled(&self, id: PaymentId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE payments SET settled_at = $2 WHERE id = $1 AND settled_at IS NULL")
            .bind(id.as_uuid())
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(storage("Failed to mark payment settled"))?;
        Ok(())
    }

    async fn unsettled(&self, cutoff: DateTime<Utc>) -> Result<Vec<Payment>> {
        let rows: Vec<PaymentRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM payments
             WHERE status IN ('paid', 'refunded') AND settled_at IS NULL AND updated_at < $1
             ORDER BY updated_at, id"
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to list unsettled payments"))?;
        convert(rows)
    }
}
