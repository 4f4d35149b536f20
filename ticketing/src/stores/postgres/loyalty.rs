//! `PostgreSQL` loyalty counters, ledger and coupons.

use super::{is_unique_violation, storage};
use crate::providers::{
    LoyaltyStore, PaymentTally, REWARD_CODE_ATTEMPTS, RewardFn, reward_codes_exhausted,
};
use crate::types::{Coupon, CouponDeactivation, CouponPatch, UserPaymentCount};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cinema_core::{CouponId, Error, PaymentId, Result, UserId};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Loyalty and coupon tables.
#[derive(Clone)]
pub struct PostgresLoyaltyStore {
    pool: PgPool,
}

impl PostgresLoyaltyStore {
    /// Store over `pool`
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts `coupon`. With `skip_taken_code` a taken code inserts nothing
    /// and returns `false` instead of failing, which keeps `tx` usable.
    async fn insert_coupon_in(
        tx: &mut Transaction<'_, Postgres>,
        coupon: &Coupon,
        skip_taken_code: bool,
    ) -> Result<bool> {
        let on_conflict = if skip_taken_code {
            " ON CONFLICT (code) DO NOTHING"
        } else {
            ""
        };
        let inserted = sqlx::query(&format!(
            "INSERT INTO coupons ({COUPON_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10){on_conflict}"
        ))
        .bind(coupon.id.as_uuid())
        .bind(&coupon.code)
        .bind(&coupon.name)
        .bind(i16::from(coupon.discount_percent))
        .bind(coupon.valid_until)
        .bind(coupon.is_active)
        .bind(coupon.deactivated_by.map(|reason| reason.as_str()))
        .bind(count_to_db(coupon.stock)?)
        .bind(coupon.issued_to.map(|u| u.get()))
        .bind(coupon.created_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::BadInput(format!("coupon code '{}' already exists", coupon.code))
            } else {
                Error::internal(format!("Failed to insert coupon: {e}"))
            }
        })?
        .rows_affected();
        Ok(inserted == 1)
    }
}

#[derive(sqlx::FromRow)]
struct CountRow {
    user_id: i64,
    payment_count: i32,
    last_coupon_milestone: i32,
}

impl From<CountRow> for UserPaymentCount {
    #[allow(clippy::cast_sign_loss)] // CHECK constraints keep counters non-negative
    fn from(row: CountRow) -> Self {
        Self {
            user_id: UserId::new(row.user_id),
            payment_count: row.payment_count as u32,
            last_coupon_milestone: row.last_coupon_milestone as u32,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CouponRow {
    id: Uuid,
    code: String,
    name: String,
    discount_percent: i16,
    valid_until: DateTime<Utc>,
    is_active: bool,
    deactivated_by: Option<String>,
    stock: i32,
    issued_to: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CouponRow> for Coupon {
    type Error = Error;

    fn try_from(row: CouponRow) -> Result<Self> {
        let discount_percent = u8::try_from(row.discount_percent).map_err(|_| {
            Error::internal(format!(
                "coupon {} has discount {}",
                row.code, row.discount_percent
            ))
        })?;
        let stock = u32::try_from(row.stock)
            .map_err(|_| Error::internal(format!("coupon {} has stock {}", row.code, row.stock)))?;
        Ok(Self {
            id: CouponId::from_uuid(row.id),
            code: row.code,
            name: row.name,
            discount_percent,
            valid_until: row.valid_until,
            is_active: row.is_active,
            deactivated_by: row
                .deactivated_by
                .as_deref()
                .map(str::parse::<CouponDeactivation>)
                .transpose()?,
            stock,
            issued_to: row.issued_to.map(UserId::new),
            created_at: row.created_at,
        })
    }
}

const COUPON_COLUMNS: &str = "id, code, name, discount_percent, valid_until, is_active, \
     deactivated_by, stock, issued_to, created_at";

fn count_to_db(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::BadInput(format!("{value} is too large")))
}

fn convert(rows: Vec<CouponRow>) -> Result<Vec<Coupon>> {
    rows.into_iter().map(Coupon::try_from).collect()
}

#[async_trait]
impl LoyaltyStore for PostgresLoyaltyStore {
    async fn record_payment(
        &self,
        user_id: UserId,
        payment_id: PaymentId,
        at: DateTime<Utc>,
        reward: &RewardFn,
    ) -> Result<PaymentTally> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;

        let inserted = sqlx::query(
            "INSERT INTO loyalty_ledger (payment_id, user_id, counted_at)
             VALUES ($1, $2, $3)
             ON CONFLICT (payment_id) DO NOTHING",
        )
        .bind(payment_id.as_uuid())
        .bind(user_id.get())
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(storage("Failed to record loyalty payment"))?
        .rows_affected();

        if inserted == 0 {
            tx.rollback()
                .await
                .map_err(storage("Failed to roll back loyalty payment"))?;
            return Ok(PaymentTally {
                counted: false,
                progress: self.progress(user_id).await?,
                reward: None,
            });
        }

        let row: CountRow = sqlx::query_as(
            "INSERT INTO user_payment_counts (user_id, payment_count, last_coupon_milestone, updated_at)
             VALUES ($1, 1, 0, $2)
             ON CONFLICT (user_id) DO UPDATE
             SET payment_count = user_payment_counts.payment_count + 1,
                 updated_at = EXCLUDED.updated_at
             RETURNING user_id, payment_count, last_coupon_milestone",
        )
        .bind(user_id.get())
        .bind(at)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage("Failed to increment payment count"))?;
        let mut progress = UserPaymentCount::from(row);

        let mut issued = None;
        for _ in 0..REWARD_CODE_ATTEMPTS {
            match reward(&progress) {
                Some(drawn) => {
                    if Self::insert_coupon_in(&mut tx, &drawn.1, true).await? {
                        issued = Some(Some(drawn));
                        break;
                    }
                }
                None => {
                    issued = Some(None);
                    break;
                }
            }
        }
        let issued = issued.ok_or_else(|| reward_codes_exhausted(user_id))?;
        if let Some((milestone, _)) = &issued {
            sqlx::query(
                "UPDATE user_payment_counts SET last_coupon_milestone = $2
                 WHERE user_id = $1 AND last_coupon_milestone < $2",
            )
            .bind(user_id.get())
            .bind(count_to_db(*milestone)?)
            .execute(&mut *tx)
            .await
            .map_err(storage("Failed to advance coupon milestone"))?;
            progress.last_coupon_milestone = *milestone;
        }

        tx.commit()
            .await
            .map_err(storage("Failed to commit loyalty payment"))?;
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
        at: DateTime<Utc>,
    ) -> Result<Option<UserPaymentCount>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;

        let marked = sqlx::query(
            "UPDATE loyalty_ledger SET refunded_at = $3
             WHERE payment_id = $1 AND user_id = $2 AND refunded_at IS NULL",
        )
        .bind(payment_id.as_uuid())
        .bind(user_id.get())
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(storage("Failed to record loyalty refund"))?
        .rows_affected();
        if marked == 0 {
            tx.rollback()
                .await
                .map_err(storage("Failed to roll back loyalty refund"))?;
            return Ok(None);
        }

        let row: Option<CountRow> = sqlx::query_as(
            "UPDATE user_payment_counts
             SET payment_count = GREATEST(payment_count - 1, 0), updated_at = $2
             WHERE user_id = $1
             RETURNING user_id, payment_count, last_coupon_milestone",
        )
        .bind(user_id.get())
        .bind(at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage("Failed to decrement payment count"))?;

        tx.commit()
            .await
            .map_err(storage("Failed to commit loyalty refund"))?;
        Ok(Some(
            row.map_or_else(|| UserPaymentCount::zero(user_id), Into::into),
        ))
    }

    async fn progress(&self, user_id: UserId) -> Result<UserPaymentCount> {
        let row: Option<CountRow> = sqlx::query_as(
            "SELECT user_id, payment_count, last_coupon_milestone
             FROM user_payment_counts WHERE user_id = $1",
        )
        .bind(user_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("Failed to load payment count"))?;
        Ok(row.map_or_else(|| UserPaymentCount::zero(user_id), Into::into))
    }

    async fn insert_coupon(&self, coupon: &Coupon) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;
        Self::insert_coupon_in(&mut tx, coupon, false).await?;
        tx.commit()
            .await
            .map_err(storage("Failed to commit coupon"))
    }

    async fn coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let row: Option<CouponRow> =
            sqlx::query_as(&format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1"))
                .bind(code)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage("Failed to load coupon"))?;
        row.map(Coupon::try_from).transpose()
    }

    async fn coupon(&self, id: CouponId) -> Result<Option<Coupon>> {
        let row: Option<CouponRow> =
            sqlx::query_as(&format!("SELECT {COUPON_COLUMNS} FROM coupons WHERE id = $1"))
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(storage("Failed to load coupon"))?;
        row.map(Coupon::try_from).transpose()
    }

    async fn coupons(&self) -> Result<Vec<Coupon>> {
        let rows: Vec<CouponRow> = sqlx::query_as(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons ORDER BY created_at DESC, code"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to list coupons"))?;
        convert(rows)
    }

    async fn coupons_issued_to(&self, user_id: UserId) -> Result<Vec<Coupon>> {
        let rows: Vec<CouponRow> = sqlx::query_as(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons
             WHERE issued_to = $1
             ORDER BY created_at DESC, code"
        ))
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(storage("Failed to list issued coupons"))?;
        convert(rows)
    }

    async fn has_used(&self, user_id: UserId, coupon_id: CouponId) -> Result<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM user_coupon_usages WHERE user_id = $1 AND coupon_id = $2
             )",
        )
        .bind(user_id.get())
        .bind(coupon_id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(storage("Failed to check coupon usage"))
    }

    async fn update_coupon(&self, id: CouponId, patch: &CouponPatch) -> Result<Option<Coupon>> {
        let stock = patch.stock.map(count_to_db).transpose()?;
        let row: Option<CouponRow> = sqlx::query_as(&format!(
            "UPDATE coupons SET
                 name = COALESCE($2, name),
                 discount_percent = COALESCE($3, discount_percent),
                 valid_until = COALESCE($4, valid_until),
                 stock = COALESCE($5, stock),
                 is_active = COALESCE($6, is_active),
                 deactivated_by = CASE
                     WHEN $6::BOOLEAN IS NULL THEN deactivated_by
                     WHEN $6 THEN NULL
                     ELSE 'admin'
                 END
             WHERE id = $1
             RETURNING {COUPON_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(patch.name.as_deref())
        .bind(patch.discount_percent.map(i16::from))
        .bind(patch.valid_until)
        .bind(stock)
        .bind(patch.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage("Failed to update coupon"))?;
        row.map(Coupon::try_from).transpose()
    }

    async fn redeem(&self, user_id: UserId, code: &str, at: DateTime<Utc>) -> Result<Coupon> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;

        let row: Option<CouponRow> = sqlx::query_as(&format!(
            "SELECT {COUPON_COLUMNS} FROM coupons WHERE code = $1 FOR UPDATE"
        ))
        .bind(code)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage("Failed to lock coupon"))?;
        let coupon = Coupon::try_from(row.ok_or_else(|| Error::CouponUnknown {
            code: code.to_string(),
        })?)?;

        let used: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM user_coupon_usages WHERE user_id = $1 AND coupon_id = $2
             )",
        )
        .bind(user_id.get())
        .bind(coupon.id.as_uuid())
        .fetch_one(&mut *tx)
        .await
        .map_err(storage("Failed to check coupon usage"))?;
        coupon.check_redeemable(at, used)?;

        sqlx::query(
            "UPDATE coupons
             SET stock = stock - 1,
                 is_active = CASE WHEN stock - 1 = 0 THEN FALSE ELSE is_active END,
                 deactivated_by = CASE
                     WHEN stock - 1 = 0 THEN 'out_of_stock'
                     ELSE deactivated_by
                 END
             WHERE id = $1",
        )
        .bind(coupon.id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(storage("Failed to decrement coupon stock"))?;

        sqlx::query(
            "INSERT INTO user_coupon_usages (user_id, coupon_id, used_at) VALUES ($1, $2, $3)",
        )
        .bind(user_id.get())
        .bind(coupon.id.as_uuid())
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(storage("Failed to record coupon usage"))?;

        tx.commit()
            .await
            .map_err(storage("Failed to commit coupon redemption"))?;
        Ok(coupon)
    }

    async fn restore(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(storage("Failed to begin transaction"))?;

        let removed = sqlx::query(
            "DELETE FROM user_coupon_usages WHERE user_id = $1 AND coupon_id = $2",
        )
        .bind(user_id.get())
        .bind(coupon_id.as_uuid())
        .execute(&mut *tx)
        .await
        .map_err(storage("Failed to remove coupon usage"))?
        .rows_affected();
        if removed == 0 {
            tx.rollback()
                .await
                .map_err(storage("Failed to roll back coupon restore"))?;
            return Ok(false);
        }

        // Only a coupon switched off by selling out comes back on.
        sqlx::query(
            "UPDATE coupons
             SET is_active = CASE
                     WHEN deactivated_by = 'out_of_stock' AND valid_until >= $2 THEN TRUE
                     ELSE is_active
                 END,
                 deactivated_by = CASE
                     WHEN deactivated_by = 'out_of_stock' AND valid_until >= $2 THEN NULL
                     ELSE deactivated_by
                 END,
                 stock = stock + 1
             WHERE id = $1",
        )
        .bind(coupon_id.as_uuid())
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(storage("Failed to restore coupon stock"))?;

        tx.commit()
            .await
            .map_err(storage("Failed to commit coupon restore"))?;
        Ok(true)
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        sqlx::query(
            "UPDATE coupons SET is_active = FALSE, deactivated_by = 'expired'
             WHERE is_active AND valid_until < $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await
        .map(|done| done.rows_affected())
        .map_err(storage("Failed to deactivate expired coupons"))
    }
}
