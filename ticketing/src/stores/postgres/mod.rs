//! `PostgreSQL` stores.
//!
//! Every component store shares one `PgPool`; each keeps to its own tables.
//! Multi-row operations run in a single transaction with `SELECT … FOR
//! UPDATE` on the rows they change, locked in a stable order.

use crate::config::PostgresConfig;
use crate::providers::Probe;
use async_trait::async_trait;
use cinema_core::{Error, Money, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

mod bookings;
mod loyalty;
mod payments;
mod seats;

pub use bookings::PostgresBookingStore;
pub use loyalty::PostgresLoyaltyStore;
pub use payments::PostgresPaymentStore;
pub use seats::PostgresSeatStore;

/// Connects a pool using the configured limits.
///
/// # Errors
///
/// Returns the connection error.
pub async fn connect(config: &PostgresConfig) -> std::result::Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout))
        .connect(&config.url)
        .await
}

/// Applies the embedded schema migrations.
///
/// # Errors
///
/// Returns the migration error.
pub async fn migrate(pool: &PgPool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Maps a sqlx error into `INTERNAL_ERROR` with context.
pub(crate) fn storage(context: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| Error::internal(format!("{context}: {e}"))
}

/// Whether the error is a unique-constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

pub(crate) fn cents_to_db(money: Money) -> Result<i64> {
    i64::try_from(money.cents()).map_err(|_| Error::BadInput(format!("amount {money} too large")))
}

#[allow(clippy::cast_sign_loss)] // CHECK constraints keep amounts non-negative
pub(crate) const fn cents_from_db(cents: i64) -> Money {
    Money::from_cents(cents as u64)
}

/// Readiness probe running `SELECT 1`.
pub struct PostgresProbe {
    pool: PgPool,
}

impl PostgresProbe {
    /// Probe over `pool`
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Probe for PostgresProbe {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(storage("database ping"))
    }
}
