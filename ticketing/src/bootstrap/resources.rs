//! Store backends.

use crate::config::{Config, StorageBackend};
use crate::providers::{BookingStore, LoyaltyStore, PaymentStore, Probe, SeatStore};
use crate::stores::{
    InMemoryBookingStore, InMemoryLoyaltyStore, InMemoryPaymentStore, InMemorySeatStore,
    MemoryProbe, PostgresBookingStore, PostgresLoyaltyStore, PostgresPaymentStore, PostgresProbe,
    PostgresSeatStore, postgres,
};
use std::sync::Arc;
use tracing::info;

/// One store per component plus the probes `/ready` runs.
#[derive(Clone)]
pub struct Resources {
    /// Showtimes and seats
    pub seats: Arc<dyn SeatStore>,
    /// Bookings
    pub bookings: Arc<dyn BookingStore>,
    /// Payments
    pub payments: Arc<dyn PaymentStore>,
    /// Loyalty counters and coupons
    pub loyalty: Arc<dyn LoyaltyStore>,
    /// Readiness probes
    pub probes: Vec<Arc<dyn Probe>>,
}

impl Resources {
    /// Process-local stores; state is lost on restart.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            seats: Arc::new(InMemorySeatStore::new()),
            bookings: Arc::new(InMemoryBookingStore::new()),
            payments: Arc::new(InMemoryPaymentStore::new()),
            loyalty: Arc::new(InMemoryLoyaltyStore::new()),
            probes: vec![Arc::new(MemoryProbe)],
        }
    }

    /// `PostgreSQL` stores over one shared pool.
    #[must_use]
    pub fn postgres(pool: &sqlx::PgPool) -> Self {
        Self {
            seats: Arc::new(PostgresSeatStore::new(pool.clone())),
            bookings: Arc::new(PostgresBookingStore::new(pool.clone())),
            payments: Arc::new(PostgresPaymentStore::new(pool.clone())),
            loyalty: Arc::new(PostgresLoyaltyStore::new(pool.clone())),
            probes: vec![Arc::new(PostgresProbe::new(pool.clone()))],
        }
    }

    /// Builds the backend selected by `STORAGE_BACKEND`. For `PostgreSQL`
    /// this connects and applies migrations.
    ///
    /// # Errors
    ///
    /// Returns error if the database is unreachable or a migration fails.
    pub async fn from_config(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        match config.storage {
            StorageBackend::Memory => {
                info!("Using in-memory stores");
                Ok(Self::in_memory())
            }
            StorageBackend::Postgres => {
                info!(
                    max_connections = config.postgres.max_connections,
                    "Connecting to PostgreSQL..."
                );
                let pool = postgres::connect(&config.postgres).await?;
                postgres::migrate(&pool).await?;
                info!("PostgreSQL connected, migrations applied");
                Ok(Self::postgres(&pool))
            }
        }
    }
}
