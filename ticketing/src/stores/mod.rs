//! Store implementations: in-memory for tests and local runs, `PostgreSQL`
//! for deployments.

pub mod memory;
pub mod postgres;

pub use memory::{
    InMemoryBookingStore, InMemoryLoyaltyStore, InMemoryPaymentStore, InMemorySeatStore,
    MemoryProbe,
};
pub use postgres::{
    PostgresBookingStore, PostgresLoyaltyStore, PostgresPaymentStore, PostgresProbe,
    PostgresSeatStore,
};
