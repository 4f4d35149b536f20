//! Cinema ticketing backend.
//!
//! One GraphQL endpoint in front of four core components and three remote
//! collaborators:
//!
//! ```text
//!                       ┌──────────────────────┐
//!  clients ── /graphql ─►       Gateway        ├──► user / movie / cinema
//!                       └──────────┬───────────┘      services (HTTP)
//!                                  │
//!        ┌─────────────────┬───────┴─────────┬──────────────────┐
//!        ▼                 ▼                 ▼                  ▼
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │   Payment    │─►│   Booking    │─►│     Seat     │  │   Loyalty    │
//! │   Manager    │  │   Manager    │  │  Inventory   │  │    Engine    │
//! └──────────────┘  └──────────────┘  └──────────────┘  └──────────────┘
//!                                  ▲
//!                          ┌───────┴──────┐
//!                          │   Sweeper    │  reservation, payment and
//!                          └──────────────┘  coupon deadlines
//! ```
//!
//! # Key Features
//!
//! ## 1. Seat exclusivity
//!
//! A seat is held by at most one booking. Reserving a set of seats is
//! all-or-nothing: the store checks and flips every requested seat in one
//! atomic step, so of two overlapping requests exactly one wins and the
//! other is told which seats were taken.
//!
//! ## 2. Deadlines as data
//!
//! Seat holds, pending payments and coupons carry their deadline as a
//! stored timestamp. The [`runtime::Sweeper`] enforces them periodically;
//! every step is a compare-and-set, so passes are idempotent and survive
//! restarts.
//!
//! ## 3. Booking checkout with compensation
//!
//! `createBooking` holds the seats, redeems the coupon, then opens the
//! payment. If the payment cannot be opened the booking is aborted: seats
//! are released and the coupon is restored.
//!
//! ## 4. Loyalty
//!
//! Every paid booking counts towards the next milestone; reaching one issues
//! a personal discount coupon exactly once.
//!
//! # Usage
//!
//! See [`bootstrap::ApplicationBuilder`] for wiring and the `cinema-server`
//! binary for the process entry point.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregates;
pub mod bootstrap;
pub mod config;
pub mod gateway;
pub mod metrics;
pub mod providers;
pub mod runtime;
pub mod server;
pub mod stores;
pub mod types;

pub use bootstrap::ApplicationBuilder;
pub use config::Config;
pub use gateway::{Gateway, TicketingSchema, build_schema};
pub use types::*;
