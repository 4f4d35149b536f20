//! Core components of the ticketing domain.
//!
//! Components are layered; each one only calls the ones below it:
//!
//! ```text
//! PaymentManager ──► BookingManager ──► SeatInventory
//!        │                 │
//!        └────────► LoyaltyEngine ◄─────┘
//! ```
//!
//! Cancelling a booking never reaches up into payments. Callers that need a
//! booking's pending payment voided (the gateway and the sweeper) do it
//! themselves through [`PaymentManager::void_for_booking`].

pub mod booking;
pub mod inventory;
pub mod loyalty;
pub mod payment;

pub use booking::{BookingEnvironment, BookingManager, ConfirmOutcome, NewBooking};
pub use inventory::{InventoryEnvironment, SeatInventory};
pub use loyalty::{
    CouponQuote, LoyaltyEngine, LoyaltyEnvironment, LoyaltyPolicy, LoyaltyProgress, LoyaltyTier,
};
pub use payment::{NewPayment, PaymentEnvironment, PaymentManager, ProofOutcome};
