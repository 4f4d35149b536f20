//! Runtime components of the server process.
//!
//! - **`sweeper`**: background task enforcing payment, reservation and coupon
//!   deadlines
//! - **`lifecycle`**: the running [`Application`] and graceful shutdown

pub mod lifecycle;
pub mod sweeper;

pub use lifecycle::{Application, shutdown_signal};
pub use sweeper::{SweepReport, Sweeper};
