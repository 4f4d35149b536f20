//! Core components, wired leaves first.

use super::resources::Resources;
use crate::aggregates::{
    BookingEnvironment, BookingManager, InventoryEnvironment, LoyaltyEngine, LoyaltyEnvironment,
    LoyaltyPolicy, PaymentEnvironment, PaymentManager, SeatInventory,
};
use crate::config::{LoyaltyConfig, WorkflowConfig};
use crate::gateway::{Catalog, Gateway, UserDirectory};
use crate::runtime::Sweeper;
use cinema_core::Clock;
use std::sync::Arc;

/// Seat inventory, loyalty engine, booking manager and payment manager
/// sharing one clock.
#[derive(Clone)]
pub struct Components {
    /// Seat inventory
    pub inventory: SeatInventory,
    /// Loyalty engine
    pub loyalty: LoyaltyEngine,
    /// Booking manager
    pub bookings: BookingManager,
    /// Payment manager
    pub payments: PaymentManager,
    clock: Arc<dyn Clock>,
    sweep_interval: std::time::Duration,
}

impl Components {
    /// Wires the components over `resources`.
    #[must_use]
    pub fn new(
        resources: &Resources,
        clock: Arc<dyn Clock>,
        workflow: &WorkflowConfig,
        loyalty: LoyaltyConfig,
    ) -> Self {
        let inventory = SeatInventory::new(
            resources.seats.clone(),
            InventoryEnvironment::new(clock.clone()),
        );
        let loyalty = LoyaltyEngine::new(
            resources.loyalty.clone(),
            LoyaltyPolicy::new(loyalty),
            LoyaltyEnvironment::new(clock.clone()),
        );
        let bookings = BookingManager::new(
            resources.bookings.clone(),
            inventory.clone(),
            loyalty.clone(),
            BookingEnvironment::new(clock.clone(), workflow.reservation_ttl()),
        );
        let payments = PaymentManager::new(
            resources.payments.clone(),
            bookings.clone(),
            loyalty.clone(),
            PaymentEnvironment::new(
                clock.clone(),
                workflow.cancel_window(),
                workflow.payment_expiry(),
            ),
        );

        Self {
            inventory,
            loyalty,
            bookings,
            payments,
            clock,
            sweep_interval: workflow.sweep_interval(),
        }
    }

    /// The gateway over these components and the remote collaborators.
    #[must_use]
    pub fn gateway(&self, users: Arc<dyn UserDirectory>, catalog: Arc<dyn Catalog>) -> Gateway {
        Gateway::new(
            users,
            catalog,
            self.inventory.clone(),
            self.bookings.clone(),
            self.payments.clone(),
            self.loyalty.clone(),
        )
    }

    /// The deadline sweeper over these components.
    #[must_use]
    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(
            self.payments.clone(),
            self.bookings.clone(),
            self.loyalty.clone(),
            self.clock.clone(),
            self.sweep_interval,
        )
    }
}
