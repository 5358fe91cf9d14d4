//! In-memory stand-ins for the downstream services.
//!
//! Used when the service URLs are not configured, and by the tests.

use std::sync::Arc;

use domain::{CartLine, Money};
use saga::{
    Gateways, InMemoryCartService, InMemoryCatalogService, InMemoryInventoryService,
    InMemoryPaymentService,
};

/// User whose cart is pre-filled by [`LocalServices::seeded`].
pub const DEMO_USER: &str = "demo-user";

/// Handles to the in-memory services behind a [`Gateways`] set.
#[derive(Debug, Clone, Default)]
pub struct LocalServices {
    pub cart: InMemoryCartService,
    pub catalog: InMemoryCatalogService,
    pub inventory: InMemoryInventoryService,
    pub payment: InMemoryPaymentService,
}

impl LocalServices {
    /// Creates empty services.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates services with a small demo catalog and one filled cart.
    pub fn seeded() -> Self {
        let services = Self::new();
        let products = [
            ("P-1001", "Mechanical keyboard", 8999, "seller-1"),
            ("P-1002", "USB-C cable", 1299, "seller-1"),
            ("P-2001", "Desk lamp", 3450, "seller-2"),
        ];
        for (id, name, cents, owner) in products {
            services
                .catalog
                .add_product(id, name, Money::from_cents(cents), owner);
            services.inventory.set_stock(id, 100);
        }
        services.cart.set_cart(
            DEMO_USER,
            vec![CartLine::new("P-1001", 1), CartLine::new("P-1002", 2)],
        );
        services
    }

    /// Returns the gateway set the orchestrator calls through.
    pub fn gateways(&self) -> Gateways {
        Gateways {
            cart: Arc::new(self.cart.clone()),
            catalog: Arc::new(self.catalog.clone()),
            inventory: Arc::new(self.inventory.clone()),
            payment: Arc::new(self.payment.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use common::{ProductId, UserId};

    use super::*;

    #[test]
    fn test_seeded_services() {
        let services = LocalServices::seeded();
        assert_eq!(services.inventory.stock(&ProductId::new("P-2001")), Some(100));
        assert_eq!(services.cart.cart(&UserId::new(DEMO_USER)).len(), 2);
    }
}
