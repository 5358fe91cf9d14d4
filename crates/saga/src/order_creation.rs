//! Order creation saga constants.

/// The saga type identifier used in logs and metrics.
pub const SAGA_TYPE: &str = "OrderCreation";

/// Step name: Read the user's cart.
pub const STEP_FETCH_CART: &str = "fetch_cart";

/// Step name: Resolve catalog prices for every cart line.
pub const STEP_PRICE_ITEMS: &str = "price_items";

/// Step name: Decrement stock for every priced line.
pub const STEP_RESERVE_STOCK: &str = "reserve_stock";

/// Step name: Charge the order total.
pub const STEP_CAPTURE_PAYMENT: &str = "capture_payment";

/// Step name: Write the durable order.
pub const STEP_PERSIST_ORDER: &str = "persist_order";

/// Step name: Empty the user's cart.
pub const STEP_CLEAR_CART: &str = "clear_cart";

/// Compensation step name: Restore decremented stock.
pub const STEP_RESTORE_STOCK: &str = "restore_stock";
