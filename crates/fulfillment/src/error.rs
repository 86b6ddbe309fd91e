use thiserror::Error;

use common::{OrderId, OrderItemId};
use ledger::LedgerError;

/// Errors from processing a shipment request.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// The requested order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A requested line named an item that does not belong to the order.
    #[error("Item {item_id} does not belong to order {order_id}")]
    InvalidReference {
        order_id: OrderId,
        item_id: OrderItemId,
    },

    /// A requested line asked for more units than the item has left.
    /// `remaining` accounts for earlier lines of the same request.
    #[error("Cannot ship {requested} of {product_name}: only {remaining} remaining")]
    OverShipment {
        product_name: String,
        requested: i64,
        remaining: u32,
    },

    /// No line in the request carried a positive quantity.
    #[error("No items with positive quantity to ship")]
    EmptyShipment,

    /// Concurrent shipments kept invalidating the snapshot and the retry
    /// budget ran out. The request may be retried by the caller.
    #[error("Order {0} is being modified concurrently, try again")]
    Contention(OrderId),

    /// The ledger failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Result type for fulfillment operations.
pub type Result<T> = std::result::Result<T, FulfillmentError>;
