use thiserror::Error;

use common::{OrderId, OrderItemId};

/// Errors that can occur when interacting with the order ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A concurrency conflict occurred when committing a shipment.
    /// The expected order version did not match the actual version.
    #[error("Concurrency conflict for order {order_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        order_id: OrderId,
        expected: i64,
        actual: i64,
    },

    /// The order was not found in the ledger.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A commit named an order item the ledger does not hold for that order.
    #[error("Order item not found: {0}")]
    OrderItemNotFound(OrderItemId),

    /// The write would have produced an invalid record (empty order,
    /// non-positive quantity, shipped beyond ordered).
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
