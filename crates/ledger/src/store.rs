use async_trait::async_trait;

use common::{OrderId, OrderItemId};

use crate::record::{CommittedShipment, NewOrder, OrderItemRecord, OrderSnapshot, ShipmentCommit,
    ShipmentRecord};
use crate::status::{OrderStatus, StatusCounts};
use crate::Result;

/// Core trait for order ledger implementations.
///
/// The ledger owns the ordered/shipped quantity invariants. By design it
/// exposes exactly two mutating paths: order creation and shipment commit.
/// There is no way to set `shipped_quantity` or `status` directly, which
/// confines those writes to the fulfillment engine.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Creates an order together with its items.
    ///
    /// The order starts in `new` status with all shipped quantities at
    /// zero and version 0. Fails with `InvalidRecord` if the item list is
    /// empty or any quantity is zero.
    async fn create_order(&self, new_order: NewOrder) -> Result<OrderSnapshot>;

    /// Loads an order with its items. Returns None if absent.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderSnapshot>>;

    /// Loads a single order item. The record carries its parent `order_id`
    /// so callers can validate ownership. Returns None if absent.
    async fn get_order_item(&self, item_id: OrderItemId) -> Result<Option<OrderItemRecord>>;

    /// Applies a validated shipment atomically.
    ///
    /// In one unit of work: verifies the order's current version equals
    /// `commit.expected_version` (failing with `ConcurrencyConflict`
    /// otherwise), increments each named item's shipped quantity, appends
    /// one shipment record with per-line shipment items preserving input
    /// order, writes the derived status, and bumps the order version.
    /// Either everything is applied or nothing is.
    ///
    /// The version check serializes concurrent commits against the same
    /// order; commits against different orders never contend.
    async fn commit_shipment(&self, commit: ShipmentCommit) -> Result<CommittedShipment>;

    /// Lists shipments for an order, newest first.
    async fn shipments_for_order(&self, order_id: OrderId) -> Result<Vec<ShipmentRecord>>;

    /// Lists orders, newest first, optionally filtered by status.
    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<OrderSnapshot>>;

    /// Returns the number of orders per status.
    async fn status_counts(&self) -> Result<StatusCounts>;
}
