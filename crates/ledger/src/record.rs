//! Persistent record types for orders, order items, and shipments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{Money, OrderId, OrderItemId, ShipmentId, UserId};

use crate::status::OrderStatus;

/// A customer's placed order.
///
/// `status` is derived and cached; it is written only at creation (`new`)
/// and by shipment commits. `version` increments on every committed
/// shipment and backs the ledger's optimistic concurrency control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub created_at: DateTime<Utc>,
    pub status: OrderStatus,
    pub notes: Option<String>,
    pub user_id: UserId,
    pub version: i64,
}

/// One line of an order.
///
/// Product descriptors are snapshotted at order time so historical orders
/// stay stable when the catalog changes later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemRecord {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub variant_id: i64,
    pub product_name: String,
    pub variant_size: String,
    pub price_at_order: Option<Money>,
    /// Units the customer ordered. Always positive.
    pub quantity: u32,
    /// Units shipped so far across all shipments. Never exceeds `quantity`.
    pub shipped_quantity: u32,
}

impl OrderItemRecord {
    /// Units that may still be shipped for this line.
    pub fn remaining(&self) -> u32 {
        self.quantity - self.shipped_quantity
    }
}

/// An order together with its items, sorted by item id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub order: OrderRecord,
    pub items: Vec<OrderItemRecord>,
}

impl OrderSnapshot {
    /// Sum of ordered quantities across all items.
    pub fn total_ordered(&self) -> u64 {
        self.items.iter().map(|i| u64::from(i.quantity)).sum()
    }

    /// Sum of shipped quantities across all items.
    pub fn total_shipped(&self) -> u64 {
        self.items
            .iter()
            .map(|i| u64::from(i.shipped_quantity))
            .sum()
    }

    /// Looks up an item of this order by id.
    pub fn item(&self, id: OrderItemId) -> Option<&OrderItemRecord> {
        self.items.iter().find(|i| i.id == id)
    }
}

/// One physical fulfillment event against an order. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentRecord {
    pub id: ShipmentId,
    pub order_id: OrderId,
    pub created_at: DateTime<Utc>,
    /// Staff member who processed the shipment; None for system-initiated.
    pub shipped_by: Option<UserId>,
    /// Lines of this shipment, in the order they were requested.
    pub items: Vec<ShipmentItemRecord>,
}

/// One line within a shipment, crediting quantity against an order item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentItemRecord {
    pub id: i64,
    pub shipment_id: ShipmentId,
    pub order_item_id: OrderItemId,
    /// Units shipped in this specific event. Always positive.
    pub quantity_shipped: u32,
    pub product_name: String,
    pub variant_size: String,
}

/// Input for creating an order with its items in one step.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub notes: Option<String>,
    pub items: Vec<NewOrderItem>,
}

/// Input for one line of a new order.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub variant_id: i64,
    pub product_name: String,
    pub variant_size: String,
    pub price_at_order: Option<Money>,
    pub quantity: u32,
}

/// One validated line of a shipment commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShipmentLine {
    pub order_item_id: OrderItemId,
    pub quantity: u32,
}

/// A fully validated shipment, ready to be applied atomically.
///
/// Built by the fulfillment engine after validating every requested line
/// against the order snapshot at `expected_version`. The ledger applies
/// all of it or none of it.
#[derive(Debug, Clone)]
pub struct ShipmentCommit {
    pub order_id: OrderId,
    /// Version of the order the validation was performed against.
    pub expected_version: i64,
    pub shipped_by: Option<UserId>,
    /// Lines to apply, preserving request input order. Never empty.
    pub lines: Vec<ShipmentLine>,
    /// Status derived by the engine from post-commit totals.
    pub new_status: OrderStatus,
}

/// Result of a successful shipment commit.
#[derive(Debug, Clone)]
pub struct CommittedShipment {
    /// The order as persisted after the commit.
    pub order: OrderSnapshot,
    /// The shipment record created by the commit.
    pub shipment: ShipmentRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: i64, quantity: u32, shipped: u32) -> OrderItemRecord {
        OrderItemRecord {
            id: OrderItemId::new(id),
            order_id: OrderId::new(1),
            variant_id: 10,
            product_name: "Shirt".to_string(),
            variant_size: "M".to_string(),
            price_at_order: Some(Money::from_cents(1999)),
            quantity,
            shipped_quantity: shipped,
        }
    }

    #[test]
    fn remaining_is_quantity_minus_shipped() {
        assert_eq!(item(1, 5, 3).remaining(), 2);
        assert_eq!(item(1, 5, 5).remaining(), 0);
    }

    #[test]
    fn snapshot_totals_span_all_items() {
        let snapshot = OrderSnapshot {
            order: OrderRecord {
                id: OrderId::new(1),
                created_at: Utc::now(),
                status: OrderStatus::Partial,
                notes: None,
                user_id: UserId::new(7),
                version: 2,
            },
            items: vec![item(1, 5, 3), item(2, 2, 0)],
        };
        assert_eq!(snapshot.total_ordered(), 7);
        assert_eq!(snapshot.total_shipped(), 3);
        assert!(snapshot.item(OrderItemId::new(2)).is_some());
        assert!(snapshot.item(OrderItemId::new(3)).is_none());
    }
}
