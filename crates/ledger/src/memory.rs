use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use common::{OrderId, OrderItemId, ShipmentId};

use crate::record::{
    CommittedShipment, NewOrder, OrderItemRecord, OrderRecord, OrderSnapshot, ShipmentCommit,
    ShipmentItemRecord, ShipmentRecord,
};
use crate::status::{OrderStatus, StatusCounts};
use crate::store::Ledger;
use crate::{LedgerError, Result};

#[derive(Default)]
struct LedgerState {
    orders: HashMap<OrderId, OrderRecord>,
    items: HashMap<OrderItemId, OrderItemRecord>,
    shipments: Vec<ShipmentRecord>,
    next_order_id: i64,
    next_item_id: i64,
    next_shipment_id: i64,
    next_shipment_item_id: i64,
}

impl LedgerState {
    fn snapshot(&self, order: &OrderRecord) -> OrderSnapshot {
        let mut items: Vec<_> = self
            .items
            .values()
            .filter(|i| i.order_id == order.id)
            .cloned()
            .collect();
        items.sort_by_key(|i| i.id);
        OrderSnapshot {
            order: order.clone(),
            items,
        }
    }
}

/// In-memory ledger implementation.
///
/// Holds all state behind a single RwLock, which makes each commit
/// trivially atomic. Provides the same interface and concurrency
/// semantics as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    /// Creates a new empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of shipment records stored.
    pub async fn shipment_count(&self) -> usize {
        self.state.read().await.shipments.len()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn create_order(&self, new_order: NewOrder) -> Result<OrderSnapshot> {
        if new_order.items.is_empty() {
            return Err(LedgerError::InvalidRecord(
                "order must have at least one item".to_string(),
            ));
        }
        if let Some(bad) = new_order.items.iter().find(|i| i.quantity == 0) {
            return Err(LedgerError::InvalidRecord(format!(
                "ordered quantity for '{}' must be positive",
                bad.product_name
            )));
        }

        let mut state = self.state.write().await;

        state.next_order_id += 1;
        let order = OrderRecord {
            id: OrderId::new(state.next_order_id),
            created_at: Utc::now(),
            status: OrderStatus::New,
            notes: new_order.notes,
            user_id: new_order.user_id,
            version: 0,
        };
        state.orders.insert(order.id, order.clone());

        for item in new_order.items {
            state.next_item_id += 1;
            let record = OrderItemRecord {
                id: OrderItemId::new(state.next_item_id),
                order_id: order.id,
                variant_id: item.variant_id,
                product_name: item.product_name,
                variant_size: item.variant_size,
                price_at_order: item.price_at_order,
                quantity: item.quantity,
                shipped_quantity: 0,
            };
            state.items.insert(record.id, record);
        }

        Ok(state.snapshot(&order))
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderSnapshot>> {
        let state = self.state.read().await;
        Ok(state.orders.get(&order_id).map(|o| state.snapshot(o)))
    }

    async fn get_order_item(&self, item_id: OrderItemId) -> Result<Option<OrderItemRecord>> {
        let state = self.state.read().await;
        Ok(state.items.get(&item_id).cloned())
    }

    async fn commit_shipment(&self, commit: ShipmentCommit) -> Result<CommittedShipment> {
        if commit.lines.is_empty() {
            return Err(LedgerError::InvalidRecord(
                "shipment must have at least one line".to_string(),
            ));
        }

        let mut state = self.state.write().await;

        let current_version = state
            .orders
            .get(&commit.order_id)
            .ok_or(LedgerError::OrderNotFound(commit.order_id))?
            .version;
        if current_version != commit.expected_version {
            return Err(LedgerError::ConcurrencyConflict {
                order_id: commit.order_id,
                expected: commit.expected_version,
                actual: current_version,
            });
        }

        // Verify every line before touching anything so a bad commit
        // leaves the state untouched.
        for line in &commit.lines {
            let item = state
                .items
                .get(&line.order_item_id)
                .filter(|i| i.order_id == commit.order_id)
                .ok_or(LedgerError::OrderItemNotFound(line.order_item_id))?;
            if line.quantity == 0 {
                return Err(LedgerError::InvalidRecord(format!(
                    "shipment quantity for '{}' must be positive",
                    item.product_name
                )));
            }
        }
        let mut pending: HashMap<OrderItemId, u32> = HashMap::new();
        for line in &commit.lines {
            *pending.entry(line.order_item_id).or_default() += line.quantity;
        }
        for (item_id, add) in &pending {
            let item = &state.items[item_id];
            if item.shipped_quantity + add > item.quantity {
                return Err(LedgerError::InvalidRecord(format!(
                    "shipping {} of '{}' would exceed the ordered quantity",
                    add, item.product_name
                )));
            }
        }

        state.next_shipment_id += 1;
        let shipment_id = ShipmentId::new(state.next_shipment_id);
        let mut shipment = ShipmentRecord {
            id: shipment_id,
            order_id: commit.order_id,
            created_at: Utc::now(),
            shipped_by: commit.shipped_by,
            items: Vec::with_capacity(commit.lines.len()),
        };

        for line in &commit.lines {
            state.next_shipment_item_id += 1;
            let next_id = state.next_shipment_item_id;
            let item = state
                .items
                .get_mut(&line.order_item_id)
                .ok_or(LedgerError::OrderItemNotFound(line.order_item_id))?;
            item.shipped_quantity += line.quantity;
            shipment.items.push(ShipmentItemRecord {
                id: next_id,
                shipment_id,
                order_item_id: line.order_item_id,
                quantity_shipped: line.quantity,
                product_name: item.product_name.clone(),
                variant_size: item.variant_size.clone(),
            });
        }

        let order = state
            .orders
            .get_mut(&commit.order_id)
            .ok_or(LedgerError::OrderNotFound(commit.order_id))?;
        order.status = commit.new_status;
        order.version += 1;
        let order = order.clone();

        state.shipments.push(shipment.clone());

        Ok(CommittedShipment {
            order: state.snapshot(&order),
            shipment,
        })
    }

    async fn shipments_for_order(&self, order_id: OrderId) -> Result<Vec<ShipmentRecord>> {
        let state = self.state.read().await;
        let mut shipments: Vec<_> = state
            .shipments
            .iter()
            .filter(|s| s.order_id == order_id)
            .cloned()
            .collect();
        shipments.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(shipments)
    }

    async fn list_orders(&self, status: Option<OrderStatus>) -> Result<Vec<OrderSnapshot>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| status.is_none_or(|s| o.status == s))
            .map(|o| state.snapshot(o))
            .collect();
        orders.sort_by(|a, b| {
            b.order
                .created_at
                .cmp(&a.order.created_at)
                .then(b.order.id.cmp(&a.order.id))
        });
        Ok(orders)
    }

    async fn status_counts(&self) -> Result<StatusCounts> {
        let state = self.state.read().await;
        let mut counts = StatusCounts::default();
        for order in state.orders.values() {
            match order.status {
                OrderStatus::New => counts.new += 1,
                OrderStatus::Partial => counts.partial += 1,
                OrderStatus::Completed => counts.completed += 1,
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{NewOrderItem, ShipmentLine};
    use common::{Money, UserId};

    fn new_order(quantities: &[u32]) -> NewOrder {
        NewOrder {
            user_id: UserId::new(1),
            notes: None,
            items: quantities
                .iter()
                .enumerate()
                .map(|(i, &q)| NewOrderItem {
                    variant_id: i as i64 + 100,
                    product_name: format!("Product {i}"),
                    variant_size: "M".to_string(),
                    price_at_order: Some(Money::from_cents(1000)),
                    quantity: q,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn create_order_starts_new_with_nothing_shipped() {
        let ledger = InMemoryLedger::new();
        let snapshot = ledger.create_order(new_order(&[5, 2])).await.unwrap();

        assert_eq!(snapshot.order.status, OrderStatus::New);
        assert_eq!(snapshot.order.version, 0);
        assert_eq!(snapshot.items.len(), 2);
        assert!(snapshot.items.iter().all(|i| i.shipped_quantity == 0));
    }

    #[tokio::test]
    async fn create_order_rejects_empty_and_zero_quantity() {
        let ledger = InMemoryLedger::new();
        assert!(matches!(
            ledger.create_order(new_order(&[])).await,
            Err(LedgerError::InvalidRecord(_))
        ));
        assert!(matches!(
            ledger.create_order(new_order(&[3, 0])).await,
            Err(LedgerError::InvalidRecord(_))
        ));
    }

    #[tokio::test]
    async fn commit_applies_increments_status_and_version() {
        let ledger = InMemoryLedger::new();
        let snapshot = ledger.create_order(new_order(&[5])).await.unwrap();
        let item_id = snapshot.items[0].id;

        let committed = ledger
            .commit_shipment(ShipmentCommit {
                order_id: snapshot.order.id,
                expected_version: 0,
                shipped_by: Some(UserId::new(9)),
                lines: vec![ShipmentLine {
                    order_item_id: item_id,
                    quantity: 3,
                }],
                new_status: OrderStatus::Partial,
            })
            .await
            .unwrap();

        assert_eq!(committed.order.order.version, 1);
        assert_eq!(committed.order.order.status, OrderStatus::Partial);
        assert_eq!(committed.order.items[0].shipped_quantity, 3);
        assert_eq!(committed.shipment.items.len(), 1);
        assert_eq!(committed.shipment.items[0].quantity_shipped, 3);
        assert_eq!(committed.shipment.shipped_by, Some(UserId::new(9)));
    }

    #[tokio::test]
    async fn commit_with_stale_version_conflicts() {
        let ledger = InMemoryLedger::new();
        let snapshot = ledger.create_order(new_order(&[5])).await.unwrap();
        let item_id = snapshot.items[0].id;

        let line = ShipmentLine {
            order_item_id: item_id,
            quantity: 1,
        };
        ledger
            .commit_shipment(ShipmentCommit {
                order_id: snapshot.order.id,
                expected_version: 0,
                shipped_by: None,
                lines: vec![line],
                new_status: OrderStatus::Partial,
            })
            .await
            .unwrap();

        // Second commit still claims version 0.
        let result = ledger
            .commit_shipment(ShipmentCommit {
                order_id: snapshot.order.id,
                expected_version: 0,
                shipped_by: None,
                lines: vec![line],
                new_status: OrderStatus::Partial,
            })
            .await;

        assert!(matches!(
            result,
            Err(LedgerError::ConcurrencyConflict {
                expected: 0,
                actual: 1,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn failed_commit_leaves_state_untouched() {
        let ledger = InMemoryLedger::new();
        let snapshot = ledger.create_order(new_order(&[5, 2])).await.unwrap();
        let order_id = snapshot.order.id;

        // Second line references a foreign item.
        let result = ledger
            .commit_shipment(ShipmentCommit {
                order_id,
                expected_version: 0,
                shipped_by: None,
                lines: vec![
                    ShipmentLine {
                        order_item_id: snapshot.items[0].id,
                        quantity: 2,
                    },
                    ShipmentLine {
                        order_item_id: OrderItemId::new(999),
                        quantity: 1,
                    },
                ],
                new_status: OrderStatus::Partial,
            })
            .await;
        assert!(matches!(result, Err(LedgerError::OrderItemNotFound(_))));

        let after = ledger.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(after, snapshot);
        assert_eq!(ledger.shipment_count().await, 0);
    }

    #[tokio::test]
    async fn commit_rejects_overshooting_increment() {
        let ledger = InMemoryLedger::new();
        let snapshot = ledger.create_order(new_order(&[5])).await.unwrap();

        let result = ledger
            .commit_shipment(ShipmentCommit {
                order_id: snapshot.order.id,
                expected_version: 0,
                shipped_by: None,
                lines: vec![ShipmentLine {
                    order_item_id: snapshot.items[0].id,
                    quantity: 6,
                }],
                new_status: OrderStatus::Completed,
            })
            .await;

        assert!(matches!(result, Err(LedgerError::InvalidRecord(_))));
        let after = ledger.get_order(snapshot.order.id).await.unwrap().unwrap();
        assert_eq!(after.items[0].shipped_quantity, 0);
    }

    #[tokio::test]
    async fn shipments_listed_newest_first() {
        let ledger = InMemoryLedger::new();
        let snapshot = ledger.create_order(new_order(&[5])).await.unwrap();
        let item_id = snapshot.items[0].id;

        for (version, qty) in [(0, 2), (1, 3)] {
            ledger
                .commit_shipment(ShipmentCommit {
                    order_id: snapshot.order.id,
                    expected_version: version,
                    shipped_by: None,
                    lines: vec![ShipmentLine {
                        order_item_id: item_id,
                        quantity: qty,
                    }],
                    new_status: if version == 0 {
                        OrderStatus::Partial
                    } else {
                        OrderStatus::Completed
                    },
                })
                .await
                .unwrap();
        }

        let shipments = ledger
            .shipments_for_order(snapshot.order.id)
            .await
            .unwrap();
        assert_eq!(shipments.len(), 2);
        assert!(shipments[0].id > shipments[1].id);
        assert_eq!(shipments[0].items[0].quantity_shipped, 3);
    }

    #[tokio::test]
    async fn list_orders_filters_by_status_and_counts() {
        let ledger = InMemoryLedger::new();
        let first = ledger.create_order(new_order(&[1])).await.unwrap();
        ledger.create_order(new_order(&[4])).await.unwrap();

        ledger
            .commit_shipment(ShipmentCommit {
                order_id: first.order.id,
                expected_version: 0,
                shipped_by: None,
                lines: vec![ShipmentLine {
                    order_item_id: first.items[0].id,
                    quantity: 1,
                }],
                new_status: OrderStatus::Completed,
            })
            .await
            .unwrap();

        let completed = ledger
            .list_orders(Some(OrderStatus::Completed))
            .await
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].order.id, first.order.id);

        let all = ledger.list_orders(None).await.unwrap();
        assert_eq!(all.len(), 2);

        let counts = ledger.status_counts().await.unwrap();
        assert_eq!(counts.new, 1);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.total(), 2);
    }

    #[tokio::test]
    async fn audit_sum_matches_shipped_quantity() {
        let ledger = InMemoryLedger::new();
        let snapshot = ledger.create_order(new_order(&[5])).await.unwrap();
        let item_id = snapshot.items[0].id;

        for (version, qty, status) in [
            (0, 2, OrderStatus::Partial),
            (1, 1, OrderStatus::Partial),
            (2, 2, OrderStatus::Completed),
        ] {
            ledger
                .commit_shipment(ShipmentCommit {
                    order_id: snapshot.order.id,
                    expected_version: version,
                    shipped_by: None,
                    lines: vec![ShipmentLine {
                        order_item_id: item_id,
                        quantity: qty,
                    }],
                    new_status: status,
                })
                .await
                .unwrap();
        }

        let shipments = ledger
            .shipments_for_order(snapshot.order.id)
            .await
            .unwrap();
        let audit_total: u32 = shipments
            .iter()
            .flat_map(|s| &s.items)
            .filter(|i| i.order_item_id == item_id)
            .map(|i| i.quantity_shipped)
            .sum();

        let item = ledger.get_order_item(item_id).await.unwrap().unwrap();
        assert_eq!(audit_total, item.shipped_quantity);
        assert_eq!(item.shipped_quantity, 5);
    }
}
