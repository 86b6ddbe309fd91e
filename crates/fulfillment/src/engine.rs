//! The fulfillment engine: validates shipment requests against an order
//! snapshot and commits them through the ledger.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};

use common::{OrderId, OrderItemId, UserId};
use ledger::{CommittedShipment, Ledger, LedgerError, OrderSnapshot, OrderStatus, ShipmentCommit,
    ShipmentLine};
use notifier::StatusNotifier;

use crate::error::{FulfillmentError, Result};

/// How many times a commit is revalidated after losing a version race
/// before the request is rejected with `Contention`.
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// A shipment request as submitted by staff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentRequest {
    pub items: Vec<RequestedLine>,
}

/// One requested line. Quantities are accepted as signed integers from
/// the wire; non-positive lines are skipped, not rejected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RequestedLine {
    pub item_id: OrderItemId,
    pub quantity_to_ship: i64,
}

/// Coordinates shipment processing against a ledger and announces status
/// transitions to a notifier.
///
/// Processing is validate-then-commit under optimistic concurrency: the
/// request is validated against a snapshot of the order, and the commit
/// carries the snapshot's version. When a concurrent shipment moved the
/// order first, the commit is rejected by the ledger and the whole
/// request is revalidated against a fresh snapshot.
pub struct FulfillmentEngine<L, N> {
    ledger: Arc<L>,
    notifier: Arc<N>,
}

impl<L, N> FulfillmentEngine<L, N>
where
    L: Ledger,
    N: StatusNotifier + 'static,
{
    pub fn new(ledger: Arc<L>, notifier: Arc<N>) -> Self {
        Self { ledger, notifier }
    }

    /// Processes a shipment request against an order.
    ///
    /// Every line is validated before anything is applied; the first
    /// offending line, in request order, decides the error. Lines with a
    /// non-positive quantity are ignored. On success the order's cached
    /// status is recomputed from the new totals, and if it changed the
    /// notifier is invoked after the commit.
    #[tracing::instrument(skip(self, request), fields(order_id = %order_id))]
    pub async fn process_shipment(
        &self,
        order_id: OrderId,
        shipped_by: Option<UserId>,
        request: &ShipmentRequest,
    ) -> Result<CommittedShipment> {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let snapshot = self
                .ledger
                .get_order(order_id)
                .await?
                .ok_or(FulfillmentError::OrderNotFound(order_id))?;

            let lines = plan_lines(&snapshot, request)?;
            let shipped_delta: u64 = lines.iter().map(|l| u64::from(l.quantity)).sum();

            let old_status = snapshot.order.status;
            let new_status = OrderStatus::derive(
                snapshot.total_ordered(),
                snapshot.total_shipped() + shipped_delta,
            );

            let commit = ShipmentCommit {
                order_id,
                expected_version: snapshot.order.version,
                shipped_by,
                lines,
                new_status,
            };

            match self.ledger.commit_shipment(commit).await {
                Ok(committed) => {
                    counter!("fulfillment_shipments_committed_total").increment(1);
                    tracing::info!(
                        shipment_id = %committed.shipment.id,
                        status = %new_status,
                        "shipment committed"
                    );
                    if new_status != old_status {
                        // The commit already happened: notification runs
                        // on its own task and never blocks or fails the
                        // caller.
                        let notifier = Arc::clone(&self.notifier);
                        let order = committed.order.clone();
                        tokio::spawn(async move {
                            notifier
                                .order_status_changed(&order, old_status, new_status)
                                .await;
                        });
                    }
                    return Ok(committed);
                }
                Err(LedgerError::ConcurrencyConflict { .. }) => {
                    counter!("fulfillment_commit_conflicts_total").increment(1);
                    tracing::debug!(attempt, "commit lost version race, revalidating");
                }
                Err(LedgerError::OrderNotFound(id)) => {
                    return Err(FulfillmentError::OrderNotFound(id));
                }
                Err(err) => return Err(err.into()),
            }
        }

        counter!("fulfillment_contention_total").increment(1);
        Err(FulfillmentError::Contention(order_id))
    }
}

/// Validates every requested line against the snapshot and turns the
/// survivors into commit lines, preserving request order.
///
/// Duplicate lines against the same item are accounted cumulatively, so
/// a request cannot sneak past the remaining quantity by splitting.
fn plan_lines(snapshot: &OrderSnapshot, request: &ShipmentRequest) -> Result<Vec<ShipmentLine>> {
    let mut pending: HashMap<OrderItemId, u32> = HashMap::new();
    let mut lines = Vec::with_capacity(request.items.len());

    for requested in &request.items {
        if requested.quantity_to_ship <= 0 {
            continue;
        }

        let item = snapshot
            .item(requested.item_id)
            .ok_or(FulfillmentError::InvalidReference {
                order_id: snapshot.order.id,
                item_id: requested.item_id,
            })?;

        let already_planned = pending.get(&item.id).copied().unwrap_or(0);
        let remaining = item.remaining() - already_planned;
        if requested.quantity_to_ship > i64::from(remaining) {
            return Err(FulfillmentError::OverShipment {
                product_name: item.product_name.clone(),
                requested: requested.quantity_to_ship,
                remaining,
            });
        }

        // Exact: 0 < quantity_to_ship <= remaining <= u32::MAX.
        let quantity = requested.quantity_to_ship as u32;
        *pending.entry(item.id).or_insert(0) += quantity;
        lines.push(ShipmentLine {
            order_item_id: item.id,
            quantity,
        });
    }

    if lines.is_empty() {
        return Err(FulfillmentError::EmptyShipment);
    }
    Ok(lines)
}
