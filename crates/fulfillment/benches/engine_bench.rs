use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};

use common::{Money, UserId};
use fulfillment::{FulfillmentEngine, RequestedLine, ShipmentRequest};
use ledger::{InMemoryLedger, Ledger, NewOrder, NewOrderItem, OrderSnapshot};
use notifier::NullNotifier;

async fn seed_order(ledger: &InMemoryLedger, items: usize, quantity: u32) -> OrderSnapshot {
    let items = (0..items)
        .map(|i| NewOrderItem {
            variant_id: i as i64,
            product_name: format!("Bench Product {i}"),
            variant_size: "M".to_string(),
            price_at_order: Some(Money::from_cents(1000)),
            quantity,
        })
        .collect();
    ledger
        .create_order(NewOrder {
            user_id: UserId::new(1),
            notes: None,
            items,
        })
        .await
        .unwrap()
}

fn bench_single_line_shipment(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("fulfillment/ship_single_line", |b| {
        b.iter(|| {
            rt.block_on(async {
                let ledger = Arc::new(InMemoryLedger::new());
                let order = seed_order(&ledger, 1, 10).await;
                let engine = FulfillmentEngine::new(ledger, Arc::new(NullNotifier));
                engine
                    .process_shipment(
                        order.order.id,
                        Some(UserId::new(1)),
                        &ShipmentRequest {
                            items: vec![RequestedLine {
                                item_id: order.items[0].id,
                                quantity_to_ship: 3,
                            }],
                        },
                    )
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_wide_order_shipment(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("fulfillment/ship_fifty_lines", |b| {
        b.iter(|| {
            rt.block_on(async {
                let ledger = Arc::new(InMemoryLedger::new());
                let order = seed_order(&ledger, 50, 4).await;
                let engine = FulfillmentEngine::new(ledger, Arc::new(NullNotifier));
                let request = ShipmentRequest {
                    items: order
                        .items
                        .iter()
                        .map(|i| RequestedLine {
                            item_id: i.id,
                            quantity_to_ship: 2,
                        })
                        .collect(),
                };
                engine
                    .process_shipment(order.order.id, Some(UserId::new(1)), &request)
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_repeated_shipments(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("fulfillment/ship_until_completed", |b| {
        b.iter(|| {
            rt.block_on(async {
                let ledger = Arc::new(InMemoryLedger::new());
                let order = seed_order(&ledger, 1, 8).await;
                let engine = FulfillmentEngine::new(ledger, Arc::new(NullNotifier));
                for _ in 0..8 {
                    engine
                        .process_shipment(
                            order.order.id,
                            None,
                            &ShipmentRequest {
                                items: vec![RequestedLine {
                                    item_id: order.items[0].id,
                                    quantity_to_ship: 1,
                                }],
                            },
                        )
                        .await
                        .unwrap();
                }
            });
        });
    });
}

criterion_group!(
    benches,
    bench_single_line_shipment,
    bench_wide_order_shipment,
    bench_repeated_shipments
);
criterion_main!(benches);
