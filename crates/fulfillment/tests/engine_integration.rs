//! End-to-end engine tests against the in-memory ledger, including the
//! dispatcher side effects and concurrent shipment races.

use std::sync::Arc;

use common::{Money, OrderItemId, UserId};
use fulfillment::{FulfillmentEngine, FulfillmentError, RequestedLine, ShipmentRequest};
use ledger::{InMemoryLedger, Ledger, NewOrder, NewOrderItem, OrderSnapshot, OrderStatus};
use notifier::{
    InMemoryMailer, InMemoryNotificationLog, InMemoryPushGateway, InMemorySubscriptionStore,
    InMemoryUserDirectory, NullNotifier, StatusDispatcher, UserContact,
};

type Dispatcher = StatusDispatcher<
    InMemoryNotificationLog,
    InMemorySubscriptionStore,
    InMemoryPushGateway,
    InMemoryMailer,
    InMemoryUserDirectory,
>;

struct World {
    ledger: Arc<InMemoryLedger>,
    engine: FulfillmentEngine<InMemoryLedger, Dispatcher>,
    log: InMemoryNotificationLog,
    mailer: InMemoryMailer,
    push: InMemoryPushGateway,
}

fn world() -> World {
    let ledger = Arc::new(InMemoryLedger::new());
    let log = InMemoryNotificationLog::new();
    let subscriptions = InMemorySubscriptionStore::new();
    let push = InMemoryPushGateway::new();
    let mailer = InMemoryMailer::new();
    let directory = InMemoryUserDirectory::new();
    directory.insert(
        UserId::new(7),
        UserContact {
            username: "anna".to_string(),
            email: "anna@example.com".to_string(),
            first_name: Some("Anna".to_string()),
            last_name: Some("Nowak".to_string()),
        },
    );
    subscriptions.insert(UserId::new(7), "https://push.example/anna", "{}");

    let dispatcher = StatusDispatcher::new(
        log.clone(),
        subscriptions,
        push.clone(),
        mailer.clone(),
        directory,
    );
    let engine = FulfillmentEngine::new(Arc::clone(&ledger), Arc::new(dispatcher));
    World {
        ledger,
        engine,
        log,
        mailer,
        push,
    }
}

async fn seed_order(ledger: &InMemoryLedger, quantities: &[u32]) -> OrderSnapshot {
    let items = quantities
        .iter()
        .enumerate()
        .map(|(i, &quantity)| NewOrderItem {
            variant_id: 100 + i as i64,
            product_name: format!("Product {i}"),
            variant_size: "L".to_string(),
            price_at_order: Some(Money::from_cents(2500)),
            quantity,
        })
        .collect();
    ledger
        .create_order(NewOrder {
            user_id: UserId::new(7),
            notes: None,
            items,
        })
        .await
        .unwrap()
}

fn ship(item_id: OrderItemId, quantity_to_ship: i64) -> ShipmentRequest {
    ShipmentRequest {
        items: vec![RequestedLine {
            item_id,
            quantity_to_ship,
        }],
    }
}

/// Notifications run on a spawned task; poll until the condition holds.
async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    panic!("condition not met within timeout");
}

#[tokio::test]
async fn partial_then_completed_notifies_each_transition_once() {
    let w = world();
    let order = seed_order(&w.ledger, &[5]).await;
    let item = order.items[0].id;

    w.engine
        .process_shipment(order.order.id, Some(UserId::new(1)), &ship(item, 3))
        .await
        .unwrap();

    wait_for(|| w.mailer.outbox().len() == 1).await;
    let notifications = w.log.notifications_for(UserId::new(7));
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].title, "Order partially shipped");
    assert_eq!(w.push.sent().len(), 1);

    // Second partial shipment leaves the status at partial: no new
    // notifications.
    w.engine
        .process_shipment(order.order.id, Some(UserId::new(1)), &ship(item, 1))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(w.log.notifications_for(UserId::new(7)).len(), 1);

    w.engine
        .process_shipment(order.order.id, Some(UserId::new(1)), &ship(item, 1))
        .await
        .unwrap();

    wait_for(|| w.mailer.outbox().len() == 2).await;
    let notifications = w.log.notifications_for(UserId::new(7));
    assert_eq!(notifications.len(), 2);
    assert_eq!(notifications[0].title, "Order completed");
    let outbox = w.mailer.outbox();
    assert_eq!(outbox.len(), 2);
    assert_eq!(
        outbox[1].subject,
        format!("Your order #{} has been completed", order.order.id)
    );
}

#[tokio::test]
async fn broken_channels_never_fail_the_shipment() {
    let w = world();
    let order = seed_order(&w.ledger, &[2]).await;
    w.log.set_fail_on_record(true);
    w.push.set_fail_on_push(true);
    w.mailer.set_fail_on_send(true);

    let committed = w
        .engine
        .process_shipment(order.order.id, None, &ship(order.items[0].id, 2))
        .await
        .unwrap();

    assert_eq!(committed.order.order.status, OrderStatus::Completed);
    let after = w.ledger.get_order(order.order.id).await.unwrap().unwrap();
    assert_eq!(after.total_shipped(), 2);
}

#[tokio::test]
async fn shipment_history_is_newest_first_and_audits_totals() {
    let w = world();
    let order = seed_order(&w.ledger, &[5, 4]).await;
    let (a, b) = (order.items[0].id, order.items[1].id);

    w.engine
        .process_shipment(order.order.id, Some(UserId::new(1)), &ship(a, 2))
        .await
        .unwrap();
    w.engine
        .process_shipment(
            order.order.id,
            Some(UserId::new(2)),
            &ShipmentRequest {
                items: vec![
                    RequestedLine {
                        item_id: a,
                        quantity_to_ship: 3,
                    },
                    RequestedLine {
                        item_id: b,
                        quantity_to_ship: 1,
                    },
                ],
            },
        )
        .await
        .unwrap();

    let shipments = w.ledger.shipments_for_order(order.order.id).await.unwrap();
    assert_eq!(shipments.len(), 2);
    assert_eq!(shipments[0].shipped_by, Some(UserId::new(2)));
    assert_eq!(shipments[0].items.len(), 2);
    assert_eq!(shipments[0].items[0].product_name, "Product 0");

    // Per-item shipment lines across history must sum to the cached
    // shipped quantity.
    let after = w.ledger.get_order(order.order.id).await.unwrap().unwrap();
    for item in &after.items {
        let from_history: u32 = shipments
            .iter()
            .flat_map(|s| &s.items)
            .filter(|l| l.order_item_id == item.id)
            .map(|l| l.quantity_shipped)
            .sum();
        assert_eq!(from_history, item.shipped_quantity);
    }
    assert_eq!(after.order.status, OrderStatus::Partial);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_overshooting_shipments_admit_exactly_one() {
    let ledger = Arc::new(InMemoryLedger::new());
    let order = seed_order(&ledger, &[5]).await;
    let item = order.items[0].id;
    let engine = Arc::new(FulfillmentEngine::new(
        Arc::clone(&ledger),
        Arc::new(NullNotifier),
    ));

    let mut handles = Vec::new();
    for _ in 0..2 {
        let engine = Arc::clone(&engine);
        let order_id = order.order.id;
        handles.push(tokio::spawn(async move {
            engine.process_shipment(order_id, None, &ship(item, 3)).await
        }));
    }

    let mut oks = 0;
    let mut overshoots = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => oks += 1,
            Err(FulfillmentError::OverShipment { remaining, .. }) => {
                assert_eq!(remaining, 2);
                overshoots += 1;
            }
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(oks, 1);
    assert_eq!(overshoots, 1);

    let after = ledger.get_order(order.order.id).await.unwrap().unwrap();
    assert_eq!(after.total_shipped(), 3);
    assert_eq!(after.order.status, OrderStatus::Partial);
    assert_eq!(ledger.shipment_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_compatible_shipments_both_land() {
    let ledger = Arc::new(InMemoryLedger::new());
    let order = seed_order(&ledger, &[6]).await;
    let item = order.items[0].id;
    let engine = Arc::new(FulfillmentEngine::new(
        Arc::clone(&ledger),
        Arc::new(NullNotifier),
    ));

    let mut handles = Vec::new();
    for _ in 0..2 {
        let engine = Arc::clone(&engine);
        let order_id = order.order.id;
        handles.push(tokio::spawn(async move {
            engine.process_shipment(order_id, None, &ship(item, 2)).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let after = ledger.get_order(order.order.id).await.unwrap().unwrap();
    assert_eq!(after.total_shipped(), 4);
    assert_eq!(after.order.status, OrderStatus::Partial);
    assert_eq!(after.order.version, 2);
    assert_eq!(ledger.shipment_count().await, 2);
}
