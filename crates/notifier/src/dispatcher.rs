//! Fan-out of order status transitions to the notification channels.

use async_trait::async_trait;

use ledger::{OrderSnapshot, OrderStatus};

use crate::directory::UserDirectory;
use crate::email::Mailer;
use crate::error::NotifyError;
use crate::inapp::NotificationLog;
use crate::push::{PushGateway, SubscriptionStore};

/// Link included with every status notification.
const ORDERS_DASHBOARD_URL: &str = "/dashboard/orders";

/// Observer of committed order status transitions.
///
/// Implementations must not fail: the shipment is already committed when
/// this is called, so delivery problems are logged and swallowed.
#[async_trait]
pub trait StatusNotifier: Send + Sync {
    /// Called after a shipment commit moved an order between statuses.
    async fn order_status_changed(
        &self,
        order: &OrderSnapshot,
        old_status: OrderStatus,
        new_status: OrderStatus,
    );
}

/// A no-op notifier, used where status transitions need no side effects.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullNotifier;

#[async_trait]
impl StatusNotifier for NullNotifier {
    async fn order_status_changed(
        &self,
        _order: &OrderSnapshot,
        _old_status: OrderStatus,
        _new_status: OrderStatus,
    ) {
    }
}

/// Dispatches a status transition to three independent channels: the
/// in-app notification log, web push, and e-mail.
///
/// Channels are best-effort and isolated from each other; a failure in
/// one is logged and does not stop the others. The single exception with
/// a side effect is a gone push subscription, which is deleted so it is
/// not retried on the next transition.
pub struct StatusDispatcher<L, S, P, M, D> {
    log: L,
    subscriptions: S,
    push: P,
    mailer: M,
    directory: D,
}

impl<L, S, P, M, D> StatusDispatcher<L, S, P, M, D>
where
    L: NotificationLog,
    S: SubscriptionStore,
    P: PushGateway,
    M: Mailer,
    D: UserDirectory,
{
    pub fn new(log: L, subscriptions: S, push: P, mailer: M, directory: D) -> Self {
        Self {
            log,
            subscriptions,
            push,
            mailer,
            directory,
        }
    }

    async fn notify_in_app(&self, order: &OrderSnapshot, new_status: OrderStatus) {
        let order_id = order.order.id;
        let (title, body) = match new_status {
            OrderStatus::Completed => (
                "Order completed",
                format!("Your order #{order_id} has been fully shipped."),
            ),
            _ => (
                "Order partially shipped",
                format!("Part of your order #{order_id} has been shipped."),
            ),
        };

        if let Err(err) = self
            .log
            .record(order.order.user_id, title, Some(&body), Some(ORDERS_DASHBOARD_URL))
            .await
        {
            tracing::warn!(order_id = %order_id, error = %err, "in-app notification failed");
        }
    }

    async fn notify_push(&self, order: &OrderSnapshot, new_status: OrderStatus) {
        let order_id = order.order.id;
        let (title, body) = match new_status {
            OrderStatus::Completed => (
                "Your order has been completed!",
                format!("All products from order #{order_id} have been shipped."),
            ),
            _ => (
                "Your order is on its way!",
                format!("Part of your order #{order_id} has been shipped."),
            ),
        };

        for subscription in self.subscriptions.subscriptions_for(order.order.user_id).await {
            let data = serde_json::json!({ "url": ORDERS_DASHBOARD_URL });
            match self.push.push_to(&subscription, title, &body, data).await {
                Ok(()) => {}
                Err(NotifyError::SubscriptionGone) => {
                    tracing::info!(
                        subscription_id = subscription.id,
                        "push subscription gone, removing"
                    );
                    self.subscriptions.delete(subscription.id).await;
                }
                Err(err) => {
                    tracing::warn!(
                        order_id = %order_id,
                        subscription_id = subscription.id,
                        error = %err,
                        "push notification failed"
                    );
                }
            }
        }
    }

    async fn notify_email(&self, order: &OrderSnapshot, new_status: OrderStatus) {
        let order_id = order.order.id;
        let Some(contact) = self.directory.contact_for(order.order.user_id).await else {
            tracing::warn!(order_id = %order_id, "no contact for order owner, skipping e-mail");
            return;
        };

        let (subject, detail) = match new_status {
            OrderStatus::Completed => (
                format!("Your order #{order_id} has been completed"),
                format!("all products from your order #{order_id} have been shipped"),
            ),
            _ => (
                format!("Your order #{order_id} has been partially shipped"),
                format!("part of your order #{order_id} has been shipped"),
            ),
        };
        let body = format!(
            "Hello {},\n\nGood news: {}.\n\nBest regards,\nThe Support Team\n",
            contact.salutation(),
            detail,
        );

        if let Err(err) = self.mailer.send(&contact.email, &subject, &body).await {
            tracing::warn!(order_id = %order_id, error = %err, "status e-mail failed");
        }
    }
}

#[async_trait]
impl<L, S, P, M, D> StatusNotifier for StatusDispatcher<L, S, P, M, D>
where
    L: NotificationLog,
    S: SubscriptionStore,
    P: PushGateway,
    M: Mailer,
    D: UserDirectory,
{
    #[tracing::instrument(skip(self, order), fields(order_id = %order.order.id))]
    async fn order_status_changed(
        &self,
        order: &OrderSnapshot,
        old_status: OrderStatus,
        new_status: OrderStatus,
    ) {
        // Only forward transitions from shipping are announced.
        if !matches!(new_status, OrderStatus::Partial | OrderStatus::Completed) {
            return;
        }
        if new_status == old_status {
            return;
        }

        self.notify_in_app(order, new_status).await;
        self.notify_push(order, new_status).await;
        self.notify_email(order, new_status).await;
    }
}
