//! Web-push subscriptions and gateway.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use common::UserId;

use crate::error::NotifyError;

/// A stored web-push subscription tied to a user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub id: i64,
    pub user_id: UserId,
    /// The subscription endpoint URL, kept separately for display.
    pub endpoint: String,
    /// The full subscription object (endpoint plus keys) as raw JSON,
    /// exactly as the browser produced it.
    pub subscription_json: String,
}

/// Trait for storing push subscriptions.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Returns all subscriptions registered for a user.
    async fn subscriptions_for(&self, user_id: UserId) -> Vec<PushSubscription>;

    /// Removes a subscription. Removing an unknown id is a no-op.
    async fn delete(&self, subscription_id: i64);
}

/// Trait for the push transport. The real transport (VAPID web-push) is
/// out of scope; the fulfillment side only needs delivery or a
/// `SubscriptionGone` verdict.
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Sends one push message to one subscription.
    async fn push_to(
        &self,
        subscription: &PushSubscription,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> Result<(), NotifyError>;
}

/// In-memory subscription store for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemorySubscriptionStore {
    state: Arc<RwLock<SubscriptionState>>,
}

#[derive(Debug, Default)]
struct SubscriptionState {
    subscriptions: Vec<PushSubscription>,
    next_id: i64,
}

impl InMemorySubscriptionStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscription for a user and returns it.
    pub fn insert(&self, user_id: UserId, endpoint: &str, subscription_json: &str) -> PushSubscription {
        let mut state = self.state.write().unwrap();
        state.next_id += 1;
        let subscription = PushSubscription {
            id: state.next_id,
            user_id,
            endpoint: endpoint.to_string(),
            subscription_json: subscription_json.to_string(),
        };
        state.subscriptions.push(subscription.clone());
        subscription
    }

    /// Returns the total number of stored subscriptions.
    pub fn len(&self) -> usize {
        self.state.read().unwrap().subscriptions.len()
    }

    /// Returns true if the store holds no subscriptions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SubscriptionStore for InMemorySubscriptionStore {
    async fn subscriptions_for(&self, user_id: UserId) -> Vec<PushSubscription> {
        self.state
            .read()
            .unwrap()
            .subscriptions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    async fn delete(&self, subscription_id: i64) {
        self.state
            .write()
            .unwrap()
            .subscriptions
            .retain(|s| s.id != subscription_id);
    }
}

/// A push message captured by the in-memory gateway.
#[derive(Debug, Clone)]
pub struct SentPush {
    pub subscription_id: i64,
    pub title: String,
    pub body: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Default)]
struct PushGatewayState {
    sent: Vec<SentPush>,
    gone_subscriptions: HashSet<i64>,
    fail_on_push: bool,
}

/// In-memory push gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPushGateway {
    state: Arc<RwLock<PushGatewayState>>,
}

impl InMemoryPushGateway {
    /// Creates a new gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a subscription as gone: pushes to it return `SubscriptionGone`.
    pub fn mark_gone(&self, subscription_id: i64) {
        self.state
            .write()
            .unwrap()
            .gone_subscriptions
            .insert(subscription_id);
    }

    /// Configures the gateway to fail every push with a transient error.
    pub fn set_fail_on_push(&self, fail: bool) {
        self.state.write().unwrap().fail_on_push = fail;
    }

    /// Returns all messages delivered so far.
    pub fn sent(&self) -> Vec<SentPush> {
        self.state.read().unwrap().sent.clone()
    }
}

#[async_trait]
impl PushGateway for InMemoryPushGateway {
    async fn push_to(
        &self,
        subscription: &PushSubscription,
        title: &str,
        body: &str,
        data: serde_json::Value,
    ) -> Result<(), NotifyError> {
        let mut state = self.state.write().unwrap();

        if state.gone_subscriptions.contains(&subscription.id) {
            return Err(NotifyError::SubscriptionGone);
        }
        if state.fail_on_push {
            return Err(NotifyError::Push("push service unavailable".to_string()));
        }

        state.sent.push(SentPush {
            subscription_id: subscription.id,
            title: title.to_string(),
            body: body.to_string(),
            data,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_insert_list_delete() {
        let store = InMemorySubscriptionStore::new();
        let sub = store.insert(UserId::new(1), "https://push.example/a", "{}");
        store.insert(UserId::new(2), "https://push.example/b", "{}");

        assert_eq!(store.subscriptions_for(UserId::new(1)).await.len(), 1);
        store.delete(sub.id).await;
        assert!(store.subscriptions_for(UserId::new(1)).await.is_empty());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn gateway_records_sent_messages() {
        let store = InMemorySubscriptionStore::new();
        let gateway = InMemoryPushGateway::new();
        let sub = store.insert(UserId::new(1), "https://push.example/a", "{}");

        gateway
            .push_to(&sub, "Title", "Body", serde_json::json!({"url": "/x"}))
            .await
            .unwrap();

        let sent = gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subscription_id, sub.id);
        assert_eq!(sent[0].data["url"], "/x");
    }

    #[tokio::test]
    async fn gone_subscription_is_terminal() {
        let store = InMemorySubscriptionStore::new();
        let gateway = InMemoryPushGateway::new();
        let sub = store.insert(UserId::new(1), "https://push.example/a", "{}");
        gateway.mark_gone(sub.id);

        let result = gateway
            .push_to(&sub, "Title", "Body", serde_json::Value::Null)
            .await;
        assert!(matches!(result, Err(NotifyError::SubscriptionGone)));
        assert!(gateway.sent().is_empty());
    }
}
