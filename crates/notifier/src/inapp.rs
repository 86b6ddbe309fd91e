//! In-app notification log (the bell icon).

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::UserId;

use crate::error::NotifyError;

/// A stored in-app notification for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: i64,
    pub user_id: UserId,
    pub title: String,
    pub body: Option<String>,
    /// Target the client navigates to when the notification is clicked.
    pub link_url: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Trait for recording in-app notifications.
#[async_trait]
pub trait NotificationLog: Send + Sync {
    /// Appends a notification for a user.
    async fn record(
        &self,
        user_id: UserId,
        title: &str,
        body: Option<&str>,
        link_url: Option<&str>,
    ) -> Result<NotificationRecord, NotifyError>;
}

#[derive(Debug, Default)]
struct InMemoryLogState {
    notifications: Vec<NotificationRecord>,
    next_id: i64,
    fail_on_record: bool,
}

/// In-memory notification log for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationLog {
    state: Arc<RwLock<InMemoryLogState>>,
}

impl InMemoryNotificationLog {
    /// Creates a new empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the log to fail on subsequent record calls.
    pub fn set_fail_on_record(&self, fail: bool) {
        self.state.write().unwrap().fail_on_record = fail;
    }

    /// Returns all notifications stored for a user, newest first.
    pub fn notifications_for(&self, user_id: UserId) -> Vec<NotificationRecord> {
        let state = self.state.read().unwrap();
        let mut notifications: Vec<_> = state
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.id.cmp(&a.id));
        notifications
    }
}

#[async_trait]
impl NotificationLog for InMemoryNotificationLog {
    async fn record(
        &self,
        user_id: UserId,
        title: &str,
        body: Option<&str>,
        link_url: Option<&str>,
    ) -> Result<NotificationRecord, NotifyError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_record {
            return Err(NotifyError::Log("notification log unavailable".to_string()));
        }

        state.next_id += 1;
        let record = NotificationRecord {
            id: state.next_id,
            user_id,
            title: title.to_string(),
            body: body.map(str::to_string),
            link_url: link_url.map(str::to_string),
            is_read: false,
            created_at: Utc::now(),
        };
        state.notifications.push(record.clone());
        Ok(record)
    }
}
