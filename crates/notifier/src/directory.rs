//! User contact lookup consumed by the dispatcher and the API layer.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use common::UserId;

/// Contact and display information for a user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserContact {
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserContact {
    /// Name used to address the user in messages: first name when known,
    /// username otherwise.
    pub fn salutation(&self) -> &str {
        self.first_name.as_deref().unwrap_or(&self.username)
    }
}

/// Trait for resolving user ids to contact information.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Returns contact details for a user, or None if unknown.
    async fn contact_for(&self, user_id: UserId) -> Option<UserContact>;
}

/// In-memory user directory for testing and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<HashMap<UserId, UserContact>>>,
}

impl InMemoryUserDirectory {
    /// Creates a new empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user's contact details.
    pub fn insert(&self, user_id: UserId, contact: UserContact) {
        self.users.write().unwrap().insert(user_id, contact);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn contact_for(&self, user_id: UserId) -> Option<UserContact> {
        self.users.read().unwrap().get(&user_id).cloned()
    }
}
