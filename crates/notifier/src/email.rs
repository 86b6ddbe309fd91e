//! Mailer trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::NotifyError;

/// Trait for sending e-mail. The SMTP transport is out of scope.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends one message to one recipient.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// A message captured by the in-memory mailer.
#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Default)]
struct MailerState {
    outbox: Vec<SentMail>,
    fail_on_send: bool,
}

/// In-memory mailer for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMailer {
    state: Arc<RwLock<MailerState>>,
}

impl InMemoryMailer {
    /// Creates a new mailer with an empty outbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the mailer to fail on subsequent sends.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Returns all messages sent so far.
    pub fn outbox(&self) -> Vec<SentMail> {
        self.state.read().unwrap().outbox.clone()
    }
}

#[async_trait]
impl Mailer for InMemoryMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_send {
            return Err(NotifyError::Mail("smtp unavailable".to_string()));
        }

        state.outbox.push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}
