//! Best-effort side effects on order status transitions.
//!
//! The dispatcher runs strictly outside the fulfillment transaction: by
//! the time it is invoked the shipment has already committed, so every
//! channel here absorbs its own failures instead of propagating them.

pub mod directory;
pub mod dispatcher;
pub mod email;
pub mod error;
pub mod inapp;
pub mod push;

pub use directory::{InMemoryUserDirectory, UserContact, UserDirectory};
pub use dispatcher::{NullNotifier, StatusDispatcher, StatusNotifier};
pub use email::{InMemoryMailer, Mailer};
pub use error::NotifyError;
pub use inapp::{InMemoryNotificationLog, NotificationLog, NotificationRecord};
pub use push::{InMemoryPushGateway, InMemorySubscriptionStore, PushGateway, PushSubscription,
    SubscriptionStore};
