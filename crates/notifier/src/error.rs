use thiserror::Error;

/// Errors from notification channels.
///
/// These never reach the fulfillment caller; the dispatcher logs and
/// suppresses them. `SubscriptionGone` is the one variant with a side
/// effect: the dispatcher deletes the subscription that produced it.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The in-app notification log rejected the write.
    #[error("Notification log error: {0}")]
    Log(String),

    /// The push gateway failed to deliver.
    #[error("Push delivery error: {0}")]
    Push(String),

    /// The push subscription no longer exists at the gateway (terminal).
    #[error("Push subscription is gone")]
    SubscriptionGone,

    /// The mailer failed to deliver.
    #[error("Mail delivery error: {0}")]
    Mail(String),
}
