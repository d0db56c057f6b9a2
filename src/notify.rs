use crate::errors::AppResult;

/// A user-facing alert produced when a reminder comes due.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub sound: bool,
    /// In-app destination to open when the alert is activated.
    pub action: Option<String>,
}

/// Delivery seam for notifications. The core never talks to a platform
/// notification API directly; hosts plug in whatever channel they have.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> AppResult<()>;
}

/// Default sink that records alerts in the log stream. Useful headless and
/// in tests.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> AppResult<()> {
        tracing::info!(
            title = %notification.title,
            body = %notification.body,
            sound = notification.sound,
            action = notification.action.as_deref().unwrap_or(""),
            "notification"
        );
        Ok(())
    }
}
