use async_trait::async_trait;
use std::sync::Mutex;
use tracing::info;

use crate::domain::ports::{Notification, NotificationEmitter};
use crate::error::Result;

/// Emits notifications as structured log lines. The production deployment
/// would swap in an email or push adapter behind the same trait.
#[derive(Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationEmitter for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        info!(
            recipient = %notification.recipient,
            booking_id = ?notification.booking_id,
            event = notification.event,
            "notification"
        );
        Ok(())
    }
}

/// Captures notifications for assertions in tests.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.sent.lock().unwrap().iter().map(|n| n.event).collect()
    }
}

#[async_trait]
impl NotificationEmitter for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}
