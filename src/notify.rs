// src/notify.rs
use crate::types::Notification;
use chrono::Utc;
use tokio::sync::broadcast;
use tracing::info;

/// Append-only status feed. Publishing must never block the caller.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, message: &str);
}

/// Fans status lines out to any number of subscribers (web sockets, the
/// console printer in `main`). Lagging or absent subscribers lose lines.
pub struct BroadcastNotifier {
    sender: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl NotificationSink for BroadcastNotifier {
    fn publish(&self, message: &str) {
        info!(target: "agent", "{}", message);
        let event = Notification {
            timestamp: Utc::now(),
            message: message.to_string(),
        };
        // Err only means nobody is listening right now
        let _ = self.sender.send(event);
    }
}
