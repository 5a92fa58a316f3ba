//! Notifications
//!
//! Lossy fan-out of [`Notification`]s to whoever is listening. Publishing
//! never blocks and never fails; observers that lag simply miss messages.

use tokio::sync::broadcast;

use crate::domain::Notification;

pub const DEFAULT_CAPACITY: usize = 256;

/// Broadcast handle shared by every component that emits notifications
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, notification: Notification) {
        tracing::trace!(kind = notification.event_type(), "Emitting notification");
        // no receivers is not an error
        let _ = self.tx.send(notification);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_emit_reaches_subscribers() {
        let notifier = Notifier::default();
        let mut rx = notifier.subscribe();

        notifier.emit(Notification::DeduplicationCompleted {
            removed: 2,
            kept: 1,
            errors: 0,
            time: Utc::now(),
        });

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), "DeduplicationCompleted");
    }

    #[test]
    fn test_emit_without_subscribers() {
        let notifier = Notifier::new(0);
        assert_eq!(notifier.receiver_count(), 0);
        notifier.emit(Notification::DuplicateAlert {
            duplicates: 3,
            threshold: 1,
            time: Utc::now(),
        });
    }
}
