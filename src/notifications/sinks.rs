use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::{Notification, Notifier, Severity};

/// Writes notifications to the log. Used by the headless runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Info | Severity::Success => info!(severity = %severity, "{}", message),
            Severity::Warning => warn!(severity = %severity, "{}", message),
            Severity::Error => error!(severity = %severity, "{}", message),
        }
    }
}

/// Fans notifications out to any number of toast renderers.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, message: &str, severity: Severity) {
        let notification = Notification {
            message: message.to_string(),
            severity,
            created_at: Utc::now(),
        };
        if let Err(e) = self.tx.send(notification) {
            // Nobody is rendering toasts right now.
            debug!("Dropped notification (no receivers): {}", e.0.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_notifier_delivers_to_all_receivers() {
        let notifier = BroadcastNotifier::new(8);
        let mut first = notifier.subscribe();
        let mut second = notifier.subscribe();

        notifier.notify("Container web restarted", Severity::Success);

        let a = first.recv().await.unwrap();
        let b = second.recv().await.unwrap();
        assert_eq!(a.message, "Container web restarted");
        assert_eq!(a.severity, Severity::Success);
        assert_eq!(a, b);
    }

    #[test]
    fn test_broadcast_notifier_without_receivers_does_not_panic() {
        let notifier = BroadcastNotifier::new(0);
        notifier.notify("nobody listening", Severity::Error);
    }

    #[test]
    fn test_severity_serializes_lowercase() {
        let json = serde_json::to_string(&Severity::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
    }
}
