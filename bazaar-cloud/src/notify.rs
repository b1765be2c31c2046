//! Notification intents
//!
//! Lifecycle and payment services emit intents into an unbounded channel; a
//! background worker hands them to a [`Notifier`]. Delivery failures are only
//! logged and never reach the transition that produced the intent.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::BoxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyKind {
    Approved,
    Rejected,
    Paid,
    PaymentFailed,
    PaymentOverdue,
}

impl NotifyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Paid => "paid",
            Self::PaymentFailed => "payment_failed",
            Self::PaymentOverdue => "payment_overdue",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NotifyIntent {
    pub kind: NotifyKind,
    pub vendor_email: String,
    pub event_id: String,
    /// Kind-specific payload (rejection reason, receipt number, decline message)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

/// Delivery backend (SES, log sink, test doubles)
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, intent: &NotifyIntent) -> Result<(), BoxError>;
}

/// Fire-and-forget handle shared by the services
#[derive(Clone)]
pub struct NotificationDispatcher {
    tx: mpsc::UnboundedSender<NotifyIntent>,
}

impl NotificationDispatcher {
    /// Dispatcher plus the raw receiving end (tests, custom workers)
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<NotifyIntent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Dispatcher backed by a spawned [`NotifyWorker`]
    pub fn spawn(notifier: Arc<dyn Notifier>) -> Self {
        let (dispatcher, rx) = Self::channel();
        tokio::spawn(NotifyWorker::new(notifier).run(rx));
        dispatcher
    }

    pub fn notify(
        &self,
        kind: NotifyKind,
        vendor_email: &str,
        event_id: &str,
        extra: Option<serde_json::Value>,
    ) {
        let intent = NotifyIntent {
            kind,
            vendor_email: vendor_email.to_string(),
            event_id: event_id.to_string(),
            extra,
        };
        if self.tx.send(intent).is_err() {
            tracing::warn!(
                kind = kind.as_str(),
                event_id = event_id,
                "Notification worker gone, intent dropped"
            );
        }
    }
}

/// Background consumer of notification intents
pub struct NotifyWorker {
    notifier: Arc<dyn Notifier>,
}

impl NotifyWorker {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Runs until every dispatcher handle is dropped
    pub async fn run(self, mut rx: mpsc::UnboundedReceiver<NotifyIntent>) {
        tracing::info!("Notification worker started");

        while let Some(intent) = rx.recv().await {
            match self.notifier.deliver(&intent).await {
                Ok(()) => {
                    tracing::debug!(
                        kind = intent.kind.as_str(),
                        event_id = %intent.event_id,
                        "Notification delivered"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        kind = intent.kind.as_str(),
                        event_id = %intent.event_id,
                        error = %e,
                        "Failed to deliver notification"
                    );
                }
            }
        }

        tracing::info!("Notification channel closed, worker stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FlakyNotifier {
        seen: Mutex<Vec<NotifyKind>>,
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn deliver(&self, intent: &NotifyIntent) -> Result<(), BoxError> {
            self.seen.lock().unwrap().push(intent.kind);
            if intent.kind == NotifyKind::Rejected {
                return Err("smtp down".into());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_worker_survives_delivery_failure() {
        let notifier = Arc::new(FlakyNotifier {
            seen: Mutex::new(Vec::new()),
        });
        let (dispatcher, rx) = NotificationDispatcher::channel();
        dispatcher.notify(NotifyKind::Rejected, "v@example.com", "e1", None);
        dispatcher.notify(NotifyKind::Approved, "v@example.com", "e1", None);
        drop(dispatcher);

        NotifyWorker::new(notifier.clone()).run(rx).await;

        let seen = notifier.seen.lock().unwrap();
        assert_eq!(*seen, vec![NotifyKind::Rejected, NotifyKind::Approved]);
    }

    #[test]
    fn test_notify_without_worker_does_not_panic() {
        let (dispatcher, rx) = NotificationDispatcher::channel();
        drop(rx);
        dispatcher.notify(NotifyKind::Paid, "v@example.com", "e1", None);
    }
}
