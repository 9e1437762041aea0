use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::model::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    BookingRequested,
    BookingConfirmed,
    BookingRejected,
    BookingCancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub link: String,
}

#[derive(Debug)]
pub enum NotifyError {
    QueueFull,
    Closed,
    Delivery(String),
}

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyError::QueueFull => write!(f, "notification queue full"),
            NotifyError::Closed => write!(f, "notification queue closed"),
            NotifyError::Delivery(e) => write!(f, "delivery failed: {e}"),
        }
    }
}

impl std::error::Error for NotifyError {}

/// Outbound notification sink. Callers treat delivery as best-effort.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Logs notifications instead of delivering them.
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, n: Notification) -> Result<(), NotifyError> {
        info!(user = %n.user_id, kind = ?n.kind, link = %n.link, "{}: {}", n.title, n.body);
        Ok(())
    }
}

/// Hands notifications to a bounded queue drained by a delivery worker.
/// Never waits: a full queue is reported as a failure.
#[derive(Debug, Clone)]
pub struct OutboxNotifier {
    tx: mpsc::Sender<Notification>,
}

impl OutboxNotifier {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn notify(&self, n: Notification) -> Result<(), NotifyError> {
        self.tx.try_send(n).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => NotifyError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => NotifyError::Closed,
        })
    }
}
