//! Best-effort decision notifications.
//!
//! Producers hand messages to a [`NotificationSender`], which never blocks:
//! when the bounded channel is full or closed the message is dropped with a
//! log line. A single dispatcher task drains the channel into a [`Notifier`].
//! Delivery failures are logged and never reach the admission path.

mod telegram;

pub use telegram::{TELEGRAM_API_BASE, TELEGRAM_TIMEOUT, TelegramNotifier};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::TelegramConfig;
use crate::engine::Outcome;

/// Default capacity of the notification channel.
pub const NOTIFICATION_QUEUE_CAPACITY: usize = 256;

/// Errors raised while delivering a notification.
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("failed to send notification: {0}")]
    Request(#[from] reqwest::Error),

    #[error("notification API returned non-2xx: status={status} body={body}")]
    Status { status: u16, body: String },
}

/// Delivers plain-text messages somewhere a human will read them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), NotificationError>;
}

/// Writes notifications to the log. Used when no chat sink is configured.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, message: &str) -> Result<(), NotificationError> {
        info!(notification = %message, "Notification");
        Ok(())
    }
}

/// Pick the notifier for the given configuration.
pub fn notifier_from_config(telegram: Option<&TelegramConfig>) -> Result<Arc<dyn Notifier>, NotificationError> {
    match telegram {
        Some(config) => Ok(Arc::new(TelegramNotifier::new(config)?)),
        None => {
            info!("Telegram notification disabled (missing TELEGRAM_BOT_TOKEN or TELEGRAM_CHAT_ID)");
            Ok(Arc::new(LogNotifier))
        }
    }
}

/// The outcome of one image decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecisionEvent {
    pub image: String,
    pub namespace: String,
    pub allowed: bool,
    pub outcome: Outcome,
    pub matched_policy: Option<String>,
    pub reason: String,
}

impl std::fmt::Display for DecisionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verdict = if self.allowed { "allowed" } else { "denied" };
        write!(f, "Image {} {} in namespace {}", self.image, verdict, self.namespace)?;
        if let Some(policy) = &self.matched_policy {
            write!(f, " by ClusterImagePolicy {}", policy)?;
        }
        write!(f, " ({})\nReason: {}", self.outcome, self.reason)
    }
}

/// The aggregated result of one pod admission review.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PodSummary {
    pub pod: String,
    pub namespace: String,
    pub allowed: bool,
    pub containers: usize,
    pub denied: usize,
}

impl std::fmt::Display for PodSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.allowed {
            write!(
                f,
                "Pod {} admitted in namespace {}: {} image(s) allowed by ClusterImagePolicy",
                self.pod, self.namespace, self.containers
            )
        } else {
            write!(
                f,
                "Pod {} rejected in namespace {}: {} of {} image(s) denied by ClusterImagePolicy",
                self.pod, self.namespace, self.denied, self.containers
            )
        }
    }
}

/// A message queued for delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    Decision(DecisionEvent),
    Pod(PodSummary),
}

impl std::fmt::Display for Notification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notification::Decision(event) => std::fmt::Display::fmt(event, f),
            Notification::Pod(summary) => std::fmt::Display::fmt(summary, f),
        }
    }
}

/// Non-blocking handle for queueing notifications.
#[derive(Clone, Debug)]
pub struct NotificationSender {
    tx: Option<mpsc::Sender<Notification>>,
}

impl NotificationSender {
    /// Create a sender and the receiving end for the dispatcher.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// A sender that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Queue a notification. Returns whether it was accepted.
    pub fn send(&self, notification: Notification) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(notification) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(notification = %dropped, "Notification queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                debug!(notification = %dropped, "Notification dispatcher stopped, dropping message");
                false
            }
        }
    }
}

/// Deliver queued notifications until every sender is dropped.
pub async fn run_dispatcher(mut rx: mpsc::Receiver<Notification>, notifier: Arc<dyn Notifier>) {
    while let Some(notification) = rx.recv().await {
        if let Err(e) = notifier.notify(&notification.to_string()).await {
            warn!(error = %e, "Failed to deliver notification");
        }
    }
    debug!("Notification dispatcher stopped");
}
