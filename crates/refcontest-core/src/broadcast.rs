//! Broadcast dispatcher.
//!
//! Delivers one source message to every recipient, in order, pausing after
//! each batch to stay under platform rate limits. A failed delivery is
//! counted and skipped; it never aborts the run and is not retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::settings::merge_with_ad;
use crate::store::UserId;

/// Default number of sends between pauses.
pub const DEFAULT_BATCH_SIZE: usize = 25;

/// Default pause between batches.
pub const DEFAULT_BATCH_PAUSE: Duration = Duration::from_millis(200);

/// Default bound on a single delivery.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Why a single delivery failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum DeliveryError {
    /// The recipient blocked the bot.
    #[error("recipient blocked the bot")]
    Blocked,

    /// The recipient's account no longer exists.
    #[error("recipient account deactivated")]
    Deactivated,

    /// Any other platform or network failure.
    #[error("delivery failed: {0}")]
    Transient(String),
}

/// A message already posted somewhere that can be copied to recipients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    /// Chat holding the original message.
    pub chat_id: i64,
    /// Message id within that chat.
    pub message_id: i64,
}

/// What to broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastSource {
    /// A plain text message, re-sent as text.
    Text(String),
    /// A media message, copied with a rebuilt caption.
    Media {
        /// The original message.
        source: MessageRef,
        /// Its caption, if it had one.
        caption: Option<String>,
    },
}

/// Outbound delivery primitives of the chat platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Sends a text message.
    async fn send_message(&self, user_id: UserId, text: &str) -> Result<(), DeliveryError>;

    /// Copies an existing message, replacing its caption.
    async fn copy_message(
        &self,
        user_id: UserId,
        source: &MessageRef,
        caption: Option<&str>,
    ) -> Result<(), DeliveryError>;
}

/// Outcome of a broadcast run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Successful deliveries.
    pub sent: u64,
    /// Failed or timed-out deliveries.
    pub failed: u64,
}

/// Final payload sent to every recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Payload {
    Text(String),
    Copy {
        source: MessageRef,
        caption: Option<String>,
    },
}

/// Prefixes `base` with `extra` when `extra` is non-blank.
fn with_extra(extra: &str, base: &str) -> String {
    let extra = extra.trim();
    if extra.is_empty() {
        base.to_string()
    } else {
        format!("{extra}\n\n{base}").trim().to_string()
    }
}

impl Payload {
    fn compose(source: &BroadcastSource, extra: &str, footer: &str) -> Self {
        match source {
            BroadcastSource::Text(text) => Self::Text(merge_with_ad(&with_extra(extra, text), footer)),
            BroadcastSource::Media { source, caption } => {
                let combined = with_extra(extra, caption.as_deref().unwrap_or_default());
                let caption = merge_with_ad(&combined, footer).trim().to_string();
                Self::Copy {
                    source: source.clone(),
                    caption: (!caption.is_empty()).then_some(caption),
                }
            },
        }
    }
}

/// Paced, failure-isolating fan-out of one message to many users.
#[derive(Clone)]
pub struct BroadcastDispatcher {
    messenger: Arc<dyn Messenger>,
    batch_size: usize,
    batch_pause: Duration,
    send_timeout: Duration,
}

impl std::fmt::Debug for BroadcastDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastDispatcher")
            .field("batch_size", &self.batch_size)
            .field("batch_pause", &self.batch_pause)
            .field("send_timeout", &self.send_timeout)
            .finish_non_exhaustive()
    }
}

impl BroadcastDispatcher {
    /// Creates a dispatcher with the default pacing.
    #[must_use]
    pub fn new(messenger: Arc<dyn Messenger>) -> Self {
        Self {
            messenger,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_pause: DEFAULT_BATCH_PAUSE,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// Sets the number of sends between pauses. Zero is treated as one.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sets the pause taken after each full batch.
    #[must_use]
    pub const fn with_batch_pause(mut self, batch_pause: Duration) -> Self {
        self.batch_pause = batch_pause;
        self
    }

    /// Sets the per-delivery timeout.
    #[must_use]
    pub const fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    /// Delivers `source` to every id in `recipients`.
    ///
    /// `extra` is placed above the original text or caption; `footer` is
    /// the ad footer appended below it.
    pub async fn dispatch(
        &self,
        source: &BroadcastSource,
        extra: &str,
        footer: &str,
        recipients: &[UserId],
    ) -> BroadcastReport {
        let payload = Payload::compose(source, extra, footer);
        let mut report = BroadcastReport::default();

        for (index, &user_id) in recipients.iter().enumerate() {
            match self.deliver(user_id, &payload).await {
                Ok(()) => report.sent += 1,
                Err(error) => {
                    debug!(user_id, %error, "broadcast delivery failed");
                    report.failed += 1;
                },
            }
            if (index + 1) % self.batch_size == 0 {
                tokio::time::sleep(self.batch_pause).await;
            }
        }

        info!(
            recipients = recipients.len(),
            sent = report.sent,
            failed = report.failed,
            "broadcast finished"
        );
        report
    }

    async fn deliver(&self, user_id: UserId, payload: &Payload) -> Result<(), DeliveryError> {
        let send = async {
            match payload {
                Payload::Text(text) => self.messenger.send_message(user_id, text).await,
                Payload::Copy { source, caption } => {
                    self.messenger
                        .copy_message(user_id, source, caption.as_deref())
                        .await
                },
            }
        };
        tokio::time::timeout(self.send_timeout, send)
            .await
            .unwrap_or_else(|_| Err(DeliveryError::Transient("timed out".into())))
    }
}
