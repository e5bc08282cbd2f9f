//! Telegram Bot API notifier.
//!
//! Messages are sent as plain text (no `parse_mode`): the Markdown parser
//! rejects messages containing characters such as `[]()<>`, which image
//! references and error causes routinely contain.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{NotificationError, Notifier};
use crate::config::TelegramConfig;

/// Base URL of the Telegram Bot API.
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Per-request timeout.
pub const TELEGRAM_TIMEOUT: Duration = Duration::from_secs(5);

/// Maximum number of error body bytes kept for logging.
const MAX_ERROR_BODY_BYTES: usize = 4 << 10;

/// Sends notifications to a Telegram chat.
pub struct TelegramNotifier {
    client: reqwest::Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &TelegramConfig) -> Result<Self, NotificationError> {
        Self::with_base_url(config, TELEGRAM_API_BASE)
    }

    /// Create a notifier that talks to a different API host.
    pub fn with_base_url(config: &TelegramConfig, base_url: &str) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .user_agent("image-policy-webhook")
            .timeout(TELEGRAM_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                base_url.trim_end_matches('/'),
                config.bot_token
            ),
            chat_id: config.chat_id.clone(),
        })
    }
}

impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, message: &str) -> Result<(), NotificationError> {
        let form = [("chat_id", self.chat_id.as_str()), ("text", message)];
        let mut response = self
            .client
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await
            // The URL embeds the bot token.
            .map_err(reqwest::Error::without_url)?;

        let status = response.status();
        if status.is_success() {
            debug!(chat_id = %self.chat_id, "Telegram notification sent");
            return Ok(());
        }

        let mut body = Vec::new();
        while body.len() < MAX_ERROR_BODY_BYTES {
            match response.chunk().await {
                Ok(Some(chunk)) => body.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e.without_url(), "Failed to read Telegram error body");
                    break;
                }
            }
        }
        body.truncate(MAX_ERROR_BODY_BYTES);

        Err(NotificationError::Status {
            status: status.as_u16(),
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}
