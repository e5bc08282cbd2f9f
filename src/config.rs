//! Process configuration.
//!
//! All settings come from environment variables and are read once at
//! startup. [`Config::from_lookup`] takes any lookup function so tests can
//! supply their own values without touching the process environment.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::engine::{AuditMode, EngineConfig, NoMatchAction};
use crate::verify::ENV_KEY_PREFIX;

/// Default local fallback location for the verification key.
pub const DEFAULT_FALLBACK_KEY_PATH: &str = "/etc/image-policy-webhook/cosign.pub";
/// Default path to webhook TLS certificate
pub const WEBHOOK_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const WEBHOOK_KEY_PATH: &str = "/etc/webhook/certs/tls.key";
/// Default signature verification timeout
pub const DEFAULT_VERIFY_TIMEOUT_SECS: u64 = 10;
/// Default policy list timeout
pub const DEFAULT_POLICY_FETCH_TIMEOUT_SECS: u64 = 10;

/// Errors raised while reading the configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid boolean '{value}' (expected true/false/1/0/yes/no)")]
    InvalidBool { var: &'static str, value: String },

    #[error("{var}: invalid number of seconds '{value}'")]
    InvalidDuration { var: &'static str, value: String },

    #[error("{var}: invalid value '{value}' (expected one of: {expected})")]
    InvalidChoice {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Signature verification settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifierConfig {
    /// `COSIGN_PUB_KEY_PEM`
    pub inline_pem: Option<String>,
    /// `COSIGN_PUB_KEY`: a file path or `env://VAR`
    pub key_ref: Option<String>,
    /// Content of `VAR` when `key_ref` is `env://VAR`, read with the rest of
    /// the configuration.
    pub key_ref_env: Option<String>,
    pub fallback_key_path: PathBuf,
    pub home_dir: Option<PathBuf>,
    /// Continue without the transparency log when it cannot be fetched.
    pub ignore_tlog: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            inline_pem: None,
            key_ref: None,
            key_ref_env: None,
            fallback_key_path: PathBuf::from(DEFAULT_FALLBACK_KEY_PATH),
            home_dir: None,
            ignore_tlog: false,
        }
    }
}

/// Telegram Bot API credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: String,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"<redacted>")
            .field("chat_id", &self.chat_id)
            .finish()
    }
}

/// Complete webhook configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub verifier: VerifierConfig,
    pub engine: EngineConfig,
    /// `None` when either Telegram variable is unset; decisions are then only logged.
    pub telegram: Option<TelegramConfig>,
    pub webhook_cert_path: PathBuf,
    pub webhook_key_path: PathBuf,
}

impl Config {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Unset and blank are treated the same.
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let key_ref = get("COSIGN_PUB_KEY");
        let key_ref_env = key_ref
            .as_deref()
            .and_then(|reference| reference.strip_prefix(ENV_KEY_PREFIX))
            .and_then(|var| lookup(var))
            .filter(|v| !v.trim().is_empty());

        let verifier = VerifierConfig {
            // PEM content keeps its inner newlines; only the blank check trims.
            inline_pem: lookup("COSIGN_PUB_KEY_PEM").filter(|v| !v.trim().is_empty()),
            key_ref,
            key_ref_env,
            fallback_key_path: get("COSIGN_FALLBACK_KEY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FALLBACK_KEY_PATH)),
            home_dir: get("HOME").map(PathBuf::from),
            ignore_tlog: parse_bool("COSIGN_IGNORE_TLOG", get("COSIGN_IGNORE_TLOG"), false)?,
        };

        let engine = EngineConfig {
            verification_timeout: parse_secs(
                "COSIGN_VERIFY_TIMEOUT_SECS",
                get("COSIGN_VERIFY_TIMEOUT_SECS"),
                DEFAULT_VERIFY_TIMEOUT_SECS,
            )?,
            policy_fetch_timeout: parse_secs(
                "POLICY_FETCH_TIMEOUT_SECS",
                get("POLICY_FETCH_TIMEOUT_SECS"),
                DEFAULT_POLICY_FETCH_TIMEOUT_SECS,
            )?,
            no_match: match get("IMAGE_POLICY_NO_MATCH").map(|v| v.to_ascii_lowercase()).as_deref() {
                None | Some("deny") => NoMatchAction::Deny,
                Some("allow") => NoMatchAction::Allow,
                Some(other) => {
                    return Err(ConfigError::InvalidChoice {
                        var: "IMAGE_POLICY_NO_MATCH",
                        value: other.to_string(),
                        expected: "deny, allow",
                    });
                }
            },
            audit: match get("IMAGE_POLICY_AUDIT_MODE").map(|v| v.to_ascii_lowercase()).as_deref() {
                None | Some("allow") => AuditMode::AllowUnverified,
                Some("verify") => AuditMode::VerifyNonBlocking,
                Some(other) => {
                    return Err(ConfigError::InvalidChoice {
                        var: "IMAGE_POLICY_AUDIT_MODE",
                        value: other.to_string(),
                        expected: "allow, verify",
                    });
                }
            },
        };

        let telegram = match (get("TELEGRAM_BOT_TOKEN"), get("TELEGRAM_CHAT_ID")) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramConfig { bot_token, chat_id }),
            _ => None,
        };

        Ok(Self {
            verifier,
            engine,
            telegram,
            webhook_cert_path: get("WEBHOOK_CERT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(WEBHOOK_CERT_PATH)),
            webhook_key_path: get("WEBHOOK_KEY_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(WEBHOOK_KEY_PATH)),
        })
    }
}

fn parse_bool(var: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBool { var, value }),
    }
}

fn parse_secs(var: &'static str, value: Option<String>, default: u64) -> Result<Duration, ConfigError> {
    let Some(value) = value else {
        return Ok(Duration::from_secs(default));
    };
    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidDuration { var, value }),
    }
}
