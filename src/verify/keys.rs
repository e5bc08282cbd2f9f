//! Verification key resolution.
//!
//! Keys are resolved from an ordered list of [`KeySource`] strategies, first
//! hit wins. Explicitly configured sources are terminal: if one is set but
//! cannot be loaded, resolution fails rather than silently falling through
//! to a different key. Fallback files are skipped when absent.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::VerificationError;
use crate::config::VerifierConfig;

/// Prefix of key references that name an environment variable.
pub const ENV_KEY_PREFIX: &str = "env://";

/// File name of the key looked up in the home directory.
pub const HOME_KEY_FILE: &str = "cosign.pub";

/// A loaded PEM-encoded public key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationKey {
    pem: Vec<u8>,
    source: String,
}

impl VerificationKey {
    /// Wrap PEM bytes, checking that they look like a PEM block.
    pub fn from_pem(pem: impl Into<Vec<u8>>, source: impl Into<String>) -> Result<Self, VerificationError> {
        let pem = pem.into();
        let source = source.into();
        let text = String::from_utf8_lossy(&pem);
        if !text.contains("-----BEGIN ") || !text.contains("-----END ") {
            return Err(VerificationError::KeyUnavailable(format!(
                "{} is not a PEM-encoded public key",
                source
            )));
        }
        Ok(Self { pem, source })
    }

    pub fn pem(&self) -> &[u8] {
        &self.pem
    }

    /// Where the key was loaded from.
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// One way of obtaining the verification key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeySource {
    /// PEM content supplied directly.
    InlinePem(String),
    /// A key file path.
    Reference(String),
    /// An `env://NAME` reference with the content of `NAME`, if it was set.
    Env {
        reference: String,
        pem: Option<String>,
    },
    /// A well-known file used only if it exists.
    FallbackFile(PathBuf),
}

impl KeySource {
    /// Try to load the key. `Ok(None)` means "not available here, try the
    /// next source".
    pub async fn load(&self) -> Result<Option<VerificationKey>, VerificationError> {
        match self {
            KeySource::InlinePem(pem) => {
                VerificationKey::from_pem(pem.as_bytes(), "inline PEM").map(Some)
            }
            KeySource::Reference(reference) => read_key_file(Path::new(reference)).await.map(Some),
            KeySource::Env { reference, pem } => match pem {
                Some(pem) => VerificationKey::from_pem(pem.as_bytes(), reference.as_str()).map(Some),
                None => Err(VerificationError::KeyUnavailable(format!(
                    "{}: environment variable not set",
                    reference
                ))),
            },
            KeySource::FallbackFile(path) => {
                if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                    debug!(path = %path.display(), "Fallback key file not present");
                    return Ok(None);
                }
                read_key_file(path).await.map(Some)
            }
        }
    }
}

impl std::fmt::Display for KeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeySource::InlinePem(_) => write!(f, "inline PEM"),
            KeySource::Reference(reference) | KeySource::Env { reference, .. } => {
                write!(f, "key reference {}", reference)
            }
            KeySource::FallbackFile(path) => write!(f, "fallback file {}", path.display()),
        }
    }
}

async fn read_key_file(path: &Path) -> Result<VerificationKey, VerificationError> {
    let pem = tokio::fs::read(path).await.map_err(|e| {
        VerificationError::KeyUnavailable(format!("{}: {}", path.display(), e))
    })?;
    VerificationKey::from_pem(pem, path.display().to_string())
}

/// Ordered list of key sources.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyChain {
    sources: Vec<KeySource>,
}

impl KeyChain {
    pub fn new(sources: Vec<KeySource>) -> Self {
        Self { sources }
    }

    /// Build the chain in precedence order: inline PEM, explicit reference,
    /// local fallback file, then `$HOME/cosign.pub`.
    pub fn from_config(config: &VerifierConfig) -> Self {
        let mut sources = Vec::new();
        if let Some(pem) = config.inline_pem.as_deref().filter(|p| !p.trim().is_empty()) {
            sources.push(KeySource::InlinePem(pem.to_string()));
        }
        if let Some(reference) = config.key_ref.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            if reference.starts_with(ENV_KEY_PREFIX) {
                sources.push(KeySource::Env {
                    reference: reference.to_string(),
                    pem: config.key_ref_env.clone(),
                });
            } else {
                sources.push(KeySource::Reference(reference.to_string()));
            }
        }
        sources.push(KeySource::FallbackFile(config.fallback_key_path.clone()));
        if let Some(home) = &config.home_dir {
            sources.push(KeySource::FallbackFile(home.join(HOME_KEY_FILE)));
        }
        Self { sources }
    }

    pub fn sources(&self) -> &[KeySource] {
        &self.sources
    }

    /// Load the first available key.
    pub async fn resolve(&self) -> Result<VerificationKey, VerificationError> {
        for source in &self.sources {
            if let Some(key) = source.load().await? {
                debug!(source = %key.source(), "Loaded verification key");
                return Ok(key);
            }
        }
        Err(VerificationError::KeyUnavailable(
            "no verification key configured (set COSIGN_PUB_KEY_PEM or COSIGN_PUB_KEY)".to_string(),
        ))
    }
}
