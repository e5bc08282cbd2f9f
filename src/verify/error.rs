//! Error types for signature verification.

use std::time::Duration;

use thiserror::Error;

/// Why an image failed signature verification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// The reference names a cosign signature artifact instead of an image.
    #[error(
        "image {0} looks like a cosign signature artifact tag (ends with .sig); verify the real image tag/digest instead, e.g. repo:tag or repo@sha256:..."
    )]
    LooksLikeSignatureArtifact(String),

    /// No verification key could be loaded.
    #[error("load public key: {0}")]
    KeyUnavailable(String),

    /// Transparency log keys could not be fetched and the log is not ignored.
    #[error(
        "cannot load Rekor public keys (needed to verify bundle): {0} (set COSIGN_IGNORE_TLOG=true to skip tlog verification)"
    )]
    TransparencyLogUnavailable(String),

    /// Signatures were missing or did not verify against the key.
    #[error("verify failed for \"{image}\": {cause}")]
    SignatureInvalid { image: String, cause: String },

    /// Verification did not finish within the configured timeout.
    #[error("signature verification timed out after {0:?}")]
    Timeout(Duration),
}

impl VerificationError {
    /// Whether the failure points at webhook configuration rather than at
    /// the image itself.
    pub fn is_misconfiguration(&self) -> bool {
        matches!(
            self,
            VerificationError::KeyUnavailable(_) | VerificationError::TransparencyLogUnavailable(_)
        )
    }

    /// Short machine-readable name, logged as `error_kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            VerificationError::LooksLikeSignatureArtifact(_) => "LooksLikeSignatureArtifact",
            VerificationError::KeyUnavailable(_) => "KeyUnavailable",
            VerificationError::TransparencyLogUnavailable(_) => "TransparencyLogUnavailable",
            VerificationError::SignatureInvalid { .. } => "SignatureInvalid",
            VerificationError::Timeout(_) => "Timeout",
        }
    }
}

/// Opaque failure reported by a signature backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(message: impl std::fmt::Display) -> Self {
        Self(message.to_string())
    }
}
