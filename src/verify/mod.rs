//! Signature verification orchestration.
//!
//! [`SignatureVerifier`] runs the checks in a fixed order for each image:
//!
//! 1. Reject references that name a signature artifact instead of an image
//! 2. Resolve the public key from the [`KeyChain`]
//! 3. Fetch transparency-log trust material (optionally fail-open)
//! 4. Verify the image signatures through a [`SignatureBackend`]
//!
//! Nothing is cached between calls. The timeout is applied by the caller.

mod cosign;
mod error;
mod keys;

pub use cosign::SigstoreBackend;
pub use error::{BackendError, VerificationError};
pub use keys::{ENV_KEY_PREFIX, HOME_KEY_FILE, KeyChain, KeySource, VerificationKey};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::VerifierConfig;
use crate::image::NormalizedImage;

/// Verifies that an image is signed.
#[async_trait]
pub trait ImageVerifier: Send + Sync {
    async fn verify(&self, image: &NormalizedImage) -> Result<(), VerificationError>;
}

/// Low-level signature operations.
#[async_trait]
pub trait SignatureBackend: Send + Sync {
    /// Transparency-log trust material passed back into verification.
    type TrustMaterial: Send + Sync;

    /// Fetch the transparency-log public keys.
    async fn transparency_log(&self) -> Result<Self::TrustMaterial, BackendError>;

    /// Verify the signatures of `image` against `key`.
    async fn verify_signatures(
        &self,
        image: &str,
        key: &VerificationKey,
        trust: Option<&Self::TrustMaterial>,
    ) -> Result<(), BackendError>;
}

/// Heuristic for cosign signature tags such as `repo:sha256-<hex>.sig`.
pub fn looks_like_signature_artifact(image: &str) -> bool {
    let image = image.trim();
    image.ends_with(".sig") && image.contains("sha256-")
}

/// Key-based image signature verifier.
pub struct SignatureVerifier<B> {
    keys: KeyChain,
    backend: B,
    ignore_tlog: bool,
}

impl<B: SignatureBackend> SignatureVerifier<B> {
    pub fn new(keys: KeyChain, backend: B, ignore_tlog: bool) -> Self {
        Self {
            keys,
            backend,
            ignore_tlog,
        }
    }

    pub fn from_config(config: &VerifierConfig, backend: B) -> Self {
        Self::new(KeyChain::from_config(config), backend, config.ignore_tlog)
    }
}

#[async_trait]
impl<B: SignatureBackend> ImageVerifier for SignatureVerifier<B> {
    async fn verify(&self, image: &NormalizedImage) -> Result<(), VerificationError> {
        if looks_like_signature_artifact(&image.full) {
            return Err(VerificationError::LooksLikeSignatureArtifact(
                image.full.clone(),
            ));
        }

        let key = self.keys.resolve().await?;

        let trust = match self.backend.transparency_log().await {
            Ok(trust) => Some(trust),
            Err(e) if self.ignore_tlog => {
                warn!(
                    error = %e,
                    "Cannot load Rekor public keys; COSIGN_IGNORE_TLOG=true so skipping tlog verification"
                );
                None
            }
            Err(e) => return Err(VerificationError::TransparencyLogUnavailable(e.to_string())),
        };

        self.backend
            .verify_signatures(&image.full, &key, trust.as_ref())
            .await
            .map_err(|e| VerificationError::SignatureInvalid {
                image: image.full.clone(),
                cause: e.to_string(),
            })?;

        info!(image = %image.full, key = %key.source(), tlog = trust.is_some(), "Image signature verified");
        Ok(())
    }
}
