//! Cosign signature checks backed by the `sigstore` crate.
//!
//! The signature image is located by triangulating the image digest
//! (`sha256-<digest>.sig`), its layers are fetched, and every layer is
//! checked against the public key. When Rekor trust material is available
//! it is handed to the client so bundle entries are verified too.

use async_trait::async_trait;
use sigstore::cosign::verification_constraint::{PublicKeyVerifier, VerificationConstraintVec};
use sigstore::cosign::{ClientBuilder, CosignCapabilities, verify_constraints};
use sigstore::crypto::SigningScheme;
use sigstore::registry::{Auth, OciReference};
use sigstore::trust::sigstore::SigstoreTrustRoot;
use tracing::debug;

use super::{BackendError, SignatureBackend, VerificationKey};

/// Verifies cosign signatures stored next to the image in its registry.
///
/// Registries are accessed anonymously.
#[derive(Clone, Debug, Default)]
pub struct SigstoreBackend;

impl SigstoreBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SignatureBackend for SigstoreBackend {
    type TrustMaterial = SigstoreTrustRoot;

    async fn transparency_log(&self) -> Result<SigstoreTrustRoot, BackendError> {
        SigstoreTrustRoot::new(None).await.map_err(BackendError::new)
    }

    async fn verify_signatures(
        &self,
        image: &str,
        key: &VerificationKey,
        trust_root: Option<&SigstoreTrustRoot>,
    ) -> Result<(), BackendError> {
        let reference: OciReference = image.parse().map_err(BackendError::new)?;

        let mut builder = ClientBuilder::default();
        if let Some(trust_root) = trust_root {
            builder = builder
                .with_trust_repository(trust_root)
                .map_err(BackendError::new)?;
        }
        let mut client = builder.build().map_err(BackendError::new)?;

        let auth = Auth::Anonymous;
        let (signature_image, source_digest) = client
            .triangulate(&reference, &auth)
            .await
            .map_err(BackendError::new)?;
        debug!(image = %image, signature_image = %signature_image, "Resolved signature image");

        let layers = client
            .trusted_signature_layers(&auth, &source_digest, &signature_image)
            .await
            .map_err(BackendError::new)?;
        if layers.is_empty() {
            return Err(BackendError::new("no signatures found"));
        }

        let verifier = PublicKeyVerifier::new(key.pem(), &SigningScheme::default())
            .map_err(|e| BackendError::new(format!("invalid public key {}: {}", key.source(), e)))?;
        let constraints: VerificationConstraintVec = vec![Box::new(verifier)];

        verify_constraints(&layers, constraints.iter()).map_err(BackendError::new)
    }
}
