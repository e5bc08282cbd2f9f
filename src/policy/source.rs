//! Policy sources.
//!
//! The engine reads policies through the [`PolicySource`] trait. The
//! production source lists `ClusterImagePolicy` objects from the API server
//! on every call; it does not cache or watch.

use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, ApiResource, DynamicObject, ListParams};
use kube::Client;
use thiserror::Error;
use tracing::{debug, warn};

use super::{ImagePolicy, PolicyError};
use crate::crd::ClusterImagePolicy;

/// Errors returned when policies cannot be retrieved.
#[derive(Error, Debug)]
pub enum PolicyFetchError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("policy list timed out after {0:?}")]
    Timeout(Duration),

    #[error("policy source unavailable: {0}")]
    Unavailable(String),
}

/// Read-only provider of the current image policies.
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// Return all well-formed policies, in source order.
    async fn list(&self) -> Result<Vec<ImagePolicy>, PolicyFetchError>;
}

/// A policy object that failed validation.
#[derive(Debug)]
pub struct SkippedPolicy {
    pub name: String,
    pub error: PolicyError,
}

/// Result of listing policies, including entries that were skipped.
#[derive(Debug, Default)]
pub struct PolicyListing {
    pub policies: Vec<ImagePolicy>,
    pub skipped: Vec<SkippedPolicy>,
}

/// Lists `ClusterImagePolicy` objects from the Kubernetes API.
///
/// Objects are fetched untyped and converted one by one so that a single
/// malformed policy is skipped instead of failing the whole list.
#[derive(Clone)]
pub struct KubePolicySource {
    client: Client,
    resource: ApiResource,
}

impl KubePolicySource {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            resource: ApiResource::erase::<ClusterImagePolicy>(&()),
        }
    }

    /// List policies and report the objects that were skipped.
    pub async fn list_with_skipped(&self) -> Result<PolicyListing, PolicyFetchError> {
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &self.resource);
        let objects = api.list(&ListParams::default()).await?;

        let mut listing = PolicyListing::default();
        for object in objects.items {
            let name = object.metadata.name.clone().unwrap_or_default();
            let spec = object
                .data
                .get("spec")
                .cloned()
                .unwrap_or(serde_json::Value::Null);
            match ImagePolicy::from_json_spec(&name, spec) {
                Ok(policy) => listing.policies.push(policy),
                Err(error) => {
                    warn!(policy = %name, error = %error, "Skipping malformed ClusterImagePolicy");
                    listing.skipped.push(SkippedPolicy { name, error });
                }
            }
        }

        debug!(
            policies = listing.policies.len(),
            skipped = listing.skipped.len(),
            "Listed ClusterImagePolicy objects"
        );
        Ok(listing)
    }
}

#[async_trait]
impl PolicySource for KubePolicySource {
    async fn list(&self) -> Result<Vec<ImagePolicy>, PolicyFetchError> {
        Ok(self.list_with_skipped().await?.policies)
    }
}

/// Serves a fixed set of policies.
#[derive(Clone, Debug, Default)]
pub struct StaticPolicySource {
    policies: Vec<ImagePolicy>,
}

impl StaticPolicySource {
    pub fn new(policies: Vec<ImagePolicy>) -> Self {
        Self { policies }
    }
}

#[async_trait]
impl PolicySource for StaticPolicySource {
    async fn list(&self) -> Result<Vec<ImagePolicy>, PolicyFetchError> {
        Ok(self.policies.clone())
    }
}
