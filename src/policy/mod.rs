//! Image policy model.
//!
//! [`ImagePolicy`] is the strongly-typed, validated form of a
//! `ClusterImagePolicy` object. Policies are validated once at the policy
//! source boundary; the decision engine only ever sees well-formed policies.

pub mod matcher;
pub mod source;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crd::{ClusterImagePolicy, ClusterImagePolicySpec};

pub use matcher::{applies, first_matching_rule, match_rule};
pub use source::{KubePolicySource, PolicyFetchError, PolicySource, StaticPolicySource};

/// What happens to an image matched by a policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum PolicyAction {
    /// Matching images must carry a valid signature.
    #[default]
    Enforce,
    /// Matching images are admitted and reported.
    Audit,
}

impl std::fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyAction::Enforce => write!(f, "Enforce"),
            PolicyAction::Audit => write!(f, "Audit"),
        }
    }
}

/// A single image glob.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct ImageRule {
    /// Shell glob over `registry/repository`, e.g. `ghcr.io/my-org/*`.
    pub glob: String,
}

impl ImageRule {
    pub fn new(glob: impl Into<String>) -> Self {
        Self { glob: glob.into() }
    }
}

/// Errors found while validating a policy object.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("policy has no name")]
    MissingName,

    #[error("policy spec is malformed: {0}")]
    MalformedSpec(#[from] serde_json::Error),

    #[error("image rule #{index} has an empty glob")]
    EmptyGlob { index: usize },

    #[error("image rule #{index} has an invalid glob '{glob}': {reason}")]
    InvalidGlob {
        index: usize,
        glob: String,
        reason: String,
    },
}

/// A validated image policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImagePolicy {
    pub name: String,
    pub namespaces: Vec<String>,
    pub images: Vec<ImageRule>,
    pub action: PolicyAction,
}

impl ImagePolicy {
    /// Build a policy from its name and spec, validating every glob.
    pub fn from_spec(name: &str, spec: ClusterImagePolicySpec) -> Result<Self, PolicyError> {
        if name.is_empty() {
            return Err(PolicyError::MissingName);
        }

        for (index, rule) in spec.images.iter().enumerate() {
            if rule.glob.trim().is_empty() {
                return Err(PolicyError::EmptyGlob { index });
            }
            if let Err(e) = matcher::compile(&rule.glob) {
                return Err(PolicyError::InvalidGlob {
                    index,
                    glob: rule.glob.clone(),
                    reason: e.to_string(),
                });
            }
        }

        Ok(Self {
            name: name.to_string(),
            namespaces: spec.namespaces,
            images: spec.images,
            action: spec.action,
        })
    }

    /// Convert a typed `ClusterImagePolicy` resource.
    pub fn from_resource(resource: &ClusterImagePolicy) -> Result<Self, PolicyError> {
        let name = resource.metadata.name.as_deref().unwrap_or_default();
        Self::from_spec(name, resource.spec.clone())
    }

    /// Convert an untyped object, e.g. from a dynamic list.
    ///
    /// `spec` is the raw JSON value of the object's `spec` field.
    pub fn from_json_spec(name: &str, spec: serde_json::Value) -> Result<Self, PolicyError> {
        let spec: ClusterImagePolicySpec = serde_json::from_value(spec)?;
        Self::from_spec(name, spec)
    }
}
