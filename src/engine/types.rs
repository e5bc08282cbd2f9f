//! Decision engine data types.

use std::time::Duration;

use crate::config::{DEFAULT_POLICY_FETCH_TIMEOUT_SECS, DEFAULT_VERIFY_TIMEOUT_SECS};
use crate::notify::DecisionEvent;

/// Reason given when no policy covers an image.
pub const NO_MATCHING_POLICY: &str = "no matching policy";

/// One image to admit, as found in a container spec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdmissionRequest {
    /// Raw image string.
    pub image: String,
    pub namespace: String,
}

impl AdmissionRequest {
    pub fn new(image: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            namespace: namespace.into(),
        }
    }
}

/// Why a decision came out the way it did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// An Enforce policy matched and the signature verified.
    Verified,
    /// An Audit policy matched; admitted regardless of signature.
    Audited,
    /// No policy matched and unmatched images are allowed.
    DefaultAllowed,
    /// No policy matched and unmatched images are denied.
    NoMatchingPolicy,
    /// The image signature is missing or invalid.
    Rejected,
    /// The image reference is malformed.
    InvalidReference,
    /// Verification key or transparency log unavailable.
    Misconfigured,
    /// Policies could not be listed.
    PolicyUnavailable,
}

impl Outcome {
    /// Whether the outcome reflects a problem with the webhook itself
    /// rather than with the image.
    pub fn is_system_error(self) -> bool {
        matches!(self, Outcome::Misconfigured | Outcome::PolicyUnavailable)
    }

    /// Stable label used in metrics and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Verified => "verified",
            Outcome::Audited => "audited",
            Outcome::DefaultAllowed => "default_allowed",
            Outcome::NoMatchingPolicy => "no_matching_policy",
            Outcome::Rejected => "rejected",
            Outcome::InvalidReference => "invalid_reference",
            Outcome::Misconfigured => "misconfigured",
            Outcome::PolicyUnavailable => "policy_unavailable",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The admission verdict for one image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub reason: String,
    pub matched_policy: Option<String>,
    pub outcome: Outcome,
}

impl Decision {
    pub fn allow(outcome: Outcome, reason: impl Into<String>, matched_policy: Option<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
            matched_policy,
            outcome,
        }
    }

    pub fn deny(outcome: Outcome, reason: impl Into<String>, matched_policy: Option<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            matched_policy,
            outcome,
        }
    }

    /// The notification describing this decision.
    pub fn event(&self, request: &AdmissionRequest) -> DecisionEvent {
        DecisionEvent {
            image: request.image.clone(),
            namespace: request.namespace.clone(),
            allowed: self.allowed,
            outcome: self.outcome,
            matched_policy: self.matched_policy.clone(),
            reason: self.reason.clone(),
        }
    }
}

/// What to do with images no policy covers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NoMatchAction {
    #[default]
    Deny,
    Allow,
}

/// How Audit policies treat matched images.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AuditMode {
    /// Admit without checking the signature.
    #[default]
    AllowUnverified,
    /// Check the signature, report the result, and admit anyway.
    VerifyNonBlocking,
}

/// Tunables of the decision engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub verification_timeout: Duration,
    pub policy_fetch_timeout: Duration,
    pub no_match: NoMatchAction,
    pub audit: AuditMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            verification_timeout: Duration::from_secs(DEFAULT_VERIFY_TIMEOUT_SECS),
            policy_fetch_timeout: Duration::from_secs(DEFAULT_POLICY_FETCH_TIMEOUT_SECS),
            no_match: NoMatchAction::default(),
            audit: AuditMode::default(),
        }
    }
}
