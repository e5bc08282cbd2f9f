//! Image admission decision engine.
//!
//! For each request the engine walks the policies in source order:
//!
//! 1. Skip policies whose namespace scope does not include the request
//! 2. Find the first rule whose glob matches the image repository
//! 3. Enforce: validate the reference and verify the signature under a
//!    timeout; the first matched Enforce policy decides
//! 4. Audit: admit, optionally verifying for the record ([`AuditMode`])
//!
//! When no policy matches, [`NoMatchAction`] decides. Exactly one decision
//! event is emitted per request, after the decision is complete, so a
//! decision future dropped mid-verification produces no notification.

mod types;

pub use types::{
    AdmissionRequest, AuditMode, Decision, EngineConfig, NO_MATCHING_POLICY, NoMatchAction,
    Outcome,
};

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::health::HealthState;
use crate::image::{ImageReference, NormalizedImage, normalize};
use crate::notify::{Notification, NotificationSender};
use crate::policy::{
    ImagePolicy, PolicyAction, PolicyFetchError, PolicySource, applies, first_matching_rule,
};
use crate::verify::{ImageVerifier, VerificationError};

/// Decides whether images may run.
///
/// Holds no per-request state; share it behind an `Arc`.
pub struct DecisionEngine {
    policies: Arc<dyn PolicySource>,
    verifier: Arc<dyn ImageVerifier>,
    notifications: NotificationSender,
    config: EngineConfig,
    health_state: Option<Arc<HealthState>>,
}

impl DecisionEngine {
    pub fn new(
        policies: Arc<dyn PolicySource>,
        verifier: Arc<dyn ImageVerifier>,
        notifications: NotificationSender,
        config: EngineConfig,
    ) -> Self {
        Self {
            policies,
            verifier,
            notifications,
            config,
            health_state: None,
        }
    }

    /// Record decision metrics into `health_state`.
    pub fn with_health_state(mut self, health_state: Arc<HealthState>) -> Self {
        self.health_state = Some(health_state);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn notifications(&self) -> &NotificationSender {
        &self.notifications
    }

    /// List the current policies under the fetch timeout.
    pub async fn fetch_policies(&self) -> Result<Vec<ImagePolicy>, PolicyFetchError> {
        let limit = self.config.policy_fetch_timeout;
        match tokio::time::timeout(limit, self.policies.list()).await {
            Ok(result) => result,
            Err(_) => Err(PolicyFetchError::Timeout(limit)),
        }
    }

    /// Fetch policies and decide a single request.
    pub async fn evaluate(&self, request: &AdmissionRequest) -> Decision {
        match self.fetch_policies().await {
            Ok(policies) => self.decide(request, &policies).await,
            Err(e) => self.unavailable(request, &e),
        }
    }

    /// Fetch policies once and decide every request concurrently.
    ///
    /// Decisions are returned in request order.
    pub async fn evaluate_all(&self, requests: &[AdmissionRequest]) -> Vec<Decision> {
        if requests.is_empty() {
            return Vec::new();
        }
        match self.fetch_policies().await {
            Ok(policies) => {
                join_all(requests.iter().map(|request| self.decide(request, &policies))).await
            }
            Err(e) => requests
                .iter()
                .map(|request| self.unavailable(request, &e))
                .collect(),
        }
    }

    /// Decide a request against an already-fetched policy list.
    pub async fn decide(&self, request: &AdmissionRequest, policies: &[ImagePolicy]) -> Decision {
        let decision = self.scan(request, policies).await;
        self.record(request, &decision);
        decision
    }

    async fn scan(&self, request: &AdmissionRequest, policies: &[ImagePolicy]) -> Decision {
        let image = normalize(&request.image);

        for policy in policies {
            if !applies(policy, &request.namespace) {
                continue;
            }
            let Some(rule) = first_matching_rule(policy, &image) else {
                continue;
            };
            debug!(
                image = %image,
                namespace = %request.namespace,
                policy = %policy.name,
                glob = %rule.glob,
                action = %policy.action,
                "Image matched policy"
            );

            return match policy.action {
                PolicyAction::Enforce => self.enforce(policy, &image).await,
                PolicyAction::Audit => self.audit(policy, &image).await,
            };
        }

        match self.config.no_match {
            NoMatchAction::Deny => Decision::deny(Outcome::NoMatchingPolicy, NO_MATCHING_POLICY, None),
            NoMatchAction::Allow => Decision::allow(
                Outcome::DefaultAllowed,
                format!("{}; unmatched images are allowed", NO_MATCHING_POLICY),
                None,
            ),
        }
    }

    async fn enforce(&self, policy: &ImagePolicy, image: &NormalizedImage) -> Decision {
        let matched = Some(policy.name.clone());

        if let Err(e) = ImageReference::parse(&image.full) {
            return Decision::deny(
                Outcome::InvalidReference,
                format!(
                    "image {} is not valid under ClusterImagePolicy {} (action: Enforce): invalid image reference: {}",
                    image, policy.name, e
                ),
                matched,
            );
        }

        match self.verify(image).await {
            Ok(()) => Decision::allow(
                Outcome::Verified,
                format!(
                    "image {} is valid under ClusterImagePolicy {} (action: Enforce)",
                    image, policy.name
                ),
                matched,
            ),
            Err(e) => {
                warn!(
                    image = %image,
                    policy = %policy.name,
                    error_kind = e.kind(),
                    error = %e,
                    "Signature verification failed"
                );
                let outcome = if e.is_misconfiguration() {
                    Outcome::Misconfigured
                } else {
                    Outcome::Rejected
                };
                Decision::deny(
                    outcome,
                    format!(
                        "image {} is not valid under ClusterImagePolicy {} (action: Enforce): {}",
                        image, policy.name, e
                    ),
                    matched,
                )
            }
        }
    }

    async fn audit(&self, policy: &ImagePolicy, image: &NormalizedImage) -> Decision {
        let matched = Some(policy.name.clone());

        if self.config.audit == AuditMode::AllowUnverified {
            return Decision::allow(
                Outcome::Audited,
                format!(
                    "image {} is admitted under ClusterImagePolicy {} (action: Audit)",
                    image, policy.name
                ),
                matched,
            );
        }

        let result = match ImageReference::parse(&image.full) {
            Ok(_) => self.verify(image).await.map_err(|e| e.to_string()),
            Err(e) => Err(format!("invalid image reference: {}", e)),
        };
        let reason = match result {
            Ok(()) => format!(
                "image {} is admitted under ClusterImagePolicy {} (action: Audit): signature verified",
                image, policy.name
            ),
            Err(cause) => {
                warn!(image = %image, policy = %policy.name, error = %cause, "Audit verification failed, admitting anyway");
                format!(
                    "image {} is admitted under ClusterImagePolicy {} (action: Audit): verification failed: {}",
                    image, policy.name, cause
                )
            }
        };
        Decision::allow(Outcome::Audited, reason, matched)
    }

    async fn verify(&self, image: &NormalizedImage) -> Result<(), VerificationError> {
        let limit = self.config.verification_timeout;
        match tokio::time::timeout(limit, self.verifier.verify(image)).await {
            Ok(result) => result,
            Err(_) => Err(VerificationError::Timeout(limit)),
        }
    }

    fn unavailable(&self, request: &AdmissionRequest, error: &PolicyFetchError) -> Decision {
        let decision = Decision::deny(
            Outcome::PolicyUnavailable,
            format!("cannot list ClusterImagePolicy: {}", error),
            None,
        );
        self.record(request, &decision);
        decision
    }

    fn record(&self, request: &AdmissionRequest, decision: &Decision) {
        let policy = decision.matched_policy.as_deref().unwrap_or("-");
        if decision.allowed {
            info!(
                image = %request.image,
                namespace = %request.namespace,
                policy = %policy,
                outcome = %decision.outcome,
                reason = %decision.reason,
                "Image allowed"
            );
        } else {
            warn!(
                image = %request.image,
                namespace = %request.namespace,
                policy = %policy,
                outcome = %decision.outcome,
                reason = %decision.reason,
                "Image denied"
            );
        }

        if let Some(state) = &self.health_state {
            state.metrics.record_decision(decision.outcome);
        }
        self.notifications
            .send(Notification::Decision(decision.event(request)));
    }
}
