//! Decision engine scenarios.
//!
//! Each test builds an engine over a fixed policy list and a scripted
//! verifier, then checks the decision, the verifier calls and the
//! notifications that were queued.

use std::time::Duration;

use crate::common::fixtures::{
    CountingPolicySource, FakeVerifier, ImagePolicyBuilder, TestEngine, VerifierBehavior,
    audit_policy, enforce_policy,
};
use image_policy_webhook::engine::{
    AdmissionRequest, AuditMode, EngineConfig, NO_MATCHING_POLICY, NoMatchAction, Outcome,
};
use image_policy_webhook::notify::Notification;
use image_policy_webhook::policy::PolicySource;

fn request(image: &str, namespace: &str) -> AdmissionRequest {
    AdmissionRequest::new(image, namespace)
}

// ============================================================================
// Enforce
// ============================================================================

#[tokio::test]
async fn test_enforce_policy_with_valid_signature() {
    let mut t = TestEngine::new(
        vec![enforce_policy("signed-nginx", "prod", "docker.io/library/nginx")],
        FakeVerifier::accepting(),
    );

    let decision = t.engine.evaluate(&request("nginx:1.25", "prod")).await;

    assert!(decision.allowed);
    assert_eq!(decision.outcome, Outcome::Verified);
    assert_eq!(decision.matched_policy.as_deref(), Some("signed-nginx"));
    assert_eq!(t.verifier.images(), vec!["docker.io/library/nginx:1.25"]);

    let notifications = t.drain_notifications();
    assert_eq!(notifications.len(), 1);
    match &notifications[0] {
        Notification::Decision(event) => {
            assert!(event.allowed);
            assert_eq!(event.outcome, Outcome::Verified);
            assert_eq!(event.image, "nginx:1.25");
        }
        other => panic!("unexpected notification: {other:?}"),
    }
}

#[tokio::test]
async fn test_enforce_policy_with_invalid_signature() {
    let t = TestEngine::new(
        vec![enforce_policy("signed-nginx", "prod", "docker.io/library/nginx")],
        FakeVerifier::rejecting(),
    );

    let decision = t.engine.evaluate(&request("nginx:1.25", "prod")).await;

    assert!(!decision.allowed);
    assert_eq!(decision.outcome, Outcome::Rejected);
    assert!(decision.reason.contains("signed-nginx"));
    assert!(decision.reason.contains("no matching signatures"));
    assert!(!decision.outcome.is_system_error());
}

#[tokio::test]
async fn test_digest_reference_verified_as_is() {
    let digest = "sha256:0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";
    let t = TestEngine::new(
        vec![enforce_policy("org", "prod", "ghcr.io/org/*")],
        FakeVerifier::accepting(),
    );

    let image = format!("ghcr.io/org/app@{}", digest);
    let decision = t.engine.evaluate(&request(&image, "prod")).await;

    assert!(decision.allowed);
    assert_eq!(t.verifier.images(), vec![image]);
}

#[tokio::test]
async fn test_misconfiguration_is_distinguished_from_unsigned() {
    for behavior in [VerifierBehavior::MissingKey, VerifierBehavior::TransparencyLogDown] {
        let t = TestEngine::new(
            vec![enforce_policy("signed", "prod", "docker.io/library/*")],
            FakeVerifier::new(behavior),
        );

        let decision = t.engine.evaluate(&request("nginx", "prod")).await;
        assert!(!decision.allowed);
        assert_eq!(decision.outcome, Outcome::Misconfigured);
        assert!(decision.outcome.is_system_error());
    }
}

#[tokio::test]
async fn test_signature_artifact_tag_is_not_special_cased_by_engine() {
    // The verifier rejects signature artifacts; the engine just passes it through.
    let t = TestEngine::new(
        vec![enforce_policy("org", "prod", "ghcr.io/org/app")],
        FakeVerifier::accepting(),
    );

    let decision = t
        .engine
        .evaluate(&request("ghcr.io/org/app:sha256-0123abcd.sig", "prod"))
        .await;
    assert!(decision.allowed);
    assert_eq!(t.verifier.calls(), 1);
}

#[tokio::test]
async fn test_malformed_reference_never_reaches_verifier() {
    let t = TestEngine::new(
        vec![enforce_policy("any", "prod", "docker.io/library/*")],
        FakeVerifier::accepting(),
    );

    let decision = t.engine.evaluate(&request("nginx:bad tag", "prod")).await;

    assert!(!decision.allowed);
    assert_eq!(decision.outcome, Outcome::InvalidReference);
    assert!(decision.reason.contains("invalid image reference"));
    assert_eq!(t.verifier.calls(), 0);
}

#[tokio::test]
async fn test_non_ascii_tag_is_invalid_reference() {
    let t = TestEngine::new(
        vec![enforce_policy("signed", "prod", "docker.io/library/nginx")],
        FakeVerifier::rejecting(),
    );

    let decision = t.engine.evaluate(&request("nginx:tåg", "prod")).await;

    assert!(!decision.allowed);
    assert_eq!(decision.outcome, Outcome::InvalidReference);
    assert_eq!(decision.matched_policy.as_deref(), Some("signed"));
    assert_eq!(t.verifier.calls(), 0);
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn test_policies_evaluated_in_source_order() {
    let t = TestEngine::new(
        vec![
            audit_policy("first-audit", "prod", "docker.io/library/*"),
            enforce_policy("second-enforce", "prod", "docker.io/library/nginx"),
        ],
        FakeVerifier::rejecting(),
    );

    let decision = t.engine.evaluate(&request("nginx", "prod")).await;

    assert!(decision.allowed);
    assert_eq!(decision.outcome, Outcome::Audited);
    assert_eq!(decision.matched_policy.as_deref(), Some("first-audit"));
    assert_eq!(t.verifier.calls(), 0);
}

#[tokio::test]
async fn test_first_matching_rule_within_policy() {
    let policy = ImagePolicyBuilder::new("multi")
        .namespace("prod")
        .image("ghcr.io/org/*")
        .image("docker.io/library/nginx")
        .image("docker.io/library/*")
        .build();
    let t = TestEngine::new(vec![policy], FakeVerifier::accepting());

    let decision = t.engine.evaluate(&request("nginx:1.25", "prod")).await;

    assert!(decision.allowed);
    assert_eq!(t.verifier.calls(), 1);
}

#[tokio::test]
async fn test_policy_in_other_namespace_is_ignored() {
    let t = TestEngine::new(
        vec![enforce_policy("signed-nginx", "prod", "docker.io/library/nginx")],
        FakeVerifier::accepting(),
    );

    let decision = t.engine.evaluate(&request("nginx:1.25", "dev")).await;

    assert!(!decision.allowed);
    assert_eq!(decision.reason, NO_MATCHING_POLICY);
    assert_eq!(t.verifier.calls(), 0);
}

#[tokio::test]
async fn test_namespace_match_is_exact() {
    let t = TestEngine::new(
        vec![enforce_policy("signed", "production", "docker.io/library/*")],
        FakeVerifier::accepting(),
    );

    let decision = t.engine.evaluate(&request("nginx", "prod")).await;
    assert_eq!(decision.outcome, Outcome::NoMatchingPolicy);
}

#[tokio::test]
async fn test_glob_does_not_match_longer_repository() {
    let t = TestEngine::new(
        vec![enforce_policy("signed-nginx", "prod", "docker.io/library/nginx")],
        FakeVerifier::accepting(),
    );

    let decision = t.engine.evaluate(&request("nginx2", "prod")).await;
    assert_eq!(decision.outcome, Outcome::NoMatchingPolicy);
    assert_eq!(t.verifier.calls(), 0);
}

// ============================================================================
// Audit and no-match posture
// ============================================================================

#[tokio::test]
async fn test_audit_policy_allows_without_verification() {
    let t = TestEngine::new(
        vec![audit_policy("observe", "prod", "docker.io/library/nginx")],
        FakeVerifier::rejecting(),
    );

    let decision = t.engine.evaluate(&request("nginx:1.25", "prod")).await;

    assert!(decision.allowed);
    assert_eq!(decision.outcome, Outcome::Audited);
    assert_eq!(t.verifier.calls(), 0);
}

#[tokio::test]
async fn test_audit_policy_verify_non_blocking() {
    let config = EngineConfig {
        audit: AuditMode::VerifyNonBlocking,
        ..Default::default()
    };
    let t = TestEngine::with_config(
        vec![audit_policy("observe", "prod", "docker.io/library/nginx")],
        FakeVerifier::accepting(),
        config,
    );

    let decision = t.engine.evaluate(&request("nginx:1.25", "prod")).await;

    assert!(decision.allowed);
    assert!(decision.reason.contains("signature verified"));
    assert_eq!(t.verifier.calls(), 1);
}

#[tokio::test]
async fn test_zero_policies_denied_by_default() {
    let t = TestEngine::new(Vec::new(), FakeVerifier::accepting());

    let decision = t.engine.evaluate(&request("nginx", "prod")).await;

    assert!(!decision.allowed);
    assert_eq!(decision.reason, "no matching policy");
    assert!(decision.matched_policy.is_none());
}

#[tokio::test]
async fn test_zero_policies_allowed_when_configured() {
    let config = EngineConfig {
        no_match: NoMatchAction::Allow,
        ..Default::default()
    };
    let t = TestEngine::with_config(Vec::new(), FakeVerifier::accepting(), config);

    let decision = t.engine.evaluate(&request("nginx", "prod")).await;

    assert!(decision.allowed);
    assert_eq!(decision.outcome, Outcome::DefaultAllowed);
}

// ============================================================================
// Timeouts, cancellation and policy fetching
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_hanging_verifier_is_denied_with_timeout() {
    let t = TestEngine::new(
        vec![enforce_policy("signed", "prod", "docker.io/library/nginx")],
        FakeVerifier::new(VerifierBehavior::Hang),
    );

    let decision = t.engine.evaluate(&request("nginx", "prod")).await;

    assert!(!decision.allowed);
    assert!(decision.reason.contains("timed out after 10s"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_verifier_within_timeout_is_allowed() {
    let t = TestEngine::new(
        vec![enforce_policy("signed", "prod", "docker.io/library/nginx")],
        FakeVerifier::new(VerifierBehavior::Delay(Duration::from_secs(9))),
    );

    let decision = t.engine.evaluate(&request("nginx", "prod")).await;
    assert!(decision.allowed);
}

#[tokio::test(start_paused = true)]
async fn test_dropped_decision_emits_no_notification() {
    let mut t = TestEngine::new(
        vec![enforce_policy("signed", "prod", "docker.io/library/nginx")],
        FakeVerifier::new(VerifierBehavior::Hang),
    );

    let request = request("nginx", "prod");
    let evaluation = t.engine.evaluate(&request);
    let cancelled = tokio::time::timeout(Duration::from_secs(1), evaluation).await;

    assert!(cancelled.is_err());
    assert_eq!(t.verifier.calls(), 1);
    assert!(t.drain_notifications().is_empty());
}

#[tokio::test]
async fn test_policy_source_failure_denies_every_request() {
    let source = CountingPolicySource::failing();
    let mut t = TestEngine::with_source(source, FakeVerifier::accepting(), EngineConfig::default());

    let decisions = t
        .engine
        .evaluate_all(&[request("nginx", "prod"), request("redis", "prod")])
        .await;

    assert_eq!(decisions.len(), 2);
    for decision in &decisions {
        assert!(!decision.allowed);
        assert_eq!(decision.outcome, Outcome::PolicyUnavailable);
        assert!(decision.outcome.is_system_error());
    }
    assert_eq!(t.verifier.calls(), 0);
    assert_eq!(t.drain_notifications().len(), 2);
}

#[tokio::test]
async fn test_policies_fetched_once_per_batch() {
    let t = TestEngine::new(
        vec![audit_policy("observe", "prod", "docker.io/library/*")],
        FakeVerifier::accepting(),
    );

    let decisions = t
        .engine
        .evaluate_all(&[
            request("nginx", "prod"),
            request("redis", "prod"),
            request("busybox", "prod"),
        ])
        .await;

    assert_eq!(decisions.len(), 3);
    assert_eq!(t.source.calls(), 1);
}

#[tokio::test]
async fn test_empty_batch_does_not_fetch() {
    let t = TestEngine::new(Vec::new(), FakeVerifier::accepting());

    assert!(t.engine.evaluate_all(&[]).await.is_empty());
    assert_eq!(t.source.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_batch_verifications_run_concurrently() {
    let t = TestEngine::new(
        vec![enforce_policy("signed", "prod", "docker.io/library/*")],
        FakeVerifier::new(VerifierBehavior::Delay(Duration::from_secs(6))),
    );

    let started = tokio::time::Instant::now();
    let decisions = t
        .engine
        .evaluate_all(&[request("nginx", "prod"), request("redis", "prod")])
        .await;

    assert!(decisions.iter().all(|d| d.allowed));
    // Two sequential 6s verifications would take 12s.
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_counting_source_lists_static_policies() {
    let source = CountingPolicySource::new(vec![enforce_policy("p", "prod", "a/b")]);
    assert_eq!(source.list().await.unwrap().len(), 1);
    assert_eq!(source.calls(), 1);
}
