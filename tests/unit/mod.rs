// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Unit tests for image-policy-webhook.
//!
//! These tests run without a Kubernetes cluster and test individual
//! components in isolation through the public API.

#[path = "../common/mod.rs"]
mod common;

mod image_tests {
    use image_policy_webhook::image::{ImageReference, ReferenceError, normalize, repo_only};

    #[test]
    fn test_normalize_short_name() {
        let image = normalize("nginx");
        assert_eq!(image.full, "docker.io/library/nginx:latest");
        assert_eq!(image.repo_only, "docker.io/library/nginx");
    }

    #[test]
    fn test_normalize_keeps_explicit_registry() {
        let image = normalize("myregistry.io/app:v2");
        assert_eq!(image.full, "myregistry.io/app:v2");
        assert_eq!(image.repo_only, "myregistry.io/app");
    }

    #[test]
    fn test_normalize_registry_port_without_tag() {
        let image = normalize("registry.local:5000/team/app");
        assert_eq!(image.full, "registry.local:5000/team/app:latest");
        assert_eq!(image.repo_only, "registry.local:5000/team/app");
    }

    #[test]
    fn test_repo_only_strips_digest() {
        assert_eq!(
            repo_only("ghcr.io/org/app@sha256:0123456789abcdef0123456789abcdef"),
            "ghcr.io/org/app"
        );
    }

    #[test]
    fn test_display_is_full_form() {
        assert_eq!(normalize("redis:7").to_string(), "docker.io/library/redis:7");
    }

    #[test]
    fn test_parse_accepts_normalized_forms() {
        for raw in ["nginx", "nginx:1.25", "ghcr.io/org/app:v1", "localhost:5000/app"] {
            let normalized = normalize(raw);
            assert!(
                ImageReference::parse(&normalized.full).is_ok(),
                "{} should parse",
                normalized
            );
        }
    }

    #[test]
    fn test_parse_rejects_uppercase_repository() {
        assert!(matches!(
            ImageReference::parse("docker.io/library/NGINX:latest"),
            Err(ReferenceError::InvalidRepository(_))
        ));
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!(ImageReference::parse("  "), Err(ReferenceError::Empty));
    }
}

mod policy_tests {
    use crate::common::fixtures::ImagePolicyBuilder;
    use image_policy_webhook::image::normalize;
    use image_policy_webhook::policy::{
        ImagePolicy, ImageRule, PolicyAction, PolicyError, applies, first_matching_rule,
        match_rule,
    };

    #[test]
    fn test_applies_exact_namespace() {
        let policy = ImagePolicyBuilder::new("p")
            .namespace("prod")
            .namespace("staging")
            .image("a/b")
            .build();
        assert!(applies(&policy, "prod"));
        assert!(applies(&policy, "staging"));
        assert!(!applies(&policy, "pro"));
        assert!(!applies(&policy, "prod-eu"));
    }

    #[test]
    fn test_wildcard_glob() {
        let rule = ImageRule::new("docker.io/library/*");
        assert!(match_rule(&rule, &normalize("nginx")));
        assert!(match_rule(&rule, &normalize("redis:7")));
        assert!(!match_rule(&rule, &normalize("ghcr.io/library/nginx")));
    }

    #[test]
    fn test_exact_glob_is_not_prefix() {
        let rule = ImageRule::new("docker.io/library/nginx");
        assert!(match_rule(&rule, &normalize("nginx:1.25")));
        assert!(!match_rule(&rule, &normalize("nginx2")));
    }

    #[test]
    fn test_glob_written_with_tag_matches_repository() {
        let rule = ImageRule::new("nginx:1.25");
        assert!(match_rule(&rule, &normalize("nginx:1.24")));
    }

    #[test]
    fn test_first_matching_rule_order() {
        let policy = ImagePolicyBuilder::new("p")
            .namespace("prod")
            .image("ghcr.io/*/*")
            .image("docker.io/library/*")
            .image("docker.io/library/nginx")
            .build();
        let rule = first_matching_rule(&policy, &normalize("nginx")).unwrap();
        assert_eq!(rule.glob, "docker.io/library/*");
    }

    #[test]
    fn test_policy_from_json_spec() {
        let policy = ImagePolicy::from_json_spec(
            "audit-all",
            serde_json::json!({
                "namespaces": ["dev"],
                "images": [{"glob": "ghcr.io/org/*"}],
                "action": "Audit"
            }),
        )
        .unwrap();
        assert_eq!(policy.action, PolicyAction::Audit);
        assert_eq!(policy.images[0].glob, "ghcr.io/org/*");
    }

    #[test]
    fn test_policy_from_json_spec_rejects_bad_glob() {
        let result = ImagePolicy::from_json_spec(
            "broken",
            serde_json::json!({
                "namespaces": ["dev"],
                "images": [{"glob": "ghcr.io/[org"}],
                "action": "Enforce"
            }),
        );
        assert!(matches!(result, Err(PolicyError::InvalidGlob { .. })));
    }
}

mod crd_tests {
    use image_policy_webhook::crd::{ClusterImagePolicy, ClusterImagePolicySpec};
    use image_policy_webhook::policy::{ImagePolicy, ImageRule, PolicyAction};
    use kube::CustomResourceExt;

    #[test]
    fn test_crd_metadata() {
        let crd = ClusterImagePolicy::crd();
        assert_eq!(crd.spec.group, "security.shieldx-bot.io");
        assert_eq!(crd.spec.names.kind, "ClusterImagePolicy");
        assert_eq!(crd.spec.names.plural, "clusterimagepolicies");
        assert_eq!(crd.spec.scope, "Cluster");
        assert_eq!(crd.spec.versions[0].name, "v1");
    }

    #[test]
    fn test_policy_from_resource() {
        let resource = ClusterImagePolicy::new(
            "signed-nginx",
            ClusterImagePolicySpec {
                namespaces: vec!["prod".to_string()],
                images: vec![ImageRule::new("docker.io/library/nginx")],
                action: PolicyAction::Enforce,
            },
        );
        let policy = ImagePolicy::from_resource(&resource).unwrap();
        assert_eq!(policy.name, "signed-nginx");
        assert_eq!(policy.namespaces, vec!["prod"]);
    }
}

mod config_tests {
    use image_policy_webhook::config::Config;
    use image_policy_webhook::engine::{AuditMode, NoMatchAction};

    #[test]
    fn test_config_defaults_fail_closed() {
        let config = Config::from_lookup(|_| None).unwrap();
        assert_eq!(config.engine.no_match, NoMatchAction::Deny);
        assert_eq!(config.engine.audit, AuditMode::AllowUnverified);
        assert!(!config.verifier.ignore_tlog);
        assert!(config.telegram.is_none());
    }

    #[test]
    fn test_config_rejects_invalid_bool() {
        let result = Config::from_lookup(|name| {
            (name == "COSIGN_IGNORE_TLOG").then(|| "sometimes".to_string())
        });
        assert!(result.is_err());
    }
}

mod outcome_tests {
    use image_policy_webhook::engine::{Decision, Outcome};

    #[test]
    fn test_outcome_labels() {
        assert_eq!(Outcome::Verified.as_str(), "verified");
        assert_eq!(Outcome::PolicyUnavailable.to_string(), "policy_unavailable");
    }

    #[test]
    fn test_decision_constructors() {
        let allowed = Decision::allow(Outcome::Audited, "ok", Some("p".to_string()));
        assert!(allowed.allowed);
        let denied = Decision::deny(Outcome::Rejected, "bad", None);
        assert!(!denied.allowed);
        assert!(denied.matched_policy.is_none());
    }
}
