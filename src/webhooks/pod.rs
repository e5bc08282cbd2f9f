//! Pod admission review.
//!
//! Every image in the pod (containers, init containers and ephemeral
//! containers) is decided by the engine against a single policy snapshot.
//! The pod is admitted only if every image is.

use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, info, warn};

use crate::engine::{AdmissionRequest, Decision, DecisionEngine};
use crate::notify::{Notification, PodSummary};

/// Denial reason for images that violate a policy.
pub const REASON_VIOLATION: &str = "ImagePolicyViolation";
/// Denial reason when the webhook itself cannot decide.
pub const REASON_UNAVAILABLE: &str = "ImagePolicyUnavailable";

/// Where in the pod spec a container is declared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerKind {
    Container,
    InitContainer,
    EphemeralContainer,
}

impl std::fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContainerKind::Container => write!(f, "container"),
            ContainerKind::InitContainer => write!(f, "init container"),
            ContainerKind::EphemeralContainer => write!(f, "ephemeral container"),
        }
    }
}

/// An image referenced by the pod.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerImage {
    pub name: String,
    pub kind: ContainerKind,
    pub image: String,
}

/// Collect the images of a pod in spec order: init containers, containers,
/// then ephemeral containers. Containers without an image are skipped.
pub fn container_images(pod: &Pod) -> Vec<ContainerImage> {
    let Some(spec) = &pod.spec else {
        return Vec::new();
    };

    let init = spec
        .init_containers
        .iter()
        .flatten()
        .map(|c| (c.name.as_str(), c.image.as_deref(), ContainerKind::InitContainer));
    let regular = spec
        .containers
        .iter()
        .map(|c| (c.name.as_str(), c.image.as_deref(), ContainerKind::Container));
    let ephemeral = spec
        .ephemeral_containers
        .iter()
        .flatten()
        .map(|c| (c.name.as_str(), c.image.as_deref(), ContainerKind::EphemeralContainer));

    init.chain(regular)
        .chain(ephemeral)
        .filter_map(|(name, image, kind)| {
            let image = image.map(str::trim).filter(|i| !i.is_empty())?;
            Some(ContainerImage {
                name: name.to_string(),
                kind,
                image: image.to_string(),
            })
        })
        .collect()
}

/// The aggregated verdict for a pod.
#[derive(Clone, Debug)]
pub struct PodReview {
    pub allowed: bool,
    /// Denial reason tag, `None` when allowed.
    pub reason: Option<&'static str>,
    /// All denial causes joined, empty when allowed.
    pub message: String,
    pub decisions: Vec<(ContainerImage, Decision)>,
}

impl PodReview {
    pub fn denied(&self) -> impl Iterator<Item = &(ContainerImage, Decision)> {
        self.decisions.iter().filter(|(_, d)| !d.allowed)
    }
}

/// Decide every image of `pod` in `namespace` and send a pod summary.
pub async fn review_pod(engine: &DecisionEngine, pod: &Pod, namespace: &str) -> PodReview {
    let pod_name = pod
        .metadata
        .name
        .clone()
        .or_else(|| pod.metadata.generate_name.as_ref().map(|g| format!("{}*", g)))
        .unwrap_or_else(|| "<unnamed>".to_string());

    let images = container_images(pod);
    debug!(pod = %pod_name, namespace = %namespace, images = images.len(), "Reviewing pod images");

    let requests: Vec<AdmissionRequest> = images
        .iter()
        .map(|c| AdmissionRequest::new(c.image.clone(), namespace))
        .collect();
    let decisions = engine.evaluate_all(&requests).await;
    let decisions: Vec<(ContainerImage, Decision)> = images.into_iter().zip(decisions).collect();

    let review = aggregate(decisions);

    engine.notifications().send(Notification::Pod(PodSummary {
        pod: pod_name.clone(),
        namespace: namespace.to_string(),
        allowed: review.allowed,
        containers: review.decisions.len(),
        denied: review.denied().count(),
    }));

    if review.allowed {
        info!(pod = %pod_name, namespace = %namespace, "Pod images admitted");
    } else {
        warn!(pod = %pod_name, namespace = %namespace, message = %review.message, "Pod images rejected");
    }
    review
}

fn aggregate(decisions: Vec<(ContainerImage, Decision)>) -> PodReview {
    let denied: Vec<&(ContainerImage, Decision)> =
        decisions.iter().filter(|(_, d)| !d.allowed).collect();

    if denied.is_empty() {
        return PodReview {
            allowed: true,
            reason: None,
            message: String::new(),
            decisions,
        };
    }

    let reason = if denied.iter().any(|(_, d)| d.outcome.is_system_error()) {
        REASON_UNAVAILABLE
    } else {
        REASON_VIOLATION
    };
    let message = denied
        .iter()
        .map(|(c, d)| format!("{} {:?} image {}: {}", c.kind, c.name, c.image, d.reason))
        .collect::<Vec<_>>()
        .join("; ");

    PodReview {
        allowed: false,
        reason: Some(reason),
        message,
        decisions,
    }
}
