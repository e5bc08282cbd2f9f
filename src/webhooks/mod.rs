//! Webhook module for validating Pod admission requests.
//!
//! Every image in a created or updated Pod is checked against the
//! `ClusterImagePolicy` objects in the cluster. DELETE and CONNECT
//! operations are always allowed.

mod pod;
mod server;

pub use pod::{
    ContainerImage, ContainerKind, PodReview, REASON_UNAVAILABLE, REASON_VIOLATION,
    container_images, review_pod,
};
pub use server::{
    VALIDATE_POD_PATH, WEBHOOK_PORT, WebhookError, WebhookState, admit_pod, create_webhook_router,
    mark_ready_when_listening, run_webhook_server,
};

// Re-export kube-rs admission types for contract testing
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
