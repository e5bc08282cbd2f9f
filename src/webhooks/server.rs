//! Admission webhook server.
//!
//! Serves the Pod validating webhook over HTTPS.
//!
//! To enable the webhook:
//! 1. Deploy cert-manager for TLS certificates
//! 2. Create a ValidatingWebhookConfiguration pointing at `/validate--v1-pod`
//! 3. Mount the TLS certificate secret to the webhook pod at /etc/webhook/certs/

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::post};
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use k8s_openapi::api::core::v1::Pod;
use kube::Resource;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::pod::review_pod;
use crate::engine::DecisionEngine;
use crate::health::HealthState;

/// Path of the Pod validating webhook
pub const VALIDATE_POD_PATH: &str = "/validate--v1-pod";
/// Default webhook server port
pub const WEBHOOK_PORT: u16 = 9443;

/// Namespace assumed when the request carries none.
const DEFAULT_NAMESPACE: &str = "default";

/// Shared state for webhook handlers
pub struct WebhookState {
    pub engine: Arc<DecisionEngine>,
    pub health_state: Option<Arc<HealthState>>,
}

impl WebhookState {
    pub fn new(engine: Arc<DecisionEngine>, health_state: Option<Arc<HealthState>>) -> Self {
        Self {
            engine,
            health_state,
        }
    }
}

/// Create a denial response with reason embedded in message.
/// kube-rs deny() only sets status.message, so we format as "[reason] message"
fn deny_with_reason<T: Resource<DynamicType = ()>>(
    request: &AdmissionRequest<T>,
    message: &str,
    reason: &str,
) -> AdmissionReview<kube::core::DynamicObject> {
    let full_message = format!("[{}] {}", reason, message);
    AdmissionResponse::from(request)
        .deny(full_message)
        .into_review()
}

/// Create the webhook router
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(VALIDATE_POD_PATH, post(validate_pod))
        .with_state(state)
}

/// Pod admission webhook handler
async fn validate_pod(
    State(state): State<Arc<WebhookState>>,
    Json(review): Json<AdmissionReview<Pod>>,
) -> impl IntoResponse {
    let request: AdmissionRequest<Pod> = match review.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to extract admission request");
            return (
                StatusCode::BAD_REQUEST,
                Json(
                    AdmissionResponse::invalid(format!("Invalid AdmissionReview: {}", e))
                        .into_review(),
                ),
            );
        }
    };

    (StatusCode::OK, Json(admit_pod(&state, &request).await))
}

/// Decide an admission request for a Pod.
pub async fn admit_pod(
    state: &WebhookState,
    request: &AdmissionRequest<Pod>,
) -> AdmissionReview<kube::core::DynamicObject> {
    let uid = &request.uid;
    debug!(
        uid = %uid,
        operation = ?request.operation,
        namespace = ?request.namespace,
        name = ?request.name,
        "Processing admission request"
    );

    // Only CREATE and UPDATE carry images to check
    if matches!(request.operation, Operation::Delete | Operation::Connect) {
        info!(uid = %uid, operation = ?request.operation, "Admission request allowed");
        return AdmissionResponse::from(request).into_review();
    }

    let Some(pod) = &request.object else {
        error!(uid = %uid, "Missing object in request");
        return deny_with_reason(request, "Missing object in request", "InvalidRequest");
    };

    let namespace = request
        .namespace
        .as_deref()
        .or(pod.metadata.namespace.as_deref())
        .unwrap_or(DEFAULT_NAMESPACE);

    let started = Instant::now();
    let review = review_pod(&state.engine, pod, namespace).await;
    if let Some(health) = &state.health_state {
        health
            .metrics
            .record_review(review.allowed, started.elapsed().as_secs_f64());
    }

    match review.reason {
        Some(reason) => {
            warn!(uid = %uid, namespace = %namespace, reason = %reason, message = %review.message, "Admission request denied");
            deny_with_reason(request, &review.message, reason)
        }
        None => {
            info!(uid = %uid, namespace = %namespace, "Admission request allowed");
            AdmissionResponse::from(request).into_review()
        }
    }
}

/// Errors that can occur when running the webhook server
#[derive(Error, Debug)]
pub enum WebhookError {
    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),
    /// Server error
    #[error("Webhook server error: {0}")]
    Server(String),
}

/// Mark `health` ready once the server behind `handle` is bound.
///
/// Returns the bound address, or `None` if the server never started
/// listening, in which case readiness is left untouched.
pub async fn mark_ready_when_listening(
    handle: Handle,
    health: Arc<HealthState>,
) -> Option<SocketAddr> {
    let addr = handle.listening().await?;
    health.set_ready(true).await;
    info!(addr = %addr, "Webhook server ready");
    Some(addr)
}

/// Run the webhook server with TLS
///
/// Binds to 0.0.0.0:9443 and serves the /validate--v1-pod endpoint.
/// Marks the health state ready once the listener is bound.
///
/// # Arguments
/// * `state` - Shared handler state
/// * `cert_path` - Path to TLS certificate file (PEM format)
/// * `key_path` - Path to TLS private key file (PEM format)
pub async fn run_webhook_server(
    state: Arc<WebhookState>,
    cert_path: &Path,
    key_path: &Path,
) -> Result<(), WebhookError> {
    let health_state = state.health_state.clone();
    let app = create_webhook_router(state);

    let config = RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], WEBHOOK_PORT));
    info!(port = WEBHOOK_PORT, path = VALIDATE_POD_PATH, "Starting webhook server with TLS");

    let handle = Handle::new();
    if let Some(health) = health_state {
        tokio::spawn(mark_ready_when_listening(handle.clone(), health));
    }

    axum_server::bind_rustls(addr, config)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    Ok(())
}
