//! image-policy-webhook - Admits pods based on ClusterImagePolicy rules.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Loads configuration from the environment
//! - Creates the Kubernetes client and the decision engine
//! - Starts the notification dispatcher, health server, and webhook server

use std::sync::Arc;
use std::time::Duration;

use kube::Client;
use tokio::signal;
use tracing::{error, info, warn};

use image_policy_webhook::config::Config;
use image_policy_webhook::engine::DecisionEngine;
use image_policy_webhook::health::{HealthState, run_health_server};
use image_policy_webhook::notify::{
    NOTIFICATION_QUEUE_CAPACITY, NotificationSender, notifier_from_config, run_dispatcher,
};
use image_policy_webhook::policy::KubePolicySource;
use image_policy_webhook::verify::{SignatureVerifier, SigstoreBackend};
use image_policy_webhook::{WebhookState, run_webhook_server};

/// Grace period for in-flight admission reviews to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("image_policy_webhook=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .json()
        .init();

    info!("Starting image-policy-webhook");

    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        warn!("A rustls crypto provider was already installed");
    }

    let config = Config::from_env()?;
    info!(
        ignore_tlog = config.verifier.ignore_tlog,
        verify_timeout = ?config.engine.verification_timeout,
        no_match = ?config.engine.no_match,
        audit = ?config.engine.audit,
        telegram = config.telegram.is_some(),
        "Loaded configuration"
    );
    if config.verifier.ignore_tlog {
        warn!("COSIGN_IGNORE_TLOG is enabled; signatures may be accepted without transparency log corroboration");
    }

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    // Create shared health state
    let health_state = Arc::new(HealthState::new());

    // Start health server immediately (liveness must work before TLS is ready)
    let health_handle = {
        let health_state = health_state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state).await {
                error!("Health server error: {}", e);
            }
        })
    };

    // Notifications are delivered off the admission path
    let (notifications, notification_rx) = NotificationSender::channel(NOTIFICATION_QUEUE_CAPACITY);
    let notifier = notifier_from_config(config.telegram.as_ref())?;
    let dispatcher_handle = tokio::spawn(run_dispatcher(notification_rx, notifier));

    let verifier = SignatureVerifier::from_config(&config.verifier, SigstoreBackend::new());
    let engine = DecisionEngine::new(
        Arc::new(KubePolicySource::new(client)),
        Arc::new(verifier),
        notifications,
        config.engine.clone(),
    )
    .with_health_state(health_state.clone());

    if !config.webhook_cert_path.exists() || !config.webhook_key_path.exists() {
        error!(
            cert = %config.webhook_cert_path.display(),
            key = %config.webhook_key_path.display(),
            "Webhook certificates not found"
        );
        return Err("webhook TLS certificates not found".into());
    }

    let webhook_handle = {
        let state = Arc::new(WebhookState::new(Arc::new(engine), Some(health_state.clone())));
        let cert_path = config.webhook_cert_path.clone();
        let key_path = config.webhook_key_path.clone();
        tokio::spawn(async move {
            if let Err(e) = run_webhook_server(state, &cert_path, &key_path).await {
                error!("Webhook server error: {}", e);
            }
        })
    };

    // Wait for any task to complete (or fail), or shutdown signal
    tokio::select! {
        result = webhook_handle => {
            if let Err(e) = result {
                error!("Webhook server task panicked: {}", e);
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        result = dispatcher_handle => {
            if let Err(e) = result {
                error!("Notification dispatcher task panicked: {}", e);
            }
        }
        // Handle graceful shutdown on SIGTERM or SIGINT
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            // Mark as not ready to stop receiving new reviews
            health_state.set_ready(false).await;
            info!("Marked webhook as not ready");

            info!(
                "Waiting {}s for in-flight admission reviews to complete...",
                SHUTDOWN_GRACE_PERIOD_SECS
            );
            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;

            info!("Grace period complete, shutting down");
        }
    }

    info!("Webhook stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the webhook cannot shut down
/// gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
