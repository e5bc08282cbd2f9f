//! image-policy-webhook library crate
//!
//! Admission-time image policy engine: image reference normalization,
//! `ClusterImagePolicy` matching, cosign signature verification and the
//! Pod validating webhook that ties them together.

pub mod config;
pub mod crd;
pub mod engine;
pub mod health;
pub mod image;
pub mod notify;
pub mod policy;
pub mod verify;
pub mod webhooks;

pub use config::{Config, ConfigError};
pub use engine::{AdmissionRequest, Decision, DecisionEngine, Outcome};
pub use health::HealthState;
pub use webhooks::{WEBHOOK_PORT, WebhookError, WebhookState, run_webhook_server};
