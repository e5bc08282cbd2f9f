//! Custom Resource Definitions (CRDs) for image-policy-webhook.
//!
//! - `ClusterImagePolicy`: cluster-scoped image admission rules

mod cluster_image_policy;

pub use cluster_image_policy::*;
