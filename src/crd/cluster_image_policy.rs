//! ClusterImagePolicy Custom Resource Definition.
//!
//! Cluster-scoped policy objects that scope a list of image globs to a set
//! of namespaces and declare whether matching images must carry a valid
//! signature.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::policy::{ImageRule, PolicyAction};

/// ClusterImagePolicy selects images by glob and decides how they are admitted.
///
/// Example:
/// ```yaml
/// apiVersion: security.shieldx-bot.io/v1
/// kind: ClusterImagePolicy
/// metadata:
///   name: signed-nginx
/// spec:
///   namespaces: ["prod", "staging"]
///   images:
///     - glob: "docker.io/library/nginx"
///     - glob: "ghcr.io/my-org/*"
///   action: Enforce
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "security.shieldx-bot.io",
    version = "v1",
    kind = "ClusterImagePolicy",
    plural = "clusterimagepolicies",
    shortname = "cip",
    printcolumn = r#"{"name":"Action", "type":"string", "jsonPath":".spec.action"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterImagePolicySpec {
    /// Namespaces the policy applies to (exact names).
    #[serde(default)]
    pub namespaces: Vec<String>,

    /// Image globs, tried in order. Matched against `registry/repository`
    /// with the tag or digest removed.
    #[serde(default)]
    pub images: Vec<ImageRule>,

    /// What to do with a matching image.
    pub action: PolicyAction,
}
