//! Image reference handling.
//!
//! Container specs carry image strings in many shapes (`nginx`,
//! `nginx:1.25`, `host:5000/team/app@sha256:...`). Policy globs are written
//! against a canonical `registry/repository` form, so both sides are
//! normalized before comparison:
//!
//! - [`normalize`] produces the canonical `registry/repo[:tag|@digest]` form
//! - [`repo_only`] strips the tag or digest for glob comparison
//! - [`ImageReference::parse`] validates the grammar before a signature check

mod reference;

pub use reference::{ImageReference, ReferenceError};

/// Registry and namespace assumed for single-component image names.
pub const DEFAULT_REGISTRY_PREFIX: &str = "docker.io/library/";

/// Tag assumed when a reference has neither tag nor digest.
pub const DEFAULT_TAG: &str = "latest";

/// Canonical form of an image reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct NormalizedImage {
    /// `registry/repo[:tag|@digest]`
    pub full: String,
    /// `registry/repo`
    pub repo_only: String,
}

impl std::fmt::Display for NormalizedImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full)
    }
}

/// Normalize a raw image string.
///
/// Never fails: malformed input is normalized on a best-effort basis and
/// left for [`ImageReference::parse`] to reject.
pub fn normalize(raw: &str) -> NormalizedImage {
    let mut full = raw.trim().to_string();

    if !full.contains('/') {
        full.insert_str(0, DEFAULT_REGISTRY_PREFIX);
    }

    if tag_or_digest_start(&full).is_none() {
        full.push(':');
        full.push_str(DEFAULT_TAG);
    }

    let repo_only = repo_only(&full).to_string();
    NormalizedImage { full, repo_only }
}

/// Strip the tag or digest from an image reference.
///
/// ```text
/// docker.io/a/b:c          -> docker.io/a/b
/// docker.io/a/b@sha256:..  -> docker.io/a/b
/// host:5000/a/b:c          -> host:5000/a/b
/// host:5000/a/b            -> host:5000/a/b
/// docker.io/a/b:c@sha256:.. -> docker.io/a/b
/// ```
pub fn repo_only(image: &str) -> &str {
    match tag_or_digest_start(image) {
        Some(idx) => image.get(..idx).unwrap_or(image),
        None => image,
    }
}

/// Byte offset of the `:` or `@` that starts the tag/digest suffix.
///
/// The digest starts at the first `@`. A tag starts at the first `:` of the
/// last path component; colons in earlier components belong to a registry
/// port.
fn tag_or_digest_start(image: &str) -> Option<usize> {
    let digest = image.find('@');
    let name = image.get(..digest.unwrap_or(image.len())).unwrap_or(image);
    let last_component = name.rfind('/').map_or(0, |slash| slash + 1);
    name.get(last_component..)
        .and_then(|component| component.find(':'))
        .map(|colon| last_component + colon)
        .or(digest)
}
