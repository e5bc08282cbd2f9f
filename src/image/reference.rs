//! Image reference grammar validation.
//!
//! Follows the distribution reference grammar closely enough to reject
//! strings that a registry client would refuse, before any network round
//! trip is attempted.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Maximum length of the `registry/repository` part of a reference.
pub const MAX_NAME_LENGTH: usize = 255;

/// Errors produced when an image string is not a valid reference.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("image reference is empty")]
    Empty,

    #[error("invalid registry host '{0}'")]
    InvalidRegistry(String),

    #[error("invalid repository path component '{0}'")]
    InvalidRepository(String),

    #[error("invalid tag '{0}'")]
    InvalidTag(String),

    #[error("invalid digest '{0}'")]
    InvalidDigest(String),

    #[error(
        "repository name is {0} characters, exceeding the {max} character limit",
        max = MAX_NAME_LENGTH
    )]
    NameTooLong(usize),
}

/// A parsed and validated image reference.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: Option<String>,
    pub repository: String,
    pub tag: Option<String>,
    pub digest: Option<String>,
}

static REGISTRY_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"^(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?)(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?)*(?::[0-9]+)?$",
    )
    .ok()
});

static PATH_COMPONENT_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:(?:[._]|__|-+)[a-z0-9]+)*$").ok());

// ASCII only: `\w` in `regex` is Unicode-aware.
static TAG_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.-]{0,127}$").ok());

static DIGEST_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:[.+_-][a-z0-9]+)*:[a-f0-9]{32,}$").ok());

fn full_match(re: &LazyLock<Option<Regex>>, value: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(value))
}

/// A leading component is a registry host when it looks like one
/// (contains `.` or `:`, or is `localhost`).
fn is_registry_component(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

impl ImageReference {
    /// Parse and validate an image reference.
    pub fn parse(reference: &str) -> Result<Self, ReferenceError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ReferenceError::Empty);
        }

        let (name_and_tag, digest) = match reference.split_once('@') {
            Some((name, digest)) => {
                if !full_match(&DIGEST_RE, digest) {
                    return Err(ReferenceError::InvalidDigest(digest.to_string()));
                }
                (name, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        let last_component_start = name_and_tag.rfind('/').map_or(0, |slash| slash + 1);
        let tag_start = name_and_tag
            .get(last_component_start..)
            .and_then(|component| component.find(':'))
            .map(|colon| last_component_start + colon);

        let (name, tag) = match tag_start {
            Some(idx) => {
                let name = name_and_tag.get(..idx).unwrap_or_default();
                let tag = name_and_tag.get(idx + 1..).unwrap_or_default();
                if !full_match(&TAG_RE, tag) {
                    return Err(ReferenceError::InvalidTag(tag.to_string()));
                }
                (name, Some(tag.to_string()))
            }
            None => (name_and_tag, None),
        };

        if name.len() > MAX_NAME_LENGTH {
            return Err(ReferenceError::NameTooLong(name.len()));
        }

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest)) if is_registry_component(first) => {
                if !full_match(&REGISTRY_RE, first) {
                    return Err(ReferenceError::InvalidRegistry(first.to_string()));
                }
                (Some(first.to_string()), rest)
            }
            _ => (None, name),
        };

        for component in repository.split('/') {
            if !full_match(&PATH_COMPONENT_RE, component) {
                return Err(ReferenceError::InvalidRepository(component.to_string()));
            }
        }

        Ok(Self {
            registry,
            repository: repository.to_string(),
            tag,
            digest,
        })
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(registry) = &self.registry {
            write!(f, "{}/", registry)?;
        }
        f.write_str(&self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}
