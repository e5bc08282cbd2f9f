//! Policy-to-request matching.
//!
//! Namespace scoping is exact set membership. Image rules are shell globs
//! compared against the repository part of both the rule and the image,
//! after normalization, so `nginx` in a policy matches `nginx:1.25` in a pod.

use globset::{GlobBuilder, GlobMatcher};
use tracing::warn;

use super::{ImagePolicy, ImageRule};
use crate::image::{NormalizedImage, normalize};

/// Compile a rule glob with shell semantics: `*` and `?` never cross `/`.
pub(crate) fn compile(glob: &str) -> Result<GlobMatcher, globset::Error> {
    let pattern = normalize(glob).repo_only;
    GlobBuilder::new(&pattern)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
        .map(|g| g.compile_matcher())
}

/// Whether `policy` is scoped to `namespace`.
pub fn applies(policy: &ImagePolicy, namespace: &str) -> bool {
    policy.namespaces.iter().any(|ns| ns == namespace)
}

/// Whether `rule` matches the repository of `image`.
///
/// An invalid glob never matches.
pub fn match_rule(rule: &ImageRule, image: &NormalizedImage) -> bool {
    match compile(&rule.glob) {
        Ok(matcher) => matcher.is_match(&image.repo_only),
        Err(e) => {
            warn!(glob = %rule.glob, error = %e, "Invalid image glob; treating as non-match");
            false
        }
    }
}

/// First rule of `policy` matching `image`, in listed order.
pub fn first_matching_rule<'a>(
    policy: &'a ImagePolicy,
    image: &NormalizedImage,
) -> Option<&'a ImageRule> {
    policy.images.iter().find(|rule| match_rule(rule, image))
}
