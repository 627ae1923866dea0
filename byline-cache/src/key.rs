//! Canonical cache keys derived from request identity.
//!
//! A key names a resource path plus the parameters that make the request
//! distinct. Construction canonicalizes parameter order and escapes the
//! characters used by the rendering, so two call sites describing the same
//! request always collide on the same entry and never by accident.

use std::fmt;

/// Separator between the resource and its parameters.
const PARAM_SEPARATOR: char = '?';

/// A request-cache key.
///
/// # Design
///
/// The rendered form is private; keys can only be built through the
/// constructors here, which sort parameters by name and escape values.
/// That makes key equality equivalent to request identity.
///
/// # Prefix matching
///
/// [`CacheKey::has_prefix`] is segment-aware: the prefix `posts` covers
/// `posts`, `posts?tag=react`, and `posts/some-slug`, but not
/// `postscript`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    rendered: String,
}

impl CacheKey {
    /// Key for a parameterless resource, e.g. `catalog/tags`.
    pub fn for_resource(resource: &str) -> Self {
        Self {
            rendered: resource.to_string(),
        }
    }

    /// Key for a resource plus query parameters. Pairs are sorted by
    /// parameter name, so insertion order does not affect identity.
    pub fn with_params<I>(resource: &str, params: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, String)>,
    {
        let mut pairs: Vec<(&'static str, String)> = params.into_iter().collect();
        if pairs.is_empty() {
            return Self::for_resource(resource);
        }
        pairs.sort_by(|a, b| a.0.cmp(b.0).then_with(|| a.1.cmp(&b.1)));

        let mut rendered = String::from(resource);
        for (i, (name, value)) in pairs.iter().enumerate() {
            rendered.push(if i == 0 { PARAM_SEPARATOR } else { '&' });
            rendered.push_str(name);
            rendered.push('=');
            rendered.push_str(&escape_value(value));
        }
        Self { rendered }
    }

    /// The canonical rendering, also used for log lines.
    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    /// Segment-aware prefix test used by prefix invalidation.
    pub fn has_prefix(&self, prefix: &str) -> bool {
        match self.rendered.strip_prefix(prefix) {
            Some(rest) => {
                rest.is_empty()
                    || rest.starts_with('/')
                    || rest.starts_with(PARAM_SEPARATOR)
            }
            None => false,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

/// Escape the characters the rendering itself uses, so parameter values
/// cannot forge other keys.
fn escape_value(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('&', "%26")
        .replace('=', "%3D")
        .replace('?', "%3F")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameterless_key_renders_resource() {
        let key = CacheKey::for_resource("catalog/tags");
        assert_eq!(key.as_str(), "catalog/tags");
    }

    #[test]
    fn test_params_are_sorted_by_name() {
        let a = CacheKey::with_params(
            "posts",
            vec![("tag", "react".to_string()), ("author", "mira".to_string())],
        );
        let b = CacheKey::with_params(
            "posts",
            vec![("author", "mira".to_string()), ("tag", "react".to_string())],
        );
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "posts?author=mira&tag=react");
    }

    #[test]
    fn test_empty_params_equal_plain_resource() {
        let with = CacheKey::with_params("posts", Vec::new());
        assert_eq!(with, CacheKey::for_resource("posts"));
    }

    #[test]
    fn test_prefix_matches_segments_only() {
        let list = CacheKey::with_params("posts", vec![("tag", "react".to_string())]);
        let detail = CacheKey::for_resource("posts/some-slug");
        let other = CacheKey::for_resource("postscript");

        assert!(list.has_prefix("posts"));
        assert!(detail.has_prefix("posts"));
        assert!(detail.has_prefix("posts/some-slug"));
        assert!(!other.has_prefix("posts"));
        assert!(!list.has_prefix("post"));
    }

    #[test]
    fn test_separator_in_value_is_escaped() {
        let forged = CacheKey::with_params("posts", vec![("search", "x&tag=react".to_string())]);
        let honest = CacheKey::with_params(
            "posts",
            vec![("search", "x".to_string()), ("tag", "react".to_string())],
        );
        assert_ne!(forged, honest);
        assert_eq!(forged.as_str(), "posts?search=x%26tag%3Dreact");
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_value() -> impl Strategy<Value = String> {
        // Includes the rendering's own separator characters on purpose.
        "[a-z&=?%]{0,12}"
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Parameter order never affects key identity.
        #[test]
        fn prop_param_order_is_canonical(
            v1 in arb_value(),
            v2 in arb_value(),
        ) {
            let forward = CacheKey::with_params(
                "posts",
                vec![("author", v1.clone()), ("tag", v2.clone())],
            );
            let backward = CacheKey::with_params(
                "posts",
                vec![("tag", v2), ("author", v1)],
            );
            prop_assert_eq!(forward, backward);
        }

        /// Different parameter values never collide on one key.
        #[test]
        fn prop_distinct_values_distinct_keys(
            v1 in arb_value(),
            v2 in arb_value(),
        ) {
            let k1 = CacheKey::with_params("posts", vec![("search", v1.clone())]);
            let k2 = CacheKey::with_params("posts", vec![("search", v2.clone())]);
            if v1 == v2 {
                prop_assert_eq!(k1, k2);
            } else {
                prop_assert_ne!(k1, k2);
            }
        }

        /// Every key built on a resource matches that resource as prefix.
        #[test]
        fn prop_resource_is_always_a_prefix(v in arb_value()) {
            let key = CacheKey::with_params("posts", vec![("search", v)]);
            prop_assert!(key.has_prefix("posts"));
        }
    }
}
