//! Fuzz test for cache key canonicalization
//!
//! This fuzz target builds cache keys from arbitrary byte sequences to find:
//! - Panics or crashes
//! - Parameter order leaking into key identity
//! - Escaping holes that let values forge extra parameters
//! - Prefix matches crossing segment boundaries
//!
//! Run with: cargo +nightly fuzz run cache_key_fuzz -- -max_total_time=60

#![no_main]

use byline_cache::CacheKey;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Split the raw bytes first so each half can be checked for UTF-8
    // independently of char boundaries.
    let (left, right) = data.split_at(data.len() / 2);
    let (Ok(left), Ok(right)) = (std::str::from_utf8(left), std::str::from_utf8(right)) else {
        return;
    };

    // A parameterless key renders as the resource itself and matches
    // its own prefix, whatever the resource contains.
    let plain = CacheKey::for_resource(left);
    assert_eq!(plain.as_str(), left);
    assert!(plain.has_prefix(left), "key must match its own resource");
    assert_eq!(plain.to_string(), plain.as_str());

    // Insertion order must not affect identity.
    let forward = CacheKey::with_params(
        "posts",
        vec![("author", left.to_string()), ("tag", right.to_string())],
    );
    let reversed = CacheKey::with_params(
        "posts",
        vec![("tag", right.to_string()), ("author", left.to_string())],
    );
    assert_eq!(forward, reversed, "parameter order leaked into identity");

    // Whatever the values contain, the key still lives under its
    // resource segment and never under a truncated one.
    assert!(forward.has_prefix("posts"));
    assert!(!forward.has_prefix("post"), "prefix crossed a segment boundary");

    // A value embedding the separator syntax must not collide with a
    // key that genuinely has two parameters.
    let smuggled = CacheKey::with_params(
        "posts",
        vec![("author", format!("{left}&tag={right}"))],
    );
    assert_ne!(smuggled, forward, "value escaped into parameter position");

    // Construction is deterministic.
    let again = CacheKey::with_params(
        "posts",
        vec![("author", left.to_string()), ("tag", right.to_string())],
    );
    assert_eq!(forward, again);
});
