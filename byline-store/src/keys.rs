//! Cache-key constructors for every cached read.
//!
//! Key shape is part of the invalidation contract. Every list projection
//! lives under [`POSTS_PREFIX`], so one prefix invalidation after a
//! mutation covers filtered listings, the session's own posts, and the
//! bookmark list at once. Detail keys live under their own segment and
//! deliberately survive list invalidation.

use byline_cache::CacheKey;
use byline_core::PostFilter;

/// Prefix shared by every list projection.
pub const POSTS_PREFIX: &str = "posts";
/// Prefix for single-post keys.
pub const POST_DETAIL_PREFIX: &str = "post";

/// Key for a filtered (or unfiltered) post listing.
pub fn posts(filter: &PostFilter) -> CacheKey {
    CacheKey::with_params(POSTS_PREFIX, filter.query_pairs())
}

/// Key for the session author's own posts, drafts included.
pub fn my_posts() -> CacheKey {
    CacheKey::for_resource("posts/mine")
}

/// Key for the session author's bookmarked posts.
pub fn bookmarked_posts() -> CacheKey {
    CacheKey::for_resource("posts/bookmarked")
}

/// Key for one post by slug.
pub fn post_detail(slug: &str) -> CacheKey {
    CacheKey::for_resource(&format!("{POST_DETAIL_PREFIX}/{slug}"))
}

/// Key for the AI-generation dashboard numbers.
pub fn generation_stats() -> CacheKey {
    CacheKey::for_resource("ai/stats")
}

/// Key for one knowledge-base query. `k` is part of the identity: the
/// same query at a different depth is a different request.
pub fn search(query: &str, k: u32) -> CacheKey {
    CacheKey::with_params(
        "search",
        vec![("k", k.to_string()), ("q", query.to_string())],
    )
}
