//! Byline Cache - Deduplicating Request Cache
//!
//! A keyed cache of in-flight and completed requests, sitting between the
//! content store (or any page-local reader) and the remote gateway.
//!
//! # Design Philosophy
//!
//! Redundant network traffic comes from two places: several readers asking
//! the same question at once, and one reader asking the same question twice
//! in quick succession. This cache removes both without hiding failures:
//!
//! - **Single flight**: concurrent `get` calls for one key share a single
//!   loader invocation; late callers join the in-flight request instead of
//!   issuing their own.
//! - **Stale-while-revalidate**: past the freshness window an entry is
//!   still served immediately, and one background refresh is started on
//!   behalf of all readers.
//! - **Supersession**: every key carries a generation. Invalidation bumps
//!   it, so a response that was overtaken by an invalidation is discarded
//!   rather than published; invalidation always wins over an in-flight
//!   stale read.
//! - Errors are delivered to every joined caller and never cached.
//!
//! Loads run on spawned tasks, so a caller that gives up (a page
//! unmounting mid-fetch) never cancels the request for everyone else.
//!
//! # Example
//!
//! ```ignore
//! let cache = RequestCache::new(CacheConfig::default());
//! let key = CacheKey::for_resource("posts");
//!
//! let posts: Vec<Post> = cache
//!     .get(&key, move || async move { gateway.list_posts(&filter).await })
//!     .await?;
//!
//! // After a mutation, force the next read to refetch.
//! cache.invalidate_prefix("posts").await;
//! ```

pub mod config;
pub mod key;
pub mod request_cache;
pub mod traits;

pub use config::CacheConfig;
pub use key::CacheKey;
pub use request_cache::{CacheSnapshot, RequestCache};
pub use traits::{Cacheable, CacheStats};
