//! Byline Gateway - Remote Content Boundary
//!
//! The one place where HTTP happens. [`ContentGateway`] is the seam the
//! store and the tests program against; [`RestGateway`] implements it
//! over `reqwest` and normalizes every failure into
//! [`GatewayError`](byline_core::GatewayError), so the kind (network,
//! auth, not-found, validation, server) survives unchanged through the
//! layers above.
//!
//! The gateway holds no state beyond the configured client, performs no
//! retries, and caches nothing; all of that belongs to the caller.

pub mod client;
pub mod config;

pub use client::{classify_failure, RestGateway};
pub use config::GatewayConfig;

use async_trait::async_trait;
use byline_core::{
    BookmarkOutcome, Category, EntityId, GatewayError, GenerationStats, LikeOutcome, Post,
    PostDraft, PostFilter, SearchResponse, Tag,
};

/// Remote operations the Byline backend exposes.
///
/// Implementations must be thread-safe (`Send + Sync`); the store shares
/// one instance across every caller. Each method is a single attempt.
///
/// # Example
/// ```ignore
/// let gateway = RestGateway::new(&GatewayConfig::new("http://localhost:8000"))?;
/// let posts = gateway.list_posts(&PostFilter::default()).await?;
/// ```
#[async_trait]
pub trait ContentGateway: Send + Sync {
    /// List published posts, optionally narrowed by `filter`.
    async fn list_posts(&self, filter: &PostFilter) -> Result<Vec<Post>, GatewayError>;

    /// Fetch one post by its slug.
    async fn get_post(&self, slug: &str) -> Result<Post, GatewayError>;

    /// Create a post from a draft. The backend assigns id and slug.
    async fn create_post(&self, draft: &PostDraft) -> Result<Post, GatewayError>;

    /// Replace the editable fields of the post at `slug`.
    async fn update_post(&self, slug: &str, draft: &PostDraft) -> Result<Post, GatewayError>;

    /// Delete the post at `slug`.
    async fn delete_post(&self, slug: &str) -> Result<(), GatewayError>;

    /// Posts authored by the session user, drafts included.
    async fn list_my_posts(&self) -> Result<Vec<Post>, GatewayError>;

    /// Posts the session user has bookmarked.
    async fn list_bookmarked_posts(&self) -> Result<Vec<Post>, GatewayError>;

    /// Toggle the session user's like. The wire addresses posts by
    /// numeric id here, not slug.
    async fn toggle_like(&self, post_id: EntityId) -> Result<LikeOutcome, GatewayError>;

    /// Toggle the session user's bookmark. Addressed by numeric id.
    async fn toggle_bookmark(&self, post_id: EntityId) -> Result<BookmarkOutcome, GatewayError>;

    /// The category catalog.
    async fn list_categories(&self) -> Result<Vec<Category>, GatewayError>;

    /// The tag catalog.
    async fn list_tags(&self) -> Result<Vec<Tag>, GatewayError>;

    /// AI-generation usage counters for the dashboard.
    async fn generation_stats(&self) -> Result<GenerationStats, GatewayError>;

    /// Query the retrieval backend's knowledge base for the `k` closest
    /// documents.
    async fn search_knowledge_base(
        &self,
        query: &str,
        k: u32,
    ) -> Result<SearchResponse, GatewayError>;
}
