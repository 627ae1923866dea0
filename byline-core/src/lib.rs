//! Byline Core - Wire Types
//!
//! Pure data structures shared by every Byline crate: the entities and
//! drafts on the wire, plus the error taxonomy that flows unchanged from
//! the gateway to the caller. No I/O here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Backend-assigned numeric identifier for posts, categories, tags, users.
pub type EntityId = i64;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Client-local identifier for store subscribers, UUIDv7 so subscriptions
/// sort by creation time in diagnostics.
pub type SubscriberId = Uuid;

/// Generate a new subscriber id.
pub fn new_subscriber_id() -> SubscriberId {
    Uuid::now_v7()
}

// ============================================================================
// ENUMS
// ============================================================================

/// Rendering layout chosen for a post.
///
/// Stored by the backend in kebab-case (`image-left`, `gallery`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutType {
    #[default]
    Minimal,
    ImageLeft,
    ImageRight,
    Gallery,
}

/// Process-wide theme preference. Persisted across sessions; absent or
/// unreadable state falls back to `Light`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    Light,
    Dark,
}

impl ThemeMode {
    /// The opposite mode. `toggle_theme` is the only writer path.
    pub fn toggled(self) -> Self {
        match self {
            ThemeMode::Light => ThemeMode::Dark,
            ThemeMode::Dark => ThemeMode::Light,
        }
    }
}

/// Which read-mostly catalog a change notification refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CatalogKind {
    Categories,
    Tags,
}

/// Lifecycle of a single mutation against one post.
///
/// `Idle -> Pending -> {Fulfilled, Rejected}`. At most one mutation per
/// target slug may be pending at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MutationPhase {
    #[default]
    Idle,
    Pending,
    Fulfilled,
    Rejected,
}

// ============================================================================
// ENTITIES
// ============================================================================

/// Author reference embedded in posts. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub id: EntityId,
    pub username: String,
}

/// Read-mostly category catalog entry. Never mutated by this client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Display hint, e.g. `#3B82F6`.
    pub color: String,
}

/// Tag catalog entry. The backend lowercases names and get-or-creates
/// tags named in a draft, so drafts may carry names absent from here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: EntityId,
    pub name: String,
}

/// A published or draft article, the primary content entity.
///
/// `slug` is assigned by the backend on create and is the externally
/// addressable key; the client never synthesizes one. The viewer-relative
/// flags (`is_liked`, `is_bookmarked`) depend on the session that fetched
/// the post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: EntityId,
    pub title: String,
    pub slug: String,
    /// Rich HTML body.
    pub content: String,
    pub author: Author,
    pub category: Option<Category>,
    pub tags: Vec<Tag>,
    pub layout_type: LayoutType,
    pub featured_image: Option<String>,
    #[serde(default = "default_true")]
    pub is_published: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default)]
    pub likes_count: i64,
    #[serde(default)]
    pub views_count: i64,
    #[serde(default)]
    pub comments_count: i64,
    #[serde(default)]
    pub is_liked: bool,
    #[serde(default)]
    pub is_bookmarked: bool,
}

fn default_true() -> bool {
    true
}

impl Post {
    /// Tag names as a set; tag order on the wire is not significant.
    pub fn tag_names(&self) -> std::collections::BTreeSet<&str> {
        self.tags.iter().map(|t| t.name.as_str()).collect()
    }
}

// ============================================================================
// DRAFTS AND FILTERS
// ============================================================================

/// Editable fields of a post, submitted on create and update (full
/// replace, no partial patching).
///
/// Tags are plain names. Names missing from the tag catalog are allowed;
/// the backend reconciles them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDraft {
    pub title: String,
    pub content: String,
    pub category_id: Option<EntityId>,
    pub tags: Vec<String>,
    pub layout_type: LayoutType,
    pub featured_image: Option<String>,
    pub is_published: bool,
}

impl PostDraft {
    /// Draft with required fields set and everything else defaulted.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            category_id: None,
            tags: Vec::new(),
            layout_type: LayoutType::default(),
            featured_image: None,
            is_published: true,
        }
    }

    pub fn with_category(mut self, category_id: EntityId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_layout(mut self, layout: LayoutType) -> Self {
        self.layout_type = layout;
        self
    }

    pub fn with_featured_image(mut self, url: impl Into<String>) -> Self {
        self.featured_image = Some(url.into());
        self
    }

    pub fn unpublished(mut self) -> Self {
        self.is_published = false;
        self
    }

    /// Client-side validation run before any network call: title and
    /// content must be non-empty after trimming. Violations use the same
    /// `Validation` shape the backend produces so callers surface both
    /// identically.
    pub fn validate(&self) -> Result<(), GatewayError> {
        let mut fields = Vec::new();
        if self.title.trim().is_empty() {
            fields.push(FieldViolation {
                field: "title".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if self.content.trim().is_empty() {
            fields.push(FieldViolation {
                field: "content".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        if fields.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::Validation {
                message: "draft failed validation".to_string(),
                fields,
            })
        }
    }
}

/// Server-side list filter, serialized as query parameters. Empty fields
/// are omitted from the request and from cache keys.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PostFilter {
    pub category: Option<String>,
    pub tag: Option<String>,
    pub search: Option<String>,
    pub author: Option<String>,
}

impl PostFilter {
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.tag.is_none() && self.search.is_none() && self.author.is_none()
    }

    /// Present fields as query pairs, in a fixed order so equivalent
    /// filters produce identical cache keys.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(v) = &self.category {
            pairs.push(("category", v.clone()));
        }
        if let Some(v) = &self.tag {
            pairs.push(("tag", v.clone()));
        }
        if let Some(v) = &self.search {
            pairs.push(("search", v.clone()));
        }
        if let Some(v) = &self.author {
            pairs.push(("author", v.clone()));
        }
        pairs
    }
}

// ============================================================================
// TOGGLE AND DASHBOARD PAYLOADS
// ============================================================================

/// Response of the like toggle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LikeOutcome {
    pub liked: bool,
    pub likes_count: i64,
}

/// Response of the bookmark toggle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookmarkOutcome {
    pub bookmarked: bool,
}

/// Per-kind generation counts on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GenerationBreakdown {
    pub text: i64,
    pub image: i64,
    pub video: i64,
    pub youtube: i64,
}

/// AI-generation usage statistics. Computed by the backend; rendered
/// as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub total_generations: i64,
    pub successful_generations: i64,
    /// Percentage in `[0, 100]`.
    pub success_rate: f64,
    pub by_type: GenerationBreakdown,
}

/// One knowledge-base search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    pub similarity_score: f64,
    /// 1-based position in the ranked results.
    pub rank: u32,
}

/// Knowledge-base search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: Vec<SearchHit>,
    pub total_results: usize,
}

// ============================================================================
// ERROR TAXONOMY
// ============================================================================

/// Field-level detail attached to validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

/// Normalized failure of a gateway call. Exactly one kind per failure;
/// every layer above the gateway preserves the kind unchanged.
///
/// All payloads are owned so the error can be cloned to every caller
/// joined on a deduplicated request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// The request produced no HTTP response (DNS, refused, timeout).
    #[error("network error: {message}")]
    Network { message: String },

    /// 401 or 403; the caller must re-authenticate. Never retried.
    #[error("authentication required (HTTP {status}): {message}")]
    Auth { status: u16, message: String },

    /// 404; client state referencing the resource is stale.
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// 400/422 with per-field detail; the caller corrects the input.
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        fields: Vec<FieldViolation>,
    },

    /// 5xx; transient, surfaced with a manual retry affordance.
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// A success response whose body did not match the expected shape.
    #[error("malformed payload: {message}")]
    Decode { message: String },
}

impl GatewayError {
    /// Transient failures may be retried manually or by a background
    /// revalidation; everything else requires caller action first.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Network { .. } | GatewayError::Server { .. })
    }

    /// Violation messages for a named field, empty for other kinds.
    pub fn field_messages(&self, field: &str) -> Vec<&str> {
        match self {
            GatewayError::Validation { fields, .. } => fields
                .iter()
                .filter(|f| f.field == field)
                .map(|f| f.message.as_str())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Request-cache failures that are not gateway failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CacheError {
    /// A cached payload could not be encoded or decoded for the
    /// requested type. Indicates a key reused across two types.
    #[error("codec failure for cache key {key}: {message}")]
    Codec { key: String, message: String },

    /// The task driving a deduplicated load disappeared before
    /// publishing a result.
    #[error("load abandoned for cache key {key}")]
    Abandoned { key: String },
}

/// Content-store failures that are not gateway failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// A mutation is already pending for this slug; the UI must keep the
    /// triggering control disabled until it settles.
    #[error("a mutation is already pending for post {slug}")]
    MutationPending { slug: String },
}

/// Top-level error for Byline operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BylineError {
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl BylineError {
    /// The gateway kind, when this error originated at the boundary.
    pub fn as_gateway(&self) -> Option<&GatewayError> {
        match self {
            BylineError::Gateway(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type alias for Byline operations.
pub type BylineResult<T> = Result<T, BylineError>;
