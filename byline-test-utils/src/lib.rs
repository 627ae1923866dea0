//! Byline Test Utilities
//!
//! Centralized test infrastructure for the Byline workspace:
//! - An in-memory [`MockGateway`] that behaves like the backend
//! - Proptest generators for content types
//! - Test fixtures for common scenarios
//! - Custom assertions for Byline-specific error shapes

// Re-export core types for convenience
pub use byline_core::{
    Author, BookmarkOutcome, BylineError, BylineResult, CacheError, CatalogKind, Category,
    EntityId, FieldViolation, GatewayError, GenerationBreakdown, GenerationStats, LayoutType,
    LikeOutcome, MutationPhase, Post, PostDraft, PostFilter, SearchHit, SearchResponse,
    StoreError, Tag, ThemeMode, Timestamp,
};
pub use byline_gateway::ContentGateway;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Notify;

// ============================================================================
// MOCK GATEWAY
// ============================================================================

/// In-memory stand-in for the REST backend.
///
/// Mirrors the backend where callers can observe the difference: created
/// posts get server-assigned ids and slugs, tag names are lowercased and
/// get-or-created, toggles flip the viewer-relative flags. Tests can
/// script failures per method with [`MockGateway::fail_next`] and hold a
/// call open mid-flight with [`MockGateway::gate`].
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
    calls: Mutex<HashMap<&'static str, usize>>,
    failures: Mutex<HashMap<&'static str, VecDeque<GatewayError>>>,
    gates: Mutex<HashMap<&'static str, Arc<Notify>>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the named trait method has been called.
    pub fn calls(&self, method: &str) -> usize {
        self.calls.lock().unwrap().get(method).copied().unwrap_or(0)
    }

    /// Queue an error for the next call of `method`. Queued errors are
    /// consumed in order; once drained, calls succeed again.
    pub fn fail_next(&self, method: &'static str, error: GatewayError) {
        self.failures
            .lock()
            .unwrap()
            .entry(method)
            .or_default()
            .push_back(error);
    }

    /// Gate `method`: every subsequent call blocks until the returned
    /// handle is notified once per call.
    pub fn gate(&self, method: &'static str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().unwrap().insert(method, Arc::clone(&gate));
        gate
    }

    /// The author mutations are attributed to.
    pub fn session_author(&self) -> Author {
        self.state.lock().unwrap().session_user.clone()
    }

    pub fn set_session_author(&self, author: Author) {
        self.state.lock().unwrap().session_user = author;
    }

    pub fn set_generation_stats(&self, stats: GenerationStats) {
        self.state.lock().unwrap().stats = stats;
    }

    /// Hits returned by knowledge-base searches, before re-ranking.
    pub fn set_search_hits(&self, hits: Vec<SearchHit>) {
        self.state.lock().unwrap().search_hits = hits;
    }

    /// Seed a category into the catalog, assigning it an id.
    pub fn seed_category(&self, name: &str) -> Category {
        let mut state = self.state.lock().unwrap();
        let category = Category {
            id: state.take_id(),
            name: name.to_string(),
            description: String::new(),
            color: "#3B82F6".to_string(),
        };
        state.categories.push(category.clone());
        category
    }

    /// Seed a tag into the catalog, lowercased like the backend does.
    pub fn seed_tag(&self, name: &str) -> Tag {
        self.state.lock().unwrap().tag_for(name)
    }

    /// Run a draft through the create path without counting the call.
    pub fn seed_post(&self, draft: &PostDraft) -> Post {
        self.state.lock().unwrap().create_from(draft)
    }

    /// Insert a fully-formed post as-is, keeping id assignment ahead of it.
    pub fn push_post(&self, post: Post) {
        let mut state = self.state.lock().unwrap();
        state.next_id = state.next_id.max(post.id + 1);
        state.posts.push(post);
    }

    /// Current stored copy of a post, if any.
    pub fn stored_post(&self, slug: &str) -> Option<Post> {
        self.state
            .lock()
            .unwrap()
            .posts
            .iter()
            .find(|p| p.slug == slug)
            .cloned()
    }

    pub fn post_count(&self) -> usize {
        self.state.lock().unwrap().posts.len()
    }

    /// Common entry for every trait method: count the call, wait on the
    /// gate if one is installed, then pop a scripted failure if queued.
    async fn begin(&self, method: &'static str) -> Result<(), GatewayError> {
        *self.calls.lock().unwrap().entry(method).or_insert(0) += 1;
        let gate = self.gates.lock().unwrap().get(method).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self
            .failures
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

struct MockState {
    posts: Vec<Post>,
    categories: Vec<Category>,
    tags: Vec<Tag>,
    stats: GenerationStats,
    search_hits: Vec<SearchHit>,
    session_user: Author,
    next_id: EntityId,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            posts: Vec::new(),
            categories: Vec::new(),
            tags: Vec::new(),
            stats: GenerationStats {
                total_generations: 0,
                successful_generations: 0,
                success_rate: 0.0,
                by_type: GenerationBreakdown::default(),
            },
            search_hits: Vec::new(),
            session_user: fixtures::session_author(),
            next_id: 1,
        }
    }
}

impl MockState {
    fn take_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn tag_for(&mut self, name: &str) -> Tag {
        let lowered = name.to_lowercase();
        if let Some(tag) = self.tags.iter().find(|t| t.name == lowered) {
            return tag.clone();
        }
        let tag = Tag {
            id: self.take_id(),
            name: lowered,
        };
        self.tags.push(tag.clone());
        tag
    }

    fn tags_for(&mut self, names: &[String]) -> Vec<Tag> {
        let mut tags: Vec<Tag> = Vec::with_capacity(names.len());
        for name in names {
            let tag = self.tag_for(name);
            if !tags.iter().any(|t| t.id == tag.id) {
                tags.push(tag);
            }
        }
        tags
    }

    fn category_by_id(&self, id: Option<EntityId>) -> Option<Category> {
        id.and_then(|cid| self.categories.iter().find(|c| c.id == cid).cloned())
    }

    fn create_from(&mut self, draft: &PostDraft) -> Post {
        let id = self.take_id();
        let mut slug = slugify(&draft.title);
        if slug.is_empty() {
            slug = format!("post-{id}");
        } else if self.posts.iter().any(|p| p.slug == slug) {
            slug = format!("{slug}-{id}");
        }
        let category = self.category_by_id(draft.category_id);
        let tags = self.tags_for(&draft.tags);
        let now = Utc::now();
        let post = Post {
            id,
            title: draft.title.clone(),
            slug,
            content: draft.content.clone(),
            author: self.session_user.clone(),
            category,
            tags,
            layout_type: draft.layout_type,
            featured_image: draft.featured_image.clone(),
            is_published: draft.is_published,
            created_at: now,
            updated_at: now,
            likes_count: 0,
            views_count: 0,
            comments_count: 0,
            is_liked: false,
            is_bookmarked: false,
        };
        self.posts.push(post.clone());
        post
    }

    fn apply_draft(&mut self, index: usize, draft: &PostDraft) -> Post {
        let category = self.category_by_id(draft.category_id);
        let tags = self.tags_for(&draft.tags);
        let post = &mut self.posts[index];
        post.title = draft.title.clone();
        post.content = draft.content.clone();
        post.category = category;
        post.tags = tags;
        post.layout_type = draft.layout_type;
        post.featured_image = draft.featured_image.clone();
        post.is_published = draft.is_published;
        post.updated_at = Utc::now();
        post.clone()
    }
}

/// Derive a URL slug the way the backend does: ASCII lowercased, runs of
/// other characters collapsed into single interior hyphens.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_hyphen = false;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

fn matches_filter(post: &Post, filter: &PostFilter) -> bool {
    if let Some(category) = &filter.category {
        if post.category.as_ref().map(|c| c.name.as_str()) != Some(category.as_str()) {
            return false;
        }
    }
    if let Some(tag) = &filter.tag {
        let wanted = tag.to_lowercase();
        if !post.tags.iter().any(|t| t.name == wanted) {
            return false;
        }
    }
    if let Some(search) = &filter.search {
        let needle = search.to_lowercase();
        if !post.title.to_lowercase().contains(&needle)
            && !post.content.to_lowercase().contains(&needle)
        {
            return false;
        }
    }
    if let Some(author) = &filter.author {
        if post.author.username != *author {
            return false;
        }
    }
    true
}

#[async_trait]
impl ContentGateway for MockGateway {
    async fn list_posts(&self, filter: &PostFilter) -> Result<Vec<Post>, GatewayError> {
        self.begin("list_posts").await?;
        let state = self.state.lock().unwrap();
        Ok(state
            .posts
            .iter()
            .filter(|p| p.is_published && matches_filter(p, filter))
            .cloned()
            .collect())
    }

    async fn get_post(&self, slug: &str) -> Result<Post, GatewayError> {
        self.begin("get_post").await?;
        let state = self.state.lock().unwrap();
        state
            .posts
            .iter()
            .find(|p| p.slug == slug)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound {
                resource: format!("api/blogs/{slug}"),
            })
    }

    async fn create_post(&self, draft: &PostDraft) -> Result<Post, GatewayError> {
        self.begin("create_post").await?;
        Ok(self.state.lock().unwrap().create_from(draft))
    }

    async fn update_post(&self, slug: &str, draft: &PostDraft) -> Result<Post, GatewayError> {
        self.begin("update_post").await?;
        let mut state = self.state.lock().unwrap();
        match state.posts.iter().position(|p| p.slug == slug) {
            Some(index) => Ok(state.apply_draft(index, draft)),
            None => Err(GatewayError::NotFound {
                resource: format!("api/blogs/{slug}"),
            }),
        }
    }

    async fn delete_post(&self, slug: &str) -> Result<(), GatewayError> {
        self.begin("delete_post").await?;
        let mut state = self.state.lock().unwrap();
        match state.posts.iter().position(|p| p.slug == slug) {
            Some(index) => {
                state.posts.remove(index);
                Ok(())
            }
            None => Err(GatewayError::NotFound {
                resource: format!("api/blogs/{slug}"),
            }),
        }
    }

    async fn list_my_posts(&self) -> Result<Vec<Post>, GatewayError> {
        self.begin("list_my_posts").await?;
        let state = self.state.lock().unwrap();
        let me = state.session_user.id;
        Ok(state
            .posts
            .iter()
            .filter(|p| p.author.id == me)
            .cloned()
            .collect())
    }

    async fn list_bookmarked_posts(&self) -> Result<Vec<Post>, GatewayError> {
        self.begin("list_bookmarked_posts").await?;
        let state = self.state.lock().unwrap();
        Ok(state
            .posts
            .iter()
            .filter(|p| p.is_bookmarked)
            .cloned()
            .collect())
    }

    async fn toggle_like(&self, post_id: EntityId) -> Result<LikeOutcome, GatewayError> {
        self.begin("toggle_like").await?;
        let mut state = self.state.lock().unwrap();
        let Some(post) = state.posts.iter_mut().find(|p| p.id == post_id) else {
            return Err(GatewayError::NotFound {
                resource: format!("api/blogs/{post_id}/like"),
            });
        };
        post.is_liked = !post.is_liked;
        post.likes_count += if post.is_liked { 1 } else { -1 };
        Ok(LikeOutcome {
            liked: post.is_liked,
            likes_count: post.likes_count,
        })
    }

    async fn toggle_bookmark(&self, post_id: EntityId) -> Result<BookmarkOutcome, GatewayError> {
        self.begin("toggle_bookmark").await?;
        let mut state = self.state.lock().unwrap();
        let Some(post) = state.posts.iter_mut().find(|p| p.id == post_id) else {
            return Err(GatewayError::NotFound {
                resource: format!("api/blogs/{post_id}/bookmark"),
            });
        };
        post.is_bookmarked = !post.is_bookmarked;
        Ok(BookmarkOutcome {
            bookmarked: post.is_bookmarked,
        })
    }

    async fn list_categories(&self) -> Result<Vec<Category>, GatewayError> {
        self.begin("list_categories").await?;
        Ok(self.state.lock().unwrap().categories.clone())
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, GatewayError> {
        self.begin("list_tags").await?;
        Ok(self.state.lock().unwrap().tags.clone())
    }

    async fn generation_stats(&self) -> Result<GenerationStats, GatewayError> {
        self.begin("generation_stats").await?;
        Ok(self.state.lock().unwrap().stats.clone())
    }

    async fn search_knowledge_base(
        &self,
        query: &str,
        k: u32,
    ) -> Result<SearchResponse, GatewayError> {
        self.begin("search_knowledge_base").await?;
        let state = self.state.lock().unwrap();
        let results: Vec<SearchHit> = state
            .search_hits
            .iter()
            .take(k as usize)
            .cloned()
            .enumerate()
            .map(|(i, mut hit)| {
                hit.rank = i as u32 + 1;
                hit
            })
            .collect();
        let total_results = results.len();
        Ok(SearchResponse {
            query: query.to_string(),
            results,
            total_results,
        })
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for content types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a LayoutType variant.
    pub fn arb_layout() -> impl Strategy<Value = LayoutType> {
        prop_oneof![
            Just(LayoutType::Minimal),
            Just(LayoutType::ImageLeft),
            Just(LayoutType::ImageRight),
            Just(LayoutType::Gallery),
        ]
    }

    /// Generate a ThemeMode variant.
    pub fn arb_theme() -> impl Strategy<Value = ThemeMode> {
        prop_oneof![Just(ThemeMode::Light), Just(ThemeMode::Dark)]
    }

    /// Generate a CatalogKind variant.
    pub fn arb_catalog_kind() -> impl Strategy<Value = CatalogKind> {
        prop_oneof![Just(CatalogKind::Categories), Just(CatalogKind::Tags)]
    }

    /// Generate a username.
    pub fn arb_username() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{2,11}"
    }

    /// Generate a backend-shaped slug.
    pub fn arb_slug() -> impl Strategy<Value = String> {
        "[a-z0-9]{1,8}(-[a-z0-9]{1,8}){0,3}"
    }

    /// Generate a lowercase tag name.
    pub fn arb_tag_name() -> impl Strategy<Value = String> {
        "[a-z]{1,12}"
    }

    // === Struct Generators ===

    /// Generate an Author.
    pub fn arb_author() -> impl Strategy<Value = Author> {
        (1i64..10_000, arb_username()).prop_map(|(id, username)| Author { id, username })
    }

    /// Generate a Category.
    pub fn arb_category() -> impl Strategy<Value = Category> {
        (1i64..10_000, "[A-Z][a-z]{2,12}").prop_map(|(id, name)| Category {
            id,
            name,
            description: String::new(),
            color: "#3B82F6".to_string(),
        })
    }

    /// Generate a Tag.
    pub fn arb_tag() -> impl Strategy<Value = Tag> {
        (1i64..10_000, arb_tag_name()).prop_map(|(id, name)| Tag { id, name })
    }

    /// Generate a Post with zeroed counters and current timestamps.
    pub fn arb_post() -> impl Strategy<Value = Post> {
        (
            1i64..100_000,
            "[A-Z][a-zA-Z ]{2,30}",
            arb_slug(),
            "[a-zA-Z0-9 ]{0,80}",
            arb_author(),
            prop::option::of(arb_category()),
            prop::collection::vec(arb_tag(), 0..4),
            arb_layout(),
            any::<bool>(),
        )
            .prop_map(
                |(id, title, slug, content, author, category, tags, layout_type, is_published)| {
                    let now = Utc::now();
                    Post {
                        id,
                        title,
                        slug,
                        content,
                        author,
                        category,
                        tags,
                        layout_type,
                        featured_image: None,
                        is_published,
                        created_at: now,
                        updated_at: now,
                        likes_count: 0,
                        views_count: 0,
                        comments_count: 0,
                        is_liked: false,
                        is_bookmarked: false,
                    }
                },
            )
    }

    /// Generate a PostDraft that passes validation.
    pub fn arb_draft() -> impl Strategy<Value = PostDraft> {
        (
            "[A-Za-z][A-Za-z ]{0,39}",
            "[A-Za-z][A-Za-z ,.]{0,119}",
            prop::option::of(1i64..100),
            prop::collection::vec(arb_tag_name(), 0..4),
            arb_layout(),
            any::<bool>(),
        )
            .prop_map(
                |(title, content, category_id, tags, layout_type, is_published)| PostDraft {
                    title,
                    content,
                    category_id,
                    tags,
                    layout_type,
                    featured_image: None,
                    is_published,
                },
            )
    }

    /// Generate a PostFilter with any combination of fields present.
    pub fn arb_filter() -> impl Strategy<Value = PostFilter> {
        (
            prop::option::of("[a-z]{3,10}"),
            prop::option::of(arb_tag_name()),
            prop::option::of("[a-z ]{3,15}"),
            prop::option::of(arb_username()),
        )
            .prop_map(|(category, tag, search, author)| PostFilter {
                category,
                tag,
                search,
                author,
            })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made values for common test scenarios.

    use super::*;

    /// The author a fresh [`MockGateway`] attributes mutations to.
    pub fn session_author() -> Author {
        Author {
            id: 1,
            username: "mira".to_string(),
        }
    }

    /// An author other than the session's.
    pub fn other_author() -> Author {
        Author {
            id: 2,
            username: "noor".to_string(),
        }
    }

    /// Create a test Category.
    pub fn sample_category() -> Category {
        Category {
            id: 10,
            name: "Engineering".to_string(),
            description: "Systems and tooling".to_string(),
            color: "#3B82F6".to_string(),
        }
    }

    /// Create a test Tag.
    pub fn sample_tag() -> Tag {
        Tag {
            id: 20,
            name: "rust".to_string(),
        }
    }

    /// Create a published post owned by the session author.
    pub fn published_post(id: EntityId, slug: &str) -> Post {
        let now = Utc::now();
        Post {
            id,
            title: format!("Post {slug}"),
            slug: slug.to_string(),
            content: "<p>Fixture body.</p>".to_string(),
            author: session_author(),
            category: Some(sample_category()),
            tags: vec![sample_tag()],
            layout_type: LayoutType::Minimal,
            featured_image: None,
            is_published: true,
            created_at: now,
            updated_at: now,
            likes_count: 0,
            views_count: 0,
            comments_count: 0,
            is_liked: false,
            is_bookmarked: false,
        }
    }

    /// Create an unpublished post owned by the session author.
    pub fn unpublished_post(id: EntityId, slug: &str) -> Post {
        Post {
            is_published: false,
            ..published_post(id, slug)
        }
    }

    /// Create a valid draft with the given title.
    pub fn sample_draft(title: &str) -> PostDraft {
        PostDraft::new(title, "<p>Drafted in a test.</p>")
    }

    /// Create non-zero generation statistics.
    pub fn sample_stats() -> GenerationStats {
        GenerationStats {
            total_generations: 12,
            successful_generations: 9,
            success_rate: 75.0,
            by_type: GenerationBreakdown {
                text: 6,
                image: 3,
                video: 2,
                youtube: 1,
            },
        }
    }

    /// Create `n` search hits with descending similarity scores.
    pub fn sample_hits(n: usize) -> Vec<SearchHit> {
        (0..n)
            .map(|i| SearchHit {
                title: Some(format!("Note {i}")),
                content: format!("Indexed paragraph {i}."),
                source: Some("kb/notes.md".to_string()),
                metadata: None,
                similarity_score: 0.95 - 0.05 * i as f64,
                rank: i as u32 + 1,
            })
            .collect()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for Byline-specific error shapes.

    use super::*;

    /// Assert that a BylineResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &BylineResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a BylineResult is a NotFound gateway error.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &BylineResult<T>) {
        match result {
            Err(BylineError::Gateway(GatewayError::NotFound { .. })) => {}
            other => panic!("Expected NotFound error, got: {:?}", other),
        }
    }

    /// Assert that a BylineResult is a Validation error naming `field`.
    #[track_caller]
    pub fn assert_validation_on<T: std::fmt::Debug>(result: &BylineResult<T>, field: &str) {
        match result {
            Err(BylineError::Gateway(err @ GatewayError::Validation { .. })) => {
                assert!(
                    !err.field_messages(field).is_empty(),
                    "No violation recorded for `{}` in {:?}",
                    field,
                    err
                );
            }
            other => panic!("Expected Validation error naming `{}`, got: {:?}", field, other),
        }
    }

    /// Assert that a BylineResult is a MutationPending store error for `slug`.
    #[track_caller]
    pub fn assert_mutation_pending<T: std::fmt::Debug>(result: &BylineResult<T>, slug: &str) {
        match result {
            Err(BylineError::Store(StoreError::MutationPending { slug: pending })) => {
                assert_eq!(pending, slug, "Wrong slug in MutationPending error");
            }
            other => panic!("Expected MutationPending for `{}`, got: {:?}", slug, other),
        }
    }

    /// Assert that a BylineResult is an Abandoned cache error.
    #[track_caller]
    pub fn assert_abandoned<T: std::fmt::Debug>(result: &BylineResult<T>) {
        match result {
            Err(BylineError::Cache(CacheError::Abandoned { .. })) => {}
            other => panic!("Expected Abandoned cache error, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
