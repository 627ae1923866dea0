//! The session-scoped store behind every page.
//!
//! Reads go through the request cache; mutations go to the gateway
//! first and reconcile the cache afterwards. Deletion is the one
//! optimistic path: the post disappears from cached projections before
//! the backend confirms, and reappears if it refuses.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use byline_cache::{CacheConfig, CacheStats, RequestCache};
use byline_core::{
    Author, BookmarkOutcome, BylineResult, CatalogKind, Category, GatewayError, GenerationStats,
    LikeOutcome, MutationPhase, Post, PostDraft, PostFilter, SearchResponse, StoreError, Tag,
    ThemeMode,
};
use byline_gateway::{ContentGateway, RestGateway};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::keys;
use crate::persistence::{self, PersistedPreferences};
use crate::subscription::{ChangeEvent, Interest, Subscription};

/// Backlog of the change-event channel. Observers further behind than
/// this start losing the oldest events.
const EVENT_CAPACITY: usize = 64;

// ============================================================================
// CONTENT STORE
// ============================================================================

/// Single source of truth for one session: cached reads, mutation
/// coordination, catalogs, theme, and change notifications.
///
/// Construct once at startup and share behind an [`Arc`]; every method
/// takes `&self`.
///
/// # Example
///
/// ```ignore
/// let config = StoreConfig::load_from_env()?;
/// let store = Arc::new(ContentStore::from_config(&config)?);
///
/// let mut sub = store.subscribe(Interest::Posts);
/// let posts = store.posts(&PostFilter::default()).await?;
/// ```
pub struct ContentStore<G> {
    gateway: Arc<G>,
    cache: RequestCache,
    evict_age: Duration,
    categories: tokio::sync::Mutex<Option<Vec<Category>>>,
    tags: tokio::sync::Mutex<Option<Vec<Tag>>>,
    session: Mutex<SessionState>,
    events: broadcast::Sender<ChangeEvent>,
    theme_path: Option<PathBuf>,
}

struct SessionState {
    theme: ThemeMode,
    user: Option<Author>,
    mutations: HashMap<String, MutationPhase>,
}

/// Outcome of [`ContentStore::delete_post`].
///
/// By the time this value exists the optimistic removal has already
/// been visible; the variants say whether it stuck.
#[derive(Debug)]
pub enum DeleteOutcome {
    /// The backend confirmed. Cached projections were invalidated.
    Committed,
    /// The backend refused. Hidden entries were restored.
    RolledBack { error: GatewayError },
}

impl ContentStore<RestGateway> {
    /// Production wiring: REST gateway, cache tuning, and persisted
    /// theme all from one config.
    pub fn from_config(config: &StoreConfig) -> Result<Self, GatewayError> {
        let gateway = RestGateway::new(&config.gateway_config())?;
        Ok(Self::with_preferences(
            gateway,
            config.cache_config(),
            config.theme.state_path.clone(),
        ))
    }
}

impl<G: ContentGateway + 'static> ContentStore<G> {
    /// Store with no preference persistence. The theme starts at its
    /// default and lives only as long as the store.
    pub fn new(gateway: G, cache_config: CacheConfig) -> Self {
        Self::assemble(gateway, cache_config, ThemeMode::default(), None)
    }

    /// Store that restores the persisted theme from `state_path` and
    /// writes it back on every toggle. An absent or unreadable file
    /// falls back to the default theme.
    pub fn with_preferences(gateway: G, cache_config: CacheConfig, state_path: PathBuf) -> Self {
        let theme = match persistence::load(&state_path) {
            Ok(Some(preferences)) => preferences.theme,
            Ok(None) => ThemeMode::default(),
            Err(error) => {
                warn!(
                    error = %error,
                    path = %state_path.display(),
                    "unreadable preference file, using defaults"
                );
                ThemeMode::default()
            }
        };
        Self::assemble(gateway, cache_config, theme, Some(state_path))
    }

    fn assemble(
        gateway: G,
        cache_config: CacheConfig,
        theme: ThemeMode,
        theme_path: Option<PathBuf>,
    ) -> Self {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        let evict_age = cache_config.evict_age;
        Self {
            gateway: Arc::new(gateway),
            cache: RequestCache::new(cache_config),
            evict_age,
            categories: tokio::sync::Mutex::new(None),
            tags: tokio::sync::Mutex::new(None),
            session: Mutex::new(SessionState {
                theme,
                user: None,
                mutations: HashMap::new(),
            }),
            events,
            theme_path,
        }
    }

    /// The underlying gateway, for callers that need an uncached
    /// request.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    // ========================================================================
    // CACHED READS
    // ========================================================================

    /// Posts matching `filter`, read through the cache.
    pub async fn posts(&self, filter: &PostFilter) -> BylineResult<Vec<Post>> {
        let key = keys::posts(filter);
        let gateway = Arc::clone(&self.gateway);
        let filter = filter.clone();
        self.cache
            .get(&key, move || async move { gateway.list_posts(&filter).await })
            .await
    }

    /// One post by slug.
    pub async fn post(&self, slug: &str) -> BylineResult<Post> {
        let key = keys::post_detail(slug);
        let gateway = Arc::clone(&self.gateway);
        let slug = slug.to_string();
        self.cache
            .get(&key, move || async move { gateway.get_post(&slug).await })
            .await
    }

    /// The session author's posts, drafts included.
    pub async fn my_posts(&self) -> BylineResult<Vec<Post>> {
        let gateway = Arc::clone(&self.gateway);
        self.cache
            .get(&keys::my_posts(), move || async move {
                gateway.list_my_posts().await
            })
            .await
    }

    /// The session author's bookmarked posts.
    pub async fn bookmarked_posts(&self) -> BylineResult<Vec<Post>> {
        let gateway = Arc::clone(&self.gateway);
        self.cache
            .get(&keys::bookmarked_posts(), move || async move {
                gateway.list_bookmarked_posts().await
            })
            .await
    }

    /// Dashboard numbers for AI generation usage.
    pub async fn generation_stats(&self) -> BylineResult<GenerationStats> {
        let gateway = Arc::clone(&self.gateway);
        self.cache
            .get(&keys::generation_stats(), move || async move {
                gateway.generation_stats().await
            })
            .await
    }

    /// Knowledge-base search, cached per query and depth.
    pub async fn search(&self, query: &str, k: u32) -> BylineResult<SearchResponse> {
        let key = keys::search(query, k);
        let gateway = Arc::clone(&self.gateway);
        let query = query.to_string();
        self.cache
            .get(&key, move || async move {
                gateway.search_knowledge_base(&query, k).await
            })
            .await
    }

    // ========================================================================
    // CATALOGS
    // ========================================================================

    /// Categories for this session. Fetched at most once until
    /// [`refresh_catalogs`](Self::refresh_catalogs) or
    /// [`reset`](Self::reset); concurrent first readers share the one
    /// fetch.
    pub async fn categories(&self) -> BylineResult<Vec<Category>> {
        let mut slot = self.categories.lock().await;
        if let Some(categories) = slot.as_ref() {
            return Ok(categories.clone());
        }
        let fetched = self.gateway.list_categories().await?;
        *slot = Some(fetched.clone());
        Ok(fetched)
    }

    /// Tags for this session. Same lifecycle as
    /// [`categories`](Self::categories). A draft may still name tags
    /// that are not in this catalog; the backend creates them.
    pub async fn tags(&self) -> BylineResult<Vec<Tag>> {
        let mut slot = self.tags.lock().await;
        if let Some(tags) = slot.as_ref() {
            return Ok(tags.clone());
        }
        let fetched = self.gateway.list_tags().await?;
        *slot = Some(fetched.clone());
        Ok(fetched)
    }

    /// Re-fetch both catalogs. A failed fetch keeps the previous copy;
    /// the first failure is returned after both have been attempted.
    pub async fn refresh_catalogs(&self) -> BylineResult<()> {
        let mut first_error = None;

        match self.gateway.list_categories().await {
            Ok(fetched) => {
                let mut slot = self.categories.lock().await;
                let changed = slot.as_ref() != Some(&fetched);
                *slot = Some(fetched);
                if changed {
                    self.notify(ChangeEvent::CatalogChanged(CatalogKind::Categories));
                }
            }
            Err(error) => {
                warn!(error = %error, "category refresh failed, keeping previous catalog");
                first_error = Some(error);
            }
        }

        match self.gateway.list_tags().await {
            Ok(fetched) => {
                let mut slot = self.tags.lock().await;
                let changed = slot.as_ref() != Some(&fetched);
                *slot = Some(fetched);
                if changed {
                    self.notify(ChangeEvent::CatalogChanged(CatalogKind::Tags));
                }
            }
            Err(error) => {
                warn!(error = %error, "tag refresh failed, keeping previous catalog");
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }

        match first_error {
            Some(error) => Err(error.into()),
            None => Ok(()),
        }
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    /// Create a post. The draft is validated locally first; the backend
    /// assigns the id and slug. Every cached list projection is
    /// invalidated so the next read includes the new post.
    pub async fn create_post(&self, draft: &PostDraft) -> BylineResult<Post> {
        draft.validate()?;
        self.evict_idle().await;
        let created = self.gateway.create_post(draft).await?;
        self.cache.invalidate_prefix(keys::POSTS_PREFIX).await;
        self.notify(ChangeEvent::PostsChanged);
        Ok(created)
    }

    /// Replace the editable fields of `slug`. On success the detail key
    /// and every list projection are invalidated; stale list copies are
    /// never patched in place. A rejected update leaves the cache
    /// untouched.
    pub async fn update_post(&self, slug: &str, draft: &PostDraft) -> BylineResult<Post> {
        draft.validate()?;
        let guard = self.begin_mutation(slug)?;
        self.evict_idle().await;

        let updated = self.gateway.update_post(slug, draft).await?;
        self.cache.invalidate(&keys::post_detail(slug)).await;
        self.cache.invalidate_prefix(keys::POSTS_PREFIX).await;
        self.notify(ChangeEvent::PostChanged {
            slug: slug.to_string(),
        });
        guard.fulfilled();
        Ok(updated)
    }

    /// Delete `slug` in two phases. Phase one hides the post from every
    /// cached projection before the request leaves. Phase two either
    /// commits the removal or restores all hidden entries, reporting
    /// which in the returned [`DeleteOutcome`].
    ///
    /// Fails without side effects only when another mutation against
    /// the same slug is still pending.
    pub async fn delete_post(&self, slug: &str) -> BylineResult<DeleteOutcome> {
        let guard = self.begin_mutation(slug)?;
        self.evict_idle().await;

        let snapshot = self.cache.snapshot_prefix(keys::POSTS_PREFIX).await;
        let target = slug.to_string();
        self.cache
            .edit_ready::<Vec<Post>, _>(keys::POSTS_PREFIX, |posts| {
                let before = posts.len();
                posts.retain(|p| p.slug != target);
                posts.len() != before
            })
            .await;
        self.cache.invalidate(&keys::post_detail(slug)).await;
        self.notify(ChangeEvent::PostRemoved {
            slug: slug.to_string(),
        });

        match self.gateway.delete_post(slug).await {
            Ok(()) => {
                self.cache.invalidate_prefix(keys::POSTS_PREFIX).await;
                guard.fulfilled();
                Ok(DeleteOutcome::Committed)
            }
            Err(error) => {
                self.cache.restore(snapshot).await;
                self.notify(ChangeEvent::PostChanged {
                    slug: slug.to_string(),
                });
                warn!(slug, error = %error, "delete rejected, cached projections restored");
                Ok(DeleteOutcome::RolledBack { error })
            }
        }
    }

    /// Toggle the viewer's like on `slug`. The wire addresses likes by
    /// numeric id, resolved through the cached detail read. Refreshes
    /// the detail key and every list projection, since all of them
    /// carry the counter and the viewer flag.
    pub async fn toggle_like(&self, slug: &str) -> BylineResult<LikeOutcome> {
        let post = self.post(slug).await?;
        let outcome = self.gateway.toggle_like(post.id).await?;
        self.cache.invalidate(&keys::post_detail(slug)).await;
        self.cache.invalidate_prefix(keys::POSTS_PREFIX).await;
        self.notify(ChangeEvent::PostChanged {
            slug: slug.to_string(),
        });
        Ok(outcome)
    }

    /// Toggle the viewer's bookmark on `slug`. Refreshes the detail key
    /// and every list projection: the bookmark list changes membership
    /// and the others carry the viewer flag.
    pub async fn toggle_bookmark(&self, slug: &str) -> BylineResult<BookmarkOutcome> {
        let post = self.post(slug).await?;
        let outcome = self.gateway.toggle_bookmark(post.id).await?;
        self.cache.invalidate(&keys::post_detail(slug)).await;
        self.cache.invalidate_prefix(keys::POSTS_PREFIX).await;
        self.notify(ChangeEvent::PostChanged {
            slug: slug.to_string(),
        });
        Ok(outcome)
    }

    // ========================================================================
    // THEME AND SESSION
    // ========================================================================

    /// Current theme preference.
    pub fn theme(&self) -> ThemeMode {
        self.lock_session().theme
    }

    /// Flip the theme and persist it. Never fails: persistence trouble
    /// is logged and the in-memory preference still changes.
    pub fn toggle_theme(&self) -> ThemeMode {
        let next = {
            let mut session = self.lock_session();
            session.theme = session.theme.toggled();
            session.theme
        };
        if let Some(path) = &self.theme_path {
            if let Err(error) = persistence::save(path, &PersistedPreferences { theme: next }) {
                warn!(
                    error = %error,
                    path = %path.display(),
                    "failed to persist theme preference"
                );
            }
        }
        self.notify(ChangeEvent::ThemeChanged(next));
        next
    }

    pub fn set_session_user(&self, user: Option<Author>) {
        self.lock_session().user = user;
    }

    pub fn session_user(&self) -> Option<Author> {
        self.lock_session().user.clone()
    }

    /// Whether edit and delete affordances should be offered for
    /// `post`. Advisory only; the backend independently enforces
    /// authorship.
    pub fn can_modify(&self, post: &Post) -> bool {
        self.lock_session()
            .user
            .as_ref()
            .is_some_and(|user| user.id == post.author.id)
    }

    // ========================================================================
    // MUTATION TRACKING
    // ========================================================================

    /// Lifecycle of the most recent mutation against `slug`. `Idle`
    /// when none has run this session.
    pub fn mutation_phase(&self, slug: &str) -> MutationPhase {
        self.lock_session()
            .mutations
            .get(slug)
            .copied()
            .unwrap_or_default()
    }

    /// True while a mutation against `slug` is in flight. Pages disable
    /// the triggering control on this.
    pub fn is_mutation_pending(&self, slug: &str) -> bool {
        self.mutation_phase(slug) == MutationPhase::Pending
    }

    fn begin_mutation(&self, slug: &str) -> Result<MutationGuard<'_>, StoreError> {
        let mut session = self.lock_session();
        if session.mutations.get(slug) == Some(&MutationPhase::Pending) {
            return Err(StoreError::MutationPending {
                slug: slug.to_string(),
            });
        }
        session
            .mutations
            .insert(slug.to_string(), MutationPhase::Pending);
        Ok(MutationGuard {
            session: &self.session,
            slug: slug.to_string(),
            outcome: MutationPhase::Rejected,
        })
    }

    // ========================================================================
    // SUBSCRIPTIONS AND LIFECYCLE
    // ========================================================================

    /// Register interest in a slice of the store. Events that arrive
    /// between polls are buffered up to the channel backlog.
    pub fn subscribe(&self, interest: Interest) -> Subscription {
        let subscription = Subscription::new(interest, self.events.subscribe());
        debug!(
            subscriber = %subscription.id(),
            interest = ?subscription.interest(),
            "observer subscribed"
        );
        subscription
    }

    /// Drop all session state: cache entries, catalogs, session user,
    /// mutation history. The persisted theme survives. In-flight loads
    /// are abandoned rather than allowed to repopulate the next
    /// session's cache.
    pub async fn reset(&self) {
        self.cache.reset().await;
        self.categories.lock().await.take();
        self.tags.lock().await.take();
        {
            let mut session = self.lock_session();
            session.user = None;
            session.mutations.clear();
        }
        self.notify(ChangeEvent::PostsChanged);
        self.notify(ChangeEvent::CatalogChanged(CatalogKind::Categories));
        self.notify(ChangeEvent::CatalogChanged(CatalogKind::Tags));
    }

    /// Cache observability counters.
    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    fn notify(&self, event: ChangeEvent) {
        debug!(
            event = event.event_type(),
            receivers = self.events.receiver_count(),
            "store change"
        );
        let _ = self.events.send(event);
    }

    /// Opportunistic cache maintenance, run at mutation entry.
    async fn evict_idle(&self) {
        let dropped = self.cache.evict(self.evict_age).await;
        if dropped > 0 {
            debug!(dropped, "evicted idle cache entries");
        }
    }

    fn lock_session(&self) -> std::sync::MutexGuard<'_, SessionState> {
        match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Marks the slug's mutation `Pending` on creation and writes the final
/// phase on drop, so every exit path lands in a terminal state.
struct MutationGuard<'a> {
    session: &'a Mutex<SessionState>,
    slug: String,
    outcome: MutationPhase,
}

impl MutationGuard<'_> {
    fn fulfilled(mut self) {
        self.outcome = MutationPhase::Fulfilled;
    }
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        let mut session = match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        session.mutations.insert(self.slug.clone(), self.outcome);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use byline_core::BylineError;
    use byline_test_utils::{assertions, fixtures, MockGateway};

    fn fresh_store() -> ContentStore<MockGateway> {
        ContentStore::new(MockGateway::new(), CacheConfig::new())
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_posts_read_through_the_cache() {
        let store = fresh_store();
        store.gateway().seed_post(&fixtures::sample_draft("First"));
        store.gateway().seed_post(&fixtures::sample_draft("Second"));

        let first = store.posts(&PostFilter::default()).await.unwrap();
        let second = store.posts(&PostFilter::default()).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
        assert_eq!(store.gateway().calls("list_posts"), 1);
    }

    #[tokio::test]
    async fn test_distinct_filters_are_distinct_cache_entries() {
        let store = fresh_store();
        let mut draft = fixtures::sample_draft("Tagged");
        draft.tags = vec!["rust".to_string()];
        store.gateway().seed_post(&draft);

        store.posts(&PostFilter::default()).await.unwrap();
        let filter = PostFilter {
            tag: Some("rust".to_string()),
            ..PostFilter::default()
        };
        let filtered = store.posts(&filter).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(store.gateway().calls("list_posts"), 2);
    }

    #[tokio::test]
    async fn test_create_invalidates_every_list_projection() {
        let store = fresh_store();
        store.gateway().seed_post(&fixtures::sample_draft("Existing"));

        store.posts(&PostFilter::default()).await.unwrap();
        store.my_posts().await.unwrap();
        store.bookmarked_posts().await.unwrap();

        let created = store
            .create_post(&fixtures::sample_draft("Brand New"))
            .await
            .unwrap();
        assert_eq!(created.slug, "brand-new");

        let listed = store.posts(&PostFilter::default()).await.unwrap();
        assert!(listed.iter().any(|p| p.slug == "brand-new"));
        assert_eq!(store.gateway().calls("list_posts"), 2);

        store.my_posts().await.unwrap();
        store.bookmarked_posts().await.unwrap();
        assert_eq!(store.gateway().calls("list_my_posts"), 2);
        assert_eq!(store.gateway().calls("list_bookmarked_posts"), 2);
    }

    #[tokio::test]
    async fn test_create_leaves_detail_entries_cached() {
        let store = fresh_store();
        let seeded = store.gateway().seed_post(&fixtures::sample_draft("Keeper"));

        store.post(&seeded.slug).await.unwrap();
        store.create_post(&fixtures::sample_draft("Another")).await.unwrap();
        store.post(&seeded.slug).await.unwrap();

        assert_eq!(store.gateway().calls("get_post"), 1);
    }

    #[tokio::test]
    async fn test_create_rejects_blank_drafts_locally() {
        let store = fresh_store();
        let result = store.create_post(&PostDraft::new("  ", "body")).await;
        assertions::assert_validation_on(&result, "title");
        assert_eq!(store.gateway().calls("create_post"), 0);
    }

    #[tokio::test]
    async fn test_create_allows_tags_missing_from_the_catalog() {
        let store = fresh_store();
        store.gateway().seed_tag("react");
        store.gateway().seed_tag("guides");

        let mut draft = fixtures::sample_draft("Fresh Topics");
        draft.tags = vec!["react".to_string(), "newtopic".to_string()];
        let created = store.create_post(&draft).await.unwrap();

        assert!(created.tag_names().contains("newtopic"));
        assert!(created.tag_names().contains("react"));
    }

    #[tokio::test]
    async fn test_create_then_read_roundtrips_the_draft() {
        let store = fresh_store();
        let mut draft = fixtures::sample_draft("Roundtrip");
        draft.tags = vec!["b".to_string(), "a".to_string()];

        let created = store.create_post(&draft).await.unwrap();
        let read = store.post(&created.slug).await.unwrap();

        assert_eq!(read.title, draft.title);
        assert_eq!(read.content, draft.content);
        let expected: std::collections::BTreeSet<&str> =
            draft.tags.iter().map(|t| t.as_str()).collect();
        assert_eq!(read.tag_names(), expected);
    }

    #[tokio::test]
    async fn test_update_refreshes_detail_and_lists() {
        let store = fresh_store();
        let seeded = store.gateway().seed_post(&fixtures::sample_draft("Original"));
        store.post(&seeded.slug).await.unwrap();
        store.posts(&PostFilter::default()).await.unwrap();

        let mut draft = fixtures::sample_draft("Original");
        draft.content = "<p>Edited.</p>".to_string();
        store.update_post(&seeded.slug, &draft).await.unwrap();

        let read = store.post(&seeded.slug).await.unwrap();
        assert_eq!(read.content, "<p>Edited.</p>");
        assert_eq!(store.gateway().calls("get_post"), 2);

        store.posts(&PostFilter::default()).await.unwrap();
        assert_eq!(store.gateway().calls("list_posts"), 2);
        assert_eq!(store.mutation_phase(&seeded.slug), MutationPhase::Fulfilled);
    }

    #[tokio::test]
    async fn test_update_of_missing_slug_leaves_lists_cached() {
        let store = fresh_store();
        store.gateway().seed_post(&fixtures::sample_draft("Still Here"));
        store.posts(&PostFilter::default()).await.unwrap();

        let result = store
            .update_post("missing-slug", &fixtures::sample_draft("Whatever"))
            .await;
        assertions::assert_not_found(&result);

        store.posts(&PostFilter::default()).await.unwrap();
        assert_eq!(store.gateway().calls("list_posts"), 1);
        assert_eq!(store.mutation_phase("missing-slug"), MutationPhase::Rejected);
    }

    #[tokio::test]
    async fn test_concurrent_mutations_on_one_slug_are_rejected() {
        let store = Arc::new(fresh_store());
        let seeded = store.gateway().seed_post(&fixtures::sample_draft("Busy"));
        let gate = store.gateway().gate("update_post");

        let task = {
            let store = Arc::clone(&store);
            let slug = seeded.slug.clone();
            tokio::spawn(async move {
                store
                    .update_post(&slug, &fixtures::sample_draft("Busy"))
                    .await
            })
        };
        settle().await;
        assert!(store.is_mutation_pending(&seeded.slug));

        let second = store
            .update_post(&seeded.slug, &fixtures::sample_draft("Busy"))
            .await;
        assertions::assert_mutation_pending(&second, &seeded.slug);

        let delete_too = store.delete_post(&seeded.slug).await;
        assertions::assert_mutation_pending(&delete_too, &seeded.slug);

        gate.notify_one();
        task.await.unwrap().unwrap();
        assert!(!store.is_mutation_pending(&seeded.slug));

        // Terminal phases do not block the next mutation.
        store.gateway().gate("update_post").notify_one();
        store
            .update_post(&seeded.slug, &fixtures::sample_draft("Busy"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_mutations_on_different_slugs_are_independent() {
        let store = fresh_store();
        store.gateway().seed_post(&fixtures::sample_draft("Alpha"));
        store.gateway().seed_post(&fixtures::sample_draft("Beta"));

        store
            .update_post("alpha", &fixtures::sample_draft("Alpha"))
            .await
            .unwrap();
        store
            .update_post("beta", &fixtures::sample_draft("Beta"))
            .await
            .unwrap();
        assert_eq!(store.mutation_phase("alpha"), MutationPhase::Fulfilled);
        assert_eq!(store.mutation_phase("beta"), MutationPhase::Fulfilled);
    }

    #[tokio::test]
    async fn test_delete_hides_post_before_the_backend_confirms() {
        let store = Arc::new(fresh_store());
        store.gateway().seed_post(&fixtures::sample_draft("Keep Me"));
        let doomed = store.gateway().seed_post(&fixtures::sample_draft("Doomed"));

        store.posts(&PostFilter::default()).await.unwrap();
        store.my_posts().await.unwrap();
        assert_eq!(store.gateway().calls("list_posts"), 1);

        let gate = store.gateway().gate("delete_post");
        let task = {
            let store = Arc::clone(&store);
            let slug = doomed.slug.clone();
            tokio::spawn(async move { store.delete_post(&slug).await })
        };
        settle().await;

        // Optimistic window: served from the edited cache, no refetch.
        let listed = store.posts(&PostFilter::default()).await.unwrap();
        assert!(listed.iter().all(|p| p.slug != doomed.slug));
        let mine = store.my_posts().await.unwrap();
        assert!(mine.iter().all(|p| p.slug != doomed.slug));
        assert_eq!(store.gateway().calls("list_posts"), 1);
        assert_eq!(store.gateway().calls("list_my_posts"), 1);
        assert!(store.is_mutation_pending(&doomed.slug));

        gate.notify_one();
        let outcome = task.await.unwrap().unwrap();
        assert!(matches!(outcome, DeleteOutcome::Committed));
        assert_eq!(store.mutation_phase(&doomed.slug), MutationPhase::Fulfilled);

        // Committed: projections refetch and the backend agrees.
        let after = store.posts(&PostFilter::default()).await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(store.gateway().calls("list_posts"), 2);
        assert!(store.gateway().stored_post(&doomed.slug).is_none());
    }

    #[tokio::test]
    async fn test_failed_delete_restores_hidden_entries() {
        let store = fresh_store();
        let doomed = store.gateway().seed_post(&fixtures::sample_draft("Survivor"));
        store.posts(&PostFilter::default()).await.unwrap();

        store.gateway().fail_next(
            "delete_post",
            GatewayError::Server {
                status: 500,
                message: "backend exploded".to_string(),
            },
        );
        let outcome = store.delete_post(&doomed.slug).await.unwrap();
        let DeleteOutcome::RolledBack { error } = outcome else {
            panic!("expected a rollback");
        };
        assert!(matches!(error, GatewayError::Server { status: 500, .. }));

        // Restored without a refetch; the post is visible again.
        let listed = store.posts(&PostFilter::default()).await.unwrap();
        assert!(listed.iter().any(|p| p.slug == doomed.slug));
        assert_eq!(store.gateway().calls("list_posts"), 1);
        assert_eq!(store.mutation_phase(&doomed.slug), MutationPhase::Rejected);

        // The detail read refetches and still finds the post remote.
        let read = store.post(&doomed.slug).await.unwrap();
        assert_eq!(read.slug, doomed.slug);
    }

    #[tokio::test]
    async fn test_toggle_like_resolves_id_and_refreshes_detail() {
        let store = fresh_store();
        let seeded = store.gateway().seed_post(&fixtures::sample_draft("Likeable"));

        let outcome = store.toggle_like(&seeded.slug).await.unwrap();
        assert!(outcome.liked);
        assert_eq!(outcome.likes_count, 1);
        assert_eq!(store.gateway().calls("get_post"), 1);

        let read = store.post(&seeded.slug).await.unwrap();
        assert!(read.is_liked);
        assert_eq!(store.gateway().calls("get_post"), 2);
    }

    #[tokio::test]
    async fn test_toggle_like_refreshes_list_projections() {
        let store = fresh_store();
        let seeded = store.gateway().seed_post(&fixtures::sample_draft("Counted"));

        let before = store.posts(&PostFilter::default()).await.unwrap();
        assert_eq!(before[0].likes_count, 0);

        store.toggle_like(&seeded.slug).await.unwrap();

        // The listed copy carries the fresh counter, not the cached one.
        let after = store.posts(&PostFilter::default()).await.unwrap();
        assert_eq!(store.gateway().calls("list_posts"), 2);
        assert!(after[0].is_liked);
        assert_eq!(after[0].likes_count, 1);
    }

    #[tokio::test]
    async fn test_toggle_bookmark_refreshes_the_bookmark_list() {
        let store = fresh_store();
        let seeded = store.gateway().seed_post(&fixtures::sample_draft("Saved"));

        let empty = store.bookmarked_posts().await.unwrap();
        assert!(empty.is_empty());
        store.posts(&PostFilter::default()).await.unwrap();

        let outcome = store.toggle_bookmark(&seeded.slug).await.unwrap();
        assert!(outcome.bookmarked);

        let bookmarked = store.bookmarked_posts().await.unwrap();
        assert_eq!(bookmarked.len(), 1);
        assert_eq!(store.gateway().calls("list_bookmarked_posts"), 2);

        // The viewer flag shows up in the general projection too.
        let listed = store.posts(&PostFilter::default()).await.unwrap();
        assert!(listed[0].is_bookmarked);
        assert_eq!(store.gateway().calls("list_posts"), 2);
    }

    #[tokio::test]
    async fn test_catalogs_fetch_once_per_session() {
        let store = fresh_store();
        store.gateway().seed_category("Engineering");
        store.gateway().seed_tag("rust");

        for _ in 0..3 {
            assert_eq!(store.categories().await.unwrap().len(), 1);
            assert_eq!(store.tags().await.unwrap().len(), 1);
        }
        assert_eq!(store.gateway().calls("list_categories"), 1);
        assert_eq!(store.gateway().calls("list_tags"), 1);
    }

    #[tokio::test]
    async fn test_failed_catalog_refresh_keeps_the_stale_copy() {
        let store = fresh_store();
        store.gateway().seed_category("Engineering");
        store.categories().await.unwrap();

        store.gateway().seed_category("Design");
        store.gateway().fail_next(
            "list_categories",
            GatewayError::Network {
                message: "offline".to_string(),
            },
        );
        let result = store.refresh_catalogs().await;
        assert!(matches!(
            result,
            Err(BylineError::Gateway(GatewayError::Network { .. }))
        ));

        // Stale-but-present beats empty.
        assert_eq!(store.categories().await.unwrap().len(), 1);

        store.refresh_catalogs().await.unwrap();
        assert_eq!(store.categories().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_catalog_refresh_notifies_on_change() {
        let store = fresh_store();
        store.gateway().seed_category("Engineering");
        store.categories().await.unwrap();
        let mut sub = store.subscribe(Interest::Catalogs);

        store.gateway().seed_category("Design");
        store.refresh_catalogs().await.unwrap();

        assert_eq!(
            sub.changed().await,
            Some(ChangeEvent::CatalogChanged(CatalogKind::Categories))
        );
    }

    #[test]
    fn test_theme_toggle_persists_across_store_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs").join("theme.json");

        let store = ContentStore::with_preferences(
            MockGateway::new(),
            CacheConfig::new(),
            path.clone(),
        );
        assert_eq!(store.theme(), ThemeMode::Light);
        assert_eq!(store.toggle_theme(), ThemeMode::Dark);

        let reopened =
            ContentStore::with_preferences(MockGateway::new(), CacheConfig::new(), path);
        assert_eq!(reopened.theme(), ThemeMode::Dark);
    }

    #[test]
    fn test_corrupt_preference_file_falls_back_to_light() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("theme.json");
        std::fs::write(&path, "{ definitely not json").unwrap();

        let store = ContentStore::with_preferences(
            MockGateway::new(),
            CacheConfig::new(),
            path.clone(),
        );
        assert_eq!(store.theme(), ThemeMode::Light);

        // The next toggle rewrites the file into a readable state.
        store.toggle_theme();
        let reopened =
            ContentStore::with_preferences(MockGateway::new(), CacheConfig::new(), path);
        assert_eq!(reopened.theme(), ThemeMode::Dark);
    }

    #[test]
    fn test_can_modify_is_an_advisory_ownership_check() {
        let store = ContentStore::new(MockGateway::new(), CacheConfig::new());
        let own = fixtures::published_post(1, "own-post");
        let theirs = Post {
            author: fixtures::other_author(),
            ..fixtures::published_post(2, "their-post")
        };

        assert!(!store.can_modify(&own), "no session user, no affordance");
        store.set_session_user(Some(fixtures::session_author()));
        assert!(store.can_modify(&own));
        assert!(!store.can_modify(&theirs));
    }

    #[tokio::test]
    async fn test_subscriptions_only_see_matching_events() {
        let store = fresh_store();
        let seeded = store.gateway().seed_post(&fixtures::sample_draft("Watched"));
        let mut sub = store.subscribe(Interest::Post(seeded.slug.clone()));

        store.create_post(&fixtures::sample_draft("Unrelated")).await.unwrap();
        store
            .update_post(&seeded.slug, &fixtures::sample_draft("Watched"))
            .await
            .unwrap();

        assert_eq!(
            sub.changed().await,
            Some(ChangeEvent::PostChanged {
                slug: seeded.slug.clone()
            })
        );
    }

    #[tokio::test]
    async fn test_delete_notifies_removal_then_restoration_on_failure() {
        let store = fresh_store();
        let doomed = store.gateway().seed_post(&fixtures::sample_draft("Flaky"));
        let mut sub = store.subscribe(Interest::Post(doomed.slug.clone()));

        store.gateway().fail_next(
            "delete_post",
            GatewayError::Server {
                status: 502,
                message: "bad gateway".to_string(),
            },
        );
        store.delete_post(&doomed.slug).await.unwrap();

        assert_eq!(
            sub.changed().await,
            Some(ChangeEvent::PostRemoved {
                slug: doomed.slug.clone()
            })
        );
        assert_eq!(
            sub.changed().await,
            Some(ChangeEvent::PostChanged {
                slug: doomed.slug.clone()
            })
        );
    }

    #[tokio::test]
    async fn test_reset_clears_session_state_but_keeps_theme() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("theme.json");
        let store = ContentStore::with_preferences(
            MockGateway::new(),
            CacheConfig::new(),
            path,
        );
        store.gateway().seed_post(&fixtures::sample_draft("Cached"));
        store.gateway().seed_category("Engineering");

        store.posts(&PostFilter::default()).await.unwrap();
        store.categories().await.unwrap();
        store.set_session_user(Some(fixtures::session_author()));
        store.toggle_theme();

        store.reset().await;

        assert_eq!(store.session_user(), None);
        assert_eq!(store.theme(), ThemeMode::Dark);
        store.posts(&PostFilter::default()).await.unwrap();
        store.categories().await.unwrap();
        assert_eq!(store.gateway().calls("list_posts"), 2);
        assert_eq!(store.gateway().calls("list_categories"), 2);
    }

    #[tokio::test]
    async fn test_search_is_cached_per_query_and_depth() {
        let store = fresh_store();
        store.gateway().set_search_hits(fixtures::sample_hits(5));

        let first = store.search("deploys", 3).await.unwrap();
        assert_eq!(first.total_results, 3);
        store.search("deploys", 3).await.unwrap();
        assert_eq!(store.gateway().calls("search_knowledge_base"), 1);

        store.search("deploys", 5).await.unwrap();
        assert_eq!(store.gateway().calls("search_knowledge_base"), 2);
    }

    #[tokio::test]
    async fn test_generation_stats_read_through_the_cache() {
        let store = fresh_store();
        store.gateway().set_generation_stats(fixtures::sample_stats());

        let stats = store.generation_stats().await.unwrap();
        assert_eq!(stats.total_generations, 12);
        store.generation_stats().await.unwrap();
        assert_eq!(store.gateway().calls("generation_stats"), 1);
    }

    #[tokio::test]
    async fn test_gateway_error_kinds_survive_the_store() {
        let store = fresh_store();
        store.gateway().fail_next(
            "get_post",
            GatewayError::Auth {
                status: 401,
                message: "token expired".to_string(),
            },
        );

        let result = store.post("anything").await;
        match result {
            Err(BylineError::Gateway(GatewayError::Auth { status: 401, .. })) => {}
            other => panic!("expected the auth kind to survive, got {other:?}"),
        }
    }
}
