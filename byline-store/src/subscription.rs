//! Change notifications for store observers.
//!
//! The store broadcasts every change on one channel; each subscription
//! filters on the receiver side against its declared interest. A slow
//! observer can lag and lose events, but it never blocks the store or
//! another observer.

use byline_core::{new_subscriber_id, CatalogKind, SubscriberId, ThemeMode};
use tokio::sync::broadcast;
use tracing::warn;

/// What changed, carried on the broadcast channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// One or more list projections were invalidated or edited.
    PostsChanged,
    /// A single post changed in place.
    PostChanged { slug: String },
    /// A post is gone from listings and detail alike. Sent when the
    /// optimistic removal is applied, before the backend confirms.
    PostRemoved { slug: String },
    CatalogChanged(CatalogKind),
    ThemeChanged(ThemeMode),
}

impl ChangeEvent {
    /// Stable name for log lines.
    pub fn event_type(&self) -> &'static str {
        match self {
            ChangeEvent::PostsChanged => "posts_changed",
            ChangeEvent::PostChanged { .. } => "post_changed",
            ChangeEvent::PostRemoved { .. } => "post_removed",
            ChangeEvent::CatalogChanged(_) => "catalog_changed",
            ChangeEvent::ThemeChanged(_) => "theme_changed",
        }
    }
}

/// What a subscriber wants to hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interest {
    /// Anything that can alter which posts appear in a listing, or how
    /// a listed post renders.
    Posts,
    /// One post by slug, its removal included.
    Post(String),
    /// Category and tag catalogs.
    Catalogs,
    Theme,
    Everything,
}

impl Interest {
    /// Receiver-side filter applied by [`Subscription::changed`].
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        match self {
            Interest::Everything => true,
            Interest::Posts => matches!(
                event,
                ChangeEvent::PostsChanged
                    | ChangeEvent::PostChanged { .. }
                    | ChangeEvent::PostRemoved { .. }
            ),
            Interest::Post(slug) => match event {
                ChangeEvent::PostChanged { slug: changed } => changed == slug,
                ChangeEvent::PostRemoved { slug: removed } => removed == slug,
                _ => false,
            },
            Interest::Catalogs => matches!(event, ChangeEvent::CatalogChanged(_)),
            Interest::Theme => matches!(event, ChangeEvent::ThemeChanged(_)),
        }
    }
}

/// One observer's receiving end.
///
/// # Example
///
/// ```ignore
/// let mut sub = store.subscribe(Interest::Post("launch-week".into()));
/// while let Some(event) = sub.changed().await {
///     redraw(&event);
/// }
/// ```
pub struct Subscription {
    id: SubscriberId,
    interest: Interest,
    rx: broadcast::Receiver<ChangeEvent>,
}

impl Subscription {
    pub(crate) fn new(interest: Interest, rx: broadcast::Receiver<ChangeEvent>) -> Self {
        Self {
            id: new_subscriber_id(),
            interest,
            rx,
        }
    }

    /// Identifier assigned at creation, carried in log lines.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn interest(&self) -> &Interest {
        &self.interest
    }

    /// Next event matching this subscription's interest. `None` once
    /// the store is gone.
    ///
    /// Falling behind the channel capacity drops the oldest events; the
    /// gap is logged and skipped, not treated as fatal.
    pub async fn changed(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.interest.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        subscriber = %self.id,
                        skipped,
                        "subscriber lagged, change events were dropped"
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_event() -> impl Strategy<Value = ChangeEvent> {
        prop_oneof![
            Just(ChangeEvent::PostsChanged),
            "[a-z]{1,8}".prop_map(|slug| ChangeEvent::PostChanged { slug }),
            "[a-z]{1,8}".prop_map(|slug| ChangeEvent::PostRemoved { slug }),
            Just(ChangeEvent::CatalogChanged(CatalogKind::Categories)),
            Just(ChangeEvent::CatalogChanged(CatalogKind::Tags)),
            Just(ChangeEvent::ThemeChanged(ThemeMode::Light)),
            Just(ChangeEvent::ThemeChanged(ThemeMode::Dark)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_everything_matches_every_event(event in arb_event()) {
            assert!(Interest::Everything.matches(&event));
        }

        #[test]
        fn prop_slug_interest_only_matches_its_own_slug(
            own in "[a-z]{1,8}",
            event in arb_event(),
        ) {
            let interest = Interest::Post(own.clone());
            let expected = match &event {
                ChangeEvent::PostChanged { slug } | ChangeEvent::PostRemoved { slug } => {
                    *slug == own
                }
                _ => false,
            };
            assert_eq!(interest.matches(&event), expected);
        }

        #[test]
        fn prop_posts_interest_ignores_catalog_and_theme(event in arb_event()) {
            if Interest::Posts.matches(&event) {
                assert!(!matches!(
                    event,
                    ChangeEvent::CatalogChanged(_) | ChangeEvent::ThemeChanged(_)
                ));
            }
        }
    }
}
