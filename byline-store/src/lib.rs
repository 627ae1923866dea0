//! Byline Content Store
//!
//! The session-scoped layer every page talks to. One
//! [`ContentStore`] owns the request cache, the gateway handle, the
//! category and tag catalogs, the theme preference, and the
//! change-notification channel. Reads are cached and deduplicated;
//! mutations call the backend first and reconcile the cache afterwards;
//! observers subscribe to the slices they render.
//!
//! The pieces:
//! - [`store`]: the [`ContentStore`] itself and its mutation guards
//! - [`keys`]: the cache-key layout shared by reads and invalidation
//! - [`subscription`]: change events and interest filtering
//! - [`config`]: TOML configuration for gateway, cache, and theme
//! - [`persistence`]: the on-disk theme preference

pub mod config;
pub mod keys;
pub mod persistence;
pub mod store;
pub mod subscription;

pub use config::{ConfigError, StoreConfig};
pub use persistence::{PersistedPreferences, PersistenceError};
pub use store::{ContentStore, DeleteOutcome};
pub use subscription::{ChangeEvent, Interest, Subscription};
