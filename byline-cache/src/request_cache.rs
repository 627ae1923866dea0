//! Single-flight request cache with freshness and supersession tracking.
//!
//! One slot per [`CacheKey`] moves between three states: `Vacant` (nothing
//! usable, the next reader becomes the loader), `Pending` (a load is in
//! flight, readers join it), and `Ready` (a value is stored, served
//! directly while fresh and stale-while-revalidate afterwards).
//!
//! Every slot carries a generation counter. Invalidation bumps it, and a
//! load only publishes its result if the generation it started under is
//! still current. A response that lost the race to an invalidation is
//! handed to the callers that were already waiting on it, but never stored.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use byline_core::{BylineError, BylineResult, CacheError, GatewayError};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};

use crate::config::CacheConfig;
use crate::key::CacheKey;
use crate::traits::{CacheStats, Cacheable};

/// What a finished load hands to the callers joined on it. Values travel
/// as JSON so one channel type serves every payload type.
type LoadOutcome = Result<Value, LoadError>;

#[derive(Debug, Clone)]
enum LoadError {
    Gateway(GatewayError),
    Codec(String),
}

/// Identity of one load attempt. `commit` publishes the result only if
/// the epoch and generation still match.
struct LoadTicket {
    key: CacheKey,
    epoch: u64,
    generation: u64,
    load_id: u64,
}

struct PendingLoad {
    load_id: u64,
    tx: broadcast::Sender<LoadOutcome>,
}

#[derive(Clone)]
struct ReadyValue {
    value: Value,
    fetched_at: DateTime<Utc>,
    /// A background revalidation is in flight; stale reads must not
    /// start another.
    refreshing: bool,
}

enum SlotState {
    /// No servable value. Retained after invalidation so the generation
    /// survives and late results are recognized as superseded.
    Vacant,
    Pending(PendingLoad),
    Ready(ReadyValue),
}

struct Slot {
    generation: u64,
    /// Loads started for this key that have not committed yet, doomed
    /// ones included. Eviction never drops a slot while this is nonzero.
    inflight: u32,
    last_read: DateTime<Utc>,
    state: SlotState,
}

impl Slot {
    fn vacant(now: DateTime<Utc>) -> Self {
        Self {
            generation: 0,
            inflight: 0,
            last_read: now,
            state: SlotState::Vacant,
        }
    }
}

struct EntryMap {
    slots: HashMap<CacheKey, Slot>,
    /// Bumped by `reset`; commits from before the reset are ignored.
    epoch: u64,
    next_load_id: u64,
}

struct CacheInner {
    entries: Mutex<EntryMap>,
    stats: std::sync::Mutex<CacheStats>,
}

/// Saved `Ready` entries taken before an optimistic edit, reinstated by
/// [`RequestCache::restore`] if the mutation they anticipated fails.
pub struct CacheSnapshot {
    entries: Vec<(CacheKey, ReadyValue)>,
}

impl CacheSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Keyed, deduplicating, stale-while-revalidate request cache.
///
/// Cloning is cheap and clones share one set of entries.
#[derive(Clone)]
pub struct RequestCache {
    inner: Arc<CacheInner>,
    config: CacheConfig,
}

/// Decision taken under the entry lock; awaits happen after it is
/// released.
enum Step {
    Serve(Value),
    Join(broadcast::Receiver<LoadOutcome>),
    Lead {
        ticket: LoadTicket,
        rx: broadcast::Receiver<LoadOutcome>,
    },
    ServeAndRefresh {
        ticket: LoadTicket,
        value: Value,
    },
}

impl RequestCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: Mutex::new(EntryMap {
                    slots: HashMap::new(),
                    epoch: 0,
                    next_load_id: 0,
                }),
                stats: std::sync::Mutex::new(CacheStats::default()),
            }),
            config,
        }
    }

    /// Read through the cache.
    ///
    /// - A fresh entry is returned without invoking `loader`.
    /// - A pending entry makes this caller wait on the in-flight load;
    ///   exactly one loader runs no matter how many callers arrive.
    /// - A stale entry is returned immediately and at most one background
    ///   refresh is started with this call's `loader`.
    /// - Otherwise `loader` runs on a spawned task (so dropping this
    ///   future does not cancel it for other joiners) and its result is
    ///   stored, unless the key was invalidated in the meantime.
    ///
    /// Loader errors reach every joined caller with their kind intact and
    /// are never cached.
    pub async fn get<T, F, Fut>(&self, key: &CacheKey, loader: F) -> BylineResult<T>
    where
        T: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>> + Send + 'static,
    {
        let now = Utc::now();
        let step = {
            let mut entries = self.inner.entries.lock().await;
            let epoch = entries.epoch;
            // Reserved up front whether or not this read starts a load;
            // ids must never repeat within an epoch.
            let load_id = entries.next_load_id;
            entries.next_load_id += 1;
            let slot = entries
                .slots
                .entry(key.clone())
                .or_insert_with(|| Slot::vacant(now));
            slot.last_read = now;

            enum Classified {
                FreshHit(Value),
                StaleServed(Value),
                StaleLead(Value),
                Join(broadcast::Receiver<LoadOutcome>),
                Lead,
            }

            let classified = match &slot.state {
                SlotState::Ready(ready)
                    if is_fresh(ready.fetched_at, now, self.config.freshness_window) =>
                {
                    Classified::FreshHit(ready.value.clone())
                }
                SlotState::Ready(ready) if ready.refreshing => {
                    Classified::StaleServed(ready.value.clone())
                }
                SlotState::Ready(ready) => Classified::StaleLead(ready.value.clone()),
                SlotState::Pending(pending) => Classified::Join(pending.tx.subscribe()),
                SlotState::Vacant => Classified::Lead,
            };

            match classified {
                Classified::FreshHit(value) | Classified::StaleServed(value) => {
                    self.inner.bump(|s| s.hits += 1);
                    Step::Serve(value)
                }
                Classified::StaleLead(value) => {
                    self.inner.bump(|s| {
                        s.hits += 1;
                        s.revalidations += 1;
                    });
                    if let SlotState::Ready(ready) = &mut slot.state {
                        ready.refreshing = true;
                    }
                    slot.inflight += 1;
                    let ticket = LoadTicket {
                        key: key.clone(),
                        epoch,
                        generation: slot.generation,
                        load_id,
                    };
                    Step::ServeAndRefresh { ticket, value }
                }
                Classified::Join(rx) => {
                    self.inner.bump(|s| s.joins += 1);
                    Step::Join(rx)
                }
                Classified::Lead => {
                    self.inner.bump(|s| s.misses += 1);
                    let (tx, rx) = broadcast::channel(1);
                    slot.inflight += 1;
                    slot.state = SlotState::Pending(PendingLoad { load_id, tx });
                    let ticket = LoadTicket {
                        key: key.clone(),
                        epoch,
                        generation: slot.generation,
                        load_id,
                    };
                    Step::Lead { ticket, rx }
                }
            }
        };

        match step {
            Step::Serve(value) => decode(key, value),
            Step::Join(rx) => await_outcome(key, rx).await,
            Step::Lead { ticket, rx } => {
                self.spawn_load(ticket, loader);
                await_outcome(key, rx).await
            }
            Step::ServeAndRefresh { ticket, value } => {
                self.spawn_load(ticket, loader);
                decode(key, value)
            }
        }
    }

    /// Mark one entry stale.
    ///
    /// The next `get` for the key re-fetches even inside the freshness
    /// window, and a load already in flight is discarded when it lands
    /// (its joined callers still receive the value they asked for).
    /// Returns whether an entry existed.
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        let mut entries = self.inner.entries.lock().await;
        match entries.slots.get_mut(key) {
            Some(slot) => {
                invalidate_slot(slot);
                tracing::debug!(key = %key, "cache entry invalidated");
                true
            }
            None => false,
        }
    }

    /// Invalidate every entry whose key matches `prefix` (segment-aware,
    /// see [`CacheKey::has_prefix`]). Returns how many matched.
    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.inner.entries.lock().await;
        let mut matched = 0;
        for (key, slot) in entries.slots.iter_mut() {
            if key.has_prefix(prefix) {
                invalidate_slot(slot);
                matched += 1;
            }
        }
        if matched > 0 {
            tracing::debug!(prefix, matched, "cache prefix invalidated");
        }
        matched
    }

    /// Drop entries that have not been read for longer than `max_age`.
    ///
    /// Entries with an in-flight load are always kept, pending joiners
    /// and doomed stragglers alike. Returns how many entries were
    /// dropped.
    pub async fn evict(&self, max_age: Duration) -> usize {
        let now = Utc::now();
        let mut entries = self.inner.entries.lock().await;
        let before = entries.slots.len();
        entries
            .slots
            .retain(|_, slot| slot.inflight > 0 || !older_than(slot.last_read, now, max_age));
        let evicted = before - entries.slots.len();
        drop(entries);
        if evicted > 0 {
            self.inner.bump(|s| s.evictions += evicted as u64);
            tracing::debug!(evicted, "idle cache entries evicted");
        }
        evicted
    }

    /// Clone the `Ready` entries under `prefix`, to be reinstated by
    /// [`RequestCache::restore`] if an optimistic mutation fails.
    pub async fn snapshot_prefix(&self, prefix: &str) -> CacheSnapshot {
        let entries = self.inner.entries.lock().await;
        let snapshot = entries
            .slots
            .iter()
            .filter(|(key, _)| key.has_prefix(prefix))
            .filter_map(|(key, slot)| match &slot.state {
                SlotState::Ready(ready) => Some((key.clone(), ready.clone())),
                _ => None,
            })
            .collect();
        CacheSnapshot { entries: snapshot }
    }

    /// Apply an in-place edit to every decodable `Ready` entry under
    /// `prefix`. The edit closure returns whether it changed the value;
    /// changed entries keep their fetch time but supersede any load in
    /// flight, so a racing refresh cannot clobber the edit. Returns how
    /// many entries changed.
    pub async fn edit_ready<T, F>(&self, prefix: &str, mut edit: F) -> usize
    where
        T: Cacheable,
        F: FnMut(&mut T) -> bool,
    {
        let mut entries = self.inner.entries.lock().await;
        let mut touched = 0;
        for (key, slot) in entries.slots.iter_mut() {
            if !key.has_prefix(prefix) {
                continue;
            }
            let SlotState::Ready(ready) = &mut slot.state else {
                continue;
            };
            let Ok(mut decoded) = serde_json::from_value::<T>(ready.value.clone()) else {
                // A different payload type lives under this prefix.
                continue;
            };
            if !edit(&mut decoded) {
                continue;
            }
            match serde_json::to_value(&decoded) {
                Ok(value) => {
                    ready.value = value;
                    slot.generation += 1;
                    touched += 1;
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "dropping unencodable cache edit");
                }
            }
        }
        touched
    }

    /// Reinstate snapshotted entries, superseding whatever landed since.
    ///
    /// A key that has a load in flight only gets its generation bumped,
    /// which discards the in-flight result and makes the next read
    /// re-fetch, so no joiner's channel is ever torn down.
    pub async fn restore(&self, snapshot: CacheSnapshot) {
        let now = Utc::now();
        let mut entries = self.inner.entries.lock().await;
        for (key, ready) in snapshot.entries {
            let slot = entries
                .slots
                .entry(key)
                .or_insert_with(|| Slot::vacant(now));
            slot.generation += 1;
            if !matches!(slot.state, SlotState::Pending(_)) {
                slot.state = SlotState::Ready(ready);
                slot.last_read = now;
            }
        }
    }

    /// Drop every entry and start a new epoch. Loads still in flight are
    /// abandoned: their callers receive [`CacheError::Abandoned`] and
    /// nothing is stored. Intended for tests and full client resets.
    pub async fn reset(&self) {
        let mut entries = self.inner.entries.lock().await;
        entries.epoch += 1;
        entries.slots.clear();
        drop(entries);
        self.inner.bump(|s| *s = CacheStats::default());
        tracing::debug!("request cache reset");
    }

    /// Usage counters since construction or the last reset.
    pub async fn stats(&self) -> CacheStats {
        match self.inner.stats.lock() {
            Ok(stats) => stats.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of slots currently held, pending and vacant included.
    pub async fn len(&self) -> usize {
        self.inner.entries.lock().await.slots.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn spawn_load<T, F, Fut>(&self, ticket: LoadTicket, loader: F)
    where
        T: Cacheable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let fut = loader();
        tokio::spawn(async move {
            let outcome = match fut.await {
                Ok(value) => match serde_json::to_value(&value) {
                    Ok(encoded) => Ok(encoded),
                    Err(e) => Err(LoadError::Codec(e.to_string())),
                },
                Err(e) => Err(LoadError::Gateway(e)),
            };
            inner.commit(ticket, outcome).await;
        });
    }
}

impl CacheInner {
    /// Publish a finished load: store the value if the ticket is still
    /// current, notify joined callers either way.
    async fn commit(&self, ticket: LoadTicket, outcome: LoadOutcome) {
        let tx = {
            let mut entries = self.entries.lock().await;
            if entries.epoch != ticket.epoch {
                // The cache was reset; the channel died with the old map.
                return;
            }
            let Some(slot) = entries.slots.get_mut(&ticket.key) else {
                return;
            };
            slot.inflight = slot.inflight.saturating_sub(1);
            let current = slot.generation == ticket.generation;

            let prior = std::mem::replace(&mut slot.state, SlotState::Vacant);
            let tx = match prior {
                SlotState::Pending(pending) if pending.load_id == ticket.load_id => {
                    Some(pending.tx)
                }
                other => {
                    slot.state = other;
                    None
                }
            };

            if current {
                match &outcome {
                    Ok(value) => {
                        slot.state = SlotState::Ready(ReadyValue {
                            value: value.clone(),
                            fetched_at: Utc::now(),
                            refreshing: false,
                        });
                    }
                    Err(_) => {
                        if tx.is_none() {
                            // Failed background refresh: keep serving the
                            // stale value, allow the next stale read to
                            // try again.
                            if let SlotState::Ready(ready) = &mut slot.state {
                                ready.refreshing = false;
                            }
                        }
                        // A failed leading load leaves the slot vacant so
                        // the next read retries.
                    }
                }
            } else {
                self.bump(|s| s.discarded += 1);
                tracing::debug!(key = %ticket.key, "discarding superseded load result");
            }
            tx
        };

        if let Some(tx) = tx {
            // Joined callers get the value they asked for even when the
            // cache refused to store it. No receivers is fine.
            let _ = tx.send(outcome);
        }
    }

    fn bump(&self, f: impl FnOnce(&mut CacheStats)) {
        match self.stats.lock() {
            Ok(mut stats) => f(&mut stats),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

fn invalidate_slot(slot: &mut Slot) {
    slot.generation += 1;
    // Pending slots keep their channel so joiners still hear the result;
    // the generation bump alone prevents it from being stored.
    if matches!(slot.state, SlotState::Ready(_)) {
        slot.state = SlotState::Vacant;
    }
}

fn decode<T: Cacheable>(key: &CacheKey, value: Value) -> BylineResult<T> {
    serde_json::from_value(value).map_err(|e| {
        BylineError::Cache(CacheError::Codec {
            key: key.to_string(),
            message: e.to_string(),
        })
    })
}

async fn await_outcome<T: Cacheable>(
    key: &CacheKey,
    mut rx: broadcast::Receiver<LoadOutcome>,
) -> BylineResult<T> {
    match rx.recv().await {
        Ok(Ok(value)) => decode(key, value),
        Ok(Err(LoadError::Gateway(e))) => Err(BylineError::Gateway(e)),
        Ok(Err(LoadError::Codec(message))) => Err(BylineError::Cache(CacheError::Codec {
            key: key.to_string(),
            message,
        })),
        Err(_) => Err(BylineError::Cache(CacheError::Abandoned {
            key: key.to_string(),
        })),
    }
}

fn is_fresh(fetched_at: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    match (now - fetched_at).to_std() {
        Ok(age) => age <= window,
        // A fetch timestamp ahead of the clock means the clock moved;
        // treat the entry as fresh rather than refetching in a loop.
        Err(_) => true,
    }
}

fn older_than(last_read: DateTime<Utc>, now: DateTime<Utc>, max_age: Duration) -> bool {
    match (now - last_read).to_std() {
        Ok(age) => age > max_age,
        Err(_) => false,
    }
}
