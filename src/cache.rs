//! Typed request cache with per-key fetch deduplication.
//!
//! DESIGN
//! ======
//! One entry per `QueryKey`, each moving through
//! `Idle -> Pending -> {Resolved, Errored}`. An entry only goes back to
//! `Pending` when someone explicitly starts a fetch; eviction removes it
//! outright so the next access starts from scratch.
//!
//! Dedup is enforced in `begin_fetch`: the first caller becomes the leader and
//! owns a `FetchGuard`; everyone else gets a `FetchWaiter` subscribed to the
//! leader's `watch` channel and never issues a request of their own.
//!
//! TRADE-OFFS
//! ==========
//! Values are stored as `serde_json::Value` so unrelated namespaces can share
//! one map. Typed access goes through serde at the edges, which costs a clone
//! per read but keeps the cache ignorant of what it holds.
//!
//! The map sits behind a `std::sync::Mutex` that is never held across an
//! `.await`; writes are last-write-wins.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::types::SessionError;

/// Result of a single fetch, shared with every waiter.
pub type FetchOutcome = Result<Value, SessionError>;

// =============================================================================
// KEYS AND STATUS
// =============================================================================

/// Cache namespaces used by the session layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryKey {
    /// The signed-in user (`null` when signed out).
    User,
    /// Data that belongs to the signed-in user and must go when they do.
    Appointments,
}

impl QueryKey {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Appointments => "appointments",
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryStatus {
    /// Present (possibly seeded with initial data) but never fetched.
    Idle,
    Pending,
    Resolved,
    /// Last fetch failed; `data` still holds the previous value.
    Errored,
}

/// Point-in-time copy of one cache entry.
#[derive(Clone, Debug)]
pub struct QuerySnapshot {
    pub status: QueryStatus,
    pub data: Option<Value>,
    pub last_error: Option<SessionError>,
    pub updated_at: Option<Instant>,
    pub is_fetching: bool,
}

// =============================================================================
// ENTRIES
// =============================================================================

struct InFlight {
    fetch_id: u64,
    /// Status to restore if the leader goes away without completing.
    prior: QueryStatus,
    tx: watch::Sender<Option<FetchOutcome>>,
}

struct CacheEntry {
    status: QueryStatus,
    data: Option<Value>,
    last_error: Option<SessionError>,
    updated_at: Option<Instant>,
    inflight: Option<InFlight>,
}

impl CacheEntry {
    fn idle(data: Option<Value>) -> Self {
        Self { status: QueryStatus::Idle, data, last_error: None, updated_at: None, inflight: None }
    }

    fn snapshot(&self) -> QuerySnapshot {
        QuerySnapshot {
            status: self.status,
            data: self.data.clone(),
            last_error: self.last_error.clone(),
            updated_at: self.updated_at,
            is_fetching: self.inflight.is_some(),
        }
    }
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<QueryKey, CacheEntry>,
    next_fetch_id: u64,
}

// =============================================================================
// QUERY CACHE
// =============================================================================

/// Shared, cloneable handle to the request cache.
#[derive(Clone, Default)]
pub struct QueryCache {
    inner: Arc<Mutex<CacheInner>>,
}

impl QueryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an `Idle` entry holding `initial` unless the key already exists.
    /// Returns `true` when the entry was created.
    pub fn seed<T: Serialize>(&self, key: QueryKey, initial: &T) -> bool {
        let Some(value) = to_value(key, initial) else {
            return false;
        };
        let mut inner = self.lock();
        if inner.entries.contains_key(&key) {
            return false;
        }
        inner.entries.insert(key, CacheEntry::idle(Some(value)));
        debug!(%key, "cache entry seeded");
        true
    }

    /// Typed read of an entry's data. Absent entries, entries without data,
    /// and data that does not deserialize as `T` all read as `None`.
    #[must_use]
    pub fn get_data<T: DeserializeOwned>(&self, key: QueryKey) -> Option<T> {
        let value = self.lock().entries.get(&key)?.data.clone()?;
        match serde_json::from_value(value) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(%key, error = %e, "cached data has unexpected shape");
                None
            }
        }
    }

    /// Overwrite an entry's data and mark it `Resolved`.
    ///
    /// An in-flight fetch is left running; when it completes its result
    /// replaces this value.
    pub fn set_data<T: Serialize>(&self, key: QueryKey, value: &T) {
        let Some(value) = to_value(key, value) else {
            return;
        };
        let mut inner = self.lock();
        let entry = inner.entries.entry(key).or_insert_with(|| CacheEntry::idle(None));
        entry.data = Some(value);
        entry.status = QueryStatus::Resolved;
        entry.last_error = None;
        entry.updated_at = Some(Instant::now());
    }

    /// Evict entries. Waiters on an evicted entry's fetch see `Cancelled`,
    /// and the leader's eventual result is discarded.
    pub fn remove_queries(&self, keys: &[QueryKey]) {
        let mut inner = self.lock();
        for key in keys {
            if inner.entries.remove(key).is_some() {
                debug!(%key, "cache entry evicted");
            }
        }
    }

    #[must_use]
    pub fn contains(&self, key: QueryKey) -> bool {
        self.lock().entries.contains_key(&key)
    }

    /// Current status; absent entries report `Idle`.
    #[must_use]
    pub fn status(&self, key: QueryKey) -> QueryStatus {
        self.lock()
            .entries
            .get(&key)
            .map_or(QueryStatus::Idle, |e| e.status)
    }

    #[must_use]
    pub fn snapshot(&self, key: QueryKey) -> Option<QuerySnapshot> {
        self.lock().entries.get(&key).map(CacheEntry::snapshot)
    }

    /// Claim the right to fetch `key`, or join the fetch already running.
    #[must_use]
    pub fn begin_fetch(&self, key: QueryKey) -> FetchTicket {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let entry = inner.entries.entry(key).or_insert_with(|| CacheEntry::idle(None));

        if let Some(flight) = &entry.inflight {
            debug!(%key, fetch_id = flight.fetch_id, "joining in-flight fetch");
            return FetchTicket::Follower(FetchWaiter { rx: flight.tx.subscribe() });
        }

        let fetch_id = inner.next_fetch_id;
        inner.next_fetch_id += 1;
        let (tx, _) = watch::channel(None);
        entry.inflight = Some(InFlight { fetch_id, prior: entry.status, tx });
        entry.status = QueryStatus::Pending;
        debug!(%key, fetch_id, "fetch started");

        FetchTicket::Leader(FetchGuard { cache: self.clone(), key, fetch_id, finished: false })
    }

    /// Run `fetcher` for `key` unless a fetch is already in flight, in which
    /// case wait for that one instead.
    ///
    /// # Errors
    ///
    /// Returns the fetch error, or [`SessionError::Cancelled`] if the entry
    /// was evicted while this caller was waiting on someone else's fetch.
    pub async fn fetch<F, Fut>(&self, key: QueryKey, fetcher: F) -> FetchOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchOutcome>,
    {
        match self.begin_fetch(key) {
            FetchTicket::Follower(waiter) => waiter.wait().await,
            FetchTicket::Leader(guard) => {
                let outcome = fetcher().await;
                guard.complete(outcome.clone());
                outcome
            }
        }
    }
}

fn to_value<T: Serialize>(key: QueryKey, value: &T) -> Option<Value> {
    match serde_json::to_value(value) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(%key, error = %e, "value not representable as JSON; cache unchanged");
            None
        }
    }
}

// =============================================================================
// FETCH TICKETS
// =============================================================================

/// Outcome of [`QueryCache::begin_fetch`].
pub enum FetchTicket {
    /// This caller performs the fetch and must report back through the guard.
    Leader(FetchGuard),
    /// Another caller is already fetching; wait for its outcome.
    Follower(FetchWaiter),
}

/// Exclusive right to complete the in-flight fetch for one key.
///
/// Dropping the guard without calling [`FetchGuard::complete`] puts the entry
/// back to its previous status and cancels any waiters.
pub struct FetchGuard {
    cache: QueryCache,
    key: QueryKey,
    fetch_id: u64,
    finished: bool,
}

impl FetchGuard {
    #[must_use]
    pub fn key(&self) -> QueryKey {
        self.key
    }

    /// Record the outcome and wake waiters. Returns `false` when the entry
    /// was evicted after this fetch started, in which case nothing is stored.
    pub fn complete(mut self, outcome: FetchOutcome) -> bool {
        self.finished = true;
        let mut inner = self.cache.lock();
        let Some(entry) = inner.entries.get_mut(&self.key) else {
            debug!(key = %self.key, fetch_id = self.fetch_id, "entry evicted; fetch result discarded");
            return false;
        };
        let Some(flight) = entry.inflight.take_if(|f| f.fetch_id == self.fetch_id) else {
            debug!(key = %self.key, fetch_id = self.fetch_id, "entry replaced; fetch result discarded");
            return false;
        };

        match &outcome {
            Ok(value) => {
                entry.data = Some(value.clone());
                entry.status = QueryStatus::Resolved;
                entry.last_error = None;
            }
            Err(e) => {
                entry.status = QueryStatus::Errored;
                entry.last_error = Some(e.clone());
            }
        }
        entry.updated_at = Some(Instant::now());
        flight.tx.send_replace(Some(outcome));
        true
    }
}

impl Drop for FetchGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut inner = self.cache.lock();
        let Some(entry) = inner.entries.get_mut(&self.key) else {
            return;
        };
        if let Some(flight) = entry.inflight.take_if(|f| f.fetch_id == self.fetch_id) {
            if entry.status == QueryStatus::Pending {
                entry.status = flight.prior;
            }
            debug!(key = %self.key, fetch_id = self.fetch_id, "fetch abandoned");
        }
    }
}

/// Handle for a caller that joined someone else's fetch.
pub struct FetchWaiter {
    rx: watch::Receiver<Option<FetchOutcome>>,
}

impl FetchWaiter {
    /// Wait for the leader's outcome.
    ///
    /// # Errors
    ///
    /// Returns the leader's error, or [`SessionError::Cancelled`] if the
    /// fetch was abandoned or its entry evicted.
    pub async fn wait(mut self) -> FetchOutcome {
        match self.rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Err(SessionError::Cancelled)),
            Err(_) => Err(SessionError::Cancelled),
        }
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
