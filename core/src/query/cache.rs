//! Keyed read-through cache with in-flight de-duplication and
//! stale-while-revalidate.
//!
//! # Design
//! Entries are type-erased (`Arc<dyn Any>`) so one client serves every
//! operation; reads downcast back to the caller's type. Each entry carries a
//! generation number taken from a client-wide counter. Invalidation and
//! direct writes move an entry to a new generation, and a fetch only stores
//! its result if the entry is still on the generation the fetch started
//! under. At most one fetch per key is in flight: a reader that finds a fetch
//! from an older generation waits for it to settle and then starts the
//! refetch itself.
//!
//! Removing or clearing an entry with a fetch in flight leaves a tombstone
//! that remembers the fetch, so the next read still waits for it instead of
//! starting a second request for the same key. Entries that have not been
//! read or written for the garbage-collection window (five minutes by
//! default) are dropped on the next read of any key.
//!
//! Fetches are spawned onto the tokio runtime, so a caller that stops
//! waiting does not cancel the underlying request. The lock is a plain
//! `std::sync::Mutex` and is never held across an `.await`.

use std::any::Any;
use std::collections::{hash_map, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, trace};

use super::key::{KeyMatch, QueryKey};
use crate::error::ApiError;

type CacheValue = Arc<dyn Any + Send + Sync>;
type SharedFetch = Shared<BoxFuture<'static, Result<CacheValue, ApiError>>>;

const DEFAULT_GC_TIME: Duration = Duration::from_secs(5 * 60);

/// How long a successful result counts as fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    pub stale_time: Duration,
}

impl QueryOptions {
    pub const fn stale_after(stale_time: Duration) -> Self {
        Self { stale_time }
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::stale_after(Duration::from_secs(30))
    }
}

/// Observable state of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Fresh,
    Stale,
    Fetching,
    Error,
}

/// A failed read, together with the last value that was successfully
/// fetched for the key, if any.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct QueryError<T> {
    #[source]
    pub error: ApiError,
    pub last_known: Option<Arc<T>>,
}

impl<T> From<QueryError<T>> for ApiError {
    fn from(err: QueryError<T>) -> Self {
        err.error
    }
}

struct InFlight {
    generation: u64,
    future: SharedFetch,
}

struct Entry {
    value: Option<CacheValue>,
    fetched_at: Option<Instant>,
    error: Option<ApiError>,
    invalidated: bool,
    generation: u64,
    stale_time: Duration,
    inflight: Option<InFlight>,
    last_used: Instant,
}

impl Entry {
    fn new(generation: u64) -> Self {
        Self {
            value: None,
            fetched_at: None,
            error: None,
            invalidated: false,
            generation,
            stale_time: QueryOptions::default().stale_time,
            inflight: None,
            last_used: Instant::now(),
        }
    }

    /// An empty entry on `generation` that still tracks this entry's
    /// in-flight fetch, or `None` when nothing is in flight.
    fn tombstone(self, generation: u64) -> Option<Self> {
        let inflight = self.inflight?;
        Some(Self {
            inflight: Some(inflight),
            ..Self::new(generation)
        })
    }

    fn is_fresh(&self, now: Instant) -> bool {
        match (&self.value, self.fetched_at) {
            (Some(_), Some(at)) => !self.invalidated && now.duration_since(at) < self.stale_time,
            _ => false,
        }
    }

    fn store(&mut self, value: CacheValue, now: Instant) {
        self.value = Some(value);
        self.fetched_at = Some(now);
        self.error = None;
        self.invalidated = false;
    }
}

struct State {
    entries: HashMap<QueryKey, Entry>,
    next_generation: u64,
    gc_time: Duration,
}

impl Default for State {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            next_generation: 0,
            gc_time: DEFAULT_GC_TIME,
        }
    }
}

impl State {
    fn bump(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn entry(&mut self, key: &QueryKey) -> &mut Entry {
        match self.entries.entry(key.clone()) {
            hash_map::Entry::Occupied(slot) => slot.into_mut(),
            hash_map::Entry::Vacant(slot) => {
                self.next_generation += 1;
                slot.insert(Entry::new(self.next_generation))
            }
        }
    }

    /// Drop entries idle for longer than the GC window. Entries with a fetch
    /// in flight are kept.
    fn sweep(&mut self, now: Instant) {
        let gc_time = self.gc_time;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.inflight.is_some() || now.duration_since(entry.last_used) < gc_time);
        let dropped = before - self.entries.len();
        if dropped > 0 {
            trace!(dropped, "collected idle cache entries");
        }
    }

    /// Drop the entry for `key`, leaving a tombstone if a fetch is in flight.
    fn evict(&mut self, key: &QueryKey) {
        let Some(entry) = self.entries.remove(key) else {
            return;
        };
        let generation = self.bump();
        if let Some(tombstone) = entry.tombstone(generation) {
            self.entries.insert(key.clone(), tombstone);
        }
    }
}

/// Shared query cache. Cloning shares the same entries.
#[derive(Clone, Default)]
pub struct QueryClient {
    state: Arc<Mutex<State>>,
}

impl QueryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// A client that drops entries after `gc_time` without reads or writes.
    pub fn with_gc_time(gc_time: Duration) -> Self {
        let client = Self::default();
        client.lock().gc_time = gc_time;
        client
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Read `key`, fetching with `fetcher` when needed.
    ///
    /// A fresh entry is returned as is. A stale one is returned immediately
    /// while one background refetch starts. A missing or invalidated entry
    /// blocks until a fetch settles; concurrent callers share that fetch.
    ///
    /// `fetcher` is called at most once, while the cache lock is held, so it
    /// must only build the future and not touch this client synchronously.
    pub async fn fetch<T, F, Fut>(&self, key: QueryKey, options: QueryOptions, fetcher: F) -> Result<Arc<T>, QueryError<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let future = loop {
            let superseded = {
                let mut state = self.lock();
                let now = Instant::now();
                state.sweep(now);
                let entry = state.entry(&key);
                entry.stale_time = options.stale_time;
                entry.last_used = now;
                let generation = entry.generation;
                let fresh = entry.is_fresh(now);
                let cached = entry.value.clone().filter(|_| !entry.invalidated);
                let pending = entry.inflight.as_ref().map(|f| (f.generation, f.future.clone()));

                match (pending, cached) {
                    (Some((started, superseded)), _) if started != generation => superseded,
                    (_, Some(value)) if fresh => return ready(&key, value),
                    (Some(_), Some(value)) => return ready(&key, value),
                    (Some((_, inflight)), None) => break inflight,
                    (None, Some(value)) => {
                        debug!(key = %key, "serving stale value, revalidating in background");
                        let _ = self.start(&mut state, &key, generation, fetcher());
                        return ready(&key, value);
                    }
                    (None, None) => break self.start(&mut state, &key, generation, fetcher()),
                }
            };

            trace!(key = %key, "waiting for superseded fetch to settle");
            let _ = superseded.await;
        };

        match future.await {
            Ok(value) => ready(&key, value),
            Err(error) => Err(QueryError {
                error,
                last_known: self.peek(&key),
            }),
        }
    }

    /// Register and spawn a fetch for `key` under `generation`.
    fn start<T, Fut>(&self, state: &mut State, key: &QueryKey, generation: u64, fetch: Fut) -> SharedFetch
    where
        T: Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        debug!(key = %key, generation, "fetching");
        let shared = Arc::clone(&self.state);
        let owned_key = key.clone();

        let future = async move {
            let result = fetch.await.map(|value| Arc::new(value) as CacheValue);
            let mut state = shared.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = state.entries.get_mut(&owned_key) {
                if entry.inflight.as_ref().map(|f| f.generation) == Some(generation) {
                    entry.inflight = None;
                }
                if entry.generation == generation {
                    match &result {
                        Ok(value) => entry.store(Arc::clone(value), Instant::now()),
                        Err(error) => {
                            debug!(key = %owned_key, %error, "fetch failed");
                            entry.error = Some(error.clone());
                        }
                    }
                } else {
                    debug!(key = %owned_key, generation, "discarding superseded fetch result");
                }
            }
            result
        }
        .boxed()
        .shared();

        state.entry(key).inflight = Some(InFlight {
            generation,
            future: future.clone(),
        });
        tokio::spawn(future.clone());
        future
    }

    /// Run a mutation. On success `on_success` declares the cache effects
    /// (invalidations, direct writes). Mutations are never de-duplicated.
    pub async fn mutate<T, Fut, S>(&self, mutation: Fut, on_success: S) -> Result<T, ApiError>
    where
        Fut: Future<Output = Result<T, ApiError>>,
        S: FnOnce(&Self, &T),
    {
        let output = mutation.await?;
        on_success(self, &output);
        Ok(output)
    }

    /// Cached value for `key`, fresh or not.
    pub fn peek<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
        let state = self.lock();
        let value = state.entries.get(key)?.value.clone()?;
        value.downcast::<T>().ok()
    }

    pub fn state(&self, key: &QueryKey) -> Option<EntryState> {
        let state = self.lock();
        let entry = state.entries.get(key)?;
        let now = Instant::now();
        Some(if entry.inflight.is_some() {
            EntryState::Fetching
        } else if entry.error.is_some() {
            EntryState::Error
        } else if entry.is_fresh(now) {
            EntryState::Fresh
        } else {
            EntryState::Stale
        })
    }

    /// Write `value` into `key` as a fresh result. Any fetch already in
    /// flight for the key will not overwrite it.
    pub fn set_data<T: Send + Sync + 'static>(&self, key: QueryKey, value: T) {
        let mut state = self.lock();
        let generation = state.bump();
        let entry = state.entry(&key);
        let now = Instant::now();
        entry.generation = generation;
        entry.last_used = now;
        entry.store(Arc::new(value), now);
        trace!(key = %key, generation, "cache written directly");
    }

    /// Replace the cached `T` under `key` with `update(old)`. Returns false
    /// when there is no cached `T` to update.
    pub fn update_data<T, F>(&self, key: QueryKey, update: F) -> bool
    where
        T: Send + Sync + 'static,
        F: FnOnce(&T) -> T,
    {
        match self.peek::<T>(&key) {
            Some(old) => {
                self.set_data(key, update(&old));
                true
            }
            None => false,
        }
    }

    /// Mark every matching entry stale so its next read blocks on a refetch.
    pub fn invalidate(&self, pattern: impl Into<KeyMatch>) {
        let pattern = pattern.into();
        let mut state = self.lock();
        let keys: Vec<QueryKey> = state.entries.keys().filter(|k| pattern.matches(k)).cloned().collect();
        for key in keys {
            let generation = state.bump();
            if let Some(entry) = state.entries.get_mut(&key) {
                entry.generation = generation;
                entry.invalidated = true;
            }
            debug!(key = %key, "invalidated");
        }
    }

    /// Forget `key`. A fetch already in flight for it will not repopulate
    /// the entry, and the next read waits for it before fetching again.
    pub fn remove(&self, key: &QueryKey) {
        self.lock().evict(key);
    }

    /// Forget every entry, with the same in-flight handling as [`remove`](Self::remove).
    pub fn clear(&self) {
        let mut state = self.lock();
        let keys: Vec<QueryKey> = state.entries.keys().cloned().collect();
        for key in &keys {
            state.evict(key);
        }
    }
}

fn ready<T: Send + Sync + 'static>(key: &QueryKey, value: CacheValue) -> Result<Arc<T>, QueryError<T>> {
    downcast(key, value).map_err(|error| QueryError { error, last_known: None })
}

fn downcast<T: Send + Sync + 'static>(key: &QueryKey, value: CacheValue) -> Result<Arc<T>, ApiError> {
    value
        .downcast::<T>()
        .map_err(|_| ApiError::Deserialization(format!("cached value for {key} has a different type")))
}
