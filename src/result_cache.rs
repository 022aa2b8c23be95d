//! Request-coalescing result cache
//!
//! Maps a key to a computed value and guarantees at most one in-flight
//! computation per key. Callers that arrive while a computation is running
//! join it and receive the same outcome instead of starting a second one.
//!
//! Successes are cached in a bounded LRU. Failures are handed to every caller
//! that joined that attempt but are never cached, so the next call retries.
//!
//! The cache lookup, the in-flight join and leader registration all happen
//! under one lock. The leader publishes its value to the LRU and retires its
//! in-flight entry under that same lock, so a late caller sees one or the
//! other and never starts a duplicate computation.

use std::collections::HashMap;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::{DocBridgeError, Result};

/// Default number of cached values
pub const DEFAULT_CAPACITY: usize = 1024;

type Outcome<V> = std::result::Result<V, Arc<DocBridgeError>>;
type Flight<V> = watch::Receiver<Option<Outcome<V>>>;

struct CacheState<V> {
    entries: LruCache<String, V>,
    in_flight: HashMap<String, Flight<V>>,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Values currently cached
    pub entries: usize,
    /// Computations currently running
    pub in_flight: usize,
    /// Calls answered from the cache
    pub hits: u64,
    /// Calls that ran the computation themselves
    pub misses: u64,
    /// Calls that joined someone else's computation
    pub coalesced: u64,
}

/// Bounded cache with single-flight computation per key
pub struct ResultCache<V> {
    state: Mutex<CacheState<V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
}

enum Role<V> {
    Leader(watch::Sender<Option<Outcome<V>>>),
    Joiner(Flight<V>),
}

/// Retires the leader's in-flight entry if the leader is dropped mid-flight
struct FlightGuard<'a, V> {
    cache: &'a ResultCache<V>,
    key: &'a str,
    armed: bool,
}

impl<V> Drop for FlightGuard<'_, V> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!("Abandoned computation for {}", self.key);
            self.cache.state.lock().in_flight.remove(self.key);
        }
    }
}

impl<V: Clone> ResultCache<V> {
    /// Create a cache holding at most `capacity` values
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                in_flight: HashMap::new(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    /// Cached value for `key`, if any
    pub fn get(&self, key: &str) -> Option<V> {
        self.state.lock().entries.get(key).cloned()
    }

    /// Return the cached value for `key`, or compute it.
    ///
    /// `work` runs at most once per key at a time across all callers. When it
    /// fails, every caller of that attempt receives the error and nothing is
    /// cached.
    pub async fn compute<F, Fut>(&self, key: &str, work: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let role = {
            let mut state = self.state.lock();
            if let Some(value) = state.entries.get(key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(value.clone());
            }
            match state.in_flight.get(key) {
                Some(flight) => {
                    self.coalesced.fetch_add(1, Ordering::Relaxed);
                    Role::Joiner(flight.clone())
                }
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    let (tx, rx) = watch::channel(None);
                    state.in_flight.insert(key.to_string(), rx);
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Joiner(mut flight) => {
                tracing::debug!("Joining in-flight computation for {}", key);
                let outcome = flight
                    .wait_for(Option::is_some)
                    .await
                    .map_err(|_| DocBridgeError::Cancelled)?;
                match outcome.as_ref() {
                    Some(Ok(value)) => Ok(value.clone()),
                    Some(Err(err)) => Err(DocBridgeError::Shared(Arc::clone(err))),
                    None => Err(DocBridgeError::Cancelled),
                }
            }
            Role::Leader(tx) => {
                let mut guard = FlightGuard {
                    cache: self,
                    key,
                    armed: true,
                };
                let outcome: Outcome<V> = work().await.map_err(Arc::new);

                {
                    let mut state = self.state.lock();
                    if let Ok(value) = &outcome {
                        state.entries.put(key.to_string(), value.clone());
                    }
                    state.in_flight.remove(key);
                }
                guard.armed = false;

                tx.send_replace(Some(outcome.clone()));
                drop(tx);

                outcome.map_err(|err| match Arc::try_unwrap(err) {
                    Ok(err) => err,
                    Err(shared) => DocBridgeError::Shared(shared),
                })
            }
        }
    }

    /// Drop the cached value for `key`
    pub fn invalidate(&self, key: &str) -> Option<V> {
        self.state.lock().entries.pop(key)
    }

    /// Drop every cached value. Running computations are unaffected.
    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            entries: state.entries.len(),
            in_flight: state.in_flight.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }
}

impl<V: Clone> Default for ResultCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
