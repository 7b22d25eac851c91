//! In-process read-through cache for remote blob reads
//!
//! Sits in front of the remote object store only. Entries live in an
//! insertion-ordered map bounded by `max_entries`; overflow evicts the oldest
//! insertion. Concurrent reads of the same uncached path share one upstream
//! fetch. Writers call [`BlobReadCache::invalidate`] before touching the
//! upstream object, and a fetch that was invalidated while running never
//! populates the cache.

use crate::error::Result;
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt, Shared};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

type SharedFetch = Shared<BoxFuture<'static, Result<Option<Bytes>>>>;

#[derive(Debug)]
struct CachedBlob {
    value: Bytes,
    expires_at: Instant,
}

struct InFlight {
    generation: u64,
    fetch: SharedFetch,
}

#[derive(Default)]
struct State {
    entries: IndexMap<String, CachedBlob>,
    in_flight: HashMap<String, InFlight>,
    next_generation: u64,
}

/// Bounded TTL cache with request de-duplication
pub struct BlobReadCache {
    ttl: Duration,
    max_entries: usize,
    state: Mutex<State>,
}

impl BlobReadCache {
    /// A zero TTL or zero capacity disables caching entirely
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            state: Mutex::new(State::default()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, 0)
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero() && self.max_entries > 0
    }

    /// Returns the cached value of `path`, or runs `fetch` (shared with any
    /// concurrent reader of the same path) and caches a present result
    pub async fn get_or_fetch<F, Fut>(&self, path: &str, fetch: F) -> Result<Option<Bytes>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Bytes>>> + Send + 'static,
    {
        if !self.is_enabled() {
            return fetch().await;
        }

        let (shared, generation) = {
            let mut state = self.state();
            let now = Instant::now();

            match state.entries.get(path) {
                Some(entry) if entry.expires_at > now => {
                    trace!(path, "blob cache hit");
                    return Ok(Some(entry.value.clone()));
                }
                Some(_) => {
                    state.entries.shift_remove(path);
                }
                None => {}
            }

            if let Some(in_flight) = state.in_flight.get(path) {
                trace!(path, "joining in-flight blob fetch");
                (in_flight.fetch.clone(), in_flight.generation)
            } else {
                let generation = state.next_generation;
                state.next_generation += 1;
                let shared = fetch().boxed().shared();
                state.in_flight.insert(
                    path.to_string(),
                    InFlight {
                        generation,
                        fetch: shared.clone(),
                    },
                );
                debug!(path, "blob cache miss");
                (shared, generation)
            }
        };

        let result = shared.await;

        let mut state = self.state();
        let current = state
            .in_flight
            .get(path)
            .map(|in_flight| in_flight.generation == generation)
            .unwrap_or(false);
        if current {
            state.in_flight.remove(path);
            if let Ok(Some(value)) = &result {
                self.insert_locked(&mut state, path, value.clone());
            }
        }

        result
    }

    /// Drops the cached value and any in-flight fetch for `path`
    pub fn invalidate(&self, path: &str) {
        if !self.is_enabled() {
            return;
        }
        let mut state = self.state();
        let cached = state.entries.shift_remove(path).is_some();
        let pending = state.in_flight.remove(path).is_some();
        if cached || pending {
            trace!(path, cached, pending, "blob cache invalidated");
        }
    }

    /// Number of cached (possibly expired) entries
    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, path: &str) -> bool {
        self.state().entries.contains_key(path)
    }

    fn insert_locked(&self, state: &mut State, path: &str, value: Bytes) {
        let now = Instant::now();
        state.entries.retain(|_, entry| entry.expires_at > now);
        state.entries.shift_remove(path);
        while state.entries.len() >= self.max_entries {
            if let Some((evicted, _)) = state.entries.shift_remove_index(0) {
                trace!(path = %evicted, "blob cache eviction");
            }
        }
        state.entries.insert(
            path.to_string(),
            CachedBlob {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_fetch(
        calls: &Arc<AtomicUsize>,
        value: &'static str,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<Option<Bytes>>> {
        let calls = calls.clone();
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(Some(Bytes::from_static(value.as_bytes())))
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_hit_avoids_upstream() {
        let cache = BlobReadCache::new(Duration::from_secs(30), 10);
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache.get_or_fetch("1/2.json", counting_fetch(&calls, "v1")).await;
        let second = cache.get_or_fetch("1/2.json", counting_fetch(&calls, "v1")).await;

        assert_eq!(first.unwrap(), Some(Bytes::from_static(b"v1")));
        assert_eq!(second.unwrap(), Some(Bytes::from_static(b"v1")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_reads_share_one_fetch() {
        let cache = BlobReadCache::new(Duration::from_secs(30), 10);
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b, c) = tokio::join!(
            cache.get_or_fetch("p", counting_fetch(&calls, "x")),
            cache.get_or_fetch("p", counting_fetch(&calls, "x")),
            cache.get_or_fetch("p", counting_fetch(&calls, "x")),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in [a, b, c] {
            assert_eq!(result.unwrap(), Some(Bytes::from_static(b"x")));
        }
    }

    #[tokio::test]
    async fn test_invalidated_fetch_does_not_populate() {
        let cache = BlobReadCache::new(Duration::from_secs(30), 10);
        let calls = Arc::new(AtomicUsize::new(0));

        let read = cache.get_or_fetch("p", counting_fetch(&calls, "old"));
        let invalidate = async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            cache.invalidate("p");
        };
        let (result, _) = tokio::join!(read, invalidate);

        assert_eq!(result.unwrap(), Some(Bytes::from_static(b"old")));
        assert!(!cache.contains("p"));

        let fresh = cache.get_or_fetch("p", counting_fetch(&calls, "new")).await;
        assert_eq!(fresh.unwrap(), Some(Bytes::from_static(b"new")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_entry_is_fetched_again() {
        let cache = BlobReadCache::new(Duration::from_millis(10), 10);
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get_or_fetch("p", counting_fetch(&calls, "v1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        let second = cache.get_or_fetch("p", counting_fetch(&calls, "v2")).await;

        assert_eq!(second.unwrap(), Some(Bytes::from_static(b"v2")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_insert_sweeps_expired_entries() {
        let cache = BlobReadCache::new(Duration::from_millis(10), 10);
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get_or_fetch("a", counting_fetch(&calls, "v")).await.unwrap();
        assert!(cache.contains("a"));
        tokio::time::sleep(Duration::from_millis(30)).await;

        // "a" is only dropped once another insert runs.
        assert!(cache.contains("a"));
        cache.get_or_fetch("b", counting_fetch(&calls, "v")).await.unwrap();
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_oldest_insertion_is_evicted() {
        let cache = BlobReadCache::new(Duration::from_secs(30), 2);
        let calls = Arc::new(AtomicUsize::new(0));

        for path in ["a", "b", "c"] {
            cache
                .get_or_fetch(path, counting_fetch(&calls, "v"))
                .await
                .unwrap();
        }

        assert_eq!(cache.len(), 2);
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
    }

    #[tokio::test]
    async fn test_missing_and_failed_reads_are_not_cached() {
        let cache = BlobReadCache::new(Duration::from_secs(30), 10);

        let missing = cache
            .get_or_fetch("gone", || async { Ok(None) })
            .await
            .unwrap();
        assert!(missing.is_none());

        let failed = cache
            .get_or_fetch("down", || async {
                Err(StoreError::Unavailable("503".into()))
            })
            .await;
        assert!(failed.is_err());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_cache_passes_through() {
        let cache = BlobReadCache::new(Duration::ZERO, 10);
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get_or_fetch("p", counting_fetch(&calls, "v")).await.unwrap();
        cache.get_or_fetch("p", counting_fetch(&calls, "v")).await.unwrap();

        assert!(!cache.is_enabled());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }
}
