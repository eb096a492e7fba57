use std::fmt;
use std::sync::Arc;

use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::{Mutex, MutexGuard};
use rustc_hash::FxHashMap;

use crate::config::{CacheConfig, Limits};
use crate::defer::defer;
use crate::entry::{Entry, Pending};
use crate::error::{CacheError, ConfigError};
use crate::fetcher::Fetcher;
use crate::generations::Generations;

type Value<F> = <F as Fetcher>::Value;
type Error<F> = <F as Fetcher>::Error;

/// Everything guarded by the cache lock.
struct State<V, E> {
    /// Stored results, running or settled.
    store: Generations<Pending<V, E>>,
    /// Fetches that have not settled yet, at most one per key.
    in_flight: FxHashMap<String, Pending<V, E>>,
    next_id: u64,
}

struct Inner<F: Fetcher> {
    config: CacheConfig,
    limits: Limits,
    fetcher: F,
    state: Mutex<State<Value<F>, Error<F>>>,
}

impl<F: Fetcher> Inner<F> {
    fn state(&self) -> MutexGuard<'_, State<Value<F>, Error<F>>> {
        self.state.lock()
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    /// Clears the in-flight slot of a settled fetch, unless it was replaced in the meantime.
    fn finish_fetch(&self, key: &str, id: u64) {
        let mut state = self.state();
        if state.in_flight.get(key).is_some_and(|pending| pending.id == id) {
            state.in_flight.remove(key);
        }
    }

    /// Drops every reference to the fetch with the given `id`.
    fn discard(&self, key: &str, id: u64) {
        let mut state = self.state();
        state.store.remove_if(key, |pending| pending.id == id);
        if state.in_flight.get(key).is_some_and(|pending| pending.id == id) {
            state.in_flight.remove(key);
        }
    }
}

/// A memoizing cache for async lookups.
///
/// Looking up a key first checks the stored results. If the key is not stored, a running fetch
/// for it is joined, and only if there is none a new fetch is spawned. This means there is at
/// most one fetch per key running at any time, no matter how many concurrent requests for that
/// key come in.
///
/// Results are stored in two generations, see [`CacheConfig::max_entries`] for the bounds, and
/// expire after [`CacheConfig::max_age`]. Failed fetches are cached just like successful ones.
///
/// Cloning a cache is cheap and yields a handle to the same cache.
pub struct LookupCache<F: Fetcher> {
    inner: Arc<Inner<F>>,
}

impl<F: Fetcher> Clone for LookupCache<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: Fetcher> fmt::Debug for LookupCache<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts = self
            .inner
            .state
            .try_lock()
            .map(|state| (state.store.len(), state.in_flight.len()))
            .unwrap_or_default();
        f.debug_struct("LookupCache")
            .field("config", &self.inner.config)
            .field("stored entries", &counts.0)
            .field("running fetches", &counts.1)
            .finish()
    }
}

impl<F: Fetcher> LookupCache<F> {
    /// Creates a new cache that memoizes `fetcher`.
    ///
    /// # Errors
    ///
    /// Fails if `max_entries` is missing or `max_age` is zero.
    pub fn new(fetcher: F, config: CacheConfig) -> Result<Self, ConfigError> {
        let limits = config.validate()?;
        let state = State {
            store: Generations::new(limits.max_entries),
            in_flight: Default::default(),
            next_id: 0,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                limits,
                fetcher,
                state: Mutex::new(state),
            }),
        })
    }

    /// The config this cache was created with.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Gets the value for `key`, fetching it if necessary.
    ///
    /// Concurrent calls for the same key share a single fetch and all receive its outcome.
    /// If the stored result has expired, it is removed and fetched once more. That second result
    /// is returned as is, even if it is expired already. Concurrent callers that find the same
    /// expired result share the second fetch.
    ///
    /// This must be called within a tokio runtime, as fetches are spawned onto it.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Fetch`] with the error of the (possibly cached) failed fetch.
    pub async fn get(&self, key: &str) -> Result<Value<F>, CacheError<Error<F>>> {
        let name = self.inner.name();
        metric!(counter("cache.access") += 1, "cache" => name);
        tracing::trace!(cache = name, key, "Looking up key");

        let (id, mut entry) = self.load(key).await?;
        if entry.is_expired() {
            metric!(counter("cache.expired") += 1, "cache" => name);
            tracing::debug!(cache = name, key, "Cached result expired");

            // Only drop the expired fetch itself, a concurrent caller may have replaced it already.
            self.inner.discard(key, id);
            (_, entry) = self.load(key).await?;
        }

        entry.result().clone().map_err(CacheError::Fetch)
    }

    /// Removes `key`, so that the next [`get`](Self::get) fetches it anew.
    ///
    /// A running fetch for `key` is not cancelled. Callers already waiting for it still receive
    /// its result, but it will not be stored.
    pub fn remove(&self, key: &str) {
        let mut state = self.inner.state();
        state.store.remove(key);
        state.in_flight.remove(key);
        tracing::debug!(cache = self.inner.name(), key, "Removed key");
    }

    /// Removes all stored results.
    ///
    /// Running fetches are neither cancelled nor forgotten: a [`get`](Self::get) issued while a
    /// fetch for its key is running still joins that fetch.
    pub fn clear(&self) {
        let mut state = self.inner.state();
        state.store.clear();
        tracing::debug!(cache = self.inner.name(), "Cleared cache");
    }

    /// Resolves `key` and waits for the result, along with the id of the fetch producing it.
    async fn load(
        &self,
        key: &str,
    ) -> Result<(u64, Arc<Entry<Value<F>, Error<F>>>), CacheError<Error<F>>> {
        let Pending { id, channel } = self.resolve(key);

        match channel.await {
            Ok(entry) => Ok((id, entry)),
            Err(oneshot::Canceled) => {
                let name = self.inner.name();
                metric!(counter("cache.aborted") += 1, "cache" => name);
                tracing::error!(cache = name, key, "Fetch was aborted before producing a result");

                self.inner.discard(key, id);
                Err(CacheError::Aborted)
            }
        }
    }

    /// Returns the stored or running fetch for `key`, spawning a new one if there is none.
    fn resolve(&self, key: &str) -> Pending<Value<F>, Error<F>> {
        let name = self.inner.name();

        let (pending, fetch) = {
            let mut state = self.inner.state();
            let rotations = state.store.rotations();

            let resolved = if let Some(pending) = state.store.get(key) {
                metric!(counter("cache.memory.hit") += 1, "cache" => name);
                (pending, None)
            } else if let Some(pending) = state.in_flight.get(key) {
                // A concurrent lookup was deduplicated.
                metric!(counter("cache.channel.hit") += 1, "cache" => name);
                (pending.clone(), None)
            } else {
                metric!(counter("cache.channel.miss") += 1, "cache" => name);

                let id = state.next_id;
                state.next_id += 1;
                let (pending, fetch) = self.create_channel(key, id);

                let evicted = state.in_flight.insert(key.to_owned(), pending.clone());
                debug_assert!(evicted.is_none());
                state.store.insert(key, pending.clone());
                (pending, Some(fetch))
            };

            if state.store.rotations() != rotations {
                metric!(counter("cache.rotation") += 1, "cache" => name);
                metric!(gauge("cache.entries") = state.store.len() as u64, "cache" => name);
            }
            resolved
        };

        // Spawned only after releasing the lock, as the fetch takes it again once it settles.
        if let Some(fetch) = fetch {
            tracing::debug!(cache = name, key, "Spawning fetch");
            tokio::spawn(fetch);
        }

        pending
    }

    /// Creates a shareable channel for a new fetch of `key`, along with the task that runs it.
    fn create_channel(
        &self,
        key: &str,
        id: u64,
    ) -> (Pending<Value<F>, Error<F>>, BoxFuture<'static, ()>) {
        let (sender, receiver) = oneshot::channel();

        let inner = Arc::clone(&self.inner);
        let key = key.to_owned();
        let fetch = async move {
            let finish_token = {
                let inner = Arc::clone(&inner);
                let key = key.clone();
                defer(move || inner.finish_fetch(&key, id))
            };

            let result = inner.fetcher.fetch(key).await;
            let entry = Arc::new(Entry::new(result, inner.limits.max_age));

            // Drop the token first to evict from the in-flight map. This ensures that callers
            // either get a channel that will receive data, or they create a new channel.
            drop(finish_token);
            sender.send(entry).ok();
        };

        let pending = Pending {
            id,
            channel: receiver.shared(),
        };
        (pending, fetch.boxed())
    }
}
