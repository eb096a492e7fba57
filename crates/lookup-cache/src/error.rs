use thiserror::Error;

/// An invalid [`CacheConfig`](crate::CacheConfig), reported when constructing a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// `max_entries` was not provided.
    #[error("max_entries needs to be a number greater or equal 0")]
    InvalidMaxEntries,
    /// `max_age` was provided, but is zero.
    #[error("max_age needs to be a duration greater 0")]
    InvalidMaxAge,
}

/// The error returned by [`LookupCache::get`](crate::LookupCache::get).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError<E> {
    /// The fetch failed with the contained error.
    ///
    /// Failures are cached like values, so every caller sharing the same fetch, and every caller
    /// hitting the cached failure later on, receives a clone of the same error.
    #[error("{0}")]
    Fetch(E),
    /// The fetch task was aborted before it produced a result, because it panicked.
    ///
    /// This outcome is never cached.
    #[error("fetch was aborted before producing a result")]
    Aborted,
}

impl<E> CacheError<E> {
    /// Returns the fetch error, if this is one.
    pub fn into_fetch_error(self) -> Option<E> {
        match self {
            Self::Fetch(err) => Some(err),
            Self::Aborted => None,
        }
    }
}
