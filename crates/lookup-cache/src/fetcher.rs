use std::future::Future;

/// The lookup that a [`LookupCache`](crate::LookupCache) memoizes.
///
/// The returned future is spawned onto the tokio runtime and always runs to completion, even if
/// the key is removed or the cache is cleared in the meantime.
///
/// This is implemented for closures taking the key and returning a future:
///
/// ```
/// use lookup_cache::Fetcher;
///
/// fn assert_fetcher<F: Fetcher>(_: F) {}
/// assert_fetcher(|key: String| async move { Ok::<_, String>(key.len()) });
/// ```
pub trait Fetcher: Send + Sync + 'static {
    /// The successfully fetched value.
    type Value: Clone + Send + Sync + 'static;
    /// The error of a failed fetch.
    ///
    /// Errors are cached and handed out to multiple callers, so they need to be clonable.
    /// Wrap them in an `Arc` to preserve identity.
    type Error: Clone + Send + Sync + 'static;
    /// The fetch Future type.
    type Future: Future<Output = Result<Self::Value, Self::Error>> + Send + 'static;

    /// Fetches the value for `key`.
    fn fetch(&self, key: String) -> Self::Future;
}

impl<F, Fut, V, E> Fetcher for F
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    type Value = V;
    type Error = E;
    type Future = Fut;

    fn fetch(&self, key: String) -> Self::Future {
        self(key)
    }
}
