use std::sync::Arc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::Shared;

use crate::time::Instant;

/// The outcome of one fetch, successful or not.
#[derive(Debug)]
pub(crate) struct Entry<V, E> {
    result: Result<V, E>,
    /// When this entry needs to be fetched anew, if ever.
    expires_at: Option<Instant>,
}

impl<V, E> Entry<V, E> {
    /// Wraps a freshly settled fetch result, starting its `max_age` from now.
    ///
    /// A `max_age` too large to be represented as a point in time never expires.
    pub fn new(result: Result<V, E>, max_age: Option<Duration>) -> Self {
        Self {
            result,
            expires_at: max_age.and_then(|max_age| Instant::now().checked_add(max_age)),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at < Instant::now())
    }

    pub fn result(&self) -> &Result<V, E> {
        &self.result
    }
}

pub(crate) type EntryChannel<V, E> = Shared<oneshot::Receiver<Arc<Entry<V, E>>>>;

/// A handle to a running or settled fetch.
///
/// This is shared between the in-flight registry, both generations of the store and all callers
/// waiting for the result. The `id` is unique per cache and tells apart fetches for the same key.
pub(crate) struct Pending<V, E> {
    pub id: u64,
    pub channel: EntryChannel<V, E>,
}

impl<V, E> Clone for Pending<V, E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            channel: self.channel.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::time;

    use super::*;

    #[tokio::test]
    async fn test_expiration() {
        time::pause();

        let entry = Entry::<_, ()>::new(Ok(1), Some(Duration::from_millis(10)));
        assert!(!entry.is_expired());

        time::advance(Duration::from_millis(10)).await;
        // only strictly past the deadline
        assert!(!entry.is_expired());

        time::advance(Duration::from_millis(1)).await;
        assert!(entry.is_expired());
        assert_eq!(entry.result(), &Ok(1));
    }

    #[tokio::test]
    async fn test_never_expires() {
        time::pause();

        let entry = Entry::<(), _>::new(Err("nope"), None);
        time::advance(Duration::from_secs(3600 * 24)).await;
        assert!(!entry.is_expired());
    }

    #[tokio::test]
    async fn test_unrepresentable_max_age() {
        time::pause();

        let entry = Entry::<_, ()>::new(Ok(1), Some(Duration::MAX));
        time::advance(Duration::from_secs(3600 * 24)).await;
        assert!(!entry.is_expired());
    }
}
