//! A generic single-flight async cache: concurrent `get_or_load` calls for the
//! same key share one in-flight load, and a failed load leaves no trace for
//! the next caller to retry.

use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};

type LoadResult<V> = Result<V, Arc<anyhow::Error>>;
type LoadFuture<V> = Shared<BoxFuture<'static, LoadResult<V>>>;

/// Keyed single-flight cache. `V` must be cheap to clone (wrap the real
/// payload in an `Arc` when it isn't).
pub struct SingleFlightCache<K, V> {
    inflight: DashMap<K, LoadFuture<V>>,
}

impl<K, V> Default for SingleFlightCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }
}

impl<K, V> SingleFlightCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `key`, invoking `loader` at most once across every caller
    /// racing on the same key. A failed load clears the slot so a later call
    /// retries rather than replaying a stale error forever.
    pub async fn get_or_load<F, Fut>(&self, key: K, loader: F) -> LoadResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, anyhow::Error>> + Send + 'static,
    {
        let fresh: BoxFuture<'static, LoadResult<V>> =
            async move { loader().await.map_err(Arc::new) }.boxed();
        let fresh: LoadFuture<V> = fresh.shared();

        let chosen = self
            .inflight
            .entry(key.clone())
            .or_insert_with(|| fresh)
            .clone();

        let result = chosen.clone().await;
        if result.is_err() {
            self.inflight.remove_if(&key, |_, slot| {
                slot.peek().is_some_and(|r| r.is_err())
            });
        }
        result
    }

    /// Evict `key` unconditionally, e.g. when a caller knows the cached value
    /// is stale and wants the next access to reload it.
    pub fn invalidate(&self, key: &K) {
        self.inflight.remove(key);
    }

    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }
}

/// Type alias used by call sites that need to box a loader closure's future.
pub type BoxedLoad<V> = Pin<Box<dyn Future<Output = Result<V, anyhow::Error>> + Send>>;
