//! Pending-request table: concurrent callers asking for the same key share one call

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use grove_core::RemoteError;
use tracing::debug;

type Pending<T> = Shared<BoxFuture<'static, Result<T, RemoteError>>>;

/// Table of outstanding requests keyed by a normalised request key.
///
/// A key is present exactly while its call is outstanding. The entry is removed by the
/// call itself as it settles, success or failure, so the next request for that key always
/// starts fresh.
pub struct Inflight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pending: Arc<DashMap<String, Pending<T>>>,
}

impl<T> Inflight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Inflight {
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Await the outstanding call for `key`, or start one with `start` if there is none.
    pub async fn run<F, Fut>(&self, key: &str, start: F) -> Result<T, RemoteError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>> + Send + 'static,
    {
        let shared = match self.pending.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                debug!("Joining in-flight request {}", key);
                entry.get().clone()
            }
            Entry::Vacant(entry) => {
                let pending = Arc::clone(&self.pending);
                let owned_key = key.to_string();
                let call = start();
                let shared = async move {
                    let result = call.await;
                    pending.remove(&owned_key);
                    result
                }
                .boxed()
                .shared();
                entry.insert(shared.clone());
                shared
            }
        };
        // The map guard is released before awaiting.
        shared.await
    }

    /// Number of outstanding keys.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }
}

impl<T> Default for Inflight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Inflight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inflight")
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn slow_answer(calls: Arc<AtomicUsize>, value: u32) -> Result<u32, RemoteError> {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        Ok(value)
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_call() {
        let table = Inflight::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let futures = (0..5).map(|_| {
            let calls = Arc::clone(&calls);
            table.run("children:pkg1", move || slow_answer(calls, 7))
        });
        let results = futures_util::future::join_all(futures).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r == &Ok(7)));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_different_keys_are_independent() {
        let table = Inflight::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            table.run("node:a", {
                let calls = Arc::clone(&calls);
                move || slow_answer(calls, 1)
            }),
            table.run("node:b", {
                let calls = Arc::clone(&calls);
                move || slow_answer(calls, 2)
            }),
        );

        assert_eq!((a, b), (Ok(1), Ok(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_key_released() {
        let table = Inflight::<u32>::new();

        let failing = || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err(RemoteError::new(503, "unavailable"))
        };
        let (first, second) = tokio::join!(table.run("root", failing), table.run("root", failing));

        assert_eq!(first, Err(RemoteError::new(503, "unavailable")));
        assert_eq!(first, second);
        assert!(!table.contains("root"));
    }

    #[tokio::test]
    async fn test_call_after_settle_is_fresh() {
        let table = Inflight::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = Arc::clone(&calls);
            table
                .run("ancestors:fn9", move || slow_answer(calls, 3))
                .await
                .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
