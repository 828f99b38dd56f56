use crate::error::{ProviderError, ProviderResult};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::{
    collections::HashMap,
    fmt::Debug,
    future::Future,
    hash::Hash,
    sync::{Arc, Mutex, PoisonError},
};

/// Provider failure shared between every caller attached to one in-flight request
pub type SharedError = Arc<ProviderError>;

type InFlight<V> = Shared<BoxFuture<'static, Result<V, SharedError>>>;

/// Request coalescing ("singleflight") keyed by `K`
///
/// The first caller for a key starts the request; callers arriving while it is pending
/// attach to the same shared future and observe the same outcome. The entry is removed
/// once the request settles, so a failure is never replayed to later callers.
pub struct Coalescer<K, V> {
    name: &'static str,
    in_flight: Mutex<HashMap<K, InFlight<V>>>,
}

impl<K, V> Coalescer<K, V>
where
    K: Eq + Hash + Clone + Debug + Send,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `start` for `key` unless a request for `key` is already pending
    pub async fn run<F, Fut>(&self, key: K, start: F) -> Result<V, SharedError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ProviderResult<V>> + Send + 'static,
    {
        let call = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match in_flight.get(&key) {
                Some(pending) => {
                    tracing::debug!(coalescer = self.name, key = ?key, "Attached to in-flight request");
                    pending.clone()
                }
                None => {
                    let call = start().map(|result| result.map_err(Arc::new)).boxed().shared();
                    in_flight.insert(key.clone(), call.clone());
                    call
                }
            }
        };

        let outcome = call.clone().await;

        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if in_flight
            .get(&key)
            .is_some_and(|pending| pending.ptr_eq(&call))
        {
            in_flight.remove(&key);
        }

        outcome
    }

    /// Number of requests currently pending
    pub fn pending(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn slow_answer(calls: Arc<AtomicUsize>, fail: bool) -> ProviderResult<u32> {
        calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        if fail {
            Err(ProviderError::Status {
                status: 500,
                body: "boom".to_string(),
            })
        } else {
            Ok(7)
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_request() {
        let coalescer: Coalescer<String, u32> = Coalescer::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b, c) = tokio::join!(
            coalescer.run("key".to_string(), || slow_answer(calls.clone(), false)),
            coalescer.run("key".to_string(), || slow_answer(calls.clone(), false)),
            coalescer.run("key".to_string(), || slow_answer(calls.clone(), false)),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!((a.unwrap(), b.unwrap(), c.unwrap()), (7, 7, 7));
        assert_eq!(coalescer.pending(), 0);
    }

    #[test]
    fn test_entry_lives_until_settled() {
        let coalescer: Coalescer<String, u32> = Coalescer::new("test");
        let (tx, rx) = tokio::sync::oneshot::channel::<u32>();

        let mut call = tokio_test::task::spawn(coalescer.run("key".to_string(), move || async move {
            Ok(rx.await.unwrap_or(0))
        }));
        tokio_test::assert_pending!(call.poll());
        assert_eq!(coalescer.pending(), 1);

        tx.send(7).unwrap();
        assert!(call.is_woken());
        assert_eq!(tokio_test::assert_ready!(call.poll()).unwrap(), 7);
        assert_eq!(coalescer.pending(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_coalesce() {
        let coalescer: Coalescer<String, u32> = Coalescer::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            coalescer.run("en-US".to_string(), || slow_answer(calls.clone(), false)),
            coalescer.run("uk-UA".to_string(), || slow_answer(calls.clone(), false)),
        );

        assert!(a.is_ok() && b.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_is_shared_but_not_remembered() {
        let coalescer: Coalescer<String, u32> = Coalescer::new("test");
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            coalescer.run("key".to_string(), || slow_answer(calls.clone(), true)),
            coalescer.run("key".to_string(), || slow_answer(calls.clone(), true)),
        );
        assert!(a.is_err() && b.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let retry = coalescer
            .run("key".to_string(), || slow_answer(calls.clone(), false))
            .await;
        assert_eq!(retry.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
