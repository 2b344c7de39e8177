//! Per-key in-flight registry
//!
//! [`InFlight`] memoizes asynchronous loads by key. The first caller for a
//! key runs the load; callers arriving while it runs wait for its outcome
//! instead of starting their own. Successes are kept for the lifetime of the
//! cache, failures are handed to every waiter and then forgotten so the next
//! call starts over.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::debug;

use crate::error::{Result, ScopeError};

type Outcome<V> = Option<Result<V>>;

enum Slot<V> {
    Ready(V),
    Loading(watch::Receiver<Outcome<V>>),
}

enum Role<V> {
    Leader(watch::Sender<Outcome<V>>),
    Waiter(watch::Receiver<Outcome<V>>),
}

/// Memoized asynchronous loads, at most one running per key
pub struct InFlight<K, V> {
    slots: Mutex<HashMap<K, Slot<V>>>,
}

impl<K, V> Default for InFlight<K, V> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: fmt::Debug, V> fmt::Debug for InFlight<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("InFlight")
            .field("keys", &slots.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<K, V> InFlight<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Slot<V>>> {
        // Slots are only ever inserted or removed whole
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The value for `key`, if a load already completed
    pub fn get(&self, key: &K) -> Option<V> {
        match self.lock().get(key) {
            Some(Slot::Ready(value)) => Some(value.clone()),
            _ => None,
        }
    }

    /// Whether a load for `key` is currently running
    pub fn is_loading(&self, key: &K) -> bool {
        matches!(self.lock().get(key), Some(Slot::Loading(_)))
    }

    /// Number of completed values
    pub fn ready_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    /// Return the value for `key`, running `load` if nobody has yet.
    ///
    /// `load` is only invoked when no completed value exists and no other
    /// load for `key` is running.
    pub async fn get_or_load<F, Fut>(&self, key: K, load: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let role = {
            let mut slots = self.lock();
            match slots.get(&key) {
                Some(Slot::Ready(value)) => return Ok(value.clone()),
                Some(Slot::Loading(rx)) => Role::Waiter(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    slots.insert(key.clone(), Slot::Loading(rx));
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Waiter(mut rx) => {
                debug!("Waiting for in-flight load of {:?}", key);
                let outcome = match rx.wait_for(Option::is_some).await {
                    Ok(outcome) => (*outcome).clone(),
                    Err(_) => None,
                };
                outcome.unwrap_or_else(|| Err(ScopeError::Abandoned(format!("{key:?}"))))
            }
            Role::Leader(tx) => {
                let mut guard = LoadGuard {
                    cache: self,
                    key: Some(key),
                };
                let result = load().await;

                if let Some(key) = guard.key.take() {
                    let mut slots = self.lock();
                    match &result {
                        Ok(value) => {
                            slots.insert(key, Slot::Ready(value.clone()));
                        }
                        Err(_) => {
                            slots.remove(&key);
                        }
                    }
                }
                tx.send_replace(Some(result.clone()));
                result
            }
        }
    }
}

/// Clears the loading slot if the leading task is dropped mid-load
struct LoadGuard<'a, K: Eq + Hash, V> {
    cache: &'a InFlight<K, V>,
    key: Option<K>,
}

impl<K: Eq + Hash, V> Drop for LoadGuard<'_, K, V> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.cache
                .slots
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_value_is_loaded_once() {
        let cache: InFlight<String, u32> = InFlight::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_load("a".to_string(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await;
            assert_eq!(value, Ok(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(&"a".to_string()), Some(7));
        assert_eq!(cache.ready_count(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let cache: InFlight<&'static str, u32> = InFlight::new();

        let first = cache
            .get_or_load("a", || async {
                Err(ScopeError::UnmappedScope("a".to_string()))
            })
            .await;
        assert!(first.is_err());
        assert!(!cache.is_loading(&"a"));
        assert_eq!(cache.get(&"a"), None);

        let second = cache.get_or_load("a", || async { Ok(1) }).await;
        assert_eq!(second, Ok(1));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_load() {
        let cache: Arc<InFlight<&'static str, u32>> = Arc::new(InFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    cache
                        .get_or_load("k", || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(42)
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_waiters_see_the_leader_error() {
        let cache: Arc<InFlight<&'static str, u32>> = Arc::new(InFlight::new());

        let leader = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_load("k", || async {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Err(ScopeError::BackendUnavailable("boom".to_string()))
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let waiter = cache.get_or_load("k", || async { Ok(1) }).await;

        assert_eq!(
            waiter,
            Err(ScopeError::BackendUnavailable("boom".to_string()))
        );
        assert!(leader.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_dropped_leader_releases_slot() {
        let cache: Arc<InFlight<&'static str, u32>> = Arc::new(InFlight::new());

        let leader = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_load("k", || async {
                        tokio::time::sleep(Duration::from_secs(60)).await;
                        Ok(1)
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(cache.is_loading(&"k"));

        leader.abort();
        let _ = leader.await;
        assert!(!cache.is_loading(&"k"));

        let retried = cache.get_or_load("k", || async { Ok(2) }).await;
        assert_eq!(retried, Ok(2));
    }
}
