//! Sharing one producer among concurrent callers with the same key.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::FutureExt;
use futures_util::future::Shared;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

/// Why a shared producer finished without a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FlightError {
    /// Every joined caller went away, or the deduplicator was shut down.
    #[error("producer was cancelled")]
    Cancelled,
    /// The producer panicked.
    #[error("producer panicked")]
    Panicked,
}

type Outcome<T> = Result<T, FlightError>;

struct Flight<T> {
    id: u64,
    waiters: usize,
    outcome: Shared<oneshot::Receiver<Outcome<T>>>,
    cancel: CancellationToken,
}

type Flights<K, T> = Arc<Mutex<HashMap<K, Flight<T>>>>;

/// Maps in-flight keys to the shared outcome of their single producer.
///
/// The producer runs as its own task, so it keeps going when the caller that
/// started it is cancelled as long as another caller is still joined. It is
/// cancelled only when its last caller goes away. A finished flight is removed
/// from the map before any caller sees its outcome, so later calls always
/// start fresh work.
pub struct Deduplicator<K, T> {
    flights: Flights<K, T>,
    next_id: AtomicU64,
}

impl<K, T> Deduplicator<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Display + 'static,
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty deduplicator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flights: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Joins the in-flight producer for `key`, or starts `producer` if there
    /// is none.
    ///
    /// `producer` is only called when this caller starts the flight. Dropping
    /// the returned future leaves the flight; the producer is cancelled when
    /// no caller is left.
    ///
    /// # Errors
    /// Returns [`FlightError`] if the producer was cancelled or panicked.
    pub async fn execute<F, Fut>(&self, key: K, producer: F) -> Outcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (outcome, _guard) = {
            let mut flights = self.flights.lock();
            let id = if let Some(flight) = flights.get_mut(&key) {
                flight.waiters += 1;
                trace!(key = %key, waiters = flight.waiters, "Joined in-flight request");
                flight.id
            } else {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let (sender, receiver) = oneshot::channel();
                let cancel = CancellationToken::new();
                flights.insert(
                    key.clone(),
                    Flight {
                        id,
                        waiters: 1,
                        outcome: receiver.shared(),
                        cancel: cancel.clone(),
                    },
                );
                self.spawn(key.clone(), id, cancel, sender, producer());
                id
            };
            let outcome = flights
                .get(&key)
                .map(|flight| flight.outcome.clone());
            let guard = JoinGuard {
                flights: Arc::clone(&self.flights),
                key,
                id,
            };
            (outcome, guard)
        };

        match outcome {
            Some(outcome) => outcome.await.unwrap_or(Err(FlightError::Cancelled)),
            None => Err(FlightError::Cancelled),
        }
    }

    fn spawn<Fut>(
        &self,
        key: K,
        id: u64,
        cancel: CancellationToken,
        sender: oneshot::Sender<Outcome<T>>,
        work: Fut,
    ) where
        Fut: Future<Output = T> + Send + 'static,
    {
        let flights = Arc::clone(&self.flights);
        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => Err(FlightError::Cancelled),
                result = AssertUnwindSafe(work).catch_unwind() => result.map_err(|_| {
                    error!(key = %key, "In-flight producer panicked");
                    FlightError::Panicked
                }),
            };
            remove_flight(&flights, &key, id);
            let _ = sender.send(outcome);
        });
    }

    /// Number of keys with a running producer.
    pub fn in_flight(&self) -> usize {
        self.flights.lock().len()
    }

    /// Returns true if `key` has a running producer.
    pub fn contains(&self, key: &K) -> bool {
        self.flights.lock().contains_key(key)
    }

    /// Cancels every running producer.
    pub fn cancel_all(&self) {
        let flights: Vec<_> = self.flights.lock().drain().collect();
        for (key, flight) in flights {
            debug!(key = %key, "Cancelling in-flight request");
            flight.cancel.cancel();
        }
    }
}

impl<K, T> Default for Deduplicator<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Display + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

fn remove_flight<K: Eq + Hash, T>(flights: &Mutex<HashMap<K, Flight<T>>>, key: &K, id: u64) {
    let mut flights = flights.lock();
    if flights.get(key).is_some_and(|flight| flight.id == id) {
        flights.remove(key);
    }
}

/// Leaves a flight when dropped; the last one out cancels the producer.
struct JoinGuard<K: Eq + Hash, T> {
    flights: Flights<K, T>,
    key: K,
    id: u64,
}

impl<K: Eq + Hash, T> Drop for JoinGuard<K, T> {
    fn drop(&mut self) {
        let mut flights = self.flights.lock();
        let Some(flight) = flights.get_mut(&self.key) else {
            return;
        };
        if flight.id != self.id {
            return;
        }
        flight.waiters -= 1;
        if flight.waiters == 0 {
            flight.cancel.cancel();
            flights.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_producer(
        calls: &Arc<AtomicUsize>,
        delay: Duration,
        value: u32,
    ) -> impl FnOnce() -> futures_util::future::BoxFuture<'static, u32> + use<> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                value
            }
            .boxed()
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_producer() {
        let dedup = Arc::new(Deduplicator::<String, u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let dedup = Arc::clone(&dedup);
            let producer = counting_producer(&calls, Duration::from_millis(50), 7);
            tasks.push(tokio::spawn(async move {
                dedup.execute("k".to_string(), producer).await
            }));
        }
        for task in tasks {
            assert_eq!(task.await.unwrap(), Ok(7));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(dedup.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_first_caller_cancel_keeps_producer_for_others() {
        let dedup = Arc::new(Deduplicator::<String, u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let first = {
            let dedup = Arc::clone(&dedup);
            let producer = counting_producer(&calls, Duration::from_millis(50), 1);
            tokio::spawn(async move { dedup.execute("k".to_string(), producer).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = {
            let dedup = Arc::clone(&dedup);
            let producer = counting_producer(&calls, Duration::from_millis(50), 2);
            tokio::spawn(async move { dedup.execute("k".to_string(), producer).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        first.abort();
        assert_eq!(second.await.unwrap(), Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_last_caller_cancel_stops_producer() {
        let dedup = Arc::new(Deduplicator::<String, u32>::new());
        let finished = Arc::new(AtomicUsize::new(0));

        let task = {
            let dedup = Arc::clone(&dedup);
            let finished = Arc::clone(&finished);
            tokio::spawn(async move {
                dedup
                    .execute("k".to_string(), move || async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        finished.fetch_add(1, Ordering::SeqCst);
                        1
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(dedup.contains(&"k".to_string()));

        task.abort();
        let _ = task.await;
        assert_eq!(dedup.in_flight(), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_finished_key_starts_fresh_work() {
        let dedup = Deduplicator::<String, u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = dedup
            .execute("k".to_string(), counting_producer(&calls, Duration::ZERO, 1))
            .await;
        let second = dedup
            .execute("k".to_string(), counting_producer(&calls, Duration::ZERO, 2))
            .await;

        assert_eq!((first, second), (Ok(1), Ok(2)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    async fn exploding() -> u32 {
        panic!("boom")
    }

    #[tokio::test]
    async fn test_panicking_producer_reports_to_all_callers() {
        let dedup = Deduplicator::<String, u32>::new();
        let result = dedup.execute("k".to_string(), exploding).await;

        assert_eq!(result, Err(FlightError::Panicked));
        assert_eq!(dedup.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_cancel_all() {
        let dedup = Arc::new(Deduplicator::<String, u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let task = {
            let dedup = Arc::clone(&dedup);
            let producer = counting_producer(&calls, Duration::from_secs(5), 1);
            tokio::spawn(async move { dedup.execute("k".to_string(), producer).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        dedup.cancel_all();
        assert_eq!(task.await.unwrap(), Err(FlightError::Cancelled));
    }
}
