//! Execution contexts for pipeline stages.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::error;

use crate::domain::errors::ImageError;

/// Default number of concurrent fetch/decode operations.
pub const DEFAULT_PARALLELISM: usize = 4;

/// Where a pipeline stage runs.
///
/// Every variant runs the work to completion or until the awaiting task is
/// cancelled; dropping the future returned by [`run`](Self::run) stops the
/// work at its next suspension point.
#[derive(Clone, Default)]
pub enum Dispatcher {
    /// Inline on the calling task.
    #[default]
    Current,
    /// On the calling task, once one of the pool's permits is free. Excess
    /// work queues on the semaphore.
    Pool(Arc<Semaphore>),
    /// Spawned onto another runtime, e.g. a dedicated decode runtime.
    Runtime(Handle),
}

impl Dispatcher {
    /// Creates a pool allowing `permits` concurrent operations.
    #[must_use]
    pub fn pool(permits: usize) -> Self {
        Self::Pool(Arc::new(Semaphore::new(permits.max(1))))
    }

    /// Runs `work` on this dispatcher.
    ///
    /// # Errors
    /// Returns [`ImageError::Internal`] if the pool was closed or the spawned
    /// task panicked.
    pub async fn run<F, T>(&self, work: F) -> Result<T, ImageError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        match self {
            Self::Current => Ok(work.await),
            Self::Pool(semaphore) => {
                let _permit = semaphore
                    .acquire()
                    .await
                    .map_err(|_| ImageError::internal("dispatcher pool is closed"))?;
                Ok(work.await)
            }
            Self::Runtime(handle) => {
                let mut task = AbortOnDrop(handle.spawn(work));
                (&mut task.0).await.map_err(|e| {
                    error!(error = %e, "Dispatched task failed");
                    ImageError::internal(format!("dispatched task failed: {e}"))
                })
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Current => write!(f, "Dispatcher::Current"),
            Self::Pool(semaphore) => write!(
                f,
                "Dispatcher::Pool({} available)",
                semaphore.available_permits()
            ),
            Self::Runtime(_) => write!(f, "Dispatcher::Runtime"),
        }
    }
}

struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_current_runs_inline() {
        assert_eq!(Dispatcher::Current.run(async { 7 }).await.unwrap(), 7);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_bounds_concurrency() {
        let pool = Dispatcher::pool(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                pool.run(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
                .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_runtime_reports_panics() {
        let dispatcher = Dispatcher::Runtime(Handle::current());
        let result = dispatcher
            .run(async {
                panic!("boom");
            })
            .await;

        assert!(matches!(result, Err(ImageError::Internal { .. })));
    }
}
