//! Handle on an enqueued request.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::{BoxFuture, Shared};
use tokio_util::sync::CancellationToken;

use super::Attachment;
use crate::domain::entities::ImageResult;
use crate::domain::errors::Cancelled;

/// The shared outcome of an enqueued request.
pub type Job = Shared<BoxFuture<'static, Result<ImageResult, Cancelled>>>;

/// Returned by [`ImageLoader::enqueue`](super::ImageLoader::enqueue).
///
/// The request runs in the background whether or not the job is awaited.
/// Dropping the handle does not cancel the request; call
/// [`dispose`](Self::dispose).
#[derive(Clone)]
pub struct Disposable {
    token: CancellationToken,
    job: Job,
    finished: Arc<AtomicBool>,
    binding: Option<(Attachment, u64)>,
}

impl Disposable {
    pub(crate) fn new(
        token: CancellationToken,
        job: Job,
        finished: Arc<AtomicBool>,
        binding: Option<(Attachment, u64)>,
    ) -> Self {
        Self {
            token,
            job,
            finished,
            binding,
        }
    }

    /// Cancels the request and releases any memory cache pins its attachment
    /// holds for it. Idempotent.
    pub fn dispose(&self) {
        self.token.cancel();
        if let Some((attachment, generation)) = &self.binding {
            attachment.release(*generation);
        }
    }

    /// Returns true once the request was cancelled or has completed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.token.is_cancelled() || self.finished.load(Ordering::Acquire)
    }

    /// The request's outcome. [`Cancelled`] if it was disposed first.
    #[must_use]
    pub fn job(&self) -> Job {
        self.job.clone()
    }

    /// Waits for the request's outcome.
    ///
    /// # Errors
    /// Returns [`Cancelled`] if the request was cancelled.
    pub async fn join(&self) -> Result<ImageResult, Cancelled> {
        self.job.clone().await
    }
}

impl std::fmt::Debug for Disposable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposable")
            .field("is_disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}
