//! Lifetime scopes that requests bind their cancellation to.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::infrastructure::cache::PinGuard;

/// Lifecycle state of an [`Attachment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentState {
    /// Requests run normally.
    Active,
    /// Requests wait until the attachment becomes active again.
    Inactive,
    /// Torn down for good. Bound requests are cancelled.
    Detached,
}

struct Binding {
    generation: u64,
    token: CancellationToken,
}

struct Inner {
    state: watch::Sender<AttachmentState>,
    current: Mutex<Option<Binding>>,
    pins: Mutex<Vec<PinGuard>>,
    generations: Mutex<u64>,
}

/// An external lifetime signal, such as a UI element that may be hidden or
/// removed.
///
/// At most one request is bound to an attachment at a time: binding a new
/// request cancels the previous one. Detaching cancels the bound request and
/// releases the memory cache pins held for its result.
#[derive(Clone)]
pub struct Attachment {
    inner: Arc<Inner>,
}

impl Attachment {
    /// Creates an active attachment.
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(AttachmentState::Active)
    }

    /// Creates an attachment that holds requests until activated.
    #[must_use]
    pub fn inactive() -> Self {
        Self::with_state(AttachmentState::Inactive)
    }

    fn with_state(state: AttachmentState) -> Self {
        let (sender, _) = watch::channel(state);
        Self {
            inner: Arc::new(Inner {
                state: sender,
                current: Mutex::new(None),
                pins: Mutex::new(Vec::new()),
                generations: Mutex::new(0),
            }),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AttachmentState {
        *self.inner.state.borrow()
    }

    /// Lets waiting and future requests run. No effect once detached.
    pub fn activate(&self) {
        self.transition(AttachmentState::Active);
    }

    /// Makes future requests wait. No effect once detached.
    pub fn deactivate(&self) {
        self.transition(AttachmentState::Inactive);
    }

    /// Tears the attachment down, cancelling the bound request and releasing
    /// held pins.
    pub fn detach(&self) {
        self.inner.state.send_replace(AttachmentState::Detached);
        if let Some(binding) = self.inner.current.lock().take() {
            binding.token.cancel();
        }
        self.inner.pins.lock().clear();
        debug!("Attachment detached");
    }

    fn transition(&self, next: AttachmentState) {
        self.inner.state.send_if_modified(|state| {
            if *state == AttachmentState::Detached || *state == next {
                return false;
            }
            *state = next;
            true
        });
    }

    /// Binds a request's token, cancelling the previously bound request.
    ///
    /// Returns the binding's generation. Binding to a detached attachment
    /// cancels `token` immediately.
    pub(crate) fn bind(&self, token: &CancellationToken) -> u64 {
        let generation = {
            let mut generations = self.inner.generations.lock();
            *generations += 1;
            *generations
        };
        if self.state() == AttachmentState::Detached {
            token.cancel();
            return generation;
        }
        let previous = self.inner.current.lock().replace(Binding {
            generation,
            token: token.clone(),
        });
        if let Some(previous) = previous {
            previous.token.cancel();
        }
        generation
    }

    /// Waits while the attachment is inactive. Returns false if it was
    /// detached instead.
    pub(crate) async fn wait_until_active(&self) -> bool {
        let mut receiver = self.inner.state.subscribe();
        receiver
            .wait_for(|state| *state != AttachmentState::Inactive)
            .await
            .map(|state| *state == AttachmentState::Active)
            .unwrap_or(false)
    }

    /// Holds `pins` for the result of binding `generation`, replacing the pins
    /// of an earlier result. Ignored if a newer request has been bound.
    pub(crate) fn retain(&self, generation: u64, pins: Vec<PinGuard>) {
        let is_current = self
            .inner
            .current
            .lock()
            .as_ref()
            .is_some_and(|binding| binding.generation == generation);
        if is_current {
            *self.inner.pins.lock() = pins;
        }
    }

    /// Releases the pins held for binding `generation`, if it is still current.
    pub(crate) fn release(&self, generation: u64) {
        let mut current = self.inner.current.lock();
        if current
            .as_ref()
            .is_some_and(|binding| binding.generation == generation)
        {
            *current = None;
            self.inner.pins.lock().clear();
        }
    }

    /// Number of memory cache pins currently held.
    #[must_use]
    pub fn pinned(&self) -> usize {
        self.inner.pins.lock().len()
    }
}

impl Default for Attachment {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("state", &self.state())
            .field("pinned", &self.pinned())
            .finish_non_exhaustive()
    }
}
