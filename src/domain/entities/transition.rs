//! Transition applied by a target when a successful image is shown.

/// Default crossfade duration used by `crossfade(true)`.
pub const DEFAULT_CROSSFADE_MILLIS: u32 = 100;

/// Visual transition between placeholder and result. The pipeline only carries
/// it to the [`Target`](crate::domain::ports::Target); rendering is up to the target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Transition {
    /// Swap the image in immediately.
    #[default]
    None,
    /// Crossfade over the given duration.
    Crossfade {
        /// Duration in milliseconds.
        duration_millis: u32,
    },
}

impl Transition {
    /// Crossfade of `duration_millis`; zero means no transition.
    #[must_use]
    pub const fn crossfade(duration_millis: u32) -> Self {
        if duration_millis == 0 {
            Self::None
        } else {
            Self::Crossfade { duration_millis }
        }
    }
}
