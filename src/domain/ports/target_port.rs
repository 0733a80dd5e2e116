//! Port for result sinks.

use crate::domain::entities::{ImageHandle, Transition};

/// Receives the images of a request's lifecycle. All callbacks default to no-ops.
pub trait Target: Send + Sync {
    /// Called before the request runs.
    fn on_start(&self, placeholder: Option<&ImageHandle>) {
        let _ = placeholder;
    }

    /// Called with the loaded image.
    fn on_success(&self, image: &ImageHandle, transition: Transition) {
        let _ = (image, transition);
    }

    /// Called with the error image when the request fails.
    fn on_error(&self, error: Option<&ImageHandle>) {
        let _ = error;
    }
}
