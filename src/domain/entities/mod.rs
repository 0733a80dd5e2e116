//! Domain entities.

mod cache_key;
mod data;
mod extras;
mod image;
mod options;
mod policy;
mod request;
mod result;
mod size;
mod transition;

pub use cache_key::CacheKey;
pub(crate) use cache_key::{SIZE_EXTRA, TRANSFORMATIONS_EXTRA};
pub use data::Data;
pub use extras::Extras;
pub use image::{Image, ImageHandle};
pub use options::{ColorConfig, Options};
pub use policy::{CachePolicy, DataSource};
pub use request::{ImageRequest, ImageRequestBuilder};
pub use result::{ErrorResult, ImageResult, SuccessResult};
pub use size::{Dimension, Precision, Scale, Size, compute_size_multiplier};
pub use transition::{DEFAULT_CROSSFADE_MILLIS, Transition};
