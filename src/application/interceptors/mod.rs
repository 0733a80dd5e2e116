//! Built-in chain stages.

mod engine;
mod event_tracking;
mod memory_cache;

pub(crate) use engine::{EngineInterceptor, PipelineOutcome};
pub(crate) use event_tracking::EventTrackingInterceptor;
pub(crate) use memory_cache::MemoryCacheInterceptor;
pub(crate) use memory_cache::new_cache_key;
