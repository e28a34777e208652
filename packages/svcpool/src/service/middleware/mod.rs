//! Tower middleware layers for the invocation pipeline.
//!
//! - [`timeout`]: Per-invocation deadline enforcement
//! - [`metrics`]: Invocation timing and outcome via `tracing` spans
//! - [`pipeline`]: Composes the layers around a [`RegistryService`](super::RegistryService)

pub mod metrics;
pub mod pipeline;
pub mod timeout;

pub use metrics::MetricsLayer;
pub use pipeline::build_invocation_pipeline;
pub use timeout::TimeoutLayer;
