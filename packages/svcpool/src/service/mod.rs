//! Calling pooled services: prepared calls, the service registry and the
//! asynchronous invocation pipeline.

pub mod call;
pub mod dispatch;
pub mod middleware;
pub mod registry;

pub use call::{CallBuilder, CallHandle, ServiceCall};
pub use dispatch::{Invocation, RegistryService, DEFAULT_INVOCATION_TIMEOUT_MS};
pub use middleware::build_invocation_pipeline;
pub use registry::ServiceRegistry;
