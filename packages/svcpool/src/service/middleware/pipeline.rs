//! Pipeline composition: wraps the registry dispatcher in the middleware stack.

use std::sync::Arc;

use svcpool_core::Value;
use tower::ServiceBuilder;

use super::metrics::MetricsLayer;
use super::timeout::TimeoutLayer;
use crate::error::ServiceCallError;
use crate::service::dispatch::{Invocation, RegistryService};
use crate::service::registry::ServiceRegistry;

/// Build the invocation pipeline over `registry`.
///
/// Layer order (outermost to innermost):
/// 1. `TimeoutLayer` -- enforce the per-invocation deadline
/// 2. `MetricsLayer` -- record timing and outcome of the dispatch
#[must_use]
pub fn build_invocation_pipeline(
    registry: Arc<ServiceRegistry>,
) -> impl tower::Service<Invocation, Response = Value, Error = ServiceCallError, Future = impl Send>
       + Clone
       + Send {
    ServiceBuilder::new()
        .layer(TimeoutLayer)
        .layer(MetricsLayer)
        .service(RegistryService::new(registry))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
