//! Asynchronous invocation: routes an [`Invocation`] to its service's pool
//! and runs the blocking call on tokio's blocking thread pool.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use svcpool_core::Value;
use tower::Service;

use super::call::execute;
use super::registry::ServiceRegistry;
use crate::error::ServiceCallError;

/// Default per-invocation deadline.
pub const DEFAULT_INVOCATION_TIMEOUT_MS: u64 = 30_000;

/// One call addressed by service key and operation name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    /// Service id or interface name.
    pub service: String,
    pub operation: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
    /// Deadline for the whole call, including waiting for an instance.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Absolute deadline, fixed by the first layer that sees the invocation.
    #[serde(skip)]
    pub deadline: Option<Instant>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_INVOCATION_TIMEOUT_MS
}

impl Invocation {
    #[must_use]
    pub fn new(
        service: impl Into<String>,
        operation: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
            arguments,
            timeout_ms: DEFAULT_INVOCATION_TIMEOUT_MS,
            deadline: None,
        }
    }

    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Returns the deadline, fixing it to `timeout_ms` from now if no layer
    /// has done so yet.
    pub fn stamp_deadline(&mut self) -> Instant {
        let timeout = Duration::from_millis(self.timeout_ms);
        *self
            .deadline
            .get_or_insert_with(|| Instant::now() + timeout)
    }
}

// ---------------------------------------------------------------------------
// RegistryService
// ---------------------------------------------------------------------------

type BoxedFuture = Pin<Box<dyn Future<Output = Result<Value, ServiceCallError>> + Send>>;

/// Innermost service of the invocation pipeline.
///
/// Unknown services fail immediately with `NoRegisteredService`. The call
/// itself blocks on the pool, so it runs via `spawn_blocking`, and never
/// waits for an instance past the invocation's deadline: a caller that was
/// answered with a timeout does not see its operation run afterwards.
#[derive(Debug, Clone)]
pub struct RegistryService {
    registry: Arc<ServiceRegistry>,
}

impl RegistryService {
    #[must_use]
    pub fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self { registry }
    }
}

impl Service<Invocation> for RegistryService {
    type Response = Value;
    type Error = ServiceCallError;
    type Future = BoxedFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut invocation: Invocation) -> Self::Future {
        let deadline = invocation.stamp_deadline();
        let pool = self.registry.pool(&invocation.service);
        Box::pin(async move {
            let pool = pool?;
            let Invocation {
                operation,
                arguments,
                ..
            } = invocation;
            tokio::task::spawn_blocking(move || {
                execute(&pool, &operation, &arguments, Some(deadline))
            })
            .await
            .map_err(|err| {
                ServiceCallError::Internal(anyhow::anyhow!("invocation task failed: {err}"))
            })?
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
