//! Prepared calls: resolve an operation, lease an instance, run the bound
//! executable and hand the instance back.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use svcpool_core::{fit_arguments, ArityPolicy, ServiceDescriptor, Value};
use tracing::{error, trace, warn};

use crate::error::ServiceCallError;
use crate::pool::{InstanceLease, InstancePool};

/// Runs `operation` with `arguments` on an instance leased from `pool`.
///
/// Resolution failures never touch the pool. Once an instance is leased it
/// goes back to the pool on every path, including a panicking executable.
///
/// With a `deadline` the operation only starts if an instance is leased
/// before it passes; the pool's own `acquire_timeout` still applies when it
/// is the tighter bound.
pub(crate) fn execute(
    pool: &InstancePool,
    operation: &str,
    arguments: &[Value],
    deadline: Option<Instant>,
) -> Result<Value, ServiceCallError> {
    let resolved = pool.operations().resolve(operation, arguments)?;
    let policy = pool.config().arity_policy;
    let fitted = fit_arguments(resolved, arguments, policy)?;
    if fitted.dropped > 0 && policy == ArityPolicy::Truncate {
        warn!(
            service_id = %pool.service_id(),
            operation = %resolved,
            dropped = fitted.dropped,
            "surplus arguments dropped"
        );
    }

    let mut lease = match deadline {
        Some(deadline) => acquire_before(pool, deadline)?,
        None => pool.acquire()?,
    };
    trace!(service_id = %pool.service_id(), operation = %resolved, instance = lease.id(), "invoking");
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        resolved.invoke(lease.instance_mut(), fitted.arguments)
    }));
    drop(lease);

    let source = match outcome {
        Ok(Ok(value)) => return Ok(value),
        Ok(Err(source)) => source,
        Err(payload) => anyhow::anyhow!("operation panicked: {}", panic_message(payload.as_ref())),
    };
    error!(
        service_id = %pool.service_id(),
        operation = %resolved,
        error = %source,
        "operation failed"
    );
    Err(ServiceCallError::ServiceExecutionFailure {
        service_id: pool.service_id().to_string(),
        operation: operation.to_string(),
        source,
    })
}

fn acquire_before(
    pool: &InstancePool,
    deadline: Instant,
) -> Result<InstanceLease<'_>, ServiceCallError> {
    let now = Instant::now();
    if now >= deadline {
        return Err(ServiceCallError::AcquireTimeout {
            service_id: pool.service_id().to_string(),
            waited_ms: 0,
        });
    }
    let deadline = match pool.config().acquire_timeout {
        Some(timeout) => deadline.min(now + timeout),
        None => deadline,
    };
    pool.acquire_until(deadline)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

// ---------------------------------------------------------------------------
// CallHandle
// ---------------------------------------------------------------------------

/// Reusable, thread-safe handle for one named operation of a service.
///
/// The concrete overload is chosen per call from the argument types.
#[derive(Clone)]
pub struct CallHandle {
    operation: String,
    pool: Arc<InstancePool>,
}

impl CallHandle {
    pub(crate) fn new(pool: Arc<InstancePool>, operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            pool,
        }
    }

    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    #[must_use]
    pub fn service_id(&self) -> &str {
        self.pool.service_id()
    }

    /// Invokes the operation with `arguments`.
    ///
    /// # Errors
    ///
    /// Resolution errors (`OperationNotFound`, `OperationParameterMismatch`),
    /// acquire errors (`PoolInactive`, `AcquireTimeout`, `InstanceCreation`,
    /// `InvalidPoolConfiguration`) and `ServiceExecutionFailure` when the
    /// operation itself fails.
    pub fn invoke(&self, arguments: &[Value]) -> Result<Value, ServiceCallError> {
        execute(&self.pool, &self.operation, arguments, None)
    }

    /// Invokes the parameterless overload.
    ///
    /// # Errors
    ///
    /// See [`invoke`](Self::invoke).
    pub fn invoke_none(&self) -> Result<Value, ServiceCallError> {
        self.invoke(&[])
    }
}

impl fmt::Debug for CallHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallHandle")
            .field("service_id", &self.service_id())
            .field("operation", &self.operation)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ServiceCall / CallBuilder
// ---------------------------------------------------------------------------

/// Entry point for calling operations of one registered service.
#[derive(Clone)]
pub struct ServiceCall {
    pool: Arc<InstancePool>,
}

impl ServiceCall {
    pub(crate) fn new(pool: Arc<InstancePool>) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn service_id(&self) -> &str {
        self.pool.service_id()
    }

    #[must_use]
    pub fn descriptor(&self) -> ServiceDescriptor {
        self.pool.descriptor()
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<InstancePool> {
        &self.pool
    }

    /// Starts a one-shot call of `operation`.
    #[must_use]
    pub fn operation(&self, operation: impl Into<String>) -> CallBuilder {
        CallBuilder {
            pool: Arc::clone(&self.pool),
            operation: operation.into(),
            parameter: None,
            extras: Vec::new(),
        }
    }

    /// Returns a reusable handle for `operation`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceCallError::OperationNotFound`] if the service declares
    /// no operation of that name.
    pub fn handle(&self, operation: &str) -> Result<CallHandle, ServiceCallError> {
        if !self.pool.operations().contains(operation) {
            return Err(ServiceCallError::OperationNotFound {
                operation: operation.to_string(),
            });
        }
        Ok(CallHandle::new(Arc::clone(&self.pool), operation))
    }

    /// One handle per distinct operation name, in declaration order.
    #[must_use]
    pub fn handles(&self) -> Vec<CallHandle> {
        self.pool
            .operations()
            .names()
            .map(|name| CallHandle::new(Arc::clone(&self.pool), name))
            .collect()
    }
}

impl fmt::Debug for ServiceCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCall")
            .field("service_id", &self.service_id())
            .finish()
    }
}

/// Accumulates the arguments of a one-shot call.
///
/// Without a [`parameter`](Self::parameter) the call is parameterless and any
/// extra parameters are ignored, as for a call whose first argument is null.
#[must_use = "a call builder does nothing until executed"]
pub struct CallBuilder {
    pool: Arc<InstancePool>,
    operation: String,
    parameter: Option<Value>,
    extras: Vec<Value>,
}

impl CallBuilder {
    /// Sets the first argument.
    pub fn parameter(mut self, value: impl Into<Value>) -> Self {
        self.parameter = Some(value.into());
        self
    }

    /// Appends an argument after the first.
    pub fn parameter_ex(mut self, value: impl Into<Value>) -> Self {
        self.extras.push(value.into());
        self
    }

    /// The argument list the call will be made with.
    #[must_use]
    pub fn arguments(&self) -> Vec<Value> {
        match &self.parameter {
            Some(first) => std::iter::once(first.clone())
                .chain(self.extras.iter().cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Runs the call.
    ///
    /// # Errors
    ///
    /// See [`CallHandle::invoke`].
    pub fn execute(self) -> Result<Value, ServiceCallError> {
        let arguments = self.arguments();
        execute(&self.pool, &self.operation, &arguments, None)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
