//! Caller-visible failures of registration, lookup and invocation.

use svcpool_core::{DescriptorError, ResolveError};

/// Errors returned by the registry, pools and call handles.
///
/// None of these are retried automatically. Only `InvalidPoolConfiguration`
/// raised by an acquire has an effect beyond the failing call: it disables the
/// pool.
#[derive(Debug, thiserror::Error)]
pub enum ServiceCallError {
    #[error("service {service_id} is already registered")]
    ServiceAlreadyRegistered { service_id: String },
    #[error("no registered service for {key}")]
    NoRegisteredService { key: String },
    #[error("operation not found: {operation}")]
    OperationNotFound { operation: String },
    #[error("no overload of {operation} accepts the argument at position {position}")]
    OperationParameterMismatch { operation: String, position: usize },
    #[error("invalid pool configuration for {service_id}: {reason}")]
    InvalidPoolConfiguration { service_id: String, reason: String },
    #[error("cannot execute operation {operation} of service {service_id}")]
    ServiceExecutionFailure {
        service_id: String,
        operation: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("no instance of {service_id} became free within {waited_ms}ms")]
    AcquireTimeout { service_id: String, waited_ms: u64 },
    #[error("instance pool for {service_id} is not active")]
    PoolInactive { service_id: String },
    #[error("cannot create an instance of {service_id}")]
    InstanceCreation {
        service_id: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("invalid service descriptor: {0}")]
    InvalidDescriptor(#[from] DescriptorError),
    #[error("invocation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ResolveError> for ServiceCallError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::OperationNotFound { operation } => Self::OperationNotFound { operation },
            ResolveError::OperationParameterMismatch {
                operation,
                position,
            } => Self::OperationParameterMismatch {
                operation,
                position,
            },
        }
    }
}
