//! Errors raised while describing services and resolving operations.

/// Invalid service or operation description.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    #[error("service id must not be empty")]
    EmptyServiceId,
    #[error("service {service_id} has no interface type")]
    MissingInterface { service_id: String },
    #[error("operation name must not be empty")]
    MissingOperationName,
    #[error("operation {signature} is declared more than once")]
    DuplicateOperation { signature: String },
}

/// Failure to select a registered operation for a call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("operation not found: {operation}")]
    OperationNotFound { operation: String },
    #[error("no overload of {operation} accepts the argument at position {position}")]
    OperationParameterMismatch { operation: String, position: usize },
}
