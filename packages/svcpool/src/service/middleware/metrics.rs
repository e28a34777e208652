//! Invocation outcome logging.
//!
//! Every invocation runs inside an `invocation` span that records how long
//! the call took and how it ended. Outcomes separate callers that were
//! turned away before reaching an instance from operations that failed.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use svcpool_core::Value;
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::error::ServiceCallError;
use crate::service::dispatch::Invocation;

/// How an invocation ended, as recorded on its span.
pub(crate) fn outcome(result: &Result<Value, ServiceCallError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(ServiceCallError::Timeout { .. }) => "timeout",
        Err(ServiceCallError::AcquireTimeout { .. }) => "saturated",
        Err(ServiceCallError::ServiceExecutionFailure { .. }) => "failed",
        Err(
            ServiceCallError::NoRegisteredService { .. }
            | ServiceCallError::OperationNotFound { .. }
            | ServiceCallError::OperationParameterMismatch { .. },
        ) => "rejected",
        Err(_) => "unavailable",
    }
}

#[derive(Debug, Clone)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<Invocation> for MetricsService<S>
where
    S: Service<Invocation, Response = Value, Error = ServiceCallError> + Send,
    S::Future: Send + 'static,
{
    type Response = Value;
    type Error = ServiceCallError;
    type Future = Pin<Box<dyn Future<Output = Result<Value, ServiceCallError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, invocation: Invocation) -> Self::Future {
        let span = info_span!(
            "invocation",
            service = %invocation.service,
            operation = %invocation.operation,
            arguments = invocation.arguments.len(),
            timeout_ms = invocation.timeout_ms,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );
        let fut = self.inner.call(invocation);

        Box::pin(
            async move {
                let started = Instant::now();
                let result = fut.await;
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                let outcome = outcome(&result);

                let span = tracing::Span::current();
                span.record("duration_ms", duration_ms);
                span.record("outcome", outcome);
                match &result {
                    Ok(_) => tracing::debug!(duration_ms, "invocation complete"),
                    Err(err) => tracing::warn!(duration_ms, outcome, error = %err, "invocation failed"),
                }
                result
            }
            .instrument(span),
        )
    }
}
