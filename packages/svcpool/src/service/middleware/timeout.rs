//! Deadline middleware for invocations.
//!
//! Fixes each invocation's absolute deadline on entry and answers with
//! `ServiceCallError::Timeout` once it passes. The same deadline travels down
//! to the dispatcher, which stops waiting for an instance at that instant, so
//! an invocation answered with a timeout never starts afterwards. An operation
//! that already started is not interrupted; its instance comes back to the
//! pool when it finishes.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use svcpool_core::Value;
use tower::{Layer, Service};

use crate::error::ServiceCallError;
use crate::service::dispatch::Invocation;

/// Stamps and enforces the per-invocation deadline.
#[derive(Debug, Clone)]
pub struct TimeoutLayer;

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
}

impl<S> Service<Invocation> for TimeoutService<S>
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

    fn call(&mut self, mut invocation: Invocation) -> Self::Future {
        let timeout_ms = invocation.timeout_ms;
        let deadline = tokio::time::Instant::from_std(invocation.stamp_deadline());
        let fut = self.inner.call(invocation);
        Box::pin(async move {
            tokio::time::timeout_at(deadline, fut)
                .await
                .unwrap_or(Err(ServiceCallError::Timeout { timeout_ms }))
        })
    }
}
