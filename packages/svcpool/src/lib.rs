//! `svcpool` runtime: bounded instance pools, prepared calls dispatched by
//! operation name, a registry of pooled services and an async invocation
//! pipeline built on `tower`.

pub mod config;
pub mod error;
pub mod pool;
pub mod service;

#[cfg(test)]
mod test_support;

pub use config::{PoolConfig, PoolConfigError, RegistryConfig};
pub use error::ServiceCallError;
pub use pool::{InstanceFactory, InstanceLease, InstancePool, PoolStats};
pub use service::{
    build_invocation_pipeline, CallBuilder, CallHandle, Invocation, RegistryService, ServiceCall,
    ServiceRegistry,
};
pub use svcpool_core::{
    into_instance, ArityPolicy, DescriptorError, Instance, InterfaceType, OperationDescriptor,
    ServiceBuilder, ServiceDescriptor, ServiceInterface, Value, ValueType,
};
