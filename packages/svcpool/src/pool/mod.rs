//! Bounded pools of service instances.
//!
//! - [`instance_pool`]: the pool monitor (acquire, release, lifecycle)
//! - [`lease`]: RAII handle returning an instance to its pool on drop

pub mod instance_pool;
pub mod lease;

pub use instance_pool::{InstanceFactory, InstancePool, PoolStats};
pub use lease::InstanceLease;
