use std::any::Any;
use std::fmt;

use svcpool_core::Instance;

use super::instance_pool::{InstancePool, Slot};

/// Exclusive loan of one pooled instance.
///
/// Dropping the lease hands the instance back to the pool it came from, on
/// every path including unwinding.
pub struct InstanceLease<'a> {
    pool: &'a InstancePool,
    id: u64,
    instance: Instance,
}

impl<'a> InstanceLease<'a> {
    pub(super) fn new(pool: &'a InstancePool, slot: Slot) -> Self {
        Self {
            pool,
            id: slot.id,
            instance: slot.instance,
        }
    }

    /// Pool-local identity of the leased instance.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn pool(&self) -> &'a InstancePool {
        self.pool
    }

    /// The instance as the executables see it.
    pub fn instance_mut(&mut self) -> &mut (dyn Any + Send + 'static) {
        self.instance.as_mut()
    }

    /// The instance as facade `I`, if it was produced as `Box<I>`.
    pub fn facade_mut<I: ?Sized + 'static>(&mut self) -> Option<&mut I> {
        self.instance
            .downcast_mut::<Box<I>>()
            .map(|facade| facade.as_mut())
    }
}

impl Drop for InstanceLease<'_> {
    fn drop(&mut self) {
        // A unit box does not allocate.
        let instance = std::mem::replace(&mut self.instance, Box::new(()));
        self.pool.release_slot(Slot {
            id: self.id,
            instance,
        });
    }
}

impl fmt::Debug for InstanceLease<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceLease")
            .field("service_id", &self.pool.service_id())
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
