//! Bounded, lazily grown pool of service instances.
//!
//! All bookkeeping lives behind one mutex paired with one condition variable.
//! Growth on acquire runs the factory with the mutex released; a reserved
//! creation slot (`creating`) keeps the capacity bound exact while it runs.
//! Eager creation in `start` happens under the mutex, before the pool is
//! visible as active.

use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;
use svcpool_core::{Instance, InterfaceType, OperationTable, ServiceDescriptor};
use tracing::{debug, error, info, warn};

use super::lease::InstanceLease;
use crate::config::PoolConfig;
use crate::error::ServiceCallError;

/// Produces a fresh instance implementing the given interface.
pub type InstanceFactory =
    Arc<dyn Fn(&InterfaceType) -> anyhow::Result<Instance> + Send + Sync>;

/// An instance together with its pool-local identity.
pub(crate) struct Slot {
    pub(crate) id: u64,
    pub(crate) instance: Instance,
}

#[derive(Default)]
struct PoolState {
    active: bool,
    available: Vec<Slot>,
    in_use: HashSet<u64>,
    creating: usize,
    waiting: usize,
    next_id: u64,
    created_total: u64,
    acquired_total: u64,
}

impl PoolState {
    fn live(&self) -> usize {
        self.available.len() + self.in_use.len() + self.creating
    }

    fn admit(&mut self, instance: Instance) -> Slot {
        let id = self.next_id;
        self.next_id += 1;
        self.created_total += 1;
        Slot { id, instance }
    }
}

/// Point-in-time view of a pool's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub active: bool,
    pub available: usize,
    pub in_use: usize,
    pub creating: usize,
    pub waiting: usize,
    pub created_total: u64,
    pub acquired_total: u64,
}

/// A bounded pool of instances of one registered service.
///
/// Instances are created on demand up to `maximum_instances` and are never
/// destroyed while the pool is active. An instance is either idle in the pool
/// or held by exactly one [`InstanceLease`].
pub struct InstancePool {
    descriptor: ServiceDescriptor,
    operations: OperationTable,
    factory: InstanceFactory,
    config: PoolConfig,
    state: Mutex<PoolState>,
    released: Condvar,
}

impl InstancePool {
    /// Creates an inactive pool. Call [`start`](Self::start) before use.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceCallError::InvalidPoolConfiguration`] when the sizing
    /// bounds in `config` are inconsistent.
    pub fn new(
        descriptor: ServiceDescriptor,
        factory: InstanceFactory,
        config: PoolConfig,
    ) -> Result<Self, ServiceCallError> {
        config
            .validate()
            .map_err(|err| ServiceCallError::InvalidPoolConfiguration {
                service_id: descriptor.id().to_string(),
                reason: err.to_string(),
            })?;
        let operations = OperationTable::new(descriptor.operations().iter().cloned());
        Ok(Self {
            descriptor,
            operations,
            factory,
            config,
            state: Mutex::new(PoolState::default()),
            released: Condvar::new(),
        })
    }

    #[must_use]
    pub fn service_id(&self) -> &str {
        self.descriptor.id()
    }

    #[must_use]
    pub fn interface(&self) -> InterfaceType {
        self.descriptor.interface()
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    #[must_use]
    pub fn operations(&self) -> &OperationTable {
        &self.operations
    }

    /// Distinct operation names in declaration order.
    #[must_use]
    pub fn operation_names(&self) -> Vec<&str> {
        self.operations.names().collect()
    }

    /// Descriptor of the pooled service.
    #[must_use]
    pub fn descriptor(&self) -> ServiceDescriptor {
        self.descriptor.clone()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.lock().active
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            active: state.active,
            available: state.available.len(),
            in_use: state.in_use.len(),
            creating: state.creating,
            waiting: state.waiting,
            created_total: state.created_total,
            acquired_total: state.acquired_total,
        }
    }

    /// Activates the pool and eagerly creates `minimum_instances`, bounded by
    /// the capacity left over by instances still leased out. Starting an
    /// active pool is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the creation error of the first instance that could not be
    /// made; the pool then stays inactive and keeps none of the instances
    /// created so far.
    pub fn start(&self) -> Result<(), ServiceCallError> {
        let mut state = self.state.lock();
        if state.active {
            return Ok(());
        }
        let capacity = self.config.maximum_instances.saturating_sub(state.live());
        let target = self.config.minimum_instances.min(capacity);
        let mut created = Vec::with_capacity(target);
        for _ in 0..target {
            match self.create_instance() {
                Ok(instance) => created.push(instance),
                Err(err) => {
                    drop(state);
                    error!(service_id = %self.service_id(), error = %err, "instance pool failed to start");
                    return Err(err);
                }
            }
        }
        for instance in created {
            let slot = state.admit(instance);
            state.available.push(slot);
        }
        state.active = true;
        let available = state.available.len();
        drop(state);
        info!(service_id = %self.service_id(), available, "instance pool started");
        Ok(())
    }

    /// Deactivates the pool, drops idle instances and wakes every blocked
    /// acquirer. Leased instances are dropped when they come back.
    pub fn shutdown(&self) {
        let idle = {
            let mut state = self.state.lock();
            state.active = false;
            std::mem::take(&mut state.available)
        };
        self.released.notify_all();
        info!(service_id = %self.service_id(), dropped = idle.len(), "instance pool shut down");
        drop(idle);
    }

    /// Leases an instance, waiting at most `PoolConfig::acquire_timeout`
    /// (indefinitely when unset).
    ///
    /// # Errors
    ///
    /// See [`acquire_until`](Self::acquire_until).
    pub fn acquire(&self) -> Result<InstanceLease<'_>, ServiceCallError> {
        match self.config.acquire_timeout {
            Some(timeout) => self.acquire_timeout(timeout),
            None => self.acquire_inner(Instant::now(), None),
        }
    }

    /// Leases an instance, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// See [`acquire_until`](Self::acquire_until).
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<InstanceLease<'_>, ServiceCallError> {
        let started = Instant::now();
        self.acquire_inner(started, Some(started + timeout))
    }

    /// Leases an instance, waiting until `deadline` at the latest.
    ///
    /// # Errors
    ///
    /// - [`ServiceCallError::PoolInactive`] if the pool is (or becomes) inactive.
    /// - [`ServiceCallError::AcquireTimeout`] if the deadline passes first.
    /// - [`ServiceCallError::InstanceCreation`] if the factory fails.
    /// - [`ServiceCallError::InvalidPoolConfiguration`] if the factory produced
    ///   an instance of the wrong type; this disables the pool.
    pub fn acquire_until(&self, deadline: Instant) -> Result<InstanceLease<'_>, ServiceCallError> {
        self.acquire_inner(Instant::now(), Some(deadline))
    }

    fn acquire_inner(
        &self,
        started: Instant,
        deadline: Option<Instant>,
    ) -> Result<InstanceLease<'_>, ServiceCallError> {
        let mut reported_saturation = false;
        let mut state = self.state.lock();
        loop {
            if !state.active {
                return Err(self.inactive());
            }

            if let Some(slot) = state.available.pop() {
                state.in_use.insert(slot.id);
                state.acquired_total += 1;
                debug!(service_id = %self.service_id(), instance = slot.id, "instance acquired");
                return Ok(InstanceLease::new(self, slot));
            }

            if state.live() < self.config.maximum_instances {
                return self.grow(state);
            }

            if !reported_saturation {
                reported_saturation = true;
                warn!(
                    service_id = %self.service_id(),
                    maximum_instances = self.config.maximum_instances,
                    "instance pool saturated, waiting for a release"
                );
            }

            state.waiting += 1;
            let timed_out = match deadline {
                Some(deadline) => self.released.wait_until(&mut state, deadline).timed_out(),
                None => {
                    self.released.wait(&mut state);
                    false
                }
            };
            state.waiting -= 1;

            // A release that lands after the deadline is passed on to the
            // next waiter instead of being taken late.
            let expired =
                timed_out || deadline.is_some_and(|deadline| Instant::now() >= deadline);
            if expired && state.active {
                if !state.available.is_empty() {
                    self.released.notify_one();
                }
                let waited_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                return Err(ServiceCallError::AcquireTimeout {
                    service_id: self.service_id().to_string(),
                    waited_ms,
                });
            }
        }
    }

    /// Creates one instance with the lock released and leases it out.
    fn grow<'a>(
        &'a self,
        mut state: MutexGuard<'a, PoolState>,
    ) -> Result<InstanceLease<'a>, ServiceCallError> {
        state.creating += 1;
        let created = MutexGuard::unlocked(&mut state, || self.create_instance());
        state.creating -= 1;

        match created {
            Ok(instance) if state.active => {
                let slot = state.admit(instance);
                state.in_use.insert(slot.id);
                state.acquired_total += 1;
                debug!(service_id = %self.service_id(), instance = slot.id, "instance created and acquired");
                Ok(InstanceLease::new(self, slot))
            }
            Ok(instance) => {
                drop(state);
                drop(instance);
                Err(self.inactive())
            }
            Err(err @ ServiceCallError::InvalidPoolConfiguration { .. }) => {
                state.active = false;
                let idle = std::mem::take(&mut state.available);
                drop(state);
                self.released.notify_all();
                error!(service_id = %self.service_id(), error = %err, "instance pool disabled");
                drop(idle);
                Err(err)
            }
            Err(err) => {
                drop(state);
                self.released.notify_one();
                warn!(service_id = %self.service_id(), error = %err, "instance creation failed");
                Err(err)
            }
        }
    }

    /// Runs the factory and checks the instance against the interface.
    fn create_instance(&self) -> Result<Instance, ServiceCallError> {
        let interface = self.interface();
        let produced = panic::catch_unwind(AssertUnwindSafe(|| (self.factory)(&interface)))
            .unwrap_or_else(|_| Err(anyhow::anyhow!("instance factory panicked")));
        let instance = produced.map_err(|source| ServiceCallError::InstanceCreation {
            service_id: self.service_id().to_string(),
            source,
        })?;
        if !interface.accepts(&instance) {
            return Err(ServiceCallError::InvalidPoolConfiguration {
                service_id: self.service_id().to_string(),
                reason: format!("factory produced an instance that does not implement {interface}"),
            });
        }
        Ok(instance)
    }

    /// Returns a lease to the pool. Equivalent to dropping it.
    pub fn release(&self, lease: InstanceLease<'_>) {
        if !std::ptr::eq(lease.pool(), self) {
            error!(
                service_id = %self.service_id(),
                owner = %lease.pool().service_id(),
                "lease released to a pool that did not issue it"
            );
        }
        drop(lease);
    }

    pub(crate) fn release_slot(&self, slot: Slot) {
        let mut state = self.state.lock();
        if !state.in_use.remove(&slot.id) {
            drop(state);
            error!(service_id = %self.service_id(), instance = slot.id, "released instance was not in use");
            return;
        }
        if state.active {
            debug!(service_id = %self.service_id(), instance = slot.id, "instance released");
            state.available.push(slot);
            drop(state);
            self.released.notify_one();
        } else {
            drop(state);
            debug!(service_id = %self.service_id(), instance = slot.id, "instance dropped by inactive pool");
        }
    }

    fn inactive(&self) -> ServiceCallError {
        ServiceCallError::PoolInactive {
            service_id: self.service_id().to_string(),
        }
    }
}

impl std::fmt::Debug for InstancePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstancePool")
            .field("service_id", &self.service_id())
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
