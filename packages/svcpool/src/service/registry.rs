use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use svcpool_core::{
    Instance, InterfaceType, ServiceBuilder, ServiceDescriptor, ServiceInterface,
};
use tracing::{debug, info};

use super::call::{CallHandle, ServiceCall};
use crate::config::{PoolConfig, RegistryConfig};
use crate::error::ServiceCallError;
use crate::pool::{InstanceFactory, InstancePool};

// ---------------------------------------------------------------------------
// ServiceRegistry
// ---------------------------------------------------------------------------

/// Registry of pooled services.
///
/// Every registered service gets its own [`InstancePool`], reachable by two
/// keys:
/// - **By id**: the descriptor's service id
/// - **By interface**: the facade's canonical type name, bound to the first
///   service registered for that facade
///
/// Both kinds of key share one namespace. Lookups are lock-free reads;
/// registration is serialised.
pub struct ServiceRegistry {
    config: RegistryConfig,
    /// Service id or interface name -> pool.
    pools: DashMap<String, Arc<InstancePool>>,
    /// Registered service ids in registration order. Held while registering.
    registration_order: Mutex<Vec<String>>,
}

impl ServiceRegistry {
    /// Creates an empty registry with default pool settings.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            config,
            pools: DashMap::new(),
            registration_order: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// A fresh descriptor builder.
    #[must_use]
    pub fn service_builder() -> ServiceBuilder {
        ServiceBuilder::new()
    }

    /// Registers `descriptor` with the registry's default pool settings and
    /// starts its pool.
    ///
    /// # Errors
    ///
    /// See [`register_with_config`](Self::register_with_config).
    pub fn register<F>(
        &self,
        descriptor: ServiceDescriptor,
        factory: F,
    ) -> Result<Arc<InstancePool>, ServiceCallError>
    where
        F: Fn(&InterfaceType) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        let config = self.config.pool.clone();
        self.register_with_config(descriptor, Arc::new(factory), config)
    }

    /// Derives the descriptor of facade `I` under `id` (the facade's type
    /// name when empty) and registers it with the default pool settings.
    ///
    /// # Errors
    ///
    /// [`ServiceCallError::InvalidDescriptor`] when the facade's operations
    /// do not form a valid descriptor, otherwise as
    /// [`register_with_config`](Self::register_with_config).
    pub fn register_interface<I, F>(
        &self,
        id: impl Into<String>,
        factory: F,
    ) -> Result<Arc<InstancePool>, ServiceCallError>
    where
        I: ServiceInterface + ?Sized,
        F: Fn(&InterfaceType) -> anyhow::Result<Instance> + Send + Sync + 'static,
    {
        let descriptor = Self::service_builder().id(id).describe::<I>().build()?;
        self.register(descriptor, factory)
    }

    /// Registers `descriptor` with explicit pool settings and starts its pool.
    ///
    /// # Errors
    ///
    /// - [`ServiceCallError::ServiceAlreadyRegistered`] if the id is already a
    ///   key of this registry; nothing changes.
    /// - [`ServiceCallError::InvalidPoolConfiguration`] for inconsistent sizing.
    /// - Any error from starting the pool; the service is then not registered.
    pub fn register_with_config(
        &self,
        descriptor: ServiceDescriptor,
        factory: InstanceFactory,
        config: PoolConfig,
    ) -> Result<Arc<InstancePool>, ServiceCallError> {
        let mut order = self.registration_order.lock();
        let service_id = descriptor.id().to_string();
        if self.pools.contains_key(&service_id) {
            return Err(ServiceCallError::ServiceAlreadyRegistered { service_id });
        }

        let interface = descriptor.interface();
        let pool = Arc::new(InstancePool::new(descriptor, factory, config)?);
        pool.start()?;

        self.pools.insert(service_id.clone(), Arc::clone(&pool));
        let aliased = !self.pools.contains_key(interface.name());
        if aliased {
            self.pools
                .insert(interface.name().to_string(), Arc::clone(&pool));
        }
        order.push(service_id.clone());
        drop(order);

        info!(
            service_id = %service_id,
            interface = %interface,
            aliased,
            operations = pool.operations().len(),
            "service registered"
        );
        Ok(pool)
    }

    /// The pool registered under `key` (service id or interface name).
    ///
    /// # Errors
    ///
    /// Returns [`ServiceCallError::NoRegisteredService`] for an unknown key.
    pub fn pool(&self, key: &str) -> Result<Arc<InstancePool>, ServiceCallError> {
        self.pools
            .get(key)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ServiceCallError::NoRegisteredService {
                key: key.to_string(),
            })
    }

    /// The pool bound to facade `I`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceCallError::NoRegisteredService`] if no service was
    /// registered for `I`.
    pub fn pool_for<I: ?Sized + 'static>(&self) -> Result<Arc<InstancePool>, ServiceCallError> {
        self.pool(InterfaceType::of::<I>().name())
    }

    /// # Errors
    ///
    /// Returns [`ServiceCallError::NoRegisteredService`] for an unknown key.
    pub fn prepare_call(&self, key: &str) -> Result<ServiceCall, ServiceCallError> {
        self.pool(key).map(ServiceCall::new)
    }

    /// # Errors
    ///
    /// Returns [`ServiceCallError::NoRegisteredService`] if no service was
    /// registered for `I`.
    pub fn prepare_call_for<I: ?Sized + 'static>(&self) -> Result<ServiceCall, ServiceCallError> {
        self.pool_for::<I>().map(ServiceCall::new)
    }

    /// Reusable handle for `operation` of the service under `key`.
    ///
    /// # Errors
    ///
    /// [`ServiceCallError::NoRegisteredService`] for an unknown key,
    /// [`ServiceCallError::OperationNotFound`] for an unknown operation.
    pub fn prepare_operation(
        &self,
        key: &str,
        operation: &str,
    ) -> Result<CallHandle, ServiceCallError> {
        self.prepare_call(key)?.handle(operation)
    }

    /// Descriptor of the service under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceCallError::NoRegisteredService`] for an unknown key.
    pub fn descriptor(&self, key: &str) -> Result<ServiceDescriptor, ServiceCallError> {
        self.pool(key).map(|pool| pool.descriptor())
    }

    /// Registered service ids in registration order.
    #[must_use]
    pub fn service_ids(&self) -> Vec<String> {
        self.registration_order.lock().clone()
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.pools.contains_key(key)
    }

    /// Shuts down every pool, in reverse registration order.
    pub fn shutdown(&self) {
        let order = self.service_ids();
        for service_id in order.iter().rev() {
            if let Some(pool) = self.pools.get(service_id).map(|entry| Arc::clone(entry.value())) {
                pool.shutdown();
            }
        }
        debug!(services = order.len(), "registry shut down");
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.service_ids())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use svcpool_core::{into_instance, DescriptorError, OperationDescriptor, Value};

    use super::*;
    use crate::test_support::{
        counting_factory, failing_factory, pool_config, test_descriptor, TestFacade,
        TestFacadeImpl,
    };

    fn facade_factory(_: &InterfaceType) -> anyhow::Result<Instance> {
        let facade: Box<dyn TestFacade> = Box::<TestFacadeImpl>::default();
        Ok(into_instance(facade))
    }

    fn descriptor_with_id(id: &str) -> ServiceDescriptor {
        ServiceBuilder::from(&test_descriptor()).id(id).build().unwrap()
    }

    #[test]
    fn register_and_lookup_by_id_and_interface() {
        let registry = ServiceRegistry::new();
        let pool = registry.register(test_descriptor(), facade_factory).unwrap();
        assert_eq!(pool.stats().available, 2);

        let by_id = registry.pool("TestFacade").unwrap();
        let by_type = registry.pool_for::<dyn TestFacade>().unwrap();
        assert!(Arc::ptr_eq(&by_id, &pool));
        assert!(Arc::ptr_eq(&by_type, &pool));
        assert_eq!(registry.service_ids(), vec!["TestFacade".to_string()]);
    }

    trait Pinger: Send {}

    impl ServiceInterface for dyn Pinger {
        fn operations() -> Result<Vec<OperationDescriptor>, DescriptorError> {
            Ok(vec![
                OperationDescriptor::builder("ping").build()?,
                OperationDescriptor::builder("ping").build()?,
            ])
        }
    }

    #[test]
    fn register_interface_derives_the_descriptor() {
        let registry = ServiceRegistry::new();
        let pool = registry
            .register_interface::<dyn TestFacade, _>("", facade_factory)
            .unwrap();
        assert_eq!(pool.service_id(), "TestFacade");
        assert_eq!(registry.descriptor("TestFacade").unwrap(), test_descriptor());
        assert_eq!(
            registry
                .prepare_operation("TestFacade", "add")
                .unwrap()
                .invoke(&[Value::from(4), Value::from(5)])
                .unwrap(),
            Value::Int(9)
        );
    }

    #[test]
    fn register_interface_rejects_invalid_operations() {
        let registry = ServiceRegistry::new();
        let err = registry
            .register_interface::<dyn Pinger, _>("pinger", facade_factory)
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceCallError::InvalidDescriptor(DescriptorError::DuplicateOperation { .. })
        ));
        assert!(!registry.contains("pinger"));
        assert!(registry.service_ids().is_empty());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = ServiceRegistry::new();
        let first = registry.register(test_descriptor(), facade_factory).unwrap();

        let created = Arc::new(AtomicUsize::new(0));
        let err = registry
            .register_with_config(
                test_descriptor(),
                counting_factory(Arc::clone(&created)),
                PoolConfig::default(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceCallError::ServiceAlreadyRegistered { ref service_id } if service_id == "TestFacade"
        ));
        assert_eq!(created.load(Ordering::SeqCst), 0);
        assert!(Arc::ptr_eq(&registry.pool("TestFacade").unwrap(), &first));
        assert_eq!(registry.service_ids().len(), 1);
    }

    #[test]
    fn interface_key_stays_with_first_service() {
        let registry = ServiceRegistry::new();
        let first = registry
            .register(descriptor_with_id("first"), facade_factory)
            .unwrap();
        let second = registry
            .register(descriptor_with_id("second"), facade_factory)
            .unwrap();

        assert!(Arc::ptr_eq(&registry.pool_for::<dyn TestFacade>().unwrap(), &first));
        assert!(Arc::ptr_eq(&registry.pool("second").unwrap(), &second));
        assert_eq!(registry.service_ids(), vec!["first", "second"]);
    }

    #[test]
    fn unknown_key_is_reported() {
        let registry = ServiceRegistry::new();
        let err = registry.prepare_call("nope").unwrap_err();
        assert!(matches!(
            err,
            ServiceCallError::NoRegisteredService { ref key } if key == "nope"
        ));
        assert!(registry.descriptor("nope").is_err());
        assert!(registry.prepare_call_for::<dyn TestFacade>().is_err());
    }

    #[test]
    fn failed_start_registers_nothing() {
        let registry = ServiceRegistry::new();
        let err = registry
            .register_with_config(test_descriptor(), failing_factory(), pool_config(1, 2))
            .unwrap_err();
        assert!(matches!(err, ServiceCallError::InstanceCreation { .. }));
        assert!(!registry.contains("TestFacade"));
        assert!(registry.service_ids().is_empty());
    }

    #[test]
    fn invalid_config_registers_nothing() {
        let registry = ServiceRegistry::new();
        let err = registry
            .register_with_config(
                test_descriptor(),
                counting_factory(Arc::default()),
                pool_config(3, 1),
            )
            .unwrap_err();
        assert!(matches!(err, ServiceCallError::InvalidPoolConfiguration { .. }));
        assert!(!registry.contains("TestFacade"));
    }

    #[test]
    fn prepared_operation_invokes() {
        let registry = ServiceRegistry::new();
        registry.register(test_descriptor(), facade_factory).unwrap();
        let handle = registry.prepare_operation("TestFacade", "method1").unwrap();
        assert_eq!(
            handle.invoke(&[Value::from("Hi")]).unwrap(),
            Value::from("State is :Hi")
        );
        assert!(matches!(
            registry.prepare_operation("TestFacade", "missing").unwrap_err(),
            ServiceCallError::OperationNotFound { .. }
        ));
    }

    #[test]
    fn descriptor_round_trips_through_registry() {
        let registry = ServiceRegistry::new();
        registry.register(test_descriptor(), facade_factory).unwrap();
        assert_eq!(registry.descriptor("TestFacade").unwrap(), test_descriptor());
    }

    #[test]
    fn registry_config_sizes_new_pools() {
        let registry = ServiceRegistry::with_config(RegistryConfig {
            pool: pool_config(4, 6),
        });
        let pool = registry.register(test_descriptor(), facade_factory).unwrap();
        assert_eq!(pool.stats().available, 4);
        assert_eq!(pool.config().maximum_instances, 6);
    }

    #[test]
    fn shutdown_cascades_to_pools() {
        let registry = ServiceRegistry::new();
        let first = registry
            .register(descriptor_with_id("first"), facade_factory)
            .unwrap();
        let second = registry
            .register(descriptor_with_id("second"), facade_factory)
            .unwrap();
        registry.shutdown();
        assert!(!first.is_active());
        assert!(!second.is_active());
        assert!(matches!(
            registry
                .prepare_operation("first", "method1")
                .unwrap()
                .invoke_none()
                .unwrap_err(),
            ServiceCallError::PoolInactive { .. }
        ));
    }

    #[test]
    fn service_builder_is_fresh() {
        let descriptor = ServiceRegistry::service_builder()
            .id("built")
            .describe::<dyn TestFacade>()
            .build()
            .unwrap();
        assert_eq!(descriptor.id(), "built");
    }
}
