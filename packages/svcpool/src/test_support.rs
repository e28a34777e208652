//! Shared fixtures for unit tests: a small facade with overloads, failures
//! and a slow operation, plus factories that count what they create.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use svcpool_core::{
    into_instance, DescriptorError, Instance, InterfaceType, OperationDescriptor,
    ServiceDescriptor, ServiceInterface, Value, ValueType,
};

use crate::config::PoolConfig;
use crate::pool::{InstanceFactory, InstancePool};

pub trait TestFacade: Send {
    fn method1(&mut self);
    fn state(&mut self, text: &str) -> String;
    fn add(&mut self, left: i64, right: i64) -> i64;
    fn fail(&mut self) -> anyhow::Result<()>;
    fn sleep(&mut self, millis: u64);
}

#[derive(Default)]
pub struct TestFacadeImpl {
    pub calls: usize,
}

impl TestFacade for TestFacadeImpl {
    fn method1(&mut self) {
        self.calls += 1;
    }

    fn state(&mut self, text: &str) -> String {
        self.calls += 1;
        format!("State is :{text}")
    }

    fn add(&mut self, left: i64, right: i64) -> i64 {
        left + right
    }

    fn fail(&mut self) -> anyhow::Result<()> {
        anyhow::bail!("remote fault")
    }

    fn sleep(&mut self, millis: u64) {
        std::thread::sleep(Duration::from_millis(millis));
    }
}

impl ServiceInterface for dyn TestFacade {
    fn operations() -> Result<Vec<OperationDescriptor>, DescriptorError> {
        Ok(vec![
            OperationDescriptor::builder("method1")
                .bind::<dyn TestFacade, _>(|facade, _| {
                    facade.method1();
                    Ok(Value::Null)
                })
                .build()?,
            OperationDescriptor::builder("method1")
                .parameter(ValueType::String)
                .result(ValueType::String)
                .bind::<dyn TestFacade, _>(|facade, args| {
                    Ok(facade.state(Value::str_at(args, 0)?).into())
                })
                .build()?,
            OperationDescriptor::builder("add")
                .parameter(ValueType::Int)
                .parameter_extra([ValueType::Int])
                .result(ValueType::Int)
                .bind::<dyn TestFacade, _>(|facade, args| {
                    Ok(facade
                        .add(Value::int_at(args, 0)?, Value::int_at(args, 1)?)
                        .into())
                })
                .build()?,
            OperationDescriptor::builder("fail")
                .bind::<dyn TestFacade, _>(|facade, _| {
                    facade.fail()?;
                    Ok(Value::Null)
                })
                .build()?,
            OperationDescriptor::builder("explode")
                .bind::<dyn TestFacade, _>(|_, _| panic!("explode"))
                .build()?,
            OperationDescriptor::builder("sleep")
                .parameter(ValueType::Int)
                .bind::<dyn TestFacade, _>(|facade, args| {
                    let millis = u64::try_from(Value::int_at(args, 0)?)?;
                    facade.sleep(millis);
                    Ok(Value::Null)
                })
                .build()?,
            OperationDescriptor::builder("unbound").build()?,
        ])
    }
}

pub fn test_descriptor() -> ServiceDescriptor {
    ServiceDescriptor::builder()
        .id("TestFacade")
        .describe::<dyn TestFacade>()
        .build()
        .unwrap()
}

/// Factory producing `TestFacadeImpl`s; `created` counts every call.
pub fn counting_factory(created: Arc<AtomicUsize>) -> InstanceFactory {
    Arc::new(move |_interface: &InterfaceType| -> anyhow::Result<Instance> {
        created.fetch_add(1, Ordering::SeqCst);
        let facade: Box<dyn TestFacade> = Box::<TestFacadeImpl>::default();
        Ok(into_instance(facade))
    })
}

pub fn wrong_type_factory() -> InstanceFactory {
    Arc::new(|_interface: &InterfaceType| -> anyhow::Result<Instance> { Ok(Box::new(42_u32)) })
}

pub fn failing_factory() -> InstanceFactory {
    Arc::new(|_interface: &InterfaceType| -> anyhow::Result<Instance> {
        anyhow::bail!("backend unavailable")
    })
}

pub fn pool_config(minimum: usize, maximum: usize) -> PoolConfig {
    PoolConfig {
        minimum_instances: minimum,
        maximum_instances: maximum,
        ..PoolConfig::default()
    }
}

/// A started pool of `TestFacade` with its creation counter.
pub fn started_pool(minimum: usize, maximum: usize) -> (Arc<InstancePool>, Arc<AtomicUsize>) {
    let created = Arc::new(AtomicUsize::new(0));
    let pool = InstancePool::new(
        test_descriptor(),
        counting_factory(Arc::clone(&created)),
        pool_config(minimum, maximum),
    )
    .unwrap();
    pool.start().unwrap();
    (Arc::new(pool), created)
}
