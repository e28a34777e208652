#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use svcpool::{
    into_instance, DescriptorError, Instance, InstanceFactory, InstancePool, InterfaceType,
    OperationDescriptor, PoolConfig, ServiceDescriptor, ServiceInterface, Value, ValueType,
};

pub trait Greeter: Send {
    fn greet(&mut self) -> String;
    fn greet_name(&mut self, name: &str) -> String;
    fn fail(&mut self) -> anyhow::Result<()>;
    fn pause(&mut self, millis: u64);
}

pub struct PoliteGreeter;

impl Greeter for PoliteGreeter {
    fn greet(&mut self) -> String {
        "hello".to_string()
    }

    fn greet_name(&mut self, name: &str) -> String {
        format!("hello, {name}")
    }

    fn fail(&mut self) -> anyhow::Result<()> {
        anyhow::bail!("greeter is out of words")
    }

    fn pause(&mut self, millis: u64) {
        std::thread::sleep(Duration::from_millis(millis));
    }
}

impl ServiceInterface for dyn Greeter {
    fn operations() -> Result<Vec<OperationDescriptor>, DescriptorError> {
        Ok(vec![
            OperationDescriptor::builder("greet")
                .result(ValueType::String)
                .bind::<dyn Greeter, _>(|greeter, _| Ok(greeter.greet().into()))
                .build()?,
            OperationDescriptor::builder("greet")
                .parameter(ValueType::String)
                .result(ValueType::String)
                .bind::<dyn Greeter, _>(|greeter, args| {
                    Ok(greeter.greet_name(Value::str_at(args, 0)?).into())
                })
                .build()?,
            OperationDescriptor::builder("fail")
                .bind::<dyn Greeter, _>(|greeter, _| {
                    greeter.fail()?;
                    Ok(Value::Null)
                })
                .build()?,
            OperationDescriptor::builder("pause")
                .parameter(ValueType::Int)
                .bind::<dyn Greeter, _>(|greeter, args| {
                    greeter.pause(u64::try_from(Value::int_at(args, 0)?)?);
                    Ok(Value::Null)
                })
                .build()?,
        ])
    }
}

pub const GREETER_ID: &str = "Greeter";

pub fn greeter_descriptor() -> ServiceDescriptor {
    ServiceDescriptor::builder()
        .id(GREETER_ID)
        .describe::<dyn Greeter>()
        .build()
        .unwrap()
}

pub fn greeter_factory(created: Arc<AtomicUsize>) -> InstanceFactory {
    Arc::new(move |_: &InterfaceType| -> anyhow::Result<Instance> {
        created.fetch_add(1, Ordering::SeqCst);
        let greeter: Box<dyn Greeter> = Box::new(PoliteGreeter);
        Ok(into_instance(greeter))
    })
}

pub fn sized(minimum: usize, maximum: usize) -> PoolConfig {
    PoolConfig {
        minimum_instances: minimum,
        maximum_instances: maximum,
        ..PoolConfig::default()
    }
}

/// Polls until `condition` holds, failing the test after five seconds.
pub fn eventually(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(2));
    }
}

pub fn wait_for_waiters(pool: &InstancePool, count: usize) {
    eventually("blocked acquirers", || pool.stats().waiting >= count);
}
