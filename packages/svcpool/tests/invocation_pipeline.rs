mod common;

use std::sync::Arc;
use std::time::Duration;

use svcpool::{build_invocation_pipeline, Invocation, ServiceCallError, ServiceRegistry, Value};
use tower::ServiceExt;

use common::{greeter_descriptor, greeter_factory, sized, GREETER_ID};

fn registry(maximum: usize) -> Arc<ServiceRegistry> {
    let registry = ServiceRegistry::new();
    registry
        .register_with_config(
            greeter_descriptor(),
            greeter_factory(Arc::default()),
            sized(1, maximum),
        )
        .unwrap();
    Arc::new(registry)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invocation_reaches_the_service() {
    let svc = build_invocation_pipeline(registry(2));
    let value = svc
        .oneshot(Invocation::new(GREETER_ID, "greet", vec![Value::from("Linus")]))
        .await
        .unwrap();
    assert_eq!(value, Value::from("hello, Linus"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invocation_by_interface_name() {
    let svc = build_invocation_pipeline(registry(2));
    let key = svcpool::InterfaceType::of::<dyn common::Greeter>().name();
    let value = svc
        .oneshot(Invocation::new(key, "greet", Vec::new()))
        .await
        .unwrap();
    assert_eq!(value, Value::from("hello"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_service_fails_without_dispatch() {
    let svc = build_invocation_pipeline(registry(2));
    let err = svc
        .oneshot(Invocation::new("Nobody", "greet", Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceCallError::NoRegisteredService { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_invocation_times_out() {
    let registry = registry(1);
    let svc = build_invocation_pipeline(Arc::clone(&registry));
    let err = svc
        .oneshot(
            Invocation::new(GREETER_ID, "pause", vec![Value::from(250)]).with_timeout_ms(20),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceCallError::Timeout { timeout_ms: 20 }));

    let pool = registry.pool(GREETER_ID).unwrap();
    for _ in 0..500 {
        if pool.stats().in_use == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(pool.stats().in_use, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn timed_out_invocation_never_runs_after_release() {
    let registry = registry(1);
    let pool = registry.pool(GREETER_ID).unwrap();
    let held = pool.acquire().unwrap();
    let svc = build_invocation_pipeline(Arc::clone(&registry));

    let err = svc
        .oneshot(Invocation::new(GREETER_ID, "greet", Vec::new()).with_timeout_ms(30))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceCallError::Timeout { timeout_ms: 30 } | ServiceCallError::AcquireTimeout { .. }
    ));

    drop(held);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stats = pool.stats();
    assert_eq!(stats.acquired_total, 1, "greet ran after its caller gave up");
    assert_eq!(stats.waiting, 0);
    assert_eq!(stats.in_use, 0);
    assert_eq!(stats.available, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn saturated_pool_frees_blocking_threads_at_the_deadline() {
    let registry = registry(1);
    let pool = registry.pool(GREETER_ID).unwrap();
    let _held = pool.acquire().unwrap();
    let svc = build_invocation_pipeline(Arc::clone(&registry));

    let callers: Vec<_> = (0..8)
        .map(|_| {
            let svc = svc.clone();
            tokio::spawn(async move {
                svc.oneshot(Invocation::new(GREETER_ID, "greet", Vec::new()).with_timeout_ms(40))
                    .await
            })
        })
        .collect();
    for caller in callers {
        assert!(caller.await.unwrap().is_err());
    }

    for _ in 0..500 {
        if pool.stats().waiting == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(pool.stats().waiting, 0);
    assert_eq!(pool.stats().acquired_total, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_invocations_share_the_pool() {
    let registry = registry(3);
    let svc = build_invocation_pipeline(Arc::clone(&registry));

    let tasks: Vec<_> = (0..24)
        .map(|n| {
            let svc = svc.clone();
            tokio::spawn(async move {
                svc.oneshot(Invocation::new(
                    GREETER_ID,
                    "greet",
                    vec![Value::from(format!("caller {n}"))],
                ))
                .await
            })
        })
        .collect();
    for (n, task) in tasks.into_iter().enumerate() {
        assert_eq!(
            task.await.unwrap().unwrap(),
            Value::from(format!("hello, caller {n}"))
        );
    }

    let stats = registry.pool(GREETER_ID).unwrap().stats();
    assert_eq!(stats.in_use, 0);
    assert!(stats.created_total <= 3);
}
