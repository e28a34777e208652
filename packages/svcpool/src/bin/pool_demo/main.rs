//! `pool-demo`: registers an in-memory periodic table service and exercises
//! it through the registry.

mod periodic_table;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand, ValueEnum};
use svcpool::service::DEFAULT_INVOCATION_TIMEOUT_MS;
use svcpool::{
    build_invocation_pipeline, ArityPolicy, Invocation, PoolConfig, RegistryConfig,
    ServiceRegistry, Value,
};
use tower::ServiceExt;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use periodic_table::PeriodicTable;

#[derive(Parser, Debug)]
#[command(name = "pool-demo")]
#[command(about = "Pooled service registry demo")]
struct Cli {
    #[command(flatten)]
    pool: PoolArgs,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Pool sizing, shared by every registered service.
#[derive(Args, Debug)]
struct PoolArgs {
    /// Instances created when a service is registered
    #[arg(long, env = "SERVICE_POOL_START_INSTANCES", default_value_t = 2)]
    start_instances: usize,

    /// Upper bound on instances per service
    #[arg(long, env = "SERVICE_POOL_MAXIMUM_INSTANCES", default_value_t = 10)]
    maximum_instances: usize,

    /// Give up waiting for a free instance after this many milliseconds
    #[arg(long, env = "SERVICE_POOL_ACQUIRE_TIMEOUT_MS")]
    acquire_timeout_ms: Option<u64>,

    /// Handling of arguments beyond an operation's arity
    #[arg(long, value_enum, default_value_t = Arity::Strict)]
    arity: Arity,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Arity {
    Strict,
    Truncate,
}

impl From<Arity> for ArityPolicy {
    fn from(arity: Arity) -> Self {
        match arity {
            Arity::Strict => Self::Strict,
            Arity::Truncate => Self::Truncate,
        }
    }
}

impl From<&PoolArgs> for PoolConfig {
    fn from(args: &PoolArgs) -> Self {
        Self {
            minimum_instances: args.start_instances,
            maximum_instances: args.maximum_instances,
            acquire_timeout: args.acquire_timeout_ms.map(Duration::from_millis),
            arity_policy: args.arity.into(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the registered service descriptors as JSON
    Describe,
    /// Invoke one operation; arguments are parsed as JSON, falling back to strings
    Call {
        service: String,
        operation: String,
        arguments: Vec<String>,
        #[arg(long, default_value_t = DEFAULT_INVOCATION_TIMEOUT_MS)]
        timeout_ms: u64,
    },
    /// Hammer one pool from many threads and report its statistics
    Stress {
        #[arg(long, default_value_t = 8)]
        threads: usize,
        #[arg(long, default_value_t = 1000)]
        calls: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let config = RegistryConfig {
        pool: PoolConfig::from(&cli.pool),
    };
    let registry = Arc::new(ServiceRegistry::with_config(config));
    registry
        .register_interface::<dyn PeriodicTable, _>(
            periodic_table::SERVICE_ID,
            periodic_table::create,
        )
        .context("registering the periodic table service")?;

    let outcome = match cli.command {
        Command::Describe => describe(&registry),
        Command::Call {
            service,
            operation,
            arguments,
            timeout_ms,
        } => call(&registry, service, operation, &arguments, timeout_ms).await,
        Command::Stress { threads, calls } => stress(&registry, threads, calls).await,
    };

    registry.shutdown();
    outcome
}

fn describe(registry: &ServiceRegistry) -> anyhow::Result<()> {
    let descriptors = registry
        .service_ids()
        .iter()
        .map(|id| registry.descriptor(id))
        .collect::<Result<Vec<_>, _>>()?;
    println!("{}", serde_json::to_string_pretty(&descriptors)?);
    Ok(())
}

async fn call(
    registry: &Arc<ServiceRegistry>,
    service: String,
    operation: String,
    arguments: &[String],
    timeout_ms: u64,
) -> anyhow::Result<()> {
    let arguments = arguments.iter().map(|raw| parse_argument(raw)).collect();
    let invocation = Invocation::new(service, operation, arguments).with_timeout_ms(timeout_ms);
    let result = build_invocation_pipeline(Arc::clone(registry))
        .oneshot(invocation)
        .await?;
    println!("{}", serde_json::Value::from(result));
    Ok(())
}

fn parse_argument(raw: &str) -> Value {
    serde_json::from_str::<serde_json::Value>(raw)
        .map_or_else(|_| Value::from(raw), Value::from)
}

async fn stress(registry: &Arc<ServiceRegistry>, threads: usize, calls: usize) -> anyhow::Result<()> {
    let handle = registry.prepare_operation(periodic_table::SERVICE_ID, "atomic_weight")?;
    let elements: Vec<&'static str> = periodic_table::element_names().collect();
    let started = Instant::now();

    let workers: Vec<_> = (0..threads)
        .map(|worker| {
            let handle = handle.clone();
            let elements = elements.clone();
            tokio::task::spawn_blocking(move || -> anyhow::Result<usize> {
                let mut failures = 0;
                for call in 0..calls {
                    let element = elements[(worker + call) % elements.len()];
                    if let Err(err) = handle.invoke(&[Value::from(element)]) {
                        warn!(worker, error = %err, "call failed");
                        failures += 1;
                    }
                }
                Ok(failures)
            })
        })
        .collect();

    let mut failures = 0;
    for worker in workers {
        failures += worker.await??;
    }

    let stats = registry.pool(periodic_table::SERVICE_ID)?.stats();
    info!(
        threads,
        calls,
        failures,
        elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        "stress run complete"
    );
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn setup_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("svcpool=debug,pool_demo=debug,info")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
