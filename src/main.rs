//! prompt-gateway
//!
//! ```text
//!                     ┌──────────────────── cluster ────────────────────┐
//!                     │  supervisor (no listener)                       │
//!                     │     │ spawn / watch / restart                   │
//!                     │     ▼                                           │
//!   Client ──:PORT──▶ │  worker 0 │ worker 1 │ ... │ worker N-1         │ ──▶ RapidAPI
//!                     │  (SO_REUSEPORT; own limiter, sessions, metrics) │
//!                     └─────────────────────────────────────────────────┘
//! ```
//!
//! `serve` runs a single process with no supervisor.

use std::error::Error;
use std::ffi::OsString;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio::runtime::{Builder, Runtime};

use prompt_gateway::config::{config_warnings, load_config, GatewayConfig};
use prompt_gateway::lifecycle::{signals, Shutdown};
use prompt_gateway::net::{bind, PortSharing};
use prompt_gateway::observability::{logging, metrics};
use prompt_gateway::{GatewayServer, WorkerInfo};

#[derive(Debug, Parser)]
#[command(
    name = "prompt-gateway",
    version,
    about = "HTTP prompt gateway for a RapidAPI AI provider"
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, env = "GATEWAY_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Listening port; overrides PORT and the config file.
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve from a single process.
    Serve,
    /// Supervise a pool of worker processes (default).
    Cluster {
        /// Pool size; defaults to the number of CPUs.
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Run one pool worker. Started by `cluster`.
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        id: usize,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.listener.port = port;
    }
    logging::init_tracing(&config.observability);
    for warning in config_warnings(&config) {
        tracing::warn!("{warning}");
    }

    match cli.command.unwrap_or(Command::Cluster { workers: None }) {
        Command::Serve => serve(config),
        Command::Worker { id } => worker(config, id),
        Command::Cluster { workers } => {
            if let Some(workers) = workers {
                config.supervisor.workers = Some(workers);
            }
            cluster(config, cli.config.as_deref(), cli.port)
        }
    }
}

fn serve(config: GatewayConfig) -> Result<(), Box<dyn Error>> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "prompt-gateway starting in single-process mode"
    );
    let runtime = Builder::new_multi_thread().enable_all().build()?;
    run_server(&runtime, config, None, PortSharing::Exclusive)
}

fn worker(config: GatewayConfig, id: usize) -> Result<(), Box<dyn Error>> {
    let runtime = Builder::new_current_thread().enable_all().build()?;
    run_server(&runtime, config, Some(id), PortSharing::Shared)
}

fn run_server(
    runtime: &Runtime,
    config: GatewayConfig,
    id: Option<usize>,
    sharing: PortSharing,
) -> Result<(), Box<dyn Error>> {
    runtime.block_on(async move {
        let offset = id.unwrap_or(0);
        start_metrics(&config, offset);

        let listener = bind(&config.listener.bind_address(), sharing)?;
        let shutdown = Shutdown::new();
        signals::install(shutdown.clone());

        let server = GatewayServer::new(config, WorkerInfo::current(id))?;
        server.run(listener, shutdown).await?;
        Ok::<(), Box<dyn Error>>(())
    })
}

fn start_metrics(config: &GatewayConfig, offset: usize) {
    let observability = &config.observability;
    if !observability.metrics_enabled {
        return;
    }
    let port = u16::try_from(offset)
        .ok()
        .and_then(|offset| observability.metrics_port.checked_add(offset));
    let Some(port) = port else {
        tracing::error!(base = observability.metrics_port, offset, "Metrics port out of range");
        return;
    };
    match format!("{}:{}", observability.metrics_host, port).parse::<SocketAddr>() {
        Ok(addr) => metrics::init_metrics(addr),
        Err(e) => tracing::error!(
            host = %observability.metrics_host,
            error = %e,
            "Failed to parse metrics address"
        ),
    }
}

#[cfg(unix)]
fn cluster(
    config: GatewayConfig,
    config_path: Option<&Path>,
    port: Option<u16>,
) -> Result<(), Box<dyn Error>> {
    use prompt_gateway::supervisor::{ExecSpawner, Supervisor};

    let size = config.supervisor.pool_size();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        workers = size,
        address = %config.listener.bind_address(),
        "Supervisor starting"
    );

    // Workers reload config from the same sources; forward the CLI overrides.
    let mut global_args: Vec<OsString> = Vec::new();
    if let Some(path) = config_path {
        global_args.push("--config".into());
        global_args.push(path.as_os_str().to_owned());
    }
    if let Some(port) = port {
        global_args.push("--port".into());
        global_args.push(port.to_string().into());
    }
    let spawner = ExecSpawner::current_exe(global_args)?;

    let runtime = Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(async move {
        start_metrics(&config, size);
        let shutdown = Shutdown::new();
        signals::install(shutdown.clone());

        Supervisor::new(spawner, size, &config.supervisor)
            .run(shutdown)
            .await?;
        Ok::<(), Box<dyn Error>>(())
    })
}

#[cfg(not(unix))]
fn cluster(
    config: GatewayConfig,
    _config_path: Option<&Path>,
    _port: Option<u16>,
) -> Result<(), Box<dyn Error>> {
    tracing::warn!("Worker pools need SO_REUSEPORT; falling back to a single process");
    serve(config)
}
