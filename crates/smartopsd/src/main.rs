//! smartopsd — the SmartOps daemon.
//!
//! Single binary that assembles:
//! - State store (redb)
//! - Cluster client (HTTP or in-memory)
//! - Task queue + deploy worker pool
//! - REST API
//!
//! # Usage
//!
//! ```text
//! smartopsd run --config /etc/smartops/smartopsd.toml --port 8080
//! smartopsd validate blueprint.yaml
//! ```

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use smartops_cluster::{ClusterApi, HttpClusterApi, MemoryCluster};
use smartops_deploy::{
    DeployActions, DeploymentOrchestrator, LocalTaskQueue, SerializedActionLock, WorkerPool,
};
use smartops_lifecycle::Lifecycle;
use smartops_state::StateStore;
use tracing::{info, warn};

use crate::config::{ClusterMode, DaemonConfig};

#[derive(Parser)]
#[command(name = "smartopsd", about = "SmartOps daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the API and run deploy workers.
    Run {
        /// Configuration file (TOML).
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Cluster backend.
        #[arg(long, value_enum)]
        cluster_mode: Option<ClusterMode>,

        /// Cluster API endpoint (host:port).
        #[arg(long)]
        cluster_endpoint: Option<String>,

        /// Number of deploy workers.
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Validate a blueprint file and print its topology.
    Validate {
        /// Manifest file.
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run {
            config,
            port,
            data_dir,
            cluster_mode,
            cluster_endpoint,
            workers,
        } => {
            let mut daemon = match config {
                Some(path) => DaemonConfig::from_file(&path)?,
                None => DaemonConfig::default(),
            };
            if let Some(port) = port {
                daemon.server.port = port;
            }
            if let Some(data_dir) = data_dir {
                daemon.storage.data_dir = data_dir;
            }
            if let Some(mode) = cluster_mode {
                daemon.cluster.mode = mode;
            }
            if let Some(endpoint) = cluster_endpoint {
                daemon.cluster.endpoint = endpoint;
            }
            if let Some(count) = workers {
                daemon.workers.count = count;
            }
            run(daemon).await
        }
        Command::Validate { file } => validate(file),
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,smartopsd=debug,smartops=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn validate(file: PathBuf) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(&file)?;
    let analyzed = smartops_blueprint::analyze(&text)?;
    let summary = serde_json::json!({
        "documents": analyzed.documents.len(),
        "entrypoints": analyzed.entrypoints,
        "topology": analyzed.topology,
        "counts": analyzed.counts,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    info!("SmartOps daemon starting");

    // Ensure data directory exists.
    std::fs::create_dir_all(&config.storage.data_dir)?;
    let db_path = config.storage.db_path();

    // ── Initialize subsystems ──────────────────────────────────

    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let cluster: Arc<dyn ClusterApi> = match config.cluster.mode {
        ClusterMode::Http => {
            let mut api = HttpClusterApi::new(&config.cluster.endpoint)?
                .with_timeout(config.cluster.timeout());
            if let Some(token) = &config.cluster.token {
                api = api.with_token(token.clone());
            }
            info!(endpoint = %api.endpoint(), "cluster client initialized");
            Arc::new(api)
        }
        ClusterMode::Memory => {
            warn!("using in-memory cluster; nothing will actually be deployed");
            Arc::new(MemoryCluster::new())
        }
    };

    let lifecycle = Lifecycle::new(store.clone());
    let orchestrator = DeploymentOrchestrator::new(cluster)
        .with_ensure_namespace(config.deploy.ensure_namespace);
    let lock = SerializedActionLock::new(store.clone(), (&config.lock).into());
    let actions = DeployActions::new(
        lifecycle.clone(),
        orchestrator,
        lock,
        config.capacity_planner.clone(),
    );

    // ── Task queue + workers ───────────────────────────────────

    let (queue, receiver) = LocalTaskQueue::channel();
    queue.recover(&store).await?;
    let pool = WorkerPool::spawn(config.workers.count, store.clone(), actions, receiver);

    // ── Start API server ───────────────────────────────────────

    let router = smartops_api::build_router(lifecycle, Arc::new(queue));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
    });

    server.await?;

    // Let in-flight deploys finish.
    pool.shutdown().await;

    info!("SmartOps daemon stopped");
    Ok(())
}
