use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use kubeterm_k8s::ClusterSessionManager;

mod config;
mod server;

use config::Config;
use server::ExecServer;

/// Kubeterm - interactive shells into Kubernetes containers over WebSocket
#[derive(Parser, Debug)]
#[command(name = "kubeterm")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to a TOML config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the config file)
    #[arg(long, value_name = "ADDR")]
    listen: Option<SocketAddr>,

    /// Namespace to start in (derived from the cluster if unset)
    #[arg(long, env = "POD_NAMESPACE")]
    namespace: Option<String>,

    /// Kubeconfig context to switch to at startup
    #[arg(long)]
    context: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }
    if let Some(namespace) = args.namespace.filter(|ns| !ns.is_empty()) {
        config.namespace = Some(namespace);
    }
    if let Some(context) = args.context.filter(|ctx| !ctx.is_empty()) {
        config.context = Some(context);
    }

    if config.namespace.is_none() {
        info!("No namespace configured, deriving it from the cluster");
    }

    let session = ClusterSessionManager::initialize(config.namespace.as_deref())
        .await
        .context("Failed to initialize cluster session")?;

    if let Some(context) = &config.context {
        session
            .switch_context(context)
            .await
            .with_context(|| format!("Failed to switch to context '{}'", context))?;
    }

    let (contexts, current) = session.contexts();
    if session.is_local() {
        info!(
            contexts = contexts.len(),
            current = current.as_deref().unwrap_or_default(),
            "Loaded kubeconfig contexts"
        );
    }
    info!(
        mode = session.mode().as_str(),
        namespace = %session.namespace(),
        "Cluster session ready"
    );

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen))?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            return;
        }
        signal.cancel();
    });

    ExecServer::new(Arc::new(session), config)
        .serve(listener, shutdown)
        .await
}
