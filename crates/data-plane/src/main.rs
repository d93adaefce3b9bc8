mod api;
mod config;
mod runtime;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use api::handlers::DataPlaneState;
use config::{Config, RegistryBackend, RuntimeBackend};
use runtime::{
    SessionService,
    backend::{IsolationBackend, k8s::KubernetesBackend, local::LocalBackend},
    registry::{FileSessionRegistry, InMemorySessionRegistry, SharedRegistry},
};

#[derive(Parser)]
#[command(name = "data-plane")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the data plane's HTTP surface. The default when no subcommand is given.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_tree::HierarchicalLayer::new(2).with_bracketed_fields(true))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
    }
}

async fn serve() -> Result<()> {
    let config = Config::load().context("loading data plane config")?;

    let backend: Arc<dyn IsolationBackend> = match config.runtime_backend {
        RuntimeBackend::Local => Arc::new(LocalBackend::new(
            "session-agent",
            config.session_ready_timeout,
        )),
        RuntimeBackend::Kubernetes => {
            let mut k8s_config = runtime::backend::k8s::KubernetesConfig::default();
            k8s_config.ready_timeout = config.session_ready_timeout;
            Arc::new(KubernetesBackend::connect(k8s_config).await?)
        }
    };

    let registry: SharedRegistry = match config.registry_backend {
        RegistryBackend::Memory => Arc::new(InMemorySessionRegistry::new()),
        RegistryBackend::File => {
            let path = config
                .registry_path
                .clone()
                .context("SESSION_REGISTRY_PATH required for file backend")?;
            Arc::new(FileSessionRegistry::load(path).await?)
        }
    };

    let sessions = SessionService::new(
        backend,
        registry,
        config.workspace_root.clone(),
        config.auth_bypass,
    );

    let state = Arc::new(DataPlaneState { sessions });
    let app = api::router::build_router(state);

    tracing::info!(listen_addr = %config.listen_addr, env = %config.env, "data plane listening");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
