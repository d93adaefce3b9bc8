mod api;
mod audit;
mod client;
mod config;
mod orchestration;
mod policy;
mod sessions;
mod storage;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::AnyPool;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use api::{
    auth::AuthConfig,
    handlers::AppState,
};
use audit::AuditLogger;
use client::DataPlaneClient;
use config::Config;
use orchestration::{DegradationController, DegradationMode, SqlIdempotencyStore, WorkflowService};
use policy::{PolicyEnforcer, StaticRulesetEvaluator};
use sessions::{SessionService, SessionWorkflowRunner, TtlWorker};
use storage::sql::SqlStore;

#[derive(Parser)]
#[command(name = "control-plane")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the control plane's HTTP surface. The default when no subcommand is given.
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
    sqlx::any::install_default_drivers();
    let config = Config::load().context("loading control plane config")?;

    let pool = AnyPool::connect(&config.database_url)
        .await
        .with_context(|| format!("connecting to {}", config.database_url))?;
    let store = Arc::new(SqlStore::new(pool.clone()));
    store.migrate().await.context("running storage migrations")?;

    let evaluator = Box::new(StaticRulesetEvaluator::new());
    let enforcer = Arc::new(PolicyEnforcer::new(evaluator));
    let idempotency = Arc::new(SqlIdempotencyStore::new(pool));
    let audit = Arc::new(AuditLogger::new(store.clone()));
    let degradation = Arc::new(DegradationController::new(DegradationMode::None));
    let data_plane = DataPlaneClient::new(config.data_plane_addr.clone());

    let sessions = Arc::new(SessionService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        enforcer,
        data_plane.clone(),
        audit.clone(),
    ));

    let workflow_runner = Arc::new(SessionWorkflowRunner::new(sessions.clone()));
    let workflows = Arc::new(WorkflowService::new(store.clone(), workflow_runner, audit.clone()));

    TtlWorker::new(store.clone(), data_plane, config.ttl_sweep_interval).spawn();

    let state = Arc::new(AppState {
        sessions,
        workflows,
        jobs: store.clone(),
        policies: store.clone(),
        audit,
        degradation,
        idempotency,
    });

    let auth = Arc::new(AuthConfig {
        bypass: config.authz_bypass,
        jwt_secret: std::env::var("JWT_SECRET").unwrap_or_else(|_| "dev-secret".to_string()),
    });

    let app = api::router::build_router(state, auth);

    tracing::info!(listen_addr = %config.listen_addr, env = %config.env, "control plane listening");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
