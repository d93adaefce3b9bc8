mod api;
mod config;
mod runtime;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use api::handlers::AgentState;
use config::Config;
use runtime::Runner;

#[derive(Parser)]
#[command(name = "session-agent")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the session agent's HTTP surface. The default when no subcommand is given.
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
    let config = Config::load().context("loading session agent config")?;

    let state = Arc::new(AgentState {
        runner: Runner::new(),
        require_token: !config.auth_bypass,
    });

    let app = api::router::build_router(state);

    let listen_addr = if config.listen_addr.starts_with(':') {
        format!("0.0.0.0{}", config.listen_addr)
    } else {
        config.listen_addr.clone()
    };

    tracing::info!(%listen_addr, env = %config.env, "session agent listening");
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("binding {listen_addr}"))?;
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
