//! Stride server - device telemetry intake, run control and a live event stream.

mod routes;
mod runs;
mod sse;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use axum::routing::get;
use clap::Parser;
use stride::agents::AgentKit;
use stride::context::PipelineContext;
use stride::io::git::discover_root;
use stride::io::model::{CommandModel, Model, NoTools};
use stride::io::prompt::PromptBuilder;
use stride::io::workspace::WorkspacePaths;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::runs::RunManager;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "stride-ui")]
#[command(about = "HTTP server that gates pipeline runs on device telemetry")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "8000")]
    port: u16,

    /// Workspace root (defaults to the git top-level of the current directory)
    #[arg(long)]
    workspace: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stride_ui=info".parse()?)
                .add_directive("stride=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let root = match args.workspace {
        Some(dir) => dir,
        None => discover_root(&std::env::current_dir().context("read current directory")?),
    };
    let root = root.canonicalize().unwrap_or(root);
    info!(root = %root.display(), "starting stride-ui");

    let paths = WorkspacePaths::new(&root);
    let cfg = paths.load_config()?;
    let ctx = PipelineContext::with_capacity(cfg.events.subscriber_capacity);
    let keepalive = Duration::from_secs(cfg.events.keepalive_secs);
    let kit = AgentKit::new(
        CommandModel::new(&cfg.model, &root),
        NoTools,
        PromptBuilder::new(cfg.prompt_budget_bytes)?,
        cfg.max_agent_iterations,
    );
    let runs = RunManager::new(kit, ctx.clone(), paths, cfg);
    let state = AppState::new(ctx, runs.clone(), keepalive);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if runs.stop().is_some() {
        info!("stopped active run on shutdown");
    }
    Ok(())
}

fn app<M: Model + 'static>(state: AppState<M>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api", routes::api_router::<M>())
        .route("/events", get(sse::events_handler::<M>))
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(err = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
