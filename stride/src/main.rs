//! `stride` CLI: scaffold a workspace or run one pipeline in the foreground.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use stride::agents::AgentKit;
use stride::context::{PipelineContext, RunControl};
use stride::core::types::ModelTier;
use stride::events::Event;
use stride::exit_codes;
use stride::io::git::discover_root;
use stride::io::model::{CommandModel, NoTools};
use stride::io::prompt::PromptBuilder;
use stride::io::workspace::{InitOptions, WorkspacePaths, init_workspace};
use stride::pipeline::{Pipeline, PipelineConfig, PipelineOutcome, StopReason};
use stride::telemetry::{TelemetryMessage, ingest};

#[derive(Parser)]
#[command(
    name = "stride",
    version,
    about = "Activity-gated plan, code and review pipeline"
)]
struct Cli {
    /// Workspace root (defaults to the git top-level, else the current directory).
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.stride/config.toml` and a plan skeleton.
    Init {
        /// Overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },
    /// Run the pipeline once, printing events as JSON lines.
    Run {
        /// Capability tier (`low|mid|high` or `haiku|sonnet|opus`).
        #[arg(long)]
        tier: Option<ModelTier>,
        /// Register a local device so the readiness gate opens immediately.
        #[arg(long)]
        assume_ready: bool,
    },
}

fn main() {
    stride::logging::init("warn");
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let root = resolve_root(cli.workspace.as_deref())?;
    match cli.command {
        Command::Init { force } => {
            let paths = init_workspace(&root, &InitOptions { force })?;
            println!("initialized {}", paths.stride_dir.display());
            Ok(exit_codes::OK)
        }
        Command::Run { tier, assume_ready } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("build tokio runtime")?;
            let outcome = runtime.block_on(cmd_run(&root, tier, assume_ready))?;
            eprintln!("{outcome}");
            Ok(exit_code(&outcome))
        }
    }
}

fn resolve_root(workspace: Option<&Path>) -> Result<PathBuf> {
    match workspace {
        Some(dir) => Ok(dir.to_path_buf()),
        None => {
            let cwd = std::env::current_dir().context("read current directory")?;
            Ok(discover_root(&cwd))
        }
    }
}

async fn cmd_run(root: &Path, tier: Option<ModelTier>, assume_ready: bool) -> Result<PipelineOutcome> {
    let paths = WorkspacePaths::new(root);
    let cfg = paths.load_config()?;
    let tier = tier.unwrap_or(cfg.default_tier);
    info!(root = %root.display(), %tier, "starting run");

    let ctx = PipelineContext::with_capacity(cfg.events.subscriber_capacity);
    let mut events = ctx.bus.subscribe();
    if assume_ready {
        ingest(
            &ctx,
            &TelemetryMessage {
                device_id: "local".to_string(),
                status: "None".to_string(),
                bpm: None,
                timestamp: None,
            },
        );
    }

    let kit = AgentKit::new(
        CommandModel::new(&cfg.model, root),
        NoTools,
        PromptBuilder::new(cfg.prompt_budget_bytes)?,
        cfg.max_agent_iterations,
    );
    let config = PipelineConfig::from_workspace(&paths, &cfg, tier);
    let pipeline = Pipeline::new(&kit, &ctx, RunControl::new(), config);

    let run = pipeline.run();
    tokio::pin!(run);
    let result = loop {
        tokio::select! {
            result = &mut run => break result,
            Some(event) = events.recv() => print_event(&event),
        }
    };
    while let Some(event) = events.try_recv() {
        print_event(&event);
    }
    result
}

fn print_event(event: &Event) {
    match event.to_json() {
        Ok(line) => println!("{line}"),
        Err(err) => eprintln!("failed to encode {} event: {err}", event.type_tag()),
    }
}

fn exit_code(outcome: &PipelineOutcome) -> i32 {
    match outcome.stop {
        StopReason::Complete | StopReason::NoTasks => exit_codes::OK,
        StopReason::Stopped | StopReason::GateCancelled => exit_codes::INCOMPLETE,
        StopReason::GateStarved { .. } => exit_codes::STARVED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["stride", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true }));
    }

    #[test]
    fn parse_run_with_tier_alias() {
        let cli = Cli::parse_from(["stride", "run", "--tier", "opus", "--workspace", "/tmp/w"]);
        assert_eq!(cli.workspace, Some(PathBuf::from("/tmp/w")));
        assert!(matches!(
            cli.command,
            Command::Run {
                tier: Some(ModelTier::High),
                assume_ready: false
            }
        ));
    }

    #[test]
    fn starved_runs_have_their_own_exit_code() {
        let outcome = PipelineOutcome {
            tier: ModelTier::Low,
            tasks: 1,
            remaining: 1,
            advanced: 0,
            generations: 1,
            reviews: 1,
            stop: StopReason::GateStarved { attempts: 3 },
        };
        assert_eq!(exit_code(&outcome), exit_codes::STARVED);
    }
}
