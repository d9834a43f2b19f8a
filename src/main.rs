//! `ada` — autonomous development agent harness.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ada_harness::backlog::{Backlog, BacklogStore};
use ada_harness::config::HarnessConfig;
use ada_harness::scheduler::Harness;
use ada_harness::session::SubprocessTransport;
use ada_harness::workspace::Workspace;

#[derive(Parser)]
#[command(name = "ada", version, about = "Drive a coding agent through a feature backlog")]
struct Cli {
    /// Project root (defaults to the current directory).
    #[arg(long, global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the harness loop until the backlog drains.
    Run {
        /// Model for coding sessions.
        #[arg(long)]
        model: Option<String>,

        /// Agent command to launch.
        #[arg(long, default_value = "claude")]
        agent: String,

        /// Stop after this many sessions.
        #[arg(long)]
        max_sessions: Option<u32>,

        /// Context percentage that triggers a handoff.
        #[arg(long)]
        context_threshold: Option<f64>,

        /// Per-session wall-clock limit in seconds.
        #[arg(long)]
        session_timeout: Option<u64>,

        /// Proceed even when the working tree is dirty.
        #[arg(long)]
        allow_dirty: bool,

        /// Resume from a checkpoint without prompting.
        #[arg(long)]
        headless: bool,

        /// Do not start the telemetry API.
        #[arg(long)]
        no_api: bool,

        /// Telemetry API port.
        #[arg(long, default_value_t = 8765)]
        port: u16,
    },

    /// Create a starter backlog and workspace in the project.
    Init {
        /// Project name recorded in the backlog.
        #[arg(long)]
        name: Option<String>,
    },

    /// Print backlog status counts and recent sessions.
    Status,

    /// Ask a running harness to stop after the current session.
    Stop,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let root = cli
        .project
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    match cli.command {
        Command::Run {
            model,
            agent,
            max_sessions,
            context_threshold,
            session_timeout,
            allow_dirty,
            headless,
            no_api,
            port,
        } => {
            let mut config = HarnessConfig::default();
            if let Some(model) = model {
                config.model = model;
            }
            config.agent_command = agent;
            config.max_sessions = max_sessions;
            if let Some(threshold) = context_threshold {
                config.context_threshold_percent = threshold;
            }
            if let Some(secs) = session_timeout {
                config.session_timeout = Duration::from_secs(secs);
            }
            config.allow_dirty = allow_dirty;
            config.headless = headless;
            config.api_port = port;

            let transport = Arc::new(SubprocessTransport::new(config.agent_command.clone()));
            let mut harness = Harness::new(&root, config.clone(), transport);

            if !no_api {
                match ada_harness::api::serve(harness.api_state(), "127.0.0.1", config.api_port)
                    .await
                {
                    Ok((addr, _handle)) => info!(%addr, "telemetry API started"),
                    Err(err) => error!(%err, "telemetry API failed to start"),
                }
            }

            let exit = harness.run().await;
            ExitCode::from(exit.code() as u8)
        }

        Command::Init { name } => match init_project(&root, name) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!(%err, "init failed");
                ExitCode::FAILURE
            }
        },

        Command::Status => match print_status(&root) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!(%err, "status failed");
                ExitCode::FAILURE
            }
        },

        Command::Stop => {
            let workspace = Workspace::new(&root);
            match workspace.request_stop("requested via ada stop") {
                Ok(()) => {
                    info!("stop requested; the harness will finish its current session");
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    error!(%err, "could not write stop request");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn init_project(root: &PathBuf, name: Option<String>) -> std::io::Result<()> {
    let project_name = name.unwrap_or_else(|| {
        root.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "project".to_string())
    });

    let store = BacklogStore::new(root.join("feature-list.json"));
    if store.exists() {
        info!("feature-list.json already exists; leaving it alone");
    } else {
        let backlog = Backlog::new(&project_name, root.display().to_string());
        store
            .save(&backlog)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        info!("wrote feature-list.json");
    }

    // Keep the harness workspace out of version control.
    let gitignore = root.join(".gitignore");
    let existing = std::fs::read_to_string(&gitignore).unwrap_or_default();
    if !existing.lines().any(|l| l.trim() == ".ada/") {
        std::fs::write(&gitignore, format!("{existing}.ada/\n"))?;
        info!("added .ada/ to .gitignore");
    }

    let workspace = Workspace::new(root);
    workspace.ensure_structure()?;
    if workspace.read_project()?.is_none() {
        workspace.write_project(&ada_harness::workspace::ProjectInfo {
            project_name,
            description: String::new(),
            created_at: chrono::Utc::now(),
        })?;
    }
    info!("workspace ready under .ada/");
    Ok(())
}

fn print_status(root: &PathBuf) -> std::io::Result<()> {
    let store = BacklogStore::new(root.join("feature-list.json"));
    let backlog = store
        .load()
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let counts = backlog.status_counts();
    println!(
        "{}: {} features ({} pending, {} in progress, {} completed, {} blocked)",
        backlog.project_name,
        counts.total,
        counts.pending,
        counts.in_progress,
        counts.completed,
        counts.blocked
    );

    let workspace = Workspace::new(root);
    let history = ada_harness::logging::SessionHistory::new(workspace.history_path());
    let records = history.load()?;
    for record in records.iter().rev().take(5) {
        println!(
            "  {} {} {} ({} turns, {})",
            record.session_id,
            record.feature_id.as_deref().unwrap_or("-"),
            record.outcome.label(),
            record.turns,
            ada_harness::cost::format_cost(record.cost_usd)
        );
    }
    let summary = history.cost_summary(None)?;
    println!(
        "  total: {} across {} sessions",
        ada_harness::cost::format_cost(summary.total_cost_usd),
        summary.session_count
    );
    Ok(())
}
