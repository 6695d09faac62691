//! Sidecar CLI - Main entry point

mod cli;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Sidecar - delegate work to a background agent and fold the result back
#[derive(Parser, Debug)]
#[command(name = "sidecar")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

/// Where to find the conversation and how much of it to keep
#[derive(Args, Debug, Clone)]
pub struct ContextArgs {
    /// Session id to read context from ("current" = most recent)
    #[arg(short, long)]
    pub session: Option<String>,

    /// Project directory (defaults to the current directory)
    #[arg(short, long)]
    pub project: Option<PathBuf>,

    /// Keep the last N user turns
    #[arg(long)]
    pub turns: Option<usize>,

    /// Keep messages newer than this (e.g. 30m, 2h, 1d); overrides --turns
    #[arg(long)]
    pub since: Option<String>,

    /// Token budget for the context window
    #[arg(long)]
    pub max_tokens: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a task headlessly and print its summary
    Run {
        /// Instruction for the agent
        #[arg(short, long)]
        briefing: String,

        /// Model to use (provider/model or a configured alias)
        #[arg(short, long)]
        model: Option<String>,

        /// Agent role for the runtime
        #[arg(short, long)]
        agent: Option<String>,

        /// Skip conversation context
        #[arg(long)]
        no_context: bool,

        /// Override the headless timeout
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        context: ContextArgs,
    },

    /// Print the context window that would be passed to a task
    Context {
        #[command(flatten)]
        context: ContextArgs,
    },

    /// Show which session log would be used
    Session {
        /// Session id ("current" = most recent)
        #[arg(short, long)]
        session: Option<String>,

        /// Project directory (defaults to the current directory)
        #[arg(short, long)]
        project: Option<PathBuf>,
    },

    /// List persisted subagent task records
    Tasks {
        /// Task record directory (defaults to .sidecar/tasks)
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // logs go to stderr; stdout carries results
    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match cli.command {
        Command::Run {
            briefing,
            model,
            agent,
            no_context,
            timeout_secs,
            json,
            context,
        } => {
            cli::run(cli::RunOptions {
                briefing,
                model,
                agent,
                no_context,
                timeout_secs,
                json,
                context,
            })
            .await
        }
        Command::Context { context } => cli::print_context(&context),
        Command::Session { session, project } => {
            cli::print_session(session.as_deref(), project.as_deref())
        }
        Command::Tasks { dir } => cli::list_tasks(dir.as_deref()),
    }
}
