//! Command implementations

use crate::ContextArgs;
use anyhow::{bail, Context as _};
use sidecar_foundation::SidecarConfig;
use sidecar_task::{
    default_projects_root, project_session_dir, read_session_log, CompletionPoller,
    ContextOptions, ContextWindow, ContextWindowBuilder, HeadlessRequest, HttpAgentRuntime,
    ModelRouter, PollerConfig, ResolveMethod, RouteDecision, RuntimeOptions, SessionResolution,
    SessionResolver, TaskStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Used only until `start_runtime` sets the real address
const PLACEHOLDER_URL: &str = "http://127.0.0.1:4096";

/// Options for `sidecar run`
pub struct RunOptions {
    pub briefing: String,
    pub model: Option<String>,
    pub agent: Option<String>,
    pub no_context: bool,
    pub timeout_secs: Option<u64>,
    pub json: bool,
    pub context: ContextArgs,
}

fn project_dir(project: Option<&Path>) -> anyhow::Result<PathBuf> {
    match project {
        Some(p) => Ok(p.to_path_buf()),
        None => std::env::current_dir().context("Cannot determine current directory"),
    }
}

fn resolve_session(session: Option<&str>, project: &Path) -> anyhow::Result<SessionResolution> {
    let root = default_projects_root().context("Cannot determine home directory")?;
    let dir = project_session_dir(&root, project);
    Ok(SessionResolver::resolve(&dir, session))
}

fn context_window(args: &ContextArgs) -> anyhow::Result<Option<ContextWindow>> {
    let project = project_dir(args.project.as_deref())?;
    let resolution = resolve_session(args.session.as_deref(), &project)?;
    if let Some(warning) = &resolution.warning {
        warn!("{}", warning);
    }
    let Some(path) = resolution.path else {
        return Ok(None);
    };

    let history = read_session_log(&path)?;
    let mut options = ContextOptions::default();
    if let Some(turns) = args.turns {
        options = options.turns(turns);
    }
    if let Some(since) = &args.since {
        options = options.since(since.clone());
    }
    if let Some(max_tokens) = args.max_tokens {
        options = options.max_tokens(max_tokens);
    }

    let window = ContextWindowBuilder::window(&history, &options);
    info!(
        session = %path.display(),
        messages = window.messages.len(),
        truncated = window.truncated,
        "Built context window"
    );
    Ok(Some(window))
}

/// Model for a top-level run: `--model`, else `defaultModel`, aliases expanded
fn top_level_route(
    config: &SidecarConfig,
    model: Option<&str>,
    agent: Option<&str>,
) -> anyhow::Result<RouteDecision> {
    let router = ModelRouter::new(Arc::new(config.clone()));
    let parent_model = match model.or(config.default_model.as_deref()) {
        Some(model) => router.expand(model),
        None => bail!("No model: pass --model or set defaultModel in config.json"),
    };
    Ok(router.resolve(agent.unwrap_or("build"), model, &parent_model, false))
}

/// `sidecar run`
pub async fn run(opts: RunOptions) -> anyhow::Result<()> {
    let config = SidecarConfig::load()?;
    let project = project_dir(opts.context.project.as_deref())?;

    let route = top_level_route(&config, opts.model.as_deref(), opts.agent.as_deref())?;
    info!(model = %route.model, reason = %route.reason, "Model selected");

    let mut request = HeadlessRequest::new(opts.briefing, route.model);
    if let Some(agent) = opts.agent {
        request = request.with_agent(agent);
    }
    if !opts.no_context {
        if let Some(window) = context_window(&opts.context)? {
            if !window.text.is_empty() {
                request = request.with_context(window.text);
            }
        }
    }

    let runtime = Arc::new(HttpAgentRuntime::new(
        config
            .runtime
            .url
            .clone()
            .unwrap_or_else(|| PLACEHOLDER_URL.to_string()),
    )?);
    let mut poller_config = PollerConfig::from_config(&config);
    if let Some(secs) = opts.timeout_secs {
        poller_config = poller_config.timeout(Duration::from_secs(secs));
    }
    let poller = CompletionPoller::new(runtime, poller_config).with_runtime_options(
        RuntimeOptions {
            url: config.runtime.url.clone(),
            command: config.runtime.command.clone(),
            port: 0,
            workdir: Some(project),
        },
    );

    let abort = poller.abort_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    let outcome = poller.run(&request).await;

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else if !outcome.summary.is_empty() {
        println!("{}", outcome.summary);
    }

    if outcome.timed_out {
        warn!("Task timed out; summary may be incomplete");
    }
    if let Some(error) = outcome.error {
        bail!(error);
    }
    Ok(())
}

/// `sidecar context`
pub fn print_context(args: &ContextArgs) -> anyhow::Result<()> {
    match context_window(args)? {
        Some(window) => println!("{}", window.text),
        None => warn!("No session log found"),
    }
    Ok(())
}

/// `sidecar session`
pub fn print_session(session: Option<&str>, project: Option<&Path>) -> anyhow::Result<()> {
    let project = project_dir(project)?;
    let resolution = resolve_session(session, &project)?;

    let method = match resolution.method {
        ResolveMethod::Explicit => "explicit",
        ResolveMethod::Fallback => "fallback",
        ResolveMethod::Error => "error",
    };
    match &resolution.path {
        Some(path) => println!("{} ({})", path.display(), method),
        None => println!("no session found ({})", method),
    }
    if let Some(warning) = &resolution.warning {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}

/// `sidecar tasks`
pub fn list_tasks(dir: Option<&Path>) -> anyhow::Result<()> {
    let store = match dir {
        Some(dir) => TaskStore::new(dir),
        None => TaskStore::for_project(project_dir(None)?),
    };

    let tasks = store.list()?;
    if tasks.is_empty() {
        println!("No tasks recorded");
        return Ok(());
    }
    for task in tasks {
        println!(
            "{} {} {:<8} {:<10} {:<40} {}",
            task.status.symbol(),
            task.id,
            task.agent_type,
            task.status,
            task.model,
            first_line(&task.briefing, 60)
        );
    }
    Ok(())
}

fn first_line(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() <= max_chars {
        return line.to_string();
    }
    let cut: String = line.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", cut)
}
