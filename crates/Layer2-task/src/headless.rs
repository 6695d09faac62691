//! Headless execution - drive one task to its completion marker
//!
//! The runtime is told to end its reply with [`COMPLETION_MARKER`]. The
//! poller sends the briefing, then watches the session until the marker
//! shows up or the deadline passes. Past the deadline it asks the runtime to
//! wrap up, waits a grace period and takes whatever text exists.
//!
//! The runtime started for the run is closed on every exit path, including
//! abort and the run future being dropped.

use crate::runtime::{
    wait_for_health, AgentRuntime, PromptRequest, RuntimeHandle, RuntimeMessage, RuntimeOptions,
};
use crate::state::HeadlessStatus;
use serde::{Deserialize, Serialize};
use sidecar_foundation::SidecarConfig;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Literal the runtime emits when it considers the task done
pub const COMPLETION_MARKER: &str = "[SIDECAR_COMPLETE]";

/// Sent once the deadline has passed
pub const GRACE_INSTRUCTION: &str = "Time is up. Stop working now and reply with a concise \
     summary of what you have done and found so far, then end your reply with \
     [SIDECAR_COMPLETE] on its own line.";

/// Summary used when a timed-out run produced no text at all
pub const TIMEOUT_FALLBACK: &str = "Task timed out before producing output.";

// ============================================================================
// Configuration
// ============================================================================

/// Timing for a headless run
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Wall-clock budget before the grace period
    pub timeout: Duration,

    pub poll_interval: Duration,

    /// Wait after the wrap-up instruction
    pub grace_period: Duration,

    pub health_attempts: u32,
    pub health_interval: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self::from_config(&SidecarConfig::default())
    }
}

impl PollerConfig {
    pub fn from_config(config: &SidecarConfig) -> Self {
        Self {
            timeout: config.headless.timeout(),
            poll_interval: config.headless.poll_interval(),
            grace_period: config.headless.grace_period(),
            health_attempts: config.runtime.health_attempts,
            health_interval: config.runtime.health_interval(),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn health(mut self, attempts: u32, interval: Duration) -> Self {
        self.health_attempts = attempts;
        self.health_interval = interval;
        self
    }
}

// ============================================================================
// Request / Outcome
// ============================================================================

/// What to run
#[derive(Debug, Clone, Default)]
pub struct HeadlessRequest {
    pub briefing: String,
    pub model: String,
    pub system: Option<String>,
    pub agent: Option<String>,

    /// Formatted conversation context placed ahead of the briefing
    pub context: Option<String>,
}

impl HeadlessRequest {
    pub fn new(briefing: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            briefing: briefing.into(),
            model: model.into(),
            ..Default::default()
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Result of a headless run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadlessOutcome {
    pub summary: String,

    /// The marker was seen
    pub completed: bool,

    /// The deadline passed; the summary may be partial
    pub timed_out: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl HeadlessOutcome {
    fn failed(error: impl Into<String>, session_id: Option<String>) -> Self {
        Self {
            summary: String::new(),
            completed: false,
            timed_out: false,
            error: Some(error.into()),
            session_id,
        }
    }

    /// Final status of the run
    pub fn status(&self) -> HeadlessStatus {
        if self.error.is_some() {
            HeadlessStatus::Error
        } else if self.timed_out {
            HeadlessStatus::Timeout
        } else if self.completed {
            HeadlessStatus::Complete
        } else {
            HeadlessStatus::Error
        }
    }
}

/// Text before the first marker, trimmed; `None` without a marker
pub fn extract_summary(text: &str) -> Option<String> {
    text.find(COMPLETION_MARKER)
        .map(|idx| text[..idx].trim().to_string())
}

/// Briefing wrapped with context and the completion instruction
pub fn build_prompt(request: &HeadlessRequest) -> String {
    let mut prompt = String::new();

    if let Some(context) = request
        .context
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    {
        prompt.push_str("## Conversation Context\n\n");
        prompt.push_str(context);
        prompt.push_str("\n\n## Task\n\n");
    }

    prompt.push_str(request.briefing.trim());
    prompt.push_str(&format!(
        "\n\nWhen you are done, reply with a concise summary of what you did and found, \
         then end your reply with {} on its own line.",
        COMPLETION_MARKER
    ));
    prompt
}

// ============================================================================
// Abort
// ============================================================================

/// Cancels a running headless task
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for AbortHandle {
    fn default() -> Self {
        Self::new()
    }
}

async fn aborted(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|aborted| *aborted).await.is_err() {
        // handle gone: can never abort
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Runtime guard
// ============================================================================

/// Owns a started runtime until it is closed
struct RuntimeGuard {
    runtime: Arc<dyn AgentRuntime>,
    handle: Option<RuntimeHandle>,
}

impl RuntimeGuard {
    fn new(runtime: Arc<dyn AgentRuntime>, handle: RuntimeHandle) -> Self {
        Self {
            runtime,
            handle: Some(handle),
        }
    }

    async fn release(mut self) {
        if let Some(handle) = self.handle.take() {
            debug!(url = %handle.url, "Closing agent runtime");
            if let Err(e) = self.runtime.close(handle).await {
                warn!("Failed to close agent runtime: {}", e);
            }
        }
    }
}

impl Drop for RuntimeGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let runtime = self.runtime.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(async move {
                    if let Err(e) = runtime.close(handle).await {
                        warn!("Failed to close agent runtime: {}", e);
                    }
                });
            }
            Err(_) => warn!(url = %handle.url, "Agent runtime left open: no async runtime"),
        }
    }
}

// ============================================================================
// Transcript accumulation
// ============================================================================

/// Assistant text seen so far; each distinct part is kept once
#[derive(Default)]
struct Transcript {
    text: String,
    seen: HashSet<String>,
}

impl Transcript {
    fn absorb(&mut self, part: &str) {
        let part = part.trim();
        if part.is_empty() || !self.seen.insert(part.to_string()) {
            return;
        }
        if !self.text.is_empty() {
            self.text.push_str("\n\n");
        }
        self.text.push_str(part);
    }

    fn absorb_parts(&mut self, parts: &[String]) {
        for part in parts {
            self.absorb(part);
        }
    }

    fn absorb_messages(&mut self, messages: &[RuntimeMessage]) {
        for message in messages.iter().filter(|m| m.is_assistant()) {
            self.absorb_parts(&message.text_parts);
        }
    }

    fn summary(&self) -> Option<String> {
        extract_summary(&self.text)
    }
}

// ============================================================================
// CompletionPoller
// ============================================================================

/// Runs a single task headlessly
pub struct CompletionPoller {
    runtime: Arc<dyn AgentRuntime>,
    config: PollerConfig,
    options: RuntimeOptions,
    abort: AbortHandle,
}

impl CompletionPoller {
    pub fn new(runtime: Arc<dyn AgentRuntime>, config: PollerConfig) -> Self {
        Self {
            runtime,
            config,
            options: RuntimeOptions::default(),
            abort: AbortHandle::new(),
        }
    }

    pub fn with_runtime_options(mut self, options: RuntimeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Run the task to completion, timeout, error or abort
    pub async fn run(&self, request: &HeadlessRequest) -> HeadlessOutcome {
        let handle = match self.runtime.start_runtime(&self.options).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to start agent runtime: {}", e);
                return HeadlessOutcome::failed(format!("Failed to start runtime: {}", e), None);
            }
        };
        let guard = RuntimeGuard::new(self.runtime.clone(), handle);

        let mut abort_rx = self.abort.subscribe();
        let outcome = tokio::select! {
            biased;
            _ = aborted(&mut abort_rx) => {
                info!("Headless run aborted");
                HeadlessOutcome::failed("aborted", None)
            }
            outcome = self.drive(request) => outcome,
        };

        guard.release().await;
        info!(
            status = %outcome.status(),
            timed_out = outcome.timed_out,
            "Headless run finished"
        );
        outcome
    }

    async fn drive(&self, request: &HeadlessRequest) -> HeadlessOutcome {
        if let Err(e) = wait_for_health(
            self.runtime.as_ref(),
            self.config.health_attempts,
            self.config.health_interval,
        )
        .await
        {
            return HeadlessOutcome::failed(e.to_string(), None);
        }

        let session_id = match self.runtime.create_session(None).await {
            Ok(id) => id,
            Err(e) => {
                return HeadlessOutcome::failed(format!("Session creation failed: {}", e), None)
            }
        };
        info!(session = %session_id, model = %request.model, "Headless session started");

        let mut prompt = PromptRequest::new(request.model.clone(), build_prompt(request))
            .with_system(request.system.clone());
        if let Some(agent) = &request.agent {
            prompt = prompt.with_agent(agent.clone());
        }

        let deadline = Instant::now() + self.config.timeout;
        let mut transcript = Transcript::default();

        let sent =
            tokio::time::timeout_at(deadline, self.runtime.send_prompt(&session_id, &prompt)).await;
        match sent {
            Ok(Ok(response)) => transcript.absorb_parts(&response.text_parts),
            Ok(Err(e)) => {
                return HeadlessOutcome::failed(
                    format!("Failed to send prompt: {}", e),
                    Some(session_id),
                )
            }
            Err(_) => warn!(session = %session_id, "Prompt still pending at the deadline"),
        }
        if let Some(summary) = transcript.summary() {
            return completed(summary, session_id);
        }

        while Instant::now() < deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            tokio::time::sleep(self.config.poll_interval.min(remaining)).await;

            let settled = match self.runtime.get_status(&session_id).await {
                Ok(status) => status.is_settled(),
                Err(e) => {
                    warn!(session = %session_id, "Status check failed, reading messages: {}", e);
                    true
                }
            };
            if !settled {
                continue;
            }

            self.collect(&session_id, &mut transcript).await;
            if let Some(summary) = transcript.summary() {
                return completed(summary, session_id);
            }
        }

        info!(session = %session_id, "Deadline reached, asking runtime to wrap up");
        let grace_deadline = Instant::now() + self.config.grace_period;
        let wrap_up = PromptRequest::new(request.model.clone(), GRACE_INSTRUCTION);
        match tokio::time::timeout_at(
            grace_deadline,
            self.runtime.send_prompt_async(&session_id, &wrap_up),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(session = %session_id, "Wrap-up prompt failed: {}", e),
            Err(_) => warn!(session = %session_id, "Wrap-up prompt still pending"),
        }
        tokio::time::sleep_until(grace_deadline).await;
        self.collect(&session_id, &mut transcript).await;

        let marked = transcript.summary();
        let completed = marked.is_some();
        let summary = marked
            .filter(|s| !s.is_empty())
            .or_else(|| {
                let text = transcript.text.replace(COMPLETION_MARKER, "");
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_string())
            })
            .unwrap_or_else(|| TIMEOUT_FALLBACK.to_string());

        HeadlessOutcome {
            summary,
            completed,
            timed_out: true,
            error: None,
            session_id: Some(session_id),
        }
    }

    async fn collect(&self, session_id: &str, transcript: &mut Transcript) {
        match self.runtime.get_messages(session_id).await {
            Ok(messages) => transcript.absorb_messages(&messages),
            Err(e) => warn!(session = %session_id, "Failed to read messages: {}", e),
        }
    }
}

fn completed(summary: String, session_id: String) -> HeadlessOutcome {
    HeadlessOutcome {
        summary,
        completed: true,
        timed_out: false,
        error: None,
        session_id: Some(session_id),
    }
}
