//! Agent runtime boundary
//!
//! The runtime is a black box: it accepts a prompt for a session and
//! asynchronously produces text, possibly after tool use. Everything in this
//! crate talks to it only through [`AgentRuntime`].

mod http;
#[cfg(test)]
pub(crate) mod mock;

pub use http::HttpAgentRuntime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sidecar_foundation::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Status the runtime reports for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeStatus {
    Idle,
    Running,
    Completed,
    Error,
}

impl RuntimeStatus {
    /// The session is no longer producing work
    pub fn is_settled(&self) -> bool {
        !matches!(self, RuntimeStatus::Running)
    }
}

/// Prompt sent to a runtime session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptRequest {
    /// Model identifier (`provider/model`)
    pub model: String,

    /// Optional system prompt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Briefing text
    pub text: String,

    /// Agent role the runtime should apply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,

    /// Reasoning effort hint (`low`, `medium`, `high`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
}

impl PromptRequest {
    pub fn new(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: Option<String>) -> Self {
        self.system = system;
        self
    }

    pub fn with_agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn with_reasoning_effort(mut self, effort: Option<String>) -> Self {
        self.reasoning_effort = effort;
        self
    }
}

/// Immediate response to a prompt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptResponse {
    pub text_parts: Vec<String>,
}

impl PromptResponse {
    pub fn text(&self) -> String {
        self.text_parts.join("\n")
    }
}

/// One message of a session's log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeMessage {
    /// `user` or `assistant`
    pub role: String,
    pub text_parts: Vec<String>,
}

impl RuntimeMessage {
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            text_parts: vec![text.into()],
        }
    }

    pub fn is_assistant(&self) -> bool {
        self.role == "assistant"
    }

    pub fn text(&self) -> String {
        self.text_parts.join("\n")
    }
}

/// How to bring a runtime server up
#[derive(Debug, Clone, Default)]
pub struct RuntimeOptions {
    /// Attach to an existing server instead of spawning one
    pub url: Option<String>,

    /// Server binary
    pub command: String,

    /// Port for a spawned server (0 picks a free one)
    pub port: u16,

    /// Working directory for a spawned server
    pub workdir: Option<PathBuf>,
}

/// A started runtime; pass back to [`AgentRuntime::close`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeHandle {
    pub url: String,

    /// Child process id when the server was spawned by us
    pub pid: Option<u32>,
}

/// Client for the external agent-execution runtime
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Bring the runtime up (spawn or attach)
    async fn start_runtime(&self, options: &RuntimeOptions) -> Result<RuntimeHandle>;

    /// Release everything `start_runtime` acquired
    async fn close(&self, handle: RuntimeHandle) -> Result<()>;

    /// Whether the runtime answers
    async fn check_health(&self) -> bool;

    /// Create a session, optionally as a child of another
    async fn create_session(&self, parent_id: Option<&str>) -> Result<String>;

    /// Send a prompt and wait for the immediate response
    async fn send_prompt(&self, session_id: &str, request: &PromptRequest)
        -> Result<PromptResponse>;

    /// Send a prompt without waiting for the model to answer
    async fn send_prompt_async(&self, session_id: &str, request: &PromptRequest) -> Result<()> {
        self.send_prompt(session_id, request).await.map(|_| ())
    }

    /// Full message log of a session
    async fn get_messages(&self, session_id: &str) -> Result<Vec<RuntimeMessage>>;

    /// Current status of a session
    async fn get_status(&self, session_id: &str) -> Result<RuntimeStatus>;
}

/// Poll `check_health` until it succeeds
pub async fn wait_for_health(
    runtime: &dyn AgentRuntime,
    attempts: u32,
    interval: Duration,
) -> Result<()> {
    for attempt in 1..=attempts.max(1) {
        if runtime.check_health().await {
            debug!(attempt, "Agent runtime is healthy");
            return Ok(());
        }
        if attempt < attempts {
            tokio::time::sleep(interval).await;
        }
    }

    Err(Error::runtime(format!(
        "Agent runtime did not become healthy after {} attempts",
        attempts.max(1)
    )))
}

#[cfg(test)]
mod tests {
    use super::mock::ScriptedRuntime;
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_health_eventually() {
        let runtime = ScriptedRuntime::new();
        runtime.set_unhealthy_checks(2);

        wait_for_health(&runtime, 5, Duration::from_millis(100))
            .await
            .unwrap();
        assert_eq!(runtime.health_checks(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_health_exhausted() {
        let runtime = ScriptedRuntime::new();
        runtime.set_unhealthy_checks(10);

        let err = wait_for_health(&runtime, 3, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Runtime(_)));
        assert_eq!(runtime.health_checks(), 3);
    }

    #[test]
    fn test_status_settled() {
        assert!(RuntimeStatus::Idle.is_settled());
        assert!(RuntimeStatus::Error.is_settled());
        assert!(!RuntimeStatus::Running.is_settled());
    }
}
