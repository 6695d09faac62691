//! Task definition and types

use crate::state::TaskStatus;
use crate::subagent::RouteReason;
use chrono::{DateTime, Utc};
use sidecar_foundation::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a new random TaskId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from string (for reading persisted records)
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Agent role - a permission profile for the external runtime
///
/// Orthogonal to model routing: the role decides what tools the runtime may
/// use, the router decides which model runs it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// Full access, top-level default
    Build,

    /// Read-only planning
    Plan,

    /// Full-access subagent
    General,

    /// Read-only exploration subagent
    Explore,

    /// Anything else the runtime knows about
    Custom(String),
}

impl AgentType {
    /// Parse a role name, case-insensitively. Never fails.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "build" => Self::Build,
            "plan" => Self::Plan,
            "general" => Self::General,
            "explore" => Self::Explore,
            _ => Self::Custom(name.trim().to_string()),
        }
    }

    /// Roles a subagent may be spawned with
    pub fn is_subagent_role(&self) -> bool {
        matches!(self, Self::General | Self::Explore)
    }

    /// Roles that must not modify anything
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::Plan | Self::Explore)
    }

    /// Name as sent to the runtime
    pub fn as_str(&self) -> &str {
        match self {
            Self::Build => "Build",
            Self::Plan => "Plan",
            Self::General => "General",
            Self::Explore => "Explore",
            Self::Custom(name) => name,
        }
    }
}

impl Default for AgentType {
    fn default() -> Self {
        Self::General
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A delegated unit of work handed to the agent runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier, never reused
    pub id: TaskId,

    /// Task that spawned this one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<String>,

    /// Permission profile
    pub agent_type: AgentType,

    /// Instruction, immutable after creation
    pub briefing: String,

    /// Resolved model identifier
    pub model: String,

    /// True iff the model differs from the inherited parent model
    pub model_was_routed: bool,

    /// Why the router picked `model`
    pub route_reason: RouteReason,

    /// Current status
    pub status: TaskStatus,

    /// Correlation handle returned by the runtime
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_session_id: Option<String>,

    /// Result text (completed only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,

    /// Error text (failed only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// When the task was created
    pub created_at: DateTime<Utc>,

    /// When the task was dispatched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the task reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending task
    pub fn new(
        agent_type: AgentType,
        briefing: impl Into<String>,
        model: impl Into<String>,
        route_reason: RouteReason,
        model_was_routed: bool,
    ) -> Self {
        Self {
            id: TaskId::new(),
            parent_task_id: None,
            agent_type,
            briefing: briefing.into(),
            model: model.into(),
            model_was_routed,
            route_reason,
            status: TaskStatus::Pending,
            external_session_id: None,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Set the parent task
    pub fn with_parent(mut self, parent_task_id: Option<String>) -> Self {
        self.parent_task_id = parent_task_id;
        self
    }

    fn transition(&mut self, next: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::Task(format!(
                "Task {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Mark task as running
    pub fn start(&mut self) -> Result<()> {
        self.transition(TaskStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Record the runtime session; set once
    pub fn attach_session(&mut self, session_id: impl Into<String>) -> Result<()> {
        if !self.status.is_running() {
            return Err(Error::Task(format!("Task {} is not running", self.id)));
        }
        if self.external_session_id.is_some() {
            return Err(Error::Task(format!("Task {} already has a session", self.id)));
        }
        self.external_session_id = Some(session_id.into());
        Ok(())
    }

    /// Mark task as completed successfully
    pub fn complete(&mut self, result: impl Into<String>) -> Result<()> {
        self.transition(TaskStatus::Completed)?;
        self.result = Some(result.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Mark task as failed
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(error.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Check if task is still active (pending or running)
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Get execution duration if task has started
    pub fn duration(&self) -> Option<std::time::Duration> {
        let start = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        Some((end - start).to_std().unwrap_or_default())
    }
}
