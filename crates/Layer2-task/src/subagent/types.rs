//! Subagent request and query types

use crate::state::TaskStatus;
use crate::task::{AgentType, Task, TaskId};
use serde::{Deserialize, Serialize};
use sidecar_foundation::{Error, Result};
use tokio::sync::oneshot;

/// Request to spawn a subagent
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubagentRequest {
    /// Task that spawned this one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_task_id: Option<String>,

    /// Role name (`General`, `Explore`)
    pub agent_type: String,

    /// Instruction for the subagent
    pub briefing: String,

    /// Explicit model; skips routing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Model of the parent task
    pub parent_model: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
}

impl SubagentRequest {
    pub fn new(
        agent_type: impl Into<String>,
        briefing: impl Into<String>,
        parent_model: impl Into<String>,
    ) -> Self {
        Self {
            agent_type: agent_type.into(),
            briefing: briefing.into(),
            parent_model: parent_model.into(),
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent_task_id: impl Into<String>) -> Self {
        self.parent_task_id = Some(parent_task_id.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_reasoning_effort(mut self, effort: impl Into<String>) -> Self {
        self.reasoning_effort = Some(effort.into());
        self
    }

    /// Check the role and briefing; returns the parsed role
    pub fn validate(&self) -> Result<AgentType> {
        let agent_type = AgentType::parse(&self.agent_type);
        if !agent_type.is_subagent_role() {
            return Err(Error::Validation(format!(
                "Invalid subagent type '{}' (expected General or Explore)",
                self.agent_type.trim()
            )));
        }
        if self.briefing.trim().is_empty() {
            return Err(Error::Validation("Briefing must not be empty".into()));
        }
        Ok(agent_type)
    }
}

/// Filter for [`SubagentScheduler::list`](super::SubagentScheduler::list)
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub agent_type: Option<AgentType>,
}

impl TaskFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn agent_type(mut self, agent_type: AgentType) -> Self {
        self.agent_type = Some(agent_type);
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.status.map_or(true, |s| task.status == s)
            && self
                .agent_type
                .as_ref()
                .map_or(true, |a| &task.agent_type == a)
    }
}

/// Resolves once a queued task has been dispatched
///
/// The task arrives in its post-dispatch state: `Running`, or `Failed` when
/// dispatch went wrong.
#[derive(Debug)]
pub struct DispatchTicket {
    pub(crate) task_id: TaskId,
    pub(crate) rx: oneshot::Receiver<Task>,
}

impl DispatchTicket {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Wait for dispatch
    pub async fn dispatched(self) -> Result<Task> {
        // sender dropped: the scheduler went away first
        self.rx.await.map_err(|_| Error::Cancelled)
    }
}

/// Result of [`SubagentScheduler::admit`](super::SubagentScheduler::admit)
#[derive(Debug)]
pub enum Admission {
    /// A slot was free; the task is running (or failed to dispatch)
    Dispatched(Task),

    /// All slots busy; the task waits in the queue
    Queued { task: Task, ticket: DispatchTicket },
}

impl Admission {
    pub fn task(&self) -> &Task {
        match self {
            Self::Dispatched(task) => task,
            Self::Queued { task, .. } => task,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }
}
