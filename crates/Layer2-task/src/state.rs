//! Task state machines
//!
//! Subagents move `Pending → Running → {Completed | Failed}`; top-level
//! (headless) runs end in one of `Complete`, `Error` or `Timeout`. Neither
//! machine ever leaves a terminal state.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a subagent task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in the scheduler queue
    Pending,

    /// Dispatched to the agent runtime
    Running,

    /// Reported complete by the caller
    Completed,

    /// Reported failed, or dispatch itself failed
    Failed,
}

impl TaskStatus {
    /// Check if this is a terminal state (cannot transition further)
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Check if task is currently running
    pub fn is_running(&self) -> bool {
        matches!(self, TaskStatus::Running)
    }

    /// Whether moving to `next` is a legal forward transition
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match (self, next) {
            (TaskStatus::Pending, TaskStatus::Running) => true,
            // dispatch failures skip straight to failed
            (TaskStatus::Pending, TaskStatus::Failed) => true,
            (TaskStatus::Running, TaskStatus::Completed | TaskStatus::Failed) => true,
            _ => false,
        }
    }

    /// Get display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "Pending",
            TaskStatus::Running => "Running",
            TaskStatus::Completed => "Completed",
            TaskStatus::Failed => "Failed",
        }
    }

    /// Get a symbol for the state
    pub fn symbol(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "◯",
            TaskStatus::Running => "⟳",
            TaskStatus::Completed => "✓",
            TaskStatus::Failed => "✗",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Status of a top-level task driven by the completion poller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadlessStatus {
    Running,
    Complete,
    Error,
    Timeout,
}

impl HeadlessStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, HeadlessStatus::Running)
    }
}

impl std::fmt::Display for HeadlessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HeadlessStatus::Running => "running",
            HeadlessStatus::Complete => "complete",
            HeadlessStatus::Error => "error",
            HeadlessStatus::Timeout => "timeout",
        };
        f.write_str(name)
    }
}
