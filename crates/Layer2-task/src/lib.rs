//! # sidecar-task
//!
//! Subagent orchestration engine for Sidecar.
//! Delegates work to an external agent runtime, bounds how much of it runs
//! at once, and turns free-text runtime output into task results.
//!
//! ## Components
//!
//! ```text
//!   session log ──► SessionResolver ──► ContextWindowBuilder ──┐
//!                                                              ▼
//!   SubagentRequest ──► ModelRouter ──► SubagentScheduler ──► AgentRuntime
//!                                            │                   ▲
//!                                            ▼                   │
//!                                        EventHub            CompletionPoller
//!                                      (TaskStore, ...)      (headless tasks)
//! ```
//!
//! - **ContextWindowBuilder**: bounded transcript of the recent conversation
//! - **ModelRouter**: explicit model, inheritance, or cheap model for exploration
//! - **SessionResolver**: which conversation log to read
//! - **SubagentScheduler**: at most N running subagents, FIFO overflow queue
//! - **CompletionPoller**: runs one task until the completion marker appears

pub mod context;
pub mod headless;
pub mod runtime;
pub mod session;
pub mod state;
pub mod subagent;
pub mod task;

// Task model
pub use state::{HeadlessStatus, TaskStatus};
pub use task::{AgentType, Task, TaskId};

// Context
pub use context::{
    parse_duration, ContextOptions, ContextWindow, ContextWindowBuilder, ConversationMessage,
    MessageKind,
};

// Sessions
pub use session::{
    default_projects_root, project_session_dir, read_session_log, ResolveMethod,
    SessionResolution, SessionResolver,
};

// Runtime
pub use runtime::{
    wait_for_health, AgentRuntime, HttpAgentRuntime, PromptRequest, PromptResponse,
    RuntimeHandle, RuntimeMessage, RuntimeOptions, RuntimeStatus,
};

// Subagents
pub use subagent::{
    Admission, DispatchTicket, EventHub, EventKind, ModelRouter, RouteDecision, RouteReason,
    RoutingConfigProvider, SubagentEvent, SubagentListener, SubagentRequest, SubagentScheduler,
    TaskFilter, TaskStore, MAX_CONCURRENT,
};

// Headless execution
pub use headless::{
    extract_summary, AbortHandle, CompletionPoller, HeadlessOutcome, HeadlessRequest,
    PollerConfig, COMPLETION_MARKER,
};
