//! Subagent orchestration
//!
//! - `router`: which model a task runs on
//! - `scheduler`: bounded dispatch with a FIFO queue
//! - `events`: lifecycle notifications (spawned, completed, failed, fold)
//! - `store`: per-task JSON records

pub mod events;
pub mod router;
pub mod scheduler;
pub mod store;
pub mod types;

pub use events::{EventHub, EventKind, ListenerId, SubagentEvent, SubagentListener};
pub use router::{ModelRouter, RouteDecision, RouteReason, RoutingConfigProvider};
pub use scheduler::{default_fold_summary, FoldFormatter, SubagentScheduler, MAX_CONCURRENT};
pub use store::TaskStore;
pub use types::{Admission, DispatchTicket, SubagentRequest, TaskFilter};
