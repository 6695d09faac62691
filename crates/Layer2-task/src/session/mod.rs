//! Conversation sessions
//!
//! - `resolver`: picks which conversation log a new task reads context from
//! - `log`: reads a JSONL conversation log into [`ConversationMessage`]s
//!
//! [`ConversationMessage`]: crate::context::ConversationMessage

pub mod log;
pub mod resolver;

pub use log::{default_projects_root, encode_project_path, project_session_dir, read_session_log};
pub use resolver::{
    ResolveMethod, SessionResolution, SessionResolver, AMBIGUITY_WINDOW, CURRENT_SESSION,
    SESSION_LOG_EXTENSION,
};
