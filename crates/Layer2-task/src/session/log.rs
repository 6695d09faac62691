//! Conversation log reader
//!
//! Each line of a session log is one JSON record. Only `user` and
//! `assistant` records carry conversation; everything else (summaries,
//! snapshots, system noise) is skipped, as are lines that fail to parse.

use crate::context::ConversationMessage;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use sidecar_foundation::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize)]
struct LogRecord {
    #[serde(rename = "type")]
    kind: String,
    timestamp: Option<DateTime<Utc>>,
    message: Option<LogMessage>,
}

#[derive(Deserialize)]
struct LogMessage {
    #[serde(default)]
    content: Value,
}

/// Root directory of per-project session logs (`~/.claude/projects`)
pub fn default_projects_root() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude").join("projects"))
}

/// Directory name used for a project path: separators, dots and underscores
/// all become dashes
pub fn encode_project_path(project_path: &Path) -> String {
    project_path
        .to_string_lossy()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '.' | '_' | ':' => '-',
            c => c,
        })
        .collect()
}

/// Session directory for `project_path` under `root`
pub fn project_session_dir(root: &Path, project_path: &Path) -> PathBuf {
    root.join(encode_project_path(project_path))
}

/// Read a session log into conversation messages, in file order
pub fn read_session_log(path: &Path) -> Result<Vec<ConversationMessage>> {
    let raw = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::NotFound(format!("{}", path.display())),
        _ => Error::Io(e),
    })?;

    let mut messages = Vec::new();
    let mut skipped = 0usize;

    // lines are decoded one at a time so a corrupt line only loses itself
    for line in raw
        .split(|b| *b == b'\n')
        .filter(|l| !l.iter().all(u8::is_ascii_whitespace))
    {
        match serde_json::from_slice::<LogRecord>(line) {
            Ok(record) => messages.extend(convert(record)),
            Err(_) => skipped += 1,
        }
    }

    debug!(
        path = %path.display(),
        messages = messages.len(),
        skipped,
        "Read session log"
    );
    Ok(messages)
}

fn convert(record: LogRecord) -> Vec<ConversationMessage> {
    let (Some(timestamp), Some(message)) = (record.timestamp, record.message) else {
        return Vec::new();
    };

    match record.kind.as_str() {
        "user" => user_messages(&message.content, timestamp),
        "assistant" => assistant_messages(&message.content, timestamp),
        _ => Vec::new(),
    }
}

fn user_messages(content: &Value, timestamp: DateTime<Utc>) -> Vec<ConversationMessage> {
    let text = match content {
        Value::String(s) => s.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter(|b| block_type(b) == Some("text"))
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    };

    // tool results come back as user records with no text blocks
    if text.trim().is_empty() {
        return Vec::new();
    }
    vec![ConversationMessage::user(text, timestamp)]
}

fn assistant_messages(content: &Value, timestamp: DateTime<Utc>) -> Vec<ConversationMessage> {
    match content {
        Value::String(s) => vec![ConversationMessage::assistant(s.clone(), timestamp)],
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|block| match block_type(block) {
                Some("text") => block
                    .get("text")
                    .and_then(Value::as_str)
                    .map(|t| ConversationMessage::assistant(t, timestamp)),
                Some("tool_use") => Some(ConversationMessage::tool_use(
                    describe_tool_use(block),
                    timestamp,
                )),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn block_type(block: &Value) -> Option<&str> {
    block.get("type").and_then(Value::as_str)
}

fn describe_tool_use(block: &Value) -> String {
    let name = block.get("name").and_then(Value::as_str).unwrap_or("tool");
    match block.get("input") {
        Some(input) if !input.is_null() => format!("{} {}", name, input),
        _ => name.to_string(),
    }
}
