//! Context window builder
//!
//! Turns a long conversation history into a bounded transcript that a new
//! task receives as background. Pure and stateless: the same history, options
//! and clock always produce the same text.
//!
//! Filtering picks exactly one strategy:
//! - `since` (a duration such as `30m`, `2h`, `1d`) keeps messages newer than
//!   `now - since`, and overrides `turns` when it parses;
//! - otherwise `turns` keeps the last N user turns and everything after them.
//!
//! The formatted transcript is then cut to the trailing `max_tokens * 4`
//! characters, with [`TRUNCATION_NOTICE`] in front when anything was dropped.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Characters per token used for budgeting
pub const CHARS_PER_TOKEN: usize = 4;

/// Prefix added when the transcript was cut
pub const TRUNCATION_NOTICE: &str = "[Earlier context truncated...]\n\n";

/// Default number of user turns
pub const DEFAULT_TURNS: usize = 10;

/// Default token budget
pub const DEFAULT_MAX_TOKENS: usize = 80_000;

/// Kind of a conversation entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    User,
    Assistant,
    ToolUse,
}

/// One entry of a conversation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(kind: MessageKind, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind,
            content: content.into(),
            timestamp,
        }
    }

    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(MessageKind::User, content, timestamp)
    }

    pub fn assistant(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(MessageKind::Assistant, content, timestamp)
    }

    pub fn tool_use(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self::new(MessageKind::ToolUse, content, timestamp)
    }

    /// Render as one transcript entry
    pub fn format(&self) -> String {
        let time = self.timestamp.format("%H:%M");
        match self.kind {
            MessageKind::User => format!("[User @ {}] {}", time, self.content),
            MessageKind::Assistant => format!("[Assistant @ {}] {}", time, self.content),
            MessageKind::ToolUse => format!("[Tool: {}]", self.content),
        }
    }
}

/// Options for [`ContextWindowBuilder`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
    /// Keep the last N user turns
    pub turns: Option<usize>,

    /// Keep messages newer than this duration; overrides `turns`
    pub since: Option<String>,

    /// Token budget (1 token ≈ 4 characters)
    pub max_tokens: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            turns: Some(DEFAULT_TURNS),
            since: None,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

impl ContextOptions {
    pub fn turns(mut self, turns: usize) -> Self {
        self.turns = Some(turns);
        self
    }

    pub fn since(mut self, since: impl Into<String>) -> Self {
        self.since = Some(since.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn max_chars(&self) -> usize {
        self.max_tokens.saturating_mul(CHARS_PER_TOKEN)
    }
}

/// A bounded transcript derived from a history
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextWindow {
    /// Messages that survived filtering, in original order
    pub messages: Vec<ConversationMessage>,

    /// Formatted (and possibly truncated) transcript
    pub text: String,

    /// Whether the transcript was cut to fit the budget
    pub truncated: bool,
}

/// Parse `<n>m`, `<n>h` or `<n>d`; anything else is `None`
pub fn parse_duration(input: &str) -> Option<Duration> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(r"^(\d+)([mhd])$").expect("valid regex"));

    let caps = pattern.captures(input.trim())?;
    let amount: i64 = caps[1].parse().ok()?;
    if amount == 0 {
        return None;
    }
    match &caps[2] {
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        _ => None,
    }
}

/// Builds context windows from conversation histories
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextWindowBuilder;

impl ContextWindowBuilder {
    /// Build the context string using the current time
    pub fn build(history: &[ConversationMessage], options: &ContextOptions) -> String {
        Self::build_at(history, options, Utc::now())
    }

    /// Build the context string against an explicit clock
    pub fn build_at(
        history: &[ConversationMessage],
        options: &ContextOptions,
        now: DateTime<Utc>,
    ) -> String {
        Self::window_at(history, options, now).text
    }

    /// Build the full window value using the current time
    pub fn window(history: &[ConversationMessage], options: &ContextOptions) -> ContextWindow {
        Self::window_at(history, options, Utc::now())
    }

    /// Build the full window value against an explicit clock
    pub fn window_at(
        history: &[ConversationMessage],
        options: &ContextOptions,
        now: DateTime<Utc>,
    ) -> ContextWindow {
        let messages = Self::filter(history, options, now);
        let formatted = Self::format(&messages);

        let max_chars = options.max_chars();
        if formatted.len() <= max_chars {
            return ContextWindow {
                messages,
                text: formatted,
                truncated: false,
            };
        }

        let tail = tail_within(&formatted, max_chars);
        ContextWindow {
            messages,
            text: format!("{}{}", TRUNCATION_NOTICE, tail),
            truncated: true,
        }
    }

    fn filter(
        history: &[ConversationMessage],
        options: &ContextOptions,
        now: DateTime<Utc>,
    ) -> Vec<ConversationMessage> {
        if let Some(window) = options.since.as_deref().and_then(parse_duration) {
            // a window reaching past the earliest representable time keeps everything
            return match now.checked_sub_signed(window) {
                Some(cutoff) => history
                    .iter()
                    .filter(|m| m.timestamp >= cutoff)
                    .cloned()
                    .collect(),
                None => history.to_vec(),
            };
        }

        match options.turns {
            Some(turns) => last_turns(history, turns),
            None => history.to_vec(),
        }
    }

    fn format(messages: &[ConversationMessage]) -> String {
        messages
            .iter()
            .filter(|m| !m.content.trim().is_empty())
            .map(ConversationMessage::format)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Everything from the N-th-to-last user message onward
fn last_turns(history: &[ConversationMessage], turns: usize) -> Vec<ConversationMessage> {
    if turns == 0 {
        return Vec::new();
    }

    let user_indices: Vec<usize> = history
        .iter()
        .enumerate()
        .filter(|(_, m)| m.kind == MessageKind::User)
        .map(|(i, _)| i)
        .collect();

    if user_indices.len() < turns {
        return history.to_vec();
    }

    let start = user_indices[user_indices.len() - turns];
    history[start..].to_vec()
}

/// Trailing slice of at most `max_bytes`, starting on a char boundary
fn tail_within(text: &str, max_bytes: usize) -> &str {
    let mut start = text.len().saturating_sub(max_bytes);
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
