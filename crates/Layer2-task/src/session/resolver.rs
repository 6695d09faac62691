//! Session resolution
//!
//! A project directory holds one `<session-id>.jsonl` log per conversation.
//! Resolution either honours an explicit id or falls back to the most
//! recently modified log, and always says which of the two happened.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// Sentinel id meaning "whatever session is current"
pub const CURRENT_SESSION: &str = "current";

/// Extension of conversation logs
pub const SESSION_LOG_EXTENSION: &str = "jsonl";

/// Two logs touched within this window make "most recent" ambiguous
pub const AMBIGUITY_WINDOW: Duration = Duration::from_secs(5 * 60);

/// How a session was picked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveMethod {
    /// The requested id was found
    Explicit,

    /// Most recently modified log (or nothing, in an empty directory)
    Fallback,

    /// The directory does not exist
    Error,
}

/// Result of [`SessionResolver::resolve`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionResolution {
    /// Path of the chosen log; `None` when nothing was found
    pub path: Option<PathBuf>,
    pub method: ResolveMethod,
    pub warning: Option<String>,
}

impl SessionResolution {
    pub fn found(&self) -> bool {
        self.path.is_some()
    }

    /// Session id of the chosen log (file stem)
    pub fn session_id(&self) -> Option<String> {
        self.path
            .as_deref()
            .and_then(Path::file_stem)
            .map(|s| s.to_string_lossy().into_owned())
    }
}

struct LogFile {
    path: PathBuf,
    modified: SystemTime,
}

/// Resolves conversation logs in a session directory
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionResolver;

impl SessionResolver {
    /// Resolve against the current wall clock
    pub fn resolve(dir: &Path, requested: Option<&str>) -> SessionResolution {
        Self::resolve_at(dir, requested, SystemTime::now())
    }

    /// Resolve against an explicit clock (for the ambiguity window)
    pub fn resolve_at(dir: &Path, requested: Option<&str>, now: SystemTime) -> SessionResolution {
        let logs = match list_logs(dir) {
            Ok(logs) => logs,
            Err(e) => {
                warn!(dir = %dir.display(), "Cannot read session directory: {}", e);
                return SessionResolution {
                    path: None,
                    method: ResolveMethod::Error,
                    warning: Some(format!(
                        "Session directory not found: {}",
                        dir.display()
                    )),
                };
            }
        };

        let requested = requested
            .map(str::trim)
            .filter(|id| !id.is_empty() && !id.eq_ignore_ascii_case(CURRENT_SESSION));

        if let Some(id) = requested {
            if let Some(log) = logs.iter().find(|l| stem_matches(&l.path, id)) {
                debug!(session = id, "Resolved explicit session");
                return SessionResolution {
                    path: Some(log.path.clone()),
                    method: ResolveMethod::Explicit,
                    warning: None,
                };
            }

            let fallback = logs.first().map(|l| l.path.clone());
            let warning = match &fallback {
                Some(path) => format!(
                    "Session '{}' not found; using most recent session {}",
                    id,
                    path.display()
                ),
                None => format!("Session '{}' not found and no sessions exist", id),
            };
            warn!("{}", warning);
            return SessionResolution {
                path: fallback,
                method: ResolveMethod::Fallback,
                warning: Some(warning),
            };
        }

        let Some(latest) = logs.first() else {
            return SessionResolution {
                path: None,
                method: ResolveMethod::Fallback,
                warning: Some(format!("No sessions found in {}", dir.display())),
            };
        };

        let recent = logs
            .iter()
            .filter(|l| {
                now.duration_since(l.modified)
                    .map(|age| age <= AMBIGUITY_WINDOW)
                    .unwrap_or(true)
            })
            .count();

        let warning = (recent >= 2).then(|| {
            format!(
                "{} sessions were active in the last {} minutes; using the most recent one. \
                 Pass an explicit session id to choose another.",
                recent,
                AMBIGUITY_WINDOW.as_secs() / 60
            )
        });

        SessionResolution {
            path: Some(latest.path.clone()),
            method: ResolveMethod::Fallback,
            warning,
        }
    }
}

fn stem_matches(path: &Path, id: &str) -> bool {
    path.file_stem().map(|s| s == id).unwrap_or(false)
}

/// Logs in `dir`, newest first
fn list_logs(dir: &Path) -> std::io::Result<Vec<LogFile>> {
    let mut logs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().map(|e| e == SESSION_LOG_EXTENSION) != Some(true) {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        logs.push(LogFile {
            path,
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }
    logs.sort_by(|a, b| b.modified.cmp(&a.modified));
    Ok(logs)
}
