//! Task metadata persistence
//!
//! One `<task-uuid>.json` file per task, rewritten on every lifecycle event.

use super::events::{EventKind, SubagentEvent, SubagentListener};
use crate::task::{Task, TaskId};
use async_trait::async_trait;
use sidecar_foundation::{JsonStore, Result};
use std::path::PathBuf;
use tracing::warn;

/// File-backed record of subagent tasks
pub struct TaskStore {
    store: JsonStore,
}

impl TaskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            store: JsonStore::new(dir),
        }
    }

    /// `<project>/.sidecar/tasks`
    pub fn for_project(root: impl Into<PathBuf>) -> Self {
        Self::new(root.into().join(".sidecar").join("tasks"))
    }

    fn filename(id: &TaskId) -> String {
        format!("{}.json", id.0)
    }

    pub fn save(&self, task: &Task) -> Result<()> {
        self.store.save(&Self::filename(&task.id), task)
    }

    pub fn load(&self, id: &TaskId) -> Result<Option<Task>> {
        self.store.load_optional(&Self::filename(id))
    }

    /// All readable records, oldest first; unreadable files are skipped
    pub fn list(&self) -> Result<Vec<Task>> {
        let mut tasks: Vec<Task> = self
            .store
            .list()?
            .iter()
            .filter_map(|name| match self.store.load::<Task>(name) {
                Ok(task) => Some(task),
                Err(e) => {
                    warn!(file = %name, "Skipping unreadable task record: {}", e);
                    None
                }
            })
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }
}

#[async_trait]
impl SubagentListener for TaskStore {
    fn name(&self) -> &str {
        "task-store"
    }

    fn kinds(&self) -> Option<Vec<EventKind>> {
        Some(vec![
            EventKind::Spawned,
            EventKind::Completed,
            EventKind::Failed,
        ])
    }

    async fn on_event(&self, event: &SubagentEvent) {
        if let Some(task) = event.task() {
            if let Err(e) = self.save(task) {
                warn!(task_id = %task.id, "Failed to persist task: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TaskStatus;
    use crate::subagent::RouteReason;
    use crate::task::AgentType;

    fn task(briefing: &str) -> Task {
        Task::new(
            AgentType::Explore,
            briefing,
            "cheap/model",
            RouteReason::RoutedExplore,
            true,
        )
        .with_parent(Some("parent-1".into()))
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path());
        let mut t = task("scan");
        t.start().unwrap();
        t.complete("found 3 routes").unwrap();
        store.save(&t).unwrap();

        let loaded = store.load(&t.id).unwrap().unwrap();
        assert_eq!(loaded.id, t.id);
        assert_eq!(loaded.status, TaskStatus::Completed);
        assert_eq!(loaded.result.as_deref(), Some("found 3 routes"));
        assert_eq!(loaded.parent_task_id.as_deref(), Some("parent-1"));
        assert!(store.load(&TaskId::new()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_listener_persists_latest_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = TaskStore::new(dir.path());
        let mut t = task("scan");
        t.start().unwrap();
        store.on_event(&SubagentEvent::Spawned(t.clone())).await;
        t.fail("boom").unwrap();
        store.on_event(&SubagentEvent::Failed(t.clone())).await;

        let all = store.list().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, TaskStatus::Failed);
        assert_eq!(all[0].error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_list_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("junk.json"), "{not json").unwrap();
        let store = TaskStore::new(dir.path());
        store.save(&task("one")).unwrap();

        assert_eq!(store.list().unwrap().len(), 1);
    }
}
