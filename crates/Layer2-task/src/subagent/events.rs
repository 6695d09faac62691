//! Subagent lifecycle events
//!
//! The scheduler publishes every lifecycle change here. Listeners registered
//! with [`EventHub::subscribe`] are called in turn; a broadcast receiver is
//! available for consumers that prefer a stream.

use crate::task::{Task, TaskId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, trace};

const CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// Events
// ============================================================================

/// Lifecycle notification
#[derive(Debug, Clone)]
pub enum SubagentEvent {
    /// Dispatched to the runtime
    Spawned(Task),

    /// Reported finished
    Completed(Task),

    /// Reported failed, or dispatch failed
    Failed(Task),

    /// Summary to fold back into the parent's conversation
    Fold {
        task_id: TaskId,
        parent_task_id: Option<String>,
        summary: String,
    },
}

/// Event discriminant, for listener filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Spawned,
    Completed,
    Failed,
    Fold,
}

impl SubagentEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Spawned(_) => EventKind::Spawned,
            Self::Completed(_) => EventKind::Completed,
            Self::Failed(_) => EventKind::Failed,
            Self::Fold { .. } => EventKind::Fold,
        }
    }

    pub fn task_id(&self) -> TaskId {
        match self {
            Self::Spawned(t) | Self::Completed(t) | Self::Failed(t) => t.id,
            Self::Fold { task_id, .. } => *task_id,
        }
    }

    /// Task snapshot carried by the event, if any
    pub fn task(&self) -> Option<&Task> {
        match self {
            Self::Spawned(t) | Self::Completed(t) | Self::Failed(t) => Some(t),
            Self::Fold { .. } => None,
        }
    }
}

// ============================================================================
// Listener
// ============================================================================

/// Listener ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Receives subagent lifecycle events
#[async_trait]
pub trait SubagentListener: Send + Sync {
    /// Name for logging
    fn name(&self) -> &str;

    /// Kinds this listener wants (`None` = all)
    fn kinds(&self) -> Option<Vec<EventKind>> {
        None
    }

    async fn on_event(&self, event: &SubagentEvent);
}

// ============================================================================
// EventHub
// ============================================================================

/// Fan-out point for subagent events
pub struct EventHub {
    sender: broadcast::Sender<SubagentEvent>,
    listeners: RwLock<HashMap<ListenerId, Arc<dyn SubagentListener>>>,
    listener_counter: AtomicU64,
}

impl EventHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            listeners: RwLock::new(HashMap::new()),
            listener_counter: AtomicU64::new(0),
        }
    }

    /// Register a listener
    pub async fn subscribe(&self, listener: Arc<dyn SubagentListener>) -> ListenerId {
        let id = ListenerId(self.listener_counter.fetch_add(1, Ordering::SeqCst));
        debug!(listener = listener.name(), %id, "Registered subagent listener");
        self.listeners.write().await.insert(id, listener);
        id
    }

    /// Remove a listener; returns whether it was registered
    pub async fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.write().await.remove(&id).is_some()
    }

    /// Broadcast receiver for all future events
    pub fn receiver(&self) -> broadcast::Receiver<SubagentEvent> {
        self.sender.subscribe()
    }

    pub async fn listener_count(&self) -> usize {
        self.listeners.read().await.len()
    }

    /// Deliver an event to listeners and broadcast receivers
    pub async fn publish(&self, event: SubagentEvent) {
        trace!(kind = ?event.kind(), task_id = %event.task_id(), "Publishing subagent event");

        let listeners: Vec<_> = self.listeners.read().await.values().cloned().collect();
        for listener in listeners {
            let wanted = listener
                .kinds()
                .map_or(true, |kinds| kinds.contains(&event.kind()));
            if wanted {
                listener.on_event(&event).await;
            }
        }

        // no receivers is fine
        let _ = self.sender.send(event);
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subagent::RouteReason;
    use crate::task::AgentType;
    use std::sync::Mutex;

    struct Recorder {
        kinds: Option<Vec<EventKind>>,
        seen: Mutex<Vec<EventKind>>,
    }

    #[async_trait]
    impl SubagentListener for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn kinds(&self) -> Option<Vec<EventKind>> {
            self.kinds.clone()
        }

        async fn on_event(&self, event: &SubagentEvent) {
            self.seen.lock().unwrap().push(event.kind());
        }
    }

    fn task() -> Task {
        Task::new(
            AgentType::General,
            "do it",
            "A",
            RouteReason::InheritedParent,
            false,
        )
    }

    #[tokio::test]
    async fn test_listener_filtering() {
        let hub = EventHub::new();
        let all = Arc::new(Recorder {
            kinds: None,
            seen: Mutex::new(Vec::new()),
        });
        let folds = Arc::new(Recorder {
            kinds: Some(vec![EventKind::Fold]),
            seen: Mutex::new(Vec::new()),
        });
        hub.subscribe(all.clone()).await;
        hub.subscribe(folds.clone()).await;

        let t = task();
        hub.publish(SubagentEvent::Spawned(t.clone())).await;
        hub.publish(SubagentEvent::Fold {
            task_id: t.id,
            parent_task_id: None,
            summary: "done".into(),
        })
        .await;

        assert_eq!(
            *all.seen.lock().unwrap(),
            vec![EventKind::Spawned, EventKind::Fold]
        );
        assert_eq!(*folds.seen.lock().unwrap(), vec![EventKind::Fold]);
    }

    #[tokio::test]
    async fn test_unsubscribe_and_broadcast() {
        let hub = EventHub::new();
        let rec = Arc::new(Recorder {
            kinds: None,
            seen: Mutex::new(Vec::new()),
        });
        let id = hub.subscribe(rec.clone()).await;
        assert!(hub.unsubscribe(id).await);
        assert_eq!(hub.listener_count().await, 0);

        let mut rx = hub.receiver();
        let t = task();
        hub.publish(SubagentEvent::Completed(t.clone())).await;

        assert!(rec.seen.lock().unwrap().is_empty());
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), EventKind::Completed);
        assert_eq!(event.task_id(), t.id);
    }
}
