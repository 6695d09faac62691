//! Subagent scheduler - bounded dispatch with a FIFO overflow queue
//!
//! At most `max_concurrent` subagents run at once. Extra requests wait in
//! arrival order and are dispatched as running tasks are reported finished.
//!
//! All state lives behind one mutex. A slot is reserved (task marked
//! running, count incremented) under the lock before any runtime call, so
//! bursts of submissions can never oversubscribe.

use super::events::{EventHub, SubagentEvent};
use super::router::ModelRouter;
use super::types::{Admission, DispatchTicket, SubagentRequest, TaskFilter};
use crate::runtime::{AgentRuntime, PromptRequest, RuntimeMessage};
use crate::state::TaskStatus;
use crate::task::{Task, TaskId};
use sidecar_foundation::{Error, Result, SidecarConfig};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

/// Default concurrency limit
pub const MAX_CONCURRENT: usize = 5;

/// Renders the summary carried by a fold event
pub type FoldFormatter = Arc<dyn Fn(&Task) -> String + Send + Sync>;

/// `## Subagent Result (<type>)`, the briefing, then the result or error
pub fn default_fold_summary(task: &Task) -> String {
    let body = match (&task.result, &task.error) {
        (Some(result), _) => result.clone(),
        (None, Some(error)) => format!("**Error:** {}", error),
        (None, None) => String::from("(no output)"),
    };
    format!(
        "## Subagent Result ({})\n\n**Task:** {}\n\n{}",
        task.agent_type, task.briefing, body
    )
}

struct QueuedDispatch {
    task_id: TaskId,
    request: SubagentRequest,
    notify: oneshot::Sender<Task>,
}

#[derive(Default)]
struct SchedulerState {
    tasks: HashMap<TaskId, Task>,
    queue: VecDeque<QueuedDispatch>,
    active_count: usize,
}

impl SchedulerState {
    /// Move a pending task to running and take a slot
    fn reserve(&mut self, id: TaskId) -> Result<Task> {
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Task {}", id)))?;
        task.start()?;
        let snapshot = task.clone();
        self.active_count += 1;
        Ok(snapshot)
    }

    /// Terminal transition of a running task; frees its slot
    fn finish(&mut self, id: TaskId, outcome: Outcome) -> Result<Task> {
        let task = self
            .tasks
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Task {}", id)))?;
        if task.status != TaskStatus::Running {
            return Err(Error::Task(format!(
                "Task {} is {}, not running",
                id, task.status
            )));
        }
        match outcome {
            Outcome::Completed(result) => task.complete(result)?,
            Outcome::Failed(error) => task.fail(error)?,
        }
        let snapshot = task.clone();
        self.active_count = self.active_count.saturating_sub(1);
        Ok(snapshot)
    }

    /// Pop and reserve the queue head if a slot is free
    fn take_next(&mut self, max_concurrent: usize) -> Option<(QueuedDispatch, Task)> {
        while self.active_count < max_concurrent {
            let entry = self.queue.pop_front()?;
            match self.reserve(entry.task_id) {
                Ok(task) => return Some((entry, task)),
                Err(e) => warn!(task_id = %entry.task_id, "Dropping queued subagent: {}", e),
            }
        }
        None
    }
}

enum Outcome {
    Completed(String),
    Failed(String),
}

/// Bounded subagent dispatcher
pub struct SubagentScheduler {
    runtime: Arc<dyn AgentRuntime>,
    router: ModelRouter,
    events: Arc<EventHub>,
    fold_formatter: FoldFormatter,
    max_concurrent: usize,
    state: Mutex<SchedulerState>,
}

impl SubagentScheduler {
    pub fn new(runtime: Arc<dyn AgentRuntime>, router: ModelRouter) -> Self {
        Self {
            runtime,
            router,
            events: Arc::new(EventHub::new()),
            fold_formatter: Arc::new(default_fold_summary),
            max_concurrent: MAX_CONCURRENT,
            state: Mutex::new(SchedulerState::default()),
        }
    }

    /// Scheduler using the routing and concurrency settings of `config`
    pub fn from_config(runtime: Arc<dyn AgentRuntime>, config: &SidecarConfig) -> Self {
        Self::new(runtime, ModelRouter::new(Arc::new(config.routing.clone())))
            .with_max_concurrent(config.scheduler.max_concurrent)
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    /// Share an existing event hub
    pub fn with_events(mut self, events: Arc<EventHub>) -> Self {
        self.events = events;
        self
    }

    pub fn with_fold_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(&Task) -> String + Send + Sync + 'static,
    {
        self.fold_formatter = Arc::new(formatter);
        self
    }

    pub fn events(&self) -> &Arc<EventHub> {
        &self.events
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Submit a request and wait until it is dispatched
    ///
    /// A dispatch failure is not an error here: the returned task is
    /// `Failed` with the reason in `error`.
    pub async fn submit(&self, request: SubagentRequest) -> Result<Task> {
        match self.admit(request).await? {
            Admission::Dispatched(task) => Ok(task),
            Admission::Queued { ticket, .. } => ticket.dispatched().await,
        }
    }

    /// Submit a request without waiting for a free slot
    pub async fn admit(&self, request: SubagentRequest) -> Result<Admission> {
        let agent_type = request.validate()?;
        let route = self.router.resolve(
            &request.agent_type,
            request.model.as_deref(),
            &request.parent_model,
            true,
        );
        let task = Task::new(
            agent_type,
            request.briefing.clone(),
            route.model,
            route.reason,
            route.was_routed,
        )
        .with_parent(request.parent_task_id.clone());
        let id = task.id;

        let reserved = {
            let mut state = self.state.lock().await;
            state.tasks.insert(id, task.clone());

            // older requests keep their turn while a freed slot is being handed over
            if state.active_count >= self.max_concurrent || !state.queue.is_empty() {
                let (notify, rx) = oneshot::channel();
                state.queue.push_back(QueuedDispatch {
                    task_id: id,
                    request,
                    notify,
                });
                info!(
                    task_id = %id,
                    agent_type = %task.agent_type,
                    position = state.queue.len(),
                    "Queued subagent"
                );
                return Ok(Admission::Queued {
                    task,
                    ticket: DispatchTicket { task_id: id, rx },
                });
            }

            state.reserve(id)?
        };

        let task = self.dispatch(reserved, &request).await;
        if task.status == TaskStatus::Failed {
            self.drain_queue().await;
        }
        Ok(Admission::Dispatched(task))
    }

    /// Open a runtime session for a reserved task and send its briefing
    ///
    /// On failure the task is failed in place and its slot released; the
    /// caller is responsible for draining the queue afterwards.
    async fn dispatch(&self, task: Task, request: &SubagentRequest) -> Task {
        let id = task.id;
        match self.open_session(&task, request).await {
            Ok(session_id) => {
                let snapshot = {
                    let mut state = self.state.lock().await;
                    match state.tasks.get_mut(&id) {
                        Some(current) => {
                            // may already be finished by a fast reporter
                            if let Err(e) = current.attach_session(session_id.clone()) {
                                debug!(task_id = %id, "Session not attached: {}", e);
                            }
                            current.clone()
                        }
                        None => task,
                    }
                };
                if snapshot.status.is_terminal() {
                    // its Completed/Failed already went out
                    debug!(task_id = %id, "Finished before spawn was announced");
                    return snapshot;
                }
                info!(
                    task_id = %id,
                    agent_type = %snapshot.agent_type,
                    model = %snapshot.model,
                    session = %session_id,
                    "Spawned subagent"
                );
                self.events
                    .publish(SubagentEvent::Spawned(snapshot.clone()))
                    .await;
                snapshot
            }
            Err(e) => {
                warn!(task_id = %id, "Subagent dispatch failed: {}", e);
                let finished = self
                    .state
                    .lock()
                    .await
                    .finish(id, Outcome::Failed(format!("Dispatch failed: {}", e)));
                match finished {
                    Ok(failed) => {
                        self.announce_terminal(&failed).await;
                        failed
                    }
                    // finished concurrently; report what the map holds
                    Err(_) => self.get_task(id).await.unwrap_or(task),
                }
            }
        }
    }

    async fn open_session(&self, task: &Task, request: &SubagentRequest) -> Result<String> {
        let session_id = self
            .runtime
            .create_session(request.parent_task_id.as_deref())
            .await?;
        let prompt = PromptRequest::new(task.model.clone(), task.briefing.clone())
            .with_system(request.system.clone())
            .with_agent(task.agent_type.as_str().to_ascii_lowercase())
            .with_reasoning_effort(request.reasoning_effort.clone());
        self.runtime.send_prompt_async(&session_id, &prompt).await?;
        Ok(session_id)
    }

    /// Dispatch queued requests while slots are free
    ///
    /// Safe to call at any time and from several tasks at once: each pop
    /// and reservation happens under the state lock.
    pub async fn drain_queue(&self) {
        loop {
            let next = self.state.lock().await.take_next(self.max_concurrent);
            let Some(next) = next else {
                return;
            };
            self.launch(next).await;
        }
    }

    /// Dispatch a reserved queue entry and wake its submitter
    async fn launch(&self, (entry, task): (QueuedDispatch, Task)) {
        debug!(task_id = %task.id, "Dequeued subagent");
        let dispatched = self.dispatch(task, &entry.request).await;
        // the submitter may have stopped waiting
        let _ = entry.notify.send(dispatched);
    }

    // ========================================================================
    // Terminal transitions
    // ========================================================================

    /// Report a running subagent as finished
    pub async fn mark_completed(&self, id: TaskId, result: impl Into<String>) -> Result<Task> {
        self.mark(id, Outcome::Completed(result.into())).await
    }

    /// Report a running subagent as failed
    pub async fn mark_failed(&self, id: TaskId, error: impl Into<String>) -> Result<Task> {
        self.mark(id, Outcome::Failed(error.into())).await
    }

    async fn mark(&self, id: TaskId, outcome: Outcome) -> Result<Task> {
        // the freed slot goes to the queue head before anything else can see it
        let (task, next) = {
            let mut state = self.state.lock().await;
            let task = state.finish(id, outcome)?;
            (task, state.take_next(self.max_concurrent))
        };
        info!(task_id = %id, status = %task.status, "Subagent finished");
        self.announce_terminal(&task).await;
        if let Some(next) = next {
            self.launch(next).await;
        }
        self.drain_queue().await;
        Ok(task)
    }

    /// Completed/Failed followed by Fold
    async fn announce_terminal(&self, task: &Task) {
        let event = match task.status {
            TaskStatus::Completed => SubagentEvent::Completed(task.clone()),
            _ => SubagentEvent::Failed(task.clone()),
        };
        self.events.publish(event).await;

        let summary = (self.fold_formatter)(task);
        self.events
            .publish(SubagentEvent::Fold {
                task_id: task.id,
                parent_task_id: task.parent_task_id.clone(),
                summary,
            })
            .await;
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get_task(&self, id: TaskId) -> Option<Task> {
        self.state.lock().await.tasks.get(&id).cloned()
    }

    /// Tasks matching `filter`, oldest first
    pub async fn list(&self, filter: &TaskFilter) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .state
            .lock()
            .await
            .tasks
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Transcript of a task's runtime session
    pub async fn read_results(&self, id: TaskId) -> Result<String> {
        let session = {
            let state = self.state.lock().await;
            let task = state
                .tasks
                .get(&id)
                .ok_or_else(|| Error::NotFound(format!("Task {}", id)))?;
            task.external_session_id.clone()
        };
        let session = session
            .ok_or_else(|| Error::Task(format!("Task {} has no runtime session yet", id)))?;

        let messages = self.runtime.get_messages(&session).await?;
        Ok(format_transcript(&messages))
    }

    pub async fn active_count(&self) -> usize {
        self.state.lock().await.active_count
    }

    pub async fn queue_len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// Queued task ids, next to dispatch first
    pub async fn queued_ids(&self) -> Vec<TaskId> {
        self.state
            .lock()
            .await
            .queue
            .iter()
            .map(|q| q.task_id)
            .collect()
    }
}

fn format_transcript(messages: &[RuntimeMessage]) -> String {
    messages
        .iter()
        .filter_map(|m| {
            let text = m.text();
            let text = text.trim();
            (!text.is_empty()).then(|| format!("[{}]\n{}", m.role, text))
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::mock::ScriptedRuntime;
    use crate::subagent::events::{EventKind, SubagentListener};
    use crate::subagent::RouteReason;
    use crate::task::AgentType;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct Log(StdMutex<Vec<(EventKind, TaskId)>>);

    #[async_trait]
    impl SubagentListener for Log {
        fn name(&self) -> &str {
            "log"
        }

        async fn on_event(&self, event: &SubagentEvent) {
            self.0.lock().unwrap().push((event.kind(), event.task_id()));
        }
    }

    fn scheduler(runtime: Arc<ScriptedRuntime>, max: usize) -> SubagentScheduler {
        SubagentScheduler::new(runtime, ModelRouter::with_defaults()).with_max_concurrent(max)
    }

    fn request(briefing: &str) -> SubagentRequest {
        SubagentRequest::new("General", briefing, "anthropic/claude").with_parent("top")
    }

    #[tokio::test]
    async fn test_submit_dispatches() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let sched = scheduler(runtime.clone(), 2);

        let task = sched
            .submit(SubagentRequest::new("Explore", "map the repo", "A"))
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.external_session_id.as_deref(), Some("ses_1"));
        assert_eq!(task.route_reason, RouteReason::RoutedExplore);
        assert!(task.model_was_routed);
        assert_eq!(sched.active_count().await, 1);

        let prompts = runtime.prompts();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].1.text, "map the repo");
        assert_eq!(prompts[0].1.agent.as_deref(), Some("explore"));
    }

    #[tokio::test]
    async fn test_validation_before_runtime() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let sched = scheduler(runtime.clone(), 2);

        let err = sched
            .submit(SubagentRequest::new("Build", "x", "A"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        let err = sched.submit(request("   ")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        assert!(runtime.prompts().is_empty());
        assert!(sched.list(&TaskFilter::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_queue_is_fifo() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let sched = scheduler(runtime, 1);

        let first = sched.submit(request("first")).await.unwrap();
        let second = sched.admit(request("second")).await.unwrap();
        let third = sched.admit(request("third")).await.unwrap();
        assert!(second.is_queued());
        assert!(third.is_queued());
        assert_eq!(
            sched.queued_ids().await,
            vec![second.task().id, third.task().id]
        );

        let Admission::Queued { ticket, .. } = second else {
            unreachable!()
        };
        sched.mark_completed(first.id, "ok").await.unwrap();
        let dispatched = ticket.dispatched().await.unwrap();
        assert_eq!(dispatched.briefing, "second");
        assert_eq!(dispatched.status, TaskStatus::Running);
        assert_eq!(sched.queued_ids().await, vec![third.task().id]);
        assert_eq!(sched.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_mark_decrements_once() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let sched = scheduler(runtime, 3);

        let a = sched.submit(request("a")).await.unwrap();
        let b = sched.submit(request("b")).await.unwrap();
        assert_eq!(sched.active_count().await, 2);

        sched.mark_completed(a.id, "done").await.unwrap();
        assert_eq!(sched.active_count().await, 1);

        // already terminal: rejected, count untouched
        let err = sched.mark_failed(a.id, "late").await.unwrap_err();
        assert!(matches!(err, Error::Task(_)));
        assert_eq!(sched.active_count().await, 1);

        sched.mark_failed(b.id, "boom").await.unwrap();
        assert_eq!(sched.active_count().await, 0);

        let err = sched.mark_completed(TaskId::new(), "x").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(sched.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_dispatch_failure_marks_failed_and_queue_continues() {
        let runtime = Arc::new(ScriptedRuntime::new());
        runtime.fail_prompts_containing("poison");
        let sched = scheduler(runtime, 1);

        let first = sched.submit(request("ok one")).await.unwrap();
        let bad = sched.admit(request("poison pill")).await.unwrap();
        let good = sched.admit(request("ok two")).await.unwrap();

        let (Admission::Queued { ticket: bad_ticket, .. }, Admission::Queued { ticket: good_ticket, .. }) =
            (bad, good)
        else {
            unreachable!()
        };

        sched.mark_completed(first.id, "fine").await.unwrap();

        let bad = bad_ticket.dispatched().await.unwrap();
        assert_eq!(bad.status, TaskStatus::Failed);
        assert!(bad.error.unwrap().contains("prompt rejected"));

        let good = good_ticket.dispatched().await.unwrap();
        assert_eq!(good.status, TaskStatus::Running);
        assert_eq!(sched.active_count().await, 1);
        assert_eq!(sched.queue_len().await, 0);
    }

    #[tokio::test]
    async fn test_events_and_fold() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let sched = scheduler(runtime, 2)
            .with_fold_formatter(|t| format!("{}:{}", t.briefing, t.result.clone().unwrap_or_default()));
        let log = Arc::new(Log(StdMutex::new(Vec::new())));
        sched.events().subscribe(log.clone()).await;
        let mut rx = sched.events().receiver();

        let task = sched.submit(request("scan")).await.unwrap();
        sched.mark_completed(task.id, "3 files").await.unwrap();

        let kinds: Vec<_> = log.0.lock().unwrap().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![EventKind::Spawned, EventKind::Completed, EventKind::Fold]
        );

        let mut fold = None;
        while let Ok(event) = rx.try_recv() {
            if let SubagentEvent::Fold {
                summary,
                parent_task_id,
                ..
            } = event
            {
                fold = Some((summary, parent_task_id));
            }
        }
        assert_eq!(fold, Some(("scan:3 files".to_string(), Some("top".to_string()))));
    }

    #[test]
    fn test_default_fold_summary() {
        let mut task = Task::new(
            AgentType::Explore,
            "find routes",
            "m",
            RouteReason::RoutedExplore,
            true,
        );
        task.start().unwrap();
        task.fail("timeout").unwrap();

        let summary = default_fold_summary(&task);
        assert!(summary.starts_with("## Subagent Result (Explore)"));
        assert!(summary.contains("**Task:** find routes"));
        assert!(summary.contains("**Error:** timeout"));
    }

    #[tokio::test]
    async fn test_list_and_read_results() {
        let runtime = Arc::new(ScriptedRuntime::new());
        runtime.push_messages(vec![RuntimeMessage::assistant("Found it in src/api.rs")]);
        let sched = scheduler(runtime, 1);

        let a = sched
            .submit(SubagentRequest::new("Explore", "where is the api", "A"))
            .await
            .unwrap();
        let queued = sched.admit(request("later")).await.unwrap();
        assert!(queued.is_queued());

        let explore = sched
            .list(&TaskFilter::new().agent_type(AgentType::Explore))
            .await;
        assert_eq!(explore.len(), 1);
        let pending = sched
            .list(&TaskFilter::new().status(TaskStatus::Pending))
            .await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, queued.task().id);

        let transcript = sched.read_results(a.id).await.unwrap();
        assert!(transcript.contains("Found it in src/api.rs"));

        let err = sched.read_results(queued.task().id).await.unwrap_err();
        assert!(matches!(err, Error::Task(_)));
        let err = sched.read_results(TaskId::new()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    /// Holds each Completed event until released
    #[derive(Default)]
    struct SlowListener {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl SubagentListener for SlowListener {
        fn name(&self) -> &str {
            "slow"
        }

        fn kinds(&self) -> Option<Vec<EventKind>> {
            Some(vec![EventKind::Completed])
        }

        async fn on_event(&self, _event: &SubagentEvent) {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }

    #[tokio::test]
    async fn test_newcomer_waits_behind_queue_during_announce() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let sched = Arc::new(scheduler(runtime, 1));
        let slow = Arc::new(SlowListener::default());
        sched.events().subscribe(slow.clone()).await;

        let first = sched.submit(request("first")).await.unwrap();
        let early = sched.admit(request("queued early")).await.unwrap();
        assert!(early.is_queued());

        let marking = {
            let sched = sched.clone();
            tokio::spawn(async move { sched.mark_completed(first.id, "done").await })
        };
        slow.entered.notified().await;

        let late = sched.admit(request("late comer")).await.unwrap();
        assert!(late.is_queued());
        assert_eq!(sched.active_count().await, 1);

        slow.release.notify_one();
        marking.await.unwrap().unwrap();

        let Admission::Queued { ticket, .. } = early else {
            unreachable!()
        };
        assert_eq!(ticket.dispatched().await.unwrap().briefing, "queued early");

        let running: Vec<_> = sched
            .list(&TaskFilter::new().status(TaskStatus::Running))
            .await
            .into_iter()
            .map(|t| t.briefing)
            .collect();
        assert_eq!(running, vec!["queued early"]);
        assert_eq!(sched.queued_ids().await, vec![late.task().id]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_before_spawn_skips_spawned_event() {
        let runtime = Arc::new(ScriptedRuntime::new());
        runtime.delay_first_prompt(std::time::Duration::from_secs(1));
        let sched = Arc::new(scheduler(runtime, 2));
        let log = Arc::new(Log(StdMutex::new(Vec::new())));
        sched.events().subscribe(log.clone()).await;

        let admitting = {
            let sched = sched.clone();
            tokio::spawn(async move { sched.admit(request("quick")).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        let running = sched
            .list(&TaskFilter::new().status(TaskStatus::Running))
            .await;
        assert_eq!(running.len(), 1);
        sched.mark_completed(running[0].id, "done").await.unwrap();

        let admission = admitting.await.unwrap().unwrap();
        assert_eq!(admission.task().status, TaskStatus::Completed);

        let kinds: Vec<_> = log.0.lock().unwrap().iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec![EventKind::Completed, EventKind::Fold]);
        assert_eq!(sched.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_burst_never_oversubscribes() {
        let runtime = Arc::new(ScriptedRuntime::new());
        let sched = Arc::new(scheduler(runtime, 3));

        let mut handles = Vec::new();
        for i in 0..10 {
            let sched = sched.clone();
            handles.push(tokio::spawn(async move {
                sched.admit(request(&format!("job {}", i))).await.unwrap()
            }));
        }
        let mut queued = 0;
        for h in handles {
            if h.await.unwrap().is_queued() {
                queued += 1;
            }
        }

        assert_eq!(queued, 7);
        assert_eq!(sched.active_count().await, 3);
        assert_eq!(
            sched
                .list(&TaskFilter::new().status(TaskStatus::Running))
                .await
                .len(),
            3
        );
    }
}
