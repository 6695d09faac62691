//! Scripted in-memory runtime for tests

use super::{
    AgentRuntime, PromptRequest, PromptResponse, RuntimeHandle, RuntimeMessage, RuntimeOptions,
    RuntimeStatus,
};
use async_trait::async_trait;
use sidecar_foundation::{Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub(crate) struct ScriptedRuntime {
    session_counter: AtomicUsize,
    health_checks: AtomicUsize,
    unhealthy_checks: AtomicUsize,
    closes: AtomicUsize,
    fail_start: AtomicBool,
    fail_status: AtomicBool,
    fail_marker: Mutex<Option<String>>,
    first_prompt_delay: Mutex<Option<Duration>>,
    prompts: Mutex<Vec<(String, PromptRequest)>>,
    prompt_responses: Mutex<VecDeque<PromptResponse>>,
    statuses: Mutex<VecDeque<RuntimeStatus>>,
    message_script: Mutex<VecDeque<Vec<RuntimeMessage>>>,
    last_messages: Mutex<Vec<RuntimeMessage>>,
}

impl ScriptedRuntime {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_unhealthy_checks(&self, n: usize) {
        self.unhealthy_checks.store(n, Ordering::SeqCst);
    }

    pub(crate) fn health_checks(&self) -> usize {
        self.health_checks.load(Ordering::SeqCst)
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_status(&self) {
        self.fail_status.store(true, Ordering::SeqCst);
    }

    /// Prompts whose text contains `marker` are rejected
    pub(crate) fn fail_prompts_containing(&self, marker: &str) {
        *self.fail_marker.lock().unwrap() = Some(marker.to_string());
    }

    /// The first prompt hangs for `delay` before being handled
    pub(crate) fn delay_first_prompt(&self, delay: Duration) {
        *self.first_prompt_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn push_prompt_response(&self, text: &str) {
        self.prompt_responses.lock().unwrap().push_back(PromptResponse {
            text_parts: vec![text.to_string()],
        });
    }

    pub(crate) fn push_status(&self, status: RuntimeStatus) {
        self.statuses.lock().unwrap().push_back(status);
    }

    pub(crate) fn push_messages(&self, messages: Vec<RuntimeMessage>) {
        self.message_script.lock().unwrap().push_back(messages);
    }

    pub(crate) fn prompts(&self) -> Vec<(String, PromptRequest)> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentRuntime for ScriptedRuntime {
    async fn start_runtime(&self, options: &RuntimeOptions) -> Result<RuntimeHandle> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Error::runtime("spawn failed"));
        }
        Ok(RuntimeHandle {
            url: options
                .url
                .clone()
                .unwrap_or_else(|| "http://127.0.0.1:4096".to_string()),
            pid: None,
        })
    }

    async fn close(&self, _handle: RuntimeHandle) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn check_health(&self) -> bool {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        let remaining = self.unhealthy_checks.load(Ordering::SeqCst);
        if remaining > 0 {
            self.unhealthy_checks.store(remaining - 1, Ordering::SeqCst);
            return false;
        }
        true
    }

    async fn create_session(&self, _parent_id: Option<&str>) -> Result<String> {
        let n = self.session_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("ses_{}", n))
    }

    async fn send_prompt(
        &self,
        session_id: &str,
        request: &PromptRequest,
    ) -> Result<PromptResponse> {
        let delay = self.first_prompt_delay.lock().unwrap().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(marker) = self.fail_marker.lock().unwrap().as_deref() {
            if request.text.contains(marker) {
                return Err(Error::runtime("prompt rejected"));
            }
        }
        self.prompts
            .lock()
            .unwrap()
            .push((session_id.to_string(), request.clone()));
        Ok(self
            .prompt_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default())
    }

    async fn get_messages(&self, _session_id: &str) -> Result<Vec<RuntimeMessage>> {
        let mut last = self.last_messages.lock().unwrap();
        if let Some(next) = self.message_script.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(last.clone())
    }

    async fn get_status(&self, _session_id: &str) -> Result<RuntimeStatus> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Err(Error::Http("status endpoint unavailable".into()));
        }
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(RuntimeStatus::Running))
    }
}
