//! HTTP client for an OpenCode-style agent server

use super::{
    AgentRuntime, PromptRequest, PromptResponse, RuntimeHandle, RuntimeMessage, RuntimeOptions,
    RuntimeStatus,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sidecar_foundation::{Error, Result};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::RwLock;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const DEFAULT_TIMEOUT_SECS: u64 = 600;
const HEALTH_TIMEOUT_SECS: u64 = 2;

/// Agent runtime reached over HTTP
pub struct HttpAgentRuntime {
    client: Client,
    base_url: RwLock<String>,
    child: Mutex<Option<Child>>,
}

#[derive(Serialize)]
struct ModelRef<'a> {
    #[serde(rename = "providerID")]
    provider_id: &'a str,
    #[serde(rename = "modelID")]
    model_id: &'a str,
}

#[derive(Serialize)]
struct TextPart<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MessageBody<'a> {
    model: ModelRef<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<&'a str>,
    parts: Vec<TextPart<'a>>,
}

#[derive(Deserialize)]
struct SessionInfo {
    id: String,
}

#[derive(Deserialize)]
struct MessageEnvelope {
    #[serde(default)]
    info: Value,
    #[serde(default)]
    parts: Vec<Value>,
}

#[derive(Deserialize)]
struct SessionStatusEntry {
    #[serde(rename = "type")]
    kind: String,
}

/// Split `provider/model` on the first slash; bare names get an empty provider
fn split_model(model: &str) -> (&str, &str) {
    model.split_once('/').unwrap_or(("", model))
}

fn text_parts(parts: &[Value]) -> Vec<String> {
    parts
        .iter()
        .filter(|p| p.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

fn free_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

impl HttpAgentRuntime {
    /// Create a client for `base_url` (may be replaced by `start_runtime`)
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::Http(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: RwLock::new(base_url.into().trim_end_matches('/').to_string()),
            child: Mutex::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        let base = self
            .base_url
            .read()
            .map(|b| b.clone())
            .unwrap_or_default();
        format!("{}{}", base, path)
    }

    fn set_base_url(&self, url: &str) {
        if let Ok(mut base) = self.base_url.write() {
            *base = url.trim_end_matches('/').to_string();
        }
    }

    fn message_body<'a>(request: &'a PromptRequest) -> MessageBody<'a> {
        let (provider_id, model_id) = split_model(&request.model);
        MessageBody {
            model: ModelRef {
                provider_id,
                model_id,
            },
            system: request.system.as_deref(),
            agent: request.agent.as_deref(),
            reasoning_effort: request.reasoning_effort.as_deref(),
            parts: vec![TextPart {
                kind: "text",
                text: &request.text,
            }],
        }
    }

    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Http(format!("{} {}", status, body.trim())))
    }
}

#[async_trait]
impl AgentRuntime for HttpAgentRuntime {
    async fn start_runtime(&self, options: &RuntimeOptions) -> Result<RuntimeHandle> {
        if let Some(url) = &options.url {
            self.set_base_url(url);
            info!(url = %url, "Attaching to running agent server");
            return Ok(RuntimeHandle {
                url: url.clone(),
                pid: None,
            });
        }

        let port = if options.port == 0 {
            free_port()?
        } else {
            options.port
        };

        let mut command = Command::new(&options.command);
        command
            .arg("serve")
            .arg("--hostname")
            .arg("127.0.0.1")
            .arg("--port")
            .arg(port.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &options.workdir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|e| {
            Error::runtime(format!("Failed to start '{}': {}", options.command, e))
        })?;
        let pid = child.id();
        *self.child.lock().await = Some(child);

        let url = format!("http://127.0.0.1:{}", port);
        self.set_base_url(&url);
        info!(url = %url, pid = ?pid, "Started agent server");

        Ok(RuntimeHandle { url, pid })
    }

    async fn close(&self, handle: RuntimeHandle) -> Result<()> {
        let mut child = self.child.lock().await;
        if let Some(mut process) = child.take() {
            if let Err(e) = process.kill().await {
                warn!(url = %handle.url, "Failed to stop agent server: {}", e);
                return Err(Error::Io(e));
            }
            debug!(url = %handle.url, "Stopped agent server");
        }
        Ok(())
    }

    async fn check_health(&self) -> bool {
        match self
            .client
            .get(self.url("/global/health"))
            .timeout(Duration::from_secs(HEALTH_TIMEOUT_SECS))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Health check failed: {}", e);
                false
            }
        }
    }

    async fn create_session(&self, parent_id: Option<&str>) -> Result<String> {
        let mut body = serde_json::Map::new();
        if let Some(parent) = parent_id {
            body.insert("parentID".into(), Value::String(parent.to_string()));
        }

        let response = self
            .client
            .post(self.url("/session"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::runtime(format!("Session creation failed: {}", e)))?;
        let response = Self::check_response(response)
            .await
            .map_err(|e| Error::runtime(format!("Session creation rejected: {}", e)))?;

        let info: SessionInfo = response
            .json()
            .await
            .map_err(|e| Error::runtime(format!("Invalid session response: {}", e)))?;
        Ok(info.id)
    }

    async fn send_prompt(
        &self,
        session_id: &str,
        request: &PromptRequest,
    ) -> Result<PromptResponse> {
        let response = self
            .client
            .post(self.url(&format!("/session/{}/message", session_id)))
            .json(&Self::message_body(request))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let envelope: MessageEnvelope = Self::check_response(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::Http(format!("Invalid prompt response: {}", e)))?;

        Ok(PromptResponse {
            text_parts: text_parts(&envelope.parts),
        })
    }

    async fn send_prompt_async(&self, session_id: &str, request: &PromptRequest) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/session/{}/prompt_async", session_id)))
            .json(&Self::message_body(request))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        Self::check_response(response).await.map(|_| ())
    }

    async fn get_messages(&self, session_id: &str) -> Result<Vec<RuntimeMessage>> {
        let response = self
            .client
            .get(self.url(&format!("/session/{}/message", session_id)))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let envelopes: Vec<MessageEnvelope> = Self::check_response(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::Http(format!("Invalid message list: {}", e)))?;

        Ok(envelopes
            .into_iter()
            .map(|m| RuntimeMessage {
                role: m
                    .info
                    .get("role")
                    .and_then(Value::as_str)
                    .unwrap_or("assistant")
                    .to_string(),
                text_parts: text_parts(&m.parts),
            })
            .collect())
    }

    async fn get_status(&self, session_id: &str) -> Result<RuntimeStatus> {
        let response = self
            .client
            .get(self.url("/session/status"))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let statuses: HashMap<String, SessionStatusEntry> = Self::check_response(response)
            .await?
            .json()
            .await
            .map_err(|e| Error::Http(format!("Invalid status response: {}", e)))?;

        // sessions drop out of the map once idle
        Ok(match statuses.get(session_id).map(|s| s.kind.as_str()) {
            None | Some("idle") => RuntimeStatus::Idle,
            Some("busy") | Some("retry") => RuntimeStatus::Running,
            Some("error") => RuntimeStatus::Error,
            Some(_) => RuntimeStatus::Completed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_split_model() {
        assert_eq!(
            split_model("openrouter/google/gemini-2.5-flash"),
            ("openrouter", "google/gemini-2.5-flash")
        );
        assert_eq!(split_model("gpt-4o"), ("", "gpt-4o"));
    }

    #[test]
    fn test_message_body_shape() {
        let request = PromptRequest::new("anthropic/claude-sonnet-4", "Find routes")
            .with_agent("Explore")
            .with_system(Some("Be brief".into()));
        let body = serde_json::to_value(HttpAgentRuntime::message_body(&request)).unwrap();

        assert_eq!(body["model"]["providerID"], "anthropic");
        assert_eq!(body["model"]["modelID"], "claude-sonnet-4");
        assert_eq!(body["agent"], "Explore");
        assert_eq!(body["system"], "Be brief");
        assert_eq!(body["parts"][0]["type"], "text");
        assert_eq!(body["parts"][0]["text"], "Find routes");
        assert!(body.get("reasoningEffort").is_none());
    }

    #[test]
    fn test_text_parts_skips_tools() {
        let parts = vec![
            json!({"type": "text", "text": "hello"}),
            json!({"type": "tool", "tool": "read"}),
            json!({"type": "text", "text": "world"}),
        ];
        assert_eq!(text_parts(&parts), vec!["hello", "world"]);
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        let runtime = HttpAgentRuntime::new("http://127.0.0.1:4096/").unwrap();
        assert_eq!(runtime.url("/session"), "http://127.0.0.1:4096/session");
        runtime.set_base_url("http://localhost:9000/");
        assert_eq!(runtime.url("/session"), "http://localhost:9000/session");
    }
}
