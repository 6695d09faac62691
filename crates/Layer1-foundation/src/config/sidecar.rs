//! Sidecar Config - 통합 설정
//!
//! 글로벌 + 프로젝트 설정을 병합하고, 마지막으로 환경 변수를 적용한다.

use crate::storage::JsonStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// 설정 파일명
pub const SIDECAR_CONFIG_FILE: &str = "config.json";

/// 환경 변수: 라우팅 비활성화
const ENV_DISABLE_ROUTING: &str = "SIDECAR_DISABLE_ROUTING";

/// 환경 변수: explore 모델
const ENV_EXPLORE_MODEL: &str = "SIDECAR_EXPLORE_MODEL";

/// 환경 변수: 최대 동시 실행 수
const ENV_MAX_CONCURRENT: &str = "SIDECAR_MAX_CONCURRENT";

// ============================================================================
// Sidecar Config (통합)
// ============================================================================

/// Sidecar 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarConfig {
    /// 버전 (마이그레이션용)
    #[serde(default = "default_version")]
    pub version: u32,

    /// 기본 모델 (top-level 태스크)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,

    /// 모델 라우팅
    #[serde(default)]
    pub routing: RoutingSettings,

    /// 서브에이전트 스케줄러
    #[serde(default)]
    pub scheduler: SchedulerSettings,

    /// Headless 실행 (폴링/타임아웃)
    #[serde(default)]
    pub headless: HeadlessSettings,

    /// 외부 agent runtime
    #[serde(default)]
    pub runtime: RuntimeSettings,
}

impl SidecarConfig {
    pub fn new() -> Self {
        Self {
            version: default_version(),
            ..Self::default()
        }
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// 글로벌 + 프로젝트 병합 로드, 이후 환경 변수 적용
    pub fn load() -> Result<Self> {
        let mut config = Self::new();

        // 1. 글로벌 설정
        if let Ok(global) = JsonStore::global() {
            if let Some(global_config) =
                global.load_optional::<SidecarConfig>(SIDECAR_CONFIG_FILE)?
            {
                debug!(path = %global.file_path(SIDECAR_CONFIG_FILE).display(), "Loaded global config");
                config.merge(global_config);
            }
        }

        // 2. 프로젝트 설정
        if let Ok(project) = JsonStore::current_project() {
            if let Some(project_config) =
                project.load_optional::<SidecarConfig>(SIDECAR_CONFIG_FILE)?
            {
                debug!(path = %project.file_path(SIDECAR_CONFIG_FILE).display(), "Loaded project config");
                config.merge(project_config);
            }
        }

        // 3. 환경 변수
        config.apply_env(|key| std::env::var(key).ok());

        Ok(config)
    }

    /// 특정 저장소에서만 로드 (없으면 기본값)
    pub fn load_from(store: &JsonStore) -> Result<Self> {
        Ok(store
            .load_optional::<SidecarConfig>(SIDECAR_CONFIG_FILE)?
            .unwrap_or_else(Self::new))
    }

    /// 글로벌 설정 저장
    pub fn save_global(&self) -> Result<()> {
        let store = JsonStore::global()?;
        store.save(SIDECAR_CONFIG_FILE, self)
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// 다른 설정과 병합 (other가 우선)
    pub fn merge(&mut self, other: SidecarConfig) {
        if other.default_model.is_some() {
            self.default_model = other.default_model;
        }

        self.routing.merge(other.routing);
        self.scheduler.merge(other.scheduler);
        self.headless.merge(other.headless);
        self.runtime.merge(other.runtime);
    }

    /// 환경 변수 적용 (lookup은 테스트에서 주입 가능)
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_DISABLE_ROUTING) {
            if matches!(value.trim(), "1" | "true" | "yes") {
                self.routing.enabled = false;
            }
        }

        if let Some(model) = lookup(ENV_EXPLORE_MODEL) {
            let model = model.trim();
            if !model.is_empty() {
                self.routing.explore_model = model.to_string();
            }
        }

        if let Some(value) = lookup(ENV_MAX_CONCURRENT) {
            match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.scheduler.max_concurrent = n,
                _ => warn!(value = %value, "Ignoring invalid {}", ENV_MAX_CONCURRENT),
            }
        }
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn max_concurrent(mut self, max: usize) -> Self {
        self.scheduler.max_concurrent = max;
        self
    }
}

// ============================================================================
// Routing Settings
// ============================================================================

/// 에이전트 타입 → 모델 라우팅 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingSettings {
    /// 라우팅 활성화
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// explore 역할에 쓰는 저비용 모델
    #[serde(default = "default_explore_model")]
    pub explore_model: String,

    /// 저비용 모델로 라우팅되는 에이전트 타입
    #[serde(default = "default_explore_agent")]
    pub explore_agent: String,

    /// 모델 별칭 (짧은 이름 → 전체 모델 ID)
    #[serde(default = "default_aliases")]
    pub aliases: BTreeMap<String, String>,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            explore_model: default_explore_model(),
            explore_agent: default_explore_agent(),
            aliases: default_aliases(),
        }
    }
}

impl RoutingSettings {
    fn merge(&mut self, other: RoutingSettings) {
        self.enabled = other.enabled;
        if other.explore_model != default_explore_model() {
            self.explore_model = other.explore_model;
        }
        if other.explore_agent != default_explore_agent() {
            self.explore_agent = other.explore_agent;
        }
        self.aliases.extend(other.aliases);
    }
}

// ============================================================================
// Scheduler Settings
// ============================================================================

/// 서브에이전트 스케줄러 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerSettings {
    /// 최대 동시 실행 서브에이전트 수
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl SchedulerSettings {
    fn merge(&mut self, other: SchedulerSettings) {
        if other.max_concurrent != default_max_concurrent() && other.max_concurrent > 0 {
            self.max_concurrent = other.max_concurrent;
        }
    }
}

// ============================================================================
// Headless Settings
// ============================================================================

/// Headless 실행 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadlessSettings {
    /// 전체 타임아웃 (초)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// 폴링 간격 (밀리초)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// 타임아웃 후 유예 시간 (초)
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
}

impl Default for HeadlessSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            grace_secs: default_grace_secs(),
        }
    }
}

impl HeadlessSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    fn merge(&mut self, other: HeadlessSettings) {
        if other.timeout_secs != default_timeout_secs() {
            self.timeout_secs = other.timeout_secs;
        }
        if other.poll_interval_ms != default_poll_interval_ms() {
            self.poll_interval_ms = other.poll_interval_ms;
        }
        if other.grace_secs != default_grace_secs() {
            self.grace_secs = other.grace_secs;
        }
    }
}

// ============================================================================
// Runtime Settings
// ============================================================================

/// 외부 agent runtime 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeSettings {
    /// 이미 실행 중인 서버 URL (있으면 프로세스를 띄우지 않음)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// 서버 실행 명령어
    #[serde(default = "default_runtime_command")]
    pub command: String,

    /// 헬스 체크 시도 횟수
    #[serde(default = "default_health_attempts")]
    pub health_attempts: u32,

    /// 헬스 체크 간격 (밀리초)
    #[serde(default = "default_health_interval_ms")]
    pub health_interval_ms: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            url: None,
            command: default_runtime_command(),
            health_attempts: default_health_attempts(),
            health_interval_ms: default_health_interval_ms(),
        }
    }
}

impl RuntimeSettings {
    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }

    fn merge(&mut self, other: RuntimeSettings) {
        if other.url.is_some() {
            self.url = other.url;
        }
        if other.command != default_runtime_command() {
            self.command = other.command;
        }
        if other.health_attempts != default_health_attempts() {
            self.health_attempts = other.health_attempts;
        }
        if other.health_interval_ms != default_health_interval_ms() {
            self.health_interval_ms = other.health_interval_ms;
        }
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_version() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_explore_model() -> String {
    "openrouter/google/gemini-2.5-flash".to_string()
}

fn default_explore_agent() -> String {
    "Explore".to_string()
}

fn default_aliases() -> BTreeMap<String, String> {
    [
        ("gemini", "openrouter/google/gemini-2.5-flash"),
        ("gemini-pro", "openrouter/google/gemini-2.5-pro"),
        ("gpt", "openrouter/openai/gpt-4o"),
        ("deepseek", "openrouter/deepseek/deepseek-chat"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_max_concurrent() -> usize {
    5
}

fn default_timeout_secs() -> u64 {
    15 * 60
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_grace_secs() -> u64 {
    30
}

fn default_runtime_command() -> String {
    "opencode".to_string()
}

fn default_health_attempts() -> u32 {
    30
}

fn default_health_interval_ms() -> u64 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = SidecarConfig::new();
        assert!(config.routing.enabled);
        assert_eq!(config.routing.explore_agent, "Explore");
        assert_eq!(config.scheduler.max_concurrent, 5);
        assert_eq!(config.headless.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.headless.grace_period(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SidecarConfig =
            serde_json::from_str(r#"{"scheduler":{"maxConcurrent":2}}"#).unwrap();
        assert_eq!(config.scheduler.max_concurrent, 2);
        assert!(config.routing.enabled);
        assert_eq!(config.headless.timeout_secs, 900);
    }

    #[test]
    fn test_merge_project_wins() {
        let mut base = SidecarConfig::new().default_model("anthropic/claude-sonnet-4");
        let project: SidecarConfig = serde_json::from_str(
            r#"{"defaultModel":"openai/gpt-4o","routing":{"enabled":false,"aliases":{"fast":"x/y"}}}"#,
        )
        .unwrap();

        base.merge(project);
        assert_eq!(base.default_model.as_deref(), Some("openai/gpt-4o"));
        assert!(!base.routing.enabled);
        assert_eq!(base.routing.aliases.get("fast").map(String::as_str), Some("x/y"));
        assert!(base.routing.aliases.contains_key("gemini"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("SIDECAR_DISABLE_ROUTING", "1"),
            ("SIDECAR_EXPLORE_MODEL", "openrouter/cheap/model"),
            ("SIDECAR_MAX_CONCURRENT", "3"),
        ]
        .into_iter()
        .collect();

        let mut config = SidecarConfig::new();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert!(!config.routing.enabled);
        assert_eq!(config.routing.explore_model, "openrouter/cheap/model");
        assert_eq!(config.scheduler.max_concurrent, 3);
    }

    #[test]
    fn test_env_invalid_max_concurrent_ignored() {
        let mut config = SidecarConfig::new();
        config.apply_env(|key| (key == "SIDECAR_MAX_CONCURRENT").then(|| "zero".to_string()));
        assert_eq!(config.scheduler.max_concurrent, 5);
    }

    #[test]
    fn test_load_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path());
        assert_eq!(SidecarConfig::load_from(&store).unwrap().version, 1);

        let config = SidecarConfig::new().max_concurrent(7);
        store.save(SIDECAR_CONFIG_FILE, &config).unwrap();
        assert_eq!(SidecarConfig::load_from(&store).unwrap().scheduler.max_concurrent, 7);
    }
}
