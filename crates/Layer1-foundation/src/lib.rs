//! # sidecar-foundation
//!
//! Foundation layer for Sidecar:
//! - Error: 공통 에러 타입 (`Error`, `Result`)
//! - Config: 통합 설정 (SidecarConfig - routing, scheduler, headless, runtime)
//! - Storage: JsonStore (설정, 태스크 메타데이터)
//!
//! ## 설정 로드 순서
//!
//! ```text
//! <config_dir>/sidecar/config.json   (글로벌)
//!            │
//!            ▼ merge
//! .sidecar/config.json               (프로젝트, 우선)
//!            │
//!            ▼ apply_env
//! SIDECAR_DISABLE_ROUTING / SIDECAR_EXPLORE_MODEL / SIDECAR_MAX_CONCURRENT
//! ```

pub mod config;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    HeadlessSettings, RoutingSettings, RuntimeSettings, SchedulerSettings, SidecarConfig,
    SIDECAR_CONFIG_FILE,
};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::JsonStore;
