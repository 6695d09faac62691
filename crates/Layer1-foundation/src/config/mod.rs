//! Config - 통합 설정 관리
//!
//! - `sidecar.rs` - SidecarConfig 통합 설정 (routing, scheduler, headless, runtime)

mod sidecar;

pub use sidecar::{
    HeadlessSettings, RoutingSettings, RuntimeSettings, SchedulerSettings, SidecarConfig,
    SIDECAR_CONFIG_FILE,
};
