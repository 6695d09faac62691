//! Storage module for Sidecar
//!
//! - `json`: JSON - 범용 파일 저장/로드 (설정, 태스크 메타데이터)

mod json;

// JSON Storage (범용)
pub use json::JsonStore;
