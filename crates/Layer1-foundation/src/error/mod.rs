//! Error types for Sidecar
//!
//! 모든 에러를 중앙에서 관리

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Sidecar 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 설정 관련
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // 입력 검증 (외부 호출 전에 거부)
    // ========================================================================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // ========================================================================
    // Task/Subagent 관련
    // ========================================================================
    #[error("Task error: {0}")]
    Task(String),

    // ========================================================================
    // Agent runtime 관련
    // ========================================================================
    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("HTTP error: {0}")]
    Http(String),

    // ========================================================================
    // 실행 관련
    // ========================================================================
    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled")]
    Cancelled,

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 재시도 가능한 에러인지 확인
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Http(_) | Error::Runtime(_))
    }

    /// 사용자에게 보여줄 수 있는 에러인지 확인
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::NotFound(_) | Error::Config(_) | Error::Cancelled
        )
    }

    /// Runtime 에러 생성 헬퍼
    pub fn runtime(message: impl Into<String>) -> Self {
        Error::Runtime(message.into())
    }
}

// ============================================================================
// From 구현 (추가 변환)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Error::Validation("empty briefing".into()).is_user_facing());
        assert!(!Error::Validation("empty briefing".into()).is_retryable());
        assert!(Error::Http("503".into()).is_retryable());
        assert!(Error::runtime("session rejected").is_retryable());
        assert!(!Error::Internal("bug".into()).is_user_facing());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(err.to_string().starts_with("IO error"));
    }
}
