/// 교환 서비스 공통 에러 타입
/// 모든 에러는 안정적인 코드 문자열을 가지며, HTTP 응답으로 변환된다.
// region:    --- Imports
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

// endregion: --- Imports

// region:    --- Error

/// 공통 Result 타입
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// 교환 서비스 에러 분류
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// 잘못된 요청 (사용자가 수정 가능)
    #[error("잘못된 요청입니다: {0}")]
    Validation(String),

    /// 세션 없음 (로그인 필요)
    #[error("로그인이 필요합니다.")]
    Auth,

    /// 권한 없음 (본인 소유가 아님)
    #[error("해당 작업에 대한 권한이 없습니다: {0}")]
    Unauthorized(String),

    /// 참조 대상 없음
    #[error("대상을 찾을 수 없습니다: {0}")]
    NotFound(String),

    /// 이미 다른 사용자가 처리한 제안 (자동 재시도 금지)
    #[error("이미 처리된 제안입니다: {0}")]
    StateConflict(String),

    /// 저장소 접근 실패 (브리지 계층에서만 재시도)
    #[error("저장소에 접근할 수 없습니다: {0}")]
    TransientNetwork(String),

    /// 두 인덱스 불일치 (사용자에게 노출하지 않고 읽기 경로에서 복구)
    #[error("인덱스 불일치: {0}")]
    PartialConsistency(String),
}

impl ExchangeError {
    /// 안정적인 에러 코드 (응답 본문 "code" 필드)
    pub fn code(&self) -> &'static str {
        match self {
            ExchangeError::Validation(_) => "VALIDATION",
            ExchangeError::Auth => "AUTH",
            ExchangeError::Unauthorized(_) => "UNAUTHORIZED",
            ExchangeError::NotFound(_) => "NOT_FOUND",
            ExchangeError::StateConflict(_) => "STATE_CONFLICT",
            ExchangeError::TransientNetwork(_) => "TRANSIENT_NETWORK",
            ExchangeError::PartialConsistency(_) => "PARTIAL_CONSISTENCY",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ExchangeError::Validation(_) => StatusCode::BAD_REQUEST,
            ExchangeError::Auth => StatusCode::UNAUTHORIZED,
            ExchangeError::Unauthorized(_) => StatusCode::FORBIDDEN,
            ExchangeError::NotFound(_) => StatusCode::NOT_FOUND,
            ExchangeError::StateConflict(_) => StatusCode::CONFLICT,
            // 내부 복구 대상 에러가 경계까지 새어 나온 경우
            ExchangeError::TransientNetwork(_) | ExchangeError::PartialConsistency(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }
}

impl From<sqlx::Error> for ExchangeError {
    fn from(err: sqlx::Error) -> Self {
        ExchangeError::TransientNetwork(err.to_string())
    }
}

impl IntoResponse for ExchangeError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.to_string(),
            "code": self.code(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}

// endregion: --- Error
