//! 통합 API 에러 응답 타입.
//!
//! 모든 HTTP 엔드포인트에서 일관된 에러 형식을 제공합니다.

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use pulse_core::PulseError;

/// 통합 API 에러 응답.
///
/// # 예시
///
/// ```json
/// {
///   "code": "NOT_FOUND",
///   "message": "사용자를 찾을 수 없습니다: user_9",
///   "timestamp": 1738300800
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// 에러 코드 (예: "AUTH_REQUIRED", "INVALID_INPUT", "NOT_FOUND")
    pub code: String,
    /// 사람이 읽을 수 있는 에러 메시지
    pub message: String,
    /// 추가 에러 상세 정보 (선택적)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// 에러 발생 타임스탬프 (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl ApiErrorResponse {
    /// 기본 에러 생성 (타임스탬프 포함).
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: Some(chrono::Utc::now().timestamp()),
        }
    }

    /// 상세 정보 포함 에러 생성.
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: Some(details),
            timestamp: Some(chrono::Utc::now().timestamp()),
        }
    }

    /// 에러 코드 반환.
    pub fn code(&self) -> &str {
        &self.code
    }

    /// 에러 메시지 반환.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiErrorResponse {}

/// API 핸들러 Result 타입 별칭.
///
/// # Example
///
/// ```ignore
/// async fn recent_alerts(
///     State(state): State<Arc<AppState>>,
/// ) -> ApiResult<Json<Vec<CriticalAlert>>> {
///     let alerts = state.alert_store.recent(50).await.map_err(api_error)?;
///     Ok(Json(alerts))
/// }
/// ```
pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiErrorResponse>)>;

/// `PulseError`를 HTTP 응답으로 변환합니다.
///
/// 배포 계층 에러 분류를 상태 코드에 대응시킵니다:
/// 인증 → 401, 미발견 → 404, 업스트림 → 503, 나머지 → 500.
pub fn api_error(err: PulseError) -> (StatusCode, Json<ApiErrorResponse>) {
    let (status, code) = match &err {
        PulseError::Auth(_) => (StatusCode::UNAUTHORIZED, "AUTH_ERROR"),
        PulseError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        PulseError::UpstreamUnavailable(_) | PulseError::CapacityExhausted(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "UPSTREAM_UNAVAILABLE")
        }
        PulseError::Protocol(_) | PulseError::Serialization(_) => {
            (StatusCode::BAD_REQUEST, "INVALID_INPUT")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    };

    (status, Json(ApiErrorResponse::new(code, err.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_response_new() {
        let error = ApiErrorResponse::new("TEST_ERROR", "Test message");
        assert_eq!(error.code(), "TEST_ERROR");
        assert_eq!(error.message(), "Test message");
        assert!(error.timestamp.is_some());
        assert!(error.details.is_none());
    }

    #[test]
    fn test_api_error_response_with_details() {
        let details = serde_json::json!({"field": "amount", "reason": "must be positive"});
        let error = ApiErrorResponse::with_details("VALIDATION_ERROR", "Invalid input", details);
        assert_eq!(error.code(), "VALIDATION_ERROR");
        assert!(error.details.is_some());
    }

    #[test]
    fn test_json_serialization_skips_empty_fields() {
        let mut error = ApiErrorResponse::new("NOT_FOUND", "Resource not found");
        error.timestamp = None;
        let json = serde_json::to_string(&error).unwrap();

        assert!(!json.contains("timestamp"));
        assert!(!json.contains("details"));
        assert!(json.contains(r#""code":"NOT_FOUND""#));
    }

    #[test]
    fn test_pulse_error_status_mapping() {
        let (status, _) = api_error(PulseError::Auth("bad token".into()));
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = api_error(PulseError::NotFound("user_9".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = api_error(PulseError::UpstreamUnavailable("feed down".into()));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, body) = api_error(PulseError::Internal("boom".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.0.code(), "INTERNAL_ERROR");
    }
}
