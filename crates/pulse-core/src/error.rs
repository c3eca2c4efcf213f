//! 실시간 배포 계층의 에러 타입.
//!
//! 이 모듈은 클라이언트/서버 전반에서 사용되는 에러 타입을 정의합니다.

use thiserror::Error;

/// 핵심 배포 계층 에러.
#[derive(Debug, Error)]
pub enum PulseError {
    /// 전송 계층 에러 (연결/전송 실패)
    #[error("전송 에러: {0}")]
    Transport(String),

    /// 프로토콜 에러 (잘못되었거나 예상치 못한 메시지)
    #[error("프로토콜 에러: {0}")]
    Protocol(String),

    /// 인증 에러
    #[error("인증 에러: {0}")]
    Auth(String),

    /// 재연결 한도 초과 (외부 트리거 전까지 종단 상태)
    #[error("재연결 한도 초과: {0}")]
    CapacityExhausted(String),

    /// 업스트림 데이터 소스 사용 불가 (해당 주기 동안)
    #[error("업스트림 사용 불가: {0}")]
    UpstreamUnavailable(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),

    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 찾을 수 없음
    #[error("찾을 수 없음: {0}")]
    NotFound(String),

    /// 내부 에러
    #[error("내부 에러: {0}")]
    Internal(String),
}

/// 배포 계층 작업을 위한 Result 타입.
pub type PulseResult<T> = Result<T, PulseError>;

impl PulseError {
    /// 재시도 가능한 에러인지 확인합니다.
    ///
    /// 전송 실패는 재연결로, 업스트림 장애는 다음 수집 주기로 복구됩니다.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PulseError::Transport(_) | PulseError::UpstreamUnavailable(_)
        )
    }

    /// 치명적인 에러인지 확인합니다.
    ///
    /// 치명적 에러는 자동 복구 대상이 아니며 외부 개입이 필요합니다.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            PulseError::Auth(_) | PulseError::CapacityExhausted(_)
        )
    }
}

impl From<serde_json::Error> for PulseError {
    fn from(err: serde_json::Error) -> Self {
        PulseError::Serialization(err.to_string())
    }
}
