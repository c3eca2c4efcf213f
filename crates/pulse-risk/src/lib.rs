//! 활동 리스크 스코어링.
//!
//! 이 crate는 다음 기능을 제공합니다:
//! - 사용자 활동 샘플에 대한 가중 시그널 스코어링
//! - 점수 기반 알림/경보 정책 결정
//! - 휴리스틱과 무관한 고정 임계값 규칙 (대규모 출금)
//!
//! # 예제
//!
//! ```rust,ignore
//! use pulse_risk::{ActivitySample, RiskEngine};
//!
//! let engine = RiskEngine::with_defaults();
//! let sample = ActivitySample::new("user_1")
//!     .with_transaction_count(15)
//!     .with_new_device(true);
//!
//! let assessment = engine.assess(&sample);
//! if assessment.is_critical() {
//!     // 보안 경보 발송
//! }
//! ```

pub mod config;
pub mod engine;

// 주요 타입 재내보내기
pub use config::{ConfigValidationError, RiskConfig};
pub use engine::{ActivitySample, RiskAction, RiskAssessment, RiskEngine, RiskSignal};
