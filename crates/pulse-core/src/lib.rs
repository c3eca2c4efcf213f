//! # Pulse Core
//!
//! 실시간 업데이트 배포 계층의 핵심 도메인 모델과 타입을 제공합니다.
//!
//! 이 크레이트는 클라이언트/서버 크레이트 전반에서 사용되는 기본 타입을 제공합니다:
//! - 시세 틱 및 포트폴리오 평가 스냅샷
//! - 운영/비즈니스 지표와 이력 링
//! - 크리티컬 알림 및 활동 트랜잭션
//! - 양방향 전송용 와이어 프로토콜 메시지
//! - 외부 협력자 인터페이스 (시장 데이터, 저장소)
//! - 에러 타입
//! - 로깅 인프라

pub mod domain;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod provider;

pub use domain::*;
pub use error::*;
pub use logging::*;
pub use protocol::*;
pub use provider::*;
