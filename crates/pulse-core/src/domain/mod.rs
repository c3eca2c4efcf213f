//! 도메인 모델.
//!
//! 배포 계층이 다루는 값 타입을 정의합니다:
//! - `PriceTick` - 심볼 단위 시세 틱
//! - `Holding` / `PortfolioSnapshot` - 포트폴리오 평가 결과
//! - `Metric` / `MetricHistory` - 운영/비즈니스 지표
//! - `CriticalAlert` - 보안/운영 크리티컬 알림
//! - `User` / `Transaction` - 활동 이벤트 입력

pub mod activity;
pub mod alert;
pub mod market;
pub mod metric;
pub mod portfolio;

pub use activity::*;
pub use alert::*;
pub use market::*;
pub use metric::*;
pub use portfolio::*;
