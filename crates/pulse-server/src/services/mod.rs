//! 백그라운드 서비스 모듈.
//!
//! 시세 배포, 포트폴리오 평가, 지표 샘플링, 보안 경보 등 배포
//! 계층의 타이머/이벤트 구동 서비스들을 제공합니다.

pub mod alerts;
pub mod market;
pub mod metrics_loop;
pub mod price_feed;
pub mod valuation;

pub use alerts::{start_alert_service, AlertService, DEFAULT_EVENT_CAPACITY};
pub use market::SimulatedMarket;
pub use metrics_loop::{start_metrics_service, MetricsService};
pub use price_feed::{start_price_feed_service, PriceFeedService};
pub use valuation::{start_valuation_service, ValuationService};
