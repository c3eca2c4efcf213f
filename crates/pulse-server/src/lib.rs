//! 실시간 업데이트 배포 서버.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - WebSocket 브로드캐스트 허브 (심볼/채널 구독, 팬아웃)
//! - SSE 푸시 스트림 (사용자별/관리자 이벤트)
//! - 백그라운드 서비스 (시세 배포, 포트폴리오 평가, 지표 샘플링, 보안 경보)
//! - JWT 인증
//! - 헬스 체크 엔드포인트
//! - Prometheus 메트릭
//!
//! # 모듈 구성
//!
//! - [`state`]: 애플리케이션 공유 상태 (AppState)
//! - [`config`]: 환경변수 기반 서버 설정
//! - [`routes`]: REST API 엔드포인트
//! - [`auth`]: JWT 토큰 검증
//! - [`websocket`]: 양방향 배포 (허브 + 연결 핸들러)
//! - [`sse`]: 단방향 푸시 스트림 (레지스트리 + 라우트)
//! - [`services`]: 주기 실행 백그라운드 서비스
//! - [`store`]: 인메모리 저장소
//! - [`metrics`]: Prometheus 메트릭 수집

pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;
pub mod routes;
pub mod services;
pub mod sse;
pub mod state;
pub mod stats;
pub mod store;
pub mod websocket;

pub use auth::{authenticate_request, create_token, decode_token, Claims, JwtError, Role};
pub use config::ServerConfig;
pub use error::{api_error, ApiErrorResponse, ApiResult};
pub use metrics::setup_metrics_recorder;
pub use routes::*;
pub use services::{
    start_alert_service, start_metrics_service, start_price_feed_service, start_valuation_service,
    AlertService, MetricsService, PriceFeedService, SimulatedMarket, ValuationService,
    DEFAULT_EVENT_CAPACITY,
};
pub use sse::{create_stream_registry, sse_router, SharedStreamRegistry, SseState, StreamRegistry};
pub use state::AppState;
pub use store::MemoryStore;
pub use websocket::{
    create_hub, websocket_handler, websocket_router, BroadcastHub, SharedBroadcastHub, WsState,
};

#[cfg(any(test, feature = "test-utils"))]
pub use state::create_test_state;
