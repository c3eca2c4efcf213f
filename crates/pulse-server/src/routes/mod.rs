//! API 라우트.
//!
//! 모든 REST API 엔드포인트를 정의하고 라우터를 구성합니다.
//!
//! # 라우트 구조
//!
//! - `/health` - 헬스 체크 (liveness)
//! - `/health/ready` - 상세 헬스 체크 (readiness)
//! - `/api/v1/auth/login` - 데모 로그인 (토큰 발급)
//! - `/api/v1/transactions` - 활동 트랜잭션 접수
//! - `/api/v1/alerts` - 최근 보안 경보 조회

pub mod auth;
pub mod health;
pub mod transactions;

pub use auth::{auth_router, LoginRequest, LoginResponse};
pub use health::{health_router, ComponentHealth, ComponentStatus, HealthResponse};
pub use transactions::{
    alerts_router, transactions_router, AlertListResponse, TransactionAccepted, TransactionRequest,
};

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// 전체 API 라우터 생성.
///
/// 모든 서브 라우터를 조합하여 하나의 라우터로 반환합니다.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        // 헬스 체크 엔드포인트
        .nest("/health", health_router())
        // API v1 엔드포인트
        .nest("/api/v1/auth", auth_router())
        .nest("/api/v1/transactions", transactions_router())
        .nest("/api/v1/alerts", alerts_router())
}
