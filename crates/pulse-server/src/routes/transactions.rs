//! 트랜잭션 접수 및 보안 경보 조회 API 라우트.
//!
//! 접수된 트랜잭션은 경보 서비스의 이벤트 채널로 전달되며, 리스크
//! 평가와 경보 발행은 비동기로 진행됩니다.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use pulse_core::{CriticalAlert, PulseError, Transaction, TransactionKind};

use crate::error::{api_error, ApiResult};
use crate::state::AppState;

// ==================== Request/Response 타입 ====================

/// 트랜잭션 접수 요청.
#[derive(Debug, Deserialize)]
pub struct TransactionRequest {
    /// 사용자 ID
    pub user_id: String,
    /// 트랜잭션 유형
    pub kind: TransactionKind,
    /// 금액 (기준 통화 단위)
    pub amount: Decimal,
    /// 새 디바이스에서 발생했는지 여부 (기본 false)
    #[serde(default)]
    pub from_new_device: bool,
}

/// 트랜잭션 접수 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransactionAccepted {
    /// 접수된 트랜잭션 ID
    pub id: Uuid,
    /// 접수 상태
    pub status: String,
}

/// 경보 목록 조회 쿼리.
#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    /// 최대 조회 건수 (기본 50)
    pub limit: Option<usize>,
}

/// 경보 목록 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct AlertListResponse {
    /// 총 건수
    pub total: usize,
    /// 경보 목록 (최신순)
    pub alerts: Vec<CriticalAlert>,
}

// ==================== API 핸들러 ====================

/// 트랜잭션 접수.
///
/// 처리 결과(평가 점수, 경보 여부)는 응답에 포함되지 않으며 허브/스트림
/// 경로로 배포됩니다.
/// POST /api/v1/transactions
pub async fn submit_transaction(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TransactionRequest>,
) -> ApiResult<(StatusCode, Json<TransactionAccepted>)> {
    if req.amount <= Decimal::ZERO {
        return Err(api_error(PulseError::Protocol(
            "금액은 0보다 커야 합니다".to_string(),
        )));
    }

    let transaction =
        Transaction::new(req.user_id, req.kind, req.amount).with_new_device(req.from_new_device);
    let id = transaction.id;

    state.transactions_tx.try_send(transaction).map_err(|e| {
        let reason = match e {
            TrySendError::Full(_) => "트랜잭션 이벤트 채널 포화",
            TrySendError::Closed(_) => "경보 서비스가 중단됨",
        };
        api_error(PulseError::CapacityExhausted(reason.to_string()))
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TransactionAccepted {
            id,
            status: "accepted".to_string(),
        }),
    ))
}

/// 최근 보안 경보 조회.
///
/// GET /api/v1/alerts?limit=50
pub async fn recent_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertsQuery>,
) -> ApiResult<Json<AlertListResponse>> {
    let limit = query.limit.unwrap_or(50);
    let alerts = state.alerts.recent(limit).await.map_err(api_error)?;

    Ok(Json(AlertListResponse {
        total: alerts.len(),
        alerts,
    }))
}

// ==================== 라우터 ====================

/// 트랜잭션 접수 라우터.
pub fn transactions_router() -> Router<Arc<AppState>> {
    Router::new().route("/", post(submit_transaction))
}

/// 보안 경보 조회 라우터.
pub fn alerts_router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(recent_alerts))
}
