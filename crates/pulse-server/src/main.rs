//! 실시간 업데이트 배포 서버.
//!
//! Axum 기반 배포 서버를 시작합니다.
//! WebSocket 허브, SSE 스트림, 헬스 체크, 트랜잭션 접수 엔드포인트와
//! 백그라운드 서비스(시세 배포, 포트폴리오 평가, 지표 샘플링, 보안 경보)를
//! 제공합니다.

use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use pulse_core::logging::init_logging_from_env;
use pulse_risk::RiskEngine;
use pulse_server::config::ServerConfig;
use pulse_server::metrics::setup_metrics_recorder;
use pulse_server::routes::create_api_router;
use pulse_server::services::{
    start_alert_service, start_metrics_service, start_price_feed_service, start_valuation_service,
    SimulatedMarket, DEFAULT_EVENT_CAPACITY,
};
use pulse_server::sse::{create_stream_registry, sse_router, SseState, DEFAULT_STREAM_CAPACITY};
use pulse_server::state::AppState;
use pulse_server::store::MemoryStore;
use pulse_server::websocket::{create_hub, websocket_router, WsState, DEFAULT_OUTBOX_CAPACITY};

/// CORS 미들웨어 구성.
///
/// CORS_ORIGINS 환경변수가 설정되어 있으면 해당 origin만 허용합니다.
/// 설정되지 않으면 개발 모드로 간주하여 모든 origin을 허용합니다.
///
/// # 환경변수
///
/// - `CORS_ORIGINS`: 쉼표로 구분된 허용 origin 목록
///   예: `https://dashboard.example.com,https://admin.example.com`
fn cors_layer() -> CorsLayer {
    let allow_origin = match std::env::var("CORS_ORIGINS") {
        Ok(origins) if !origins.is_empty() => {
            // 프로덕션: 특정 origin만 허용
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();

            if origins.is_empty() {
                warn!("CORS_ORIGINS is set but contains no valid origins, allowing any");
                AllowOrigin::any()
            } else {
                info!("CORS configured with {} allowed origins", origins.len());
                AllowOrigin::list(origins)
            }
        }
        _ => {
            // 개발: 모든 origin 허용
            warn!("CORS_ORIGINS not set, allowing any origin (development mode)");
            AllowOrigin::any()
        }
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::header::ACCEPT,
        ])
        // 자격 증명 포함 허용 (CORS_ORIGINS 설정 시에만)
        .allow_credentials(std::env::var("CORS_ORIGINS").is_ok())
        // preflight 요청 캐시 시간
        .max_age(Duration::from_secs(3600))
}

/// /metrics 엔드포인트 핸들러.
async fn metrics_handler(
    axum::extract::State(handle): axum::extract::State<PrometheusHandle>,
) -> String {
    handle.render()
}

/// 전체 라우터 생성.
fn create_router(
    state: Arc<AppState>,
    metrics_handle: PrometheusHandle,
    ws_state: WsState,
    sse_state: SseState,
) -> Router {
    // 메트릭 라우터 (별도 상태)
    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_handle);

    // 전체 라우터 조합
    Router::new()
        .merge(metrics_router)
        .merge(create_api_router().with_state(state))
        .nest("/ws", websocket_router(ws_state))
        .merge(sse_router(sse_state))
        .layer(TraceLayer::new_for_http())
        // 전역 타임아웃 (30초) - 408 상태 코드 반환
        // 응답 생성까지만 적용되므로 WebSocket/SSE 스트림에는 영향 없음
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(cors_layer())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .env 파일 로드 (있는 경우)
    let _ = dotenvy::dotenv();

    // tracing 초기화
    init_logging_from_env()?;

    info!("Starting Pulse server...");

    // Prometheus 메트릭 레코더 설정
    let metrics_handle = setup_metrics_recorder();
    info!("Prometheus metrics recorder initialized");

    // 설정 로드
    let config = ServerConfig::from_env();
    let addr = config.socket_addr().map_err(|e| {
        error!(
            host = %config.host,
            port = config.port,
            error = %e,
            "소켓 주소 설정이 유효하지 않습니다. PULSE_HOST, PULSE_PORT 환경변수를 확인하세요."
        );
        e
    })?;

    // 저장소 / 시장 데이터 / 배포 인프라 구성
    let store = Arc::new(MemoryStore::with_demo_data().await);
    let market = Arc::new(SimulatedMarket::new());
    let hub = create_hub(DEFAULT_OUTBOX_CAPACITY);
    let streams = create_stream_registry(DEFAULT_STREAM_CAPACITY);
    let (transactions_tx, transactions_rx) = mpsc::channel(DEFAULT_EVENT_CAPACITY);
    info!("Broadcast hub and stream registry initialized");

    let state = Arc::new(AppState::new(
        hub.clone(),
        streams.clone(),
        market.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        transactions_tx,
        config.jwt_secret.clone(),
    ));
    info!(version = %state.version, "Application state initialized");

    // 전역 종료 토큰 (graceful shutdown용, 백그라운드 서비스에 전파)
    let shutdown_token = CancellationToken::new();

    // 백그라운드 서비스 시작
    start_price_feed_service(
        market.clone(),
        hub.clone(),
        config.feed_interval(),
        shutdown_token.clone(),
    );
    info!(
        interval_ms = config.feed_interval_ms,
        "PriceFeedService 시작됨"
    );

    start_valuation_service(
        market.clone(),
        store.clone(),
        store.clone(),
        hub.clone(),
        streams.clone(),
        config.valuation_interval(),
        config.significance_threshold,
        shutdown_token.clone(),
    );
    info!(
        interval_secs = config.valuation_interval_secs,
        threshold_pct = %config.significance_threshold,
        "ValuationService 시작됨"
    );

    start_metrics_service(
        hub.clone(),
        streams.clone(),
        store.clone(),
        state.metric_history.clone(),
        config.metrics_interval(),
        shutdown_token.clone(),
    );
    info!(
        interval_secs = config.metrics_interval_secs,
        "MetricsService 시작됨"
    );

    start_alert_service(
        RiskEngine::with_defaults(),
        store.clone(),
        hub.clone(),
        streams.clone(),
        transactions_rx,
        shutdown_token.clone(),
    );
    info!("AlertService 시작됨");

    // WebSocket / SSE 라우트 상태
    let ws_state = WsState::new(hub, config.jwt_secret.clone());
    let sse_state = SseState::new(streams, config.jwt_secret.clone());

    // 라우터 생성
    let app = create_router(state, metrics_handle, ws_state, sse_state);

    // 서버 시작
    info!(%addr, "Pulse server listening");
    info!("Metrics available at http://{}/metrics", addr);
    info!("WebSocket available at ws://{}/ws", addr);
    info!("SSE streams at http://{}/events", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let shutdown_token_for_signal = shutdown_token.clone();

    // Graceful shutdown 처리 (타임아웃 포함)
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_token_for_signal))
        .await?;

    // 종료 시그널 받은 후 정리 작업
    info!("Server shutdown initiated, cleaning up...");

    // 종료 토큰 취소 (백그라운드 서비스에 종료 시그널 전파)
    shutdown_token.cancel();

    // 정리 작업에 최대 10초 대기
    let cleanup_timeout = tokio::time::timeout(Duration::from_secs(10), async {
        // 진행 중인 요청 완료 대기
        tokio::time::sleep(Duration::from_millis(500)).await;
        info!("Cleanup completed");
    })
    .await;

    if cleanup_timeout.is_err() {
        warn!("Cleanup timeout, forcing shutdown");
    }

    info!("Server stopped gracefully");

    Ok(())
}

/// Graceful shutdown 시그널 대기.
///
/// Ctrl+C 또는 SIGTERM 시그널을 수신하면 종료 토큰을 취소합니다.
///
/// # Arguments
/// * `shutdown_token` - 백그라운드 서비스에 종료를 전파할 CancellationToken
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    // 모든 백그라운드 서비스에 종료 시그널 전파
    shutdown_token.cancel();
    info!("Shutdown signal propagated to background tasks");
}
