//! 모든 핸들러에서 공유되는 애플리케이션 상태.
//!
//! AppState는 HTTP 라우트, WebSocket 핸들러, 백그라운드 서비스가 공유하는
//! 리소스를 관리합니다. Arc로 래핑되어 여러 요청 간에 안전하게 공유됩니다.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, RwLock};

use pulse_core::{
    AlertStore, MarketDataProvider, MetricHistory, PortfolioStore, Transaction, UserStore,
};

use crate::sse::SharedStreamRegistry;
use crate::websocket::SharedBroadcastHub;

/// 애플리케이션 공유 상태.
///
/// Axum의 State extractor를 통해 핸들러에 주입됩니다.
#[derive(Clone)]
pub struct AppState {
    /// WebSocket 브로드캐스트 허브 - 심볼/채널 구독 및 팬아웃
    pub hub: SharedBroadcastHub,

    /// SSE 스트림 레지스트리 - 사용자별 단방향 이벤트 스트림
    pub streams: SharedStreamRegistry,

    /// 시장 데이터 제공자 - 시세 조회
    pub market: Arc<dyn MarketDataProvider>,

    /// 포트폴리오 저장소 - 보유 내역 조회, 평가 스냅샷 영속화
    pub portfolios: Arc<dyn PortfolioStore>,

    /// 사용자 저장소 - 활성 사용자 조회
    pub users: Arc<dyn UserStore>,

    /// 경보 저장소 - 크리티컬 경보 기록/조회
    pub alerts: Arc<dyn AlertStore>,

    /// 트랜잭션 이벤트 송신 채널.
    ///
    /// HTTP로 접수된 활동 트랜잭션을 AlertService에 전달합니다.
    /// 채널이 가득 차면 접수를 거부합니다 (백프레셔).
    pub transactions_tx: mpsc::Sender<Transaction>,

    /// 지표 이력 링 - MetricsService가 기록, 핸들러가 조회
    pub metric_history: Arc<RwLock<MetricHistory>>,

    /// JWT 서명 비밀키
    pub jwt_secret: String,

    /// 서버 시작 시간 (업타임 계산용)
    pub started_at: DateTime<Utc>,

    /// API 버전
    pub version: String,
}

impl AppState {
    /// 새로운 AppState 생성.
    ///
    /// 지표 이력, 시작 시간, 버전은 내부에서 초기화됩니다.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hub: SharedBroadcastHub,
        streams: SharedStreamRegistry,
        market: Arc<dyn MarketDataProvider>,
        portfolios: Arc<dyn PortfolioStore>,
        users: Arc<dyn UserStore>,
        alerts: Arc<dyn AlertStore>,
        transactions_tx: mpsc::Sender<Transaction>,
        jwt_secret: impl Into<String>,
    ) -> Self {
        Self {
            hub,
            streams,
            market,
            portfolios,
            users,
            alerts,
            transactions_tx,
            metric_history: Arc::new(RwLock::new(MetricHistory::default())),
            jwt_secret: jwt_secret.into(),
            started_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// 서버 업타임(초) 반환.
    pub fn uptime_secs(&self) -> i64 {
        Utc::now().signed_duration_since(self.started_at).num_seconds()
    }
}

/// 테스트용 AppState 생성 헬퍼.
///
/// 데모 데이터가 담긴 인메모리 저장소와 시뮬레이션 시장으로 상태를 구성합니다.
/// 트랜잭션 수신단을 함께 반환하므로 호출자가 보관하는 동안 채널이 열려 있습니다.
#[cfg(any(test, feature = "test-utils"))]
pub async fn create_test_state() -> (AppState, mpsc::Receiver<Transaction>) {
    use crate::services::{SimulatedMarket, DEFAULT_EVENT_CAPACITY};
    use crate::sse::create_stream_registry;
    use crate::store::MemoryStore;
    use crate::websocket::{create_hub, DEFAULT_OUTBOX_CAPACITY};

    let store = Arc::new(MemoryStore::with_demo_data().await);
    let market = Arc::new(SimulatedMarket::new());
    let (transactions_tx, transactions_rx) = mpsc::channel(DEFAULT_EVENT_CAPACITY);

    let state = AppState::new(
        create_hub(DEFAULT_OUTBOX_CAPACITY),
        create_stream_registry(16),
        market,
        store.clone(),
        store.clone(),
        store,
        transactions_tx,
        "test-secret-key-for-jwt-testing-minimum-32-chars",
    );

    (state, transactions_rx)
}
