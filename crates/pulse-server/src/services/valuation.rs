//! 포트폴리오 평가 서비스.
//!
//! 느린 주기(기본 10초)로 전체 활성 사용자의 포트폴리오를 최신
//! 시세로 재평가합니다. 주기 내 시세는 심볼당 한 번만 조회하며,
//! 직전 주기의 총액과 비교한 변동이 모든 스냅샷에 채워집니다.
//!
//! 영속화 정책: 첫 관측이거나 변동률 절대값이 임계치(기본 1%)를
//! 넘을 때만 기록합니다. 푸시 배포는 영속화 여부와 무관하게 매
//! 주기 전체 빈도로 이루어집니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use pulse_core::{
    Holding, MarketDataProvider, PortfolioSnapshot, PortfolioStore, PriceTick, PulseResult,
    StreamEvent, UserStore,
};

use crate::metrics;
use crate::sse::SharedStreamRegistry;
use crate::stats::CycleStats;
use crate::websocket::SharedBroadcastHub;

/// 집계 브로드캐스트에 포함할 상/하위 포트폴리오 수.
const MOVERS_LIMIT: usize = 3;

/// 포트폴리오 평가 서비스.
pub struct ValuationService {
    market: Arc<dyn MarketDataProvider>,
    portfolios: Arc<dyn PortfolioStore>,
    users: Arc<dyn UserStore>,
    hub: SharedBroadcastHub,
    streams: SharedStreamRegistry,
    interval: Duration,
    significance_threshold: Decimal,
    // 포트폴리오 ID → 직전 주기의 총 평가 금액
    previous_values: RwLock<HashMap<String, Decimal>>,
}

impl ValuationService {
    /// 새 서비스 인스턴스 생성.
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        portfolios: Arc<dyn PortfolioStore>,
        users: Arc<dyn UserStore>,
        hub: SharedBroadcastHub,
        streams: SharedStreamRegistry,
        interval: Duration,
    ) -> Self {
        Self {
            market,
            portfolios,
            users,
            hub,
            streams,
            interval,
            significance_threshold: dec!(1),
            previous_values: RwLock::new(HashMap::new()),
        }
    }

    /// 영속화 임계치(%) 설정.
    pub fn with_significance_threshold(mut self, threshold_percent: Decimal) -> Self {
        self.significance_threshold = threshold_percent;
        self
    }

    /// 서비스 시작 (메인 루프).
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }

                _ = shutdown.cancelled() => {
                    info!("ValuationService 종료");
                    break;
                }
            }
        }
    }

    /// 한 주기: 전체 활성 사용자의 포트폴리오를 재평가합니다.
    ///
    /// 사용자/포트폴리오 하나의 실패는 경고 후 나머지 처리를
    /// 계속합니다.
    pub(crate) async fn run_cycle(&self) -> CycleStats {
        let started = Instant::now();
        let mut stats = CycleStats::new();
        // 주기 내 시세 캐시: 심볼당 한 번만 조회
        let mut price_cache: HashMap<String, PriceTick> = HashMap::new();
        let mut snapshots: Vec<PortfolioSnapshot> = Vec::new();

        let users = match self.users.active_users().await {
            Ok(users) => users,
            Err(e) => {
                error!(error = %e, "활성 사용자 조회 실패");
                stats.errors += 1;
                stats.elapsed = started.elapsed();
                return stats;
            }
        };

        for user in &users {
            let portfolios = match self.portfolios.portfolios_for(&user.id).await {
                Ok(portfolios) => portfolios,
                Err(e) => {
                    stats.errors += 1;
                    warn!(user_id = %user.id, error = %e, "포트폴리오 목록 조회 실패");
                    continue;
                }
            };

            for portfolio in portfolios {
                stats.total += 1;

                match self
                    .value_portfolio(&user.id, &portfolio.id, &mut price_cache)
                    .await
                {
                    Ok(snapshot) => {
                        stats.success += 1;
                        snapshots.push(snapshot);
                    }
                    Err(e) => {
                        stats.errors += 1;
                        warn!(portfolio_id = %portfolio.id, error = %e, "포트폴리오 평가 실패");
                    }
                }
            }
        }

        // 집계 패스: 전체 평가가 끝난 뒤 관리자 대상으로만 배포
        if !snapshots.is_empty() {
            self.broadcast_summary(&snapshots).await;
        }

        stats.elapsed = started.elapsed();
        metrics::record_cycle_duration("valuation", stats.elapsed.as_secs_f64());
        stats.log_summary("portfolio valuation");
        stats
    }

    /// 포트폴리오 하나를 평가하고 배포합니다.
    async fn value_portfolio(
        &self,
        user_id: &str,
        portfolio_id: &str,
        price_cache: &mut HashMap<String, PriceTick>,
    ) -> PulseResult<PortfolioSnapshot> {
        let stored = self.portfolios.holdings(portfolio_id).await?;

        let mut holdings = Vec::with_capacity(stored.len());
        for item in stored {
            let tick = self.cached_price(&item.symbol, price_cache).await?;
            holdings.push(Holding::priced(
                &item.symbol,
                item.quantity,
                item.avg_price,
                tick.price,
            ));
        }

        let previous = {
            let values = self.previous_values.read().await;
            values.get(portfolio_id).copied()
        };
        let snapshot =
            PortfolioSnapshot::from_holdings(user_id, portfolio_id, holdings, previous);

        // 다음 주기의 비교 기준 갱신
        self.previous_values
            .write()
            .await
            .insert(portfolio_id.to_string(), snapshot.total_value);

        // 첫 관측이거나 유의미한 변동일 때만 영속화
        if previous.is_none() || snapshot.is_significant_change(self.significance_threshold) {
            self.portfolios.record_valuation(&snapshot).await?;
        }

        self.dispatch_snapshot(&snapshot).await;
        Ok(snapshot)
    }

    /// 주기 내 캐시를 경유한 시세 조회.
    async fn cached_price(
        &self,
        symbol: &str,
        price_cache: &mut HashMap<String, PriceTick>,
    ) -> PulseResult<PriceTick> {
        if let Some(tick) = price_cache.get(symbol) {
            return Ok(tick.clone());
        }

        let tick = self.market.price(symbol).await?;
        price_cache.insert(symbol.to_string(), tick.clone());
        Ok(tick)
    }

    /// 스냅샷을 소유 사용자 스트림과 허브 채널로 배포합니다.
    async fn dispatch_snapshot(&self, snapshot: &PortfolioSnapshot) {
        let payload = match serde_json::to_value(snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(portfolio_id = %snapshot.portfolio_id, error = %e, "스냅샷 직렬화 실패");
                return;
            }
        };

        self.streams
            .send_to_user(
                &snapshot.user_id,
                StreamEvent::new("portfolio_update", payload.clone()),
            )
            .await;
        self.hub
            .broadcast_to_channel("portfolio_updates", payload)
            .await;
    }

    /// 집계 요약(총액, 상/하위 변동 포트폴리오)을 관리자 대상으로 배포합니다.
    async fn broadcast_summary(&self, snapshots: &[PortfolioSnapshot]) {
        let total_value: Decimal = snapshots.iter().map(|s| s.total_value).sum();
        let total_profit_loss: Decimal = snapshots.iter().map(|s| s.total_profit_loss()).sum();

        let mut ranked: Vec<&PortfolioSnapshot> = snapshots.iter().collect();
        ranked.sort_by(|a, b| b.change_percent.cmp(&a.change_percent));

        let top: Vec<Value> = ranked.iter().take(MOVERS_LIMIT).map(|s| mover(s)).collect();
        let bottom: Vec<Value> = ranked
            .iter()
            .rev()
            .take(MOVERS_LIMIT)
            .map(|s| mover(s))
            .collect();

        let payload = json!({
            "portfolio_count": snapshots.len(),
            "total_value": total_value,
            "total_profit_loss": total_profit_loss,
            "top_performers": top,
            "bottom_performers": bottom,
        });

        self.streams
            .broadcast_to_admins(StreamEvent::new("portfolio_summary", payload.clone()))
            .await;
        self.hub
            .broadcast_to_channel("analytics_dashboard", payload)
            .await;
    }
}

fn mover(snapshot: &PortfolioSnapshot) -> Value {
    json!({
        "portfolio_id": snapshot.portfolio_id,
        "user_id": snapshot.user_id,
        "total_value": snapshot.total_value,
        "change_percent": snapshot.change_percent,
    })
}

/// ValuationService를 백그라운드 task로 시작.
#[allow(clippy::too_many_arguments)]
pub fn start_valuation_service(
    market: Arc<dyn MarketDataProvider>,
    portfolios: Arc<dyn PortfolioStore>,
    users: Arc<dyn UserStore>,
    hub: SharedBroadcastHub,
    streams: SharedStreamRegistry,
    interval: Duration,
    significance_threshold: Decimal,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let service = ValuationService::new(market, portfolios, users, hub, streams, interval)
        .with_significance_threshold(significance_threshold);

    tokio::spawn(async move {
        service.run(shutdown).await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sse::create_stream_registry;
    use crate::store::MemoryStore;
    use crate::websocket::create_hub;
    use async_trait::async_trait;

    /// 항상 같은 가격을 돌려주는 시세 소스.
    struct FixedMarket;

    #[async_trait]
    impl MarketDataProvider for FixedMarket {
        async fn price(&self, symbol: &str) -> PulseResult<PriceTick> {
            Ok(PriceTick::new(symbol, dec!(100)))
        }

        async fn symbols(&self) -> Vec<String> {
            vec!["BTC".to_string()]
        }
    }

    async fn demo_service() -> (ValuationService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_demo_data().await);
        let service = ValuationService::new(
            Arc::new(FixedMarket),
            store.clone(),
            store.clone(),
            create_hub(16),
            create_stream_registry(16),
            Duration::from_secs(10),
        );
        (service, store)
    }

    #[tokio::test]
    async fn test_first_cycle_persists_all_portfolios() {
        let (service, store) = demo_service().await;

        let stats = service.run_cycle().await;

        assert_eq!(stats.total, 3);
        assert_eq!(stats.success, 3);
        assert_eq!(stats.errors, 0);
        // 첫 관측은 항상 영속화
        assert_eq!(store.valuation_count().await, 3);
    }

    #[tokio::test]
    async fn test_unchanged_cycle_skips_persistence() {
        let (service, store) = demo_service().await;

        service.run_cycle().await;
        service.run_cycle().await;

        // 고정 시세에서는 두 번째 주기 변동이 0%라 기록되지 않음
        assert_eq!(store.valuation_count().await, 3);
    }

    #[tokio::test]
    async fn test_snapshot_totals_from_fixed_prices() {
        let (service, store) = demo_service().await;

        service.run_cycle().await;

        let snapshot = store
            .valuations()
            .await
            .into_iter()
            .find(|s| s.portfolio_id == "pf_alice_main")
            .unwrap();

        // BTC 0.5×100 + ETH 4×100 + AAPL 10×100
        assert_eq!(snapshot.total_value, dec!(1450));
        assert_eq!(snapshot.change, dec!(0));
    }

    #[tokio::test]
    async fn test_dispatch_reaches_owner_stream_and_channel() {
        let store = Arc::new(MemoryStore::with_demo_data().await);
        let hub = create_hub(16);
        let streams = create_stream_registry(16);
        let service = ValuationService::new(
            Arc::new(FixedMarket),
            store.clone(),
            store.clone(),
            hub.clone(),
            streams.clone(),
            Duration::from_secs(10),
        );

        let mut alice_rx = streams.register("user_alice", false).await;
        // connected 이벤트 제거
        let _ = alice_rx.try_recv();

        let mut admin_rx = streams.register("admin_ops", true).await;
        let _ = admin_rx.try_recv();

        let mut hub_rx = hub.register("s1").await;
        hub.authenticate("s1", "user_bob", vec![]).await;
        hub.subscribe_channels("s1", &["portfolio_updates".to_string()])
            .await
            .unwrap();

        service.run_cycle().await;

        let event = alice_rx.try_recv().unwrap();
        assert_eq!(event.event_type, "portfolio_update");
        assert_eq!(event.data["portfolio_id"], "pf_alice_main");

        // 집계 요약은 관리자 스트림으로만
        let summary = admin_rx.try_recv().unwrap();
        assert_eq!(summary.event_type, "portfolio_summary");
        assert_eq!(summary.data["portfolio_count"], 3);
        assert!(alice_rx.try_recv().is_err());

        // 채널 구독자는 포트폴리오 3건의 브로드캐스트를 받음
        let mut broadcasts = 0;
        while let Ok(msg) = hub_rx.try_recv() {
            if let pulse_core::ServerMessage::Broadcast { channel, .. } = msg {
                if channel == "portfolio_updates" {
                    broadcasts += 1;
                }
            }
        }
        assert_eq!(broadcasts, 3);
    }

    /// SOL 조회만 실패하는 시세 소스.
    struct FlakyMarket;

    #[async_trait]
    impl MarketDataProvider for FlakyMarket {
        async fn price(&self, symbol: &str) -> PulseResult<PriceTick> {
            if symbol == "SOL" {
                return Err(pulse_core::PulseError::UpstreamUnavailable(
                    "SOL feed down".to_string(),
                ));
            }
            Ok(PriceTick::new(symbol, dec!(100)))
        }

        async fn symbols(&self) -> Vec<String> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn test_symbol_failure_isolated_per_portfolio() {
        let store = Arc::new(MemoryStore::with_demo_data().await);
        let service = ValuationService::new(
            Arc::new(FlakyMarket),
            store.clone(),
            store.clone(),
            create_hub(16),
            create_stream_registry(16),
            Duration::from_secs(10),
        );

        let stats = service.run_cycle().await;

        // SOL만 들고 있는 pf_bob_growth만 실패하고 나머지는 진행
        assert_eq!(stats.total, 3);
        assert_eq!(stats.success, 2);
        assert_eq!(stats.errors, 1);
        assert_eq!(store.valuation_count().await, 2);
    }

    #[tokio::test]
    async fn test_shutdown_stops_service() {
        let store = Arc::new(MemoryStore::with_demo_data().await);
        let shutdown = CancellationToken::new();

        let handle = start_valuation_service(
            Arc::new(FixedMarket),
            store.clone(),
            store,
            create_hub(16),
            create_stream_registry(16),
            Duration::from_secs(10),
            dec!(1),
            shutdown.clone(),
        );
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("종료 신호 후 1초 내에 멈춰야 함")
            .unwrap();
    }
}
