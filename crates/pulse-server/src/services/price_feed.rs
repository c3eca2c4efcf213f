//! 시세 배포 서비스.
//!
//! 시장 데이터 접근자를 빠른 주기로 폴링하여 구독자에게 시세 틱을
//! 배포합니다. 심볼 하나의 조회 실패는 경고 후 다음 심볼로 넘어가며,
//! 허브 캐시에 남은 직전 틱은 그대로 유지됩니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use pulse_core::MarketDataProvider;

use crate::metrics;
use crate::stats::CycleStats;
use crate::websocket::SharedBroadcastHub;

/// 시세 배포 서비스.
pub struct PriceFeedService {
    market: Arc<dyn MarketDataProvider>,
    hub: SharedBroadcastHub,
    interval: Duration,
}

impl PriceFeedService {
    /// 새 서비스 인스턴스 생성.
    pub fn new(
        market: Arc<dyn MarketDataProvider>,
        hub: SharedBroadcastHub,
        interval: Duration,
    ) -> Self {
        Self {
            market,
            hub,
            interval,
        }
    }

    /// 서비스 시작 (메인 루프).
    ///
    /// 한 주기가 주기 길이를 넘겨도 다음 틱을 겹쳐 시작하지 않습니다.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }

                _ = shutdown.cancelled() => {
                    info!("PriceFeedService 종료");
                    break;
                }
            }
        }
    }

    /// 한 주기: 전체 심볼의 시세를 갱신하고 배포합니다.
    pub(crate) async fn run_cycle(&self) -> CycleStats {
        let started = Instant::now();
        let mut stats = CycleStats::new();

        for symbol in self.market.symbols().await {
            stats.total += 1;

            match self.market.price(&symbol).await {
                Ok(tick) => {
                    let delivered = self.hub.broadcast_price(&tick).await;
                    metrics::record_price_update(&symbol);
                    if delivered == 0 {
                        // 구독자 없음 (캐시는 갱신됨)
                        stats.skipped += 1;
                    } else {
                        stats.success += 1;
                    }
                }
                Err(e) => {
                    stats.errors += 1;
                    warn!(symbol = %symbol, error = %e, "시세 조회 실패");
                }
            }
        }

        stats.elapsed = started.elapsed();
        metrics::record_cycle_duration("price_feed", stats.elapsed.as_secs_f64());
        stats.log_summary("price feed");
        stats
    }
}

/// PriceFeedService를 백그라운드 task로 시작.
pub fn start_price_feed_service(
    market: Arc<dyn MarketDataProvider>,
    hub: SharedBroadcastHub,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let service = PriceFeedService::new(market, hub, interval);

    tokio::spawn(async move {
        service.run(shutdown).await;
    })
}
