//! 시스템/비즈니스 지표 서비스.
//!
//! 빠른 주기(기본 5초)로 시스템 게이지와 비즈니스 게이지를 샘플링해
//! 이름별 이력에 기록하고, 파생된 변동(delta)을 포함한 관측값 전체를
//! 관리자 대상(`analytics_dashboard` 채널, 관리자 스트림)으로
//! 배포합니다.
//!
//! 시스템 게이지(cpu/memory/network)는 외부 수집기 없이 직전
//! 관측값 주변의 랜덤 워크로 시뮬레이션합니다. 비즈니스 게이지는
//! 허브/레지스트리/저장소의 실제 카운트입니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde_json::json;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use pulse_core::{Metric, MetricHistory, StreamEvent, UserStore};

use crate::metrics;
use crate::sse::SharedStreamRegistry;
use crate::stats::CycleStats;
use crate::websocket::SharedBroadcastHub;

/// 시스템/비즈니스 지표 서비스.
pub struct MetricsService {
    hub: SharedBroadcastHub,
    streams: SharedStreamRegistry,
    users: Arc<dyn UserStore>,
    history: Arc<RwLock<MetricHistory>>,
    interval: Duration,
}

impl MetricsService {
    /// 새 서비스 인스턴스 생성.
    pub fn new(
        hub: SharedBroadcastHub,
        streams: SharedStreamRegistry,
        users: Arc<dyn UserStore>,
        history: Arc<RwLock<MetricHistory>>,
        interval: Duration,
    ) -> Self {
        Self {
            hub,
            streams,
            users,
            history,
            interval,
        }
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
                    info!("MetricsService 종료");
                    break;
                }
            }
        }
    }

    /// 한 주기: 게이지를 샘플링하고 이력에 기록한 뒤 배포합니다.
    pub(crate) async fn run_cycle(&self) -> Vec<Metric> {
        let started = Instant::now();
        let mut stats = CycleStats::new();

        // 비즈니스 게이지: 실제 카운트
        let active_connections = self.hub.client_count().await as f64;
        let active_streams = self.streams.stream_count().await as f64;
        let active_users = match self.users.active_users().await {
            Ok(users) => users.len() as f64,
            Err(e) => {
                stats.errors += 1;
                warn!(error = %e, "활성 사용자 조회 실패");
                0.0
            }
        };

        let mut history = self.history.write().await;

        // 시스템 게이지: 직전 관측값 주변 랜덤 워크
        let cpu = simulated_gauge(history.last("cpu_usage").map(|m| m.value), 35.0);
        let memory = simulated_gauge(history.last("memory_usage").map(|m| m.value), 55.0);
        let network = simulated_gauge(history.last("network_mbps").map(|m| m.value), 120.0);

        let observations = vec![
            history.record("cpu_usage", cpu),
            history.record("memory_usage", memory),
            history.record("network_mbps", network),
            history.record("active_connections", active_connections),
            history.record("active_streams", active_streams),
            history.record("active_users", active_users),
        ];
        drop(history);

        stats.total = observations.len();
        stats.success = observations.len();

        let payload = json!({ "metrics": observations });
        self.hub
            .broadcast_to_channel("analytics_dashboard", payload.clone())
            .await;
        self.streams
            .broadcast_to_admins(StreamEvent::new("metrics_update", payload))
            .await;

        stats.elapsed = started.elapsed();
        metrics::record_cycle_duration("metrics", stats.elapsed.as_secs_f64());
        stats.log_summary("metrics sample");
        observations
    }
}

/// 직전 관측값 주변을 움직이는 시뮬레이션 게이지.
///
/// 기준값의 20%~180% 범위로 잘려 발산하지 않습니다.
fn simulated_gauge(previous: Option<f64>, base: f64) -> f64 {
    let mut rng = rand::thread_rng();
    let current = previous.unwrap_or(base);
    (current + rng.gen_range(-5.0..=5.0)).clamp(base * 0.2, base * 1.8)
}

/// MetricsService를 백그라운드 task로 시작.
pub fn start_metrics_service(
    hub: SharedBroadcastHub,
    streams: SharedStreamRegistry,
    users: Arc<dyn UserStore>,
    history: Arc<RwLock<MetricHistory>>,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let service = MetricsService::new(hub, streams, users, history, interval);

    tokio::spawn(async move {
        service.run(shutdown).await;
    })
}
