//! 보안 경보 서비스.
//!
//! 트랜잭션 이벤트 채널을 소비하여 리스크 엔진을 실행하고, 정책에
//! 따라 경보를 배포합니다.
//!
//! 배포 경로:
//! - `CriticalAlert`: 알림 저장소에 영속화 + 허브 `security_alerts`
//!   채널 + 관리자 스트림 전체 + (사용자 한정이면) 해당 사용자 스트림
//! - 알림 수준(`Notify`): 해당 사용자 스트림만, 영속화 없음
//!
//! 사용자별 거래 창은 24시간으로 잘려 스코어링 입력(`ActivitySample`)
//! 집계에 쓰입니다.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pulse_core::{AlertStore, CriticalAlert, StreamEvent, Transaction};
use pulse_risk::{ActivitySample, RiskAssessment, RiskEngine};

use crate::metrics;
use crate::sse::SharedStreamRegistry;
use crate::websocket::SharedBroadcastHub;

/// 트랜잭션 이벤트 채널 기본 용량.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// 사용자별 거래 창 길이.
const WINDOW_HOURS: i64 = 24;

/// 보안 경보 서비스.
pub struct AlertService {
    engine: RiskEngine,
    alerts: Arc<dyn AlertStore>,
    hub: SharedBroadcastHub,
    streams: SharedStreamRegistry,
    // 사용자 ID → 최근 24시간 거래 창 (발생 순)
    windows: RwLock<HashMap<String, VecDeque<Transaction>>>,
}

impl AlertService {
    /// 새 서비스 인스턴스 생성.
    pub fn new(
        engine: RiskEngine,
        alerts: Arc<dyn AlertStore>,
        hub: SharedBroadcastHub,
        streams: SharedStreamRegistry,
    ) -> Self {
        Self {
            engine,
            alerts,
            hub,
            streams,
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// 서비스 시작 (메인 루프).
    ///
    /// 채널이 닫히거나 셧다운 신호가 오면 종료합니다.
    pub async fn run(self, mut events: mpsc::Receiver<Transaction>, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                maybe_tx = events.recv() => {
                    match maybe_tx {
                        Some(transaction) => self.process_transaction(transaction).await,
                        None => {
                            info!("트랜잭션 채널 닫힘, AlertService 종료");
                            break;
                        }
                    }
                }

                _ = shutdown.cancelled() => {
                    info!("AlertService 종료");
                    break;
                }
            }
        }
    }

    /// 트랜잭션 하나를 평가하고 정책에 따라 배포합니다.
    pub(crate) async fn process_transaction(&self, transaction: Transaction) {
        metrics::record_transaction(&transaction.kind.to_string());

        // 고정 하한 규칙: 점수와 무관하게 발동
        if let Some(alert) = self.engine.screen_transaction(&transaction) {
            self.dispatch_alert(alert).await;
        }

        let now = Utc::now();
        let sample = {
            let mut windows = self.windows.write().await;
            let window = windows.entry(transaction.user_id.clone()).or_default();
            window.push_back(transaction.clone());

            // 24시간 밖 거래 제거
            let cutoff = now - ChronoDuration::hours(WINDOW_HOURS);
            while window.front().map_or(false, |tx| tx.occurred_at < cutoff) {
                window.pop_front();
            }

            let recent: Vec<Transaction> = window.iter().cloned().collect();
            ActivitySample::from_transactions(transaction.user_id.as_str(), &recent, now)
        };

        let assessment = self.engine.assess(&sample);

        if assessment.is_critical() {
            if let Some(alert) = assessment.to_alert() {
                self.dispatch_alert(alert).await;
            }
        } else if assessment.requires_notification() {
            self.notify_user(&assessment).await;
        }
    }

    /// 크리티컬 경보: 영속화 후 모든 경로로 배포.
    async fn dispatch_alert(&self, alert: CriticalAlert) {
        metrics::record_alert(&alert.alert_type, &alert.severity.to_string());
        warn!(
            alert_type = %alert.alert_type,
            severity = %alert.severity,
            user_id = ?alert.user_id,
            "보안 경보 발행"
        );

        if let Err(e) = self.alerts.append(&alert).await {
            error!(error = %e, "경보 영속화 실패");
        }

        let payload = match serde_json::to_value(&alert) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "경보 직렬화 실패");
                return;
            }
        };

        self.hub
            .broadcast_to_channel("security_alerts", payload.clone())
            .await;
        self.streams
            .broadcast_to_admins(StreamEvent::new("critical_alert", payload.clone()))
            .await;

        if let Some(user_id) = &alert.user_id {
            self.streams
                .send_to_user(user_id, StreamEvent::new("critical_alert", payload))
                .await;
        }
    }

    /// 알림 수준: 해당 사용자 스트림만, 영속화 없음.
    async fn notify_user(&self, assessment: &RiskAssessment) {
        let payload = match serde_json::to_value(assessment) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "평가 직렬화 실패");
                return;
            }
        };

        debug!(
            user_id = %assessment.user_id,
            score = assessment.score,
            "리스크 알림 전송"
        );
        self.streams
            .send_to_user(&assessment.user_id, StreamEvent::new("risk_notice", payload))
            .await;
    }
}

/// AlertService를 백그라운드 task로 시작.
pub fn start_alert_service(
    engine: RiskEngine,
    alerts: Arc<dyn AlertStore>,
    hub: SharedBroadcastHub,
    streams: SharedStreamRegistry,
    events: mpsc::Receiver<Transaction>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let service = AlertService::new(engine, alerts, hub, streams);

    tokio::spawn(async move {
        service.run(events, shutdown).await;
    })
}
