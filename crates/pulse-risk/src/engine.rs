//! 리스크 엔진 구현.
//!
//! 활동 샘플에 대한 무상태 스코어링 함수를 제공합니다. 점수는
//! 독립적인 가중 시그널의 합이며 [0, 1] 범위로 잘립니다.
//!
//! 정책:
//! - 점수 > critical_threshold: 보안 경보 (관리자 전체 + 해당 사용자)
//! - notify_threshold < 점수 <= critical_threshold: 사용자 알림만
//! - 점수 <= notify_threshold: 조치 없음
//!
//! 단건 거래 금액이 고정 하한을 초과하면 점수와 무관하게
//! `large_withdrawal` 경보가 발동됩니다.

use chrono::{DateTime, Duration, Timelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use pulse_core::{AlertSeverity, CriticalAlert, Transaction, TransactionKind};

use crate::config::RiskConfig;

/// 스코어링 입력이 되는 사용자 활동 샘플.
///
/// 샘플은 거래 내역에서 집계하거나 빌더로 직접 구성할 수 있습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivitySample {
    /// 대상 사용자 ID
    pub user_id: String,
    /// 최근 1시간 거래 횟수
    pub transaction_count: usize,
    /// 최근 24시간 누적 출금액
    pub cumulative_withdrawal: Decimal,
    /// 마지막 활동 시각 (0-23시)
    pub hour_of_day: u32,
    /// 신규 기기에서의 활동 여부
    pub from_new_device: bool,
}

impl ActivitySample {
    /// 빈 활동 샘플 생성.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            transaction_count: 0,
            cumulative_withdrawal: Decimal::ZERO,
            hour_of_day: 12,
            from_new_device: false,
        }
    }

    /// 거래 횟수 설정.
    pub fn with_transaction_count(mut self, count: usize) -> Self {
        self.transaction_count = count;
        self
    }

    /// 누적 출금액 설정.
    pub fn with_cumulative_withdrawal(mut self, amount: Decimal) -> Self {
        self.cumulative_withdrawal = amount;
        self
    }

    /// 활동 시각 설정.
    pub fn with_hour_of_day(mut self, hour: u32) -> Self {
        self.hour_of_day = hour;
        self
    }

    /// 신규 기기 플래그 설정.
    pub fn with_new_device(mut self, from_new_device: bool) -> Self {
        self.from_new_device = from_new_device;
        self
    }

    /// 거래 내역에서 활동 샘플을 집계합니다.
    ///
    /// - 거래 횟수: `now` 기준 최근 1시간
    /// - 누적 출금액: `now` 기준 최근 24시간의 출금 거래 합
    /// - 활동 시각: 가장 최근 거래의 시각 (거래가 없으면 `now`)
    /// - 신규 기기: 최근 1시간 내 신규 기기 거래 존재 여부
    pub fn from_transactions(
        user_id: impl Into<String>,
        transactions: &[Transaction],
        now: DateTime<Utc>,
    ) -> Self {
        let hour_ago = now - Duration::hours(1);
        let day_ago = now - Duration::hours(24);

        let mut sample = Self::new(user_id);
        let mut latest: Option<DateTime<Utc>> = None;

        for tx in transactions {
            if tx.occurred_at > now {
                continue;
            }
            if tx.occurred_at >= hour_ago {
                sample.transaction_count += 1;
                if tx.from_new_device {
                    sample.from_new_device = true;
                }
            }
            if tx.occurred_at >= day_ago && tx.kind == TransactionKind::Withdrawal {
                sample.cumulative_withdrawal += tx.amount;
            }
            if latest.map_or(true, |t| tx.occurred_at > t) {
                latest = Some(tx.occurred_at);
            }
        }

        sample.hour_of_day = latest.unwrap_or(now).hour();
        sample
    }
}

/// 발동된 단일 리스크 시그널.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSignal {
    /// 시그널 이름
    pub name: String,
    /// 점수에 더해진 가중치
    pub weight: f64,
    /// 사람이 읽을 수 있는 설명
    pub detail: String,
}

impl RiskSignal {
    fn new(name: impl Into<String>, weight: f64, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weight,
            detail: detail.into(),
        }
    }
}

/// 점수에 따른 정책 결정.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskAction {
    /// 조치 없음
    None,
    /// 사용자 알림만
    Notify,
    /// 보안 경보 (관리자 전체 + 해당 사용자)
    Critical,
}

/// 리스크 평가 결과.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// 대상 사용자 ID
    pub user_id: String,
    /// 최종 점수 [0, 1]
    pub score: f64,
    /// 발동된 시그널들
    pub signals: Vec<RiskSignal>,
    /// 정책 결정
    pub action: RiskAction,
    /// 평가 시각
    pub assessed_at: DateTime<Utc>,
}

impl RiskAssessment {
    /// 보안 경보가 필요한지 확인.
    pub fn is_critical(&self) -> bool {
        self.action == RiskAction::Critical
    }

    /// 사용자 알림이 필요한지 확인.
    pub fn requires_notification(&self) -> bool {
        matches!(self.action, RiskAction::Notify | RiskAction::Critical)
    }

    /// 보안 경보 엔티티로 변환합니다.
    ///
    /// 경보 수준 미만이면 `None`을 반환합니다.
    pub fn to_alert(&self) -> Option<CriticalAlert> {
        if !self.is_critical() {
            return None;
        }

        let signal_names: Vec<&str> = self.signals.iter().map(|s| s.name.as_str()).collect();
        Some(
            CriticalAlert::new(
                "suspicious_activity",
                AlertSeverity::Critical,
                format!(
                    "Suspicious activity detected for user {} (score {:.2})",
                    self.user_id, self.score
                ),
            )
            .with_user(self.user_id.clone())
            .with_data(serde_json::json!({
                "score": self.score,
                "signals": signal_names,
            })),
        )
    }
}

/// 활동 리스크 엔진.
///
/// 상태를 갖지 않으며 호출 간 어떤 것도 기억하지 않습니다. 동일한
/// 샘플은 항상 동일한 평가를 냅니다.
#[derive(Debug, Clone)]
pub struct RiskEngine {
    config: RiskConfig,
}

impl RiskEngine {
    /// 설정으로 새 리스크 엔진 생성.
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 생성.
    pub fn with_defaults() -> Self {
        Self::new(RiskConfig::default())
    }

    /// 설정 참조 조회.
    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// 활동 샘플을 평가합니다.
    pub fn assess(&self, sample: &ActivitySample) -> RiskAssessment {
        let mut signals = Vec::new();
        let mut score = 0.0_f64;

        // Check 1: High transaction count
        if sample.transaction_count > self.config.high_tx_count_threshold {
            score += self.config.weight_high_tx_count;
            signals.push(RiskSignal::new(
                "high_transaction_count",
                self.config.weight_high_tx_count,
                format!("{} transactions in the last hour", sample.transaction_count),
            ));
        }

        // Check 2: Large cumulative withdrawal
        if sample.cumulative_withdrawal > self.config.large_cumulative_threshold {
            score += self.config.weight_large_cumulative;
            signals.push(RiskSignal::new(
                "large_cumulative_withdrawal",
                self.config.weight_large_cumulative,
                format!(
                    "{} withdrawn in the last 24 hours",
                    sample.cumulative_withdrawal
                ),
            ));
        }

        // Check 3: Off-hours activity
        if self.config.is_off_hours(sample.hour_of_day) {
            score += self.config.weight_off_hours;
            signals.push(RiskSignal::new(
                "off_hours_activity",
                self.config.weight_off_hours,
                format!("Activity at {:02}:00 UTC", sample.hour_of_day),
            ));
        }

        // Check 4: New device
        if sample.from_new_device {
            score += self.config.weight_new_device;
            signals.push(RiskSignal::new(
                "new_device",
                self.config.weight_new_device,
                "Activity from an unrecognized device",
            ));
        }

        let score = score.clamp(0.0, 1.0);
        let action = if score > self.config.critical_threshold {
            RiskAction::Critical
        } else if score > self.config.notify_threshold {
            RiskAction::Notify
        } else {
            RiskAction::None
        };

        debug!(
            user_id = %sample.user_id,
            score,
            signals = signals.len(),
            ?action,
            "Activity sample assessed"
        );

        RiskAssessment {
            user_id: sample.user_id.clone(),
            score,
            signals,
            action,
            assessed_at: Utc::now(),
        }
    }

    /// 단건 거래에 고정 하한 규칙을 적용합니다.
    ///
    /// 거래 금액이 하한을 초과하면 리스크 점수와 무관하게
    /// `large_withdrawal` 경보를 반환합니다.
    pub fn screen_transaction(&self, transaction: &Transaction) -> Option<CriticalAlert> {
        if transaction.amount <= self.config.large_withdrawal_floor {
            return None;
        }

        Some(
            CriticalAlert::new(
                "large_withdrawal",
                AlertSeverity::Critical,
                format!(
                    "Transaction of {} exceeds the {} review floor",
                    transaction.amount, self.config.large_withdrawal_floor
                ),
            )
            .with_user(transaction.user_id.clone())
            .with_data(serde_json::json!({
                "transaction_id": transaction.id,
                "kind": transaction.kind,
                "amount": transaction.amount,
            })),
        )
    }
}
