//! 리스크 스코어링 설정.
//!
//! 시그널별 가중치, 탐지 임계값, 정책 결정 경계를 정의합니다.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 활동 리스크 스코어링 설정.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// 시간당 거래 횟수 탐지 임계값 (기본값: 10)
    /// 이 횟수를 초과하면 high_transaction_count 시그널이 발동됩니다
    #[serde(default = "default_high_tx_count_threshold")]
    pub high_tx_count_threshold: usize,

    /// 24시간 누적 출금액 탐지 임계값 (기본값: 50000)
    #[serde(default = "default_large_cumulative_threshold")]
    pub large_cumulative_threshold: Decimal,

    /// 심야 시간대 시작 시각 (기본값: 0시)
    #[serde(default)]
    pub off_hours_start: u32,

    /// 심야 시간대 종료 시각, 미포함 (기본값: 6시)
    #[serde(default = "default_off_hours_end")]
    pub off_hours_end: u32,

    /// 거래 횟수 시그널 가중치 (기본값: 0.3)
    #[serde(default = "default_weight_high_tx_count")]
    pub weight_high_tx_count: f64,

    /// 누적 출금액 시그널 가중치 (기본값: 0.4)
    #[serde(default = "default_weight_large_cumulative")]
    pub weight_large_cumulative: f64,

    /// 심야 활동 시그널 가중치 (기본값: 0.2)
    #[serde(default = "default_weight_off_hours")]
    pub weight_off_hours: f64,

    /// 신규 기기 시그널 가중치 (기본값: 0.3)
    #[serde(default = "default_weight_new_device")]
    pub weight_new_device: f64,

    /// 보안 경보 발동 점수, 초과 시 (기본값: 0.8)
    #[serde(default = "default_critical_threshold")]
    pub critical_threshold: f64,

    /// 사용자 알림 발동 점수, 초과 시 (기본값: 0.6)
    #[serde(default = "default_notify_threshold")]
    pub notify_threshold: f64,

    /// 단건 거래 금액의 고정 경보 하한 (기본값: 10000)
    /// 이 금액을 초과하는 거래는 점수와 무관하게 경보를 발동합니다
    #[serde(default = "default_large_withdrawal_floor")]
    pub large_withdrawal_floor: Decimal,
}

// 기본값 함수들
fn default_high_tx_count_threshold() -> usize {
    10
}

fn default_large_cumulative_threshold() -> Decimal {
    Decimal::from(50_000)
}

fn default_off_hours_end() -> u32 {
    6
}

fn default_weight_high_tx_count() -> f64 {
    0.3
}

fn default_weight_large_cumulative() -> f64 {
    0.4
}

fn default_weight_off_hours() -> f64 {
    0.2
}

fn default_weight_new_device() -> f64 {
    0.3
}

fn default_critical_threshold() -> f64 {
    0.8
}

fn default_notify_threshold() -> f64 {
    0.6
}

fn default_large_withdrawal_floor() -> Decimal {
    Decimal::from(10_000)
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            high_tx_count_threshold: default_high_tx_count_threshold(),
            large_cumulative_threshold: default_large_cumulative_threshold(),
            off_hours_start: 0,
            off_hours_end: default_off_hours_end(),
            weight_high_tx_count: default_weight_high_tx_count(),
            weight_large_cumulative: default_weight_large_cumulative(),
            weight_off_hours: default_weight_off_hours(),
            weight_new_device: default_weight_new_device(),
            critical_threshold: default_critical_threshold(),
            notify_threshold: default_notify_threshold(),
            large_withdrawal_floor: default_large_withdrawal_floor(),
        }
    }
}

impl RiskConfig {
    /// 기본값으로 새 RiskConfig를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 해당 시각이 심야 시간대에 속하는지 확인합니다.
    pub fn is_off_hours(&self, hour: u32) -> bool {
        hour >= self.off_hours_start && hour < self.off_hours_end
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        for (name, weight) in [
            ("weight_high_tx_count", self.weight_high_tx_count),
            ("weight_large_cumulative", self.weight_large_cumulative),
            ("weight_off_hours", self.weight_off_hours),
            ("weight_new_device", self.weight_new_device),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(ConfigValidationError::InvalidValue(format!(
                    "{} must be between 0 and 1",
                    name
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.critical_threshold) {
            return Err(ConfigValidationError::InvalidValue(
                "critical_threshold must be between 0 and 1".into(),
            ));
        }

        if self.notify_threshold > self.critical_threshold {
            return Err(ConfigValidationError::InvalidValue(
                "notify_threshold must not exceed critical_threshold".into(),
            ));
        }

        if self.off_hours_end > 24 || self.off_hours_start >= self.off_hours_end {
            return Err(ConfigValidationError::InvalidValue(
                "off hours window must satisfy start < end <= 24".into(),
            ));
        }

        if self.large_withdrawal_floor <= Decimal::ZERO {
            return Err(ConfigValidationError::InvalidValue(
                "large_withdrawal_floor must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

/// 설정 검증 오류.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}
