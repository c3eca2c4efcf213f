//! 시세 데이터 타입.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 심볼 단위 시세 틱.
///
/// 가격 배포의 최소 단위입니다. 생성 후 변경되지 않으며,
/// 같은 심볼의 다음 틱으로 대체됩니다 (병합되지 않음).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    /// 심볼 (예: "BTC")
    pub symbol: String,
    /// 현재 가격
    pub price: Decimal,
    /// 24시간 변동률(%)
    pub change_24h: Decimal,
    /// 24시간 거래량
    pub volume_24h: Decimal,
    /// 시가총액
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap: Option<Decimal>,
    /// 타임스탬프 (epoch 밀리초)
    pub timestamp: i64,
}

impl PriceTick {
    /// 현재 시각의 새 시세 틱을 생성합니다.
    pub fn new(symbol: impl Into<String>, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            change_24h: Decimal::ZERO,
            volume_24h: Decimal::ZERO,
            market_cap: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// 24시간 변동률 설정.
    pub fn with_change_24h(mut self, change_24h: Decimal) -> Self {
        self.change_24h = change_24h;
        self
    }

    /// 24시간 거래량 설정.
    pub fn with_volume_24h(mut self, volume_24h: Decimal) -> Self {
        self.volume_24h = volume_24h;
        self
    }

    /// 시가총액 설정.
    pub fn with_market_cap(mut self, market_cap: Decimal) -> Self {
        self.market_cap = Some(market_cap);
        self
    }

    /// 타임스탬프 설정 (epoch 밀리초).
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 이 틱이 다른 틱보다 최신인지 확인합니다.
    pub fn is_newer_than(&self, other: &PriceTick) -> bool {
        self.timestamp > other.timestamp
    }
}
