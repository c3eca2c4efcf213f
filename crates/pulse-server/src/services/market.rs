//! 시뮬레이션 시세 소스.
//!
//! 업스트림 시세 제공자를 랜덤 워크로 대신하는 `MarketDataProvider`
//! 구현입니다. 조회할 때마다 심볼 가격이 한 스텝(±0.5%) 이동하고,
//! 알려지지 않은 심볼은 첫 조회 시 동적으로 생성됩니다.

use std::collections::HashMap;

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;
use tracing::info;

use pulse_core::{MarketDataProvider, PriceTick, PulseResult};

/// 심볼별 시세 상태.
#[derive(Debug, Clone)]
struct SymbolState {
    base_price: Decimal,
    current_price: Decimal,
    volume_24h: Decimal,
}

impl SymbolState {
    fn seeded(base_price: Decimal, volume_24h: Decimal) -> Self {
        Self {
            base_price,
            current_price: base_price,
            volume_24h,
        }
    }
}

/// 랜덤 워크 시세 시뮬레이터.
pub struct SimulatedMarket {
    prices: RwLock<HashMap<String, SymbolState>>,
}

impl SimulatedMarket {
    /// 기본 심볼이 시드된 시뮬레이터 생성.
    pub fn new() -> Self {
        let mut prices = HashMap::new();

        // 암호화폐
        prices.insert(
            "BTC".to_string(),
            SymbolState::seeded(dec!(105000), dec!(500000000)),
        );
        prices.insert(
            "ETH".to_string(),
            SymbolState::seeded(dec!(3350), dec!(200000000)),
        );
        prices.insert(
            "SOL".to_string(),
            SymbolState::seeded(dec!(185), dec!(80000000)),
        );

        // 미국 ETF/주식
        prices.insert(
            "SPY".to_string(),
            SymbolState::seeded(dec!(605.50), dec!(50000000)),
        );
        prices.insert(
            "AAPL".to_string(),
            SymbolState::seeded(dec!(232.80), dec!(40000000)),
        );

        Self {
            prices: RwLock::new(prices),
        }
    }

    /// 알려지지 않은 심볼에 대해 동적으로 시세 상태 생성.
    fn entry_or_seed<'a>(
        prices: &'a mut HashMap<String, SymbolState>,
        symbol: &str,
    ) -> &'a mut SymbolState {
        prices.entry(symbol.to_string()).or_insert_with(|| {
            // 심볼 패턴에 따라 적절한 기본 가격 설정
            let base_price = if symbol.chars().all(|c| c.is_ascii_digit()) {
                // 6자리 숫자 = 한국 주식
                dec!(50000)
            } else if symbol.len() <= 5 && symbol.chars().all(|c| c.is_ascii_uppercase()) {
                // 미국 주식/ETF
                dec!(150)
            } else {
                dec!(100)
            };

            info!(symbol = %symbol, base_price = %base_price, "Created dynamic price for new symbol");
            SymbolState::seeded(base_price, dec!(1000000))
        })
    }

    /// 랜덤 워크 한 스텝을 적용하고 현재 틱을 반환합니다.
    fn advance(symbol: &str, state: &mut SymbolState) -> PriceTick {
        let mut rng = rand::thread_rng();

        // 랜덤 가격 변동 (-0.5% ~ +0.5%)
        let change_pct = rng.gen_range(-0.005..=0.005);
        let change = state.current_price * Decimal::try_from(change_pct).unwrap_or(dec!(0));
        state.current_price += change;

        // 거래량 랜덤 추가
        let volume_growth = Decimal::try_from(rng.gen_range(0.0..0.001)).unwrap_or(dec!(0));
        state.volume_24h += state.volume_24h * volume_growth;

        let change_24h = if state.base_price.is_zero() {
            Decimal::ZERO
        } else {
            (state.current_price - state.base_price) / state.base_price * dec!(100)
        };

        PriceTick::new(symbol, state.current_price)
            .with_change_24h(change_24h)
            .with_volume_24h(state.volume_24h)
    }
}

impl Default for SimulatedMarket {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataProvider for SimulatedMarket {
    async fn price(&self, symbol: &str) -> PulseResult<PriceTick> {
        let mut prices = self.prices.write().await;
        let state = Self::entry_or_seed(&mut prices, symbol);
        Ok(Self::advance(symbol, state))
    }

    async fn symbols(&self) -> Vec<String> {
        self.prices.read().await.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seeded_symbols() {
        let market = SimulatedMarket::new();
        let symbols = market.symbols().await;

        assert!(symbols.contains(&"BTC".to_string()));
        assert!(symbols.contains(&"SPY".to_string()));
        assert_eq!(symbols.len(), 5);
    }

    #[tokio::test]
    async fn test_price_walk_is_bounded() {
        let market = SimulatedMarket::new();
        let original = dec!(105000);

        let mut last = original;
        for _ in 0..10 {
            last = market.price("BTC").await.unwrap().price;
        }

        // 스텝당 ±0.5%, 10 스텝이면 ±6% 이내
        let change_ratio = (last - original) / original;
        assert!(change_ratio > dec!(-0.06) && change_ratio < dec!(0.06));
    }

    #[tokio::test]
    async fn test_change_24h_derived_from_base() {
        let market = SimulatedMarket::new();

        // 동적 생성 심볼은 기본가 150에서 시작
        let tick = market.price("NEWCO").await.unwrap();
        let expected = (tick.price - dec!(150)) / dec!(150) * dec!(100);

        assert_eq!(tick.change_24h, expected);
    }

    #[tokio::test]
    async fn test_unknown_symbol_created_dynamically() {
        let market = SimulatedMarket::new();

        let tick = market.price("005930").await.unwrap();
        assert!(tick.price > dec!(0));
        assert!(market.symbols().await.contains(&"005930".to_string()));
    }
}
