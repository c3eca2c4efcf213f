//! 포트폴리오 평가 타입.
//!
//! 평가 루프가 매 주기 저장된 보유 수량 × 최신 시세로 재계산하는
//! 파생 값들입니다. 스냅샷은 직접 수정되지 않고 항상 교체됩니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 평가 완료된 보유 자산.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    /// 심볼
    pub symbol: String,
    /// 보유 수량
    pub quantity: Decimal,
    /// 평균 매수가
    pub avg_price: Decimal,
    /// 현재 가격
    pub current_price: Decimal,
    /// 평가 금액 (수량 × 현재 가격)
    pub current_value: Decimal,
    /// 평가 손익
    pub profit_loss: Decimal,
    /// 평가 손익률(%)
    pub profit_loss_percent: Decimal,
}

impl Holding {
    /// 수량/평단가/현재가로 평가된 보유 자산을 생성합니다.
    pub fn priced(
        symbol: impl Into<String>,
        quantity: Decimal,
        avg_price: Decimal,
        current_price: Decimal,
    ) -> Self {
        let current_value = quantity * current_price;
        let cost_basis = quantity * avg_price;
        let profit_loss = current_value - cost_basis;
        let profit_loss_percent = if cost_basis.is_zero() {
            Decimal::ZERO
        } else {
            profit_loss / cost_basis * Decimal::from(100)
        };

        Self {
            symbol: symbol.into(),
            quantity,
            avg_price,
            current_price,
            current_value,
            profit_loss,
            profit_loss_percent,
        }
    }
}

/// 포트폴리오 평가 스냅샷.
///
/// `total_value`는 항상 같은 주기에 계산된 `holdings`의
/// `current_value` 합계입니다 (주기 간 부분 혼합 없음).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    /// 소유 사용자 ID
    pub user_id: String,
    /// 포트폴리오 ID
    pub portfolio_id: String,
    /// 총 평가 금액
    pub total_value: Decimal,
    /// 직전 평가 대비 변동
    pub change: Decimal,
    /// 직전 평가 대비 변동률(%)
    pub change_percent: Decimal,
    /// 평가된 보유 자산 목록
    pub holdings: Vec<Holding>,
    /// 계산 시각
    pub computed_at: DateTime<Utc>,
}

impl PortfolioSnapshot {
    /// 평가된 보유 자산 목록에서 스냅샷을 생성합니다.
    ///
    /// `previous_value`가 있으면 직전 평가 대비 변동/변동률이 채워집니다.
    pub fn from_holdings(
        user_id: impl Into<String>,
        portfolio_id: impl Into<String>,
        holdings: Vec<Holding>,
        previous_value: Option<Decimal>,
    ) -> Self {
        let total_value: Decimal = holdings.iter().map(|h| h.current_value).sum();

        let (change, change_percent) = match previous_value {
            Some(prev) if !prev.is_zero() => {
                let change = total_value - prev;
                (change, change / prev * Decimal::from(100))
            }
            Some(prev) => (total_value - prev, Decimal::ZERO),
            None => (Decimal::ZERO, Decimal::ZERO),
        };

        Self {
            user_id: user_id.into(),
            portfolio_id: portfolio_id.into(),
            total_value,
            change,
            change_percent,
            holdings,
            computed_at: Utc::now(),
        }
    }

    /// 변동률 절대값이 임계치(%)를 초과하는지 확인합니다.
    pub fn is_significant_change(&self, threshold_percent: Decimal) -> bool {
        self.change_percent.abs() > threshold_percent
    }

    /// 총 평가 손익을 반환합니다.
    pub fn total_profit_loss(&self) -> Decimal {
        self.holdings.iter().map(|h| h.profit_loss).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_holding_pricing() {
        let holding = Holding::priced("BTC", dec!(1), dec!(20000), dec!(25000));

        assert_eq!(holding.current_value, dec!(25000));
        assert_eq!(holding.profit_loss, dec!(5000));
        assert_eq!(holding.profit_loss_percent, dec!(25));
    }

    #[test]
    fn test_holding_pricing_zero_cost_basis() {
        let holding = Holding::priced("AIR", dec!(0), dec!(0), dec!(100));

        assert_eq!(holding.current_value, dec!(0));
        assert_eq!(holding.profit_loss_percent, dec!(0));
    }

    #[test]
    fn test_snapshot_total_is_sum_of_holdings() {
        let holdings = vec![
            Holding::priced("BTC", dec!(1), dec!(20000), dec!(25000)),
            Holding::priced("ETH", dec!(10), dec!(2000), dec!(3000)),
        ];
        let snapshot = PortfolioSnapshot::from_holdings("user_1", "pf_1", holdings, None);

        assert_eq!(snapshot.total_value, dec!(55000));
        assert_eq!(snapshot.total_profit_loss(), dec!(15000));
        assert_eq!(snapshot.change, dec!(0));
    }

    #[test]
    fn test_snapshot_change_vs_previous() {
        let holdings = vec![Holding::priced("BTC", dec!(1), dec!(20000), dec!(25000))];
        let snapshot =
            PortfolioSnapshot::from_holdings("user_1", "pf_1", holdings, Some(dec!(20000)));

        assert_eq!(snapshot.change, dec!(5000));
        assert_eq!(snapshot.change_percent, dec!(25));
        assert!(snapshot.is_significant_change(dec!(1)));
        assert!(!snapshot.is_significant_change(dec!(30)));
    }
}
