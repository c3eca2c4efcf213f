//! 인메모리 저장소.
//!
//! `PortfolioStore` / `UserStore` / `AlertStore` 트레이트의 단일 구현입니다.
//! 데모 데이터를 시드해 외부 DB 없이 배포 계층을 단독 실행할 수 있습니다.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use rust_decimal_macros::dec;
use tokio::sync::RwLock;
use tracing::debug;

use pulse_core::{
    AlertStore, CriticalAlert, Portfolio, PortfolioSnapshot, PortfolioStore, PulseError,
    PulseResult, StoredHolding, User, UserStore,
};

/// 평가/경보 이력의 최대 보존 건수.
const MAX_HISTORY_SIZE: usize = 1000;

/// 인메모리 저장소.
///
/// 모든 컬렉션은 `RwLock` 뒤에 있으며 잠금 구간에서 await하지 않습니다.
/// 평가 스냅샷과 경보 이력은 최근 `MAX_HISTORY_SIZE`건만 유지하고
/// 초과분은 가장 오래된 항목부터 버립니다.
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<Vec<User>>,
    portfolios: RwLock<HashMap<String, Portfolio>>,
    holdings: RwLock<HashMap<String, Vec<StoredHolding>>>,
    valuations: RwLock<VecDeque<PortfolioSnapshot>>,
    alerts: RwLock<VecDeque<CriticalAlert>>,
}

impl MemoryStore {
    /// 빈 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 데모 사용자/포트폴리오가 시드된 저장소를 생성합니다.
    pub async fn with_demo_data() -> Self {
        let store = Self::new();

        store
            .add_user(User::new("user_alice", "Alice Kim"))
            .await;
        store.add_user(User::new("user_bob", "Bob Lee")).await;
        store
            .add_user(User::new("admin_ops", "Operations").admin())
            .await;

        store
            .add_portfolio(
                Portfolio {
                    id: "pf_alice_main".to_string(),
                    user_id: "user_alice".to_string(),
                    name: "Main".to_string(),
                },
                vec![
                    StoredHolding::new("BTC", dec!(0.5), dec!(60000)),
                    StoredHolding::new("ETH", dec!(4), dec!(2800)),
                    StoredHolding::new("AAPL", dec!(10), dec!(180)),
                ],
            )
            .await;

        store
            .add_portfolio(
                Portfolio {
                    id: "pf_bob_main".to_string(),
                    user_id: "user_bob".to_string(),
                    name: "Main".to_string(),
                },
                vec![
                    StoredHolding::new("BTC", dec!(0.1), dec!(95000)),
                    StoredHolding::new("SPY", dec!(20), dec!(590)),
                ],
            )
            .await;

        store
            .add_portfolio(
                Portfolio {
                    id: "pf_bob_growth".to_string(),
                    user_id: "user_bob".to_string(),
                    name: "Growth".to_string(),
                },
                vec![StoredHolding::new("SOL", dec!(30), dec!(150))],
            )
            .await;

        store
    }

    /// 사용자를 추가합니다.
    pub async fn add_user(&self, user: User) {
        self.users.write().await.push(user);
    }

    /// 포트폴리오와 보유 수량을 추가합니다.
    pub async fn add_portfolio(&self, portfolio: Portfolio, holdings: Vec<StoredHolding>) {
        let id = portfolio.id.clone();
        self.portfolios
            .write()
            .await
            .insert(id.clone(), portfolio);
        self.holdings.write().await.insert(id, holdings);
    }

    /// 기록된 평가 스냅샷 수를 반환합니다.
    pub async fn valuation_count(&self) -> usize {
        self.valuations.read().await.len()
    }

    /// 기록된 평가 스냅샷 목록을 반환합니다 (기록 순).
    pub async fn valuations(&self) -> Vec<PortfolioSnapshot> {
        self.valuations.read().await.iter().cloned().collect()
    }
}

#[async_trait]
impl PortfolioStore for MemoryStore {
    async fn portfolios_for(&self, user_id: &str) -> PulseResult<Vec<Portfolio>> {
        let portfolios = self.portfolios.read().await;
        Ok(portfolios
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn holdings(&self, portfolio_id: &str) -> PulseResult<Vec<StoredHolding>> {
        let holdings = self.holdings.read().await;
        holdings
            .get(portfolio_id)
            .cloned()
            .ok_or_else(|| PulseError::NotFound(format!("portfolio: {}", portfolio_id)))
    }

    async fn record_valuation(&self, snapshot: &PortfolioSnapshot) -> PulseResult<()> {
        debug!(
            portfolio_id = %snapshot.portfolio_id,
            total_value = %snapshot.total_value,
            change_percent = %snapshot.change_percent,
            "Valuation persisted"
        );
        let mut valuations = self.valuations.write().await;
        if valuations.len() >= MAX_HISTORY_SIZE {
            valuations.pop_front();
        }
        valuations.push_back(snapshot.clone());
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn active_users(&self) -> PulseResult<Vec<User>> {
        Ok(self.users.read().await.clone())
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn append(&self, alert: &CriticalAlert) -> PulseResult<()> {
        let mut alerts = self.alerts.write().await;
        if alerts.len() >= MAX_HISTORY_SIZE {
            alerts.pop_front();
        }
        alerts.push_back(alert.clone());
        Ok(())
    }

    async fn recent(&self, limit: usize) -> PulseResult<Vec<CriticalAlert>> {
        let alerts = self.alerts.read().await;
        let mut recent: Vec<CriticalAlert> = alerts.iter().cloned().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(limit);
        Ok(recent)
    }
}
