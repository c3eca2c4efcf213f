//! 외부 협력자 인터페이스.
//!
//! 배포 계층이 소비하는 시장 데이터/저장소 추상화입니다. 실제 구현은
//! 서버 크레이트(인메모리 저장소, 시뮬레이션 시세)나 상위 계층이
//! 제공합니다.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{CriticalAlert, PortfolioSnapshot, PriceTick, User};
use crate::error::PulseResult;

/// 시장 데이터 접근자.
///
/// 업스트림 시세 소스를 "심볼의 현재 가격 조회" 능력으로만 소비합니다.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// 심볼의 현재 시세 틱을 조회합니다.
    async fn price(&self, symbol: &str) -> PulseResult<PriceTick>;

    /// 제공 중인 심볼 목록을 반환합니다.
    async fn symbols(&self) -> Vec<String>;
}

/// 저장된 보유 수량 (평가 전).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredHolding {
    /// 심볼
    pub symbol: String,
    /// 보유 수량
    pub quantity: Decimal,
    /// 평균 매수가
    pub avg_price: Decimal,
}

impl StoredHolding {
    /// 새 보유 수량을 생성합니다.
    pub fn new(symbol: impl Into<String>, quantity: Decimal, avg_price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            avg_price,
        }
    }
}

/// 포트폴리오 메타 정보.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    /// 포트폴리오 ID
    pub id: String,
    /// 소유 사용자 ID
    pub user_id: String,
    /// 표시 이름
    pub name: String,
}

/// 포트폴리오 저장소.
#[async_trait]
pub trait PortfolioStore: Send + Sync {
    /// 사용자의 포트폴리오 목록을 조회합니다.
    async fn portfolios_for(&self, user_id: &str) -> PulseResult<Vec<Portfolio>>;

    /// 포트폴리오의 보유 수량 목록을 조회합니다.
    async fn holdings(&self, portfolio_id: &str) -> PulseResult<Vec<StoredHolding>>;

    /// 평가 결과를 기록합니다.
    ///
    /// 호출 측(평가 루프)이 유의미한 변동일 때만 호출합니다.
    async fn record_valuation(&self, snapshot: &PortfolioSnapshot) -> PulseResult<()>;
}

/// 사용자 저장소.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// 활성 사용자 목록을 조회합니다.
    async fn active_users(&self) -> PulseResult<Vec<User>>;
}

/// 보안 알림 로그 저장소 (append-only).
#[async_trait]
pub trait AlertStore: Send + Sync {
    /// 알림을 로그에 추가합니다.
    async fn append(&self, alert: &CriticalAlert) -> PulseResult<()>;

    /// 최근 알림을 최신순으로 조회합니다.
    async fn recent(&self, limit: usize) -> PulseResult<Vec<CriticalAlert>>;
}
