//! 사용자 및 활동 이벤트 타입.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 플랫폼 사용자.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// 사용자 ID
    pub id: String,
    /// 표시 이름
    pub name: String,
    /// 관리자 여부
    #[serde(default)]
    pub is_admin: bool,
}

impl User {
    /// 새 사용자를 생성합니다.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_admin: false,
        }
    }

    /// 관리자로 표시합니다.
    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }
}

/// 트랜잭션 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// 입금
    Deposit,
    /// 출금
    Withdrawal,
    /// 거래 체결
    Trade,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deposit => write!(f, "deposit"),
            Self::Withdrawal => write!(f, "withdrawal"),
            Self::Trade => write!(f, "trade"),
        }
    }
}

/// 계정 활동 트랜잭션.
///
/// 리스크 평가의 입력 단위입니다. 디바이스 판별은 상위 계층의
/// 책임이므로 새 디바이스 여부는 플래그로 전달됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// 트랜잭션 ID
    pub id: Uuid,
    /// 사용자 ID
    pub user_id: String,
    /// 트랜잭션 유형
    pub kind: TransactionKind,
    /// 금액 (기준 통화 단위)
    pub amount: Decimal,
    /// 새 디바이스에서 발생했는지 여부
    #[serde(default)]
    pub from_new_device: bool,
    /// 발생 시각
    pub occurred_at: DateTime<Utc>,
}

impl Transaction {
    /// 현재 시각의 새 트랜잭션을 생성합니다.
    pub fn new(user_id: impl Into<String>, kind: TransactionKind, amount: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            kind,
            amount,
            from_new_device: false,
            occurred_at: Utc::now(),
        }
    }

    /// 새 디바이스 플래그 설정.
    pub fn with_new_device(mut self, from_new_device: bool) -> Self {
        self.from_new_device = from_new_device;
        self
    }

    /// 발생 시각 설정.
    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    /// 발생 시각의 UTC 시(hour)를 반환합니다.
    pub fn hour_of_day(&self) -> u32 {
        use chrono::Timelike;
        self.occurred_at.hour()
    }
}
