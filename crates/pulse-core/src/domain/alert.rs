//! 크리티컬 알림 타입.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 알림 심각도.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    /// 낮음
    Low,
    /// 보통
    Medium,
    /// 높음
    High,
    /// 치명적
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// 보안/운영 크리티컬 알림.
///
/// 한 번 저장되는 append-only 로그 항목이자 라이브 브로드캐스트
/// 이벤트입니다. 연결된 관찰자에게는 여러 번 전달될 수 있습니다
/// (at-least-once).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalAlert {
    /// 알림 ID
    pub id: Uuid,
    /// 알림 유형 (예: "large_withdrawal", "suspicious_activity")
    pub alert_type: String,
    /// 심각도
    pub severity: AlertSeverity,
    /// 대상 사용자 ID (시스템 전역 알림이면 None)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// 알림 메시지
    pub message: String,
    /// 추가 데이터
    #[serde(default)]
    pub data: serde_json::Value,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
}

impl CriticalAlert {
    /// 새 크리티컬 알림을 생성합니다.
    pub fn new(
        alert_type: impl Into<String>,
        severity: AlertSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            alert_type: alert_type.into(),
            severity,
            user_id: None,
            message: message.into(),
            data: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    /// 대상 사용자 설정.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// 추가 데이터 설정.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}
