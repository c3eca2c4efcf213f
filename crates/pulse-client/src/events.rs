//! 구독자 이벤트 타입.

use pulse_core::PriceTick;
use serde_json::Value;

use crate::state::ConnectionState;

/// 구독자에게 전달되는 타입화된 이벤트.
///
/// 콜백 묶음 대신 구독자별 mpsc 채널로 전달됩니다. 구독 직후에는
/// 관심 키의 최근 캐시 값과 현재 연결 상태가 먼저 재생됩니다.
#[derive(Debug, Clone)]
pub enum SubscriberEvent {
    /// 시세 업데이트 (캐시 재생 포함)
    Price(PriceTick),
    /// 채널 데이터 (스냅샷 또는 브로드캐스트)
    Channel {
        /// 채널 이름
        channel: String,
        /// 페이로드
        data: Value,
        /// 서버 타임스탬프 (epoch 밀리초)
        timestamp: i64,
    },
    /// 연결 상태 변경
    ConnectionChanged(ConnectionState),
    /// 종단 연결 에러 (재연결 한도 초과 시 1회 전달)
    ConnectionError(String),
}

impl SubscriberEvent {
    /// 시세 이벤트인지 확인합니다.
    pub fn is_price(&self) -> bool {
        matches!(self, Self::Price(_))
    }

    /// 연결 관련 이벤트인지 확인합니다.
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::ConnectionChanged(_) | Self::ConnectionError(_))
    }
}
