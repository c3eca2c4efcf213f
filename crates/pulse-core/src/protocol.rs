//! 와이어 프로토콜 메시지.
//!
//! 클라이언트-서버 간 교환되는 JSON 메시지와 SSE 프레임 정의.
//! 모든 메시지는 `type` 필드로 구분됩니다.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::PriceTick;
use crate::error::{PulseError, PulseResult};

/// 정상 종료 코드. 이 코드로 닫힌 연결은 재연결하지 않습니다.
pub const CLOSE_NORMAL: u16 = 1000;

// ==================== 클라이언트 → 서버 메시지 ====================

/// 클라이언트에서 서버로 보내는 메시지.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// 심볼/채널 구독
    Subscribe {
        /// 구독할 심볼 목록
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        symbols: Vec<String>,
        /// 구독할 채널 목록
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        channels: Vec<String>,
    },
    /// 심볼/채널 구독 해제
    Unsubscribe {
        /// 구독 해제할 심볼 목록
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        symbols: Vec<String>,
        /// 구독 해제할 채널 목록
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        channels: Vec<String>,
    },
    /// 관리자 인증
    Authenticate {
        /// 주체 ID
        principal_id: String,
        /// 요청 권한 목록
        #[serde(default)]
        permissions: Vec<String>,
        /// 검증용 토큰 (있으면 서명 검증)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },
    /// 핑 (연결 유지)
    Ping,
}

impl ClientMessage {
    /// JSON 문자열에서 파싱.
    pub fn from_json(json: &str) -> PulseResult<Self> {
        serde_json::from_str(json).map_err(|e| PulseError::Protocol(e.to_string()))
    }

    /// JSON 문자열로 직렬화.
    pub fn to_json(&self) -> PulseResult<String> {
        serde_json::to_string(self).map_err(PulseError::from)
    }

    /// 심볼 구독 메시지 생성 헬퍼.
    pub fn subscribe_symbols(symbols: Vec<String>) -> Self {
        ClientMessage::Subscribe {
            symbols,
            channels: Vec::new(),
        }
    }

    /// 채널 구독 메시지 생성 헬퍼.
    pub fn subscribe_channels(channels: Vec<String>) -> Self {
        ClientMessage::Subscribe {
            symbols: Vec::new(),
            channels,
        }
    }
}

// ==================== 서버 → 클라이언트 메시지 ====================

/// 서버에서 클라이언트로 보내는 메시지.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// 연결 수립 알림
    Connection {
        /// 환영 메시지
        message: String,
        /// 서버 버전
        version: String,
        /// 서버 타임스탬프
        timestamp: i64,
    },
    /// 인증 결과 (성공)
    Authenticated {
        /// 인증된 주체 ID
        principal_id: String,
        /// 서버 타임스탬프
        timestamp: i64,
    },
    /// 구독 확인
    Subscribed {
        /// 구독된 심볼 목록
        #[serde(default)]
        symbols: Vec<String>,
        /// 구독된 채널 목록
        #[serde(default)]
        channels: Vec<String>,
    },
    /// 구독 해제 확인
    Unsubscribed {
        /// 구독 해제된 심볼 목록
        #[serde(default)]
        symbols: Vec<String>,
        /// 구독 해제된 채널 목록
        #[serde(default)]
        channels: Vec<String>,
    },
    /// 에러
    Error {
        /// 에러 코드
        code: String,
        /// 에러 메시지
        message: String,
    },
    /// 시세 업데이트
    PriceUpdate(PriceTick),
    /// 채널 스냅샷 데이터 (구독 직후 단건 전달)
    ChannelData {
        /// 채널 이름
        channel: String,
        /// 페이로드
        data: Value,
        /// 서버 타임스탬프
        timestamp: i64,
    },
    /// 채널 브로드캐스트
    Broadcast {
        /// 채널 이름
        channel: String,
        /// 페이로드
        data: Value,
        /// 서버 타임스탬프
        timestamp: i64,
    },
    /// 퐁 응답
    Pong {
        /// 서버 타임스탬프
        timestamp: i64,
    },
}

impl ServerMessage {
    /// JSON 문자열로 직렬화.
    pub fn to_json(&self) -> PulseResult<String> {
        serde_json::to_string(self).map_err(PulseError::from)
    }

    /// JSON 문자열에서 파싱.
    pub fn from_json(json: &str) -> PulseResult<Self> {
        serde_json::from_str(json).map_err(|e| PulseError::Protocol(e.to_string()))
    }

    /// 에러 메시지 생성 헬퍼.
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// 채널 브로드캐스트 생성 헬퍼.
    pub fn broadcast(channel: impl Into<String>, data: Value) -> Self {
        ServerMessage::Broadcast {
            channel: channel.into(),
            data,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// 채널 스냅샷 생성 헬퍼.
    pub fn channel_data(channel: impl Into<String>, data: Value) -> Self {
        ServerMessage::ChannelData {
            channel: channel.into(),
            data,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

// ==================== SSE 스트림 이벤트 ====================

/// SSE 스트림 이벤트.
///
/// `text/event-stream` 프레임 한 건의 페이로드입니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamEvent {
    /// 이벤트 유형 (예: "portfolio_update", "critical_alert")
    #[serde(rename = "type")]
    pub event_type: String,
    /// 페이로드
    pub data: Value,
    /// 타임스탬프 (epoch 밀리초)
    pub timestamp: i64,
}

impl StreamEvent {
    /// 현재 시각의 새 스트림 이벤트를 생성합니다.
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// `data: {...}\n\n` 형식의 와이어 프레임으로 직렬화합니다.
    ///
    /// serde_json은 개행을 이스케이프하므로 프레임은 항상 한 줄입니다.
    pub fn to_frame(&self) -> PulseResult<String> {
        let json = serde_json::to_string(self)?;
        Ok(format!("data: {}\n\n", json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_client_subscribe_with_symbols() {
        let json = r#"{"type": "subscribe", "symbols": ["BTC", "ETH"]}"#;
        let msg = ClientMessage::from_json(json).unwrap();

        match msg {
            ClientMessage::Subscribe { symbols, channels } => {
                assert_eq!(symbols, vec!["BTC", "ETH"]);
                assert!(channels.is_empty());
            }
            _ => panic!("Expected Subscribe message"),
        }
    }

    #[test]
    fn test_client_authenticate() {
        let json = r#"{"type": "authenticate", "principal_id": "admin_1", "permissions": ["admin"]}"#;
        let msg = ClientMessage::from_json(json).unwrap();

        match msg {
            ClientMessage::Authenticate {
                principal_id,
                permissions,
                token,
            } => {
                assert_eq!(principal_id, "admin_1");
                assert_eq!(permissions, vec!["admin"]);
                assert!(token.is_none());
            }
            _ => panic!("Expected Authenticate message"),
        }
    }

    #[test]
    fn test_client_message_rejects_unknown_type() {
        let result = ClientMessage::from_json(r#"{"type": "shutdown"}"#);
        assert!(matches!(result, Err(PulseError::Protocol(_))));
    }

    #[test]
    fn test_price_update_wire_format() {
        let tick = PriceTick::new("BTC", dec!(105000))
            .with_change_24h(dec!(1.2))
            .with_timestamp(1_700_000_000_000);
        let json = ServerMessage::PriceUpdate(tick).to_json().unwrap();

        assert!(json.contains("\"type\":\"price_update\""));
        assert!(json.contains("\"symbol\":\"BTC\""));
        assert!(json.contains("\"timestamp\":1700000000000"));
    }

    #[test]
    fn test_server_message_roundtrip() {
        let msg = ServerMessage::broadcast("security_alerts", serde_json::json!({"level": 3}));
        let parsed = ServerMessage::from_json(&msg.to_json().unwrap()).unwrap();

        match parsed {
            ServerMessage::Broadcast { channel, data, .. } => {
                assert_eq!(channel, "security_alerts");
                assert_eq!(data["level"], 3);
            }
            _ => panic!("Expected Broadcast message"),
        }
    }

    #[test]
    fn test_server_error_helper() {
        let json = ServerMessage::error("AUTH_REQUIRED", "Authenticate first")
            .to_json()
            .unwrap();

        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("AUTH_REQUIRED"));
    }

    #[test]
    fn test_stream_event_frame_format() {
        let event = StreamEvent::new("metrics_update", serde_json::json!({"cpu": 42.5}));
        let frame = event.to_frame().unwrap();

        assert!(frame.starts_with("data: {"));
        assert!(frame.ends_with("}\n\n"));
        // 페이로드는 반드시 한 줄이어야 함
        assert_eq!(frame.trim_end().lines().count(), 1);
        assert!(frame.contains("\"type\":\"metrics_update\""));
    }
}
