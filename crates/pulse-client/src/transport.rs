//! 전송 계층 추상화 및 WebSocket 구현.
//!
//! 멀티플렉서는 [`TransportFactory`]를 통해서만 연결을 생성하므로
//! 테스트에서 가짜 전송으로 대체할 수 있습니다.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use pulse_core::{PulseError, PulseResult};

/// 전송 계층 인바운드 이벤트.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// 텍스트 프레임 수신
    Text(String),
    /// 연결 종료 (종료 코드 포함, 코드 없는 종료는 None)
    Closed(Option<u16>),
    /// 전송 에러
    Error(String),
}

/// 물리 전송 연결.
///
/// 구현체는 한 번에 하나의 소유자(멀티플렉서 태스크)만 가집니다.
#[async_trait]
pub trait Transport: Send + Sync {
    /// 텍스트 프레임을 전송합니다.
    async fn send_text(&mut self, text: String) -> PulseResult<()>;

    /// 다음 인바운드 이벤트를 수신합니다.
    ///
    /// 연결이 끝나면 `Closed`를 반환하며, 그 이후로는 호출하지 않습니다.
    async fn next_event(&mut self) -> TransportEvent;

    /// 연결을 정상 코드(1000)로 종료합니다.
    async fn close(&mut self) -> PulseResult<()>;
}

/// 전송 연결 팩토리.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// 주어진 URL로 새 연결을 생성합니다.
    async fn connect(&self, url: &str) -> PulseResult<Box<dyn Transport>>;
}

// ==================== WebSocket 구현 ====================

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// tokio-tungstenite 기반 WebSocket 전송.
struct WsTransport {
    stream: WsStream,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send_text(&mut self, text: String) -> PulseResult<()> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| PulseError::Transport(format!("send failed: {}", e)))
    }

    async fn next_event(&mut self) -> TransportEvent {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return TransportEvent::Text(text),
                Some(Ok(Message::Ping(data))) => {
                    // 서버 ping에는 즉시 pong으로 응답
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        return TransportEvent::Error(format!("pong failed: {}", e));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map(|f| u16::from(f.code));
                    debug!(?code, "WebSocket closed by peer");
                    return TransportEvent::Closed(code);
                }
                Some(Ok(_)) => {
                    // Binary/Pong/Frame은 이 프로토콜에서 사용하지 않음
                }
                Some(Err(e)) => return TransportEvent::Error(e.to_string()),
                None => return TransportEvent::Closed(None),
            }
        }
    }

    async fn close(&mut self) -> PulseResult<()> {
        self.stream
            .close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "client going away".into(),
            }))
            .await
            .map_err(|e| PulseError::Transport(format!("close failed: {}", e)))
    }
}

/// 실 서비스용 WebSocket 전송 팩토리.
#[derive(Debug, Clone, Default)]
pub struct WsTransportFactory;

#[async_trait]
impl TransportFactory for WsTransportFactory {
    async fn connect(&self, url: &str) -> PulseResult<Box<dyn Transport>> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| PulseError::Transport(format!("connect failed: {}", e)))?;

        debug!(url = %url, "WebSocket connected");
        Ok(Box::new(WsTransport { stream }))
    }
}
