//! # Pulse Client
//!
//! 클라이언트 측 연결 멀티플렉서를 제공합니다.
//!
//! 무제한의 논리 구독자가 물리 연결 하나를 공유합니다:
//! - 구독자별 타입화된 이벤트 채널 (최근 상태 재생 후 라이브 전달)
//! - 첫 구독자 등록 시 연결, 마지막 구독자 해제 시 연결 종료
//! - 지수 백오프 기반 재연결 상태 머신 (한도 초과 시 종단 상태)
//! - 재연결 후 구독/인증 복원
//!
//! 전송 계층은 [`TransportFactory`]로 주입되므로 테스트에서 가짜
//! 전송으로 대체할 수 있고, 독립 인스턴스가 공존할 수 있습니다.

pub mod config;
pub mod events;
pub mod multiplexer;
pub mod state;
pub mod transport;

pub use config::MultiplexerConfig;
pub use events::SubscriberEvent;
pub use multiplexer::{ConnectionMultiplexer, Interests};
pub use state::ConnectionState;
pub use transport::{Transport, TransportEvent, TransportFactory, WsTransportFactory};
