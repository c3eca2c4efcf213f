//! WebSocket 모듈.
//!
//! 실시간 양방향 배포: 브로드캐스트 허브와 연결 핸들러.

pub mod handler;
pub mod hub;

pub use handler::{websocket_handler, websocket_router, WsState};
pub use hub::{create_hub, BroadcastHub, SharedBroadcastHub, DEFAULT_OUTBOX_CAPACITY};
