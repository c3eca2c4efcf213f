//! Server-Sent Events 푸시 스트림.
//!
//! 사용자별/관리자별 단방향 알림 채널. WebSocket 허브와 독립적으로
//! 동작하며, 평가 루프와 경보 서비스가 이벤트를 주입합니다.

pub mod registry;
pub mod routes;

pub use registry::{
    create_stream_registry, SharedStreamRegistry, StreamRegistry, DEFAULT_STREAM_CAPACITY,
};
pub use routes::{sse_router, SseState};
