//! 푸시 스트림 레지스트리.
//!
//! 인증된 주체별 장수명 HTTP 푸시(SSE) 스트림 핸들을 관리합니다.
//! 주체당 하나의 항목을 유지하며, 관리자 스트림은 `admin_` 접두사로
//! 구분합니다. 레지스트리가 송신 핸들을 독점 소유하고 SSE 응답이
//! 수신 핸들을 가져갑니다.
//!
//! 수신 측이 사라진 스트림은 다음 쓰기 시점에 레지스트리에서
//! 제거됩니다 (자가 치유, 명시적 close 콜백 없음).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use pulse_core::StreamEvent;

use crate::metrics;

/// 스트림별 이벤트 버퍼 기본 용량.
pub const DEFAULT_STREAM_CAPACITY: usize = 32;

/// 관리자 스트림 키 접두사.
const ADMIN_PREFIX: &str = "admin_";

/// 푸시 스트림 레지스트리.
pub struct StreamRegistry {
    streams: RwLock<HashMap<String, mpsc::Sender<StreamEvent>>>,
    capacity: usize,
}

impl StreamRegistry {
    /// 스트림 버퍼 용량을 지정해 생성합니다.
    pub fn new(capacity: usize) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn key_for(principal_id: &str, is_admin: bool) -> String {
        if is_admin {
            format!("{}{}", ADMIN_PREFIX, principal_id)
        } else {
            principal_id.to_string()
        }
    }

    /// 주체의 스트림을 등록하고 수신 핸들을 반환합니다.
    ///
    /// 같은 주체의 기존 스트림이 있으면 대체됩니다. 기존 스트림의
    /// 송신 핸들이 드롭되므로 이전 SSE 응답은 스스로 종료됩니다.
    /// 새 스트림의 첫 이벤트는 `connected` 알림입니다.
    pub async fn register(
        &self,
        principal_id: &str,
        is_admin: bool,
    ) -> mpsc::Receiver<StreamEvent> {
        let key = Self::key_for(principal_id, is_admin);
        let (tx, rx) = mpsc::channel(self.capacity);

        let connected = StreamEvent::new(
            "connected",
            serde_json::json!({ "principal_id": principal_id, "admin": is_admin }),
        );
        let _ = tx.try_send(connected);

        let mut streams = self.streams.write().await;
        if streams.insert(key.clone(), tx).is_some() {
            debug!(key = %key, "Replaced existing push stream");
        }
        metrics::set_sse_streams(streams.len() as f64);

        rx
    }

    /// 특정 사용자 스트림으로 이벤트를 보냅니다.
    ///
    /// # Returns
    ///
    /// 전달되었으면 `true`. 수신 측이 사라진 항목은 제거됩니다.
    pub async fn send_to_user(&self, user_id: &str, event: StreamEvent) -> bool {
        let mut streams = self.streams.write().await;
        let Some(tx) = streams.get(user_id) else {
            return false;
        };

        match tx.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                // 느린 소비자: 이번 이벤트만 건너뜀 (완전성보다 신선도)
                debug!(key = %user_id, "Stream buffer full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                streams.remove(user_id);
                metrics::set_sse_streams(streams.len() as f64);
                debug!(key = %user_id, "Removed dead push stream");
                false
            }
        }
    }

    /// 등록된 모든 스트림으로 이벤트를 브로드캐스트합니다.
    ///
    /// # Returns
    ///
    /// 전달된 스트림 수
    pub async fn broadcast(&self, event: StreamEvent) -> usize {
        self.fan_out(event, |_| true).await
    }

    /// 관리자 스트림(`admin_` 접두사)에만 브로드캐스트합니다.
    pub async fn broadcast_to_admins(&self, event: StreamEvent) -> usize {
        self.fan_out(event, |key| key.starts_with(ADMIN_PREFIX)).await
    }

    async fn fan_out(&self, event: StreamEvent, filter: impl Fn(&str) -> bool) -> usize {
        let mut streams = self.streams.write().await;
        let mut delivered = 0;
        let mut dead = Vec::new();

        for (key, tx) in streams.iter() {
            if !filter(key) {
                continue;
            }
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(key = %key, "Stream buffer full, dropping event");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.push(key.clone());
                }
            }
        }

        if !dead.is_empty() {
            for key in &dead {
                streams.remove(key);
                debug!(key = %key, "Removed dead push stream");
            }
            metrics::set_sse_streams(streams.len() as f64);
        }

        delivered
    }

    /// 등록된 스트림 수.
    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }

    /// 등록된 관리자 스트림 수.
    pub async fn admin_count(&self) -> usize {
        self.streams
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(ADMIN_PREFIX))
            .count()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_CAPACITY)
    }
}

/// 공유 가능한 레지스트리 타입.
pub type SharedStreamRegistry = Arc<StreamRegistry>;

/// 새로운 공유 레지스트리 생성.
pub fn create_stream_registry(capacity: usize) -> SharedStreamRegistry {
    Arc::new(StreamRegistry::new(capacity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn next_of_type(
        rx: &mut mpsc::Receiver<StreamEvent>,
        event_type: &str,
    ) -> Option<StreamEvent> {
        while let Ok(event) = rx.try_recv() {
            if event.event_type == event_type {
                return Some(event);
            }
        }
        None
    }

    #[tokio::test]
    async fn test_register_sends_connected_event() {
        let registry = StreamRegistry::default();
        let mut rx = registry.register("user_1", false).await;

        let event = rx.try_recv().unwrap();
        assert_eq!(event.event_type, "connected");
        assert_eq!(event.data["principal_id"], "user_1");
        assert_eq!(registry.stream_count().await, 1);
    }

    #[tokio::test]
    async fn test_send_to_user_targets_single_stream() {
        let registry = StreamRegistry::default();
        let mut rx_1 = registry.register("user_1", false).await;
        let mut rx_2 = registry.register("user_2", false).await;

        let delivered = registry
            .send_to_user("user_1", StreamEvent::new("portfolio_update", json!({"v": 1})))
            .await;

        assert!(delivered);
        assert!(next_of_type(&mut rx_1, "portfolio_update").await.is_some());
        assert!(next_of_type(&mut rx_2, "portfolio_update").await.is_none());
    }

    #[tokio::test]
    async fn test_admin_broadcast_only_hits_admin_streams() {
        let registry = StreamRegistry::default();
        let mut user_rx = registry.register("user_1", false).await;
        let mut admin_rx = registry.register("ops", true).await;

        let delivered = registry
            .broadcast_to_admins(StreamEvent::new("metrics_update", json!({"cpu": 42})))
            .await;

        assert_eq!(delivered, 1);
        assert_eq!(registry.admin_count().await, 1);
        assert!(next_of_type(&mut admin_rx, "metrics_update").await.is_some());
        assert!(next_of_type(&mut user_rx, "metrics_update").await.is_none());
    }

    #[tokio::test]
    async fn test_dead_stream_removed_on_write() {
        let registry = StreamRegistry::default();
        let rx = registry.register("user_1", false).await;
        let _rx_2 = registry.register("user_2", false).await;
        assert_eq!(registry.stream_count().await, 2);

        // 클라이언트 연결 종료를 흉내
        drop(rx);

        let delivered = registry
            .broadcast(StreamEvent::new("metrics_update", json!({})))
            .await;

        assert_eq!(delivered, 1);
        assert_eq!(registry.stream_count().await, 1);

        // 개별 전송 경로도 자가 치유됨
        let delivered = registry
            .send_to_user("user_1", StreamEvent::new("portfolio_update", json!({})))
            .await;
        assert!(!delivered);
    }

    #[tokio::test]
    async fn test_reregister_replaces_previous_stream() {
        let registry = StreamRegistry::default();
        let mut old_rx = registry.register("user_1", false).await;
        let _new_rx = registry.register("user_1", false).await;

        assert_eq!(registry.stream_count().await, 1);

        // 기존 스트림의 송신 핸들이 드롭되어 종료 신호를 받음
        old_rx.try_recv().ok(); // connected 이벤트 소비
        assert!(matches!(
            old_rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_full_buffer_skips_without_removing() {
        let registry = StreamRegistry::new(1);
        let _rx = registry.register("user_1", false).await;

        // connected 이벤트가 버퍼를 채움
        let delivered = registry
            .send_to_user("user_1", StreamEvent::new("portfolio_update", json!({})))
            .await;

        assert!(!delivered);
        // 항목은 유지됨
        assert_eq!(registry.stream_count().await, 1);
    }
}
