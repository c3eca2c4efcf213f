//! 브로드캐스트 허브.
//!
//! 채널↔구독자 다대다 인덱스를 관리하고 임의의 JSON 페이로드를 채널
//! 멤버에게 팬아웃합니다. 허브가 모든 클라이언트의 송신 핸들(아웃박스)을
//! 독점 소유하며, 소켓 태스크는 수신 핸들만 가집니다.
//!
//! 전달은 최선 노력(best-effort)입니다: 가득 찼거나 닫힌 아웃박스는
//! 해당 메시지에 한해 조용히 건너뜁니다. 느린 소비자가 다른 멤버의
//! 전달을 막는 일은 없습니다.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use pulse_core::{PriceTick, PulseError, PulseResult, ServerMessage};

use crate::metrics;

/// 클라이언트 아웃박스 기본 용량.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 64;

/// 허브에 등록된 클라이언트 세션.
#[derive(Debug)]
struct ClientSession {
    /// 아웃박스 송신 핸들 (허브 독점 소유)
    outbox: mpsc::Sender<ServerMessage>,
    /// 구독 중인 심볼
    symbols: HashSet<String>,
    /// 구독 중인 채널
    channels: HashSet<String>,
    /// 인증 여부
    authenticated: bool,
    /// 인증된 주체 ID
    principal_id: Option<String>,
    /// 부여된 권한 목록
    permissions: Vec<String>,
}

impl ClientSession {
    fn new(outbox: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            outbox,
            symbols: HashSet::new(),
            channels: HashSet::new(),
            authenticated: false,
            principal_id: None,
            permissions: Vec::new(),
        }
    }
}

#[derive(Default)]
struct HubInner {
    /// 세션 ID → 세션
    sessions: HashMap<String, ClientSession>,
    /// 채널 이름 → 멤버 세션 ID 집합
    channels: HashMap<String, HashSet<String>>,
    /// 채널별 마지막 브로드캐스트 페이로드 (구독 직후 스냅샷 전달용)
    channel_snapshots: HashMap<String, Value>,
    /// 심볼별 마지막 시세 틱
    price_cache: HashMap<String, PriceTick>,
}

/// 브로드캐스트 허브.
///
/// 모든 공유 상태는 하나의 `RwLock` 뒤에 있으며, 잠금 구간에서
/// await하지 않습니다 (`try_send`는 동기 호출).
pub struct BroadcastHub {
    inner: RwLock<HubInner>,
    outbox_capacity: usize,
}

impl BroadcastHub {
    /// 아웃박스 용량을 지정해 허브를 생성합니다.
    pub fn new(outbox_capacity: usize) -> Self {
        Self {
            inner: RwLock::new(HubInner::default()),
            outbox_capacity: outbox_capacity.max(1),
        }
    }

    // ==================== 세션 수명 주기 ====================

    /// 새 클라이언트를 등록하고 아웃박스 수신 핸들을 반환합니다.
    ///
    /// 소켓 송신 태스크가 이 수신기를 드레인합니다.
    pub async fn register(&self, session_id: &str) -> mpsc::Receiver<ServerMessage> {
        let (tx, rx) = mpsc::channel(self.outbox_capacity);
        let mut inner = self.inner.write().await;
        inner
            .sessions
            .insert(session_id.to_string(), ClientSession::new(tx));
        rx
    }

    /// 클라이언트를 제거하고 모든 채널 멤버십을 정리합니다.
    ///
    /// 비게 된 채널 항목은 인덱스에서 삭제됩니다.
    pub async fn remove_client(&self, session_id: &str) {
        let mut inner = self.inner.write().await;
        let Some(session) = inner.sessions.remove(session_id) else {
            return;
        };

        for channel in &session.channels {
            if let Some(members) = inner.channels.get_mut(channel) {
                members.remove(session_id);
                if members.is_empty() {
                    inner.channels.remove(channel);
                }
            }
        }
    }

    /// 세션을 인증 상태로 표시합니다.
    ///
    /// 토큰 서명 검증은 호출 측(핸들러)의 책임입니다. 존재하지 않는
    /// 세션이면 `false`를 반환합니다.
    pub async fn authenticate(
        &self,
        session_id: &str,
        principal_id: &str,
        permissions: Vec<String>,
    ) -> bool {
        let mut inner = self.inner.write().await;
        match inner.sessions.get_mut(session_id) {
            Some(session) => {
                session.authenticated = true;
                session.principal_id = Some(principal_id.to_string());
                session.permissions = permissions;
                true
            }
            None => false,
        }
    }

    // ==================== 구독 ====================

    /// 심볼 구독을 추가합니다 (인증 불필요).
    ///
    /// 새로 추가된 심볼에 캐시된 시세가 있으면 즉시 아웃박스로
    /// 밀어 넣습니다 (스냅샷 후 라이브).
    pub async fn subscribe_symbols(&self, session_id: &str, symbols: &[String]) -> Vec<String> {
        let mut inner = self.inner.write().await;
        let mut subscribed = Vec::new();
        let mut replay = Vec::new();

        if let Some(session) = inner.sessions.get_mut(session_id) {
            for symbol in symbols {
                if session.symbols.insert(symbol.clone()) {
                    replay.push(symbol.clone());
                }
                subscribed.push(symbol.clone());
            }
        }

        // 멤버십 추가와 같은 잠금 구간에서 재생해야 동시 배포와
        // 중복/누락 없이 맞물림
        for symbol in replay {
            if let Some(tick) = inner.price_cache.get(&symbol).cloned() {
                if let Some(session) = inner.sessions.get(session_id) {
                    let _ = session.outbox.try_send(ServerMessage::PriceUpdate(tick));
                }
            }
        }

        subscribed
    }

    /// 채널 구독을 추가합니다.
    ///
    /// 인증된 세션만 허용됩니다. 새로 구독된 각 채널의 마지막
    /// 페이로드가 있으면 `channel_data` 스냅샷으로 즉시 전달합니다.
    pub async fn subscribe_channels(
        &self,
        session_id: &str,
        channels: &[String],
    ) -> PulseResult<Vec<String>> {
        let mut inner = self.inner.write().await;

        let session = inner
            .sessions
            .get(session_id)
            .ok_or_else(|| PulseError::NotFound(format!("session: {}", session_id)))?;
        if !session.authenticated {
            return Err(PulseError::Auth(
                "채널 구독 전에 인증이 필요합니다".to_string(),
            ));
        }

        let mut subscribed = Vec::new();
        let mut newly_added = Vec::new();

        for channel in channels {
            let added = inner
                .sessions
                .get_mut(session_id)
                .map(|s| s.channels.insert(channel.clone()))
                .unwrap_or(false);
            if added {
                inner
                    .channels
                    .entry(channel.clone())
                    .or_default()
                    .insert(session_id.to_string());
                newly_added.push(channel.clone());
            }
            subscribed.push(channel.clone());
        }

        // 스냅샷 전달: 다음 브로드캐스트 주기를 기다리지 않음
        for channel in newly_added {
            if let Some(snapshot) = inner.channel_snapshots.get(&channel).cloned() {
                if let Some(session) = inner.sessions.get(session_id) {
                    let _ = session
                        .outbox
                        .try_send(ServerMessage::channel_data(channel, snapshot));
                }
            }
        }

        Ok(subscribed)
    }

    /// 심볼 구독을 해제합니다.
    pub async fn unsubscribe_symbols(&self, session_id: &str, symbols: &[String]) -> Vec<String> {
        let mut inner = self.inner.write().await;
        let mut unsubscribed = Vec::new();

        if let Some(session) = inner.sessions.get_mut(session_id) {
            for symbol in symbols {
                if session.symbols.remove(symbol) {
                    unsubscribed.push(symbol.clone());
                }
            }
        }

        unsubscribed
    }

    /// 채널 구독을 해제하고 비게 된 채널 항목을 삭제합니다.
    pub async fn unsubscribe_channels(&self, session_id: &str, channels: &[String]) -> Vec<String> {
        let mut inner = self.inner.write().await;
        let mut unsubscribed = Vec::new();

        for channel in channels {
            let removed = inner
                .sessions
                .get_mut(session_id)
                .map(|s| s.channels.remove(channel))
                .unwrap_or(false);
            if removed {
                if let Some(members) = inner.channels.get_mut(channel) {
                    members.remove(session_id);
                    if members.is_empty() {
                        inner.channels.remove(channel);
                    }
                }
                unsubscribed.push(channel.clone());
            }
        }

        unsubscribed
    }

    // ==================== 배포 ====================

    /// 채널의 현재 멤버 전원에게 페이로드를 팬아웃합니다.
    ///
    /// 페이로드는 채널 스냅샷 캐시에 저장되어 이후 구독자의 초기
    /// 데이터가 됩니다. 아웃박스가 가득 찼거나 닫힌 멤버는 이번
    /// 메시지에 한해 건너뜁니다 (완전성보다 신선도).
    ///
    /// # Returns
    ///
    /// 실제 전달된 멤버 수
    pub async fn broadcast_to_channel(&self, channel: &str, data: Value) -> usize {
        let mut inner = self.inner.write().await;
        inner
            .channel_snapshots
            .insert(channel.to_string(), data.clone());

        let Some(members) = inner.channels.get(channel).cloned() else {
            return 0;
        };

        let message = ServerMessage::broadcast(channel, data);
        let mut delivered = 0u64;
        let mut skipped = 0u64;

        for member in &members {
            if let Some(session) = inner.sessions.get(member) {
                match session.outbox.try_send(message.clone()) {
                    Ok(()) => delivered += 1,
                    Err(_) => {
                        skipped += 1;
                        debug!(channel = %channel, session_id = %member, "Outbox full or closed, skipping");
                    }
                }
            }
        }

        metrics::record_fan_out(channel, delivered);
        if skipped > 0 {
            metrics::record_fan_out_skipped(channel, skipped);
        }

        delivered as usize
    }

    /// 시세 틱을 해당 심볼 구독자 전원에게 배포합니다.
    ///
    /// 틱은 심볼별 캐시에 저장되어 이후 구독자의 초기 값이 됩니다.
    pub async fn broadcast_price(&self, tick: &PriceTick) -> usize {
        let mut inner = self.inner.write().await;
        inner
            .price_cache
            .insert(tick.symbol.clone(), tick.clone());

        let mut delivered = 0;
        for session in inner.sessions.values() {
            if session.symbols.contains(&tick.symbol) {
                if session
                    .outbox
                    .try_send(ServerMessage::PriceUpdate(tick.clone()))
                    .is_ok()
                {
                    delivered += 1;
                }
            }
        }

        delivered
    }

    /// 특정 세션의 아웃박스로 메시지를 보냅니다.
    ///
    /// 핸들러 응답(구독 확인, 에러, 퐁)도 같은 아웃박스를 거쳐
    /// 브로드캐스트와의 순서가 유지됩니다.
    pub async fn send_to_client(&self, session_id: &str, message: ServerMessage) -> bool {
        let inner = self.inner.read().await;
        inner
            .sessions
            .get(session_id)
            .map(|s| s.outbox.try_send(message).is_ok())
            .unwrap_or(false)
    }

    // ==================== 조회 ====================

    /// 연결된 클라이언트 수.
    pub async fn client_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    /// 활성 채널 수.
    pub async fn channel_count(&self) -> usize {
        self.inner.read().await.channels.len()
    }

    /// 특정 채널의 멤버 수.
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .read()
            .await
            .channels
            .get(channel)
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// 세션의 인증된 주체 ID.
    pub async fn principal_of(&self, session_id: &str) -> Option<String> {
        self.inner
            .read()
            .await
            .sessions
            .get(session_id)
            .and_then(|s| s.principal_id.clone())
    }

    /// 심볼의 마지막 캐시된 시세.
    pub async fn last_price(&self, symbol: &str) -> Option<PriceTick> {
        self.inner.read().await.price_cache.get(symbol).cloned()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOX_CAPACITY)
    }
}

/// 공유 가능한 허브 타입.
pub type SharedBroadcastHub = Arc<BroadcastHub>;

/// 새로운 공유 허브 생성.
pub fn create_hub(outbox_capacity: usize) -> SharedBroadcastHub {
    Arc::new(BroadcastHub::new(outbox_capacity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    async fn authed_member(
        hub: &BroadcastHub,
        session_id: &str,
        channel: &str,
    ) -> mpsc::Receiver<ServerMessage> {
        let rx = hub.register(session_id).await;
        hub.authenticate(session_id, &format!("principal_{}", session_id), vec![])
            .await;
        hub.subscribe_channels(session_id, &[channel.to_string()])
            .await
            .unwrap();
        rx
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            messages.push(msg);
        }
        messages
    }

    fn broadcast_count(messages: &[ServerMessage], channel: &str) -> usize {
        messages
            .iter()
            .filter(|m| matches!(m, ServerMessage::Broadcast { channel: c, .. } if c == channel))
            .count()
    }

    #[tokio::test]
    async fn test_fan_out_completeness() {
        let hub = BroadcastHub::default();
        let mut rx_a = authed_member(&hub, "a", "security_alerts").await;
        let mut rx_b = authed_member(&hub, "b", "security_alerts").await;
        let mut rx_c = authed_member(&hub, "c", "security_alerts").await;
        // d는 다른 채널 멤버
        let mut rx_d = authed_member(&hub, "d", "analytics_dashboard").await;

        let delivered = hub
            .broadcast_to_channel("security_alerts", json!({"level": 3}))
            .await;

        assert_eq!(delivered, 3);
        assert_eq!(broadcast_count(&drain(&mut rx_a), "security_alerts"), 1);
        assert_eq!(broadcast_count(&drain(&mut rx_b), "security_alerts"), 1);
        assert_eq!(broadcast_count(&drain(&mut rx_c), "security_alerts"), 1);
        assert_eq!(broadcast_count(&drain(&mut rx_d), "security_alerts"), 0);
    }

    #[tokio::test]
    async fn test_subscribe_channels_requires_authentication() {
        let hub = BroadcastHub::default();
        let _rx = hub.register("s1").await;

        let result = hub
            .subscribe_channels("s1", &["security_alerts".to_string()])
            .await;
        assert!(matches!(result, Err(PulseError::Auth(_))));
        assert_eq!(hub.subscriber_count("security_alerts").await, 0);

        hub.authenticate("s1", "admin_1", vec!["admin".to_string()])
            .await;
        let subscribed = hub
            .subscribe_channels("s1", &["security_alerts".to_string()])
            .await
            .unwrap();
        assert_eq!(subscribed, vec!["security_alerts"]);
        assert_eq!(hub.subscriber_count("security_alerts").await, 1);
        assert_eq!(hub.principal_of("s1").await.as_deref(), Some("admin_1"));
    }

    #[tokio::test]
    async fn test_snapshot_pushed_on_subscribe() {
        let hub = BroadcastHub::default();

        // 멤버가 없어도 스냅샷은 캐시됨
        hub.broadcast_to_channel("analytics_dashboard", json!({"cpu": 42.5}))
            .await;

        let mut rx = authed_member(&hub, "late", "analytics_dashboard").await;
        let messages = drain(&mut rx);

        let snapshot = messages.iter().find_map(|m| match m {
            ServerMessage::ChannelData { channel, data, .. }
                if channel == "analytics_dashboard" =>
            {
                Some(data.clone())
            }
            _ => None,
        });
        assert_eq!(snapshot, Some(json!({"cpu": 42.5})));

        // 이후 브로드캐스트는 라이브로 수신
        hub.broadcast_to_channel("analytics_dashboard", json!({"cpu": 50.0}))
            .await;
        assert_eq!(
            broadcast_count(&drain(&mut rx), "analytics_dashboard"),
            1
        );
    }

    #[tokio::test]
    async fn test_remove_client_prunes_membership() {
        let hub = BroadcastHub::default();
        let _rx_a = authed_member(&hub, "a", "security_alerts").await;
        let _rx_b = authed_member(&hub, "b", "security_alerts").await;

        hub.remove_client("a").await;
        assert_eq!(hub.subscriber_count("security_alerts").await, 1);
        assert_eq!(hub.client_count().await, 1);

        // 마지막 멤버 제거 시 채널 항목 자체가 삭제됨
        hub.remove_client("b").await;
        assert_eq!(hub.channel_count().await, 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_channels_prunes_empty_channel() {
        let hub = BroadcastHub::default();
        let _rx = authed_member(&hub, "a", "portfolio_updates").await;

        let removed = hub
            .unsubscribe_channels("a", &["portfolio_updates".to_string()])
            .await;
        assert_eq!(removed, vec!["portfolio_updates"]);
        assert_eq!(hub.channel_count().await, 0);

        // 구독하지 않은 채널 해제는 무시됨
        let removed = hub
            .unsubscribe_channels("a", &["security_alerts".to_string()])
            .await;
        assert!(removed.is_empty());
    }

    #[tokio::test]
    async fn test_full_outbox_skipped_without_blocking_others() {
        // 용량 1: 드레인하지 않는 느린 소비자를 흉내
        let hub = BroadcastHub::new(1);
        let mut rx_slow = authed_member(&hub, "slow", "security_alerts").await;
        let mut rx_fast = authed_member(&hub, "fast", "security_alerts").await;

        let first = hub
            .broadcast_to_channel("security_alerts", json!({"seq": 1}))
            .await;
        assert_eq!(first, 2);

        // slow의 아웃박스는 가득 참. fast만 드레인
        drain(&mut rx_fast);

        let second = hub
            .broadcast_to_channel("security_alerts", json!({"seq": 2}))
            .await;
        assert_eq!(second, 1);

        // slow는 첫 메시지만 보유, 멤버십은 유지됨
        assert_eq!(broadcast_count(&drain(&mut rx_slow), "security_alerts"), 1);
        assert_eq!(hub.subscriber_count("security_alerts").await, 2);
        assert_eq!(broadcast_count(&drain(&mut rx_fast), "security_alerts"), 1);
    }

    #[tokio::test]
    async fn test_price_fan_out_by_symbol() {
        let hub = BroadcastHub::default();
        let mut rx_btc = hub.register("btc_watcher").await;
        let mut rx_eth = hub.register("eth_watcher").await;
        hub.subscribe_symbols("btc_watcher", &["BTC".to_string()])
            .await;
        hub.subscribe_symbols("eth_watcher", &["ETH".to_string()])
            .await;

        let tick = PriceTick::new("BTC", dec!(105000));
        let delivered = hub.broadcast_price(&tick).await;

        assert_eq!(delivered, 1);
        let btc_messages = drain(&mut rx_btc);
        assert!(matches!(
            btc_messages.as_slice(),
            [ServerMessage::PriceUpdate(t)] if t.symbol == "BTC"
        ));
        assert!(drain(&mut rx_eth).is_empty());
    }

    #[tokio::test]
    async fn test_cached_price_replayed_to_new_symbol_subscriber() {
        let hub = BroadcastHub::default();
        hub.broadcast_price(&PriceTick::new("BTC", dec!(105000)))
            .await;

        let mut rx = hub.register("late").await;
        hub.subscribe_symbols("late", &["BTC".to_string()]).await;

        let messages = drain(&mut rx);
        assert!(matches!(
            messages.as_slice(),
            [ServerMessage::PriceUpdate(t)] if t.price == dec!(105000)
        ));
        assert_eq!(
            hub.last_price("BTC").await.map(|t| t.price),
            Some(dec!(105000))
        );
    }
}
