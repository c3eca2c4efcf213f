//! 연결 멀티플렉서.
//!
//! 무제한의 논리 구독자에게 "심볼/채널 구독 후 이벤트 수신" API를
//! 제공하면서 물리 연결은 최대 하나만 유지합니다.
//!
//! - 첫 구독자 등록 시 연결을 열고, 마지막 구독자 해제 시 닫습니다.
//! - 구독 직후 관심 키의 최근 캐시 값을 먼저 재생합니다 (cache-then-live).
//! - 인바운드 메시지는 공유 캐시를 갱신한 뒤, 전달 시작 시점의 구독자
//!   집합 스냅샷에 정확히 한 번씩 전달됩니다.
//! - 비정상 종료 시 지수 백오프로 재연결하며, 성공하면 구독/인증을
//!   복원합니다. 한도 초과 시 종단 상태로 전이하고 구독자에게 종단
//!   에러를 1회 통지합니다.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use pulse_core::{ClientMessage, PriceTick, PulseError, ServerMessage, CLOSE_NORMAL};

use crate::config::MultiplexerConfig;
use crate::events::SubscriberEvent;
use crate::state::ConnectionState;
use crate::transport::{Transport, TransportEvent, TransportFactory};

/// 구독자의 관심 키 집합.
#[derive(Debug, Clone, Default)]
pub struct Interests {
    /// 관심 심볼
    pub symbols: HashSet<String>,
    /// 관심 채널
    pub channels: HashSet<String>,
}

impl Interests {
    /// 심볼 관심 집합을 생성합니다.
    pub fn symbols(symbols: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
            channels: HashSet::new(),
        }
    }

    /// 채널 관심 집합을 생성합니다.
    pub fn channels(channels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            symbols: HashSet::new(),
            channels: channels.into_iter().map(Into::into).collect(),
        }
    }

    /// 채널 관심을 추가합니다.
    pub fn and_channels(mut self, channels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.channels.extend(channels.into_iter().map(Into::into));
        self
    }

    /// 관심 키가 하나도 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty() && self.channels.is_empty()
    }

    /// 해당 심볼에 관심이 있는지 확인합니다.
    pub fn wants_symbol(&self, symbol: &str) -> bool {
        self.symbols.contains(symbol)
    }

    /// 해당 채널에 관심이 있는지 확인합니다.
    pub fn wants_channel(&self, channel: &str) -> bool {
        self.channels.contains(channel)
    }
}

/// 저장된 인증 정보 (재연결 시 복원용).
#[derive(Debug, Clone)]
struct AuthState {
    principal_id: String,
    permissions: Vec<String>,
    token: Option<String>,
}

struct SubscriberEntry {
    interests: Interests,
    tx: mpsc::Sender<SubscriberEvent>,
}

#[derive(Default)]
struct Inner {
    subscribers: HashMap<String, SubscriberEntry>,
    price_cache: HashMap<String, PriceTick>,
    channel_cache: HashMap<String, (Value, i64)>,
    auth: Option<AuthState>,
}

enum Command {
    /// 연결 보장 (이미 열려 있거나 시도 중이면 no-op)
    EnsureOpen,
    /// 명시적 연결 (시도 횟수 리셋, 종단 상태 해제)
    Connect,
    /// 구독자가 없으면 연결 종료
    CloseIdle,
    /// 프레임 전송 (연결이 없으면 무시)
    Send(ClientMessage),
    /// 멀티플렉서 종료
    Shutdown,
}

/// 연결 멀티플렉서.
///
/// 전송 팩토리를 주입받는 명시적 서비스로, 독립 인스턴스가 공존할 수
/// 있습니다. 내부 관리 태스크는 생성 시 시작되고 [`stop`]으로
/// 종료됩니다.
///
/// [`stop`]: ConnectionMultiplexer::stop
pub struct ConnectionMultiplexer {
    config: MultiplexerConfig,
    inner: Arc<RwLock<Inner>>,
    command_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl ConnectionMultiplexer {
    /// 새 멀티플렉서를 생성하고 관리 태스크를 시작합니다.
    ///
    /// 연결은 첫 구독자가 등록될 때까지 열리지 않습니다.
    pub fn new(config: MultiplexerConfig, factory: Arc<dyn TransportFactory>) -> Self {
        let inner = Arc::new(RwLock::new(Inner::default()));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);

        let manager = Manager {
            config: config.clone(),
            factory,
            inner: Arc::clone(&inner),
            command_rx,
            state_tx,
            transport: None,
            attempts: 0,
            reconnect_at: None,
        };
        tokio::spawn(manager.run());

        Self {
            config,
            inner,
            command_tx,
            state_rx,
        }
    }

    /// 구독자를 등록하고 이벤트 수신 채널을 반환합니다.
    ///
    /// 현재 연결 상태와 관심 키의 최근 캐시 값이 채널에 먼저 재생된 뒤
    /// 라이브 업데이트가 이어집니다. 첫 구독자라면 연결을 엽니다.
    pub async fn subscribe(
        &self,
        subscriber_id: impl Into<String>,
        interests: Interests,
    ) -> mpsc::Receiver<SubscriberEvent> {
        let subscriber_id = subscriber_id.into();
        let (tx, rx) = mpsc::channel(self.config.subscriber_buffer);

        {
            let mut inner = self.inner.write().await;

            // 현재 연결 상태를 먼저 재생
            let _ = tx.try_send(SubscriberEvent::ConnectionChanged(*self.state_rx.borrow()));

            // 관심 키의 최근 캐시 값 재생 (cache-then-live)
            for symbol in &interests.symbols {
                if let Some(tick) = inner.price_cache.get(symbol) {
                    let _ = tx.try_send(SubscriberEvent::Price(tick.clone()));
                }
            }
            for channel in &interests.channels {
                if let Some((data, timestamp)) = inner.channel_cache.get(channel) {
                    let _ = tx.try_send(SubscriberEvent::Channel {
                        channel: channel.clone(),
                        data: data.clone(),
                        timestamp: *timestamp,
                    });
                }
            }

            inner.subscribers.insert(
                subscriber_id.clone(),
                SubscriberEntry {
                    interests: interests.clone(),
                    tx,
                },
            );
        }
        debug!(subscriber = %subscriber_id, "Subscriber registered");

        let _ = self.command_tx.send(Command::EnsureOpen);
        if !interests.is_empty() {
            let _ = self.command_tx.send(Command::Send(ClientMessage::Subscribe {
                symbols: interests.symbols.iter().cloned().collect(),
                channels: interests.channels.iter().cloned().collect(),
            }));
        }
        rx
    }

    /// 구독자를 제거합니다. 마지막 구독자였다면 연결을 닫습니다.
    pub async fn unsubscribe(&self, subscriber_id: &str) {
        let (removed, now_empty, released_symbols, released_channels) = {
            let mut inner = self.inner.write().await;
            let removed = inner.subscribers.remove(subscriber_id);

            // 다른 구독자가 여전히 관심 있는 키는 서버 구독을 유지
            let (symbols, channels) = match &removed {
                Some(entry) => {
                    let symbols: Vec<String> = entry
                        .interests
                        .symbols
                        .iter()
                        .filter(|s| !inner.subscribers.values().any(|o| o.interests.wants_symbol(s)))
                        .cloned()
                        .collect();
                    let channels: Vec<String> = entry
                        .interests
                        .channels
                        .iter()
                        .filter(|c| {
                            !inner.subscribers.values().any(|o| o.interests.wants_channel(c))
                        })
                        .cloned()
                        .collect();
                    (symbols, channels)
                }
                None => (Vec::new(), Vec::new()),
            };
            (
                removed.is_some(),
                inner.subscribers.is_empty(),
                symbols,
                channels,
            )
        };

        if !removed {
            return;
        }
        debug!(subscriber = %subscriber_id, "Subscriber removed");

        if now_empty {
            let _ = self.command_tx.send(Command::CloseIdle);
        } else if !released_symbols.is_empty() || !released_channels.is_empty() {
            let _ = self.command_tx.send(Command::Send(ClientMessage::Unsubscribe {
                symbols: released_symbols,
                channels: released_channels,
            }));
        }
    }

    /// 관리자 인증을 요청하고 재연결 시 복원되도록 저장합니다.
    pub async fn authenticate(
        &self,
        principal_id: impl Into<String>,
        permissions: Vec<String>,
        token: Option<String>,
    ) {
        let auth = AuthState {
            principal_id: principal_id.into(),
            permissions,
            token,
        };
        self.inner.write().await.auth = Some(auth.clone());

        let _ = self.command_tx.send(Command::Send(ClientMessage::Authenticate {
            principal_id: auth.principal_id,
            permissions: auth.permissions,
            token: auth.token,
        }));
    }

    /// 명시적으로 연결을 시작합니다.
    ///
    /// 재연결 시도 횟수를 0으로 리셋하며, 종단 상태(`GivenUp`)에서도
    /// 연결을 재개합니다.
    pub fn connect(&self) {
        let _ = self.command_tx.send(Command::Connect);
    }

    /// 멀티플렉서를 종료합니다. 연결은 정상 코드로 닫힙니다.
    pub fn stop(&self) {
        let _ = self.command_tx.send(Command::Shutdown);
    }

    /// 현재 연결 상태를 반환합니다.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// 연결 상태 변경을 관찰하는 watch 채널을 반환합니다.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// 현재 구독자 수를 반환합니다.
    pub async fn subscriber_count(&self) -> usize {
        self.inner.read().await.subscribers.len()
    }

    /// 심볼의 마지막 캐시 시세를 반환합니다.
    ///
    /// 연결이 끊긴 동안 UI가 빈 화면 대신 표시할 수 있는 값입니다.
    pub async fn last_price(&self, symbol: &str) -> Option<PriceTick> {
        self.inner.read().await.price_cache.get(symbol).cloned()
    }
}

// ==================== 관리 태스크 ====================

struct Manager {
    config: MultiplexerConfig,
    factory: Arc<dyn TransportFactory>,
    inner: Arc<RwLock<Inner>>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    transport: Option<Box<dyn Transport>>,
    /// 연속 실패 횟수. 연결 성공 시 0으로 리셋.
    attempts: u32,
    reconnect_at: Option<Instant>,
}

impl Manager {
    async fn run(mut self) {
        loop {
            let wake_at = self.reconnect_at.unwrap_or_else(Instant::now);

            tokio::select! {
                maybe_cmd = self.command_rx.recv() => {
                    let Some(cmd) = maybe_cmd else {
                        // 핸들이 모두 드롭되면 종료
                        self.teardown().await;
                        break;
                    };
                    if self.handle_command(cmd).await {
                        break;
                    }
                }
                event = Self::poll_transport(&mut self.transport), if self.transport.is_some() => {
                    self.handle_transport_event(event).await;
                }
                _ = tokio::time::sleep_until(wake_at), if self.reconnect_at.is_some() => {
                    self.reconnect_at = None;
                    self.try_connect().await;
                }
            }
        }
    }

    async fn poll_transport(transport: &mut Option<Box<dyn Transport>>) -> TransportEvent {
        match transport.as_mut() {
            Some(t) => t.next_event().await,
            // select! 가드가 비활성화하므로 도달하지 않음
            None => std::future::pending().await,
        }
    }

    /// 커맨드를 처리합니다. 종료 시 true를 반환합니다.
    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::EnsureOpen => {
                let state = self.state();
                // 이미 열려 있거나 시도 중이면 no-op (중복 연결 방지)
                if state.is_open() || state.is_transitioning() {
                    return false;
                }
                // 종단 상태는 명시적 connect로만 해제
                if state.is_terminal() {
                    return false;
                }
                self.attempts = 0;
                self.try_connect().await;
            }
            Command::Connect => {
                let state = self.state();
                if state.is_open() || state == ConnectionState::Connecting {
                    return false;
                }
                self.attempts = 0;
                self.reconnect_at = None;
                self.try_connect().await;
            }
            Command::CloseIdle => self.teardown_idle().await,
            Command::Send(message) => self.send_frame(message).await,
            Command::Shutdown => {
                self.teardown().await;
                return true;
            }
        }
        false
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// 연결을 한 번 시도합니다. 타임아웃 내에 열리지 않으면 실패로
    /// 처리하고 백오프를 예약합니다.
    async fn try_connect(&mut self) {
        self.set_state(ConnectionState::Connecting).await;

        let result = tokio::time::timeout(
            self.config.connect_timeout(),
            self.factory.connect(&self.config.url),
        )
        .await;

        match result {
            Ok(Ok(transport)) => {
                self.transport = Some(transport);
                self.attempts = 0;
                info!(url = %self.config.url, "Connection established");
                self.restore_session().await;
                self.set_state(ConnectionState::Open).await;
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Connect attempt failed");
                self.schedule_reconnect().await;
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.connect_timeout_ms,
                    "Connect attempt timed out"
                );
                self.schedule_reconnect().await;
            }
        }
    }

    /// 실패를 집계하고 다음 재연결을 예약하거나 종단 상태로 전이합니다.
    async fn schedule_reconnect(&mut self) {
        self.transport = None;

        // 구독자가 없으면 재연결할 이유가 없음
        if self.inner.read().await.subscribers.is_empty() {
            self.attempts = 0;
            self.set_state(ConnectionState::Idle).await;
            return;
        }

        self.attempts += 1;
        if !self.config.should_reconnect(self.attempts) {
            error!(attempts = self.attempts, "Reconnect ceiling reached, giving up");
            self.set_state(ConnectionState::GivenUp).await;
            self.emit_terminal_error().await;
            return;
        }

        let delay = self.config.delay_for(self.attempts);
        self.reconnect_at = Some(Instant::now() + delay);
        info!(
            attempt = self.attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnect"
        );
        self.set_state(ConnectionState::ReconnectWait).await;
    }

    /// 재연결 직후 인증과 구독을 복원합니다.
    async fn restore_session(&mut self) {
        let (auth, symbols, channels) = {
            let inner = self.inner.read().await;
            let mut symbols: HashSet<String> = HashSet::new();
            let mut channels: HashSet<String> = HashSet::new();
            for entry in inner.subscribers.values() {
                symbols.extend(entry.interests.symbols.iter().cloned());
                channels.extend(entry.interests.channels.iter().cloned());
            }
            (inner.auth.clone(), symbols, channels)
        };

        if let Some(auth) = auth {
            self.send_frame(ClientMessage::Authenticate {
                principal_id: auth.principal_id,
                permissions: auth.permissions,
                token: auth.token,
            })
            .await;
        }
        if !symbols.is_empty() || !channels.is_empty() {
            self.send_frame(ClientMessage::Subscribe {
                symbols: symbols.into_iter().collect(),
                channels: channels.into_iter().collect(),
            })
            .await;
        }
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Text(text) => self.dispatch_message(&text).await,
            TransportEvent::Closed(code) => {
                self.transport = None;
                if code == Some(CLOSE_NORMAL) {
                    // 정상 종료는 재연결하지 않음
                    info!("Connection closed normally");
                    self.attempts = 0;
                    self.set_state(ConnectionState::Closed).await;
                } else {
                    warn!(?code, "Connection closed unexpectedly");
                    self.schedule_reconnect().await;
                }
            }
            TransportEvent::Error(e) => {
                warn!(error = %e, "Transport error");
                self.transport = None;
                self.schedule_reconnect().await;
            }
        }
    }

    /// 인바운드 메시지를 파싱해 구독자에게 전달합니다.
    ///
    /// 잘못된 메시지는 버리고 연결은 유지합니다.
    async fn dispatch_message(&mut self, text: &str) {
        let message = match ServerMessage::from_json(text) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "Dropping malformed message");
                return;
            }
        };

        match message {
            ServerMessage::PriceUpdate(tick) => self.deliver_price(tick).await,
            ServerMessage::ChannelData {
                channel,
                data,
                timestamp,
            }
            | ServerMessage::Broadcast {
                channel,
                data,
                timestamp,
            } => {
                self.deliver_channel(channel, data, timestamp).await;
            }
            ServerMessage::Connection { version, .. } => {
                debug!(server_version = %version, "Server welcome received");
            }
            ServerMessage::Authenticated { principal_id, .. } => {
                debug!(principal = %principal_id, "Authenticated");
            }
            ServerMessage::Error { code, message } => {
                warn!(code = %code, message = %message, "Server reported error");
            }
            ServerMessage::Subscribed { .. }
            | ServerMessage::Unsubscribed { .. }
            | ServerMessage::Pong { .. } => {}
        }
    }

    /// 캐시를 갱신한 뒤 관심 구독자 스냅샷에 정확히 한 번씩 전달합니다.
    async fn deliver_price(&self, tick: PriceTick) {
        let targets: Vec<mpsc::Sender<SubscriberEvent>> = {
            let mut inner = self.inner.write().await;
            inner.price_cache.insert(tick.symbol.clone(), tick.clone());
            inner
                .subscribers
                .values()
                .filter(|s| s.interests.wants_symbol(&tick.symbol))
                .map(|s| s.tx.clone())
                .collect()
        };

        for tx in targets {
            if tx.try_send(SubscriberEvent::Price(tick.clone())).is_err() {
                // 느린 구독자는 이 메시지를 건너뜀 (최신성 우선)
                warn!(symbol = %tick.symbol, "Subscriber buffer full, dropping price event");
            }
        }
    }

    async fn deliver_channel(&self, channel: String, data: Value, timestamp: i64) {
        let targets: Vec<mpsc::Sender<SubscriberEvent>> = {
            let mut inner = self.inner.write().await;
            inner
                .channel_cache
                .insert(channel.clone(), (data.clone(), timestamp));
            inner
                .subscribers
                .values()
                .filter(|s| s.interests.wants_channel(&channel))
                .map(|s| s.tx.clone())
                .collect()
        };

        for tx in targets {
            let event = SubscriberEvent::Channel {
                channel: channel.clone(),
                data: data.clone(),
                timestamp,
            };
            if tx.try_send(event).is_err() {
                warn!(channel = %channel, "Subscriber buffer full, dropping channel event");
            }
        }
    }

    async fn send_frame(&mut self, message: ClientMessage) {
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        match message.to_json() {
            Ok(json) => {
                if let Err(e) = transport.send_text(json).await {
                    warn!(error = %e, "Failed to send frame");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode frame"),
        }
    }

    /// 마지막 구독자 해제 후 유휴 종료. 그 사이에 새 구독자가
    /// 등록되었으면 아무것도 하지 않습니다.
    async fn teardown_idle(&mut self) {
        if !self.inner.read().await.subscribers.is_empty() {
            return;
        }
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.close().await;
        }
        self.reconnect_at = None;
        self.attempts = 0;
        self.set_state(ConnectionState::Idle).await;
        info!("Idle teardown complete");
    }

    async fn teardown(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.close().await;
        }
        self.reconnect_at = None;
        self.set_state(ConnectionState::Closed).await;
    }

    /// 상태를 갱신하고 모든 구독자에게 통지합니다.
    async fn set_state(&self, state: ConnectionState) {
        if *self.state_tx.borrow() == state {
            return;
        }
        let _ = self.state_tx.send(state);

        let targets: Vec<mpsc::Sender<SubscriberEvent>> = {
            let inner = self.inner.read().await;
            inner.subscribers.values().map(|s| s.tx.clone()).collect()
        };
        for tx in targets {
            let _ = tx.try_send(SubscriberEvent::ConnectionChanged(state));
        }
    }

    /// 종단 에러를 모든 구독자에게 1회 통지합니다.
    async fn emit_terminal_error(&self) {
        let message = PulseError::CapacityExhausted(format!(
            "{} consecutive connect failures",
            self.attempts
        ))
        .to_string();

        let targets: Vec<mpsc::Sender<SubscriberEvent>> = {
            let inner = self.inner.read().await;
            inner.subscribers.values().map(|s| s.tx.clone()).collect()
        };
        for tx in targets {
            let _ = tx.try_send(SubscriberEvent::ConnectionError(message.clone()));
        }
    }
}
