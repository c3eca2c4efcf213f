//! WebSocket 연결 handler.
//!
//! Axum WebSocket 엔드포인트 및 메시지 처리. 업그레이드 후 소켓을
//! 수신/송신 태스크로 분리하고, 송신 태스크는 허브가 소유한 세션
//! 아웃박스를 드레인합니다.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use pulse_core::{ClientMessage, PulseError, ServerMessage};

use super::hub::SharedBroadcastHub;
use crate::auth::decode_token;
use crate::metrics::{decrement_ws_connections, increment_ws_connections};

/// WebSocket 상태.
#[derive(Clone)]
pub struct WsState {
    /// 브로드캐스트 허브
    pub hub: SharedBroadcastHub,
    /// JWT 시크릿 (인증 프레임 검증용)
    pub jwt_secret: String,
}

impl WsState {
    /// 새로운 WebSocket 상태 생성.
    pub fn new(hub: SharedBroadcastHub, jwt_secret: impl Into<String>) -> Self {
        Self {
            hub,
            jwt_secret: jwt_secret.into(),
        }
    }
}

/// WebSocket 업그레이드 핸들러.
///
/// # 엔드포인트
///
/// `GET /ws`
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(ws_state): State<WsState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, ws_state))
}

/// WebSocket 연결 처리.
async fn handle_socket(socket: WebSocket, state: WsState) {
    let session_id = uuid::Uuid::new_v4().to_string();
    info!("WebSocket connected: {}", session_id);

    increment_ws_connections();

    // 허브에 세션 등록, 아웃박스 수신 핸들 획득
    let mut outbox_rx = state.hub.register(&session_id).await;

    let (mut sender, mut receiver) = socket.split();

    // 환영 메시지 전송
    let welcome = ServerMessage::Connection {
        message: "Connected to Pulse".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().timestamp_millis(),
    };
    if let Ok(json) = welcome.to_json() {
        let _ = sender.send(Message::Text(json.into())).await;
    }

    // 클라이언트 메시지 수신 태스크
    let session_id_clone = session_id.clone();
    let state_clone = state.clone();
    let receive_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(msg) => {
                    if !handle_client_message(&session_id_clone, msg, &state_clone).await {
                        break;
                    }
                }
                Err(e) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            }
        }
    });

    // 아웃박스 드레인 태스크
    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbox_rx.recv().await {
            match msg.to_json() {
                Ok(json) => {
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Failed to serialize outbound message: {}", e);
                }
            }
        }
    });

    // 하나의 태스크가 종료되면 연결 정리
    tokio::select! {
        _ = receive_task => {
            debug!("Receive task ended for session: {}", session_id);
        }
        _ = send_task => {
            debug!("Send task ended for session: {}", session_id);
        }
    }

    // 멤버십 해제. 아웃박스 송신 핸들이 드롭되어 남은 태스크도 종료됨
    state.hub.remove_client(&session_id).await;

    decrement_ws_connections();

    info!("WebSocket disconnected: {}", session_id);
}

/// 클라이언트 메시지 처리.
///
/// # Returns
///
/// `true`면 연결 유지, `false`면 연결 종료
async fn handle_client_message(session_id: &str, msg: Message, state: &WsState) -> bool {
    match msg {
        Message::Text(text) => match ClientMessage::from_json(&text) {
            Ok(client_msg) => process_client_message(session_id, client_msg, state).await,
            Err(e) => {
                // 프로토콜 에러: 메시지만 버리고 연결은 유지
                warn!("Invalid message from {}: {}", session_id, e);
                state
                    .hub
                    .send_to_client(
                        session_id,
                        ServerMessage::error("INVALID_MESSAGE", e.to_string()),
                    )
                    .await;
                true
            }
        },
        Message::Binary(_) => {
            warn!("Binary messages not supported");
            true
        }
        Message::Ping(_) => true,
        Message::Pong(_) => true,
        Message::Close(_) => {
            debug!("Close message received from {}", session_id);
            false
        }
    }
}

/// 파싱된 클라이언트 메시지 처리.
async fn process_client_message(session_id: &str, msg: ClientMessage, state: &WsState) -> bool {
    match msg {
        ClientMessage::Subscribe { symbols, channels } => {
            let subscribed_symbols = if symbols.is_empty() {
                Vec::new()
            } else {
                state.hub.subscribe_symbols(session_id, &symbols).await
            };

            let subscribed_channels = if channels.is_empty() {
                Vec::new()
            } else {
                match state.hub.subscribe_channels(session_id, &channels).await {
                    Ok(subscribed) => subscribed,
                    Err(PulseError::Auth(message)) => {
                        state
                            .hub
                            .send_to_client(
                                session_id,
                                ServerMessage::error("AUTH_REQUIRED", message),
                            )
                            .await;
                        Vec::new()
                    }
                    Err(e) => {
                        warn!("Channel subscribe failed for {}: {}", session_id, e);
                        Vec::new()
                    }
                }
            };

            if !subscribed_symbols.is_empty() || !subscribed_channels.is_empty() {
                debug!(
                    "Session {} subscribed to symbols: {:?}, channels: {:?}",
                    session_id, subscribed_symbols, subscribed_channels
                );
                state
                    .hub
                    .send_to_client(
                        session_id,
                        ServerMessage::Subscribed {
                            symbols: subscribed_symbols,
                            channels: subscribed_channels,
                        },
                    )
                    .await;
            }
            true
        }

        ClientMessage::Unsubscribe { symbols, channels } => {
            let removed_symbols = state.hub.unsubscribe_symbols(session_id, &symbols).await;
            let removed_channels = state.hub.unsubscribe_channels(session_id, &channels).await;
            debug!(
                "Session {} unsubscribed from symbols: {:?}, channels: {:?}",
                session_id, removed_symbols, removed_channels
            );

            state
                .hub
                .send_to_client(
                    session_id,
                    ServerMessage::Unsubscribed {
                        symbols: removed_symbols,
                        channels: removed_channels,
                    },
                )
                .await;
            true
        }

        ClientMessage::Authenticate {
            principal_id,
            permissions,
            token,
        } => {
            // 토큰이 제시되면 서명과 주체 일치를 검증. 없으면 내부 신뢰
            // 모드 (데모 클라이언트)
            if let Some(token) = token {
                match decode_token(&token, &state.jwt_secret) {
                    Ok(data) if data.claims.sub == principal_id => {
                        if permissions.iter().any(|p| p == "admin")
                            && !data.claims.role.is_admin()
                        {
                            warn!(
                                "Session {} requested admin permission without admin role",
                                session_id
                            );
                            state
                                .hub
                                .send_to_client(
                                    session_id,
                                    ServerMessage::error(
                                        "AUTH_FAILED",
                                        "관리자 권한이 없습니다",
                                    ),
                                )
                                .await;
                            return true;
                        }
                    }
                    Ok(_) => {
                        warn!("Session {} token subject mismatch", session_id);
                        state
                            .hub
                            .send_to_client(
                                session_id,
                                ServerMessage::error(
                                    "AUTH_FAILED",
                                    "토큰 주체가 일치하지 않습니다",
                                ),
                            )
                            .await;
                        return true;
                    }
                    Err(e) => {
                        // 인증 실패: 에러 프레임만 보내고 연결은 유지
                        warn!("Auth failed for session {}: {}", session_id, e);
                        state
                            .hub
                            .send_to_client(
                                session_id,
                                ServerMessage::error("AUTH_FAILED", e.to_string()),
                            )
                            .await;
                        return true;
                    }
                }
            }

            state
                .hub
                .authenticate(session_id, &principal_id, permissions)
                .await;
            info!("Session {} authenticated as {}", session_id, principal_id);

            state
                .hub
                .send_to_client(
                    session_id,
                    ServerMessage::Authenticated {
                        principal_id,
                        timestamp: Utc::now().timestamp_millis(),
                    },
                )
                .await;
            true
        }

        ClientMessage::Ping => {
            state
                .hub
                .send_to_client(
                    session_id,
                    ServerMessage::Pong {
                        timestamp: Utc::now().timestamp_millis(),
                    },
                )
                .await;
            true
        }
    }
}

/// 독립적인 WebSocket 라우터 생성.
pub fn websocket_router(ws_state: WsState) -> Router {
    Router::new()
        .route("/", get(websocket_handler))
        .with_state(ws_state)
}
