//! SSE 라우트.
//!
//! `GET /events`(사용자 스트림), `GET /admin/events`(관리자 스트림).
//! EventSource API가 커스텀 헤더를 지원하지 않으므로 토큰은
//! `Authorization: Bearer` 헤더 또는 `?token=` 쿼리로 받습니다.

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use futures::Stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::info;

use pulse_core::StreamEvent;

use super::registry::SharedStreamRegistry;
use crate::auth::{authenticate_request, Claims, JwtError, Role};
use crate::error::ApiErrorResponse;

/// SSE 라우트 상태.
#[derive(Clone)]
pub struct SseState {
    /// 푸시 스트림 레지스트리
    pub streams: SharedStreamRegistry,
    /// JWT 시크릿
    pub jwt_secret: String,
}

impl SseState {
    /// 새로운 SSE 상태 생성.
    pub fn new(streams: SharedStreamRegistry, jwt_secret: impl Into<String>) -> Self {
        Self {
            streams,
            jwt_secret: jwt_secret.into(),
        }
    }
}

/// 스트림 요청 쿼리 파라미터.
#[derive(Debug, Deserialize)]
struct StreamQuery {
    /// Bearer 헤더 대신 사용할 수 있는 토큰
    token: Option<String>,
}

type SseResult<S> = Result<Sse<S>, (StatusCode, Json<ApiErrorResponse>)>;

/// 인증된 사용자 푸시 스트림.
///
/// # 엔드포인트
///
/// `GET /events`
async fn user_events(
    State(state): State<SseState>,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> SseResult<impl Stream<Item = Result<Event, Infallible>>> {
    let claims = authorize(&state, &headers, &query)?;

    info!(principal_id = %claims.sub, "SSE stream opened");
    let rx = state.streams.register(&claims.sub, false).await;
    Ok(event_stream(rx))
}

/// 관리자 전용 푸시 스트림.
///
/// # 엔드포인트
///
/// `GET /admin/events`
async fn admin_events(
    State(state): State<SseState>,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> SseResult<impl Stream<Item = Result<Event, Infallible>>> {
    let claims = authorize(&state, &headers, &query)?;

    if !claims.has_role(Role::Admin) {
        return Err((
            StatusCode::FORBIDDEN,
            Json(ApiErrorResponse::new(
                "FORBIDDEN",
                "관리자 역할이 필요합니다",
            )),
        ));
    }

    info!(principal_id = %claims.sub, "Admin SSE stream opened");
    let rx = state.streams.register(&claims.sub, true).await;
    Ok(event_stream(rx))
}

fn authorize(
    state: &SseState,
    headers: &HeaderMap,
    query: &StreamQuery,
) -> Result<Claims, (StatusCode, Json<ApiErrorResponse>)> {
    authenticate_request(headers, query.token.as_deref(), &state.jwt_secret).map_err(
        |err: JwtError| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ApiErrorResponse::new("AUTH_REQUIRED", err.to_string())),
            )
        },
    )
}

/// 레지스트리 수신 핸들을 SSE 이벤트 스트림으로 변환합니다.
///
/// 프레임은 한 줄짜리 `data: {...}` 형식이며, 유휴 시 keep-alive
/// 주석이 삽입됩니다.
fn event_stream(
    rx: mpsc::Receiver<StreamEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = futures::stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Ok(to_sse_event(&event)), rx))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_sse_event(event: &StreamEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(json) => Event::default().data(json),
        Err(e) => Event::default().comment(format!("serialization error: {}", e)),
    }
}

/// SSE 라우터 생성.
pub fn sse_router(state: SseState) -> Router {
    Router::new()
        .route("/events", get(user_events))
        .route("/admin/events", get(admin_events))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{create_token, Claims};
    use crate::sse::registry::create_stream_registry;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    const TEST_SECRET: &str = "test-secret-key-for-jwt-testing-minimum-32-chars";

    fn test_app(state: &SseState) -> Router {
        sse_router(state.clone())
    }

    fn token_for(principal_id: &str, role: Role) -> String {
        create_token(&Claims::new(principal_id, role, 60), TEST_SECRET).unwrap()
    }

    #[tokio::test]
    async fn test_events_requires_token() {
        let state = SseState::new(create_stream_registry(32), TEST_SECRET);
        let response = test_app(&state)
            .oneshot(Request::builder().uri("/events").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_events_opens_stream_for_user() {
        let state = SseState::new(create_stream_registry(32), TEST_SECRET);
        let token = token_for("user_1", Role::User);

        let response = test_app(&state)
            .oneshot(
                Request::builder()
                    .uri(format!("/events?token={}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert!(content_type.starts_with("text/event-stream"));
        assert_eq!(state.streams.stream_count().await, 1);
    }

    #[tokio::test]
    async fn test_events_accepts_bearer_header() {
        let state = SseState::new(create_stream_registry(32), TEST_SECRET);
        let token = token_for("user_2", Role::User);

        let response = test_app(&state)
            .oneshot(
                Request::builder()
                    .uri("/events")
                    .header(
                        axum::http::header::AUTHORIZATION,
                        format!("Bearer {}", token),
                    )
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_events_rejects_regular_user() {
        let state = SseState::new(create_stream_registry(32), TEST_SECRET);
        let token = token_for("user_1", Role::User);

        let response = test_app(&state)
            .oneshot(
                Request::builder()
                    .uri(format!("/admin/events?token={}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(state.streams.stream_count().await, 0);
    }

    #[tokio::test]
    async fn test_admin_events_opens_admin_stream() {
        let state = SseState::new(create_stream_registry(32), TEST_SECRET);
        let token = token_for("ops", Role::Admin);

        let response = test_app(&state)
            .oneshot(
                Request::builder()
                    .uri(format!("/admin/events?token={}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.streams.admin_count().await, 1);
    }
}
