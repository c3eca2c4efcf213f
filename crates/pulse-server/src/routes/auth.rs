//! 로그인 스텁 라우트.
//!
//! 데모 환경용 토큰 발급 엔드포인트입니다. 자격 증명 검증 없이
//! 저장소의 사용자 존재 여부와 관리자 플래그만으로 역할을 결정해
//! 토큰을 발급합니다.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use pulse_core::PulseError;

use crate::auth::{create_token, Claims, Role};
use crate::error::{api_error, ApiResult};
use crate::state::AppState;

/// 발급 토큰 유효 기간 (분).
const TOKEN_TTL_MINUTES: i64 = 60;

/// 로그인 요청.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// 사용자 ID
    pub user_id: String,
}

/// 로그인 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    /// 발급된 JWT
    pub token: String,
    /// 토큰 유형
    pub token_type: String,
    /// 부여된 역할
    pub role: Role,
    /// 유효 기간 (분)
    pub expires_in_minutes: i64,
}

/// 데모 로그인 (토큰 발급).
///
/// POST /api/v1/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let users = state.users.active_users().await.map_err(api_error)?;
    let user = users
        .into_iter()
        .find(|u| u.id == req.user_id)
        .ok_or_else(|| api_error(PulseError::NotFound(format!("사용자: {}", req.user_id))))?;

    let role = if user.is_admin { Role::Admin } else { Role::User };
    let claims = Claims::new(&user.id, role, TOKEN_TTL_MINUTES);
    let token = create_token(&claims, &state.jwt_secret)
        .map_err(|e| api_error(PulseError::Auth(e.to_string())))?;

    Ok(Json(LoginResponse {
        token,
        token_type: "Bearer".to_string(),
        role,
        expires_in_minutes: TOKEN_TTL_MINUTES,
    }))
}

/// 로그인 스텁 라우터.
pub fn auth_router() -> Router<Arc<AppState>> {
    Router::new().route("/login", post(login))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::decode_token;
    use crate::state::create_test_state;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::json;
    use tower::ServiceExt;

    async fn login_response(user_id: &str) -> axum::response::Response {
        let (state, _rx) = create_test_state().await;
        let app = Router::new()
            .nest("/api/v1/auth", auth_router())
            .with_state(Arc::new(state));

        app.oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/auth/login")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "user_id": user_id }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_login_issues_user_token() {
        let response = login_response("user_alice").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let login: LoginResponse = serde_json::from_slice(&body).unwrap();

        assert_eq!(login.token_type, "Bearer");
        assert_eq!(login.role, Role::User);

        let decoded = decode_token(
            &login.token,
            "test-secret-key-for-jwt-testing-minimum-32-chars",
        )
        .unwrap();
        assert_eq!(decoded.claims.sub, "user_alice");
        assert_eq!(decoded.claims.role, Role::User);
    }

    #[tokio::test]
    async fn test_login_admin_gets_admin_role() {
        let response = login_response("admin_ops").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let login: LoginResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(login.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_login_unknown_user_is_not_found() {
        let response = login_response("user_nobody").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
