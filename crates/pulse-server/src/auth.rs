//! JWT 토큰 검증.
//!
//! SSE 라우트와 WebSocket 인증 프레임이 전달하는 Bearer 토큰을
//! 검증합니다. 토큰 발급(`create_token`)은 테스트와 로그인 스텁에서만
//! 사용됩니다.

use axum::http::HeaderMap;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};

/// 사용자 역할.
///
/// 낮은 역할은 높은 역할의 부분 집합입니다 (`level()` 비교).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// 조회 전용
    Viewer,
    /// 일반 사용자 (자신의 스트림 구독 가능)
    User,
    /// 관리자 (관리 채널/스트림 구독 가능)
    Admin,
}

impl Role {
    /// 역할 레벨을 반환합니다. 높을수록 더 많은 권한을 가집니다.
    pub fn level(&self) -> u8 {
        match self {
            Role::Viewer => 1,
            Role::User => 2,
            Role::Admin => 3,
        }
    }

    /// 관리자 여부.
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Viewer => write!(f, "viewer"),
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// JWT 페이로드.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - 주체(사용자) ID
    pub sub: String,
    /// 역할
    pub role: Role,
    /// 발급 시간 (Unix timestamp)
    pub iat: i64,
    /// 만료 시간 (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// 새로운 Claims 생성.
    ///
    /// # Arguments
    ///
    /// * `principal_id` - 주체 ID
    /// * `role` - 역할
    /// * `expires_in_minutes` - 만료 시간 (분)
    pub fn new(principal_id: impl Into<String>, role: Role, expires_in_minutes: i64) -> Self {
        let now = Utc::now();
        Self {
            sub: principal_id.into(),
            role,
            iat: now.timestamp(),
            exp: (now + Duration::minutes(expires_in_minutes)).timestamp(),
        }
    }

    /// 특정 역할 이상인지 확인.
    pub fn has_role(&self, required_role: Role) -> bool {
        self.role.level() >= required_role.level()
    }
}

/// JWT 처리 에러.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("토큰 인코딩 실패: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),
    #[error("토큰 디코딩 실패")]
    DecodingError,
    #[error("토큰이 만료되었습니다")]
    TokenExpired,
    #[error("잘못된 토큰 형식")]
    InvalidToken,
    #[error("토큰이 제공되지 않았습니다")]
    MissingToken,
}

/// 토큰 생성.
pub fn create_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(JwtError::from)
}

/// 토큰 디코딩 및 검증.
pub fn decode_token(token: &str, secret: &str) -> Result<TokenData<Claims>, JwtError> {
    let mut validation = Validation::default();
    validation.validate_exp = true;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::TokenExpired,
        jsonwebtoken::errors::ErrorKind::InvalidToken => JwtError::InvalidToken,
        _ => JwtError::DecodingError,
    })
}

/// 요청 헤더에서 Bearer 토큰을 추출합니다.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// 헤더 또는 쿼리 파라미터에서 찾은 토큰을 검증하고 Claims를 반환합니다.
///
/// SSE는 EventSource API가 커스텀 헤더를 지원하지 않아 `?token=`
/// 쿼리를 함께 허용합니다.
pub fn authenticate_request(
    headers: &HeaderMap,
    query_token: Option<&str>,
    secret: &str,
) -> Result<Claims, JwtError> {
    let token = bearer_token(headers)
        .or(query_token)
        .ok_or(JwtError::MissingToken)?;

    decode_token(token, secret).map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "test-secret-key-for-jwt-testing-minimum-32-chars";

    #[test]
    fn test_create_and_decode_token() {
        let claims = Claims::new("user_1", Role::User, 60);

        let token = create_token(&claims, TEST_SECRET).unwrap();
        assert!(!token.is_empty());

        let decoded = decode_token(&token, TEST_SECRET).unwrap();
        assert_eq!(decoded.claims.sub, "user_1");
        assert_eq!(decoded.claims.role, Role::User);
    }

    #[test]
    fn test_role_levels() {
        assert!(Role::Admin.level() > Role::User.level());
        assert!(Role::User.level() > Role::Viewer.level());
        assert!(Role::Admin.is_admin());
        assert!(!Role::User.is_admin());
    }

    #[test]
    fn test_claims_has_role() {
        let admin = Claims::new("admin_1", Role::Admin, 60);
        let user = Claims::new("user_1", Role::User, 60);

        assert!(admin.has_role(Role::User));
        assert!(admin.has_role(Role::Admin));
        assert!(user.has_role(Role::Viewer));
        assert!(!user.has_role(Role::Admin));
    }

    #[test]
    fn test_expired_token_rejected() {
        // 이미 만료된 토큰 (발급 시점에서 -10분)
        let mut claims = Claims::new("user_1", Role::User, 60);
        claims.exp = (Utc::now() - Duration::minutes(10)).timestamp();

        let token = create_token(&claims, TEST_SECRET).unwrap();
        let result = decode_token(&token, TEST_SECRET);

        assert!(matches!(result, Err(JwtError::TokenExpired)));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let claims = Claims::new("user_1", Role::Viewer, 60);
        let token = create_token(&claims, TEST_SECRET).unwrap();

        let result = decode_token(&token, "another-secret-key-for-testing-minimum-32c");
        assert!(result.is_err());
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer abc.def.ghi".parse().unwrap(),
        );

        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));

        let empty = HeaderMap::new();
        assert_eq!(bearer_token(&empty), None);
    }

    #[test]
    fn test_authenticate_request_query_fallback() {
        let claims = Claims::new("user_2", Role::User, 60);
        let token = create_token(&claims, TEST_SECRET).unwrap();

        let headers = HeaderMap::new();
        let result = authenticate_request(&headers, Some(&token), TEST_SECRET).unwrap();
        assert_eq!(result.sub, "user_2");

        let missing = authenticate_request(&headers, None, TEST_SECRET);
        assert!(matches!(missing, Err(JwtError::MissingToken)));
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(serde_json::to_string(&Role::Viewer).unwrap(), "\"viewer\"");
    }
}
