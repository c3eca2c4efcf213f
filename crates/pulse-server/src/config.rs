//! 환경변수 기반 서버 설정.
//!
//! 모든 값은 합리적인 기본값을 가지므로 환경변수 없이도 기동 가능합니다.
//! 운영 환경에서는 최소한 `JWT_SECRET`을 설정해야 합니다.

use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::warn;

/// 서버 전체 설정.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 바인딩할 호스트 주소
    pub host: String,
    /// 바인딩할 포트
    pub port: u16,
    /// JWT 서명 비밀키
    pub jwt_secret: String,
    /// 시세 배포 주기 (밀리초)
    pub feed_interval_ms: u64,
    /// 포트폴리오 평가 주기 (초)
    pub valuation_interval_secs: u64,
    /// 지표 샘플링 주기 (초)
    pub metrics_interval_secs: u64,
    /// 평가 영속화 유의 변동 임계값 (%)
    pub significance_threshold: Decimal,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            jwt_secret: "dev-secret-key-change-in-production".to_string(),
            feed_interval_ms: 2000,
            valuation_interval_secs: 10,
            metrics_interval_secs: 5,
            significance_threshold: dec!(1),
        }
    }
}

impl ServerConfig {
    /// 환경변수에서 설정 로드.
    ///
    /// # 환경변수
    ///
    /// - `PULSE_HOST`, `PULSE_PORT`: 바인딩 주소 (기본: 127.0.0.1:3000)
    /// - `JWT_SECRET`: 토큰 서명 비밀키 (미설정 시 개발용 기본값 + 경고)
    /// - `PULSE_FEED_INTERVAL_MS`: 시세 배포 주기
    /// - `PULSE_VALUATION_INTERVAL_SECS`: 포트폴리오 평가 주기
    /// - `PULSE_METRICS_INTERVAL_SECS`: 지표 샘플링 주기
    /// - `PULSE_SIGNIFICANCE_THRESHOLD`: 평가 영속화 임계값 (%)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let host = std::env::var("PULSE_HOST").unwrap_or(defaults.host);
        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            warn!("JWT_SECRET not set, using default (INSECURE for development only)");
            defaults.jwt_secret
        });

        Self {
            host,
            port: env_var_parse("PULSE_PORT", defaults.port),
            jwt_secret,
            feed_interval_ms: env_var_parse("PULSE_FEED_INTERVAL_MS", defaults.feed_interval_ms),
            valuation_interval_secs: env_var_parse(
                "PULSE_VALUATION_INTERVAL_SECS",
                defaults.valuation_interval_secs,
            ),
            metrics_interval_secs: env_var_parse(
                "PULSE_METRICS_INTERVAL_SECS",
                defaults.metrics_interval_secs,
            ),
            significance_threshold: env_var_parse(
                "PULSE_SIGNIFICANCE_THRESHOLD",
                defaults.significance_threshold,
            ),
        }
    }

    /// 소켓 주소 반환.
    ///
    /// # Errors
    /// `host:port` 형식이 유효하지 않으면 `AddrParseError`를 반환합니다.
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    /// 시세 배포 주기를 Duration으로 반환.
    pub fn feed_interval(&self) -> Duration {
        Duration::from_millis(self.feed_interval_ms)
    }

    /// 포트폴리오 평가 주기를 Duration으로 반환.
    pub fn valuation_interval(&self) -> Duration {
        Duration::from_secs(self.valuation_interval_secs)
    }

    /// 지표 샘플링 주기를 Duration으로 반환.
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_secs(self.metrics_interval_secs)
    }
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
