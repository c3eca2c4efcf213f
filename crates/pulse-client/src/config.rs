//! 멀티플렉서 설정.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 연결 멀티플렉서 설정.
///
/// 연결 타임아웃과 지수 백오프 재연결 파라미터를 포함합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiplexerConfig {
    /// WebSocket 엔드포인트 URL
    pub url: String,

    /// 연결 타임아웃 (밀리초). 이 시간 안에 열리지도 실패하지도
    /// 않은 연결 시도는 실패로 처리됩니다.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// 첫 재연결 대기 시간 (밀리초)
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,

    /// 최대 재연결 대기 시간 (밀리초)
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,

    /// 최대 재연결 시도 횟수 (0 = 무제한)
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// 구독자별 이벤트 채널 버퍼 크기
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_reconnect_base_ms() -> u64 {
    1_000
}

fn default_reconnect_max_ms() -> u64 {
    30_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_subscriber_buffer() -> usize {
    64
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

impl MultiplexerConfig {
    /// 주어진 URL로 새 설정을 생성합니다.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// 연결 타임아웃 설정.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// 백오프 파라미터 설정.
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.reconnect_base_ms = base.as_millis() as u64;
        self.reconnect_max_ms = max.as_millis() as u64;
        self
    }

    /// 최대 재연결 시도 횟수 설정 (0 = 무제한).
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// 연결 타임아웃을 Duration으로 반환합니다.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// n번째 시도 실패 후의 재연결 대기 시간을 계산합니다.
    ///
    /// `delay(attempt) = min(base × 2^(attempt−1), max)`, attempt는
    /// 1부터 셉니다. 단조 증가하며 최대값에서 멈춥니다.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63);
        let delay = self.reconnect_base_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.reconnect_max_ms))
    }

    /// 연속 실패 횟수를 기준으로 재연결을 계속할지 결정합니다.
    pub fn should_reconnect(&self, failed_attempts: u32) -> bool {
        self.max_reconnect_attempts == 0 || failed_attempts < self.max_reconnect_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MultiplexerConfig::default();

        assert_eq!(config.connect_timeout_ms, 5_000);
        assert_eq!(config.reconnect_base_ms, 1_000);
        assert_eq!(config.reconnect_max_ms, 30_000);
        assert_eq!(config.max_reconnect_attempts, 5);
    }

    #[test]
    fn test_backoff_starts_at_base_and_doubles() {
        let config = MultiplexerConfig::default();

        assert_eq!(config.delay_for(1), Duration::from_secs(1));
        assert_eq!(config.delay_for(2), Duration::from_secs(2));
        assert_eq!(config.delay_for(3), Duration::from_secs(4));
        assert_eq!(config.delay_for(4), Duration::from_secs(8));
    }

    #[test]
    fn test_backoff_monotonic_and_capped() {
        let config = MultiplexerConfig::default();
        let cap = Duration::from_millis(config.reconnect_max_ms);

        let mut previous = Duration::ZERO;
        for attempt in 1..=20 {
            let delay = config.delay_for(attempt);
            assert!(delay >= previous, "delay must not decrease");
            assert!(delay <= cap, "delay must not exceed the cap");
            previous = delay;
        }
        assert_eq!(config.delay_for(20), cap);
    }

    #[test]
    fn test_backoff_does_not_overflow_on_large_attempts() {
        let config = MultiplexerConfig::default();
        assert_eq!(
            config.delay_for(u32::MAX),
            Duration::from_millis(config.reconnect_max_ms)
        );
    }

    #[test]
    fn test_should_reconnect_respects_ceiling() {
        let config = MultiplexerConfig::new("ws://localhost").with_max_reconnect_attempts(3);

        assert!(config.should_reconnect(0));
        assert!(config.should_reconnect(2));
        assert!(!config.should_reconnect(3));
        assert!(!config.should_reconnect(4));
    }

    #[test]
    fn test_should_reconnect_unlimited() {
        let config = MultiplexerConfig::new("ws://localhost").with_max_reconnect_attempts(0);
        assert!(config.should_reconnect(1_000));
    }

    #[test]
    fn test_builder() {
        let config = MultiplexerConfig::new("ws://localhost:3001/ws")
            .with_connect_timeout(Duration::from_secs(3))
            .with_backoff(Duration::from_millis(100), Duration::from_secs(5))
            .with_max_reconnect_attempts(10);

        assert_eq!(config.url, "ws://localhost:3001/ws");
        assert_eq!(config.connect_timeout(), Duration::from_secs(3));
        assert_eq!(config.delay_for(1), Duration::from_millis(100));
        assert_eq!(config.max_reconnect_attempts, 10);
    }
}
