//! 연결 상태 머신.

use serde::{Deserialize, Serialize};

/// 멀티플렉서의 연결 상태.
///
/// 전이: `Idle → Connecting → Open → ReconnectWait → Connecting …`,
/// 한도 초과 시 종단 상태 `GivenUp`. 정상 종료(코드 1000)는 `Closed`로
/// 전이하며 재연결하지 않습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// 구독자 없음, 연결 없음
    Idle,
    /// 연결 시도 중
    Connecting,
    /// 연결 수립됨
    Open,
    /// 재연결 대기 중 (백오프)
    ReconnectWait,
    /// 정상 종료됨 (재연결 없음)
    Closed,
    /// 재연결 한도 초과 (명시적 connect 전까지 종단)
    GivenUp,
}

impl ConnectionState {
    /// 연결이 수립된 상태인지 확인합니다.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// 연결 시도가 진행 중인 상태인지 확인합니다.
    ///
    /// 이 상태에서는 새 연결 시도를 시작하면 안 됩니다 (중복 연결 방지).
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::ReconnectWait)
    }

    /// 전송이 없는 비활성 상태인지 확인합니다.
    pub fn is_inactive(&self) -> bool {
        matches!(self, Self::Idle | Self::Closed | Self::GivenUp)
    }

    /// 종단 상태인지 확인합니다.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::GivenUp)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::ReconnectWait => "reconnect_wait",
            Self::Closed => "closed",
            Self::GivenUp => "given_up",
        };
        write!(f, "{}", s)
    }
}
