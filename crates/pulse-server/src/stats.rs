//! 루프 주기 통계 구조체.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 타이머 루프 한 주기의 처리 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleStats {
    /// 총 처리 대상 수
    pub total: usize,
    /// 성공 횟수
    pub success: usize,
    /// 에러 횟수
    pub errors: usize,
    /// 건너뛴 횟수 (변동 없음 등)
    pub skipped: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl CycleStats {
    /// 새 통계 객체 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 성공률 계산 (%)
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.success as f64 / self.total as f64) * 100.0
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        tracing::debug!(
            operation = operation,
            total = self.total,
            success = self.success,
            errors = self.errors,
            skipped = self.skipped,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.3}s", self.elapsed.as_secs_f64()),
            "주기 완료"
        );
    }
}
