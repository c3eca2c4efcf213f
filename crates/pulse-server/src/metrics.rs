//! Prometheus 메트릭 설정 및 유틸리티.
//!
//! 연결 게이지, 팬아웃 카운터, 루프 주기 히스토그램을 수집하고
//! `/metrics` 엔드포인트로 노출합니다.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

/// Prometheus 메트릭 레코더를 설정하고 핸들을 반환합니다.
///
/// # 반환값
///
/// `/metrics` 엔드포인트에서 메트릭을 렌더링하기 위한 `PrometheusHandle`
///
/// # 패닉
///
/// 레코더가 이미 설치되어 있으면 패닉합니다.
pub fn setup_metrics_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        // 루프 주기 지속 시간 히스토그램 버킷 설정
        .set_buckets_for_metric(
            Matcher::Full("pulse_cycle_duration_seconds".to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
        )
        .expect("히스토그램 버킷 설정 실패")
        .install_recorder()
        .expect("Prometheus 레코더 설치 실패")
}

// ============================================================================
// 연결 게이지
// ============================================================================

/// WebSocket 연결 수 증가.
pub fn increment_ws_connections() {
    gauge!("pulse_ws_connections_active").increment(1.0);
}

/// WebSocket 연결 수 감소.
pub fn decrement_ws_connections() {
    gauge!("pulse_ws_connections_active").decrement(1.0);
}

/// SSE 스트림 수 설정.
pub fn set_sse_streams(count: f64) {
    gauge!("pulse_sse_streams_active").set(count);
}

/// 채널 구독 멤버 수 설정.
pub fn set_channel_members(channel: &str, count: f64) {
    gauge!("pulse_channel_members", "channel" => channel.to_string()).set(count);
}

// ============================================================================
// 배포 카운터
// ============================================================================

/// 채널 팬아웃 전달 건수 기록.
pub fn record_fan_out(channel: &str, delivered: u64) {
    counter!("pulse_fan_out_delivered_total", "channel" => channel.to_string())
        .increment(delivered);
}

/// 가득 찬/닫힌 아웃박스로 건너뛴 건수 기록.
pub fn record_fan_out_skipped(channel: &str, skipped: u64) {
    counter!("pulse_fan_out_skipped_total", "channel" => channel.to_string()).increment(skipped);
}

/// 시세 업데이트 배포 건수 증가.
pub fn record_price_update(symbol: &str) {
    counter!("pulse_price_updates_total", "symbol" => symbol.to_string()).increment(1);
}

/// 보안 알림 발행 카운터 증가.
pub fn record_alert(alert_type: &str, severity: &str) {
    counter!(
        "pulse_alerts_total",
        "type" => alert_type.to_string(),
        "severity" => severity.to_string()
    )
    .increment(1);
}

/// 수신된 트랜잭션 이벤트 카운터 증가.
pub fn record_transaction(kind: &str) {
    counter!("pulse_transactions_total", "kind" => kind.to_string()).increment(1);
}

// ============================================================================
// 루프 히스토그램
// ============================================================================

/// 루프 한 주기의 지속 시간 기록.
pub fn record_cycle_duration(loop_name: &str, duration_secs: f64) {
    histogram!("pulse_cycle_duration_seconds", "loop" => loop_name.to_string())
        .record(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    // 레코더 미설치 상태에서 메트릭 매크로는 no-op이어야 함
    #[test]
    fn test_helpers_work_without_recorder() {
        increment_ws_connections();
        decrement_ws_connections();
        set_sse_streams(3.0);
        set_channel_members("analytics_dashboard", 2.0);
        record_fan_out("security_alerts", 5);
        record_fan_out_skipped("security_alerts", 1);
        record_price_update("BTC");
        record_alert("large_withdrawal", "critical");
        record_transaction("withdrawal");
        record_cycle_duration("valuation", 0.012);
    }
}
