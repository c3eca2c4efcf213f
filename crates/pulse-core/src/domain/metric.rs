//! 운영/비즈니스 지표 타입.
//!
//! 지표 루프가 매 주기 샘플링하는 관측값과 이름별 이력 링을 정의합니다.

use std::collections::{HashMap, VecDeque};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// 지표 이름별 이력 최대 길이.
pub const DEFAULT_METRIC_HISTORY: usize = 100;

/// 지표 관측값.
///
/// 같은 이름의 직전 관측값으로부터 `delta`/`delta_percent`가 파생됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// 지표 이름 (예: "cpu_usage", "active_connections")
    pub name: String,
    /// 관측값
    pub value: f64,
    /// 관측 시각 (epoch 밀리초)
    pub timestamp: i64,
    /// 직전 관측값 대비 변동
    pub delta: f64,
    /// 직전 관측값 대비 변동률(%)
    pub delta_percent: f64,
}

impl Metric {
    /// 직전 관측값을 기준으로 새 지표를 생성합니다.
    ///
    /// 직전 관측값이 없으면(첫 관측) 변동은 0으로 채워집니다.
    pub fn observed(name: impl Into<String>, value: f64, previous: Option<&Metric>) -> Self {
        let (delta, delta_percent) = match previous {
            Some(prev) => {
                let delta = value - prev.value;
                let delta_percent = if prev.value == 0.0 {
                    0.0
                } else {
                    delta / prev.value * 100.0
                };
                (delta, delta_percent)
            }
            None => (0.0, 0.0),
        };

        Self {
            name: name.into(),
            value,
            timestamp: Utc::now().timestamp_millis(),
            delta,
            delta_percent,
        }
    }
}

/// 지표 이름별 관측 이력.
///
/// 이름별 이력은 최대 길이로 제한되며, 한도 초과 시 가장 오래된
/// 항목부터 제거됩니다.
#[derive(Debug, Clone)]
pub struct MetricHistory {
    max_entries: usize,
    series: HashMap<String, VecDeque<Metric>>,
}

impl Default for MetricHistory {
    fn default() -> Self {
        Self::new(DEFAULT_METRIC_HISTORY)
    }
}

impl MetricHistory {
    /// 이름별 최대 이력 길이를 지정해 생성합니다.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            series: HashMap::new(),
        }
    }

    /// 새 관측값을 기록하고 파생된 지표를 반환합니다.
    ///
    /// 같은 이름의 직전 관측값과 비교해 변동을 계산한 뒤 이력에
    /// 추가합니다. 이력이 한도를 넘으면 가장 오래된 항목을 제거합니다.
    pub fn record(&mut self, name: &str, value: f64) -> Metric {
        let entries = self.series.entry(name.to_string()).or_default();
        let metric = Metric::observed(name, value, entries.back());

        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(metric.clone());

        metric
    }

    /// 가장 최근 관측값을 반환합니다.
    pub fn last(&self, name: &str) -> Option<&Metric> {
        self.series.get(name).and_then(|s| s.back())
    }

    /// 이름별 이력 전체를 오래된 순으로 반환합니다.
    pub fn series(&self, name: &str) -> Vec<&Metric> {
        self.series
            .get(name)
            .map(|s| s.iter().collect())
            .unwrap_or_default()
    }

    /// 이름별 이력 길이를 반환합니다.
    pub fn len(&self, name: &str) -> usize {
        self.series.get(name).map(|s| s.len()).unwrap_or(0)
    }

    /// 기록된 지표 이름 목록을 반환합니다.
    pub fn names(&self) -> Vec<&str> {
        self.series.keys().map(|k| k.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_first_observation_has_zero_delta() {
        let metric = Metric::observed("cpu_usage", 42.0, None);

        assert_eq!(metric.delta, 0.0);
        assert_eq!(metric.delta_percent, 0.0);
    }

    #[test]
    fn test_metric_delta_vs_previous() {
        let prev = Metric::observed("cpu_usage", 50.0, None);
        let next = Metric::observed("cpu_usage", 60.0, Some(&prev));

        assert_eq!(next.delta, 10.0);
        assert_eq!(next.delta_percent, 20.0);
    }

    #[test]
    fn test_metric_delta_from_zero_previous() {
        let prev = Metric::observed("queue_depth", 0.0, None);
        let next = Metric::observed("queue_depth", 5.0, Some(&prev));

        assert_eq!(next.delta, 5.0);
        assert_eq!(next.delta_percent, 0.0);
    }

    #[test]
    fn test_history_ring_caps_entries() {
        let mut history = MetricHistory::new(100);

        for i in 0..150 {
            history.record("memory_usage", i as f64);
        }

        assert_eq!(history.len("memory_usage"), 100);
        // 가장 오래된 50개가 제거되었는지 확인
        let series = history.series("memory_usage");
        assert_eq!(series.first().map(|m| m.value), Some(50.0));
        assert_eq!(series.last().map(|m| m.value), Some(149.0));
    }

    #[test]
    fn test_history_tracks_names_independently() {
        let mut history = MetricHistory::default();

        history.record("cpu_usage", 10.0);
        history.record("memory_usage", 70.0);
        let second = history.record("cpu_usage", 15.0);

        assert_eq!(second.delta, 5.0);
        assert_eq!(history.len("cpu_usage"), 2);
        assert_eq!(history.len("memory_usage"), 1);
        assert_eq!(history.last("memory_usage").map(|m| m.value), Some(70.0));
    }
}
