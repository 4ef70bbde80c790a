//! Usage and resource metrics attached to each registry entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Relative change below which a resource sample counts as stable.
const TREND_TOLERANCE: f64 = 0.05;

/// Direction a resource measurement is moving in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increasing,
    Decreasing,
    #[default]
    Stable,
}

/// Which resource a sample belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Memory,
    Cpu,
    Storage,
    Network,
}

/// Rolling statistics for one resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceUsage {
    pub current: f64,
    pub average: f64,
    pub peak: f64,
    pub trend: Trend,
    pub samples: u64,
}

impl ResourceUsage {
    /// Fold a new sample into the running statistics.
    pub fn record(&mut self, value: f64) {
        let value = value.max(0.0);
        self.trend = if self.samples == 0 {
            Trend::Stable
        } else {
            let baseline = self.current.abs().max(f64::EPSILON);
            let delta = (value - self.current) / baseline;
            if delta > TREND_TOLERANCE {
                Trend::Increasing
            } else if delta < -TREND_TOLERANCE {
                Trend::Decreasing
            } else {
                Trend::Stable
            }
        };
        self.samples += 1;
        self.current = value;
        self.average += (value - self.average) / self.samples as f64;
        if value > self.peak {
            self.peak = value;
        }
    }
}

/// Resource snapshots for memory, CPU, storage and network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsageSnapshot {
    pub memory: ResourceUsage,
    pub cpu: ResourceUsage,
    pub storage: ResourceUsage,
    pub network: ResourceUsage,
}

impl ResourceUsageSnapshot {
    pub fn get(&self, kind: ResourceKind) -> &ResourceUsage {
        match kind {
            ResourceKind::Memory => &self.memory,
            ResourceKind::Cpu => &self.cpu,
            ResourceKind::Storage => &self.storage,
            ResourceKind::Network => &self.network,
        }
    }

    pub fn get_mut(&mut self, kind: ResourceKind) -> &mut ResourceUsage {
        match kind {
            ResourceKind::Memory => &mut self.memory,
            ResourceKind::Cpu => &mut self.cpu,
            ResourceKind::Storage => &mut self.storage,
            ResourceKind::Network => &mut self.network,
        }
    }
}

/// Usage metrics for one capability.
///
/// `error_rate` is `failed_calls / total_calls * 100` and is always in
/// `[0, 100]`; `success_rate` is its complement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityMetrics {
    /// Successful `get_capability` lookups.
    pub usage_count: u64,
    pub last_used: Option<DateTime<Utc>>,
    /// Rolling mean over reported call outcomes, in milliseconds.
    pub average_response_time_ms: f64,
    pub error_rate: f64,
    pub success_rate: f64,
    pub total_calls: u64,
    pub failed_calls: u64,
    pub resource_usage: ResourceUsageSnapshot,
}

impl Default for CapabilityMetrics {
    fn default() -> Self {
        Self {
            usage_count: 0,
            last_used: None,
            average_response_time_ms: 0.0,
            error_rate: 0.0,
            success_rate: 100.0,
            total_calls: 0,
            failed_calls: 0,
            resource_usage: ResourceUsageSnapshot::default(),
        }
    }
}

impl CapabilityMetrics {
    /// Count one lookup.
    pub fn record_usage(&mut self, at: DateTime<Utc>) {
        self.usage_count += 1;
        self.last_used = Some(at);
    }

    /// Fold one call outcome into the response time and error/success rates.
    pub fn record_outcome(&mut self, success: bool, response_time_ms: f64) {
        self.total_calls += 1;
        if !success {
            self.failed_calls += 1;
        }
        let sample = if response_time_ms.is_finite() {
            response_time_ms.max(0.0)
        } else {
            0.0
        };
        self.average_response_time_ms +=
            (sample - self.average_response_time_ms) / self.total_calls as f64;

        let error_rate = self.failed_calls as f64 / self.total_calls as f64 * 100.0;
        self.error_rate = error_rate.clamp(0.0, 100.0);
        self.success_rate = 100.0 - self.error_rate;
    }

    pub fn record_resource(&mut self, kind: ResourceKind, value: f64) {
        self.resource_usage.get_mut(kind).record(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_skeleton() {
        let m = CapabilityMetrics::default();
        assert_eq!(m.usage_count, 0);
        assert_eq!(m.success_rate, 100.0);
        assert_eq!(m.error_rate, 0.0);
        assert_eq!(m.resource_usage.cpu.trend, Trend::Stable);
    }

    #[test]
    fn test_outcome_rates() {
        let mut m = CapabilityMetrics::default();
        m.record_outcome(true, 10.0);
        m.record_outcome(true, 20.0);
        m.record_outcome(false, 30.0);
        m.record_outcome(true, 40.0);

        assert_eq!(m.total_calls, 4);
        assert_eq!(m.failed_calls, 1);
        assert!((m.error_rate - 25.0).abs() < 1e-9);
        assert!((m.success_rate - 75.0).abs() < 1e-9);
        assert!((m.average_response_time_ms - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_error_rate_stays_bounded() {
        let mut m = CapabilityMetrics::default();
        for _ in 0..10 {
            m.record_outcome(false, f64::NAN);
        }
        assert_eq!(m.error_rate, 100.0);
        assert_eq!(m.success_rate, 0.0);
        assert_eq!(m.average_response_time_ms, 0.0);
    }

    #[test]
    fn test_resource_trend_and_peak() {
        let mut usage = ResourceUsage::default();
        usage.record(100.0);
        assert_eq!(usage.trend, Trend::Stable);
        usage.record(200.0);
        assert_eq!(usage.trend, Trend::Increasing);
        usage.record(201.0);
        assert_eq!(usage.trend, Trend::Stable);
        usage.record(50.0);
        assert_eq!(usage.trend, Trend::Decreasing);
        assert_eq!(usage.peak, 201.0);
        assert_eq!(usage.current, 50.0);
        assert_eq!(usage.samples, 4);
        assert!((usage.average - 137.75).abs() < 1e-9);
    }
}
