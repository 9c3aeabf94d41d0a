//! Summary statistics over a measurement series.

use serde::{Deserialize, Serialize};

/// Aggregate of one series; computed once after collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    /// Number of samples
    pub count: usize,
    /// Minimum value
    pub min: f64,
    /// Maximum value
    pub max: f64,
    /// Arithmetic mean
    pub avg: f64,
    /// 95th percentile (nearest rank)
    pub p95: f64,
}

impl MetricStats {
    /// Calculate statistics; empty input yields all zeros
    #[must_use]
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let sum: f64 = sorted.iter().sum();
        Self {
            count,
            min: sorted[0],
            max: sorted[count - 1],
            avg: sum / count as f64,
            p95: percentile(&sorted, 0.95),
        }
    }

    /// Whether no samples were collected
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// `Some(avg)` when samples exist
    #[must_use]
    pub fn avg_if_any(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.avg)
    }

    /// `Some(p95)` when samples exist
    #[must_use]
    pub fn p95_if_any(&self) -> Option<f64> {
        (!self.is_empty()).then_some(self.p95)
    }
}

/// Nearest-rank percentile: `sorted[ceil(q * n) - 1]`, clamped to the slice
#[must_use]
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (q * sorted.len() as f64).ceil() as i64 - 1;
    let idx = rank.clamp(0, sorted.len() as i64 - 1) as usize;
    sorted[idx]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_p95_of_five_samples_is_max() {
        let stats = MetricStats::from_values(&[1100.0, 1200.0, 1250.0, 1300.0, 1400.0]);
        assert!((stats.p95 - 1400.0).abs() < f64::EPSILON);
        assert!((stats.avg - 1250.0).abs() < f64::EPSILON);
        assert!((stats.min - 1100.0).abs() < f64::EPSILON);
        assert!((stats.max - 1400.0).abs() < f64::EPSILON);
        assert_eq!(stats.count, 5);
    }

    #[test]
    fn test_p95_of_twenty_samples() {
        let values: Vec<f64> = (1..=20).map(f64::from).collect();
        // ceil(0.95 * 20) - 1 = 18
        assert!((MetricStats::from_values(&values).p95 - 19.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unsorted_input() {
        let stats = MetricStats::from_values(&[3.0, 1.0, 2.0]);
        assert!((stats.min - 1.0).abs() < f64::EPSILON);
        assert!((stats.p95 - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_single_sample() {
        let stats = MetricStats::from_values(&[42.0]);
        assert!((stats.p95 - 42.0).abs() < f64::EPSILON);
        assert_eq!(stats.avg_if_any(), Some(42.0));
    }

    #[test]
    fn test_empty_is_zero() {
        let stats = MetricStats::from_values(&[]);
        assert!(stats.is_empty());
        assert_eq!(stats, MetricStats::default());
        assert_eq!(stats.avg_if_any(), None);
        assert!(percentile(&[], 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_quantile_clamps_to_first() {
        assert!((percentile(&[5.0, 6.0], 0.0) - 5.0).abs() < f64::EPSILON);
    }
}
