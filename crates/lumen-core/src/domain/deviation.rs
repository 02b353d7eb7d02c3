//! Deviation result: per-sample deviation (percent) and its summary.
//!
//! The summary is cached in the result but is always re-derivable from the
//! deviation points alone via `DeviationSummary::from_points`.

use serde::{Deserialize, Serialize};

/// Default tolerance when comparing a stored summary with a fresh derivation.
pub const SUMMARY_TOLERANCE: f64 = 1e-9;

/// Deviation of one sample from the expected baseline, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviationPoint {
    pub time: f64,
    pub deviation: f64,
}

/// Summary scalars of a deviation series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviationSummary {
    pub count: usize,
    pub mean: f64,

    /// Largest absolute deviation.
    pub max_abs: f64,

    /// Population standard deviation.
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,

    /// Time covered by the series, in days.
    pub duration_days: f64,
}

impl DeviationSummary {
    /// Derive the summary from the deviation series.
    ///
    /// Summation is done in series order so the result is bit-for-bit
    /// reproducible for the same input.
    pub fn from_points(points: &[DeviationPoint]) -> Self {
        let count = points.len();
        if count == 0 {
            return Self {
                count: 0,
                mean: 0.0,
                max_abs: 0.0,
                std_dev: 0.0,
                min: 0.0,
                max: 0.0,
                duration_days: 0.0,
            };
        }

        let n = count as f64;
        let mean = points.iter().map(|p| p.deviation).sum::<f64>() / n;
        let variance = points
            .iter()
            .map(|p| (p.deviation - mean).powi(2))
            .sum::<f64>()
            / n;

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut max_abs = 0.0_f64;
        for p in points {
            min = min.min(p.deviation);
            max = max.max(p.deviation);
            max_abs = max_abs.max(p.deviation.abs());
        }

        Self {
            count,
            mean,
            max_abs,
            std_dev: variance.sqrt(),
            min,
            max,
            duration_days: points[count - 1].time - points[0].time,
        }
    }

    /// Field-wise comparison with an absolute tolerance. `count` must match exactly.
    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        let close = |a: f64, b: f64| (a - b).abs() <= tolerance;
        self.count == other.count
            && close(self.mean, other.mean)
            && close(self.max_abs, other.max_abs)
            && close(self.std_dev, other.std_dev)
            && close(self.min, other.min)
            && close(self.max, other.max)
            && close(self.duration_days, other.duration_days)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviationResult {
    points: Vec<DeviationPoint>,
    summary: DeviationSummary,
}

impl DeviationResult {
    /// Build a result, computing the summary once.
    pub fn new(points: Vec<DeviationPoint>) -> Self {
        let summary = DeviationSummary::from_points(&points);
        Self { points, summary }
    }

    pub fn points(&self) -> &[DeviationPoint] {
        &self.points
    }

    pub fn summary(&self) -> &DeviationSummary {
        &self.summary
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Does the cached summary match a fresh derivation from the points?
    pub fn verify_summary(&self, tolerance: f64) -> bool {
        DeviationSummary::from_points(&self.points).approx_eq(&self.summary, tolerance)
    }
}
