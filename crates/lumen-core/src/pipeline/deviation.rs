//! DeviationEngine: normalized series → deviation series + summary.
//!
//! deviation(t) = (flux(t) − baseline(t)) × 100, i.e. percent of the
//! normalized level. The baseline comes from the same series only.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::stats::{mean, median};
use crate::domain::{DeviationPoint, DeviationResult, NormalizedSeries};

/// Expected flux at each sample of a series.
pub trait BaselineModel: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// One baseline value per point, same order. Never called with an empty series.
    fn baseline(&self, series: &NormalizedSeries) -> Vec<f64>;
}

/// Single expected level: the median flux of the whole series.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalMedianBaseline;

impl BaselineModel for GlobalMedianBaseline {
    fn name(&self) -> &'static str {
        "global_median"
    }

    fn baseline(&self, series: &NormalizedSeries) -> Vec<f64> {
        let fluxes: Vec<f64> = series.fluxes().collect();
        let level = median(&fluxes).unwrap_or(1.0);
        vec![level; fluxes.len()]
    }
}

/// Mean of the `half_window` samples on each side (clamped at the edges).
#[derive(Debug, Clone, Copy)]
pub struct RollingMeanBaseline {
    pub half_window: usize,
}

impl BaselineModel for RollingMeanBaseline {
    fn name(&self) -> &'static str {
        "rolling_mean"
    }

    fn baseline(&self, series: &NormalizedSeries) -> Vec<f64> {
        let fluxes: Vec<f64> = series.fluxes().collect();
        let n = fluxes.len();
        (0..n)
            .map(|i| {
                let lo = i.saturating_sub(self.half_window);
                let hi = (i + self.half_window + 1).min(n);
                mean(&fluxes[lo..hi]).unwrap_or(fluxes[i])
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BaselineKind {
    #[default]
    GlobalMedian,
    RollingMean {
        half_window: usize,
    },
}

impl BaselineKind {
    pub fn build(self) -> Box<dyn BaselineModel> {
        match self {
            BaselineKind::GlobalMedian => Box::new(GlobalMedianBaseline),
            BaselineKind::RollingMean { half_window } => {
                Box::new(RollingMeanBaseline { half_window })
            }
        }
    }
}

#[derive(Debug)]
pub struct DeviationEngine {
    baseline: Box<dyn BaselineModel>,
}

impl Default for DeviationEngine {
    fn default() -> Self {
        Self::new(BaselineKind::default())
    }
}

impl DeviationEngine {
    pub fn new(kind: BaselineKind) -> Self {
        Self {
            baseline: kind.build(),
        }
    }

    pub fn with_baseline(baseline: Box<dyn BaselineModel>) -> Self {
        Self { baseline }
    }

    pub fn compute(&self, series: &NormalizedSeries) -> DeviationResult {
        let expected = self.baseline.baseline(series);
        let points: Vec<DeviationPoint> = series
            .points()
            .iter()
            .zip(expected)
            .map(|(p, base)| DeviationPoint {
                time: p.time,
                deviation: (p.flux - base) * 100.0,
            })
            .collect();

        let result = DeviationResult::new(points);
        debug!(
            baseline = self.baseline.name(),
            count = result.summary().count,
            max_abs = result.summary().max_abs,
            "deviation computed"
        );
        result
    }
}
