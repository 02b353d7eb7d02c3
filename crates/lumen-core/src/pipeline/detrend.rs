//! Detrending strategies.
//!
//! A detrender turns merged raw flux into flux relative to a local baseline
//! (≈ 1.0), so samples from different files / quarters become comparable.
//!
//! - `SegmentMedianDetrender`: divide each source file by its own median.
//! - `RollingMedianDetrender`: segment median first, then divide by the
//!   running median within `window_days`, restricted to the same file.
//!   This removes slow instrumental trends while keeping short dips.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::normalizer::NormalizeError;
use super::stats::median;

pub const DEFAULT_FLATTEN_WINDOW_DAYS: f64 = 2.0;

/// One sample after filtering and merging, sorted by time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergedSample {
    pub time: f64,
    pub flux: f64,
    pub quality: u32,
    pub source_index: usize,
}

pub trait Detrender: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Return one detrended flux value per input sample, same order.
    fn detrend(&self, samples: &[MergedSample]) -> Result<Vec<f64>, NormalizeError>;
}

/// Detrender selection as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetrenderKind {
    SegmentMedian,
    RollingMedian { window_days: f64 },
}

impl DetrenderKind {
    pub fn build(self) -> Box<dyn Detrender> {
        match self {
            DetrenderKind::SegmentMedian => Box::new(SegmentMedianDetrender),
            DetrenderKind::RollingMedian { window_days } => {
                Box::new(RollingMedianDetrender::new(window_days))
            }
        }
    }
}

impl Default for DetrenderKind {
    fn default() -> Self {
        DetrenderKind::RollingMedian {
            window_days: DEFAULT_FLATTEN_WINDOW_DAYS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SegmentMedianDetrender;

impl Detrender for SegmentMedianDetrender {
    fn name(&self) -> &'static str {
        "segment_median"
    }

    fn detrend(&self, samples: &[MergedSample]) -> Result<Vec<f64>, NormalizeError> {
        let medians = segment_medians(samples)?;
        Ok(samples
            .iter()
            .map(|s| s.flux / medians[&s.source_index])
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RollingMedianDetrender {
    window_days: f64,
}

impl RollingMedianDetrender {
    pub fn new(window_days: f64) -> Self {
        Self { window_days }
    }
}

impl Detrender for RollingMedianDetrender {
    fn name(&self) -> &'static str {
        "rolling_median"
    }

    fn detrend(&self, samples: &[MergedSample]) -> Result<Vec<f64>, NormalizeError> {
        let normalized = SegmentMedianDetrender.detrend(samples)?;
        let half = self.window_days / 2.0;

        let mut out = Vec::with_capacity(samples.len());
        let mut window = Vec::new();
        for (i, s) in samples.iter().enumerate() {
            // samples are time-sorted, so the window is a contiguous index range
            let lo = samples.partition_point(|o| o.time < s.time - half);
            let hi = samples.partition_point(|o| o.time <= s.time + half);

            window.clear();
            window.extend(
                (lo..hi)
                    .filter(|&j| samples[j].source_index == s.source_index)
                    .map(|j| normalized[j]),
            );
            let trend = median(&window).unwrap_or(normalized[i]);
            if !trend.is_finite() || trend <= 0.0 {
                return Err(NormalizeError::DegenerateBaseline {
                    source_index: s.source_index,
                });
            }
            out.push(normalized[i] / trend);
        }
        Ok(out)
    }
}

fn segment_medians(samples: &[MergedSample]) -> Result<BTreeMap<usize, f64>, NormalizeError> {
    let mut by_segment: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
    for s in samples {
        by_segment.entry(s.source_index).or_default().push(s.flux);
    }

    let mut medians = BTreeMap::new();
    for (source_index, fluxes) in by_segment {
        match median(&fluxes) {
            Some(m) if m.is_finite() && m > 0.0 => {
                medians.insert(source_index, m);
            }
            _ => return Err(NormalizeError::DegenerateBaseline { source_index }),
        }
    }
    Ok(medians)
}
