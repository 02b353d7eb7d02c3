//! Normalized flux series.
//!
//! `NormalizedSeries` is only constructible through `NormalizedSeries::new`,
//! which enforces the two invariants every consumer relies on:
//! timestamps strictly increasing, and no non-finite values.
//! Deserialization goes through the same check (`try_from`).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One (timestamp, normalized_flux) sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub time: f64,
    pub flux: f64,
}

impl SeriesPoint {
    pub fn new(time: f64, flux: f64) -> Self {
        Self { time, flux }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeriesError {
    #[error("series is empty")]
    Empty,

    #[error("non-finite value at index {index}")]
    NonFinite { index: usize },

    #[error("timestamp at index {index} does not increase ({previous} -> {current})")]
    NotIncreasing {
        index: usize,
        previous: f64,
        current: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<SeriesPoint>", into = "Vec<SeriesPoint>")]
pub struct NormalizedSeries {
    points: Vec<SeriesPoint>,
}

impl NormalizedSeries {
    pub fn new(points: Vec<SeriesPoint>) -> Result<Self, SeriesError> {
        if points.is_empty() {
            return Err(SeriesError::Empty);
        }
        for (index, p) in points.iter().enumerate() {
            if !p.time.is_finite() || !p.flux.is_finite() {
                return Err(SeriesError::NonFinite { index });
            }
            if index > 0 {
                let previous = points[index - 1].time;
                if p.time <= previous {
                    return Err(SeriesError::NotIncreasing {
                        index,
                        previous,
                        current: p.time,
                    });
                }
            }
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false for a constructed series; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.time)
    }

    pub fn fluxes(&self) -> impl Iterator<Item = f64> + '_ {
        self.points.iter().map(|p| p.flux)
    }

    /// Time covered from first to last sample, in days.
    pub fn duration_days(&self) -> f64 {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => last.time - first.time,
            _ => 0.0,
        }
    }
}

impl TryFrom<Vec<SeriesPoint>> for NormalizedSeries {
    type Error = SeriesError;

    fn try_from(points: Vec<SeriesPoint>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<NormalizedSeries> for Vec<SeriesPoint> {
    fn from(series: NormalizedSeries) -> Self {
        series.points
    }
}

/// Optional sub-range of the data to analyse, in days.
///
/// - `start_day` before the data start is clamped to the data start.
/// - `start_day + duration_days` past the data end is clamped to the data end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_day: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_days: Option<f64>,
}

impl TimeWindow {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_unbounded(&self) -> bool {
        self.start_day.is_none() && self.duration_days.is_none()
    }

    /// Resolve to a concrete inclusive `[start, end]` range given the data span.
    pub fn resolve(&self, data_min: f64, data_max: f64) -> (f64, f64) {
        let start = match self.start_day {
            Some(s) if s > data_min => s,
            _ => data_min,
        };
        let end = match self.duration_days {
            Some(d) => (start + d).min(data_max),
            None => data_max,
        };
        (start, end)
    }
}
