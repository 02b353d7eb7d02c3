//! Artifact: the durable unit stored per target.
//!
//! An artifact bundles the normalized series, the deviation result computed
//! from it, and the metadata of the run that produced both. The two series
//! halves are checked against each other on construction and again whenever a
//! stored record is decoded.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::deviation::{DeviationResult, DeviationSummary, SUMMARY_TOLERANCE};
use super::ids::{RunId, TargetId};
use super::series::{NormalizedSeries, TimeWindow};

/// Request parameters recorded with the artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceParams {
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_files: Option<usize>,

    #[serde(default)]
    pub window: TimeWindow,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_bin_size_days: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub run_id: RunId,
    pub files_used: usize,
    pub files_attempted: usize,
    pub files_skipped: usize,
    pub created_at: DateTime<Utc>,
    pub params: SourceParams,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArtifactError {
    #[error("series has {series} samples but deviation has {deviation}")]
    LengthMismatch { series: usize, deviation: usize },

    #[error("deviation timestamp at index {index} does not match the series")]
    TimestampMismatch { index: usize },

    #[error("cached summary does not match the deviation series")]
    SummaryMismatch,

    #[error("metadata reports {files_used} files used but none were attempted")]
    InconsistentFileCounts { files_used: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    target: TargetId,
    series: NormalizedSeries,
    deviation: DeviationResult,
    metadata: ArtifactMetadata,
}

impl Artifact {
    pub fn new(
        target: TargetId,
        series: NormalizedSeries,
        deviation: DeviationResult,
        metadata: ArtifactMetadata,
    ) -> Result<Self, ArtifactError> {
        let artifact = Self {
            target,
            series,
            deviation,
            metadata,
        };
        artifact.validate()?;
        Ok(artifact)
    }

    /// Check that series, deviation and summary belong together.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.series.len() != self.deviation.len() {
            return Err(ArtifactError::LengthMismatch {
                series: self.series.len(),
                deviation: self.deviation.len(),
            });
        }
        let mismatch = self
            .series
            .points()
            .iter()
            .zip(self.deviation.points())
            .position(|(s, d)| s.time.to_bits() != d.time.to_bits());
        if let Some(index) = mismatch {
            return Err(ArtifactError::TimestampMismatch { index });
        }
        if !self.deviation.verify_summary(SUMMARY_TOLERANCE) {
            return Err(ArtifactError::SummaryMismatch);
        }
        if self.metadata.files_used > self.metadata.files_attempted {
            return Err(ArtifactError::InconsistentFileCounts {
                files_used: self.metadata.files_used,
            });
        }
        Ok(())
    }

    pub fn target(&self) -> TargetId {
        self.target
    }

    pub fn series(&self) -> &NormalizedSeries {
        &self.series
    }

    pub fn deviation(&self) -> &DeviationResult {
        &self.deviation
    }

    pub fn summary(&self) -> &DeviationSummary {
        self.deviation.summary()
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Shared artifact builders for tests across the crate.

    use super::*;
    use crate::domain::deviation::DeviationPoint;
    use crate::domain::series::SeriesPoint;
    use chrono::TimeZone;
    use ulid::Ulid;

    /// An artifact with `n` samples and a small sinusoidal deviation.
    pub fn artifact(target: u64, n: usize) -> Artifact {
        let series: Vec<SeriesPoint> = (0..n)
            .map(|i| SeriesPoint::new(100.0 + i as f64 * 0.5, 1.0 + (i as f64).sin() * 1e-3))
            .collect();
        artifact_from(target, series)
    }

    /// An artifact over arbitrary points, deviation taken against 1.0.
    pub fn artifact_from(target: u64, series: Vec<SeriesPoint>) -> Artifact {
        let n = series.len();
        let deviation: Vec<DeviationPoint> = series
            .iter()
            .map(|p| DeviationPoint {
                time: p.time,
                deviation: (p.flux - 1.0) * 100.0,
            })
            .collect();
        Artifact::new(
            TargetId::new(target),
            NormalizedSeries::new(series).unwrap(),
            DeviationResult::new(deviation),
            metadata(n.min(3)),
        )
        .unwrap()
    }

    pub fn metadata(files_used: usize) -> ArtifactMetadata {
        ArtifactMetadata {
            run_id: RunId::from_ulid(Ulid::from_parts(1_700_000_000_000, 7)),
            files_used,
            files_attempted: files_used,
            files_skipped: 0,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
            params: SourceParams {
                timeout: Duration::from_secs(120),
                max_files: None,
                window: TimeWindow::all(),
                time_bin_size_days: Some(0.5),
            },
        }
    }
}
