//! Raw observation files as delivered by the upstream source.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One photometric measurement.
///
/// `time` is in days (BKJD for Kepler data), `flux` in e-/s.
/// Values are kept exactly as parsed: NaN / inf are filtered later by the
/// normalizer, not here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    pub flux: f64,
    pub flux_err: f64,
    pub quality: u32,
}

impl Sample {
    pub fn new(time: f64, flux: f64, flux_err: f64, quality: u32) -> Self {
        Self {
            time,
            flux,
            flux_err,
            quality,
        }
    }

    /// Both timestamp and flux are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.time.is_finite() && self.flux.is_finite()
    }
}

/// Where a raw file came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source_url: String,
    pub downloaded_at: DateTime<Utc>,

    /// Position of the file in the source's candidate ordering (0-based).
    /// Used as the deterministic tie-break when merging.
    pub source_index: usize,
}

/// One downloaded light-curve file.
///
/// Immutable after construction: the Fetcher builds it, the Normalizer only
/// reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawObservationFile {
    provenance: Provenance,
    samples: Vec<Sample>,
}

impl RawObservationFile {
    pub fn new(provenance: Provenance, samples: Vec<Sample>) -> Self {
        Self {
            provenance,
            samples,
        }
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub fn source_index(&self) -> usize {
        self.provenance.source_index
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
