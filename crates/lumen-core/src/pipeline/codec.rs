//! CSV codec for raw light-curve files.
//!
//! Expected layout (header required, column order free):
//!
//! ```text
//! time,flux,flux_err,quality
//! 131.51,45213.7,12.1,0
//! 131.53,nan,,8
//! ```
//!
//! - `time` and `flux` are required columns.
//! - empty or `nan` cells become NaN (filtered later, not rejected here).
//! - a missing `flux_err` column or blank cell becomes NaN, a missing or blank
//!   `quality` becomes 0.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Provenance, RawObservationFile, Sample};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("file contains no samples")]
    NoSamples,

    #[error("row {row}: invalid {column} value '{value}'")]
    InvalidValue {
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv write failed: {0}")]
    Write(#[from] std::io::Error),
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    time: String,
    flux: String,
    #[serde(default)]
    flux_err: String,
    #[serde(default)]
    quality: String,
}

const COLUMNS: [&str; 4] = ["time", "flux", "flux_err", "quality"];

#[derive(Debug, Serialize)]
struct CsvRecord {
    time: f64,
    flux: f64,
    flux_err: f64,
    quality: u32,
}

/// Parse one downloaded CSV file.
pub fn parse_csv(bytes: &[u8], provenance: Provenance) -> Result<RawObservationFile, CodecError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    for required in ["time", "flux"] {
        if !headers.iter().any(|h| h == required) {
            return Err(CodecError::MissingColumn(required));
        }
    }

    let mut samples = Vec::new();
    for (i, row) in reader.deserialize::<CsvRow>().enumerate() {
        let row = row?;
        let line = i + 2; // 1-based, after the header
        samples.push(Sample::new(
            parse_float(&row.time, line, "time")?,
            parse_float(&row.flux, line, "flux")?,
            parse_float(&row.flux_err, line, "flux_err")?,
            parse_quality(&row.quality, line)?,
        ));
    }

    if samples.is_empty() {
        return Err(CodecError::NoSamples);
    }
    Ok(RawObservationFile::new(provenance, samples))
}

/// Render samples back to the CSV layout `parse_csv` reads.
///
/// The header is written even for an empty slice. Used to build fixtures.
pub fn render_csv(samples: &[Sample]) -> Result<Vec<u8>, CodecError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(COLUMNS)?;
    for s in samples {
        writer.serialize(CsvRecord {
            time: s.time,
            flux: s.flux,
            flux_err: s.flux_err,
            quality: s.quality,
        })?;
    }
    writer.into_inner().map_err(|e| CodecError::Write(e.into_error()))
}

fn parse_float(cell: &str, row: usize, column: &'static str) -> Result<f64, CodecError> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    cell.parse().map_err(|_| CodecError::InvalidValue {
        row,
        column,
        value: cell.to_string(),
    })
}

fn parse_quality(cell: &str, row: usize) -> Result<u32, CodecError> {
    if cell.is_empty() {
        return Ok(0);
    }
    cell.parse().map_err(|_| CodecError::InvalidValue {
        row,
        column: "quality",
        value: cell.to_string(),
    })
}
