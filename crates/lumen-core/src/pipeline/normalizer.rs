//! Normalizer: raw files → one `NormalizedSeries`.
//!
//! # 処理順序
//!
//! 1. drop samples with non-finite time/flux or a quality flag hitting the bitmask
//! 2. merge + dedupe by timestamp (lower quality flag wins, then source order)
//! 3. optional time window
//! 4. `min_samples` check
//! 5. sigma clipping per source file, then `min_samples` again
//! 6. detrend (`Detrender` strategy)
//! 7. optional binning, then `min_binned_points`
//!
//! Pure and synchronous; the orchestrator runs it on the blocking pool.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::detrend::{Detrender, DetrenderKind, MergedSample};
use super::stats::{mean, median, std_dev_around};
use crate::domain::{NormalizedSeries, RawObservationFile, SeriesError, SeriesPoint, TimeWindow};

pub const DEFAULT_MIN_SAMPLES: usize = 10;

/// Fewest points a binned series may keep. One point would always sit on
/// its own median and yield an all-zero deviation.
pub const DEFAULT_MIN_BINNED_POINTS: usize = 3;

/// Kepler pipeline "default" quality bitmask.
pub const KEPLER_DEFAULT_BITMASK: u32 = 1_130_799;

pub const DEFAULT_OUTLIER_SIGMA: f64 = 5.0;

pub const DEFAULT_TIME_BIN_SIZE_DAYS: f64 = 0.5;

const SIGMA_CLIP_MAX_ITERS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    pub min_samples: usize,
    pub min_binned_points: usize,
    pub quality_bitmask: u32,

    /// `None` disables outlier rejection.
    pub outlier_sigma: Option<f64>,
    pub detrender: DetrenderKind,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            min_samples: DEFAULT_MIN_SAMPLES,
            min_binned_points: DEFAULT_MIN_BINNED_POINTS,
            quality_bitmask: KEPLER_DEFAULT_BITMASK,
            outlier_sigma: Some(DEFAULT_OUTLIER_SIGMA),
            detrender: DetrenderKind::default(),
        }
    }
}

/// Per-request parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NormalizeParams {
    pub window: TimeWindow,
    pub time_bin_size_days: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NormalizeError {
    #[error("no input files")]
    NoInput,

    #[error("insufficient samples: found {found}, need at least {required}")]
    InsufficientSamples { found: usize, required: usize },

    #[error("time window [{start}, {end}] contains no samples")]
    EmptyTimeWindow { start: f64, end: f64 },

    #[error("file #{source_index} has no usable flux baseline")]
    DegenerateBaseline { source_index: usize },

    #[error("invalid series: {0}")]
    InvalidSeries(#[from] SeriesError),
}

#[derive(Debug)]
pub struct Normalizer {
    config: NormalizerConfig,
    detrender: Box<dyn Detrender>,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        let detrender = config.detrender.build();
        Self { config, detrender }
    }

    /// Use a custom detrending strategy instead of the configured one.
    pub fn with_detrender(config: NormalizerConfig, detrender: Box<dyn Detrender>) -> Self {
        Self { config, detrender }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    pub fn normalize(
        &self,
        files: &[RawObservationFile],
        params: &NormalizeParams,
    ) -> Result<NormalizedSeries, NormalizeError> {
        if files.is_empty() {
            return Err(NormalizeError::NoInput);
        }

        let total: usize = files.iter().map(RawObservationFile::len).sum();
        let mut samples = self.merge(files);
        debug!(total, valid = samples.len(), "merged samples");

        if !params.window.is_unbounded() {
            samples = apply_window(samples, &params.window)?;
        }

        ensure_at_least(samples.len(), self.config.min_samples)?;

        if let Some(sigma) = self.config.outlier_sigma {
            let before = samples.len();
            samples = sigma_clip(samples, sigma);
            debug!(removed = before - samples.len(), sigma, "sigma clipped");
            ensure_at_least(samples.len(), self.config.min_samples)?;
        }

        let fluxes = self.detrender.detrend(&samples)?;
        let mut points: Vec<SeriesPoint> = samples
            .iter()
            .zip(fluxes)
            .map(|(s, flux)| SeriesPoint::new(s.time, flux))
            .collect();

        if let Some(bin) = params.time_bin_size_days {
            points = bin_points(&points, bin);
            debug!(bins = points.len(), bin_days = bin, "binned");
            ensure_at_least(points.len(), self.config.min_binned_points)?;
        }

        debug!(
            points = points.len(),
            detrender = self.detrender.name(),
            "normalized"
        );
        Ok(NormalizedSeries::new(points)?)
    }

    /// Steps 1 and 2: filter, then sort and dedupe.
    fn merge(&self, files: &[RawObservationFile]) -> Vec<MergedSample> {
        let mask = self.config.quality_bitmask;
        let mut merged: Vec<MergedSample> = files
            .iter()
            .flat_map(|file| {
                let source_index = file.source_index();
                file.samples()
                    .iter()
                    .filter(move |s| s.is_finite() && s.quality & mask == 0)
                    .map(move |s| MergedSample {
                        // -0.0 and 0.0 are one timestamp
                        time: s.time + 0.0,
                        flux: s.flux,
                        quality: s.quality,
                        source_index,
                    })
            })
            .collect();

        // stable sort: equal keys keep their order within a file
        merged.sort_by(|a, b| {
            a.time
                .total_cmp(&b.time)
                .then(a.quality.cmp(&b.quality))
                .then(a.source_index.cmp(&b.source_index))
        });
        merged.dedup_by(|later, kept| later.time == kept.time);
        merged
    }
}

fn ensure_at_least(found: usize, required: usize) -> Result<(), NormalizeError> {
    if found < required {
        return Err(NormalizeError::InsufficientSamples { found, required });
    }
    Ok(())
}

fn apply_window(
    samples: Vec<MergedSample>,
    window: &TimeWindow,
) -> Result<Vec<MergedSample>, NormalizeError> {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return Ok(samples);
    };
    let (start, end) = window.resolve(first.time, last.time);

    let kept: Vec<MergedSample> = samples
        .into_iter()
        .filter(|s| s.time >= start && s.time <= end)
        .collect();
    if kept.is_empty() {
        return Err(NormalizeError::EmptyTimeWindow { start, end });
    }
    Ok(kept)
}

/// Iterative sigma clipping around the median, each source file on its own.
fn sigma_clip(samples: Vec<MergedSample>, sigma: f64) -> Vec<MergedSample> {
    let mut keep = vec![true; samples.len()];

    let mut segments: Vec<usize> = samples.iter().map(|s| s.source_index).collect();
    segments.sort_unstable();
    segments.dedup();

    for segment in segments {
        let members: Vec<usize> = (0..samples.len())
            .filter(|&i| samples[i].source_index == segment)
            .collect();

        for _ in 0..SIGMA_CLIP_MAX_ITERS {
            let values: Vec<f64> = members
                .iter()
                .filter(|&&i| keep[i])
                .map(|&i| samples[i].flux)
                .collect();
            let (Some(center), Some(avg)) = (median(&values), mean(&values)) else {
                break;
            };
            let Some(spread) = std_dev_around(&values, avg) else {
                break;
            };
            if spread == 0.0 {
                break;
            }

            let limit = sigma * spread;
            let rejected: Vec<usize> = members
                .iter()
                .copied()
                .filter(|&i| keep[i] && (samples[i].flux - center).abs() > limit)
                .collect();
            if rejected.is_empty() || rejected.len() == values.len() {
                break;
            }
            for i in rejected {
                keep[i] = false;
            }
        }
    }

    samples
        .into_iter()
        .zip(keep)
        .filter_map(|(s, k)| k.then_some(s))
        .collect()
}

/// Mean time and mean flux per fixed-width bin; empty bins are omitted.
fn bin_points(points: &[SeriesPoint], bin: f64) -> Vec<SeriesPoint> {
    let Some(first) = points.first() else {
        return Vec::new();
    };
    let origin = first.time;

    let mut out = Vec::new();
    let mut current: Option<i64> = None;
    let (mut sum_t, mut sum_f, mut n) = (0.0, 0.0, 0usize);

    for p in points {
        let index = ((p.time - origin) / bin).floor() as i64;
        if current.is_some_and(|c| c != index) && n > 0 {
            out.push(SeriesPoint::new(sum_t / n as f64, sum_f / n as f64));
            (sum_t, sum_f, n) = (0.0, 0.0, 0);
        }
        current = Some(index);
        sum_t += p.time;
        sum_f += p.flux;
        n += 1;
    }
    if n > 0 {
        out.push(SeriesPoint::new(sum_t / n as f64, sum_f / n as f64));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Provenance, Sample};
    use crate::pipeline::detrend::SegmentMedianDetrender;
    use chrono::Utc;
    use rstest::rstest;

    fn file(source_index: usize, samples: Vec<Sample>) -> RawObservationFile {
        RawObservationFile::new(
            Provenance {
                source_url: format!("memory://test/{source_index}"),
                downloaded_at: Utc::now(),
                source_index,
            },
            samples,
        )
    }

    fn flat(source_index: usize, start: f64, n: usize, level: f64) -> RawObservationFile {
        let samples = (0..n)
            .map(|i| Sample::new(start + i as f64 * 0.02, level, 1.0, 0))
            .collect();
        file(source_index, samples)
    }

    fn plain() -> Normalizer {
        Normalizer::with_detrender(
            NormalizerConfig {
                outlier_sigma: None,
                ..NormalizerConfig::default()
            },
            Box::new(SegmentMedianDetrender),
        )
    }

    #[test]
    fn merges_files_onto_common_baseline() {
        let files = vec![flat(0, 0.0, 20, 1000.0), flat(1, 10.0, 20, 50_000.0)];
        let series = plain()
            .normalize(&files, &NormalizeParams::default())
            .unwrap();

        assert_eq!(series.len(), 40);
        assert!(series.fluxes().all(|f| f == 1.0));
        assert!(series.points().windows(2).all(|w| w[0].time < w[1].time));
    }

    #[test]
    fn lower_quality_flag_wins_duplicate_timestamp() {
        let mut a: Vec<Sample> = (0..12).map(|i| Sample::new(i as f64, 100.0, 1.0, 0)).collect();
        a[5] = Sample::new(5.0, 50.0, 1.0, 16);
        let b = vec![Sample::new(5.0, 100.0, 1.0, 0)];

        let series = plain()
            .normalize(&[file(0, a), file(1, b)], &NormalizeParams::default())
            .unwrap();
        assert_eq!(series.len(), 12);
        // flag 16 is informational, yet flag 0 from file 1 still wins
        assert_eq!(series.points()[5].flux, 1.0);
    }

    #[test]
    fn equal_flags_keep_first_file() {
        let a: Vec<Sample> = (0..12).map(|i| Sample::new(i as f64, 100.0, 1.0, 0)).collect();
        let b = vec![Sample::new(3.0, 200.0, 1.0, 0)];

        let merged = plain().merge(&[file(0, a), file(1, b)]);
        let at_three: Vec<&MergedSample> = merged.iter().filter(|s| s.time == 3.0).collect();
        assert_eq!(at_three.len(), 1);
        assert_eq!(at_three[0].source_index, 0);
    }

    #[test]
    fn invalid_sample_does_not_shadow_valid_duplicate() {
        let mut a: Vec<Sample> = (0..12).map(|i| Sample::new(i as f64, 100.0, 1.0, 0)).collect();
        a[2] = Sample::new(2.0, f64::NAN, 1.0, 0);
        let b = vec![Sample::new(2.0, 100.0, 1.0, 16)];

        let merged = plain().merge(&[file(0, a), file(1, b)]);
        let kept = merged.iter().find(|s| s.time == 2.0).unwrap();
        assert_eq!(kept.source_index, 1);
    }

    #[rstest]
    #[case::nan_flux(Sample::new(1.0, f64::NAN, 1.0, 0))]
    #[case::inf_flux(Sample::new(1.0, f64::INFINITY, 1.0, 0))]
    #[case::nan_time(Sample::new(f64::NAN, 1.0, 1.0, 0))]
    #[case::masked_flag(Sample::new(1.0, 1.0, 1.0, 1))]
    fn drops_unusable_samples(#[case] bad: Sample) {
        let merged = plain().merge(&[file(0, vec![bad])]);
        assert!(merged.is_empty());
    }

    #[test]
    fn informational_flag_survives_default_mask() {
        // bit 4 (value 16) is not in the Kepler default bitmask
        let merged = plain().merge(&[file(0, vec![Sample::new(1.0, 1.0, 1.0, 16)])]);
        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn too_few_samples_is_insufficient() {
        let err = plain()
            .normalize(&[flat(0, 0.0, 9, 1.0)], &NormalizeParams::default())
            .unwrap_err();
        assert_eq!(
            err,
            NormalizeError::InsufficientSamples {
                found: 9,
                required: DEFAULT_MIN_SAMPLES
            }
        );
    }

    #[test]
    fn all_invalid_is_insufficient_not_empty_series() {
        let samples = (0..30)
            .map(|i| Sample::new(i as f64, f64::NAN, 1.0, 0))
            .collect();
        let err = plain()
            .normalize(&[file(0, samples)], &NormalizeParams::default())
            .unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::InsufficientSamples { found: 0, .. }
        ));
    }

    #[test]
    fn no_files_is_rejected() {
        let err = plain().normalize(&[], &NormalizeParams::default()).unwrap_err();
        assert_eq!(err, NormalizeError::NoInput);
    }

    #[test]
    fn window_selects_and_clamps() {
        let files = vec![flat(0, 0.0, 500, 1.0)]; // 0.00 .. 9.98
        let params = NormalizeParams {
            window: TimeWindow {
                start_day: Some(5.0),
                duration_days: Some(100.0),
            },
            time_bin_size_days: None,
        };
        let series = plain().normalize(&files, &params).unwrap();
        let first = series.points()[0].time;
        let last = series.points()[series.len() - 1].time;
        assert!(first >= 5.0 && first < 5.03);
        assert!((last - 9.98).abs() < 1e-9);
    }

    #[test]
    fn window_past_data_is_empty() {
        let params = NormalizeParams {
            window: TimeWindow {
                start_day: Some(50.0),
                duration_days: Some(1.0),
            },
            time_bin_size_days: None,
        };
        let err = plain()
            .normalize(&[flat(0, 0.0, 50, 1.0)], &params)
            .unwrap_err();
        assert!(matches!(err, NormalizeError::EmptyTimeWindow { .. }));
    }

    #[test]
    fn sigma_clip_removes_spike_per_file() {
        let mut samples: Vec<Sample> = (0..100)
            .map(|i| Sample::new(i as f64 * 0.02, 1000.0 + (i % 5) as f64, 1.0, 0))
            .collect();
        samples[40].flux = 5000.0;

        let normalizer = Normalizer::with_detrender(
            NormalizerConfig::default(),
            Box::new(SegmentMedianDetrender),
        );
        let series = normalizer
            .normalize(&[file(0, samples)], &NormalizeParams::default())
            .unwrap();
        assert_eq!(series.len(), 99);
        assert!(series.fluxes().all(|f| f < 1.01));
    }

    #[test]
    fn negative_zero_time_is_the_same_timestamp() {
        let mut a: Vec<Sample> = (1..12).map(|i| Sample::new(i as f64, 100.0, 1.0, 0)).collect();
        a.insert(0, Sample::new(-0.0, 100.0, 1.0, 16));
        let b = vec![Sample::new(0.0, 100.0, 1.0, 0)];

        let merged = plain().merge(&[file(0, a), file(1, b)]);
        let at_zero: Vec<&MergedSample> = merged.iter().filter(|s| s.time == 0.0).collect();
        assert_eq!(at_zero.len(), 1);
        assert_eq!(at_zero[0].quality, 0);
        assert_eq!(at_zero[0].source_index, 1);
        assert!(at_zero[0].time.is_sign_positive());
    }

    #[test]
    fn short_span_collapsing_into_one_bin_is_insufficient() {
        // 12 samples over 0.22 days pass min_samples but fit in one 0.5 day bin
        let params = NormalizeParams {
            window: TimeWindow::all(),
            time_bin_size_days: Some(DEFAULT_TIME_BIN_SIZE_DAYS),
        };
        let err = Normalizer::new(NormalizerConfig::default())
            .normalize(&[flat(0, 0.0, 12, 1000.0)], &params)
            .unwrap_err();
        assert_eq!(
            err,
            NormalizeError::InsufficientSamples {
                found: 1,
                required: DEFAULT_MIN_BINNED_POINTS
            }
        );
    }

    #[test]
    fn clipping_below_min_samples_is_insufficient() {
        let mut samples: Vec<Sample> = (0..10)
            .map(|i| Sample::new(i as f64 * 0.02, 1000.0, 1.0, 0))
            .collect();
        samples[4].flux = 1_000_000.0;
        let normalizer = Normalizer::with_detrender(
            NormalizerConfig {
                outlier_sigma: Some(2.0),
                ..NormalizerConfig::default()
            },
            Box::new(SegmentMedianDetrender),
        );
        let err = normalizer
            .normalize(&[file(0, samples)], &NormalizeParams::default())
            .unwrap_err();
        assert!(matches!(
            err,
            NormalizeError::InsufficientSamples { found: 9, required: 10 }
        ));
    }

    #[test]
    fn binning_averages_time_and_flux() {
        let points = vec![
            SeriesPoint::new(0.0, 1.0),
            SeriesPoint::new(0.2, 3.0),
            SeriesPoint::new(0.6, 2.0),
            SeriesPoint::new(2.1, 4.0),
        ];
        let binned = bin_points(&points, 0.5);
        assert_eq!(
            binned,
            vec![
                SeriesPoint::new(0.1, 2.0),
                SeriesPoint::new(0.6, 2.0),
                SeriesPoint::new(2.1, 4.0),
            ]
        );
    }

    #[test]
    fn default_pipeline_bins_to_half_days() {
        let files = vec![flat(0, 0.0, 100, 1000.0)]; // 2 days at 0.02 cadence
        let params = NormalizeParams {
            window: TimeWindow::all(),
            time_bin_size_days: Some(DEFAULT_TIME_BIN_SIZE_DAYS),
        };
        let series = Normalizer::new(NormalizerConfig::default())
            .normalize(&files, &params)
            .unwrap();
        assert_eq!(series.len(), 4);
        assert!(series.fluxes().all(|f| (f - 1.0).abs() < 1e-12));
    }

    #[test]
    fn output_is_deterministic() {
        let files = vec![flat(0, 0.0, 60, 1000.0), flat(1, 0.5, 60, 990.0)];
        let n = Normalizer::new(NormalizerConfig::default());
        let a = n.normalize(&files, &NormalizeParams::default()).unwrap();
        let b = n.normalize(&files, &NormalizeParams::default()).unwrap();
        assert_eq!(a, b);
    }
}
