//! Pipeline stages: Fetcher → Normalizer → DeviationEngine.
//!
//! fetcher だけが非同期 (ports 経由の I/O)。normalizer / deviation は純粋関数で、
//! 同じ入力に対して常に同じ出力を返します。

pub mod codec;
pub mod detrend;
pub mod deviation;
pub mod fetcher;
pub mod normalizer;
pub mod stats;

pub use codec::{CodecError, parse_csv, render_csv};
pub use detrend::{
    DEFAULT_FLATTEN_WINDOW_DAYS, Detrender, DetrenderKind, MergedSample, RollingMedianDetrender,
    SegmentMedianDetrender,
};
pub use deviation::{
    BaselineKind, BaselineModel, DeviationEngine, GlobalMedianBaseline, RollingMeanBaseline,
};
pub use fetcher::{FetchError, FetchReport, Fetcher, SkipReason, SkippedFile};
pub use normalizer::{
    DEFAULT_MIN_SAMPLES, DEFAULT_OUTLIER_SIGMA, DEFAULT_TIME_BIN_SIZE_DAYS,
    KEPLER_DEFAULT_BITMASK, NormalizeError, NormalizeParams, Normalizer, NormalizerConfig,
};
