//! Configuration - 設定の読み込みと検証
//!
//! 優先順位（後勝ち）:
//! 1. 組み込みのデフォルト値（`LumenConfig::default()`）
//! 2. TOML ファイル（指定があれば）
//! 3. 環境変数 `LUMEN_*`（`__` でネスト、例: `LUMEN_PROCESS__TIMEOUT=3m`）
//!
//! Durations are humantime strings (`"120s"`, `"2m"`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::retry::RetryPolicy;
use crate::domain::{SourceParams, TimeWindow};
use crate::impls::http_source::DEFAULT_MAX_FILE_BYTES;
use crate::pipeline::{
    BaselineKind, DEFAULT_TIME_BIN_SIZE_DAYS, DetrenderKind, NormalizeParams, NormalizerConfig,
};
use crate::plot::{MIN_PLOT_SIZE, PlotConfig};

pub const ENV_PREFIX: &str = "LUMEN_";
pub const DEFAULT_CONFIG_FILE: &str = "lumen.toml";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000/";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Per-request processing options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessOptions {
    /// Per-file download timeout.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Attempt only the first N candidate files.
    pub max_files: Option<usize>,

    pub window: TimeWindow,

    /// `None` keeps every sample.
    pub time_bin_size_days: Option<f64>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_files: None,
            window: TimeWindow::all(),
            time_bin_size_days: Some(DEFAULT_TIME_BIN_SIZE_DAYS),
        }
    }
}

impl ProcessOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(invalid("process.timeout must be greater than zero"));
        }
        if self.max_files == Some(0) {
            return Err(invalid("process.max_files must be at least 1"));
        }
        if let Some(bin) = self.time_bin_size_days
            && !(bin.is_finite() && bin > 0.0)
        {
            return Err(invalid(format!(
                "process.time_bin_size_days must be positive, got {bin}"
            )));
        }
        if let Some(start) = self.window.start_day
            && !start.is_finite()
        {
            return Err(invalid("process.window.start_day must be finite"));
        }
        if let Some(duration) = self.window.duration_days
            && !(duration.is_finite() && duration > 0.0)
        {
            return Err(invalid(format!(
                "process.window.duration_days must be positive, got {duration}"
            )));
        }
        Ok(())
    }

    pub fn normalize_params(&self) -> NormalizeParams {
        NormalizeParams {
            window: self.window,
            time_bin_size_days: self.time_bin_size_days,
        }
    }

    pub fn source_params(&self) -> SourceParams {
        SourceParams {
            timeout: self.timeout,
            max_files: self.max_files,
            window: self.window,
            time_bin_size_days: self.time_bin_size_days,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,

    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Largest single file accepted from the source.
    pub max_file_bytes: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LumenConfig {
    pub store_dir: PathBuf,
    pub plot_dir: PathBuf,
    pub source: SourceConfig,
    pub process: ProcessOptions,
    pub normalize: NormalizerConfig,
    pub baseline: BaselineKind,
    pub plot: PlotConfig,
    pub retry: RetryPolicy,
}

impl Default for LumenConfig {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("data/artifacts"),
            plot_dir: PathBuf::from("data/plots"),
            source: SourceConfig::default(),
            process: ProcessOptions::default(),
            normalize: NormalizerConfig::default(),
            baseline: BaselineKind::default(),
            plot: PlotConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl LumenConfig {
    /// Defaults, then `path` (if any), then `LUMEN_*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from(Self::figment(path))
    }

    /// The layered provider stack used by `load`.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(LumenConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load_from(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.process.validate()?;

        if self.source.connect_timeout.is_zero() {
            return Err(invalid("source.connect_timeout must be greater than zero"));
        }
        if self.source.max_file_bytes == 0 {
            return Err(invalid("source.max_file_bytes must be greater than zero"));
        }
        if self.normalize.min_samples == 0 {
            return Err(invalid("normalize.min_samples must be at least 1"));
        }
        if self.normalize.min_binned_points == 0 {
            return Err(invalid("normalize.min_binned_points must be at least 1"));
        }
        if let Some(sigma) = self.normalize.outlier_sigma
            && !(sigma.is_finite() && sigma > 0.0)
        {
            return Err(invalid(format!(
                "normalize.outlier_sigma must be positive, got {sigma}"
            )));
        }
        if let DetrenderKind::RollingMedian { window_days } = self.normalize.detrender
            && !(window_days.is_finite() && window_days > 0.0)
        {
            return Err(invalid(format!(
                "normalize.detrender.window_days must be positive, got {window_days}"
            )));
        }
        if self.plot.width < MIN_PLOT_SIZE || self.plot.height < MIN_PLOT_SIZE {
            return Err(invalid(format!(
                "plot size must be at least {MIN_PLOT_SIZE}x{MIN_PLOT_SIZE}"
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        if !(self.retry.multiplier.is_finite() && self.retry.multiplier >= 1.0) {
            return Err(invalid("retry.multiplier must be >= 1.0"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}
