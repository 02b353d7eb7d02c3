//! Plot - 偏差系列の PNG 描画
//!
//! PlotRenderer は stored Artifact を読むだけで、状態を持ちません。
//! 描画は image + imageproc（CPU 処理なので Orchestrator は spawn_blocking で呼ぶ）。

pub mod glyphs;
pub mod renderer;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use renderer::PlotRenderer;

pub const DEFAULT_PLOT_WIDTH: u32 = 1000;
pub const DEFAULT_PLOT_HEIGHT: u32 = 500;

/// Smallest canvas that still leaves room for the plot area inside the margins.
pub const MIN_PLOT_SIZE: u32 = 160;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlotConfig {
    pub width: u32,
    pub height: u32,
    pub comparison_axis: ComparisonAxis,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_PLOT_WIDTH,
            height: DEFAULT_PLOT_HEIGHT,
            comparison_axis: ComparisonAxis::default(),
        }
    }
}

/// X axis used when overlaying several targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonAxis {
    /// Sample position within each series; targets observed at different
    /// epochs line up from their first sample.
    #[default]
    Index,
    Time,
}

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("nothing to plot")]
    EmptyInput,

    #[error("plot size {width}x{height} is too small (minimum {MIN_PLOT_SIZE})")]
    InvalidSize { width: u32, height: u32 },

    #[error("png encoding failed: {0}")]
    Encode(String),
}
