//! PlotRenderer - Artifact → PNG bytes
//!
//! Layout: white canvas, light grid, black frame, grey zero line, one
//! polyline per series, legend in the top-left corner of the plot area.
//! Y values are deviation in percent.

use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use tracing::debug;

use super::glyphs::{GLYPH_HEIGHT, draw_text, text_width};
use super::{ComparisonAxis, MIN_PLOT_SIZE, PlotConfig, PlotError};
use crate::domain::{Artifact, TargetId};

mod colors {
    use image::Rgb;

    pub const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
    pub const FRAME: Rgb<u8> = Rgb([0, 0, 0]);
    pub const GRID: Rgb<u8> = Rgb([225, 225, 225]);
    pub const ZERO: Rgb<u8> = Rgb([150, 150, 150]);
    pub const LABEL: Rgb<u8> = Rgb([60, 60, 60]);

    pub const PALETTE: [Rgb<u8>; 8] = [
        Rgb([31, 119, 180]),
        Rgb([255, 127, 14]),
        Rgb([44, 160, 44]),
        Rgb([214, 39, 40]),
        Rgb([148, 103, 189]),
        Rgb([140, 86, 75]),
        Rgb([227, 119, 194]),
        Rgb([23, 190, 207]),
    ];
}

const MARGIN_LEFT: u32 = 70;
const MARGIN_RIGHT: u32 = 20;
const MARGIN_TOP: u32 = 20;
const MARGIN_BOTTOM: u32 = 30;
const GRID_LINES: u32 = 5;
const TEXT_SCALE: u32 = 2;

struct Trace {
    label: TargetId,
    points: Vec<(f64, f64)>,
    color: Rgb<u8>,
}

/// Data range → pixel mapping for the plot area.
struct Frame {
    left: f32,
    top: f32,
    width: f32,
    height: f32,
    x_min: f64,
    x_max: f64,
    y_min: f64,
    y_max: f64,
}

impl Frame {
    fn new(config: &PlotConfig, traces: &[Trace]) -> Self {
        let all = traces.iter().flat_map(|t| t.points.iter());
        let (mut x_min, mut x_max) = (f64::INFINITY, f64::NEG_INFINITY);
        // the zero line is always visible
        let (mut y_min, mut y_max) = (0.0f64, 0.0f64);
        for &(x, y) in all {
            x_min = x_min.min(x);
            x_max = x_max.max(x);
            y_min = y_min.min(y);
            y_max = y_max.max(y);
        }
        if x_max <= x_min {
            x_min -= 0.5;
            x_max = x_min + 1.0;
        }
        let pad = ((y_max - y_min) * 0.05).max(1e-3);

        Self {
            left: MARGIN_LEFT as f32,
            top: MARGIN_TOP as f32,
            width: (config.width - MARGIN_LEFT - MARGIN_RIGHT) as f32,
            height: (config.height - MARGIN_TOP - MARGIN_BOTTOM) as f32,
            x_min,
            x_max,
            y_min: y_min - pad,
            y_max: y_max + pad,
        }
    }

    fn px(&self, x: f64) -> f32 {
        self.left + ((x - self.x_min) / (self.x_max - self.x_min)) as f32 * self.width
    }

    fn py(&self, y: f64) -> f32 {
        self.top + ((self.y_max - y) / (self.y_max - self.y_min)) as f32 * self.height
    }

    fn right(&self) -> f32 {
        self.left + self.width
    }

    fn bottom(&self) -> f32 {
        self.top + self.height
    }
}

#[derive(Debug, Clone, Default)]
pub struct PlotRenderer {
    config: PlotConfig,
}

impl PlotRenderer {
    pub fn new(config: PlotConfig) -> Result<Self, PlotError> {
        if config.width < MIN_PLOT_SIZE || config.height < MIN_PLOT_SIZE {
            return Err(PlotError::InvalidSize {
                width: config.width,
                height: config.height,
            });
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &PlotConfig {
        &self.config
    }

    /// Deviation over time for one target.
    pub fn render_single(&self, artifact: &Artifact) -> Result<Vec<u8>, PlotError> {
        let trace = Trace {
            label: artifact.target(),
            points: artifact
                .deviation()
                .points()
                .iter()
                .map(|p| (p.time, p.deviation))
                .collect(),
            color: colors::PALETTE[0],
        };
        self.render(&[trace])
    }

    /// Overlay several targets; input order decides colour and legend order.
    pub fn render_comparison(
        &self,
        artifacts: &[Artifact],
        axis: ComparisonAxis,
    ) -> Result<Vec<u8>, PlotError> {
        if artifacts.is_empty() {
            return Err(PlotError::EmptyInput);
        }
        let traces: Vec<Trace> = artifacts
            .iter()
            .enumerate()
            .map(|(i, artifact)| Trace {
                label: artifact.target(),
                points: artifact
                    .deviation()
                    .points()
                    .iter()
                    .enumerate()
                    .map(|(n, p)| match axis {
                        ComparisonAxis::Index => (n as f64, p.deviation),
                        ComparisonAxis::Time => (p.time, p.deviation),
                    })
                    .collect(),
                color: colors::PALETTE[i % colors::PALETTE.len()],
            })
            .collect();
        self.render(&traces)
    }

    fn render(&self, traces: &[Trace]) -> Result<Vec<u8>, PlotError> {
        if traces.iter().all(|t| t.points.is_empty()) {
            return Err(PlotError::EmptyInput);
        }

        let mut image = RgbImage::from_pixel(self.config.width, self.config.height, colors::BACKGROUND);
        let frame = Frame::new(&self.config, traces);

        draw_grid(&mut image, &frame);
        let zero = frame.py(0.0);
        draw_line_segment_mut(&mut image, (frame.left, zero), (frame.right(), zero), colors::ZERO);

        for trace in traces {
            draw_trace(&mut image, &frame, trace);
        }

        draw_hollow_rect_mut(
            &mut image,
            Rect::at(frame.left as i32, frame.top as i32)
                .of_size(frame.width as u32 + 1, frame.height as u32 + 1),
            colors::FRAME,
        );
        draw_legend(&mut image, &frame, traces);

        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| PlotError::Encode(e.to_string()))?;
        debug!(traces = traces.len(), bytes = bytes.len(), "plot rendered");
        Ok(bytes)
    }
}

fn draw_grid(image: &mut RgbImage, frame: &Frame) {
    for i in 1..GRID_LINES {
        let f = i as f32 / GRID_LINES as f32;
        let x = frame.left + f * frame.width;
        draw_line_segment_mut(image, (x, frame.top), (x, frame.bottom()), colors::GRID);
    }
    for i in 0..=GRID_LINES {
        let f = i as f64 / GRID_LINES as f64;
        let value = frame.y_max - f * (frame.y_max - frame.y_min);
        let y = frame.py(value);
        if i > 0 && i < GRID_LINES {
            draw_line_segment_mut(image, (frame.left, y), (frame.right(), y), colors::GRID);
        }

        let label = tick_label(value, frame.y_max - frame.y_min);
        let x = frame.left as i32 - 6 - text_width(&label, TEXT_SCALE) as i32;
        let y = y as i32 - (GLYPH_HEIGHT * TEXT_SCALE / 2) as i32;
        draw_text(image, x, y, &label, TEXT_SCALE, colors::LABEL);
    }
}

fn draw_trace(image: &mut RgbImage, frame: &Frame, trace: &Trace) {
    let pixels: Vec<(f32, f32)> = trace
        .points
        .iter()
        .map(|&(x, y)| (frame.px(x), frame.py(y)))
        .collect();

    if let [only] = pixels.as_slice() {
        draw_filled_rect_mut(
            image,
            Rect::at(only.0 as i32 - 1, only.1 as i32 - 1).of_size(3, 3),
            trace.color,
        );
        return;
    }
    for pair in pixels.windows(2) {
        draw_line_segment_mut(image, pair[0], pair[1], trace.color);
    }
}

fn draw_legend(image: &mut RgbImage, frame: &Frame, traces: &[Trace]) {
    let swatch = GLYPH_HEIGHT * TEXT_SCALE;
    let row_height = swatch as i32 + 6;
    let x = frame.left as i32 + 10;
    let mut y = frame.top as i32 + 10;

    for trace in traces {
        draw_filled_rect_mut(image, Rect::at(x, y).of_size(swatch * 2, swatch), trace.color);
        draw_text(
            image,
            x + (swatch * 2) as i32 + 6,
            y,
            &trace.label.to_string(),
            TEXT_SCALE,
            colors::FRAME,
        );
        y += row_height;
    }
}

/// Tick label with just enough decimals for the visible span.
fn tick_label(value: f64, span: f64) -> String {
    let decimals = if span >= 10.0 {
        0
    } else if span >= 1.0 {
        1
    } else if span >= 0.1 {
        2
    } else {
        3
    };
    let label = format!("{value:.decimals$}");
    // avoid "-0.0"
    if label.trim_start_matches('-').chars().all(|c| c == '0' || c == '.') {
        label.trim_start_matches('-').to_string()
    } else {
        label
    }
}
