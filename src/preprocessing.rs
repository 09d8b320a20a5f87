// src/preprocessing.rs
//
// Lane-marking segmentation: bottom ROI -> HLS band threshold -> morphology.
// The result is always a full-frame mask; rows above the ROI stay zero.

use crate::color_analysis::HlsRange;
use crate::types::Mask;
use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::{dilate, erode};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// One morphology pass with a 3x3 square structuring element, repeated
/// `iterations` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "iterations", rename_all = "snake_case")]
pub enum MorphStep {
    Erode(u8),
    Dilate(u8),
}

impl MorphStep {
    pub fn apply(self, mask: &GrayImage) -> GrayImage {
        // n passes of a 3x3 square == one pass at Chebyshev radius n
        match self {
            MorphStep::Erode(n) => erode(mask, Norm::LInf, n),
            MorphStep::Dilate(n) => dilate(mask, Norm::LInf, n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// ROI starts at `height * roi_start_fraction` and runs to the bottom edge
    pub roi_start_fraction: f32,
    /// Lower HLS bound (H, L, S), inclusive
    pub hls_lower: [u8; 3],
    /// Upper HLS bound (H, L, S), inclusive
    pub hls_upper: [u8; 3],
    /// Cleanup sequence. Tuned for speckle suppression on the test track;
    /// changing the counts changes how thin or broken a marking may be.
    pub morphology: Vec<MorphStep>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            roi_start_fraction: 1.0 / 1.4, // bottom ~29% of the frame
            hls_lower: [26, 0, 0],
            hls_upper: [255, 166, 38],
            morphology: vec![
                MorphStep::Erode(2),
                MorphStep::Dilate(8),
                MorphStep::Erode(5),
                MorphStep::Dilate(8),
                MorphStep::Erode(7),
            ],
        }
    }
}

impl PreprocessConfig {
    pub fn hls_range(&self) -> HlsRange {
        HlsRange::new(self.hls_lower, self.hls_upper)
    }

    /// First row of the region of interest for a frame of `height` rows.
    pub fn roi_start_row(&self, height: u32) -> u32 {
        let fraction = self.roi_start_fraction.clamp(0.0, 1.0);
        ((height as f32 * fraction) as u32).min(height)
    }
}

// ============================================================================
// PREPROCESSING
// ============================================================================

/// Build the full-frame lane-candidate mask for `frame`.
pub fn preprocess(frame: &RgbImage, config: &PreprocessConfig) -> Mask {
    let (width, height) = frame.dimensions();
    let mut full = GrayImage::new(width, height);

    let y_start = config.roi_start_row(height);
    if width == 0 || y_start >= height {
        return full;
    }

    let roi = threshold_roi(frame, y_start, &config.hls_range());
    let candidates = count_on(&roi);

    let cleaned = config
        .morphology
        .iter()
        .fold(roi, |mask, step| step.apply(&mask));

    debug!(
        "Preprocess: roi rows {}..{}, {} candidate px, {} after morphology",
        y_start,
        height,
        candidates,
        count_on(&cleaned)
    );

    image::imageops::replace(&mut full, &cleaned, 0, y_start as i64);
    full
}

/// Threshold rows `y_start..height` of `frame` into an ROI-sized mask.
fn threshold_roi(frame: &RgbImage, y_start: u32, range: &HlsRange) -> GrayImage {
    let (width, height) = frame.dimensions();
    let mut roi = GrayImage::new(width, height - y_start);

    for (x, y, pixel) in roi.enumerate_pixels_mut() {
        let [r, g, b] = frame.get_pixel(x, y + y_start).0;
        if range.contains_rgb(r, g, b) {
            *pixel = Luma([255]);
        }
    }

    roi
}

fn count_on(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| p.0[0] > 0).count()
}
