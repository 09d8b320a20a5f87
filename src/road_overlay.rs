// src/road_overlay.rs
//
// Operator-facing annotation of the camera frame.
//
//   ┌──────────────────────────────┐
//   │ Status: Detected     │       │
//   │ Angle: 2.00          │       │  magenta: image centerline
//   │                      │       │
//   │                    ┃ │       │  green: lane center, projected back
//   │                    ┃ │       │         from the bird's-eye view
//   └────────────────────┸─┴───────┘
//
// Presentation only; nothing here feeds back into control.

use crate::perspective::PerspectiveTransform;
use crate::types::LaneEstimate;
use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

const CENTERLINE_COLOR: Rgb<u8> = Rgb([255, 0, 255]);
const MARKER_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const DETECTED_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LOST_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const CENTERLINE_THICKNESS: u32 = 2;
const MARKER_THICKNESS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    /// Bird's-eye row used for the marker, measured up from the bottom edge
    pub marker_offset_px: u32,
    /// TTF/OTF font for status text; text is skipped when unset
    pub font_path: Option<PathBuf>,
    /// Text height in pixels
    pub font_scale: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            marker_offset_px: 10,
            font_path: None,
            font_scale: 24.0,
        }
    }
}

pub struct OverlayRenderer {
    config: OverlayConfig,
    font: Option<FontVec>,
}

impl OverlayRenderer {
    pub fn new(config: OverlayConfig) -> Result<Self> {
        let font = match &config.font_path {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("Failed to read overlay font {}", path.display()))?;
                let font = FontVec::try_from_vec(bytes)
                    .with_context(|| format!("Invalid overlay font {}", path.display()))?;
                info!("Overlay font loaded from {}", path.display());
                Some(font)
            }
            None => {
                debug!("No overlay font configured, status text disabled");
                None
            }
        };
        Ok(Self { config, font })
    }

    /// Renderer that draws lines only.
    pub fn without_font(config: OverlayConfig) -> Self {
        Self { config, font: None }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Camera-frame x/y where the lane-center marker starts, if it lands on screen.
    pub fn marker_origin(
        &self,
        estimate: &LaneEstimate,
        transform: &PerspectiveTransform,
        height: u32,
    ) -> Option<(f64, f64)> {
        if !estimate.valid {
            return None;
        }
        let bev_y = height.saturating_sub(self.config.marker_offset_px) as f64;
        let [x, y] = transform.to_camera(estimate.center_x as f64, bev_y)?;
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        Some((x, y))
    }

    /// Copy of `frame` with centerline, lane marker and status text drawn on.
    pub fn annotate(
        &self,
        frame: &RgbImage,
        estimate: &LaneEstimate,
        transform: &PerspectiveTransform,
        steering_angle: f32,
    ) -> RgbImage {
        let mut canvas = frame.clone();
        let (width, height) = canvas.dimensions();
        if width == 0 || height == 0 {
            return canvas;
        }

        let center_x = (width / 2) as i32 - (CENTERLINE_THICKNESS / 2) as i32;
        draw_filled_rect_mut(
            &mut canvas,
            Rect::at(center_x, 0).of_size(CENTERLINE_THICKNESS, height),
            CENTERLINE_COLOR,
        );

        if let Some((x, y)) = self.marker_origin(estimate, transform, height) {
            draw_vertical_bar(&mut canvas, x, y, MARKER_THICKNESS, MARKER_COLOR);
        }

        if let Some(font) = &self.font {
            let status = estimate.status();
            let status_color = if estimate.valid {
                DETECTED_COLOR
            } else {
                LOST_COLOR
            };
            let scale = PxScale::from(self.config.font_scale);
            draw_text_mut(
                &mut canvas,
                status_color,
                10,
                10,
                scale,
                font,
                &format!("Status: {}", status.overlay_label()),
            );
            draw_text_mut(
                &mut canvas,
                TEXT_COLOR,
                10,
                10 + self.config.font_scale as i32 + 6,
                scale,
                font,
                &format!("Angle: {:.2}", steering_angle),
            );
        }

        canvas
    }
}

/// Bar `thickness` px wide from (x, y) straight down to the bottom edge.
fn draw_vertical_bar(canvas: &mut RgbImage, x: f64, y: f64, thickness: u32, color: Rgb<u8>) {
    let height = canvas.height() as i64;
    let top = (y.round() as i64).max(0);
    if top >= height {
        return;
    }
    let left = x.round() as i64 - (thickness / 2) as i64;
    if left + thickness as i64 <= 0 || left >= canvas.width() as i64 {
        return;
    }
    let rect = Rect::at(left as i32, top as i32).of_size(thickness, (height - top) as u32);
    draw_filled_rect_mut(canvas, rect, color);
}
