// src/perspective.rs
//
// Bird's-eye normalization. The road trapezoid in camera space is mapped
// onto the full output rectangle; the forward matrix warps masks, the
// inverse maps bird's-eye points back into the camera frame for overlays.

use crate::error::PipelineError;
use crate::types::Mask;
use image::{GrayImage, Luma};
use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerspectiveConfig {
    /// Source corners as (x, y) fractions of frame width/height
    pub top_left: [f32; 2],
    pub top_right: [f32; 2],
    pub bottom_right: [f32; 2],
    pub bottom_left: [f32; 2],
    /// Re-binarize the warped mask (bilinear sampling blurs edges)
    pub binarize_warped: bool,
    /// Pixels strictly above this become 255 when binarizing
    pub binarize_threshold: u8,
}

impl Default for PerspectiveConfig {
    fn default() -> Self {
        Self {
            top_left: [0.45, 0.65],
            top_right: [0.55, 0.65],
            bottom_right: [1.0, 1.0],
            bottom_left: [0.0, 1.0],
            binarize_warped: false,
            binarize_threshold: 127,
        }
    }
}

impl PerspectiveConfig {
    /// Camera-space trapezoid for a `width` x `height` frame, clockwise from top-left.
    pub fn source_quad(&self, width: u32, height: u32) -> [[f64; 2]; 4] {
        let (w, h) = (width as f64, height as f64);
        let scale = |p: [f32; 2]| [p[0] as f64 * w, p[1] as f64 * h];
        [
            scale(self.top_left),
            scale(self.top_right),
            scale(self.bottom_right),
            scale(self.bottom_left),
        ]
    }
}

/// Destination rectangle covering the whole output canvas.
pub fn destination_quad(width: u32, height: u32) -> [[f64; 2]; 4] {
    let (w, h) = (width as f64, height as f64);
    [[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]]
}

// ============================================================================
// TRANSFORM
// ============================================================================

/// Forward (camera -> bird's-eye) and inverse homographies for one resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct PerspectiveTransform {
    forward: Matrix3<f64>,
    inverse: Matrix3<f64>,
    width: u32,
    height: u32,
}

impl PerspectiveTransform {
    pub fn for_frame(
        width: u32,
        height: u32,
        config: &PerspectiveConfig,
    ) -> Result<Self, PipelineError> {
        Self::from_quads(
            config.source_quad(width, height),
            destination_quad(width, height),
            width,
            height,
        )
    }

    pub fn from_quads(
        src: [[f64; 2]; 4],
        dst: [[f64; 2]; 4],
        width: u32,
        height: u32,
    ) -> Result<Self, PipelineError> {
        let degenerate = PipelineError::DegenerateGeometry { width, height };
        if width == 0 || height == 0 {
            return Err(degenerate);
        }

        let forward = solve_homography(&src, &dst).ok_or(degenerate)?;
        let inverse = forward
            .try_inverse()
            .and_then(normalize)
            .ok_or(PipelineError::DegenerateGeometry { width, height })?;

        debug!("Perspective transform built for {}x{}", width, height);

        Ok(Self {
            forward,
            inverse,
            width,
            height,
        })
    }

    pub fn forward(&self) -> &Matrix3<f64> {
        &self.forward
    }

    pub fn inverse(&self) -> &Matrix3<f64> {
        &self.inverse
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn matches(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    /// Camera-frame point -> bird's-eye point.
    pub fn to_birds_eye(&self, x: f64, y: f64) -> Option<[f64; 2]> {
        project(&self.forward, x, y)
    }

    /// Bird's-eye point -> camera-frame point.
    pub fn to_camera(&self, x: f64, y: f64) -> Option<[f64; 2]> {
        project(&self.inverse, x, y)
    }

    /// Warp a camera-space mask into the bird's-eye view (same output size).
    ///
    /// Each output pixel is sampled bilinearly at its inverse-mapped location;
    /// samples falling outside the source read as zero.
    pub fn warp_mask(&self, mask: &Mask, config: &PerspectiveConfig) -> Mask {
        let (width, height) = mask.dimensions();
        let mut out = GrayImage::new(width, height);
        let threshold = config.binarize_threshold;

        for (x, y, pixel) in out.enumerate_pixels_mut() {
            let Some([sx, sy]) = project(&self.inverse, x as f64, y as f64) else {
                continue;
            };
            let v = sample_bilinear(mask, sx, sy);
            let v = if config.binarize_warped {
                if v > threshold {
                    255
                } else {
                    0
                }
            } else {
                v
            };
            *pixel = Luma([v]);
        }

        out
    }
}

/// H * [x, y, 1]^T, dehomogenized.
pub fn project(h: &Matrix3<f64>, x: f64, y: f64) -> Option<[f64; 2]> {
    let p = h * Vector3::new(x, y, 1.0);
    if p[2].abs() < 1e-12 {
        return None;
    }
    Some([p[0] / p[2], p[1] / p[2]])
}

/// Exact four-point homography with h33 fixed to 1.
fn solve_homography(src: &[[f64; 2]; 4], dst: &[[f64; 2]; 4]) -> Option<Matrix3<f64>> {
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for (i, (s, d)) in src.iter().zip(dst.iter()).enumerate() {
        let (x, y) = (s[0], s[1]);
        let (u, v) = (d[0], d[1]);
        let r = 2 * i;

        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -u * x;
        a[(r, 7)] = -u * y;
        b[r] = u;

        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -v * x;
        a[(r + 1, 7)] = -v * y;
        b[r + 1] = v;
    }

    let h = a.lu().solve(&b)?;
    if h.iter().any(|v| !v.is_finite()) {
        return None;
    }

    Some(Matrix3::new(
        h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0,
    ))
}

fn normalize(m: Matrix3<f64>) -> Option<Matrix3<f64>> {
    let s = m[(2, 2)];
    if s.abs() < 1e-12 || m.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(m / s)
}

fn sample_bilinear(mask: &Mask, x: f64, y: f64) -> u8 {
    let (w, h) = (mask.width() as i64, mask.height() as i64);
    if !(x > -1.0 && y > -1.0 && x < w as f64 && y < h as f64) {
        return 0;
    }

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let px = |px: i64, py: i64| -> f64 {
        if px < 0 || py < 0 || px >= w || py >= h {
            0.0
        } else {
            mask.get_pixel(px as u32, py as u32).0[0] as f64
        }
    };

    let val = px(x0, y0) * (1.0 - fx) * (1.0 - fy)
        + px(x0 + 1, y0) * fx * (1.0 - fy)
        + px(x0, y0 + 1) * (1.0 - fx) * fy
        + px(x0 + 1, y0 + 1) * fx * fy;

    val.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn default_transform(w: u32, h: u32) -> PerspectiveTransform {
        PerspectiveTransform::for_frame(w, h, &PerspectiveConfig::default()).unwrap()
    }

    #[test]
    fn test_corners_map_to_output_rectangle() {
        let t = default_transform(640, 480);
        let src = PerspectiveConfig::default().source_quad(640, 480);
        let dst = destination_quad(640, 480);

        for (s, d) in src.iter().zip(dst.iter()) {
            let p = t.to_birds_eye(s[0], s[1]).unwrap();
            assert_abs_diff_eq!(p[0], d[0], epsilon = 1e-6);
            assert_abs_diff_eq!(p[1], d[1], epsilon = 1e-6);

            let back = t.to_camera(d[0], d[1]).unwrap();
            assert_abs_diff_eq!(back[0], s[0], epsilon = 1e-6);
            assert_abs_diff_eq!(back[1], s[1], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_inverse_is_algebraic_inverse() {
        let t = default_transform(640, 480);
        let product = t.forward() * t.inverse();
        let scaled = product / product[(2, 2)];
        let identity = Matrix3::<f64>::identity();
        for (a, b) in scaled.iter().zip(identity.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_image_center_column_stays_centered() {
        let t = default_transform(640, 480);
        for y in [320.0, 400.0, 479.0] {
            let p = t.to_birds_eye(320.0, y).unwrap();
            assert_abs_diff_eq!(p[0], 320.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_zero_sized_frame_is_degenerate() {
        let err = PerspectiveTransform::for_frame(0, 480, &PerspectiveConfig::default());
        assert!(matches!(
            err,
            Err(PipelineError::DegenerateGeometry { width: 0, height: 480 })
        ));
    }

    #[test]
    fn test_collapsed_quad_is_degenerate() {
        let src = [[10.0, 10.0]; 4];
        let err = PerspectiveTransform::from_quads(src, destination_quad(64, 64), 64, 64);
        assert!(err.is_err());
    }

    #[test]
    fn test_identity_quads_leave_mask_unchanged() {
        let quad = destination_quad(32, 24);
        let t = PerspectiveTransform::from_quads(quad, quad, 32, 24).unwrap();
        let mut mask = GrayImage::new(32, 24);
        for y in 5..15 {
            mask.put_pixel(7, y, Luma([255]));
        }
        let warped = t.warp_mask(&mask, &PerspectiveConfig::default());
        assert_eq!(warped, mask);
    }

    #[test]
    fn test_warp_keeps_mask_binary_when_requested() {
        let t = default_transform(160, 120);
        let mut mask = GrayImage::new(160, 120);
        for y in 90..120 {
            for x in 70..90 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let config = PerspectiveConfig {
            binarize_warped: true,
            ..PerspectiveConfig::default()
        };
        let warped = t.warp_mask(&mask, &config);
        assert!(warped.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        assert!(warped.pixels().any(|p| p.0[0] == 255));
        assert_eq!(warped.dimensions(), (160, 120));
    }

    #[test]
    fn test_rows_above_trapezoid_warp_outside_view() {
        // Mass above the horizon row never reaches the bird's-eye canvas
        let t = default_transform(160, 120);
        let mut mask = GrayImage::new(160, 120);
        for y in 0..60 {
            for x in 0..160 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let warped = t.warp_mask(&mask, &PerspectiveConfig::default());
        assert!(warped.pixels().all(|p| p.0[0] == 0));
    }
}
