// src/lane_detection.rs
//
// Lane-center estimation on the bird's-eye mask.
//
// The mask is split into three equal-width vertical zones. Each zone's
// pixel-mass centroid counts as a detection only above `min_zone_mass`.
// Fusion, highest priority first:
//
//   left + right   midpoint, if the gap is a plausible lane width
//   left only      left + width/2
//   right only     right - width/2
//   center only    center centroid
//   otherwise      lost
//
// A two-sided pair with an implausible gap is rejected outright; it does
// not fall back to single-sided or center estimates.
//
// Every frame is estimated independently; there is no history.

use crate::types::{LaneEstimate, Mask};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneDetectorConfig {
    /// Zone counts as detected only when its summed pixel value exceeds this
    pub min_zone_mass: f64,
    /// Assumed distance between left and right markings (bird's-eye px)
    pub nominal_lane_width: f32,
    /// Accept a two-sided pair when gap >= nominal * min_gap_ratio ...
    pub min_gap_ratio: f32,
    /// ... and gap <= nominal * max_gap_ratio
    pub max_gap_ratio: f32,
}

impl Default for LaneDetectorConfig {
    fn default() -> Self {
        Self {
            min_zone_mass: 300.0,
            nominal_lane_width: 300.0,
            min_gap_ratio: 0.5,
            max_gap_ratio: 2.0,
        }
    }
}

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneMoments {
    pub zone: Zone,
    /// Sum of pixel values in the zone
    pub mass: f64,
    /// Mass-weighted mean x (full-mask coordinates), when the zone is detected
    pub centroid_x: Option<f32>,
}

/// Which rule produced the estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionSource {
    BothSides,
    LeftOnly,
    RightOnly,
    CenterOnly,
    /// Left and right both detected but their gap was implausible
    RejectedPair,
    NoDetection,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneDetection {
    pub estimate: LaneEstimate,
    pub left: ZoneMoments,
    pub center: ZoneMoments,
    pub right: ZoneMoments,
    pub source: FusionSource,
}

// ============================================================================
// ESTIMATOR
// ============================================================================

#[derive(Debug, Clone)]
pub struct LaneCenterEstimator {
    config: LaneDetectorConfig,
}

impl LaneCenterEstimator {
    pub fn new(config: LaneDetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LaneDetectorConfig {
        &self.config
    }

    pub fn estimate(&self, mask: &Mask) -> LaneDetection {
        let width = mask.width();
        let third = width / 3;
        let min_mass = self.config.min_zone_mass;

        let left = zone_moments(mask, 0, third, Zone::Left, min_mass);
        let center = zone_moments(mask, third, 2 * third, Zone::Center, min_mass);
        let right = zone_moments(mask, 2 * third, width, Zone::Right, min_mass);

        let (estimate, source) =
            self.fuse(left.centroid_x, center.centroid_x, right.centroid_x, width);

        debug!(
            "Lane zones: L={:.0}/{:?} C={:.0}/{:?} R={:.0}/{:?} -> {:?} x={:.1} valid={}",
            left.mass,
            left.centroid_x,
            center.mass,
            center.centroid_x,
            right.mass,
            right.centroid_x,
            source,
            estimate.center_x,
            estimate.valid
        );

        LaneDetection {
            estimate,
            left,
            center,
            right,
            source,
        }
    }

    /// Apply the priority rules to per-zone centroids.
    pub fn fuse(
        &self,
        left: Option<f32>,
        center: Option<f32>,
        right: Option<f32>,
        width: u32,
    ) -> (LaneEstimate, FusionSource) {
        let half_lane = self.config.nominal_lane_width / 2.0;

        match (left, center, right) {
            (Some(l), _, Some(r)) => {
                if self.gap_is_plausible(r - l) {
                    (LaneEstimate::detected((l + r) / 2.0), FusionSource::BothSides)
                } else {
                    (LaneEstimate::lost(width), FusionSource::RejectedPair)
                }
            }
            (Some(l), _, None) => (LaneEstimate::detected(l + half_lane), FusionSource::LeftOnly),
            (None, _, Some(r)) => (
                LaneEstimate::detected(r - half_lane),
                FusionSource::RightOnly,
            ),
            (None, Some(c), None) => (LaneEstimate::detected(c), FusionSource::CenterOnly),
            (None, None, None) => (LaneEstimate::lost(width), FusionSource::NoDetection),
        }
    }

    fn gap_is_plausible(&self, gap: f32) -> bool {
        let nominal = self.config.nominal_lane_width;
        gap >= nominal * self.config.min_gap_ratio && gap <= nominal * self.config.max_gap_ratio
    }
}

/// Mass and centroid of columns `x_start..x_end`.
pub fn zone_moments(mask: &Mask, x_start: u32, x_end: u32, zone: Zone, min_mass: f64) -> ZoneMoments {
    let mut m00 = 0.0f64;
    let mut m10 = 0.0f64;

    for y in 0..mask.height() {
        for x in x_start..x_end.min(mask.width()) {
            let v = mask.get_pixel(x, y).0[0];
            if v > 0 {
                m00 += v as f64;
                m10 += v as f64 * x as f64;
            }
        }
    }

    let centroid_x = if m00 > min_mass {
        Some((m10 / m00) as f32)
    } else {
        None
    };

    ZoneMoments {
        zone,
        mass: m00,
        centroid_x,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use image::{GrayImage, Luma};

    fn mask_with_columns(w: u32, h: u32, cols: &[(u32, u32)]) -> GrayImage {
        let mut mask = GrayImage::new(w, h);
        for &(x0, x1) in cols {
            for y in 0..h {
                for x in x0..=x1 {
                    mask.put_pixel(x, y, Luma([255]));
                }
            }
        }
        mask
    }

    fn estimator() -> LaneCenterEstimator {
        LaneCenterEstimator::new(LaneDetectorConfig::default())
    }

    #[test]
    fn test_empty_mask_is_lost() {
        let det = estimator().estimate(&GrayImage::new(640, 480));
        assert!(!det.estimate.valid);
        assert_eq!(det.estimate.center_x, 320.0);
        assert_eq!(det.source, FusionSource::NoDetection);
    }

    #[test]
    fn test_left_only_adds_half_lane_width() {
        let mask = mask_with_columns(640, 480, &[(90, 110)]);
        let det = estimator().estimate(&mask);
        assert_eq!(det.source, FusionSource::LeftOnly);
        assert!(det.estimate.valid);
        let left = det.left.centroid_x.unwrap();
        assert_abs_diff_eq!(left, 100.0, epsilon = 1e-3);
        assert_abs_diff_eq!(det.estimate.center_x, left + 150.0, epsilon = 1e-3);
    }

    #[test]
    fn test_right_only_subtracts_half_lane_width() {
        let mask = mask_with_columns(640, 480, &[(500, 520)]);
        let det = estimator().estimate(&mask);
        assert_eq!(det.source, FusionSource::RightOnly);
        assert_abs_diff_eq!(det.estimate.center_x, 510.0 - 150.0, epsilon = 1e-3);
    }

    #[test]
    fn test_two_sided_midpoint() {
        let mask = mask_with_columns(640, 480, &[(140, 160), (440, 460)]);
        let det = estimator().estimate(&mask);
        assert_eq!(det.source, FusionSource::BothSides);
        assert!(det.estimate.valid);
        assert_abs_diff_eq!(det.estimate.center_x, 300.0, epsilon = 1e-3);
    }

    #[test]
    fn test_two_sided_lane_drives_steering_left() {
        use crate::steering::{SteeringConfig, SteeringController};

        let mask = mask_with_columns(640, 480, &[(140, 160), (440, 460)]);
        let det = estimator().estimate(&mask);
        let angle = SteeringController::new(SteeringConfig::default())
            .steering_angle(&det.estimate, mask.width());
        assert!(det.estimate.valid);
        assert_abs_diff_eq!(det.estimate.center_x, 300.0, epsilon = 1e-3);
        assert_abs_diff_eq!(angle, 2.0, epsilon = 1e-3);
    }

    #[test]
    fn test_implausible_gap_is_rejected_not_averaged() {
        // Same blobs, but a 100px nominal width makes the 300px gap 3x too wide
        let config = LaneDetectorConfig {
            nominal_lane_width: 100.0,
            ..LaneDetectorConfig::default()
        };
        let mask = mask_with_columns(640, 480, &[(140, 160), (300, 340), (440, 460)]);
        let det = LaneCenterEstimator::new(config).estimate(&mask);
        assert_eq!(det.source, FusionSource::RejectedPair);
        assert!(!det.estimate.valid);
        // Center zone was detected too, but a rejected pair does not fall through
        assert!(det.center.centroid_x.is_some());
    }

    #[test]
    fn test_gap_band_is_inclusive() {
        let est = estimator();
        let (a, src_a) = est.fuse(Some(100.0), None, Some(250.0), 640);
        assert_eq!(src_a, FusionSource::BothSides);
        assert_abs_diff_eq!(a.center_x, 175.0);
        let (_, src_b) = est.fuse(Some(0.0), None, Some(600.0), 640);
        assert_eq!(src_b, FusionSource::BothSides);
        let (_, src_c) = est.fuse(Some(0.0), None, Some(601.0), 640);
        assert_eq!(src_c, FusionSource::RejectedPair);
        let (_, src_d) = est.fuse(Some(100.0), None, Some(249.0), 640);
        assert_eq!(src_d, FusionSource::RejectedPair);
    }

    #[test]
    fn test_center_only_is_weakest_fallback() {
        let mask = mask_with_columns(640, 480, &[(310, 330)]);
        let det = estimator().estimate(&mask);
        assert_eq!(det.source, FusionSource::CenterOnly);
        assert_abs_diff_eq!(det.estimate.center_x, 320.0, epsilon = 1e-3);
    }

    #[test]
    fn test_side_detection_beats_center() {
        let mask = mask_with_columns(640, 480, &[(90, 110), (310, 330)]);
        let det = estimator().estimate(&mask);
        assert_eq!(det.source, FusionSource::LeftOnly);
    }

    #[test]
    fn test_mass_must_exceed_threshold() {
        // One pixel = 255 mass, two = 510
        let mut mask = GrayImage::new(640, 480);
        mask.put_pixel(50, 10, Luma([255]));
        let det = estimator().estimate(&mask);
        assert!(det.left.centroid_x.is_none());
        assert!(!det.estimate.valid);

        mask.put_pixel(52, 10, Luma([255]));
        let det = estimator().estimate(&mask);
        assert_abs_diff_eq!(det.left.centroid_x.unwrap(), 51.0);
        assert!(det.estimate.valid);
    }

    #[test]
    fn test_centroid_is_value_weighted() {
        let mut mask = GrayImage::new(90, 10);
        for y in 0..10 {
            mask.put_pixel(0, y, Luma([255]));
            mask.put_pixel(20, y, Luma([85]));
        }
        let m = zone_moments(&mask, 0, 30, Zone::Left, 300.0);
        // (0*255 + 20*85) / 340 = 5
        assert_abs_diff_eq!(m.centroid_x.unwrap(), 5.0, epsilon = 1e-4);
        assert_abs_diff_eq!(m.mass, 3400.0);
    }

    #[test]
    fn test_estimate_is_deterministic() {
        let mask = mask_with_columns(640, 480, &[(140, 160), (440, 460)]);
        let est = estimator();
        assert_eq!(est.estimate(&mask), est.estimate(&mask));
    }
}
