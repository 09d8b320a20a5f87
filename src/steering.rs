// src/steering.rs
//
// Proportional steering from lateral lane offset.
//
// Sign convention: positive angle steers left, negative steers right.
// A lane centered right of the image midpoint gives a positive offset and
// therefore a negative (rightward) command.

use crate::types::LaneEstimate;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    /// Degrees of steering per pixel of offset
    pub gain: f32,
    /// Output is clamped to [-max_angle, max_angle]
    pub max_angle: f32,
    /// Estimates at or left of width * guard_min_fraction are ignored
    pub guard_min_fraction: f32,
    /// Estimates at or right of width * guard_max_fraction are ignored
    pub guard_max_fraction: f32,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            gain: 0.1,
            max_angle: 35.0,
            guard_min_fraction: 0.1,
            guard_max_fraction: 0.9,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SteeringController {
    config: SteeringConfig,
}

impl SteeringController {
    pub fn new(config: SteeringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SteeringConfig {
        &self.config
    }

    /// Steering angle in degrees for `estimate` on a frame `frame_width` px wide.
    ///
    /// Returns 0.0 for an invalid estimate or one outside the guard band.
    pub fn steering_angle(&self, estimate: &LaneEstimate, frame_width: u32) -> f32 {
        if !estimate.valid {
            return 0.0;
        }

        let width = frame_width as f32;
        let x = estimate.center_x;
        let lo = width * self.config.guard_min_fraction;
        let hi = width * self.config.guard_max_fraction;
        if !(x > lo && x < hi) {
            debug!("Lane center {:.1} outside guard band ({:.1}, {:.1})", x, lo, hi);
            return 0.0;
        }

        let offset = x - width / 2.0;
        let limit = self.config.max_angle.abs();
        (-offset * self.config.gain).clamp(-limit, limit)
    }
}
