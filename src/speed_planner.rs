// src/speed_planner.rs
//
// Turn-dependent target speed with first-order smoothing.
//
// The filter is per-frame, not per-second: with acceleration_rate 0.05 the
// commanded speed closes 5% of the remaining gap every processed frame, so
// the response time scales with the loop's frame rate.

use crate::types::ControlState;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    /// Target while |angle| is below `angle_threshold`
    pub max_speed: f32,
    /// Target at and beyond `full_lock_angle`
    pub min_speed: f32,
    /// Degrees; the linear slowdown starts here
    pub angle_threshold: f32,
    /// Degrees; the slowdown bottoms out here
    pub full_lock_angle: f32,
    /// Fraction of the remaining gap closed per frame
    pub acceleration_rate: f32,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            max_speed: 50.0,
            min_speed: 15.0,
            angle_threshold: 15.0,
            full_lock_angle: 35.0,
            acceleration_rate: 0.05,
        }
    }
}

/// Owns the commanded speed, the only state carried between frames.
#[derive(Debug, Clone)]
pub struct SpeedPlanner {
    config: SpeedConfig,
    state: ControlState,
}

impl SpeedPlanner {
    pub fn new(config: SpeedConfig) -> Self {
        Self {
            config,
            state: ControlState::default(),
        }
    }

    pub fn config(&self) -> &SpeedConfig {
        &self.config
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = ControlState::default();
    }

    /// Target speed for a steering angle (degrees).
    pub fn target_speed(&self, steering_angle: f32, lane_valid: bool) -> f32 {
        if !lane_valid {
            return 0.0;
        }

        let c = &self.config;
        let magnitude = steering_angle.abs();
        if magnitude < c.angle_threshold {
            return c.max_speed;
        }

        let span = c.full_lock_angle - c.angle_threshold;
        if span <= 0.0 {
            return c.min_speed;
        }

        let t = (magnitude - c.angle_threshold) / span;
        (c.max_speed - (c.max_speed - c.min_speed) * t).max(c.min_speed)
    }

    /// Advance one frame and return the new commanded speed.
    ///
    /// A lost lane stops immediately; there is no deceleration ramp.
    pub fn update(&mut self, steering_angle: f32, lane_valid: bool) -> f32 {
        if !lane_valid {
            self.state.commanded_speed = 0.0;
            return 0.0;
        }

        let target = self.target_speed(steering_angle, lane_valid);
        let current = self.state.commanded_speed;
        let next = (current + (target - current) * self.config.acceleration_rate).max(0.0);
        self.state.commanded_speed = next;

        debug!(
            "Speed: angle={:.2} target={:.2} commanded={:.2}",
            steering_angle, target, next
        );

        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn planner() -> SpeedPlanner {
        SpeedPlanner::new(SpeedConfig::default())
    }

    #[test]
    fn test_target_speed_profile() {
        let p = planner();
        assert_eq!(p.target_speed(0.0, true), 50.0);
        assert_eq!(p.target_speed(14.9, true), 50.0);
        assert_eq!(p.target_speed(-14.9, true), 50.0);
        assert_abs_diff_eq!(p.target_speed(15.0, true), 50.0);
        assert_abs_diff_eq!(p.target_speed(25.0, true), 32.5, epsilon = 1e-4);
        assert_abs_diff_eq!(p.target_speed(-25.0, true), 32.5, epsilon = 1e-4);
        assert_abs_diff_eq!(p.target_speed(35.0, true), 15.0, epsilon = 1e-4);
        assert_eq!(p.target_speed(60.0, true), 15.0);
        assert_eq!(p.target_speed(0.0, false), 0.0);
    }

    #[test]
    fn test_degenerate_angle_span_uses_min_speed() {
        let p = SpeedPlanner::new(SpeedConfig {
            angle_threshold: 20.0,
            full_lock_angle: 20.0,
            ..SpeedConfig::default()
        });
        assert_eq!(p.target_speed(25.0, true), 15.0);
        assert_eq!(p.target_speed(5.0, true), 50.0);
    }

    #[test]
    fn test_first_update_from_rest() {
        let mut p = planner();
        let speed = p.update(0.0, true);
        assert_abs_diff_eq!(speed, 2.5, epsilon = 1e-5);
        assert_abs_diff_eq!(p.state().commanded_speed, 2.5, epsilon = 1e-5);
    }

    #[test]
    fn test_converges_without_overshoot() {
        let mut p = planner();
        let mut previous = 0.0;
        for _ in 0..400 {
            let speed = p.update(0.0, true);
            assert!(speed >= previous);
            assert!(speed <= 50.0);
            previous = speed;
        }
        assert!((50.0 - previous).abs() < 1e-3);
    }

    #[test]
    fn test_decelerates_monotonically_from_above() {
        let mut p = planner();
        for _ in 0..400 {
            p.update(0.0, true);
        }
        // Sharp turn: target 15
        let mut previous = p.state().commanded_speed;
        for _ in 0..400 {
            let speed = p.update(35.0, true);
            assert!(speed <= previous);
            assert!(speed >= 15.0);
            previous = speed;
        }
        assert!((previous - 15.0).abs() < 1e-3);
    }

    #[test]
    fn test_lost_lane_stops_immediately() {
        let mut p = planner();
        for _ in 0..50 {
            p.update(0.0, true);
        }
        assert!(p.state().commanded_speed > 10.0);
        assert_eq!(p.update(0.0, false), 0.0);
        assert_eq!(p.state().commanded_speed, 0.0);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut p = planner();
        p.update(0.0, true);
        p.reset();
        assert_eq!(p.state(), ControlState::default());
    }
}
