// src/obstacle.rs
//
// Obstacle sensing seam. Only a fixed-value sensor exists today; the
// pipeline takes any `ObstacleSensor`, so a real range finder can be
// dropped in without touching control code.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleConfig {
    /// Distance reported by the fixed sensor
    pub fixed_distance: f32,
    /// Position label reported by the fixed sensor
    pub position: String,
    /// An obstacle closer than this counts as detected
    pub detection_threshold: f32,
}

impl Default for ObstacleConfig {
    fn default() -> Self {
        Self {
            fixed_distance: 120.0,
            position: "center".to_string(),
            detection_threshold: 50.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObstacleReading {
    pub distance: f32,
    pub position: String,
}

pub trait ObstacleSensor: Send {
    fn read(&mut self) -> ObstacleReading;
}

/// Always reports the configured distance and position.
#[derive(Debug, Clone)]
pub struct FixedObstacleSensor {
    reading: ObstacleReading,
}

impl FixedObstacleSensor {
    pub fn new(distance: f32, position: impl Into<String>) -> Self {
        Self {
            reading: ObstacleReading {
                distance,
                position: position.into(),
            },
        }
    }

    pub fn from_config(config: &ObstacleConfig) -> Self {
        Self::new(config.fixed_distance, config.position.clone())
    }
}

impl ObstacleSensor for FixedObstacleSensor {
    fn read(&mut self) -> ObstacleReading {
        self.reading.clone()
    }
}

/// Obstacle fields as they appear in telemetry.
#[derive(Debug, Clone, PartialEq)]
pub struct ObstacleReport {
    pub detected: bool,
    pub distance: f32,
    pub position: String,
}

impl ObstacleReport {
    pub fn unknown() -> Self {
        Self {
            detected: false,
            distance: 0.0,
            position: "unknown".to_string(),
        }
    }

    /// Without a lane there is no frame of reference, so the report goes neutral.
    pub fn assess(reading: ObstacleReading, threshold: f32, lane_valid: bool) -> Self {
        if !lane_valid {
            return Self::unknown();
        }
        Self {
            detected: reading.distance < threshold,
            distance: reading.distance,
            position: reading.position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_far_obstacle_not_detected() {
        let mut sensor = FixedObstacleSensor::from_config(&ObstacleConfig::default());
        let report = ObstacleReport::assess(sensor.read(), 50.0, true);
        assert!(!report.detected);
        assert_eq!(report.distance, 120.0);
        assert_eq!(report.position, "center");
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut near = FixedObstacleSensor::new(49.9, "left");
        assert!(ObstacleReport::assess(near.read(), 50.0, true).detected);
        let mut edge = FixedObstacleSensor::new(50.0, "left");
        assert!(!ObstacleReport::assess(edge.read(), 50.0, true).detected);
    }

    #[test]
    fn test_lost_lane_forces_unknown() {
        let mut near = FixedObstacleSensor::new(10.0, "center");
        let report = ObstacleReport::assess(near.read(), 50.0, false);
        assert_eq!(report, ObstacleReport::unknown());
    }
}
