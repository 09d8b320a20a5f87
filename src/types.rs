// src/types.rs

use crate::error::PipelineError;
use crate::frame_source::SourceConfig;
use crate::lane_detection::LaneDetectorConfig;
use crate::obstacle::ObstacleConfig;
use crate::perspective::PerspectiveConfig;
use crate::preprocessing::PreprocessConfig;
use crate::road_overlay::OverlayConfig;
use crate::speed_planner::SpeedConfig;
use crate::steering::SteeringConfig;
use crate::transport::{RelayConfig, TransportConfig};
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub preprocess: PreprocessConfig,
    pub perspective: PerspectiveConfig,
    pub lane: LaneDetectorConfig,
    pub steering: SteeringConfig,
    pub speed: SpeedConfig,
    pub obstacle: ObstacleConfig,
    pub overlay: OverlayConfig,
    pub source: SourceConfig,
    pub transport: TransportConfig,
    pub relay: RelayConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Log a metrics summary every N processed frames (0 disables)
    pub report_every_frames: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_every_frames: 150,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "lane_pilot=info".to_string(),
        }
    }
}

// ============================================================================
// FRAME DATA
// ============================================================================

/// Single-channel 0/255 mask, same size as the frame it came from.
pub type Mask = GrayImage;

#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub frame_id: u64,
    pub timestamp_ms: f64,
}

impl Frame {
    pub fn new(image: RgbImage, frame_id: u64, timestamp_ms: f64) -> Self {
        Self {
            image,
            frame_id,
            timestamp_ms,
        }
    }

    /// Wrap a packed RGB8 buffer (row-major, 3 bytes per pixel).
    pub fn from_rgb(
        data: Vec<u8>,
        width: u32,
        height: u32,
        frame_id: u64,
        timestamp_ms: f64,
    ) -> Result<Self, PipelineError> {
        let expected = width as usize * height as usize * 3;
        let actual = data.len();
        let image = RgbImage::from_raw(width, height, data)
            .ok_or(PipelineError::BufferSizeMismatch { expected, actual })?;
        Ok(Self::new(image, frame_id, timestamp_ms))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

// ============================================================================
// LANE / CONTROL STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LaneStatus {
    Detected,
    Lost,
}

impl LaneStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaneStatus::Detected => "Detected",
            LaneStatus::Lost => "Lost",
        }
    }

    /// Label drawn on the annotated frame.
    pub fn overlay_label(&self) -> &'static str {
        match self {
            LaneStatus::Detected => "Detected",
            LaneStatus::Lost => "LOST",
        }
    }
}

/// Lateral lane position in bird's-eye pixel coordinates.
///
/// When `valid` is false, `center_x` is only a neutral placeholder (the
/// frame midpoint) and must not drive control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneEstimate {
    pub center_x: f32,
    pub valid: bool,
}

impl LaneEstimate {
    pub fn detected(center_x: f32) -> Self {
        Self {
            center_x,
            valid: true,
        }
    }

    pub fn lost(frame_width: u32) -> Self {
        Self {
            center_x: frame_width as f32 / 2.0,
            valid: false,
        }
    }

    pub fn status(&self) -> LaneStatus {
        if self.valid {
            LaneStatus::Detected
        } else {
            LaneStatus::Lost
        }
    }
}

/// The only value carried from one frame to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ControlState {
    pub commanded_speed: f32,
}
