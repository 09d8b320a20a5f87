// src/pipeline/frame_context.rs
//
// Everything the pipeline derived from one frame. Stages write their
// results here in order; downstream consumers (overlay, transport, tests)
// read from the same context instead of re-running stages.

use crate::lane_detection::LaneDetection;
use crate::obstacle::ObstacleReport;
use crate::telemetry::{RobotPacket, TelemetryRecord};
use crate::types::{Frame, LaneEstimate, Mask};
use image::RgbImage;

#[derive(Debug, Clone)]
pub struct FrameContext {
    pub frame_id: u64,
    pub timestamp_ms: f64,
    pub frame: Frame,

    /// Camera-space lane-candidate mask
    pub mask: Mask,
    /// Bird's-eye warp of `mask`
    pub birds_eye: Mask,
    pub detection: LaneDetection,

    // Control
    pub steering_angle: f32,
    pub commanded_speed: f32,

    pub obstacle: ObstacleReport,
    pub telemetry: TelemetryRecord,
    /// Camera frame with overlays
    pub annotated: RgbImage,
}

impl FrameContext {
    pub fn estimate(&self) -> &LaneEstimate {
        &self.detection.estimate
    }

    pub fn lane_valid(&self) -> bool {
        self.detection.estimate.valid
    }

    /// Datagram payload without images; see `RobotPacket::with_images`.
    pub fn robot_packet(&self) -> RobotPacket {
        RobotPacket::new(self.telemetry.clone())
    }
}
