// src/telemetry.rs
//
// Telemetry records and the JSON envelopes they travel in.
//
// Field names on the wire are fixed by existing operator consoles:
//   steering_angle, laneStatus, speed, deviation,
//   obstacleDetected, obstacleDistance, obstaclePosition

use crate::error::PipelineError;
use crate::obstacle::ObstacleReport;
use crate::types::{LaneEstimate, LaneStatus};
use base64::Engine;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

// ============================================================================
// TELEMETRY RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryRecord {
    pub steering_angle: f64,
    #[serde(rename = "laneStatus")]
    pub lane_status: LaneStatus,
    pub speed: f64,
    /// steering_angle / 10, kept for older consoles
    pub deviation: f64,
    #[serde(rename = "obstacleDetected")]
    pub obstacle_detected: bool,
    #[serde(rename = "obstacleDistance")]
    pub obstacle_distance: f64,
    #[serde(rename = "obstaclePosition")]
    pub obstacle_position: String,
}

impl Default for TelemetryRecord {
    /// Neutral state: lane lost, stopped, obstacle unknown.
    fn default() -> Self {
        Self {
            steering_angle: 0.0,
            lane_status: LaneStatus::Lost,
            speed: 0.0,
            deviation: 0.0,
            obstacle_detected: false,
            obstacle_distance: 0.0,
            obstacle_position: "unknown".to_string(),
        }
    }
}

impl TelemetryRecord {
    /// Assemble the per-frame record. Numeric fields are rounded to 2 decimals.
    pub fn compose(
        steering_angle: f32,
        estimate: &LaneEstimate,
        commanded_speed: f32,
        obstacle: &ObstacleReport,
    ) -> Self {
        let angle = steering_angle as f64;
        Self {
            steering_angle: round2(angle),
            lane_status: estimate.status(),
            speed: round2(commanded_speed as f64),
            deviation: round2(angle / 10.0),
            obstacle_detected: obstacle.detected,
            obstacle_distance: round2(obstacle.distance as f64),
            obstacle_position: obstacle.position.clone(),
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

// ============================================================================
// ROBOT -> RELAY
// ============================================================================

/// Payload of a `robot_telemetry` datagram.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotPacket {
    #[serde(flatten)]
    pub telemetry: TelemetryRecord,
    /// Base64 JPEG of the camera frame; empty when omitted
    pub raw_image_b64: String,
    /// Base64 JPEG of the annotated frame; empty when omitted
    pub processed_image_b64: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl RobotPacket {
    pub fn new(telemetry: TelemetryRecord) -> Self {
        Self {
            telemetry,
            ..Self::default()
        }
    }

    /// Attach both frames as base64 JPEG.
    pub fn with_images(
        mut self,
        raw: &RgbImage,
        processed: &RgbImage,
        quality: u8,
    ) -> Result<Self, PipelineError> {
        self.raw_image_b64 = encode_jpeg_base64(raw, quality)?;
        self.processed_image_b64 = encode_jpeg_base64(processed, quality)?;
        self.width = Some(raw.width());
        self.height = Some(raw.height());
        Ok(self)
    }

    /// Same packet with image payloads removed.
    pub fn without_images(&self) -> Self {
        Self {
            telemetry: self.telemetry.clone(),
            ..Self::default()
        }
    }

    pub fn has_images(&self) -> bool {
        !self.raw_image_b64.is_empty() || !self.processed_image_b64.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RobotMessage {
    RobotTelemetry { data: RobotPacket },
}

// ============================================================================
// RELAY -> OPERATOR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperatorMessage {
    ImageRaw { data: String, width: u32, height: u32 },
    ImageProcessed { data: String, width: u32, height: u32 },
    Telemetry { data: TelemetryRecord },
    Error { message: String },
}

// ============================================================================
// IMAGE ENCODING
// ============================================================================

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    image
        .write_with_encoder(encoder)
        .map_err(|e| PipelineError::Encode(e.to_string()))?;
    Ok(buf.into_inner())
}

pub fn encode_jpeg_base64(image: &RgbImage, quality: u8) -> Result<String, PipelineError> {
    let jpeg = encode_jpeg(image, quality)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(jpeg))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_wire_field_names() {
        let record = TelemetryRecord::compose(
            2.0,
            &LaneEstimate::detected(300.0),
            12.3456,
            &ObstacleReport {
                detected: false,
                distance: 120.0,
                position: "center".to_string(),
            },
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "steering_angle": 2.0,
                "laneStatus": "Detected",
                "speed": 12.35,
                "deviation": 0.2,
                "obstacleDetected": false,
                "obstacleDistance": 120.0,
                "obstaclePosition": "center"
            })
        );
    }

    #[test]
    fn test_lost_record_is_neutral() {
        let record = TelemetryRecord::compose(
            0.0,
            &LaneEstimate::lost(640),
            0.0,
            &ObstacleReport::unknown(),
        );
        assert_eq!(record, TelemetryRecord::default());
        assert_eq!(record.lane_status.as_str(), "Lost");
    }

    #[test]
    fn test_rounding_to_two_decimals() {
        assert_eq!(round2(-3.14159), -3.14);
        assert_eq!(round2(0.005), 0.01);
        assert_eq!(round2(35.0), 35.0);
    }

    #[test]
    fn test_robot_message_flattens_telemetry() {
        let msg = RobotMessage::RobotTelemetry {
            data: RobotPacket::new(TelemetryRecord::default()),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "robot_telemetry");
        assert_eq!(value["data"]["laneStatus"], "Lost");
        assert_eq!(value["data"]["raw_image_b64"], "");
        assert!(value["data"].get("width").is_none());

        let back: RobotMessage = serde_json::from_value(value).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_operator_envelopes() {
        let image = OperatorMessage::ImageRaw {
            data: "abc".to_string(),
            width: 640,
            height: 480,
        };
        assert_eq!(
            serde_json::to_value(&image).unwrap(),
            json!({"type": "image_raw", "data": "abc", "width": 640, "height": 480})
        );

        let telemetry = OperatorMessage::Telemetry {
            data: TelemetryRecord::default(),
        };
        let value: Value = serde_json::to_value(&telemetry).unwrap();
        assert_eq!(value["type"], "telemetry");
        assert_eq!(value["data"]["obstaclePosition"], "unknown");

        let err = OperatorMessage::Error {
            message: "camera offline".to_string(),
        };
        assert_eq!(serde_json::to_value(&err).unwrap()["type"], "error");
    }

    #[test]
    fn test_images_attach_as_base64_jpeg() {
        let raw = RgbImage::from_pixel(32, 24, image::Rgb([10, 200, 30]));
        let packet = RobotPacket::new(TelemetryRecord::default())
            .with_images(&raw, &raw, 50)
            .unwrap();
        assert!(packet.has_images());
        assert_eq!(packet.width, Some(32));
        assert_eq!(packet.height, Some(24));

        let jpeg = base64::engine::general_purpose::STANDARD
            .decode(&packet.raw_image_b64)
            .unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let stripped = packet.without_images();
        assert!(!stripped.has_images());
        assert_eq!(stripped.telemetry, packet.telemetry);
    }
}
