// src/pipeline/orchestrator.rs
//
// One synchronous pass per frame:
//
//   frame -> preprocess -> warp -> lane center -> steering -> speed
//         -> obstacle -> telemetry + overlay
//
// The commanded speed is the only state carried between calls. The
// perspective transform is cached per resolution and rebuilt whenever the
// frame size changes.

use crate::error::PipelineError;
use crate::lane_detection::LaneCenterEstimator;
use crate::obstacle::{FixedObstacleSensor, ObstacleReport, ObstacleSensor};
use crate::perspective::{PerspectiveConfig, PerspectiveTransform};
use crate::pipeline::{FrameContext, PipelineMetrics};
use crate::preprocessing::{preprocess, PreprocessConfig};
use crate::road_overlay::OverlayRenderer;
use crate::speed_planner::SpeedPlanner;
use crate::steering::SteeringController;
use crate::telemetry::TelemetryRecord;
use crate::types::{Config, ControlState, Frame, LaneStatus};
use anyhow::Result;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct LanePipeline {
    preprocess: PreprocessConfig,
    perspective: PerspectiveConfig,
    estimator: LaneCenterEstimator,
    steering: SteeringController,
    speed: SpeedPlanner,
    obstacle_sensor: Box<dyn ObstacleSensor>,
    obstacle_threshold: f32,
    overlay: OverlayRenderer,
    transform: Option<PerspectiveTransform>,
    last_status: Option<LaneStatus>,
    metrics: PipelineMetrics,
}

impl LanePipeline {
    /// Build from config, loading the overlay font if one is configured.
    pub fn new(config: &Config) -> Result<Self> {
        let overlay = OverlayRenderer::new(config.overlay.clone())?;
        Ok(Self::with_overlay(config, overlay))
    }

    pub fn with_overlay(config: &Config, overlay: OverlayRenderer) -> Self {
        Self {
            preprocess: config.preprocess.clone(),
            perspective: config.perspective,
            estimator: LaneCenterEstimator::new(config.lane),
            steering: SteeringController::new(config.steering),
            speed: SpeedPlanner::new(config.speed),
            obstacle_sensor: Box::new(FixedObstacleSensor::from_config(&config.obstacle)),
            obstacle_threshold: config.obstacle.detection_threshold,
            overlay,
            transform: None,
            last_status: None,
            metrics: PipelineMetrics::new(),
        }
    }

    pub fn with_obstacle_sensor(mut self, sensor: Box<dyn ObstacleSensor>) -> Self {
        self.obstacle_sensor = sensor;
        self
    }

    pub fn with_metrics(mut self, metrics: PipelineMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub fn control_state(&self) -> ControlState {
        self.speed.state()
    }

    /// Transform used for the most recent frame.
    pub fn transform(&self) -> Option<&PerspectiveTransform> {
        self.transform.as_ref()
    }

    /// Run every stage on `frame`.
    pub fn process(&mut self, frame: Frame) -> Result<FrameContext, PipelineError> {
        let started = Instant::now();
        let (width, height) = (frame.width(), frame.height());

        let transform = self.transform_for(width, height)?;

        let mask = preprocess(&frame.image, &self.preprocess);
        let birds_eye = transform.warp_mask(&mask, &self.perspective);
        let detection = self.estimator.estimate(&birds_eye);
        let estimate = detection.estimate;

        let steering_angle = self.steering.steering_angle(&estimate, width);
        let commanded_speed = self.speed.update(steering_angle, estimate.valid);

        let reading = self.obstacle_sensor.read();
        let obstacle = ObstacleReport::assess(reading, self.obstacle_threshold, estimate.valid);

        let telemetry =
            TelemetryRecord::compose(steering_angle, &estimate, commanded_speed, &obstacle);
        let annotated = self
            .overlay
            .annotate(&frame.image, &estimate, &transform, steering_angle);

        self.record(frame.frame_id, estimate.status(), started);

        debug!(
            "Frame {}: {:?} x={:.1} angle={:.2} speed={:.2}",
            frame.frame_id, detection.source, estimate.center_x, steering_angle, commanded_speed
        );

        Ok(FrameContext {
            frame_id: frame.frame_id,
            timestamp_ms: frame.timestamp_ms,
            frame,
            mask,
            birds_eye,
            detection,
            steering_angle,
            commanded_speed,
            obstacle,
            telemetry,
            annotated,
        })
    }

    fn transform_for(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<PerspectiveTransform, PipelineError> {
        if let Some(t) = &self.transform {
            if t.matches(width, height) {
                return Ok(t.clone());
            }
            info!(
                "Resolution changed {:?} -> {}x{}, rebuilding perspective transform",
                t.dimensions(),
                width,
                height
            );
        }
        let t = PerspectiveTransform::for_frame(width, height, &self.perspective)?;
        self.transform = Some(t.clone());
        Ok(t)
    }

    fn record(&mut self, frame_id: u64, status: LaneStatus, started: Instant) {
        let m = &self.metrics;
        m.inc(&m.total_frames);
        match status {
            LaneStatus::Detected => m.inc(&m.frames_with_lane),
            LaneStatus::Lost => m.inc(&m.frames_lane_lost),
        }
        m.set_timing(&m.pipeline_time_us, started.elapsed().as_micros() as u64);

        if self.last_status != Some(status) {
            match status {
                LaneStatus::Detected => info!("✓ Lane acquired at frame {}", frame_id),
                LaneStatus::Lost => {
                    warn!("Lane lost at frame {}, stopping", frame_id);
                    if self.last_status.is_some() {
                        m.inc(&m.lane_loss_events);
                    }
                }
            }
            self.last_status = Some(status);
        }
    }
}
