// src/pipeline/metrics.rs
//
// Counters for the control loop and the relay. Cheap to clone; every
// clone shares the same atomics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub frames_with_lane: Arc<AtomicU64>,
    pub frames_lane_lost: Arc<AtomicU64>,
    pub lane_loss_events: Arc<AtomicU64>,
    pub datagrams_sent: Arc<AtomicU64>,
    pub datagrams_failed: Arc<AtomicU64>,
    pub images_dropped: Arc<AtomicU64>,
    pub pipeline_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            frames_with_lane: Arc::new(AtomicU64::new(0)),
            frames_lane_lost: Arc::new(AtomicU64::new(0)),
            lane_loss_events: Arc::new(AtomicU64::new(0)),
            datagrams_sent: Arc::new(AtomicU64::new(0)),
            datagrams_failed: Arc::new(AtomicU64::new(0)),
            images_dropped: Arc::new(AtomicU64::new(0)),
            pipeline_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration_us: u64) {
        counter.store(duration_us, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames.load(Ordering::Relaxed),
            fps: self.fps(),
            frames_with_lane: self.frames_with_lane.load(Ordering::Relaxed),
            frames_lane_lost: self.frames_lane_lost.load(Ordering::Relaxed),
            lane_loss_events: self.lane_loss_events.load(Ordering::Relaxed),
            datagrams_sent: self.datagrams_sent.load(Ordering::Relaxed),
            datagrams_failed: self.datagrams_failed.load(Ordering::Relaxed),
            images_dropped: self.images_dropped.load(Ordering::Relaxed),
            last_pipeline_us: self.pipeline_time_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub fps: f64,
    pub frames_with_lane: u64,
    pub frames_lane_lost: u64,
    pub lane_loss_events: u64,
    pub datagrams_sent: u64,
    pub datagrams_failed: u64,
    pub images_dropped: u64,
    pub last_pipeline_us: u64,
    pub elapsed_secs: f64,
}

impl MetricsSummary {
    /// Fraction of processed frames with a usable lane estimate.
    pub fn lane_ratio(&self) -> f64 {
        if self.total_frames == 0 {
            0.0
        } else {
            self.frames_with_lane as f64 / self.total_frames as f64
        }
    }
}
