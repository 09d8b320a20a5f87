// src/lib.rs

pub mod color_analysis;
pub mod config;
pub mod error;
pub mod frame_source;
pub mod lane_detection;
pub mod obstacle;
pub mod perspective;
pub mod pipeline;
pub mod preprocessing;
pub mod road_overlay;
pub mod speed_planner;
pub mod steering;
pub mod telemetry;
pub mod transport;
pub mod types;

pub use error::PipelineError;
pub use pipeline::{FrameContext, LanePipeline};
pub use types::{Config, ControlState, Frame, LaneEstimate, LaneStatus, Mask};
