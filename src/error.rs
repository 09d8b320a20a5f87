// src/error.rs

use thiserror::Error;

/// Failures inside the per-frame pipeline.
///
/// A lost lane or a missing frame is not an error; those are ordinary
/// outcomes carried by `LaneEstimate::valid` and `Option<Frame>`.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Raw RGB buffer does not match `width * height * 3`.
    #[error("frame buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// The road quadrilateral collapsed (zero-sized frame or coincident corners).
    #[error("degenerate perspective geometry for a {width}x{height} frame")]
    DegenerateGeometry { width: u32, height: u32 },

    #[error("image encoding failed: {0}")]
    Encode(String),
}
