//! Error types surfaced by the block queue and the control surface.

use thiserror::Error;

/// Errors reported synchronously to producers and control-surface callers.
///
/// Worker-side processing problems (a detector miss, an underfilled
/// buffer at capture time) are never surfaced as errors; they are logged
/// and the affected capture is discarded.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A pushed block's channel count disagrees with the shape
    /// established by the first block.
    #[error("block has {got} channel rows, stream is established at {expected}")]
    ShapeMismatch { expected: usize, got: usize },

    /// A control-surface setter was called with an unusable value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
