//! Error types for selection and edit operations.

use thiserror::Error;

/// Errors raised by the selection mask, the editor and the edit session.
///
/// Every operation that returns one of these leaves the mask, the image
/// and the change history in the state they had before the call.
#[derive(Debug, Error)]
pub enum EditError {
    /// A block or offset does not fit inside the target volume.
    #[error("block at offset {offset:?} with shape {shape:?} exceeds volume extent {extent:?}")]
    OutOfBounds {
        offset: [usize; 3],
        shape: [usize; 3],
        extent: [usize; 3],
    },

    /// Two arrays that must share a shape do not.
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: [usize; 3],
        found: [usize; 3],
    },

    /// Data cannot move between images with a different shape or spacing.
    #[error("incompatible geometry: {0}")]
    IncompatibleGeometry(String),

    /// Change groups were opened or closed out of order.
    #[error("invalid change group state: {0}")]
    InvalidGroupState(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T, E = EditError> = std::result::Result<T, E>;
