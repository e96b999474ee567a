//! Error types for surface reconstruction.

use thiserror::Error;

/// Result type for reconstruction operations.
pub type ReconstructResult<T> = Result<T, ReconstructError>;

/// Errors that can occur during surface reconstruction.
#[derive(Debug, Error)]
pub enum ReconstructError {
    /// Too few points for the operation.
    #[error("insufficient points: need at least {required}, got {actual}")]
    InsufficientPoints {
        /// Minimum number of points required.
        required: usize,
        /// Number of points provided.
        actual: usize,
    },

    /// Normals buffer does not match the point buffer.
    #[error("{points} points but {normals} normals")]
    MismatchedNormals {
        /// Number of points provided.
        points: usize,
        /// Number of normals provided.
        normals: usize,
    },

    /// A parameter is out of its valid range.
    #[error("invalid parameter: {reason}")]
    InvalidParameter {
        /// What was wrong.
        reason: String,
    },

    /// The implicit surfacing stage failed.
    #[error(transparent)]
    Surface(#[from] mesh_voxel::VoxelError),
}
