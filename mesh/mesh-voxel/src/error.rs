//! Error types for volumetric reconstruction.

use thiserror::Error;

/// Result type for volumetric operations.
pub type VoxelResult<T> = Result<T, VoxelError>;

/// Errors that can occur during volumetric reconstruction.
#[derive(Debug, Error)]
pub enum VoxelError {
    /// The input mesh has no triangles.
    #[error("mesh is empty")]
    EmptyMesh,

    /// The requested level of detail produces no usable lattice.
    #[error("level of detail {0} yields a degenerate voxel lattice")]
    InvalidLevelOfDetail(u32),

    /// The sampling lattice could not be allocated.
    #[error("voxel lattice construction failed: {0}")]
    Lattice(#[from] ph_spatial::SpatialError),

    /// Contouring produced no surface (field never changes sign).
    #[error("contouring produced no triangles")]
    NoSurface,
}
