//! Error types for spatial structures.

use thiserror::Error;

/// Result type for spatial operations.
pub type SpatialResult<T> = Result<T, SpatialError>;

/// Errors that can occur while building spatial structures.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// Cell size must be positive and finite.
    #[error("invalid cell size {0} (must be positive and finite)")]
    InvalidCellSize(f64),

    /// A query radius exceeded what the structure can answer exactly.
    #[error("query radius {radius} exceeds cell size {cell_size}")]
    RadiusTooLarge {
        /// Requested query radius.
        radius: f64,
        /// Cell size the grid was built with.
        cell_size: f64,
    },

    /// Grid dimensions would overflow addressable memory.
    #[error("grid of {nx}x{ny}x{nz} cells is too large")]
    GridTooLarge {
        /// Cells along X.
        nx: usize,
        /// Cells along Y.
        ny: usize,
        /// Cells along Z.
        nz: usize,
    },
}
