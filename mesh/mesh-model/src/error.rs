//! Error types for the mesh store.

use thiserror::Error;

/// Result type for mesh store operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors reported by the mesh store.
///
/// These cover malformed input data and container misuse. Foreign-handle
/// queries are *not* represented here: they panic, because they indicate a
/// caller bug rather than bad data.
#[derive(Debug, Error)]
pub enum ModelError {
    /// The position buffer length is not a multiple of 3.
    #[error("position buffer of {0} scalars is not a multiple of 3")]
    PositionsNotTriples(usize),

    /// The connectivity buffer length is not a multiple of 3.
    #[error("connectivity buffer of {0} indices is not a multiple of 3")]
    ConnectivityNotTriples(usize),

    /// A triangle references a node index outside the position array.
    #[error("triangle index {index} out of range (mesh has {node_count} nodes)")]
    IndexOutOfRange {
        /// The offending index.
        index: u32,
        /// Number of nodes the buffer defines.
        node_count: usize,
    },

    /// A coordinate is NaN or infinite.
    #[error("node {node} has a non-finite coordinate")]
    NonFiniteCoordinate {
        /// 0-based node index in the input buffer.
        node: usize,
    },

    /// A triangle references the same node more than once.
    #[error("triangle references node {node} more than once")]
    RepeatedCorner {
        /// The repeated node index.
        node: u64,
    },

    /// A container received an element belonging to a different mesh.
    #[error("container holds elements of mesh {expected}, got one from mesh {found}")]
    MeshMismatch {
        /// Mesh the container is scoped to.
        expected: u64,
        /// Mesh of the offending element.
        found: u64,
    },

    /// The mesh has no geometry where some is required.
    #[error("mesh is empty")]
    EmptyMesh,
}
