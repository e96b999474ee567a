//! Error types for operators and parts.

use thiserror::Error;

/// Result type for operator and part operations.
pub type OpsResult<T> = Result<T, OpsError>;

/// Errors reported by operators and the part lifecycle.
///
/// Geometric imperfection is *not* an error: partial stitches, residual
/// intersections, and failed heal components are reported through result
/// queries and anomaly containers. These variants cover contract misuse
/// and genuinely unrecoverable conditions.
#[derive(Debug, Error)]
pub enum OpsError {
    /// The operator was already executed; operators run exactly once.
    #[error("operator has already been executed")]
    AlreadyExecuted,

    /// The operator was executed without a required input.
    #[error("operator is missing an input: {0}")]
    MissingInput(&'static str),

    /// An operator referenced a mesh the part does not own.
    #[error("mesh {mesh} is not owned by this part")]
    MeshNotInPart {
        /// Identity of the offending mesh.
        mesh: u64,
    },

    /// `change_state` was called with an unknown snapshot id.
    #[error("unknown state id {0}")]
    UnknownState(u64),

    /// A hole boundary cannot be triangulated.
    #[error("cannot triangulate boundary: {reason}")]
    Triangulation {
        /// What made the boundary untriangulable.
        reason: String,
    },

    /// Body construction was rejected by the builder.
    #[error("body construction failed for mesh {mesh}: {source}")]
    BodyConstruction {
        /// Identity of the mesh that failed.
        mesh: u64,
        /// The builder's error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Error from the mesh store (malformed import data, container misuse).
    #[error(transparent)]
    Model(#[from] mesh_model::ModelError),

    /// Error from volumetric reconstruction.
    #[error(transparent)]
    Voxel(#[from] mesh_voxel::VoxelError),

    /// Error from point-cloud reconstruction.
    #[error(transparent)]
    Reconstruct(#[from] mesh_reconstruct::ReconstructError),
}
