//! Volumetric mesh reconstruction.
//!
//! The fallback path of the healing pipeline: when direct topological
//! repair stalls, the mesh is resampled as a signed scalar field on a
//! voxel lattice and re-contoured from scratch.
//!
//! - [`SignedField`] - signed distance sampling of a (roughly closed) mesh
//! - [`contour_field`] - isosurface extraction over a [`ph_spatial::ScalarGrid`]
//!   (marching-tetrahedra member of the marching-cubes family)
//! - [`simplify_by_normal_angle`] - collapse edges across locally flat regions
//! - [`voxel_remesh`] - the composed pipeline, level-of-detail driven
//!
//! Voxel remeshing is deliberately lossy: output fidelity is bounded by the
//! lattice resolution, which halves with each level-of-detail increment.
//!
//! # Example
//!
//! ```
//! use mesh_model::Mesh;
//! use mesh_voxel::{voxel_remesh, VoxelRemeshParams};
//!
//! // A watertight cube remeshes into another closed surface.
//! let positions = [
//!     0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0,
//!     0.0, 0.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0,
//! ];
//! let connectivity = [
//!     0, 2, 1, 0, 3, 2, 4, 5, 6, 4, 6, 7, 0, 1, 5, 0, 5, 4,
//!     1, 2, 6, 1, 6, 5, 2, 3, 7, 2, 7, 6, 3, 0, 4, 3, 4, 7,
//! ];
//! let cube = Mesh::from_raw(&positions, &connectivity).unwrap();
//!
//! let params = VoxelRemeshParams::default().with_level_of_detail(4);
//! let output = voxel_remesh(&cube, &params).unwrap();
//! assert!(output.mesh.triangle_count() > 0);
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them.
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod contour;
mod error;
mod field;
mod remesh;
mod simplify;

pub use contour::contour_field;
pub use error::{VoxelError, VoxelResult};
pub use field::SignedField;
pub use remesh::{voxel_remesh, VoxelRemeshOutput, VoxelRemeshParams};
pub use simplify::simplify_by_normal_angle;
