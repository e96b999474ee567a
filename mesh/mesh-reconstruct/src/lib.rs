//! Surface reconstruction from point data.
//!
//! Builds meshes from unstructured points in three modes:
//!
//! - [`reconstruct_from_points`] - raw points; normals are estimated by a
//!   PCA tangent-plane fit over k nearest neighbors and oriented
//!   consistently by propagation over a (larger) neighbor graph
//! - [`reconstruct_with_normals`] - points with externally supplied
//!   oriented normals
//! - [`resurface`] - rebuild an existing mesh from its own node positions
//!   and normals
//!
//! Surfacing itself is implicit: a signed tangent-plane distance field is
//! sampled on a level-of-detail-controlled lattice and contoured. The
//! screening factor bounds how far the field extrapolates from the data,
//! trading recall of thin features against removal of inaccurate surface
//! extensions.

// Safety: Deny unwrap/expect in library code. Tests may use them.
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod error;
mod normals;
mod surface;

pub use error::{ReconstructError, ReconstructResult};
pub use normals::{estimate_normals, orient_normals};
pub use surface::{
    reconstruct_from_points, reconstruct_with_normals, resurface, ReconstructParams,
};
