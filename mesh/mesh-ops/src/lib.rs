//! Topology operators and the transactional part lifecycle.
//!
//! A [`Part`] owns a mutable set of meshes. Operators are plain owned
//! values, configured through setters and executed exactly once through
//! [`Part::modify_using`], which applies them transactionally: on error the
//! part's mesh set is rolled back untouched. After execution an operator's
//! output queries (e.g. [`Heal::failed_meshes`]) become valid.
//!
//! Operators:
//!
//! - [`Separate`] - split into connected components
//! - [`Stitch`] - tolerance-based joining of meshes along boundary bars
//! - [`RemoveDuplicateNodes`] - snap-tolerance node welding
//! - [`RemoveTriangles`] - explicit triangle deletion
//! - [`RemoveIntersectingSlivers`] - iterative self-intersection cleanup
//! - [`HealOrientation`] - consistent winding propagation
//! - [`FillHoles`] - boundary-loop triangulation with optional refinement
//!   and smoothing
//! - [`RemeshByVoxel`] - lossy volumetric fallback reconstruction
//! - [`ReconstructSurface`] - point-cloud surfacing
//! - [`Heal`] - the escalating-repair orchestrator over all of the above
//!
//! # Example
//!
//! ```
//! use mesh_ops::Part;
//!
//! let mut part = Part::new();
//! let result = part.import(
//!     &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
//!     &[0, 1, 2],
//! ).unwrap();
//! assert_eq!(result.len(), 1);
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them.
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod dedup;
mod error;
mod heal;
mod holes;
mod operator;
mod orientation;
mod part;
mod reconstruct;
mod remove;
mod result;
mod separate;
mod slivers;
mod stitch;
mod voxel;

pub use dedup::RemoveDuplicateNodes;
pub use error::{OpsError, OpsResult};
pub use heal::Heal;
pub use holes::{BridgeStrength, FillHoles, HoleBoundary, HoleCost, SmoothingWeights};
pub use operator::{MeshOperator, Transaction};
pub use orientation::HealOrientation;
pub use part::{BodyBuilder, Part, StateId, TriangleTagMap};
pub use reconstruct::ReconstructSurface;
pub use remove::RemoveTriangles;
pub use result::OperationResult;
pub use separate::Separate;
pub use slivers::RemoveIntersectingSlivers;
pub use stitch::Stitch;
pub use voxel::RemeshByVoxel;
