//! Spatial acceleration primitives for mesh processing.
//!
//! This crate provides the layer-0 spatial data structures used throughout
//! the healing pipeline:
//!
//! - [`Aabb`] - Axis-aligned bounding box
//! - [`VoxelCoord`] - Discrete 3D grid coordinate
//! - [`ScalarGrid`] - Dense 3D scalar field (signed distances, occupancy)
//! - [`PointGrid`] - Snap-cell spatial hash for proximity queries
//! - [`Bvh`] - Flat bounding volume hierarchy for overlap pruning
//!
//! # Layer 0
//!
//! This crate depends only on math and collection libraries; it knows nothing
//! about meshes. Mesh crates layer their adjacency and healing logic on top.

// Safety: Deny unwrap/expect in library code. Tests may use them.
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod bounds;
mod bvh;
mod error;
mod grid;
mod hash;
mod voxel;

pub use bounds::Aabb;
pub use bvh::Bvh;
pub use error::{SpatialError, SpatialResult};
pub use grid::ScalarGrid;
pub use hash::PointGrid;
pub use voxel::VoxelCoord;
