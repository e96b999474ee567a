//! Mesh store for the healing pipeline.
//!
//! This crate owns the polyhedral data model:
//!
//! - [`Mesh`] - reference-semantics handle over a node/triangle/bar store
//! - [`NodeId`] / [`TriangleId`] / [`Bar`] - typed handles, valid only
//!   relative to the mesh that produced them
//! - [`NodeContainer`] / [`TriangleContainer`] / [`BarContainer`] /
//!   [`MeshContainer`] - insertion-ordered, sliceable collections
//! - [`Triangle`] - concrete triangle geometry for predicates
//! - [`MeshSerializer`] - export buffers for rendering/interchange
//!
//! # Ownership and aliasing
//!
//! Cloning a [`Mesh`] creates an *alias* of the same store, not a copy;
//! use [`Mesh::deep_clone`] for an independent snapshot. Handles embed the
//! identity of their owning mesh, and querying a mesh with a foreign handle
//! panics — that is a caller programming error, not a recoverable geometric
//! condition.
//!
//! # Example
//!
//! ```
//! use mesh_model::Mesh;
//!
//! // One triangle.
//! let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
//! let connectivity = [0u32, 1, 2];
//! let mesh = Mesh::from_raw(&positions, &connectivity).unwrap();
//!
//! assert_eq!(mesh.node_count(), 3);
//! assert_eq!(mesh.triangle_count(), 1);
//! assert!(!mesh.is_watertight()); // Three boundary bars.
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them.
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod adjacency;
mod containers;
mod error;
mod handle;
mod serialize;
mod store;
mod triangle;

pub use containers::{
    BarContainer, MeshContainer, MeshScoped, NodeContainer, ScopedContainer, TriangleContainer,
};
pub use error::{ModelError, ModelResult};
pub use handle::{Bar, MeshId, NodeId, TriangleId};
pub use serialize::MeshSerializer;
pub use store::{Mesh, MeshSnapshot};
pub use triangle::Triangle;

// Re-export the math and bounds types that appear in this crate's API.
pub use nalgebra::{Point3, Vector3};
pub use ph_spatial::Aabb;
