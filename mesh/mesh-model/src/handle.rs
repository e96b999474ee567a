//! Typed handles for mesh entities.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_MESH_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a mesh store.
///
/// Every handle embeds the `MeshId` of the mesh that produced it, so
/// cross-mesh handle misuse is caught at the first query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MeshId(u64);

impl MeshId {
    /// Allocate a fresh, never-before-seen id.
    pub(crate) fn fresh() -> Self {
        Self(NEXT_MESH_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, for diagnostics.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for MeshId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle to a node (3D position) of a specific mesh.
///
/// The index is monotonically increasing within its mesh and is never
/// reused while the mesh lives. Handles are meaningful only relative to
/// the mesh that produced them; comparing handles across meshes compares
/// identity, not geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    pub(crate) mesh: MeshId,
    pub(crate) index: u64,
}

impl NodeId {
    /// Stable numeric identity within the owning mesh.
    #[must_use]
    pub fn id(self) -> u64 {
        self.index
    }

    /// Identity of the owning mesh.
    #[must_use]
    pub fn mesh(self) -> MeshId {
        self.mesh
    }
}

/// Handle to a triangle of a specific mesh.
///
/// Same identity rules as [`NodeId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TriangleId {
    pub(crate) mesh: MeshId,
    pub(crate) index: u64,
}

impl TriangleId {
    /// Stable numeric identity within the owning mesh.
    #[must_use]
    pub fn id(self) -> u64 {
        self.index
    }

    /// Identity of the owning mesh.
    #[must_use]
    pub fn mesh(self) -> MeshId {
        self.mesh
    }
}

/// An undirected edge between two nodes, derived from triangle sides.
///
/// Bars are value types: `Bar::new(a, b)` and `Bar::new(b, a)` compare
/// equal and hash identically, and bars order totally (by node index), so
/// they work as map keys.
///
/// # Example
///
/// ```
/// use mesh_model::{Bar, Mesh};
/// use nalgebra::Point3;
///
/// let mesh = Mesh::new();
/// let a = mesh.add_node(Point3::new(0.0, 0.0, 0.0));
/// let b = mesh.add_node(Point3::new(1.0, 0.0, 0.0));
///
/// assert_eq!(Bar::new(a, b), Bar::new(b, a));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bar {
    // Invariant: a.index < b.index, same mesh.
    a: NodeId,
    b: NodeId,
}

impl Bar {
    /// Create a bar between two nodes of the same mesh.
    ///
    /// # Panics
    ///
    /// Panics if the nodes belong to different meshes or are the same node —
    /// both are caller programming errors.
    #[must_use]
    pub fn new(a: NodeId, b: NodeId) -> Self {
        assert_eq!(
            a.mesh, b.mesh,
            "bar endpoints belong to different meshes ({} and {})",
            a.mesh, b.mesh
        );
        assert_ne!(a.index, b.index, "bar endpoints must be distinct nodes");

        if a.index < b.index {
            Self { a, b }
        } else {
            Self { a: b, b: a }
        }
    }

    /// The two endpoints, in canonical (ascending-index) order.
    #[must_use]
    pub fn nodes(self) -> [NodeId; 2] {
        [self.a, self.b]
    }

    /// Identity of the owning mesh.
    #[must_use]
    pub fn mesh(self) -> MeshId {
        self.a.mesh
    }

    /// Canonical index pair, used internally as an adjacency key.
    pub(crate) fn key(self) -> (u64, u64) {
        (self.a.index, self.b.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(mesh: MeshId, index: u64) -> NodeId {
        NodeId { mesh, index }
    }

    #[test]
    fn mesh_ids_are_unique() {
        let a = MeshId::fresh();
        let b = MeshId::fresh();
        assert_ne!(a, b);
    }

    #[test]
    fn bar_is_order_independent() {
        let m = MeshId::fresh();
        let (a, b) = (node(m, 3), node(m, 7));
        assert_eq!(Bar::new(a, b), Bar::new(b, a));
        assert_eq!(Bar::new(a, b).nodes()[0].id(), 3);
    }

    #[test]
    fn bars_order_totally() {
        let m = MeshId::fresh();
        let low = Bar::new(node(m, 0), node(m, 1));
        let high = Bar::new(node(m, 0), node(m, 2));
        assert!(low < high);
    }

    #[test]
    #[should_panic(expected = "different meshes")]
    fn bar_rejects_cross_mesh_nodes() {
        let _ = Bar::new(node(MeshId::fresh(), 0), node(MeshId::fresh(), 1));
    }

    #[test]
    #[should_panic(expected = "distinct nodes")]
    fn bar_rejects_self_loop() {
        let m = MeshId::fresh();
        let _ = Bar::new(node(m, 4), node(m, 4));
    }
}
