//! Insertion-ordered containers for mesh entities.

use crate::error::{ModelError, ModelResult};
use crate::handle::{Bar, MeshId, NodeId, TriangleId};
use crate::store::Mesh;

/// Implemented by handle types that belong to a specific mesh.
pub trait MeshScoped: Copy + Eq {
    /// Identity of the owning mesh.
    fn owning_mesh(self) -> MeshId;
}

impl MeshScoped for NodeId {
    fn owning_mesh(self) -> MeshId {
        self.mesh()
    }
}

impl MeshScoped for TriangleId {
    fn owning_mesh(self) -> MeshId {
        self.mesh()
    }
}

impl MeshScoped for Bar {
    fn owning_mesh(self) -> MeshId {
        self.mesh()
    }
}

/// An insertion-ordered collection of handles scoped to one mesh.
///
/// All elements must belong to the same mesh; pushing an element from a
/// different mesh is a contract violation reported as
/// [`ModelError::MeshMismatch`]. Copying a container is cheap relative to
/// geometry: it copies handles, never positions or connectivity.
///
/// Use the aliases [`NodeContainer`], [`TriangleContainer`], and
/// [`BarContainer`].
///
/// # Example
///
/// ```
/// use mesh_model::{Mesh, NodeContainer};
/// use nalgebra::Point3;
///
/// let mesh = Mesh::new();
/// let a = mesh.add_node(Point3::new(0.0, 0.0, 0.0));
/// let b = mesh.add_node(Point3::new(1.0, 0.0, 0.0));
///
/// let mut nodes = NodeContainer::new();
/// nodes.push(a).unwrap();
/// nodes.push(b).unwrap();
/// assert_eq!(nodes.len(), 2);
/// assert_eq!(nodes.slice(1..2).get(0), Some(b));
/// ```
#[derive(Debug, Clone)]
pub struct ScopedContainer<T: MeshScoped> {
    mesh: Option<MeshId>,
    items: Vec<T>,
}

/// Container of [`NodeId`]s of a single mesh.
pub type NodeContainer = ScopedContainer<NodeId>;
/// Container of [`TriangleId`]s of a single mesh.
pub type TriangleContainer = ScopedContainer<TriangleId>;
/// Container of [`Bar`]s of a single mesh.
pub type BarContainer = ScopedContainer<Bar>;

impl<T: MeshScoped> Default for ScopedContainer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: MeshScoped> ScopedContainer<T> {
    /// Create an empty container, not yet bound to a mesh.
    ///
    /// The first pushed element binds it.
    #[must_use]
    pub fn new() -> Self {
        Self {
            mesh: None,
            items: Vec::new(),
        }
    }

    pub(crate) fn scoped(mesh: MeshId, items: Vec<T>) -> Self {
        Self {
            mesh: Some(mesh),
            items,
        }
    }

    /// The mesh this container is bound to, once non-empty.
    #[must_use]
    pub fn mesh(&self) -> Option<MeshId> {
        self.mesh
    }

    /// Append an element.
    ///
    /// # Errors
    ///
    /// [`ModelError::MeshMismatch`] if the element belongs to a different
    /// mesh than the container's existing elements.
    pub fn push(&mut self, item: T) -> ModelResult<()> {
        let owner = item.owning_mesh();
        match self.mesh {
            None => self.mesh = Some(owner),
            Some(mesh) if mesh == owner => {}
            Some(mesh) => {
                return Err(ModelError::MeshMismatch {
                    expected: mesh.value(),
                    found: owner.value(),
                });
            }
        }
        self.items.push(item);
        Ok(())
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if no elements are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Element at `index`, or `None` past the end.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.items.get(index).copied()
    }

    /// True if `item` is present.
    #[must_use]
    pub fn contains(&self, item: T) -> bool {
        self.items.contains(&item)
    }

    /// Iterate over elements in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.items.iter().copied()
    }

    /// Elements as a slice, in insertion order.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// A new container over the half-open index range `range`.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds, like slice indexing.
    #[must_use]
    pub fn slice(&self, range: std::ops::Range<usize>) -> Self {
        Self {
            mesh: self.mesh,
            items: self.items[range].to_vec(),
        }
    }
}

impl<'a, T: MeshScoped> IntoIterator for &'a ScopedContainer<T> {
    type Item = T;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter().copied()
    }
}

/// An insertion-ordered collection of [`Mesh`] handles.
///
/// Elements alias their stores (cloning a `Mesh` never copies geometry),
/// so this container is a lightweight manifest. Unlike the geometry
/// containers it spans meshes by design.
#[derive(Debug, Clone, Default)]
pub struct MeshContainer {
    items: Vec<Mesh>,
}

impl MeshContainer {
    /// Create an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Append a mesh handle.
    pub fn push(&mut self, mesh: Mesh) {
        self.items.push(mesh);
    }

    /// Number of meshes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if no meshes are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Mesh handle at `index` (an alias, cheap to clone).
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Mesh> {
        self.items.get(index).cloned()
    }

    /// True if a mesh with the same store is present.
    #[must_use]
    pub fn contains(&self, mesh: &Mesh) -> bool {
        self.items.iter().any(|m| m.same_store(mesh))
    }

    /// Iterate over the mesh handles in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Mesh> + '_ {
        self.items.iter()
    }

    /// A new container over the half-open index range `range`.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds, like slice indexing.
    #[must_use]
    pub fn slice(&self, range: std::ops::Range<usize>) -> Self {
        Self {
            items: self.items[range].to_vec(),
        }
    }

    /// Remove and return the mesh at `index`, or `None` past the end.
    pub fn remove(&mut self, index: usize) -> Option<Mesh> {
        if index < self.items.len() {
            Some(self.items.remove(index))
        } else {
            None
        }
    }
}

impl<'a> IntoIterator for &'a MeshContainer {
    type Item = &'a Mesh;
    type IntoIter = std::slice::Iter<'a, Mesh>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<Mesh> for MeshContainer {
    fn from_iter<I: IntoIterator<Item = Mesh>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn two_meshes() -> (Mesh, Mesh) {
        (Mesh::new(), Mesh::new())
    }

    #[test]
    fn push_binds_to_first_mesh() {
        let (a, b) = two_meshes();
        let na = a.add_node(Point3::origin());
        let nb = b.add_node(Point3::origin());

        let mut container = NodeContainer::new();
        assert!(container.mesh().is_none());
        container.push(na).unwrap();
        assert_eq!(container.mesh(), Some(a.id()));

        let err = container.push(nb);
        assert!(matches!(err, Err(ModelError::MeshMismatch { .. })));
    }

    #[test]
    fn slice_preserves_scope_and_order() {
        let mesh = Mesh::new();
        let ids: Vec<_> = (0..5)
            .map(|i| mesh.add_node(Point3::new(i as f64, 0.0, 0.0)))
            .collect();

        let mut container = NodeContainer::new();
        for &id in &ids {
            container.push(id).unwrap();
        }

        let mid = container.slice(1..4);
        assert_eq!(mid.len(), 3);
        assert_eq!(mid.get(0), Some(ids[1]));
        assert_eq!(mid.mesh(), container.mesh());
    }

    #[test]
    fn clone_is_independent_of_original() {
        let mesh = Mesh::new();
        let a = mesh.add_node(Point3::origin());
        let b = mesh.add_node(Point3::new(1.0, 0.0, 0.0));

        let mut original = NodeContainer::new();
        original.push(a).unwrap();

        let mut copy = original.clone();
        copy.push(b).unwrap();

        assert_eq!(original.len(), 1);
        assert_eq!(copy.len(), 2);
    }

    #[test]
    fn mesh_container_tracks_aliases() {
        let (a, _) = two_meshes();
        let mut container = MeshContainer::new();
        container.push(a.clone());

        assert!(container.contains(&a));
        assert!(container.contains(&a.clone()));
        assert_eq!(container.len(), 1);

        let removed = container.remove(0).unwrap();
        assert!(removed.same_store(&a));
        assert!(container.is_empty());
    }
}
