//! Explicit triangle removal.

use mesh_model::TriangleContainer;
use tracing::debug;

use crate::error::{OpsError, OpsResult};
use crate::operator::{MeshOperator, Transaction};

/// Remove an explicit set of triangles from their mesh.
///
/// The triangles must all belong to one mesh (the container enforces
/// that). Resulting boundary bars are left in place — the operation may
/// open new holes and that is the caller's intent, not an error. Orphaned
/// nodes stay; run [`crate::RemoveDuplicateNodes`] or a heal pass to
/// collect them if needed.
#[derive(Debug)]
pub struct RemoveTriangles {
    triangles: TriangleContainer,
    executed: bool,
}

impl RemoveTriangles {
    /// Create the operator for a set of triangles of one mesh.
    #[must_use]
    pub fn new(triangles: TriangleContainer) -> Self {
        Self {
            triangles,
            executed: false,
        }
    }
}

impl MeshOperator for RemoveTriangles {
    fn name(&self) -> &'static str {
        "remove-triangles"
    }

    fn apply(&mut self, tx: &mut Transaction<'_>) -> OpsResult<()> {
        if self.executed {
            return Err(OpsError::AlreadyExecuted);
        }
        self.executed = true;

        if self.triangles.is_empty() {
            return Err(OpsError::MissingInput("no triangles to remove"));
        }

        // Resolve the owning mesh within the part.
        let owner = self
            .triangles
            .mesh()
            .and_then(|id| tx.meshes().iter().find(|m| m.id() == id).cloned())
            .ok_or_else(|| OpsError::MeshNotInPart {
                mesh: self.triangles.mesh().map_or(0, |m| m.value()),
            })?;

        for tri in self.triangles.iter() {
            if owner.contains_triangle(tri) {
                owner.remove_triangle(tri);
            }
        }
        debug!(
            removed = self.triangles.len(),
            remaining = owner.triangle_count(),
            "removed triangles"
        );

        tx.mark_modified(&owner)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::Part;

    #[test]
    fn removal_opens_boundary() {
        let mut part = Part::new();
        part.import(
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0],
            &[0, 1, 2, 1, 3, 2],
        )
        .unwrap();
        let mesh = part.meshes().get(0).unwrap();

        let mut doomed = TriangleContainer::new();
        doomed.push(mesh.triangles().get(1).unwrap()).unwrap();

        part.modify_using(&mut RemoveTriangles::new(doomed)).unwrap();

        assert_eq!(mesh.triangle_count(), 1);
        // All three remaining bars are boundary now.
        assert_eq!(mesh.boundary_bars().len(), 3);
        // Nodes are untouched, including the now-orphaned one.
        assert_eq!(mesh.node_count(), 4);
    }

    #[test]
    fn empty_set_is_rejected() {
        let mut part = Part::new();
        let mut op = RemoveTriangles::new(TriangleContainer::new());
        assert!(matches!(
            part.modify_using(&mut op),
            Err(OpsError::MissingInput(_))
        ));
    }

    #[test]
    fn triangles_from_unowned_mesh_rejected() {
        let mut part = Part::new();
        part.import(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0], &[0, 1, 2])
            .unwrap();

        // A mesh the part does not own.
        let outsider = mesh_model::Mesh::from_raw(
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            &[0, 1, 2],
        )
        .unwrap();
        let mut doomed = TriangleContainer::new();
        doomed.push(outsider.triangles().get(0).unwrap()).unwrap();

        let result = part.modify_using(&mut RemoveTriangles::new(doomed));
        assert!(matches!(result, Err(OpsError::MeshNotInPart { .. })));
    }
}
