//! The transactional mesh owner.

use hashbrown::HashMap;
use mesh_model::{Mesh, MeshContainer, MeshSnapshot, TriangleId};
use tracing::{debug, info};

use crate::error::{OpsError, OpsResult};
use crate::operator::{MeshOperator, Transaction};
use crate::result::OperationResult;

/// Identifier of a part state snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(u64);

/// Caller-assigned integer tags per triangle, carried across the
/// mesh-to-body conversion for provenance tracking.
#[derive(Debug, Clone, Default)]
pub struct TriangleTagMap {
    tags: HashMap<TriangleId, i32>,
}

impl TriangleTagMap {
    /// Create an empty tag map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a tag to a triangle.
    pub fn set_tag(&mut self, triangle: TriangleId, tag: i32) {
        self.tags.insert(triangle, tag);
    }

    /// Tag of a triangle, if assigned.
    #[must_use]
    pub fn tag(&self, triangle: TriangleId) -> Option<i32> {
        self.tags.get(&triangle).copied()
    }

    /// Number of tagged triangles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// True when no triangle is tagged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// The external body-construction collaborator.
///
/// Implementations turn a healed, watertight mesh into whatever solid
/// representation the host kernel uses. The part only cares about
/// success/failure: on success the mesh's ownership transfers to the
/// builder and it leaves the part.
pub trait BodyBuilder {
    /// Consume one mesh and build a body from it.
    ///
    /// # Errors
    ///
    /// Any error aborts the handoff; the part stays untouched.
    fn build_body(
        &mut self,
        mesh: &Mesh,
        tags: Option<&TriangleTagMap>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// The transactional owner of a mutable set of meshes.
///
/// All operator execution goes through [`Part::modify_using`], which
/// guarantees atomicity: either the operation's mesh mutations are all
/// reflected, or the call errors and the mesh set (contents included) is
/// unchanged. Coarser checkpoints span multiple operations via
/// [`Part::note_state`] / [`Part::change_state`].
///
/// # Example
///
/// ```
/// use mesh_ops::{Part, Separate};
///
/// // Two disjoint triangles in one mesh.
/// let mut part = Part::new();
/// part.import(
///     &[
///         0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0,
///         5.0, 0.0, 0.0, 6.0, 0.0, 0.0, 5.0, 1.0, 0.0,
///     ],
///     &[0, 1, 2, 3, 4, 5],
/// ).unwrap();
///
/// let mesh = part.meshes().get(0).unwrap();
/// let mut separate = Separate::new(mesh);
/// let result = part.modify_using(&mut separate).unwrap();
/// assert_eq!(result.len(), 2);
/// ```
#[derive(Default)]
pub struct Part {
    meshes: MeshContainer,
    states: HashMap<u64, Vec<(Mesh, MeshSnapshot)>>,
    next_state: u64,
    threads: usize,
}

impl Part {
    /// Create an empty part.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Import a mesh from raw buffers and take ownership of it.
    ///
    /// `positions` holds `x y z` triples, `connectivity` 0-based index
    /// triples. The importer rejects malformed buffers, out-of-range
    /// indices, non-finite coordinates, and repeated corners.
    ///
    /// # Errors
    ///
    /// Propagates [`mesh_model::ModelError`] from validation.
    pub fn import(
        &mut self,
        positions: &[f64],
        connectivity: &[u32],
    ) -> OpsResult<OperationResult> {
        let mesh = Mesh::from_raw(positions, connectivity)?;
        self.meshes.push(mesh.clone());

        let mut result = OperationResult::new();
        result.push(mesh);
        info!(
            nodes = positions.len() / 3,
            triangles = connectivity.len() / 3,
            "imported mesh into part"
        );
        Ok(result)
    }

    /// Add an externally built mesh to the part.
    pub fn add_mesh(&mut self, mesh: Mesh) {
        self.meshes.push(mesh);
    }

    /// The current mesh set.
    #[must_use]
    pub fn meshes(&self) -> &MeshContainer {
        &self.meshes
    }

    /// Thread budget for internally parallel operator stages.
    /// `0` (the default) delegates to rayon's global pool size.
    pub fn set_number_of_threads(&mut self, threads: usize) {
        self.threads = threads;
    }

    /// Current thread budget.
    #[must_use]
    pub fn number_of_threads(&self) -> usize {
        self.threads
    }

    /// Execute an operator transactionally.
    ///
    /// Snapshots every owned mesh first; if the operator errors, both the
    /// mesh set and every mesh's contents are restored, so a failed call
    /// leaves no partial mutation behind.
    ///
    /// # Errors
    ///
    /// Whatever the operator reports; the part is unchanged in that case.
    pub fn modify_using(&mut self, op: &mut dyn MeshOperator) -> OpsResult<OperationResult> {
        op.set_thread_budget(self.threads);

        let backup: Vec<(Mesh, MeshSnapshot)> = self
            .meshes
            .iter()
            .map(|m| (m.clone(), m.snapshot()))
            .collect();
        let set_backup = self.meshes.clone();

        let outcome = {
            let mut tx = Transaction::new(&mut self.meshes);
            op.apply(&mut tx).map(|()| tx.into_result())
        };

        match outcome {
            Ok(result) => {
                debug!(
                    operator = op.name(),
                    produced = result.len(),
                    destroyed = result.destroyed().len(),
                    "operation committed"
                );
                Ok(result)
            }
            Err(error) => {
                self.meshes = set_backup;
                for (mesh, snapshot) in &backup {
                    mesh.restore(snapshot);
                }
                debug!(operator = op.name(), %error, "operation rolled back");
                Err(error)
            }
        }
    }

    /// Record a named snapshot of the whole mesh set.
    ///
    /// The snapshot captures both which meshes exist and their contents.
    pub fn note_state(&mut self) -> StateId {
        let id = self.next_state;
        self.next_state += 1;
        let snapshot = self
            .meshes
            .iter()
            .map(|m| (m.clone(), m.snapshot()))
            .collect();
        self.states.insert(id, snapshot);
        debug!(state = id, "noted part state");
        StateId(id)
    }

    /// Restore a snapshot taken with [`Part::note_state`].
    ///
    /// Invalidates handles and containers obtained after the snapshot:
    /// meshes created since then leave the part, and restored meshes
    /// reflect their recorded contents. The snapshot itself stays valid
    /// and can be restored again.
    ///
    /// # Errors
    ///
    /// [`OpsError::UnknownState`] for an id this part never issued.
    pub fn change_state(&mut self, id: StateId) -> OpsResult<()> {
        let snapshot = self
            .states
            .get(&id.0)
            .ok_or(OpsError::UnknownState(id.0))?;

        let mut restored = MeshContainer::new();
        for (mesh, contents) in snapshot {
            mesh.restore(contents);
            restored.push(mesh.clone());
        }
        self.meshes = restored;
        info!(state = id.0, meshes = self.meshes.len(), "restored part state");
        Ok(())
    }

    /// Hand one mesh to the body builder; on success it leaves the part.
    ///
    /// # Errors
    ///
    /// - [`OpsError::MeshNotInPart`] when the part does not own `mesh`
    /// - [`OpsError::BodyConstruction`] when the builder rejects it (the
    ///   part keeps the mesh)
    pub fn create_body(
        &mut self,
        mesh: &Mesh,
        builder: &mut dyn BodyBuilder,
        tags: Option<&TriangleTagMap>,
    ) -> OpsResult<()> {
        let index = (0..self.meshes.len())
            .find(|&i| self.meshes.get(i).is_some_and(|m| m.same_store(mesh)))
            .ok_or(OpsError::MeshNotInPart {
                mesh: mesh.id().value(),
            })?;

        builder
            .build_body(mesh, tags)
            .map_err(|source| OpsError::BodyConstruction {
                mesh: mesh.id().value(),
                source,
            })?;

        self.meshes.remove(index);
        Ok(())
    }

    /// Hand every owned mesh to the body builder.
    ///
    /// All-or-nothing: if any mesh is rejected, no mesh leaves the part
    /// and the error names the offending mesh — run a check on it for the
    /// blocking anomalies. On success returns the number of bodies built
    /// and the part ends up empty.
    ///
    /// # Errors
    ///
    /// [`OpsError::BodyConstruction`] from the first rejected mesh.
    pub fn create_all_bodies(
        &mut self,
        builder: &mut dyn BodyBuilder,
        tags: Option<&TriangleTagMap>,
    ) -> OpsResult<usize> {
        for mesh in self.meshes.iter() {
            builder
                .build_body(mesh, tags)
                .map_err(|source| OpsError::BodyConstruction {
                    mesh: mesh.id().value(),
                    source,
                })?;
        }

        let built = self.meshes.len();
        self.meshes = MeshContainer::new();
        info!(bodies = built, "built all bodies");
        Ok(built)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingBuilder {
        built: usize,
        fail_on: Option<usize>,
    }

    impl BodyBuilder for CountingBuilder {
        fn build_body(
            &mut self,
            _mesh: &Mesh,
            _tags: Option<&TriangleTagMap>,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            if self.fail_on == Some(self.built) {
                return Err("not watertight".into());
            }
            self.built += 1;
            Ok(())
        }
    }

    fn triangle_part() -> Part {
        let mut part = Part::new();
        part.import(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0], &[0, 1, 2])
            .unwrap();
        part
    }

    #[test]
    fn import_rejects_bad_connectivity() {
        let mut part = Part::new();
        let result = part.import(&[0.0, 0.0, 0.0], &[0, 0, 5]);
        assert!(result.is_err());
        assert!(part.meshes().is_empty());
    }

    #[test]
    fn note_and_change_state_round_trip() {
        let mut part = triangle_part();
        let mesh = part.meshes().get(0).unwrap();
        let state = part.note_state();

        let tri = mesh.triangles().get(0).unwrap();
        mesh.remove_triangle(tri);
        part.add_mesh(Mesh::new());
        assert_eq!(part.meshes().len(), 2);

        part.change_state(state).unwrap();
        assert_eq!(part.meshes().len(), 1);
        assert_eq!(part.meshes().get(0).unwrap().triangle_count(), 1);
    }

    #[test]
    fn change_state_unknown_id() {
        let mut part = triangle_part();
        assert!(matches!(
            part.change_state(StateId(99)),
            Err(OpsError::UnknownState(99))
        ));
    }

    #[test]
    fn create_all_bodies_consumes_on_success() {
        let mut part = triangle_part();
        let mut builder = CountingBuilder {
            built: 0,
            fail_on: None,
        };

        let built = part.create_all_bodies(&mut builder, None).unwrap();
        assert_eq!(built, 1);
        assert!(part.meshes().is_empty());
    }

    #[test]
    fn create_all_bodies_failure_leaves_part() {
        let mut part = triangle_part();
        part.import(&[0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0, 0.0], &[0, 1, 2])
            .unwrap();

        let mut builder = CountingBuilder {
            built: 0,
            fail_on: Some(1),
        };
        let result = part.create_all_bodies(&mut builder, None);

        assert!(matches!(result, Err(OpsError::BodyConstruction { .. })));
        assert_eq!(part.meshes().len(), 2);
    }

    #[test]
    fn tag_map_round_trip() {
        let part = triangle_part();
        let mesh = part.meshes().get(0).unwrap();
        let tri = mesh.triangles().get(0).unwrap();

        let mut tags = TriangleTagMap::new();
        assert!(tags.is_empty());
        tags.set_tag(tri, 42);
        assert_eq!(tags.tag(tri), Some(42));
        assert_eq!(tags.len(), 1);
    }
}
