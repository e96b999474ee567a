//! The operator trait and its transaction context.

use mesh_model::{Mesh, MeshContainer};

use crate::error::{OpsError, OpsResult};
use crate::result::OperationResult;

/// A mesh-set transformation executed through [`crate::Part::modify_using`].
///
/// Operators are configured via setters *before* execution and run exactly
/// once; a second execution attempt reports
/// [`OpsError::AlreadyExecuted`]. Operators never run against meshes
/// outside a part — the part centralizes transactional bookkeeping and
/// rollback.
pub trait MeshOperator {
    /// Short operator name for diagnostics.
    fn name(&self) -> &'static str;

    /// Apply the operator inside a transaction.
    ///
    /// Implementations mutate meshes and the mesh set only through `tx`;
    /// on error the part restores every mesh to its pre-call contents.
    ///
    /// # Errors
    ///
    /// Contract violations ([`OpsError::MissingInput`],
    /// [`OpsError::MeshNotInPart`], [`OpsError::AlreadyExecuted`]) and
    /// unrecoverable resource failures. Geometric imperfection is reported
    /// through the operator's own output queries instead.
    fn apply(&mut self, tx: &mut Transaction<'_>) -> OpsResult<()>;

    /// Thread budget for internally parallel stages; `0` means the rayon
    /// default. Set by the part before `apply` from its own configuration.
    fn set_thread_budget(&mut self, _threads: usize) {}
}

/// Mutable view of a part's mesh set during one operator execution.
///
/// Tracks which meshes the operation produced and destroyed so the part
/// can assemble the [`OperationResult`].
pub struct Transaction<'p> {
    meshes: &'p mut MeshContainer,
    result: OperationResult,
}

impl<'p> Transaction<'p> {
    pub(crate) fn new(meshes: &'p mut MeshContainer) -> Self {
        Self {
            meshes,
            result: OperationResult::new(),
        }
    }

    pub(crate) fn into_result(self) -> OperationResult {
        self.result
    }

    /// The part's current mesh set.
    #[must_use]
    pub fn meshes(&self) -> &MeshContainer {
        self.meshes
    }

    /// True if the part owns `mesh` (by store identity).
    #[must_use]
    pub fn contains(&self, mesh: &Mesh) -> bool {
        self.meshes.contains(mesh)
    }

    /// Ensure the part owns `mesh`.
    ///
    /// # Errors
    ///
    /// [`OpsError::MeshNotInPart`] otherwise.
    pub fn require(&self, mesh: &Mesh) -> OpsResult<()> {
        if self.contains(mesh) {
            Ok(())
        } else {
            Err(OpsError::MeshNotInPart {
                mesh: mesh.id().value(),
            })
        }
    }

    /// Add a new mesh to the part and record it as produced.
    pub fn add_mesh(&mut self, mesh: Mesh) {
        self.meshes.push(mesh.clone());
        self.result.push(mesh);
    }

    /// Record an existing part mesh as (mutated) output without re-adding.
    ///
    /// # Errors
    ///
    /// [`OpsError::MeshNotInPart`] if the part does not own it.
    pub fn mark_modified(&mut self, mesh: &Mesh) -> OpsResult<()> {
        self.require(mesh)?;
        self.result.push(mesh.clone());
        Ok(())
    }

    /// Remove a mesh from the part, recording its destruction.
    ///
    /// # Errors
    ///
    /// [`OpsError::MeshNotInPart`] if the part does not own it.
    pub fn remove_mesh(&mut self, mesh: &Mesh) -> OpsResult<()> {
        let index = (0..self.meshes.len())
            .find(|&i| {
                self.meshes
                    .get(i)
                    .is_some_and(|m| m.same_store(mesh))
            })
            .ok_or(OpsError::MeshNotInPart {
                mesh: mesh.id().value(),
            })?;
        self.meshes.remove(index);
        self.result.record_destroyed(mesh.id());
        Ok(())
    }
}
