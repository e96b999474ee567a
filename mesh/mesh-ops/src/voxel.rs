//! The voxel remeshing operator.

use mesh_voxel::{voxel_remesh, VoxelRemeshParams};
use tracing::info;

use mesh_model::Mesh;

use crate::error::{OpsError, OpsResult};
use crate::operator::{MeshOperator, Transaction};
use crate::slivers::remove_intersections_core;

/// Rebuild a mesh volumetrically (the lossy fallback reconstruction).
///
/// The input is sampled as a signed distance field at a
/// level-of-detail-controlled resolution (the voxel size halves per level
/// increment), contoured, and simplified by normal angle. The input mesh
/// is destroyed and replaced by the reconstruction.
///
/// An optional self-overlap repair pass runs the sliver-removal loop on
/// the output, for inputs whose field sign was unreliable enough to fold
/// the contour through itself.
#[derive(Debug)]
pub struct RemeshByVoxel {
    mesh: Mesh,
    params: VoxelRemeshParams,
    repair_overlaps: bool,
    executed: bool,
}

impl RemeshByVoxel {
    /// Create the operator with default parameters.
    #[must_use]
    pub fn new(mesh: Mesh) -> Self {
        Self {
            mesh,
            params: VoxelRemeshParams::default(),
            repair_overlaps: false,
            executed: false,
        }
    }

    /// Replace the remeshing parameters.
    #[must_use]
    pub fn with_params(mut self, params: VoxelRemeshParams) -> Self {
        self.params = params;
        self
    }

    /// Set the level of detail.
    #[must_use]
    pub fn with_level_of_detail(mut self, lod: u32) -> Self {
        self.params.level_of_detail = lod;
        self
    }

    /// Enable the post-contouring self-overlap repair pass.
    #[must_use]
    pub fn with_overlap_repair(mut self, enabled: bool) -> Self {
        self.repair_overlaps = enabled;
        self
    }
}

impl MeshOperator for RemeshByVoxel {
    fn name(&self) -> &'static str {
        "remesh-by-voxel"
    }

    fn apply(&mut self, tx: &mut Transaction<'_>) -> OpsResult<()> {
        if self.executed {
            return Err(OpsError::AlreadyExecuted);
        }
        self.executed = true;
        tx.require(&self.mesh)?;

        let output = voxel_remesh(&self.mesh, &self.params)?;
        if self.repair_overlaps {
            let (removed, _) = remove_intersections_core(&output.mesh, None, f64::INFINITY);
            if removed > 0 {
                info!(removed, "overlap repair after voxel remesh");
            }
        }

        tx.remove_mesh(&self.mesh)?;
        tx.add_mesh(output.mesh);
        Ok(())
    }
}
