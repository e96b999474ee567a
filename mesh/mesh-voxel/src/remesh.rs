//! Level-of-detail voxel remeshing.

use mesh_model::Mesh;
use ph_spatial::ScalarGrid;
use rayon::prelude::*;
use tracing::info;

use crate::contour::contour_field;
use crate::error::{VoxelError, VoxelResult};
use crate::field::SignedField;
use crate::simplify::simplify_by_normal_angle;

/// Parameters for [`voxel_remesh`].
///
/// The voxel size derives from the mesh extent: the bounding-box diagonal
/// divided by `2^level_of_detail`, so each level-of-detail increment halves
/// the voxel size (and roughly octuples the work).
#[derive(Debug, Clone)]
pub struct VoxelRemeshParams {
    /// Logarithmic resolution control. Default: 6 (64 cells across the
    /// diagonal).
    pub level_of_detail: u32,

    /// Post-contouring simplification threshold in degrees; triangles in
    /// regions flatter than this get merged. Non-positive disables the
    /// pass. Default: 12.
    pub simplify_angle_degrees: f64,

    /// Extra voxel layers around the bounding box. Default: 2.
    pub padding_cells: usize,
}

impl Default for VoxelRemeshParams {
    fn default() -> Self {
        Self {
            level_of_detail: 6,
            simplify_angle_degrees: 12.0,
            padding_cells: 2,
        }
    }
}

impl VoxelRemeshParams {
    /// Set the level of detail.
    #[must_use]
    pub fn with_level_of_detail(mut self, lod: u32) -> Self {
        self.level_of_detail = lod;
        self
    }

    /// Set the simplification angle in degrees.
    #[must_use]
    pub fn with_simplify_angle(mut self, degrees: f64) -> Self {
        self.simplify_angle_degrees = degrees;
        self
    }

    /// Preset for quick, coarse previews.
    #[must_use]
    pub fn preview() -> Self {
        Self {
            level_of_detail: 4,
            ..Default::default()
        }
    }

    /// Preset that favors fidelity over speed.
    #[must_use]
    pub fn high_detail() -> Self {
        Self {
            level_of_detail: 8,
            simplify_angle_degrees: 6.0,
            ..Default::default()
        }
    }
}

/// Result of a voxel remesh.
#[derive(Debug, Clone)]
pub struct VoxelRemeshOutput {
    /// The reconstructed mesh.
    pub mesh: Mesh,
    /// Voxel size used for sampling.
    pub cell_size: f64,
    /// Triangle count straight out of contouring.
    pub contoured_triangles: usize,
    /// Triangle count after simplification.
    pub final_triangles: usize,
}

impl std::fmt::Display for VoxelRemeshOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "voxel remesh: cell {:.4}, {} contoured -> {} final triangles",
            self.cell_size, self.contoured_triangles, self.final_triangles
        )
    }
}

/// Rebuild a mesh volumetrically.
///
/// Samples the input's signed distance field on a voxel lattice, contours
/// the zero level set, and simplifies flat regions. The output is a new
/// mesh; the input is not touched. Reconstruction is lossy by design —
/// features smaller than the voxel size disappear.
///
/// # Errors
///
/// - [`VoxelError::EmptyMesh`] for an input without triangles
/// - [`VoxelError::InvalidLevelOfDetail`] when the derived voxel size is
///   degenerate
/// - [`VoxelError::Lattice`] when the lattice would exceed memory limits
/// - [`VoxelError::NoSurface`] when contouring finds no crossing
pub fn voxel_remesh(mesh: &Mesh, params: &VoxelRemeshParams) -> VoxelResult<VoxelRemeshOutput> {
    let field = SignedField::from_mesh(mesh)?;
    let bounds = field.bounds();

    let diagonal = bounds.diagonal();
    let cell_size = diagonal / f64::from(1u32 << params.level_of_detail.min(30));
    if !(cell_size.is_finite() && cell_size > 0.0) {
        return Err(VoxelError::InvalidLevelOfDetail(params.level_of_detail));
    }

    let mut grid = ScalarGrid::from_bounds(bounds.min, bounds.max, cell_size, params.padding_cells)?;
    sample_field(&field, &mut grid);

    let result = contour_field(&grid)?;
    let contoured = result.triangle_count();

    if params.simplify_angle_degrees > 0.0 {
        simplify_by_normal_angle(&result, params.simplify_angle_degrees.to_radians());
    }

    let output = VoxelRemeshOutput {
        cell_size,
        contoured_triangles: contoured,
        final_triangles: result.triangle_count(),
        mesh: result,
    };
    info!(lod = params.level_of_detail, "{output}");
    Ok(output)
}

/// Sample the signed field at every lattice point, parallel over X-rows.
fn sample_field(field: &SignedField, grid: &mut ScalarGrid) {
    let [nx, ny, _] = grid.dims();
    let origin = grid.origin();
    let cell = grid.cell_size();

    grid.values_mut()
        .par_chunks_mut(nx)
        .enumerate()
        .for_each(|(row, values)| {
            let iy = row % ny;
            let iz = row / ny;
            let y = origin.y + iy as f64 * cell;
            let z = origin.z + iz as f64 * cell;
            for (ix, value) in values.iter_mut().enumerate() {
                let x = origin.x + ix as f64 * cell;
                *value = field.distance(mesh_model::Point3::new(x, y, z));
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_cube() -> Mesh {
        let positions = [
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0,
            1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0,
        ];
        let connectivity = [
            0, 2, 1, 0, 3, 2, 4, 5, 6, 4, 6, 7, 0, 1, 5, 0, 5, 4, 1, 2, 6, 1, 6, 5, 2, 3, 7, 2,
            7, 6, 3, 0, 4, 3, 4, 7,
        ];
        Mesh::from_raw(&positions, &connectivity).unwrap()
    }

    #[test]
    fn remeshed_cube_is_watertight() {
        let output = voxel_remesh(&unit_cube(), &VoxelRemeshParams::preview()).unwrap();
        assert!(output.mesh.is_watertight());
        assert!(output.final_triangles > 0);
        assert!(output.final_triangles <= output.contoured_triangles);
    }

    #[test]
    fn remeshed_cube_preserves_volume_roughly() {
        let params = VoxelRemeshParams::default().with_level_of_detail(5);
        let output = voxel_remesh(&unit_cube(), &params).unwrap();

        let volume = output.mesh.signed_volume().abs();
        assert!((volume - 1.0).abs() < 0.25, "volume {volume}");
    }

    #[test]
    fn lod_halves_cell_size() {
        let coarse = voxel_remesh(&unit_cube(), &VoxelRemeshParams::default().with_level_of_detail(4))
            .unwrap();
        let fine = voxel_remesh(&unit_cube(), &VoxelRemeshParams::default().with_level_of_detail(5))
            .unwrap();
        assert!((coarse.cell_size / fine.cell_size - 2.0).abs() < 1e-9);
    }

    #[test]
    fn empty_input_is_rejected() {
        let result = voxel_remesh(&Mesh::new(), &VoxelRemeshParams::default());
        assert!(matches!(result, Err(VoxelError::EmptyMesh)));
    }
}
