//! Implicit surfacing over oriented points.

use kiddo::SquaredEuclidean;
use mesh_model::{Mesh, Point3, Vector3};
use ph_spatial::{Aabb, ScalarGrid};
use tracing::info;

use mesh_voxel::contour_field;

use crate::error::{ReconstructError, ReconstructResult};
use crate::normals::{build_kdtree, estimate_normals, orient_normals};

/// Parameters for surface reconstruction.
#[derive(Debug, Clone)]
pub struct ReconstructParams {
    /// Logarithmic lattice resolution: the sampling cell is the point
    /// cloud's bounding-box diagonal divided by `2^level_of_detail`.
    /// Default: 6.
    pub level_of_detail: u32,

    /// Screening factor, in multiples of the cell size: lattice points
    /// farther than this from every data point are clamped to "outside",
    /// which trims extrapolated sheets. Larger values favor recall of thin
    /// or sparsely sampled features. Default: 4.0.
    pub screening: f64,

    /// Neighborhood size for the PCA tangent-plane fit. Default: 16.
    pub neighbors: usize,

    /// Neighborhood size for orientation propagation; larger than
    /// `neighbors` so the graph stays connected across sparse patches.
    /// Default: 24.
    pub orientation_neighbors: usize,
}

impl Default for ReconstructParams {
    fn default() -> Self {
        Self {
            level_of_detail: 6,
            screening: 4.0,
            neighbors: 16,
            orientation_neighbors: 24,
        }
    }
}

impl ReconstructParams {
    /// Set the level of detail.
    #[must_use]
    pub fn with_level_of_detail(mut self, lod: u32) -> Self {
        self.level_of_detail = lod;
        self
    }

    /// Set the screening factor.
    #[must_use]
    pub fn with_screening(mut self, screening: f64) -> Self {
        self.screening = screening;
        self
    }

    /// Set the PCA neighborhood size.
    #[must_use]
    pub fn with_neighbors(mut self, neighbors: usize) -> Self {
        self.neighbors = neighbors;
        self
    }
}

/// Reconstruct a surface from raw points.
///
/// Normals are estimated internally (PCA over `neighbors` nearest points)
/// and oriented by propagation over `orientation_neighbors`-nearest graph,
/// then the cloud is surfaced implicitly.
///
/// # Errors
///
/// Propagates estimation errors plus everything
/// [`reconstruct_with_normals`] reports.
pub fn reconstruct_from_points(
    points: &[Point3<f64>],
    params: &ReconstructParams,
) -> ReconstructResult<Mesh> {
    let mut normals = estimate_normals(points, params.neighbors)?;
    orient_normals(points, &mut normals, params.orientation_neighbors)?;
    reconstruct_with_normals(points, &normals, params)
}

/// Reconstruct a surface from points with supplied oriented normals.
///
/// The implicit function is the signed distance to the tangent plane of
/// the nearest data point, clamped to "outside" beyond the screening
/// radius. Its zero level set is contoured on a voxel lattice.
///
/// # Errors
///
/// - [`ReconstructError::InsufficientPoints`] for fewer than 4 points
/// - [`ReconstructError::MismatchedNormals`] when buffer lengths differ
/// - [`ReconstructError::InvalidParameter`] for a non-positive screening
/// - [`ReconstructError::Surface`] when lattice allocation or contouring
///   fails
pub fn reconstruct_with_normals(
    points: &[Point3<f64>],
    normals: &[Vector3<f64>],
    params: &ReconstructParams,
) -> ReconstructResult<Mesh> {
    if points.len() < 4 {
        return Err(ReconstructError::InsufficientPoints {
            required: 4,
            actual: points.len(),
        });
    }
    if points.len() != normals.len() {
        return Err(ReconstructError::MismatchedNormals {
            points: points.len(),
            normals: normals.len(),
        });
    }
    if params.screening <= 0.0 {
        return Err(ReconstructError::InvalidParameter {
            reason: format!("screening must be positive, got {}", params.screening),
        });
    }

    let bounds = Aabb::from_points(points.iter());
    let cell_size = bounds.diagonal() / f64::from(1u32 << params.level_of_detail.min(30));
    if !(cell_size.is_finite() && cell_size > 0.0) {
        return Err(ReconstructError::InvalidParameter {
            reason: "point cloud has zero extent".to_string(),
        });
    }

    let tree = build_kdtree(points);
    let cutoff = params.screening * cell_size;

    let mut grid = ScalarGrid::from_bounds(bounds.min, bounds.max, cell_size, 3)
        .map_err(mesh_voxel::VoxelError::from)?;
    grid.fill_with(|p| {
        let nearest = tree.nearest_one::<SquaredEuclidean>(&[p.x, p.y, p.z]);
        let idx = nearest.item as usize;
        let offset = p - points[idx];
        if offset.norm() > cutoff {
            // Too far from the data to trust the tangent plane.
            cutoff
        } else {
            offset.dot(&normals[idx])
        }
    });

    let mesh = contour_field(&grid)?;

    // Carry interpolated normals onto the output for downstream export.
    for node in mesh.nodes().iter() {
        let p = mesh.position(node);
        let nearest = tree.nearest_one::<SquaredEuclidean>(&[p.x, p.y, p.z]);
        mesh.set_normal(node, normals[nearest.item as usize]);
    }

    info!(
        points = points.len(),
        triangles = mesh.triangle_count(),
        "reconstructed surface"
    );
    Ok(mesh)
}

/// Rebuild an existing mesh from its own point and normal data.
///
/// Nodes without stored normals get area-weighted averages of their
/// incident triangle normals.
///
/// # Errors
///
/// Same failure modes as [`reconstruct_with_normals`].
pub fn resurface(mesh: &Mesh, params: &ReconstructParams) -> ReconstructResult<Mesh> {
    let nodes = mesh.nodes();
    let mut points = Vec::with_capacity(nodes.len());
    let mut normals = Vec::with_capacity(nodes.len());

    // Area-weighted node normals for nodes that lack stored ones.
    let mut accumulated: hashbrown::HashMap<u64, Vector3<f64>> = hashbrown::HashMap::new();
    for tri in mesh.triangles().iter() {
        let n = mesh.triangle_geometry(tri).normal_unnormalized();
        for corner in mesh.triangle_nodes(tri) {
            *accumulated.entry(corner.id()).or_insert_with(Vector3::zeros) += n;
        }
    }

    for node in nodes.iter() {
        points.push(mesh.position(node));
        let normal = mesh.normal(node).unwrap_or_else(|| {
            let n = accumulated
                .get(&node.id())
                .copied()
                .unwrap_or_else(Vector3::z);
            let len = n.norm();
            if len > f64::EPSILON { n / len } else { Vector3::z() }
        });
        normals.push(normal);
    }

    reconstruct_with_normals(&points, &normals, params)
}
