//! The surface reconstruction operator.

use mesh_model::{Mesh, Point3, Vector3};
use mesh_reconstruct::{
    reconstruct_from_points, reconstruct_with_normals, resurface, ReconstructParams,
};
use tracing::info;

use crate::error::{OpsError, OpsResult};
use crate::operator::{MeshOperator, Transaction};

#[derive(Debug)]
enum Mode {
    Resurface(Mesh),
    FromPoints(Vec<Point3<f64>>),
    FromOrientedPoints(Vec<Point3<f64>>, Vec<Vector3<f64>>),
}

/// Build a surface from point data.
///
/// Three construction modes:
///
/// - [`ReconstructSurface::resurface`]: rebuild an owned mesh from its own
///   node positions and normals (the input is destroyed and replaced)
/// - [`ReconstructSurface::from_points`]: surface a raw point cloud;
///   normals are estimated and oriented internally
/// - [`ReconstructSurface::from_oriented_points`]: surface a point cloud
///   with externally supplied oriented normals
#[derive(Debug)]
pub struct ReconstructSurface {
    mode: Mode,
    params: ReconstructParams,
    executed: bool,
}

impl ReconstructSurface {
    /// Rebuild an owned mesh from its own point and normal data.
    #[must_use]
    pub fn resurface(mesh: Mesh) -> Self {
        Self {
            mode: Mode::Resurface(mesh),
            params: ReconstructParams::default(),
            executed: false,
        }
    }

    /// Surface a raw point cloud.
    #[must_use]
    pub fn from_points(points: Vec<Point3<f64>>) -> Self {
        Self {
            mode: Mode::FromPoints(points),
            params: ReconstructParams::default(),
            executed: false,
        }
    }

    /// Surface a point cloud with supplied oriented normals.
    #[must_use]
    pub fn from_oriented_points(points: Vec<Point3<f64>>, normals: Vec<Vector3<f64>>) -> Self {
        Self {
            mode: Mode::FromOrientedPoints(points, normals),
            params: ReconstructParams::default(),
            executed: false,
        }
    }

    /// Replace the reconstruction parameters.
    #[must_use]
    pub fn with_params(mut self, params: ReconstructParams) -> Self {
        self.params = params;
        self
    }

    /// Set the level of detail.
    #[must_use]
    pub fn with_level_of_detail(mut self, lod: u32) -> Self {
        self.params.level_of_detail = lod;
        self
    }

    /// Set the screening factor.
    #[must_use]
    pub fn with_screening(mut self, screening: f64) -> Self {
        self.params.screening = screening;
        self
    }
}

impl MeshOperator for ReconstructSurface {
    fn name(&self) -> &'static str {
        "reconstruct-surface"
    }

    fn apply(&mut self, tx: &mut Transaction<'_>) -> OpsResult<()> {
        if self.executed {
            return Err(OpsError::AlreadyExecuted);
        }
        self.executed = true;

        let output = match &self.mode {
            Mode::Resurface(mesh) => {
                tx.require(mesh)?;
                let rebuilt = resurface(mesh, &self.params)?;
                tx.remove_mesh(mesh)?;
                rebuilt
            }
            Mode::FromPoints(points) => reconstruct_from_points(points, &self.params)?,
            Mode::FromOrientedPoints(points, normals) => {
                reconstruct_with_normals(points, normals, &self.params)?
            }
        };

        info!(
            triangles = output.triangle_count(),
            "reconstructed surface"
        );
        tx.add_mesh(output);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::Part;

    fn sphere_points() -> Vec<Point3<f64>> {
        let mut points = Vec::new();
        let rings = 20;
        let segments = 28;
        for i in 1..rings {
            let theta = std::f64::consts::PI * i as f64 / rings as f64;
            for j in 0..segments {
                let phi = std::f64::consts::TAU * j as f64 / segments as f64;
                points.push(Point3::new(
                    theta.sin() * phi.cos(),
                    theta.sin() * phi.sin(),
                    theta.cos(),
                ));
            }
        }
        points
    }

    #[test]
    fn from_points_adds_a_surface() {
        let mut part = Part::new();
        let mut op = ReconstructSurface::from_points(sphere_points()).with_level_of_detail(5);
        let result = part.modify_using(&mut op).unwrap();

        assert_eq!(result.len(), 1);
        assert!(result.get(0).unwrap().triangle_count() > 0);
        assert_eq!(part.meshes().len(), 1);
    }

    #[test]
    fn oriented_points_mode() {
        let points = sphere_points();
        let normals: Vec<Vector3<f64>> = points.iter().map(|p| p.coords.normalize()).collect();

        let mut part = Part::new();
        let mut op = ReconstructSurface::from_oriented_points(points, normals)
            .with_level_of_detail(5);
        let result = part.modify_using(&mut op).unwrap();

        assert!(result.get(0).unwrap().signed_volume().abs() > 1.0);
    }

    #[test]
    fn resurface_replaces_input() {
        let mut part = Part::new();
        part.import(
            &[
                0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0,
                0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0,
            ],
            &[
                0, 2, 1, 0, 3, 2, 4, 5, 6, 4, 6, 7, 0, 1, 5, 0, 5, 4, 1, 2, 6, 1, 6, 5, 2, 3, 7,
                2, 7, 6, 3, 0, 4, 3, 4, 7,
            ],
        )
        .unwrap();
        let mesh = part.meshes().get(0).unwrap();

        let mut op = ReconstructSurface::resurface(mesh.clone()).with_level_of_detail(4);
        let result = part.modify_using(&mut op).unwrap();

        assert_eq!(result.destroyed(), &[mesh.id()]);
        assert_eq!(part.meshes().len(), 1);
        assert!(!part.meshes().get(0).unwrap().same_store(&mesh));
    }

    #[test]
    fn mismatched_normals_roll_back() {
        let mut part = Part::new();
        let mut op = ReconstructSurface::from_oriented_points(
            sphere_points(),
            vec![Vector3::z(); 3],
        );
        assert!(part.modify_using(&mut op).is_err());
        assert!(part.meshes().is_empty());
    }
}
