//! Signed distance sampling of a triangle mesh.

use mesh_model::{Mesh, Triangle};
use nalgebra::{Point3, Vector3};
use ph_spatial::{Aabb, Bvh};

use crate::error::{VoxelError, VoxelResult};

/// A signed distance field over a mesh.
///
/// Distance magnitude comes from the exact closest point on the closest
/// triangle (BVH-pruned); the sign comes from ray-crossing parity, so the
/// input should be at least roughly closed for the inside/outside
/// classification to be meaningful.
#[derive(Debug, Clone)]
pub struct SignedField {
    triangles: Vec<Triangle>,
    bvh: Bvh,
    bounds: Aabb,
}

impl SignedField {
    /// Build a field from a mesh's triangles.
    ///
    /// # Errors
    ///
    /// [`VoxelError::EmptyMesh`] if the mesh has no triangles.
    pub fn from_mesh(mesh: &Mesh) -> VoxelResult<Self> {
        let triangles: Vec<Triangle> = mesh
            .triangles()
            .iter()
            .map(|t| mesh.triangle_geometry(t))
            .collect();
        if triangles.is_empty() {
            return Err(VoxelError::EmptyMesh);
        }

        let boxes: Vec<Aabb> = triangles.iter().map(Triangle::aabb).collect();
        let mut bounds = Aabb::empty();
        for b in &boxes {
            bounds.union(b);
        }

        Ok(Self {
            bvh: Bvh::build(&boxes),
            triangles,
            bounds,
        })
    }

    /// Bounding box of the sampled surface.
    #[must_use]
    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Signed distance at a point: negative inside, positive outside.
    #[must_use]
    pub fn distance(&self, point: Point3<f64>) -> f64 {
        let unsigned = self.unsigned_distance(point);
        if self.contains(point) {
            -unsigned
        } else {
            unsigned
        }
    }

    /// Unsigned distance to the nearest surface point.
    #[must_use]
    pub fn unsigned_distance(&self, point: Point3<f64>) -> f64 {
        // Any triangle gives an upper bound; every closer triangle then
        // lies inside the box of that radius around the query point.
        let mut best = (closest_point_on_triangle(&self.triangles[0], &point) - point).norm();

        let mut probe = Aabb::new(point, point);
        probe.inflate(best);

        for candidate in self.bvh.query(&probe, 0.0) {
            let closest = closest_point_on_triangle(&self.triangles[candidate], &point);
            best = best.min((closest - point).norm());
        }
        best
    }

    /// Inside/outside classification by ray-crossing parity.
    ///
    /// The ray leaves along an axis slightly tilted so it does not thread
    /// shared bars or nodes exactly.
    #[must_use]
    pub fn contains(&self, point: Point3<f64>) -> bool {
        if !self.bounds.contains(&point) {
            return false;
        }

        let direction = Vector3::new(1.0, 3.1e-7, 7.3e-7);
        let reach = self.bounds.max.x - point.x + 1.0;

        // Slab around the ray, inflated by the tilt drift.
        let drift = reach * 1e-6 + 1e-9;
        let probe = Aabb::new(
            Point3::new(point.x - 1e-9, point.y - drift, point.z - drift),
            Point3::new(point.x + reach, point.y + drift, point.z + drift),
        );

        let mut crossings = 0usize;
        for candidate in self.bvh.query(&probe, 0.0) {
            if ray_crosses_triangle(&point, &direction, &self.triangles[candidate]) {
                crossings += 1;
            }
        }
        crossings % 2 == 1
    }
}

/// Möller-Trumbore crossing test for the parity count.
fn ray_crosses_triangle(origin: &Point3<f64>, direction: &Vector3<f64>, tri: &Triangle) -> bool {
    const EPSILON: f64 = 1e-12;

    let edge1 = tri.v1 - tri.v0;
    let edge2 = tri.v2 - tri.v0;
    let h = direction.cross(&edge2);
    let a = edge1.dot(&h);
    if a.abs() < EPSILON {
        return false;
    }

    let f = 1.0 / a;
    let s = origin - tri.v0;
    let u = f * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return false;
    }

    let q = s.cross(&edge1);
    let v = f * direction.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return false;
    }

    f * edge2.dot(&q) > EPSILON
}

/// Exact closest point on a triangle (Voronoi-region walk).
#[must_use]
pub(crate) fn closest_point_on_triangle(tri: &Triangle, p: &Point3<f64>) -> Point3<f64> {
    let (a, b, c) = (tri.v0, tri.v1, tri.v2);
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

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
    fn empty_mesh_is_rejected() {
        assert!(matches!(
            SignedField::from_mesh(&Mesh::new()),
            Err(VoxelError::EmptyMesh)
        ));
    }

    #[test]
    fn center_of_cube_is_inside() {
        let field = SignedField::from_mesh(&unit_cube()).unwrap();
        assert!(field.contains(Point3::new(0.5, 0.5, 0.5)));
        assert!(field.distance(Point3::new(0.5, 0.5, 0.5)) < 0.0);
    }

    #[test]
    fn outside_points_are_positive() {
        let field = SignedField::from_mesh(&unit_cube()).unwrap();
        let d = field.distance(Point3::new(2.0, 0.5, 0.5));
        assert!(d > 0.0);
        assert_relative_eq!(d, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn distance_to_face_is_exact() {
        let field = SignedField::from_mesh(&unit_cube()).unwrap();
        assert_relative_eq!(
            field.unsigned_distance(Point3::new(0.5, 0.5, 0.25)),
            0.25,
            epsilon = 1e-9
        );
    }

    #[test]
    fn closest_point_regions() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(0.0, 2.0, 0.0),
        );

        // Above the interior: projects straight down.
        let q = closest_point_on_triangle(&tri, &Point3::new(0.5, 0.5, 3.0));
        assert_relative_eq!(q.x, 0.5);
        assert_relative_eq!(q.z, 0.0);

        // Beyond a vertex: clamps to the vertex.
        let q = closest_point_on_triangle(&tri, &Point3::new(-1.0, -1.0, 0.0));
        assert_relative_eq!(q.x, 0.0);
        assert_relative_eq!(q.y, 0.0);

        // Beyond an edge: clamps onto the edge.
        let q = closest_point_on_triangle(&tri, &Point3::new(1.0, -5.0, 0.0));
        assert_relative_eq!(q.x, 1.0);
        assert_relative_eq!(q.y, 0.0);
    }
}
