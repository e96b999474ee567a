//! Concrete triangle geometry.

use nalgebra::{Point3, Vector3};
use ph_spatial::Aabb;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A triangle with resolved vertex positions.
///
/// Utility type for geometric predicates; it stores positions, not handles.
/// Winding is counter-clockwise when viewed from the side the normal points
/// toward.
///
/// # Example
///
/// ```
/// use mesh_model::Triangle;
/// use nalgebra::Point3;
///
/// let tri = Triangle::new(
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.0, 1.0, 0.0),
/// );
///
/// assert!((tri.area() - 0.5).abs() < 1e-12);
/// assert!((tri.normal().unwrap().z - 1.0).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Triangle {
    /// First vertex.
    pub v0: Point3<f64>,
    /// Second vertex.
    pub v1: Point3<f64>,
    /// Third vertex.
    pub v2: Point3<f64>,
}

impl Triangle {
    /// Create a triangle from three points.
    #[inline]
    #[must_use]
    pub const fn new(v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>) -> Self {
        Self { v0, v1, v2 }
    }

    /// Unnormalized face normal; its magnitude is twice the area.
    #[inline]
    #[must_use]
    pub fn normal_unnormalized(&self) -> Vector3<f64> {
        (self.v1 - self.v0).cross(&(self.v2 - self.v0))
    }

    /// Unit face normal, or `None` for a degenerate triangle.
    #[must_use]
    pub fn normal(&self) -> Option<Vector3<f64>> {
        let n = self.normal_unnormalized();
        let len = n.norm();
        if len > f64::EPSILON { Some(n / len) } else { None }
    }

    /// Triangle area.
    #[inline]
    #[must_use]
    pub fn area(&self) -> f64 {
        self.normal_unnormalized().norm() * 0.5
    }

    /// Centroid (average of the corners).
    #[must_use]
    pub fn centroid(&self) -> Point3<f64> {
        Point3::new(
            (self.v0.x + self.v1.x + self.v2.x) / 3.0,
            (self.v0.y + self.v1.y + self.v2.y) / 3.0,
            (self.v0.z + self.v1.z + self.v2.z) / 3.0,
        )
    }

    /// Bounding box.
    #[must_use]
    pub fn aabb(&self) -> Aabb {
        Aabb::from_triangle(&self.v0, &self.v1, &self.v2)
    }

    /// Edge lengths `(|v0 v1|, |v1 v2|, |v2 v0|)`.
    #[must_use]
    pub fn edge_lengths(&self) -> [f64; 3] {
        [
            (self.v1 - self.v0).norm(),
            (self.v2 - self.v1).norm(),
            (self.v0 - self.v2).norm(),
        ]
    }

    /// Longest edge length.
    #[must_use]
    pub fn longest_edge(&self) -> f64 {
        let [a, b, c] = self.edge_lengths();
        a.max(b).max(c)
    }

    /// Aspect ratio: longest edge squared over twice the area.
    ///
    /// Large values mark slivers. Degenerate triangles report infinity.
    #[must_use]
    pub fn aspect_ratio(&self) -> f64 {
        let area = self.area();
        if area <= 0.0 {
            return f64::INFINITY;
        }
        let longest = self.longest_edge();
        (longest * longest) / (2.0 * area)
    }

    /// Circumscribed-circle radius; infinity for degenerate triangles.
    #[must_use]
    pub fn circumradius(&self) -> f64 {
        let [a, b, c] = self.edge_lengths();
        let area = self.area();
        if area <= 0.0 {
            return f64::INFINITY;
        }
        (a * b * c) / (4.0 * area)
    }

    /// Smallest interior angle in radians; 0 for degenerate triangles.
    #[must_use]
    pub fn min_angle(&self) -> f64 {
        let corners = [
            (self.v0, self.v1, self.v2),
            (self.v1, self.v2, self.v0),
            (self.v2, self.v0, self.v1),
        ];
        let mut min = f64::MAX;
        for (apex, p, q) in corners {
            let u = p - apex;
            let v = q - apex;
            let nu = u.norm();
            let nv = v.norm();
            if nu <= 0.0 || nv <= 0.0 {
                return 0.0;
            }
            let cos = (u.dot(&v) / (nu * nv)).clamp(-1.0, 1.0);
            min = min.min(cos.acos());
        }
        min
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn right_triangle() -> Triangle {
        Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(0.0, 4.0, 0.0),
        )
    }

    #[test]
    fn area_of_right_triangle() {
        assert_relative_eq!(right_triangle().area(), 6.0);
    }

    #[test]
    fn degenerate_has_no_normal() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
        );
        assert!(tri.normal().is_none());
        assert!(tri.aspect_ratio().is_infinite());
        assert_relative_eq!(tri.min_angle(), 0.0);
    }

    #[test]
    fn centroid_is_average() {
        let c = right_triangle().centroid();
        assert_relative_eq!(c.x, 1.0);
        assert_relative_eq!(c.y, 4.0 / 3.0);
    }

    #[test]
    fn circumradius_of_right_triangle_is_half_hypotenuse() {
        // For a right triangle the circumcenter sits on the hypotenuse midpoint.
        assert_relative_eq!(right_triangle().circumradius(), 2.5, epsilon = 1e-12);
    }

    #[test]
    fn equilateral_min_angle() {
        let tri = Triangle::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 3f64.sqrt() / 2.0, 0.0),
        );
        assert_relative_eq!(tri.min_angle(), std::f64::consts::FRAC_PI_3, epsilon = 1e-9);
    }
}
