//! Triangle-triangle intersection predicates.

use mesh_model::Triangle;
use nalgebra::{Point3, Vector3};

/// Intersection parameter of a segment against a triangle, Möller-Trumbore
/// style.
///
/// Returns `t` in `[0, 1]` along `e0 -> e1` when the segment pierces the
/// triangle interior, `None` otherwise. Segments (near-)parallel to the
/// triangle plane report no intersection; coplanar overlap is handled at a
/// higher level by the piercing edges of surrounding geometry.
fn segment_triangle_param(
    e0: &Point3<f64>,
    e1: &Point3<f64>,
    tri: &Triangle,
    epsilon: f64,
) -> Option<f64> {
    let direction = e1 - e0;
    if direction.norm_squared() < epsilon * epsilon {
        return None;
    }

    let edge1 = tri.v1 - tri.v0;
    let edge2 = tri.v2 - tri.v0;
    let h = direction.cross(&edge2);
    let a = edge1.dot(&h);

    if a.abs() < epsilon {
        return None;
    }

    let f = 1.0 / a;
    let s = e0 - tri.v0;
    let u = f * s.dot(&h);
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(&edge1);
    let v = f * direction.dot(&q);
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = f * edge2.dot(&q);
    if (epsilon..=1.0 - epsilon).contains(&t) {
        Some(t)
    } else {
        None
    }
}

fn segment_point(e0: &Point3<f64>, e1: &Point3<f64>, t: f64) -> Point3<f64> {
    let d: Vector3<f64> = e1 - e0;
    e0 + d * t
}

/// Test two triangles for intersection.
///
/// Pierces each edge of either triangle through the other and collects the
/// hit points. Returns the length of the intersection segment (0 for a
/// single touching point), or `None` when the triangles do not intersect.
///
/// Intended for *non-adjacent* triangle pairs; triangles sharing a node
/// trivially touch along shared geometry and should be filtered out by the
/// caller before calling this.
///
/// # Example
///
/// ```
/// use mesh_check::triangle_intersection;
/// use mesh_model::Triangle;
/// use nalgebra::Point3;
///
/// let a = Triangle::new(
///     Point3::new(-1.0, -1.0, 0.0),
///     Point3::new(2.0, -1.0, 0.0),
///     Point3::new(0.0, 2.0, 0.0),
/// );
/// // Perpendicular triangle stabbing through `a`.
/// let b = Triangle::new(
///     Point3::new(0.0, 0.0, -1.0),
///     Point3::new(1.0, 0.0, -1.0),
///     Point3::new(0.5, 0.0, 1.0),
/// );
///
/// assert!(triangle_intersection(&a, &b, 1e-9).is_some());
/// ```
#[must_use]
pub fn triangle_intersection(a: &Triangle, b: &Triangle, epsilon: f64) -> Option<f64> {
    let mut hits: Vec<Point3<f64>> = Vec::with_capacity(2);

    let mut record = |p: Point3<f64>| {
        // Deduplicate points that coincide within tolerance.
        if !hits.iter().any(|q| (q - p).norm() < epsilon) {
            hits.push(p);
        }
    };

    let edges_a = [(a.v0, a.v1), (a.v1, a.v2), (a.v2, a.v0)];
    for (e0, e1) in &edges_a {
        if let Some(t) = segment_triangle_param(e0, e1, b, epsilon) {
            record(segment_point(e0, e1, t));
        }
    }

    let edges_b = [(b.v0, b.v1), (b.v1, b.v2), (b.v2, b.v0)];
    for (e0, e1) in &edges_b {
        if let Some(t) = segment_triangle_param(e0, e1, a, epsilon) {
            record(segment_point(e0, e1, t));
        }
    }

    match hits.len() {
        0 => None,
        1 => Some(0.0),
        _ => {
            // The intersection is a segment; report its longest span.
            let mut max = 0.0f64;
            for i in 0..hits.len() {
                for j in (i + 1)..hits.len() {
                    max = max.max((hits[i] - hits[j]).norm());
                }
            }
            Some(max)
        }
    }
}
