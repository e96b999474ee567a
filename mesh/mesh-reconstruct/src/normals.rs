//! Normal estimation and orientation for point sets.

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{Matrix3, Point3, SymmetricEigen, Vector3};
use std::collections::VecDeque;
use tracing::debug;

use crate::error::{ReconstructError, ReconstructResult};

pub(crate) fn build_kdtree(points: &[Point3<f64>]) -> KdTree<f64, 3> {
    let mut tree: KdTree<f64, 3> = KdTree::new();
    for (i, p) in points.iter().enumerate() {
        tree.add(&[p.x, p.y, p.z], i as u64);
    }
    tree
}

/// Estimate a unit normal per point by PCA over its `k` nearest neighbors.
///
/// For each point, the normal is the eigenvector of the neighborhood
/// covariance matrix with the smallest eigenvalue (the tangent-plane fit).
/// The returned normals have arbitrary sign; run [`orient_normals`] to make
/// them globally consistent.
///
/// # Errors
///
/// - [`ReconstructError::InsufficientPoints`] for fewer than 3 points
/// - [`ReconstructError::InvalidParameter`] when `k < 3`
pub fn estimate_normals(points: &[Point3<f64>], k: usize) -> ReconstructResult<Vec<Vector3<f64>>> {
    if points.len() < 3 {
        return Err(ReconstructError::InsufficientPoints {
            required: 3,
            actual: points.len(),
        });
    }
    if k < 3 {
        return Err(ReconstructError::InvalidParameter {
            reason: format!("k must be at least 3, got {k}"),
        });
    }

    let tree = build_kdtree(points);
    let k = k.min(points.len());

    let normals = points
        .iter()
        .map(|p| {
            let neighbors = tree.nearest_n::<SquaredEuclidean>(&[p.x, p.y, p.z], k);

            // Neighborhood centroid.
            let mut centroid = Vector3::zeros();
            for n in &neighbors {
                centroid += points[n.item as usize].coords;
            }
            centroid /= neighbors.len() as f64;

            // Covariance of the neighborhood.
            let mut covariance = Matrix3::zeros();
            for n in &neighbors {
                let d = points[n.item as usize].coords - centroid;
                covariance += d * d.transpose();
            }

            let eigen = SymmetricEigen::new(covariance);
            // Eigenvector of the smallest eigenvalue spans the normal.
            let mut min_index = 0;
            for i in 1..3 {
                if eigen.eigenvalues[i] < eigen.eigenvalues[min_index] {
                    min_index = i;
                }
            }
            let normal = eigen.eigenvectors.column(min_index).into_owned();
            let len = normal.norm();
            if len > f64::EPSILON {
                normal / len
            } else {
                Vector3::z()
            }
        })
        .collect();

    Ok(normals)
}

/// Flip normals in place until neighbors agree, by BFS propagation.
///
/// Seeds at the highest-Z point (its normal is made to point up) and
/// propagates sign agreement across the `k`-nearest-neighbor graph. `k`
/// should exceed the estimation neighborhood so the graph connects across
/// sparse regions.
///
/// # Errors
///
/// - [`ReconstructError::InsufficientPoints`] for an empty point set
/// - [`ReconstructError::MismatchedNormals`] when buffer lengths differ
pub fn orient_normals(
    points: &[Point3<f64>],
    normals: &mut [Vector3<f64>],
    k: usize,
) -> ReconstructResult<()> {
    if points.is_empty() {
        return Err(ReconstructError::InsufficientPoints {
            required: 1,
            actual: 0,
        });
    }
    if points.len() != normals.len() {
        return Err(ReconstructError::MismatchedNormals {
            points: points.len(),
            normals: normals.len(),
        });
    }

    let tree = build_kdtree(points);
    let k = k.clamp(2, points.len());

    // Seed at the top of the cloud; gravity-up is the best prior we have.
    let mut seed = 0;
    for (i, p) in points.iter().enumerate() {
        if p.z > points[seed].z {
            seed = i;
        }
    }
    if normals[seed].z < 0.0 {
        normals[seed] = -normals[seed];
    }

    let mut visited = vec![false; points.len()];
    let mut queue = VecDeque::new();
    visited[seed] = true;
    queue.push_back(seed);
    let mut reached = 1usize;

    while let Some(current) = queue.pop_front() {
        let p = points[current];
        let current_normal = normals[current];

        for neighbor in tree.nearest_n::<SquaredEuclidean>(&[p.x, p.y, p.z], k) {
            let idx = neighbor.item as usize;
            if visited[idx] {
                continue;
            }
            visited[idx] = true;
            reached += 1;

            if normals[idx].dot(&current_normal) < 0.0 {
                normals[idx] = -normals[idx];
            }
            queue.push_back(idx);
        }
    }

    if reached < points.len() {
        debug!(
            unreached = points.len() - reached,
            "orientation propagation did not reach every point"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane_cloud() -> Vec<Point3<f64>> {
        let mut points = Vec::new();
        for i in 0..15 {
            for j in 0..15 {
                points.push(Point3::new(i as f64 * 0.1, j as f64 * 0.1, 0.0));
            }
        }
        points
    }

    #[test]
    fn plane_normals_are_vertical() {
        let points = plane_cloud();
        let normals = estimate_normals(&points, 8).unwrap();

        for n in &normals {
            assert!(n.z.abs() > 0.99, "normal {n:?} not vertical");
        }
    }

    #[test]
    fn orientation_makes_plane_agree() {
        let points = plane_cloud();
        let mut normals = estimate_normals(&points, 8).unwrap();
        // Scramble signs deterministically.
        for (i, n) in normals.iter_mut().enumerate() {
            if i % 3 == 0 {
                *n = -*n;
            }
        }

        orient_normals(&points, &mut normals, 12).unwrap();

        // All aligned with +z after seeding at the top.
        for n in &normals {
            assert!(n.z > 0.99);
        }
    }

    #[test]
    fn too_few_points_rejected() {
        let points = vec![Point3::origin()];
        assert!(matches!(
            estimate_normals(&points, 8),
            Err(ReconstructError::InsufficientPoints { .. })
        ));
    }

    #[test]
    fn mismatched_buffers_rejected() {
        let points = plane_cloud();
        let mut normals = vec![Vector3::z(); 3];
        assert!(matches!(
            orient_normals(&points, &mut normals, 8),
            Err(ReconstructError::MismatchedNormals { .. })
        ));
    }
}
