//! Snap-cell spatial hash for point proximity queries.

use hashbrown::HashMap;
use nalgebra::Point3;

use crate::error::{SpatialError, SpatialResult};
use crate::voxel::VoxelCoord;

/// A spatial hash over points, bucketed by snap cell.
///
/// Supports exact fixed-radius neighbor queries as long as the query radius
/// does not exceed the cell size: a radius-`r` sphere around any point is
/// then covered by the 3x3x3 cell neighborhood.
///
/// Items are caller-supplied `u64` payloads (typically entity indices).
///
/// # Example
///
/// ```
/// use ph_spatial::PointGrid;
/// use nalgebra::Point3;
///
/// let mut grid = PointGrid::with_cell_size(0.1).unwrap();
/// grid.insert(&Point3::new(0.0, 0.0, 0.0), 0);
/// grid.insert(&Point3::new(0.05, 0.0, 0.0), 1);
/// grid.insert(&Point3::new(5.0, 0.0, 0.0), 2);
///
/// let near = grid.neighbors_within(&Point3::origin(), 0.1).unwrap();
/// assert!(near.contains(&0) && near.contains(&1));
/// assert!(!near.contains(&2));
/// ```
#[derive(Debug, Clone)]
pub struct PointGrid {
    cell_size: f64,
    cells: HashMap<(i64, i64, i64), Vec<(Point3<f64>, u64)>>,
    len: usize,
}

impl PointGrid {
    /// Create a grid with the given cell size.
    ///
    /// # Errors
    ///
    /// Fails if `cell_size` is not positive and finite.
    pub fn with_cell_size(cell_size: f64) -> SpatialResult<Self> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(SpatialError::InvalidCellSize(cell_size));
        }
        Ok(Self {
            cell_size,
            cells: HashMap::new(),
            len: 0,
        })
    }

    /// Build a grid from an iterator of `(position, item)` pairs.
    ///
    /// # Errors
    ///
    /// Fails if `cell_size` is not positive and finite.
    pub fn from_points<I>(cell_size: f64, points: I) -> SpatialResult<Self>
    where
        I: IntoIterator<Item = (Point3<f64>, u64)>,
    {
        let mut grid = Self::with_cell_size(cell_size)?;
        for (p, item) in points {
            grid.insert(&p, item);
        }
        Ok(grid)
    }

    /// Number of inserted points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if nothing has been inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Insert a point with its payload.
    pub fn insert(&mut self, point: &Point3<f64>, item: u64) {
        let cell = VoxelCoord::from_world(point, self.cell_size).as_tuple();
        self.cells.entry(cell).or_default().push((*point, item));
        self.len += 1;
    }

    /// All payloads within `radius` of `point` (inclusive), in insertion
    /// order within each scanned cell.
    ///
    /// # Errors
    ///
    /// Fails with [`SpatialError::RadiusTooLarge`] if `radius` exceeds the
    /// cell size — the 3x3x3 neighborhood would no longer be exhaustive.
    pub fn neighbors_within(&self, point: &Point3<f64>, radius: f64) -> SpatialResult<Vec<u64>> {
        if radius > self.cell_size {
            return Err(SpatialError::RadiusTooLarge {
                radius,
                cell_size: self.cell_size,
            });
        }

        let center = VoxelCoord::from_world(point, self.cell_size);
        let radius_sq = radius * radius;
        let mut found = Vec::new();

        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let cell = center.offset(dx, dy, dz).as_tuple();
                    let Some(bucket) = self.cells.get(&cell) else {
                        continue;
                    };
                    for (p, item) in bucket {
                        if (p - point).norm_squared() <= radius_sq {
                            found.push(*item);
                        }
                    }
                }
            }
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_cell_size() {
        assert!(PointGrid::with_cell_size(-1.0).is_err());
        assert!(PointGrid::with_cell_size(f64::INFINITY).is_err());
    }

    #[test]
    fn rejects_oversized_radius() {
        let grid = PointGrid::with_cell_size(0.1).unwrap();
        let result = grid.neighbors_within(&Point3::origin(), 0.2);
        assert!(matches!(result, Err(SpatialError::RadiusTooLarge { .. })));
    }

    #[test]
    fn finds_neighbors_across_cell_boundary() {
        // Two points straddling a cell boundary at x = 0.
        let mut grid = PointGrid::with_cell_size(1.0).unwrap();
        grid.insert(&Point3::new(-0.01, 0.0, 0.0), 7);
        grid.insert(&Point3::new(0.01, 0.0, 0.0), 8);

        let near = grid.neighbors_within(&Point3::new(0.0, 0.0, 0.0), 0.05).unwrap();
        assert_eq!(near.len(), 2);
    }

    #[test]
    fn radius_is_inclusive() {
        let mut grid = PointGrid::with_cell_size(1.0).unwrap();
        grid.insert(&Point3::new(0.5, 0.0, 0.0), 1);

        let near = grid.neighbors_within(&Point3::origin(), 0.5).unwrap();
        assert_eq!(near, vec![1]);
    }

    #[test]
    fn from_points_counts() {
        let grid = PointGrid::from_points(
            1.0,
            (0..10).map(|i| (Point3::new(i as f64, 0.0, 0.0), i as u64)),
        )
        .unwrap();
        assert_eq!(grid.len(), 10);
    }
}
