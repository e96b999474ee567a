//! Dense 3D scalar field.

use nalgebra::Point3;

use crate::error::{SpatialError, SpatialResult};

/// A dense 3D grid of scalar samples.
///
/// Stores one value per lattice point (not per cell). Used for signed
/// distance sampling and isosurface extraction: a grid of `nx * ny * nz`
/// points defines `(nx-1) * (ny-1) * (nz-1)` cubic cells.
///
/// Values are stored X-fastest.
#[derive(Debug, Clone)]
pub struct ScalarGrid {
    values: Vec<f64>,
    dims: [usize; 3],
    origin: Point3<f64>,
    cell_size: f64,
}

impl ScalarGrid {
    /// Largest number of lattice points a grid may hold.
    ///
    /// Keeps a mis-sized level-of-detail request from attempting a
    /// multi-gigabyte allocation.
    pub const MAX_POINTS: usize = 1 << 28;

    /// Create a grid of `dims` lattice points starting at `origin`.
    ///
    /// # Errors
    ///
    /// Fails if `cell_size` is not positive and finite, or the point count
    /// exceeds [`ScalarGrid::MAX_POINTS`].
    pub fn new(dims: [usize; 3], origin: Point3<f64>, cell_size: f64) -> SpatialResult<Self> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(SpatialError::InvalidCellSize(cell_size));
        }

        let count = dims[0]
            .checked_mul(dims[1])
            .and_then(|n| n.checked_mul(dims[2]))
            .filter(|&n| n <= Self::MAX_POINTS)
            .ok_or(SpatialError::GridTooLarge {
                nx: dims[0],
                ny: dims[1],
                nz: dims[2],
            })?;

        Ok(Self {
            values: vec![0.0; count],
            dims,
            origin,
            cell_size,
        })
    }

    /// Create a grid covering `[min, max]` plus `padding` cells on every side.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`ScalarGrid::new`].
    pub fn from_bounds(
        min: Point3<f64>,
        max: Point3<f64>,
        cell_size: f64,
        padding: usize,
    ) -> SpatialResult<Self> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(SpatialError::InvalidCellSize(cell_size));
        }

        let pad = padding as f64 * cell_size;
        let origin = Point3::new(min.x - pad, min.y - pad, min.z - pad);
        let extent = max - min;

        let nx = ((extent.x + 2.0 * pad) / cell_size).ceil() as usize + 2;
        let ny = ((extent.y + 2.0 * pad) / cell_size).ceil() as usize + 2;
        let nz = ((extent.z + 2.0 * pad) / cell_size).ceil() as usize + 2;

        Self::new([nx, ny, nz], origin, cell_size)
    }

    /// Lattice dimensions `(nx, ny, nz)`.
    #[must_use]
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Minimum-corner origin.
    #[must_use]
    pub fn origin(&self) -> Point3<f64> {
        self.origin
    }

    /// Lattice spacing.
    #[must_use]
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Total number of lattice points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the grid holds no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at a lattice point; out-of-range coordinates read as `0.0`.
    #[must_use]
    pub fn get(&self, ix: usize, iy: usize, iz: usize) -> f64 {
        if ix < self.dims[0] && iy < self.dims[1] && iz < self.dims[2] {
            self.values[self.index(ix, iy, iz)]
        } else {
            0.0
        }
    }

    /// Set the value at a lattice point; out-of-range writes are dropped.
    pub fn set(&mut self, ix: usize, iy: usize, iz: usize, value: f64) {
        if ix < self.dims[0] && iy < self.dims[1] && iz < self.dims[2] {
            let idx = self.index(ix, iy, iz);
            self.values[idx] = value;
        }
    }

    /// World-space position of a lattice point.
    #[must_use]
    pub fn position(&self, ix: usize, iy: usize, iz: usize) -> Point3<f64> {
        Point3::new(
            self.origin.x + ix as f64 * self.cell_size,
            self.origin.y + iy as f64 * self.cell_size,
            self.origin.z + iz as f64 * self.cell_size,
        )
    }

    /// Fill every lattice point from a sampling function `f(position)`.
    pub fn fill_with<F: FnMut(Point3<f64>) -> f64>(&mut self, mut f: F) {
        let [nx, ny, _] = self.dims;
        for (i, v) in self.values.iter_mut().enumerate() {
            let ix = i % nx;
            let iy = (i / nx) % ny;
            let iz = i / (nx * ny);
            *v = f(Point3::new(
                self.origin.x + ix as f64 * self.cell_size,
                self.origin.y + iy as f64 * self.cell_size,
                self.origin.z + iz as f64 * self.cell_size,
            ));
        }
    }

    /// The eight sample values at the corners of cell `(ix, iy, iz)`.
    ///
    /// Corner ordering follows the usual contouring convention: bottom face
    /// counter-clockwise (`000, 100, 110, 010`), then the top face in the
    /// same rotation.
    #[must_use]
    pub fn cell_corners(&self, ix: usize, iy: usize, iz: usize) -> [f64; 8] {
        [
            self.get(ix, iy, iz),
            self.get(ix + 1, iy, iz),
            self.get(ix + 1, iy + 1, iz),
            self.get(ix, iy + 1, iz),
            self.get(ix, iy, iz + 1),
            self.get(ix + 1, iy, iz + 1),
            self.get(ix + 1, iy + 1, iz + 1),
            self.get(ix, iy + 1, iz + 1),
        ]
    }

    /// Mutable access to the raw sample buffer (X-fastest).
    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    fn index(&self, ix: usize, iy: usize, iz: usize) -> usize {
        ix + iy * self.dims[0] + iz * self.dims[0] * self.dims[1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn new_rejects_bad_cell_size() {
        assert!(ScalarGrid::new([4, 4, 4], Point3::origin(), 0.0).is_err());
        assert!(ScalarGrid::new([4, 4, 4], Point3::origin(), f64::NAN).is_err());
    }

    #[test]
    fn new_rejects_huge_grid() {
        let result = ScalarGrid::new([1 << 12, 1 << 12, 1 << 12], Point3::origin(), 1.0);
        assert!(matches!(result, Err(SpatialError::GridTooLarge { .. })));
    }

    #[test]
    fn get_set_round_trip() {
        let mut grid = ScalarGrid::new([5, 5, 5], Point3::origin(), 1.0).unwrap();
        grid.set(1, 2, 3, -4.5);
        assert_relative_eq!(grid.get(1, 2, 3), -4.5);
    }

    #[test]
    fn out_of_range_reads_zero() {
        let grid = ScalarGrid::new([2, 2, 2], Point3::origin(), 1.0).unwrap();
        assert_relative_eq!(grid.get(10, 0, 0), 0.0);
    }

    #[test]
    fn from_bounds_covers_box() {
        let grid = ScalarGrid::from_bounds(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(3.0, 2.0, 1.0),
            0.5,
            2,
        )
        .unwrap();

        assert!(grid.origin().x < 0.0);
        let [nx, ny, nz] = grid.dims();
        let far = grid.position(nx - 1, ny - 1, nz - 1);
        assert!(far.x > 3.0 && far.y > 2.0 && far.z > 1.0);
    }

    #[test]
    fn fill_with_sees_positions() {
        let mut grid = ScalarGrid::new([3, 3, 3], Point3::origin(), 2.0).unwrap();
        grid.fill_with(|p| p.x + p.y + p.z);
        assert_relative_eq!(grid.get(2, 2, 2), 12.0);
        assert_relative_eq!(grid.get(0, 0, 0), 0.0);
    }

    #[test]
    fn cell_corners_ordering() {
        let mut grid = ScalarGrid::new([2, 2, 2], Point3::origin(), 1.0).unwrap();
        grid.fill_with(|p| p.z);
        let corners = grid.cell_corners(0, 0, 0);
        // Bottom four at z=0, top four at z=1.
        assert_relative_eq!(corners[0], 0.0);
        assert_relative_eq!(corners[3], 0.0);
        assert_relative_eq!(corners[4], 1.0);
        assert_relative_eq!(corners[7], 1.0);
    }
}
