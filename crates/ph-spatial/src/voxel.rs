//! Discrete voxel coordinates.

use nalgebra::Point3;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A discrete 3D coordinate in voxel space.
///
/// Uses `i64` so a grid origin can sit anywhere in world space without
/// negative-coordinate gymnastics at the call sites.
///
/// # Example
///
/// ```
/// use ph_spatial::VoxelCoord;
///
/// let c = VoxelCoord::new(-3, 0, 12);
/// assert_eq!(c.offset(1, 1, 1), VoxelCoord::new(-2, 1, 13));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VoxelCoord {
    /// X index.
    pub x: i64,
    /// Y index.
    pub y: i64,
    /// Z index.
    pub z: i64,
}

impl VoxelCoord {
    /// Create a new voxel coordinate.
    #[inline]
    #[must_use]
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// The coordinate at the origin.
    #[inline]
    #[must_use]
    pub const fn origin() -> Self {
        Self::new(0, 0, 0)
    }

    /// Coordinate shifted by the given deltas.
    #[inline]
    #[must_use]
    pub const fn offset(self, dx: i64, dy: i64, dz: i64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// Snap a world-space point to the voxel containing it.
    ///
    /// # Example
    ///
    /// ```
    /// use ph_spatial::VoxelCoord;
    /// use nalgebra::Point3;
    ///
    /// let c = VoxelCoord::from_world(&Point3::new(-0.1, 0.9, 2.0), 1.0);
    /// assert_eq!(c, VoxelCoord::new(-1, 0, 2));
    /// ```
    #[inline]
    #[must_use]
    pub fn from_world(point: &Point3<f64>, cell_size: f64) -> Self {
        Self::new(
            (point.x / cell_size).floor() as i64,
            (point.y / cell_size).floor() as i64,
            (point.z / cell_size).floor() as i64,
        )
    }

    /// World-space position of the voxel's minimum corner.
    #[inline]
    #[must_use]
    pub fn to_world(self, cell_size: f64) -> Point3<f64> {
        Point3::new(
            self.x as f64 * cell_size,
            self.y as f64 * cell_size,
            self.z as f64 * cell_size,
        )
    }

    /// As a tuple, usable as a map key.
    #[inline]
    #[must_use]
    pub const fn as_tuple(self) -> (i64, i64, i64) {
        (self.x, self.y, self.z)
    }
}

impl From<(i64, i64, i64)> for VoxelCoord {
    fn from((x, y, z): (i64, i64, i64)) -> Self {
        Self::new(x, y, z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_world_floors() {
        let c = VoxelCoord::from_world(&Point3::new(1.9, -0.1, 0.0), 1.0);
        assert_eq!(c, VoxelCoord::new(1, -1, 0));
    }

    #[test]
    fn world_round_trip_corner() {
        let c = VoxelCoord::new(2, -3, 5);
        let p = c.to_world(0.5);
        assert_eq!(VoxelCoord::from_world(&p, 0.5), c);
    }

    #[test]
    fn offset_adds_componentwise() {
        let c = VoxelCoord::origin().offset(-1, 2, 3);
        assert_eq!(c.as_tuple(), (-1, 2, 3));
    }
}
