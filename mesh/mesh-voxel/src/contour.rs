//! Isosurface extraction from a scalar lattice.
//!
//! Contours the zero level set with marching tetrahedra: every lattice cell
//! is split into six tetrahedra around its main diagonal, and each
//! tetrahedron is contoured independently. The decomposition splits shared
//! cell faces along matching diagonals, so the output is watertight
//! wherever the field is well defined.

use hashbrown::HashMap;
use mesh_model::{Mesh, NodeId, Point3};
use ph_spatial::ScalarGrid;
use tracing::debug;

use crate::error::{VoxelError, VoxelResult};

/// Corner offsets in the cell-corner ordering of
/// [`ScalarGrid::cell_corners`].
const CORNER_OFFSETS: [(usize, usize, usize); 8] = [
    (0, 0, 0),
    (1, 0, 0),
    (1, 1, 0),
    (0, 1, 0),
    (0, 0, 1),
    (1, 0, 1),
    (1, 1, 1),
    (0, 1, 1),
];

/// Six tetrahedra per cell, all sharing the 0-6 diagonal.
const TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 5, 1, 6],
    [0, 1, 2, 6],
    [0, 2, 3, 6],
    [0, 3, 7, 6],
    [0, 7, 4, 6],
    [0, 4, 5, 6],
];

/// Extract the zero isosurface of `grid` as a new mesh.
///
/// Negative samples are inside, non-negative outside. Crossing vertices are
/// shared between neighboring tetrahedra and cells, so the resulting
/// surface has proper connectivity rather than triangle soup.
///
/// # Errors
///
/// [`VoxelError::NoSurface`] when the field never changes sign.
pub fn contour_field(grid: &ScalarGrid) -> VoxelResult<Mesh> {
    let [nx, ny, nz] = grid.dims();
    if nx < 2 || ny < 2 || nz < 2 {
        return Err(VoxelError::NoSurface);
    }

    let mesh = Mesh::new();
    let mut crossings: HashMap<(u64, u64), NodeId> = HashMap::new();
    let mut triangles = 0usize;

    let lattice_id =
        |ix: usize, iy: usize, iz: usize| -> u64 { (ix + iy * nx + iz * nx * ny) as u64 };

    for iz in 0..nz - 1 {
        for iy in 0..ny - 1 {
            for ix in 0..nx - 1 {
                let values = grid.cell_corners(ix, iy, iz);
                // Cells fully inside or outside produce nothing.
                let any_inside = values.iter().any(|&v| v < 0.0);
                let any_outside = values.iter().any(|&v| v >= 0.0);
                if !any_inside || !any_outside {
                    continue;
                }

                let ids: [u64; 8] = std::array::from_fn(|c| {
                    let (dx, dy, dz) = CORNER_OFFSETS[c];
                    lattice_id(ix + dx, iy + dy, iz + dz)
                });
                let positions: [Point3<f64>; 8] = std::array::from_fn(|c| {
                    let (dx, dy, dz) = CORNER_OFFSETS[c];
                    grid.position(ix + dx, iy + dy, iz + dz)
                });

                for tet in &TETRAHEDRA {
                    triangles += contour_tetrahedron(
                        &mesh,
                        &mut crossings,
                        tet.map(|c| ids[c]),
                        tet.map(|c| positions[c]),
                        tet.map(|c| values[c]),
                    );
                }
            }
        }
    }

    if triangles == 0 {
        return Err(VoxelError::NoSurface);
    }

    debug!(triangles, nodes = mesh.node_count(), "contoured field");
    Ok(mesh)
}

/// Contour one tetrahedron; returns the number of emitted triangles.
fn contour_tetrahedron(
    mesh: &Mesh,
    crossings: &mut HashMap<(u64, u64), NodeId>,
    ids: [u64; 4],
    positions: [Point3<f64>; 4],
    values: [f64; 4],
) -> usize {
    let inside: Vec<usize> = (0..4).filter(|&i| values[i] < 0.0).collect();
    let outside: Vec<usize> = (0..4).filter(|&i| values[i] >= 0.0).collect();

    if inside.is_empty() || outside.is_empty() {
        return 0;
    }

    // Interpolated crossing node on the edge between two tet corners,
    // deduplicated by the global lattice ids of its endpoints. A crossing
    // landing (numerically) on a lattice point is keyed by that point
    // alone, so every edge ending there shares one node instead of
    // opening hairline cracks.
    const SNAP: f64 = 1e-9;
    let mut crossing = |a: usize, b: usize| -> NodeId {
        let (va, vb) = (values[a], values[b]);
        let t = va / (va - vb);

        let key = if t <= SNAP {
            (ids[a], u64::MAX)
        } else if t >= 1.0 - SNAP {
            (ids[b], u64::MAX)
        } else if ids[a] < ids[b] {
            (ids[a], ids[b])
        } else {
            (ids[b], ids[a])
        };

        if let Some(&node) = crossings.get(&key) {
            return node;
        }
        let d = positions[b] - positions[a];
        let node = mesh.add_node(positions[a] + d * t.clamp(0.0, 1.0));
        crossings.insert(key, node);
        node
    };

    // Outward reference direction: from the inside corners toward the
    // outside corners, used to orient emitted triangles.
    let centroid = |corners: &[usize]| -> Point3<f64> {
        let mut sum = Point3::origin();
        for &c in corners {
            sum.coords += positions[c].coords;
        }
        Point3::from(sum.coords / corners.len() as f64)
    };
    let outward = centroid(&outside) - centroid(&inside);

    let mut emitted = 0;
    let mut emit = |mesh: &Mesh, a: NodeId, b: NodeId, c: NodeId| {
        if a == b || b == c || a == c {
            return 0;
        }
        let (pa, pb, pc) = (mesh.position(a), mesh.position(b), mesh.position(c));
        let normal = (pb - pa).cross(&(pc - pa));
        let result = if normal.dot(&outward) >= 0.0 {
            mesh.add_triangle(a, b, c)
        } else {
            mesh.add_triangle(a, c, b)
        };
        usize::from(result.is_ok())
    };

    match inside.len() {
        1 => {
            let i = inside[0];
            let (a, b, c) = (
                crossing(i, outside[0]),
                crossing(i, outside[1]),
                crossing(i, outside[2]),
            );
            emitted += emit(mesh, a, b, c);
        }
        3 => {
            let o = outside[0];
            let (a, b, c) = (
                crossing(o, inside[0]),
                crossing(o, inside[1]),
                crossing(o, inside[2]),
            );
            emitted += emit(mesh, a, b, c);
        }
        2 => {
            let (i1, i2) = (inside[0], inside[1]);
            let (o1, o2) = (outside[0], outside[1]);
            let c11 = crossing(i1, o1);
            let c12 = crossing(i1, o2);
            let c22 = crossing(i2, o2);
            let c21 = crossing(i2, o1);
            emitted += emit(mesh, c11, c12, c22);
            emitted += emit(mesh, c11, c22, c21);
        }
        _ => {}
    }

    emitted
}
