//! Normal-angle-driven mesh simplification.

use hashbrown::{HashMap, HashSet};
use mesh_model::{Mesh, NodeId, Vector3};
use tracing::debug;

/// Collapse bars that lie inside locally flat regions.
///
/// A bar is collapsible when it is interior (degree 2), away from any
/// boundary, its surrounding triangle normals agree within `max_angle`
/// (radians), and the collapse neither changes any surviving triangle's
/// normal by more than `max_angle` nor violates the manifold link
/// condition. Contoured meshes are heavily over-tessellated on flat
/// stretches; this pass removes that redundancy while leaving curved
/// regions alone.
///
/// Runs collapse passes until a pass makes no progress. Returns the total
/// number of nodes merged away.
pub fn simplify_by_normal_angle(mesh: &Mesh, max_angle: f64) -> usize {
    if max_angle <= 0.0 {
        return 0;
    }
    let cos_limit = max_angle.cos();
    let mut total_merged = 0usize;

    loop {
        let merged = collapse_pass(mesh, cos_limit);
        total_merged += merged;
        if merged == 0 {
            break;
        }
    }

    if total_merged > 0 {
        mesh.drop_unreferenced_nodes();
        debug!(merged = total_merged, "simplified mesh");
    }
    total_merged
}

fn collapse_pass(mesh: &Mesh, cos_limit: f64) -> usize {
    // Nodes on any boundary bar are pinned.
    let mut boundary_nodes: HashSet<NodeId> = HashSet::new();
    for bar in mesh.boundary_bars().iter() {
        let [a, b] = bar.nodes();
        boundary_nodes.insert(a);
        boundary_nodes.insert(b);
    }

    // Candidate bars, shortest first: collapsing short bars erases the
    // least geometry for the same topological gain.
    let mut candidates: Vec<(f64, NodeId, NodeId)> = Vec::new();
    for bar in mesh.bars().iter() {
        if mesh.bar_degree(bar) != 2 {
            continue;
        }
        let [a, b] = bar.nodes();
        if boundary_nodes.contains(&a) || boundary_nodes.contains(&b) {
            continue;
        }
        let length = (mesh.position(a) - mesh.position(b)).norm();
        candidates.push((length, a, b));
    }
    candidates.sort_by(|x, y| x.0.partial_cmp(&y.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut locked: HashSet<NodeId> = HashSet::new();
    let mut remap: HashMap<NodeId, NodeId> = HashMap::new();

    for (_, a, b) in candidates {
        if locked.contains(&a) || locked.contains(&b) {
            continue;
        }
        if !collapse_is_safe(mesh, a, b, cos_limit) {
            continue;
        }

        // Collapse b into a; a keeps its position.
        remap.insert(b, a);
        locked.insert(a);
        locked.insert(b);
        // Lock the wider neighborhood so one pass never stacks collapses.
        for n in mesh.node_neighbors(a).iter() {
            locked.insert(n);
        }
        for n in mesh.node_neighbors(b).iter() {
            locked.insert(n);
        }
    }

    if remap.is_empty() {
        return 0;
    }
    let merged = remap.len();
    mesh.weld(&remap);
    merged
}

/// Flatness, link condition, and post-collapse normal stability.
fn collapse_is_safe(mesh: &Mesh, a: NodeId, b: NodeId, cos_limit: f64) -> bool {
    // Link condition: a and b must share exactly the two opposite nodes of
    // the two incident triangles, or the collapse pinches the surface.
    let neighbors_a: HashSet<NodeId> = mesh.node_neighbors(a).iter().collect();
    let neighbors_b: HashSet<NodeId> = mesh.node_neighbors(b).iter().collect();
    if neighbors_a.intersection(&neighbors_b).count() != 2 {
        return false;
    }

    // The region around both endpoints must be flat within the angle.
    let mut reference: Option<Vector3<f64>> = None;
    let mut region_flat = |node: NodeId| -> bool {
        for tri in incident_triangles(mesh, node) {
            let Some(normal) = mesh.triangle_geometry(tri).normal() else {
                continue;
            };
            match reference {
                None => reference = Some(normal),
                Some(r) => {
                    if r.dot(&normal) < cos_limit {
                        return false;
                    }
                }
            }
        }
        true
    };
    if !region_flat(a) || !region_flat(b) {
        return false;
    }

    // Simulate the collapse: every surviving triangle around b keeps its
    // normal within the angle (no flips, no new slivers).
    let pa = mesh.position(a);
    for tri in incident_triangles(mesh, b) {
        let nodes = mesh.triangle_nodes(tri);
        if nodes.contains(&a) {
            continue; // Collapses away entirely.
        }
        let Some(old_normal) = mesh.triangle_geometry(tri).normal() else {
            continue;
        };
        let positions: Vec<_> = nodes
            .iter()
            .map(|&n| if n == b { pa } else { mesh.position(n) })
            .collect();
        let new_normal = (positions[1] - positions[0]).cross(&(positions[2] - positions[0]));
        let len = new_normal.norm();
        if len <= f64::EPSILON || old_normal.dot(&(new_normal / len)) < cos_limit {
            return false;
        }
    }

    true
}

fn incident_triangles(mesh: &Mesh, node: NodeId) -> Vec<mesh_model::TriangleId> {
    // Walk the bars around the node and union their triangle fans.
    let mut out = Vec::new();
    for neighbor in mesh.node_neighbors(node).iter() {
        let bar = mesh_model::Bar::new(node, neighbor);
        for tri in mesh.bar_triangles(bar).iter() {
            if !out.contains(&tri) {
                out.push(tri);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_model::Point3;
    use ph_spatial::ScalarGrid;

    use crate::contour::contour_field;

    fn boxy_field(cell: f64) -> ScalarGrid {
        let mut grid = ScalarGrid::from_bounds(
            Point3::new(-1.0, -1.0, -1.0),
            Point3::new(1.0, 1.0, 1.0),
            cell,
            2,
        )
        .unwrap();
        // Axis-aligned box distance: large flat faces, sharp edges.
        grid.fill_with(|p| {
            let dx = p.x.abs() - 1.0;
            let dy = p.y.abs() - 1.0;
            let dz = p.z.abs() - 1.0;
            dx.max(dy).max(dz)
        });
        grid
    }

    #[test]
    fn flat_faces_lose_triangles() {
        let mesh = contour_field(&boxy_field(0.25)).unwrap();
        let before = mesh.triangle_count();

        let merged = simplify_by_normal_angle(&mesh, 10f64.to_radians());

        assert!(merged > 0);
        assert!(mesh.triangle_count() < before);
        assert!(mesh.is_watertight());
    }

    #[test]
    fn preserves_total_area_within_tolerance() {
        let mesh = contour_field(&boxy_field(0.25)).unwrap();
        let area_before = mesh.area();

        simplify_by_normal_angle(&mesh, 5f64.to_radians());

        let area_after = mesh.area();
        assert!((area_before - area_after).abs() / area_before < 0.05);
    }

    #[test]
    fn zero_angle_is_a_no_op() {
        let mesh = contour_field(&boxy_field(0.5)).unwrap();
        assert_eq!(simplify_by_normal_angle(&mesh, 0.0), 0);
    }
}
