//! Duplicate-node removal.

use hashbrown::HashMap;
use mesh_model::{Mesh, NodeId};
use ph_spatial::PointGrid;
use tracing::debug;

use crate::error::{OpsError, OpsResult};
use crate::operator::{MeshOperator, Transaction};

/// Merge nodes lying within a snap tolerance of each other.
///
/// Clusters are found with a spatial hash and union-find; each cluster
/// collapses to its lowest-index (oldest) node, which keeps its position.
/// Triangles that lose a corner to the merge (two or more corners landing
/// on the same node) are dropped.
///
/// After execution, no two surviving nodes lie within the tolerance of
/// each other. The mesh is modified in place.
#[derive(Debug)]
pub struct RemoveDuplicateNodes {
    mesh: Mesh,
    tolerance: f64,
    executed: bool,
    merged: usize,
}

impl RemoveDuplicateNodes {
    /// Create the operator for `mesh` with the given snap tolerance.
    #[must_use]
    pub fn new(mesh: Mesh, tolerance: f64) -> Self {
        Self {
            mesh,
            tolerance,
            executed: false,
            merged: 0,
        }
    }

    /// Number of nodes merged away; valid after execution.
    #[must_use]
    pub fn merged_nodes(&self) -> usize {
        self.merged
    }
}

impl MeshOperator for RemoveDuplicateNodes {
    fn name(&self) -> &'static str {
        "remove-duplicate-nodes"
    }

    fn apply(&mut self, tx: &mut Transaction<'_>) -> OpsResult<()> {
        if self.executed {
            return Err(OpsError::AlreadyExecuted);
        }
        self.executed = true;
        tx.require(&self.mesh)?;

        self.merged = dedup_core(&self.mesh, self.tolerance);
        tx.mark_modified(&self.mesh)?;
        Ok(())
    }
}

/// Weld all sub-tolerance node clusters of `mesh`; returns merged count.
///
/// Exposed crate-internally because healing runs the same pass.
pub(crate) fn dedup_core(mesh: &Mesh, tolerance: f64) -> usize {
    if tolerance <= 0.0 {
        return 0;
    }

    let nodes: Vec<NodeId> = mesh.nodes().iter().collect();
    if nodes.len() < 2 {
        return 0;
    }

    let Ok(grid) = PointGrid::from_points(
        tolerance,
        nodes
            .iter()
            .enumerate()
            .map(|(i, &n)| (mesh.position(n), i as u64)),
    ) else {
        return 0;
    };

    let mut parent: Vec<usize> = (0..nodes.len()).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for (i, &node) in nodes.iter().enumerate() {
        let Ok(near) = grid.neighbors_within(&mesh.position(node), tolerance) else {
            continue;
        };
        for other in near {
            let other = other as usize;
            if other != i {
                let (ra, rb) = (find(&mut parent, i), find(&mut parent, other));
                if ra != rb {
                    parent[ra.max(rb)] = ra.min(rb);
                }
            }
        }
    }

    // Lowest index in each cluster survives (its position wins).
    let mut remap: HashMap<NodeId, NodeId> = HashMap::new();
    for i in 0..nodes.len() {
        let root = find(&mut parent, i);
        if root != i {
            remap.insert(nodes[i], nodes[root]);
        }
    }

    if remap.is_empty() {
        return 0;
    }
    let merged = remap.len();
    mesh.weld(&remap);
    debug!(merged, tolerance, "removed duplicate nodes");
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::Part;

    #[test]
    fn merges_cluster_and_keeps_oldest_position() {
        let mut part = Part::new();
        part.import(
            &[
                0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, // triangle A
                1e-7, 0.0, 0.0, 2.0, 0.0, 0.0, 2.0, 1.0, 0.0, // triangle B, corner near node 0
            ],
            &[0, 1, 2, 3, 4, 5],
        )
        .unwrap();
        let mesh = part.meshes().get(0).unwrap();

        let mut op = RemoveDuplicateNodes::new(mesh.clone(), 1e-6);
        part.modify_using(&mut op).unwrap();

        assert_eq!(op.merged_nodes(), 1);
        assert_eq!(mesh.node_count(), 5);
        assert_eq!(mesh.triangle_count(), 2);

        // The shared corner keeps the exact original position.
        let oldest = mesh.nodes().get(0).unwrap();
        assert_eq!(mesh.position(oldest).x, 0.0);
    }

    #[test]
    fn output_nodes_respect_min_spacing() {
        // A chain of nodes each 0.4 apart with tolerance 0.5: transitive
        // clustering must leave no surviving pair within tolerance.
        let mut positions = Vec::new();
        for i in 0..6 {
            positions.extend_from_slice(&[i as f64 * 0.4, 0.0, 0.0]);
        }
        positions.extend_from_slice(&[0.0, 5.0, 0.0]); // apex, far away

        let mut connectivity = Vec::new();
        for i in 0..5u32 {
            connectivity.extend_from_slice(&[i, i + 1, 6]);
        }

        let mut part = Part::new();
        part.import(&positions, &connectivity).unwrap();
        let mesh = part.meshes().get(0).unwrap();

        let tolerance = 0.5;
        let mut op = RemoveDuplicateNodes::new(mesh.clone(), tolerance);
        part.modify_using(&mut op).unwrap();

        let survivors: Vec<_> = mesh.nodes().iter().collect();
        for (i, &a) in survivors.iter().enumerate() {
            for &b in survivors.iter().skip(i + 1) {
                let d = (mesh.position(a) - mesh.position(b)).norm();
                assert!(d > tolerance, "nodes {a:?} and {b:?} only {d} apart");
            }
        }
    }

    #[test]
    fn dropped_triangles_from_collapse() {
        // A skinny triangle whose two corners merge disappears.
        let mut part = Part::new();
        part.import(
            &[0.0, 0.0, 0.0, 1e-8, 0.0, 0.0, 0.0, 1.0, 0.0],
            &[0, 1, 2],
        )
        .unwrap();
        let mesh = part.meshes().get(0).unwrap();

        let mut op = RemoveDuplicateNodes::new(mesh.clone(), 1e-6);
        part.modify_using(&mut op).unwrap();

        assert_eq!(mesh.triangle_count(), 0);
    }

    #[test]
    fn no_duplicates_is_a_no_op() {
        let mut part = Part::new();
        part.import(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0], &[0, 1, 2])
            .unwrap();
        let mesh = part.meshes().get(0).unwrap();

        let mut op = RemoveDuplicateNodes::new(mesh.clone(), 1e-6);
        let result = part.modify_using(&mut op).unwrap();

        assert_eq!(op.merged_nodes(), 0);
        assert_eq!(result.len(), 1);
        assert_eq!(mesh.node_count(), 3);
    }
}
