//! Connected-component separation.

use hashbrown::HashMap;
use mesh_model::{Mesh, NodeId};
use tracing::info;

use crate::error::{OpsError, OpsResult};
use crate::operator::{MeshOperator, Transaction};

/// Split a mesh into its connected components.
///
/// Components are connected via shared bars. The operator emits one new
/// mesh per component (in discovery order over ascending triangle handles,
/// so the output ordering is deterministic) and destroys the input mesh —
/// its triangles are redistributed, its identity is gone.
///
/// A single-component input still yields one fresh mesh replacing the
/// original.
#[derive(Debug)]
pub struct Separate {
    input: Mesh,
    executed: bool,
}

impl Separate {
    /// Create a separation of `mesh`.
    #[must_use]
    pub fn new(mesh: Mesh) -> Self {
        Self {
            input: mesh,
            executed: false,
        }
    }
}

impl MeshOperator for Separate {
    fn name(&self) -> &'static str {
        "separate"
    }

    fn apply(&mut self, tx: &mut Transaction<'_>) -> OpsResult<()> {
        if self.executed {
            return Err(OpsError::AlreadyExecuted);
        }
        self.executed = true;
        tx.require(&self.input)?;

        let components = split_components(&self.input);
        info!(
            components = components.len(),
            triangles = self.input.triangle_count(),
            "separated mesh {}",
            self.input.id()
        );

        tx.remove_mesh(&self.input)?;
        for component in components {
            tx.add_mesh(component);
        }
        Ok(())
    }
}

/// Partition a mesh's triangles into bar-connected components, each copied
/// into a fresh mesh (positions and node attributes carried over).
///
/// Component order follows the smallest triangle handle they contain;
/// within a component, triangles keep their relative order.
pub(crate) fn split_components(mesh: &Mesh) -> Vec<Mesh> {
    let triangles: Vec<_> = mesh.triangles().iter().collect();
    if triangles.is_empty() {
        return Vec::new();
    }

    // Union-find over triangle list positions, linked through shared bars.
    let mut parent: Vec<usize> = (0..triangles.len()).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    let mut bar_owner: HashMap<(u64, u64), usize> = HashMap::new();
    for (pos, &tri) in triangles.iter().enumerate() {
        let [a, b, c] = mesh.triangle_nodes(tri);
        for (u, v) in [(a, b), (b, c), (c, a)] {
            let key = if u.id() < v.id() {
                (u.id(), v.id())
            } else {
                (v.id(), u.id())
            };
            match bar_owner.get(&key) {
                Some(&other) => {
                    let (ra, rb) = (find(&mut parent, pos), find(&mut parent, other));
                    if ra != rb {
                        parent[ra.max(rb)] = ra.min(rb);
                    }
                }
                None => {
                    bar_owner.insert(key, pos);
                }
            }
        }
    }

    // Group by root, ordered by first appearance.
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut group_of_root: HashMap<usize, usize> = HashMap::new();
    for pos in 0..triangles.len() {
        let root = find(&mut parent, pos);
        let group = *group_of_root.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[group].push(pos);
    }

    groups
        .into_iter()
        .map(|members| {
            let out = Mesh::new();
            let mut node_map: HashMap<NodeId, NodeId> = HashMap::new();

            for pos in members {
                let tri = triangles[pos];
                let corners = mesh.triangle_nodes(tri);
                let mapped: Vec<NodeId> = corners
                    .iter()
                    .map(|&node| {
                        *node_map.entry(node).or_insert_with(|| {
                            let copy = out.add_node(mesh.position(node));
                            if let Some(normal) = mesh.normal(node) {
                                out.set_normal(copy, normal);
                            }
                            if let Some(uv) = mesh.uv(node) {
                                out.set_uv(copy, uv);
                            }
                            copy
                        })
                    })
                    .collect();
                // Corners were distinct in the source, so this cannot fail.
                let _ = out.add_triangle(mapped[0], mapped[1], mapped[2]);
            }
            out
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::Part;

    fn two_island_part() -> Part {
        let mut part = Part::new();
        part.import(
            &[
                0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, // quad island
                9.0, 0.0, 0.0, 10.0, 0.0, 0.0, 9.0, 1.0, 0.0, // far triangle
            ],
            &[0, 1, 2, 1, 3, 2, 4, 5, 6],
        )
        .unwrap();
        part
    }

    #[test]
    fn splits_islands_in_discovery_order() {
        let mut part = two_island_part();
        let mesh = part.meshes().get(0).unwrap();

        let mut op = Separate::new(mesh.clone());
        let result = part.modify_using(&mut op).unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result.destroyed(), &[mesh.id()]);
        // Discovery order: the quad island contains the first triangle.
        assert_eq!(result.get(0).unwrap().triangle_count(), 2);
        assert_eq!(result.get(1).unwrap().triangle_count(), 1);
        assert_eq!(part.meshes().len(), 2);
        assert!(!part.meshes().contains(&mesh));
    }

    #[test]
    fn conserves_triangles_and_area() {
        let mut part = two_island_part();
        let mesh = part.meshes().get(0).unwrap();
        let total_triangles = mesh.triangle_count();
        let total_area = mesh.area();

        let result = part.modify_using(&mut Separate::new(mesh)).unwrap();

        let split_triangles: usize = (0..result.len())
            .map(|i| result.get(i).unwrap().triangle_count())
            .sum();
        let split_area: f64 = (0..result.len()).map(|i| result.get(i).unwrap().area()).sum();

        assert_eq!(split_triangles, total_triangles);
        assert!((split_area - total_area).abs() < 1e-12);
    }

    #[test]
    fn second_execution_is_rejected() {
        let mut part = two_island_part();
        let mesh = part.meshes().get(0).unwrap();
        let mut op = Separate::new(mesh);

        part.modify_using(&mut op).unwrap();
        assert!(matches!(
            part.modify_using(&mut op),
            Err(OpsError::AlreadyExecuted)
        ));
    }

    #[test]
    fn foreign_mesh_is_rejected_and_part_unchanged() {
        let mut part = two_island_part();
        let stranger = Mesh::new();

        let result = part.modify_using(&mut Separate::new(stranger));
        assert!(matches!(result, Err(OpsError::MeshNotInPart { .. })));
        assert_eq!(part.meshes().len(), 1);
    }

    #[test]
    fn components_carry_node_normals() {
        let mut part = Part::new();
        part.import(&[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0], &[0, 1, 2])
            .unwrap();
        let mesh = part.meshes().get(0).unwrap();
        for node in mesh.nodes().iter() {
            mesh.set_normal(node, mesh_model::Vector3::z());
        }

        let result = part.modify_using(&mut Separate::new(mesh)).unwrap();
        let out = result.get(0).unwrap();
        for node in out.nodes().iter() {
            assert!(out.normal(node).is_some());
        }
    }
}
