//! Consistent winding propagation.

use hashbrown::HashMap;
use mesh_model::{Mesh, TriangleId};
use smallvec::SmallVec;
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::error::{OpsError, OpsResult};
use crate::operator::{MeshOperator, Transaction};

/// Propagate a consistent winding across each connected component.
///
/// Starting from an arbitrary seed triangle per component, orientation
/// spreads breadth-first across manifold (degree-2) bars: a neighbor whose
/// shared bar is traversed in the same direction gets flipped. Components
/// where propagation contradicts itself (Möbius-like cycles) are left
/// untouched and counted — they are reported, never silently "fixed".
///
/// Non-manifold bars do not carry orientation; the fan around them stays
/// as-is and is the subject of a different repair.
#[derive(Debug)]
pub struct HealOrientation {
    mesh: Mesh,
    executed: bool,
    flipped: usize,
    non_orientable: usize,
}

impl HealOrientation {
    /// Create the operator for `mesh`.
    #[must_use]
    pub fn new(mesh: Mesh) -> Self {
        Self {
            mesh,
            executed: false,
            flipped: 0,
            non_orientable: 0,
        }
    }

    /// Number of triangles flipped; valid after execution.
    #[must_use]
    pub fn flipped_triangles(&self) -> usize {
        self.flipped
    }

    /// Number of components left unresolved; valid after execution.
    #[must_use]
    pub fn non_orientable_components(&self) -> usize {
        self.non_orientable
    }
}

impl MeshOperator for HealOrientation {
    fn name(&self) -> &'static str {
        "heal-orientation"
    }

    fn apply(&mut self, tx: &mut Transaction<'_>) -> OpsResult<()> {
        if self.executed {
            return Err(OpsError::AlreadyExecuted);
        }
        self.executed = true;
        tx.require(&self.mesh)?;

        let outcome = orient_core(&self.mesh);
        self.flipped = outcome.flipped;
        self.non_orientable = outcome.non_orientable;
        info!(
            flipped = outcome.flipped,
            non_orientable = outcome.non_orientable,
            "healed orientation of mesh {}",
            self.mesh.id()
        );

        tx.mark_modified(&self.mesh)?;
        Ok(())
    }
}

pub(crate) struct OrientOutcome {
    pub(crate) flipped: usize,
    pub(crate) non_orientable: usize,
}

/// Winding propagation over manifold bars; flips are only applied to
/// components that turn out orientable.
pub(crate) fn orient_core(mesh: &Mesh) -> OrientOutcome {
    let triangles: Vec<TriangleId> = mesh.triangles().iter().collect();
    let mut outcome = OrientOutcome {
        flipped: 0,
        non_orientable: 0,
    };
    if triangles.is_empty() {
        return outcome;
    }

    let corners: Vec<[u64; 3]> = triangles
        .iter()
        .map(|&t| {
            let [a, b, c] = mesh.triangle_nodes(t);
            [a.id(), b.id(), c.id()]
        })
        .collect();

    let mut edge_map: HashMap<(u64, u64), SmallVec<[usize; 2]>> = HashMap::new();
    for (pos, c) in corners.iter().enumerate() {
        for i in 0..3 {
            let (a, b) = (c[i], c[(i + 1) % 3]);
            let key = if a < b { (a, b) } else { (b, a) };
            edge_map.entry(key).or_default().push(pos);
        }
    }

    let mut visited = vec![false; triangles.len()];
    let mut flip = vec![false; triangles.len()];

    for seed in 0..triangles.len() {
        if visited[seed] {
            continue;
        }

        let mut component = Vec::new();
        let mut consistent = true;
        let mut queue = VecDeque::new();
        visited[seed] = true;
        queue.push_back(seed);

        while let Some(current) = queue.pop_front() {
            component.push(current);
            let c = corners[current];

            for i in 0..3 {
                let (a, b) = (c[i], c[(i + 1) % 3]);
                let key = if a < b { (a, b) } else { (b, a) };
                let Some(incident) = edge_map.get(&key) else {
                    continue;
                };
                // Orientation only crosses manifold bars.
                if incident.len() != 2 {
                    continue;
                }

                for &neighbor in incident {
                    if neighbor == current {
                        continue;
                    }
                    let same_direction =
                        direction_of(&corners[neighbor], a, b) == direction_of(&corners[current], a, b);
                    let required = flip[current] ^ same_direction;

                    if visited[neighbor] {
                        if flip[neighbor] != required {
                            consistent = false;
                        }
                    } else {
                        visited[neighbor] = true;
                        flip[neighbor] = required;
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        if consistent {
            for &pos in &component {
                if flip[pos] {
                    mesh.flip_triangle(triangles[pos]);
                    outcome.flipped += 1;
                }
            }
        } else {
            debug!(
                triangles = component.len(),
                "non-orientable component left untouched"
            );
            outcome.non_orientable += 1;
        }
    }

    outcome
}

fn direction_of(corners: &[u64; 3], a: u64, b: u64) -> bool {
    for i in 0..3 {
        let (u, v) = (corners[i], corners[(i + 1) % 3]);
        if u == a && v == b {
            return true;
        }
        if u == b && v == a {
            return false;
        }
    }
    // The caller only asks about bars of this triangle.
    unreachable!("bar not part of triangle")
}
