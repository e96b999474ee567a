//! Tolerance-based stitching of meshes along boundary bars.

use hashbrown::HashMap;
use mesh_model::{Mesh, NodeId, Point3};
use ph_spatial::PointGrid;
use tracing::{debug, info};

use crate::error::{OpsError, OpsResult};
use crate::operator::{MeshOperator, Transaction};

/// Join meshes by merging boundary bars whose endpoints lie within a
/// tolerance of each other.
///
/// Boundary bars are bucketed by endpoint proximity and greedily paired,
/// closest pairs first; pairing merges the bars' nodes. The surviving node
/// of each merge is **first-wins**: the node of the mesh added to the
/// stitch first keeps its exact position, which makes re-stitching an
/// already-stitched result a no-op.
///
/// Partial success is expected behavior: regions whose gap exceeds the
/// tolerance stay as separate boundary bars, reflected in the result's
/// continued non-watertightness, not in an error.
///
/// A tolerance of exactly `0.0` merges nothing: the inputs are validated
/// and returned unchanged.
#[derive(Debug)]
pub struct Stitch {
    meshes: Vec<Mesh>,
    tolerance: f64,
    executed: bool,
    stitched_pairs: usize,
}

impl Stitch {
    /// Create a stitch with the given merge tolerance.
    #[must_use]
    pub fn new(tolerance: f64) -> Self {
        Self {
            meshes: Vec::new(),
            tolerance,
            executed: false,
            stitched_pairs: 0,
        }
    }

    /// Add an input mesh. Order matters: earlier meshes win node merges.
    pub fn add_mesh(&mut self, mesh: Mesh) {
        self.meshes.push(mesh);
    }

    /// Number of bar pairs merged; valid after execution.
    #[must_use]
    pub fn stitched_pairs(&self) -> usize {
        self.stitched_pairs
    }
}

impl MeshOperator for Stitch {
    fn name(&self) -> &'static str {
        "stitch"
    }

    fn apply(&mut self, tx: &mut Transaction<'_>) -> OpsResult<()> {
        if self.executed {
            return Err(OpsError::AlreadyExecuted);
        }
        self.executed = true;
        if self.meshes.is_empty() {
            return Err(OpsError::MissingInput("stitch needs at least one mesh"));
        }
        for mesh in &self.meshes {
            tx.require(mesh)?;
        }

        // Zero tolerance: identity on topology, inputs pass through.
        if self.tolerance == 0.0 {
            for mesh in &self.meshes {
                tx.mark_modified(mesh)?;
            }
            debug!("stitch with zero tolerance: no merging");
            return Ok(());
        }

        // Combine all inputs into one mesh, remembering where each node
        // came from (input order decides merge winners).
        let combined = Mesh::new();
        let mut boundary: Vec<BoundaryBar> = Vec::new();

        for (input_index, mesh) in self.meshes.iter().enumerate() {
            let mut node_map: HashMap<NodeId, NodeId> = HashMap::new();
            let mut map = |node: NodeId| -> NodeId {
                *node_map.entry(node).or_insert_with(|| {
                    let copy = combined.add_node(mesh.position(node));
                    if let Some(normal) = mesh.normal(node) {
                        combined.set_normal(copy, normal);
                    }
                    if let Some(uv) = mesh.uv(node) {
                        combined.set_uv(copy, uv);
                    }
                    copy
                })
            };

            for tri in mesh.triangles().iter() {
                let [a, b, c] = mesh.triangle_nodes(tri);
                let (a, b, c) = (map(a), map(b), map(c));
                let _ = combined.add_triangle(a, b, c);
            }

            for bar in mesh.boundary_bars().iter() {
                let [a, b] = bar.nodes();
                boundary.push(BoundaryBar {
                    input: input_index,
                    ends: [map(a), map(b)],
                });
            }
        }

        let pairs = pair_boundary_bars(&combined, &boundary, self.tolerance, self.meshes.len());
        self.stitched_pairs = pairs.len();

        if pairs.is_empty() {
            // Nothing within tolerance: leave the inputs untouched so a
            // repeated stitch changes nothing.
            for mesh in &self.meshes {
                tx.mark_modified(mesh)?;
            }
            info!("stitch joined nothing within tolerance {}", self.tolerance);
            return Ok(());
        }

        // Union-find over node indices; the smallest index (earliest
        // input) is the representative and keeps its position.
        let mut leader: HashMap<NodeId, NodeId> = HashMap::new();
        fn find(leader: &mut HashMap<NodeId, NodeId>, node: NodeId) -> NodeId {
            let mut current = node;
            while let Some(&next) = leader.get(&current) {
                if next == current {
                    break;
                }
                current = next;
            }
            current
        }

        for (a, b) in pairs.iter().flat_map(|p| p.merges()) {
            let (ra, rb) = (find(&mut leader, a), find(&mut leader, b));
            if ra != rb {
                let (winner, loser) = if ra.id() < rb.id() { (ra, rb) } else { (rb, ra) };
                leader.insert(loser, winner);
            }
        }

        let mut remap: HashMap<NodeId, NodeId> = HashMap::new();
        let losers: Vec<NodeId> = leader.keys().copied().collect();
        for node in losers {
            let root = find(&mut leader, node);
            if root != node {
                remap.insert(node, root);
            }
        }

        combined.weld(&remap);
        combined.drop_unreferenced_nodes();

        info!(
            inputs = self.meshes.len(),
            pairs = self.stitched_pairs,
            watertight = combined.is_watertight(),
            "stitched meshes"
        );

        for mesh in &self.meshes {
            tx.remove_mesh(mesh)?;
        }
        tx.add_mesh(combined);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct BoundaryBar {
    input: usize,
    ends: [NodeId; 2],
}

#[derive(Debug, Clone, Copy)]
struct MatchedPair {
    a: BoundaryBar,
    b: BoundaryBar,
    crossed: bool,
}

impl MatchedPair {
    /// The two node merges this pair implies.
    fn merges(self) -> [(NodeId, NodeId); 2] {
        if self.crossed {
            [
                (self.a.ends[0], self.b.ends[1]),
                (self.a.ends[1], self.b.ends[0]),
            ]
        } else {
            [
                (self.a.ends[0], self.b.ends[0]),
                (self.a.ends[1], self.b.ends[1]),
            ]
        }
    }
}

/// Greedily pair boundary bars whose endpoints both lie within tolerance.
///
/// With several inputs only cross-input pairs are considered; a lone input
/// may stitch to itself (gap closing), excluding bars that share a node.
fn pair_boundary_bars(
    mesh: &Mesh,
    bars: &[BoundaryBar],
    tolerance: f64,
    input_count: usize,
) -> Vec<MatchedPair> {
    if bars.is_empty() {
        return Vec::new();
    }

    let position = |n: NodeId| -> Point3<f64> { mesh.position(n) };

    // Bucket bars by the cells of both endpoints.
    let Ok(grid) = PointGrid::from_points(
        tolerance,
        bars.iter().enumerate().flat_map(|(i, bar)| {
            [
                (position(bar.ends[0]), i as u64),
                (position(bar.ends[1]), i as u64),
            ]
        }),
    ) else {
        return Vec::new();
    };

    // Candidate pairs with their worst endpoint distance.
    let mut candidates: Vec<(f64, usize, usize, bool)> = Vec::new();
    for (i, bar) in bars.iter().enumerate() {
        let Ok(near) = grid.neighbors_within(&position(bar.ends[0]), tolerance) else {
            continue;
        };
        for j in near {
            let j = j as usize;
            if j <= i {
                continue;
            }
            let other = bars[j];
            if input_count > 1 && bar.input == other.input {
                continue;
            }
            if bar.ends.iter().any(|e| other.ends.contains(e)) {
                continue;
            }

            let d = |x: NodeId, y: NodeId| (position(x) - position(y)).norm();
            let straight = d(bar.ends[0], other.ends[0]).max(d(bar.ends[1], other.ends[1]));
            let crossed = d(bar.ends[0], other.ends[1]).max(d(bar.ends[1], other.ends[0]));

            if straight <= tolerance || crossed <= tolerance {
                let use_crossed = crossed < straight;
                candidates.push((straight.min(crossed), i, j, use_crossed));
            }
        }
    }

    candidates.sort_by(|x, y| x.0.partial_cmp(&y.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut taken = vec![false; bars.len()];
    let mut pairs = Vec::new();
    for (_, i, j, crossed) in candidates {
        if taken[i] || taken[j] {
            continue;
        }
        taken[i] = true;
        taken[j] = true;
        pairs.push(MatchedPair {
            a: bars[i],
            b: bars[j],
            crossed,
        });
    }
    pairs
}
