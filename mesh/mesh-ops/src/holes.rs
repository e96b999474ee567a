//! Hole filling: boundary-loop triangulation with optional refinement
//! and smoothing.

use hashbrown::HashMap;
use mesh_model::{Mesh, NodeId, Point3, Triangle, TriangleId, Vector3};
use tracing::{debug, info, warn};

use crate::error::{OpsError, OpsResult};
use crate::operator::{MeshOperator, Transaction};

/// Cost function for the boundary triangulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoleCost {
    /// Minimize total patch area (dynamic programming, optimal).
    Area,
    /// Greedily minimize (max dihedral angle, area), lexicographically:
    /// prefers patches that continue the surrounding surface smoothly.
    DihedralThenArea,
}

/// Weighting scheme for Laplacian smoothing of patch-interior nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmoothingWeights {
    /// Every neighbor contributes equally.
    Uniform,
    /// Neighbors weighted by bar length.
    EdgeLength,
}

/// Strength of a user-selected connection edge between two boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BridgeStrength {
    /// Preferred when selecting splice edges.
    Strong,
    /// Used only when no strong bridge is available.
    Weak,
}

#[derive(Debug, Clone, Copy)]
struct Bridge {
    first: usize,
    second: usize,
    strength: BridgeStrength,
}

/// An explicit hole boundary: one ordered loop of points (with optional
/// normals), or a pair of independent loops bridged by connection edges.
///
/// # Example
///
/// ```
/// use mesh_ops::HoleBoundary;
/// use nalgebra::Point3;
///
/// let boundary = HoleBoundary::from_points(vec![
///     Point3::new(0.0, 0.0, 0.0),
///     Point3::new(1.0, 0.0, 0.0),
///     Point3::new(0.5, 1.0, 0.0),
/// ]);
/// assert_eq!(boundary.len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct HoleBoundary {
    first: Vec<(Point3<f64>, Option<Vector3<f64>>)>,
    second: Vec<(Point3<f64>, Option<Vector3<f64>>)>,
    bridges: Vec<Bridge>,
}

impl HoleBoundary {
    /// A single ordered loop of points.
    #[must_use]
    pub fn from_points(points: Vec<Point3<f64>>) -> Self {
        Self {
            first: points.into_iter().map(|p| (p, None)).collect(),
            second: Vec::new(),
            bridges: Vec::new(),
        }
    }

    /// A single ordered loop of points with normals.
    #[must_use]
    pub fn from_oriented_points(points: Vec<(Point3<f64>, Vector3<f64>)>) -> Self {
        Self {
            first: points.into_iter().map(|(p, n)| (p, Some(n))).collect(),
            second: Vec::new(),
            bridges: Vec::new(),
        }
    }

    /// Two independent loops to be joined by a wall of triangles.
    ///
    /// Connection edges come from [`HoleBoundary::add_bridge`]; when fewer
    /// than two are given, the remaining splice edges are auto-selected by
    /// closest approach.
    #[must_use]
    pub fn bridged_pair(first: Vec<Point3<f64>>, second: Vec<Point3<f64>>) -> Self {
        Self {
            first: first.into_iter().map(|p| (p, None)).collect(),
            second: second.into_iter().map(|p| (p, None)).collect(),
            bridges: Vec::new(),
        }
    }

    /// Add a connection edge between `first[first_index]` and
    /// `second[second_index]`.
    pub fn add_bridge(&mut self, first_index: usize, second_index: usize, strength: BridgeStrength) {
        self.bridges.push(Bridge {
            first: first_index,
            second: second_index,
            strength,
        });
    }

    /// Total number of boundary points across both loops.
    #[must_use]
    pub fn len(&self) -> usize {
        self.first.len() + self.second.len()
    }

    /// True if no points were supplied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.first.is_empty() && self.second.is_empty()
    }
}

#[derive(Debug)]
enum FillTarget {
    /// Fill every boundary loop of an owned mesh.
    Mesh(Mesh),
    /// Triangulate an explicit boundary into a fresh patch mesh.
    Boundary(Box<HoleBoundary>),
}

/// Fill holes by triangulating boundary loops.
///
/// The input is either a whole mesh (every boundary loop is filled, in
/// place) or an explicit [`HoleBoundary`] (a new patch mesh is produced).
/// Three post-stages run in a fixed order, each independently toggleable:
///
/// 1. **triangulate** (always) - minimal-cost polygon triangulation
/// 2. **refine** - split oversized patch triangles until they match the
///    local boundary scale
/// 3. **smooth** - Laplacian relaxation of patch-interior nodes
///
/// The patch is not guaranteed intersection-free against the surrounding
/// mesh; a later heal pass handles that.
#[derive(Debug)]
pub struct FillHoles {
    target: FillTarget,
    cost: HoleCost,
    refine: bool,
    smooth: Option<SmoothingWeights>,
    max_hole_edges: usize,
    executed: bool,
    filled: usize,
    skipped: usize,
}

impl FillHoles {
    /// Fill every boundary loop of `mesh` in place.
    #[must_use]
    pub fn for_mesh(mesh: Mesh) -> Self {
        Self {
            target: FillTarget::Mesh(mesh),
            cost: HoleCost::Area,
            refine: false,
            smooth: None,
            max_hole_edges: 1024,
            executed: false,
            filled: 0,
            skipped: 0,
        }
    }

    /// Triangulate an explicit boundary into a new patch mesh.
    #[must_use]
    pub fn for_boundary(boundary: HoleBoundary) -> Self {
        Self {
            target: FillTarget::Boundary(Box::new(boundary)),
            cost: HoleCost::Area,
            refine: false,
            smooth: None,
            max_hole_edges: 1024,
            executed: false,
            filled: 0,
            skipped: 0,
        }
    }

    /// Non-planar preset: dihedral-guided triangulation plus refinement
    /// and edge-length-weighted smoothing.
    #[must_use]
    pub fn non_planar(mesh: Mesh) -> Self {
        let mut op = Self::for_mesh(mesh);
        op.cost = HoleCost::DihedralThenArea;
        op.refine = true;
        op.smooth = Some(SmoothingWeights::EdgeLength);
        op
    }

    /// Select the triangulation cost function.
    #[must_use]
    pub fn with_cost(mut self, cost: HoleCost) -> Self {
        self.cost = cost;
        self
    }

    /// Toggle the refinement stage.
    #[must_use]
    pub fn with_refine(mut self, refine: bool) -> Self {
        self.refine = refine;
        self
    }

    /// Toggle the smoothing stage.
    #[must_use]
    pub fn with_smooth(mut self, smooth: Option<SmoothingWeights>) -> Self {
        self.smooth = smooth;
        self
    }

    /// Holes with more bars than this are skipped (and counted).
    #[must_use]
    pub fn with_max_hole_edges(mut self, max: usize) -> Self {
        self.max_hole_edges = max;
        self
    }

    /// Number of holes filled; valid after execution.
    #[must_use]
    pub fn filled_holes(&self) -> usize {
        self.filled
    }

    /// Number of holes skipped for exceeding the edge limit.
    #[must_use]
    pub fn skipped_holes(&self) -> usize {
        self.skipped
    }
}

impl MeshOperator for FillHoles {
    fn name(&self) -> &'static str {
        "fill-holes"
    }

    fn apply(&mut self, tx: &mut Transaction<'_>) -> OpsResult<()> {
        if self.executed {
            return Err(OpsError::AlreadyExecuted);
        }
        self.executed = true;

        let options = FillOptions {
            cost: self.cost,
            refine: self.refine,
            smooth: self.smooth,
            max_hole_edges: self.max_hole_edges,
        };

        match &self.target {
            FillTarget::Mesh(mesh) => {
                tx.require(mesh)?;
                let (filled, skipped) = fill_all_holes_core(mesh, &options);
                self.filled = filled;
                self.skipped = skipped;
                info!(filled, skipped, "filled holes of mesh {}", mesh.id());
                tx.mark_modified(mesh)?;
            }
            FillTarget::Boundary(boundary) => {
                let patch = fill_boundary(boundary, &options)?;
                self.filled = 1;
                info!(
                    triangles = patch.triangle_count(),
                    "triangulated explicit boundary"
                );
                tx.add_mesh(patch);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct FillOptions {
    pub(crate) cost: HoleCost,
    pub(crate) refine: bool,
    pub(crate) smooth: Option<SmoothingWeights>,
    pub(crate) max_hole_edges: usize,
}

impl Default for FillOptions {
    fn default() -> Self {
        Self {
            cost: HoleCost::Area,
            refine: false,
            smooth: None,
            max_hole_edges: 1024,
        }
    }
}

/// Fill every boundary loop of `mesh`; returns `(filled, skipped)`.
pub(crate) fn fill_all_holes_core(mesh: &Mesh, options: &FillOptions) -> (usize, usize) {
    let loops = mesh.boundary_loops();
    let mut filled = 0;
    let mut skipped = 0;

    for boundary in loops {
        if boundary.len() > options.max_hole_edges {
            warn!(
                edges = boundary.len(),
                max = options.max_hole_edges,
                "skipping oversized hole"
            );
            skipped += 1;
            continue;
        }
        let nodes: Vec<NodeId> = boundary.iter().collect();
        if fill_loop(mesh, &nodes, options) {
            filled += 1;
        } else {
            skipped += 1;
        }
    }
    (filled, skipped)
}

/// Triangulate one boundary loop in place; true on success.
fn fill_loop(mesh: &Mesh, loop_nodes: &[NodeId], options: &FillOptions) -> bool {
    if loop_nodes.len() < 3 {
        return false;
    }

    // Wind the patch against the existing triangle on the first boundary
    // bar, so the filled surface stays consistently oriented.
    let mut ring: Vec<NodeId> = loop_nodes.to_vec();
    if let Some(direction) = boundary_direction(mesh, ring[0], ring[1]) {
        if direction {
            ring.reverse();
        }
    }

    // Seed dihedral costs with the normals of the surrounding triangles.
    let mut edge_normals: HashMap<(u64, u64), Vector3<f64>> = HashMap::new();
    for i in 0..ring.len() {
        let (a, b) = (ring[i], ring[(i + 1) % ring.len()]);
        let bar = mesh_model::Bar::new(a, b);
        for tri in mesh.bar_triangles(bar).iter() {
            if let Some(n) = mesh.triangle_geometry(tri).normal() {
                edge_normals.insert(bar_key(a, b), n);
            }
        }
    }

    let positions: Vec<Point3<f64>> = ring.iter().map(|&n| mesh.position(n)).collect();
    let triangle_indices = match options.cost {
        HoleCost::Area => triangulate_min_area(&positions),
        HoleCost::DihedralThenArea => triangulate_dihedral(&positions, &ring, &mut edge_normals),
    };
    if triangle_indices.is_empty() {
        return false;
    }

    let mut patch: Vec<TriangleId> = Vec::with_capacity(triangle_indices.len());
    for [i, k, j] in triangle_indices {
        match mesh.add_triangle(ring[i], ring[k], ring[j]) {
            Ok(tri) => patch.push(tri),
            Err(_) => return false,
        }
    }

    let mut interior: Vec<NodeId> = Vec::new();
    if options.refine {
        refine_patch(mesh, &mut patch, &mut interior, loop_scale(&positions));
    }
    if let Some(weights) = options.smooth {
        smooth_patch(mesh, &interior, weights);
    }

    debug!(
        boundary = ring.len(),
        triangles = patch.len(),
        "filled boundary loop"
    );
    true
}

/// Direction in which the lone incident triangle traverses the boundary
/// bar `(a, b)`: `Some(true)` for `a -> b`.
fn boundary_direction(mesh: &Mesh, a: NodeId, b: NodeId) -> Option<bool> {
    let bar = mesh_model::Bar::new(a, b);
    let incident = mesh.bar_triangles(bar);
    let tri = incident.get(0)?;
    let corners = mesh.triangle_nodes(tri);
    for i in 0..3 {
        let (u, v) = (corners[i], corners[(i + 1) % 3]);
        if u == a && v == b {
            return Some(true);
        }
        if u == b && v == a {
            return Some(false);
        }
    }
    None
}

fn bar_key(a: NodeId, b: NodeId) -> (u64, u64) {
    if a.id() < b.id() {
        (a.id(), b.id())
    } else {
        (b.id(), a.id())
    }
}

/// Mean bar length of the loop, the local scale for refinement.
fn loop_scale(positions: &[Point3<f64>]) -> f64 {
    let n = positions.len();
    let total: f64 = (0..n)
        .map(|i| (positions[(i + 1) % n] - positions[i]).norm())
        .sum();
    total / n as f64
}

/// Optimal minimal-area triangulation of a polygon (interval DP).
///
/// Returns index triples `[i, k, j]` wound with the polygon direction.
fn triangulate_min_area(positions: &[Point3<f64>]) -> Vec<[usize; 3]> {
    let n = positions.len();
    if n < 3 {
        return Vec::new();
    }
    if n == 3 {
        return vec![[0, 1, 2]];
    }

    let area = |i: usize, k: usize, j: usize| -> f64 {
        Triangle::new(positions[i], positions[k], positions[j]).area()
    };

    // cost[i][j]: minimal patch area closing the chord (i, j), j > i + 1.
    let mut cost = vec![vec![0.0f64; n]; n];
    let mut split = vec![vec![0usize; n]; n];

    for span in 2..n {
        for i in 0..n - span {
            let j = i + span;
            let mut best = f64::INFINITY;
            let mut best_k = i + 1;
            for k in i + 1..j {
                let c = cost[i][k] + cost[k][j] + area(i, k, j);
                if c < best {
                    best = c;
                    best_k = k;
                }
            }
            cost[i][j] = best;
            split[i][j] = best_k;
        }
    }

    let mut triangles = Vec::with_capacity(n - 2);
    let mut stack = vec![(0usize, n - 1)];
    while let Some((i, j)) = stack.pop() {
        if j - i < 2 {
            continue;
        }
        let k = split[i][j];
        triangles.push([i, k, j]);
        stack.push((i, k));
        stack.push((k, j));
    }
    triangles
}

/// Greedy ear clipping minimizing (max dihedral with neighbors, area).
fn triangulate_dihedral(
    positions: &[Point3<f64>],
    ring_nodes: &[NodeId],
    edge_normals: &mut HashMap<(u64, u64), Vector3<f64>>,
) -> Vec<[usize; 3]> {
    let n = positions.len();
    if n < 3 {
        return Vec::new();
    }

    let mut ring: Vec<usize> = (0..n).collect();
    let mut triangles = Vec::with_capacity(n - 2);

    while ring.len() > 3 {
        let mut best: Option<(f64, f64, usize)> = None;

        for r in 0..ring.len() {
            let prev = ring[(r + ring.len() - 1) % ring.len()];
            let curr = ring[r];
            let next = ring[(r + 1) % ring.len()];

            let tri = Triangle::new(positions[prev], positions[curr], positions[next]);
            let Some(normal) = tri.normal() else {
                continue; // Degenerate ear; try elsewhere.
            };

            let mut worst_dihedral: f64 = 0.0;
            for (a, b) in [(prev, curr), (curr, next)] {
                if let Some(neighbor) =
                    edge_normals.get(&bar_key(ring_nodes[a], ring_nodes[b]))
                {
                    let angle = normal.dot(neighbor).clamp(-1.0, 1.0).acos();
                    worst_dihedral = worst_dihedral.max(angle);
                }
            }

            let candidate = (worst_dihedral, tri.area(), r);
            let better = match best {
                None => true,
                Some((d, a, _)) => {
                    candidate.0 < d - 1e-12 || ((candidate.0 - d).abs() <= 1e-12 && candidate.1 < a)
                }
            };
            if better {
                best = Some(candidate);
            }
        }

        let Some((_, _, r)) = best else {
            // Every remaining ear is degenerate; bail to a fan.
            break;
        };

        let prev = ring[(r + ring.len() - 1) % ring.len()];
        let curr = ring[r];
        let next = ring[(r + 1) % ring.len()];
        triangles.push([prev, curr, next]);

        let tri = Triangle::new(positions[prev], positions[curr], positions[next]);
        if let Some(normal) = tri.normal() {
            edge_normals.insert(bar_key(ring_nodes[prev], ring_nodes[next]), normal);
        }
        ring.remove(r);
    }

    if ring.len() == 3 {
        triangles.push([ring[0], ring[1], ring[2]]);
    } else {
        // Fan out whatever is left.
        for r in 1..ring.len() - 1 {
            triangles.push([ring[0], ring[r], ring[r + 1]]);
        }
    }
    triangles
}

/// Split oversized patch triangles by centroid insertion until they match
/// the loop scale. New nodes are appended to `interior`.
fn refine_patch(
    mesh: &Mesh,
    patch: &mut Vec<TriangleId>,
    interior: &mut Vec<NodeId>,
    scale: f64,
) {
    const MAX_ROUNDS: usize = 3;
    let limit = scale * 1.2;

    for _ in 0..MAX_ROUNDS {
        let mut split_any = false;
        let current = std::mem::take(patch);

        for tri in current {
            let geometry = mesh.triangle_geometry(tri);
            // Slivers are excluded: centroid insertion cannot improve them.
            let needs_split =
                geometry.circumradius() > limit && geometry.min_angle() > 10f64.to_radians();
            if !needs_split {
                patch.push(tri);
                continue;
            }

            let [a, b, c] = mesh.triangle_nodes(tri);
            let center = mesh.add_node(geometry.centroid());
            interior.push(center);
            mesh.remove_triangle(tri);
            for (u, v) in [(a, b), (b, c), (c, a)] {
                if let Ok(t) = mesh.add_triangle(u, v, center) {
                    patch.push(t);
                }
            }
            split_any = true;
        }

        if !split_any {
            break;
        }
    }
}

/// Laplacian relaxation of patch-interior nodes; boundary nodes anchor.
fn smooth_patch(mesh: &Mesh, interior: &[NodeId], weights: SmoothingWeights) {
    const ROUNDS: usize = 10;
    const LAMBDA: f64 = 0.5;

    if interior.is_empty() {
        return;
    }

    for _ in 0..ROUNDS {
        let targets: Vec<(NodeId, Point3<f64>)> = interior
            .iter()
            .map(|&node| {
                let p = mesh.position(node);
                let mut sum = Vector3::zeros();
                let mut total = 0.0;
                for neighbor in mesh.node_neighbors(node).iter() {
                    let q = mesh.position(neighbor);
                    let w = match weights {
                        SmoothingWeights::Uniform => 1.0,
                        SmoothingWeights::EdgeLength => (q - p).norm().max(1e-12),
                    };
                    sum += q.coords * w;
                    total += w;
                }
                if total > 0.0 {
                    let average = Point3::from(sum / total);
                    (node, p + (average - p) * LAMBDA)
                } else {
                    (node, p)
                }
            })
            .collect();

        for (node, target) in targets {
            mesh.set_position(node, target);
        }
    }
}

/// Build a patch mesh for an explicit boundary.
fn fill_boundary(boundary: &HoleBoundary, options: &FillOptions) -> OpsResult<Mesh> {
    if boundary.first.len() < 3 {
        return Err(OpsError::Triangulation {
            reason: format!(
                "boundary needs at least 3 points, got {}",
                boundary.first.len()
            ),
        });
    }

    let patch = Mesh::new();
    let first: Vec<NodeId> = boundary
        .first
        .iter()
        .map(|&(p, n)| {
            let node = patch.add_node(p);
            if let Some(normal) = n {
                patch.set_normal(node, normal);
            }
            node
        })
        .collect();

    if boundary.second.is_empty() {
        let positions: Vec<Point3<f64>> = boundary.first.iter().map(|&(p, _)| p).collect();
        let mut edge_normals = HashMap::new();
        let triangles = match options.cost {
            HoleCost::Area => triangulate_min_area(&positions),
            HoleCost::DihedralThenArea => {
                triangulate_dihedral(&positions, &first, &mut edge_normals)
            }
        };
        if triangles.is_empty() {
            return Err(OpsError::Triangulation {
                reason: "loop admits no triangulation".to_string(),
            });
        }
        let mut patch_tris = Vec::new();
        for [i, k, j] in triangles {
            if let Ok(t) = patch.add_triangle(first[i], first[k], first[j]) {
                patch_tris.push(t);
            }
        }
        let mut interior = Vec::new();
        if options.refine {
            let positions: Vec<Point3<f64>> = boundary.first.iter().map(|&(p, _)| p).collect();
            refine_patch(&patch, &mut patch_tris, &mut interior, loop_scale(&positions));
        }
        if let Some(weights) = options.smooth {
            smooth_patch(&patch, &interior, weights);
        }
        return Ok(patch);
    }

    // Bridged pair: splice the two loops into two wall polygons.
    if boundary.second.len() < 3 {
        return Err(OpsError::Triangulation {
            reason: "second boundary needs at least 3 points".to_string(),
        });
    }
    let second: Vec<NodeId> = boundary
        .second
        .iter()
        .map(|&(p, n)| {
            let node = patch.add_node(p);
            if let Some(normal) = n {
                patch.set_normal(node, normal);
            }
            node
        })
        .collect();

    let (bridge_a, bridge_b) = select_bridges(boundary);
    let wall_polygons = splice_loops(first.len(), second.len(), bridge_a, bridge_b);

    for polygon in wall_polygons {
        let nodes: Vec<NodeId> = polygon
            .iter()
            .map(|&(loop_index, i)| if loop_index == 0 { first[i] } else { second[i] })
            .collect();
        let positions: Vec<Point3<f64>> = nodes.iter().map(|&n| patch.position(n)).collect();

        for [i, k, j] in triangulate_min_area(&positions) {
            let _ = patch.add_triangle(nodes[i], nodes[k], nodes[j]);
        }
    }

    Ok(patch)
}

/// Pick the two splice bridges: explicit ones first (strong before weak),
/// auto-selected closest pairs for whatever is missing.
fn select_bridges(boundary: &HoleBoundary) -> ((usize, usize), (usize, usize)) {
    let mut explicit = boundary.bridges.clone();
    explicit.sort_by_key(|b| b.strength);

    let mut chosen: Vec<(usize, usize)> = Vec::new();
    for bridge in explicit {
        if bridge.first < boundary.first.len() && bridge.second < boundary.second.len() {
            let pair = (bridge.first, bridge.second);
            if !chosen.contains(&pair)
                && !chosen
                    .iter()
                    .any(|&(i, j)| i == pair.0 || j == pair.1)
            {
                chosen.push(pair);
            }
        }
        if chosen.len() == 2 {
            break;
        }
    }

    while chosen.len() < 2 {
        let mut best: Option<(f64, usize, usize)> = None;
        for (i, &(p, _)) in boundary.first.iter().enumerate() {
            if chosen.iter().any(|&(ci, _)| ci == i) {
                continue;
            }
            for (j, &(q, _)) in boundary.second.iter().enumerate() {
                if chosen.iter().any(|&(_, cj)| cj == j) {
                    continue;
                }
                let d = (p - q).norm();
                if best.map_or(true, |(bd, _, _)| d < bd) {
                    best = Some((d, i, j));
                }
            }
        }
        match best {
            Some((_, i, j)) => chosen.push((i, j)),
            None => break,
        }
    }

    (chosen[0], chosen[1])
}

/// Split two bridged loops into the two wall polygons between the splice
/// edges. Entries are `(loop_index, point_index)`.
fn splice_loops(
    first_len: usize,
    second_len: usize,
    bridge_a: (usize, usize),
    bridge_b: (usize, usize),
) -> Vec<Vec<(usize, usize)>> {
    let walk = |len: usize, from: usize, to: usize| -> Vec<usize> {
        let mut out = vec![from];
        let mut i = from;
        while i != to {
            i = (i + 1) % len;
            out.push(i);
        }
        out
    };

    // Wall 1: first loop a.0 -> b.0, bridge, second loop b.1 -> a.1, bridge back.
    let mut wall1: Vec<(usize, usize)> = walk(first_len, bridge_a.0, bridge_b.0)
        .into_iter()
        .map(|i| (0, i))
        .collect();
    wall1.extend(walk(second_len, bridge_b.1, bridge_a.1).into_iter().map(|i| (1, i)));

    // Wall 2: the complementary halves.
    let mut wall2: Vec<(usize, usize)> = walk(first_len, bridge_b.0, bridge_a.0)
        .into_iter()
        .map(|i| (0, i))
        .collect();
    wall2.extend(walk(second_len, bridge_a.1, bridge_b.1).into_iter().map(|i| (1, i)));

    [wall1, wall2]
        .into_iter()
        .filter(|w| w.len() >= 3)
        .collect()
}
