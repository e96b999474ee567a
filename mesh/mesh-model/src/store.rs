//! The mesh store and its reference-semantics handle.

use std::sync::Arc;

use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};
use parking_lot::RwLock;
use ph_spatial::Aabb;
use tracing::debug;

use crate::adjacency::BarAdjacency;
use crate::containers::{BarContainer, NodeContainer, TriangleContainer};
use crate::error::{ModelError, ModelResult};
use crate::handle::{Bar, MeshId, NodeId, TriangleId};
use crate::serialize::MeshSerializer;
use crate::triangle::Triangle;

/// Per-node payload: a position plus the optional attributes the exchange
/// formats carry.
#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub(crate) position: Point3<f64>,
    pub(crate) normal: Option<Vector3<f64>>,
    pub(crate) uv: Option<(f64, f64)>,
}

impl NodeData {
    fn at(position: Point3<f64>) -> Self {
        Self {
            position,
            normal: None,
            uv: None,
        }
    }
}

/// Serialized-index bijection, computed lazily.
#[derive(Debug, Default, Clone)]
struct SerialMap {
    nodes: Vec<u64>,
    node_rank: HashMap<u64, usize>,
    tris: Vec<u64>,
    tri_rank: HashMap<u64, usize>,
}

#[derive(Debug)]
pub(crate) struct Store {
    id: MeshId,
    /// Node arena; slot index == handle index, never reused.
    nodes: Vec<Option<NodeData>>,
    live_nodes: usize,
    /// Triangle arena; payload is the three corner node indices.
    tris: Vec<Option<[u64; 3]>>,
    live_tris: usize,
    /// Lazy caches, dropped on any mutation.
    adjacency: Option<BarAdjacency>,
    serial: Option<SerialMap>,
}

/// A deep copy of a mesh's contents, used for transactional rollback.
///
/// Produced by [`Mesh::snapshot`] and consumed by [`Mesh::restore`]; the
/// snapshot keeps handle indices, so handles taken before the snapshot are
/// valid again after a restore.
#[derive(Debug, Clone)]
pub struct MeshSnapshot {
    nodes: Vec<Option<NodeData>>,
    live_nodes: usize,
    tris: Vec<Option<[u64; 3]>>,
    live_tris: usize,
}

impl Store {
    fn touch(&mut self) {
        self.adjacency = None;
        self.serial = None;
    }

    fn live_triangles(&self) -> impl Iterator<Item = (u64, &[u64; 3])> {
        self.tris
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.as_ref().map(|c| (i as u64, c)))
    }

    fn ensure_adjacency(&mut self) {
        if self.adjacency.is_none() {
            let adj = BarAdjacency::build(
                self.tris
                    .iter()
                    .enumerate()
                    .filter_map(|(i, t)| t.as_ref().map(|c| (i as u64, c))),
            );
            self.adjacency = Some(adj);
        }
    }

    fn ensure_serial(&mut self) {
        if self.serial.is_none() {
            let nodes: Vec<u64> = self
                .nodes
                .iter()
                .enumerate()
                .filter_map(|(i, n)| n.as_ref().map(|_| i as u64))
                .collect();
            let node_rank = nodes.iter().enumerate().map(|(r, &i)| (i, r)).collect();
            let tris: Vec<u64> = self
                .tris
                .iter()
                .enumerate()
                .filter_map(|(i, t)| t.as_ref().map(|_| i as u64))
                .collect();
            let tri_rank = tris.iter().enumerate().map(|(r, &i)| (i, r)).collect();
            self.serial = Some(SerialMap {
                nodes,
                node_rank,
                tris,
                tri_rank,
            });
        }
    }

    fn node_data(&self, node: NodeId) -> &NodeData {
        assert_eq!(
            node.mesh, self.id,
            "node handle from mesh {} queried on mesh {}",
            node.mesh, self.id
        );
        match self.nodes.get(node.index as usize).and_then(Option::as_ref) {
            Some(data) => data,
            None => panic!("node {} does not exist in mesh {}", node.index, self.id),
        }
    }

    fn node_data_mut(&mut self, node: NodeId) -> &mut NodeData {
        assert_eq!(
            node.mesh, self.id,
            "node handle from mesh {} queried on mesh {}",
            node.mesh, self.id
        );
        let id = self.id;
        match self
            .nodes
            .get_mut(node.index as usize)
            .and_then(Option::as_mut)
        {
            Some(data) => data,
            None => panic!("node {} does not exist in mesh {}", node.index, id),
        }
    }

    fn tri_corners(&self, tri: TriangleId) -> [u64; 3] {
        assert_eq!(
            tri.mesh, self.id,
            "triangle handle from mesh {} queried on mesh {}",
            tri.mesh, self.id
        );
        match self.tris.get(tri.index as usize).and_then(Option::as_ref) {
            Some(corners) => *corners,
            None => panic!("triangle {} does not exist in mesh {}", tri.index, self.id),
        }
    }

    fn node_id(&self, index: u64) -> NodeId {
        NodeId {
            mesh: self.id,
            index,
        }
    }

    fn tri_id(&self, index: u64) -> TriangleId {
        TriangleId {
            mesh: self.id,
            index,
        }
    }

    fn tri_geometry(&self, corners: [u64; 3]) -> Triangle {
        let p = |i: u64| match self.nodes.get(i as usize).and_then(Option::as_ref) {
            Some(data) => data.position,
            None => panic!("triangle references dead node {} in mesh {}", i, self.id),
        };
        Triangle::new(p(corners[0]), p(corners[1]), p(corners[2]))
    }
}

/// A triangle mesh with shared-ownership semantics.
///
/// `Mesh` is a handle: cloning it aliases the same underlying store, and
/// mutations through any alias are visible to all. Use
/// [`Mesh::deep_clone`] for an independent copy with a fresh identity.
///
/// Handles ([`NodeId`], [`TriangleId`], [`Bar`]) are only meaningful for
/// the mesh that produced them. Methods taking handles panic when given a
/// handle from another mesh — see the per-method `# Panics` sections.
#[derive(Debug, Clone)]
pub struct Mesh {
    inner: Arc<RwLock<Store>>,
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}

impl Mesh {
    /// Create an empty mesh with a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Store {
                id: MeshId::fresh(),
                nodes: Vec::new(),
                live_nodes: 0,
                tris: Vec::new(),
                live_tris: 0,
                adjacency: None,
                serial: None,
            })),
        }
    }

    /// Import a mesh from raw buffers.
    ///
    /// `positions` holds `x y z` triples; `connectivity` holds 0-based node
    /// index triples into the position array.
    ///
    /// # Errors
    ///
    /// - [`ModelError::PositionsNotTriples`] / [`ModelError::ConnectivityNotTriples`]
    ///   when a buffer length is not a multiple of 3
    /// - [`ModelError::NonFiniteCoordinate`] for NaN/infinite positions
    /// - [`ModelError::IndexOutOfRange`] for connectivity referencing a
    ///   missing node
    /// - [`ModelError::RepeatedCorner`] for a triangle naming a node twice
    ///
    /// # Example
    ///
    /// ```
    /// use mesh_model::Mesh;
    ///
    /// let positions = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    /// let mesh = Mesh::from_raw(&positions, &[0, 1, 2]).unwrap();
    /// assert_eq!(mesh.triangle_count(), 1);
    /// ```
    pub fn from_raw(positions: &[f64], connectivity: &[u32]) -> ModelResult<Self> {
        if positions.len() % 3 != 0 {
            return Err(ModelError::PositionsNotTriples(positions.len()));
        }
        if connectivity.len() % 3 != 0 {
            return Err(ModelError::ConnectivityNotTriples(connectivity.len()));
        }

        let node_count = positions.len() / 3;
        for (i, coords) in positions.chunks_exact(3).enumerate() {
            if !coords.iter().all(|c| c.is_finite()) {
                return Err(ModelError::NonFiniteCoordinate { node: i });
            }
        }
        for &index in connectivity {
            if index as usize >= node_count {
                return Err(ModelError::IndexOutOfRange { index, node_count });
            }
        }

        let mesh = Self::new();
        {
            let mut store = mesh.inner.write();
            for coords in positions.chunks_exact(3) {
                store
                    .nodes
                    .push(Some(NodeData::at(Point3::new(coords[0], coords[1], coords[2]))));
            }
            store.live_nodes = node_count;

            for tri in connectivity.chunks_exact(3) {
                let corners = [u64::from(tri[0]), u64::from(tri[1]), u64::from(tri[2])];
                if corners[0] == corners[1] || corners[1] == corners[2] || corners[0] == corners[2]
                {
                    return Err(ModelError::RepeatedCorner { node: corners[0] });
                }
                store.tris.push(Some(corners));
            }
            store.live_tris = connectivity.len() / 3;
        }

        debug!(
            nodes = node_count,
            triangles = connectivity.len() / 3,
            "imported mesh"
        );
        Ok(mesh)
    }

    /// Identity of this mesh.
    #[must_use]
    pub fn id(&self) -> MeshId {
        self.inner.read().id
    }

    /// True if `other` aliases the same store as `self`.
    #[must_use]
    pub fn same_store(&self, other: &Mesh) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Independent deep copy with a fresh identity.
    ///
    /// Handle indices carry over, so node `i` of the copy corresponds to
    /// node `i` of the original, but the copy's handles are distinct values.
    #[must_use]
    pub fn deep_clone(&self) -> Mesh {
        let store = self.inner.read();
        Self {
            inner: Arc::new(RwLock::new(Store {
                id: MeshId::fresh(),
                nodes: store.nodes.clone(),
                live_nodes: store.live_nodes,
                tris: store.tris.clone(),
                live_tris: store.live_tris,
                adjacency: None,
                serial: None,
            })),
        }
    }

    /// Capture the current contents for a later [`Mesh::restore`].
    #[must_use]
    pub fn snapshot(&self) -> MeshSnapshot {
        let store = self.inner.read();
        MeshSnapshot {
            nodes: store.nodes.clone(),
            live_nodes: store.live_nodes,
            tris: store.tris.clone(),
            live_tris: store.live_tris,
        }
    }

    /// Restore contents from a snapshot taken on this mesh (or an alias).
    ///
    /// Identity is preserved: handles taken before the snapshot become
    /// valid again.
    pub fn restore(&self, snapshot: &MeshSnapshot) {
        let mut store = self.inner.write();
        store.nodes = snapshot.nodes.clone();
        store.live_nodes = snapshot.live_nodes;
        store.tris = snapshot.tris.clone();
        store.live_tris = snapshot.live_tris;
        store.touch();
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Add a node and return its handle.
    pub fn add_node(&self, position: Point3<f64>) -> NodeId {
        let mut store = self.inner.write();
        store.touch();
        let index = store.nodes.len() as u64;
        store.nodes.push(Some(NodeData::at(position)));
        store.live_nodes += 1;
        NodeId {
            mesh: store.id,
            index,
        }
    }

    /// Add a node carrying a normal.
    pub fn add_node_with_normal(&self, position: Point3<f64>, normal: Vector3<f64>) -> NodeId {
        let id = self.add_node(position);
        self.inner.write().node_data_mut(id).normal = Some(normal);
        id
    }

    /// Number of live nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.inner.read().live_nodes
    }

    /// All live nodes, in ascending handle order.
    #[must_use]
    pub fn nodes(&self) -> NodeContainer {
        let store = self.inner.read();
        NodeContainer::scoped(
            store.id,
            store
                .nodes
                .iter()
                .enumerate()
                .filter_map(|(i, n)| n.as_ref().map(|_| store.node_id(i as u64)))
                .collect(),
        )
    }

    /// True if the handle refers to a live node of this mesh.
    #[must_use]
    pub fn contains_node(&self, node: NodeId) -> bool {
        let store = self.inner.read();
        node.mesh == store.id
            && store
                .nodes
                .get(node.index as usize)
                .is_some_and(Option::is_some)
    }

    /// Position of a node.
    ///
    /// # Panics
    ///
    /// Panics if the handle belongs to another mesh or the node no longer
    /// exists.
    #[must_use]
    pub fn position(&self, node: NodeId) -> Point3<f64> {
        self.inner.read().node_data(node).position
    }

    /// Move a node.
    ///
    /// # Panics
    ///
    /// Same contract as [`Mesh::position`].
    pub fn set_position(&self, node: NodeId, position: Point3<f64>) {
        let mut store = self.inner.write();
        store.node_data_mut(node).position = position;
        // Positions do not affect connectivity; only the serialized cache
        // survives, adjacency stays valid.
    }

    /// Stored normal of a node, if any.
    ///
    /// # Panics
    ///
    /// Same contract as [`Mesh::position`].
    #[must_use]
    pub fn normal(&self, node: NodeId) -> Option<Vector3<f64>> {
        self.inner.read().node_data(node).normal
    }

    /// Attach a normal to a node.
    ///
    /// # Panics
    ///
    /// Same contract as [`Mesh::position`].
    pub fn set_normal(&self, node: NodeId, normal: Vector3<f64>) {
        self.inner.write().node_data_mut(node).normal = Some(normal);
    }

    /// Stored UV parameters of a node, if any.
    ///
    /// # Panics
    ///
    /// Same contract as [`Mesh::position`].
    #[must_use]
    pub fn uv(&self, node: NodeId) -> Option<(f64, f64)> {
        self.inner.read().node_data(node).uv
    }

    /// Attach UV parameters to a node.
    ///
    /// # Panics
    ///
    /// Same contract as [`Mesh::position`].
    pub fn set_uv(&self, node: NodeId, uv: (f64, f64)) {
        self.inner.write().node_data_mut(node).uv = Some(uv);
    }

    // ------------------------------------------------------------------
    // Triangles
    // ------------------------------------------------------------------

    /// Add a triangle over three existing nodes.
    ///
    /// Corner order defines the outward normal (counter-clockwise winding).
    ///
    /// # Errors
    ///
    /// [`ModelError::RepeatedCorner`] if two corners name the same node.
    ///
    /// # Panics
    ///
    /// Panics if any node handle belongs to another mesh or is dead.
    pub fn add_triangle(&self, a: NodeId, b: NodeId, c: NodeId) -> ModelResult<TriangleId> {
        let mut store = self.inner.write();
        // Validate all three handles first.
        for node in [a, b, c] {
            let _ = store.node_data(node);
        }
        if a.index == b.index || b.index == c.index || a.index == c.index {
            return Err(ModelError::RepeatedCorner { node: a.index });
        }
        store.touch();
        let index = store.tris.len() as u64;
        store.tris.push(Some([a.index, b.index, c.index]));
        store.live_tris += 1;
        Ok(TriangleId {
            mesh: store.id,
            index,
        })
    }

    /// Remove a triangle. Its nodes stay, possibly unreferenced.
    ///
    /// # Panics
    ///
    /// Panics if the handle belongs to another mesh or is dead.
    pub fn remove_triangle(&self, tri: TriangleId) {
        let mut store = self.inner.write();
        let _ = store.tri_corners(tri);
        store.touch();
        store.tris[tri.index as usize] = None;
        store.live_tris -= 1;
    }

    /// Reverse a triangle's winding in place.
    ///
    /// # Panics
    ///
    /// Panics if the handle belongs to another mesh or is dead.
    pub fn flip_triangle(&self, tri: TriangleId) {
        let mut store = self.inner.write();
        let corners = store.tri_corners(tri);
        store.touch();
        store.tris[tri.index as usize] = Some([corners[0], corners[2], corners[1]]);
    }

    /// Number of live triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.inner.read().live_tris
    }

    /// All live triangles, in ascending handle order.
    #[must_use]
    pub fn triangles(&self) -> TriangleContainer {
        let store = self.inner.read();
        TriangleContainer::scoped(
            store.id,
            store
                .tris
                .iter()
                .enumerate()
                .filter_map(|(i, t)| t.as_ref().map(|_| store.tri_id(i as u64)))
                .collect(),
        )
    }

    /// True if the handle refers to a live triangle of this mesh.
    #[must_use]
    pub fn contains_triangle(&self, tri: TriangleId) -> bool {
        let store = self.inner.read();
        tri.mesh == store.id
            && store
                .tris
                .get(tri.index as usize)
                .is_some_and(Option::is_some)
    }

    /// The three corner nodes of a triangle, in winding order.
    ///
    /// # Panics
    ///
    /// Panics if the handle belongs to another mesh or is dead.
    #[must_use]
    pub fn triangle_nodes(&self, tri: TriangleId) -> [NodeId; 3] {
        let store = self.inner.read();
        let corners = store.tri_corners(tri);
        [
            store.node_id(corners[0]),
            store.node_id(corners[1]),
            store.node_id(corners[2]),
        ]
    }

    /// Concrete geometry of a triangle.
    ///
    /// # Panics
    ///
    /// Panics if the handle belongs to another mesh or is dead.
    #[must_use]
    pub fn triangle_geometry(&self, tri: TriangleId) -> Triangle {
        let store = self.inner.read();
        let corners = store.tri_corners(tri);
        store.tri_geometry(corners)
    }

    /// Merge nodes according to `remap` (source -> surviving target).
    ///
    /// Every triangle corner referencing a source node is retargeted;
    /// triangles collapsing to fewer than three distinct corners are
    /// dropped; source nodes are removed. Returns the number of dropped
    /// triangles.
    ///
    /// # Panics
    ///
    /// Panics if any handle belongs to another mesh, or a source maps to a
    /// dead target.
    pub fn weld(&self, remap: &HashMap<NodeId, NodeId>) -> usize {
        if remap.is_empty() {
            return 0;
        }

        let mut store = self.inner.write();
        let mut index_map: HashMap<u64, u64> = HashMap::with_capacity(remap.len());
        for (&from, &to) in remap {
            let _ = store.node_data(from);
            let _ = store.node_data(to);
            index_map.insert(from.index, to.index);
        }

        store.touch();
        let mut dropped = 0;
        for slot in store.tris.iter_mut() {
            let Some(corners) = slot else { continue };
            for corner in corners.iter_mut() {
                if let Some(&target) = index_map.get(corner) {
                    *corner = target;
                }
            }
            if corners[0] == corners[1] || corners[1] == corners[2] || corners[0] == corners[2] {
                *slot = None;
                dropped += 1;
            }
        }
        store.live_tris -= dropped;

        let mut removed_nodes = 0;
        for &from in index_map.keys() {
            if store.nodes[from as usize].take().is_some() {
                removed_nodes += 1;
            }
        }
        store.live_nodes -= removed_nodes;

        debug!(
            merged = removed_nodes,
            dropped_triangles = dropped,
            "welded nodes"
        );
        dropped
    }

    /// Remove nodes no live triangle references. Returns how many were
    /// removed.
    pub fn drop_unreferenced_nodes(&self) -> usize {
        let mut store = self.inner.write();
        let mut referenced = vec![false; store.nodes.len()];
        for (_, corners) in store.live_triangles() {
            for &c in corners {
                referenced[c as usize] = true;
            }
        }

        let mut removed = 0;
        for (index, slot) in store.nodes.iter_mut().enumerate() {
            if slot.is_some() && !referenced[index] {
                *slot = None;
                removed += 1;
            }
        }
        if removed > 0 {
            store.live_nodes -= removed;
            store.touch();
        }
        removed
    }

    // ------------------------------------------------------------------
    // Adjacency queries
    // ------------------------------------------------------------------

    /// Nodes connected to `node` by a bar, ascending; no self-loops.
    ///
    /// # Panics
    ///
    /// Panics if the handle belongs to another mesh or is dead.
    #[must_use]
    pub fn node_neighbors(&self, node: NodeId) -> NodeContainer {
        self.with_adjacency(|store, adj| {
            let _ = store.node_data(node);
            NodeContainer::scoped(
                store.id,
                adj.neighbors_of(node.index)
                    .iter()
                    .map(|&i| store.node_id(i))
                    .collect(),
            )
        })
    }

    /// Triangles sharing a bar with `tri`.
    ///
    /// Across a non-manifold bar *all* incident triangles are returned, not
    /// just one counterpart; callers needing a manifold fan filter by
    /// [`Mesh::bar_degree`].
    ///
    /// # Panics
    ///
    /// Panics if the handle belongs to another mesh or is dead.
    #[must_use]
    pub fn triangle_neighbors(&self, tri: TriangleId) -> TriangleContainer {
        self.with_adjacency(|store, adj| {
            let corners = store.tri_corners(tri);
            let mut out: Vec<TriangleId> = Vec::new();
            for i in 0..3 {
                let a = corners[i];
                let b = corners[(i + 1) % 3];
                let key = if a < b { (a, b) } else { (b, a) };
                for &other in adj.triangles_of(key) {
                    if other != tri.index && !out.iter().any(|t| t.index == other) {
                        out.push(store.tri_id(other));
                    }
                }
            }
            out.sort_unstable();
            TriangleContainer::scoped(store.id, out)
        })
    }

    /// All bars of the mesh, in ascending canonical order.
    #[must_use]
    pub fn bars(&self) -> BarContainer {
        self.with_adjacency(|store, adj| {
            let mut keys: Vec<(u64, u64)> = adj.bar_keys().collect();
            keys.sort_unstable();
            BarContainer::scoped(
                store.id,
                keys.into_iter()
                    .map(|(a, b)| Bar::new(store.node_id(a), store.node_id(b)))
                    .collect(),
            )
        })
    }

    /// Number of distinct bars.
    #[must_use]
    pub fn bar_count(&self) -> usize {
        self.with_adjacency(|_, adj| adj.bar_count())
    }

    /// Triangles incident to a bar (possibly more than two).
    ///
    /// # Panics
    ///
    /// Panics if the bar's nodes belong to another mesh.
    #[must_use]
    pub fn bar_triangles(&self, bar: Bar) -> TriangleContainer {
        self.with_adjacency(|store, adj| {
            assert_eq!(
                bar.mesh(),
                store.id,
                "bar from mesh {} queried on mesh {}",
                bar.mesh(),
                store.id
            );
            TriangleContainer::scoped(
                store.id,
                adj.triangles_of(bar.key())
                    .iter()
                    .map(|&i| store.tri_id(i))
                    .collect(),
            )
        })
    }

    /// Number of triangles sharing a bar.
    ///
    /// # Panics
    ///
    /// Panics if the bar's nodes belong to another mesh.
    #[must_use]
    pub fn bar_degree(&self, bar: Bar) -> usize {
        self.with_adjacency(|store, adj| {
            assert_eq!(
                bar.mesh(),
                store.id,
                "bar from mesh {} queried on mesh {}",
                bar.mesh(),
                store.id
            );
            adj.degree(bar.key())
        })
    }

    /// Boundary bars: bars with exactly one incident triangle.
    ///
    /// An empty result means the mesh is watertight.
    #[must_use]
    pub fn boundary_bars(&self) -> BarContainer {
        self.with_adjacency(|store, adj| {
            let mut keys: Vec<(u64, u64)> = adj.boundary_keys().collect();
            keys.sort_unstable();
            BarContainer::scoped(
                store.id,
                keys.into_iter()
                    .map(|(a, b)| Bar::new(store.node_id(a), store.node_id(b)))
                    .collect(),
            )
        })
    }

    /// True when every bar has exactly two incident triangles.
    #[must_use]
    pub fn is_watertight(&self) -> bool {
        self.with_adjacency(|_, adj| adj.is_watertight())
    }

    /// Boundary loops: closed node cycles traced along boundary bars.
    ///
    /// Each loop is an ordered container of the nodes around one hole.
    /// Boundary chains that cannot be closed (dangling boundary topology,
    /// typically alongside non-manifold defects) are skipped with a log
    /// message rather than reported as loops.
    #[must_use]
    pub fn boundary_loops(&self) -> Vec<NodeContainer> {
        self.with_adjacency(|store, adj| {
            let mut neighbors: HashMap<u64, Vec<u64>> = HashMap::new();
            for (a, b) in adj.boundary_keys() {
                neighbors.entry(a).or_default().push(b);
                neighbors.entry(b).or_default().push(a);
            }

            let mut visited: hashbrown::HashSet<u64> = hashbrown::HashSet::new();
            let mut loops = Vec::new();

            let mut starts: Vec<u64> = neighbors.keys().copied().collect();
            starts.sort_unstable();

            for start in starts {
                if visited.contains(&start) {
                    continue;
                }

                let mut cycle = vec![start];
                visited.insert(start);
                let mut prev: Option<u64> = None;
                let mut current = start;
                let mut closed = false;

                loop {
                    let Some(candidates) = neighbors.get(&current) else {
                        break;
                    };
                    let next = candidates
                        .iter()
                        .find(|&&n| Some(n) != prev && !visited.contains(&n))
                        .copied()
                        .or_else(|| {
                            // Allow closing back to the start once the walk
                            // is long enough to form a cycle.
                            candidates
                                .iter()
                                .find(|&&n| n == start && cycle.len() > 2)
                                .copied()
                        });

                    match next {
                        Some(n) if n == start => {
                            closed = true;
                            break;
                        }
                        Some(n) => {
                            visited.insert(n);
                            cycle.push(n);
                            prev = Some(current);
                            current = n;
                        }
                        None => break,
                    }
                }

                if closed && cycle.len() >= 3 {
                    loops.push(NodeContainer::scoped(
                        store.id,
                        cycle.into_iter().map(|i| store.node_id(i)).collect(),
                    ));
                } else if cycle.len() > 1 {
                    debug!(start, len = cycle.len(), "open boundary chain skipped");
                }
            }

            loops
        })
    }

    // ------------------------------------------------------------------
    // Geometry
    // ------------------------------------------------------------------

    /// Axis-aligned bounding box of all live nodes.
    #[must_use]
    pub fn bounding_box(&self) -> Aabb {
        let store = self.inner.read();
        let mut aabb = Aabb::empty();
        for data in store.nodes.iter().flatten() {
            aabb.expand_point(&data.position);
        }
        aabb
    }

    /// Total surface area: the sum of triangle areas.
    #[must_use]
    pub fn area(&self) -> f64 {
        let store = self.inner.read();
        store
            .live_triangles()
            .map(|(_, &corners)| store.tri_geometry(corners).area())
            .sum()
    }

    /// Signed volume by the divergence theorem.
    ///
    /// Positive for consistently outward-wound closed meshes; only
    /// meaningful when the mesh is (nearly) closed.
    #[must_use]
    pub fn signed_volume(&self) -> f64 {
        let store = self.inner.read();
        let mut volume = 0.0;
        for (_, &corners) in store.live_triangles() {
            let t = store.tri_geometry(corners);
            volume += t.v0.coords.dot(&t.v1.coords.cross(&t.v2.coords));
        }
        volume / 6.0
    }

    // ------------------------------------------------------------------
    // Serialized-index mapping
    // ------------------------------------------------------------------

    /// Contiguous 0-based export index of a node.
    ///
    /// The mapping is computed lazily, cached, and invalidated by any
    /// mutation; while the mesh is unchanged,
    /// `node_at_serialized(serialized_node_index(n)) == Some(n)`.
    ///
    /// # Panics
    ///
    /// Panics if the handle belongs to another mesh or is dead.
    #[must_use]
    pub fn serialized_node_index(&self, node: NodeId) -> usize {
        self.with_serial(|store, serial| {
            let _ = store.node_data(node);
            match serial.node_rank.get(&node.index) {
                Some(&rank) => rank,
                None => unreachable!("live node missing from serialized map"),
            }
        })
    }

    /// Node at a serialized index, or `None` when out of range.
    #[must_use]
    pub fn node_at_serialized(&self, index: usize) -> Option<NodeId> {
        self.with_serial(|store, serial| serial.nodes.get(index).map(|&i| store.node_id(i)))
    }

    /// Contiguous 0-based export index of a triangle.
    ///
    /// # Panics
    ///
    /// Panics if the handle belongs to another mesh or is dead.
    #[must_use]
    pub fn serialized_triangle_index(&self, tri: TriangleId) -> usize {
        self.with_serial(|store, serial| {
            let _ = store.tri_corners(tri);
            match serial.tri_rank.get(&tri.index) {
                Some(&rank) => rank,
                None => unreachable!("live triangle missing from serialized map"),
            }
        })
    }

    /// Triangle at a serialized index, or `None` when out of range.
    #[must_use]
    pub fn triangle_at_serialized(&self, index: usize) -> Option<TriangleId> {
        self.with_serial(|store, serial| serial.tris.get(index).map(|&i| store.tri_id(i)))
    }

    /// Build export buffers for the current mesh contents.
    #[must_use]
    pub fn serializer(&self) -> MeshSerializer {
        self.with_serial(|store, serial| {
            let mut positions = Vec::with_capacity(serial.nodes.len() * 3);
            let mut normals = Vec::with_capacity(serial.nodes.len() * 3);
            let mut uvs = Vec::with_capacity(serial.nodes.len() * 2);
            let mut all_normals = true;
            let mut all_uvs = true;

            for &index in &serial.nodes {
                let Some(data) = store.nodes[index as usize].as_ref() else {
                    unreachable!("serialized map references dead node");
                };
                positions.extend_from_slice(&[data.position.x, data.position.y, data.position.z]);
                match data.normal {
                    Some(n) if all_normals => normals.extend_from_slice(&[n.x, n.y, n.z]),
                    _ => all_normals = false,
                }
                match data.uv {
                    Some((u, v)) if all_uvs => uvs.extend_from_slice(&[u, v]),
                    _ => all_uvs = false,
                }
            }
            if !all_normals {
                normals.clear();
            }
            if !all_uvs {
                uvs.clear();
            }

            let mut indices = Vec::with_capacity(serial.tris.len() * 3);
            for &tri_index in &serial.tris {
                let Some(corners) = store.tris[tri_index as usize].as_ref() else {
                    unreachable!("serialized map references dead triangle");
                };
                for &corner in corners {
                    match serial.node_rank.get(&corner) {
                        Some(&rank) => indices.push(rank as u32),
                        None => unreachable!("triangle corner missing from serialized map"),
                    }
                }
            }

            MeshSerializer::from_buffers(positions, normals, uvs, indices)
        })
    }

    // ------------------------------------------------------------------
    // Lock plumbing
    // ------------------------------------------------------------------

    fn with_adjacency<R>(&self, f: impl FnOnce(&Store, &BarAdjacency) -> R) -> R {
        let mut store = self.inner.write();
        store.ensure_adjacency();
        match store.adjacency.take() {
            Some(adj) => {
                let result = f(&store, &adj);
                store.adjacency = Some(adj);
                result
            }
            None => unreachable!("ensure_adjacency left no cache"),
        }
    }

    fn with_serial<R>(&self, f: impl FnOnce(&Store, &SerialMap) -> R) -> R {
        let mut store = self.inner.write();
        store.ensure_serial();
        match store.serial.take() {
            Some(serial) => {
                let result = f(&store, &serial);
                store.serial = Some(serial);
                result
            }
            None => unreachable!("ensure_serial left no cache"),
        }
    }
}
