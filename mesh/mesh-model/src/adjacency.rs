//! Bar adjacency derived from triangle connectivity.

use hashbrown::HashMap;
use smallvec::SmallVec;

/// Adjacency between bars, triangles, and nodes.
///
/// Built lazily by the store from live triangles and invalidated on any
/// mutation. Keys are canonical `(low, high)` node-index pairs.
#[derive(Debug, Clone, Default)]
pub(crate) struct BarAdjacency {
    /// Bar -> incident triangle indices. Manifold bars have 2.
    bar_tris: HashMap<(u64, u64), SmallVec<[u64; 2]>>,
    /// Node -> neighboring node indices (via some bar), ascending.
    node_neighbors: HashMap<u64, SmallVec<[u64; 8]>>,
}

impl BarAdjacency {
    /// Build adjacency from a slot array of triangles.
    pub(crate) fn build<'a, I>(triangles: I) -> Self
    where
        I: Iterator<Item = (u64, &'a [u64; 3])>,
    {
        let mut bar_tris: HashMap<(u64, u64), SmallVec<[u64; 2]>> = HashMap::new();
        let mut node_neighbors: HashMap<u64, SmallVec<[u64; 8]>> = HashMap::new();

        for (tri_index, corners) in triangles {
            for i in 0..3 {
                let a = corners[i];
                let b = corners[(i + 1) % 3];
                let key = if a < b { (a, b) } else { (b, a) };
                bar_tris.entry(key).or_default().push(tri_index);

                let na = node_neighbors.entry(a).or_default();
                if !na.contains(&b) {
                    na.push(b);
                }
                let nb = node_neighbors.entry(b).or_default();
                if !nb.contains(&a) {
                    nb.push(a);
                }
            }
        }

        for neighbors in node_neighbors.values_mut() {
            neighbors.sort_unstable();
        }

        Self {
            bar_tris,
            node_neighbors,
        }
    }

    /// Triangle indices incident to a bar key; empty if the bar is unknown.
    pub(crate) fn triangles_of(&self, key: (u64, u64)) -> &[u64] {
        self.bar_tris.get(&key).map_or(&[], |v| v.as_slice())
    }

    /// Number of triangles sharing the bar.
    pub(crate) fn degree(&self, key: (u64, u64)) -> usize {
        self.triangles_of(key).len()
    }

    /// Neighboring node indices of a node, ascending.
    pub(crate) fn neighbors_of(&self, node: u64) -> &[u64] {
        self.node_neighbors.get(&node).map_or(&[], |v| v.as_slice())
    }

    /// All bar keys, in unspecified order.
    pub(crate) fn bar_keys(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.bar_tris.keys().copied()
    }

    /// Bar keys with exactly one incident triangle.
    pub(crate) fn boundary_keys(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.bar_tris
            .iter()
            .filter(|(_, tris)| tris.len() == 1)
            .map(|(&key, _)| key)
    }

    /// Bar keys with three or more incident triangles.
    pub(crate) fn non_manifold_keys(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.bar_tris
            .iter()
            .filter(|(_, tris)| tris.len() > 2)
            .map(|(&key, _)| key)
    }

    /// Total number of distinct bars.
    pub(crate) fn bar_count(&self) -> usize {
        self.bar_tris.len()
    }

    /// True when every bar has exactly two incident triangles.
    pub(crate) fn is_watertight(&self) -> bool {
        self.bar_tris.values().all(|tris| tris.len() == 2)
    }
}
