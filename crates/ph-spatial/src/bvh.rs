//! Flat bounding volume hierarchy.

use smallvec::SmallVec;

use crate::bounds::Aabb;

const LEAF_SIZE: usize = 8;

#[derive(Debug, Clone)]
enum NodeKind {
    Leaf { start: usize, count: usize },
    Internal { left: usize, right: usize },
}

#[derive(Debug, Clone)]
struct Node {
    aabb: Aabb,
    kind: NodeKind,
}

/// A bounding volume hierarchy over a fixed set of item AABBs.
///
/// Built once by median-splitting item centroids along the longest axis;
/// answers box-overlap queries in `O(log n + k)` instead of scanning every
/// item. Item indices refer to the slice the tree was built from.
///
/// # Example
///
/// ```
/// use ph_spatial::{Aabb, Bvh};
/// use nalgebra::Point3;
///
/// let boxes = vec![
///     Aabb::new(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)),
///     Aabb::new(Point3::new(5.0, 0.0, 0.0), Point3::new(6.0, 1.0, 1.0)),
/// ];
/// let bvh = Bvh::build(&boxes);
///
/// let probe = Aabb::new(Point3::new(0.5, 0.5, 0.5), Point3::new(0.6, 0.6, 0.6));
/// assert_eq!(bvh.query(&probe, 0.0), vec![0]);
/// ```
#[derive(Debug, Clone)]
pub struct Bvh {
    nodes: Vec<Node>,
    items: Vec<usize>,
    boxes: Vec<Aabb>,
    root: Option<usize>,
}

impl Bvh {
    /// Build a hierarchy over the given boxes.
    ///
    /// An empty slice yields a tree whose queries return nothing.
    #[must_use]
    pub fn build(boxes: &[Aabb]) -> Self {
        let mut bvh = Self {
            nodes: Vec::new(),
            items: (0..boxes.len()).collect(),
            boxes: boxes.to_vec(),
            root: None,
        };

        if !boxes.is_empty() {
            let count = bvh.items.len();
            bvh.root = Some(bvh.build_node(0, count));
        }

        bvh
    }

    /// Number of items the tree was built over.
    #[must_use]
    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    /// True if the tree holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// All item indices whose box intersects `probe` within `tolerance`.
    #[must_use]
    pub fn query(&self, probe: &Aabb, tolerance: f64) -> Vec<usize> {
        let mut hits = Vec::new();
        let Some(root) = self.root else {
            return hits;
        };

        let mut stack: SmallVec<[usize; 32]> = SmallVec::new();
        stack.push(root);

        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx];
            if !node.aabb.intersects(probe, tolerance) {
                continue;
            }
            match node.kind {
                NodeKind::Leaf { start, count } => {
                    for &item in &self.items[start..start + count] {
                        if self.boxes[item].intersects(probe, tolerance) {
                            hits.push(item);
                        }
                    }
                }
                NodeKind::Internal { left, right } => {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }

        hits
    }

    /// All unordered pairs `(i, j)` with `i < j` whose boxes intersect
    /// within `tolerance`.
    #[must_use]
    pub fn self_overlapping_pairs(&self, tolerance: f64) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for i in 0..self.boxes.len() {
            for j in self.query(&self.boxes[i], tolerance) {
                if j > i {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }

    fn build_node(&mut self, start: usize, count: usize) -> usize {
        let mut aabb = Aabb::empty();
        for &item in &self.items[start..start + count] {
            aabb.union(&self.boxes[item]);
        }

        if count <= LEAF_SIZE {
            self.nodes.push(Node {
                aabb,
                kind: NodeKind::Leaf { start, count },
            });
            return self.nodes.len() - 1;
        }

        let axis = aabb.longest_axis();
        let mid = count / 2;
        let boxes = &self.boxes;
        self.items[start..start + count].select_nth_unstable_by(mid, |&a, &b| {
            let ca = boxes[a].center()[axis];
            let cb = boxes[b].center()[axis];
            ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
        });

        let left = self.build_node(start, mid);
        let right = self.build_node(start + mid, count - mid);

        self.nodes.push(Node {
            aabb,
            kind: NodeKind::Internal { left, right },
        });
        self.nodes.len() - 1
    }
}
