//! Property-based tests for the mesh store.

use mesh_model::{Bar, Mesh};
use nalgebra::Point3;
use proptest::prelude::*;

fn arb_positions() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-100.0..100.0f64, 9..60).prop_map(|mut v| {
        v.truncate(v.len() - v.len() % 3);
        v
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Bars compare equal regardless of construction order and order
    /// totally by node index.
    #[test]
    fn bar_symmetry(indices in prop::collection::vec(0..32u64, 2..12)) {
        let mesh = Mesh::new();
        let nodes: Vec<_> = (0..32)
            .map(|i| mesh.add_node(Point3::new(i as f64, 0.0, 0.0)))
            .collect();

        for pair in indices.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if a == b {
                continue;
            }
            let forward = Bar::new(nodes[a as usize], nodes[b as usize]);
            let backward = Bar::new(nodes[b as usize], nodes[a as usize]);
            prop_assert_eq!(forward, backward);
            prop_assert!(forward.nodes()[0].id() < forward.nodes()[1].id());
        }
    }

    /// The serialized bijection survives arbitrary triangle removal.
    #[test]
    fn serialized_bijection_after_removal(
        positions in arb_positions(),
        removals in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
    ) {
        let node_count = positions.len() / 3;
        let connectivity: Vec<u32> = (0..node_count as u32 - node_count as u32 % 3).collect();
        let mesh = Mesh::from_raw(&positions, &connectivity).unwrap();

        for removal in removals {
            let triangles = mesh.triangles();
            if triangles.is_empty() {
                break;
            }
            let victim = triangles.get(removal.index(triangles.len())).unwrap();
            mesh.remove_triangle(victim);
        }

        for node in mesh.nodes().iter() {
            let rank = mesh.serialized_node_index(node);
            prop_assert_eq!(mesh.node_at_serialized(rank), Some(node));
        }
        for tri in mesh.triangles().iter() {
            let rank = mesh.serialized_triangle_index(tri);
            prop_assert_eq!(mesh.triangle_at_serialized(rank), Some(tri));
        }
    }

    /// Container slices keep order and scope.
    #[test]
    fn container_slicing(count in 3usize..40, start in 0usize..10, len in 0usize..10) {
        let mesh = Mesh::new();
        let mut container = mesh_model::NodeContainer::new();
        let nodes: Vec<_> = (0..count)
            .map(|i| mesh.add_node(Point3::new(i as f64, 0.0, 0.0)))
            .collect();
        for &n in &nodes {
            container.push(n).unwrap();
        }

        let start = start.min(count);
        let end = (start + len).min(count);
        let slice = container.slice(start..end);

        prop_assert_eq!(slice.len(), end - start);
        for (i, node) in slice.iter().enumerate() {
            prop_assert_eq!(node, nodes[start + i]);
        }
        if !slice.is_empty() {
            prop_assert_eq!(slice.mesh(), Some(mesh.id()));
        }
    }
}
