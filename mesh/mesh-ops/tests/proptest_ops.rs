//! Property-based tests for the operator layer.
//!
//! Random geometry in, invariants out: whatever the input, the store
//! stays consistent and the documented operator guarantees hold.

use mesh_model::Mesh;
use mesh_ops::{Part, RemoveDuplicateNodes, Separate};
use proptest::prelude::*;

/// Random positions in a bounded box, as a flat buffer.
fn arb_positions(max_points: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(-10.0..10.0f64, 9..=max_points * 3).prop_map(|mut v| {
        v.truncate(v.len() - v.len() % 3);
        v
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Import accepts exactly the documented inputs, and an accepted mesh
    /// always has consistent counts and a valid serialized bijection.
    #[test]
    fn import_is_consistent(positions in arb_positions(24)) {
        let node_count = positions.len() / 3;
        let connectivity: Vec<u32> = (0..node_count as u32 - node_count as u32 % 3).collect();

        let mesh = Mesh::from_raw(&positions, &connectivity).unwrap();
        prop_assert_eq!(mesh.node_count(), node_count);
        prop_assert_eq!(mesh.triangle_count(), connectivity.len() / 3);

        for node in mesh.nodes().iter() {
            let rank = mesh.serialized_node_index(node);
            prop_assert_eq!(mesh.node_at_serialized(rank), Some(node));
        }
    }

    /// After duplicate removal with tolerance `t`, no two surviving nodes
    /// lie within `t` of each other.
    #[test]
    fn dedup_enforces_min_spacing(
        positions in arb_positions(20),
        tolerance in 0.05..1.0f64,
    ) {
        let node_count = positions.len() / 3;
        let connectivity: Vec<u32> = (0..node_count as u32 - node_count as u32 % 3).collect();

        let mut part = Part::new();
        part.import(&positions, &connectivity).unwrap();
        let mesh = part.meshes().get(0).unwrap();

        let mut op = RemoveDuplicateNodes::new(mesh.clone(), tolerance);
        part.modify_using(&mut op).unwrap();

        let survivors: Vec<_> = mesh.nodes().iter().collect();
        for (i, &a) in survivors.iter().enumerate() {
            for &b in survivors.iter().skip(i + 1) {
                let d = (mesh.position(a) - mesh.position(b)).norm();
                prop_assert!(d > tolerance);
            }
        }

        // Every surviving triangle still references live nodes.
        for tri in mesh.triangles().iter() {
            for node in mesh.triangle_nodes(tri) {
                prop_assert!(mesh.contains_node(node));
            }
        }
    }

    /// Separation conserves triangle count and total area.
    #[test]
    fn separate_conserves_geometry(
        positions in arb_positions(16),
        seed in any::<u64>(),
    ) {
        let node_count = positions.len() / 3;
        prop_assume!(node_count >= 3);

        // Deterministic pseudo-random connectivity from the seed.
        let mut state = seed | 1;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 33) as u32
        };
        let mut connectivity = Vec::new();
        for _ in 0..node_count {
            let (a, b, c) = (
                next() % node_count as u32,
                next() % node_count as u32,
                next() % node_count as u32,
            );
            if a != b && b != c && a != c {
                connectivity.extend_from_slice(&[a, b, c]);
            }
        }
        prop_assume!(!connectivity.is_empty());

        let mut part = Part::new();
        part.import(&positions, &connectivity).unwrap();
        let mesh = part.meshes().get(0).unwrap();
        let (triangles_before, area_before) = (mesh.triangle_count(), mesh.area());

        let result = part.modify_using(&mut Separate::new(mesh)).unwrap();

        let triangles_after: usize = (0..result.len())
            .map(|i| result.get(i).unwrap().triangle_count())
            .sum();
        let area_after: f64 = (0..result.len())
            .map(|i| result.get(i).unwrap().area())
            .sum();

        prop_assert_eq!(triangles_after, triangles_before);
        prop_assert!((area_after - area_before).abs() <= 1e-9 * area_before.max(1.0));
    }

    /// Random valid connectivity never breaks the bar-degree accounting:
    /// boundary + interior + non-manifold bars partition the bar set.
    #[test]
    fn bar_classification_partitions(
        positions in arb_positions(12),
    ) {
        let node_count = positions.len() / 3;
        prop_assume!(node_count >= 3);
        let connectivity: Vec<u32> = (0..node_count as u32 - node_count as u32 % 3).collect();

        let mesh = Mesh::from_raw(&positions, &connectivity).unwrap();
        let bars = mesh.bars();
        let boundary = mesh.boundary_bars();

        let mut interior = 0usize;
        let mut non_manifold = 0usize;
        for bar in bars.iter() {
            match mesh.bar_degree(bar) {
                1 => {}
                2 => interior += 1,
                _ => non_manifold += 1,
            }
        }
        prop_assert_eq!(boundary.len() + interior + non_manifold, bars.len());
        // Watertight exactly when no boundary and no non-manifold bars.
        prop_assert_eq!(
            mesh.is_watertight(),
            boundary.is_empty() && non_manifold == 0
        );
    }
}
