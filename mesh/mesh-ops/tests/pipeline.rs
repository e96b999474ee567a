//! End-to-end healing scenarios.

use mesh_check::{check, CheckOptions};
use mesh_model::{Mesh, Point3};
use mesh_ops::{BodyBuilder, Heal, Part, Stitch, TriangleTagMap};

/// A body builder that accepts only watertight meshes.
struct WatertightBuilder {
    built: usize,
}

impl BodyBuilder for WatertightBuilder {
    fn build_body(
        &mut self,
        mesh: &Mesh,
        _tags: Option<&TriangleTagMap>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !mesh.is_watertight() {
            return Err("mesh has open boundaries".into());
        }
        self.built += 1;
        Ok(())
    }
}

/// Open hemisphere: rings from the pole to the equator.
///
/// `sign` mirrors it below the XY plane (with winding flipped to stay
/// outward); `z_offset` shifts the whole shell.
fn hemisphere(rings: usize, segments: usize, sign: f64, z_offset: f64) -> (Vec<f64>, Vec<u32>) {
    let mut positions: Vec<f64> = vec![0.0, 0.0, sign + z_offset]; // pole
    for r in 1..=rings {
        let theta = std::f64::consts::FRAC_PI_2 * r as f64 / rings as f64;
        for s in 0..segments {
            let phi = std::f64::consts::TAU * s as f64 / segments as f64;
            positions.extend_from_slice(&[
                theta.sin() * phi.cos(),
                theta.sin() * phi.sin(),
                sign * theta.cos() + z_offset,
            ]);
        }
    }

    let ring_start = |r: usize| 1 + (r - 1) * segments;
    let mut connectivity: Vec<u32> = Vec::new();
    let mut push_tri = |a: usize, b: usize, c: usize| {
        // Mirrored shells flip winding to keep normals outward.
        if sign > 0.0 {
            connectivity.extend_from_slice(&[a as u32, b as u32, c as u32]);
        } else {
            connectivity.extend_from_slice(&[a as u32, c as u32, b as u32]);
        }
    };

    for s in 0..segments {
        push_tri(0, ring_start(1) + s, ring_start(1) + (s + 1) % segments);
    }
    for r in 1..rings {
        let (upper, lower) = (ring_start(r), ring_start(r + 1));
        for s in 0..segments {
            let next = (s + 1) % segments;
            push_tri(upper + s, lower + s, lower + next);
            push_tri(upper + s, lower + next, upper + next);
        }
    }
    (positions, connectivity)
}

#[test]
fn stitch_two_hemispheres_into_a_sphere() {
    let mut part = Part::new();

    let (top_pos, top_con) = hemisphere(6, 16, 1.0, 0.0);
    part.import(&top_pos, &top_con).unwrap();
    // The lower shell's equator sits 2e-4 above z = 0: inside tolerance.
    let (bottom_pos, bottom_con) = hemisphere(6, 16, -1.0, 2e-4);
    part.import(&bottom_pos, &bottom_con).unwrap();

    let top = part.meshes().get(0).unwrap();
    let bottom = part.meshes().get(1).unwrap();
    assert_eq!(top.boundary_bars().len(), 16);
    assert_eq!(bottom.boundary_bars().len(), 16);
    let bars_before = top.bar_count() + bottom.bar_count();

    let mut stitch = Stitch::new(1e-3);
    stitch.add_mesh(top);
    stitch.add_mesh(bottom);
    let result = part.modify_using(&mut stitch).unwrap();

    assert_eq!(result.len(), 1);
    let sphere = result.get(0).unwrap();

    // Every equator bar pair merged; the result is one watertight shell.
    assert_eq!(stitch.stitched_pairs(), 16);
    assert!(sphere.is_watertight());
    assert_eq!(sphere.bar_count(), bars_before - stitch.stitched_pairs());

    // Roughly a unit sphere.
    let volume = sphere.signed_volume().abs();
    assert!(
        (volume - 4.0 / 3.0 * std::f64::consts::PI).abs() < 0.6,
        "volume {volume}"
    );
}

#[test]
fn import_check_heal_build_bodies() {
    // The full workflow: dirty import, check finds defects, heal fixes
    // them, bodies build and drain the part.
    let positions = [
        0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0,
        1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0 + 1e-7, 1.0, 1.0,
    ];
    let connectivity = [
        0, 2, 1, 0, 3, 2, 4, 5, 8, 4, 6, 7, 0, 1, 5, 0, 5, 4, 1, 6, 5, 2, 3, 7, 2, 7, 6, 3, 0,
        4, 3, 4, 7,
    ];

    let mut part = Part::new();
    part.set_number_of_threads(2);
    part.import(&positions, &connectivity).unwrap();
    let mesh = part.meshes().get(0).unwrap();

    let report = check(&mesh, &CheckOptions::default());
    assert!(!report.is_empty(), "dirty cube must report anomalies");

    let mut heal = Heal::new(mesh);
    part.modify_using(&mut heal).unwrap();
    assert!(heal.failed_meshes().is_empty());

    let healed = part.meshes().get(0).unwrap();
    assert!(healed.is_watertight());
    assert!((healed.area() - 6.0).abs() < 1e-6);
    assert!(check(&healed, &CheckOptions::default()).is_empty());

    let mut builder = WatertightBuilder { built: 0 };
    let built = part.create_all_bodies(&mut builder, None).unwrap();
    assert_eq!(built, 1);
    assert!(part.meshes().is_empty());
}

#[test]
fn state_snapshot_survives_a_destructive_heal() {
    let positions = [
        0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 5.0, 0.0, 0.0, 6.0, 0.0, 0.0, 5.0, 1.0,
        0.0,
    ];
    let connectivity = [0, 1, 2, 3, 4, 5];

    let mut part = Part::new();
    part.import(&positions, &connectivity).unwrap();
    let original = part.meshes().get(0).unwrap();
    let state = part.note_state();

    // Heal separates the two islands and (with the voxel fallback off)
    // leaves two open sheets behind.
    let mut heal = Heal::new(original.clone());
    heal.set_close_mesh(false);
    heal.set_use_voxel_fallback(false);
    part.modify_using(&mut heal).unwrap();
    assert_eq!(part.meshes().len(), 2);

    part.change_state(state).unwrap();
    assert_eq!(part.meshes().len(), 1);
    let restored = part.meshes().get(0).unwrap();
    assert!(restored.same_store(&original));
    assert_eq!(restored.triangle_count(), 2);
}

#[test]
fn serialization_of_a_stitched_sphere() {
    let mut part = Part::new();
    let (top_pos, top_con) = hemisphere(4, 12, 1.0, 0.0);
    part.import(&top_pos, &top_con).unwrap();
    let (bottom_pos, bottom_con) = hemisphere(4, 12, -1.0, 0.0);
    part.import(&bottom_pos, &bottom_con).unwrap();

    let mut stitch = Stitch::new(1e-6);
    stitch.add_mesh(part.meshes().get(0).unwrap());
    stitch.add_mesh(part.meshes().get(1).unwrap());
    let result = part.modify_using(&mut stitch).unwrap();
    let sphere = result.get(0).unwrap();

    // Round trip between handles and serialized indices.
    for node in sphere.nodes().iter() {
        let index = sphere.serialized_node_index(node);
        assert_eq!(sphere.node_at_serialized(index), Some(node));
    }

    let ser = sphere.serializer();
    assert_eq!(ser.node_count(), sphere.node_count());
    assert_eq!(ser.triangle_count(), sphere.triangle_count());

    // Prefixed index stream carries the literal 3 per triangle.
    let prefixed = ser.indices(true);
    assert_eq!(prefixed.len(), ser.triangle_count() * 4);
    assert!(prefixed.chunks_exact(4).all(|chunk| chunk[0] == 3));

    // All indices reference exported nodes.
    let flat = ser.indices(false);
    assert!(flat.iter().all(|&i| (i as usize) < ser.node_count()));

    // Sample a node position against the export buffer.
    let node = sphere.nodes().get(0).unwrap();
    let rank = sphere.serialized_node_index(node);
    let p = sphere.position(node);
    let buf = ser.positions_f64();
    assert_eq!(Point3::new(buf[rank * 3], buf[rank * 3 + 1], buf[rank * 3 + 2]), p);
}
