//! The escalating-repair orchestrator.

use mesh_check::{check, AnomalyCode, AnomalyContainer, CheckOptions, Severity};
use mesh_model::{Mesh, MeshContainer, MeshId};
use mesh_voxel::{voxel_remesh, SignedField, VoxelRemeshParams};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::dedup::dedup_core;
use crate::error::{OpsError, OpsResult};
use crate::holes::{FillOptions, HoleCost, SmoothingWeights};
use crate::operator::{MeshOperator, Transaction};
use crate::orientation::orient_core;
use crate::separate::split_components;
use crate::slivers::remove_intersections_core;

/// Heal a dirty mesh into watertight, manifold, intersection-free shells.
///
/// The input is first separated into connected components; each component
/// then runs the direct pipeline independently (and in parallel, honoring
/// the part's thread budget):
///
/// 1. duplicate-node welding and zero-area triangle removal
/// 2. orientation propagation
/// 3. intersecting-sliver removal (skippable via
///    [`Heal::set_do_remove_intersections`])
/// 4. hole closing (default on, [`Heal::set_close_mesh`])
///
/// A component failing verification after the direct pipeline is retried
/// from scratch through voxel remeshing (default on,
/// [`Heal::set_use_voxel_fallback`]) at the configured level of detail.
/// Components that still fail are collected: [`Heal::failed_meshes`]
/// returns them, and [`Heal::failed_mesh_anomalies`] returns the
/// memoized check report for one of them. Failure is isolated per
/// component — one hopeless shell never blocks its siblings.
#[derive(Debug)]
pub struct Heal {
    mesh: Mesh,
    close_mesh: bool,
    do_remove_intersections: bool,
    use_voxel_fallback: bool,
    fallback_lod: u32,
    min_shell_volume_fraction: f64,
    snap_tolerance: f64,
    threads: usize,
    executed: bool,
    failed: MeshContainer,
    failed_anomalies: Vec<(MeshId, AnomalyContainer)>,
}

impl Heal {
    /// Create the orchestrator with default policy: close into a solid,
    /// remove intersections, voxel fallback enabled.
    #[must_use]
    pub fn new(mesh: Mesh) -> Self {
        Self {
            mesh,
            close_mesh: true,
            do_remove_intersections: true,
            use_voxel_fallback: true,
            fallback_lod: 6,
            min_shell_volume_fraction: 0.0,
            snap_tolerance: 1e-6,
            threads: 0,
            executed: false,
            failed: MeshContainer::new(),
            failed_anomalies: Vec::new(),
        }
    }

    /// Whether to fill remaining holes into a closed solid (default true).
    pub fn set_close_mesh(&mut self, close: bool) {
        self.close_mesh = close;
    }

    /// Whether to run intersecting-sliver removal (default true). Skipping
    /// it trades correctness guarantees for speed.
    pub fn set_do_remove_intersections(&mut self, enabled: bool) {
        self.do_remove_intersections = enabled;
    }

    /// Whether a failed component is retried through voxel remeshing
    /// (default true).
    pub fn set_use_voxel_fallback(&mut self, enabled: bool) {
        self.use_voxel_fallback = enabled;
    }

    /// Level of detail for the voxel fallback (default 6).
    pub fn set_fallback_level_of_detail(&mut self, lod: u32) {
        self.fallback_lod = lod;
    }

    /// Drop closed shells fully contained in a sibling shell whose volume
    /// is below this fraction of the container's (default 0: keep all).
    pub fn set_min_shell_volume_fraction(&mut self, fraction: f64) {
        self.min_shell_volume_fraction = fraction;
    }

    /// Snap tolerance for the duplicate-node pass (default 1e-6).
    pub fn set_snap_tolerance(&mut self, tolerance: f64) {
        self.snap_tolerance = tolerance;
    }

    /// Components that could not be healed; valid after execution.
    #[must_use]
    pub fn failed_meshes(&self) -> &MeshContainer {
        &self.failed
    }

    /// The check report memoized for a failed component.
    ///
    /// Asking about a mesh that is not one of the failed components
    /// returns an empty container, not an error.
    #[must_use]
    pub fn failed_mesh_anomalies(&self, mesh: &Mesh) -> AnomalyContainer {
        self.failed_anomalies
            .iter()
            .find(|(id, _)| *id == mesh.id())
            .map(|(_, report)| report.clone())
            .unwrap_or_default()
    }
}

impl MeshOperator for Heal {
    fn name(&self) -> &'static str {
        "heal"
    }

    fn set_thread_budget(&mut self, threads: usize) {
        self.threads = threads;
    }

    fn apply(&mut self, tx: &mut Transaction<'_>) -> OpsResult<()> {
        if self.executed {
            return Err(OpsError::AlreadyExecuted);
        }
        self.executed = true;
        tx.require(&self.mesh)?;

        let components = split_components(&self.mesh);
        info!(
            components = components.len(),
            "healing mesh {}",
            self.mesh.id()
        );

        let config = ComponentConfig {
            close_mesh: self.close_mesh,
            do_remove_intersections: self.do_remove_intersections,
            use_voxel_fallback: self.use_voxel_fallback,
            fallback_lod: self.fallback_lod,
            snap_tolerance: self.snap_tolerance,
        };

        // Components share no state once split; heal them in parallel and
        // collect into pre-assigned slots so the output order stays the
        // component discovery order regardless of worker count.
        let heal_all = || -> Vec<ComponentOutcome> {
            components
                .par_iter()
                .map(|component| heal_component(component, &config))
                .collect()
        };
        let outcomes = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
        {
            Ok(pool) => pool.install(heal_all),
            Err(_) => heal_all(),
        };

        let mut healed: Vec<Mesh> = Vec::new();
        for outcome in outcomes {
            match outcome {
                ComponentOutcome::Healed(mesh) => healed.push(mesh),
                ComponentOutcome::Failed(mesh, report) => {
                    warn!(
                        mesh = mesh.id().value(),
                        anomalies = report.len(),
                        "component failed to heal"
                    );
                    self.failed_anomalies.push((mesh.id(), report));
                    self.failed.push(mesh);
                }
            }
        }

        if self.min_shell_volume_fraction > 0.0 {
            healed = drop_enclosed_shells(healed, self.min_shell_volume_fraction);
        }

        tx.remove_mesh(&self.mesh)?;
        for mesh in healed {
            tx.add_mesh(mesh);
        }
        for mesh in self.failed.iter() {
            tx.add_mesh(mesh.clone());
        }

        info!(
            failed = self.failed.len(),
            "heal finished for mesh {}",
            self.mesh.id()
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct ComponentConfig {
    close_mesh: bool,
    do_remove_intersections: bool,
    use_voxel_fallback: bool,
    fallback_lod: u32,
    snap_tolerance: f64,
}

enum ComponentOutcome {
    Healed(Mesh),
    Failed(Mesh, AnomalyContainer),
}

/// The per-component pipeline with its voxel side-exit.
fn heal_component(component: &Mesh, config: &ComponentConfig) -> ComponentOutcome {
    if direct_pipeline(component, config) {
        return ComponentOutcome::Healed(component.clone());
    }

    if config.use_voxel_fallback {
        debug!(
            mesh = component.id().value(),
            "direct pipeline stalled, trying voxel fallback"
        );
        let params = VoxelRemeshParams::default().with_level_of_detail(config.fallback_lod);
        if let Ok(output) = voxel_remesh(component, &params) {
            let rebuilt = output.mesh;
            orient_core(&rebuilt);
            if config.do_remove_intersections {
                remove_intersections_core(&rebuilt, None, f64::INFINITY);
            }
            if component_verdict(&rebuilt, config.close_mesh).is_none() {
                return ComponentOutcome::Healed(rebuilt);
            }
            // Memoize the fallback's report: it is the closest thing to a
            // diagnosis of why this component is hopeless.
            let report = check(&rebuilt, &verdict_options());
            return ComponentOutcome::Failed(rebuilt, report);
        }
    }

    let report = check(component, &verdict_options());
    ComponentOutcome::Failed(component.clone(), report)
}

/// Run the direct pipeline; true when the component verifies clean.
fn direct_pipeline(mesh: &Mesh, config: &ComponentConfig) -> bool {
    dedup_core(mesh, config.snap_tolerance);
    drop_zero_area_triangles(mesh);

    let orientation = orient_core(mesh);
    if orientation.non_orientable > 0 {
        return false;
    }

    if config.do_remove_intersections {
        let (_, residual) = remove_intersections_core(mesh, None, f64::INFINITY);
        if residual.iter().any(|a| a.triangles().len() == 2) {
            return false;
        }
    }

    if config.close_mesh {
        let options = FillOptions {
            cost: HoleCost::DihedralThenArea,
            refine: false,
            smooth: Some(SmoothingWeights::EdgeLength),
            ..FillOptions::default()
        };
        crate::holes::fill_all_holes_core(mesh, &options);
    }

    component_verdict(mesh, config.close_mesh).is_none()
}

fn drop_zero_area_triangles(mesh: &Mesh) {
    for tri in mesh.triangles().iter() {
        if mesh.triangle_geometry(tri).area() == 0.0 {
            mesh.remove_triangle(tri);
        }
    }
}

fn verdict_options() -> CheckOptions {
    // Duplicates are welded by the pipeline; re-flagging them would turn
    // every near-coincident but distinct pair into noise.
    CheckOptions::default().with_duplicate_node_tolerance(0.0)
}

/// `None` when the component passes; otherwise the blocking code.
///
/// Errors always block; warnings are auto-correctable and do not, except
/// that an open boundary blocks a component that was asked to close.
fn component_verdict(mesh: &Mesh, require_closed: bool) -> Option<AnomalyCode> {
    let report = check(mesh, &verdict_options());

    for anomaly in report.iter() {
        if anomaly.code() == AnomalyCode::OpenBoundary {
            if require_closed {
                return Some(AnomalyCode::OpenBoundary);
            }
        } else if anomaly.severity() == Severity::Error {
            return Some(anomaly.code());
        }
    }
    None
}

/// Containment policy: drop closed shells entirely inside a sibling when
/// their volume is below `fraction` of the container's.
fn drop_enclosed_shells(shells: Vec<Mesh>, fraction: f64) -> Vec<Mesh> {
    let fields: Vec<Option<SignedField>> =
        shells.iter().map(|m| SignedField::from_mesh(m).ok()).collect();
    let volumes: Vec<f64> = shells.iter().map(|m| m.signed_volume().abs()).collect();

    let mut keep = vec![true; shells.len()];
    for inner in 0..shells.len() {
        let Some(sample) = shells[inner]
            .nodes()
            .get(0)
            .map(|n| shells[inner].position(n))
        else {
            continue;
        };
        for outer in 0..shells.len() {
            if inner == outer || !keep[outer] {
                continue;
            }
            let Some(field) = &fields[outer] else { continue };
            if field.contains(sample) && volumes[inner] < fraction * volumes[outer] {
                debug!(
                    inner = shells[inner].id().value(),
                    outer = shells[outer].id().value(),
                    "dropping enclosed shell"
                );
                keep[inner] = false;
                break;
            }
        }
    }

    shells
        .into_iter()
        .zip(keep)
        .filter_map(|(mesh, kept)| kept.then_some(mesh))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::Part;

    /// The canonical dirty cube: one duplicated corner and one missing
    /// triangle.
    fn dirty_cube_part() -> Part {
        let positions = [
            0.0, 0.0, 0.0, // 0
            1.0, 0.0, 0.0, // 1
            1.0, 1.0, 0.0, // 2
            0.0, 1.0, 0.0, // 3
            0.0, 0.0, 1.0, // 4
            1.0, 0.0, 1.0, // 5
            1.0, 1.0, 1.0, // 6
            0.0, 1.0, 1.0, // 7
            1.0 + 1e-7, 1.0, 1.0, // 8: near-duplicate of 6
        ];
        // Full cube connectivity, with triangle [1, 2, 6] dropped (hole)
        // and one top triangle referencing the duplicate corner 8.
        let connectivity = [
            0, 2, 1, 0, 3, 2, // bottom
            4, 5, 8, 4, 6, 7, // top, first triangle uses the duplicate
            0, 1, 5, 0, 5, 4, // front
            1, 6, 5, // right (one of two; [1, 2, 6] is missing)
            2, 3, 7, 2, 7, 6, // back
            3, 0, 4, 3, 4, 7, // left
        ];

        let mut part = Part::new();
        part.import(&positions, &connectivity).unwrap();
        part
    }

    #[test]
    fn dirty_cube_heals_watertight() {
        let mut part = dirty_cube_part();
        let mesh = part.meshes().get(0).unwrap();

        // The input is visibly dirty.
        let before = check(&mesh, &CheckOptions::default());
        assert!(!before.is_empty());

        let mut op = Heal::new(mesh.clone());
        let result = part.modify_using(&mut op).unwrap();

        assert!(op.failed_meshes().is_empty());
        assert_eq!(result.len(), 1);

        let healed = result.get(0).unwrap();
        assert!(healed.is_watertight());
        assert!((healed.area() - 6.0).abs() < 1e-6);
        assert!((healed.signed_volume().abs() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn close_mesh_disabled_leaves_holes_open() {
        let mut part = dirty_cube_part();
        let mesh = part.meshes().get(0).unwrap();

        let mut op = Heal::new(mesh);
        op.set_close_mesh(false);
        op.set_use_voxel_fallback(false);
        let result = part.modify_using(&mut op).unwrap();

        assert!(op.failed_meshes().is_empty());
        let healed = result.get(0).unwrap();
        // The duplicate is welded but the missing triangle stays missing.
        assert!(!healed.is_watertight());
        assert_eq!(healed.boundary_bars().len(), 3);
    }

    #[test]
    fn moebius_without_fallback_fails_and_reports() {
        let positions: Vec<f64> = (0..5)
            .flat_map(|i| {
                let angle = i as f64 * std::f64::consts::TAU / 5.0;
                [angle.cos(), angle.sin(), i as f64 * 0.1]
            })
            .collect();
        let connectivity = [0u32, 1, 2, 1, 2, 3, 2, 3, 4, 3, 4, 0, 4, 0, 1];

        let mut part = Part::new();
        part.import(&positions, &connectivity).unwrap();
        let mesh = part.meshes().get(0).unwrap();

        let mut op = Heal::new(mesh);
        op.set_use_voxel_fallback(false);
        part.modify_using(&mut op).unwrap();

        assert_eq!(op.failed_meshes().len(), 1);
        let failed = op.failed_meshes().get(0).unwrap();
        let report = op.failed_mesh_anomalies(&failed);
        assert!(!report.is_empty());
        assert!(!report.filter_code(AnomalyCode::NonOrientable).is_empty());

        // Unrelated mesh: empty container, not an error.
        assert!(op.failed_mesh_anomalies(&Mesh::new()).is_empty());
    }

    #[test]
    fn components_are_healed_independently() {
        // A healable open cube next to an unhealable Möbius band.
        let mut positions: Vec<f64> = vec![
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0,
            1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0,
        ];
        let mut connectivity: Vec<u32> = vec![
            0, 2, 1, 0, 3, 2, 4, 5, 6, 4, 6, 7, 0, 1, 5, 0, 5, 4, 1, 6, 5, 2, 3, 7, 2, 7, 6, 3,
            0, 4, 3, 4, 7, // cube missing [1, 2, 6]
        ];
        let base = (positions.len() / 3) as u32;
        for i in 0..5 {
            let angle = i as f64 * std::f64::consts::TAU / 5.0;
            positions.extend_from_slice(&[10.0 + angle.cos(), angle.sin(), i as f64 * 0.1]);
        }
        for [a, b, c] in [[0, 1, 2], [1, 2, 3], [2, 3, 4], [3, 4, 0], [4, 0, 1]] {
            connectivity.extend_from_slice(&[base + a, base + b, base + c]);
        }

        let mut part = Part::new();
        part.import(&positions, &connectivity).unwrap();
        let mesh = part.meshes().get(0).unwrap();

        let mut op = Heal::new(mesh);
        op.set_use_voxel_fallback(false);
        let result = part.modify_using(&mut op).unwrap();

        // One healed shell, one failure; the failure did not poison the
        // cube.
        assert_eq!(op.failed_meshes().len(), 1);
        let healed = result.get(0).unwrap();
        assert!(healed.is_watertight());
        // Both components live in the part for inspection.
        assert_eq!(part.meshes().len(), 2);
    }

    #[test]
    fn enclosed_shell_policy_drops_debris() {
        // A unit cube with a tiny cube floating inside it.
        let mut positions: Vec<f64> = Vec::new();
        let mut connectivity: Vec<u32> = Vec::new();
        let cube_faces: [[u32; 3]; 12] = [
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [1, 2, 6],
            [1, 6, 5],
            [2, 3, 7],
            [2, 7, 6],
            [3, 0, 4],
            [3, 4, 7],
        ];
        let mut add_cube = |origin: [f64; 3], size: f64| {
            let base = (positions.len() / 3) as u32;
            for (dx, dy, dz) in [
                (0.0, 0.0, 0.0),
                (1.0, 0.0, 0.0),
                (1.0, 1.0, 0.0),
                (0.0, 1.0, 0.0),
                (0.0, 0.0, 1.0),
                (1.0, 0.0, 1.0),
                (1.0, 1.0, 1.0),
                (0.0, 1.0, 1.0),
            ] {
                positions.extend_from_slice(&[
                    origin[0] + dx * size,
                    origin[1] + dy * size,
                    origin[2] + dz * size,
                ]);
            }
            for face in cube_faces {
                connectivity.extend(face.iter().map(|&i| base + i));
            }
        };
        add_cube([0.0, 0.0, 0.0], 1.0);
        add_cube([0.45, 0.45, 0.45], 0.05);

        let mut part = Part::new();
        part.import(&positions, &connectivity).unwrap();
        let mesh = part.meshes().get(0).unwrap();

        let mut op = Heal::new(mesh);
        op.set_min_shell_volume_fraction(0.01);
        let result = part.modify_using(&mut op).unwrap();

        // The debris shell is gone, the outer cube survives.
        assert!(op.failed_meshes().is_empty());
        assert_eq!(result.len(), 1);
        assert!((result.get(0).unwrap().signed_volume().abs() - 1.0).abs() < 1e-6);
    }
}
