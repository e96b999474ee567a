//! Iterative removal of intersecting sliver triangles.

use mesh_check::{check, AnomalyCode, AnomalyContainer, CheckOptions};
use mesh_model::Mesh;
use tracing::{debug, info};

use crate::error::{OpsError, OpsResult};
use crate::operator::{MeshOperator, Transaction};

/// Remove the sliver triangles implicated in self-intersections.
///
/// Each round removes, for every intersecting pair, its smaller-area
/// triangle (the sliver), subject to the deformation cap, then re-checks;
/// rounds repeat until the mesh is intersection-free or no further
/// progress is possible. Removal opens holes — a later fill/heal pass
/// closes them.
///
/// A precomputed [`AnomalyContainer`] can seed the first round as a
/// performance shortcut, skipping one full intersection scan. Pairs whose
/// triangles both exceed the deformation cap are left in place and
/// reported via [`RemoveIntersectingSlivers::residual_anomalies`].
#[derive(Debug)]
pub struct RemoveIntersectingSlivers {
    mesh: Mesh,
    seed: Option<AnomalyContainer>,
    max_deformation: f64,
    executed: bool,
    removed: usize,
    residual: AnomalyContainer,
}

impl RemoveIntersectingSlivers {
    /// Create the operator; intersections are detected internally.
    #[must_use]
    pub fn new(mesh: Mesh) -> Self {
        Self {
            mesh,
            seed: None,
            max_deformation: f64::INFINITY,
            executed: false,
            removed: 0,
            residual: AnomalyContainer::new(),
        }
    }

    /// Seed the first round with an existing check report instead of
    /// re-running detection.
    #[must_use]
    pub fn with_anomalies(mut self, anomalies: AnomalyContainer) -> Self {
        self.seed = Some(anomalies);
        self
    }

    /// Cap the area of any triangle the operator may remove. Triangles
    /// larger than this are never deleted (the surface deformation of
    /// removing them would exceed the budget).
    #[must_use]
    pub fn with_max_deformation(mut self, area: f64) -> Self {
        self.max_deformation = area;
        self
    }

    /// Number of triangles removed; valid after execution.
    #[must_use]
    pub fn removed_triangles(&self) -> usize {
        self.removed
    }

    /// Intersections that could not be resolved; valid after execution.
    #[must_use]
    pub fn residual_anomalies(&self) -> &AnomalyContainer {
        &self.residual
    }
}

impl MeshOperator for RemoveIntersectingSlivers {
    fn name(&self) -> &'static str {
        "remove-intersecting-slivers"
    }

    fn apply(&mut self, tx: &mut Transaction<'_>) -> OpsResult<()> {
        if self.executed {
            return Err(OpsError::AlreadyExecuted);
        }
        self.executed = true;
        tx.require(&self.mesh)?;

        let (removed, residual) =
            remove_intersections_core(&self.mesh, self.seed.take(), self.max_deformation);
        self.removed = removed;
        self.residual = residual;
        info!(
            removed = self.removed,
            residual = self.residual.len(),
            "removed intersecting slivers from mesh {}",
            self.mesh.id()
        );

        tx.mark_modified(&self.mesh)?;
        Ok(())
    }
}

const MAX_ROUNDS: usize = 8;

/// The iterative removal loop; returns `(removed, residual report)`.
pub(crate) fn remove_intersections_core(
    mesh: &Mesh,
    seed: Option<AnomalyContainer>,
    max_deformation: f64,
) -> (usize, AnomalyContainer) {
    let options = CheckOptions::default().with_duplicate_node_tolerance(0.0);
    let mut removed = 0usize;
    let mut report = seed.unwrap_or_else(|| check(mesh, &options));

    for round in 0..MAX_ROUNDS {
        let pairs = report.filter_code(AnomalyCode::SelfIntersection);
        let mut progressed = false;

        for anomaly in pairs.iter() {
            // Skip the mesh-wide summary record (no triangle refs).
            let triangles = anomaly.triangles();
            if triangles.len() != 2 {
                continue;
            }
            // Earlier removals this round may have consumed one of them.
            let live: Vec<_> = triangles
                .iter()
                .copied()
                .filter(|&t| mesh.contains_triangle(t))
                .collect();
            if live.len() != 2 {
                continue;
            }

            // Still intersecting? The stale report may predate a removal
            // that already resolved this pair.
            let mut ordered = [live[0], live[1]];
            ordered.sort_by(|&a, &b| {
                let area_a = mesh.triangle_geometry(a).area();
                let area_b = mesh.triangle_geometry(b).area();
                area_a
                    .partial_cmp(&area_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            for candidate in ordered {
                if mesh.triangle_geometry(candidate).area() <= max_deformation {
                    mesh.remove_triangle(candidate);
                    removed += 1;
                    progressed = true;
                    break;
                }
            }
        }

        report = check(mesh, &options);
        let remaining = report
            .filter_code(AnomalyCode::SelfIntersection)
            .iter()
            .filter(|a| a.triangles().len() == 2)
            .count();

        debug!(round, removed, remaining, "sliver removal round");
        if remaining == 0 || !progressed {
            break;
        }
    }

    let residual = report.filter_code(AnomalyCode::SelfIntersection);
    (removed, residual)
}
