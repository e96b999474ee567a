//! The anomaly detection pipeline.

use hashbrown::HashMap;
use mesh_model::{Mesh, NodeId, Triangle, TriangleId};
use ph_spatial::{Aabb, Bvh, PointGrid};
use smallvec::SmallVec;
use tracing::{debug, info};

use crate::anomaly::{Anomaly, AnomalyCode, AnomalyContainer, Severity};
use crate::intersect::triangle_intersection;

/// Options controlling the anomaly scan.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Triangles with positive area below this are reported as warnings;
    /// exactly-zero area is always an error.
    pub degenerate_area_tolerance: f64,

    /// Nodes closer than this are reported as duplicate clusters.
    /// Non-positive disables duplicate detection.
    pub duplicate_node_tolerance: f64,

    /// Whether to run the (comparatively expensive) self-intersection scan.
    pub check_self_intersections: bool,

    /// Geometric epsilon for the intersection predicates.
    pub intersection_epsilon: f64,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            degenerate_area_tolerance: 1e-12,
            duplicate_node_tolerance: 1e-9,
            check_self_intersections: true,
            intersection_epsilon: 1e-9,
        }
    }
}

impl CheckOptions {
    /// Set the degenerate-area tolerance.
    #[must_use]
    pub fn with_degenerate_area_tolerance(mut self, tolerance: f64) -> Self {
        self.degenerate_area_tolerance = tolerance;
        self
    }

    /// Set the duplicate-node tolerance.
    #[must_use]
    pub fn with_duplicate_node_tolerance(mut self, tolerance: f64) -> Self {
        self.duplicate_node_tolerance = tolerance;
        self
    }

    /// Enable or disable the self-intersection scan.
    #[must_use]
    pub fn with_self_intersections(mut self, enabled: bool) -> Self {
        self.check_self_intersections = enabled;
        self
    }
}

/// Scan a mesh and report every defect found, without mutating it.
///
/// Anomalies are appended in a fixed pass order: non-manifold bars,
/// degenerate triangles, orientability, self-intersections (followed by a
/// mesh-wide summary record), duplicate nodes, open boundaries.
///
/// # Example
///
/// ```
/// use mesh_model::Mesh;
/// use mesh_check::{check, CheckOptions};
///
/// let mesh = Mesh::from_raw(
///     &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
///     &[0, 1, 2],
/// ).unwrap();
///
/// let report = check(&mesh, &CheckOptions::default());
/// // A lone triangle is clean except for its open boundary.
/// assert!(!report.has_errors());
/// ```
#[must_use]
pub fn check(mesh: &Mesh, options: &CheckOptions) -> AnomalyContainer {
    let mut report = AnomalyContainer::new();

    check_non_manifold(mesh, &mut report);
    check_degenerate(mesh, options, &mut report);
    check_orientability(mesh, &mut report);
    if options.check_self_intersections {
        check_self_intersections(mesh, options, &mut report);
    }
    check_duplicate_nodes(mesh, options, &mut report);
    check_open_boundaries(mesh, &mut report);

    info!(
        anomalies = report.len(),
        errors = report.filter_severity(Severity::Error).len(),
        "checked mesh {}",
        mesh.id()
    );
    report
}

fn check_non_manifold(mesh: &Mesh, report: &mut AnomalyContainer) {
    for bar in mesh.bars().iter() {
        let degree = mesh.bar_degree(bar);
        if degree <= 2 {
            continue;
        }
        let incident = mesh.bar_triangles(bar);
        let [a, b] = bar.nodes();
        let mut anomaly = Anomaly::new(
            AnomalyCode::NonManifoldBar,
            Severity::Error,
            "non-manifold bar",
            format!(
                "bar between nodes {} and {} is shared by {} triangles",
                a.id(),
                b.id(),
                degree
            ),
        )
        .with_value("incident_triangles", degree as f64);
        // Callers query at most two referenced triangles.
        for tri in incident.iter().take(2) {
            anomaly = anomaly.with_triangle(tri);
        }
        report.push(anomaly);
    }
}

fn check_degenerate(mesh: &Mesh, options: &CheckOptions, report: &mut AnomalyContainer) {
    for tri in mesh.triangles().iter() {
        let area = mesh.triangle_geometry(tri).area();
        if area == 0.0 {
            report.push(
                Anomaly::new(
                    AnomalyCode::DegenerateTriangle,
                    Severity::Error,
                    "degenerate triangle",
                    format!("triangle {} has zero area", tri.id()),
                )
                .with_triangle(tri)
                .with_value("area", 0.0),
            );
        } else if area < options.degenerate_area_tolerance {
            report.push(
                Anomaly::new(
                    AnomalyCode::DegenerateTriangle,
                    Severity::Warning,
                    "near-degenerate triangle",
                    format!("triangle {} has area {area:e}", tri.id()),
                )
                .with_triangle(tri)
                .with_value("area", area),
            );
        }
    }
}

/// Direction of edge `(a, b)` within a corner triple: `Some(true)` when
/// traversed `a -> b`, `Some(false)` when `b -> a`, `None` when absent.
fn edge_direction(corners: &[u64; 3], a: u64, b: u64) -> Option<bool> {
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

fn check_orientability(mesh: &Mesh, report: &mut AnomalyContainer) {
    let tris: Vec<TriangleId> = mesh.triangles().iter().collect();
    if tris.is_empty() {
        return;
    }

    let corners: Vec<[u64; 3]> = tris
        .iter()
        .map(|&t| {
            let [a, b, c] = mesh.triangle_nodes(t);
            [a.id(), b.id(), c.id()]
        })
        .collect();

    // Local edge map over list positions; only manifold (degree-2) bars
    // propagate orientation, non-manifold bars are reported separately.
    let mut edge_map: HashMap<(u64, u64), SmallVec<[usize; 2]>> = HashMap::new();
    for (pos, c) in corners.iter().enumerate() {
        for i in 0..3 {
            let (a, b) = (c[i], c[(i + 1) % 3]);
            let key = if a < b { (a, b) } else { (b, a) };
            edge_map.entry(key).or_default().push(pos);
        }
    }

    let mut visited = vec![false; tris.len()];
    let mut flipped = vec![false; tris.len()];

    for seed in 0..tris.len() {
        if visited[seed] {
            continue;
        }

        let mut component = Vec::new();
        let mut contradiction = false;
        let mut queue = std::collections::VecDeque::new();
        visited[seed] = true;
        queue.push_back(seed);

        while let Some(current) = queue.pop_front() {
            component.push(current);
            let c = corners[current];

            for i in 0..3 {
                let (a, b) = (c[i], c[(i + 1) % 3]);
                let key = if a < b { (a, b) } else { (b, a) };
                let Some(incident) = edge_map.get(&key) else {
                    continue;
                };
                if incident.len() != 2 {
                    continue;
                }

                for &neighbor in incident {
                    if neighbor == current {
                        continue;
                    }
                    let dir_here = edge_direction(&corners[current], a, b) == Some(true);
                    let dir_there = edge_direction(&corners[neighbor], a, b) == Some(true);
                    // Consistent orientation traverses a shared bar in
                    // opposite directions.
                    let needs_flip = flipped[current] ^ (dir_here == dir_there);

                    if visited[neighbor] {
                        if flipped[neighbor] != needs_flip {
                            contradiction = true;
                        }
                    } else {
                        visited[neighbor] = true;
                        flipped[neighbor] = needs_flip;
                        queue.push_back(neighbor);
                    }
                }
            }
        }

        if contradiction {
            debug!(
                triangles = component.len(),
                "non-orientable component found"
            );
            report.push(
                Anomaly::new(
                    AnomalyCode::NonOrientable,
                    Severity::Error,
                    "non-orientable region",
                    format!(
                        "a connected region of {} triangles admits no consistent orientation",
                        component.len()
                    ),
                )
                .with_value("component_triangles", component.len() as f64),
            );
        }
    }
}

fn check_self_intersections(mesh: &Mesh, options: &CheckOptions, report: &mut AnomalyContainer) {
    let tris: Vec<TriangleId> = mesh.triangles().iter().collect();
    if tris.len() < 2 {
        return;
    }

    let geometries: Vec<Triangle> = tris.iter().map(|&t| mesh.triangle_geometry(t)).collect();
    let corner_ids: Vec<[u64; 3]> = tris
        .iter()
        .map(|&t| {
            let [a, b, c] = mesh.triangle_nodes(t);
            [a.id(), b.id(), c.id()]
        })
        .collect();

    let boxes: Vec<Aabb> = geometries.iter().map(Triangle::aabb).collect();
    let bvh = Bvh::build(&boxes);

    let mut pair_count = 0usize;
    let mut max_length = 0.0f64;

    for (i, j) in bvh.self_overlapping_pairs(options.intersection_epsilon) {
        // Adjacent triangles (sharing a node) touch along shared geometry
        // by construction; only disjoint pairs count.
        let shares_node = corner_ids[i]
            .iter()
            .any(|a| corner_ids[j].contains(a));
        if shares_node {
            continue;
        }

        let Some(length) =
            triangle_intersection(&geometries[i], &geometries[j], options.intersection_epsilon)
        else {
            continue;
        };

        pair_count += 1;
        max_length = max_length.max(length);
        report.push(
            Anomaly::new(
                AnomalyCode::SelfIntersection,
                Severity::Error,
                "self-intersection",
                format!(
                    "triangles {} and {} intersect along a segment of length {length:e}",
                    tris[i].id(),
                    tris[j].id()
                ),
            )
            .with_triangle(tris[i])
            .with_triangle(tris[j])
            .with_value("intersection_length", length),
        );
    }

    if pair_count > 0 {
        // Mesh-wide summary record; carries the scalars callers use to
        // rank meshes by damage.
        report.push(
            Anomaly::new(
                AnomalyCode::SelfIntersection,
                Severity::Error,
                "self-intersection summary",
                format!("{pair_count} intersecting triangle pairs"),
            )
            .with_value("intersecting_pairs", pair_count as f64)
            .with_value("max_intersection_length", max_length),
        );
    }
}

fn check_duplicate_nodes(mesh: &Mesh, options: &CheckOptions, report: &mut AnomalyContainer) {
    let tolerance = options.duplicate_node_tolerance;
    if tolerance <= 0.0 {
        return;
    }

    let nodes: Vec<NodeId> = mesh.nodes().iter().collect();
    if nodes.len() < 2 {
        return;
    }

    let Ok(grid) = PointGrid::from_points(
        tolerance,
        nodes
            .iter()
            .enumerate()
            .map(|(i, &n)| (mesh.position(n), i as u64)),
    ) else {
        return;
    };

    // Union-find over nodes linked by sub-tolerance spacing.
    let mut parent: Vec<usize> = (0..nodes.len()).collect();

    fn find(parent: &mut [usize], mut i: usize) -> usize {
        while parent[i] != i {
            parent[i] = parent[parent[i]];
            i = parent[i];
        }
        i
    }

    for (i, &node) in nodes.iter().enumerate() {
        let position = mesh.position(node);
        let Ok(near) = grid.neighbors_within(&position, tolerance) else {
            continue;
        };
        for other in near {
            let other = other as usize;
            if other == i {
                continue;
            }
            let (ri, ro) = (find(&mut parent, i), find(&mut parent, other));
            if ri != ro {
                parent[ri.max(ro)] = ri.min(ro);
            }
        }
    }

    let mut clusters: HashMap<usize, Vec<usize>> = HashMap::new();
    for i in 0..nodes.len() {
        let root = find(&mut parent, i);
        clusters.entry(root).or_default().push(i);
    }

    let mut roots: Vec<usize> = clusters
        .iter()
        .filter(|(_, members)| members.len() >= 2)
        .map(|(&root, _)| root)
        .collect();
    roots.sort_unstable();

    for root in roots {
        let members = &clusters[&root];
        let mut max_spacing = 0.0f64;
        for (a, &ia) in members.iter().enumerate() {
            for &ib in members.iter().skip(a + 1) {
                let d = (mesh.position(nodes[ia]) - mesh.position(nodes[ib])).norm();
                max_spacing = max_spacing.max(d);
            }
        }

        report.push(
            Anomaly::new(
                AnomalyCode::DuplicateNodes,
                Severity::Warning,
                "duplicate nodes",
                format!(
                    "{} nodes coincide within tolerance {tolerance:e} (first: node {})",
                    members.len(),
                    nodes[members[0]].id()
                ),
            )
            .with_value("cluster_size", members.len() as f64)
            .with_value("max_spacing", max_spacing),
        );
    }
}

fn check_open_boundaries(mesh: &Mesh, report: &mut AnomalyContainer) {
    for (i, boundary) in mesh.boundary_loops().iter().enumerate() {
        report.push(
            Anomaly::new(
                AnomalyCode::OpenBoundary,
                Severity::Warning,
                "open boundary",
                format!("boundary loop {} has {} bars", i, boundary.len()),
            )
            .with_value("edge_count", boundary.len() as f64),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_cube() -> Mesh {
        let positions = [
            0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0,
            1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0,
        ];
        let connectivity = [
            0, 2, 1, 0, 3, 2, 4, 5, 6, 4, 6, 7, 0, 1, 5, 0, 5, 4, 1, 2, 6, 1, 6, 5, 2, 3, 7, 2,
            7, 6, 3, 0, 4, 3, 4, 7,
        ];
        Mesh::from_raw(&positions, &connectivity).unwrap()
    }

    #[test]
    fn clean_cube_reports_nothing() {
        let report = check(&unit_cube(), &CheckOptions::default());
        assert!(report.is_empty());
    }

    #[test]
    fn non_manifold_fan_is_error_with_two_refs() {
        let mesh = Mesh::from_raw(
            &[
                0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, 1.0,
            ],
            &[0, 1, 2, 0, 1, 3, 0, 1, 4],
        )
        .unwrap();

        let report = check(&mesh, &CheckOptions::default());
        let non_manifold = report.filter_code(AnomalyCode::NonManifoldBar);
        assert_eq!(non_manifold.len(), 1);

        let anomaly = non_manifold.get(0).unwrap();
        assert_eq!(anomaly.severity(), Severity::Error);
        assert_eq!(anomaly.triangles().len(), 2);
        assert_eq!(anomaly.value("incident_triangles"), Some(3.0));
    }

    #[test]
    fn collinear_triangle_is_degenerate_error() {
        let mesh = Mesh::from_raw(
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 2.0, 0.0, 0.0],
            &[0, 1, 2],
        )
        .unwrap();

        let report = check(&mesh, &CheckOptions::default());
        let degenerate = report.filter_code(AnomalyCode::DegenerateTriangle);
        assert_eq!(degenerate.len(), 1);
        assert_eq!(degenerate.get(0).unwrap().severity(), Severity::Error);
    }

    #[test]
    fn moebius_band_is_non_orientable() {
        // Minimal 5-triangle Möbius triangulation; positions are irrelevant
        // to orientability, any distinct points do.
        let positions: Vec<f64> = (0..5)
            .flat_map(|i| {
                let angle = i as f64 * std::f64::consts::TAU / 5.0;
                [angle.cos(), angle.sin(), i as f64 * 0.1]
            })
            .collect();
        let connectivity = [0u32, 1, 2, 1, 2, 3, 2, 3, 4, 3, 4, 0, 4, 0, 1];

        let mesh = Mesh::from_raw(&positions, &connectivity).unwrap();
        let report = check(
            &mesh,
            &CheckOptions::default().with_self_intersections(false),
        );

        assert_eq!(report.filter_code(AnomalyCode::NonOrientable).len(), 1);
    }

    #[test]
    fn inconsistent_but_orientable_winding_is_not_flagged() {
        // Second triangle wound the wrong way: repairable, hence orientable.
        let mesh = Mesh::from_raw(
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0],
            &[0, 1, 2, 1, 2, 3],
        )
        .unwrap();

        let report = check(&mesh, &CheckOptions::default());
        assert!(report.filter_code(AnomalyCode::NonOrientable).is_empty());
    }

    #[test]
    fn stabbing_triangles_report_intersection_and_summary() {
        let mesh = Mesh::from_raw(
            &[
                // Large triangle in the XY plane.
                -2.0, -2.0, 0.0, 4.0, -2.0, 0.0, 0.0, 4.0, 0.0,
                // Vertical triangle stabbing through it.
                0.0, 0.0, -1.0, 1.0, 0.0, -1.0, 0.5, 0.0, 1.0,
            ],
            &[0, 1, 2, 3, 4, 5],
        )
        .unwrap();

        let report = check(&mesh, &CheckOptions::default());
        let intersections = report.filter_code(AnomalyCode::SelfIntersection);
        // One pair record plus the mesh-wide summary.
        assert_eq!(intersections.len(), 2);

        let pair = intersections.get(0).unwrap();
        assert_eq!(pair.triangles().len(), 2);
        assert!(pair.value("intersection_length").unwrap() > 0.0);

        let summary = intersections.get(1).unwrap();
        assert!(summary.triangles().is_empty());
        assert_eq!(summary.value("intersecting_pairs"), Some(1.0));
        assert!(summary.value("max_intersection_length").unwrap() > 0.0);
    }

    #[test]
    fn duplicate_nodes_cluster_warning() {
        let mesh = Mesh::from_raw(
            &[
                0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, // triangle
                1e-7, 0.0, 0.0, // near-duplicate of node 0
                2.0, 0.0, 0.0, 2.0, 1.0, 0.0,
            ],
            &[0, 1, 2, 3, 4, 5],
        )
        .unwrap();

        let options = CheckOptions::default().with_duplicate_node_tolerance(1e-6);
        let report = check(&mesh, &options);

        let dupes = report.filter_code(AnomalyCode::DuplicateNodes);
        assert_eq!(dupes.len(), 1);
        let anomaly = dupes.get(0).unwrap();
        assert_eq!(anomaly.severity(), Severity::Warning);
        assert_eq!(anomaly.value("cluster_size"), Some(2.0));
    }

    #[test]
    fn duplicate_detection_disabled_by_zero_tolerance() {
        let mesh = Mesh::from_raw(
            &[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            &[0, 2, 3],
        )
        .unwrap();

        let options = CheckOptions::default().with_duplicate_node_tolerance(0.0);
        let report = check(&mesh, &options);
        assert!(report.filter_code(AnomalyCode::DuplicateNodes).is_empty());
    }

    #[test]
    fn open_boundary_loop_reported() {
        let mesh = Mesh::from_raw(
            &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            &[0, 1, 2],
        )
        .unwrap();

        let report = check(&mesh, &CheckOptions::default());
        let boundaries = report.filter_code(AnomalyCode::OpenBoundary);
        assert_eq!(boundaries.len(), 1);
        assert_eq!(boundaries.get(0).unwrap().value("edge_count"), Some(3.0));
    }
}
