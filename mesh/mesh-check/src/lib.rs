//! Anomaly detection for polyhedral meshes.
//!
//! Scans a mesh and produces a typed, severity-ranked list of defects
//! without mutating it:
//!
//! - non-manifold bars (three or more incident triangles)
//! - degenerate triangles (zero or near-zero area)
//! - non-orientable regions (Möbius-like winding contradictions)
//! - self-intersections between non-adjacent triangles
//! - duplicate nodes within a snap tolerance
//! - open boundary loops
//!
//! Anomalies are immutable snapshots: they reference triangles by handle
//! but do not track them, so any mesh mutation invalidates a previously
//! captured report.
//!
//! # Example
//!
//! ```
//! use mesh_model::Mesh;
//! use mesh_check::{check, AnomalyCode, CheckOptions};
//!
//! // A lone triangle: not watertight, nothing else wrong.
//! let mesh = Mesh::from_raw(
//!     &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
//!     &[0, 1, 2],
//! ).unwrap();
//!
//! let report = check(&mesh, &CheckOptions::default());
//! assert!(!report.is_empty());
//! assert_eq!(report.filter_code(AnomalyCode::OpenBoundary).len(), 1);
//! ```

// Safety: Deny unwrap/expect in library code. Tests may use them.
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]

mod anomaly;
mod check;
mod intersect;

pub use anomaly::{Anomaly, AnomalyCode, AnomalyContainer, Severity, ValueInfo};
pub use check::{check, CheckOptions};
pub use intersect::triangle_intersection;
