//! Anomaly records and their container.

use mesh_model::TriangleId;
use smallvec::SmallVec;

/// How serious a defect is.
///
/// The numeric values are part of the reporting contract: `Warning` is 1,
/// `Error` is 2. Errors block body construction; warnings are cosmetic or
/// auto-correctable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Severity {
    /// Cosmetic or auto-correctable defect.
    Warning = 1,
    /// Defect that blocks body construction.
    Error = 2,
}

impl Severity {
    /// Contractual numeric value (`Warning` = 1, `Error` = 2).
    #[must_use]
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// Stable numeric code identifying a defect family.
///
/// Callers filter programmatically on the code rather than parsing
/// descriptions; the numeric values never change meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AnomalyCode {
    /// A bar shared by three or more triangles.
    NonManifoldBar = 1,
    /// A triangle with zero or near-zero area.
    DegenerateTriangle = 2,
    /// Two non-adjacent triangles intersect.
    SelfIntersection = 3,
    /// A connected region admits no consistent orientation.
    NonOrientable = 4,
    /// A cluster of nodes within snap tolerance of each other.
    DuplicateNodes = 5,
    /// A closed loop of boundary bars (a hole).
    OpenBoundary = 6,
}

impl AnomalyCode {
    /// Contractual numeric value of the code.
    #[must_use]
    pub fn value(self) -> u32 {
        self as u32
    }
}

/// A named scalar attached to an anomaly (e.g. an intersection length).
#[derive(Debug, Clone, PartialEq)]
pub struct ValueInfo {
    /// Name of the quantity.
    pub name: String,
    /// Its value.
    pub value: f64,
}

/// An immutable snapshot of one detected defect.
///
/// Carries a severity, a stable code, up to two referenced triangles, a
/// short and a detailed description, and zero or more named scalars.
/// Anomalies do not track live entities: mutate the mesh and the report is
/// stale.
#[derive(Debug, Clone)]
pub struct Anomaly {
    severity: Severity,
    code: AnomalyCode,
    triangles: SmallVec<[TriangleId; 2]>,
    summary: String,
    detail: String,
    values: Vec<ValueInfo>,
}

impl Anomaly {
    /// Create an anomaly with no referenced triangles or values.
    #[must_use]
    pub fn new(
        code: AnomalyCode,
        severity: Severity,
        summary: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            code,
            triangles: SmallVec::new(),
            summary: summary.into(),
            detail: detail.into(),
            values: Vec::new(),
        }
    }

    /// Attach a referenced triangle (at most two are kept).
    #[must_use]
    pub fn with_triangle(mut self, triangle: TriangleId) -> Self {
        if self.triangles.len() < 2 {
            self.triangles.push(triangle);
        }
        self
    }

    /// Attach a named scalar.
    #[must_use]
    pub fn with_value(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.push(ValueInfo {
            name: name.into(),
            value,
        });
        self
    }

    /// Severity of the defect.
    #[must_use]
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Stable defect code.
    #[must_use]
    pub fn code(&self) -> AnomalyCode {
        self.code
    }

    /// Referenced triangles: zero, one, or two handles.
    #[must_use]
    pub fn triangles(&self) -> &[TriangleId] {
        &self.triangles
    }

    /// One-line description.
    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }

    /// Detailed description.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// All named scalars.
    #[must_use]
    pub fn values(&self) -> &[ValueInfo] {
        &self.values
    }

    /// Look up a named scalar.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.iter().find(|v| v.name == name).map(|v| v.value)
    }
}

impl std::fmt::Display for Anomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "[{severity}] {}", self.summary)
    }
}

/// An insertion-ordered collection of anomalies.
///
/// Supports slicing and programmatic filtering by code or severity.
#[derive(Debug, Clone, Default)]
pub struct AnomalyContainer {
    items: Vec<Anomaly>,
}

impl AnomalyContainer {
    /// Create an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Append an anomaly.
    pub fn push(&mut self, anomaly: Anomaly) {
        self.items.push(anomaly);
    }

    /// Number of anomalies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when no defects were recorded — the all-clear signal callers
    /// branch on after an operation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Anomaly at `index`, or `None` past the end.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Anomaly> {
        self.items.get(index)
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Anomaly> + '_ {
        self.items.iter()
    }

    /// A new container over the half-open index range `range`.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds, like slice indexing.
    #[must_use]
    pub fn slice(&self, range: std::ops::Range<usize>) -> Self {
        Self {
            items: self.items[range].to_vec(),
        }
    }

    /// Anomalies with the given code, preserving order.
    #[must_use]
    pub fn filter_code(&self, code: AnomalyCode) -> Self {
        Self {
            items: self
                .items
                .iter()
                .filter(|a| a.code() == code)
                .cloned()
                .collect(),
        }
    }

    /// Anomalies at the given severity, preserving order.
    #[must_use]
    pub fn filter_severity(&self, severity: Severity) -> Self {
        Self {
            items: self
                .items
                .iter()
                .filter(|a| a.severity() == severity)
                .cloned()
                .collect(),
        }
    }

    /// True if any recorded anomaly is an [`Severity::Error`].
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|a| a.severity() == Severity::Error)
    }

    /// Highest severity present, or `None` when empty.
    #[must_use]
    pub fn worst_severity(&self) -> Option<Severity> {
        self.items.iter().map(Anomaly::severity).max()
    }
}

impl<'a> IntoIterator for &'a AnomalyContainer {
    type Item = &'a Anomaly;
    type IntoIter = std::slice::Iter<'a, Anomaly>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
