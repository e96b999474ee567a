//! Export buffers for rendering and interchange.

/// A snapshot of a mesh's geometry in flat export buffers.
///
/// Built by `Mesh::serializer()`. Node order follows the serialized-index
/// bijection of the mesh at the time of the call; mutating the mesh
/// afterwards does not change an already-built serializer.
///
/// Normals and UVs are optional: the buffers are empty unless *every* node
/// carries the attribute.
#[derive(Debug, Clone)]
pub struct MeshSerializer {
    positions: Vec<f64>,
    normals: Vec<f64>,
    uvs: Vec<f64>,
    indices: Vec<u32>,
}

impl MeshSerializer {
    pub(crate) fn from_buffers(
        positions: Vec<f64>,
        normals: Vec<f64>,
        uvs: Vec<f64>,
        indices: Vec<u32>,
    ) -> Self {
        Self {
            positions,
            normals,
            uvs,
            indices,
        }
    }

    /// Number of exported nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Number of exported triangles.
    #[must_use]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Positions as `x y z` triples, double precision.
    #[must_use]
    pub fn positions_f64(&self) -> &[f64] {
        &self.positions
    }

    /// Positions as `x y z` triples, downcast to single precision.
    #[must_use]
    pub fn positions_f32(&self) -> Vec<f32> {
        self.positions.iter().map(|&v| v as f32).collect()
    }

    /// Unit normals as `x y z` triples; empty when any node lacks one.
    #[must_use]
    pub fn normals(&self) -> &[f64] {
        &self.normals
    }

    /// UV parameters as `u v` pairs; empty when any node lacks them.
    #[must_use]
    pub fn uvs(&self) -> &[f64] {
        &self.uvs
    }

    /// Triangle index buffer.
    ///
    /// With `prefix_counts` set, each triangle's indices are preceded by the
    /// literal count `3` (the layout some rendering pipelines expect);
    /// otherwise the stream is flat.
    ///
    /// # Example
    ///
    /// ```
    /// use mesh_model::Mesh;
    ///
    /// let mesh = Mesh::from_raw(
    ///     &[0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
    ///     &[0, 1, 2],
    /// ).unwrap();
    /// let ser = mesh.serializer();
    ///
    /// assert_eq!(ser.indices(false), vec![0, 1, 2]);
    /// assert_eq!(ser.indices(true), vec![3, 0, 1, 2]);
    /// ```
    #[must_use]
    pub fn indices(&self, prefix_counts: bool) -> Vec<u32> {
        if !prefix_counts {
            return self.indices.clone();
        }
        let mut out = Vec::with_capacity(self.indices.len() + self.indices.len() / 3);
        for tri in self.indices.chunks_exact(3) {
            out.push(3);
            out.extend_from_slice(tri);
        }
        out
    }
}
