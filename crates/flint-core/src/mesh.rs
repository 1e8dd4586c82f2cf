//! Vertex and mesh data.

use bytemuck::{Pod, Zeroable};

use crate::error::{Error, Result};

/// A vertex as read by the vertex shader through its buffer device address.
///
/// The layout matches a std430 `struct { vec2 position; vec2 uv; }`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    /// Position in model space
    pub position: [f32; 2],
    /// Texture coordinate
    pub uv: [f32; 2],
}

impl Vertex {
    /// Create a new vertex
    #[inline]
    pub const fn new(position: [f32; 2], uv: [f32; 2]) -> Self {
        Self { position, uv }
    }
}

/// The unit quad centered on the origin.
pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex::new([-0.5, -0.5], [0.0, 0.0]),
    Vertex::new([0.5, -0.5], [1.0, 0.0]),
    Vertex::new([0.5, 0.5], [1.0, 1.0]),
    Vertex::new([-0.5, 0.5], [0.0, 1.0]),
];

/// Two counter-clockwise triangles covering [`QUAD_VERTICES`].
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

/// Validated indexed triangle mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshData {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl MeshData {
    /// Create a mesh, checking that the indices form whole triangles that
    /// reference existing vertices.
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Result<Self> {
        if vertices.is_empty() || indices.is_empty() {
            return Err(Error::InvalidMesh("mesh has no geometry".to_string()));
        }
        if indices.len() % 3 != 0 {
            return Err(Error::InvalidMesh(format!(
                "index count {} is not a multiple of 3",
                indices.len()
            )));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
            return Err(Error::InvalidMesh(format!(
                "index {bad} out of range for {} vertices",
                vertices.len()
            )));
        }
        Ok(Self { vertices, indices })
    }

    /// The built-in quad.
    pub fn quad() -> Self {
        Self {
            vertices: QUAD_VERTICES.to_vec(),
            indices: QUAD_INDICES.to_vec(),
        }
    }

    /// Vertex data.
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Index data.
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Number of indices to draw.
    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Vertex data as raw bytes for upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Index data as raw bytes for upload.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 16);
    }

    #[test]
    fn quad_is_valid() {
        let quad = MeshData::quad();
        let rebuilt = MeshData::new(QUAD_VERTICES.to_vec(), QUAD_INDICES.to_vec()).unwrap();
        assert_eq!(quad, rebuilt);
        assert_eq!(quad.index_count(), 6);
        assert_eq!(quad.vertex_bytes().len(), 64);
        assert_eq!(quad.index_bytes().len(), 24);
    }

    #[test]
    fn quad_triangles_wind_counter_clockwise() {
        for tri in QUAD_INDICES.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|i| QUAD_VERTICES[tri[i] as usize].position);
            let cross = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
            assert!(cross > 0.0);
        }
    }

    #[test]
    fn rejects_out_of_range_index() {
        let err = MeshData::new(QUAD_VERTICES.to_vec(), vec![0, 1, 4]).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn rejects_partial_triangle() {
        assert!(MeshData::new(QUAD_VERTICES.to_vec(), vec![0, 1]).is_err());
        assert!(MeshData::new(Vec::new(), Vec::new()).is_err());
    }
}
