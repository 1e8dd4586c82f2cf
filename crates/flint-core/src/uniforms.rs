//! GPU-visible per-frame data layouts.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Per-frame transform block bound at set 0, binding 0.
///
/// Three column-major matrices, matching a std140 `{ mat4 model; mat4 view; mat4 proj; }`.
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct FrameUniforms {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
        }
    }
}

impl FrameUniforms {
    /// Size of the block in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Raw bytes for a mapped uniform buffer.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Push constants for the mesh draw.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct DrawPushConstants {
    /// Device address of the vertex buffer the shader pulls from
    pub vertex_buffer: u64,
}

impl DrawPushConstants {
    /// Size of the block in bytes.
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    /// Raw bytes for `vkCmdPushConstants`.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_sizes() {
        assert_eq!(FrameUniforms::SIZE, 192);
        assert_eq!(DrawPushConstants::SIZE, 8);
        assert_eq!(FrameUniforms::default().as_bytes().len(), 192);
    }

    #[test]
    fn matrices_are_column_major() {
        let uniforms = FrameUniforms {
            model: Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0)),
            ..Default::default()
        };
        let floats: &[f32] = bytemuck::cast_slice(uniforms.as_bytes());
        assert_eq!(&floats[12..15], &[1.0, 2.0, 3.0]);
    }
}
