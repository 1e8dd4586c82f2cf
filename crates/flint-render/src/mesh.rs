//! Device-local vertex and index buffers for a [`MeshData`].

use ash::vk;
use flint_core::MeshData;
use flint_gpu::{GpuBuffer, GpuContext, Result, Uploader};

/// A mesh resident in device-local memory.
///
/// The vertex buffer is read by the vertex shader through its device
/// address; the index buffer is bound as `UINT32`.
pub struct GpuMesh {
    vertex_buffer: GpuBuffer,
    index_buffer: GpuBuffer,
    vertex_address: vk::DeviceAddress,
    index_count: u32,
}

impl GpuMesh {
    /// Stage `mesh` through `uploader` into two device-local buffers.
    pub fn upload(gpu: &GpuContext, uploader: &Uploader, mesh: &MeshData) -> Result<Self> {
        let vertex_buffer = uploader.upload_buffer(
            gpu.allocator(),
            mesh.vertex_bytes(),
            vk::BufferUsageFlags::STORAGE_BUFFER
                | vk::BufferUsageFlags::VERTEX_BUFFER
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
        )?;
        let index_buffer = uploader.upload_buffer(
            gpu.allocator(),
            mesh.index_bytes(),
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?;
        let vertex_address = vertex_buffer.device_address()?;

        tracing::debug!(
            vertices = mesh.vertices().len(),
            indices = mesh.index_count(),
            "Uploaded mesh"
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_address,
            index_count: mesh.index_count(),
        })
    }

    pub fn vertex_buffer(&self) -> &GpuBuffer {
        &self.vertex_buffer
    }

    pub fn index_buffer(&self) -> &GpuBuffer {
        &self.index_buffer
    }

    /// Address pushed to the vertex shader.
    pub fn vertex_address(&self) -> vk::DeviceAddress {
        self.vertex_address
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}
