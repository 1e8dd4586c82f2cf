//! Per-slot GPU resources: command buffer, sync primitives, uniform buffer.

use ash::vk;
use flint_core::FrameUniforms;
use flint_gpu::{BufferDesc, CommandPool, FrameSync, GpuBuffer, GpuContext, Result};

/// Resources owned by one frame slot.
pub struct FrameSlot {
    pub sync: FrameSync,
    pub command_buffer: vk::CommandBuffer,
    /// Host-visible, persistently mapped `FrameUniforms`.
    pub uniforms: GpuBuffer,
}

/// All frame slots plus the pool their command buffers come from.
///
/// Slots are dropped before the pool.
pub struct FrameSlots {
    slots: Vec<FrameSlot>,
    pool: CommandPool,
}

impl FrameSlots {
    /// Create `count` slots on the graphics family.
    pub fn new(gpu: &GpuContext, count: usize) -> Result<Self> {
        let pool = CommandPool::new(
            gpu.device().clone(),
            gpu.families().graphics,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?;
        let command_buffers = pool.allocate_command_buffers(count as u32)?;

        let mut slots = Vec::with_capacity(count);
        for command_buffer in command_buffers {
            let uniforms = gpu.allocator().create_buffer(&BufferDesc {
                size: FrameUniforms::SIZE,
                usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
                memory: vk::MemoryPropertyFlags::HOST_VISIBLE
                    | vk::MemoryPropertyFlags::HOST_COHERENT,
                queue_families: &[],
            })?;
            slots.push(FrameSlot {
                sync: FrameSync::new(gpu.device().clone())?,
                command_buffer,
                uniforms,
            });
        }

        tracing::debug!(count, "Created frame slots");
        Ok(Self { slots, pool })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, slot: usize) -> Result<&FrameSlot> {
        self.slots.get(slot).ok_or_else(|| {
            flint_gpu::GpuError::InvalidState(format!("no frame slot {slot}"))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameSlot> {
        self.slots.iter()
    }

    pub fn pool(&self) -> &CommandPool {
        &self.pool
    }
}
