//! GPU memory management.
//!
//! Every buffer and image gets its own `vkAllocateMemory` allocation on a
//! memory type chosen by [`find_memory_type`]. Resources free themselves on drop.

use crate::error::{GpuError, Result, VkResultExt};
use ash::vk;
use parking_lot::Mutex;
use std::ptr::NonNull;
use std::sync::Arc;

/// First memory type allowed by `type_bits` whose flags include all of `required`.
pub fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32> {
    properties
        .memory_types
        .iter()
        .take(properties.memory_type_count as usize)
        .zip(0u32..)
        .find(|(memory_type, index)| {
            type_bits & (1 << index) != 0 && memory_type.property_flags.contains(required)
        })
        .map(|(_, index)| index)
        .ok_or(GpuError::NoSuitableMemoryType {
            type_bits,
            required,
        })
}

/// Live allocation counters shared by the allocator and its resources.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AllocationStats {
    pub live_allocations: u32,
    pub live_bytes: u64,
    pub peak_bytes: u64,
}

impl AllocationStats {
    fn record_alloc(&mut self, bytes: u64) {
        self.live_allocations += 1;
        self.live_bytes += bytes;
        self.peak_bytes = self.peak_bytes.max(self.live_bytes);
    }

    fn record_free(&mut self, bytes: u64) {
        self.live_allocations = self.live_allocations.saturating_sub(1);
        self.live_bytes = self.live_bytes.saturating_sub(bytes);
    }
}

/// Buffer creation parameters.
#[derive(Debug, Clone, Copy)]
pub struct BufferDesc<'a> {
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    pub memory: vk::MemoryPropertyFlags,
    /// Queue families sharing the buffer; more than one selects `CONCURRENT`.
    pub queue_families: &'a [u32],
}

/// Image creation parameters for 2D single-mip colour images.
#[derive(Debug, Clone, Copy)]
pub struct ImageDesc<'a> {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    /// Queue families sharing the image; more than one selects `CONCURRENT`.
    pub queue_families: &'a [u32],
}

fn sharing_mode(queue_families: &[u32]) -> vk::SharingMode {
    if queue_families.len() > 1 {
        vk::SharingMode::CONCURRENT
    } else {
        vk::SharingMode::EXCLUSIVE
    }
}

/// Device memory allocator.
pub struct DeviceAllocator {
    device: Arc<ash::Device>,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    stats: Arc<Mutex<AllocationStats>>,
}

impl DeviceAllocator {
    /// Create an allocator for a device.
    pub fn new(device: Arc<ash::Device>, memory_properties: vk::PhysicalDeviceMemoryProperties) -> Self {
        Self {
            device,
            memory_properties,
            stats: Arc::new(Mutex::new(AllocationStats::default())),
        }
    }

    /// Snapshot of live allocations.
    pub fn stats(&self) -> AllocationStats {
        *self.stats.lock()
    }

    /// Memory properties the allocator selects from.
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    fn allocate(
        &self,
        requirements: vk::MemoryRequirements,
        required: vk::MemoryPropertyFlags,
        device_address: bool,
    ) -> Result<vk::DeviceMemory> {
        let memory_type_index =
            find_memory_type(&self.memory_properties, requirements.memory_type_bits, required)?;

        let mut flags_info =
            vk::MemoryAllocateFlagsInfo::default().flags(vk::MemoryAllocateFlags::DEVICE_ADDRESS);
        let mut alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        if device_address {
            alloc_info = alloc_info.push_next(&mut flags_info);
        }

        let memory =
            unsafe { self.device.allocate_memory(&alloc_info, None) }.op("vkAllocateMemory")?;
        self.stats.lock().record_alloc(requirements.size);
        Ok(memory)
    }

    /// Create a buffer and bind it to fresh memory.
    ///
    /// Host-visible buffers stay mapped until they are dropped.
    pub fn create_buffer(&self, desc: &BufferDesc<'_>) -> Result<GpuBuffer> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(desc.size)
            .usage(desc.usage)
            .sharing_mode(sharing_mode(desc.queue_families))
            .queue_family_indices(if desc.queue_families.len() > 1 {
                desc.queue_families
            } else {
                &[]
            });

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None) }.op("vkCreateBuffer")?;
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let device_address = desc
            .usage
            .contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS);
        let memory = match self.allocate(requirements, desc.memory, device_address) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let mut gpu_buffer = GpuBuffer {
            device: self.device.clone(),
            stats: self.stats.clone(),
            buffer,
            memory,
            size: desc.size,
            allocation_size: requirements.size,
            usage: desc.usage,
            mapped: None,
        };

        unsafe { self.device.bind_buffer_memory(buffer, memory, 0) }.op("vkBindBufferMemory")?;

        if desc.memory.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            let ptr = unsafe {
                self.device
                    .map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
            }
            .op("vkMapMemory")?;
            gpu_buffer.mapped = NonNull::new(ptr.cast::<u8>());
        }

        Ok(gpu_buffer)
    }

    /// Create a 2D image and bind it to fresh memory.
    pub fn create_image(
        &self,
        desc: &ImageDesc<'_>,
        memory: vk::MemoryPropertyFlags,
    ) -> Result<GpuImage> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(sharing_mode(desc.queue_families))
            .queue_family_indices(if desc.queue_families.len() > 1 {
                desc.queue_families
            } else {
                &[]
            })
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.device.create_image(&create_info, None) }.op("vkCreateImage")?;
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let device_memory = match self.allocate(requirements, memory, false) {
            Ok(m) => m,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let gpu_image = GpuImage {
            device: self.device.clone(),
            stats: self.stats.clone(),
            image,
            memory: device_memory,
            allocation_size: requirements.size,
            format: desc.format,
            extent: desc.extent,
        };

        unsafe { self.device.bind_image_memory(image, device_memory, 0) }
            .op("vkBindImageMemory")?;

        Ok(gpu_image)
    }
}

/// A buffer with its own device memory.
pub struct GpuBuffer {
    device: Arc<ash::Device>,
    stats: Arc<Mutex<AllocationStats>>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: u64,
    allocation_size: u64,
    usage: vk::BufferUsageFlags,
    mapped: Option<NonNull<u8>>,
}

impl GpuBuffer {
    /// Get the raw buffer handle.
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Requested size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Usage flags the buffer was created with.
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    /// Whether the buffer is persistently mapped.
    pub fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }

    /// Get the device address of this buffer.
    pub fn device_address(&self) -> Result<vk::DeviceAddress> {
        if !self.usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS) {
            return Err(GpuError::InvalidState(
                "buffer was not created with SHADER_DEVICE_ADDRESS".to_string(),
            ));
        }
        let info = vk::BufferDeviceAddressInfo::default().buffer(self.buffer);
        Ok(unsafe { self.device.get_buffer_device_address(&info) })
    }

    fn mapped_range(&self, offset: u64, len: usize) -> Result<NonNull<u8>> {
        let ptr = self
            .mapped
            .ok_or_else(|| GpuError::InvalidState("Buffer not mapped".to_string()))?;
        let end = offset
            .checked_add(len as u64)
            .ok_or_else(|| GpuError::InvalidState("Offset overflow".to_string()))?;
        if end > self.size {
            return Err(GpuError::InvalidState(format!(
                "range {offset}..{end} exceeds buffer size {}",
                self.size
            )));
        }
        Ok(ptr)
    }

    /// Write raw bytes to the buffer at the given offset (must be host-visible).
    pub fn write_bytes(&self, offset: u64, data: &[u8]) -> Result<()> {
        let ptr = self.mapped_range(offset, data.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                ptr.as_ptr().add(offset as usize),
                data.len(),
            );
        }
        Ok(())
    }

    /// Write typed data to the start of the buffer (must be host-visible).
    pub fn write<T: bytemuck::Pod>(&self, data: &[T]) -> Result<()> {
        self.write_bytes(0, bytemuck::cast_slice(data))
    }

    /// Copy bytes out of the buffer (must be host-visible).
    pub fn read_bytes(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let ptr = self.mapped_range(offset, len)?;
        let mut out = vec![0u8; len];
        unsafe {
            std::ptr::copy_nonoverlapping(ptr.as_ptr().add(offset as usize), out.as_mut_ptr(), len);
        }
        Ok(out)
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        unsafe {
            if self.mapped.take().is_some() {
                self.device.unmap_memory(self.memory);
            }
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
        self.stats.lock().record_free(self.allocation_size);
    }
}

/// A 2D image with its own device memory.
pub struct GpuImage {
    device: Arc<ash::Device>,
    stats: Arc<Mutex<AllocationStats>>,
    image: vk::Image,
    memory: vk::DeviceMemory,
    allocation_size: u64,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl GpuImage {
    /// Get the raw image handle.
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Pixel format.
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Size in texels.
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
        self.stats.lock().record_free(self.allocation_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, &flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = flags;
        }
        props
    }

    const LOCAL: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
    const HOST: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
        vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw()
            | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
    );

    #[test]
    fn picks_first_superset_match() {
        let props = properties(&[LOCAL, HOST, HOST | vk::MemoryPropertyFlags::HOST_CACHED]);
        assert_eq!(find_memory_type(&props, 0b111, HOST).unwrap(), 1);
        assert_eq!(find_memory_type(&props, 0b111, LOCAL).unwrap(), 0);
    }

    #[test]
    fn respects_type_mask() {
        let props = properties(&[HOST, HOST | vk::MemoryPropertyFlags::HOST_CACHED]);
        assert_eq!(find_memory_type(&props, 0b10, HOST).unwrap(), 1);
    }

    #[test]
    fn partial_match_is_rejected() {
        // HOST_VISIBLE without HOST_COHERENT must not satisfy HOST_VISIBLE|HOST_COHERENT
        let props = properties(&[LOCAL, vk::MemoryPropertyFlags::HOST_VISIBLE]);
        let err = find_memory_type(&props, 0b11, HOST).unwrap_err();
        assert!(matches!(
            err,
            GpuError::NoSuitableMemoryType { type_bits: 0b11, .. }
        ));
    }

    #[test]
    fn empty_requirement_matches_first_allowed() {
        let props = properties(&[LOCAL, HOST]);
        assert_eq!(
            find_memory_type(&props, 0b10, vk::MemoryPropertyFlags::empty()).unwrap(),
            1
        );
    }

    #[test]
    fn types_beyond_count_are_ignored() {
        let mut props = properties(&[LOCAL]);
        props.memory_types[1].property_flags = HOST;
        assert!(find_memory_type(&props, 0b11, HOST).is_err());
    }

    #[test]
    fn stats_track_peak() {
        let mut stats = AllocationStats::default();
        stats.record_alloc(100);
        stats.record_alloc(50);
        stats.record_free(100);
        assert_eq!(stats.live_allocations, 1);
        assert_eq!(stats.live_bytes, 50);
        assert_eq!(stats.peak_bytes, 150);
    }
}
