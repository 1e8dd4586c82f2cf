//! Vulkan abstraction layer for the Flint renderer.
//!
//! This crate provides:
//! - Instance, surface and device lifetimes tied together by [`GpuContext`]
//! - Physical device and queue family selection
//! - Swapchain creation and recreation
//! - Explicit memory-type selection and RAII buffers and images
//! - Staged uploads on the transfer queue
//! - Command, synchronization, descriptor and pipeline helpers

pub mod capabilities;
pub mod command;
pub mod context;
pub mod descriptors;
pub mod device;
pub mod error;
pub mod instance;
pub mod memory;
pub mod pipeline;
pub mod queue;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod upload;

pub use capabilities::{DeviceTypePolicy, GpuCapabilities, GpuVendor};
pub use command::CommandPool;
pub use context::{GpuContext, GpuContextBuilder};
pub use descriptors::{
    write_combined_image_sampler, write_uniform_buffer, DescriptorPool, DescriptorSetLayout,
    DescriptorSetLayoutBuilder,
};
pub use error::{ErrorClass, GpuError, Result, VkResultExt};
pub use instance::{ValidationMode, VulkanInstance};
pub use memory::{find_memory_type, AllocationStats, BufferDesc, DeviceAllocator, GpuBuffer, GpuImage, ImageDesc};
pub use pipeline::{GraphicsPipeline, GraphicsPipelineConfig, PipelineKey};
pub use queue::{select_queue_families, QueueFamilyIndices};
pub use surface::{SurfaceContext, SurfaceSupport};
pub use swapchain::{
    drawable_swapchain_extent, AcquireOutcome, PresentOutcome, Swapchain, SwapchainManager,
    SwapchainPreferences,
};
pub use sync::{Fence, FrameSync};
pub use texture::Texture;
pub use upload::Uploader;
