//! Real device without a surface, for tests that need hardware.

use ash::vk;
use flint_gpu::{DeviceTypePolicy, GpuBuffer, GpuContext, GpuContextBuilder, Uploader, ValidationMode};

use crate::{Result, TestError};

/// Headless GPU context with an uploader.
///
/// The uploader is dropped before the context.
pub struct HeadlessGpu {
    uploader: Uploader,
    context: GpuContext,
}

impl HeadlessGpu {
    /// Create a headless context on any Vulkan 1.3 device.
    pub fn new() -> Result<Self> {
        let context = GpuContextBuilder::new()
            .app_name("flint-test")
            .validation(ValidationMode::Preferred)
            .device_policy(DeviceTypePolicy::Any)
            .build_headless()?;
        let uploader = Uploader::new(&context)?;

        tracing::info!("Headless GPU: {}", context.capabilities().summary());
        Ok(Self { uploader, context })
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    pub fn uploader(&self) -> &Uploader {
        &self.uploader
    }

    /// Stage `data` into a device-local buffer.
    pub fn upload(&self, data: &[u8]) -> Result<GpuBuffer> {
        Ok(self.uploader.upload_buffer(
            self.context.allocator(),
            data,
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC,
        )?)
    }

    /// Upload `data`, read it back and check it survived unchanged.
    pub fn round_trip(&self, data: &[u8]) -> Result<Vec<u8>> {
        let buffer = self.upload(data)?;
        let read = self.uploader.read_back(self.context.allocator(), &buffer)?;
        if read != data {
            let first = read
                .iter()
                .zip(data)
                .position(|(a, b)| a != b)
                .unwrap_or(read.len().min(data.len()));
            return Err(TestError::Mismatch(format!(
                "{} bytes uploaded, {} read back, first difference at byte {first}",
                data.len(),
                read.len()
            )));
        }
        Ok(read)
    }
}
