//! GPU error types.

use ash::vk;
use thiserror::Error;

/// GPU-related errors.
#[derive(Error, Debug)]
pub enum GpuError {
    /// A Vulkan call failed.
    #[error("{operation} failed: {result}")]
    Vulkan {
        operation: &'static str,
        result: vk::Result,
    },

    /// The Vulkan loader could not be opened.
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// Requested instance layers are not installed.
    #[error("Missing instance layers: {}", .0.join(", "))]
    MissingLayers(Vec<String>),

    /// Required instance or device extensions are not supported.
    #[error("Missing extensions: {}", .0.join(", "))]
    MissingExtensions(Vec<String>),

    /// No physical device satisfies the requirements.
    #[error("No suitable GPU found: {0}")]
    NoSuitableDevice(String),

    /// No memory type matches the requested properties.
    #[error("No memory type in mask {type_bits:#x} supports {required:?}")]
    NoSuitableMemoryType {
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    },

    /// Surface creation failed.
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Shader bytecode was rejected before reaching the driver.
    #[error("Invalid shader: {0}")]
    InvalidShader(String),

    /// Invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Coarse classification used to decide how a failure is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Fatal at startup: missing layers, extensions, devices or memory types.
    Setup,
    /// The surface changed; recreate the swapchain and carry on.
    TransientPresentation,
    /// The driver ran out of host, device or pool memory.
    ResourceExhaustion,
    /// Any other failure; the process should exit with a diagnostic.
    FatalGpu,
}

impl GpuError {
    /// Wrap a failed Vulkan call.
    pub const fn vulkan(operation: &'static str, result: vk::Result) -> Self {
        Self::Vulkan { operation, result }
    }

    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Vulkan { result, .. } => match *result {
                vk::Result::ERROR_OUT_OF_DATE_KHR => ErrorClass::TransientPresentation,
                vk::Result::ERROR_OUT_OF_HOST_MEMORY
                | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
                | vk::Result::ERROR_OUT_OF_POOL_MEMORY
                | vk::Result::ERROR_FRAGMENTED_POOL => ErrorClass::ResourceExhaustion,
                _ => ErrorClass::FatalGpu,
            },
            Self::Loading(_)
            | Self::MissingLayers(_)
            | Self::MissingExtensions(_)
            | Self::NoSuitableDevice(_)
            | Self::NoSuitableMemoryType { .. }
            | Self::SurfaceCreation(_)
            | Self::InvalidShader(_) => ErrorClass::Setup,
            Self::InvalidState(_) => ErrorClass::FatalGpu,
        }
    }

    /// The raw result code, if this came from a Vulkan call.
    pub const fn vk_result(&self) -> Option<vk::Result> {
        match self {
            Self::Vulkan { result, .. } => Some(*result),
            _ => None,
        }
    }
}

/// Attach the failing operation to a raw Vulkan result.
pub trait VkResultExt<T> {
    fn op(self, operation: &'static str) -> Result<T>;
}

impl<T> VkResultExt<T> for std::result::Result<T, vk::Result> {
    #[inline]
    fn op(self, operation: &'static str) -> Result<T> {
        self.map_err(|result| GpuError::vulkan(operation, result))
    }
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, GpuError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_date_is_transient() {
        let err = GpuError::vulkan("vkQueuePresentKHR", vk::Result::ERROR_OUT_OF_DATE_KHR);
        assert_eq!(err.class(), ErrorClass::TransientPresentation);
    }

    #[test]
    fn memory_exhaustion_is_classified() {
        for result in [
            vk::Result::ERROR_OUT_OF_HOST_MEMORY,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            vk::Result::ERROR_OUT_OF_POOL_MEMORY,
            vk::Result::ERROR_FRAGMENTED_POOL,
        ] {
            assert_eq!(
                GpuError::vulkan("vkAllocateMemory", result).class(),
                ErrorClass::ResourceExhaustion
            );
        }
    }

    #[test]
    fn device_lost_is_fatal() {
        let err = GpuError::vulkan("vkQueueSubmit2", vk::Result::ERROR_DEVICE_LOST);
        assert_eq!(err.class(), ErrorClass::FatalGpu);
        assert_eq!(err.vk_result(), Some(vk::Result::ERROR_DEVICE_LOST));
    }

    #[test]
    fn setup_errors() {
        assert_eq!(
            GpuError::MissingLayers(vec!["VK_LAYER_KHRONOS_validation".into()]).class(),
            ErrorClass::Setup
        );
        assert_eq!(
            GpuError::NoSuitableMemoryType {
                type_bits: 0,
                required: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            }
            .class(),
            ErrorClass::Setup
        );
    }

    #[test]
    fn message_names_operation() {
        let err: Result<()> = Err(vk::Result::ERROR_INITIALIZATION_FAILED).op("vkCreateDevice");
        let text = err.unwrap_err().to_string();
        assert!(text.starts_with("vkCreateDevice failed"));
    }

    #[test]
    fn missing_names_are_listed() {
        let err = GpuError::MissingExtensions(vec!["VK_KHR_swapchain".into(), "VK_EXT_x".into()]);
        assert_eq!(err.to_string(), "Missing extensions: VK_KHR_swapchain, VK_EXT_x");
    }
}
