//! GPU capability detection and device type policy.

use crate::error::{Result, VkResultExt};
use ash::vk;
use std::collections::HashSet;

/// GPU vendor identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    /// Identify vendor from PCI vendor ID.
    pub const fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Which physical device types may be selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceTypePolicy {
    /// Only discrete GPUs are acceptable.
    DiscreteOnly,
    /// Any type is acceptable. Device type ranks first (discrete, then
    /// integrated, then virtual, then the rest); VRAM only orders devices
    /// of the same type.
    #[default]
    PreferDiscrete,
    /// Any type is acceptable; ranked by VRAM, enumeration order among equals.
    Any,
}

impl DeviceTypePolicy {
    /// Whether a device of this type may be selected at all.
    pub fn accepts(self, device_type: vk::PhysicalDeviceType) -> bool {
        match self {
            Self::DiscreteOnly => device_type == vk::PhysicalDeviceType::DISCRETE_GPU,
            Self::PreferDiscrete | Self::Any => true,
        }
    }

    /// Ranking of acceptable devices, higher is better.
    pub fn score(self, caps: &GpuCapabilities) -> u64 {
        let type_score = match self {
            Self::Any => 0,
            Self::DiscreteOnly | Self::PreferDiscrete => match caps.device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
                vk::PhysicalDeviceType::VIRTUAL_GPU => 50,
                _ => 0,
            },
        };
        // +1 per GB of VRAM
        type_score + caps.device_local_memory_mb / 1024
    }
}

/// Detected GPU capabilities.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    /// GPU vendor
    pub vendor: GpuVendor,
    /// Device name
    pub device_name: String,
    /// Device type
    pub device_type: vk::PhysicalDeviceType,
    /// Vulkan API version
    pub api_version: u32,
    /// Driver version
    pub driver_version: u32,

    /// Dynamic rendering support (VK 1.3 core)
    pub supports_dynamic_rendering: bool,
    /// Synchronization2 support (VK 1.3 core)
    pub supports_synchronization2: bool,
    /// Buffer device address support (VK 1.2 core)
    pub supports_buffer_device_address: bool,
    /// Multi-draw indirect support
    pub supports_multi_draw_indirect: bool,

    /// Device-local memory in MB
    pub device_local_memory_mb: u64,

    // Available extensions
    pub available_extensions: HashSet<String>,
}

impl GpuCapabilities {
    /// Query capabilities from a physical device.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Result<Self> {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        let available_extensions: HashSet<String> =
            unsafe { instance.enumerate_device_extension_properties(physical_device) }
                .op("vkEnumerateDeviceExtensionProperties")?
                .iter()
                .filter_map(|ext| {
                    ext.extension_name_as_c_str()
                        .ok()
                        .map(|n| n.to_string_lossy().into_owned())
                })
                .collect();

        let device_name = properties
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "<unnamed>".to_string());

        let device_local_memory_mb: u64 = memory_properties
            .memory_heaps
            .iter()
            .take(memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        let mut caps = Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name,
            device_type: properties.device_type,
            api_version: properties.api_version,
            driver_version: properties.driver_version,
            supports_dynamic_rendering: false,
            supports_synchronization2: false,
            supports_buffer_device_address: false,
            supports_multi_draw_indirect: false,
            device_local_memory_mb,
            available_extensions,
        };

        // The 1.2/1.3 feature structs may only be chained on a 1.3 device
        if caps.has_vulkan_1_3() {
            let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default();
            let mut vulkan_1_2_features = vk::PhysicalDeviceVulkan12Features::default();
            let mut features2 = vk::PhysicalDeviceFeatures2::default()
                .push_next(&mut vulkan_1_3_features)
                .push_next(&mut vulkan_1_2_features);
            unsafe { instance.get_physical_device_features2(physical_device, &mut features2) };
            caps.supports_multi_draw_indirect = features2.features.multi_draw_indirect == vk::TRUE;

            caps.supports_dynamic_rendering = vulkan_1_3_features.dynamic_rendering == vk::TRUE;
            caps.supports_synchronization2 = vulkan_1_3_features.synchronization2 == vk::TRUE;
            caps.supports_buffer_device_address =
                vulkan_1_2_features.buffer_device_address == vk::TRUE;
        } else {
            let features = unsafe { instance.get_physical_device_features(physical_device) };
            caps.supports_multi_draw_indirect = features.multi_draw_indirect == vk::TRUE;
        }

        Ok(caps)
    }

    /// Whether the device reports at least Vulkan 1.3.
    pub fn has_vulkan_1_3(&self) -> bool {
        let major = vk::api_version_major(self.api_version);
        let minor = vk::api_version_minor(self.api_version);
        major > 1 || (major == 1 && minor >= 3)
    }

    /// Whether a device extension is available.
    pub fn has_extension(&self, name: &std::ffi::CStr) -> bool {
        self.available_extensions
            .contains(name.to_string_lossy().as_ref())
    }

    /// Reasons this device cannot run the renderer; empty when it can.
    pub fn unmet_requirements(&self, policy: DeviceTypePolicy, presenting: bool) -> Vec<String> {
        let mut unmet = Vec::new();
        if !self.has_vulkan_1_3() {
            unmet.push(format!(
                "Vulkan {}.{} < 1.3",
                vk::api_version_major(self.api_version),
                vk::api_version_minor(self.api_version)
            ));
        }
        if !policy.accepts(self.device_type) {
            unmet.push(format!("device type {:?} rejected by {policy:?}", self.device_type));
        }
        let features = [
            (self.supports_dynamic_rendering, "dynamicRendering"),
            (self.supports_synchronization2, "synchronization2"),
            (self.supports_buffer_device_address, "bufferDeviceAddress"),
            (self.supports_multi_draw_indirect, "multiDrawIndirect"),
        ];
        unmet.extend(
            features
                .iter()
                .filter(|(supported, _)| !supported)
                .map(|(_, name)| format!("missing feature {name}")),
        );
        if presenting && !self.has_extension(ash::khr::swapchain::NAME) {
            unmet.push("missing extension VK_KHR_swapchain".to_string());
        }
        unmet
    }

    /// Get a human-readable summary of capabilities.
    pub fn summary(&self) -> String {
        format!(
            "{} ({:?}, {:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name,
            self.vendor,
            self.device_type,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}
