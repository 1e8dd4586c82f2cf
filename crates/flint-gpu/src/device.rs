//! Physical device selection and logical device creation.

use crate::capabilities::{DeviceTypePolicy, GpuCapabilities};
use crate::error::{GpuError, Result, VkResultExt};
use crate::instance::VulkanInstance;
use crate::queue::{select_queue_families, QueueFamilyIndices};
use crate::surface::SurfaceContext;
use ash::vk;
use std::ffi::c_char;
use std::sync::Arc;

/// A physical device that passed selection.
pub struct SelectedDevice {
    pub physical_device: vk::PhysicalDevice,
    pub capabilities: GpuCapabilities,
    pub families: QueueFamilyIndices,
}

/// Pick the best physical device for `surface`, or for headless use when `None`.
pub fn select_physical_device(
    instance: &VulkanInstance,
    surface: Option<&SurfaceContext>,
    policy: DeviceTypePolicy,
) -> Result<SelectedDevice> {
    let devices = unsafe { instance.handle().enumerate_physical_devices() }
        .op("vkEnumeratePhysicalDevices")?;

    if devices.is_empty() {
        return Err(GpuError::NoSuitableDevice(
            "no Vulkan physical devices".to_string(),
        ));
    }

    let mut best: Option<(u64, SelectedDevice)> = None;
    let mut rejections = Vec::new();

    for physical_device in devices {
        let capabilities =
            match unsafe { GpuCapabilities::query(instance.handle(), physical_device) } {
                Ok(capabilities) => capabilities,
                Err(e) => {
                    tracing::debug!(device = ?physical_device, error = %e, "Rejected device");
                    rejections.push(format!("{physical_device:?}: {e}"));
                    continue;
                }
            };
        match evaluate(instance, surface, policy, physical_device, &capabilities) {
            Ok(families) => {
                let score = policy.score(&capabilities);
                tracing::debug!(device = %capabilities.device_name, score, "Suitable device");
                // Strictly greater keeps enumeration order among equals
                if best.as_ref().map_or(true, |(s, _)| score > *s) {
                    best = Some((
                        score,
                        SelectedDevice {
                            physical_device,
                            capabilities,
                            families,
                        },
                    ));
                }
            }
            Err(reasons) => {
                tracing::debug!(
                    device = %capabilities.device_name,
                    reasons = %reasons.join("; "),
                    "Rejected device"
                );
                rejections.push(format!("{}: {}", capabilities.device_name, reasons.join("; ")));
            }
        }
    }

    let (_, selected) = best.ok_or_else(|| GpuError::NoSuitableDevice(rejections.join(" | ")))?;
    tracing::info!("Selected GPU: {}", selected.capabilities.summary());
    Ok(selected)
}

/// Check one device, returning its queue families or the reasons it was rejected.
fn evaluate(
    instance: &VulkanInstance,
    surface: Option<&SurfaceContext>,
    policy: DeviceTypePolicy,
    physical_device: vk::PhysicalDevice,
    capabilities: &GpuCapabilities,
) -> std::result::Result<QueueFamilyIndices, Vec<String>> {
    let mut reasons = capabilities.unmet_requirements(policy, surface.is_some());

    let families = unsafe {
        instance
            .handle()
            .get_physical_device_queue_family_properties(physical_device)
    };

    let indices = match surface {
        Some(surface) => {
            let present = (0..families.len() as u32)
                .map(|family| surface.supports_present(physical_device, family))
                .collect::<Result<Vec<_>>>();
            let adequate = surface
                .support(physical_device)
                .map(|support| support.is_adequate());
            let Some(present) = surface_rejections(present, adequate, &mut reasons) else {
                return Err(reasons);
            };
            let supports = |family: u32| present[family as usize];
            select_queue_families(&families, Some(&supports))
        }
        None => select_queue_families(&families, None),
    };

    match indices {
        Some(indices) if reasons.is_empty() => Ok(indices),
        Some(_) => Err(reasons),
        None => {
            reasons.push("missing graphics or present queue family".to_string());
            Err(reasons)
        }
    }
}

/// Turn the surface queries for one device into rejection reasons.
///
/// Returns the per-family present support when both queries succeeded. A
/// failed query rejects only this device.
fn surface_rejections(
    present: Result<Vec<bool>>,
    adequate: Result<bool>,
    reasons: &mut Vec<String>,
) -> Option<Vec<bool>> {
    match adequate {
        Ok(true) => {}
        Ok(false) => reasons.push("surface reports no formats or present modes".to_string()),
        Err(e) => reasons.push(format!("surface support query failed: {e}")),
    }
    match present {
        Ok(present) => Some(present),
        Err(e) => {
            reasons.push(format!("present support query failed: {e}"));
            None
        }
    }
}

/// Logical device with its queues.
pub struct DeviceContext {
    device: Arc<ash::Device>,
    physical_device: vk::PhysicalDevice,
    capabilities: GpuCapabilities,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    families: QueueFamilyIndices,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    transfer_queue: vk::Queue,
}

impl DeviceContext {
    /// Create the logical device with one queue per distinct family.
    pub fn new(instance: &VulkanInstance, selected: SelectedDevice, presenting: bool) -> Result<Self> {
        let SelectedDevice {
            physical_device,
            capabilities,
            families,
        } = selected;

        let queue_priority = 1.0_f32;
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(std::slice::from_ref(&queue_priority))
            })
            .collect();

        let extension_names: Vec<*const c_char> = if presenting {
            vec![ash::khr::swapchain::NAME.as_ptr()]
        } else {
            Vec::new()
        };

        // Enable Vulkan 1.3 features
        let mut vulkan_1_3_features = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        // Enable Vulkan 1.2 features
        let mut vulkan_1_2_features =
            vk::PhysicalDeviceVulkan12Features::default().buffer_device_address(true);

        let features = vk::PhysicalDeviceFeatures::default().multi_draw_indirect(true);

        let mut features2 = vk::PhysicalDeviceFeatures2::default()
            .features(features)
            .push_next(&mut vulkan_1_3_features)
            .push_next(&mut vulkan_1_2_features);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut features2);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device, &device_create_info, None)
        }
        .op("vkCreateDevice")?;

        let memory_properties = unsafe {
            instance
                .handle()
                .get_physical_device_memory_properties(physical_device)
        };

        let (graphics_queue, present_queue, transfer_queue) = unsafe {
            (
                device.get_device_queue(families.graphics, 0),
                device.get_device_queue(families.present, 0),
                device.get_device_queue(families.transfer, 0),
            )
        };

        tracing::info!(
            graphics = families.graphics,
            present = families.present,
            transfer = families.transfer,
            "Created logical device"
        );

        Ok(Self {
            device: Arc::new(device),
            physical_device,
            capabilities,
            memory_properties,
            families,
            graphics_queue,
            present_queue,
            transfer_queue,
        })
    }

    /// Get the Vulkan device handle.
    pub fn device(&self) -> &Arc<ash::Device> {
        &self.device
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get GPU capabilities.
    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    /// Memory heaps and types of the physical device.
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    /// Queue family indices.
    pub fn families(&self) -> QueueFamilyIndices {
        self.families
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the present queue.
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Get the transfer queue.
    pub fn transfer_queue(&self) -> vk::Queue {
        self.transfer_queue
    }

    /// Wait for device to be idle.
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.op("vkDeviceWaitIdle")
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_surface_query_rejects_only_that_device() {
        let mut reasons = Vec::new();
        let present = surface_rejections(
            Ok(vec![true, false]),
            Err(GpuError::vulkan(
                "vkGetPhysicalDeviceSurfaceFormatsKHR",
                vk::Result::ERROR_SURFACE_LOST_KHR,
            )),
            &mut reasons,
        );
        assert_eq!(present, Some(vec![true, false]));
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].starts_with("surface support query failed"));
    }

    #[test]
    fn failed_present_query_yields_no_families() {
        let mut reasons = Vec::new();
        let present = surface_rejections(
            Err(GpuError::vulkan(
                "vkGetPhysicalDeviceSurfaceSupportKHR",
                vk::Result::ERROR_SURFACE_LOST_KHR,
            )),
            Ok(true),
            &mut reasons,
        );
        assert_eq!(present, None);
        assert_eq!(reasons.len(), 1);
        assert!(reasons[0].starts_with("present support query failed"));
    }

    #[test]
    fn inadequate_surface_is_a_reason_not_an_error() {
        let mut reasons = Vec::new();
        let present = surface_rejections(Ok(vec![true]), Ok(false), &mut reasons);
        assert_eq!(present, Some(vec![true]));
        assert_eq!(reasons, vec!["surface reports no formats or present modes".to_string()]);
    }
}
