//! Vulkan instance creation.

use crate::error::{GpuError, Result, VkResultExt};
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::borrow::Cow;
use std::ffi::{c_char, c_void, CStr, CString};

/// Khronos validation layer.
pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// How validation layers are requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    /// Never enable validation.
    Disabled,
    /// Enable validation if the layer is installed, warn otherwise.
    Preferred,
    /// Fail instance creation if the layer is missing.
    Required,
}

impl ValidationMode {
    /// Debug builds prefer validation, release builds disable it.
    pub const fn for_build() -> Self {
        if cfg!(debug_assertions) {
            Self::Preferred
        } else {
            Self::Disabled
        }
    }
}

impl Default for ValidationMode {
    fn default() -> Self {
        Self::for_build()
    }
}

/// Names from `required` that are absent from `available`.
pub fn missing_names(required: &[&CStr], available: &[String]) -> Vec<String> {
    required
        .iter()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !available.iter().any(|a| a == name))
        .collect()
}

/// Owned Vulkan instance with an optional validation messenger.
pub struct VulkanInstance {
    entry: ash::Entry,
    instance: ash::Instance,
    debug: Option<DebugMessenger>,
}

struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl VulkanInstance {
    /// Load Vulkan and create an instance.
    ///
    /// `display` adds the window-system surface extensions; pass `None` for
    /// a headless instance.
    pub fn new(
        app_name: &str,
        validation: ValidationMode,
        display: Option<RawDisplayHandle>,
    ) -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| GpuError::Loading(e.to_string()))?;

        let app_name = CString::new(app_name)
            .map_err(|_| GpuError::InvalidState("application name contains NUL".to_string()))?;
        let engine_name = CString::new(flint_core::constants::ENGINE_NAME)
            .map_err(|_| GpuError::InvalidState("engine name contains NUL".to_string()))?;

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        // Layers
        let available_layers: Vec<String> = unsafe { entry.enumerate_instance_layer_properties() }
            .op("vkEnumerateInstanceLayerProperties")?
            .iter()
            .map(|props| {
                props
                    .layer_name_as_c_str()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
            .collect();

        let enable_validation = match validation {
            ValidationMode::Disabled => false,
            ValidationMode::Preferred | ValidationMode::Required => {
                let missing = missing_names(&[VALIDATION_LAYER], &available_layers);
                if missing.is_empty() {
                    true
                } else if validation == ValidationMode::Required {
                    return Err(GpuError::MissingLayers(missing));
                } else {
                    tracing::warn!("Validation layer {} not available", missing.join(", "));
                    false
                }
            }
        };
        let layer_names: Vec<*const c_char> = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        // Extensions
        let mut extensions: Vec<&CStr> = Vec::new();
        if let Some(display) = display {
            let surface_exts = ash_window::enumerate_required_extensions(display)
                .op("vkEnumerateRequiredSurfaceExtensions")?;
            extensions.extend(
                surface_exts
                    .iter()
                    .map(|&ptr| unsafe { CStr::from_ptr(ptr) }),
            );
        }
        if enable_validation {
            extensions.push(ash::ext::debug_utils::NAME);
        }
        #[cfg(target_os = "macos")]
        extensions.push(ash::khr::portability_enumeration::NAME);

        let available_extensions: Vec<String> =
            unsafe { entry.enumerate_instance_extension_properties(None) }
                .op("vkEnumerateInstanceExtensionProperties")?
                .iter()
                .map(|props| {
                    props
                        .extension_name_as_c_str()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default()
                })
                .collect();
        let missing = missing_names(&extensions, &available_extensions);
        if !missing.is_empty() {
            return Err(GpuError::MissingExtensions(missing));
        }
        let extension_names: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();

        // Required for MoltenVK on macOS
        #[cfg(target_os = "macos")]
        let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        #[cfg(not(target_os = "macos"))]
        let create_flags = vk::InstanceCreateFlags::empty();

        let mut debug_info = debug_messenger_info();
        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_names)
            .enabled_layer_names(&layer_names)
            .flags(create_flags);
        if enable_validation {
            // Also covers messages from vkCreateInstance itself
            create_info = create_info.push_next(&mut debug_info);
        }

        let instance =
            unsafe { entry.create_instance(&create_info, None) }.op("vkCreateInstance")?;

        let debug = if enable_validation {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
            match unsafe { loader.create_debug_utils_messenger(&debug_messenger_info(), None) } {
                Ok(messenger) => Some(DebugMessenger { loader, messenger }),
                Err(result) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(GpuError::vulkan("vkCreateDebugUtilsMessengerEXT", result));
                }
            }
        } else {
            None
        };

        tracing::info!(validation = enable_validation, "Created Vulkan instance");

        Ok(Self {
            entry,
            instance,
            debug,
        })
    }

    /// Get the loader entry points.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }

    /// Get the Vulkan instance handle.
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Whether the validation layer is active.
    pub fn validation_enabled(&self) -> bool {
        self.debug.is_some()
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some(debug) = self.debug.take() {
                debug
                    .loader
                    .destroy_debug_utils_messenger(debug.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

/// Forward validation messages to `tracing`.
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    kind: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = if data.is_null() || unsafe { (*data).p_message.is_null() } {
        Cow::Borrowed("")
    } else {
        unsafe { CStr::from_ptr((*data).p_message) }.to_string_lossy()
    };

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::error!(target: "vulkan", ?kind, "{message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::warn!(target: "vulkan", ?kind, "{message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        tracing::debug!(target: "vulkan", ?kind, "{message}");
    } else {
        tracing::trace!(target: "vulkan", ?kind, "{message}");
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_names_reports_only_absent() {
        let available = vec![
            "VK_KHR_surface".to_string(),
            "VK_KHR_xlib_surface".to_string(),
        ];
        let missing = missing_names(
            &[ash::khr::surface::NAME, ash::ext::debug_utils::NAME],
            &available,
        );
        assert_eq!(missing, vec!["VK_EXT_debug_utils".to_string()]);
    }

    #[test]
    fn nothing_missing_when_all_present() {
        let available = vec!["VK_LAYER_KHRONOS_validation".to_string()];
        assert!(missing_names(&[VALIDATION_LAYER], &available).is_empty());
    }

    #[test]
    fn release_builds_disable_validation() {
        let mode = ValidationMode::for_build();
        if cfg!(debug_assertions) {
            assert_eq!(mode, ValidationMode::Preferred);
        } else {
            assert_eq!(mode, ValidationMode::Disabled);
        }
    }
}
