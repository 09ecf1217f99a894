//! Vulkan context management
//!
//! Headless instance and logical device creation. No surface or swapchain
//! is involved; every object here is released by `Drop` in reverse order of
//! creation.

use std::collections::HashSet;
use std::ffi::{c_char, CStr, CString};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ash::extensions::ext::DebugUtils;
use ash::{vk, Entry, Instance};
use thiserror::Error;

use crate::core::config::RendererConfig;
use crate::foundation::memory::align_up;

const VALIDATION_LAYER: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };
const ENGINE_NAME: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"vk_scene\0") };

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Device handle is null, not ready or lost
    #[error("Device unavailable: {reason}")]
    DeviceUnavailable {
        /// What was attempted
        reason: String,
    },

    /// Native allocation of memory, buffers, images or descriptor sets refused
    #[error("Out of resources allocating {resource}: {result:?}")]
    ResourceExhausted {
        /// Kind of object being allocated
        resource: &'static str,
        /// Result code returned by the driver
        result: vk::Result,
    },

    /// No memory type or format satisfies the requested properties
    #[error("Unsupported feature: {feature}")]
    FeatureUnsupported {
        /// Description of the missing capability
        feature: String,
    },

    /// Requested layer or extension not present
    #[error("Extension or layer unavailable: {name}")]
    ExtensionUnavailable {
        /// Layer or extension name
        name: String,
    },

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),
}

impl VulkanError {
    /// Classify a raw result returned by an operation on `resource`
    pub fn from_result(resource: &'static str, result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY
            | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
            | vk::Result::ERROR_OUT_OF_POOL_MEMORY
            | vk::Result::ERROR_FRAGMENTED_POOL
            | vk::Result::ERROR_FRAGMENTATION
            | vk::Result::ERROR_TOO_MANY_OBJECTS => Self::ResourceExhausted { resource, result },
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceUnavailable {
                reason: format!("device lost during {resource}"),
            },
            vk::Result::ERROR_FEATURE_NOT_PRESENT | vk::Result::ERROR_FORMAT_NOT_SUPPORTED => {
                Self::FeatureUnsupported {
                    feature: format!("{resource}: {result:?}"),
                }
            }
            vk::Result::ERROR_EXTENSION_NOT_PRESENT | vk::Result::ERROR_LAYER_NOT_PRESENT => {
                Self::ExtensionUnavailable {
                    name: format!("{resource}: {result:?}"),
                }
            }
            other => Self::Api(other),
        }
    }

    /// Closure form of [`from_result`](Self::from_result) for `map_err`
    pub fn creating(resource: &'static str) -> impl Fn(vk::Result) -> Self {
        move |result| Self::from_result(resource, result)
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    entry: Entry,
    instance: Instance,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create a headless instance, with validation as configured
    pub fn new(config: &RendererConfig) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e}")))?;

        let app_name = CString::new(config.application_name.as_str())
            .map_err(|_| VulkanError::InitializationFailed("Application name contains NUL".to_string()))?;
        let (major, minor, patch) = config.application_version;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, major, minor, patch))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        let validation = Self::resolve_validation(&entry, config)?;

        let mut extensions: Vec<*const c_char> = Vec::new();
        let mut layers: Vec<*const c_char> = Vec::new();
        if validation {
            extensions.push(DebugUtils::name().as_ptr());
            layers.push(VALIDATION_LAYER.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .map_err(VulkanError::creating("instance"))?;

        let debug = if validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::setup_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        log::info!(
            "Created Vulkan instance for '{}' (validation {})",
            config.application_name,
            if validation { "on" } else { "off" }
        );

        Ok(Self { entry, instance, debug })
    }

    fn resolve_validation(entry: &Entry, config: &RendererConfig) -> VulkanResult<bool> {
        if !config.validation_requested() {
            return Ok(false);
        }

        let layers = entry
            .enumerate_instance_layer_properties()
            .map_err(VulkanError::creating("instance layer list"))?;
        let available = layers
            .iter()
            .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER);

        if available {
            Ok(true)
        } else if config.validation_required() {
            Err(VulkanError::ExtensionUnavailable {
                name: VALIDATION_LAYER.to_string_lossy().into_owned(),
            })
        } else {
            log::warn!("Validation layer not installed; continuing without it");
            Ok(false)
        }
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .map_err(VulkanError::creating("debug messenger"))
    }

    /// Vulkan loader entry points
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Raw instance
    pub fn raw(&self) -> &Instance {
        &self.instance
    }

    /// Whether validation messages are being forwarded to the log
    pub fn validation_enabled(&self) -> bool {
        self.debug.is_some()
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Names of all supported device extensions
    pub extensions: HashSet<CString>,
}

impl PhysicalDeviceInfo {
    /// Pick a device: discrete GPUs first, integrated ones only if allowed
    pub fn select(instance: &Instance, config: &RendererConfig) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices() }
            .map_err(VulkanError::creating("physical device list"))?;

        let mut candidates: Vec<Self> = devices
            .into_iter()
            .filter_map(|device| match Self::evaluate(instance, device) {
                Ok(info) => Some(info),
                Err(e) => {
                    log::debug!("Skipping physical device {:?}: {}", device, e);
                    None
                }
            })
            .filter(|info| Self::type_allowed(info.properties.device_type, config.allow_integrated_gpu))
            .collect();

        candidates.sort_by_key(|info| Self::type_rank(info.properties.device_type));

        let info = candidates.into_iter().next().ok_or_else(|| VulkanError::DeviceUnavailable {
            reason: if config.allow_integrated_gpu {
                "no GPU with a graphics queue found".to_string()
            } else {
                "no discrete GPU found and integrated GPUs are not allowed".to_string()
            },
        })?;

        log::info!("Selected GPU: {} ({:?})", info.name(), info.properties.device_type);
        Ok(info)
    }

    fn evaluate(instance: &Instance, device: vk::PhysicalDevice) -> VulkanResult<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let features = unsafe { instance.get_physical_device_features(device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };

        let graphics_family = queue_families
            .iter()
            .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .and_then(|index| u32::try_from(index).ok())
            .ok_or_else(|| VulkanError::FeatureUnsupported {
                feature: "graphics queue family".to_string(),
            })?;

        let extensions = unsafe { instance.enumerate_device_extension_properties(device) }
            .map_err(VulkanError::creating("device extension list"))?
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }.to_owned())
            .collect();

        Ok(Self {
            device,
            properties,
            features,
            memory_properties,
            graphics_family,
            extensions,
        })
    }

    fn type_allowed(device_type: vk::PhysicalDeviceType, allow_integrated: bool) -> bool {
        match device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => true,
            vk::PhysicalDeviceType::INTEGRATED_GPU
            | vk::PhysicalDeviceType::VIRTUAL_GPU
            | vk::PhysicalDeviceType::CPU => allow_integrated,
            _ => false,
        }
    }

    fn type_rank(device_type: vk::PhysicalDeviceType) -> u8 {
        match device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => 0,
            vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
            vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
            vk::PhysicalDeviceType::CPU => 3,
            _ => 4,
        }
    }

    /// Human-readable device name
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    /// Whether the device offers an extension
    pub fn supports_extension(&self, name: &CStr) -> bool {
        self.extensions.contains(name)
    }
}

/// Split requested extensions into those to enable and those missing.
///
/// Missing required extensions are an error; missing optional ones are
/// only reported.
pub fn resolve_device_extensions(
    available: &HashSet<CString>,
    required: &[String],
    optional: &[String],
) -> VulkanResult<(Vec<CString>, Vec<String>)> {
    let to_cstring = |name: &String| {
        CString::new(name.as_str()).map_err(|_| VulkanError::ExtensionUnavailable { name: name.clone() })
    };

    let mut enabled = Vec::new();
    for name in required {
        let cname = to_cstring(name)?;
        if !available.contains(&cname) {
            return Err(VulkanError::ExtensionUnavailable { name: name.clone() });
        }
        enabled.push(cname);
    }

    let mut skipped = Vec::new();
    for name in optional {
        let cname = to_cstring(name)?;
        if available.contains(&cname) {
            if !enabled.contains(&cname) {
                enabled.push(cname);
            }
        } else {
            skipped.push(name.clone());
        }
    }

    Ok((enabled, skipped))
}

/// Logical device wrapper with RAII cleanup
///
/// Keeps its instance alive through an `Arc`, so a device can be shared by
/// every mesh and wrapper that allocates from it.
pub struct Device {
    device: ash::Device,
    graphics_queue: vk::Queue,
    physical: PhysicalDeviceInfo,
    enabled_extensions: Vec<CString>,
    ready: AtomicBool,
    instance: Arc<VulkanInstance>,
}

impl Device {
    /// Select a physical device and create the logical device and its
    /// graphics queue
    pub fn new(instance: Arc<VulkanInstance>, config: &RendererConfig) -> VulkanResult<Self> {
        let physical = PhysicalDeviceInfo::select(instance.raw(), config)?;

        let (enabled_extensions, skipped) = resolve_device_extensions(
            &physical.extensions,
            &config.required_device_extensions,
            &config.optional_device_extensions,
        )?;
        for name in &skipped {
            log::warn!("Optional device extension {name} not available on {}", physical.name());
        }

        let priorities = [1.0];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(physical.graphics_family)
            .queue_priorities(&priorities)
            .build()];

        let extension_ptrs: Vec<*const c_char> = enabled_extensions.iter().map(|name| name.as_ptr()).collect();

        let device_features = vk::PhysicalDeviceFeatures::builder()
            .sampler_anisotropy(physical.features.sampler_anisotropy == vk::TRUE)
            .build();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&device_features);

        let device = unsafe { instance.raw().create_device(physical.device, &create_info, None) }
            .map_err(VulkanError::creating("logical device"))?;

        let graphics_queue = unsafe { device.get_device_queue(physical.graphics_family, 0) };

        log::debug!(
            "Created logical device with {} extension(s), min uniform alignment {}",
            enabled_extensions.len(),
            physical.properties.limits.min_uniform_buffer_offset_alignment
        );

        Ok(Self {
            device,
            graphics_queue,
            physical,
            enabled_extensions,
            ready: AtomicBool::new(true),
            instance,
        })
    }

    /// Whether the device handle is live and has not been lost
    pub fn is_ready(&self) -> bool {
        self.device.handle() != vk::Device::null() && self.ready.load(Ordering::Acquire)
    }

    /// Fail with `DeviceUnavailable` unless the device is ready
    pub fn ensure_ready(&self, action: &str) -> VulkanResult<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(VulkanError::DeviceUnavailable {
                reason: format!("{action} on a device that is not ready"),
            })
        }
    }

    /// Raw ash device
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    /// Owning instance
    pub fn instance(&self) -> &Arc<VulkanInstance> {
        &self.instance
    }

    /// Selected physical device
    pub fn physical(&self) -> &PhysicalDeviceInfo {
        &self.physical
    }

    /// Device limits
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.physical.properties.limits
    }

    /// Graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Graphics queue family index
    pub fn graphics_family(&self) -> u32 {
        self.physical.graphics_family
    }

    /// Extensions enabled at creation
    pub fn enabled_extensions(&self) -> &[CString] {
        &self.enabled_extensions
    }

    /// Round a uniform block up to the dynamic offset alignment
    pub fn aligned_uniform_size(&self, size: vk::DeviceSize) -> vk::DeviceSize {
        align_up(size, self.limits().min_uniform_buffer_offset_alignment)
    }

    /// Find memory type with required properties
    pub fn find_memory_type(&self, type_filter: u32, properties: vk::MemoryPropertyFlags) -> VulkanResult<u32> {
        find_memory_type(&self.physical.memory_properties, type_filter, properties)
    }

    /// Whether `format` supports `features` with the given tiling
    pub fn supports_format_features(
        &self,
        format: vk::Format,
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> bool {
        let props = unsafe {
            self.instance
                .raw()
                .get_physical_device_format_properties(self.physical.device, format)
        };
        match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
            _ => props.optimal_tiling_features.contains(features),
        }
    }

    /// First candidate format supporting `features`
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> VulkanResult<vk::Format> {
        candidates
            .iter()
            .copied()
            .find(|&format| self.supports_format_features(format, tiling, features))
            .ok_or_else(|| VulkanError::FeatureUnsupported {
                feature: format!("none of {candidates:?} supports {features:?} with {tiling:?} tiling"),
            })
    }

    /// Block until the device is idle; a lost device stops being ready
    pub fn wait_idle(&self) -> VulkanResult<()> {
        match unsafe { self.device.device_wait_idle() } {
            Ok(()) => Ok(()),
            Err(vk::Result::ERROR_DEVICE_LOST) => {
                self.ready.store(false, Ordering::Release);
                Err(VulkanError::DeviceUnavailable {
                    reason: "device lost".to_string(),
                })
            }
            Err(e) => Err(VulkanError::Api(e)),
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
        log::debug!("Destroyed logical device");
    }
}

/// Find a memory type index allowed by `type_filter` with all `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> VulkanResult<u32> {
    (0..memory_properties.memory_type_count)
        .find(|&i| {
            (type_filter & (1 << i)) != 0
                && memory_properties.memory_types[i as usize]
                    .property_flags
                    .contains(properties)
        })
        .ok_or_else(|| VulkanError::FeatureUnsupported {
            feature: format!("memory type with {properties:?}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties::default();
        for (i, &property_flags) in flags.iter().enumerate() {
            props.memory_types[i] = vk::MemoryType {
                property_flags,
                heap_index: 0,
            };
        }
        props.memory_type_count = flags.len() as u32;
        props
    }

    #[test]
    fn test_allocation_failures_are_resource_exhausted() {
        for result in [
            vk::Result::ERROR_OUT_OF_HOST_MEMORY,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            vk::Result::ERROR_OUT_OF_POOL_MEMORY,
            vk::Result::ERROR_FRAGMENTED_POOL,
        ] {
            assert!(matches!(
                VulkanError::from_result("buffer", result),
                VulkanError::ResourceExhausted { resource: "buffer", .. }
            ));
        }
    }

    #[test]
    fn test_other_results_are_classified() {
        assert!(matches!(
            VulkanError::from_result("device", vk::Result::ERROR_DEVICE_LOST),
            VulkanError::DeviceUnavailable { .. }
        ));
        assert!(matches!(
            VulkanError::from_result("image", vk::Result::ERROR_FORMAT_NOT_SUPPORTED),
            VulkanError::FeatureUnsupported { .. }
        ));
        assert!(matches!(
            VulkanError::from_result("device", vk::Result::ERROR_EXTENSION_NOT_PRESENT),
            VulkanError::ExtensionUnavailable { .. }
        ));
        assert!(matches!(
            VulkanError::from_result("queue", vk::Result::ERROR_INITIALIZATION_FAILED),
            VulkanError::Api(vk::Result::ERROR_INITIALIZATION_FAILED)
        ));
    }

    #[test]
    fn test_find_memory_type_respects_filter_and_flags() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL, host, host]);

        assert_eq!(find_memory_type(&props, 0b111, host).unwrap(), 1);
        assert_eq!(find_memory_type(&props, 0b100, host).unwrap(), 2);
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
        assert!(matches!(
            find_memory_type(&props, 0b001, host),
            Err(VulkanError::FeatureUnsupported { .. })
        ));
    }

    #[test]
    fn test_device_extension_resolution() {
        let available: HashSet<CString> = ["VK_KHR_maintenance1", "VK_EXT_memory_budget"]
            .iter()
            .map(|name| CString::new(*name).unwrap())
            .collect();

        let (enabled, skipped) = resolve_device_extensions(
            &available,
            &["VK_KHR_maintenance1".to_string()],
            &["VK_EXT_memory_budget".to_string(), "VK_EXT_mesh_shader".to_string()],
        )
        .unwrap();
        assert_eq!(enabled.len(), 2);
        assert_eq!(skipped, vec!["VK_EXT_mesh_shader".to_string()]);

        let missing = resolve_device_extensions(&available, &["VK_KHR_ray_query".to_string()], &[]);
        assert!(matches!(missing, Err(VulkanError::ExtensionUnavailable { name }) if name == "VK_KHR_ray_query"));
    }

    #[test]
    fn test_device_type_policy() {
        assert!(PhysicalDeviceInfo::type_allowed(vk::PhysicalDeviceType::DISCRETE_GPU, false));
        assert!(!PhysicalDeviceInfo::type_allowed(vk::PhysicalDeviceType::INTEGRATED_GPU, false));
        assert!(PhysicalDeviceInfo::type_allowed(vk::PhysicalDeviceType::INTEGRATED_GPU, true));
        assert!(
            PhysicalDeviceInfo::type_rank(vk::PhysicalDeviceType::DISCRETE_GPU)
                < PhysicalDeviceInfo::type_rank(vk::PhysicalDeviceType::INTEGRATED_GPU)
        );
    }
}
