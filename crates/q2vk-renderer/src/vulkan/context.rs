//! Vulkan context: instance, physical device, logical device, and queue.

use ash::khr::{surface, swapchain};
use ash::{vk, Device, Entry, Instance};
use std::ffi::CString;
use std::os::raw::c_char;

use super::{APP_NAME, ENGINE_NAME, ENGINE_VERSION, REQUIRED_VK_VERSION};

/// Queue family indices.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }
}

/// Main Vulkan context holding all core Vulkan objects. One graphics
/// queue doubles as the present queue.
pub struct VulkanContext {
    pub entry: Entry,
    pub instance: Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: Device,
    pub queue_families: QueueFamilyIndices,

    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,

    pub surface_loader: surface::Instance,
    pub swapchain_loader: swapchain::Device,

    pub device_properties: vk::PhysicalDeviceProperties,
}

impl VulkanContext {
    /// Create a new Vulkan context.
    ///
    /// # Safety
    /// `display_handle` must be a live display connection.
    pub unsafe fn new(
        display_handle: raw_window_handle::RawDisplayHandle,
        enable_validation: bool,
    ) -> Result<Self, String> {
        let entry = Entry::linked();

        let api_version = match entry
            .try_enumerate_instance_version()
            .map_err(|e| format!("Failed to enumerate instance version: {:?}", e))?
        {
            Some(version) => version,
            None => vk::API_VERSION_1_0,
        };
        if api_version < REQUIRED_VK_VERSION {
            return Err(format!(
                "Vulkan 1.3 required, but only {}.{}.{} available",
                vk::api_version_major(api_version),
                vk::api_version_minor(api_version),
                vk::api_version_patch(api_version)
            ));
        }

        let instance = Self::create_instance(&entry, display_handle, enable_validation)?;
        let surface_loader = surface::Instance::new(&entry, &instance);

        let (physical_device, queue_families) = Self::pick_physical_device(&instance)?;
        let device_properties = instance.get_physical_device_properties(physical_device);

        let (device, graphics_queue) =
            Self::create_logical_device(&instance, physical_device, &queue_families)?;
        let swapchain_loader = swapchain::Device::new(&instance, &device);

        Ok(Self {
            entry,
            instance,
            physical_device,
            device,
            queue_families,
            graphics_queue,
            present_queue: graphics_queue,
            surface_loader,
            swapchain_loader,
            device_properties,
        })
    }

    unsafe fn create_instance(
        entry: &Entry,
        display_handle: raw_window_handle::RawDisplayHandle,
        enable_validation: bool,
    ) -> Result<Instance, String> {
        let app_info = vk::ApplicationInfo::default()
            .application_name(APP_NAME)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(ENGINE_NAME)
            .engine_version(ENGINE_VERSION)
            .api_version(REQUIRED_VK_VERSION);

        let extensions = ash_window::enumerate_required_extensions(display_handle)
            .map_err(|e| format!("Failed to get required extensions: {:?}", e))?
            .to_vec();

        let layer_names: Vec<CString> = if enable_validation {
            vec![CString::new("VK_LAYER_KHRONOS_validation").unwrap()]
        } else {
            vec![]
        };
        let layer_name_ptrs: Vec<*const c_char> = layer_names.iter().map(|n| n.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_name_ptrs);

        entry
            .create_instance(&create_info, None)
            .map_err(|e| format!("Failed to create Vulkan instance: {:?}", e))
    }

    /// Select the best physical device: discrete beats integrated beats
    /// whatever else enumerates first.
    unsafe fn pick_physical_device(
        instance: &Instance,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices), String> {
        let devices = instance
            .enumerate_physical_devices()
            .map_err(|e| format!("Failed to enumerate physical devices: {:?}", e))?;
        if devices.is_empty() {
            return Err("No Vulkan devices found".to_string());
        }

        let mut best: Option<(vk::PhysicalDevice, QueueFamilyIndices, u32)> = None;
        for device in devices {
            let props = instance.get_physical_device_properties(device);
            let families = Self::find_queue_families(instance, device);
            if !families.is_complete() {
                continue;
            }

            let score = match props.device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 3,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
                _ => 1,
            };
            if best.as_ref().is_none_or(|(_, _, s)| score > *s) {
                best = Some((device, families, score));
            }
        }

        best.map(|(d, f, _)| (d, f))
            .ok_or_else(|| "No suitable Vulkan device".to_string())
    }

    unsafe fn find_queue_families(
        instance: &Instance,
        device: vk::PhysicalDevice,
    ) -> QueueFamilyIndices {
        let mut indices = QueueFamilyIndices::default();
        let families = instance.get_physical_device_queue_family_properties(device);
        for (i, family) in families.iter().enumerate() {
            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(i as u32);
                // graphics-capable families can present on every target we
                // care about; the surface check happens at swapchain time
                indices.present = Some(i as u32);
                break;
            }
        }
        indices
    }

    unsafe fn create_logical_device(
        instance: &Instance,
        physical_device: vk::PhysicalDevice,
        families: &QueueFamilyIndices,
    ) -> Result<(Device, vk::Queue), String> {
        let graphics_family = families.graphics.ok_or("no graphics queue family")?;

        let priorities = [1.0f32];
        let queue_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(graphics_family)
            .queue_priorities(&priorities)];

        let extensions = [swapchain::NAME.as_ptr()];

        let features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(true)
            .fill_mode_non_solid(true);

        let mut vk13 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features)
            .push_next(&mut vk13);

        let device = instance
            .create_device(physical_device, &create_info, None)
            .map_err(|e| format!("Failed to create logical device: {:?}", e))?;

        let queue = device.get_device_queue(graphics_family, 0);
        Ok((device, queue))
    }

    /// Largest supported 2D texture dimension.
    pub fn max_texture_size(&self) -> i32 {
        self.device_properties.limits.max_image_dimension2_d as i32
    }

    /// Device anisotropy ceiling; requested values clamp to this.
    pub fn max_anisotropy(&self) -> f32 {
        self.device_properties.limits.max_sampler_anisotropy
    }

    /// Vendor/device strings for `vk_strings`.
    pub fn device_strings(&self) -> Vec<String> {
        let name = self
            .device_properties
            .device_name_as_c_str()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "<unknown>".to_string());
        let v = self.device_properties.api_version;
        vec![
            format!("VK_RENDERER: {}", name),
            format!("VK_VENDORID: {:#06x}", self.device_properties.vendor_id),
            format!(
                "VK_VERSION: {}.{}.{}",
                vk::api_version_major(v),
                vk::api_version_minor(v),
                vk::api_version_patch(v)
            ),
        ]
    }

    /// Wait for the device to go idle; used before teardown and recreate.
    pub fn wait_idle(&self) {
        // SAFETY: device is alive for the lifetime of self.
        unsafe {
            let _ = self.device.device_wait_idle();
        }
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        // SAFETY: all child objects must already be destroyed by owners.
        unsafe {
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
