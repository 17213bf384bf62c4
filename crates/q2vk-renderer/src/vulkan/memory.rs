//! GPU memory management using gpu-allocator.
//!
//! Images are grouped into classes (sampled color, depth, transient
//! attachments); each class keeps a free list of retired images that is
//! only touched at asset sweep and swapchain recreate, guarded by a
//! mutex.

use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;
use std::sync::Arc;

use super::VulkanContext;

/// GPU buffer with associated memory.
pub struct Buffer {
    pub handle: vk::Buffer,
    pub allocation: Option<Allocation>,
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}

impl Buffer {
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .map(|p| p.as_ptr() as *mut u8)
    }

    /// Write data into a mapped buffer.
    ///
    /// # Safety
    /// Buffer must be host visible and the data must fit.
    pub unsafe fn write<T: Copy>(&self, data: &[T]) {
        if let Some(ptr) = self.mapped_ptr() {
            std::ptr::copy_nonoverlapping(
                data.as_ptr() as *const u8,
                ptr,
                std::mem::size_of_val(data),
            );
        }
    }
}

/// GPU image with associated memory.
pub struct GpuImage {
    pub handle: vk::Image,
    pub view: vk::ImageView,
    pub allocation: Option<Allocation>,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
}

/// Allocation classes for images; each gets its own retirement pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageClass {
    SampledColor,
    Depth,
    TransientAttachment,
}

impl ImageClass {
    fn index(self) -> usize {
        match self {
            ImageClass::SampledColor => 0,
            ImageClass::Depth => 1,
            ImageClass::TransientAttachment => 2,
        }
    }
}

/// Memory manager wrapping gpu-allocator.
pub struct MemoryManager {
    allocator: Arc<Mutex<Allocator>>,
    device: ash::Device,
    /// retired images by class, reused before new allocations
    free_lists: [Mutex<Vec<GpuImage>>; 3],
}

impl MemoryManager {
    /// # Safety
    /// Context must outlive the manager.
    pub unsafe fn new(ctx: &VulkanContext) -> Result<Self, String> {
        let mut debug_settings = gpu_allocator::AllocatorDebugSettings::default();
        debug_settings.log_memory_information = cfg!(debug_assertions);
        debug_settings.log_leaks_on_shutdown = true;

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: ctx.instance.clone(),
            device: ctx.device.clone(),
            physical_device: ctx.physical_device,
            debug_settings,
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| format!("Failed to create allocator: {:?}", e))?;

        Ok(Self {
            allocator: Arc::new(Mutex::new(allocator)),
            device: ctx.device.clone(),
            free_lists: [
                Mutex::new(Vec::new()),
                Mutex::new(Vec::new()),
                Mutex::new(Vec::new()),
            ],
        })
    }

    /// Create a buffer with the specified usage and memory location.
    pub unsafe fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
    ) -> Result<Buffer, String> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let handle = self
            .device
            .create_buffer(&buffer_info, None)
            .map_err(|e| format!("Failed to create buffer: {:?}", e))?;
        let requirements = self.device.get_buffer_memory_requirements(handle);

        let allocation = self
            .allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| format!("Failed to allocate buffer memory: {:?}", e))?;

        self.device
            .bind_buffer_memory(handle, allocation.memory(), allocation.offset())
            .map_err(|e| format!("Failed to bind buffer memory: {:?}", e))?;

        Ok(Buffer {
            handle,
            allocation: Some(allocation),
            size,
            usage,
        })
    }

    pub unsafe fn create_staging_buffer(
        &self,
        size: vk::DeviceSize,
        name: &str,
    ) -> Result<Buffer, String> {
        self.create_buffer(size, vk::BufferUsageFlags::TRANSFER_SRC, MemoryLocation::CpuToGpu, name)
    }

    pub unsafe fn create_vertex_buffer(
        &self,
        size: vk::DeviceSize,
        name: &str,
    ) -> Result<Buffer, String> {
        self.create_buffer(
            size,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            MemoryLocation::GpuOnly,
            name,
        )
    }

    pub unsafe fn create_uniform_buffer(
        &self,
        size: vk::DeviceSize,
        name: &str,
    ) -> Result<Buffer, String> {
        self.create_buffer(size, vk::BufferUsageFlags::UNIFORM_BUFFER, MemoryLocation::CpuToGpu, name)
    }

    /// Create an image in a class. The class's free list is checked first
    /// for a compatible retiree.
    pub unsafe fn create_image(
        &self,
        class: ImageClass,
        extent: vk::Extent3D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        mip_levels: u32,
        name: &str,
    ) -> Result<GpuImage, String> {
        {
            let mut pool = self.free_lists[class.index()].lock();
            if let Some(pos) = pool
                .iter()
                .position(|img| img.format == format && img.extent == extent && img.mip_levels == mip_levels)
            {
                return Ok(pool.swap_remove(pos));
            }
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(extent)
            .mip_levels(mip_levels)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let handle = self
            .device
            .create_image(&image_info, None)
            .map_err(|e| format!("Failed to create image: {:?}", e))?;
        let requirements = self.device.get_image_memory_requirements(handle);

        let allocation = self
            .allocator
            .lock()
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| format!("Failed to allocate image memory: {:?}", e))?;

        self.device
            .bind_image_memory(handle, allocation.memory(), allocation.offset())
            .map_err(|e| format!("Failed to bind image memory: {:?}", e))?;

        let aspect_mask = if class == ImageClass::Depth {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        };
        let view_info = vk::ImageViewCreateInfo::default()
            .image(handle)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask,
                base_mip_level: 0,
                level_count: mip_levels,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = self
            .device
            .create_image_view(&view_info, None)
            .map_err(|e| format!("Failed to create image view: {:?}", e))?;

        Ok(GpuImage {
            handle,
            view,
            allocation: Some(allocation),
            format,
            extent,
            mip_levels,
        })
    }

    pub unsafe fn create_texture_2d(
        &self,
        width: u32,
        height: u32,
        format: vk::Format,
        mip_levels: u32,
        name: &str,
    ) -> Result<GpuImage, String> {
        self.create_image(
            ImageClass::SampledColor,
            vk::Extent3D { width, height, depth: 1 },
            format,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            mip_levels,
            name,
        )
    }

    pub unsafe fn create_render_target(
        &self,
        width: u32,
        height: u32,
        format: vk::Format,
        name: &str,
    ) -> Result<GpuImage, String> {
        self.create_image(
            ImageClass::SampledColor,
            vk::Extent3D { width, height, depth: 1 },
            format,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            1,
            name,
        )
    }

    pub unsafe fn create_depth_buffer(
        &self,
        width: u32,
        height: u32,
        name: &str,
    ) -> Result<GpuImage, String> {
        self.create_image(
            ImageClass::Depth,
            vk::Extent3D { width, height, depth: 1 },
            vk::Format::D32_SFLOAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            1,
            name,
        )
    }

    /// Park an image on its class free list for reuse.
    pub fn retire_image(&self, class: ImageClass, image: GpuImage) {
        self.free_lists[class.index()].lock().push(image);
    }

    /// Destroy everything parked on the free lists. Only called at asset
    /// sweep and swapchain recreate, with the device idle.
    pub unsafe fn drain_free_lists(&self) {
        for list in &self.free_lists {
            let retired: Vec<GpuImage> = list.lock().drain(..).collect();
            for image in retired {
                self.destroy_image(image);
            }
        }
    }

    pub unsafe fn destroy_buffer(&self, buffer: Buffer) {
        self.device.destroy_buffer(buffer.handle, None);
        if let Some(allocation) = buffer.allocation {
            let _ = self.allocator.lock().free(allocation);
        }
    }

    pub unsafe fn destroy_image(&self, image: GpuImage) {
        self.device.destroy_image_view(image.view, None);
        self.device.destroy_image(image.handle, None);
        if let Some(allocation) = image.allocation {
            let _ = self.allocator.lock().free(allocation);
        }
    }
}
