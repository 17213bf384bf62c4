//! Vulkan swapchain with per-frame synchronization and the lifecycle
//! state machine: Uninitialized → Ready → (AcquireFail → Recreate →
//! Ready) → Presenting → Ready.

use ash::vk;

use super::{VulkanContext, VulkanSurface};

/// Number of frames in flight.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// Swapchain lifecycle. Pure transitions so the driver's handling of
/// acquire/present results is testable without a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainState {
    Uninitialized,
    Ready,
    Presenting,
    NeedsRecreate,
}

impl SwapchainState {
    /// Acquire either hands back an image (→ Presenting) or reports the
    /// surface out of date (→ NeedsRecreate).
    pub fn on_acquire(self, success: bool) -> Self {
        match (self, success) {
            (SwapchainState::Ready, true) => SwapchainState::Presenting,
            (SwapchainState::Ready, false) => SwapchainState::NeedsRecreate,
            (s, _) => s,
        }
    }

    /// Present returns to Ready, unless the surface went stale mid-frame.
    pub fn on_present(self, out_of_date: bool) -> Self {
        match self {
            SwapchainState::Presenting => {
                if out_of_date {
                    SwapchainState::NeedsRecreate
                } else {
                    SwapchainState::Ready
                }
            }
            s => s,
        }
    }

    /// A resize or mode-change cvar forces a rebuild at the next frame.
    pub fn on_resize(self) -> Self {
        match self {
            SwapchainState::Uninitialized => self,
            _ => SwapchainState::NeedsRecreate,
        }
    }

    pub fn on_recreated(self) -> Self {
        SwapchainState::Ready
    }
}

/// Per-frame synchronization primitives.
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub frame_sync: Vec<FrameSync>,
    pub current_frame: usize,
    pub image_index: u32,
    pub state: SwapchainState,
}

impl Swapchain {
    /// Create a new swapchain.
    ///
    /// # Safety
    /// Surface and context must be live; old_swapchain is consumed.
    pub unsafe fn new(
        ctx: &VulkanContext,
        surface: &VulkanSurface,
        width: u32,
        height: u32,
        old_swapchain: Option<vk::SwapchainKHR>,
    ) -> Result<Self, String> {
        let extent = surface.get_extent(width, height);

        let min_images = surface.capabilities.min_image_count;
        let max_images = if surface.capabilities.max_image_count == 0 {
            u32::MAX
        } else {
            surface.capabilities.max_image_count
        };
        let image_count = (min_images + 1).min(max_images).max(MAX_FRAMES_IN_FLIGHT as u32);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle)
            .min_image_count(image_count)
            .image_format(surface.format.format)
            .image_color_space(surface.format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(surface.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain.unwrap_or(vk::SwapchainKHR::null()));

        let handle = ctx
            .swapchain_loader
            .create_swapchain(&create_info, None)
            .map_err(|e| format!("Failed to create swapchain: {:?}", e))?;

        if let Some(old) = old_swapchain {
            ctx.swapchain_loader.destroy_swapchain(old, None);
        }

        let images = ctx
            .swapchain_loader
            .get_swapchain_images(handle)
            .map_err(|e| format!("Failed to get swapchain images: {:?}", e))?;
        let image_views = Self::create_image_views(ctx, &images, surface.format.format)?;
        let frame_sync = Self::create_sync_objects(ctx)?;

        Ok(Self {
            handle,
            images,
            image_views,
            format: surface.format.format,
            extent,
            frame_sync,
            current_frame: 0,
            image_index: 0,
            state: SwapchainState::Ready,
        })
    }

    unsafe fn create_image_views(
        ctx: &VulkanContext,
        images: &[vk::Image],
        format: vk::Format,
    ) -> Result<Vec<vk::ImageView>, String> {
        images
            .iter()
            .map(|&image| {
                let create_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });
                ctx.device
                    .create_image_view(&create_info, None)
                    .map_err(|e| format!("Failed to create image view: {:?}", e))
            })
            .collect()
    }

    unsafe fn create_sync_objects(ctx: &VulkanContext) -> Result<Vec<FrameSync>, String> {
        let semaphore_info = vk::SemaphoreCreateInfo::default();
        let fence_info = vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);

        (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| {
                let image_available = ctx
                    .device
                    .create_semaphore(&semaphore_info, None)
                    .map_err(|e| format!("Failed to create semaphore: {:?}", e))?;
                let render_finished = ctx
                    .device
                    .create_semaphore(&semaphore_info, None)
                    .map_err(|e| format!("Failed to create semaphore: {:?}", e))?;
                let in_flight = ctx
                    .device
                    .create_fence(&fence_info, None)
                    .map_err(|e| format!("Failed to create fence: {:?}", e))?;
                Ok(FrameSync {
                    image_available,
                    render_finished,
                    in_flight,
                })
            })
            .collect()
    }

    /// Wait for this frame slot's previous work, then acquire the next
    /// image. `Ok(false)` means the surface is out of date.
    ///
    /// This wait and the acquire are the only places the main thread
    /// blocks on the GPU.
    pub unsafe fn acquire_next_image(&mut self, ctx: &VulkanContext) -> Result<bool, String> {
        let sync = &self.frame_sync[self.current_frame];

        ctx.device
            .wait_for_fences(&[sync.in_flight], true, u64::MAX)
            .map_err(|e| format!("Fence wait failed: {:?}", e))?;

        match ctx.swapchain_loader.acquire_next_image(
            self.handle,
            u64::MAX,
            sync.image_available,
            vk::Fence::null(),
        ) {
            Ok((index, suboptimal)) => {
                self.image_index = index;
                ctx.device
                    .reset_fences(&[sync.in_flight])
                    .map_err(|e| format!("Fence reset failed: {:?}", e))?;
                self.state = self.state.on_acquire(true);
                Ok(!suboptimal)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.state = self.state.on_acquire(false);
                Ok(false)
            }
            Err(e) => Err(format!("Acquire failed: {:?}", e)),
        }
    }

    /// Present the acquired image. `Ok(false)` means the swapchain must
    /// be recreated before the next frame.
    pub unsafe fn present(&mut self, ctx: &VulkanContext) -> Result<bool, String> {
        let sync = &self.frame_sync[self.current_frame];
        let wait = [sync.render_finished];
        let swapchains = [self.handle];
        let indices = [self.image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait)
            .swapchains(&swapchains)
            .image_indices(&indices);

        let result = ctx
            .swapchain_loader
            .queue_present(ctx.present_queue, &present_info);

        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;

        match result {
            Ok(suboptimal) => {
                self.state = self.state.on_present(suboptimal);
                Ok(!suboptimal)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.state = self.state.on_present(true);
                Ok(false)
            }
            Err(e) => Err(format!("Present failed: {:?}", e)),
        }
    }

    /// Rebuild after a resize/mode change. Drains in-flight frames first.
    pub unsafe fn recreate(
        &mut self,
        ctx: &VulkanContext,
        surface: &mut VulkanSurface,
        width: u32,
        height: u32,
    ) -> Result<(), String> {
        ctx.wait_idle();
        surface.refresh_capabilities(ctx)?;

        for view in self.image_views.drain(..) {
            ctx.device.destroy_image_view(view, None);
        }
        self.destroy_sync(ctx);

        let fresh = Self::new(ctx, surface, width, height, Some(self.handle))?;
        let old_state = self.state;
        *self = fresh;
        self.state = old_state.on_recreated();
        Ok(())
    }

    unsafe fn destroy_sync(&mut self, ctx: &VulkanContext) {
        for sync in self.frame_sync.drain(..) {
            ctx.device.destroy_semaphore(sync.image_available, None);
            ctx.device.destroy_semaphore(sync.render_finished, None);
            ctx.device.destroy_fence(sync.in_flight, None);
        }
    }

    /// Tear down everything. Called at shutdown with the device idle.
    pub unsafe fn destroy(&mut self, ctx: &VulkanContext) {
        for view in self.image_views.drain(..) {
            ctx.device.destroy_image_view(view, None);
        }
        self.destroy_sync(ctx);
        ctx.swapchain_loader.destroy_swapchain(self.handle, None);
        self.handle = vk::SwapchainKHR::null();
        self.state = SwapchainState::Uninitialized;
    }
}
