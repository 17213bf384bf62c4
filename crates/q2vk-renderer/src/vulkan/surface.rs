//! Window surface and its swapchain-relevant properties.

use ash::vk;

use super::VulkanContext;

pub struct VulkanSurface {
    pub handle: vk::SurfaceKHR,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub capabilities: vk::SurfaceCapabilitiesKHR,
}

impl VulkanSurface {
    /// Create the surface for a window and choose its format and present
    /// mode. `vsync` maps the `vk_swapinterval` cvar: FIFO when on,
    /// MAILBOX (or IMMEDIATE) when off.
    ///
    /// # Safety
    /// The window handles must outlive the surface.
    pub unsafe fn new(
        ctx: &VulkanContext,
        display_handle: raw_window_handle::RawDisplayHandle,
        window_handle: raw_window_handle::RawWindowHandle,
        vsync: bool,
    ) -> Result<Self, String> {
        let handle = ash_window::create_surface(
            &ctx.entry,
            &ctx.instance,
            display_handle,
            window_handle,
            None,
        )
        .map_err(|e| format!("Failed to create surface: {:?}", e))?;

        let formats = ctx
            .surface_loader
            .get_physical_device_surface_formats(ctx.physical_device, handle)
            .map_err(|e| format!("Failed to query surface formats: {:?}", e))?;
        let format = formats
            .iter()
            .find(|f| {
                f.format == vk::Format::B8G8R8A8_UNORM
                    && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .copied()
            .or_else(|| formats.first().copied())
            .ok_or("surface reports no formats")?;

        let modes = ctx
            .surface_loader
            .get_physical_device_surface_present_modes(ctx.physical_device, handle)
            .map_err(|e| format!("Failed to query present modes: {:?}", e))?;
        let present_mode = if vsync {
            vk::PresentModeKHR::FIFO
        } else if modes.contains(&vk::PresentModeKHR::MAILBOX) {
            vk::PresentModeKHR::MAILBOX
        } else if modes.contains(&vk::PresentModeKHR::IMMEDIATE) {
            vk::PresentModeKHR::IMMEDIATE
        } else {
            vk::PresentModeKHR::FIFO
        };

        let capabilities = ctx
            .surface_loader
            .get_physical_device_surface_capabilities(ctx.physical_device, handle)
            .map_err(|e| format!("Failed to query surface capabilities: {:?}", e))?;

        Ok(Self {
            handle,
            format,
            present_mode,
            capabilities,
        })
    }

    /// Re-read capabilities after a resize.
    pub unsafe fn refresh_capabilities(&mut self, ctx: &VulkanContext) -> Result<(), String> {
        self.capabilities = ctx
            .surface_loader
            .get_physical_device_surface_capabilities(ctx.physical_device, self.handle)
            .map_err(|e| format!("Failed to query surface capabilities: {:?}", e))?;
        Ok(())
    }

    /// The swapchain extent for a desired window size, honoring the
    /// surface's min/max bounds.
    pub fn get_extent(&self, width: u32, height: u32) -> vk::Extent2D {
        if self.capabilities.current_extent.width != u32::MAX {
            return self.capabilities.current_extent;
        }
        vk::Extent2D {
            width: width.clamp(
                self.capabilities.min_image_extent.width,
                self.capabilities.max_image_extent.width,
            ),
            height: height.clamp(
                self.capabilities.min_image_extent.height,
                self.capabilities.max_image_extent.height,
            ),
        }
    }

    /// Destroy the surface.
    ///
    /// # Safety
    /// No swapchain may still reference it.
    pub unsafe fn destroy(&mut self, ctx: &VulkanContext) {
        ctx.surface_loader.destroy_surface(self.handle, None);
        self.handle = vk::SurfaceKHR::null();
    }
}
