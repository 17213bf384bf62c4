//! Command pool and per-frame command buffers.

use ash::vk;

use super::{VulkanContext, MAX_FRAMES_IN_FLIGHT};

/// One primary command buffer per frame in flight, plus a pool for
/// single-shot upload/transition work.
pub struct CommandManager {
    pub pool: vk::CommandPool,
    pub frame_buffers: Vec<vk::CommandBuffer>,
}

impl CommandManager {
    /// # Safety
    /// Context must outlive the manager.
    pub unsafe fn new(ctx: &VulkanContext) -> Result<Self, String> {
        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(ctx.queue_families.graphics.unwrap_or(0));
        let pool = ctx
            .device
            .create_command_pool(&pool_info, None)
            .map_err(|e| format!("Failed to create command pool: {:?}", e))?;

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(MAX_FRAMES_IN_FLIGHT as u32);
        let frame_buffers = ctx
            .device
            .allocate_command_buffers(&alloc_info)
            .map_err(|e| format!("Failed to allocate command buffers: {:?}", e))?;

        Ok(Self { pool, frame_buffers })
    }

    /// Begin recording this frame's command buffer.
    pub unsafe fn begin_frame(
        &self,
        ctx: &VulkanContext,
        frame: usize,
    ) -> Result<vk::CommandBuffer, String> {
        let cmd = self.frame_buffers[frame % MAX_FRAMES_IN_FLIGHT];
        ctx.device
            .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
            .map_err(|e| format!("Failed to reset command buffer: {:?}", e))?;
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        ctx.device
            .begin_command_buffer(cmd, &begin_info)
            .map_err(|e| format!("Failed to begin command buffer: {:?}", e))?;
        Ok(cmd)
    }

    /// End recording and submit against the frame's sync objects.
    pub unsafe fn submit_frame(
        &self,
        ctx: &VulkanContext,
        cmd: vk::CommandBuffer,
        wait: vk::Semaphore,
        signal: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<(), String> {
        ctx.device
            .end_command_buffer(cmd)
            .map_err(|e| format!("Failed to end command buffer: {:?}", e))?;

        let wait_semaphores = [wait];
        let signal_semaphores = [signal];
        let stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let buffers = [cmd];
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&stages)
            .command_buffers(&buffers)
            .signal_semaphores(&signal_semaphores);

        ctx.device
            .queue_submit(ctx.graphics_queue, &[submit], fence)
            .map_err(|e| format!("Failed to submit: {:?}", e))
    }

    /// Begin a throwaway command buffer for uploads and transitions.
    pub unsafe fn begin_single_time(&self, ctx: &VulkanContext) -> Result<vk::CommandBuffer, String> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmd = ctx
            .device
            .allocate_command_buffers(&alloc_info)
            .map_err(|e| format!("Failed to allocate command buffer: {:?}", e))?[0];

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        ctx.device
            .begin_command_buffer(cmd, &begin_info)
            .map_err(|e| format!("Failed to begin command buffer: {:?}", e))?;
        Ok(cmd)
    }

    /// Submit a single-shot buffer and wait for it.
    pub unsafe fn end_single_time(
        &self,
        ctx: &VulkanContext,
        cmd: vk::CommandBuffer,
    ) -> Result<(), String> {
        ctx.device
            .end_command_buffer(cmd)
            .map_err(|e| format!("Failed to end command buffer: {:?}", e))?;

        let buffers = [cmd];
        let submit = vk::SubmitInfo::default().command_buffers(&buffers);
        ctx.device
            .queue_submit(ctx.graphics_queue, &[submit], vk::Fence::null())
            .map_err(|e| format!("Failed to submit: {:?}", e))?;
        ctx.device
            .queue_wait_idle(ctx.graphics_queue)
            .map_err(|e| format!("Queue wait failed: {:?}", e))?;

        ctx.device.free_command_buffers(self.pool, &buffers);
        Ok(())
    }

    /// # Safety
    /// Device must be idle.
    pub unsafe fn destroy(&mut self, ctx: &VulkanContext) {
        ctx.device.destroy_command_pool(self.pool, None);
        self.pool = vk::CommandPool::null();
        self.frame_buffers.clear();
    }
}
