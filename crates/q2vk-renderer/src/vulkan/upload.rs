//! Batched CPU→GPU uploads.
//!
//! Loader tasks push pixel data from any thread; the main thread flushes
//! everything into one staging buffer and one command submission per
//! frame. Uploads carry the registration sequence they were produced
//! under, so anything queued for a previous map is dropped at flush
//! instead of landing in the fresh caches.

use ash::vk;
use crossbeam::queue::SegQueue;

use super::commands::CommandManager;
use super::memory::MemoryManager;
use super::VulkanContext;

/// A pending image upload: raw RGBA plus its destination.
pub struct PendingUpload {
    pub data: Vec<u8>,
    pub target: vk::Image,
    pub width: u32,
    pub height: u32,
    /// registration sequence the asset was loaded under
    pub generation: i32,
}

/// Thread-safe upload queue. Multiple producers, drained by the main
/// thread between frames.
#[derive(Default)]
pub struct UploadQueue {
    queue: SegQueue<PendingUpload>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, upload: PendingUpload) {
        self.queue.push(upload);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Pop everything, keeping only entries from the current generation.
    /// Returns (live, dropped-count).
    pub fn drain(&self, current_generation: i32) -> (Vec<PendingUpload>, usize) {
        let mut live = Vec::new();
        let mut dropped = 0;
        while let Some(upload) = self.queue.pop() {
            if upload.generation == current_generation {
                live.push(upload);
            } else {
                dropped += 1;
            }
        }
        (live, dropped)
    }

    /// Flush all pending uploads in one staging buffer and one submit.
    /// Returns the number uploaded.
    ///
    /// # Safety
    /// Must run on the main thread with no frame recording in progress.
    pub unsafe fn flush(
        &self,
        ctx: &VulkanContext,
        memory: &MemoryManager,
        commands: &CommandManager,
        current_generation: i32,
    ) -> Result<usize, String> {
        let (uploads, _dropped) = self.drain(current_generation);
        if uploads.is_empty() {
            return Ok(0);
        }

        let total: usize = uploads.iter().map(|u| u.data.len()).sum();
        let staging = memory.create_staging_buffer(total as vk::DeviceSize, "upload_staging")?;

        // pack all payloads into the staging buffer
        let base = staging
            .mapped_ptr()
            .ok_or("staging buffer not host visible")?;
        let mut offset = 0usize;
        let mut regions = Vec::with_capacity(uploads.len());
        for upload in &uploads {
            std::ptr::copy_nonoverlapping(upload.data.as_ptr(), base.add(offset), upload.data.len());
            regions.push((offset, upload));
            offset += upload.data.len();
        }

        let cmd = commands.begin_single_time(ctx)?;
        for (src_offset, upload) in &regions {
            let subresource = vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            };

            // UNDEFINED -> TRANSFER_DST
            let to_dst = vk::ImageMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::TOP_OF_PIPE)
                .dst_stage_mask(vk::PipelineStageFlags2::TRANSFER)
                .dst_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .image(upload.target)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: vk::REMAINING_MIP_LEVELS,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let barriers = [to_dst];
            let dep = vk::DependencyInfo::default().image_memory_barriers(&barriers);
            ctx.device.cmd_pipeline_barrier2(cmd, &dep);

            let copy = vk::BufferImageCopy::default()
                .buffer_offset(*src_offset as vk::DeviceSize)
                .image_subresource(subresource)
                .image_extent(vk::Extent3D {
                    width: upload.width,
                    height: upload.height,
                    depth: 1,
                });
            ctx.device.cmd_copy_buffer_to_image(
                cmd,
                staging.handle,
                upload.target,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[copy],
            );

            // TRANSFER_DST -> SHADER_READ
            let to_read = vk::ImageMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::TRANSFER)
                .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
                .dst_stage_mask(vk::PipelineStageFlags2::FRAGMENT_SHADER)
                .dst_access_mask(vk::AccessFlags2::SHADER_SAMPLED_READ)
                .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .image(upload.target)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: vk::REMAINING_MIP_LEVELS,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let barriers = [to_read];
            let dep = vk::DependencyInfo::default().image_memory_barriers(&barriers);
            ctx.device.cmd_pipeline_barrier2(cmd, &dep);
        }
        commands.end_single_time(ctx, cmd)?;

        let count = uploads.len();
        memory.destroy_buffer(staging);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(generation: i32) -> PendingUpload {
        PendingUpload {
            data: vec![0u8; 16],
            target: vk::Image::null(),
            width: 2,
            height: 2,
            generation,
        }
    }

    #[test]
    fn test_drain_keeps_current_generation() {
        let q = UploadQueue::new();
        q.push(upload(1));
        q.push(upload(2));
        q.push(upload(2));
        let (live, dropped) = q.drain(2);
        assert_eq!(live.len(), 2);
        assert_eq!(dropped, 1);
        assert!(q.is_empty());
    }

    #[test]
    fn test_map_change_drops_all_stale() {
        let q = UploadQueue::new();
        for _ in 0..5 {
            q.push(upload(1));
        }
        let (live, dropped) = q.drain(2);
        assert!(live.is_empty());
        assert_eq!(dropped, 5);
    }
}
