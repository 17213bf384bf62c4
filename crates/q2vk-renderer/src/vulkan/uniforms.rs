//! Per-frame uniforms and the frame-in-flight uniform ring.

use ash::vk;

use super::memory::{Buffer, MemoryManager};
use super::MAX_FRAMES_IN_FLIGHT;

/// Everything the pass shaders need from one frame, including the
/// previous frame's matrices for motion vectors and the temporal
/// upscaler's jitter.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FrameUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub prev_view_proj: [[f32; 4]; 4],
    pub view_org: [f32; 4],
    pub jitter: [f32; 2],
    pub prev_jitter: [f32; 2],
    pub time: f32,
    pub render_scale: f32,
    pub overbright: f32,
    pub _pad: f32,
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self {
            view_proj: identity(),
            prev_view_proj: identity(),
            view_org: [0.0; 4],
            jitter: [0.0; 2],
            prev_jitter: [0.0; 2],
            time: 0.0,
            render_scale: 1.0,
            overbright: 1.0,
            _pad: 0.0,
        }
    }
}

fn identity() -> [[f32; 4]; 4] {
    let mut m = [[0.0f32; 4]; 4];
    for (i, row) in m.iter_mut().enumerate() {
        row[i] = 1.0;
    }
    m
}

/// One persistently-mapped uniform buffer per frame in flight. A slot is
/// only rewritten after its frame's fence has signaled.
pub struct UniformRing {
    pub buffers: Vec<Buffer>,
}

impl UniformRing {
    /// # Safety
    /// Memory manager must outlive the ring.
    pub unsafe fn new(memory: &MemoryManager) -> Result<Self, String> {
        let size = std::mem::size_of::<FrameUniforms>() as vk::DeviceSize;
        let mut buffers = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for i in 0..MAX_FRAMES_IN_FLIGHT {
            buffers.push(memory.create_uniform_buffer(size, &format!("frame_uniforms_{}", i))?);
        }
        Ok(Self { buffers })
    }

    /// Write this frame's uniforms into its slot.
    ///
    /// # Safety
    /// The slot's prior frame must have completed (fence waited).
    pub unsafe fn write(&self, frame_in_flight: usize, uniforms: &FrameUniforms) {
        self.buffers[frame_in_flight % MAX_FRAMES_IN_FLIGHT].write(std::slice::from_ref(uniforms));
    }

    pub fn buffer(&self, frame_in_flight: usize) -> &Buffer {
        &self.buffers[frame_in_flight % MAX_FRAMES_IN_FLIGHT]
    }
}

/// Radical-inverse Halton sequence, the jitter source for the temporal
/// upscaler.
pub fn halton(mut index: u32, base: u32) -> f32 {
    let mut f = 1.0f32;
    let mut r = 0.0f32;
    while index > 0 {
        f /= base as f32;
        r += f * (index % base) as f32;
        index /= base;
    }
    r
}

/// Sub-pixel jitter for a frame, in [-0.5, 0.5) texel units. Returns zero
/// when the temporal path is off so the raster grid stays put.
pub fn jitter_for_frame(frame: u64, enabled: bool) -> [f32; 2] {
    if !enabled {
        return [0.0, 0.0];
    }
    // an 8-sample Halton(2,3) cycle covers the pixel evenly
    let index = (frame % 8) as u32 + 1;
    [halton(index, 2) - 0.5, halton(index, 3) - 0.5]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_halton_base2_prefix() {
        assert!((halton(1, 2) - 0.5).abs() < 1e-6);
        assert!((halton(2, 2) - 0.25).abs() < 1e-6);
        assert!((halton(3, 2) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_jitter_range_and_cycle() {
        let mut seen = Vec::new();
        for frame in 0..16u64 {
            let j = jitter_for_frame(frame, true);
            assert!(j[0] >= -0.5 && j[0] < 0.5);
            assert!(j[1] >= -0.5 && j[1] < 0.5);
            seen.push(j);
        }
        // 8-frame cycle repeats
        assert_eq!(seen[0], seen[8]);
        assert_eq!(seen[3], seen[11]);
        // and the samples within a cycle differ
        assert_ne!(seen[0], seen[1]);
    }

    #[test]
    fn test_jitter_disabled_is_zero() {
        for frame in 0..8u64 {
            assert_eq!(jitter_for_frame(frame, false), [0.0, 0.0]);
        }
    }

    #[test]
    fn test_uniform_struct_size_is_std140_friendly() {
        // two mat4s + vec4 + 2 vec2 + 4 scalars, 16-byte aligned
        assert_eq!(std::mem::size_of::<FrameUniforms>() % 16, 0);
    }
}
