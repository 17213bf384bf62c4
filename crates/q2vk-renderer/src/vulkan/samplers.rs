//! Texture samplers and the vk_texturemode filter table.

use ash::vk;

use super::VulkanContext;

/// Named filter modes settable through `vk_texturemode`.
pub struct TextureMode {
    pub name: &'static str,
    pub min: vk::Filter,
    pub mag: vk::Filter,
    pub mipmap: vk::SamplerMipmapMode,
}

pub const TEXTURE_MODES: &[TextureMode] = &[
    TextureMode {
        name: "VK_NEAREST",
        min: vk::Filter::NEAREST,
        mag: vk::Filter::NEAREST,
        mipmap: vk::SamplerMipmapMode::NEAREST,
    },
    TextureMode {
        name: "VK_LINEAR",
        min: vk::Filter::LINEAR,
        mag: vk::Filter::LINEAR,
        mipmap: vk::SamplerMipmapMode::NEAREST,
    },
    TextureMode {
        name: "VK_NEAREST_MIPMAP_NEAREST",
        min: vk::Filter::NEAREST,
        mag: vk::Filter::NEAREST,
        mipmap: vk::SamplerMipmapMode::NEAREST,
    },
    TextureMode {
        name: "VK_LINEAR_MIPMAP_NEAREST",
        min: vk::Filter::LINEAR,
        mag: vk::Filter::LINEAR,
        mipmap: vk::SamplerMipmapMode::NEAREST,
    },
    TextureMode {
        name: "VK_NEAREST_MIPMAP_LINEAR",
        min: vk::Filter::NEAREST,
        mag: vk::Filter::NEAREST,
        mipmap: vk::SamplerMipmapMode::LINEAR,
    },
    TextureMode {
        name: "VK_LINEAR_MIPMAP_LINEAR",
        min: vk::Filter::LINEAR,
        mag: vk::Filter::LINEAR,
        mipmap: vk::SamplerMipmapMode::LINEAR,
    },
];

/// Resolve a vk_texturemode string; unknown names fall back to trilinear.
pub fn find_texture_mode(name: &str) -> &'static TextureMode {
    TEXTURE_MODES
        .iter()
        .find(|m| m.name.eq_ignore_ascii_case(name))
        .unwrap_or(&TEXTURE_MODES[5])
}

/// The sampler set shared by the draw passes.
pub struct SamplerSet {
    /// world/skin textures: selected filter mode + anisotropy
    pub world: vk::Sampler,
    /// lightmap pages and post-process inputs: always bilinear clamp
    pub linear_clamp: vk::Sampler,
    /// UI pics: selected mag filter, no mips, clamp
    pub pic: vk::Sampler,
}

impl SamplerSet {
    /// Build the samplers for a filter mode. `anisotropy` comes from the
    /// `r_anisotropy` cvar and is clamped to the device limit.
    ///
    /// # Safety
    /// Context must outlive the set.
    pub unsafe fn new(
        ctx: &VulkanContext,
        mode: &TextureMode,
        anisotropy: f32,
    ) -> Result<Self, String> {
        let aniso = clamp_anisotropy(anisotropy, ctx.max_anisotropy());

        let world_info = vk::SamplerCreateInfo::default()
            .min_filter(mode.min)
            .mag_filter(mode.mag)
            .mipmap_mode(mode.mipmap)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(aniso > 1.0)
            .max_anisotropy(aniso)
            .max_lod(vk::LOD_CLAMP_NONE);
        let world = ctx
            .device
            .create_sampler(&world_info, None)
            .map_err(|e| format!("Failed to create sampler: {:?}", e))?;

        let clamp_info = vk::SamplerCreateInfo::default()
            .min_filter(vk::Filter::LINEAR)
            .mag_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE);
        let linear_clamp = ctx
            .device
            .create_sampler(&clamp_info, None)
            .map_err(|e| format!("Failed to create sampler: {:?}", e))?;

        let pic_info = vk::SamplerCreateInfo::default()
            .min_filter(mode.mag)
            .mag_filter(mode.mag)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE);
        let pic = ctx
            .device
            .create_sampler(&pic_info, None)
            .map_err(|e| format!("Failed to create sampler: {:?}", e))?;

        Ok(Self { world, linear_clamp, pic })
    }

    /// # Safety
    /// Device must be idle.
    pub unsafe fn destroy(&mut self, ctx: &VulkanContext) {
        ctx.device.destroy_sampler(self.world, None);
        ctx.device.destroy_sampler(self.linear_clamp, None);
        ctx.device.destroy_sampler(self.pic, None);
    }
}

/// Clamp a requested anisotropy level into [1, device max].
pub fn clamp_anisotropy(requested: f32, device_max: f32) -> f32 {
    requested.clamp(1.0, device_max.max(1.0))
}
