// vulkan — the ash device layer.
//
// Instance/device bring-up, swapchain, command ring, memory pools, and
// the post-process pass implementations.

pub mod bloom;
pub mod commands;
pub mod context;
pub mod fxaa;
pub mod memory;
pub mod pipeline;
pub mod postprocess;
pub mod samplers;
pub mod spatial_upscale;
pub mod ssao;
pub mod surface;
pub mod swapchain;
pub mod temporal;
pub mod uniforms;
pub mod upload;

pub use commands::CommandManager;
pub use context::VulkanContext;
pub use memory::MemoryManager;
pub use surface::VulkanSurface;
pub use swapchain::{Swapchain, SwapchainState, MAX_FRAMES_IN_FLIGHT};

pub const APP_NAME: &std::ffi::CStr = c"q2vk";
pub const ENGINE_NAME: &std::ffi::CStr = c"q2vk";
pub const ENGINE_VERSION: u32 = ash::vk::make_api_version(0, 0, 3, 0);
pub const REQUIRED_VK_VERSION: u32 = ash::vk::API_VERSION_1_3;
