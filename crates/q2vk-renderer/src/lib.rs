// q2vk-renderer — the render core.
//
// Turns a resolved refdef (entities, dlights, particles, view) into a
// presented frame: PVS walk, lightmap compositing, reflection passes,
// the Vulkan pass sequence, and the post-process chain.
//
// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later

pub mod anorms;
pub mod error;
pub mod vk_draw;
pub mod vk_image;
pub mod vk_light;
pub mod vk_local;
pub mod vk_model;
pub mod vk_model_types;
pub mod vk_refl;
pub mod vk_rmain;
pub mod vk_rmisc;
pub mod vk_rsurf;
pub mod vk_warp;
pub mod vulkan;

pub use error::RdError;
pub use vk_rmain::RendererContext;
