// q2vk-common — shared definitions for the q2vk render core.
//
// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later

pub mod cvar;
pub mod files;
pub mod q_shared;
pub mod qfiles;
