// q2vk-client — client-side world reconstruction.
//
// Turns the network layer's snapshot stream into per-frame render state:
// entity interpolation/extrapolation, prediction error damping, and the
// console text buffer.
//
// Copyright (C) 1997-2001 Id Software, Inc.
// GPL-2.0-or-later

pub mod cl_ents;
pub mod cl_pred;
pub mod cl_smooth;
pub mod console;
