// vk_refl.rs — reflective water
//
// Before the main pass the world is walked for horizontal translucent
// water surfaces; each distinct Z plane gets a mirrored render into an
// offscreen target. At composite time the water fragment samples its
// reflection image in screen space and Fresnel-blends with refraction.

use q2vk_common::q_shared::{
    dot_product, Vec3, PITCH, PLANE_X, PLANE_Y, PLANE_Z, SURF_TRANS33, SURF_TRANS66,
};

use crate::vk_local::{MAX_REFL, REFL_TEXH, REFL_TEXW, SURF_DRAWTURB, SURF_PLANEBACK};
use crate::vk_model_types::WorldModel;
use crate::vk_rsurf::{Frustum, VisState};

/// Per-frame reflection bookkeeping: the deduplicated water plane heights
/// in discovery order, capped at MAX_REFL.
#[derive(Debug, Clone)]
pub struct ReflState {
    refl_z: Vec<f32>,
    /// which reflection pass is currently being rendered
    pub active: usize,
    /// true while rendering a mirrored view instead of the world itself
    pub drawing: bool,
    pub enabled: bool,
    /// offscreen target size, clamped to the frame size by the driver
    pub tex_width: u32,
    pub tex_height: u32,
}

impl Default for ReflState {
    fn default() -> Self {
        Self {
            refl_z: Vec::with_capacity(MAX_REFL),
            active: 0,
            drawing: false,
            enabled: true,
            tex_width: REFL_TEXW,
            tex_height: REFL_TEXH,
        }
    }
}

impl ReflState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the collected reflections (start of frame).
    pub fn clear(&mut self) {
        self.refl_z.clear();
    }

    /// Record a reflector height. Duplicates are ignored; past MAX_REFL
    /// additional reflectors are silently dropped.
    pub fn add(&mut self, z: f32) {
        if self.refl_z.iter().any(|&existing| existing == z) {
            return;
        }
        if self.refl_z.len() < MAX_REFL {
            self.refl_z.push(z);
        }
    }

    pub fn planes(&self) -> &[f32] {
        &self.refl_z
    }

    pub fn count(&self) -> usize {
        self.refl_z.len()
    }
}

/// Walk the visible BSP collecting the Z heights of reflective surfaces:
/// translucent, turbulent, and flat on the Z plane. Does nothing when the
/// viewer is underwater; the mirrored pass would look through the back of
/// the surface.
pub fn find_reflections(
    world: &WorldModel,
    vis: &VisState,
    frustum: &Frustum,
    vieworg: &Vec3,
    underwater: bool,
    state: &mut ReflState,
) {
    state.clear();
    if !state.enabled || underwater || world.nodes.is_empty() {
        return;
    }
    recursive_find_refl(world, vis, frustum, vieworg, 0, state);
}

fn recursive_find_refl(
    world: &WorldModel,
    vis: &VisState,
    frustum: &Frustum,
    vieworg: &Vec3,
    node_index: i32,
    state: &mut ReflState,
) {
    // leaves contribute nothing; their surfaces were stamped by the main walk
    let node_index = match world.child(node_index) {
        Ok(n) => n,
        Err(_) => return,
    };

    let node = &world.nodes[node_index];
    if node.visframe != vis.visframecount {
        return;
    }
    let mins = [node.minmaxs[0], node.minmaxs[1], node.minmaxs[2]];
    let maxs = [node.minmaxs[3], node.minmaxs[4], node.minmaxs[5]];
    if frustum.cull_box(&mins, &maxs) {
        return;
    }

    let plane = &world.planes[node.plane as usize];
    let dot = match plane.plane_type {
        PLANE_X => vieworg[0] - plane.dist,
        PLANE_Y => vieworg[1] - plane.dist,
        PLANE_Z => vieworg[2] - plane.dist,
        _ => dot_product(vieworg, &plane.normal) - plane.dist,
    };
    let (side, sidebit) = if dot >= 0.0 { (0, 0) } else { (1, SURF_PLANEBACK) };

    recursive_find_refl(world, vis, frustum, vieworg, node.children[side], state);

    for i in node.firstsurface as usize..(node.firstsurface + node.numsurfaces) as usize {
        let surf = &world.surfaces[i];
        if surf.visframe != vis.framecount {
            continue;
        }
        if (surf.flags & SURF_PLANEBACK) != sidebit {
            continue;
        }

        let ti_flags = world.texinfo[surf.texinfo as usize].flags;
        let reflective = surf.flags & SURF_DRAWTURB != 0
            && ti_flags & (SURF_TRANS33 | SURF_TRANS66) != 0;

        if reflective && world.planes[surf.plane as usize].plane_type == PLANE_Z {
            if let Some(v) = surf.polys.first().and_then(|p| p.verts.first()) {
                state.add(v.pos[2]);
            }
        }
    }

    recursive_find_refl(world, vis, frustum, vieworg, node.children[side ^ 1], state);
}

/// The mirrored viewpoint for a reflector at height `z`: the origin is
/// reflected through the plane and the pitch negated.
pub fn reflected_view(origin: &Vec3, angles: &Vec3, z: f32) -> (Vec3, Vec3) {
    let mut refl_org = *origin;
    refl_org[2] = 2.0 * z - origin[2];
    let mut refl_angles = *angles;
    refl_angles[PITCH] = -angles[PITCH];
    (refl_org, refl_angles)
}

/// The user clip plane for a reflection pass: keep geometry above `z`.
pub fn reflection_clip_plane(z: f32) -> ([f32; 3], f32) {
    ([0.0, 0.0, 1.0], z)
}

/// Perspective frustum built the Mesa way. Mirrored viewers hit skew
/// cases where the standard formula produces a degenerate sign; this form
/// stays well-behaved.
#[allow(clippy::too_many_arguments)]
pub fn mesa_frustum(
    left: f64,
    right: f64,
    bottom: f64,
    top: f64,
    nearval: f64,
    farval: f64,
) -> [[f32; 4]; 4] {
    let x = (2.0 * nearval) / (right - left);
    let y = (2.0 * nearval) / (top - bottom);
    let a = (right + left) / (right - left);
    let b = (top + bottom) / (top - bottom);
    let c = -(farval + nearval) / (farval - nearval);
    let d = -(2.0 * farval * nearval) / (farval - nearval);

    // column-major
    [
        [x as f32, 0.0, 0.0, 0.0],
        [0.0, y as f32, 0.0, 0.0],
        [a as f32, b as f32, c as f32, -1.0],
        [0.0, 0.0, d as f32, 0.0],
    ]
}

/// Water composite: the surface samples its reflection image in screen
/// space and Fresnel-blends with the refracted scene behind it, with a
/// per-water depth absorption tint.
pub const WATER_COMPOSITE_FRAG_GLSL: &str = r#"
#version 450
layout(location = 0) in vec3 v_worldPos;
layout(location = 1) in vec2 v_warpUv;
layout(location = 2) in vec4 v_clipPos;
layout(location = 0) out vec4 o_color;

layout(set = 0, binding = 0) uniform sampler2D u_water;
layout(set = 0, binding = 1) uniform sampler2D u_reflection;
layout(set = 0, binding = 2) uniform sampler2D u_refraction;
layout(set = 0, binding = 3) uniform sampler2D u_sceneDepth;

layout(push_constant) uniform Push {
    vec3 viewOrg;
    float time;
    vec3 absorption;
    float alpha;
} pc;

void main() {
    // turbulent warp: each axis offset by a sine of the other plus time
    vec2 warp;
    warp.x = (v_warpUv.x + sin((v_warpUv.y * 0.125 + pc.time) * 6.28318) * 8.0) / 64.0;
    warp.y = (v_warpUv.y + sin((v_warpUv.x * 0.125 + pc.time) * 6.28318) * 8.0) / 64.0;
    vec3 base = texture(u_water, warp).rgb;

    vec2 screenUv = (v_clipPos.xy / v_clipPos.w) * 0.5 + 0.5;
    vec3 reflection = texture(u_reflection, screenUv).rgb;

    // refraction darkens with how much water the ray crosses
    float sceneDepth = texture(u_sceneDepth, screenUv).r;
    float waterDepth = clamp((sceneDepth - gl_FragCoord.z) * 256.0, 0.0, 1.0);
    vec3 refraction = texture(u_refraction, screenUv).rgb * exp(-pc.absorption * waterDepth);

    // Schlick Fresnel from the down-looking angle
    vec3 toEye = normalize(pc.viewOrg - v_worldPos);
    float fresnel = 0.02 + 0.98 * pow(1.0 - max(toEye.z, 0.0), 5.0);

    vec3 color = mix(mix(refraction, reflection, fresnel), base, 0.25);
    o_color = vec4(color, pc.alpha);
}
"#;

/// Projection for a reflection pass from a vertical field of view.
pub fn reflection_projection(fov_y_deg: f32, aspect: f32, znear: f32, zfar: f32) -> [[f32; 4]; 4] {
    let ymax = znear as f64 * (fov_y_deg as f64 * std::f64::consts::PI / 360.0).tan();
    let ymin = -ymax;
    let xmin = ymin * aspect as f64;
    let xmax = ymax * aspect as f64;
    mesa_frustum(xmin, xmax, ymin, ymax, znear as f64, zfar as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_dedupes() {
        let mut state = ReflState::new();
        state.add(64.0);
        state.add(64.0);
        state.add(64.0);
        assert_eq!(state.count(), 1);
    }

    #[test]
    fn test_add_caps_at_max_refl() {
        let mut state = ReflState::new();
        state.add(0.0);
        state.add(64.0);
        state.add(128.0); // third reflector is silently dropped
        assert_eq!(state.count(), MAX_REFL);
        assert_eq!(state.planes(), &[0.0, 64.0]);
    }

    #[test]
    fn test_discovery_order_preserved() {
        let mut state = ReflState::new();
        state.add(100.0);
        state.add(-50.0);
        assert_eq!(state.planes(), &[100.0, -50.0]);
    }

    #[test]
    fn test_reflected_view() {
        let (org, ang) = reflected_view(&[10.0, 20.0, 100.0], &[15.0, 90.0, 0.0], 64.0);
        assert_eq!(org, [10.0, 20.0, 28.0]); // 2*64 - 100
        assert_eq!(ang, [-15.0, 90.0, 0.0]);
    }

    #[test]
    fn test_reflected_view_is_involution() {
        let (org, ang) = reflected_view(&[0.0, 0.0, 30.0], &[-40.0, 10.0, 5.0], 64.0);
        let (org2, ang2) = reflected_view(&org, &ang, 64.0);
        assert_eq!(org2, [0.0, 0.0, 30.0]);
        assert_eq!(ang2, [-40.0, 10.0, 5.0]);
    }

    #[test]
    fn test_underwater_suppresses() {
        use crate::vk_model::test_support::tiny_world;
        let world = tiny_world();
        let vis = VisState::new();
        let frustum = Frustum::default();
        let mut state = ReflState::new();
        state.add(99.0); // stale entry from last frame
        find_reflections(&world, &vis, &frustum, &[0.0; 3], true, &mut state);
        assert_eq!(state.count(), 0);
    }

    #[test]
    fn test_mesa_frustum_symmetric_matches_perspective() {
        let m = reflection_projection(90.0, 1.0, 4.0, 4096.0);
        // symmetric frustum: no skew terms
        assert_eq!(m[2][0], 0.0);
        assert_eq!(m[2][1], 0.0);
        assert_eq!(m[2][3], -1.0);
        // 90 degree fov at aspect 1: x and y scale are 1
        assert!((m[0][0] - 1.0).abs() < 1e-5);
        assert!((m[1][1] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_clip_plane() {
        let (n, d) = reflection_clip_plane(32.0);
        assert_eq!(n, [0.0, 0.0, 1.0]);
        assert_eq!(d, 32.0);
    }
}
