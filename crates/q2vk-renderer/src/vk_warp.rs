// vk_warp.rs — water warp and sky box
//
// Warp surfaces are subdivided at load so the per-vertex sine warp stays
// smooth; sky surfaces clip into the six cube faces to find the smallest
// box region that must be drawn.

use q2vk_common::files::FileLoader;
use q2vk_common::q_shared::{
    dot_product, vector_add, vector_scale, vector_subtract, Vec3,
};

use crate::vk_image::{ImageCache, ImageType};
use crate::vk_local::{SKYBOX_SIZE, SUBDIVIDE_SIZE};
use crate::vk_model_types::{SurfPoly, WorldModel, WorldVert};

pub const TURBSIN_SIZE: usize = 256;
/// Amplitude of the turbulence warp in texels.
pub const TURBSCALE: f32 = 8.0;

/// The classic 256-entry turbulence sine table.
pub fn build_turbsin() -> [f32; TURBSIN_SIZE] {
    let mut table = [0.0f32; TURBSIN_SIZE];
    for (i, v) in table.iter_mut().enumerate() {
        *v = TURBSCALE * (i as f32 / TURBSIN_SIZE as f32 * std::f32::consts::TAU).sin();
    }
    table
}

/// The turbulent texture warp: each axis is offset by a sine of the other
/// axis plus time, then normalized by the 64-texel water texture.
pub fn warp_st(s: f32, t: f32, time: f32) -> (f32, f32) {
    let ws = (s + ((t * 0.125 + time) * std::f32::consts::TAU).sin() * TURBSCALE) / 64.0;
    let wt = (t + ((s * 0.125 + time) * std::f32::consts::TAU).sin() * TURBSCALE) / 64.0;
    (ws, wt)
}

// ============================================================
// Surface subdivision
// ============================================================

fn bound_poly(verts: &[Vec3]) -> (Vec3, Vec3) {
    let mut mins = [9999.0f32; 3];
    let mut maxs = [-9999.0f32; 3];
    for v in verts {
        for i in 0..3 {
            mins[i] = mins[i].min(v[i]);
            maxs[i] = maxs[i].max(v[i]);
        }
    }
    (mins, maxs)
}

fn subdivide_polygon(world: &mut WorldModel, surf_index: usize, verts: Vec<Vec3>) {
    let (mins, maxs) = bound_poly(&verts);

    for axis in 0..3 {
        let mut m = (mins[axis] + maxs[axis]) * 0.5;
        m = SUBDIVIDE_SIZE * (m / SUBDIVIDE_SIZE + 0.5).floor();
        if maxs[axis] - m < 8.0 || m - mins[axis] < 8.0 {
            continue;
        }

        // cut it
        let dist: Vec<f32> = verts.iter().map(|v| v[axis] - m).collect();

        let mut front = Vec::new();
        let mut back = Vec::new();
        for i in 0..verts.len() {
            let j = (i + 1) % verts.len();
            if dist[i] >= 0.0 {
                front.push(verts[i]);
            }
            if dist[i] <= 0.0 {
                back.push(verts[i]);
            }
            if dist[i] == 0.0 || dist[j] == 0.0 {
                continue;
            }
            if (dist[i] > 0.0) != (dist[j] > 0.0) {
                // clip point
                let frac = dist[i] / (dist[i] - dist[j]);
                let clip = [
                    verts[i][0] + frac * (verts[j][0] - verts[i][0]),
                    verts[i][1] + frac * (verts[j][1] - verts[i][1]),
                    verts[i][2] + frac * (verts[j][2] - verts[i][2]),
                ];
                front.push(clip);
                back.push(clip);
            }
        }

        subdivide_polygon(world, surf_index, front);
        subdivide_polygon(world, surf_index, back);
        return;
    }

    if verts.len() < 3 {
        return;
    }

    // small enough: emit the fan with raw texture-space st
    let vecs = world.texinfo[world.surfaces[surf_index].texinfo as usize].vecs;
    let poly = SurfPoly {
        verts: verts
            .iter()
            .map(|&pos| WorldVert {
                pos,
                s: dot_product(&pos, &[vecs[0][0], vecs[0][1], vecs[0][2]]) + vecs[0][3],
                t: dot_product(&pos, &[vecs[1][0], vecs[1][1], vecs[1][2]]) + vecs[1][3],
                lm_s: 0.0,
                lm_t: 0.0,
            })
            .collect(),
    };
    world.surfaces[surf_index].polys.push(poly);
}

/// Break a warp surface into polygons no larger than SUBDIVIDE_SIZE.
pub fn subdivide_surface(world: &mut WorldModel, surf_index: usize) {
    let surf = &world.surfaces[surf_index];
    let mut verts = Vec::with_capacity(surf.numedges as usize);
    for i in 0..surf.numedges {
        let e = world.surfedges[(surf.firstedge + i) as usize];
        let pos = if e >= 0 {
            world.vertexes[world.edges[e as usize].v[0] as usize].position
        } else {
            world.vertexes[world.edges[(-e) as usize].v[1] as usize].position
        };
        verts.push(pos);
    }
    world.surfaces[surf_index].polys.clear();
    subdivide_polygon(world, surf_index, verts);
}

// ============================================================
// Sky box
// ============================================================

const ON_EPSILON: f32 = 0.1;
const MAX_CLIP_VERTS: usize = 64;

const SIDE_FRONT: usize = 0;
const SIDE_BACK: usize = 1;
const SIDE_ON: usize = 2;

#[rustfmt::skip]
const SKYCLIP: [Vec3; 6] = [
    [1.0, 1.0, 0.0],
    [1.0, -1.0, 0.0],
    [0.0, -1.0, 1.0],
    [0.0, 1.0, 1.0],
    [1.0, 0.0, 1.0],
    [-1.0, 0.0, 1.0],
];

// 1 = s, 2 = t, 3 = dist; negative = inverted
#[rustfmt::skip]
const VEC_TO_ST: [[i32; 3]; 6] = [
    [-2, 3, 1],
    [2, 3, -1],
    [1, 3, 2],
    [-1, 3, -2],
    [-2, -1, 3],
    [-2, 1, -3],
];

/// Suffix order of the six sky face images.
pub const SKY_SUFFIXES: [&str; 6] = ["rt", "bk", "lf", "ft", "up", "dn"];

/// Per-frame sky box state: which parts of which faces the visible sky
/// surfaces project onto.
#[derive(Debug, Clone)]
pub struct SkyBox {
    pub name: String,
    pub rotate: f32,
    /// rotation axis as the map author supplied it; deliberately not
    /// re-normalized per frame, for parity with existing maps
    pub axis: Vec3,
    pub images: [Option<u32>; 6],

    skymins: [[f32; 2]; 6],
    skymaxs: [[f32; 2]; 6],
}

impl Default for SkyBox {
    fn default() -> Self {
        Self {
            name: String::new(),
            rotate: 0.0,
            axis: [0.0, 0.0, 1.0],
            images: [None; 6],
            skymins: [[0.0; 2]; 6],
            skymaxs: [[0.0; 2]; 6],
        }
    }
}

impl SkyBox {
    /// Load the six face images for a named sky.
    pub fn set_sky(
        &mut self,
        name: &str,
        rotate: f32,
        axis: Vec3,
        images: &mut ImageCache,
        loader: &dyn FileLoader,
    ) {
        self.name = name.to_string();
        self.rotate = rotate;
        self.axis = axis;
        for (i, suffix) in SKY_SUFFIXES.iter().enumerate() {
            let path = format!("env/{}{}.tga", name, suffix);
            self.images[i] = images.find_image(&path, ImageType::Sky, loader);
        }
    }

    /// Reset the face extents before a frame's sky surfaces are added.
    pub fn clear_frame(&mut self) {
        for i in 0..6 {
            self.skymins[i] = [9999.0, 9999.0];
            self.skymaxs[i] = [-9999.0, -9999.0];
        }
    }

    /// Project one visible sky surface onto the box faces.
    pub fn add_surface(&mut self, world: &WorldModel, surf_index: usize, vieworg: &Vec3) {
        let surf = &world.surfaces[surf_index];
        for poly in &surf.polys {
            if poly.verts.len() > MAX_CLIP_VERTS - 2 {
                continue;
            }
            let verts: Vec<Vec3> = poly
                .verts
                .iter()
                .map(|v| vector_subtract(&v.pos, vieworg))
                .collect();
            self.clip_sky_polygon(&verts, 0);
        }
    }

    fn clip_sky_polygon(&mut self, verts: &[Vec3], stage: usize) {
        if verts.len() < 3 {
            return;
        }
        if stage == 6 {
            // fully clipped: project onto a face
            self.draw_sky_polygon(verts);
            return;
        }

        let norm = &SKYCLIP[stage];
        let mut front = false;
        let mut back = false;
        let mut sides = Vec::with_capacity(verts.len() + 1);
        let mut dists = Vec::with_capacity(verts.len() + 1);

        for v in verts {
            let d = dot_product(v, norm);
            if d > ON_EPSILON {
                front = true;
                sides.push(SIDE_FRONT);
            } else if d < -ON_EPSILON {
                back = true;
                sides.push(SIDE_BACK);
            } else {
                sides.push(SIDE_ON);
            }
            dists.push(d);
        }

        if !front || !back {
            // not clipped by this plane
            self.clip_sky_polygon(verts, stage + 1);
            return;
        }

        // clip it
        sides.push(sides[0]);
        dists.push(dists[0]);

        let mut newv: [Vec<Vec3>; 2] = [Vec::new(), Vec::new()];
        for (i, v) in verts.iter().enumerate() {
            match sides[i] {
                SIDE_FRONT => newv[0].push(*v),
                SIDE_BACK => newv[1].push(*v),
                _ => {
                    newv[0].push(*v);
                    newv[1].push(*v);
                }
            }
            if sides[i] == SIDE_ON || sides[i + 1] == SIDE_ON || sides[i + 1] == sides[i] {
                continue;
            }
            let next = &verts[(i + 1) % verts.len()];
            let d = dists[i] / (dists[i] - dists[i + 1]);
            let e = [
                v[0] + d * (next[0] - v[0]),
                v[1] + d * (next[1] - v[1]),
                v[2] + d * (next[2] - v[2]),
            ];
            newv[0].push(e);
            newv[1].push(e);
        }

        self.clip_sky_polygon(&newv[0], stage + 1);
        self.clip_sky_polygon(&newv[1], stage + 1);
    }

    fn draw_sky_polygon(&mut self, verts: &[Vec3]) {
        // decide which face it maps to
        let mut v = [0.0f32; 3];
        for vert in verts {
            v = vector_add(&v, vert);
        }
        let av = [v[0].abs(), v[1].abs(), v[2].abs()];
        let axis = if av[0] > av[1] && av[0] > av[2] {
            if v[0] < 0.0 { 1 } else { 0 }
        } else if av[1] > av[2] && av[1] > av[0] {
            if v[1] < 0.0 { 3 } else { 2 }
        } else if v[2] < 0.0 {
            5
        } else {
            4
        };

        // project new texture coords
        for vert in verts {
            let j = VEC_TO_ST[axis][2];
            let dv = if j > 0 { vert[(j - 1) as usize] } else { -vert[(-j - 1) as usize] };
            if dv < 0.001 {
                continue; // don't divide by zero
            }

            let j = VEC_TO_ST[axis][0];
            let s = if j < 0 { -vert[(-j - 1) as usize] / dv } else { vert[(j - 1) as usize] / dv };
            let j = VEC_TO_ST[axis][1];
            let t = if j < 0 { -vert[(-j - 1) as usize] / dv } else { vert[(j - 1) as usize] / dv };

            self.skymins[axis][0] = self.skymins[axis][0].min(s);
            self.skymins[axis][1] = self.skymins[axis][1].min(t);
            self.skymaxs[axis][0] = self.skymaxs[axis][0].max(s);
            self.skymaxs[axis][1] = self.skymaxs[axis][1].max(t);
        }
    }

    /// The touched region of a face, or None if no sky projected onto it.
    /// Returned as (smin, tmin, smax, tmax) in [-1, 1].
    pub fn face_extent(&self, face: usize) -> Option<(f32, f32, f32, f32)> {
        if self.skymins[face][0] >= self.skymaxs[face][0]
            || self.skymins[face][1] >= self.skymaxs[face][1]
        {
            return None;
        }
        Some((
            self.skymins[face][0].max(-1.0),
            self.skymins[face][1].max(-1.0),
            self.skymaxs[face][0].min(1.0),
            self.skymaxs[face][1].min(1.0),
        ))
    }

    /// World-space quad for a face region at the sky box distance.
    pub fn face_quad(&self, face: usize) -> Option<[Vec3; 4]> {
        let (s0, t0, s1, t1) = self.face_extent(face)?;
        let corners = [[s0, t0], [s0, t1], [s1, t1], [s1, t0]];
        let mut quad = [[0.0f32; 3]; 4];
        for (i, [s, t]) in corners.iter().enumerate() {
            // reverse of vec_to_st
            let mut b = [0.0f32; 3];
            let axes = VEC_TO_ST[face];
            let vals = [*s, *t, 1.0];
            for (k, &j) in axes.iter().enumerate() {
                if j > 0 {
                    b[(j - 1) as usize] = vals[k];
                } else {
                    b[(-j - 1) as usize] = -vals[k];
                }
            }
            quad[i] = vector_scale(&b, SKYBOX_SIZE);
        }
        Some(quad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vk_model::test_support::tiny_world;

    #[test]
    fn test_turbsin_table_length() {
        assert_eq!(build_turbsin().len(), 256);
    }

    #[test]
    fn test_turbsin_first_entry_is_zero() {
        assert_eq!(build_turbsin()[0], 0.0);
    }

    #[test]
    fn test_turbsin_peak_at_index_64() {
        let t = build_turbsin();
        assert!((t[64] - TURBSCALE).abs() < 1e-4);
    }

    #[test]
    fn test_turbsin_negative_peak_at_index_192() {
        let t = build_turbsin();
        assert!((t[192] + TURBSCALE).abs() < 1e-4);
    }

    #[test]
    fn test_turbsin_symmetry() {
        let t = build_turbsin();
        for i in 1..128 {
            assert!((t[i] + t[256 - i]).abs() < 1e-4);
        }
    }

    #[test]
    fn test_turbsin_range() {
        for v in build_turbsin() {
            assert!(v.abs() <= TURBSCALE + 1e-4);
        }
    }

    #[test]
    fn test_warp_st_bounds() {
        // warp offset never exceeds the turbscale amplitude
        for (s, t, time) in [(0.0, 0.0, 0.0), (32.0, 16.0, 1.5), (-64.0, 8.0, 10.0)] {
            let (ws, wt) = warp_st(s, t, time);
            assert!((ws * 64.0 - s).abs() <= TURBSCALE + 1e-4);
            assert!((wt * 64.0 - t).abs() <= TURBSCALE + 1e-4);
        }
    }

    #[test]
    fn test_subdivide_splits_large_surface() {
        let mut world = tiny_world();
        // pretend the ceiling is turbulent and subdivide it: 64x64 quad at
        // origin straddles the 64-unit grid line at 0, so it must split
        subdivide_surface(&mut world, 0);
        let polys = &world.surfaces[0].polys;
        assert!(polys.len() >= 2, "expected a split, got {}", polys.len());
        // all fragment verts stay on the original plane
        for poly in polys {
            for v in &poly.verts {
                assert_eq!(v.pos[2], 64.0);
            }
        }
    }

    #[test]
    fn test_subdivide_keeps_st_unnormalized() {
        let mut world = tiny_world();
        subdivide_surface(&mut world, 0);
        // identity mapping: s tracks x in texel units
        for poly in &world.surfaces[0].polys {
            for v in &poly.verts {
                assert!((v.s - v.pos[0]).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_sky_surface_projects_up_face() {
        let world = tiny_world();
        let mut sky = SkyBox::default();
        sky.clear_frame();
        // the ceiling quad is straight up from a viewer below it
        sky.add_surface(&world, 0, &[0.0, 0.0, 0.0]);
        assert!(sky.face_extent(4).is_some(), "up face should be touched");
        assert!(sky.face_extent(5).is_none(), "down face should be empty");
    }

    #[test]
    fn test_clear_frame_resets() {
        let world = tiny_world();
        let mut sky = SkyBox::default();
        sky.clear_frame();
        sky.add_surface(&world, 0, &[0.0, 0.0, 0.0]);
        sky.clear_frame();
        for face in 0..6 {
            assert!(sky.face_extent(face).is_none());
        }
    }

    #[test]
    fn test_face_quad_at_box_distance() {
        let world = tiny_world();
        let mut sky = SkyBox::default();
        sky.clear_frame();
        sky.add_surface(&world, 0, &[0.0, 0.0, 0.0]);
        let quad = sky.face_quad(4).unwrap();
        for v in quad {
            assert_eq!(v[2], SKYBOX_SIZE);
        }
    }

    #[test]
    fn test_axis_not_renormalized() {
        let mut sky = SkyBox::default();
        let loader = q2vk_common::files::MemLoader::new();
        let mut images = ImageCache::new_headless();
        sky.set_sky("unit1_", 4.0, [0.0, 0.0, 3.0], &mut images, &loader);
        // a non-unit axis is preserved exactly
        assert_eq!(sky.axis, [0.0, 0.0, 3.0]);
        assert_eq!(sky.rotate, 4.0);
    }
}
