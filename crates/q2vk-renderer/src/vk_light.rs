// vk_light.rs — dynamic lights, lightmap compositing, stain maps
//
// Static lightmaps are baked into atlas pages at load (vk_rsurf). Each
// frame, dlights are pushed into the BSP to stamp the surfaces they can
// touch; stamped surfaces get their atlas rectangle recomposited from the
// static luxels plus each light's falloff, modulated by the stainmap.

use q2vk_common::q_shared::{dot_product, DLight, LightStyle, Vec3};
use rayon::prelude::*;

use crate::vk_local::{BLOCK_WIDTH, DLIGHT_CUTOFF, SURF_DRAWSKY, SURF_DRAWTURB, SURF_PLANEBACK};
use crate::vk_model_types::{MSurface, WorldModel};
use crate::vk_rsurf::LightmapBuilder;

/// Recursively stamp surfaces a dlight may touch.
fn mark_lights(world: &mut WorldModel, light: &DLight, bit: u32, node_index: i32, frame: i32) {
    let node_index = match world.child(node_index) {
        Ok(n) => n,
        Err(_) => return,
    };

    let node = world.nodes[node_index];
    let splitplane = world.planes[node.plane as usize];
    let dist = dot_product(&light.origin, &splitplane.normal) - splitplane.dist;

    if dist > light.intensity - DLIGHT_CUTOFF {
        mark_lights(world, light, bit, node.children[0], frame);
        return;
    }
    if dist < -light.intensity + DLIGHT_CUTOFF {
        mark_lights(world, light, bit, node.children[1], frame);
        return;
    }

    // mark the polygons
    for i in node.firstsurface as usize..(node.firstsurface + node.numsurfaces) as usize {
        let (plane, flags) = {
            let surf = &world.surfaces[i];
            (world.planes[surf.plane as usize], surf.flags)
        };

        // only faces pointing at the light
        let dist2 = dot_product(&light.origin, &plane.normal) - plane.dist;
        let sidebit = if dist2 >= 0.0 { 0 } else { SURF_PLANEBACK };
        if (flags & SURF_PLANEBACK) != sidebit {
            continue;
        }

        let surf = &mut world.surfaces[i];
        if surf.dlightframe != frame {
            surf.dlightbits = bit;
            surf.dlightframe = frame;
        } else {
            surf.dlightbits |= bit;
        }
    }

    mark_lights(world, light, bit, node.children[0], frame);
    mark_lights(world, light, bit, node.children[1], frame);
}

/// Push every dlight into the BSP for this frame. The stamp frame is the
/// render frame plus one so stale stamps never alias.
pub fn push_dlights(world: &mut WorldModel, dlights: &[DLight], framecount: i32) -> i32 {
    let dlightframe = framecount + 1;
    for (i, light) in dlights.iter().enumerate() {
        mark_lights(world, light, 1 << i, 0, dlightframe);
    }
    dlightframe
}

/// Whether a dlight actually reaches a surface: signed plane distance
/// inside the falloff, and the projected center within the surface's
/// (radius-expanded) texture-space bounds.
pub fn surface_affected(world: &WorldModel, surf: &MSurface, light: &DLight) -> bool {
    let plane = &world.planes[surf.plane as usize];
    let dist = dot_product(&light.origin, &plane.normal) - plane.dist;
    if dist.abs() >= light.intensity - DLIGHT_CUTOFF {
        return false;
    }

    if surf.flags & (SURF_DRAWSKY | SURF_DRAWTURB) != 0 {
        return false;
    }

    let tex = &world.texinfo[surf.texinfo as usize];
    let s = dot_product(&light.origin, &[tex.vecs[0][0], tex.vecs[0][1], tex.vecs[0][2]])
        + tex.vecs[0][3];
    let t = dot_product(&light.origin, &[tex.vecs[1][0], tex.vecs[1][1], tex.vecs[1][2]])
        + tex.vecs[1][3];

    let rad = light.intensity;
    s >= surf.texturemins[0] as f32 - rad
        && s <= (surf.texturemins[0] + surf.extents[0]) as f32 + rad
        && t >= surf.texturemins[1] as f32 - rad
        && t <= (surf.texturemins[1] + surf.extents[1]) as f32 + rad
}

// ============================================================
// Lightmap compositing
// ============================================================

/// Composite one surface's lightmap rectangle: static luxels scaled by
/// their lightstyles, plus each stamped dlight's falloff, modulated by
/// the stain alpha, shifted down for overbright headroom.
#[allow(clippy::too_many_arguments)]
pub fn build_lightmap(
    world: &WorldModel,
    surf: &MSurface,
    lightstyles: &[LightStyle],
    dlights: &[DLight],
    dlightframe: i32,
    modulate: f32,
    overbright_bits: i32,
    out: &mut Vec<u8>,
) -> (usize, usize) {
    let (smax, tmax) = surf.lm_size();
    let luxels = smax * tmax;
    let mut accum = vec![[0.0f32; 3]; luxels];

    // static styles
    if let Some(ofs) = surf.samples {
        let mut src = ofs;
        for map in 0..surf.styles.len() {
            let style = surf.styles[map];
            if style == 255 {
                break;
            }
            if src + luxels * 3 > world.lightdata.len() {
                break;
            }
            let scale = lightstyles
                .get(style as usize)
                .map_or([modulate; 3], |ls| {
                    [modulate * ls.rgb[0], modulate * ls.rgb[1], modulate * ls.rgb[2]]
                });
            for (i, acc) in accum.iter_mut().enumerate() {
                acc[0] += world.lightdata[src + i * 3] as f32 * scale[0];
                acc[1] += world.lightdata[src + i * 3 + 1] as f32 * scale[1];
                acc[2] += world.lightdata[src + i * 3 + 2] as f32 * scale[2];
            }
            src += luxels * 3;
        }
    } else {
        accum.iter_mut().for_each(|a| *a = [255.0; 3]);
    }

    // dynamic lights stamped onto this surface this frame
    if surf.dlightframe == dlightframe {
        add_dynamic_lights(world, surf, dlights, &mut accum);
    }

    // overbright: shift stored values down; the sampler multiplies back up
    let shift = match overbright_bits {
        2 => 1,
        4 => 2,
        _ => 0,
    };

    out.clear();
    out.reserve(luxels * 4);
    for (i, a) in accum.iter().enumerate() {
        let stain = surf.stainsamples.get(i).copied().unwrap_or(255) as f32 / 255.0;
        for c in 0..3 {
            let v = (a[c] * stain).min(255.0) as u32 >> shift;
            out.push(v as u8);
        }
        out.push(255);
    }
    (smax, tmax)
}

fn add_dynamic_lights(
    world: &WorldModel,
    surf: &MSurface,
    dlights: &[DLight],
    accum: &mut [[f32; 3]],
) {
    let (smax, tmax) = surf.lm_size();
    let tex = &world.texinfo[surf.texinfo as usize];
    let plane = &world.planes[surf.plane as usize];

    for (lnum, light) in dlights.iter().enumerate() {
        if surf.dlightbits & (1 << lnum) == 0 {
            continue; // not lit by this light
        }

        let fdist = dot_product(&light.origin, &plane.normal) - plane.dist;
        let frad = light.intensity - fdist.abs();
        // rad is now the highest intensity on the plane
        let fminlight = DLIGHT_CUTOFF;
        if frad < fminlight {
            continue;
        }

        let impact = [
            light.origin[0] - plane.normal[0] * fdist,
            light.origin[1] - plane.normal[1] * fdist,
            light.origin[2] - plane.normal[2] * fdist,
        ];

        let local = [
            dot_product(&impact, &[tex.vecs[0][0], tex.vecs[0][1], tex.vecs[0][2]])
                + tex.vecs[0][3]
                - surf.texturemins[0] as f32,
            dot_product(&impact, &[tex.vecs[1][0], tex.vecs[1][1], tex.vecs[1][2]])
                + tex.vecs[1][3]
                - surf.texturemins[1] as f32,
        ];

        for t in 0..tmax {
            let td = local[1] - (t as f32) * 16.0;
            for s in 0..smax {
                let sd = local[0] - (s as f32) * 16.0;
                let dist = (sd * sd + td * td + fdist * fdist).sqrt();
                let falloff = 1.0 - dist / light.intensity;
                if falloff <= 0.0 {
                    continue;
                }
                let scale = light.intensity * falloff;
                let acc = &mut accum[t * smax + s];
                acc[0] += scale * light.color[0];
                acc[1] += scale * light.color[1];
                acc[2] += scale * light.color[2];
            }
        }
    }
}

/// Recomposite every dlight-stamped or styled surface among the marked
/// set and write the rectangles back into the atlas pages. Luxel work is
/// embarrassingly parallel per surface; page write-back is serialized.
#[allow(clippy::too_many_arguments)]
pub fn update_dynamic_lightmaps(
    world: &WorldModel,
    lm: &mut LightmapBuilder,
    marked: &[u32],
    lightstyles: &[LightStyle],
    dlights: &[DLight],
    dlightframe: i32,
    modulate: f32,
    overbright_bits: i32,
) -> usize {
    let rects: Vec<(u32, Vec<u8>, usize, usize)> = marked
        .par_iter()
        .filter_map(|&s| {
            let surf = &world.surfaces[s as usize];
            if surf.lightmaptexturenum < 0 {
                return None;
            }
            let dynamic_now = surf.dlightframe == dlightframe;
            let styled = surf
                .styles
                .iter()
                .any(|&st| st != 0 && st != 255);
            if !dynamic_now && !styled {
                return None;
            }
            let mut rect = Vec::new();
            let (w, h) = build_lightmap(
                world,
                surf,
                lightstyles,
                dlights,
                dlightframe,
                modulate,
                overbright_bits,
                &mut rect,
            );
            Some((s, rect, w, h))
        })
        .collect();

    let count = rects.len();
    for (s, rect, w, h) in rects {
        let surf = &world.surfaces[s as usize];
        let page = &mut lm.pages[surf.lightmaptexturenum as usize];
        for row in 0..h {
            let dst =
                (((surf.light_t as usize + row) * BLOCK_WIDTH as usize) + surf.light_s as usize) * 4;
            let src = row * w * 4;
            page.texels[dst..dst + w * 4].copy_from_slice(&rect[src..src + w * 4]);
        }
        page.dirty = true;
    }
    count
}

// ============================================================
// Stain maps
// ============================================================

/// Accumulate a stain (damage decal darkening) onto every surface within
/// reach of `origin`.
pub fn add_stain(world: &mut WorldModel, origin: &Vec3, radius: f32, alpha: f32) {
    stain_node(world, origin, radius, alpha, 0);
}

fn stain_node(world: &mut WorldModel, origin: &Vec3, radius: f32, alpha: f32, node_index: i32) {
    let node_index = match world.child(node_index) {
        Ok(n) => n,
        Err(_) => return,
    };

    let node = world.nodes[node_index];
    let plane = world.planes[node.plane as usize];
    let dist = dot_product(origin, &plane.normal) - plane.dist;

    if dist > radius {
        stain_node(world, origin, radius, alpha, node.children[0]);
        return;
    }
    if dist < -radius {
        stain_node(world, origin, radius, alpha, node.children[1]);
        return;
    }

    for i in node.firstsurface as usize..(node.firstsurface + node.numsurfaces) as usize {
        stain_surface(world, i, origin, radius, alpha);
    }

    stain_node(world, origin, radius, alpha, node.children[0]);
    stain_node(world, origin, radius, alpha, node.children[1]);
}

fn stain_surface(world: &mut WorldModel, surf_index: usize, origin: &Vec3, radius: f32, alpha: f32) {
    let (smax, tmax, local) = {
        let surf = &world.surfaces[surf_index];
        if surf.stainsamples.is_empty() || surf.flags & (SURF_DRAWSKY | SURF_DRAWTURB) != 0 {
            return;
        }
        let (smax, tmax) = surf.lm_size();
        let tex = &world.texinfo[surf.texinfo as usize];
        let plane = &world.planes[surf.plane as usize];
        let fdist = dot_product(origin, &plane.normal) - plane.dist;
        let impact = [
            origin[0] - plane.normal[0] * fdist,
            origin[1] - plane.normal[1] * fdist,
            origin[2] - plane.normal[2] * fdist,
        ];
        let local = [
            dot_product(&impact, &[tex.vecs[0][0], tex.vecs[0][1], tex.vecs[0][2]])
                + tex.vecs[0][3]
                - surf.texturemins[0] as f32,
            dot_product(&impact, &[tex.vecs[1][0], tex.vecs[1][1], tex.vecs[1][2]])
                + tex.vecs[1][3]
                - surf.texturemins[1] as f32,
        ];
        (smax, tmax, local)
    };

    let surf = &mut world.surfaces[surf_index];
    for t in 0..tmax {
        let td = local[1] - (t as f32) * 16.0;
        for s in 0..smax {
            let sd = local[0] - (s as f32) * 16.0;
            let dist = (sd * sd + td * td).sqrt();
            if dist >= radius {
                continue;
            }
            let strength = alpha * (1.0 - dist / radius);
            let cell = &mut surf.stainsamples[t * smax + s];
            let darkened = (*cell as f32) * (1.0 - strength);
            *cell = darkened.max(0.0) as u8;
        }
    }
}

/// Fade all stains back toward unstained, linear in seconds.
pub fn fade_stains(world: &mut WorldModel, dt_sec: f32, rate_per_sec: f32) {
    let step = (dt_sec * rate_per_sec * 255.0) as i32;
    if step <= 0 {
        return;
    }
    world.surfaces.par_iter_mut().for_each(|surf| {
        for cell in &mut surf.stainsamples {
            *cell = (*cell as i32 + step).min(255) as u8;
        }
    });
}

// ============================================================
// Point lighting (entities)
// ============================================================

/// Sample the world lightmap under `p` by tracing straight down, then add
/// the dlights in range. Drives per-entity shade color.
pub fn light_point(
    world: &WorldModel,
    p: &Vec3,
    lightstyles: &[LightStyle],
    dlights: &[DLight],
    modulate: f32,
) -> Vec3 {
    let end = [p[0], p[1], p[2] - 2048.0];
    let mut color = recursive_light_point(world, 0, p, &end, lightstyles, modulate)
        .unwrap_or([1.0, 1.0, 1.0]);

    // add dynamic lights
    for light in dlights {
        let delta = [
            p[0] - light.origin[0],
            p[1] - light.origin[1],
            p[2] - light.origin[2],
        ];
        let add =
            (light.intensity - (delta[0] * delta[0] + delta[1] * delta[1] + delta[2] * delta[2]).sqrt())
                / 256.0;
        if add > 0.0 {
            color[0] += add * light.color[0];
            color[1] += add * light.color[1];
            color[2] += add * light.color[2];
        }
    }
    color
}

fn recursive_light_point(
    world: &WorldModel,
    node_index: i32,
    start: &Vec3,
    end: &Vec3,
    lightstyles: &[LightStyle],
    modulate: f32,
) -> Option<Vec3> {
    let node_index = match world.child(node_index) {
        Ok(n) => n,
        Err(_) => return None, // hit a leaf: no lit surface on this path
    };

    let node = &world.nodes[node_index];
    let plane = &world.planes[node.plane as usize];
    let front = dot_product(start, &plane.normal) - plane.dist;
    let back = dot_product(end, &plane.normal) - plane.dist;
    let side = (front < 0.0) as usize;

    if (back < 0.0) == (front < 0.0) {
        return recursive_light_point(world, node.children[side], start, end, lightstyles, modulate);
    }

    let frac = front / (front - back);
    let mid = [
        start[0] + (end[0] - start[0]) * frac,
        start[1] + (end[1] - start[1]) * frac,
        start[2] + (end[2] - start[2]) * frac,
    ];

    // front side first
    if let Some(color) =
        recursive_light_point(world, node.children[side], start, &mid, lightstyles, modulate)
    {
        return Some(color);
    }

    // check for impact on this node's surfaces
    for i in node.firstsurface as usize..(node.firstsurface + node.numsurfaces) as usize {
        let surf = &world.surfaces[i];
        if surf.flags & (SURF_DRAWTURB | SURF_DRAWSKY) != 0 {
            continue; // no lightmaps
        }
        let tex = &world.texinfo[surf.texinfo as usize];

        let s = (dot_product(&mid, &[tex.vecs[0][0], tex.vecs[0][1], tex.vecs[0][2]])
            + tex.vecs[0][3]) as i32;
        let t = (dot_product(&mid, &[tex.vecs[1][0], tex.vecs[1][1], tex.vecs[1][2]])
            + tex.vecs[1][3]) as i32;

        if s < surf.texturemins[0] as i32 || t < surf.texturemins[1] as i32 {
            continue;
        }
        let ds = s - surf.texturemins[0] as i32;
        let dt = t - surf.texturemins[1] as i32;
        if ds > surf.extents[0] as i32 || dt > surf.extents[1] as i32 {
            continue;
        }

        let Some(ofs) = surf.samples else {
            return Some([0.0, 0.0, 0.0]);
        };

        let (smax, tmax) = surf.lm_size();
        let luxel = ((dt >> 4) as usize) * smax + (ds >> 4) as usize;
        let mut color = [0.0f32; 3];
        let mut src = ofs + luxel * 3;
        for map in 0..surf.styles.len() {
            let style = surf.styles[map];
            if style == 255 {
                break;
            }
            if src + 3 > world.lightdata.len() {
                break;
            }
            let scale = lightstyles
                .get(style as usize)
                .map_or([modulate; 3], |ls| {
                    [modulate * ls.rgb[0], modulate * ls.rgb[1], modulate * ls.rgb[2]]
                });
            color[0] += world.lightdata[src] as f32 * scale[0] * (1.0 / 255.0);
            color[1] += world.lightdata[src + 1] as f32 * scale[1] * (1.0 / 255.0);
            color[2] += world.lightdata[src + 2] as f32 * scale[2] * (1.0 / 255.0);
            src = ofs + (map + 1) * smax * tmax * 3 + luxel * 3;
        }
        return Some(color);
    }

    // go down the back side
    recursive_light_point(world, node.children[side ^ 1], &mid, end, lightstyles, modulate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vk_model::test_support::tiny_world;
    use crate::vk_rsurf::LightmapBuilder;

    fn ceiling_light() -> DLight {
        DLight {
            origin: [0.0, 0.0, 32.0], // 32 under the z=64 ceiling
            color: [1.0, 1.0, 1.0],
            intensity: 200.0,
        }
    }

    #[test]
    fn test_push_dlights_marks_surface() {
        let mut world = tiny_world();
        let frame = push_dlights(&mut world, &[ceiling_light()], 1);
        assert_eq!(world.surfaces[0].dlightframe, frame);
        assert_eq!(world.surfaces[0].dlightbits, 1);
    }

    #[test]
    fn test_distant_light_does_not_mark() {
        let mut world = tiny_world();
        let light = DLight {
            origin: [0.0, 0.0, -1900.0],
            color: [1.0, 1.0, 1.0],
            intensity: 100.0,
        };
        let frame = push_dlights(&mut world, &[light], 1);
        assert_ne!(world.surfaces[0].dlightframe, frame);
    }

    #[test]
    fn test_surface_affected_cutoff() {
        let world = tiny_world();
        let surf = &world.surfaces[0];
        // plane distance 32, intensity 200: 32 < 200 - 16
        assert!(surface_affected(&world, surf, &ceiling_light()));
        // just inside the cutoff: 32 >= 47 - 16 is false... use 47.9
        let weak = DLight {
            origin: [0.0, 0.0, 32.0],
            color: [1.0, 1.0, 1.0],
            intensity: 48.0,
        };
        assert!(!surface_affected(&world, surf, &weak));
    }

    #[test]
    fn test_surface_affected_projected_bounds() {
        let world = tiny_world();
        let surf = &world.surfaces[0];
        // projected center far off the 64x64 quad, beyond the radius pad
        let off = DLight {
            origin: [500.0, 0.0, 60.0],
            color: [1.0, 1.0, 1.0],
            intensity: 100.0,
        };
        assert!(!surface_affected(&world, surf, &off));
    }

    #[test]
    fn test_build_lightmap_dlight_brightens_center() {
        let mut world = tiny_world();
        let frame = push_dlights(&mut world, &[ceiling_light()], 1);

        let mut with_light = Vec::new();
        build_lightmap(
            &world,
            &world.surfaces[0],
            &[],
            &[ceiling_light()],
            frame,
            1.0,
            0,
            &mut with_light,
        );

        let mut without = Vec::new();
        build_lightmap(&world, &world.surfaces[0], &[], &[], frame - 1, 1.0, 0, &mut without);

        // center luxel (2,2) of the 5x5 grid
        let idx = (2 * 5 + 2) * 4;
        assert!(with_light[idx] > without[idx]);
    }

    #[test]
    fn test_overbright_zero_identity() {
        let world = tiny_world();
        let mut raw = Vec::new();
        build_lightmap(&world, &world.surfaces[0], &[], &[], -1, 1.0, 0, &mut raw);
        // static data is 128 everywhere, modulate 1, no shift
        assert_eq!(raw[0], 128);
    }

    #[test]
    fn test_overbright_shifts_range() {
        let world = tiny_world();
        let mut ob2 = Vec::new();
        build_lightmap(&world, &world.surfaces[0], &[], &[], -1, 1.0, 2, &mut ob2);
        assert_eq!(ob2[0], 64);
        let mut ob4 = Vec::new();
        build_lightmap(&world, &world.surfaces[0], &[], &[], -1, 1.0, 4, &mut ob4);
        assert_eq!(ob4[0], 32);
    }

    #[test]
    fn test_lightstyle_scales_static() {
        let world = tiny_world();
        let styles = vec![LightStyle { rgb: [2.0, 2.0, 2.0], white: 6.0 }];
        let mut out = Vec::new();
        build_lightmap(&world, &world.surfaces[0], &styles, &[], -1, 1.0, 0, &mut out);
        assert_eq!(out[0], 255); // 128 * 2 saturates
    }

    #[test]
    fn test_update_dynamic_writes_page() {
        let mut world = tiny_world();
        let mut lm = LightmapBuilder::new();
        lm.begin_build();
        let mut surf = std::mem::take(&mut world.surfaces[0]);
        let lightdata = world.lightdata.clone();
        lm.create_surface_lightmap(&mut surf, &lightdata);
        world.surfaces[0] = surf;

        let frame = push_dlights(&mut world, &[ceiling_light()], 5);
        lm.pages[0].dirty = false;
        let updated = update_dynamic_lightmaps(
            &world,
            &mut lm,
            &[0],
            &[],
            &[ceiling_light()],
            frame,
            1.0,
            0,
        );
        assert_eq!(updated, 1);
        assert!(lm.pages[0].dirty);
    }

    #[test]
    fn test_stain_darkens_and_fades() {
        let mut world = tiny_world();
        assert!(world.surfaces[0].stainsamples.iter().all(|&s| s == 255));

        add_stain(&mut world, &[0.0, 0.0, 60.0], 64.0, 0.8);
        let stained_min = *world.surfaces[0].stainsamples.iter().min().unwrap();
        assert!(stained_min < 255);

        // fading brings everything back up
        fade_stains(&mut world, 10.0, 1.0);
        assert!(world.surfaces[0].stainsamples.iter().all(|&s| s == 255));
    }

    #[test]
    fn test_stain_modulates_lightmap() {
        let mut world = tiny_world();
        add_stain(&mut world, &[0.0, 0.0, 60.0], 64.0, 1.0);
        let mut out = Vec::new();
        build_lightmap(&world, &world.surfaces[0], &[], &[], -1, 1.0, 0, &mut out);
        // some luxel must be darker than the unstained 128
        assert!(out.chunks_exact(4).any(|px| px[0] < 128));
    }

    #[test]
    fn test_light_point_hits_ceiling() {
        let world = tiny_world();
        // trace down from above the ceiling plane never hits (surface faces down)
        // trace from inside the room up... light_point traces downward; the
        // ceiling at z=64 is above, so the downward trace finds nothing and
        // the fallback is white
        let color = light_point(&world, &[0.0, 0.0, 0.0], &[], &[], 1.0);
        assert_eq!(color, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_light_point_adds_dlights() {
        let world = tiny_world();
        let light = DLight {
            origin: [0.0, 0.0, 10.0],
            color: [1.0, 0.0, 0.0],
            intensity: 300.0,
        };
        let color = light_point(&world, &[0.0, 0.0, 0.0], &[], &[light], 1.0);
        assert!(color[0] > 1.0);
    }
}
