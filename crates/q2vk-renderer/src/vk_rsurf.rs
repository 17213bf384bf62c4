// vk_rsurf.rs — world surface walking and lightmap atlas
//
// PVS leaf marking, the front-to-back BSP recursion that builds the
// per-frame surface chains, lightmap rectangle allocation, and fan
// polygon construction.

use q2vk_common::q_shared::{
    box_on_plane_side, dot_product, CPlane, Vec3, CONTENTS_SOLID, SURF_SKY, SURF_TRANS33,
    SURF_TRANS66, PLANE_X, PLANE_Y, PLANE_Z,
};

use crate::vk_image::ImageCache;
use crate::vk_local::{BLOCK_HEIGHT, BLOCK_WIDTH, MAX_LIGHTMAPS, SURF_PLANEBACK};
use crate::vk_model::{cluster_pvs, point_in_leaf};
use crate::vk_model_types::{MSurface, SurfPoly, WorldModel, WorldVert};

// ============================================================
// Lightmap atlas
// ============================================================

/// One 256x256 RGBA lightmap page.
pub struct LightmapPage {
    pub texels: Vec<u8>,
    pub dirty: bool,
}

impl LightmapPage {
    fn new() -> Self {
        Self {
            texels: vec![255; (BLOCK_WIDTH * BLOCK_HEIGHT * 4) as usize],
            dirty: true,
        }
    }
}

/// Packs per-surface luxel rectangles into atlas pages at load, and owns
/// the page buffers that dynamic recomposition writes back into.
pub struct LightmapBuilder {
    allocated: [i32; BLOCK_WIDTH as usize],
    pub pages: Vec<LightmapPage>,
}

impl Default for LightmapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LightmapBuilder {
    pub fn new() -> Self {
        Self {
            allocated: [0; BLOCK_WIDTH as usize],
            pages: Vec::new(),
        }
    }

    /// Reset for a fresh map build.
    pub fn begin_build(&mut self) {
        self.allocated = [0; BLOCK_WIDTH as usize];
        self.pages.clear();
        self.pages.push(LightmapPage::new());
    }

    fn alloc_block(&mut self, w: i32, h: i32) -> Option<(i32, i32)> {
        let mut best = BLOCK_HEIGHT;
        let mut x = 0;
        let mut y = 0;

        for i in 0..(BLOCK_WIDTH - w) {
            let mut best2 = 0;
            let mut j = 0;
            while j < w {
                if self.allocated[(i + j) as usize] >= best {
                    break;
                }
                if self.allocated[(i + j) as usize] > best2 {
                    best2 = self.allocated[(i + j) as usize];
                }
                j += 1;
            }
            if j == w {
                x = i;
                y = best2;
                best = best2;
            }
        }

        if best + h > BLOCK_HEIGHT {
            return None;
        }
        for i in 0..w {
            self.allocated[(x + i) as usize] = best + h;
        }
        Some((x, y))
    }

    /// Reserve the surface's rectangle and composite its static luxels.
    /// Rolls to a fresh page when the current one is full.
    pub fn create_surface_lightmap(&mut self, surf: &mut MSurface, lightdata: &[u8]) {
        if self.pages.is_empty() {
            self.begin_build();
        }

        let (w, h) = surf.lm_size();
        let (w, h) = (w as i32, h as i32);
        if w > BLOCK_WIDTH || h > BLOCK_HEIGHT {
            return; // degenerate extents; leave the surface unlit
        }

        let (x, y) = match self.alloc_block(w, h) {
            Some(spot) => spot,
            None => {
                if self.pages.len() >= MAX_LIGHTMAPS {
                    return;
                }
                self.allocated = [0; BLOCK_WIDTH as usize];
                self.pages.push(LightmapPage::new());
                match self.alloc_block(w, h) {
                    Some(spot) => spot,
                    None => return,
                }
            }
        };

        surf.light_s = x;
        surf.light_t = y;
        surf.lightmaptexturenum = (self.pages.len() - 1) as i32;
        surf.stainsamples = vec![255; (w * h) as usize];

        let page = self.pages.last_mut().expect("page exists");
        composite_static(surf, lightdata, &mut page.texels, x, y);
        page.dirty = true;
    }
}

/// Write a surface's static lightmap (all styles at unit scale) into an
/// RGBA block at (x, y).
fn composite_static(surf: &MSurface, lightdata: &[u8], texels: &mut [u8], x: i32, y: i32) {
    let (w, h) = surf.lm_size();
    let luxels = w * h;

    let mut accum = vec![[0u32; 3]; luxels];
    if let Some(ofs) = surf.samples {
        let mut src = ofs;
        for map in 0..surf.styles.len() {
            if surf.styles[map] == 255 {
                break;
            }
            if src + luxels * 3 > lightdata.len() {
                break;
            }
            for (i, acc) in accum.iter_mut().enumerate() {
                acc[0] += lightdata[src + i * 3] as u32;
                acc[1] += lightdata[src + i * 3 + 1] as u32;
                acc[2] += lightdata[src + i * 3 + 2] as u32;
            }
            src += luxels * 3;
        }
    } else {
        // no light data: fullbright
        accum.iter_mut().for_each(|a| *a = [255; 3]);
    }

    for row in 0..h {
        for col in 0..w {
            let a = &accum[row * w + col];
            let dst = ((((y as usize + row) * BLOCK_WIDTH as usize) + x as usize + col) * 4)
                as usize;
            texels[dst] = a[0].min(255) as u8;
            texels[dst + 1] = a[1].min(255) as u8;
            texels[dst + 2] = a[2].min(255) as u8;
            texels[dst + 3] = 255;
        }
    }
}

// ============================================================
// Frustum
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct Frustum {
    pub planes: [CPlane; 4],
}

impl Frustum {
    /// True when the box is completely behind one of the four side planes.
    pub fn cull_box(&self, mins: &Vec3, maxs: &Vec3) -> bool {
        for plane in &self.planes {
            if box_on_plane_side(mins, maxs, plane) == 2 {
                return true;
            }
        }
        false
    }
}

// ============================================================
// PVS marking
// ============================================================

/// Per-frame visibility bookkeeping. `framecount` stamps surfaces,
/// `visframecount` stamps nodes/leaves from the PVS.
#[derive(Debug, Clone, Default)]
pub struct VisState {
    pub framecount: i32,
    pub visframecount: i32,
    pub viewcluster: i32,
    pub viewcluster2: i32,
    pub oldviewcluster: i32,
    pub oldviewcluster2: i32,
    /// area bits active when the mark set was built
    last_areabits: Vec<u8>,
}

impl VisState {
    pub fn new() -> Self {
        Self {
            viewcluster: -2, // force the first mark
            viewcluster2: -2,
            oldviewcluster: -2,
            oldviewcluster2: -2,
            ..Default::default()
        }
    }
}

/// Locate the view clusters for this frame. The viewpoint is probed a
/// second time 16 units down so a viewer straddling a water boundary gets
/// both sides' visibility.
pub fn setup_frame_clusters(world: &WorldModel, vis: &mut VisState, vieworg: &Vec3) {
    vis.oldviewcluster = vis.viewcluster;
    vis.oldviewcluster2 = vis.viewcluster2;

    let leaf = &world.leafs[point_in_leaf(world, vieworg)];
    vis.viewcluster = leaf.cluster;
    vis.viewcluster2 = leaf.cluster;

    let probe = [vieworg[0], vieworg[1], vieworg[2] - 16.0];
    let leaf2 = &world.leafs[point_in_leaf(world, &probe)];
    if leaf2.contents & CONTENTS_SOLID == 0 && leaf2.cluster != vis.viewcluster {
        vis.viewcluster2 = leaf2.cluster;
    }
}

/// Mark the leaves (and their ancestor nodes) visible from the current
/// view cluster. Reuses the previous mark set when neither the cluster
/// nor the area bits changed; `lockpvs` freezes the set entirely.
pub fn mark_leaves(
    world: &mut WorldModel,
    vis: &mut VisState,
    areabits: &[u8],
    novis: bool,
    lockpvs: bool,
) {
    if lockpvs {
        return;
    }

    if vis.oldviewcluster == vis.viewcluster
        && vis.oldviewcluster2 == vis.viewcluster2
        && !novis
        && vis.viewcluster != -1
        && vis.last_areabits == areabits
    {
        return;
    }

    vis.visframecount += 1;
    vis.oldviewcluster = vis.viewcluster;
    vis.oldviewcluster2 = vis.viewcluster2;
    vis.last_areabits = areabits.to_vec();

    if novis || vis.viewcluster == -1 || world.vis.is_none() {
        // mark everything
        let vfc = vis.visframecount;
        for leaf in &mut world.leafs {
            leaf.visframe = vfc;
        }
        for node in &mut world.nodes {
            node.visframe = vfc;
        }
        return;
    }

    let mut row = cluster_pvs(world, vis.viewcluster);

    // combine two clusters because of solid water boundaries
    if vis.viewcluster2 != vis.viewcluster {
        let row2 = cluster_pvs(world, vis.viewcluster2);
        for (a, b) in row.iter_mut().zip(row2.iter()) {
            *a |= b;
        }
    }

    let vfc = vis.visframecount;
    for i in 0..world.leafs.len() {
        let cluster = world.leafs[i].cluster;
        if cluster == -1 {
            continue;
        }
        if row[(cluster >> 3) as usize] & (1 << (cluster & 7)) == 0 {
            continue;
        }

        world.leafs[i].visframe = vfc;
        let mut node = world.leafs[i].parent;
        while node >= 0 {
            if world.nodes[node as usize].visframe == vfc {
                break;
            }
            world.nodes[node as usize].visframe = vfc;
            node = world.nodes[node as usize].parent;
        }
    }
}

// ============================================================
// World recursion
// ============================================================

/// Door-state gate: is this area's bit set in the active mask? An empty
/// mask means no gating.
pub fn area_visible(area: i32, areabits: &[u8]) -> bool {
    if areabits.is_empty() {
        return true;
    }
    areabits
        .get((area >> 3) as usize)
        .is_some_and(|b| b & (1 << (area & 7)) != 0)
}

/// Surface chains built by one world walk. Opaque surfaces come out
/// near-to-far; the driver draws `alpha` reversed for back-to-front.
#[derive(Debug, Default)]
pub struct SurfaceChains {
    pub opaque: Vec<u32>,
    pub alpha: Vec<u32>,
    pub sky: Vec<u32>,
}

impl SurfaceChains {
    pub fn clear(&mut self) {
        self.opaque.clear();
        self.alpha.clear();
        self.sky.clear();
    }
}

/// Walk the BSP front-to-back from the viewer, marking surfaces facing
/// the viewer and chaining them for the draw passes.
#[allow(clippy::too_many_arguments)]
pub fn recursive_world_node(
    world: &mut WorldModel,
    vis: &VisState,
    frustum: &Frustum,
    chains: &mut SurfaceChains,
    modelorg: &Vec3,
    areabits: &[u8],
    nocull: bool,
    node_index: i32,
) {
    // leaf?
    let node_index = match world.child(node_index) {
        Ok(n) => n,
        Err(leaf_index) => {
            mark_leaf_surfaces(world, vis, areabits, leaf_index);
            return;
        }
    };

    let node = &world.nodes[node_index];
    if node.visframe != vis.visframecount {
        return;
    }
    if !nocull {
        let mins = [node.minmaxs[0], node.minmaxs[1], node.minmaxs[2]];
        let maxs = [node.minmaxs[3], node.minmaxs[4], node.minmaxs[5]];
        if frustum.cull_box(&mins, &maxs) {
            return;
        }
    }

    // which side of the splitting plane is the viewer on?
    let plane = &world.planes[node.plane as usize];
    let dot = match plane.plane_type {
        PLANE_X => modelorg[0] - plane.dist,
        PLANE_Y => modelorg[1] - plane.dist,
        PLANE_Z => modelorg[2] - plane.dist,
        _ => dot_product(modelorg, &plane.normal) - plane.dist,
    };
    let (side, sidebit) = if dot >= 0.0 { (0, 0) } else { (1, SURF_PLANEBACK) };

    // recurse down the front side first
    let front = world.nodes[node_index].children[side];
    recursive_world_node(world, vis, frustum, chains, modelorg, areabits, nocull, front);

    // draw the node's own surfaces whose sidedness matches the viewer
    let (first, num) = {
        let node = &world.nodes[node_index];
        (node.firstsurface as usize, node.numsurfaces as usize)
    };
    for i in first..first + num {
        let surf = &world.surfaces[i];
        if surf.visframe != vis.framecount {
            continue;
        }
        if (surf.flags & SURF_PLANEBACK) != sidebit {
            continue; // wrong side
        }

        let ti_flags = world.texinfo[surf.texinfo as usize].flags;
        if ti_flags & SURF_SKY != 0 {
            chains.sky.push(i as u32);
        } else if ti_flags & (SURF_TRANS33 | SURF_TRANS66) != 0 {
            chains.alpha.push(i as u32);
        } else {
            chains.opaque.push(i as u32);
        }
    }

    // then the back side
    let back = world.nodes[node_index].children[side ^ 1];
    recursive_world_node(world, vis, frustum, chains, modelorg, areabits, nocull, back);
}

fn mark_leaf_surfaces(world: &mut WorldModel, vis: &VisState, areabits: &[u8], leaf_index: usize) {
    let leaf = &world.leafs[leaf_index];
    if leaf.contents == CONTENTS_SOLID {
        return;
    }
    if leaf.visframe != vis.visframecount {
        return;
    }

    // check for door connected areas
    if !area_visible(leaf.area, areabits) {
        return; // not visible
    }

    let first = leaf.first_marksurface as usize;
    let num = leaf.num_marksurfaces as usize;
    for i in first..first + num {
        let surf = world.marksurfaces[i] as usize;
        world.surfaces[surf].visframe = vis.framecount;
    }
}

/// Group an opaque chain by (texture, lightmap page) so the driver can
/// draw each batch with one bind. Stable within a batch, preserving the
/// near-to-far walk order.
pub fn batch_opaque(world: &WorldModel, opaque: &[u32]) -> Vec<(Option<u32>, i32, Vec<u32>)> {
    let mut batches: Vec<(Option<u32>, i32, Vec<u32>)> = Vec::new();
    for &s in opaque {
        let surf = &world.surfaces[s as usize];
        let key = (
            world.texinfo[surf.texinfo as usize].image,
            surf.lightmaptexturenum,
        );
        match batches.iter_mut().find(|(img, lm, _)| (*img, *lm) == key) {
            Some((_, _, list)) => list.push(s),
            None => batches.push((key.0, key.1, vec![s])),
        }
    }
    batches
}

/// Walk a texinfo's animation chain: wall textures cycle at 2 Hz, brush
/// entities select by their frame number instead.
pub fn texture_animation(world: &WorldModel, texinfo: u32, frame: i32) -> Option<u32> {
    let ti = &world.texinfo[texinfo as usize];
    if ti.next.is_none() {
        return ti.image;
    }
    let mut index = texinfo as usize;
    let mut c = frame % ti.numframes.max(1);
    while c > 0 {
        match world.texinfo[index].next {
            Some(next) => index = next as usize,
            None => break,
        }
        c -= 1;
    }
    world.texinfo[index].image
}

// ============================================================
// Polygon construction
// ============================================================

/// Build the fan polygon for a non-warp surface: world position, texture
/// st (normalized by the wall texture size), and lightmap st into the
/// surface's atlas rectangle.
pub fn build_polygon_from_surface(world: &mut WorldModel, surf_index: usize, images: &ImageCache) {
    let surf = &world.surfaces[surf_index];
    let tex = &world.texinfo[surf.texinfo as usize];
    let vecs = tex.vecs;
    let (tw, th) = tex
        .image
        .and_then(|h| images.image(h))
        .map_or((64.0f32, 64.0f32), |img| (img.width as f32, img.height as f32));

    let mut verts = Vec::with_capacity(surf.numedges as usize);
    for i in 0..surf.numedges {
        let e = world.surfedges[(surf.firstedge + i) as usize];
        let pos = if e >= 0 {
            world.vertexes[world.edges[e as usize].v[0] as usize].position
        } else {
            world.vertexes[world.edges[(-e) as usize].v[1] as usize].position
        };

        let s = dot_product(&pos, &[vecs[0][0], vecs[0][1], vecs[0][2]]) + vecs[0][3];
        let t = dot_product(&pos, &[vecs[1][0], vecs[1][1], vecs[1][2]]) + vecs[1][3];

        // lightmap texcoords: luxel center inside the atlas rectangle
        let mut lm_s = s - surf.texturemins[0] as f32;
        lm_s += surf.light_s as f32 * 16.0 + 8.0;
        lm_s /= (BLOCK_WIDTH * 16) as f32;
        let mut lm_t = t - surf.texturemins[1] as f32;
        lm_t += surf.light_t as f32 * 16.0 + 8.0;
        lm_t /= (BLOCK_HEIGHT * 16) as f32;

        verts.push(WorldVert {
            pos,
            s: s / tw,
            t: t / th,
            lm_s,
            lm_t,
        });
    }

    world.surfaces[surf_index].polys = vec![SurfPoly { verts }];
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vk_model::test_support::tiny_world;
    use q2vk_common::q_shared::vector_normalize;

    fn full_frustum() -> Frustum {
        // planes that keep everything (normals pointing everywhere from far away)
        let mut f = Frustum::default();
        for (i, n) in [[1.0f32, 0.0, 0.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, -1.0, 0.0]]
            .iter()
            .enumerate()
        {
            f.planes[i] = CPlane::new(*n, -1e9);
        }
        f
    }

    fn walk(world: &mut WorldModel, vis: &mut VisState, org: Vec3) -> SurfaceChains {
        vis.framecount += 1;
        setup_frame_clusters(world, vis, &org);
        mark_leaves(world, vis, &[], false, false);
        let mut chains = SurfaceChains::default();
        let frustum = full_frustum();
        recursive_world_node(world, vis, &frustum, &mut chains, &org, &[], false, 0);
        chains
    }

    #[test]
    fn test_walk_marks_ceiling_surface() {
        let mut world = tiny_world();
        let mut vis = VisState::new();
        let chains = walk(&mut world, &mut vis, [0.0, 0.0, 0.0]);
        assert_eq!(chains.opaque, vec![0]);
        assert!(chains.alpha.is_empty());
        assert!(chains.sky.is_empty());
        // invariant: every chained surface is stamped with the frame
        for &s in &chains.opaque {
            assert_eq!(world.surfaces[s as usize].visframe, vis.framecount);
        }
    }

    #[test]
    fn test_mark_set_reused_when_cluster_unchanged() {
        let mut world = tiny_world();
        let mut vis = VisState::new();
        walk(&mut world, &mut vis, [0.0, 0.0, 0.0]);
        let vfc = vis.visframecount;
        walk(&mut world, &mut vis, [1.0, 0.0, 0.0]);
        assert_eq!(vis.visframecount, vfc, "mark set should be reused");
    }

    #[test]
    fn test_mark_set_rebuilt_on_area_change() {
        let mut world = tiny_world();
        let mut vis = VisState::new();
        vis.framecount += 1;
        setup_frame_clusters(&mut world, &mut vis, &[0.0, 0.0, 0.0]);
        mark_leaves(&mut world, &mut vis, &[0xff], false, false);
        let vfc = vis.visframecount;

        setup_frame_clusters(&mut world, &mut vis, &[0.0, 0.0, 0.0]);
        mark_leaves(&mut world, &mut vis, &[0x01], false, false);
        assert_eq!(vis.visframecount, vfc + 1, "area change must rebuild");
    }

    #[test]
    fn test_lockpvs_freezes_marks() {
        let mut world = tiny_world();
        let mut vis = VisState::new();
        walk(&mut world, &mut vis, [0.0, 0.0, 0.0]);
        let vfc = vis.visframecount;

        // force a cluster change; with lockpvs the set must not move
        vis.viewcluster = -1;
        vis.oldviewcluster = -2;
        mark_leaves(&mut world, &mut vis, &[], false, true);
        assert_eq!(vis.visframecount, vfc);
    }

    #[test]
    fn test_area_visible() {
        assert!(area_visible(3, &[]));
        assert!(area_visible(0, &[0x01]));
        assert!(!area_visible(1, &[0x01]));
        assert!(area_visible(9, &[0x00, 0x02]));
        // out-of-range areas are closed, not a panic
        assert!(!area_visible(64, &[0xff]));
    }

    #[test]
    fn test_area_bits_gate_leaf() {
        let mut world = tiny_world();
        let mut vis = VisState::new();
        vis.framecount += 1;
        setup_frame_clusters(&mut world, &mut vis, &[0.0, 0.0, 0.0]);
        mark_leaves(&mut world, &mut vis, &[], false, false);

        let mut chains = SurfaceChains::default();
        let frustum = full_frustum();
        // area 0's bit cleared: the leaf's surfaces must not be marked
        recursive_world_node(
            &mut world,
            &vis,
            &frustum,
            &mut chains,
            &[0.0, 0.0, 0.0],
            &[0x00],
            false,
            0,
        );
        assert!(chains.opaque.is_empty());
    }

    #[test]
    fn test_frustum_cull_properties() {
        let mut n1 = [1.0f32, 0.0, 0.0];
        vector_normalize(&mut n1);
        // a frustum looking down +x, apex at origin: all four planes pass
        // through the origin with normals tilted into the view cone
        let mut f = Frustum::default();
        let mut dirs = [
            [0.7071f32, 0.7071, 0.0],
            [0.7071, -0.7071, 0.0],
            [0.7071, 0.0, 0.7071],
            [0.7071, 0.0, -0.7071],
        ];
        for (i, d) in dirs.iter_mut().enumerate() {
            vector_normalize(d);
            f.planes[i] = CPlane::new(*d, 0.0);
        }

        // box fully inside the cone is not culled
        assert!(!f.cull_box(&[50.0, -5.0, -5.0], &[60.0, 5.0, 5.0]));
        // box fully behind the viewer is culled
        assert!(f.cull_box(&[-60.0, -5.0, -5.0], &[-50.0, 5.0, 5.0]));
        // box straddling a side plane is kept
        assert!(!f.cull_box(&[10.0, -50.0, -5.0], &[20.0, 50.0, 5.0]));
    }

    #[test]
    fn test_lightmap_rects_disjoint() {
        let mut lm = LightmapBuilder::new();
        lm.begin_build();
        let mut rects: Vec<(i32, i32, i32, i32, i32)> = Vec::new();
        for i in 0..40 {
            let mut surf = MSurface {
                extents: [(16 * (1 + i % 5)) as i16, (16 * (1 + i % 3)) as i16],
                styles: [0, 255, 255, 255],
                samples: None,
                ..Default::default()
            };
            lm.create_surface_lightmap(&mut surf, &[]);
            let (w, h) = surf.lm_size();
            let rect = (
                surf.lightmaptexturenum,
                surf.light_s,
                surf.light_t,
                w as i32,
                h as i32,
            );
            for &(opage, ox, oy, ow, oh) in &rects {
                if opage != rect.0 {
                    continue;
                }
                let overlap = rect.1 < ox + ow
                    && ox < rect.1 + rect.3
                    && rect.2 < oy + oh
                    && oy < rect.2 + rect.4;
                assert!(!overlap, "lightmap rects overlap: {:?} vs {:?}", rect, (opage, ox, oy, ow, oh));
            }
            rects.push(rect);
        }
    }

    #[test]
    fn test_lightmap_page_rollover() {
        let mut lm = LightmapBuilder::new();
        lm.begin_build();
        // 17 surfaces of 128x64 luxels: 8 per page
        let mut max_page = 0;
        for _ in 0..17 {
            let mut surf = MSurface {
                extents: [(127 * 16) as i16, (63 * 16) as i16],
                styles: [0, 255, 255, 255],
                ..Default::default()
            };
            lm.create_surface_lightmap(&mut surf, &[]);
            max_page = max_page.max(surf.lightmaptexturenum);
        }
        assert!(max_page >= 1, "expected rollover to a second page");
        assert_eq!(lm.pages.len(), (max_page + 1) as usize);
    }

    #[test]
    fn test_static_composite_writes_rect() {
        let mut lm = LightmapBuilder::new();
        lm.begin_build();
        let mut surf = MSurface {
            extents: [64, 64], // 5x5 luxels
            styles: [0, 255, 255, 255],
            samples: Some(0),
            ..Default::default()
        };
        let lightdata = vec![77u8; 5 * 5 * 3];
        lm.create_surface_lightmap(&mut surf, &lightdata);

        let page = &lm.pages[surf.lightmaptexturenum as usize];
        let idx = ((surf.light_t * BLOCK_WIDTH + surf.light_s) * 4) as usize;
        assert_eq!(&page.texels[idx..idx + 4], &[77, 77, 77, 255]);
        assert_eq!(surf.stainsamples.len(), 25);
    }

    #[test]
    fn test_batch_opaque_groups_by_texture() {
        let world = tiny_world();
        let batches = batch_opaque(&world, &[0, 0, 0]);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].2.len(), 3);
    }

    #[test]
    fn test_texture_animation_cycles() {
        use crate::vk_model_types::MTexInfo;
        let mut world = tiny_world();
        // a 3-frame chain: 0 -> 1 -> 2 -> 0
        world.texinfo = vec![
            MTexInfo { numframes: 3, next: Some(1), image: Some(10), ..Default::default() },
            MTexInfo { numframes: 3, next: Some(2), image: Some(11), ..Default::default() },
            MTexInfo { numframes: 3, next: Some(0), image: Some(12), ..Default::default() },
        ];
        assert_eq!(texture_animation(&world, 0, 0), Some(10));
        assert_eq!(texture_animation(&world, 0, 1), Some(11));
        assert_eq!(texture_animation(&world, 0, 2), Some(12));
        assert_eq!(texture_animation(&world, 0, 3), Some(10));
        // unanimated texinfo returns its own image
        world.texinfo[0].next = None;
        world.texinfo[0].numframes = 1;
        assert_eq!(texture_animation(&world, 0, 7), Some(10));
    }

    #[test]
    fn test_polygon_lm_coords_inside_page() {
        let world = tiny_world();
        let surf = &world.surfaces[0];
        for poly in &surf.polys {
            for v in &poly.verts {
                assert!(v.lm_s >= 0.0 && v.lm_s <= 1.0);
                assert!(v.lm_t >= 0.0 && v.lm_t <= 1.0);
            }
        }
    }
}
