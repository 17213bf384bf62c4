// vk_model.rs — model loading and caching
//
// One pass per BSP lump, then derived data (surface extents, parent links,
// polygons, lightmap rectangles). Alias and sprite models load through the
// same cache; a registration sequence counter drives eviction at map load.

use q2vk_common::files::FileLoader;
use q2vk_common::q_shared::{
    dot_product, vector_length, CPlane, Vec3, SURF_SKY, SURF_TRANS33, SURF_TRANS66, SURF_WARP,
};
use q2vk_common::qfiles::{self, FormatError, MAX_MAP_LEAFS};
use rayon::prelude::*;

use crate::error::RdError;
use crate::vk_image::{ImageCache, ImageType};
use crate::vk_local::{
    MAX_MOD_KNOWN, SURF_DRAWSKY, SURF_DRAWTURB, SURF_PLANEBACK,
};
use crate::vk_model_types::*;
use crate::vk_rsurf::LightmapBuilder;
use crate::vk_warp;

// ============================================================
// World (brush) model loading
// ============================================================

/// Parse and derive a complete world model from a BSP file.
pub fn load_world(
    name: &str,
    raw: &[u8],
    images: &mut ImageCache,
    loader: &dyn FileLoader,
    lm: &mut LightmapBuilder,
    registration_sequence: i32,
) -> Result<WorldModel, RdError> {
    let fmt = |e: FormatError| RdError::from_format(e, name);

    let header = qfiles::DHeader::parse(raw).map_err(fmt)?;

    let mut world = WorldModel {
        name: name.to_string(),
        registration_sequence,
        ..Default::default()
    };

    load_vertexes(&mut world, header.lump(raw, qfiles::LUMP_VERTEXES).map_err(fmt)?).map_err(fmt)?;
    load_edges(&mut world, header.lump(raw, qfiles::LUMP_EDGES).map_err(fmt)?).map_err(fmt)?;
    load_surfedges(&mut world, header.lump(raw, qfiles::LUMP_SURFEDGES).map_err(fmt)?).map_err(fmt)?;
    load_lighting(&mut world, header.lump(raw, qfiles::LUMP_LIGHTING).map_err(fmt)?);
    load_planes(&mut world, header.lump(raw, qfiles::LUMP_PLANES).map_err(fmt)?).map_err(fmt)?;
    load_texinfo(&mut world, header.lump(raw, qfiles::LUMP_TEXINFO).map_err(fmt)?, images, loader)
        .map_err(fmt)?;
    load_faces(&mut world, header.lump(raw, qfiles::LUMP_FACES).map_err(fmt)?, lm).map_err(fmt)?;
    load_marksurfaces(&mut world, header.lump(raw, qfiles::LUMP_LEAFFACES).map_err(fmt)?)
        .map_err(fmt)?;
    load_visibility(&mut world, header.lump(raw, qfiles::LUMP_VISIBILITY).map_err(fmt)?)
        .map_err(fmt)?;
    load_leafs(&mut world, header.lump(raw, qfiles::LUMP_LEAFS).map_err(fmt)?).map_err(fmt)?;
    load_nodes(&mut world, header.lump(raw, qfiles::LUMP_NODES).map_err(fmt)?).map_err(fmt)?;
    load_submodels(&mut world, header.lump(raw, qfiles::LUMP_MODELS).map_err(fmt)?).map_err(fmt)?;

    set_parents(&mut world, 0, -1);
    build_surface_polys(&mut world, images);

    Ok(world)
}

fn load_vertexes(world: &mut WorldModel, raw: &[u8]) -> Result<(), FormatError> {
    world.vertexes = qfiles::parse_lump(raw, 12, |b| MVertex {
        position: [
            q2vk_common::q_shared::little_float(&b[0..]),
            q2vk_common::q_shared::little_float(&b[4..]),
            q2vk_common::q_shared::little_float(&b[8..]),
        ],
    })?;
    Ok(())
}

fn load_edges(world: &mut WorldModel, raw: &[u8]) -> Result<(), FormatError> {
    world.edges = qfiles::parse_lump(raw, qfiles::DEDGE_SIZE, |b| {
        let e = qfiles::parse_edge(b);
        MEdge { v: e.v }
    })?;
    let numverts = world.vertexes.len();
    if world.edges.iter().any(|e| e.v[0] as usize >= numverts || e.v[1] as usize >= numverts) {
        return Err(FormatError::Truncated);
    }
    Ok(())
}

fn load_surfedges(world: &mut WorldModel, raw: &[u8]) -> Result<(), FormatError> {
    world.surfedges =
        qfiles::parse_lump(raw, 4, |b| q2vk_common::q_shared::little_long(&b[0..]))?;
    let numedges = world.edges.len() as i64;
    if world.surfedges.iter().any(|&e| (e as i64).abs() >= numedges) {
        return Err(FormatError::Truncated);
    }
    Ok(())
}

fn load_lighting(world: &mut WorldModel, raw: &[u8]) {
    world.lightdata = raw.to_vec();
}

fn load_planes(world: &mut WorldModel, raw: &[u8]) -> Result<(), FormatError> {
    world.planes = qfiles::parse_lump(raw, qfiles::DPLANE_SIZE, |b| {
        let p = qfiles::parse_plane(b);
        CPlane::new(p.normal, p.dist)
    })?;
    Ok(())
}

fn load_texinfo(
    world: &mut WorldModel,
    raw: &[u8],
    images: &mut ImageCache,
    loader: &dyn FileLoader,
) -> Result<(), FormatError> {
    let infos = qfiles::parse_lump(raw, qfiles::DTEXINFO_SIZE, qfiles::parse_texinfo)?;
    let count = infos.len();

    world.texinfo = infos
        .iter()
        .map(|ti| {
            let path = format!("textures/{}.wal", ti.texture);
            let image = images.find_image(&path, ImageType::Wall, loader);
            MTexInfo {
                vecs: ti.vecs,
                flags: ti.flags,
                numframes: 1,
                next: (ti.nexttexinfo >= 0 && (ti.nexttexinfo as usize) < count)
                    .then_some(ti.nexttexinfo as u32),
                image,
            }
        })
        .collect();

    // count animation frames for each chain head
    for i in 0..count {
        let mut frames = 1;
        let mut step = world.texinfo[i].next;
        while let Some(next) = step {
            if next as usize == i {
                break;
            }
            frames += 1;
            if frames > count as i32 {
                break; // malformed cycle without the head
            }
            step = world.texinfo[next as usize].next;
        }
        world.texinfo[i].numframes = frames;
    }

    Ok(())
}

fn calc_surface_extents(world: &WorldModel, surf: &mut MSurface) {
    let mut mins = [999999.0f32; 2];
    let mut maxs = [-999999.0f32; 2];

    let tex = &world.texinfo[surf.texinfo as usize];
    for i in 0..surf.numedges {
        let e = world.surfedges[(surf.firstedge + i) as usize];
        let v = if e >= 0 {
            &world.vertexes[world.edges[e as usize].v[0] as usize]
        } else {
            &world.vertexes[world.edges[(-e) as usize].v[1] as usize]
        };
        for j in 0..2 {
            let val = dot_product(&v.position, &[tex.vecs[j][0], tex.vecs[j][1], tex.vecs[j][2]])
                + tex.vecs[j][3];
            if val < mins[j] {
                mins[j] = val;
            }
            if val > maxs[j] {
                maxs[j] = val;
            }
        }
    }

    for i in 0..2 {
        let bmins = (mins[i] / 16.0).floor() as i32;
        let bmaxs = (maxs[i] / 16.0).ceil() as i32;
        surf.texturemins[i] = (bmins * 16) as i16;
        surf.extents[i] = ((bmaxs - bmins) * 16) as i16;
    }
}

fn load_faces(
    world: &mut WorldModel,
    raw: &[u8],
    lm: &mut LightmapBuilder,
) -> Result<(), FormatError> {
    let faces = qfiles::parse_lump(raw, qfiles::DFACE_SIZE, qfiles::parse_face)?;

    lm.begin_build();

    world.surfaces = Vec::with_capacity(faces.len());
    for face in &faces {
        if face.planenum as usize >= world.planes.len()
            || face.texinfo < 0
            || face.texinfo as usize >= world.texinfo.len()
        {
            return Err(FormatError::Truncated);
        }

        let mut surf = MSurface {
            plane: face.planenum as u32,
            flags: if face.side != 0 { SURF_PLANEBACK } else { 0 },
            firstedge: face.firstedge,
            numedges: face.numedges as i32,
            texinfo: face.texinfo as u32,
            styles: face.styles,
            samples: (face.lightofs >= 0 && (face.lightofs as usize) < world.lightdata.len())
                .then_some(face.lightofs as usize),
            lightmaptexturenum: -1,
            dlightframe: -1,
            ..Default::default()
        };

        if surf.firstedge < 0
            || (surf.firstedge + surf.numedges) as usize > world.surfedges.len()
        {
            return Err(FormatError::Truncated);
        }

        calc_surface_extents(world, &mut surf);

        let ti_flags = world.texinfo[surf.texinfo as usize].flags;
        if ti_flags & SURF_WARP != 0 {
            surf.flags |= SURF_DRAWTURB;
            // warp surfaces have no lightmap and subdivide for the sine warp
            surf.extents = [16384, 16384];
            surf.texturemins = [-8192, -8192];
        }
        if ti_flags & SURF_SKY != 0 {
            surf.flags |= SURF_DRAWSKY;
        }

        // static lightmap rectangle
        if ti_flags & (SURF_SKY | SURF_TRANS33 | SURF_TRANS66 | SURF_WARP) == 0 {
            lm.create_surface_lightmap(&mut surf, &world.lightdata);
        }

        world.surfaces.push(surf);
    }

    Ok(())
}

fn load_marksurfaces(world: &mut WorldModel, raw: &[u8]) -> Result<(), FormatError> {
    let count = world.surfaces.len();
    let marks = qfiles::parse_lump(raw, 2, |b| {
        q2vk_common::q_shared::little_short(&b[0..]) as u16 as u32
    })?;
    if marks.iter().any(|&m| m as usize >= count) {
        return Err(FormatError::Truncated);
    }
    world.marksurfaces = marks;
    Ok(())
}

fn load_visibility(world: &mut WorldModel, raw: &[u8]) -> Result<(), FormatError> {
    if raw.is_empty() {
        world.vis = None;
        return Ok(());
    }
    let vis = qfiles::DVis::parse(raw)?;
    world.vis = Some(MVis {
        numclusters: vis.numclusters,
        bitofs: vis.bitofs,
        data: raw.to_vec(),
    });
    Ok(())
}

fn load_leafs(world: &mut WorldModel, raw: &[u8]) -> Result<(), FormatError> {
    let numclusters = world.numclusters();
    let leafs = qfiles::parse_lump(raw, qfiles::DLEAF_SIZE, qfiles::parse_leaf)?;
    if leafs.is_empty() || leafs.len() > MAX_MAP_LEAFS {
        return Err(FormatError::Truncated);
    }

    world.leafs = Vec::with_capacity(leafs.len());
    for leaf in &leafs {
        // every leaf has a cluster in [-1, numClusters)
        if numclusters > 0 && (leaf.cluster < -1 || leaf.cluster as i32 >= numclusters) {
            return Err(FormatError::Truncated);
        }
        let first = leaf.first_leafface as u32;
        let num = leaf.num_leaffaces as u32;
        if (first + num) as usize > world.marksurfaces.len() {
            return Err(FormatError::Truncated);
        }
        world.leafs.push(MLeaf {
            contents: leaf.contents,
            cluster: leaf.cluster as i32,
            area: leaf.area as i32,
            minmaxs: [
                leaf.mins[0] as f32,
                leaf.mins[1] as f32,
                leaf.mins[2] as f32,
                leaf.maxs[0] as f32,
                leaf.maxs[1] as f32,
                leaf.maxs[2] as f32,
            ],
            first_marksurface: first,
            num_marksurfaces: num,
            parent: -1,
            visframe: -1,
        });
    }
    Ok(())
}

fn load_nodes(world: &mut WorldModel, raw: &[u8]) -> Result<(), FormatError> {
    let nodes = qfiles::parse_lump(raw, qfiles::DNODE_SIZE, qfiles::parse_node)?;
    if nodes.is_empty() {
        return Err(FormatError::Truncated);
    }

    let numnodes = nodes.len() as i32;
    let numleafs = world.leafs.len() as i32;

    world.nodes = Vec::with_capacity(nodes.len());
    for node in &nodes {
        if node.planenum < 0 || node.planenum as usize >= world.planes.len() {
            return Err(FormatError::Truncated);
        }
        for &child in &node.children {
            let ok = if child >= 0 { child < numnodes } else { -1 - child < numleafs };
            if !ok {
                return Err(FormatError::Truncated);
            }
        }
        world.nodes.push(MNode {
            plane: node.planenum as u32,
            children: node.children,
            minmaxs: [
                node.mins[0] as f32,
                node.mins[1] as f32,
                node.mins[2] as f32,
                node.maxs[0] as f32,
                node.maxs[1] as f32,
                node.maxs[2] as f32,
            ],
            firstsurface: node.firstface,
            numsurfaces: node.numfaces,
            parent: -1,
            visframe: -1,
        });
    }
    Ok(())
}

fn load_submodels(world: &mut WorldModel, raw: &[u8]) -> Result<(), FormatError> {
    let models = qfiles::parse_lump(raw, qfiles::DMODEL_SIZE, qfiles::parse_dmodel)?;
    if models.is_empty() {
        return Err(FormatError::Truncated);
    }
    world.submodels = models
        .iter()
        .map(|m| {
            // spread the bounds slightly, matching the original loader
            let mins = [m.mins[0] - 1.0, m.mins[1] - 1.0, m.mins[2] - 1.0];
            let maxs = [m.maxs[0] + 1.0, m.maxs[1] + 1.0, m.maxs[2] + 1.0];
            SubModel {
                mins,
                maxs,
                origin: m.origin,
                radius: radius_from_bounds(&mins, &maxs),
                headnode: m.headnode,
                firstface: m.firstface,
                numfaces: m.numfaces,
            }
        })
        .collect();
    Ok(())
}

/// Stamp parent links downward from `node`.
fn set_parents(world: &mut WorldModel, node: usize, parent: i32) {
    world.nodes[node].parent = parent;
    for side in 0..2 {
        match world.child(world.nodes[node].children[side]) {
            Ok(child) => set_parents(world, child, node as i32),
            Err(leaf) => world.leafs[leaf].parent = node as i32,
        }
    }
}

/// Build fan polygons for every surface; warp surfaces are subdivided so
/// the sine warp doesn't shear long edges.
fn build_surface_polys(world: &mut WorldModel, images: &ImageCache) {
    for i in 0..world.surfaces.len() {
        if world.surfaces[i].flags & SURF_DRAWTURB != 0 {
            vk_warp::subdivide_surface(world, i);
        } else {
            crate::vk_rsurf::build_polygon_from_surface(world, i, images);
        }
    }
}

pub fn radius_from_bounds(mins: &Vec3, maxs: &Vec3) -> f32 {
    let mut corner = [0.0f32; 3];
    for i in 0..3 {
        corner[i] = mins[i].abs().max(maxs[i].abs());
    }
    vector_length(&corner)
}

// ============================================================
// Point location and PVS
// ============================================================

/// Walk the node tree to the leaf containing `p`.
pub fn point_in_leaf(world: &WorldModel, p: &Vec3) -> usize {
    let mut index = 0i32;
    loop {
        let node = &world.nodes[index as usize];
        let plane = &world.planes[node.plane as usize];
        let d = dot_product(p, &plane.normal) - plane.dist;
        let side = if d > 0.0 { 0 } else { 1 };
        match world.child(node.children[side]) {
            Ok(child) => index = child as i32,
            Err(leaf) => return leaf,
        }
    }
}

/// Decompress one RLE visibility row into a bitset over clusters.
pub fn decompress_vis(input: &[u8], numclusters: i32) -> Vec<u8> {
    let row = ((numclusters + 7) >> 3) as usize;
    let mut out = Vec::with_capacity(row);
    let mut src = 0;

    while out.len() < row {
        match input.get(src).copied() {
            Some(byte) if byte != 0 => {
                out.push(byte);
                src += 1;
            }
            Some(_) => {
                // zero byte: the next byte is a zero-run count
                let count = *input.get(src + 1).unwrap_or(&1) as usize;
                src += 2;
                for _ in 0..count.max(1) {
                    if out.len() >= row {
                        break;
                    }
                    out.push(0);
                }
            }
            _ => {
                // truncated row decompresses as all-visible from here on,
                // matching the original's forgiving behavior
                out.resize(row, 0xff);
            }
        }
    }
    out
}

/// The PVS row for a cluster. Cluster -1 ("outside") sees everything so a
/// viewer out of the world doesn't blank the screen.
pub fn cluster_pvs(world: &WorldModel, cluster: i32) -> Vec<u8> {
    cluster_row(world, cluster, qfiles::DVIS_PVS)
}

/// The PHS row for a cluster (hearing, not used by the renderer).
pub fn cluster_phs(world: &WorldModel, cluster: i32) -> Vec<u8> {
    cluster_row(world, cluster, qfiles::DVIS_PHS)
}

fn cluster_row(world: &WorldModel, cluster: i32, which: usize) -> Vec<u8> {
    match (&world.vis, cluster) {
        (Some(vis), c) if c >= 0 && c < vis.numclusters => {
            let ofs = vis.bitofs[c as usize][which];
            if ofs < 0 || ofs as usize >= vis.data.len() {
                return vec![0xff; ((vis.numclusters + 7) >> 3) as usize];
            }
            decompress_vis(&vis.data[ofs as usize..], vis.numclusters)
        }
        (Some(vis), _) => vec![0xff; ((vis.numclusters + 7) >> 3) as usize],
        (None, _) => vec![0xff; (world.leafs.len() + 7) >> 3],
    }
}

/// Decompress every cluster row in parallel. Used when a whole-map
/// visibility table is wanted at once (lockpvs dumps, load validation).
pub fn decompress_all_pvs(world: &WorldModel) -> Vec<Vec<u8>> {
    match &world.vis {
        Some(vis) => (0..vis.numclusters)
            .into_par_iter()
            .map(|c| cluster_pvs(world, c))
            .collect(),
        None => Vec::new(),
    }
}

// ============================================================
// Alias / sprite loading
// ============================================================

fn load_alias_model(
    name: &str,
    raw: &[u8],
    images: &mut ImageCache,
    loader: &dyn FileLoader,
    registration_sequence: i32,
) -> Result<Model, RdError> {
    let mdl = qfiles::md2_parse(raw).map_err(|e| RdError::from_format(e, name))?;

    let frames: Vec<AliasFrame> = mdl
        .frames
        .iter()
        .map(|f| AliasFrame {
            name: f.name.clone(),
            scale: f.scale,
            translate: f.translate,
            verts: f
                .verts
                .iter()
                .map(|v| AliasVert { pos_q: v.v, normal_idx: v.lightnormalindex })
                .collect(),
        })
        .collect();

    let skins: Vec<Option<u32>> = mdl
        .skin_names
        .iter()
        .map(|skin| images.find_image(skin, ImageType::Skin, loader))
        .collect();

    // frame 0 bounds drive culling for the whole model
    let f0 = &frames[0];
    let mins = f0.translate;
    let maxs = [
        f0.translate[0] + f0.scale[0] * 255.0,
        f0.translate[1] + f0.scale[1] * 255.0,
        f0.translate[2] + f0.scale[2] * 255.0,
    ];

    Ok(Model {
        name: name.to_string(),
        registration_sequence,
        mins,
        maxs,
        radius: radius_from_bounds(&mins, &maxs),
        kind: ModelKind::Alias(AliasModel {
            skinwidth: mdl.header.skinwidth,
            skinheight: mdl.header.skinheight,
            st_verts: mdl.st_verts.iter().map(|st| (st.s, st.t)).collect(),
            triangles: mdl.triangles.iter().map(|t| (t.index_xyz, t.index_st)).collect(),
            frames,
            skin_names: mdl.skin_names,
            skins,
        }),
    })
}

fn load_sprite_model(
    name: &str,
    raw: &[u8],
    images: &mut ImageCache,
    loader: &dyn FileLoader,
    registration_sequence: i32,
) -> Result<Model, RdError> {
    let spr = qfiles::sp2_parse(raw).map_err(|e| RdError::from_format(e, name))?;

    let frames: Vec<SpriteFrame> = spr
        .frames
        .iter()
        .map(|f| SpriteFrame {
            width: f.width,
            height: f.height,
            origin_x: f.origin_x,
            origin_y: f.origin_y,
            name: f.name.clone(),
            skin: images.find_image(&f.name, ImageType::Sprite, loader),
        })
        .collect();

    let radius = frames
        .iter()
        .map(|f| (f.width.max(f.height)) as f32)
        .fold(0.0f32, f32::max);

    Ok(Model {
        name: name.to_string(),
        registration_sequence,
        mins: [-radius, -radius, -radius],
        maxs: [radius, radius, radius],
        radius,
        kind: ModelKind::Sprite(SpriteModel { frames }),
    })
}

// ============================================================
// Model cache
// ============================================================

/// All loaded models plus the current world. Append-only during a map;
/// swept at the registration boundary.
#[derive(Default)]
pub struct ModelCache {
    pub world: Option<WorldModel>,
    models: Vec<Option<Model>>,
    pub registration_sequence: i32,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(&self, handle: u32) -> Option<&Model> {
        self.models.get(handle as usize).and_then(|m| m.as_ref())
    }

    pub fn world(&self) -> Option<&WorldModel> {
        self.world.as_ref()
    }

    /// Begin a new registration sequence and load the named world map.
    /// A failure here is fatal for the map load; the caller aborts with a
    /// user message rather than substituting a placeholder.
    pub fn begin_registration(
        &mut self,
        map_name: &str,
        loader: &dyn FileLoader,
        images: &mut ImageCache,
        lm: &mut LightmapBuilder,
        flush: bool,
    ) -> Result<(), RdError> {
        self.registration_sequence += 1;

        let full_name = format!("maps/{}.bsp", map_name);

        // keep the old world when the map hasn't changed
        if !flush {
            if let Some(world) = &mut self.world {
                if world.name == full_name {
                    world.registration_sequence = self.registration_sequence;
                    return Ok(());
                }
            }
        }

        let raw = loader
            .load(&full_name)
            .ok_or_else(|| RdError::MalformedAsset(format!("{}: not found", full_name)))?;
        self.world = Some(load_world(
            &full_name,
            &raw,
            images,
            loader,
            lm,
            self.registration_sequence,
        )?);
        Ok(())
    }

    /// Load or re-touch a named model. Inline models ("*N") resolve into
    /// the current world's submodel table. A missing or malformed model is
    /// non-fatal: the caller substitutes the placeholder.
    pub fn register_model(
        &mut self,
        name: &str,
        loader: &dyn FileLoader,
        images: &mut ImageCache,
    ) -> Result<u32, RdError> {
        if name.is_empty() {
            return Err(RdError::MalformedAsset("empty model name".to_string()));
        }

        // already loaded?
        let mut existing = None;
        for (i, slot) in self.models.iter_mut().enumerate() {
            if let Some(model) = slot {
                if model.name == name {
                    model.registration_sequence = self.registration_sequence;
                    existing = Some(i);
                    break;
                }
            }
        }
        if let Some(i) = existing {
            self.touch_model_assets(i, images);
            return Ok(i as u32);
        }

        let model = if let Some(index_str) = name.strip_prefix('*') {
            let index: usize = index_str
                .parse()
                .map_err(|_| RdError::MalformedAsset(name.to_string()))?;
            let world = self
                .world
                .as_ref()
                .ok_or_else(|| RdError::MalformedAsset("inline model with no world".to_string()))?;
            let sub = *world
                .submodels
                .get(index)
                .ok_or_else(|| RdError::MalformedAsset(name.to_string()))?;
            Model {
                name: name.to_string(),
                registration_sequence: self.registration_sequence,
                mins: sub.mins,
                maxs: sub.maxs,
                radius: sub.radius,
                kind: ModelKind::Inline(index),
            }
        } else {
            let raw = loader
                .load(name)
                .ok_or_else(|| RdError::MalformedAsset(format!("{}: not found", name)))?;
            match name.rsplit('.').next() {
                Some("md2") => {
                    load_alias_model(name, &raw, images, loader, self.registration_sequence)?
                }
                Some("sp2") => {
                    load_sprite_model(name, &raw, images, loader, self.registration_sequence)?
                }
                _ => return Err(RdError::MalformedAsset(name.to_string())),
            }
        };

        if self.models.iter().filter(|m| m.is_some()).count() >= MAX_MOD_KNOWN {
            return Err(RdError::OutOfMemory("mod_known".to_string()));
        }

        // reuse a freed slot if one exists
        let handle = match self.models.iter().position(|m| m.is_none()) {
            Some(free) => {
                self.models[free] = Some(model);
                free as u32
            }
            None => {
                self.models.push(Some(model));
                (self.models.len() - 1) as u32
            }
        };
        Ok(handle)
    }

    fn touch_model_assets(&self, index: usize, images: &mut ImageCache) {
        if let Some(Some(model)) = self.models.get(index) {
            match &model.kind {
                ModelKind::Alias(alias) => {
                    for skin in alias.skins.iter().flatten() {
                        images.touch(*skin);
                    }
                }
                ModelKind::Sprite(sprite) => {
                    for frame in &sprite.frames {
                        if let Some(skin) = frame.skin {
                            images.touch(skin);
                        }
                    }
                }
                ModelKind::Inline(_) => {}
            }
        }
    }

    /// Free every model not touched this sequence.
    pub fn end_registration(&mut self) {
        let seq = self.registration_sequence;
        for slot in &mut self.models {
            if matches!(slot, Some(m) if m.registration_sequence != seq) {
                *slot = None;
            }
        }
    }

    /// Console listing of loaded models.
    pub fn model_list(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut total = 0usize;
        for model in self.models.iter().flatten() {
            let (tag, size) = match &model.kind {
                ModelKind::Alias(a) => {
                    ("alias", a.frames.len() * a.frames.first().map_or(0, |f| f.verts.len() * 4))
                }
                ModelKind::Sprite(s) => ("sprite", s.frames.len() * 64),
                ModelKind::Inline(_) => ("inline", 0),
            };
            total += size;
            out.push(format!("{:6} {:8} : {}", tag, size, model.name));
        }
        if let Some(world) = &self.world {
            out.push(format!("world  {:8} : {}", world.lightdata.len(), world.name));
        }
        out.push(format!("Total resident: {}", total));
        out
    }

    pub fn clear(&mut self) {
        self.world = None;
        self.models.clear();
    }
}

// ============================================================
// Test world construction (shared by walker/light/refl tests)
// ============================================================

#[cfg(test)]
pub mod test_support {
    use super::*;
    use q2vk_common::files::MemLoader;
    use q2vk_common::q_shared::CONTENTS_SOLID;
    use q2vk_common::qfiles::{HEADER_LUMPS, IDBSPHEADER};

    /// Serialize a minimal valid BSP: two leaves under one Z-split node,
    /// a single 64x64 ceiling surface at z=64 in cluster 0.
    pub fn tiny_bsp() -> Vec<u8> {
        let mut lumps: Vec<Vec<u8>> = vec![Vec::new(); HEADER_LUMPS];

        // planes: z plane at dist 64 (type PLANE_Z = 2)
        let mut planes = Vec::new();
        for f in [0.0f32, 0.0, 1.0, 64.0] {
            planes.extend_from_slice(&f.to_le_bytes());
        }
        planes.extend_from_slice(&2i32.to_le_bytes());
        lumps[qfiles::LUMP_PLANES] = planes;

        // vertexes: quad corners at z=64
        let mut verts = Vec::new();
        for v in [
            [-32.0f32, -32.0, 64.0],
            [32.0, -32.0, 64.0],
            [32.0, 32.0, 64.0],
            [-32.0, 32.0, 64.0],
        ] {
            for f in v {
                verts.extend_from_slice(&f.to_le_bytes());
            }
        }
        lumps[qfiles::LUMP_VERTEXES] = verts;

        // edges: dummy edge 0, then the quad loop
        let mut edges = Vec::new();
        for e in [[0u16, 0], [0, 1], [1, 2], [2, 3], [3, 0]] {
            edges.extend_from_slice(&e[0].to_le_bytes());
            edges.extend_from_slice(&e[1].to_le_bytes());
        }
        lumps[qfiles::LUMP_EDGES] = edges;

        // surfedges: edges 1..4 forward
        let mut surfedges = Vec::new();
        for e in [1i32, 2, 3, 4] {
            surfedges.extend_from_slice(&e.to_le_bytes());
        }
        lumps[qfiles::LUMP_SURFEDGES] = surfedges;

        // texinfo: identity s/t mapping
        let mut texinfo = Vec::new();
        for f in [1.0f32, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0] {
            texinfo.extend_from_slice(&f.to_le_bytes());
        }
        texinfo.extend_from_slice(&0i32.to_le_bytes()); // flags
        texinfo.extend_from_slice(&0i32.to_le_bytes()); // value
        let mut name = [0u8; 32];
        name[..9].copy_from_slice(b"e1u1/ceil");
        texinfo.extend_from_slice(&name);
        texinfo.extend_from_slice(&(-1i32).to_le_bytes()); // nexttexinfo
        lumps[qfiles::LUMP_TEXINFO] = texinfo;

        // lighting: 5x5 luxels, 3 bytes each, mid grey
        lumps[qfiles::LUMP_LIGHTING] = vec![128u8; 5 * 5 * 3];

        // faces: one ceiling face; side 1 so the lit face points down
        // into the room (viewers below are on the plane's back side)
        let mut face = Vec::new();
        face.extend_from_slice(&0u16.to_le_bytes()); // planenum
        face.extend_from_slice(&1i16.to_le_bytes()); // side
        face.extend_from_slice(&0i32.to_le_bytes()); // firstedge
        face.extend_from_slice(&4i16.to_le_bytes()); // numedges
        face.extend_from_slice(&0i16.to_le_bytes()); // texinfo
        face.extend_from_slice(&[0, 255, 255, 255]); // styles
        face.extend_from_slice(&0i32.to_le_bytes()); // lightofs
        lumps[qfiles::LUMP_FACES] = face;

        // leaffaces: leaf 1 references face 0
        lumps[qfiles::LUMP_LEAFFACES] = 0u16.to_le_bytes().to_vec();

        // visibility: 1 cluster; PVS row = literal 0x01
        let mut vis = Vec::new();
        vis.extend_from_slice(&1i32.to_le_bytes());
        let row_ofs = 4 + 8;
        vis.extend_from_slice(&(row_ofs as i32).to_le_bytes()); // pvs
        vis.extend_from_slice(&(row_ofs as i32).to_le_bytes()); // phs
        vis.push(0x01);
        lumps[qfiles::LUMP_VISIBILITY] = vis;

        // leafs: solid leaf 0, open leaf 1 (cluster 0, area 0)
        let mut leafs = Vec::new();
        let mut push_leaf = |contents: i32, cluster: i16, first: u16, num: u16| {
            leafs.extend_from_slice(&contents.to_le_bytes());
            leafs.extend_from_slice(&cluster.to_le_bytes());
            leafs.extend_from_slice(&0i16.to_le_bytes()); // area
            for v in [-2048i16, -2048, -2048, 2048, 2048, 2048] {
                leafs.extend_from_slice(&v.to_le_bytes());
            }
            leafs.extend_from_slice(&first.to_le_bytes());
            leafs.extend_from_slice(&num.to_le_bytes());
            leafs.extend_from_slice(&0u16.to_le_bytes());
            leafs.extend_from_slice(&0u16.to_le_bytes());
        };
        push_leaf(CONTENTS_SOLID, -1, 0, 0);
        push_leaf(0, 0, 0, 1);
        lumps[qfiles::LUMP_LEAFS] = leafs;

        // nodes: one split at z=64; above solid, below open
        let mut node = Vec::new();
        node.extend_from_slice(&0i32.to_le_bytes()); // plane
        node.extend_from_slice(&(-1i32).to_le_bytes()); // front child -> leaf 0
        node.extend_from_slice(&(-2i32).to_le_bytes()); // back child -> leaf 1
        for v in [-2048i16, -2048, -2048, 2048, 2048, 2048] {
            node.extend_from_slice(&v.to_le_bytes());
        }
        node.extend_from_slice(&0u16.to_le_bytes()); // firstface
        node.extend_from_slice(&1u16.to_le_bytes()); // numfaces
        lumps[qfiles::LUMP_NODES] = node;

        // submodels: world model
        let mut sub = Vec::new();
        for f in [
            -2048.0f32, -2048.0, -2048.0, // mins
            2048.0, 2048.0, 2048.0, // maxs
            0.0, 0.0, 0.0, // origin
        ] {
            sub.extend_from_slice(&f.to_le_bytes());
        }
        sub.extend_from_slice(&0i32.to_le_bytes()); // headnode
        sub.extend_from_slice(&0i32.to_le_bytes()); // firstface
        sub.extend_from_slice(&1i32.to_le_bytes()); // numfaces
        lumps[qfiles::LUMP_MODELS] = sub;

        // assemble
        let mut data = Vec::new();
        data.extend_from_slice(&IDBSPHEADER.to_le_bytes());
        data.extend_from_slice(&qfiles::BSPVERSION.to_le_bytes());
        let mut ofs = 8 + HEADER_LUMPS * 8;
        let mut dir = Vec::new();
        for lump in &lumps {
            dir.extend_from_slice(&(ofs as u32).to_le_bytes());
            dir.extend_from_slice(&(lump.len() as u32).to_le_bytes());
            ofs += lump.len();
        }
        data.extend_from_slice(&dir);
        for lump in &lumps {
            data.extend_from_slice(lump);
        }
        data
    }

    /// Load the tiny world through a fresh image cache.
    pub fn tiny_world() -> WorldModel {
        let loader = MemLoader::new();
        let mut images = ImageCache::new_headless();
        let mut lm = LightmapBuilder::new();
        load_world("maps/tiny.bsp", &tiny_bsp(), &mut images, &loader, &mut lm, 1).unwrap()
    }
}
