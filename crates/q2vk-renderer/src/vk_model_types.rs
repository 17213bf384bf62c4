// vk_model_types.rs — in-memory model representation
//
// The BSP is held as parallel arrays indexed by u32; node/leaf child links
// are the file format's signed encoding (negative = -(leaf+1)), so there
// are no pointer cycles and a world can be cloned or dropped freely.

use q2vk_common::q_shared::{CPlane, Vec3};
use q2vk_common::qfiles::MAXLIGHTMAPS;

#[derive(Debug, Clone, Copy, Default)]
pub struct MVertex {
    pub position: Vec3,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MEdge {
    pub v: [u16; 2],
}

#[derive(Debug, Clone, Default)]
pub struct MTexInfo {
    pub vecs: [[f32; 4]; 2],
    pub flags: i32,
    /// frames in the animation chain starting here
    pub numframes: i32,
    /// next texinfo in the animation chain
    pub next: Option<u32>,
    /// image cache handle for the wall texture
    pub image: Option<u32>,
}

/// One fan vertex: position, texture st, lightmap st.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorldVert {
    pub pos: Vec3,
    pub s: f32,
    pub t: f32,
    pub lm_s: f32,
    pub lm_t: f32,
}

/// A triangle-fan polygon. Warp surfaces carry several after subdivision;
/// everything else has exactly one.
#[derive(Debug, Clone, Default)]
pub struct SurfPoly {
    pub verts: Vec<WorldVert>,
}

#[derive(Debug, Clone, Default)]
pub struct MSurface {
    pub plane: u32,
    /// SURF_PLANEBACK and the DRAW* flags from vk_local
    pub flags: i32,

    pub firstedge: i32,
    pub numedges: i32,

    pub texturemins: [i16; 2],
    pub extents: [i16; 2],

    pub texinfo: u32,
    pub polys: Vec<SurfPoly>,

    // lightmap
    pub styles: [u8; MAXLIGHTMAPS],
    /// byte offset of this surface's luxels in the world lightdata
    pub samples: Option<usize>,
    pub lightmaptexturenum: i32,
    pub light_s: i32,
    pub light_t: i32,

    // transient, stamped by the walkers
    pub visframe: i32,
    pub dlightframe: i32,
    pub dlightbits: u32,

    /// per-luxel stain alpha, same extent grid as the lightmap
    pub stainsamples: Vec<u8>,
}

impl MSurface {
    /// Lightmap block dimensions in luxels (16 world units per luxel).
    pub fn lm_size(&self) -> (usize, usize) {
        (
            (self.extents[0] as usize >> 4) + 1,
            (self.extents[1] as usize >> 4) + 1,
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MNode {
    pub plane: u32,
    /// negative children encode leaves: leaf = -(child + 1)
    pub children: [i32; 2],
    /// mins[3] then maxs[3], for frustum culling
    pub minmaxs: [f32; 6],
    pub firstsurface: u16,
    pub numsurfaces: u16,
    /// parent node index, -1 at the root
    pub parent: i32,
    pub visframe: i32,
}

#[derive(Debug, Clone, Default)]
pub struct MLeaf {
    pub contents: i32,
    pub cluster: i32,
    pub area: i32,
    pub minmaxs: [f32; 6],
    pub first_marksurface: u32,
    pub num_marksurfaces: u32,
    pub parent: i32,
    pub visframe: i32,
}

/// An inline brush model (doors, platforms): a subtree of the world.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    pub radius: f32,
    pub headnode: i32,
    pub firstface: i32,
    pub numfaces: i32,
}

/// Compressed visibility: one RLE row per cluster inside a single blob.
#[derive(Debug, Clone, Default)]
pub struct MVis {
    pub numclusters: i32,
    /// per-cluster [pvs, phs] byte offsets into `data`
    pub bitofs: Vec<[i32; 2]>,
    pub data: Vec<u8>,
}

/// The parsed world. Everything the PVS walker, lightmap engine, and
/// surface passes touch lives here.
#[derive(Debug, Clone, Default)]
pub struct WorldModel {
    pub name: String,
    pub registration_sequence: i32,

    pub planes: Vec<CPlane>,
    pub vertexes: Vec<MVertex>,
    pub edges: Vec<MEdge>,
    pub surfedges: Vec<i32>,
    pub texinfo: Vec<MTexInfo>,
    pub surfaces: Vec<MSurface>,
    pub marksurfaces: Vec<u32>,
    pub nodes: Vec<MNode>,
    pub leafs: Vec<MLeaf>,
    pub submodels: Vec<SubModel>,

    pub lightdata: Vec<u8>,
    pub vis: Option<MVis>,
}

impl WorldModel {
    pub fn numclusters(&self) -> i32 {
        self.vis.as_ref().map_or(0, |v| v.numclusters)
    }

    /// Decode a node child link: `Ok(node index)` or `Err(leaf index)`.
    #[inline]
    pub fn child(&self, link: i32) -> Result<usize, usize> {
        if link >= 0 {
            Ok(link as usize)
        } else {
            Err((-1 - link) as usize)
        }
    }
}

// ============================================================
// Alias / sprite models
// ============================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct AliasVert {
    /// position quantized to one byte per axis inside the frame bbox
    pub pos_q: [u8; 3],
    /// index into the 162-entry normal table
    pub normal_idx: u8,
}

#[derive(Debug, Clone, Default)]
pub struct AliasFrame {
    pub name: String,
    pub scale: Vec3,
    pub translate: Vec3,
    pub verts: Vec<AliasVert>,
}

#[derive(Debug, Clone, Default)]
pub struct AliasModel {
    pub skinwidth: i32,
    pub skinheight: i32,
    pub st_verts: Vec<(i16, i16)>,
    pub triangles: Vec<([i16; 3], [i16; 3])>,
    pub frames: Vec<AliasFrame>,
    pub skin_names: Vec<String>,
    /// image cache handles resolved at registration
    pub skins: Vec<Option<u32>>,
}

impl AliasFrame {
    /// Decode a quantized vertex back to model space.
    #[inline]
    pub fn decode(&self, v: &AliasVert) -> Vec3 {
        [
            v.pos_q[0] as f32 * self.scale[0] + self.translate[0],
            v.pos_q[1] as f32 * self.scale[1] + self.translate[1],
            v.pos_q[2] as f32 * self.scale[2] + self.translate[2],
        ]
    }
}

impl AliasModel {
    /// Interpolated model-space positions for one render tick:
    /// `pos = move + old * backlerp + curr * frontlerp`, with the frame
    /// translates folded into `move`. `shell_scale` expands each vertex
    /// along its table normal for the shell effect.
    pub fn lerp_frame(
        &self,
        frame: usize,
        oldframe: usize,
        backlerp: f32,
        shell_scale: f32,
    ) -> Vec<Vec3> {
        let curr = &self.frames[frame.min(self.frames.len() - 1)];
        let old = &self.frames[oldframe.min(self.frames.len() - 1)];
        let frontlerp = 1.0 - backlerp;

        let move_t = [
            backlerp * old.translate[0] + frontlerp * curr.translate[0],
            backlerp * old.translate[1] + frontlerp * curr.translate[1],
            backlerp * old.translate[2] + frontlerp * curr.translate[2],
        ];
        let frontv = [
            frontlerp * curr.scale[0],
            frontlerp * curr.scale[1],
            frontlerp * curr.scale[2],
        ];
        let backv = [
            backlerp * old.scale[0],
            backlerp * old.scale[1],
            backlerp * old.scale[2],
        ];

        curr.verts
            .iter()
            .zip(old.verts.iter())
            .map(|(cv, ov)| {
                let normal = crate::anorms::VERTEX_NORMALS
                    [cv.normal_idx as usize % crate::anorms::NUMVERTEXNORMALS];
                [
                    move_t[0]
                        + ov.pos_q[0] as f32 * backv[0]
                        + cv.pos_q[0] as f32 * frontv[0]
                        + normal[0] * shell_scale,
                    move_t[1]
                        + ov.pos_q[1] as f32 * backv[1]
                        + cv.pos_q[1] as f32 * frontv[1]
                        + normal[1] * shell_scale,
                    move_t[2]
                        + ov.pos_q[2] as f32 * backv[2]
                        + cv.pos_q[2] as f32 * frontv[2]
                        + normal[2] * shell_scale,
                ]
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpriteFrame {
    pub width: i32,
    pub height: i32,
    pub origin_x: i32,
    pub origin_y: i32,
    pub name: String,
    pub skin: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct SpriteModel {
    pub frames: Vec<SpriteFrame>,
}

#[derive(Debug, Clone)]
pub enum ModelKind {
    /// index into the world's submodel table
    Inline(usize),
    Alias(AliasModel),
    Sprite(SpriteModel),
}

#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    pub registration_sequence: i32,
    pub mins: Vec3,
    pub maxs: Vec3,
    pub radius: f32,
    pub kind: ModelKind,
}
