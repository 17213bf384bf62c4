// qfiles.rs — on-disk file format structures and decoders
//
// Everything here is little-endian. Structures are parsed field-by-field
// into native structs rather than transmuted, so a truncated or hostile
// file can never read out of bounds.

use crate::q_shared::{little_float, little_long, little_short, Vec3};

/// A format-level parse failure. Mapped to MalformedAsset or
/// UnsupportedVersion by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    Truncated,
    BadIdent,
    BadVersion,
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FormatError::Truncated => write!(f, "truncated file"),
            FormatError::BadIdent => write!(f, "bad ident"),
            FormatError::BadVersion => write!(f, "unsupported version"),
        }
    }
}

impl std::error::Error for FormatError {}

fn sub(data: &[u8], ofs: usize, len: usize) -> Result<&[u8], FormatError> {
    data.get(ofs..ofs + len).ok_or(FormatError::Truncated)
}

fn read_vec3(b: &[u8]) -> Vec3 {
    [little_float(&b[0..]), little_float(&b[4..]), little_float(&b[8..])]
}

fn read_name(b: &[u8]) -> String {
    let end = b.iter().position(|&c| c == 0).unwrap_or(b.len());
    String::from_utf8_lossy(&b[..end]).into_owned()
}

// ============================================================
// BSP
// ============================================================

/// "IBSP"
pub const IDBSPHEADER: i32 =
    (b'P' as i32) << 24 | (b'S' as i32) << 16 | (b'B' as i32) << 8 | b'I' as i32;
pub const BSPVERSION: i32 = 38;

pub const HEADER_LUMPS: usize = 19;

pub const LUMP_ENTITIES: usize = 0;
pub const LUMP_PLANES: usize = 1;
pub const LUMP_VERTEXES: usize = 2;
pub const LUMP_VISIBILITY: usize = 3;
pub const LUMP_NODES: usize = 4;
pub const LUMP_TEXINFO: usize = 5;
pub const LUMP_FACES: usize = 6;
pub const LUMP_LIGHTING: usize = 7;
pub const LUMP_LEAFS: usize = 8;
pub const LUMP_LEAFFACES: usize = 9;
pub const LUMP_LEAFBRUSHES: usize = 10;
pub const LUMP_EDGES: usize = 11;
pub const LUMP_SURFEDGES: usize = 12;
pub const LUMP_MODELS: usize = 13;
pub const LUMP_BRUSHES: usize = 14;
pub const LUMP_BRUSHSIDES: usize = 15;
pub const LUMP_POP: usize = 16;
pub const LUMP_AREAS: usize = 17;
pub const LUMP_AREAPORTALS: usize = 18;

pub const MAX_MAP_LEAFS: usize = 65536;
pub const MAXLIGHTMAPS: usize = 4;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Lump {
    pub ofs: u32,
    pub len: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DHeader {
    pub ident: i32,
    pub version: i32,
    pub lumps: [Lump; HEADER_LUMPS],
}

impl DHeader {
    pub fn parse(data: &[u8]) -> Result<Self, FormatError> {
        let hdr = sub(data, 0, 8 + HEADER_LUMPS * 8)?;
        let ident = little_long(&hdr[0..]);
        let version = little_long(&hdr[4..]);
        if ident != IDBSPHEADER {
            return Err(FormatError::BadIdent);
        }
        if version != BSPVERSION {
            return Err(FormatError::BadVersion);
        }
        let mut lumps = [Lump::default(); HEADER_LUMPS];
        for (i, lump) in lumps.iter_mut().enumerate() {
            lump.ofs = little_long(&hdr[8 + i * 8..]) as u32;
            lump.len = little_long(&hdr[12 + i * 8..]) as u32;
        }
        Ok(DHeader { ident, version, lumps })
    }

    /// The raw bytes of one lump, bounds-checked against the file.
    pub fn lump<'a>(&self, data: &'a [u8], index: usize) -> Result<&'a [u8], FormatError> {
        let l = self.lumps[index];
        sub(data, l.ofs as usize, l.len as usize)
    }
}

/// Parse a lump of fixed-size records with `parse_one`.
pub fn parse_lump<T>(
    raw: &[u8],
    record_size: usize,
    parse_one: impl Fn(&[u8]) -> T,
) -> Result<Vec<T>, FormatError> {
    if raw.len() % record_size != 0 {
        return Err(FormatError::Truncated);
    }
    Ok(raw.chunks_exact(record_size).map(parse_one).collect())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DPlane {
    pub normal: Vec3,
    pub dist: f32,
    /// PLANE_X..PLANE_ANYZ, for fast side tests
    pub plane_type: i32,
}

pub const DPLANE_SIZE: usize = 20;

pub fn parse_plane(b: &[u8]) -> DPlane {
    DPlane {
        normal: read_vec3(b),
        dist: little_float(&b[12..]),
        plane_type: little_long(&b[16..]),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DNode {
    pub planenum: i32,
    /// negative numbers are -(leafs+1), not nodes
    pub children: [i32; 2],
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub firstface: u16,
    pub numfaces: u16,
}

pub const DNODE_SIZE: usize = 28;

pub fn parse_node(b: &[u8]) -> DNode {
    DNode {
        planenum: little_long(&b[0..]),
        children: [little_long(&b[4..]), little_long(&b[8..])],
        mins: [little_short(&b[12..]), little_short(&b[14..]), little_short(&b[16..])],
        maxs: [little_short(&b[18..]), little_short(&b[20..]), little_short(&b[22..])],
        firstface: little_short(&b[24..]) as u16,
        numfaces: little_short(&b[26..]) as u16,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DLeaf {
    pub contents: i32,
    pub cluster: i16,
    pub area: i16,
    pub mins: [i16; 3],
    pub maxs: [i16; 3],
    pub first_leafface: u16,
    pub num_leaffaces: u16,
    pub first_leafbrush: u16,
    pub num_leafbrushes: u16,
}

pub const DLEAF_SIZE: usize = 28;

pub fn parse_leaf(b: &[u8]) -> DLeaf {
    DLeaf {
        contents: little_long(&b[0..]),
        cluster: little_short(&b[4..]),
        area: little_short(&b[6..]),
        mins: [little_short(&b[8..]), little_short(&b[10..]), little_short(&b[12..])],
        maxs: [little_short(&b[14..]), little_short(&b[16..]), little_short(&b[18..])],
        first_leafface: little_short(&b[20..]) as u16,
        num_leaffaces: little_short(&b[22..]) as u16,
        first_leafbrush: little_short(&b[24..]) as u16,
        num_leafbrushes: little_short(&b[26..]) as u16,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DFace {
    pub planenum: u16,
    pub side: i16,
    pub firstedge: i32,
    pub numedges: i16,
    pub texinfo: i16,
    pub styles: [u8; MAXLIGHTMAPS],
    pub lightofs: i32,
}

pub const DFACE_SIZE: usize = 20;

pub fn parse_face(b: &[u8]) -> DFace {
    DFace {
        planenum: little_short(&b[0..]) as u16,
        side: little_short(&b[2..]),
        firstedge: little_long(&b[4..]),
        numedges: little_short(&b[8..]),
        texinfo: little_short(&b[10..]),
        styles: [b[12], b[13], b[14], b[15]],
        lightofs: little_long(&b[16..]),
    }
}

#[derive(Debug, Clone, Default)]
pub struct DTexInfo {
    /// [s/t][xyz + offset]
    pub vecs: [[f32; 4]; 2],
    pub flags: i32,
    pub value: i32,
    pub texture: String,
    pub nexttexinfo: i32,
}

pub const DTEXINFO_SIZE: usize = 76;

pub fn parse_texinfo(b: &[u8]) -> DTexInfo {
    let mut vecs = [[0.0f32; 4]; 2];
    for (i, row) in vecs.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = little_float(&b[i * 16 + j * 4..]);
        }
    }
    DTexInfo {
        vecs,
        flags: little_long(&b[32..]),
        value: little_long(&b[36..]),
        texture: read_name(&b[40..72]),
        nexttexinfo: little_long(&b[72..]),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DEdge {
    pub v: [u16; 2],
}

pub const DEDGE_SIZE: usize = 4;

pub fn parse_edge(b: &[u8]) -> DEdge {
    DEdge {
        v: [little_short(&b[0..]) as u16, little_short(&b[2..]) as u16],
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DModel {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub origin: Vec3,
    pub headnode: i32,
    pub firstface: i32,
    pub numfaces: i32,
}

pub const DMODEL_SIZE: usize = 48;

pub fn parse_dmodel(b: &[u8]) -> DModel {
    DModel {
        mins: read_vec3(&b[0..]),
        maxs: read_vec3(&b[12..]),
        origin: read_vec3(&b[24..]),
        headnode: little_long(&b[36..]),
        firstface: little_long(&b[40..]),
        numfaces: little_long(&b[44..]),
    }
}

pub const DVIS_PVS: usize = 0;
pub const DVIS_PHS: usize = 1;

/// The visibility lump header: per-cluster PVS/PHS byte offsets into the
/// lump, followed by run-length-encoded rows.
#[derive(Debug, Clone, Default)]
pub struct DVis {
    pub numclusters: i32,
    /// bitofs[cluster][DVIS_PVS / DVIS_PHS]
    pub bitofs: Vec<[i32; 2]>,
}

impl DVis {
    pub fn parse(raw: &[u8]) -> Result<Self, FormatError> {
        if raw.is_empty() {
            return Ok(DVis::default());
        }
        let numclusters = little_long(sub(raw, 0, 4)?);
        if numclusters < 0 || numclusters as usize > MAX_MAP_LEAFS {
            return Err(FormatError::Truncated);
        }
        let table = sub(raw, 4, numclusters as usize * 8)?;
        let bitofs = table
            .chunks_exact(8)
            .map(|b| [little_long(&b[0..]), little_long(&b[4..])])
            .collect();
        Ok(DVis { numclusters, bitofs })
    }
}

// ============================================================
// WAL — palettized wall textures
// ============================================================

pub const MIPLEVELS: usize = 4;
pub const WAL_HEADER_SIZE: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct WalHeader {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub offsets: [u32; MIPLEVELS],
    pub animname: String,
    pub flags: i32,
    pub contents: i32,
    pub value: i32,
}

impl WalHeader {
    pub fn parse(data: &[u8]) -> Result<Self, FormatError> {
        let b = sub(data, 0, WAL_HEADER_SIZE)?;
        let mut offsets = [0u32; MIPLEVELS];
        for (i, o) in offsets.iter_mut().enumerate() {
            *o = little_long(&b[40 + i * 4..]) as u32;
        }
        let hdr = WalHeader {
            name: read_name(&b[0..32]),
            width: little_long(&b[32..]) as u32,
            height: little_long(&b[36..]) as u32,
            offsets,
            animname: read_name(&b[56..88]),
            flags: little_long(&b[88..]),
            contents: little_long(&b[92..]),
            value: little_long(&b[96..]),
        };
        if hdr.width == 0 || hdr.height == 0 || hdr.width > 4096 || hdr.height > 4096 {
            return Err(FormatError::Truncated);
        }
        // mip 0 pixels must be inside the file
        let need = hdr.offsets[0] as usize + (hdr.width * hdr.height) as usize;
        if data.len() < need {
            return Err(FormatError::Truncated);
        }
        Ok(hdr)
    }

    /// Mip level 0 pixels (palette indices).
    pub fn pixels<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        let ofs = self.offsets[0] as usize;
        &data[ofs..ofs + (self.width * self.height) as usize]
    }
}

// ============================================================
// PCX
// ============================================================

pub const PCX_HEADER_SIZE: usize = 128;
pub const PCX_PALETTE_SIZE: usize = 768;

#[derive(Debug, Clone)]
pub struct PcxImage {
    pub width: usize,
    pub height: usize,
    /// 8-bit palette indices, row major
    pub pixels: Vec<u8>,
    /// 256 * RGB
    pub palette: Option<Vec<u8>>,
}

/// Decode an 8-bit RLE PCX.
pub fn pcx_decode(raw: &[u8]) -> Result<PcxImage, FormatError> {
    let hdr = sub(raw, 0, PCX_HEADER_SIZE)?;
    let manufacturer = hdr[0];
    let version = hdr[1];
    let encoding = hdr[2];
    let bits_per_pixel = hdr[3];
    if manufacturer != 0x0a || version != 5 || encoding != 1 || bits_per_pixel != 8 {
        return Err(FormatError::BadIdent);
    }
    let xmin = little_short(&hdr[4..]) as i32;
    let ymin = little_short(&hdr[6..]) as i32;
    let xmax = little_short(&hdr[8..]) as i32;
    let ymax = little_short(&hdr[10..]) as i32;
    if xmax < xmin || ymax < ymin || xmax >= 4096 || ymax >= 4096 {
        return Err(FormatError::Truncated);
    }
    let width = (xmax - xmin + 1) as usize;
    let height = (ymax - ymin + 1) as usize;

    let mut pixels = vec![0u8; width * height];
    let mut src = PCX_HEADER_SIZE;
    for y in 0..height {
        let mut x = 0;
        while x < width {
            let &byte = raw.get(src).ok_or(FormatError::Truncated)?;
            src += 1;
            let (run, value) = if byte & 0xc0 == 0xc0 {
                let &v = raw.get(src).ok_or(FormatError::Truncated)?;
                src += 1;
                ((byte & 0x3f) as usize, v)
            } else {
                (1, byte)
            };
            for _ in 0..run {
                if x >= width {
                    break; // run crosses a scanline pad; drop the excess
                }
                pixels[y * width + x] = value;
                x += 1;
            }
        }
    }

    // trailing 256-color palette, prefixed by 0x0c
    let palette = if raw.len() >= PCX_PALETTE_SIZE + 1 {
        let pofs = raw.len() - PCX_PALETTE_SIZE;
        (raw[pofs - 1] == 0x0c).then(|| raw[pofs..].to_vec())
    } else {
        None
    };

    Ok(PcxImage { width, height, pixels, palette })
}

// ============================================================
// TGA
// ============================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TgaImage {
    pub width: usize,
    pub height: usize,
    /// RGBA, top-left origin
    pub pixels: Vec<u8>,
}

/// Decode a Targa image: types 2/3 (uncompressed RGB/mono) and 10/11
/// (RLE), at 8, 15, 16, 24 or 32 bits, honoring both origin orientations.
pub fn tga_decode(raw: &[u8]) -> Result<TgaImage, FormatError> {
    let hdr = sub(raw, 0, 18)?;
    let id_length = hdr[0] as usize;
    let colormap_type = hdr[1];
    let image_type = hdr[2];
    let colormap_length = little_short(&hdr[5..]) as u16 as usize;
    let colormap_bpp = hdr[7] as usize;
    let width = little_short(&hdr[12..]) as u16 as usize;
    let height = little_short(&hdr[14..]) as u16 as usize;
    let pixel_bits = hdr[16] as usize;
    let descriptor = hdr[17];
    let top_origin = descriptor & 0x20 != 0;

    if colormap_type != 0 {
        return Err(FormatError::BadIdent); // colormapped TGAs not used by any asset
    }
    if !matches!(image_type, 2 | 3 | 10 | 11) {
        return Err(FormatError::BadIdent);
    }
    if !matches!(pixel_bits, 8 | 15 | 16 | 24 | 32) {
        return Err(FormatError::BadIdent);
    }
    if width == 0 || height == 0 || width > 8192 || height > 8192 {
        return Err(FormatError::Truncated);
    }

    let bytes_pp = pixel_bits.div_ceil(8);
    let mut src = 18 + id_length + colormap_length * colormap_bpp.div_ceil(8);

    let decode_pixel = |b: &[u8]| -> [u8; 4] {
        match pixel_bits {
            8 => [b[0], b[0], b[0], 255],
            15 | 16 => {
                let v = u16::from_le_bytes([b[0], b[1]]);
                let r = ((v >> 10) & 0x1f) as u8;
                let g = ((v >> 5) & 0x1f) as u8;
                let bl = (v & 0x1f) as u8;
                [r << 3 | r >> 2, g << 3 | g >> 2, bl << 3 | bl >> 2, 255]
            }
            24 => [b[2], b[1], b[0], 255],
            _ => [b[2], b[1], b[0], b[3]],
        }
    };

    let mut pixels = vec![0u8; width * height * 4];
    let mut put = |pixels: &mut Vec<u8>, index: usize, px: [u8; 4]| {
        let row = index / width;
        let col = index % width;
        let y = if top_origin { row } else { height - 1 - row };
        let dst = (y * width + col) * 4;
        pixels[dst..dst + 4].copy_from_slice(&px);
    };

    let total = width * height;
    if image_type == 2 || image_type == 3 {
        for i in 0..total {
            let b = sub(raw, src, bytes_pp)?;
            put(&mut pixels, i, decode_pixel(b));
            src += bytes_pp;
        }
    } else {
        let mut i = 0;
        while i < total {
            let &packet = raw.get(src).ok_or(FormatError::Truncated)?;
            src += 1;
            let count = (packet & 0x7f) as usize + 1;
            if packet & 0x80 != 0 {
                let px = decode_pixel(sub(raw, src, bytes_pp)?);
                src += bytes_pp;
                for _ in 0..count {
                    if i >= total {
                        return Err(FormatError::Truncated);
                    }
                    put(&mut pixels, i, px);
                    i += 1;
                }
            } else {
                for _ in 0..count {
                    if i >= total {
                        return Err(FormatError::Truncated);
                    }
                    let b = sub(raw, src, bytes_pp)?;
                    put(&mut pixels, i, decode_pixel(b));
                    src += bytes_pp;
                    i += 1;
                }
            }
        }
    }

    Ok(TgaImage { width, height, pixels })
}

// ============================================================
// MD2 alias models
// ============================================================

/// "IDP2"
pub const IDALIASHEADER: i32 =
    (b'2' as i32) << 24 | (b'P' as i32) << 16 | (b'D' as i32) << 8 | b'I' as i32;
pub const ALIAS_VERSION: i32 = 8;

pub const MAX_TRIANGLES: usize = 4096;
pub const MAX_VERTS: usize = 2048;
pub const MAX_FRAMES: usize = 512;
pub const MAX_MD2SKINS: usize = 32;
pub const MAX_SKINNAME: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DStVert {
    pub s: i16,
    pub t: i16,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DTriangle {
    pub index_xyz: [i16; 3],
    pub index_st: [i16; 3],
}

/// One compressed vertex: quantized position in the frame bbox plus an
/// index into the 162-entry normal table.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DTriVertx {
    pub v: [u8; 3],
    pub lightnormalindex: u8,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DAliasFrame {
    pub scale: Vec3,
    pub translate: Vec3,
    pub name: String,
    pub verts: Vec<DTriVertx>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DMdlHeader {
    pub ident: i32,
    pub version: i32,
    pub skinwidth: i32,
    pub skinheight: i32,
    pub framesize: i32,
    pub num_skins: i32,
    pub num_xyz: i32,
    pub num_st: i32,
    pub num_tris: i32,
    pub num_glcmds: i32,
    pub num_frames: i32,
    pub ofs_skins: i32,
    pub ofs_st: i32,
    pub ofs_tris: i32,
    pub ofs_frames: i32,
    pub ofs_glcmds: i32,
    pub ofs_end: i32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Md2Model {
    pub header: DMdlHeader,
    pub skin_names: Vec<String>,
    pub st_verts: Vec<DStVert>,
    pub triangles: Vec<DTriangle>,
    pub frames: Vec<DAliasFrame>,
}

pub fn md2_parse(raw: &[u8]) -> Result<Md2Model, FormatError> {
    let hdr = sub(raw, 0, 68)?;
    let mut fields = [0i32; 17];
    for (i, f) in fields.iter_mut().enumerate() {
        *f = little_long(&hdr[i * 4..]);
    }
    let header = DMdlHeader {
        ident: fields[0],
        version: fields[1],
        skinwidth: fields[2],
        skinheight: fields[3],
        framesize: fields[4],
        num_skins: fields[5],
        num_xyz: fields[6],
        num_st: fields[7],
        num_tris: fields[8],
        num_glcmds: fields[9],
        num_frames: fields[10],
        ofs_skins: fields[11],
        ofs_st: fields[12],
        ofs_tris: fields[13],
        ofs_frames: fields[14],
        ofs_glcmds: fields[15],
        ofs_end: fields[16],
    };

    if header.ident != IDALIASHEADER {
        return Err(FormatError::BadIdent);
    }
    if header.version != ALIAS_VERSION {
        return Err(FormatError::BadVersion);
    }
    if header.num_xyz <= 0
        || header.num_xyz as usize > MAX_VERTS
        || header.num_frames <= 0
        || header.num_frames as usize > MAX_FRAMES
        || header.num_tris <= 0
        || header.num_tris as usize > MAX_TRIANGLES
        || header.num_skins < 0
        || header.num_skins as usize > MAX_MD2SKINS
    {
        return Err(FormatError::Truncated);
    }

    let mut skin_names = Vec::with_capacity(header.num_skins as usize);
    for i in 0..header.num_skins as usize {
        let b = sub(raw, header.ofs_skins as usize + i * MAX_SKINNAME, MAX_SKINNAME)?;
        skin_names.push(read_name(b));
    }

    let st_raw = sub(raw, header.ofs_st as usize, header.num_st as usize * 4)?;
    let st_verts = st_raw
        .chunks_exact(4)
        .map(|b| DStVert { s: little_short(&b[0..]), t: little_short(&b[2..]) })
        .collect();

    let tri_raw = sub(raw, header.ofs_tris as usize, header.num_tris as usize * 12)?;
    let triangles = tri_raw
        .chunks_exact(12)
        .map(|b| DTriangle {
            index_xyz: [little_short(&b[0..]), little_short(&b[2..]), little_short(&b[4..])],
            index_st: [little_short(&b[6..]), little_short(&b[8..]), little_short(&b[10..])],
        })
        .collect();

    let frame_size = header.framesize as usize;
    if frame_size < 40 + header.num_xyz as usize * 4 {
        return Err(FormatError::Truncated);
    }
    let mut frames = Vec::with_capacity(header.num_frames as usize);
    for i in 0..header.num_frames as usize {
        let b = sub(raw, header.ofs_frames as usize + i * frame_size, frame_size)?;
        let verts = b[40..40 + header.num_xyz as usize * 4]
            .chunks_exact(4)
            .map(|v| DTriVertx { v: [v[0], v[1], v[2]], lightnormalindex: v[3] })
            .collect();
        frames.push(DAliasFrame {
            scale: read_vec3(&b[0..]),
            translate: read_vec3(&b[12..]),
            name: read_name(&b[24..40]),
            verts,
        });
    }

    Ok(Md2Model { header, skin_names, st_verts, triangles, frames })
}

// ============================================================
// SP2 sprites
// ============================================================

/// "IDS2"
pub const IDSPRITEHEADER: i32 =
    (b'2' as i32) << 24 | (b'S' as i32) << 16 | (b'D' as i32) << 8 | b'I' as i32;
pub const SPRITE_VERSION: i32 = 2;
pub const MAX_SPRITE_FRAMES: usize = 32;

#[derive(Debug, Clone, Default)]
pub struct DSprFrame {
    pub width: i32,
    pub height: i32,
    /// raster coordinates inside pic of the frame origin
    pub origin_x: i32,
    pub origin_y: i32,
    pub name: String,
}

#[derive(Debug, Clone, Default)]
pub struct DSprite {
    pub numframes: i32,
    pub frames: Vec<DSprFrame>,
}

pub fn sp2_parse(raw: &[u8]) -> Result<DSprite, FormatError> {
    let hdr = sub(raw, 0, 12)?;
    let ident = little_long(&hdr[0..]);
    let version = little_long(&hdr[4..]);
    let numframes = little_long(&hdr[8..]);
    if ident != IDSPRITEHEADER {
        return Err(FormatError::BadIdent);
    }
    if version != SPRITE_VERSION {
        return Err(FormatError::BadVersion);
    }
    if numframes < 0 || numframes as usize > MAX_SPRITE_FRAMES {
        return Err(FormatError::Truncated);
    }
    const FRAME_SIZE: usize = 16 + MAX_SKINNAME;
    let mut frames = Vec::with_capacity(numframes as usize);
    for i in 0..numframes as usize {
        let b = sub(raw, 12 + i * FRAME_SIZE, FRAME_SIZE)?;
        frames.push(DSprFrame {
            width: little_long(&b[0..]),
            height: little_long(&b[4..]),
            origin_x: little_long(&b[8..]),
            origin_y: little_long(&b[12..]),
            name: read_name(&b[16..]),
        });
    }
    Ok(DSprite { numframes, frames })
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bsp_header_ident() {
        assert_eq!(&IDBSPHEADER.to_le_bytes(), b"IBSP");
        assert_eq!(&IDALIASHEADER.to_le_bytes(), b"IDP2");
        assert_eq!(&IDSPRITEHEADER.to_le_bytes(), b"IDS2");
    }

    #[test]
    fn test_header_rejects_bad_ident() {
        let mut data = vec![0u8; 8 + HEADER_LUMPS * 8];
        data[0..4].copy_from_slice(b"XBSP");
        data[4..8].copy_from_slice(&38i32.to_le_bytes());
        assert_eq!(DHeader::parse(&data), Err(FormatError::BadIdent));
    }

    #[test]
    fn test_header_rejects_bad_version() {
        let mut data = vec![0u8; 8 + HEADER_LUMPS * 8];
        data[0..4].copy_from_slice(b"IBSP");
        data[4..8].copy_from_slice(&46i32.to_le_bytes());
        assert_eq!(DHeader::parse(&data), Err(FormatError::BadVersion));
    }

    #[test]
    fn test_header_rejects_truncated() {
        assert_eq!(DHeader::parse(&[0u8; 16]), Err(FormatError::Truncated));
    }

    #[test]
    fn test_lump_out_of_bounds() {
        let mut data = vec![0u8; 8 + HEADER_LUMPS * 8];
        data[0..4].copy_from_slice(b"IBSP");
        data[4..8].copy_from_slice(&38i32.to_le_bytes());
        // LUMP_PLANES points past the end
        data[8 + LUMP_PLANES * 8..12 + LUMP_PLANES * 8].copy_from_slice(&4096u32.to_le_bytes());
        data[12 + LUMP_PLANES * 8..16 + LUMP_PLANES * 8].copy_from_slice(&64u32.to_le_bytes());
        let hdr = DHeader::parse(&data).unwrap();
        assert_eq!(hdr.lump(&data, LUMP_PLANES), Err(FormatError::Truncated));
    }

    #[test]
    fn test_parse_node_leaf_sizes() {
        let node = parse_node(&[0u8; DNODE_SIZE]);
        assert_eq!(node.children, [0, 0]);
        let leaf = parse_leaf(&[0u8; DLEAF_SIZE]);
        assert_eq!(leaf.cluster, 0);
    }

    #[test]
    fn test_parse_plane() {
        let mut b = [0u8; DPLANE_SIZE];
        b[8..12].copy_from_slice(&1.0f32.to_le_bytes());
        b[12..16].copy_from_slice(&64.0f32.to_le_bytes());
        b[16..20].copy_from_slice(&2i32.to_le_bytes());
        let p = parse_plane(&b);
        assert_eq!(p.normal, [0.0, 0.0, 1.0]);
        assert_eq!(p.dist, 64.0);
        assert_eq!(p.plane_type, 2);
    }

    fn tga_header(w: u16, h: u16, bits: u8, image_type: u8, descriptor: u8) -> Vec<u8> {
        let mut hdr = vec![0u8; 18];
        hdr[2] = image_type;
        hdr[12..14].copy_from_slice(&w.to_le_bytes());
        hdr[14..16].copy_from_slice(&h.to_le_bytes());
        hdr[16] = bits;
        hdr[17] = descriptor;
        hdr
    }

    #[test]
    fn test_tga_uncompressed_24_bottom_origin() {
        // 2x2, bottom-left origin: file rows are bottom-up
        let mut data = tga_header(2, 2, 24, 2, 0);
        // bottom row: blue, green; top row: red, white (BGR order on disk)
        data.extend_from_slice(&[255, 0, 0, 0, 255, 0]);
        data.extend_from_slice(&[0, 0, 255, 255, 255, 255]);
        let img = tga_decode(&data).unwrap();
        assert_eq!(img.width, 2);
        // top-left of the decoded image is red
        assert_eq!(&img.pixels[0..4], &[255, 0, 0, 255]);
        // bottom-left is blue
        assert_eq!(&img.pixels[8..12], &[0, 0, 255, 255]);
    }

    #[test]
    fn test_tga_rle_32_top_origin() {
        let mut data = tga_header(2, 1, 32, 10, 0x20);
        // RLE packet: run of 2 of (B,G,R,A) = (1,2,3,128)
        data.push(0x81);
        data.extend_from_slice(&[1, 2, 3, 128]);
        let img = tga_decode(&data).unwrap();
        assert_eq!(&img.pixels[0..4], &[3, 2, 1, 128]);
        assert_eq!(&img.pixels[4..8], &[3, 2, 1, 128]);
    }

    #[test]
    fn test_tga_16bit() {
        let mut data = tga_header(1, 1, 16, 2, 0x20);
        // 0x7fff = white
        data.extend_from_slice(&0x7fffu16.to_le_bytes());
        let img = tga_decode(&data).unwrap();
        assert_eq!(&img.pixels[0..4], &[255, 255, 255, 255]);
    }

    #[test]
    fn test_tga_truncated_fails() {
        let data = tga_header(4, 4, 24, 2, 0);
        assert_eq!(tga_decode(&data), Err(FormatError::Truncated));
    }

    fn build_pcx(width: u16, height: u16, rows: &[&[u8]]) -> Vec<u8> {
        let mut data = vec![0u8; PCX_HEADER_SIZE];
        data[0] = 0x0a;
        data[1] = 5;
        data[2] = 1;
        data[3] = 8;
        data[8..10].copy_from_slice(&(width - 1).to_le_bytes());
        data[10..12].copy_from_slice(&(height - 1).to_le_bytes());
        for row in rows {
            data.extend_from_slice(row);
        }
        data
    }

    #[test]
    fn test_pcx_literal_and_run() {
        // 4x1: literal 7, then run of 3 x 9 (0xc3 = run marker | count 3)
        let data = build_pcx(4, 1, &[&[7, 0xc3, 9]]);
        let img = pcx_decode(&data).unwrap();
        assert_eq!(img.pixels, vec![7, 9, 9, 9]);
        assert!(img.palette.is_none());
    }

    #[test]
    fn test_pcx_with_palette() {
        let mut data = build_pcx(1, 1, &[&[3]]);
        data.push(0x0c);
        data.extend_from_slice(&[0xaa; PCX_PALETTE_SIZE]);
        let img = pcx_decode(&data).unwrap();
        assert_eq!(img.palette.as_ref().map(|p| p.len()), Some(PCX_PALETTE_SIZE));
    }

    #[test]
    fn test_pcx_rejects_non_pcx() {
        assert!(pcx_decode(&[0u8; 256]).is_err());
    }

    fn md2_with_header(frames: i32, verts: i32) -> Vec<u8> {
        let framesize = 40 + verts * 4;
        let fields = [
            IDALIASHEADER, ALIAS_VERSION, 64, 64, framesize,
            0, verts, 1, 1, 0, frames,
            68, // ofs_skins
            68, // ofs_st
            72, // ofs_tris
            84, // ofs_frames
            84 + frames * framesize,
            84 + frames * framesize,
        ];
        let mut data = Vec::new();
        for f in fields {
            data.extend_from_slice(&f.to_le_bytes());
        }
        data.resize(84 + (frames * framesize) as usize, 0);
        data
    }

    #[test]
    fn test_md2_parse_minimal() {
        let data = md2_with_header(2, 3);
        let mdl = md2_parse(&data).unwrap();
        assert_eq!(mdl.frames.len(), 2);
        assert_eq!(mdl.frames[0].verts.len(), 3);
        assert_eq!(mdl.triangles.len(), 1);
    }

    #[test]
    fn test_md2_rejects_bad_version() {
        let mut data = md2_with_header(1, 1);
        data[4..8].copy_from_slice(&9i32.to_le_bytes());
        assert_eq!(md2_parse(&data), Err(FormatError::BadVersion));
    }

    #[test]
    fn test_sp2_parse() {
        let mut data = Vec::new();
        data.extend_from_slice(&IDSPRITEHEADER.to_le_bytes());
        data.extend_from_slice(&SPRITE_VERSION.to_le_bytes());
        data.extend_from_slice(&1i32.to_le_bytes());
        let mut frame = vec![0u8; 16 + MAX_SKINNAME];
        frame[0..4].copy_from_slice(&32i32.to_le_bytes());
        frame[4..8].copy_from_slice(&32i32.to_le_bytes());
        frame[16..26].copy_from_slice(b"sprites/s\0");
        data.extend_from_slice(&frame);
        let spr = sp2_parse(&data).unwrap();
        assert_eq!(spr.numframes, 1);
        assert_eq!(spr.frames[0].width, 32);
        assert_eq!(spr.frames[0].name, "sprites/s");
    }

    #[test]
    fn test_wal_header_parse() {
        let mut data = vec![0u8; WAL_HEADER_SIZE + 16];
        data[0..8].copy_from_slice(b"e1u1/wal");
        data[32..36].copy_from_slice(&4u32.to_le_bytes());
        data[36..40].copy_from_slice(&4u32.to_le_bytes());
        data[40..44].copy_from_slice(&(WAL_HEADER_SIZE as u32).to_le_bytes());
        let hdr = WalHeader::parse(&data).unwrap();
        assert_eq!(hdr.name, "e1u1/wal");
        assert_eq!(hdr.pixels(&data).len(), 16);
    }

    #[test]
    fn test_wal_rejects_truncated_pixels() {
        let mut data = vec![0u8; WAL_HEADER_SIZE];
        data[32..36].copy_from_slice(&64u32.to_le_bytes());
        data[36..40].copy_from_slice(&64u32.to_le_bytes());
        data[40..44].copy_from_slice(&(WAL_HEADER_SIZE as u32).to_le_bytes());
        assert!(WalHeader::parse(&data).is_err());
    }
}
