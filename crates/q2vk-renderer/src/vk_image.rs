// vk_image.rs — image loading and caching
//
// All texture sourcing goes through here: decode (PCX/TGA/PNG/WAL),
// palette expansion, gamma/intensity pre-scale, power-of-two resampling,
// the UI scrap atlas, and generation-based eviction. The cache is CPU
// side; the driver uploads images flagged dirty and owns the GPU handles.

use std::collections::HashSet;

use q2vk_common::files::FileLoader;
use q2vk_common::q_shared::q_streq_nocase;
use q2vk_common::qfiles::{self, PcxImage};

use crate::vk_local::{BLOCK_HEIGHT, BLOCK_WIDTH, MAX_VKTEXTURES, SCRAP_MAX_DIM};

pub const MAX_SCRAPS: usize = 2;

/// Palette index 255 is reserved as transparent.
const TRANSPARENT_INDEX: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Skin,
    Sprite,
    Wall,
    Pic,
    Sky,
}

impl ImageType {
    /// Walls and skins are mipmapped and light-scaled; UI pics are not.
    pub fn mipmap(self) -> bool {
        matches!(self, ImageType::Skin | ImageType::Wall | ImageType::Sky)
    }
}

#[derive(Debug, Clone)]
pub struct Image {
    pub name: String,
    pub itype: ImageType,
    /// source dimensions
    pub width: i32,
    pub height: i32,
    /// dimensions actually uploaded (power of two, clamped, picmipped)
    pub upload_width: i32,
    pub upload_height: i32,
    pub has_alpha: bool,
    pub registration_sequence: i32,
    /// RGBA pixels at upload dimensions (empty for scrap residents)
    pub data: Vec<u8>,
    /// needs (re)upload to the GPU
    pub dirty: bool,
    /// GPU texture slot, assigned by the driver at upload
    pub gpu_texture: Option<u32>,

    // scrap placement
    pub scrap: bool,
    pub scrap_page: usize,
    /// texture coordinates inside the owning texture
    pub sl: f32,
    pub tl: f32,
    pub sh: f32,
    pub th: f32,
}

/// One 256x256 scrap page: a skyline allocator plus RGBA texels.
pub struct ScrapPage {
    allocated: [i32; BLOCK_WIDTH as usize],
    pub texels: Vec<u8>,
    pub dirty: bool,
}

impl ScrapPage {
    fn new() -> Self {
        Self {
            allocated: [0; BLOCK_WIDTH as usize],
            texels: vec![0; (BLOCK_WIDTH * BLOCK_HEIGHT * 4) as usize],
            dirty: false,
        }
    }

    /// Find a free rect of w*h; returns (x, y). Skyline scan, identical to
    /// the lightmap block allocator.
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
}

/// The image cache. One per renderer context.
pub struct ImageCache {
    images: Vec<Option<Image>>,
    pub registration_sequence: i32,

    /// 256-entry RGBA palette from pics/colormap.pcx
    pub d_8to24table: [u32; 256],
    intensitytable: [u8; 256],
    gammatable: [u8; 256],

    pub scraps: Vec<ScrapPage>,

    // upload policy knobs, resolved from cvars by the driver
    pub max_texture_size: i32,
    pub round_down: bool,
    pub picmip: i32,

    /// names that already logged an atlas-full fallback
    scrap_full_logged: HashSet<String>,
    /// console lines produced since the last drain
    messages: Vec<String>,
}

impl ImageCache {
    /// Build a cache, sourcing the palette from pics/colormap.pcx.
    pub fn new(loader: &dyn FileLoader, vid_gamma: f32, intensity: f32) -> Self {
        let mut cache = Self::new_headless();
        cache.load_palette(loader);
        cache.build_gamma_table(vid_gamma);
        cache.build_intensity_table(intensity);
        cache
    }

    /// A cache with an identity palette and unit tables; used before the
    /// filesystem is up and by tests.
    pub fn new_headless() -> Self {
        let mut d_8to24table = [0u32; 256];
        for (i, e) in d_8to24table.iter_mut().enumerate() {
            // identity grey ramp fallback
            let v = i as u32;
            *e = 0xff00_0000 | (v << 16) | (v << 8) | v;
        }
        d_8to24table[TRANSPARENT_INDEX] = 0; // transparent

        let mut identity = [0u8; 256];
        for (i, e) in identity.iter_mut().enumerate() {
            *e = i as u8;
        }

        Self {
            images: Vec::new(),
            registration_sequence: 1,
            d_8to24table,
            intensitytable: identity,
            gammatable: identity,
            scraps: (0..MAX_SCRAPS).map(|_| ScrapPage::new()).collect(),
            max_texture_size: 4096,
            round_down: false,
            picmip: 0,
            scrap_full_logged: HashSet::new(),
            messages: Vec::new(),
        }
    }

    /// Console output produced by the cache since the last call.
    pub fn drain_messages(&mut self) -> Vec<String> {
        std::mem::take(&mut self.messages)
    }

    // ========================================================
    // Palette and scale tables
    // ========================================================

    fn load_palette(&mut self, loader: &dyn FileLoader) {
        let Some(raw) = loader.load("pics/colormap.pcx") else {
            self.messages.push("Couldn't load pics/colormap.pcx".to_string());
            return;
        };
        let Ok(PcxImage { palette: Some(pal), .. }) = qfiles::pcx_decode(&raw) else {
            self.messages.push("pics/colormap.pcx has no palette".to_string());
            return;
        };

        for i in 0..256 {
            let r = pal[i * 3] as f32;
            let g = pal[i * 3 + 1] as f32;
            let b = pal[i * 3 + 2] as f32;

            // desaturate toward luminance; strongly colored entries keep
            // more of their chroma so lava and blood stay vivid
            let max = r.max(g).max(b);
            let min = r.min(g).min(b);
            let sat = 1.0 - (max - min) / 255.0 * 0.25;
            let lum = 0.3 * r + 0.59 * g + 0.11 * b;
            let scale = |c: f32| (lum + (c - lum) * sat).clamp(0.0, 255.0) as u32;

            self.d_8to24table[i] =
                0xff00_0000 | (scale(b) << 16) | (scale(g) << 8) | scale(r);
        }
        self.d_8to24table[TRANSPARENT_INDEX] = 0;
    }

    pub fn build_gamma_table(&mut self, vid_gamma: f32) {
        if vid_gamma == 1.0 {
            for i in 0..256 {
                self.gammatable[i] = i as u8;
            }
        } else {
            for i in 0..256 {
                let inf = 255.0 * ((i as f32 + 0.5) / 255.5).powf(vid_gamma) + 0.5;
                self.gammatable[i] = inf.clamp(0.0, 255.0) as u8;
            }
        }
    }

    pub fn build_intensity_table(&mut self, intensity: f32) {
        let intensity = intensity.max(1.0);
        for i in 0..256 {
            self.intensitytable[i] = ((i as f32) * intensity).min(255.0) as u8;
        }
    }

    pub fn gamma_table(&self) -> &[u8; 256] {
        &self.gammatable
    }

    // ========================================================
    // Lookup / load
    // ========================================================

    pub fn image(&self, handle: u32) -> Option<&Image> {
        self.images.get(handle as usize).and_then(|i| i.as_ref())
    }

    pub fn image_mut(&mut self, handle: u32) -> Option<&mut Image> {
        self.images.get_mut(handle as usize).and_then(|i| i.as_mut())
    }

    pub fn touch(&mut self, handle: u32) {
        let seq = self.registration_sequence;
        if let Some(image) = self.image_mut(handle) {
            image.registration_sequence = seq;
        }
    }

    /// Find or load an image. Extension priority: PNG, then TGA, then the
    /// name as given (.pcx / .wal). Returns None when nothing decodes; the
    /// caller substitutes a placeholder.
    pub fn find_image(
        &mut self,
        name: &str,
        itype: ImageType,
        loader: &dyn FileLoader,
    ) -> Option<u32> {
        if name.is_empty() {
            return None;
        }

        for (i, slot) in self.images.iter_mut().enumerate() {
            if let Some(image) = slot {
                if q_streq_nocase(&image.name, name) {
                    image.registration_sequence = self.registration_sequence;
                    return Some(i as u32);
                }
            }
        }

        let stem = name.rsplit_once('.').map_or(name, |(s, _)| s);

        // higher-resolution replacements first
        for ext in ["png", "tga"] {
            let candidate = format!("{}.{}", stem, ext);
            if let Some(raw) = loader.load(&candidate) {
                let decoded = match ext {
                    "png" => image::load_from_memory_with_format(&raw, image::ImageFormat::Png)
                        .ok()
                        .map(|img| {
                            let rgba = img.to_rgba8();
                            (rgba.width() as i32, rgba.height() as i32, rgba.into_raw())
                        }),
                    _ => qfiles::tga_decode(&raw)
                        .ok()
                        .map(|t| (t.width as i32, t.height as i32, t.pixels)),
                };
                if let Some((w, h, rgba)) = decoded {
                    return Some(self.load_pic(name, &rgba, w, h, itype));
                }
            }
        }

        // the name as given
        let raw = loader.load(name)?;
        match name.rsplit('.').next() {
            Some(ext) if q_streq_nocase(ext, "pcx") => {
                let pcx = qfiles::pcx_decode(&raw).ok()?;
                Some(self.load_pic8(name, &pcx.pixels, pcx.width as i32, pcx.height as i32, itype))
            }
            Some(ext) if q_streq_nocase(ext, "wal") => {
                let wal = qfiles::WalHeader::parse(&raw).ok()?;
                let pixels = wal.pixels(&raw).to_vec();
                Some(self.load_pic8(name, &pixels, wal.width as i32, wal.height as i32, itype))
            }
            Some(ext) if q_streq_nocase(ext, "tga") => {
                let tga = qfiles::tga_decode(&raw).ok()?;
                Some(self.load_pic(name, &tga.pixels, tga.width as i32, tga.height as i32, itype))
            }
            _ => None,
        }
    }

    /// Register an image from raw RGBA pixels.
    pub fn load_pic(&mut self, name: &str, rgba: &[u8], w: i32, h: i32, itype: ImageType) -> u32 {
        let has_alpha = rgba.chunks_exact(4).any(|px| px[3] != 255);

        let mut image = Image {
            name: name.to_string(),
            itype,
            width: w,
            height: h,
            upload_width: w,
            upload_height: h,
            has_alpha,
            registration_sequence: self.registration_sequence,
            data: Vec::new(),
            dirty: true,
            gpu_texture: None,
            scrap: false,
            scrap_page: 0,
            sl: 0.0,
            tl: 0.0,
            sh: 1.0,
            th: 1.0,
        };

        // small UI pics try the scrap atlas first
        if itype == ImageType::Pic && w < SCRAP_MAX_DIM && h < SCRAP_MAX_DIM {
            match self.scrap_alloc(w, h) {
                Some((page, x, y)) => {
                    let scrap = &mut self.scraps[page];
                    for row in 0..h {
                        let src = (row * w * 4) as usize;
                        let dst = (((y + row) * BLOCK_WIDTH + x) * 4) as usize;
                        scrap.texels[dst..dst + (w * 4) as usize]
                            .copy_from_slice(&rgba[src..src + (w * 4) as usize]);
                    }
                    scrap.dirty = true;

                    image.scrap = true;
                    image.scrap_page = page;
                    // half-texel inset keeps bilinear taps inside the rect
                    image.sl = (x as f32 + 0.01) / BLOCK_WIDTH as f32;
                    image.sh = (x + w) as f32 / BLOCK_WIDTH as f32;
                    image.tl = (y as f32 + 0.01) / BLOCK_HEIGHT as f32;
                    image.th = (y + h) as f32 / BLOCK_HEIGHT as f32;
                    return self.insert(image);
                }
                None => {
                    if self.scrap_full_logged.insert(name.to_string()) {
                        self.messages
                            .push(format!("scrap atlas full, dedicated image for {}", name));
                    }
                }
            }
        }

        let (uw, uh, mut pixels) = self.upload_dims_and_resample(rgba, w, h, itype);
        if itype.mipmap() {
            self.light_scale(&mut pixels, itype);
        }
        image.upload_width = uw;
        image.upload_height = uh;
        image.data = pixels;
        self.insert(image)
    }

    /// Register an 8-bit palettized image. Skins flood-fill their fringe
    /// before expansion; index 255 becomes transparent.
    pub fn load_pic8(
        &mut self,
        name: &str,
        indices: &[u8],
        w: i32,
        h: i32,
        itype: ImageType,
    ) -> u32 {
        let mut indices = indices.to_vec();
        if itype == ImageType::Skin {
            flood_fill_skin(&mut indices, w, h, &self.d_8to24table);
        }

        let mut rgba = Vec::with_capacity(indices.len() * 4);
        for &p in &indices {
            let c = self.d_8to24table[p as usize];
            rgba.extend_from_slice(&c.to_le_bytes());
        }
        self.load_pic(name, &rgba, w, h, itype)
    }

    fn insert(&mut self, image: Image) -> u32 {
        if let Some(free) = self.images.iter().position(|i| i.is_none()) {
            self.images[free] = Some(image);
            return free as u32;
        }
        if self.images.len() >= MAX_VKTEXTURES {
            // evict the oldest unreferenced generation and retry once
            let oldest = self
                .images
                .iter()
                .flatten()
                .map(|i| i.registration_sequence)
                .min()
                .unwrap_or(self.registration_sequence);
            if oldest != self.registration_sequence {
                self.sweep_sequence(oldest + 1);
            }
            if let Some(free) = self.images.iter().position(|i| i.is_none()) {
                self.images[free] = Some(image);
                return free as u32;
            }
        }
        self.images.push(Some(image));
        (self.images.len() - 1) as u32
    }

    // ========================================================
    // Upload policy
    // ========================================================

    /// Round to powers of two (down when configured and mipmapping),
    /// apply picmip for mipmapped types, clamp to the device max, and
    /// resample when the size changed.
    fn upload_dims_and_resample(
        &self,
        rgba: &[u8],
        w: i32,
        h: i32,
        itype: ImageType,
    ) -> (i32, i32, Vec<u8>) {
        let mipmap = itype.mipmap();

        let pot = |v: i32| -> i32 {
            let mut p = 1;
            while p < v {
                p <<= 1;
            }
            if self.round_down && mipmap && p > v && p > 1 {
                p >> 1
            } else {
                p
            }
        };

        let mut uw = pot(w);
        let mut uh = pot(h);

        if mipmap && self.picmip > 0 {
            uw >>= self.picmip;
            uh >>= self.picmip;
        }

        uw = uw.clamp(1, self.max_texture_size);
        uh = uh.clamp(1, self.max_texture_size);

        if uw == w && uh == h {
            return (uw, uh, rgba.to_vec());
        }
        (uw, uh, resample_texture(rgba, w, h, uw, uh))
    }

    /// Intensity then gamma, applied to color channels before upload.
    fn light_scale(&self, rgba: &mut [u8], itype: ImageType) {
        if itype == ImageType::Pic {
            return;
        }
        for px in rgba.chunks_exact_mut(4) {
            px[0] = self.gammatable[self.intensitytable[px[0] as usize] as usize];
            px[1] = self.gammatable[self.intensitytable[px[1] as usize] as usize];
            px[2] = self.gammatable[self.intensitytable[px[2] as usize] as usize];
        }
    }

    fn scrap_alloc(&mut self, w: i32, h: i32) -> Option<(usize, i32, i32)> {
        for (page, scrap) in self.scraps.iter_mut().enumerate() {
            if let Some((x, y)) = scrap.alloc_block(w, h) {
                return Some((page, x, y));
            }
        }
        None
    }

    // ========================================================
    // Eviction
    // ========================================================

    /// Free any image whose registration sequence differs from the
    /// current one. UI pics and scrap residents are never swept.
    pub fn sweep(&mut self) {
        self.sweep_sequence(self.registration_sequence);
    }

    fn sweep_sequence(&mut self, keep_from: i32) {
        for slot in &mut self.images {
            let stale = matches!(
                slot,
                Some(img) if img.registration_sequence < keep_from
                    && img.itype != ImageType::Pic
                    && !img.scrap
            );
            if stale {
                *slot = None;
            }
        }
    }

    pub fn image_count(&self) -> usize {
        self.images.iter().filter(|i| i.is_some()).count()
    }

    /// `imagelist` output.
    pub fn image_list(&self) -> Vec<String> {
        let mut out = vec!["------------------".to_string()];
        let mut texels = 0i64;
        for image in self.images.iter().flatten() {
            texels += (image.upload_width * image.upload_height) as i64;
            let tag = match image.itype {
                ImageType::Skin => 'M',
                ImageType::Sprite => 'S',
                ImageType::Wall => 'W',
                ImageType::Pic => 'P',
                ImageType::Sky => 'E',
            };
            out.push(format!(
                "{} {:3} {:3} {}: {}",
                tag,
                image.upload_width,
                image.upload_height,
                if image.has_alpha { "a" } else { " " },
                image.name
            ));
        }
        out.push(format!("Total texel count (not counting mipmaps): {}", texels));
        out
    }
}

/// Fill a skin's transparent fringe from (0,0) so mip shrinkage doesn't
/// bleed the fill color into the silhouette.
fn flood_fill_skin(skin: &mut [u8], width: i32, height: i32, palette: &[u32; 256]) {
    const FIFO_SIZE: usize = 0x1000;
    const FIFO_MASK: usize = FIFO_SIZE - 1;

    let fillcolor = skin[0];

    // attempt to find opaque black
    let filledcolor = (0..256)
        .find(|&i| palette[i] == 0xff00_0000)
        .unwrap_or(0) as u8;

    if fillcolor == filledcolor || fillcolor as usize == TRANSPARENT_INDEX {
        return;
    }

    let mut fifo = [(0i16, 0i16); FIFO_SIZE];
    let mut inpt = 1usize;
    let mut outpt = 0usize;

    while outpt != inpt {
        let (x, y) = fifo[outpt];
        let (x, y) = (x as i32, y as i32);
        outpt = (outpt + 1) & FIFO_MASK;
        let mut fdc = filledcolor;

        let mut step = |dx: i32, dy: i32, skin: &mut [u8], inpt: &mut usize, fdc: &mut u8| {
            let pos = ((y + dy) * width + (x + dx)) as usize;
            if skin[pos] == fillcolor {
                skin[pos] = 255;
                fifo[*inpt] = ((x + dx) as i16, (y + dy) as i16);
                *inpt = (*inpt + 1) & FIFO_MASK;
            } else if skin[pos] != 255 {
                *fdc = skin[pos];
            }
        };

        if x > 0 {
            step(-1, 0, skin, &mut inpt, &mut fdc);
        }
        if x < width - 1 {
            step(1, 0, skin, &mut inpt, &mut fdc);
        }
        if y > 0 {
            step(0, -1, skin, &mut inpt, &mut fdc);
        }
        if y < height - 1 {
            step(0, 1, skin, &mut inpt, &mut fdc);
        }

        skin[(y * width + x) as usize] = fdc;
    }
}

/// Fractional-step box resample to new dimensions.
pub fn resample_texture(src: &[u8], sw: i32, sh: i32, dw: i32, dh: i32) -> Vec<u8> {
    let mut out = vec![0u8; (dw * dh * 4) as usize];
    for y in 0..dh {
        let sy = (y * sh / dh).min(sh - 1);
        for x in 0..dw {
            let sx = (x * sw / dw).min(sw - 1);
            let s = ((sy * sw + sx) * 4) as usize;
            let d = ((y * dw + x) * 4) as usize;
            out[d..d + 4].copy_from_slice(&src[s..s + 4]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use q2vk_common::files::MemLoader;

    fn solid_rgba(w: i32, h: i32, px: [u8; 4]) -> Vec<u8> {
        px.repeat((w * h) as usize)
    }

    #[test]
    fn test_alpha_classification() {
        let mut cache = ImageCache::new_headless();
        let opaque = solid_rgba(8, 8, [200, 100, 50, 255]);
        let h = cache.load_pic("pics/opaque", &opaque, 8, 8, ImageType::Wall);
        assert!(!cache.image(h).unwrap().has_alpha);

        let mut translucent = opaque;
        translucent[3] = 128;
        let h = cache.load_pic("pics/trans", &translucent, 8, 8, ImageType::Wall);
        assert!(cache.image(h).unwrap().has_alpha);
    }

    #[test]
    fn test_small_pic_goes_to_scrap() {
        let mut cache = ImageCache::new_headless();
        let data = solid_rgba(16, 16, [1, 2, 3, 255]);
        let h = cache.load_pic("pics/tiny", &data, 16, 16, ImageType::Pic);
        let img = cache.image(h).unwrap();
        assert!(img.scrap);
        assert!(img.sh <= 1.0 && img.th <= 1.0);
    }

    #[test]
    fn test_dim_64_is_not_scrap() {
        let mut cache = ImageCache::new_headless();
        let data = solid_rgba(64, 16, [1, 2, 3, 255]);
        let h = cache.load_pic("pics/wide", &data, 64, 16, ImageType::Pic);
        assert!(!cache.image(h).unwrap().scrap);
        let data = solid_rgba(16, 64, [1, 2, 3, 255]);
        let h = cache.load_pic("pics/tall", &data, 16, 64, ImageType::Pic);
        assert!(!cache.image(h).unwrap().scrap);
    }

    #[test]
    fn test_wall_is_never_scrap() {
        let mut cache = ImageCache::new_headless();
        let data = solid_rgba(16, 16, [1, 2, 3, 255]);
        let h = cache.load_pic("walls/small", &data, 16, 16, ImageType::Wall);
        assert!(!cache.image(h).unwrap().scrap);
    }

    #[test]
    fn test_scrap_rects_disjoint() {
        let mut cache = ImageCache::new_headless();
        let mut rects: Vec<(usize, i32, i32, i32, i32)> = Vec::new();
        for i in 0..24 {
            let data = solid_rgba(40, 40, [i as u8, 0, 0, 255]);
            let h = cache.load_pic(&format!("pics/p{}", i), &data, 40, 40, ImageType::Pic);
            let img = cache.image(h).unwrap();
            if !img.scrap {
                continue;
            }
            let x = (img.sl * BLOCK_WIDTH as f32) as i32;
            let y = (img.tl * BLOCK_HEIGHT as f32) as i32;
            for &(page, ox, oy, ow, oh) in &rects {
                if page != img.scrap_page {
                    continue;
                }
                let overlap =
                    x < ox + ow && ox < x + 40 && y < oy + oh && oy < y + 40;
                assert!(!overlap, "scrap rects overlap");
            }
            rects.push((img.scrap_page, x, y, 40, 40));
        }
        assert!(!rects.is_empty());
    }

    #[test]
    fn test_scrap_full_falls_back_and_logs_once() {
        let mut cache = ImageCache::new_headless();
        // 63x63 blocks: 4 per row per page, 4 rows -> 32 fit in 2 pages
        let mut fell_back = None;
        for i in 0..40 {
            let data = solid_rgba(63, 63, [0, 0, 0, 255]);
            let h = cache.load_pic(&format!("pics/f{}", i), &data, 63, 63, ImageType::Pic);
            if !cache.image(h).unwrap().scrap {
                fell_back = Some(h);
                break;
            }
        }
        let h = fell_back.expect("scrap never filled");
        assert!(cache.image(h).unwrap().gpu_texture.is_none());
        let msgs = cache.drain_messages();
        assert_eq!(msgs.len(), 1);
        assert!(msgs[0].contains("scrap atlas full"));

        // same name again logs nothing
        let name = cache.image(h).unwrap().name.clone();
        let data = solid_rgba(63, 63, [0, 0, 0, 255]);
        cache.load_pic(&name, &data, 63, 63, ImageType::Pic);
        assert!(cache.drain_messages().is_empty());
    }

    #[test]
    fn test_pot_rounding() {
        let mut cache = ImageCache::new_headless();
        let data = solid_rgba(24, 17, [9, 9, 9, 255]);
        let h = cache.load_pic("walls/odd", &data, 24, 17, ImageType::Wall);
        let img = cache.image(h).unwrap();
        assert_eq!(img.upload_width, 32);
        assert_eq!(img.upload_height, 32);
        assert_eq!(img.data.len(), 32 * 32 * 4);
    }

    #[test]
    fn test_pot_round_down_with_mipmap() {
        let mut cache = ImageCache::new_headless();
        cache.round_down = true;
        let data = solid_rgba(24, 17, [9, 9, 9, 255]);
        let h = cache.load_pic("walls/odd2", &data, 24, 17, ImageType::Wall);
        let img = cache.image(h).unwrap();
        assert_eq!(img.upload_width, 16);
        assert_eq!(img.upload_height, 16);
    }

    #[test]
    fn test_picmip_shrinks_walls_not_pics() {
        let mut cache = ImageCache::new_headless();
        cache.picmip = 1;
        let data = solid_rgba(64, 64, [9, 9, 9, 255]);
        let h = cache.load_pic("walls/w", &data, 64, 64, ImageType::Wall);
        assert_eq!(cache.image(h).unwrap().upload_width, 32);
        let h = cache.load_pic("pics/big", &data, 64, 64, ImageType::Pic);
        assert_eq!(cache.image(h).unwrap().upload_width, 64);
    }

    #[test]
    fn test_max_texture_size_clamp() {
        let mut cache = ImageCache::new_headless();
        cache.max_texture_size = 64;
        let data = solid_rgba(256, 256, [9, 9, 9, 255]);
        let h = cache.load_pic("walls/huge", &data, 256, 256, ImageType::Wall);
        assert_eq!(cache.image(h).unwrap().upload_width, 64);
    }

    #[test]
    fn test_sweep_frees_stale_keeps_pics() {
        let mut cache = ImageCache::new_headless();
        let wall = cache.load_pic(
            "walls/old",
            &solid_rgba(8, 8, [1, 1, 1, 255]),
            8,
            8,
            ImageType::Wall,
        );
        let pic = cache.load_pic(
            "pics/hud",
            &solid_rgba(64, 64, [1, 1, 1, 255]),
            64,
            64,
            ImageType::Pic,
        );

        cache.registration_sequence += 1;
        cache.sweep();
        assert!(cache.image(wall).is_none());
        assert!(cache.image(pic).is_some());
    }

    #[test]
    fn test_sweep_idempotent() {
        let mut cache = ImageCache::new_headless();
        cache.load_pic("walls/a", &solid_rgba(8, 8, [0, 0, 0, 255]), 8, 8, ImageType::Wall);
        cache.registration_sequence += 1;
        cache.sweep();
        let count = cache.image_count();
        cache.sweep();
        assert_eq!(cache.image_count(), count);
        cache.sweep();
        assert_eq!(cache.image_count(), count);
    }

    #[test]
    fn test_find_image_extension_priority() {
        let mut loader = MemLoader::new();
        // provide both a TGA and the named PCX; the TGA must win
        let mut tga = vec![0u8; 18];
        tga[2] = 2;
        tga[12..14].copy_from_slice(&1u16.to_le_bytes());
        tga[14..16].copy_from_slice(&1u16.to_le_bytes());
        tga[16] = 24;
        tga.extend_from_slice(&[10, 20, 30]);
        loader.insert("pics/logo.tga", tga);
        loader.insert("pics/logo.pcx", vec![0u8; 4]); // would fail to parse anyway

        let mut cache = ImageCache::new_headless();
        let h = cache
            .find_image("pics/logo.pcx", ImageType::Pic, &loader)
            .expect("tga fallback");
        let img = cache.image(h).unwrap();
        assert_eq!((img.width, img.height), (1, 1));
    }

    #[test]
    fn test_find_image_caches_by_name() {
        let mut loader = MemLoader::new();
        let mut tga = vec![0u8; 18];
        tga[2] = 2;
        tga[12..14].copy_from_slice(&1u16.to_le_bytes());
        tga[14..16].copy_from_slice(&1u16.to_le_bytes());
        tga[16] = 24;
        tga.extend_from_slice(&[1, 2, 3]);
        loader.insert("env/sky.tga", tga);

        let mut cache = ImageCache::new_headless();
        let a = cache.find_image("env/sky.tga", ImageType::Sky, &loader).unwrap();
        let b = cache.find_image("env/sky.tga", ImageType::Sky, &loader).unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.image_count(), 1);
    }

    #[test]
    fn test_palette_transparency() {
        let mut cache = ImageCache::new_headless();
        let h = cache.load_pic8("pics/p8", &[0, 128, 255, 64], 2, 2, ImageType::Pic);
        let img = cache.image(h).unwrap();
        assert!(img.has_alpha); // index 255 expands to transparent
    }

    #[test]
    fn test_gamma_table_identity() {
        let mut cache = ImageCache::new_headless();
        cache.build_gamma_table(1.0);
        assert_eq!(cache.gamma_table()[128], 128);
        cache.build_gamma_table(0.5);
        // brightening gamma raises midtones
        assert!(cache.gamma_table()[128] > 128);
    }

    #[test]
    fn test_resample_preserves_solid_color() {
        let src = solid_rgba(3, 5, [7, 8, 9, 255]);
        let out = resample_texture(&src, 3, 5, 8, 8);
        assert_eq!(out.len(), 8 * 8 * 4);
        assert!(out.chunks_exact(4).all(|px| px == [7, 8, 9, 255]));
    }
}
