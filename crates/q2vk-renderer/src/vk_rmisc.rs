// vk_rmisc.rs — screenshots and placeholder assets

use std::io::Write;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use q2vk_common::q_shared::ParticleClass;

use crate::error::RdError;
use crate::vk_image::{ImageCache, ImageType};
use crate::vk_local::{particle_params, PARTICLE_DRAW_PARAMS};

// ============================================================
// Placeholder assets
// ============================================================

/// Loud stand-ins for missing assets: a red checkerboard wall texture, a
/// solid cyan UI pic, and the radial-alpha particle dot. Problems stay
/// visible without crashing.
pub struct Placeholders {
    pub notexture: u32,
    pub nopic: u32,
    pub particles: [u32; PARTICLE_DRAW_PARAMS.len()],
}

pub fn init_placeholders(
    images: &mut ImageCache,
    loader: &dyn q2vk_common::files::FileLoader,
) -> Placeholders {
    // 16x16 red/black checkerboard
    let mut data = vec![0u8; 16 * 16 * 4];
    for y in 0..16 {
        for x in 0..16 {
            let i = (y * 16 + x) * 4;
            let red = ((x / 4) + (y / 4)) % 2 == 0;
            data[i] = if red { 255 } else { 0 };
            data[i + 3] = 255;
        }
    }
    let notexture = images.load_pic("***r_notexture***", &data, 16, 16, ImageType::Wall);

    // solid cyan UI quad
    let cyan: Vec<u8> = [0u8, 255, 255, 255].repeat(64 * 64);
    let nopic = images.load_pic("***r_nopic***", &cyan, 64, 64, ImageType::Pic);

    // particle dot: radial alpha falloff
    let mut dot = vec![0u8; 16 * 16 * 4];
    for y in 0..16i32 {
        for x in 0..16i32 {
            let d2 = (x - 8) * (x - 8) + (y - 8) * (y - 8);
            let alpha = (255 - 4 * d2).max(0) as u8;
            let i = ((y * 16 + x) * 4) as usize;
            if alpha > 0 {
                dot[i] = 255;
                dot[i + 1] = 255;
                dot[i + 2] = 255;
            }
            dot[i + 3] = alpha;
        }
    }

    const CLASSES: [ParticleClass; 5] = [
        ParticleClass::Default,
        ParticleClass::Fire,
        ParticleClass::Smoke,
        ParticleClass::Bubble,
        ParticleClass::Blood,
    ];
    let mut particles = [0u32; PARTICLE_DRAW_PARAMS.len()];
    for (slot, class) in particles.iter_mut().zip(CLASSES) {
        let params = particle_params(class);
        *slot = match images.find_image(&format!("{}.png", params.texture), ImageType::Sprite, loader)
        {
            Some(h) => h,
            None => images.load_pic(&format!("***{}***", params.texture), &dot, 16, 16, ImageType::Sprite),
        };
    }

    Placeholders { notexture, nopic, particles }
}

// ============================================================
// Screenshot
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenshotFormat {
    Tga,
    Png,
    Jpg,
}

impl ScreenshotFormat {
    pub fn from_cvar(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "png" => ScreenshotFormat::Png,
            "jpg" | "jpeg" => ScreenshotFormat::Jpg,
            _ => ScreenshotFormat::Tga,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ScreenshotFormat::Tga => "tga",
            ScreenshotFormat::Png => "png",
            ScreenshotFormat::Jpg => "jpg",
        }
    }
}

/// Write the post-composite frame to `<gamedir>/scrnshot/quakeNN.<ext>`,
/// picking the first free NN in 0..99. `rgb` is tightly packed RGB rows,
/// top-down. When hardware gamma is active the caller passes the inverse
/// table so the file matches the screen.
pub fn write_screenshot(
    gamedir: &str,
    rgb: &[u8],
    width: usize,
    height: usize,
    format: ScreenshotFormat,
    jpeg_quality: u8,
    gamma_table: Option<&[u8; 256]>,
) -> Result<String, RdError> {
    if rgb.len() < width * height * 3 {
        return Err(RdError::MalformedAsset("screenshot buffer too small".to_string()));
    }

    let dir = format!("{}/scrnshot", gamedir);
    std::fs::create_dir_all(&dir)
        .map_err(|e| RdError::MalformedAsset(format!("scrnshot dir: {}", e)))?;

    // find a file name to save it to
    let mut picname = None;
    for i in 0..100 {
        let name = format!("quake{:02}.{}", i, format.extension());
        if !Path::new(&dir).join(&name).exists() {
            picname = Some(name);
            break;
        }
    }
    let Some(picname) = picname else {
        return Err(RdError::MalformedAsset(
            "SCR_ScreenShot_f: Couldn't create a file".to_string(),
        ));
    };
    let fullpath = format!("{}/{}", dir, picname);

    let mut pixels = rgb[..width * height * 3].to_vec();
    if let Some(table) = gamma_table {
        for p in &mut pixels {
            *p = table[*p as usize];
        }
    }

    match format {
        ScreenshotFormat::Tga => {
            // uncompressed type 2, 24-bit BGR, bottom-left origin
            let mut buffer = vec![0u8; 18 + width * height * 3];
            buffer[2] = 2;
            buffer[12] = (width & 0xff) as u8;
            buffer[13] = (width >> 8) as u8;
            buffer[14] = (height & 0xff) as u8;
            buffer[15] = (height >> 8) as u8;
            buffer[16] = 24;

            for y in 0..height {
                let src_row = y * width * 3;
                let dst_row = 18 + (height - 1 - y) * width * 3;
                for x in 0..width {
                    let s = src_row + x * 3;
                    let d = dst_row + x * 3;
                    buffer[d] = pixels[s + 2];
                    buffer[d + 1] = pixels[s + 1];
                    buffer[d + 2] = pixels[s];
                }
            }

            let mut f = std::fs::File::create(&fullpath)
                .map_err(|e| RdError::MalformedAsset(format!("{}: {}", fullpath, e)))?;
            f.write_all(&buffer)
                .map_err(|e| RdError::MalformedAsset(format!("{}: {}", fullpath, e)))?;
        }
        ScreenshotFormat::Png => {
            image::save_buffer(
                &fullpath,
                &pixels,
                width as u32,
                height as u32,
                image::ExtendedColorType::Rgb8,
            )
            .map_err(|e| RdError::MalformedAsset(format!("{}: {}", fullpath, e)))?;
        }
        ScreenshotFormat::Jpg => {
            let f = std::fs::File::create(&fullpath)
                .map_err(|e| RdError::MalformedAsset(format!("{}: {}", fullpath, e)))?;
            let mut encoder = JpegEncoder::new_with_quality(f, jpeg_quality.clamp(1, 100));
            encoder
                .encode(&pixels, width as u32, height as u32, image::ExtendedColorType::Rgb8)
                .map_err(|e| RdError::MalformedAsset(format!("{}: {}", fullpath, e)))?;
        }
    }

    Ok(picname)
}

#[cfg(test)]
mod tests {
    use super::*;
    use q2vk_common::qfiles::tga_decode;

    fn temp_gamedir(tag: &str) -> String {
        let dir = std::env::temp_dir().join(format!("q2vk_sshot_{}_{}", tag, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir.to_string_lossy().into_owned()
    }

    fn test_frame(w: usize, h: usize) -> Vec<u8> {
        let mut rgb = vec![0u8; w * h * 3];
        for y in 0..h {
            for x in 0..w {
                let i = (y * w + x) * 3;
                rgb[i] = (x * 37) as u8;
                rgb[i + 1] = (y * 59) as u8;
                rgb[i + 2] = ((x + y) * 11) as u8;
            }
        }
        rgb
    }

    #[test]
    fn test_screenshot_naming_sequence() {
        let gamedir = temp_gamedir("naming");
        let dir = format!("{}/scrnshot", gamedir);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..5 {
            std::fs::write(format!("{}/quake{:02}.tga", dir, i), b"x").unwrap();
        }

        let rgb = test_frame(4, 4);
        let name =
            write_screenshot(&gamedir, &rgb, 4, 4, ScreenshotFormat::Tga, 85, None).unwrap();
        assert_eq!(name, "quake05.tga");
    }

    #[test]
    fn test_screenshot_all_slots_full() {
        let gamedir = temp_gamedir("full");
        let dir = format!("{}/scrnshot", gamedir);
        std::fs::create_dir_all(&dir).unwrap();
        for i in 0..100 {
            std::fs::write(format!("{}/quake{:02}.tga", dir, i), b"x").unwrap();
        }

        let rgb = test_frame(4, 4);
        let err = write_screenshot(&gamedir, &rgb, 4, 4, ScreenshotFormat::Tga, 85, None);
        match err {
            Err(RdError::MalformedAsset(msg)) => assert!(msg.contains("Couldn't create a file")),
            other => panic!("expected failure, got {:?}", other),
        }
        // and no file was written
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 100);
    }

    #[test]
    fn test_tga_roundtrip_bit_exact() {
        let gamedir = temp_gamedir("roundtrip");
        let (w, h) = (16, 8);
        let rgb = test_frame(w, h);
        let name =
            write_screenshot(&gamedir, &rgb, w, h, ScreenshotFormat::Tga, 85, None).unwrap();

        let raw = std::fs::read(format!("{}/scrnshot/{}", gamedir, name)).unwrap();
        let decoded = tga_decode(&raw).unwrap();
        assert_eq!((decoded.width, decoded.height), (w, h));
        // decoder returns top-left RGBA; the screenshot was top-down RGB
        for i in 0..w * h {
            assert_eq!(decoded.pixels[i * 4], rgb[i * 3]);
            assert_eq!(decoded.pixels[i * 4 + 1], rgb[i * 3 + 1]);
            assert_eq!(decoded.pixels[i * 4 + 2], rgb[i * 3 + 2]);
        }
    }

    #[test]
    fn test_gamma_table_applied() {
        let gamedir = temp_gamedir("gamma");
        let rgb = vec![100u8; 4 * 4 * 3];
        let mut table = [0u8; 256];
        for (i, t) in table.iter_mut().enumerate() {
            *t = (i / 2) as u8;
        }
        let name =
            write_screenshot(&gamedir, &rgb, 4, 4, ScreenshotFormat::Tga, 85, Some(&table))
                .unwrap();
        let raw = std::fs::read(format!("{}/scrnshot/{}", gamedir, name)).unwrap();
        let decoded = tga_decode(&raw).unwrap();
        assert_eq!(decoded.pixels[0], 50);
    }

    #[test]
    fn test_png_and_jpg_written() {
        let gamedir = temp_gamedir("codecs");
        let rgb = test_frame(8, 8);
        let png = write_screenshot(&gamedir, &rgb, 8, 8, ScreenshotFormat::Png, 85, None).unwrap();
        assert!(png.ends_with(".png"));
        let jpg = write_screenshot(&gamedir, &rgb, 8, 8, ScreenshotFormat::Jpg, 90, None).unwrap();
        assert!(jpg.ends_with(".jpg"));

        // png decodes back to the same pixel grid
        let raw = std::fs::read(format!("{}/scrnshot/{}", gamedir, png)).unwrap();
        let img = image::load_from_memory(&raw).unwrap().to_rgb8();
        assert_eq!(img.as_raw()[..], rgb[..]);
    }

    #[test]
    fn test_format_from_cvar() {
        assert_eq!(ScreenshotFormat::from_cvar("png"), ScreenshotFormat::Png);
        assert_eq!(ScreenshotFormat::from_cvar("JPEG"), ScreenshotFormat::Jpg);
        assert_eq!(ScreenshotFormat::from_cvar("tga"), ScreenshotFormat::Tga);
        assert_eq!(ScreenshotFormat::from_cvar(""), ScreenshotFormat::Tga);
    }

    #[test]
    fn test_placeholders_built() {
        let mut images = ImageCache::new_headless();
        let loader = q2vk_common::files::MemLoader::new();
        let ph = init_placeholders(&mut images, &loader);
        let no = images.image(ph.notexture).unwrap();
        assert_eq!(no.itype, ImageType::Wall);
        let pic = images.image(ph.nopic).unwrap();
        assert!(!pic.scrap); // 64x64 never goes to the atlas
        assert_eq!(ph.particles.len(), 5);
    }
}
