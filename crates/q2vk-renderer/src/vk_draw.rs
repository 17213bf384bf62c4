// vk_draw.rs — 2D overlay drawing
//
// Builds a quad batch for the UI pass: console text, notify lines, pics,
// fills. The conchars font is a 16x16 glyph grid; the high bit of a
// character selects the alternate color row.

use q2vk_common::q_shared::VidDef;
use q2vk_client::console::Console;

use crate::vk_image::ImageCache;

/// One textured 2D quad in screen pixels.
#[derive(Debug, Clone, Copy)]
pub struct DrawQuad {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    /// texcoords into `image`, honoring scrap placement
    pub sl: f32,
    pub tl: f32,
    pub sh: f32,
    pub th: f32,
    /// None = untextured fill
    pub image: Option<u32>,
    pub color: [f32; 4],
}

/// The overlay quad batch for one frame.
#[derive(Debug, Default)]
pub struct Draw2d {
    quads: Vec<DrawQuad>,
    /// conchars image; glyphs are an 8x8 cell in a 16x16 grid
    pub char_image: Option<u32>,
}

impl Draw2d {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.quads.clear();
    }

    pub fn quads(&self) -> &[DrawQuad] {
        &self.quads
    }

    /// Draw one glyph. Spaces are transparent and emit nothing.
    pub fn draw_char(&mut self, x: i32, y: i32, num: i32) {
        let num = num & 255;
        if (num & 127) == 32 {
            return; // space
        }
        if y <= -8 {
            return; // totally off screen
        }

        let row = (num >> 4) as f32;
        let col = (num & 15) as f32;
        let frow = row * 0.0625;
        let fcol = col * 0.0625;

        self.quads.push(DrawQuad {
            x: x as f32,
            y: y as f32,
            w: 8.0,
            h: 8.0,
            sl: fcol,
            tl: frow,
            sh: fcol + 0.0625,
            th: frow + 0.0625,
            image: self.char_image,
            color: [1.0; 4],
        });
    }

    pub fn draw_string(&mut self, x: i32, y: i32, s: &str) {
        let mut x = x;
        for ch in s.bytes() {
            self.draw_char(x, y, ch as i32);
            x += 8;
        }
    }

    /// Raw console cells (already carry the color bit).
    pub fn draw_cells(&mut self, x: i32, y: i32, cells: &[u8]) {
        let mut x = x;
        for &c in cells {
            self.draw_char(x, y, c as i32);
            x += 8;
        }
    }

    /// A pic at its natural size.
    pub fn draw_pic(&mut self, x: i32, y: i32, handle: u32, images: &ImageCache) {
        let Some(img) = images.image(handle) else {
            return;
        };
        self.quads.push(DrawQuad {
            x: x as f32,
            y: y as f32,
            w: img.width as f32,
            h: img.height as f32,
            sl: img.sl,
            tl: img.tl,
            sh: img.sh,
            th: img.th,
            image: Some(handle),
            color: [1.0; 4],
        });
    }

    pub fn draw_stretch_pic(
        &mut self,
        x: i32,
        y: i32,
        w: i32,
        h: i32,
        handle: u32,
        images: &ImageCache,
    ) {
        let Some(img) = images.image(handle) else {
            return;
        };
        self.quads.push(DrawQuad {
            x: x as f32,
            y: y as f32,
            w: w as f32,
            h: h as f32,
            sl: img.sl,
            tl: img.tl,
            sh: img.sh,
            th: img.th,
            image: Some(handle),
            color: [1.0; 4],
        });
    }

    /// Untextured rectangle from a palette color.
    pub fn draw_fill(&mut self, x: i32, y: i32, w: i32, h: i32, color_index: u8, images: &ImageCache) {
        let c = images.d_8to24table[color_index as usize];
        let [r, g, b, _a] = c.to_le_bytes();
        self.quads.push(DrawQuad {
            x: x as f32,
            y: y as f32,
            w: w as f32,
            h: h as f32,
            sl: 0.0,
            tl: 0.0,
            sh: 0.0,
            th: 0.0,
            image: None,
            color: [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, 1.0],
        });
    }

    /// Dim the whole screen (menus).
    pub fn fade_screen(&mut self, vid: &VidDef) {
        self.quads.push(DrawQuad {
            x: 0.0,
            y: 0.0,
            w: vid.width as f32,
            h: vid.height as f32,
            sl: 0.0,
            tl: 0.0,
            sh: 0.0,
            th: 0.0,
            image: None,
            color: [0.0, 0.0, 0.0, 0.8],
        });
    }

    /// The dropdown console: background fill plus the visible tail of the
    /// scrollback, bottom-aligned.
    pub fn draw_console(&mut self, con: &Console, frac: f32, vid: &VidDef) {
        let lines = (vid.height as f32 * frac) as i32;
        if lines <= 0 {
            return;
        }

        self.quads.push(DrawQuad {
            x: 0.0,
            y: (lines - vid.height) as f32,
            w: vid.width as f32,
            h: vid.height as f32,
            sl: 0.0,
            tl: 0.0,
            sh: 1.0,
            th: 1.0,
            image: None,
            color: [0.0, 0.0, 0.0, 0.675],
        });

        // text rows up from the bottom
        let rows = (lines - 22) >> 3;
        let mut y = lines - 30;
        for i in 0..rows {
            let line = con.display - i;
            if line < 0 || con.current - line >= con.totallines {
                break;
            }
            self.draw_cells(8, y, con.line(line));
            y -= 8;
        }
    }

    /// The timed notify overlay at the top of the screen.
    pub fn draw_notify(&mut self, con: &Console, realtime_ms: f32, notify_time_sec: f32) {
        let mut y = 0;
        for cells in con.notify_lines(realtime_ms, notify_time_sec) {
            self.draw_cells(8, y, cells);
            y += 8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_grid_coords() {
        let mut d = Draw2d::new();
        d.draw_char(0, 0, 'A' as i32); // 65 = row 4, col 1
        let q = d.quads()[0];
        assert!((q.sl - 1.0 * 0.0625).abs() < 1e-6);
        assert!((q.tl - 4.0 * 0.0625).abs() < 1e-6);
        assert!((q.sh - q.sl - 0.0625).abs() < 1e-6);
    }

    #[test]
    fn test_space_emits_nothing() {
        let mut d = Draw2d::new();
        d.draw_char(0, 0, 32);
        d.draw_char(0, 0, 32 | 128); // alt-color space is still a space
        assert!(d.quads().is_empty());
    }

    #[test]
    fn test_draw_string_advances() {
        let mut d = Draw2d::new();
        d.draw_string(8, 0, "ok");
        assert_eq!(d.quads().len(), 2);
        assert_eq!(d.quads()[0].x, 8.0);
        assert_eq!(d.quads()[1].x, 16.0);
    }

    #[test]
    fn test_offscreen_char_culled() {
        let mut d = Draw2d::new();
        d.draw_char(0, -9, 'x' as i32);
        assert!(d.quads().is_empty());
    }

    #[test]
    fn test_console_emits_background_and_text() {
        let mut con = Console::new();
        con.check_resize(640);
        con.print("hello\n", 0.0);
        let mut d = Draw2d::new();
        d.draw_console(&con, 0.5, &VidDef { width: 640, height: 480 });
        // background fill plus at least the word "hello"
        assert!(d.quads().len() >= 6);
        assert!(d.quads()[0].image.is_none());
    }

    #[test]
    fn test_notify_rows_stack() {
        let mut con = Console::new();
        con.check_resize(640);
        con.print("one\n", 100.0);
        con.print("two\n", 100.0);
        let mut d = Draw2d::new();
        d.draw_notify(&con, 200.0, 3.0);
        let ys: Vec<f32> = d.quads().iter().map(|q| q.y).collect();
        assert!(ys.contains(&0.0));
        assert!(ys.contains(&8.0));
    }
}
