// console.rs — console text buffer
//
// A fixed-size ring of character cells organized into lines of `linewidth`
// cells. The renderer reads lines out of it for the dropdown console and
// the timed notify overlay; all input-side concerns (key handling, command
// dispatch) live with the embedding shell.

/// Total character cells in the scrollback ring.
pub const CON_TEXTSIZE: usize = 131072;
/// Number of most-recent lines eligible for the notify overlay.
pub const NUM_CON_TIMES: usize = 4;

/// Fallback width (in cells) before the video system reports a size.
const PREVID_LINEWIDTH: i32 = 76;

/// High bit selects the alternate (green) glyph row of the conchars font.
pub const CHAR_COLOR_MASK: u8 = 0x80;

pub struct Console {
    pub initialized: bool,
    text: Vec<u8>,
    /// line where next message will be printed
    pub current: i32,
    /// offset in current line for next print
    pub x: i32,
    /// bottom of console displays this line
    pub display: i32,
    /// OR'd into every printed char (alt-color mode)
    pub ormask: u8,
    pub linewidth: i32,
    pub totallines: i32,
    /// realtime (ms) the line was last touched, for the notify overlay
    times: [f32; NUM_CON_TIMES],
    /// carriage-return pending: next print overwrites the current line
    cr_pending: bool,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        let mut con = Self {
            initialized: false,
            text: vec![b' '; CON_TEXTSIZE],
            current: 0,
            x: 0,
            display: 0,
            ormask: 0,
            linewidth: 0,
            totallines: 0,
            times: [0.0; NUM_CON_TIMES],
            cr_pending: false,
        };
        con.check_resize(0);
        con.initialized = true;
        con
    }

    /// If the line width has changed, reformat the buffer. Existing lines
    /// are copied back in at the new width; the oldest content is lost if
    /// the reflowed text would overflow the ring.
    pub fn check_resize(&mut self, vid_width: i32) {
        let width = (vid_width >> 3) - 2;
        if width == self.linewidth {
            return;
        }

        if width < 1 {
            // video hasn't been initialized yet
            self.linewidth = PREVID_LINEWIDTH;
            self.totallines = CON_TEXTSIZE as i32 / self.linewidth;
            self.text.fill(b' ');
        } else {
            let oldwidth = self.linewidth;
            self.linewidth = width;
            let oldtotallines = self.totallines;
            self.totallines = CON_TEXTSIZE as i32 / self.linewidth;

            let numlines = oldtotallines.min(self.totallines);
            let numchars = oldwidth.min(self.linewidth);

            let tbuf = std::mem::replace(&mut self.text, vec![b' '; CON_TEXTSIZE]);
            for i in 0..numlines {
                for j in 0..numchars {
                    let dst = ((self.totallines - 1 - i) * self.linewidth + j) as usize;
                    let src = (((self.current - i + oldtotallines) % oldtotallines) * oldwidth
                        + j) as usize;
                    self.text[dst] = tbuf[src];
                }
            }

            self.clear_notify();
        }

        self.current = self.totallines - 1;
        self.display = self.current;
    }

    fn linefeed(&mut self) {
        self.x = 0;
        if self.display == self.current {
            self.display += 1;
        }
        self.current += 1;
        let start = (self.current % self.totallines) * self.linewidth;
        self.text[start as usize..(start + self.linewidth) as usize].fill(b' ');
    }

    /// Handles word wrap and \n / \r; all console output goes through here.
    pub fn print(&mut self, txt: &str, realtime_ms: f32) {
        let mut bytes = txt.as_bytes();

        // high ascii tag chars select the alternate color row
        let mask = if !bytes.is_empty() && (bytes[0] == 1 || bytes[0] == 2) {
            bytes = &bytes[1..];
            CHAR_COLOR_MASK
        } else {
            0
        };

        let mut i = 0;
        while i < bytes.len() {
            let c = bytes[i];

            // count word length
            let mut l = 0;
            while l < self.linewidth as usize {
                match bytes.get(i + l) {
                    Some(&ch) if ch > b' ' => l += 1,
                    _ => break,
                }
            }

            // word wrap
            if l != self.linewidth as usize && self.x + l as i32 > self.linewidth {
                self.x = 0;
            }

            if self.cr_pending {
                self.current -= 1;
                self.cr_pending = false;
            }

            if self.x == 0 {
                self.linefeed();
            }

            match c {
                b'\n' => self.x = 0,
                b'\r' => {
                    self.x = 0;
                    self.cr_pending = true;
                }
                _ => {
                    let y = self.current % self.totallines;
                    self.text[(y * self.linewidth + self.x) as usize] = c | mask | self.ormask;
                    self.x += 1;
                    if self.x >= self.linewidth {
                        self.x = 0;
                    }
                }
            }

            // mark time for the notify overlay
            self.times[(self.current % NUM_CON_TIMES as i32) as usize] = realtime_ms;

            i += 1;
        }
    }

    /// The text cells of an absolute line number (wrapping into the ring).
    pub fn line(&self, linenum: i32) -> &[u8] {
        let y = ((linenum % self.totallines) + self.totallines) % self.totallines;
        let start = (y * self.linewidth) as usize;
        &self.text[start..start + self.linewidth as usize]
    }

    /// Lines to draw in the notify overlay: the most recent NUM_CON_TIMES
    /// lines whose timestamp is within `notify_time` seconds of now.
    pub fn notify_lines(&self, realtime_ms: f32, notify_time_sec: f32) -> Vec<&[u8]> {
        let mut out = Vec::new();
        let first = (self.current - NUM_CON_TIMES as i32 + 1).max(0);
        for i in first..=self.current {
            let time = self.times[(i % NUM_CON_TIMES as i32) as usize];
            if time == 0.0 {
                continue;
            }
            if realtime_ms - time > notify_time_sec * 1000.0 {
                continue;
            }
            out.push(self.line(i));
        }
        out
    }

    pub fn clear_notify(&mut self) {
        self.times = [0.0; NUM_CON_TIMES];
    }

    pub fn clear(&mut self) {
        self.text.fill(b' ');
        self.display = self.current;
        self.x = 0;
    }

    /// Scroll the display window; clamped to the ring contents.
    pub fn scroll(&mut self, lines: i32) {
        self.display += lines;
        if self.display > self.current {
            self.display = self.current;
        }
        let oldest = self.current - self.totallines + 1;
        if self.display < oldest {
            self.display = oldest;
        }
    }

    /// The input cursor blinks with realtime.
    pub fn cursor_visible(realtime_ms: i32) -> bool {
        (realtime_ms >> 8) & 1 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_str(con: &Console, linenum: i32) -> String {
        String::from_utf8_lossy(con.line(linenum))
            .trim_end()
            .to_string()
    }

    fn sized_console(width_px: i32) -> Console {
        let mut con = Console::new();
        con.check_resize(width_px);
        con
    }

    #[test]
    fn test_print_simple_line() {
        let mut con = sized_console(640);
        con.print("hello world\n", 0.0);
        assert_eq!(line_str(&con, con.current), "hello world");
    }

    #[test]
    fn test_linewidth_from_vid_width() {
        let con = sized_console(640);
        assert_eq!(con.linewidth, (640 >> 3) - 2);
        assert_eq!(con.totallines, CON_TEXTSIZE as i32 / con.linewidth);
    }

    #[test]
    fn test_word_wrap() {
        let mut con = sized_console(88); // linewidth 9
        assert_eq!(con.linewidth, 9);
        con.print("aaaa bbbb cccc\n", 0.0);
        // "cccc" doesn't fit after "aaaa bbbb" on a 9-cell line
        let all: Vec<String> = (0..4).map(|i| line_str(&con, con.current - i)).collect();
        assert!(all.iter().any(|l| l == "aaaa bbbb"), "lines: {:?}", all);
        assert!(all.iter().any(|l| l.trim() == "cccc"), "lines: {:?}", all);
    }

    #[test]
    fn test_reflow_preserves_recent_lines() {
        let mut con = sized_console(640);
        con.print("first\n", 0.0);
        con.print("second\n", 0.0);
        con.check_resize(320);
        let all: Vec<String> = (0..6).map(|i| line_str(&con, con.current - i)).collect();
        assert!(all.iter().any(|l| l == "first"), "lines: {:?}", all);
        assert!(all.iter().any(|l| l == "second"), "lines: {:?}", all);
    }

    #[test]
    fn test_reflow_same_width_is_noop() {
        let mut con = sized_console(640);
        con.print("stays\n", 0.0);
        let before = con.current;
        con.check_resize(640);
        assert_eq!(con.current, before);
        assert_eq!(line_str(&con, con.current), "stays");
    }

    #[test]
    fn test_ring_overflow_drops_oldest() {
        let mut con = sized_console(640);
        for i in 0..con.totallines + 8 {
            con.print(&format!("line{}\n", i), 0.0);
        }
        // the newest line is intact; a line from the start has been reused
        let last = con.totallines + 7;
        assert_eq!(line_str(&con, con.current), format!("line{}", last));
        assert_ne!(line_str(&con, con.current + 1), "line0");
    }

    #[test]
    fn test_notify_expiry() {
        let mut con = sized_console(640);
        con.print("old\n", 1000.0);
        con.print("new\n", 4500.0);
        // at t=5000 with a 3s window only "new" is still fresh
        let vis = con.notify_lines(5000.0, 3.0);
        assert_eq!(vis.len(), 1);
        assert!(String::from_utf8_lossy(vis[0]).starts_with("new"));
        let vis = con.notify_lines(9000.0, 3.0);
        assert!(vis.is_empty());
    }

    #[test]
    fn test_clear_notify() {
        let mut con = sized_console(640);
        con.print("msg\n", 1000.0);
        con.clear_notify();
        assert!(con.notify_lines(1000.0, 3.0).is_empty());
    }

    #[test]
    fn test_alt_color_mask() {
        let mut con = sized_console(640);
        con.print("\u{1}chat\n", 0.0);
        let line = con.line(con.current);
        assert_eq!(line[0], b'c' | CHAR_COLOR_MASK);
    }

    #[test]
    fn test_carriage_return_overwrites() {
        let mut con = sized_console(640);
        con.print("aaaa\rbb\n", 0.0);
        let s = line_str(&con, con.current);
        assert!(s.starts_with("bb"));
    }

    #[test]
    fn test_cursor_blink() {
        assert!(!Console::cursor_visible(0));
        assert!(Console::cursor_visible(256));
        assert!(!Console::cursor_visible(512));
        assert!(Console::cursor_visible(768));
    }

    #[test]
    fn test_scroll_clamps() {
        let mut con = sized_console(640);
        for i in 0..10 {
            con.print(&format!("l{}\n", i), 0.0);
        }
        con.scroll(100);
        assert_eq!(con.display, con.current);
        con.scroll(-(con.totallines + 50));
        assert_eq!(con.display, con.current - con.totallines + 1);
    }
}
