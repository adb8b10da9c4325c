//! Terminal output driver.
//!
//! [`TermDriver`] is the narrow surface the render pipeline needs from
//! a terminal: move the cursor, change the pen, print, erase, scroll a
//! rectangle, and toggle a few modes. [`AnsiTerm`] implements it over
//! any [`Write`] with standard ANSI/xterm sequences, which keeps tests
//! able to drive the pipeline against a `Vec<u8>` or a recording mock.

use crate::debug::debug_log;
use crate::pen::{Pen, PenAttr};
use crate::rect::Rect;
use crate::Result;
use std::io::Write;

/// Cursor glyph shapes, as DECSCUSR understands them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CursorShape {
    #[default]
    Block,
    Under,
    LeftBar,
}

/// Terminal mode controls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TermCtl {
    /// Switch the alternate screen buffer on or off.
    AltScreen(bool),
    /// Show or hide the cursor.
    CursorVisible(bool),
    /// Blinking or steady cursor.
    CursorBlink(bool),
    /// Cursor glyph shape.
    CursorShape(CursorShape),
    /// Mouse button/drag reporting.
    Mouse(bool),
}

/// Output operations the render pipeline performs on a terminal.
pub trait TermDriver {
    /// Terminal size as `(lines, cols)`.
    fn size(&self) -> (i32, i32);

    /// Move the cursor to an absolute position, 0-based.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the underlying writer.
    fn goto(&mut self, line: i32, col: i32) -> Result<()>;

    /// Apply `pen` as the current rendering attributes.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the underlying writer.
    fn chpen(&mut self, pen: &Pen) -> Result<()>;

    /// Print text at the cursor, advancing it.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the underlying writer.
    fn print(&mut self, text: &str) -> Result<()>;

    /// Erase `count` cells to the pen background. With `moveend` the
    /// cursor ends after the erased run; otherwise it stays put.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the underlying writer.
    fn erasech(&mut self, count: i32, moveend: bool) -> Result<()>;

    /// Erase the whole screen.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the underlying writer.
    fn clear(&mut self) -> Result<()>;

    /// Scroll the content of `rect` by the given amounts: positive
    /// `downward` moves content up (revealing fresh lines at the
    /// bottom). Returns `Ok(false)` when the terminal cannot scroll
    /// that rectangle, in which case the caller must redraw it.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the underlying writer.
    fn scrollrect(&mut self, rect: Rect, downward: i32, rightward: i32) -> Result<bool>;

    /// Change a terminal mode.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the underlying writer.
    fn setctl(&mut self, ctl: TermCtl) -> Result<()>;

    /// Flush buffered output to the device.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors from the underlying writer.
    fn flush(&mut self) -> Result<()>;
}

/// ANSI escape-sequence driver over any writer.
pub struct AnsiTerm<W: Write> {
    writer: W,
    lines: i32,
    cols: i32,
    cursor_blink: bool,
    cursor_shape: CursorShape,
}

impl<W: Write> AnsiTerm<W> {
    /// Create a driver for a terminal of the given size.
    pub fn new(writer: W, lines: i32, cols: i32) -> Self {
        Self {
            writer,
            lines,
            cols,
            cursor_blink: true,
            cursor_shape: CursorShape::Block,
        }
    }

    /// Update the size after a resize notification.
    pub fn set_size(&mut self, lines: i32, cols: i32) {
        self.lines = lines;
        self.cols = cols;
        debug_log("tm", &format!("resized to {lines}x{cols}"));
    }

    /// Consume the driver, returning the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn write_decscusr(&mut self) -> Result<()> {
        // DECSCUSR pairs blinking/steady per shape.
        let base = match self.cursor_shape {
            CursorShape::Block => 1,
            CursorShape::Under => 3,
            CursorShape::LeftBar => 5,
        };
        let param = if self.cursor_blink { base } else { base + 1 };
        write!(self.writer, "\x1b[{param} q")?;
        Ok(())
    }

    fn sgr_for(pen: &Pen) -> String {
        let mut params = vec!["0".to_string()]; // reset first

        if pen.get_bool(PenAttr::Bold) {
            params.push("1".into());
        }
        if pen.get_bool(PenAttr::Italic) {
            params.push("3".into());
        }
        if pen.get_bool(PenAttr::Under) {
            params.push("4".into());
        }
        if pen.get_bool(PenAttr::Blink) {
            params.push("5".into());
        }
        if pen.get_bool(PenAttr::Reverse) {
            params.push("7".into());
        }
        if pen.get_bool(PenAttr::Strike) {
            params.push("9".into());
        }
        let af = pen.get_int(PenAttr::AltFont);
        if (1..=9).contains(&af) {
            params.push((10 + af).to_string());
        }

        let fg = pen.get_colour(PenAttr::Fg);
        match fg {
            -1 => {}
            0..=7 => params.push((30 + fg).to_string()),
            8..=15 => params.push((90 + fg - 8).to_string()),
            _ => params.push(format!("38;5;{fg}")),
        }
        let bg = pen.get_colour(PenAttr::Bg);
        match bg {
            -1 => {}
            0..=7 => params.push((40 + bg).to_string()),
            8..=15 => params.push((100 + bg - 8).to_string()),
            _ => params.push(format!("48;5;{bg}")),
        }

        format!("\x1b[{}m", params.join(";"))
    }
}

impl<W: Write> TermDriver for AnsiTerm<W> {
    fn size(&self) -> (i32, i32) {
        (self.lines, self.cols)
    }

    fn goto(&mut self, line: i32, col: i32) -> Result<()> {
        write!(self.writer, "\x1b[{};{}H", line + 1, col + 1)?;
        Ok(())
    }

    fn chpen(&mut self, pen: &Pen) -> Result<()> {
        self.writer.write_all(Self::sgr_for(pen).as_bytes())?;
        Ok(())
    }

    fn print(&mut self, text: &str) -> Result<()> {
        self.writer.write_all(text.as_bytes())?;
        Ok(())
    }

    fn erasech(&mut self, count: i32, moveend: bool) -> Result<()> {
        // ECH never moves the cursor; step over the run when asked.
        write!(self.writer, "\x1b[{count}X")?;
        if moveend {
            write!(self.writer, "\x1b[{count}C")?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.writer.write_all(b"\x1b[2J")?;
        Ok(())
    }

    fn scrollrect(&mut self, rect: Rect, downward: i32, rightward: i32) -> Result<bool> {
        // Only full-width vertical scrolls map onto DECSTBM + SU/SD.
        if rightward != 0 || rect.left != 0 || rect.cols != self.cols || downward == 0 {
            return Ok(false);
        }
        write!(self.writer, "\x1b[{};{}r", rect.top + 1, rect.bottom())?;
        if downward > 0 {
            write!(self.writer, "\x1b[{downward}S")?;
        } else {
            write!(self.writer, "\x1b[{}T", -downward)?;
        }
        // Reset the scroll region to the full screen.
        self.writer.write_all(b"\x1b[r")?;
        Ok(true)
    }

    fn setctl(&mut self, ctl: TermCtl) -> Result<()> {
        match ctl {
            TermCtl::AltScreen(on) => {
                let seq: &[u8] = if on { b"\x1b[?1049h" } else { b"\x1b[?1049l" };
                self.writer.write_all(seq)?;
            }
            TermCtl::CursorVisible(on) => {
                let seq: &[u8] = if on { b"\x1b[?25h" } else { b"\x1b[?25l" };
                self.writer.write_all(seq)?;
            }
            TermCtl::CursorBlink(on) => {
                self.cursor_blink = on;
                self.write_decscusr()?;
            }
            TermCtl::CursorShape(shape) => {
                self.cursor_shape = shape;
                self.write_decscusr()?;
            }
            TermCtl::Mouse(on) => {
                let seq: &[u8] = if on {
                    b"\x1b[?1002h\x1b[?1006h"
                } else {
                    b"\x1b[?1006l\x1b[?1002l"
                };
                self.writer.write_all(seq)?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
