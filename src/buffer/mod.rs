//! Off-screen cell grid with scoped render state and minimal-delta
//! flushing.
//!
//! A [`RenderBuffer`] is where drawing happens: a lines×cols grid of
//! [`Cell`]s, every one initially *skip* (transparent). Write
//! operations go through the buffer's current render state —
//! translation offset, clip rect, mask regions and pen — so callers
//! can be handed a buffer that only lets them draw into their own
//! region. State is scoped with [`RenderBuffer::save`] /
//! [`RenderBuffer::restore`]; content is composited across buffers
//! with [`RenderBuffer::blit`] and sent to a terminal with
//! [`RenderBuffer::flush_to_term`], which only emits cells that carry
//! content and only moves the cursor or changes the pen when it must.

mod cell;
mod line;

pub use cell::{Cell, CellKind};
pub use line::{LineCaps, LineMask, LineStyle};

use crate::debug::debug_log;
use crate::pen::Pen;
use crate::rect::Rect;
use crate::term::TermDriver;
use crate::Result;
use std::cell::RefCell;
use std::rc::Rc;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

/// Shared handle to a render buffer, as passed to expose callbacks.
///
/// Callbacks may retain the handle past dispatch; the render pass
/// composites whatever was drawn by the time it resumes.
pub type BufferHandle = Rc<RefCell<RenderBuffer>>;

/// One saved state frame. `save` pushes everything scoped;
/// `save_pen` pushes only the pen, sharing translation and clip with
/// the enclosing frame.
enum SavedState {
    Full {
        xlate: (i32, i32),
        clip: Option<Rect>,
        pen: Pen,
    },
    PenOnly(Pen),
}

/// Reconstructed run of identically-penned cells, for diagnostics and
/// compositing. See [`RenderBuffer::span_at`].
#[derive(Clone, Debug)]
pub struct SpanInfo {
    /// Whether the run carries content (text/erase/line) or is skip.
    pub is_active: bool,
    /// Columns the run covers.
    pub n_columns: i32,
    /// Text of the run; empty for skip and erase runs.
    pub text: String,
    /// Pen of the run; `None` for skip runs.
    pub pen: Option<Pen>,
}

/// An off-screen cell grid. See the module docs.
pub struct RenderBuffer {
    lines: i32,
    cols: i32,
    cells: Vec<Cell>,
    xlate: (i32, i32),
    /// Current clip in buffer-absolute coordinates; `None` once
    /// clipped down to nothing.
    clip: Option<Rect>,
    /// Regions writes must not touch, buffer-absolute. Only `reset`
    /// clears these.
    masks: Vec<Rect>,
    pen: Pen,
    cursor: Option<(i32, i32)>,
    stack: Vec<SavedState>,
}

impl std::fmt::Debug for RenderBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderBuffer")
            .field("lines", &self.lines)
            .field("cols", &self.cols)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}

impl RenderBuffer {
    /// Create a buffer with every cell skip.
    ///
    /// # Panics
    ///
    /// Panics if either dimension is not positive; a zero-sized buffer
    /// is a caller bug at this layer.
    #[must_use]
    pub fn new(lines: i32, cols: i32) -> Self {
        assert!(
            lines > 0 && cols > 0,
            "render buffer dimensions must be positive, got {lines}x{cols}"
        );
        Self {
            lines,
            cols,
            cells: vec![Cell::skip(); (lines as usize) * (cols as usize)],
            xlate: (0, 0),
            clip: Some(Rect::new(0, 0, lines, cols)),
            masks: Vec::new(),
            pen: Pen::new(),
            cursor: None,
            stack: Vec::new(),
        }
    }

    /// Create a buffer already wrapped in a shareable handle.
    #[must_use]
    pub fn new_handle(lines: i32, cols: i32) -> BufferHandle {
        Rc::new(RefCell::new(Self::new(lines, cols)))
    }

    /// Buffer size as `(lines, cols)`.
    #[must_use]
    pub const fn size(&self) -> (i32, i32) {
        (self.lines, self.cols)
    }

    fn index(&self, line: i32, col: i32) -> Option<usize> {
        if line < 0 || line >= self.lines || col < 0 || col >= self.cols {
            None
        } else {
            Some((line as usize) * (self.cols as usize) + col as usize)
        }
    }

    /// Whether a buffer-absolute cell may be written under the current
    /// clip and masks.
    fn writable(&self, line: i32, col: i32) -> bool {
        let Some(clip) = self.clip else { return false };
        if !clip.contains_cell(line, col) {
            return false;
        }
        if self.masks.iter().any(|m| m.contains_cell(line, col)) {
            return false;
        }
        self.index(line, col).is_some()
    }

    // ------------------------------------------------------------------
    // Render state
    // ------------------------------------------------------------------

    /// Add to the current translation offset.
    pub fn translate(&mut self, downward: i32, rightward: i32) {
        self.xlate.0 += downward;
        self.xlate.1 += rightward;
    }

    /// Intersect the current clip with `rect` (given in translated
    /// coordinates). Not independently stackable; scope with `save`.
    pub fn clip(&mut self, rect: Rect) {
        let abs = rect.translated(self.xlate.0, self.xlate.1);
        self.clip = self.clip.and_then(|c| c.intersect(&abs));
    }

    /// Forbid writes inside `rect` (translated coordinates),
    /// regardless of clip. Masks accumulate and survive save/restore;
    /// only [`RenderBuffer::reset`] removes them.
    pub fn mask(&mut self, rect: Rect) {
        self.masks.push(rect.translated(self.xlate.0, self.xlate.1));
    }

    /// Set the pen applied to subsequent writes.
    ///
    /// The value is snapshotted; later mutation of `pen` by the caller
    /// does not affect the buffer.
    pub fn set_pen(&mut self, pen: &Pen) {
        self.pen = pen.clone_value();
    }

    /// Snapshot of the current pen.
    ///
    /// A detached copy: mutating it affects neither the buffer's
    /// current pen nor any already-written cell.
    #[must_use]
    pub fn pen(&self) -> Pen {
        self.pen.clone_value()
    }

    /// Push the full render state: translation, clip and pen.
    pub fn save(&mut self) {
        self.stack.push(SavedState::Full {
            xlate: self.xlate,
            clip: self.clip,
            pen: self.pen.clone_value(),
        });
    }

    /// Push only the pen, leaving translation and clip shared with the
    /// enclosing frame.
    pub fn save_pen(&mut self) {
        self.stack.push(SavedState::PenOnly(self.pen.clone_value()));
    }

    /// Pop the most recent `save`/`save_pen` frame.
    ///
    /// # Panics
    ///
    /// Panics on restore without a matching save; unbalanced scoping
    /// is a caller bug.
    pub fn restore(&mut self) {
        match self.stack.pop().expect("restore without matching save") {
            SavedState::Full { xlate, clip, pen } => {
                self.xlate = xlate;
                self.clip = clip;
                self.pen = pen;
            }
            SavedState::PenOnly(pen) => self.pen = pen,
        }
    }

    /// Reset all state and content: every cell back to skip, cursor
    /// unset, save stack emptied, translation/clip/masks/pen cleared.
    pub fn reset(&mut self) {
        self.cells.fill(Cell::skip());
        self.xlate = (0, 0);
        self.clip = Some(Rect::new(0, 0, self.lines, self.cols));
        self.masks.clear();
        self.pen = Pen::new();
        self.cursor = None;
        self.stack.clear();
    }

    // ------------------------------------------------------------------
    // Virtual cursor
    // ------------------------------------------------------------------

    /// Place the virtual cursor (translated coordinates).
    pub fn goto(&mut self, line: i32, col: i32) {
        self.cursor = Some((line + self.xlate.0, col + self.xlate.1));
    }

    /// Remove the virtual cursor.
    pub fn ungoto(&mut self) {
        self.cursor = None;
    }

    /// Check whether a virtual cursor is set.
    #[must_use]
    pub const fn has_cursorpos(&self) -> bool {
        self.cursor.is_some()
    }

    /// Virtual cursor position in buffer-absolute coordinates.
    #[must_use]
    pub const fn cursorpos(&self) -> Option<(i32, i32)> {
        self.cursor
    }

    // ------------------------------------------------------------------
    // Content writes
    // ------------------------------------------------------------------

    fn put_grapheme(&mut self, line: i32, col: i32, grapheme: &str, width: i32, pen: &Pen) {
        // A wide glyph is all-or-nothing: a half-clipped glyph would
        // leave a continuation with no primary.
        for c in col..col + width {
            if !self.writable(line, c) {
                return;
            }
        }
        let idx = self.index(line, col).unwrap();
        self.cells[idx] = Cell {
            kind: CellKind::Text(grapheme.to_string()),
            pen: pen.clone(),
        };
        for c in col + 1..col + width {
            let idx = self.index(line, c).unwrap();
            self.cells[idx] = Cell {
                kind: CellKind::Cont { startcol: col },
                pen: pen.clone(),
            };
        }
    }

    /// Clear out any wide glyph overlapping the given cell, so partial
    /// overwrites never leave orphaned continuations.
    fn break_span_at(&mut self, line: i32, col: i32) {
        let Some(idx) = self.index(line, col) else { return };
        let start = match self.cells[idx].kind {
            CellKind::Cont { startcol } => startcol,
            CellKind::Text(_) => col,
            _ => return,
        };
        let mut c = start;
        loop {
            let Some(i) = self.index(line, c) else { break };
            let is_primary = c == start;
            let is_cont = matches!(self.cells[i].kind, CellKind::Cont { startcol } if startcol == start);
            if is_primary || is_cont {
                self.cells[i] = Cell::skip();
                c += 1;
            } else {
                break;
            }
        }
    }

    /// Write a text span at the given position (translated
    /// coordinates), returning the number of display columns written,
    /// which may be less than the text's width if clipped or masked.
    pub fn text_at(&mut self, line: i32, col: i32, text: &str) -> i32 {
        let abs_line = line + self.xlate.0;
        let mut abs_col = col + self.xlate.1;
        let pen = self.pen.clone();

        let mut written = 0;
        for grapheme in text.graphemes(true) {
            let width = grapheme.width() as i32;
            if width == 0 {
                continue;
            }
            let target_ok = (abs_col..abs_col + width).all(|c| self.writable(abs_line, c));
            if target_ok {
                for c in abs_col..abs_col + width {
                    self.break_span_at(abs_line, c);
                }
                self.put_grapheme(abs_line, abs_col, grapheme, width, &pen);
                written += width;
            }
            abs_col += width;
        }
        written
    }

    /// Write at most `len` bytes of `text` as a span.
    ///
    /// `len` must lie on a character boundary of `text`.
    pub fn textn_at(&mut self, line: i32, col: i32, text: &str, len: usize) -> i32 {
        self.text_at(line, col, &text[..len.min(text.len())])
    }

    /// Write a span at the virtual cursor, advancing it by the text's
    /// full width (even where clipped).
    ///
    /// # Panics
    ///
    /// Panics if no cursor is set.
    pub fn text(&mut self, text: &str) -> i32 {
        let (line, col) = self.cursor.expect("text() requires a cursor position");
        let written = self.text_at(line - self.xlate.0, col - self.xlate.1, text);
        self.cursor = Some((line, col + text.width() as i32));
        written
    }

    /// Write a single codepoint at the given position.
    pub fn char_at(&mut self, line: i32, col: i32, ch: char) {
        let mut buf = [0u8; 4];
        self.text_at(line, col, ch.encode_utf8(&mut buf));
    }

    fn fill_kind(&mut self, line: i32, col: i32, cols: i32, kind: &CellKind) {
        let abs_line = line + self.xlate.0;
        let pen = self.pen.clone();
        for c in col..col + cols {
            let abs_col = c + self.xlate.1;
            if !self.writable(abs_line, abs_col) {
                continue;
            }
            self.break_span_at(abs_line, abs_col);
            let idx = self.index(abs_line, abs_col).unwrap();
            self.cells[idx] = Cell {
                kind: kind.clone(),
                pen: pen.clone(),
            };
        }
    }

    /// Erase `cols` cells to the current pen's background.
    pub fn erase_at(&mut self, line: i32, col: i32, cols: i32) {
        self.fill_kind(line, col, cols, &CellKind::Erase);
    }

    /// Erase cells at the virtual cursor, advancing it.
    ///
    /// # Panics
    ///
    /// Panics if no cursor is set.
    pub fn erase(&mut self, cols: i32) {
        let (line, col) = self.cursor.expect("erase() requires a cursor position");
        self.erase_at(line - self.xlate.0, col - self.xlate.1, cols);
        self.cursor = Some((line, col + cols));
    }

    /// Erase from the virtual cursor up to (not including) `col`.
    ///
    /// # Panics
    ///
    /// Panics if no cursor is set.
    pub fn erase_to(&mut self, col: i32) {
        let (line, cur) = self.cursor.expect("erase_to() requires a cursor position");
        let rel_cur = cur - self.xlate.1;
        if col > rel_cur {
            self.erase_at(line - self.xlate.0, rel_cur, col - rel_cur);
        }
        self.cursor = Some((line, col + self.xlate.1));
    }

    /// Erase every cell of `rect`.
    pub fn erase_rect(&mut self, rect: Rect) {
        for line in rect.top..rect.bottom() {
            self.erase_at(line, rect.left, rect.cols);
        }
    }

    /// Erase the entire writable area.
    pub fn clear(&mut self) {
        // Relative to the current translation, like all writes.
        let rect = Rect::new(-self.xlate.0, -self.xlate.1, self.lines, self.cols);
        self.erase_rect(rect);
    }

    /// Set `cols` cells back to skip.
    pub fn skip_at(&mut self, line: i32, col: i32, cols: i32) {
        self.fill_kind(line, col, cols, &CellKind::Skip);
    }

    /// Skip cells at the virtual cursor, advancing it.
    ///
    /// # Panics
    ///
    /// Panics if no cursor is set.
    pub fn skip(&mut self, cols: i32) {
        let (line, col) = self.cursor.expect("skip() requires a cursor position");
        self.skip_at(line - self.xlate.0, col - self.xlate.1, cols);
        self.cursor = Some((line, col + cols));
    }

    /// Skip from the virtual cursor up to `col`.
    ///
    /// # Panics
    ///
    /// Panics if no cursor is set.
    pub fn skip_to(&mut self, col: i32) {
        let (line, cur) = self.cursor.expect("skip_to() requires a cursor position");
        let rel_cur = cur - self.xlate.1;
        if col > rel_cur {
            self.skip_at(line - self.xlate.0, rel_cur, col - rel_cur);
        }
        self.cursor = Some((line, col + self.xlate.1));
    }

    fn merge_linemask(&mut self, line: i32, col: i32, mask: LineMask) {
        let abs_line = line + self.xlate.0;
        let abs_col = col + self.xlate.1;
        if !self.writable(abs_line, abs_col) {
            return;
        }
        self.break_span_at(abs_line, abs_col);
        let idx = self.index(abs_line, abs_col).unwrap();
        let cell = &mut self.cells[idx];
        let merged = match cell.kind {
            CellKind::Line(existing) => existing.merge(mask),
            _ => mask,
        };
        *cell = Cell {
            kind: CellKind::Line(merged),
            pen: self.pen.clone(),
        };
    }

    /// Draw a horizontal line along `line` from `startcol` to `endcol`
    /// inclusive.
    ///
    /// Every touched cell accumulates direction bits; glyphs are
    /// re-resolved from the merged mask, so intersections with other
    /// lines form the correct junction glyphs.
    pub fn hline_at(
        &mut self,
        line: i32,
        startcol: i32,
        endcol: i32,
        style: LineStyle,
        caps: LineCaps,
    ) {
        let s = style as u8;
        for col in startcol..=endcol {
            let east = if col < endcol || caps.contains(LineCaps::END) { s } else { 0 };
            let west = if col > startcol || caps.contains(LineCaps::START) { s } else { 0 };
            self.merge_linemask(line, col, LineMask::from_dirs(0, 0, east, west));
        }
    }

    /// Draw a vertical line along `col` from `startline` to `endline`
    /// inclusive. See [`RenderBuffer::hline_at`].
    pub fn vline_at(
        &mut self,
        startline: i32,
        endline: i32,
        col: i32,
        style: LineStyle,
        caps: LineCaps,
    ) {
        let s = style as u8;
        for line in startline..=endline {
            let south = if line < endline || caps.contains(LineCaps::END) { s } else { 0 };
            let north = if line > startline || caps.contains(LineCaps::START) { s } else { 0 };
            self.merge_linemask(line, col, LineMask::from_dirs(north, south, 0, 0));
        }
    }

    // ------------------------------------------------------------------
    // Compositing
    // ------------------------------------------------------------------

    /// Overwrite this buffer's cells with every *active* cell of
    /// `src`, reading `src` verbatim and writing through this buffer's
    /// current translation, clip and masks. Skip cells in `src` leave
    /// the destination untouched — this is how a child window's output
    /// composites over its parent's.
    pub fn blit(&mut self, src: &RenderBuffer) {
        let (src_lines, src_cols) = src.size();
        for line in 0..src_lines {
            for col in 0..src_cols {
                let cell = &src.cells[src.index(line, col).unwrap()];
                if !cell.is_active() {
                    continue;
                }
                let abs_line = line + self.xlate.0;
                let abs_col = col + self.xlate.1;
                if !self.writable(abs_line, abs_col) {
                    continue;
                }
                self.break_span_at(abs_line, abs_col);
                let idx = self.index(abs_line, abs_col).unwrap();
                self.cells[idx] = cell.clone();
            }
        }
    }

    // ------------------------------------------------------------------
    // Flushing
    // ------------------------------------------------------------------

    /// Emit the buffer's content to a terminal with minimal output.
    ///
    /// Walks rows top to bottom. The device cursor is moved only when
    /// the next emitted cell does not directly follow the previous
    /// one; the device pen is changed only when a run's pen is not
    /// equivalent to the last applied one; skip runs produce no output
    /// at all, preserving whatever the device already shows there.
    ///
    /// # Errors
    ///
    /// Propagates driver I/O errors.
    pub fn flush_to_term(&self, term: &mut dyn TermDriver) -> Result<()> {
        let mut device_pos: Option<(i32, i32)> = None;
        let mut device_pen: Option<Pen> = None;

        for line in 0..self.lines {
            let mut col = 0;
            while col < self.cols {
                let idx = self.index(line, col).unwrap();
                let cell = &self.cells[idx];

                match &cell.kind {
                    CellKind::Skip => {
                        col += 1;
                        continue;
                    }
                    // An orphaned continuation can only follow a blit
                    // that clipped its primary; nothing to emit.
                    CellKind::Cont { .. } => {
                        col += 1;
                        continue;
                    }
                    CellKind::Erase => {
                        let run_pen = &cell.pen;
                        let start = col;
                        while col < self.cols {
                            let c = &self.cells[self.index(line, col).unwrap()];
                            if matches!(c.kind, CellKind::Erase) && c.pen.equiv(run_pen) {
                                col += 1;
                            } else {
                                break;
                            }
                        }
                        let count = col - start;
                        if device_pos != Some((line, start)) {
                            term.goto(line, start)?;
                        }
                        if device_pen.as_ref().is_none_or(|p| !p.equiv(run_pen)) {
                            term.chpen(run_pen)?;
                            device_pen = Some(run_pen.clone_value());
                        }
                        term.erasech(count, true)?;
                        device_pos = Some((line, col));
                    }
                    CellKind::Text(_) | CellKind::Line(_) => {
                        let run_pen = cell.pen.clone();
                        let start = col;
                        let mut out = String::new();
                        while col < self.cols {
                            let c = &self.cells[self.index(line, col).unwrap()];
                            if !c.pen.equiv(&run_pen) {
                                break;
                            }
                            match &c.kind {
                                CellKind::Text(s) => {
                                    out.push_str(s);
                                    col += 1;
                                    // Swallow this glyph's continuations
                                    while col < self.cols {
                                        let n = &self.cells[self.index(line, col).unwrap()];
                                        if matches!(n.kind, CellKind::Cont { startcol } if startcol < col)
                                        {
                                            col += 1;
                                        } else {
                                            break;
                                        }
                                    }
                                }
                                CellKind::Line(mask) => {
                                    if let Some(ch) = mask.as_char() {
                                        out.push(ch);
                                    }
                                    col += 1;
                                }
                                _ => break,
                            }
                        }
                        if device_pos != Some((line, start)) {
                            term.goto(line, start)?;
                        }
                        if device_pen.as_ref().is_none_or(|p| !p.equiv(&run_pen)) {
                            term.chpen(&run_pen)?;
                            device_pen = Some(run_pen.clone_value());
                        }
                        term.print(&out)?;
                        device_pos = Some((line, col));
                    }
                }
            }
        }

        debug_log("rb", "flush complete");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Cell accessors
    // ------------------------------------------------------------------

    /// Whether the cell at raw buffer coordinates carries content.
    #[must_use]
    pub fn cell_is_active(&self, line: i32, col: i32) -> bool {
        self.index(line, col)
            .is_some_and(|i| self.cells[i].is_active())
    }

    /// Text of the cell; empty for erase/line cells, `None` outside
    /// the buffer or for skip/continuation cells.
    #[must_use]
    pub fn cell_text(&self, line: i32, col: i32) -> Option<String> {
        let idx = self.index(line, col)?;
        match &self.cells[idx].kind {
            CellKind::Text(s) => Some(s.clone()),
            CellKind::Erase => Some(String::new()),
            CellKind::Line(mask) => Some(mask.as_char().map(String::from).unwrap_or_default()),
            CellKind::Skip | CellKind::Cont { .. } => None,
        }
    }

    /// Pen of the cell, as a detached snapshot; `None` outside the
    /// buffer or for skip cells.
    #[must_use]
    pub fn cell_pen(&self, line: i32, col: i32) -> Option<Pen> {
        let idx = self.index(line, col)?;
        let cell = &self.cells[idx];
        if cell.is_active() {
            Some(cell.pen.clone_value())
        } else {
            None
        }
    }

    /// Line mask of the cell; empty unless the cell is a line cell.
    #[must_use]
    pub fn cell_linemask(&self, line: i32, col: i32) -> LineMask {
        self.index(line, col)
            .map_or_else(LineMask::new, |i| match self.cells[i].kind {
                CellKind::Line(mask) => mask,
                _ => LineMask::new(),
            })
    }

    /// Reconstruct the span starting at `(line, startcol)`: the run of
    /// cells sharing one state (all skip, or active with one pen).
    #[must_use]
    pub fn span_at(&self, line: i32, startcol: i32) -> Option<SpanInfo> {
        let idx = self.index(line, startcol)?;
        let first = &self.cells[idx];

        if !first.is_active() {
            let mut col = startcol;
            while col < self.cols && !self.cells[self.index(line, col).unwrap()].is_active() {
                col += 1;
            }
            return Some(SpanInfo {
                is_active: false,
                n_columns: col - startcol,
                text: String::new(),
                pen: None,
            });
        }

        let pen = first.pen.clone_value();
        let mut text = String::new();
        let mut col = startcol;
        while col < self.cols {
            let cell = &self.cells[self.index(line, col).unwrap()];
            if !cell.is_active() || !cell.pen.equiv(&pen) {
                break;
            }
            match &cell.kind {
                CellKind::Text(s) => text.push_str(s),
                CellKind::Line(mask) => {
                    if let Some(ch) = mask.as_char() {
                        text.push(ch);
                    }
                }
                CellKind::Erase | CellKind::Cont { .. } => {}
                CellKind::Skip => unreachable!(),
            }
            col += 1;
        }
        Some(SpanInfo {
            is_active: true,
            n_columns: col - startcol,
            text,
            pen: Some(pen),
        })
    }
}
