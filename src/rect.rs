//! Axis-aligned rectangle algebra.
//!
//! [`Rect`] is the geometric primitive for the whole crate: window
//! geometry, clipping, damage tracking and scroll regions are all
//! expressed in terms of it. Coordinates are `(top, left)` with sizes
//! in `(lines, cols)`; values may go negative during intermediate
//! translation.
//!
//! Beyond the usual intersection tests, this module provides the two
//! decompositions the damage tracker is built on:
//!
//! - [`Rect::add`] — the union of two rects as at most 3 disjoint rects
//! - [`Rect::subtract`] — one rect minus another as at most 4 disjoint
//!   bands
//!
//! # Examples
//!
//! ```
//! use panegrid::Rect;
//!
//! let a = Rect::new(0, 0, 10, 10);
//! let hole = Rect::new(2, 2, 4, 4);
//!
//! let bands = a.subtract(&hole);
//! assert_eq!(bands.len(), 4);
//! assert_eq!(bands.iter().map(Rect::area).sum::<i64>(), 100 - 16);
//! ```

/// An axis-aligned rectangle on the character grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    /// First line covered.
    pub top: i32,
    /// First column covered.
    pub left: i32,
    /// Number of lines covered.
    pub lines: i32,
    /// Number of columns covered.
    pub cols: i32,
}

impl Rect {
    /// Create a rect from its top-left corner and size.
    #[must_use]
    pub const fn new(top: i32, left: i32, lines: i32, cols: i32) -> Self {
        Self {
            top,
            left,
            lines,
            cols,
        }
    }

    /// Create a rect from two bounding corners.
    ///
    /// `bottom` and `right` are exclusive, matching [`Rect::bottom`] and
    /// [`Rect::right`].
    #[must_use]
    pub const fn bounded(top: i32, left: i32, bottom: i32, right: i32) -> Self {
        Self {
            top,
            left,
            lines: bottom - top,
            cols: right - left,
        }
    }

    /// First line past the bottom edge.
    #[must_use]
    pub const fn bottom(&self) -> i32 {
        self.top + self.lines
    }

    /// First column past the right edge.
    #[must_use]
    pub const fn right(&self) -> i32 {
        self.left + self.cols
    }

    /// Cell count, zero for degenerate rects.
    #[must_use]
    pub const fn area(&self) -> i64 {
        if self.lines <= 0 || self.cols <= 0 {
            0
        } else {
            self.lines as i64 * self.cols as i64
        }
    }

    /// Check whether the rect covers no cells.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.lines <= 0 || self.cols <= 0
    }

    /// Shift the rect downward and rightward (negative moves up/left).
    pub const fn translate(&mut self, downward: i32, rightward: i32) {
        self.top += downward;
        self.left += rightward;
    }

    /// Return a shifted copy.
    #[must_use]
    pub const fn translated(&self, downward: i32, rightward: i32) -> Self {
        Self::new(self.top + downward, self.left + rightward, self.lines, self.cols)
    }

    /// Check whether a single cell lies inside the rect.
    #[must_use]
    pub const fn contains_cell(&self, line: i32, col: i32) -> bool {
        line >= self.top && line < self.bottom() && col >= self.left && col < self.right()
    }

    /// Compute the overlap of two rects.
    ///
    /// Touching edges count as disjoint: a zero-area overlap is `None`.
    #[must_use]
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let top = self.top.max(other.top);
        let left = self.left.max(other.left);
        let bottom = self.bottom().min(other.bottom());
        let right = self.right().min(other.right());

        if bottom > top && right > left {
            Some(Rect::bounded(top, left, bottom, right))
        } else {
            None
        }
    }

    /// Check whether two rects share at least one cell.
    #[must_use]
    pub fn intersects(&self, other: &Rect) -> bool {
        self.intersect(other).is_some()
    }

    /// Check whether `self` fully covers `other`.
    #[must_use]
    pub fn contains(&self, other: &Rect) -> bool {
        other.top >= self.top
            && other.bottom() <= self.bottom()
            && other.left >= self.left
            && other.right() <= self.right()
    }

    /// Decompose the union of two rects into disjoint rects.
    ///
    /// Returns the originals unchanged when they neither overlap nor
    /// share a usable edge. Otherwise the union is sliced into at most
    /// 3 horizontal bands, top to bottom, with vertically adjacent
    /// bands of identical column extent re-merged (so aligned rects
    /// combine into one). Zero-area fragments are omitted.
    #[must_use]
    pub fn add(&self, other: &Rect) -> Vec<Rect> {
        if self.is_empty() {
            return if other.is_empty() { Vec::new() } else { vec![*other] };
        }
        if other.is_empty() {
            return vec![*self];
        }
        if self.contains(other) {
            return vec![*self];
        }
        if other.contains(self) {
            return vec![*other];
        }

        // The banded union is only expressible when both extents
        // overlap or touch; otherwise the rects are simply disjoint.
        let rows_meet = self.top <= other.bottom() && other.top <= self.bottom();
        let cols_meet = self.left <= other.right() && other.left <= self.right();
        if !rows_meet || !cols_meet {
            return vec![*self, *other];
        }

        let mut edges = [self.top, self.bottom(), other.top, other.bottom()];
        edges.sort_unstable();

        let mut bands: Vec<Rect> = Vec::with_capacity(3);
        for pair in edges.windows(2) {
            let (y0, y1) = (pair[0], pair[1]);
            if y1 <= y0 {
                continue;
            }
            let in_a = y0 >= self.top && y1 <= self.bottom();
            let in_b = y0 >= other.top && y1 <= other.bottom();
            let (left, right) = match (in_a, in_b) {
                (true, true) => {
                    // Shared band: column ranges meet, so their union
                    // is one contiguous span.
                    (self.left.min(other.left), self.right().max(other.right()))
                }
                (true, false) => (self.left, self.right()),
                (false, true) => (other.left, other.right()),
                (false, false) => continue,
            };

            let band = Rect::bounded(y0, left, y1, right);
            match bands.last_mut() {
                Some(prev)
                    if prev.left == band.left
                        && prev.cols == band.cols
                        && prev.bottom() == band.top =>
                {
                    prev.lines += band.lines;
                }
                _ => bands.push(band),
            }
        }

        bands
    }

    /// Decompose `self` minus `hole` into disjoint bands.
    ///
    /// Band order is fixed: top, bottom, left, right. The top and
    /// bottom bands span the full width of `self`; the left and right
    /// bands are restricted to the lines where `self` and `hole`
    /// overlap. Degenerate bands are omitted; a disjoint `hole` leaves
    /// `self` unchanged and a covering `hole` yields nothing.
    #[must_use]
    pub fn subtract(&self, hole: &Rect) -> Vec<Rect> {
        let Some(overlap) = self.intersect(hole) else {
            return vec![*self];
        };
        if hole.contains(self) {
            return Vec::new();
        }

        let mut out = Vec::with_capacity(4);

        if overlap.top > self.top {
            out.push(Rect::bounded(self.top, self.left, overlap.top, self.right()));
        }
        if overlap.bottom() < self.bottom() {
            out.push(Rect::bounded(
                overlap.bottom(),
                self.left,
                self.bottom(),
                self.right(),
            ));
        }
        if overlap.left > self.left {
            out.push(Rect::bounded(
                overlap.top,
                self.left,
                overlap.bottom(),
                overlap.left,
            ));
        }
        if overlap.right() < self.right() {
            out.push(Rect::bounded(
                overlap.top,
                overlap.right(),
                overlap.bottom(),
                self.right(),
            ));
        }

        out
    }
}
