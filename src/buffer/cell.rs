//! Render buffer cell type.
//!
//! Each cell of a [`RenderBuffer`](super::RenderBuffer) is either
//! *skip* — transparent, letting content beneath show through when
//! composited — or holds content plus the pen it was written with.
//! Wide glyphs occupy one [`CellKind::Text`] cell followed by
//! [`CellKind::Cont`] continuation cells; continuations carry no
//! independent state beyond the column of their primary cell.

use super::line::LineMask;
use crate::pen::Pen;

/// What a cell holds.
#[derive(Clone, Debug, Default)]
pub enum CellKind {
    /// Nothing: transparent on composite, untouched on flush.
    #[default]
    Skip,
    /// Explicitly erased to the pen's background.
    Erase,
    /// One grapheme, possibly wider than a single column.
    Text(String),
    /// Continuation of a wide glyph; `startcol` is the primary cell.
    Cont { startcol: i32 },
    /// Accumulated line-drawing directions.
    Line(LineMask),
}

/// A single render buffer cell.
#[derive(Clone, Debug, Default)]
pub struct Cell {
    pub kind: CellKind,
    /// Pen in effect when the cell was written; meaningless for skip.
    pub pen: Pen,
}

impl Cell {
    /// A fresh transparent cell.
    #[must_use]
    pub fn skip() -> Self {
        Self::default()
    }

    /// Check whether the cell contributes content when composited.
    ///
    /// Continuations count as active: they travel with their primary
    /// cell during blits.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        !matches!(self.kind, CellKind::Skip)
    }

    /// Check whether the cell is a wide-glyph continuation.
    #[must_use]
    pub const fn is_cont(&self) -> bool {
        matches!(self.kind, CellKind::Cont { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_skip() {
        let cell = Cell::skip();
        assert!(matches!(cell.kind, CellKind::Skip));
        assert!(!cell.is_active());
        assert!(!cell.is_cont());
    }

    #[test]
    fn test_active_kinds() {
        let mut cell = Cell::skip();
        cell.kind = CellKind::Erase;
        assert!(cell.is_active());
        cell.kind = CellKind::Text("x".into());
        assert!(cell.is_active());
        cell.kind = CellKind::Cont { startcol: 3 };
        assert!(cell.is_active());
        assert!(cell.is_cont());
    }
}
