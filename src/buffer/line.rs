//! Line-drawing masks and box-glyph selection.
//!
//! Lines are not written as fixed glyphs. Each cell a line passes
//! through accumulates direction bits in a [`LineMask`] — two bits per
//! compass direction encoding the [`LineStyle`] — and the displayed
//! glyph is re-resolved from the merged mask. Crossing a horizontal
//! line with a vertical one therefore produces the right corner, tee
//! or cross glyph without the caller tracking adjacency.

use bitflags::bitflags;

/// Stroke style of a drawn line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineStyle {
    Single = 1,
    Double = 2,
    Thick = 3,
}

bitflags! {
    /// Whether a line's endpoints are capped (extended to the cell
    /// edge) at the start, the end, or both.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct LineCaps: u8 {
        const START = 0x01;
        const END   = 0x02;
        const BOTH  = 0x03;
    }
}

/// Per-cell accumulated line directions, two style bits per direction.
///
/// Layout: north bits 0-1, south bits 2-3, east bits 4-5, west
/// bits 6-7; each field holds a [`LineStyle`] discriminant or 0 for
/// "no line leaves in that direction". Merging uses bitwise OR, so a
/// single (1) and a double (2) meeting in one direction resolve as
/// thick (3).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LineMask(u8);

impl LineMask {
    const NORTH_SHIFT: u8 = 0;
    const SOUTH_SHIFT: u8 = 2;
    const EAST_SHIFT: u8 = 4;
    const WEST_SHIFT: u8 = 6;

    /// Empty mask: no directions.
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Build a mask from explicit per-direction style values (0-3).
    #[must_use]
    pub const fn from_dirs(north: u8, south: u8, east: u8, west: u8) -> Self {
        Self(
            ((north & 3) << Self::NORTH_SHIFT)
                | ((south & 3) << Self::SOUTH_SHIFT)
                | ((east & 3) << Self::EAST_SHIFT)
                | ((west & 3) << Self::WEST_SHIFT),
        )
    }

    /// Style value (0-3) of the northward stroke.
    #[must_use]
    pub const fn north(self) -> u8 {
        (self.0 >> Self::NORTH_SHIFT) & 3
    }

    /// Style value of the southward stroke.
    #[must_use]
    pub const fn south(self) -> u8 {
        (self.0 >> Self::SOUTH_SHIFT) & 3
    }

    /// Style value of the eastward stroke.
    #[must_use]
    pub const fn east(self) -> u8 {
        (self.0 >> Self::EAST_SHIFT) & 3
    }

    /// Style value of the westward stroke.
    #[must_use]
    pub const fn west(self) -> u8 {
        (self.0 >> Self::WEST_SHIFT) & 3
    }

    /// OR another mask's direction bits into this one.
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Check whether no direction is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Resolve the mask to the box-drawing glyph it displays as.
    ///
    /// Every light/heavy combination has an exact Unicode glyph.
    /// Double lines only exist combined with light strokes; masks
    /// outside that repertoire are downgraded (double → light) before
    /// lookup, which keeps junctions legible rather than exact.
    #[must_use]
    pub fn as_char(self) -> Option<char> {
        if self.is_empty() {
            return None;
        }
        let dirs = (self.north(), self.south(), self.east(), self.west());

        if let Some(ch) = resolve_double(dirs) {
            return Some(ch);
        }
        Some(resolve_light_heavy(dirs))
    }
}

/// Exact glyphs for masks involving double strokes. Unicode only has
/// double/light mixes; anything else falls through to the light/heavy
/// repertoire with doubles downgraded.
fn resolve_double(dirs: (u8, u8, u8, u8)) -> Option<char> {
    const D: u8 = LineStyle::Double as u8;
    const S: u8 = LineStyle::Single as u8;
    let ch = match dirs {
        // Pure double runs, corners, tees and cross
        (0, 0, D, D) | (0, 0, 0, D) | (0, 0, D, 0) => '═',
        (D, D, 0, 0) | (D, 0, 0, 0) | (0, D, 0, 0) => '║',
        (0, D, D, 0) => '╔',
        (0, D, 0, D) => '╗',
        (D, 0, D, 0) => '╚',
        (D, 0, 0, D) => '╝',
        (D, D, D, 0) => '╠',
        (D, D, 0, D) => '╣',
        (0, D, D, D) => '╦',
        (D, 0, D, D) => '╩',
        (D, D, D, D) => '╬',
        // Double/light mixes
        (0, S, D, 0) => '╒',
        (0, D, S, 0) => '╓',
        (0, S, 0, D) => '╕',
        (0, D, 0, S) => '╖',
        (S, 0, D, 0) => '╘',
        (D, 0, S, 0) => '╙',
        (S, 0, 0, D) => '╛',
        (D, 0, 0, S) => '╜',
        (S, S, D, 0) => '╞',
        (D, D, S, 0) => '╟',
        (S, S, 0, D) => '╡',
        (D, D, 0, S) => '╢',
        (0, S, D, D) => '╤',
        (0, D, S, S) => '╥',
        (S, 0, D, D) => '╧',
        (D, 0, S, S) => '╨',
        (S, S, D, D) => '╪',
        (D, D, S, S) => '╫',
        _ => return None,
    };
    Some(ch)
}

/// Glyph lookup over the light/heavy repertoire. Direction values are
/// clamped to light (1) or heavy (2-3 → heavy is the closest visual
/// weight for thick, and the downgrade target for unmatched doubles
/// is light).
fn resolve_light_heavy(dirs: (u8, u8, u8, u8)) -> char {
    const fn clamp(style: u8) -> u8 {
        match style {
            0 => 0,
            1 | 2 => 1, // unmatched doubles downgrade to light
            _ => 2,     // thick
        }
    }
    let (n, s, e, w) = dirs;
    let (n, s, e, w) = (clamp(n), clamp(s), clamp(e), clamp(w));

    // Index by base-3 digits in N,S,E,W order.
    let idx = ((n * 3 + s) * 3 + e) * 3 + w;

    // All 80 non-empty light/heavy combinations, indexed as above.
    const GLYPHS: [char; 81] = [
        ' ', '╴', '╸', // N0 S0 E0
        '╶', '─', '╾', // N0 S0 E1
        '╺', '╼', '━', // N0 S0 E2
        '╷', '┐', '┑', // N0 S1 E0
        '┌', '┬', '┭', // N0 S1 E1
        '┍', '┮', '┯', // N0 S1 E2
        '╻', '┒', '┓', // N0 S2 E0
        '┎', '┰', '┱', // N0 S2 E1
        '┏', '┲', '┳', // N0 S2 E2
        '╵', '┘', '┙', // N1 S0 E0
        '└', '┴', '┵', // N1 S0 E1
        '┕', '┶', '┷', // N1 S0 E2
        '│', '┤', '┥', // N1 S1 E0
        '├', '┼', '┽', // N1 S1 E1
        '┝', '┾', '┿', // N1 S1 E2
        '╽', '┧', '┪', // N1 S2 E0
        '┟', '╁', '╅', // N1 S2 E1
        '┢', '╆', '╈', // N1 S2 E2
        '╹', '┚', '┛', // N2 S0 E0
        '┖', '┸', '┹', // N2 S0 E1
        '┗', '┺', '┻', // N2 S0 E2
        '╿', '┦', '┩', // N2 S1 E0
        '┞', '╀', '╃', // N2 S1 E1
        '┡', '╄', '╇', // N2 S1 E2
        '┃', '┨', '┫', // N2 S2 E0
        '┠', '╂', '╉', // N2 S2 E1
        '┣', '╊', '╋', // N2 S2 E2
    ];
    GLYPHS[idx as usize]
}
