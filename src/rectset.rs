//! Region representation as a set of disjoint rectangles.
//!
//! [`RectSet`] is how pending damage is tracked: an ordered collection
//! of [`Rect`]s whose union is the region, with the invariant that no
//! two members intersect. Overlapping or adjacent additions coalesce,
//! so repeated exposure of the same area costs one redraw, not many.

use crate::rect::Rect;

/// A set of pairwise-disjoint rectangles.
#[derive(Clone, Debug, Default)]
pub struct RectSet {
    rects: Vec<Rect>,
}

impl RectSet {
    /// Create an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self { rects: Vec::new() }
    }

    /// Remove all members.
    pub fn clear(&mut self) {
        self.rects.clear();
    }

    /// Check whether the set covers no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Number of member rects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rects.len()
    }

    /// The member rects, in set order.
    #[must_use]
    pub fn rects(&self) -> &[Rect] {
        &self.rects
    }

    /// Total covered area.
    #[must_use]
    pub fn area(&self) -> i64 {
        self.rects.iter().map(Rect::area).sum()
    }

    /// Bounding rect of the whole region, `None` when empty.
    #[must_use]
    pub fn bounds(&self) -> Option<Rect> {
        let first = self.rects.first()?;
        let mut top = first.top;
        let mut left = first.left;
        let mut bottom = first.bottom();
        let mut right = first.right();
        for r in &self.rects[1..] {
            top = top.min(r.top);
            left = left.min(r.left);
            bottom = bottom.max(r.bottom());
            right = right.max(r.right());
        }
        Some(Rect::bounded(top, left, bottom, right))
    }

    /// Merge a rect into the set.
    ///
    /// Only the parts of `rect` not already covered are inserted, then
    /// adjacent aligned members are re-merged until no pair combines.
    /// The disjointness invariant holds throughout.
    pub fn add(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }

        // Insert only the uncovered parts of the new rect.
        let mut pieces = vec![rect];
        for member in &self.rects {
            pieces = pieces
                .iter()
                .flat_map(|p| p.subtract(member))
                .collect();
            if pieces.is_empty() {
                return;
            }
        }
        self.rects.extend(pieces);

        // Coalesce: re-run pairwise union until no single-rect merge
        // applies. Adjacent aligned fragments combine here.
        let mut merged = true;
        while merged {
            merged = false;
            'outer: for i in 0..self.rects.len() {
                for j in (i + 1)..self.rects.len() {
                    let combined = self.rects[i].add(&self.rects[j]);
                    if combined.len() == 1 {
                        self.rects[i] = combined[0];
                        self.rects.remove(j);
                        merged = true;
                        break 'outer;
                    }
                }
            }
        }
    }

    /// Remove a rect's coverage from the set.
    ///
    /// Members intersecting `rect` are replaced by their remaining
    /// bands; untouched members are left alone.
    pub fn subtract(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        self.rects = self
            .rects
            .iter()
            .flat_map(|m| m.subtract(&rect))
            .collect();
    }

    /// Shift the whole region downward and rightward.
    pub fn translate(&mut self, downward: i32, rightward: i32) {
        for r in &mut self.rects {
            r.translate(downward, rightward);
        }
    }

    /// Check whether any member shares a cell with `rect`.
    #[must_use]
    pub fn intersects(&self, rect: &Rect) -> bool {
        self.rects.iter().any(|m| m.intersects(rect))
    }

    /// Check whether the set fully covers `rect`.
    #[must_use]
    pub fn contains(&self, rect: &Rect) -> bool {
        let mut remaining = vec![*rect];
        for member in &self.rects {
            remaining = remaining
                .iter()
                .flat_map(|p| p.subtract(member))
                .collect();
            if remaining.is_empty() {
                return true;
            }
        }
        remaining.is_empty()
    }
}
