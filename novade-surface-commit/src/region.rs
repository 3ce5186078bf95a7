//! Regions as collections of disjoint rectangles, backing `wl_region`.

use crate::geometry::{Point, Rectangle};

/// A region kept as a set of non-overlapping rectangles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Region {
    rectangles: Vec<Rectangle>,
}

impl Region {
    /// Creates a new, empty `Region`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.rectangles.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.rectangles.is_empty()
    }

    /// The disjoint rectangles currently defining the region.
    pub fn rectangles(&self) -> &[Rectangle] {
        &self.rectangles
    }

    /// Adds a rectangle to the region.
    ///
    /// Any part of `new_rect` already covered is cut away first, so the
    /// stored rectangles stay disjoint.
    pub fn add(&mut self, new_rect: Rectangle) {
        if new_rect.is_empty() {
            return;
        }
        let mut fresh = vec![new_rect];
        for existing in &self.rectangles {
            fresh = fresh
                .into_iter()
                .flat_map(|piece| fragment(piece, existing))
                .collect();
            if fresh.is_empty() {
                return;
            }
        }
        self.rectangles.extend(fresh);
        merge_adjacent(&mut self.rectangles);
    }

    /// Subtracts a rectangle from the region.
    ///
    /// This may fragment existing rectangles into up to four pieces each.
    pub fn subtract(&mut self, sub_rect: Rectangle) {
        if sub_rect.is_empty() || self.rectangles.is_empty() {
            return;
        }
        self.rectangles = self
            .rectangles
            .iter()
            .flat_map(|existing| fragment(*existing, &sub_rect))
            .collect();
        merge_adjacent(&mut self.rectangles);
    }

    pub fn contains(&self, point: Point) -> bool {
        self.rectangles.iter().any(|r| r.contains(point))
    }

    pub fn area(&self) -> i64 {
        self.rectangles
            .iter()
            .map(|r| i64::from(r.width) * i64::from(r.height))
            .sum()
    }
}

/// Returns the parts of `rect` not covered by `cut`.
fn fragment(rect: Rectangle, cut: &Rectangle) -> Vec<Rectangle> {
    if !rect.intersects(cut) {
        return vec![rect];
    }

    let mut pieces = Vec::with_capacity(4);
    let rect_bottom = rect.y + rect.height;
    let cut_bottom = cut.y + cut.height;
    // Top part
    if rect.y < cut.y {
        pieces.push(Rectangle::new(rect.x, rect.y, rect.width, cut.y - rect.y));
    }
    // Bottom part
    if rect_bottom > cut_bottom {
        pieces.push(Rectangle::new(rect.x, cut_bottom, rect.width, rect_bottom - cut_bottom));
    }
    // Left and right parts within the vertical overlap
    let band_top = rect.y.max(cut.y);
    let band_bottom = rect_bottom.min(cut_bottom);
    if rect.x < cut.x {
        pieces.push(Rectangle::new(rect.x, band_top, cut.x - rect.x, band_bottom - band_top));
    }
    if rect.x + rect.width > cut.x + cut.width {
        pieces.push(Rectangle::new(
            cut.x + cut.width,
            band_top,
            (rect.x + rect.width) - (cut.x + cut.width),
            band_bottom - band_top,
        ));
    }
    pieces
}

/// Joins rectangles sharing a full edge. Inputs are disjoint, so joined
/// rectangles stay disjoint.
fn merge_adjacent(rects: &mut Vec<Rectangle>) {
    let mut i = 0;
    while i < rects.len() {
        let mut merged = false;
        let mut j = i + 1;
        while j < rects.len() {
            let (a, b) = (rects[i], rects[j]);
            let vertical = a.x == b.x
                && a.width == b.width
                && (a.y + a.height == b.y || b.y + b.height == a.y);
            let horizontal = a.y == b.y
                && a.height == b.height
                && (a.x + a.width == b.x || b.x + b.width == a.x);
            if vertical || horizontal {
                rects[i] = a.union(&b);
                rects.swap_remove(j);
                merged = true;
            } else {
                j += 1;
            }
        }
        if merged {
            i = 0;
        } else {
            i += 1;
        }
    }
    rects.retain(|r| !r.is_empty());
}
