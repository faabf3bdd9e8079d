//! Pure geometry functions for the HierPlace layout algorithm.
//!
//! The core algorithm:
//! 1. Sort items by area (largest first) for deterministic placement
//! 2. Place the first item at the origin
//! 3. For each subsequent item, try placement points (corners of placed items)
//! 4. Choose the placement that minimizes `width + height + |width - height|`
//!    (prefers more square clusters)
//!
//! Placement strategies:
//! - [`pack_at_origin`]: pack items into a cluster at (0,0) for local
//!   positioning
//! - [`hierplace`]: pack items AND position relative to existing content (or
//!   the sheet center)
//!
//! "Existing content" is just a single anchor box: all placement scenarios
//! (root items, orphans, fragments) use the same algorithm with different
//! anchors.

use std::collections::BTreeMap;

use crate::types::{EntityId, Position};

/// A4 sheet dimensions in nanometers.
pub const DEFAULT_SHEET_WIDTH: i64 = 297_000_000;
pub const DEFAULT_SHEET_HEIGHT: i64 = 210_000_000;
/// Gap between the anchor box and a newly packed cluster.
pub const DEFAULT_MARGIN: i64 = 10_000_000;

/// Gap used by the no-candidate fallback (5 mm).
const FALLBACK_GAP: i64 = 5_000_000;

/// Axis-aligned bounding box: top-left corner plus dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
}

impl Rect {
    pub fn new(left: i64, top: i64, width: i64, height: i64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> i64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> i64 {
        self.top + self.height
    }

    /// Boxes that are exactly touching (sharing an edge) are NOT considered
    /// intersecting.
    pub fn intersects(&self, other: &Rect) -> bool {
        !(self.right() <= other.left
            || other.right() <= self.left
            || self.bottom() <= other.top
            || other.bottom() <= self.top)
    }

    /// Smallest bounding box containing both rectangles.
    pub fn merge(&self, other: &Rect) -> Rect {
        let min_x = self.left.min(other.left);
        let min_y = self.top.min(other.top);
        let max_x = self.right().max(other.right());
        let max_y = self.bottom().max(other.bottom());
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }
}

/// A rectangle to be placed by HierPlace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacementRect {
    pub entity_id: EntityId,
    pub width: i64,
    pub height: i64,
    /// Top-left corner.
    pub x: i64,
    pub y: i64,
}

impl PlacementRect {
    pub fn new(entity_id: EntityId, width: i64, height: i64) -> Self {
        Self {
            entity_id,
            width,
            height,
            x: 0,
            y: 0,
        }
    }

    pub fn area(&self) -> i64 {
        self.width * self.height
    }

    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    pub fn move_to(&self, x: i64, y: i64) -> PlacementRect {
        PlacementRect {
            entity_id: self.entity_id.clone(),
            width: self.width,
            height: self.height,
            x,
            y,
        }
    }
}

/// Entity id -> top-left corner position.
pub type PlacementLayout = BTreeMap<EntityId, Position>;

/// Compute the bounding box of placed rectangles.
pub fn compute_cluster_bbox(rects: &[PlacementRect]) -> Option<Rect> {
    let mut iter = rects.iter();
    let mut result = iter.next()?.rect();
    for r in iter {
        result = result.merge(&r.rect());
    }
    Some(result)
}

/// Size metric for a bounding box: penalizes aspect-ratio difference so more
/// square clusters win.
fn size_metric(bbox: &Rect) -> i64 {
    bbox.width + bbox.height + (bbox.width - bbox.height).abs()
}

/// Add a placed rectangle's corners as candidate placement points.
fn add_corners(placement_pts: &mut Vec<(i64, i64)>, r: &PlacementRect) {
    // Top-left enables placing above; bottom-right enables placing to the
    // right.
    placement_pts.push((r.x, r.y));
    placement_pts.push((r.x + r.width, r.y + r.height));
}

/// Translate all positions in a layout by `(dx, dy)`.
pub fn translate_layout(layout: &mut PlacementLayout, dx: i64, dy: i64) {
    if dx == 0 && dy == 0 {
        return;
    }
    for pos in layout.values_mut() {
        *pos = pos.offset_by(dx, dy);
    }
}

/// Normalize a layout so the cluster bbox top-left is at (0, 0).
pub fn normalize_layout(layout: &mut PlacementLayout) {
    let min_x = layout.values().map(|p| p.x).min();
    let min_y = layout.values().map(|p| p.y).min();
    if let (Some(min_x), Some(min_y)) = (min_x, min_y) {
        translate_layout(layout, -min_x, -min_y);
    }
}

/// Pack rectangles at the origin using corner-based placement.
///
/// This is phase 1 of HierPlace: pack items compactly with a greedy
/// algorithm that minimizes the size metric. The returned positions are
/// normalized so the cluster's top-left corner is at (0, 0): all coordinates
/// are non-negative, at least one position has `x == 0` and at least one has
/// `y == 0`.
pub fn pack_at_origin(rects: &[PlacementRect]) -> PlacementLayout {
    // Zero-size rectangles cannot be packed.
    let mut valid: Vec<&PlacementRect> =
        rects.iter().filter(|r| r.width > 0 && r.height > 0).collect();
    if valid.is_empty() {
        return PlacementLayout::new();
    }

    // Largest first; ties broken by path string for determinism.
    valid.sort_by(|a, b| {
        b.area()
            .cmp(&a.area())
            .then_with(|| a.entity_id.path.to_string().cmp(&b.entity_id.path.to_string()))
    });

    // Candidate points are "bottom-left" targets for new items.
    let mut placement_pts: Vec<(i64, i64)> = Vec::new();
    let mut placed: Vec<PlacementRect> = Vec::new();
    let mut result = PlacementLayout::new();

    for (i, rect) in valid.iter().enumerate() {
        if i == 0 {
            let placed_rect = rect.move_to(0, 0);
            result.insert(rect.entity_id.clone(), Position::new(0, 0));
            add_corners(&mut placement_pts, &placed_rect);
            placed.push(placed_rect);
            continue;
        }

        let mut best_pos: Option<(i64, i64)> = None;
        let mut best_size = i64::MAX;

        for &(pt_x, pt_y) in &placement_pts {
            // Place the item's bottom-left at this point, so its top-left is
            // at (pt_x, pt_y - height).
            let candidate = rect.move_to(pt_x, pt_y - rect.height);
            let candidate_rect = candidate.rect();

            if placed.iter().any(|p| candidate_rect.intersects(&p.rect())) {
                continue;
            }

            let mut merged = candidate_rect;
            for p in &placed {
                merged = merged.merge(&p.rect());
            }

            let size = size_metric(&merged);
            if size < best_size {
                best_size = size;
                best_pos = Some((candidate.x, candidate.y));
            }
        }

        let (x, y) = match best_pos {
            Some(pos) => pos,
            None => {
                // Fallback: place to the right of all placed items.
                let max_right = placed.iter().map(|p| p.x + p.width).max().unwrap_or(0);
                (max_right + FALLBACK_GAP, 0)
            }
        };

        let placed_rect = rect.move_to(x, y);
        result.insert(rect.entity_id.clone(), Position::new(x, y));
        add_corners(&mut placement_pts, &placed_rect);
        placed.push(placed_rect);
    }

    normalize_layout(&mut result);
    result
}

/// Pack rectangles and position the cluster relative to an anchor (or the
/// sheet center).
///
/// This is THE unified placement algorithm. All placement scenarios use it:
/// - root items: anchor = existing board content bbox
/// - orphans: anchor = fragment bbox
/// - no existing content: anchor = `None` (centers on the sheet)
///
/// The anchor is treated as a single immovable box; the packed cluster is
/// positioned to its right, vertically center-aligned.
pub fn hierplace(rects: &[PlacementRect], anchor: Option<Rect>) -> PlacementLayout {
    hierplace_with(
        rects,
        anchor,
        DEFAULT_MARGIN,
        DEFAULT_SHEET_WIDTH,
        DEFAULT_SHEET_HEIGHT,
    )
}

/// [`hierplace`] with explicit margin and sheet dimensions.
pub fn hierplace_with(
    rects: &[PlacementRect],
    anchor: Option<Rect>,
    margin: i64,
    sheet_width: i64,
    sheet_height: i64,
) -> PlacementLayout {
    let mut layout = pack_at_origin(rects);
    if layout.is_empty() {
        return layout;
    }

    let placed: Vec<PlacementRect> = rects
        .iter()
        .filter_map(|r| layout.get(&r.entity_id).map(|pos| r.move_to(pos.x, pos.y)))
        .collect();
    let Some(cluster) = compute_cluster_bbox(&placed) else {
        return layout;
    };

    let cluster_center_x = cluster.left + cluster.width / 2;
    let cluster_center_y = cluster.top + cluster.height / 2;

    let (target_x, target_y) = match anchor {
        Some(anchor) => {
            // Right of the anchor, vertically center-aligned.
            let target_x = anchor.right() + margin + cluster.width / 2;
            let target_y = anchor.top + anchor.height / 2;
            (target_x, target_y)
        }
        None => (sheet_width / 2, sheet_height / 2),
    };

    translate_layout(
        &mut layout,
        target_x - cluster_center_x,
        target_y - cluster_center_y,
    );
    layout
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(path: &str, w: i64, h: i64) -> PlacementRect {
        PlacementRect::new(EntityId::parse(path, ""), w, h)
    }

    fn placed(rects: &[PlacementRect], layout: &PlacementLayout) -> Vec<PlacementRect> {
        rects
            .iter()
            .filter_map(|r| layout.get(&r.entity_id).map(|p| r.move_to(p.x, p.y)))
            .collect()
    }

    #[test]
    fn intersect_excludes_edge_touching() {
        let a = Rect::new(0, 0, 10, 10);
        assert!(a.intersects(&Rect::new(5, 5, 10, 10)));
        assert!(!a.intersects(&Rect::new(10, 0, 10, 10)));
        assert!(!a.intersects(&Rect::new(0, 10, 10, 10)));
        assert!(!a.intersects(&Rect::new(20, 20, 1, 1)));
    }

    #[test]
    fn pack_single_rect_at_origin() {
        let layout = pack_at_origin(&[rect("A", 10, 10)]);
        assert_eq!(layout.len(), 1);
        assert_eq!(layout.values().next().unwrap(), &Position::new(0, 0));
    }

    #[test]
    fn pack_skips_zero_size() {
        let layout = pack_at_origin(&[rect("A", 0, 10), rect("B", 10, 0), rect("C", 5, 5)]);
        assert_eq!(layout.len(), 1);
        assert!(layout.contains_key(&EntityId::parse("C", "")));
    }

    #[test]
    fn pack_invariants_hold() {
        let rects = vec![rect("A", 10, 10), rect("B", 5, 8), rect("C", 20, 3)];
        let layout = pack_at_origin(&rects);

        assert_eq!(layout.len(), 3);

        // Normalized: all non-negative, bbox top-left at origin.
        let placed = placed(&rects, &layout);
        let bbox = compute_cluster_bbox(&placed).unwrap();
        assert_eq!(bbox.left, 0);
        assert_eq!(bbox.top, 0);
        assert!(layout.values().all(|p| p.x >= 0 && p.y >= 0));

        // No two placed rects overlap.
        for (i, a) in placed.iter().enumerate() {
            for b in placed.iter().skip(i + 1) {
                assert!(!a.rect().intersects(&b.rect()), "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn pack_is_permutation_invariant() {
        let a = vec![rect("A", 10, 10), rect("B", 5, 8), rect("C", 20, 3)];
        let b = vec![rect("C", 20, 3), rect("A", 10, 10), rect("B", 5, 8)];
        assert_eq!(pack_at_origin(&a), pack_at_origin(&b));
    }

    #[test]
    fn hierplace_is_translation_of_packing() {
        let rects = vec![rect("A", 10_000_000, 10_000_000), rect("B", 5_000_000, 8_000_000)];
        let packed = pack_at_origin(&rects);
        let layout = hierplace(&rects, Some(Rect::new(0, 0, 50_000_000, 30_000_000)));

        let a = EntityId::parse("A", "");
        let b = EntityId::parse("B", "");
        let delta = *layout.get(&a).unwrap() - *packed.get(&a).unwrap();
        assert_eq!(
            *layout.get(&b).unwrap() - *packed.get(&b).unwrap(),
            delta,
            "both rects must be translated by the same delta"
        );
    }

    #[test]
    fn hierplace_sits_right_of_anchor() {
        let anchor = Rect::new(10_000_000, 20_000_000, 40_000_000, 30_000_000);
        let rects = vec![rect("A", 10_000_000, 10_000_000)];
        let layout = hierplace(&rects, Some(anchor));

        let pos = layout.values().next().unwrap();
        assert!(pos.x >= anchor.right(), "cluster must clear the anchor");
        assert_eq!(pos.x, anchor.right() + DEFAULT_MARGIN);
        // Vertically center-aligned with the anchor.
        assert_eq!(pos.y + 5_000_000, anchor.top + anchor.height / 2);
    }

    #[test]
    fn hierplace_centers_on_sheet_without_anchor() {
        let rects = vec![rect("A", 10_000_000, 10_000_000)];
        let layout = hierplace(&rects, None);
        let pos = layout.values().next().unwrap();
        assert_eq!(pos.x + 5_000_000, DEFAULT_SHEET_WIDTH / 2);
        assert_eq!(pos.y + 5_000_000, DEFAULT_SHEET_HEIGHT / 2);
    }

    #[test]
    fn dimensions_never_altered() {
        let rects = vec![rect("A", 7, 3), rect("B", 3, 7), rect("C", 4, 4)];
        let layout = pack_at_origin(&rects);
        // Positions only: the layout maps ids to top-left corners, the input
        // rect dims are untouched by construction. Verify the ids survived.
        for r in &rects {
            assert!(layout.contains_key(&r.entity_id));
        }
    }
}
