//! Pure geometry for connector anchors and containment tests.
//!
//! Everything here operates on already-resolved absolute boxes (see
//! [`crate::transform::absolute_box`]); nothing reads the tree. Degenerate
//! inputs (zero-size boxes, coincident points) clamp to a boundary point
//! instead of propagating NaN or infinity.

use kurbo::Point;

/// Axis-aligned box in document-absolute coordinates, stored as center and
/// half-extents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbsBox {
    pub center: Point,
    pub half_width: f64,
    pub half_height: f64,
}

impl AbsBox {
    pub fn new(center: Point, half_width: f64, half_height: f64) -> Self {
        Self {
            center,
            half_width: half_width.max(0.0),
            half_height: half_height.max(0.0),
        }
    }

    /// Build from a top-left origin and full size.
    pub fn from_origin_size(origin: Point, width: f64, height: f64) -> Self {
        let hw = (width / 2.0).max(0.0);
        let hh = (height / 2.0).max(0.0);
        Self::new(Point::new(origin.x + hw, origin.y + hh), hw, hh)
    }

    pub fn left(&self) -> f64 {
        self.center.x - self.half_width
    }

    pub fn right(&self) -> f64 {
        self.center.x + self.half_width
    }

    pub fn top(&self) -> f64 {
        self.center.y - self.half_height
    }

    pub fn bottom(&self) -> f64 {
        self.center.y + self.half_height
    }

    pub fn top_center(&self) -> Point {
        Point::new(self.center.x, self.top())
    }

    /// Whether `other` lies fully inside `self` (inclusive bounds).
    pub fn contains_box(&self, other: &AbsBox) -> bool {
        self.left() <= other.left()
            && other.right() <= self.right()
            && self.top() <= other.top()
            && other.bottom() <= self.bottom()
    }
}

/// Axis-aligned overlap test, inclusive at the bounds.
pub fn boxes_intersect(a: &AbsBox, b: &AbsBox) -> bool {
    a.left() <= b.right() && b.left() <= a.right() && a.top() <= b.bottom() && b.top() <= a.bottom()
}

/// Inclusive containment test.
pub fn point_in_box(b: &AbsBox, p: Point) -> bool {
    b.left() <= p.x && p.x <= b.right() && b.top() <= p.y && p.y <= b.bottom()
}

/// Where the segment from `inside` (the center of a box with the given
/// half-extents) to `outside` crosses the box boundary.
///
/// The direction vector is scaled so its dominant-axis component exactly
/// reaches the matching half-extent; if the other axis then falls outside
/// the box the vector is re-scaled by that axis instead. Coincident points
/// and zero extents clamp to a boundary point.
pub fn intersect_line_and_box(
    inside: Point,
    outside: Point,
    half_width: f64,
    half_height: f64,
) -> Point {
    let hw = half_width.max(0.0);
    let hh = half_height.max(0.0);
    let dx = outside.x - inside.x;
    let dy = outside.y - inside.y;

    if dx == 0.0 && dy == 0.0 {
        // No direction to follow; clamp to the right edge.
        return Point::new(inside.x + hw, inside.y);
    }

    let (sx, sy) = if dx.abs() >= dy.abs() {
        let t = hw / dx.abs();
        if (dy * t).abs() <= hh {
            (dx.signum() * hw, dy * t)
        } else {
            // dy * t exceeded hh, so dy is non-zero here.
            let t = hh / dy.abs();
            (dx * t, dy.signum() * hh)
        }
    } else {
        let t = hh / dy.abs();
        if (dx * t).abs() <= hw {
            (dx * t, dy.signum() * hh)
        } else {
            let t = hw / dx.abs();
            (dx.signum() * hw, dy * t)
        }
    };

    Point::new(inside.x + sx, inside.y + sy)
}

/// Anchors for an edge between two non-nested cards: the center-to-center
/// segment, clipped to each box boundary.
pub fn edge_anchors(start: &AbsBox, end: &AbsBox) -> (Point, Point) {
    let a = intersect_line_and_box(start.center, end.center, start.half_width, start.half_height);
    let b = intersect_line_and_box(end.center, start.center, end.half_width, end.half_height);
    (a, b)
}

/// General connector entry point.
///
/// When one card is nested inside the other, a clipped center line would
/// degenerate (both centers inside the container), so the connector is
/// drawn vertically instead: from the contained card's top edge up to the
/// container's header edge, at the contained card's horizontal center.
/// Header heights are in absolute units.
pub fn connector_anchors(
    start: &AbsBox,
    start_header_height: f64,
    end: &AbsBox,
    end_header_height: f64,
) -> (Point, Point) {
    if end.contains_box(start) {
        let x = start.center.x;
        return (
            Point::new(x, start.top()),
            Point::new(x, end.top() + end_header_height),
        );
    }
    if start.contains_box(end) {
        let x = end.center.x;
        return (
            Point::new(x, start.top() + start_header_height),
            Point::new(x, end.top()),
        );
    }
    edge_anchors(start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on_boundary(b: &AbsBox, p: Point) -> bool {
        let on_x = (p.x - b.left()).abs() < 1e-12 || (p.x - b.right()).abs() < 1e-12;
        let on_y = (p.y - b.top()).abs() < 1e-12 || (p.y - b.bottom()).abs() < 1e-12;
        (on_x && b.top() <= p.y && p.y <= b.bottom())
            || (on_y && b.left() <= p.x && p.x <= b.right())
    }

    #[test]
    fn test_boxes_intersect_inclusive() {
        let a = AbsBox::new(Point::new(0.0, 0.0), 10.0, 10.0);
        let b = AbsBox::new(Point::new(20.0, 0.0), 10.0, 10.0);
        // Touching edges count as intersecting.
        assert!(boxes_intersect(&a, &b));

        let c = AbsBox::new(Point::new(21.0, 0.0), 10.0, 10.0);
        assert!(!boxes_intersect(&a, &c));
    }

    #[test]
    fn test_point_in_box_inclusive() {
        let b = AbsBox::new(Point::new(0.0, 0.0), 5.0, 5.0);
        assert!(point_in_box(&b, Point::new(0.0, 0.0)));
        assert!(point_in_box(&b, Point::new(5.0, 5.0)));
        assert!(point_in_box(&b, Point::new(-5.0, 3.0)));
        assert!(!point_in_box(&b, Point::new(5.1, 0.0)));
    }

    #[test]
    fn test_intersection_lands_on_boundary() {
        let b = AbsBox::new(Point::new(0.0, 0.0), 10.0, 6.0);
        let directions = [
            Point::new(100.0, 0.0),
            Point::new(0.0, 100.0),
            Point::new(-30.0, 80.0),
            Point::new(55.0, -3.0),
            Point::new(17.0, 17.0),
            Point::new(-1.0, -90.0),
        ];
        for outside in directions {
            let p = intersect_line_and_box(b.center, outside, b.half_width, b.half_height);
            assert!(on_boundary(&b, p), "{outside:?} -> {p:?} not on boundary");
        }
    }

    #[test]
    fn test_intersection_pure_horizontal_and_vertical() {
        let p = intersect_line_and_box(Point::new(0.0, 0.0), Point::new(50.0, 0.0), 10.0, 6.0);
        assert_eq!(p, Point::new(10.0, 0.0));

        let p = intersect_line_and_box(Point::new(0.0, 0.0), Point::new(0.0, -50.0), 10.0, 6.0);
        assert_eq!(p, Point::new(0.0, -6.0));
    }

    #[test]
    fn test_intersection_rescales_by_other_axis() {
        // dx dominates in magnitude but the box is much wider than tall, so
        // the y half-extent is the binding constraint.
        let p = intersect_line_and_box(Point::new(0.0, 0.0), Point::new(40.0, 30.0), 100.0, 3.0);
        assert_eq!(p.y, 3.0);
        assert_eq!(p.x, 4.0);
    }

    #[test]
    fn test_intersection_degenerate_inputs() {
        // Coincident points clamp to the boundary.
        let p = intersect_line_and_box(Point::new(2.0, 3.0), Point::new(2.0, 3.0), 10.0, 6.0);
        assert_eq!(p, Point::new(12.0, 3.0));
        assert!(p.x.is_finite() && p.y.is_finite());

        // Zero-size box collapses to its center.
        let p = intersect_line_and_box(Point::new(2.0, 3.0), Point::new(50.0, 3.0), 0.0, 0.0);
        assert_eq!(p, Point::new(2.0, 3.0));
    }

    #[test]
    fn test_edge_anchors_clip_both_ends() {
        let a = AbsBox::new(Point::new(0.0, 0.0), 10.0, 10.0);
        let b = AbsBox::new(Point::new(100.0, 0.0), 20.0, 10.0);
        let (pa, pb) = edge_anchors(&a, &b);
        assert_eq!(pa, Point::new(10.0, 0.0));
        assert_eq!(pb, Point::new(80.0, 0.0));
    }

    #[test]
    fn test_connector_containment_anchor_independent_of_inner_size() {
        let container = AbsBox::new(Point::new(0.0, 0.0), 100.0, 80.0);
        let header = 12.0;

        // Two nested cards of very different sizes, both horizontally
        // centered in the container.
        for half in [5.0, 40.0] {
            let inner = AbsBox::new(Point::new(0.0, 20.0), half, half / 2.0);
            let (from, to) = connector_anchors(&inner, 4.0, &container, header);
            // Container anchor: its top-center, offset down by its header.
            assert_eq!(to, Point::new(0.0, container.top() + header));
            // Contained anchor: its own top edge, same x.
            assert_eq!(from, Point::new(0.0, inner.top()));
        }
    }

    #[test]
    fn test_connector_containment_reversed() {
        let container = AbsBox::new(Point::new(0.0, 0.0), 100.0, 80.0);
        let inner = AbsBox::new(Point::new(10.0, 20.0), 8.0, 6.0);
        let (from, to) = connector_anchors(&container, 12.0, &inner, 4.0);
        assert_eq!(from, Point::new(10.0, container.top() + 12.0));
        assert_eq!(to, Point::new(10.0, inner.top()));
    }

    #[test]
    fn test_connector_falls_back_to_edge_anchors() {
        let a = AbsBox::new(Point::new(0.0, 0.0), 10.0, 10.0);
        let b = AbsBox::new(Point::new(100.0, 0.0), 10.0, 10.0);
        assert_eq!(connector_anchors(&a, 4.0, &b, 4.0), edge_anchors(&a, &b));
    }
}
