//! Floating-edge geometry.
//!
//! Edges are drawn between node *boundaries*, not centers: each endpoint sits
//! where the line between the two centers leaves its box. The side an edge
//! attaches to is chosen by the dominant axis of separation, which keeps
//! labels and arrowheads stable while a node is dragged diagonally.
//!
//! Everything here is pure. Lookups of missing nodes fail fast with
//! [`GraphError::NodeNotFound`] instead of producing a null edge.

use kurbo::{BezPath, CubicBez, Point, Rect};
use whiteboard_types::{Edge, EdgeId, GraphSnapshot, Node};

use crate::{GraphError, Result};

/// Bezier curvature used for rendered edges.
pub const DEFAULT_CURVATURE: f64 = 0.25;

/// Cardinal side of a node box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Top,
    Right,
    Bottom,
    Left,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Top => Side::Bottom,
            Side::Right => Side::Left,
            Side::Bottom => Side::Top,
            Side::Left => Side::Right,
        }
    }
}

/// Bounding box of a node: position is the top-left corner, size is the
/// measured size (zero when not yet laid out).
pub fn node_rect(node: &Node) -> Rect {
    let size = node.measured_size();
    let origin = Point::new(node.position.x, node.position.y);
    Rect::from_origin_size(origin, (size.width.max(0.0), size.height.max(0.0)))
}

/// Where the line from `rect`'s center toward `toward` crosses the boundary.
///
/// Similar triangles: with half extents `hw`/`hh` and slope `dy/dx`, the line
/// leaves through a vertical edge when `|dy|/|dx| <= hh/hw`, otherwise through
/// a horizontal one. Degenerate boxes and coincident points return the center.
pub fn boundary_point(rect: Rect, toward: Point) -> Point {
    let center = rect.center();
    let hw = rect.width() / 2.0;
    let hh = rect.height() / 2.0;
    if hw <= 0.0 || hh <= 0.0 {
        return center;
    }

    let dx = toward.x - center.x;
    let dy = toward.y - center.y;
    if dx == 0.0 && dy == 0.0 {
        return center;
    }

    if dy.abs() * hw <= dx.abs() * hh {
        // Exits through the left or right edge (dx != 0 here).
        Point::new(center.x + dx.signum() * hw, center.y + dy * hw / dx.abs())
    } else {
        // Exits through the top or bottom edge (dy != 0 here).
        Point::new(center.x + dx * hh / dy.abs(), center.y + dy.signum() * hh)
    }
}

/// Side of the source box facing the target, by dominant axis.
pub fn facing_side(from: Point, to: Point) -> Side {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    if dx.abs() > dy.abs() {
        if dx > 0.0 { Side::Right } else { Side::Left }
    } else if dy > 0.0 {
        Side::Bottom
    } else {
        Side::Top
    }
}

/// A routed edge: boundary endpoints plus the sides they attach to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FloatingEdge {
    pub source: Point,
    pub target: Point,
    pub source_side: Side,
    pub target_side: Side,
}

impl FloatingEdge {
    /// Route between two boxes.
    pub fn between(source: Rect, target: Rect) -> Self {
        let sc = source.center();
        let tc = target.center();
        let source_side = facing_side(sc, tc);
        Self {
            source: boundary_point(source, tc),
            target: boundary_point(target, sc),
            source_side,
            target_side: source_side.opposite(),
        }
    }

    /// Route between two nodes.
    pub fn between_nodes(source: &Node, target: &Node) -> Self {
        Self::between(node_rect(source), node_rect(target))
    }

    /// Cubic curve whose control points push out along each attach side.
    pub fn bezier(&self, curvature: f64) -> CubicBez {
        CubicBez::new(
            self.source,
            control_point(self.source_side, self.source, self.target, curvature),
            control_point(self.target_side, self.target, self.source, curvature),
            self.target,
        )
    }

    /// SVG `d` attribute for the bezier rendering.
    pub fn to_svg(&self, curvature: f64) -> String {
        let curve = self.bezier(curvature);
        let mut path = BezPath::new();
        path.move_to(curve.p0);
        path.curve_to(curve.p1, curve.p2, curve.p3);
        path.to_svg()
    }
}

fn control_offset(distance: f64, curvature: f64) -> f64 {
    if distance >= 0.0 {
        0.5 * distance
    } else {
        curvature * 25.0 * (-distance).sqrt()
    }
}

fn control_point(side: Side, at: Point, other: Point, curvature: f64) -> Point {
    match side {
        Side::Left => Point::new(at.x - control_offset(at.x - other.x, curvature), at.y),
        Side::Right => Point::new(at.x + control_offset(other.x - at.x, curvature), at.y),
        Side::Top => Point::new(at.x, at.y - control_offset(at.y - other.y, curvature)),
        Side::Bottom => Point::new(at.x, at.y + control_offset(other.y - at.y, curvature)),
    }
}

/// Route one edge of a snapshot. Missing endpoints are an error.
pub fn route_edge(snapshot: &GraphSnapshot, edge: &Edge) -> Result<FloatingEdge> {
    let source = snapshot
        .node(&edge.source_id)
        .ok_or_else(|| GraphError::NodeNotFound(edge.source_id.clone()))?;
    let target = snapshot
        .node(&edge.target_id)
        .ok_or_else(|| GraphError::NodeNotFound(edge.target_id.clone()))?;
    Ok(FloatingEdge::between_nodes(source, target))
}

/// Route every edge of a snapshot, in edge order.
pub fn route_all(snapshot: &GraphSnapshot) -> Result<Vec<(EdgeId, FloatingEdge)>> {
    snapshot
        .edges
        .iter()
        .map(|edge| route_edge(snapshot, edge).map(|route| (edge.id.clone(), route)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use whiteboard_types::{EdgeKind, NodeId, NodeKind, Position, Size};

    fn centered(cx: f64, cy: f64, w: f64, h: f64) -> Rect {
        Rect::from_center_size(Point::new(cx, cy), (w, h))
    }

    #[test]
    fn test_horizontal_pair_routes_right_to_left() {
        let a = centered(0.0, 0.0, 100.0, 100.0);
        let b = centered(300.0, 0.0, 100.0, 100.0);
        let route = FloatingEdge::between(a, b);

        assert_eq!(route.source_side, Side::Right);
        assert_eq!(route.target_side, Side::Left);
        // Local to each center: +50 on the source, -50 on the target.
        assert_eq!(route.source.x - a.center().x, 50.0);
        assert_eq!(route.target.x - b.center().x, -50.0);
        assert_eq!(route.source.y, 0.0);
        assert_eq!(route.target.y, 0.0);
    }

    #[test]
    fn test_vertical_pair_routes_bottom_to_top() {
        let a = centered(0.0, 0.0, 100.0, 60.0);
        let b = centered(10.0, 400.0, 100.0, 60.0);
        let route = FloatingEdge::between(a, b);

        assert_eq!(route.source_side, Side::Bottom);
        assert_eq!(route.target_side, Side::Top);
        assert_eq!(route.source.y, 30.0);
        assert_eq!(route.target.y, 370.0);
    }

    #[test]
    fn test_diagonal_exits_through_horizontal_edge_of_wide_box() {
        // Wide, flat box: a 45° line leaves through the bottom edge.
        let rect = centered(0.0, 0.0, 200.0, 50.0);
        let p = boundary_point(rect, Point::new(100.0, 100.0));
        assert_eq!(p, Point::new(25.0, 25.0));
    }

    #[test]
    fn test_diagonal_exits_through_vertical_edge_of_tall_box() {
        let rect = centered(0.0, 0.0, 50.0, 200.0);
        let p = boundary_point(rect, Point::new(-100.0, 100.0));
        assert_eq!(p, Point::new(-25.0, 25.0));
    }

    #[test]
    fn test_zero_size_box_falls_back_to_center() {
        let rect = centered(40.0, 40.0, 0.0, 0.0);
        let p = boundary_point(rect, Point::new(500.0, 0.0));
        assert_eq!(p, Point::new(40.0, 40.0));
        assert!(p.x.is_finite() && p.y.is_finite());
    }

    #[test]
    fn test_coincident_centers_do_not_divide_by_zero() {
        let a = centered(0.0, 0.0, 100.0, 100.0);
        let route = FloatingEdge::between(a, a);
        assert_eq!(route.source, a.center());
        assert_eq!(route.target, a.center());
    }

    #[test]
    fn test_route_edge_uses_node_position_as_top_left() {
        let a = Node::new(NodeId::from("a"), NodeKind::Idea, Position::new(-50.0, -50.0))
            .with_size(Size::new(100.0, 100.0));
        let b = Node::new(NodeId::from("b"), NodeKind::Idea, Position::new(250.0, -50.0))
            .with_size(Size::new(100.0, 100.0));
        let edge = Edge::new("e".into(), "a".into(), "b".into(), EdgeKind::Regular);
        let snap = GraphSnapshot::new(vec![a, b], vec![edge.clone()]);

        let route = route_edge(&snap, &edge).unwrap();
        assert_eq!(route.source, Point::new(50.0, 0.0));
        assert_eq!(route.target, Point::new(250.0, 0.0));
    }

    #[test]
    fn test_route_edge_missing_node_fails_fast() {
        let a = Node::new(NodeId::from("a"), NodeKind::Idea, Position::default());
        let edge = Edge::new("e".into(), "a".into(), "ghost".into(), EdgeKind::Regular);
        let snap = GraphSnapshot::new(vec![a], vec![edge.clone()]);

        let err = route_edge(&snap, &edge).unwrap_err();
        assert_eq!(err, GraphError::NodeNotFound(NodeId::from("ghost")));
        assert!(route_all(&snap).is_err());
    }

    #[test]
    fn test_bezier_controls_push_out_along_sides() {
        let route = FloatingEdge::between(
            centered(0.0, 0.0, 100.0, 100.0),
            centered(300.0, 0.0, 100.0, 100.0),
        );
        let curve = route.bezier(DEFAULT_CURVATURE);
        assert!(curve.p1.x > route.source.x);
        assert!(curve.p2.x < route.target.x);

        let svg = route.to_svg(DEFAULT_CURVATURE);
        assert!(svg.starts_with('M'));
        assert!(svg.contains('C'));
    }

    #[test]
    fn test_backwards_bezier_offset_stays_finite() {
        // Source attaches Right but target lies to the left of the exit point.
        let route = FloatingEdge {
            source: Point::new(100.0, 0.0),
            target: Point::new(0.0, 0.0),
            source_side: Side::Right,
            target_side: Side::Left,
        };
        let curve = route.bezier(DEFAULT_CURVATURE);
        assert!(curve.p1.x > route.source.x);
        assert!(curve.p1.x.is_finite());
    }
}
