//! Avoidance graph builder.
//!
//! Nodes are the two segment endpoints plus every merged candidate that is
//! clear of the zones active while the vehicle could be there. Any two nodes
//! whose straight connection is clear get an undirected edge weighted by its
//! length.

use crate::deadline::{Deadline, DeadlinePoll, DeadlineReached};
use crate::flyzone::{CandidateKind, FlyzoneMap, MergedNode, END_ID, START_ID};
use crate::obstacles::{AltitudeBand, AvoidZone, ObstacleField, TimeWindow};
use crate::spatial::{distance, distance_to_segment, intersects_segment_circle, Point, EPS_M};
use petgraph::algo::has_path_connecting;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

/// Edge checks between deadline polls.
const EDGE_POLL_INTERVAL: usize = 256;

/// When and how far the vehicle may fly over one segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentTiming {
    /// Earliest and latest time the vehicle leaves the start.
    pub departure: TimeWindow,
    pub speed_mps: f64,
    /// Longest path accepted between the endpoints, meters.
    pub budget_m: f64,
}

impl SegmentTiming {
    /// Earliest and latest time the vehicle can reach the end.
    pub fn arrival(&self, straight_m: f64) -> TimeWindow {
        TimeWindow::new(
            self.departure.start_s + straight_m / self.speed_mps,
            self.departure.end_s + self.budget_m.max(straight_m) / self.speed_mps,
        )
    }

    /// Every time the vehicle can be anywhere on the segment.
    pub fn span(&self) -> TimeWindow {
        TimeWindow::new(
            self.departure.start_s,
            self.departure.end_s + self.budget_m / self.speed_mps,
        )
    }
}

/// Obstacle and flyzone checks for one segment.
///
/// A point `q` on any path no longer than the budget is reached no earlier
/// than `departure.start_s + |sq| / v` and no later than
/// `departure.end_s + (budget - |qe|) / v`; a zone only counts against `q`
/// when it is active somewhere in that interval. The straight segment itself
/// is flown at `v`, so each of its points has an exact offset from departure.
#[derive(Debug, Clone)]
pub struct Clearance<'a> {
    zones: Vec<AvoidZone>,
    flyzones: &'a FlyzoneMap,
    start: Point,
    end: Point,
    timing: SegmentTiming,
}

impl<'a> Clearance<'a> {
    pub fn new(
        field: &ObstacleField,
        flyzones: &'a FlyzoneMap,
        start: Point,
        end: Point,
        timing: SegmentTiming,
        band: AltitudeBand,
    ) -> Self {
        let zones = field.active_zones(&timing.span(), &band).copied().collect();
        Self {
            zones,
            flyzones,
            start: start.with_z(0.0),
            end: end.with_z(0.0),
            timing,
        }
    }

    /// Zones active at some time the vehicle may be on the segment.
    pub fn zones(&self) -> &[AvoidZone] {
        &self.zones
    }

    pub fn timing(&self) -> SegmentTiming {
        self.timing
    }

    /// Times a path within budget can be at distance `from_start` from the
    /// start and `to_end` from the end, or `None` when no such path exists.
    fn reach(&self, from_start: f64, to_end: f64) -> Option<TimeWindow> {
        let t = &self.timing;
        if from_start + to_end > t.budget_m + EPS_M {
            return None;
        }
        Some(TimeWindow::new(
            t.departure.start_s + from_start / t.speed_mps,
            t.departure.end_s + (t.budget_m - to_end).max(from_start) / t.speed_mps,
        ))
    }

    /// Some path no longer than the budget can pass through `p`.
    pub fn within_budget(&self, p: &Point) -> bool {
        distance(&self.start, p) + distance(p, &self.end) <= self.timing.budget_m + EPS_M
    }

    fn blocked_at(&self, p: &Point, window: &TimeWindow) -> bool {
        self.zones
            .iter()
            .any(|zone| zone.is_active_during(window) && distance(&zone.center, p) <= zone.radius)
    }

    /// The start while the vehicle leaves it.
    pub fn start_clear(&self) -> bool {
        self.flyzones.contains(&self.start) && !self.blocked_at(&self.start, &self.timing.departure)
    }

    /// The end while the vehicle can arrive there.
    pub fn end_clear(&self) -> bool {
        let arrival = self.timing.arrival(distance(&self.start, &self.end));
        self.flyzones.contains(&self.end) && !self.blocked_at(&self.end, &arrival)
    }

    /// Straight flight from start to end at the nominal speed.
    pub fn straight_clear(&self) -> bool {
        let (a, b) = (&self.start, &self.end);
        if self.flyzones.crosses_boundary(a, b) {
            return false;
        }
        let len = distance(a, b);
        let t = &self.timing;
        !self.zones.iter().any(|zone| {
            let Some(active) = zone.active else {
                return intersects_segment_circle(a, b, &zone.center, zone.radius);
            };
            if len <= EPS_M {
                return active.overlaps(&t.departure) && distance(&zone.center, a) <= zone.radius;
            }
            // Stretch of the line flown while the zone is active.
            let lo = ((active.start_s - t.departure.end_s) * t.speed_mps).max(0.0);
            let hi = ((active.end_s - t.departure.start_s) * t.speed_mps).min(len);
            if lo > hi {
                return false;
            }
            let p = a.lerp(*b, lo / len);
            let q = a.lerp(*b, hi / len);
            intersects_segment_circle(&p, &q, &zone.center, zone.radius)
        })
    }

    /// A candidate node: inside the flyzones, reachable within budget and
    /// outside every zone active while it can be visited.
    pub fn point_clear(&self, p: &Point) -> bool {
        if !self.flyzones.contains(p) {
            return false;
        }
        match self.reach(distance(&self.start, p), distance(p, &self.end)) {
            Some(window) => !self.blocked_at(p, &window),
            None => false,
        }
    }

    pub fn segment_clear(&self, a: &Point, b: &Point) -> bool {
        if self.flyzones.crosses_boundary(a, b) {
            return false;
        }
        let Some(window) = self.reach(
            distance_to_segment(&self.start, a, b),
            distance_to_segment(&self.end, a, b),
        ) else {
            return false;
        };
        !self.zones.iter().any(|zone| {
            zone.is_active_during(&window) && intersects_segment_circle(a, b, &zone.center, zone.radius)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Start,
    End,
    Virtual(CandidateKind),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GraphNode {
    pub id: usize,
    pub point: Point,
    pub role: NodeRole,
}

#[derive(Debug, Clone)]
pub struct AvoidanceGraph {
    graph: UnGraph<GraphNode, f64>,
    start: NodeIndex,
    end: NodeIndex,
}

impl AvoidanceGraph {
    pub fn build(
        start: Point,
        end: Point,
        nodes: &[MergedNode],
        clearance: &Clearance<'_>,
        deadline: &Deadline,
    ) -> Result<Self, DeadlineReached> {
        let mut graph = UnGraph::with_capacity(nodes.len() + 2, nodes.len() * 4);
        let start = graph.add_node(GraphNode {
            id: START_ID,
            point: start.with_z(0.0),
            role: NodeRole::Start,
        });
        let end = graph.add_node(GraphNode {
            id: END_ID,
            point: end.with_z(0.0),
            role: NodeRole::End,
        });

        for node in nodes {
            let point = if clearance.point_clear(&node.point) {
                node.point
            } else if clearance.point_clear(&node.seed) {
                node.seed
            } else {
                continue;
            };
            graph.add_node(GraphNode {
                id: node.id,
                point,
                role: NodeRole::Virtual(node.kind),
            });
        }
        deadline.check()?;

        let indices: Vec<NodeIndex> = graph.node_indices().collect();
        let mut poll = DeadlinePoll::new(deadline, EDGE_POLL_INTERVAL);
        for (i, &a) in indices.iter().enumerate() {
            for &b in &indices[i + 1..] {
                poll.tick()?;
                let (pa, pb) = (graph[a].point, graph[b].point);
                let length = distance(&pa, &pb);
                if length <= EPS_M {
                    continue;
                }
                if clearance.segment_clear(&pa, &pb) {
                    graph.add_edge(a, b, length);
                }
            }
        }

        Ok(Self { graph, start, end })
    }

    /// Wrap an already built graph.
    pub fn from_parts(graph: UnGraph<GraphNode, f64>, start: NodeIndex, end: NodeIndex) -> Self {
        Self { graph, start, end }
    }

    pub fn graph(&self) -> &UnGraph<GraphNode, f64> {
        &self.graph
    }

    pub fn start(&self) -> NodeIndex {
        self.start
    }

    pub fn end(&self) -> NodeIndex {
        self.end
    }

    pub fn node(&self, index: NodeIndex) -> &GraphNode {
        &self.graph[index]
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// False when the obstacles leave no gap between the endpoints.
    pub fn endpoints_connected(&self) -> bool {
        has_path_connecting(&self.graph, self.start, self.end, None)
    }

    /// Neighbours of `index` with edge weights, ordered by node index.
    pub fn neighbors_sorted(&self, index: NodeIndex) -> Vec<(NodeIndex, f64)> {
        let mut out: Vec<(NodeIndex, f64)> = self
            .graph
            .edges(index)
            .map(|edge| {
                let other = if edge.source() == index {
                    edge.target()
                } else {
                    edge.source()
                };
                (other, *edge.weight())
            })
            .collect();
        out.sort_by_key(|(other, _)| other.index());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::flyzone::{GeneratorParams, NodeGenerator};
    use crate::obstacles::ZoneSource;
    use std::time::Duration;

    fn field_with(zones: &[(f64, f64, f64)]) -> ObstacleField {
        ObstacleField::from_zones(
            zones
                .iter()
                .enumerate()
                .map(|(index, &(x, y, radius))| AvoidZone {
                    source: ZoneSource::Stationary { index },
                    center: Point::flat(x, y),
                    radius,
                    floor_m: 0.0,
                    ceiling_m: 200.0,
                    active: None,
                })
                .collect(),
            0.0,
        )
    }

    /// Leave at t = 0 at 10 m/s with three times the straight length to spare.
    fn timing(straight_m: f64) -> SegmentTiming {
        SegmentTiming {
            departure: TimeWindow::instant(0.0),
            speed_mps: 10.0,
            budget_m: 3.0 * straight_m,
        }
    }

    fn timed_zone(x: f64, y: f64, radius: f64, active: TimeWindow) -> AvoidZone {
        AvoidZone {
            source: ZoneSource::Moving { index: 0, sample: 0 },
            center: Point::flat(x, y),
            radius,
            floor_m: 0.0,
            ceiling_m: 200.0,
            active: Some(active),
        }
    }

    fn build(field: &ObstacleField, flyzones: &FlyzoneMap, start: Point, end: Point) -> AvoidanceGraph {
        let clearance = Clearance::new(
            field,
            flyzones,
            start,
            end,
            timing(distance(&start, &end)),
            AltitudeBand::spanning(50.0, 50.0),
        );
        let generator = NodeGenerator::new(GeneratorParams::for_attempt(&EngineConfig::default(), 0), flyzones);
        let zones = generator.relevant_zones(&start, &end, clearance.zones());
        let nodes = generator.generate(&start, &end, &zones);
        AvoidanceGraph::build(start, end, &nodes, &clearance, &Deadline::start(Duration::from_secs(5))).unwrap()
    }

    #[test]
    fn blocked_segment_has_no_direct_edge_but_stays_connected() {
        let field = field_with(&[(0.0, 0.0, 30.0)]);
        let flyzones = FlyzoneMap::unbounded();
        let graph = build(&field, &flyzones, Point::flat(-300.0, 0.0), Point::flat(300.0, 0.0));
        assert!(graph.graph().find_edge(graph.start(), graph.end()).is_none());
        assert!(graph.endpoints_connected());
        assert!(graph.node_count() > 2);
        for edge in graph.graph().edge_indices() {
            let (a, b) = graph.graph().edge_endpoints(edge).unwrap();
            assert_ne!(a, b);
        }
    }

    #[test]
    fn encircled_endpoint_is_disconnected() {
        // A ring of zones around the end point with no gap.
        let zones: Vec<(f64, f64, f64)> = (0..12)
            .map(|k| {
                let angle = k as f64 * std::f64::consts::PI / 6.0;
                (300.0 + 60.0 * angle.cos(), 60.0 * angle.sin(), 25.0)
            })
            .collect();
        let field = field_with(&zones);
        let flyzones = FlyzoneMap::unbounded();
        let graph = build(&field, &flyzones, Point::flat(-300.0, 0.0), Point::flat(300.0, 0.0));
        assert!(!graph.endpoints_connected());
    }

    #[test]
    fn clearance_respects_altitude_band() {
        let field = field_with(&[(0.0, 0.0, 30.0)]);
        let flyzones = FlyzoneMap::unbounded();
        let (a, b) = (Point::flat(-100.0, 0.0), Point::flat(100.0, 0.0));
        let above = Clearance::new(&field, &flyzones, a, b, timing(200.0), AltitudeBand::spanning(250.0, 260.0));
        assert!(above.zones().is_empty());
        assert!(above.straight_clear());
        assert!(above.segment_clear(&a, &b));
    }

    #[test]
    fn expired_deadline_interrupts_build() {
        let field = field_with(&[(0.0, 0.0, 30.0)]);
        let flyzones = FlyzoneMap::unbounded();
        let (a, b) = (Point::flat(-100.0, 0.0), Point::flat(100.0, 0.0));
        let clearance = Clearance::new(&field, &flyzones, a, b, timing(200.0), AltitudeBand::spanning(0.0, 0.0));
        let result = AvoidanceGraph::build(
            a,
            b,
            &[],
            &clearance,
            &Deadline::start(Duration::ZERO),
        );
        assert_eq!(result.unwrap_err(), DeadlineReached);
    }

    #[test]
    fn straight_line_only_meets_zones_where_it_is_flown() {
        let (a, b) = (Point::flat(-300.0, 0.0), Point::flat(300.0, 0.0));
        let flyzones = FlyzoneMap::unbounded();
        let band = AltitudeBand::spanning(50.0, 50.0);

        // At 10 m/s the vehicle is near x = -285 while this zone exists.
        let early = ObstacleField::from_zones(vec![timed_zone(200.0, 0.0, 20.0, TimeWindow::new(1.0, 2.0))], 60.0);
        let clearance = Clearance::new(&early, &flyzones, a, b, timing(600.0), band);
        assert_eq!(clearance.zones().len(), 1);
        assert!(clearance.straight_clear());

        let on_time = ObstacleField::from_zones(vec![timed_zone(200.0, 0.0, 20.0, TimeWindow::new(49.0, 51.0))], 60.0);
        let clearance = Clearance::new(&on_time, &flyzones, a, b, timing(600.0), band);
        assert!(!clearance.straight_clear());
    }

    #[test]
    fn endpoints_are_checked_when_the_vehicle_is_there() {
        let (a, b) = (Point::flat(0.0, 0.0), Point::flat(600.0, 0.0));
        let flyzones = FlyzoneMap::unbounded();
        let band = AltitudeBand::spanning(50.0, 50.0);
        let field = ObstacleField::from_zones(
            vec![
                timed_zone(0.0, 0.0, 10.0, TimeWindow::new(20.0, 30.0)),
                timed_zone(600.0, 0.0, 10.0, TimeWindow::new(5.0, 10.0)),
            ],
            200.0,
        );
        let clearance = Clearance::new(&field, &flyzones, a, b, timing(600.0), band);
        assert!(clearance.start_clear());
        assert!(clearance.end_clear());

        // Arrival falls anywhere in [60, 180] s.
        let field = ObstacleField::from_zones(vec![timed_zone(600.0, 0.0, 10.0, TimeWindow::new(150.0, 160.0))], 200.0);
        let clearance = Clearance::new(&field, &flyzones, a, b, timing(600.0), band);
        assert!(!clearance.end_clear());
    }

    #[test]
    fn nodes_beyond_the_length_budget_are_rejected() {
        let (a, b) = (Point::flat(0.0, 0.0), Point::flat(100.0, 0.0));
        let field = field_with(&[]);
        let flyzones = FlyzoneMap::unbounded();
        let clearance = Clearance::new(&field, &flyzones, a, b, timing(100.0), AltitudeBand::spanning(0.0, 0.0));
        assert!(clearance.point_clear(&Point::flat(50.0, 100.0)));
        assert!(!clearance.point_clear(&Point::flat(50.0, 200.0)));
        assert!(!clearance.segment_clear(&Point::flat(-200.0, 160.0), &Point::flat(300.0, 160.0)));
    }
}
