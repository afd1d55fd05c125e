//! Flyzone polygons and the virtual-node generator.
//!
//! The generator proposes detour candidates around the avoid zones relevant
//! to one segment:
//!
//! * tangent points on each zone's node ring, seen from both segment ends;
//! * tangent corners, where the start and end tangent lines on the same side
//!   of a ring meet;
//! * perimeter nodes evenly spaced on the ring (when virtualization is on);
//! * flyzone corner nodes inset from each polygon corner.
//!
//! The ring sits outside the avoid zone by the clearance margin and is widened
//! so that chords between neighbouring perimeter nodes never cut the zone and
//! the bend at each perimeter node is flyable at the turning radius.
//! Candidates are then merged greedily in id order: a candidate joins the
//! first cluster whose seed lies within the merge threshold, and each cluster
//! is represented by its centroid under the seed's id.

use crate::config::EngineConfig;
use crate::error::{PathfinderError, PathfinderResult};
use crate::models::Location;
use crate::obstacles::{AvoidZone, ZoneSource};
use crate::spatial::{
    distance, distance_to_segment, point_in_polygon, ray_intersection, segments_intersect_2d,
    tangent_points, LocalFrame, Point, EPS_M,
};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Tangent corners further than this many ring radii from the centre are dropped.
const MAX_CORNER_RING_FACTOR: f64 = 8.0;

/// Node ids 0 and 1 are the segment endpoints.
pub const START_ID: usize = 0;
pub const END_ID: usize = 1;

/// A simple polygon the vehicle must stay inside.
#[derive(Debug, Clone, PartialEq)]
pub struct Flyzone {
    vertices: Vec<Point>,
}

impl Flyzone {
    pub fn new(mut vertices: Vec<Point>) -> PathfinderResult<Self> {
        // Accept closed rings that repeat the first vertex.
        if vertices.len() > 3
            && vertices
                .first()
                .zip(vertices.last())
                .is_some_and(|(first, last)| distance(first, last) <= EPS_M)
        {
            vertices.pop();
        }
        if vertices.len() < 3 {
            return Err(PathfinderError::invalid(format!(
                "flyzone needs at least 3 vertices, got {}",
                vertices.len()
            )));
        }
        let n = vertices.len();
        for i in 0..n {
            if distance(&vertices[i], &vertices[(i + 1) % n]) <= EPS_M {
                return Err(PathfinderError::invalid(format!(
                    "flyzone edge {i} has zero length"
                )));
            }
        }
        for i in 0..n {
            for j in (i + 2)..n {
                // Edges i and j share a vertex when they wrap around.
                if i == 0 && j == n - 1 {
                    continue;
                }
                if segments_intersect_2d(
                    &vertices[i],
                    &vertices[(i + 1) % n],
                    &vertices[j],
                    &vertices[(j + 1) % n],
                ) {
                    return Err(PathfinderError::invalid(format!(
                        "flyzone edges {i} and {j} intersect"
                    )));
                }
            }
        }
        Ok(Self { vertices })
    }

    pub fn vertices(&self) -> &[Point] {
        &self.vertices
    }

    pub fn contains(&self, p: &Point) -> bool {
        point_in_polygon(p, &self.vertices)
    }

    fn edges(&self) -> impl Iterator<Item = (&Point, &Point)> {
        let n = self.vertices.len();
        (0..n).map(move |i| (&self.vertices[i], &self.vertices[(i + 1) % n]))
    }

    /// Whether segment `a-b` touches or crosses any polygon edge.
    pub fn crosses_boundary(&self, a: &Point, b: &Point) -> bool {
        self.edges().any(|(e1, e2)| segments_intersect_2d(a, b, e1, e2))
    }

    fn signed_area(&self) -> f64 {
        self.edges().map(|(a, b)| a.x * b.y - b.x * a.y).sum::<f64>() / 2.0
    }

    /// Virtual nodes inset from each corner far enough to turn inside it.
    pub fn corner_nodes(&self, turning_radius: f64) -> Vec<Point> {
        let n = self.vertices.len();
        let orientation = self.signed_area().signum();
        let mut nodes = Vec::new();
        for i in 0..n {
            let prev = self.vertices[(i + n - 1) % n];
            let vertex = self.vertices[i];
            let next = self.vertices[(i + 1) % n];

            let (ax, ay) = (prev.x - vertex.x, prev.y - vertex.y);
            let (bx, by) = (next.x - vertex.x, next.y - vertex.y);
            let len_a = ax.hypot(ay);
            let len_b = bx.hypot(by);
            let (ux, uy) = (ax / len_a + bx / len_b, ay / len_a + by / len_b);
            let bisector_len = ux.hypot(uy);
            if bisector_len <= 1e-9 {
                // straight edge
                continue;
            }

            let turn = (vertex.x - prev.x) * (next.y - vertex.y) - (vertex.y - prev.y) * (next.x - vertex.x);
            let convex = turn * orientation > 0.0;
            let interior = ((ax * bx + ay * by) / (len_a * len_b)).clamp(-1.0, 1.0).acos();
            let (inset, sign) = if convex {
                (turning_radius / (interior / 2.0).sin(), 1.0)
            } else {
                (turning_radius, -1.0)
            };
            if !inset.is_finite() || inset > len_a || inset > len_b {
                // corner too sharp to fly into
                continue;
            }

            let node = Point::flat(
                vertex.x + sign * inset * ux / bisector_len,
                vertex.y + sign * inset * uy / bisector_len,
            );
            if self.contains(&node) {
                nodes.push(node);
            }
        }
        nodes
    }
}

/// The traversable region: the union of the flyzones, or everywhere when none
/// are configured.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlyzoneMap {
    zones: Vec<Flyzone>,
}

impl FlyzoneMap {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn from_locations(frame: &LocalFrame, polygons: &[Vec<Location>]) -> PathfinderResult<Self> {
        let zones = polygons
            .iter()
            .enumerate()
            .map(|(i, polygon)| {
                let vertices = polygon.iter().map(|loc| frame.to_point(loc).with_z(0.0)).collect();
                Flyzone::new(vertices).map_err(|err| match err {
                    PathfinderError::InvalidInput { reason } => {
                        PathfinderError::invalid(format!("flyzone {i}: {reason}"))
                    }
                    other => other,
                })
            })
            .collect::<PathfinderResult<Vec<_>>>()?;
        Ok(Self { zones })
    }

    pub fn zones(&self) -> &[Flyzone] {
        &self.zones
    }

    pub fn is_unbounded(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn contains(&self, p: &Point) -> bool {
        self.is_unbounded() || self.zones.iter().any(|zone| zone.contains(p))
    }

    pub fn crosses_boundary(&self, a: &Point, b: &Point) -> bool {
        self.zones.iter().any(|zone| zone.crosses_boundary(a, b))
    }

    pub fn corner_nodes(&self, turning_radius: f64) -> Vec<Point> {
        self.zones
            .iter()
            .flat_map(|zone| zone.corner_nodes(turning_radius))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    Tangent,
    TangentCorner,
    Perimeter,
    FlyzoneCorner,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub id: usize,
    pub point: Point,
    pub kind: CandidateKind,
}

/// Representative of a merged cluster of candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergedNode {
    /// Id of the earliest candidate in the cluster.
    pub id: usize,
    /// Cluster centroid.
    pub point: Point,
    /// Position of the earliest candidate, used when the centroid is blocked.
    pub seed: Point,
    pub kind: CandidateKind,
    pub members: usize,
}

/// Generator tuning for one planning attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorParams {
    pub turning_radius_m: f64,
    pub merge_threshold_m: f64,
    pub clearance_margin_m: f64,
    pub boundary_samples: usize,
    pub virtualize: bool,
    pub corridor_scale: f64,
}

impl GeneratorParams {
    /// Retries sample perimeters more densely and keep a wider berth.
    pub fn for_attempt(config: &EngineConfig, attempt: usize) -> Self {
        let attempt = attempt.min(8);
        Self {
            turning_radius_m: config.turning_radius_m,
            merge_threshold_m: config.vertex_merge_threshold_m,
            clearance_margin_m: config.clearance_margin_m.max(0.1) * (attempt + 1) as f64,
            boundary_samples: config.boundary_samples.max(3) << attempt,
            virtualize: config.virtualize_flyzone,
            corridor_scale: (attempt + 1) as f64,
        }
    }

    /// Radius of the circle that carries a zone's virtual nodes.
    pub fn ring_radius(&self, zone_radius: f64) -> f64 {
        let half_step = PI / self.boundary_samples as f64;
        let clear = (zone_radius + self.clearance_margin_m) / half_step.cos();
        let turnable = self.turning_radius_m / half_step.cos();
        let unmerged = self.merge_threshold_m * 1.05 / (2.0 * half_step.sin());
        clear.max(turnable).max(unmerged)
    }

    fn corridor_m(&self, start: &Point, end: &Point) -> f64 {
        let half_len = distance(start, end) / 2.0;
        self.corridor_scale * half_len.max(4.0 * self.turning_radius_m + self.clearance_margin_m)
    }
}

#[derive(Debug, Clone)]
pub struct NodeGenerator<'a> {
    params: GeneratorParams,
    flyzones: &'a FlyzoneMap,
}

impl<'a> NodeGenerator<'a> {
    pub fn new(params: GeneratorParams, flyzones: &'a FlyzoneMap) -> Self {
        Self { params, flyzones }
    }

    pub fn params(&self) -> &GeneratorParams {
        &self.params
    }

    /// Zones near the segment, with moving obstacle samples thinned out so
    /// consecutive kept samples sit at least one radius apart.
    pub fn relevant_zones<'z>(
        &self,
        start: &Point,
        end: &Point,
        zones: impl IntoIterator<Item = &'z AvoidZone>,
    ) -> Vec<AvoidZone> {
        let corridor = self.params.corridor_m(start, end);
        let mut kept: Vec<AvoidZone> = Vec::new();
        let mut pending_last: Option<AvoidZone> = None;

        for zone in zones {
            if distance_to_segment(&zone.center, start, end) > zone.radius + corridor {
                continue;
            }
            match zone.source {
                ZoneSource::Stationary { .. } => {
                    kept.extend(pending_last.take());
                    kept.push(*zone);
                }
                ZoneSource::Moving { index, .. } => {
                    let gap = kept
                        .last()
                        .filter(|last| {
                            matches!(last.source, ZoneSource::Moving { index: i, .. } if i == index)
                        })
                        .map(|last| distance(&last.center, &zone.center));
                    match gap {
                        Some(gap) if gap < zone.radius => pending_last = Some(*zone),
                        Some(_) => {
                            kept.push(*zone);
                            pending_last = None;
                        }
                        None => {
                            kept.extend(pending_last.take());
                            kept.push(*zone);
                        }
                    }
                }
            }
        }
        kept.extend(pending_last);
        kept
    }

    /// Raw candidates in generation order, ids starting after the endpoints.
    pub fn candidates(&self, start: &Point, end: &Point, zones: &[AvoidZone]) -> Vec<Candidate> {
        let mut out = Vec::new();
        let mut push = |point: Point, kind: CandidateKind| {
            if point.is_finite() {
                let id = END_ID + 1 + out.len();
                out.push(Candidate { id, point, kind });
            }
        };

        let heading = (end.y - start.y).atan2(end.x - start.x);
        for zone in zones {
            let center = zone.center.with_z(0.0);
            let ring = self.params.ring_radius(zone.radius);

            let from_start = tangent_points(start, &center, ring);
            let from_end = tangent_points(end, &center, ring);
            for tangents in [from_start, from_end].into_iter().flatten() {
                push(tangents[0], CandidateKind::Tangent);
                push(tangents[1], CandidateKind::Tangent);
            }

            if let (Some(ts), Some(te)) = (from_start, from_end) {
                // Clockwise from the start pairs with counterclockwise from the end.
                for (s, e) in [(ts[1], te[0]), (ts[0], te[1])] {
                    if let Some(corner) = tangent_corner(start, &s, end, &e) {
                        if distance(&corner, &center) <= MAX_CORNER_RING_FACTOR * ring {
                            push(corner, CandidateKind::TangentCorner);
                        }
                    }
                }
            }

            if self.params.virtualize {
                let n = self.params.boundary_samples;
                let phase = heading + PI / 2.0;
                for k in 0..n {
                    let angle = phase + 2.0 * PI * k as f64 / n as f64;
                    push(
                        Point::flat(center.x + ring * angle.cos(), center.y + ring * angle.sin()),
                        CandidateKind::Perimeter,
                    );
                }
            }
        }

        if self.params.virtualize && !self.flyzones.is_unbounded() {
            let corridor = self.params.corridor_m(start, end);
            for node in self.flyzones.corner_nodes(self.params.turning_radius_m) {
                if distance_to_segment(&node, start, end) <= corridor {
                    push(node, CandidateKind::FlyzoneCorner);
                }
            }
        }

        out
    }

    /// Greedy clustering in id order. Candidates within the threshold of an
    /// endpoint are absorbed by it.
    pub fn merge(&self, candidates: Vec<Candidate>, start: &Point, end: &Point) -> Vec<MergedNode> {
        let threshold = self.params.merge_threshold_m;
        let mut clusters: Vec<Cluster> = Vec::new();
        for candidate in candidates {
            let p = candidate.point;
            if distance(&p, start) < threshold || distance(&p, end) < threshold {
                continue;
            }
            match clusters
                .iter_mut()
                .find(|cluster| distance(&cluster.seed.point, &p) < threshold)
            {
                Some(cluster) => cluster.add(&p),
                None => clusters.push(Cluster::new(candidate)),
            }
        }
        clusters.into_iter().map(Cluster::finish).collect()
    }

    pub fn generate(&self, start: &Point, end: &Point, zones: &[AvoidZone]) -> Vec<MergedNode> {
        let candidates = self.candidates(start, end, zones);
        self.merge(candidates, start, end)
    }
}

/// Meeting point of the tangent rays `start -> s` and `end -> e`, if it lies
/// past both tangent points.
fn tangent_corner(start: &Point, s: &Point, end: &Point, e: &Point) -> Option<Point> {
    let ds = (s.x - start.x, s.y - start.y);
    let de = (e.x - end.x, e.y - end.y);
    let (u, v) = ray_intersection(start, ds, end, de)?;
    if u < 1.0 - 1e-9 || v < 1.0 - 1e-9 {
        return None;
    }
    Some(Point::flat(start.x + u * ds.0, start.y + u * ds.1))
}

struct Cluster {
    seed: Candidate,
    sum_x: f64,
    sum_y: f64,
    members: usize,
}

impl Cluster {
    fn new(seed: Candidate) -> Self {
        Self {
            seed,
            sum_x: seed.point.x,
            sum_y: seed.point.y,
            members: 1,
        }
    }

    fn add(&mut self, p: &Point) {
        self.sum_x += p.x;
        self.sum_y += p.y;
        self.members += 1;
    }

    fn finish(self) -> MergedNode {
        let n = self.members as f64;
        MergedNode {
            id: self.seed.id,
            point: Point::flat(self.sum_x / n, self.sum_y / n),
            seed: self.seed.point,
            kind: self.seed.kind,
            members: self.members,
        }
    }
}
