//! Geometry kernel: local tangent-plane projection and planar primitives.
//!
//! Every planning call projects latitude/longitude onto a flat east/north/up
//! frame centred on the first mission waypoint, scaled by the local meters per
//! degree at that latitude. The projection is an approximation: its error
//! grows with distance from the origin but stays well below the buffers
//! placed around obstacles over mission-scale distances. It is not
//! geodesic-exact and is never used across calls.

use crate::models::Location;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Tolerance in meters applied to orientation and on-segment tests.
pub const EPS_M: f64 = 1e-6;

// ==== ENU (East-North-Up) scaling ====

/// Meters per degree of latitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lat(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_132.954 - 559.822 * (2.0 * lat_rad).cos() + 1.175 * (4.0 * lat_rad).cos()
        - 0.0023 * (6.0 * lat_rad).cos()
}

/// Meters per degree of longitude at a given latitude (WGS84 approximation).
pub fn meters_per_deg_lon(lat_deg: f64) -> f64 {
    let lat_rad = lat_deg.to_radians();
    111_412.84 * lat_rad.cos() - 93.5 * (3.0 * lat_rad).cos() + 0.118 * (5.0 * lat_rad).cos()
}

/// A point in the local frame: `x` east, `y` north, `z` altitude, all meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub const fn flat(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    pub fn with_z(self, z: f64) -> Self {
        Self { z, ..self }
    }

    /// Offset horizontally by `distance_m` along a compass heading
    /// (0 = north, 90 = east).
    pub fn offset_by_heading(self, distance_m: f64, heading_deg: f64) -> Self {
        let heading_rad = heading_deg.to_radians();
        Self {
            x: self.x + distance_m * heading_rad.sin(),
            y: self.y + distance_m * heading_rad.cos(),
            z: self.z,
        }
    }

    pub fn lerp(self, other: Point, t: f64) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }
}

/// Local tangent-plane frame anchored at a reference location.
#[derive(Debug, Clone, Copy)]
pub struct LocalFrame {
    origin: Location,
    m_per_deg_lat: f64,
    m_per_deg_lon: f64,
}

impl LocalFrame {
    pub fn new(origin: Location) -> Self {
        Self {
            origin,
            m_per_deg_lat: meters_per_deg_lat(origin.lat).max(1e-9),
            m_per_deg_lon: meters_per_deg_lon(origin.lat).max(1e-9),
        }
    }

    pub fn origin(&self) -> Location {
        self.origin
    }

    pub fn to_point(&self, location: &Location) -> Point {
        let dlon = wrap_degrees(location.lon - self.origin.lon);
        Point {
            x: dlon * self.m_per_deg_lon,
            y: (location.lat - self.origin.lat) * self.m_per_deg_lat,
            z: location.alt,
        }
    }

    pub fn to_location(&self, point: &Point) -> Location {
        Location {
            lat: self.origin.lat + point.y / self.m_per_deg_lat,
            lon: wrap_degrees(self.origin.lon + point.x / self.m_per_deg_lon),
            alt: point.z,
        }
    }
}

/// Wrap a longitude delta or value into [-180, 180).
fn wrap_degrees(deg: f64) -> f64 {
    (deg + 180.0).rem_euclid(360.0) - 180.0
}

/// Horizontal distance between two local points.
pub fn distance(a: &Point, b: &Point) -> f64 {
    (b.x - a.x).hypot(b.y - a.y)
}

fn cross(o: &Point, a: &Point, b: &Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Closest point on segment `a-b` to `p` and its parameter along the segment.
pub fn closest_point_on_segment(p: &Point, a: &Point, b: &Point) -> (Point, f64) {
    let sx = b.x - a.x;
    let sy = b.y - a.y;
    let seg_len_sq = sx * sx + sy * sy;
    if seg_len_sq < EPS_M * EPS_M {
        // Segment is essentially a point
        return (*a, 0.0);
    }
    let t = (((p.x - a.x) * sx + (p.y - a.y) * sy) / seg_len_sq).clamp(0.0, 1.0);
    (a.lerp(*b, t), t)
}

/// Horizontal distance from `p` to segment `a-b`.
pub fn distance_to_segment(p: &Point, a: &Point, b: &Point) -> f64 {
    let (closest, _) = closest_point_on_segment(p, a, b);
    distance(p, &closest)
}

/// Closed-set test: touching the circle counts as intersecting.
///
/// A non-positive or non-finite radius never intersects.
pub fn intersects_segment_circle(p1: &Point, p2: &Point, center: &Point, radius: f64) -> bool {
    if !radius.is_finite() || radius <= 0.0 {
        return false;
    }
    distance_to_segment(center, p1, p2) <= radius
}

/// Tangent points on a circle seen from an external point.
///
/// Returns `[counterclockwise, clockwise]` around the centre, or `None` when
/// the point lies on or inside the circle or the radius is degenerate.
pub fn tangent_points(point: &Point, center: &Point, radius: f64) -> Option<[Point; 2]> {
    if !radius.is_finite() || radius <= 0.0 {
        return None;
    }
    let d = distance(point, center);
    if d <= radius + EPS_M {
        return None;
    }
    let base = (point.y - center.y).atan2(point.x - center.x);
    let spread = (radius / d).clamp(-1.0, 1.0).acos();
    let at = |angle: f64| Point::flat(center.x + radius * angle.cos(), center.y + radius * angle.sin());
    Some([at(base + spread), at(base - spread)])
}

/// Intersection of the rays `p + u*dp` and `q + v*dq`, as `(u, v)`.
///
/// Parallel or degenerate directions return `None`.
pub fn ray_intersection(p: &Point, dp: (f64, f64), q: &Point, dq: (f64, f64)) -> Option<(f64, f64)> {
    let denom = dp.0 * dq.1 - dp.1 * dq.0;
    let scale = dp.0.hypot(dp.1) * dq.0.hypot(dq.1);
    if scale <= EPS_M || denom.abs() <= 1e-12 * scale {
        return None;
    }
    let wx = q.x - p.x;
    let wy = q.y - p.y;
    let u = (wx * dq.1 - wy * dq.0) / denom;
    let v = (wx * dp.1 - wy * dp.0) / denom;
    Some((u, v))
}

pub fn segments_intersect_2d(a1: &Point, a2: &Point, b1: &Point, b2: &Point) -> bool {
    fn within(a: f64, b: f64, value: f64) -> bool {
        let min = a.min(b) - EPS_M;
        let max = a.max(b) + EPS_M;
        value >= min && value <= max
    }

    fn on_segment(p: &Point, q: &Point, r: &Point) -> bool {
        within(p.x, q.x, r.x) && within(p.y, q.y, r.y)
    }

    let o1 = cross(a1, a2, b1);
    let o2 = cross(a1, a2, b2);
    let o3 = cross(b1, b2, a1);
    let o4 = cross(b1, b2, a2);

    if o1.abs() <= EPS_M && on_segment(a1, a2, b1) {
        return true;
    }
    if o2.abs() <= EPS_M && on_segment(a1, a2, b2) {
        return true;
    }
    if o3.abs() <= EPS_M && on_segment(b1, b2, a1) {
        return true;
    }
    if o4.abs() <= EPS_M && on_segment(b1, b2, a2) {
        return true;
    }

    let a_crosses = (o1 > EPS_M && o2 < -EPS_M) || (o1 < -EPS_M && o2 > EPS_M);
    let b_crosses = (o3 > EPS_M && o4 < -EPS_M) || (o3 < -EPS_M && o4 > EPS_M);
    a_crosses && b_crosses
}

/// Heading change in radians when flying `p1 -> p2 -> p3`, in [0, π].
///
/// Zero-length legs have no defined heading and report no turn.
pub fn turn_angle(p1: &Point, p2: &Point, p3: &Point) -> f64 {
    let (ax, ay) = (p2.x - p1.x, p2.y - p1.y);
    let (bx, by) = (p3.x - p2.x, p3.y - p2.y);
    let la = ax.hypot(ay);
    let lb = bx.hypot(by);
    if la <= EPS_M || lb <= EPS_M {
        return 0.0;
    }
    let cos = ((ax * bx + ay * by) / (la * lb)).clamp(-1.0, 1.0);
    cos.acos()
}

/// Whether the bend at `p2` can be flown at `turning_radius`.
///
/// The fillet arc tangent to both legs must fit within half of each leg, so
/// the arcs of consecutive vertices never overlap. A full reversal is never
/// feasible for a positive radius.
pub fn arc_feasible(p1: &Point, p2: &Point, p3: &Point, turning_radius: f64) -> bool {
    if turning_radius <= 0.0 {
        return true;
    }
    let l1 = distance(p1, p2);
    let l2 = distance(p2, p3);
    if l1 <= EPS_M || l2 <= EPS_M {
        return true;
    }
    let theta = turn_angle(p1, p2, p3);
    if theta >= PI - 1e-9 {
        return false;
    }
    let tangent_len = turning_radius * (theta / 2.0).tan();
    tangent_len <= l1.min(l2) / 2.0 + EPS_M
}

/// Ray-casting containment for a simple polygon (boundary handling is
/// unspecified; callers test boundary crossings separately).
pub fn point_in_polygon(p: &Point, polygon: &[Point]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (pi, pj) = (&polygon[i], &polygon[j]);
        if ((pi.y > p.y) != (pj.y > p.y))
            && (p.x < (pj.x - pi.x) * (p.y - pi.y) / (pj.y - pi.y) + pi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}
