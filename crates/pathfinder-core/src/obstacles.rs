//! Obstacle model: turns raw obstacles into buffered, time-indexed avoid zones.
//!
//! Stationary obstacles become one vertical cylinder valid at every time.
//! Moving obstacles are extrapolated along their heading and sampled every
//! `sample_step_s` seconds up to the prediction horizon; each sample is a zone
//! active within one step of its sample time. Both queries below use the same
//! activity rule, so a point blocked at `t` always blocks any segment through
//! that point whose window covers `t`.

use crate::models::{MovingObstacle, StationaryObstacle};
use crate::spatial::{distance, intersects_segment_circle, LocalFrame, Point};
use serde::{Deserialize, Serialize};

/// Upper bound on samples per moving obstacle; the step widens past it.
const MAX_SAMPLES_PER_OBSTACLE: usize = 4096;

/// A closed time interval in seconds from now.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_s: f64,
    pub end_s: f64,
}

impl TimeWindow {
    pub fn new(a: f64, b: f64) -> Self {
        Self {
            start_s: a.min(b),
            end_s: a.max(b),
        }
    }

    pub fn instant(t: f64) -> Self {
        Self { start_s: t, end_s: t }
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start_s && t <= self.end_s
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start_s <= other.end_s && other.start_s <= self.end_s
    }
}

/// Closed altitude range a path occupies, meters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AltitudeBand {
    pub floor_m: f64,
    pub ceiling_m: f64,
}

impl AltitudeBand {
    pub fn spanning(a: f64, b: f64) -> Self {
        Self {
            floor_m: a.min(b),
            ceiling_m: a.max(b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneSource {
    Stationary { index: usize },
    Moving { index: usize, sample: usize },
}

/// Buffered footprint of one obstacle (or one time sample of it).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvoidZone {
    pub source: ZoneSource,
    pub center: Point,
    pub radius: f64,
    pub floor_m: f64,
    pub ceiling_m: f64,
    /// `None` when the zone holds at every time.
    pub active: Option<TimeWindow>,
}

impl AvoidZone {
    pub fn is_active_at(&self, time_s: f64) -> bool {
        self.active.map_or(true, |w| w.contains(time_s))
    }

    pub fn is_active_during(&self, window: &TimeWindow) -> bool {
        self.active.map_or(true, |w| w.overlaps(window))
    }

    pub fn overlaps_band(&self, band: &AltitudeBand) -> bool {
        band.floor_m <= self.ceiling_m && self.floor_m <= band.ceiling_m
    }

    /// Closed containment: the boundary is inside.
    pub fn contains(&self, p: &Point) -> bool {
        p.z >= self.floor_m && p.z <= self.ceiling_m && distance(&self.center, p) <= self.radius
    }
}

/// Extrapolated position after `time_s` seconds along a compass heading.
pub fn predict_position(start: Point, speed_mps: f64, direction_deg: f64, time_s: f64) -> Point {
    if speed_mps <= 0.0 {
        return start;
    }
    start.offset_by_heading(speed_mps * time_s, direction_deg)
}

/// Every avoid zone of one planning call.
#[derive(Debug, Clone, Default)]
pub struct ObstacleField {
    zones: Vec<AvoidZone>,
    horizon_s: f64,
}

impl ObstacleField {
    pub fn build(
        frame: &LocalFrame,
        stationary: &[StationaryObstacle],
        moving: &[MovingObstacle],
        buffer_m: f64,
        horizon_s: f64,
        sample_step_s: f64,
    ) -> Self {
        let horizon_s = horizon_s.max(0.0);
        let mut zones = Vec::with_capacity(stationary.len() + moving.len());

        for (index, obs) in stationary.iter().enumerate() {
            zones.push(AvoidZone {
                source: ZoneSource::Stationary { index },
                center: frame.to_point(&obs.location()).with_z(0.0),
                radius: obs.radius + obs.avoid_radius + buffer_m,
                floor_m: 0.0,
                ceiling_m: obs.height,
                active: None,
            });
        }

        for (index, obs) in moving.iter().enumerate() {
            let start = frame.to_point(&obs.location);
            let radius = obs.radius + obs.avoid_radius + buffer_m;
            let floor_m = obs.location.alt - radius;
            let ceiling_m = obs.location.alt + radius;

            if obs.speed <= 0.0 {
                zones.push(AvoidZone {
                    source: ZoneSource::Moving { index, sample: 0 },
                    center: start,
                    radius,
                    floor_m,
                    ceiling_m,
                    active: Some(TimeWindow::new(-sample_step_s, horizon_s + sample_step_s)),
                });
                continue;
            }

            let step = sample_step_s.max(horizon_s / MAX_SAMPLES_PER_OBSTACLE as f64);
            for (sample, time_s) in sample_times(horizon_s, step).into_iter().enumerate() {
                zones.push(AvoidZone {
                    source: ZoneSource::Moving { index, sample },
                    center: predict_position(start, obs.speed, obs.direction, time_s),
                    radius,
                    floor_m,
                    ceiling_m,
                    active: Some(TimeWindow::new(time_s - step, time_s + step)),
                });
            }
        }

        Self { zones, horizon_s }
    }

    pub fn from_zones(zones: Vec<AvoidZone>, horizon_s: f64) -> Self {
        Self { zones, horizon_s }
    }

    pub fn zones(&self) -> &[AvoidZone] {
        &self.zones
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn horizon_s(&self) -> f64 {
        self.horizon_s
    }

    /// Zones that matter for a path occupying `band` during `window`.
    pub fn active_zones<'a>(
        &'a self,
        window: &'a TimeWindow,
        band: &'a AltitudeBand,
    ) -> impl Iterator<Item = &'a AvoidZone> + 'a {
        self.zones
            .iter()
            .filter(move |zone| zone.is_active_during(window) && zone.overlaps_band(band))
    }

    pub fn is_point_blocked(&self, p: &Point, time_s: f64) -> bool {
        self.zones
            .iter()
            .any(|zone| zone.is_active_at(time_s) && zone.contains(p))
    }

    /// Segment altitude is taken from the endpoints.
    pub fn does_segment_intersect_any_zone(&self, p1: &Point, p2: &Point, window: &TimeWindow) -> bool {
        self.segment_blocked_in_band(p1, p2, window, &AltitudeBand::spanning(p1.z, p2.z))
    }

    pub fn segment_blocked_in_band(
        &self,
        a: &Point,
        b: &Point,
        window: &TimeWindow,
        band: &AltitudeBand,
    ) -> bool {
        self.active_zones(window, band)
            .any(|zone| intersects_segment_circle(a, b, &zone.center, zone.radius))
    }
}

fn sample_times(horizon_s: f64, step: f64) -> Vec<f64> {
    let count = (horizon_s / step).floor() as usize;
    let mut times: Vec<f64> = (0..=count).map(|k| k as f64 * step).collect();
    if times.last().is_some_and(|last| horizon_s - last > 1e-9) {
        times.push(horizon_s);
    }
    times
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Location;

    fn frame() -> LocalFrame {
        LocalFrame::new(Location::new(10.0, 20.0, 0.0))
    }

    fn mover(speed: f64, direction: f64) -> MovingObstacle {
        MovingObstacle {
            location: Location::new(10.0, 20.0, 50.0),
            speed,
            direction,
            radius: 10.0,
            avoid_radius: 1.0,
        }
    }

    #[test]
    fn stationary_zone_inflates_radius_and_spans_height() {
        let obs = StationaryObstacle {
            lat: 10.0,
            lon: 20.0,
            height: 80.0,
            radius: 30.0,
            avoid_radius: 5.0,
        };
        let field = ObstacleField::build(&frame(), &[obs], &[], 2.0, 30.0, 1.0);
        assert_eq!(field.zones().len(), 1);
        let zone = field.zones()[0];
        assert_eq!(zone.radius, 37.0);
        assert_eq!(zone.ceiling_m, 80.0);
        assert!(zone.active.is_none());

        assert!(field.is_point_blocked(&Point::new(36.9, 0.0, 40.0), 1e6));
        assert!(!field.is_point_blocked(&Point::new(36.9, 0.0, 81.0), 0.0));
        assert!(!field.is_point_blocked(&Point::new(37.1, 0.0, 40.0), 0.0));
    }

    #[test]
    fn moving_obstacle_is_sampled_along_heading() {
        let field = ObstacleField::build(&frame(), &[], &[mover(10.0, 90.0)], 2.0, 5.0, 1.0);
        assert_eq!(field.zones().len(), 6);
        let last = field.zones()[5];
        assert!((last.center.x - 50.0).abs() < 1e-6);
        assert!(last.center.y.abs() < 1e-6);
        assert_eq!(last.radius, 13.0);
        assert_eq!(last.active, Some(TimeWindow::new(4.0, 6.0)));

        assert!(field.is_point_blocked(&Point::new(50.0, 0.0, 50.0), 5.0));
        assert!(!field.is_point_blocked(&Point::new(50.0, 0.0, 50.0), 0.0));
        // Beyond the horizon nothing is predicted.
        assert!(!field.is_point_blocked(&Point::new(50.0, 0.0, 50.0), 30.0));
    }

    #[test]
    fn partial_last_step_lands_on_horizon() {
        assert_eq!(sample_times(2.5, 1.0), vec![0.0, 1.0, 2.0, 2.5]);
        assert_eq!(sample_times(0.0, 1.0), vec![0.0]);
    }

    #[test]
    fn stopped_mover_covers_whole_horizon() {
        let field = ObstacleField::build(&frame(), &[], &[mover(0.0, 0.0)], 0.0, 20.0, 1.0);
        assert_eq!(field.zones().len(), 1);
        assert!(field.is_point_blocked(&Point::new(0.0, 0.0, 50.0), 20.0));
    }

    #[test]
    fn point_and_segment_queries_agree() {
        let field = ObstacleField::build(&frame(), &[], &[mover(10.0, 0.0)], 2.0, 10.0, 1.0);
        let p = Point::new(0.0, 30.0, 50.0);
        for t in [0.0, 1.5, 3.0, 3.4, 7.0] {
            if field.is_point_blocked(&p, t) {
                let a = Point::new(-100.0, 30.0, 50.0);
                let b = Point::new(100.0, 30.0, 50.0);
                assert!(field.does_segment_intersect_any_zone(&a, &b, &TimeWindow::instant(t)));
            }
        }
        assert!(field.is_point_blocked(&p, 3.0));
    }

    #[test]
    fn segment_outside_altitude_band_is_clear() {
        let obs = StationaryObstacle {
            lat: 10.0,
            lon: 20.0,
            height: 40.0,
            radius: 10.0,
            avoid_radius: 0.0,
        };
        let field = ObstacleField::build(&frame(), &[obs], &[], 2.0, 0.0, 1.0);
        let window = TimeWindow::new(0.0, 10.0);
        let low = (Point::new(-50.0, 0.0, 30.0), Point::new(50.0, 0.0, 30.0));
        let high = (Point::new(-50.0, 0.0, 60.0), Point::new(50.0, 0.0, 70.0));
        assert!(field.does_segment_intersect_any_zone(&low.0, &low.1, &window));
        assert!(!field.does_segment_intersect_any_zone(&high.0, &high.1, &window));
    }

    #[test]
    fn exactly_touching_zone_blocks() {
        let zone = AvoidZone {
            source: ZoneSource::Stationary { index: 0 },
            center: Point::flat(0.0, 12.0),
            radius: 12.0,
            floor_m: 0.0,
            ceiling_m: 100.0,
            active: None,
        };
        let field = ObstacleField::from_zones(vec![zone], 0.0);
        let a = Point::new(-40.0, 0.0, 20.0);
        let b = Point::new(40.0, 0.0, 20.0);
        assert!(field.does_segment_intersect_any_zone(&a, &b, &TimeWindow::instant(0.0)));
    }
}
