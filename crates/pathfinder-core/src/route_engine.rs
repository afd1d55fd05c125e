//! Path adjustment orchestrator.
//!
//! Each pair of consecutive waypoints is a segment. Segments are walked in
//! order to track when the vehicle can leave each waypoint: a clear segment
//! is flown straight at the nominal speed and passes through untouched, a
//! blocked one may take up to `allowance` times its straight length. Blocked
//! segments are planned through the avoidance graph, possibly on scoped
//! worker threads, sharing one deadline. Fixed neighbouring legs are handed to
//! the search so the turns at the original waypoints stay flyable; detours
//! that meet at a waypoint are reconciled afterwards. When a detour cannot fit
//! its time budget the allowance is doubled for the whole mission, at most
//! [`MAX_TIME_WIDENINGS`] times. Detour points are spliced between the
//! original waypoints, which keep their own acceptance radius.

use crate::config::EngineConfig;
use crate::deadline::Deadline;
use crate::error::{PathfinderError, PathfinderResult};
use crate::flyzone::{FlyzoneMap, GeneratorParams, NodeGenerator};
use crate::graph::{AvoidanceGraph, Clearance, SegmentTiming};
use crate::models::{AdjustPathRequest, AdjustStats, AdjustedPath, Waypoint};
use crate::obstacles::{AltitudeBand, ObstacleField, TimeWindow};
use crate::search::{self, PathLimits};
use crate::spatial::{arc_feasible, distance, LocalFrame, Point};
use tracing::{debug, info, warn};

/// Times the detour time allowance may be doubled before giving up.
pub const MAX_TIME_WIDENINGS: usize = 2;

/// One consecutive waypoint pair in the local frame.
#[derive(Debug, Clone, Copy)]
struct SegmentPlan {
    index: usize,
    start: Point,
    end: Point,
    timing: SegmentTiming,
    /// The straight line meets an avoid zone or a flyzone boundary.
    blocked: bool,
    /// Point flown just before `start`, when already fixed.
    approach: Option<Point>,
    /// Point flown just after `end`, when already fixed.
    departure: Option<Point>,
}

impl SegmentPlan {
    fn band(&self) -> AltitudeBand {
        AltitudeBand::spanning(self.start.z, self.end.z)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SegmentOutcome {
    Unchanged,
    Detoured(Detour),
    /// Every detour found is longer than the time budget allows.
    OverBudget,
}

impl SegmentOutcome {
    fn detour(&self) -> Option<&Detour> {
        match self {
            SegmentOutcome::Detoured(detour) => Some(detour),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Detour {
    /// Inserted points between the two waypoints, horizontal only.
    points: Vec<Point>,
    best_effort: bool,
    graph_nodes: usize,
    graph_edges: usize,
    expanded: usize,
}

struct PlanContext<'a> {
    config: &'a EngineConfig,
    field: ObstacleField,
    flyzones: &'a FlyzoneMap,
}

/// Inputs shared by every planning pass over one request.
struct Mission<'a> {
    config: &'a EngineConfig,
    request: &'a AdjustPathRequest,
    frame: LocalFrame,
    points: Vec<Point>,
    flyzones: FlyzoneMap,
    speed_mps: f64,
    /// Seconds until the vehicle reaches the first waypoint.
    eta_s: f64,
}

enum MissionOutcome {
    Planned(Vec<SegmentOutcome>),
    NeedsMoreTime { segment: usize },
}

/// Compute a revised waypoint list, or `None` when the original is fine.
pub fn adjust_path(
    request: &AdjustPathRequest,
    config: &EngineConfig,
) -> PathfinderResult<Option<AdjustedPath>> {
    config.validate()?;
    request.validate()?;

    if !request.has_obstacles() {
        debug!("no obstacles supplied, nothing to adjust");
        return Ok(None);
    }
    if request.waypoints.len() < 2 {
        debug!(waypoints = request.waypoints.len(), "fewer than two waypoints");
        return Ok(None);
    }

    let deadline = Deadline::start(config.max_process_time);
    let frame = LocalFrame::new(request.waypoints[0].location);
    let points: Vec<Point> = request
        .waypoints
        .iter()
        .map(|wp| frame.to_point(&wp.location))
        .collect();

    let speed_mps = request
        .telemetry
        .known_speed()
        .unwrap_or(config.default_cruise_speed_mps);
    let vehicle = frame.to_point(&request.telemetry.location);
    let eta_s = distance(&vehicle, &points[0]) / speed_mps;
    let flyzones = FlyzoneMap::from_locations(&frame, &request.options.flyzones)?;
    let mission = Mission {
        config,
        request,
        frame,
        points,
        flyzones,
        speed_mps,
        eta_s,
    };

    let mut allowance = config.detour_time_allowance;
    let mut widenings = 0;
    let outcomes = loop {
        match mission.plan(allowance, &deadline)? {
            MissionOutcome::Planned(outcomes) => break outcomes,
            MissionOutcome::NeedsMoreTime { segment } if widenings < MAX_TIME_WIDENINGS => {
                widenings += 1;
                allowance *= 2.0;
                info!(segment, allowance, "detour exceeds its time budget, widening allowance");
            }
            MissionOutcome::NeedsMoreTime { segment } => {
                let err = PathfinderError::infeasible(
                    segment,
                    format!("no detour fits within {allowance} times the straight-line flight time"),
                );
                warn!(kind = err.kind(), error = %err, "path adjustment failed");
                return Err(err);
            }
        }
    };

    let mut stats = AdjustStats {
        segments_evaluated: outcomes.len(),
        time_widenings: widenings,
        ..AdjustStats::default()
    };
    for detour in outcomes.iter().filter_map(SegmentOutcome::detour) {
        stats.segments_detoured += 1;
        stats.best_effort_segments += usize::from(detour.best_effort);
        stats.graph_nodes += detour.graph_nodes;
        stats.graph_edges += detour.graph_edges;
        stats.states_expanded += detour.expanded;
    }
    stats.elapsed_ms = u64::try_from(deadline.elapsed().as_millis()).unwrap_or(u64::MAX);

    if stats.segments_detoured == 0 {
        info!(
            segments = stats.segments_evaluated,
            elapsed_ms = stats.elapsed_ms,
            "all segments clear"
        );
        return Ok(None);
    }

    let waypoints = stitch(&mission.frame, &request.waypoints, &mission.points, &outcomes, config);
    info!(
        segments = stats.segments_evaluated,
        detoured = stats.segments_detoured,
        best_effort = stats.best_effort_segments,
        widenings,
        waypoints = waypoints.len(),
        elapsed_ms = stats.elapsed_ms,
        "path adjusted"
    );
    Ok(Some(AdjustedPath { waypoints, stats }))
}

/// Run [`adjust_path`] on the blocking pool so async callers are not stalled.
pub async fn adjust_path_async(
    request: AdjustPathRequest,
    config: EngineConfig,
) -> PathfinderResult<Option<AdjustedPath>> {
    tokio::task::spawn_blocking(move || adjust_path(&request, &config))
        .await
        .map_err(|e| PathfinderError::Worker {
            reason: format!("adjust task panicked: {}", e),
        })?
}

impl Mission<'_> {
    /// One planning pass with every blocked segment allowed `allowance` times
    /// its straight length.
    fn plan(&self, allowance: f64, deadline: &Deadline) -> PathfinderResult<MissionOutcome> {
        let total_m: f64 = self.points.windows(2).map(|w| distance(&w[0], &w[1])).sum();
        let horizon_s = self
            .request
            .options
            .mov_obs_time_limit
            .min(self.eta_s + allowance * total_m / self.speed_mps);
        let field = ObstacleField::build(
            &self.frame,
            &self.request.stationary_obstacles,
            &self.request.moving_obstacles,
            self.config.buffer_size_m,
            horizon_s,
            self.config.moving_sample_step_s,
        );
        debug!(
            zones = field.zones().len(),
            flyzones = self.flyzones.zones().len(),
            speed_mps = self.speed_mps,
            allowance,
            horizon_s,
            "obstacle field built"
        );

        let ctx = PlanContext {
            config: self.config,
            field,
            flyzones: &self.flyzones,
        };
        let plans = ctx.plan_segments(&self.points, self.eta_s, self.speed_mps, allowance);
        let results = run_segments(&ctx, &plans, deadline);

        let completed = results.iter().filter(|r| r.is_ok()).count();
        let mut outcomes = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(PathfinderError::DeadlineExceeded { segment, .. }) => {
                    warn!(segment, completed, "deadline exceeded");
                    return Err(PathfinderError::DeadlineExceeded { segment, completed });
                }
                Err(err) => {
                    warn!(kind = err.kind(), error = %err, "path adjustment failed");
                    return Err(err);
                }
            }
        }

        if let Some(segment) = first_over_budget(&outcomes) {
            return Ok(MissionOutcome::NeedsMoreTime { segment });
        }
        ctx.repair_joints(&plans, &mut outcomes, deadline)?;
        if let Some(segment) = first_over_budget(&outcomes) {
            return Ok(MissionOutcome::NeedsMoreTime { segment });
        }
        verify_turns(&self.points, &outcomes, self.config.turning_radius_m).inspect_err(|err| {
            warn!(kind = err.kind(), error = %err, "path adjustment failed");
        })?;
        Ok(MissionOutcome::Planned(outcomes))
    }
}

fn first_over_budget(outcomes: &[SegmentOutcome]) -> Option<usize> {
    outcomes
        .iter()
        .position(|outcome| matches!(outcome, SegmentOutcome::OverBudget))
}

impl PlanContext<'_> {
    /// Walk the mission in order, deciding which segments are blocked and
    /// when the vehicle can leave each waypoint.
    ///
    /// The first waypoint is reached at `eta_s`. A clear segment shifts the
    /// departure window by its straight flight time; a blocked one widens it
    /// by the extra time its detour budget allows.
    fn plan_segments(
        &self,
        points: &[Point],
        eta_s: f64,
        speed_mps: f64,
        allowance: f64,
    ) -> Vec<SegmentPlan> {
        let mut departure = TimeWindow::instant(eta_s);
        let mut plans: Vec<SegmentPlan> = points
            .windows(2)
            .enumerate()
            .map(|(index, pair)| {
                let (start, end) = (pair[0], pair[1]);
                let straight_m = distance(&start, &end);
                let direct = SegmentTiming {
                    departure,
                    speed_mps,
                    budget_m: straight_m,
                };
                let band = AltitudeBand::spanning(start.z, end.z);
                let blocked =
                    !Clearance::new(&self.field, self.flyzones, start, end, direct, band).straight_clear();
                let timing = if blocked {
                    SegmentTiming {
                        budget_m: allowance * straight_m,
                        ..direct
                    }
                } else {
                    direct
                };
                departure = timing.arrival(straight_m);
                SegmentPlan {
                    index,
                    start,
                    end,
                    timing,
                    blocked,
                    approach: None,
                    departure: None,
                }
            })
            .collect();

        for i in 0..plans.len() {
            if i > 0 && !plans[i - 1].blocked {
                plans[i].approach = Some(points[i - 1].with_z(0.0));
            }
            if i + 1 < plans.len() && !plans[i + 1].blocked {
                plans[i].departure = Some(points[i + 2].with_z(0.0));
            }
        }
        plans
    }

    /// Re-plan any detour whose turn at a waypoint shared with a neighbouring
    /// detour cannot be flown, now that the neighbour's points are known.
    fn repair_joints(
        &self,
        plans: &[SegmentPlan],
        outcomes: &mut [SegmentOutcome],
        deadline: &Deadline,
    ) -> PathfinderResult<()> {
        let turning_radius = self.config.turning_radius_m;
        for (i, plan) in plans.iter().enumerate() {
            let Some(detour) = outcomes[i].detour() else {
                continue;
            };
            let start = plan.start.with_z(0.0);
            let end = plan.end.with_z(0.0);
            let first = detour.points.first().copied().unwrap_or(end);
            let last = detour.points.last().copied().unwrap_or(start);

            let lead = i.checked_sub(1).map(|prev| {
                outcomes[prev]
                    .detour()
                    .and_then(|d| d.points.last().copied())
                    .unwrap_or(plans[prev].start.with_z(0.0))
            });
            let trail = plans.get(i + 1).map(|next| {
                outcomes[i + 1]
                    .detour()
                    .and_then(|d| d.points.first().copied())
                    .unwrap_or(next.end.with_z(0.0))
            });
            let lead_ok = lead.map_or(true, |p| arc_feasible(&p, &start, &first, turning_radius));
            let trail_ok = trail.map_or(true, |p| arc_feasible(&last, &end, &p, turning_radius));
            if lead_ok && trail_ok {
                continue;
            }

            debug!(segment = i, lead_ok, trail_ok, "re-planning detour against its neighbours");
            let hinted = SegmentPlan {
                approach: lead,
                departure: trail,
                ..*plan
            };
            outcomes[i] = evaluate_segment(self, &hinted, &deadline.for_worker()).map_err(|err| match err {
                PathfinderError::DeadlineExceeded { segment, .. } => {
                    warn!(segment, completed = i, "deadline exceeded");
                    PathfinderError::DeadlineExceeded { segment, completed: i }
                }
                other => {
                    warn!(kind = other.kind(), error = %other, "path adjustment failed");
                    other
                }
            })?;
        }
        Ok(())
    }
}

/// Reject any turn sharper than the turning radius allows, except those made
/// entirely of original waypoints.
fn verify_turns(points: &[Point], outcomes: &[SegmentOutcome], turning_radius: f64) -> PathfinderResult<()> {
    // (position, inserted, segment)
    let mut route: Vec<(Point, bool, usize)> = Vec::with_capacity(points.len());
    for (i, outcome) in outcomes.iter().enumerate() {
        route.push((points[i].with_z(0.0), false, i));
        if let Some(detour) = outcome.detour() {
            route.extend(detour.points.iter().map(|p| (p.with_z(0.0), true, i)));
        }
    }
    if let Some(last) = points.last() {
        route.push((last.with_z(0.0), false, outcomes.len().saturating_sub(1)));
    }

    for w in route.windows(3) {
        if w.iter().all(|&(_, inserted, _)| !inserted) {
            continue;
        }
        if !arc_feasible(&w[0].0, &w[1].0, &w[2].0, turning_radius) {
            return Err(PathfinderError::infeasible(
                w[1].2,
                "adjusted path has a turn sharper than the turning radius allows",
            ));
        }
    }
    Ok(())
}

fn run_segments(
    ctx: &PlanContext<'_>,
    plans: &[SegmentPlan],
    deadline: &Deadline,
) -> Vec<PathfinderResult<SegmentOutcome>> {
    let mut results = Vec::with_capacity(plans.len());

    if !ctx.config.parallel_segments || plans.len() < 2 {
        for plan in plans {
            let result = evaluate_segment(ctx, plan, &deadline.for_worker());
            let failed = result.is_err();
            results.push(result);
            if failed {
                break;
            }
        }
        return results;
    }

    let workers = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    for chunk in plans.chunks(workers) {
        std::thread::scope(|s| {
            let handles: Vec<_> = chunk
                .iter()
                .map(|plan| {
                    let worker_deadline = deadline.for_worker();
                    s.spawn(move || evaluate_segment(ctx, plan, &worker_deadline))
                })
                .collect();
            for handle in handles {
                results.push(handle.join().unwrap_or_else(|_| {
                    Err(PathfinderError::Worker {
                        reason: "segment worker panicked".to_string(),
                    })
                }));
            }
        });
        if results.iter().any(Result::is_err) {
            break;
        }
    }
    results
}

fn evaluate_segment(
    ctx: &PlanContext<'_>,
    plan: &SegmentPlan,
    deadline: &Deadline,
) -> PathfinderResult<SegmentOutcome> {
    if !plan.blocked {
        return Ok(SegmentOutcome::Unchanged);
    }
    let _span = tracing::debug_span!("segment", index = plan.index).entered();
    let config = ctx.config;
    let deadline_err = || PathfinderError::DeadlineExceeded {
        segment: plan.index,
        completed: 0,
    };

    let clearance = Clearance::new(
        &ctx.field,
        ctx.flyzones,
        plan.start,
        plan.end,
        plan.timing,
        plan.band(),
    );
    for (which, clear) in [("start", clearance.start_clear()), ("end", clearance.end_clear())] {
        if !clear {
            return Err(PathfinderError::infeasible(
                plan.index,
                format!("{which} waypoint lies inside an avoid zone or outside every flyzone"),
            ));
        }
    }
    debug!(
        zones = clearance.zones().len(),
        departure_start_s = plan.timing.departure.start_s,
        departure_end_s = plan.timing.departure.end_s,
        budget_m = plan.timing.budget_m,
        "segment blocked, planning detour"
    );

    let limits = PathLimits {
        turning_radius: config.turning_radius_m,
        max_length_m: plan.timing.budget_m,
        approach: plan.approach,
        departure: plan.departure,
    };
    let mut reason = "no candidate nodes around the obstacles";
    let mut over_budget = false;
    for attempt in 0..=config.max_segment_retries {
        deadline.check().map_err(|_| deadline_err())?;

        let generator = NodeGenerator::new(GeneratorParams::for_attempt(config, attempt), ctx.flyzones);
        let zones = generator.relevant_zones(&plan.start, &plan.end, clearance.zones());
        let nodes = generator.generate(&plan.start, &plan.end, &zones);
        let graph = AvoidanceGraph::build(plan.start, plan.end, &nodes, &clearance, deadline)
            .map_err(|_| deadline_err())?;
        debug!(
            attempt,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "avoidance graph built"
        );

        if !graph.endpoints_connected() {
            over_budget |= nodes.iter().any(|node| !clearance.within_budget(&node.point));
            reason = "obstacles leave no gap between the waypoints";
            warn!(attempt, reason, "retrying segment");
            continue;
        }

        let outcome = search::find_path(&graph, &limits, deadline);
        match outcome.path {
            Some(path) => {
                let best_effort = !outcome.proven_optimal;
                if best_effort {
                    warn!(cost_m = outcome.cost_m, "deadline reached, using best path found so far");
                } else {
                    debug!(cost_m = outcome.cost_m, hops = path.len() - 1, "detour found");
                }
                let interior = path[1..path.len().saturating_sub(1)].to_vec();
                return Ok(SegmentOutcome::Detoured(Detour {
                    points: interior,
                    best_effort,
                    graph_nodes: graph.node_count(),
                    graph_edges: graph.edge_count(),
                    expanded: outcome.expanded,
                }));
            }
            None if outcome.deadline_hit => return Err(deadline_err()),
            None => {
                over_budget |= outcome.length_pruned;
                reason = "no path respects the turning radius";
                warn!(attempt, reason, "retrying segment");
            }
        }
    }

    if over_budget {
        debug!(budget_m = plan.timing.budget_m, "no detour fits the time budget");
        return Ok(SegmentOutcome::OverBudget);
    }
    Err(PathfinderError::infeasible(
        plan.index,
        format!(
            "{reason} after {} attempts",
            config.max_segment_retries.saturating_add(1)
        ),
    ))
}

/// Splice detour points between the original waypoints. Inserted points take
/// altitude from their position along the detour.
fn stitch(
    frame: &LocalFrame,
    original: &[Waypoint],
    points: &[Point],
    outcomes: &[SegmentOutcome],
    config: &EngineConfig,
) -> Vec<Waypoint> {
    let mut out = Vec::with_capacity(original.len());
    for (i, outcome) in outcomes.iter().enumerate() {
        out.push(original[i]);
        let SegmentOutcome::Detoured(detour) = outcome else {
            continue;
        };

        let (start, end) = (points[i], points[i + 1]);
        let mut legs = Vec::with_capacity(detour.points.len() + 1);
        let mut prev = start;
        for p in detour.points.iter().chain(std::iter::once(&end)) {
            legs.push(distance(&prev, p));
            prev = *p;
        }
        let total: f64 = legs.iter().sum();

        let mut travelled = 0.0;
        for (p, leg) in detour.points.iter().zip(&legs) {
            travelled += leg;
            let ratio = if total > 0.0 { travelled / total } else { 0.0 };
            let alt = start.z + (end.z - start.z) * ratio;
            out.push(Waypoint {
                location: frame.to_location(&p.with_z(alt)),
                radius: config.virtual_waypoint_radius_m,
            });
        }
    }
    if let Some(last) = original.last() {
        out.push(*last);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Location, StationaryObstacle, Telemetry};
    use crate::obstacles::{AvoidZone, ZoneSource};
    use std::time::Duration;

    fn request_with_obstacle(radius: f64) -> AdjustPathRequest {
        let waypoints = vec![
            Waypoint::new(10.0, 10.0, 50.0, 5.0),
            Waypoint::new(10.0, 10.01, 50.0, 5.0),
        ];
        let telemetry = Telemetry::at(waypoints[0].location);
        let mut request = AdjustPathRequest::new(waypoints, telemetry);
        request.stationary_obstacles.push(StationaryObstacle {
            lat: 10.0,
            lon: 10.005,
            height: 100.0,
            radius,
            avoid_radius: 0.0,
        });
        request
    }

    fn stationary_field(x: f64, y: f64, radius: f64) -> ObstacleField {
        ObstacleField::from_zones(
            vec![AvoidZone {
                source: ZoneSource::Stationary { index: 0 },
                center: Point::flat(x, y),
                radius,
                floor_m: 0.0,
                ceiling_m: 200.0,
                active: None,
            }],
            0.0,
        )
    }

    #[test]
    fn timeline_widens_after_a_blocked_segment() {
        let config = EngineConfig::default();
        let flyzones = FlyzoneMap::unbounded();
        let ctx = PlanContext {
            config: &config,
            field: stationary_field(150.0, 150.0, 20.0),
            flyzones: &flyzones,
        };
        let points = [
            Point::flat(0.0, 0.0),
            Point::flat(150.0, 0.0),
            Point::flat(150.0, 300.0),
            Point::flat(150.0, 600.0),
        ];
        let plans = ctx.plan_segments(&points, 10.0, 15.0, 1.5);

        assert!(!plans[0].blocked);
        assert_eq!(plans[0].timing.departure, TimeWindow::instant(10.0));
        assert_eq!(plans[0].departure, None);

        assert!(plans[1].blocked);
        assert_eq!(plans[1].timing.departure, TimeWindow::instant(20.0));
        assert_eq!(plans[1].timing.budget_m, 450.0);
        assert_eq!(plans[1].approach, Some(points[0]));
        assert_eq!(plans[1].departure, Some(points[3]));

        assert!(!plans[2].blocked);
        assert_eq!(plans[2].timing.departure, TimeWindow::new(40.0, 50.0));
        assert_eq!(plans[2].approach, None);
    }

    #[test]
    fn sharp_turn_onto_a_detour_is_rejected() {
        let points = [Point::flat(0.0, 0.0), Point::flat(100.0, 0.0), Point::flat(200.0, 0.0)];
        let outcomes = [
            SegmentOutcome::Unchanged,
            SegmentOutcome::Detoured(Detour {
                points: vec![Point::flat(90.0, 10.0)],
                best_effort: false,
                graph_nodes: 0,
                graph_edges: 0,
                expanded: 0,
            }),
        ];
        let err = verify_turns(&points, &outcomes, 5.0).unwrap_err();
        assert!(matches!(err, PathfinderError::Infeasible { segment: 1, .. }));
    }

    #[test]
    fn hairpin_between_original_waypoints_is_left_alone() {
        let points = [Point::flat(0.0, 0.0), Point::flat(100.0, 0.0), Point::flat(0.0, 1.0)];
        let outcomes = [SegmentOutcome::Unchanged, SegmentOutcome::Unchanged];
        assert!(verify_turns(&points, &outcomes, 50.0).is_ok());
    }

    #[test]
    fn short_detour_around_single_obstacle() {
        let request = request_with_obstacle(100.0);
        let config = EngineConfig::default();
        let adjusted = adjust_path(&request, &config).unwrap().unwrap();
        assert!(adjusted.waypoints.len() > 2);
        assert_eq!(adjusted.waypoints[0], request.waypoints[0]);
        assert_eq!(adjusted.waypoints.last(), request.waypoints.last());
        assert_eq!(adjusted.stats.segments_detoured, 1);

        let frame = LocalFrame::new(request.waypoints[0].location);
        let center = frame.to_point(&Location::new(10.0, 10.005, 0.0));
        let pts: Vec<Point> = adjusted
            .waypoints
            .iter()
            .map(|wp| frame.to_point(&wp.location))
            .collect();
        for p in &pts {
            assert!(distance(p, &center) > 102.0);
            assert!((p.z - 50.0).abs() < 1e-6);
        }
        for w in pts.windows(3) {
            assert!(arc_feasible(&w[0], &w[1], &w[2], config.turning_radius_m));
        }
        for wp in &adjusted.waypoints[1..adjusted.waypoints.len() - 1] {
            assert_eq!(wp.radius, config.virtual_waypoint_radius_m);
        }
    }

    #[test]
    fn sequential_and_parallel_agree() {
        let mut request = request_with_obstacle(60.0);
        request.waypoints.push(Waypoint::new(10.01, 10.01, 50.0, 5.0));
        request.stationary_obstacles.push(StationaryObstacle {
            lat: 10.005,
            lon: 10.01,
            height: 100.0,
            radius: 40.0,
            avoid_radius: 0.0,
        });
        let parallel = adjust_path(&request, &EngineConfig::default()).unwrap().unwrap();
        let sequential = adjust_path(
            &request,
            &EngineConfig {
                parallel_segments: false,
                ..EngineConfig::default()
            },
        )
        .unwrap()
        .unwrap();
        assert_eq!(parallel.waypoints, sequential.waypoints);
        assert_eq!(parallel.stats.segments_detoured, 2);
    }

    #[test]
    fn waypoint_inside_zone_is_infeasible() {
        let mut request = request_with_obstacle(50.0);
        request.stationary_obstacles[0].lon = 10.01;
        let err = adjust_path(&request, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, PathfinderError::Infeasible { segment: 0, .. }));
    }

    #[test]
    fn zero_budget_reports_deadline() {
        let request = request_with_obstacle(100.0);
        let config = EngineConfig {
            max_process_time: Duration::ZERO,
            ..EngineConfig::default()
        };
        let err = adjust_path(&request, &config).unwrap_err();
        assert_eq!(
            err,
            PathfinderError::DeadlineExceeded {
                segment: 0,
                completed: 0
            }
        );
    }

    #[test]
    fn obstacle_below_flight_level_is_ignored() {
        let mut request = request_with_obstacle(100.0);
        request.stationary_obstacles[0].height = 20.0;
        assert_eq!(adjust_path(&request, &EngineConfig::default()).unwrap(), None);
    }
}
