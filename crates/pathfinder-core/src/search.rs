//! Turn-constrained best-first search over the avoidance graph.
//!
//! A search state is a (node, predecessor) pair, so the bend at each node can
//! be checked against the turning radius before an edge is expanded. An edge
//! that is too sharp from one predecessor may still be taken from another.
//!
//! The bends at the segment endpoints are checked too when the caller says
//! which points are flown just before the start and just after the end.
//!
//! The open set is ordered by estimated total length, then hop count, then
//! accumulated turn, then push order. A complete path is recorded as soon as a
//! goal state is generated; the search keeps running until no open state can
//! beat it or the deadline is reached, in which case the best path so far is
//! returned unproven.

use crate::deadline::{Deadline, DeadlinePoll};
use crate::graph::AvoidanceGraph;
use crate::spatial::{arc_feasible, distance, turn_angle, Point};
use petgraph::graph::NodeIndex;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

const DEADLINE_POLL_INTERVAL: usize = 64;
const COST_EPS_M: f64 = 1e-6;
const TURN_EPS_RAD: f64 = 1e-9;

/// Constraints on an acceptable path beyond the graph's own edges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathLimits {
    pub turning_radius: f64,
    /// Longest acceptable path, meters.
    pub max_length_m: f64,
    /// Point flown just before the start node.
    pub approach: Option<Point>,
    /// Point flown just after the end node.
    pub departure: Option<Point>,
}

impl PathLimits {
    /// Only the turning radius applies.
    pub fn turning(turning_radius: f64) -> Self {
        Self {
            turning_radius,
            max_length_m: f64::INFINITY,
            approach: None,
            departure: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    /// Node positions from start to end, when any feasible path was found.
    pub path: Option<Vec<Point>>,
    pub cost_m: f64,
    /// No better path exists in the graph.
    pub proven_optimal: bool,
    pub deadline_hit: bool,
    /// Some partial path was dropped for exceeding `max_length_m`.
    pub length_pruned: bool,
    pub expanded: usize,
}

#[derive(Debug, Clone, Copy)]
struct FloatOrd(f64);

impl PartialEq for FloatOrd {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatOrd {}

impl PartialOrd for FloatOrd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatOrd {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenNode {
    f_score: FloatOrd,
    hops: usize,
    turn: FloatOrd,
    seq: usize,
    label: usize,
}

impl PartialEq for OpenNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenNode {}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.f_score
            .cmp(&other.f_score)
            .then_with(|| self.hops.cmp(&other.hops))
            .then_with(|| self.turn.cmp(&other.turn))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// One partial path: a node reached through a parent label.
#[derive(Debug, Clone, Copy)]
struct Label {
    node: NodeIndex,
    parent: Option<usize>,
    g_score: f64,
    hops: usize,
    turn: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Quality {
    cost: f64,
    hops: usize,
    turn: f64,
}

impl Quality {
    fn of(label: &Label) -> Self {
        Self {
            cost: label.g_score,
            hops: label.hops,
            turn: label.turn,
        }
    }

    /// Strictly better: shorter, then fewer hops, then less turning.
    fn beats(&self, other: &Quality) -> bool {
        if self.cost < other.cost - COST_EPS_M {
            return true;
        }
        if self.cost > other.cost + COST_EPS_M {
            return false;
        }
        if self.hops != other.hops {
            return self.hops < other.hops;
        }
        self.turn < other.turn - TURN_EPS_RAD
    }
}

type StateKey = (NodeIndex, Option<NodeIndex>);

pub fn find_path(graph: &AvoidanceGraph, limits: &PathLimits, deadline: &Deadline) -> SearchOutcome {
    let turning_radius = limits.turning_radius;
    let start = graph.start();
    let goal = graph.end();
    let goal_point = graph.node(goal).point;
    let heuristic = |index: NodeIndex| distance(&graph.node(index).point, &goal_point);

    let mut labels = vec![Label {
        node: start,
        parent: None,
        g_score: 0.0,
        hops: 0,
        turn: 0.0,
    }];
    let mut best: HashMap<StateKey, Quality> = HashMap::new();
    best.insert((start, None), Quality::of(&labels[0]));

    let mut open_set: BinaryHeap<Reverse<OpenNode>> = BinaryHeap::new();
    open_set.push(Reverse(OpenNode {
        f_score: FloatOrd(heuristic(start)),
        hops: 0,
        turn: FloatOrd(0.0),
        seq: 0,
        label: 0,
    }));
    let mut seq = 1usize;

    let mut incumbent: Option<(usize, Quality)> = None;
    let mut proven_optimal = true;
    let mut deadline_hit = false;
    let mut length_pruned = false;
    let mut expanded = 0usize;
    let mut poll = DeadlinePoll::new(deadline, DEADLINE_POLL_INTERVAL);

    while let Some(Reverse(current)) = open_set.pop() {
        if poll.tick().is_err() {
            deadline_hit = true;
            proven_optimal = false;
            break;
        }
        if let Some((_, best_found)) = incumbent {
            if current.f_score.0 > best_found.cost + COST_EPS_M {
                break;
            }
        }

        let label = labels[current.label];
        let pred = label.parent.map(|p| labels[p].node);
        let quality = Quality::of(&label);
        if best
            .get(&(label.node, pred))
            .is_some_and(|stored| stored.beats(&quality))
        {
            continue;
        }

        if label.node == goal {
            if incumbent.map_or(true, |(_, found)| quality.beats(&found)) {
                incumbent = Some((current.label, quality));
            }
            continue;
        }

        expanded += 1;
        let here = graph.node(label.node).point;
        let prev = match pred {
            Some(p) => Some(graph.node(p).point),
            None => limits.approach,
        };

        for (next, weight) in graph.neighbors_sorted(label.node) {
            if Some(next) == pred {
                continue;
            }
            let there = graph.node(next).point;
            let turn = match prev {
                Some(prev) => {
                    if !arc_feasible(&prev, &here, &there, turning_radius) {
                        continue;
                    }
                    turn_angle(&prev, &here, &there)
                }
                None => 0.0,
            };
            if next == goal {
                if let Some(after) = limits.departure {
                    if !arc_feasible(&here, &there, &after, turning_radius) {
                        continue;
                    }
                }
            }

            let next_label = Label {
                node: next,
                parent: Some(current.label),
                g_score: label.g_score + weight,
                hops: label.hops + 1,
                turn: label.turn + turn,
            };
            let f_score = next_label.g_score + heuristic(next);
            if f_score > limits.max_length_m + COST_EPS_M {
                length_pruned = true;
                continue;
            }
            if let Some((_, found)) = incumbent {
                if f_score > found.cost + COST_EPS_M {
                    continue;
                }
            }

            let next_quality = Quality::of(&next_label);
            let key = (next, Some(label.node));
            if let Some(stored) = best.get(&key) {
                if !next_quality.beats(stored) {
                    continue;
                }
            }
            best.insert(key, next_quality);

            labels.push(next_label);
            let label_id = labels.len() - 1;
            if next == goal && incumbent.map_or(true, |(_, found)| next_quality.beats(&found)) {
                incumbent = Some((label_id, next_quality));
            }
            open_set.push(Reverse(OpenNode {
                f_score: FloatOrd(f_score),
                hops: next_label.hops,
                turn: FloatOrd(next_label.turn),
                seq,
                label: label_id,
            }));
            seq += 1;
        }
    }

    let Some((goal_label, quality)) = incumbent else {
        return SearchOutcome {
            path: None,
            cost_m: f64::INFINITY,
            proven_optimal,
            deadline_hit,
            length_pruned,
            expanded,
        };
    };

    let mut path = Vec::with_capacity(quality.hops + 1);
    let mut cursor = Some(goal_label);
    while let Some(id) = cursor {
        path.push(graph.node(labels[id].node).point);
        cursor = labels[id].parent;
    }
    path.reverse();

    SearchOutcome {
        path: Some(path),
        cost_m: quality.cost,
        proven_optimal,
        deadline_hit,
        length_pruned,
        expanded,
    }
}
