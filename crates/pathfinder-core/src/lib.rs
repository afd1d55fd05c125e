//! Flight path adjustment around stationary and moving obstacles.
//!
//! [`adjust_path`] takes a waypoint list, current telemetry and obstacle
//! snapshots, and returns either `None` (the path is fine as is) or a revised
//! waypoint list whose detours respect the vehicle's turning radius and the
//! configured time budget.

pub mod config;
pub mod deadline;
pub mod error;
pub mod flyzone;
pub mod graph;
pub mod models;
pub mod obstacles;
pub mod route_engine;
pub mod search;
pub mod spatial;

pub use config::EngineConfig;
pub use deadline::{Deadline, DeadlineReached};
pub use error::{PathfinderError, PathfinderResult};
pub use models::{
    AdjustPathOptions, AdjustPathRequest, AdjustStats, AdjustedPath, Location, MovingObstacle,
    StationaryObstacle, Telemetry, Waypoint,
};
pub use obstacles::{AvoidZone, ObstacleField, TimeWindow};
pub use route_engine::{adjust_path, adjust_path_async};
pub use spatial::{LocalFrame, Point};
