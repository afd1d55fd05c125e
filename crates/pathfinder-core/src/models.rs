//! Request and response data models for the path adjustment engine.

use crate::error::{PathfinderError, PathfinderResult};
use serde::{Deserialize, Serialize};

fn default_mov_obs_time_limit() -> f64 {
    30.0
}

/// A geographic position: degrees, degrees, meters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    #[serde(default, alias = "altitude_m")]
    pub alt: f64,
}

impl Location {
    pub const fn new(lat: f64, lon: f64, alt: f64) -> Self {
        Self { lat, lon, alt }
    }

    fn validate(&self, what: &str) -> PathfinderResult<()> {
        if !self.lat.is_finite() || !self.lon.is_finite() || !self.alt.is_finite() {
            return Err(PathfinderError::invalid(format!(
                "{what} has a non-finite coordinate"
            )));
        }
        if !(-90.0..=90.0).contains(&self.lat) {
            return Err(PathfinderError::invalid(format!(
                "{what} latitude {} is outside [-90, 90]",
                self.lat
            )));
        }
        if !(-180.0..=180.0).contains(&self.lon) {
            return Err(PathfinderError::invalid(format!(
                "{what} longitude {} is outside [-180, 180]",
                self.lon
            )));
        }
        Ok(())
    }
}

/// A mission waypoint with its acceptance radius in meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    #[serde(flatten)]
    pub location: Location,
    pub radius: f64,
}

impl Waypoint {
    pub const fn new(lat: f64, lon: f64, alt: f64, radius: f64) -> Self {
        Self {
            location: Location::new(lat, lon, alt),
            radius,
        }
    }
}

/// Vehicle telemetry snapshot. Fields the caller did not report stay `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Telemetry {
    #[serde(flatten)]
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub yaw: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roll: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub airspeed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groundspeed: Option<f64>,
    #[serde(default, alias = "windDir", skip_serializing_if = "Option::is_none")]
    pub wind_dir: Option<f64>,
}

impl Telemetry {
    pub fn at(location: Location) -> Self {
        Self {
            location,
            ..Self::default()
        }
    }

    /// Best known speed over ground: groundspeed, then airspeed.
    pub fn known_speed(&self) -> Option<f64> {
        [self.groundspeed, self.airspeed]
            .into_iter()
            .flatten()
            .find(|speed| speed.is_finite() && *speed > 0.0)
    }
}

/// A fixed vertical cylinder standing on the ground.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StationaryObstacle {
    pub lat: f64,
    pub lon: f64,
    pub height: f64,
    pub radius: f64,
    #[serde(default)]
    pub avoid_radius: f64,
}

impl StationaryObstacle {
    pub fn location(&self) -> Location {
        Location::new(self.lat, self.lon, 0.0)
    }
}

/// An obstacle moving in a straight line at constant speed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MovingObstacle {
    #[serde(flatten)]
    pub location: Location,
    /// Ground speed in m/s.
    pub speed: f64,
    /// Compass heading in degrees (0 = north, 90 = east).
    pub direction: f64,
    pub radius: f64,
    #[serde(default)]
    pub avoid_radius: f64,
}

/// Per-call tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustPathOptions {
    /// How far ahead, in seconds, moving obstacles are projected.
    #[serde(default = "default_mov_obs_time_limit")]
    pub mov_obs_time_limit: f64,
    /// Polygons the vehicle must stay inside. Empty means unbounded.
    #[serde(default)]
    pub flyzones: Vec<Vec<Location>>,
}

impl Default for AdjustPathOptions {
    fn default() -> Self {
        Self {
            mov_obs_time_limit: default_mov_obs_time_limit(),
            flyzones: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustPathRequest {
    pub waypoints: Vec<Waypoint>,
    pub telemetry: Telemetry,
    #[serde(default, alias = "stationary_obstacles")]
    pub stationary_obstacles: Vec<StationaryObstacle>,
    #[serde(default, alias = "moving_obstacles")]
    pub moving_obstacles: Vec<MovingObstacle>,
    #[serde(default)]
    pub options: AdjustPathOptions,
}

impl AdjustPathRequest {
    pub fn new(waypoints: Vec<Waypoint>, telemetry: Telemetry) -> Self {
        Self {
            waypoints,
            telemetry,
            stationary_obstacles: Vec::new(),
            moving_obstacles: Vec::new(),
            options: AdjustPathOptions::default(),
        }
    }

    pub fn has_obstacles(&self) -> bool {
        !self.stationary_obstacles.is_empty() || !self.moving_obstacles.is_empty()
    }

    /// Reject malformed geometry before any planning work starts.
    pub fn validate(&self) -> PathfinderResult<()> {
        for (i, wp) in self.waypoints.iter().enumerate() {
            wp.location.validate(&format!("waypoint {i}"))?;
            non_negative(wp.radius, &format!("waypoint {i} radius"))?;
        }

        let t = &self.telemetry;
        t.location.validate("telemetry")?;
        for (name, value) in [
            ("yaw", t.yaw),
            ("pitch", t.pitch),
            ("roll", t.roll),
            ("airspeed", t.airspeed),
            ("groundspeed", t.groundspeed),
            ("wind_dir", t.wind_dir),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(PathfinderError::invalid(format!(
                    "telemetry {name} is not finite"
                )));
            }
        }

        for (i, obs) in self.stationary_obstacles.iter().enumerate() {
            let what = format!("stationary obstacle {i}");
            obs.location().validate(&what)?;
            non_negative(obs.radius, &format!("{what} radius"))?;
            non_negative(obs.avoid_radius, &format!("{what} avoid_radius"))?;
            non_negative(obs.height, &format!("{what} height"))?;
        }

        for (i, obs) in self.moving_obstacles.iter().enumerate() {
            let what = format!("moving obstacle {i}");
            obs.location.validate(&what)?;
            non_negative(obs.radius, &format!("{what} radius"))?;
            non_negative(obs.avoid_radius, &format!("{what} avoid_radius"))?;
            non_negative(obs.speed, &format!("{what} speed"))?;
            if !obs.direction.is_finite() {
                return Err(PathfinderError::invalid(format!(
                    "{what} direction is not finite"
                )));
            }
        }

        non_negative(self.options.mov_obs_time_limit, "mov_obs_time_limit")?;

        for (i, zone) in self.options.flyzones.iter().enumerate() {
            if zone.len() < 3 {
                return Err(PathfinderError::invalid(format!(
                    "flyzone {i} needs at least 3 vertices, got {}",
                    zone.len()
                )));
            }
            for (j, vertex) in zone.iter().enumerate() {
                vertex.validate(&format!("flyzone {i} vertex {j}"))?;
            }
        }

        Ok(())
    }
}

fn non_negative(value: f64, what: &str) -> PathfinderResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(PathfinderError::invalid(format!(
            "{what} must be a non-negative finite number, got {value}"
        )));
    }
    Ok(())
}

/// Summary of the work done by one adjustment call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdjustStats {
    pub segments_evaluated: usize,
    pub segments_detoured: usize,
    /// Segments whose path was taken from the incumbent when the deadline hit.
    pub best_effort_segments: usize,
    pub graph_nodes: usize,
    pub graph_edges: usize,
    pub states_expanded: usize,
    /// Times the detour time allowance was doubled to fit a detour.
    #[serde(default)]
    pub time_widenings: usize,
    pub elapsed_ms: u64,
}

/// A replacement waypoint list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustedPath {
    pub waypoints: Vec<Waypoint>,
    pub stats: AdjustStats,
}
