//! Engine configuration.

use crate::error::{PathfinderError, PathfinderResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound on `boundary_samples`; retries double it per attempt.
pub const MAX_BOUNDARY_SAMPLES: usize = 256;
pub const MAX_SEGMENT_RETRIES: usize = 4;

/// Engine-level tuning, longer-lived than a single call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Buffer added around every obstacle, meters.
    pub buffer_size_m: f64,
    /// Wall-clock budget for one whole call.
    #[serde(with = "duration_secs", rename = "max_process_time_s")]
    pub max_process_time: Duration,
    /// Minimum radius of curvature the vehicle can fly, meters.
    pub turning_radius_m: f64,
    /// Candidate nodes closer than this are merged, meters.
    pub vertex_merge_threshold_m: f64,
    /// Insert virtual nodes along obstacle perimeters and flyzone corners.
    pub virtualize_flyzone: bool,
    /// Time step between moving obstacle samples, seconds.
    pub moving_sample_step_s: f64,
    /// Cruise speed assumed when telemetry reports none, m/s.
    pub default_cruise_speed_mps: f64,
    /// Multiplier on straight-line traversal time for a segment's time window.
    pub detour_time_allowance: f64,
    /// Distance kept between virtual nodes and the avoid zone edge, meters.
    pub clearance_margin_m: f64,
    /// Virtual nodes placed around each obstacle perimeter.
    pub boundary_samples: usize,
    /// Acceptance radius given to inserted detour waypoints, meters.
    pub virtual_waypoint_radius_m: f64,
    pub max_segment_retries: usize,
    pub parallel_segments: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            buffer_size_m: 2.0,
            max_process_time: Duration::from_secs(10),
            turning_radius_m: 5.0,
            vertex_merge_threshold_m: 5.0,
            virtualize_flyzone: true,
            moving_sample_step_s: 1.0,
            default_cruise_speed_mps: 15.0,
            detour_time_allowance: 1.5,
            clearance_margin_m: 1.0,
            boundary_samples: 16,
            virtual_waypoint_radius_m: 0.5,
            max_segment_retries: 2,
            parallel_segments: true,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> PathfinderResult<()> {
        for (name, value) in [
            ("buffer_size_m", self.buffer_size_m),
            ("turning_radius_m", self.turning_radius_m),
            ("vertex_merge_threshold_m", self.vertex_merge_threshold_m),
            ("clearance_margin_m", self.clearance_margin_m),
            ("virtual_waypoint_radius_m", self.virtual_waypoint_radius_m),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PathfinderError::invalid(format!(
                    "{name} must be a non-negative finite number, got {value}"
                )));
            }
        }
        for (name, value) in [
            ("moving_sample_step_s", self.moving_sample_step_s),
            ("default_cruise_speed_mps", self.default_cruise_speed_mps),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(PathfinderError::invalid(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        if !self.detour_time_allowance.is_finite() || self.detour_time_allowance < 1.0 {
            return Err(PathfinderError::invalid(format!(
                "detour_time_allowance must be at least 1, got {}",
                self.detour_time_allowance
            )));
        }
        if !(3..=MAX_BOUNDARY_SAMPLES).contains(&self.boundary_samples) {
            return Err(PathfinderError::invalid(format!(
                "boundary_samples must be between 3 and {MAX_BOUNDARY_SAMPLES}, got {}",
                self.boundary_samples
            )));
        }
        if self.max_segment_retries > MAX_SEGMENT_RETRIES {
            return Err(PathfinderError::invalid(format!(
                "max_segment_retries must be at most {MAX_SEGMENT_RETRIES}, got {}",
                self.max_segment_retries
            )));
        }
        Ok(())
    }
}

/// `Duration` as fractional seconds on the wire.
pub(crate) mod duration_secs {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.buffer_size_m, 2.0);
        assert_eq!(config.max_process_time, Duration::from_secs(10));
        assert_eq!(config.turning_radius_m, 5.0);
        assert_eq!(config.vertex_merge_threshold_m, 5.0);
        assert!(config.virtualize_flyzone);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"max_process_time_s": 0.25, "turning_radius_m": 12}"#)
                .unwrap();
        assert_eq!(config.max_process_time, Duration::from_millis(250));
        assert_eq!(config.turning_radius_m, 12.0);
        assert_eq!(config.buffer_size_m, 2.0);
    }

    #[test]
    fn negative_process_time_is_rejected_at_parse() {
        let parsed: Result<EngineConfig, _> = serde_json::from_str(r#"{"max_process_time_s": -1}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let config = EngineConfig {
            turning_radius_m: f64::NAN,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            moving_sample_step_s: 0.0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            detour_time_allowance: 0.5,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_caps_retry_growth() {
        let config = EngineConfig {
            max_segment_retries: usize::MAX,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            boundary_samples: MAX_BOUNDARY_SAMPLES + 1,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            boundary_samples: MAX_BOUNDARY_SAMPLES,
            max_segment_retries: MAX_SEGMENT_RETRIES,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
