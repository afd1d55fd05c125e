//! Engine configuration from a JSON file and the environment.

use anyhow::Context;
use pathfinder_core::EngineConfig;
use std::env;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(EngineConfig::default(), |key| env::var(key).ok())
    }

    /// Start from a JSON engine config file, then apply the environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let base = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading engine config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("parsing engine config {}", path.display()))?
            }
            None => EngineConfig::default(),
        };
        Ok(Self::from_vars(base, |key| env::var(key).ok()))
    }

    /// Apply `PATHFINDER_*` overrides. Unparseable values keep the base value.
    pub fn from_vars(base: EngineConfig, var: impl Fn(&str) -> Option<String>) -> Self {
        let number = |key: &str, fallback: f64| {
            var(key)
                .and_then(|s| s.trim().parse::<f64>().ok())
                .unwrap_or(fallback)
        };
        let flag = |key: &str, fallback: bool| var(key).and_then(|s| parse_flag(&s)).unwrap_or(fallback);

        let engine = EngineConfig {
            buffer_size_m: number("PATHFINDER_BUFFER_M", base.buffer_size_m),
            max_process_time: var("PATHFINDER_MAX_PROCESS_TIME_S")
                .and_then(|s| s.trim().parse::<f64>().ok())
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .unwrap_or(base.max_process_time),
            turning_radius_m: number("PATHFINDER_TURNING_RADIUS_M", base.turning_radius_m),
            vertex_merge_threshold_m: number("PATHFINDER_VERTEX_MERGE_M", base.vertex_merge_threshold_m),
            virtualize_flyzone: flag("PATHFINDER_VIRTUALIZE_FLYZONE", base.virtualize_flyzone),
            parallel_segments: flag("PATHFINDER_PARALLEL", base.parallel_segments),
            ..base
        };
        Self { engine }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn with(vars: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(EngineConfig::default(), |key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(with(&[]).engine, EngineConfig::default());
    }

    #[test]
    fn environment_overrides_values() {
        let config = with(&[
            ("PATHFINDER_BUFFER_M", "4.5"),
            ("PATHFINDER_MAX_PROCESS_TIME_S", "0.5"),
            ("PATHFINDER_TURNING_RADIUS_M", "12"),
            ("PATHFINDER_VIRTUALIZE_FLYZONE", "off"),
            ("PATHFINDER_PARALLEL", "0"),
        ]);
        assert_eq!(config.engine.buffer_size_m, 4.5);
        assert_eq!(config.engine.max_process_time, Duration::from_millis(500));
        assert_eq!(config.engine.turning_radius_m, 12.0);
        assert!(!config.engine.virtualize_flyzone);
        assert!(!config.engine.parallel_segments);
        assert_eq!(config.engine.vertex_merge_threshold_m, 5.0);
    }

    #[test]
    fn garbage_values_fall_back() {
        let config = with(&[
            ("PATHFINDER_BUFFER_M", "wide"),
            ("PATHFINDER_MAX_PROCESS_TIME_S", "-3"),
            ("PATHFINDER_PARALLEL", "maybe"),
        ]);
        assert_eq!(config.engine, EngineConfig::default());
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/pathfinder.json"))).unwrap_err();
        assert!(err.to_string().contains("reading engine config"));
    }
}
