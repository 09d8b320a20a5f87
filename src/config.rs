// src/config.rs

use crate::types::Config;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_yaml(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to the tuned defaults.
    /// The flag tells whether the file was found.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<(Self, bool)> {
        let path = path.as_ref();
        if path.exists() {
            Ok((Self::load(path)?, true))
        } else {
            Ok((Self::default(), false))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::MorphStep;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
speed:
  max_speed: 40.0
lane:
  max_gap_ratio: 1.5
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.speed.max_speed, 40.0);
        assert_eq!(config.speed.min_speed, 15.0);
        assert_eq!(config.lane.max_gap_ratio, 1.5);
        assert_eq!(config.lane.min_zone_mass, 300.0);
        assert_eq!(config.steering.max_angle, 35.0);
    }

    #[test]
    fn test_morphology_sequence_from_yaml() {
        let yaml = r#"
preprocess:
  morphology:
    - op: erode
      iterations: 1
    - op: dilate
      iterations: 3
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(
            config.preprocess.morphology,
            vec![MorphStep::Erode(1), MorphStep::Dilate(3)]
        );
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let (config, found) = Config::load_or_default("definitely/not/here.yaml").unwrap();
        assert!(!found);
        assert_eq!(config.transport.jpeg_quality, 50);
    }

    #[test]
    fn test_existing_file_is_loaded_and_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("robot.yaml");
        fs::write(&path, "transport:\n  jpeg_quality: 80\n").unwrap();

        let (config, found) = Config::load_or_default(&path).unwrap();
        assert!(found);
        assert_eq!(config.transport.jpeg_quality, 80);
        assert_eq!(config.speed.max_speed, 50.0);
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config.yaml");
        let config = Config::load(path).unwrap();
        let defaults = Config::default();
        assert_eq!(config.preprocess.morphology, defaults.preprocess.morphology);
        assert_eq!(config.perspective, defaults.perspective);
        assert_eq!(config.lane, defaults.lane);
        assert_eq!(config.steering, defaults.steering);
        assert_eq!(config.speed, defaults.speed);
        assert_eq!(config.transport, defaults.transport);
        assert_eq!(config.relay, defaults.relay);
        assert_eq!(config.source, defaults.source);
        assert!((config.preprocess.roi_start_fraction - 1.0 / 1.4).abs() < 1e-6);
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        fs::write(&path, "speed: [not, a, map]").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
