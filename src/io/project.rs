use crate::types::{NdviError, NdviResult, SensorConfig};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Flat key/value project descriptor as stored on disk.
///
/// One `key = value` pair per line; `#` starts a comment. Keys are opaque
/// strings; typed accessors live on [`ProjectConfig`].
#[derive(Debug, Clone, Default)]
pub struct ProjectDescriptor {
    values: HashMap<String, String>,
}

impl ProjectDescriptor {
    pub fn parse(text: &str) -> NdviResult<Self> {
        let line_re = Regex::new(r"^\s*([A-Za-z0-9_.\-]+)\s*=\s*(.*?)\s*$")
            .map_err(|e| NdviError::Domain(format!("descriptor regex: {}", e)))?;

        let mut values = HashMap::new();
        for (number, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let captures = line_re.captures(trimmed).ok_or_else(|| {
                NdviError::Domain(format!(
                    "malformed descriptor line {}: '{}'",
                    number + 1,
                    trimmed
                ))
            })?;
            values.insert(captures[1].to_string(), captures[2].to_string());
        }
        Ok(Self { values })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> NdviResult<Self> {
        log::info!(
            "Loading project descriptor from: {}",
            path.as_ref().display()
        );
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    fn require(&self, key: &str) -> NdviResult<&str> {
        self.get(key)
            .ok_or_else(|| NdviError::Configuration(format!("missing descriptor key '{}'", key)))
    }

    fn require_i64(&self, key: &str) -> NdviResult<i64> {
        let raw = self.require(key)?;
        raw.parse::<i64>()
            .map_err(|e| NdviError::Domain(format!("descriptor key '{}' = '{}': {}", key, raw, e)))
    }
}

/// Typed run configuration assembled from a project descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub sensors: SensorConfig,
    /// Increment added to every ROI code at catalog ingestion.
    pub roi_code_increment: i64,
    pub trace_path: PathBuf,
    pub report_dir: PathBuf,
}

impl ProjectConfig {
    pub fn from_descriptor(descriptor: &ProjectDescriptor) -> NdviResult<Self> {
        let config = Self {
            sensors: SensorConfig::new(
                descriptor.require("sensor.primary")?,
                descriptor.require("sensor.secondary")?,
            ),
            roi_code_increment: descriptor.require_i64("roi.code_increment")?,
            trace_path: PathBuf::from(descriptor.require("output.trace")?),
            report_dir: PathBuf::from(descriptor.require("output.reports")?),
        };
        log::debug!(
            "Project configuration: sensors '{}'/'{}', ROI increment {}",
            config.sensors.primary_tag,
            config.sensors.secondary_tag,
            config.roi_code_increment
        );
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> NdviResult<Self> {
        Self::from_descriptor(&ProjectDescriptor::load(path)?)
    }

    /// Path of the fixed-width summary table for a sensor tag.
    pub fn summary_path(&self, tag: &str) -> PathBuf {
        self.report_dir.join(format!("ndvi_summary_{}.txt", tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = "\
# test project
sensor.primary = AVH
sensor.secondary = MOD
roi.code_increment = 100000
output.trace = /tmp/run/trace.log
output.reports = /tmp/run/reports
";

    #[test]
    fn test_parse_descriptor() {
        let descriptor = ProjectDescriptor::parse(DESCRIPTOR).unwrap();
        assert_eq!(descriptor.get("sensor.primary"), Some("AVH"));
        assert_eq!(descriptor.get("roi.code_increment"), Some("100000"));
        assert_eq!(descriptor.get("nonexistent"), None);
    }

    #[test]
    fn test_config_from_descriptor() {
        let descriptor = ProjectDescriptor::parse(DESCRIPTOR).unwrap();
        let config = ProjectConfig::from_descriptor(&descriptor).unwrap();
        assert_eq!(config.roi_code_increment, 100_000);
        assert_eq!(config.sensors.secondary_tag, "MOD");
        assert_eq!(
            config.summary_path("AVH"),
            PathBuf::from("/tmp/run/reports/ndvi_summary_AVH.txt")
        );
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let descriptor = ProjectDescriptor::parse("sensor.primary = AVH\n").unwrap();
        let result = ProjectConfig::from_descriptor(&descriptor);
        assert!(matches!(result, Err(NdviError::Configuration(_))));
    }

    #[test]
    fn test_non_numeric_increment_is_domain_error() {
        let text = DESCRIPTOR.replace("100000", "many");
        let descriptor = ProjectDescriptor::parse(&text).unwrap();
        let result = ProjectConfig::from_descriptor(&descriptor);
        assert!(matches!(result, Err(NdviError::Domain(_))));
    }

    #[test]
    fn test_malformed_line_is_domain_error() {
        let result = ProjectDescriptor::parse("sensor.primary AVH\n");
        assert!(matches!(result, Err(NdviError::Domain(_))));
    }
}
