//! Logging configuration
//!
//! Per-component log levels, output destinations and file rotation.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// How often the JSON log file rolls over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    Hourly,
    Daily,
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    pub global_level: String,

    /// Enable console output
    pub console_output: bool,

    /// Directory for JSON log files (None = no file logging)
    pub log_directory: Option<PathBuf>,

    /// Include file location in logs
    pub include_file_location: bool,

    /// Level for registration algorithms
    pub algorithm_level: String,

    /// Level for stack alignment
    pub pipeline_level: String,

    /// Level for symmetrization and radial reduction
    pub analysis_level: String,

    pub rotation: LogRotation,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            global_level: "info".to_string(),
            console_output: true,
            log_directory: None,
            include_file_location: false,
            algorithm_level: "info".to_string(),
            pipeline_level: "info".to_string(),
            analysis_level: "info".to_string(),
            rotation: LogRotation::Daily,
        }
    }
}

impl LoggingConfig {
    /// Verbose configuration for working on the algorithms themselves
    pub fn development() -> Self {
        Self {
            global_level: "debug".to_string(),
            console_output: true,
            log_directory: Some(PathBuf::from("logs")),
            include_file_location: true,
            algorithm_level: "trace".to_string(),
            pipeline_level: "debug".to_string(),
            analysis_level: "debug".to_string(),
            rotation: LogRotation::Hourly,
        }
    }

    /// Warnings only, console output
    pub fn quiet() -> Self {
        Self {
            global_level: "warn".to_string(),
            algorithm_level: "warn".to_string(),
            pipeline_level: "warn".to_string(),
            analysis_level: "warn".to_string(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let levels = [
            ("global_level", &self.global_level),
            ("algorithm_level", &self.algorithm_level),
            ("pipeline_level", &self.pipeline_level),
            ("analysis_level", &self.analysis_level),
        ];

        for (name, level) in levels {
            if !VALID_LEVELS.contains(&level.as_str()) {
                return Err(format!(
                    "Invalid {}: {}. Must be one of: {:?}",
                    name, level, VALID_LEVELS
                ));
            }
        }

        if let Some(ref log_dir) = self.log_directory {
            if let Some(parent) = log_dir.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(format!("Log directory parent does not exist: {:?}", parent));
                }
            }
        }

        Ok(())
    }

    /// Effective level for a component: "algorithm", "pipeline" or "analysis".
    pub fn get_component_level(&self, component: &str) -> &str {
        match component {
            "algorithm" | "algorithms" => &self.algorithm_level,
            "pipeline" => &self.pipeline_level,
            "analysis" => &self.analysis_level,
            _ => &self.global_level,
        }
    }

    /// `EnvFilter` directives covering every component of this crate.
    pub fn filter_directives(&self, crate_name: &str) -> String {
        format!(
            "{crate_name}={},{crate_name}::algorithms={},{crate_name}::pipeline={},{crate_name}::analysis={}",
            self.global_level,
            self.get_component_level("algorithm"),
            self.get_component_level("pipeline"),
            self.get_component_level("analysis")
        )
    }
}
