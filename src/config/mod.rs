use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::logging::LoggingConfig;
use crate::pipeline::{FailurePolicy, TrackingReference};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub registration: RegistrationConfig,
    pub stack: StackConfig,
    pub symmetry: SymmetryConfig,
    pub radial: RadialConfig,
    pub logging: LoggingConfig,
}

/// How the integer correlation peak is refined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubpixelMethod {
    /// Report the integer peak.
    None,
    /// Three-point parabola per axis through the peak and its neighbours.
    Parabolic,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistrationConfig {
    pub subpixel: SubpixelMethod,
    /// Displacements whose masks overlap on fewer pixels are never candidates.
    pub min_overlap_pixels: usize,
    /// Displacements overlapping on less than this fraction of the largest
    /// achievable overlap are never candidates.
    pub overlap_ratio: f64,
    /// Largest displacement searched along each axis; `None` searches all.
    pub max_shift: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StackConfig {
    pub failure_policy: FailurePolicy,
    pub tracking_reference: TrackingReference,
    /// Value written to pixels shifted in from outside the frame.
    pub fill_value: f64,
}

/// What a symmetrized pixel holds when none of its copies are valid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyPixelPolicy {
    KeepOriginal,
    Fill(f64),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SymmetryConfig {
    pub empty_pixel_policy: EmptyPixelPolicy,
    /// Distance in pixels a center may lie outside the image extent.
    pub center_tolerance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RadialConfig {
    /// Uniform bin width in q units; derived from the data when absent.
    pub bin_width: Option<f64>,
    pub center_tolerance: f64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            subpixel: SubpixelMethod::Parabolic,
            min_overlap_pixels: 16,
            overlap_ratio: 0.3,
            max_shift: None,
        }
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::Skip,
            tracking_reference: TrackingReference::PreviousFrame,
            fill_value: 0.0,
        }
    }
}

impl Default for SymmetryConfig {
    fn default() -> Self {
        Self {
            empty_pixel_policy: EmptyPixelPolicy::KeepOriginal,
            center_tolerance: 0.0,
        }
    }
}

impl Default for RadialConfig {
    fn default() -> Self {
        Self {
            bin_width: None,
            center_tolerance: 0.0,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        if content.trim_start().starts_with('{') {
            serde_json::from_str(&content)
                .with_context(|| format!("invalid JSON config in {}", path.display()))
        } else {
            toml::from_str(&content)
                .with_context(|| format!("invalid TOML config in {}", path.display()))
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P, format: ConfigFormat) -> anyhow::Result<()> {
        fs::write(path, self.render(format)?)?;
        Ok(())
    }

    pub fn render(&self, format: ConfigFormat) -> anyhow::Result<String> {
        Ok(match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
        })
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.registration.min_overlap_pixels == 0 {
            errors.push("registration.min_overlap_pixels must be positive".to_string());
        }

        if !(0.0..=1.0).contains(&self.registration.overlap_ratio) {
            errors.push("registration.overlap_ratio must lie in [0, 1]".to_string());
        }

        if !self.stack.fill_value.is_finite() {
            errors.push("stack.fill_value must be finite".to_string());
        }

        if let EmptyPixelPolicy::Fill(value) = self.symmetry.empty_pixel_policy {
            if !value.is_finite() {
                errors.push("symmetry.empty_pixel_policy fill value must be finite".to_string());
            }
        }

        if !(self.symmetry.center_tolerance >= 0.0) {
            errors.push("symmetry.center_tolerance must be non-negative".to_string());
        }

        if !(self.radial.center_tolerance >= 0.0) {
            errors.push("radial.center_tolerance must be non-negative".to_string());
        }

        if let Some(width) = self.radial.bin_width {
            if !(width.is_finite() && width > 0.0) {
                errors.push("radial.bin_width must be finite and positive".to_string());
            }
        }

        if let Err(error) = self.logging.validate() {
            errors.push(error);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

pub fn load_config_or_default(config_path: Option<&Path>) -> Config {
    match config_path {
        Some(path) => match Config::load_from_file(path) {
            Ok(config) => {
                if let Err(errors) = config.validate() {
                    for error in &errors {
                        tracing::warn!(%error, "configuration validation error");
                    }
                    tracing::warn!("using default configuration instead");
                    Config::default()
                } else {
                    config
                }
            }
            Err(error) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %format!("{error:#}"),
                    "failed to load config, using defaults"
                );
                Config::default()
            }
        },
        None => Config::default(),
    }
}
