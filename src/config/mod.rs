//! Configuration types for the Cosmicflows pipeline.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::types::{Calculator, CoordinateSystem, Parameter};

/// Errors raised while loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// A field/value pair whose presence in a response marks it as successful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuccessMarker {
    pub key: String,
    pub value: serde_json::Value,
}

impl SuccessMarker {
    pub fn new(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Remote calculator service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalculatorConfig {
    /// Service root; requests go to `{base_url}/{CALC}calculator/api.php`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum requests in flight at once
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Any one of these marks a response as successful
    #[serde(default = "default_success_markers")]
    pub success_markers: Vec<SuccessMarker>,
}

fn default_base_url() -> String {
    "http://edd.ifa.hawaii.edu".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_requests() -> usize {
    8
}

fn default_success_markers() -> Vec<SuccessMarker> {
    vec![SuccessMarker::new("message", "Success")]
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_concurrent_requests: default_max_concurrent_requests(),
            success_markers: default_success_markers(),
        }
    }
}

/// Default query options applied to every coordinate in a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_system")]
    pub system: CoordinateSystem,

    #[serde(default = "default_parameter")]
    pub parameter: Parameter,

    /// Distance in Mpc or velocity in km/s, depending on `parameter`
    #[serde(default = "default_query_value")]
    pub value: f64,

    #[serde(default = "default_calculator")]
    pub calculator: Calculator,
}

fn default_system() -> CoordinateSystem {
    CoordinateSystem::Supergalactic
}

fn default_parameter() -> Parameter {
    Parameter::Distance
}

fn default_query_value() -> f64 {
    20.0
}

fn default_calculator() -> Calculator {
    Calculator::Nam
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            system: default_system(),
            parameter: default_parameter(),
            value: default_query_value(),
            calculator: default_calculator(),
        }
    }
}

/// Random sky sampling for demo batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Number of coordinates to draw
    #[serde(default = "default_sample_count")]
    pub count: usize,

    /// RNG seed; `None` draws one from the OS
    #[serde(default)]
    pub seed: Option<u64>,

    /// Range of the first angle in degrees, half-open
    #[serde(default = "default_alpha_range")]
    pub alpha_range: [f64; 2],

    /// Range of the second angle in degrees, inclusive
    #[serde(default = "default_delta_range")]
    pub delta_range: [f64; 2],
}

fn default_sample_count() -> usize {
    100
}

fn default_alpha_range() -> [f64; 2] {
    [0.0, 360.0]
}

fn default_delta_range() -> [f64; 2] {
    [-90.0, 90.0]
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            count: default_sample_count(),
            seed: None,
            alpha_range: default_alpha_range(),
            delta_range: default_delta_range(),
        }
    }
}

/// Configuration for DBSCAN clustering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Neighborhood radius in Mpc
    #[serde(default = "default_eps")]
    pub eps: f64,

    /// Minimum neighbors (including the point itself) for a core point
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

fn default_eps() -> f64 {
    10.0
}

fn default_min_samples() -> usize {
    3
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            eps: default_eps(),
            min_samples: default_min_samples(),
        }
    }
}

/// Which quantities are placed on the scene axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SceneView {
    /// Projected (x, y, z) positions
    Cartesian,
    /// (RA, Dec, velocity)
    Sky,
}

/// Scene rendering options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_view")]
    pub view: SceneView,

    /// Marker radius in pixels
    #[serde(default = "default_point_size")]
    pub point_size: u32,

    /// Arrow length in Mpc per km/s of peculiar velocity (cartesian view)
    #[serde(default = "default_vector_scale")]
    pub vector_scale: f64,

    /// Arrow length as a fraction of each axis span (sky view)
    #[serde(default = "default_sky_arrow_fraction")]
    pub sky_arrow_fraction: f64,

    /// Camera yaw in radians
    #[serde(default = "default_yaw")]
    pub yaw: f64,

    /// Camera pitch in radians
    #[serde(default = "default_pitch")]
    pub pitch: f64,
}

fn default_width() -> u32 {
    1600
}

fn default_height() -> u32 {
    1200
}

fn default_view() -> SceneView {
    SceneView::Cartesian
}

fn default_point_size() -> u32 {
    3
}

fn default_vector_scale() -> f64 {
    0.02
}

fn default_sky_arrow_fraction() -> f64 {
    0.05
}

fn default_yaw() -> f64 {
    0.5
}

fn default_pitch() -> f64 {
    0.3
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            view: default_view(),
            point_size: default_point_size(),
            vector_scale: default_vector_scale(),
            sky_arrow_fraction: default_sky_arrow_fraction(),
            yaw: default_yaw(),
            pitch: default_pitch(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub calculator: CalculatorConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub sampling: SamplingConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub render: RenderConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.clustering.eps.is_finite() && self.clustering.eps > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "clustering.eps must be positive, got {}",
                self.clustering.eps
            )));
        }
        if self.calculator.max_concurrent_requests == 0 {
            return Err(ConfigError::Invalid(
                "calculator.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.calculator.success_markers.is_empty() {
            return Err(ConfigError::Invalid(
                "calculator.success_markers must not be empty".to_string(),
            ));
        }
        let [a0, a1] = self.sampling.alpha_range;
        let [d0, d1] = self.sampling.delta_range;
        if !(a0 < a1) || !(d0 <= d1) {
            return Err(ConfigError::Invalid(format!(
                "sampling ranges must be ordered, got alpha {:?} delta {:?}",
                self.sampling.alpha_range, self.sampling.delta_range
            )));
        }
        if !self.query.value.is_finite() {
            return Err(ConfigError::Invalid("query.value must be finite".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_pipeline_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.query.system, CoordinateSystem::Supergalactic);
        assert_eq!(config.query.calculator, Calculator::Nam);
        assert_eq!(config.query.value, 20.0);
        assert_eq!(config.clustering.min_samples, 3);
        assert_eq!(config.clustering.eps, 10.0);
        assert_eq!(
            config.calculator.success_markers,
            vec![SuccessMarker::new("message", "Success")]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "query:\n  calculator: CF3\n  system: galactic\nclustering:\n  eps: 4.5\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.query.calculator, Calculator::Cf3);
        assert_eq!(config.query.system, CoordinateSystem::Galactic);
        assert_eq!(config.query.parameter, Parameter::Distance);
        assert_eq!(config.clustering.eps, 4.5);
        assert_eq!(config.clustering.min_samples, 3);
        assert_eq!(config.calculator.max_concurrent_requests, 8);
    }

    #[test]
    fn test_yaml_round_trip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");

        let mut config = PipelineConfig::default();
        config.sampling.seed = Some(7);
        config.render.view = SceneView::Sky;
        config.to_yaml(&path).unwrap();

        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded.sampling.seed, Some(7));
        assert_eq!(loaded.render.view, SceneView::Sky);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = PipelineConfig::default();
        config.clustering.eps = 0.0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.calculator.max_concurrent_requests = 0;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.sampling.delta_range = [10.0, -10.0];
        assert!(config.validate().is_err());
    }
}
