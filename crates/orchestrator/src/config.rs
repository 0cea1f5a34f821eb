//! Configuration parsing and validation for the tree walk

use serde::{Deserialize, Serialize};
use std::fs;

/// Tunable parameters for one force-evaluation phase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalkConfig {
    /// Opening angle parameter; a node is accepted as a far-field
    /// interaction when size / distance falls below this
    #[serde(default = "default_theta")]
    pub theta: f64,
    /// Whether the domain is periodic (evaluates 27 replica offsets)
    #[serde(default)]
    pub periodic: bool,
    /// Domain period per axis; ignored for isolated domains
    #[serde(default = "default_period")]
    pub period: [f64; 3],
    /// Accumulated node interactions that trigger an offload flush
    #[serde(default = "default_node_threshold")]
    pub node_flush_threshold: usize,
    /// Accumulated particle interactions that trigger an offload flush
    #[serde(default = "default_particle_threshold")]
    pub particle_flush_threshold: usize,
    /// Per-bucket capacity reserved in the interaction lists
    #[serde(default = "default_bucket_capacity")]
    pub bucket_capacity_hint: usize,
    /// Maximum transfer buffers allowed in flight at once
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight_buffers: usize,
}

// Default values
fn default_theta() -> f64 {
    0.7
}

fn default_period() -> [f64; 3] {
    [1.0, 1.0, 1.0]
}

fn default_node_threshold() -> usize {
    4096
}

fn default_particle_threshold() -> usize {
    8192
}

fn default_bucket_capacity() -> usize {
    64
}

fn default_max_in_flight() -> usize {
    8
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            theta: default_theta(),
            periodic: false,
            period: default_period(),
            node_flush_threshold: default_node_threshold(),
            particle_flush_threshold: default_particle_threshold(),
            bucket_capacity_hint: default_bucket_capacity(),
            max_in_flight_buffers: default_max_in_flight(),
        }
    }
}

impl WalkConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &str) -> Result<Self, String> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path, e))?;

        let config: WalkConfig = serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse config JSON: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.theta <= 0.0 {
            return Err("Opening angle theta must be positive".to_string());
        }

        if self.periodic {
            for (axis, &p) in self.period.iter().enumerate() {
                if p <= 0.0 {
                    return Err(format!(
                        "Period must be positive on every axis (axis {} is {})",
                        axis, p
                    ));
                }
            }
        }

        if self.node_flush_threshold == 0 {
            return Err("Node flush threshold must be at least 1".to_string());
        }
        if self.particle_flush_threshold == 0 {
            return Err("Particle flush threshold must be at least 1".to_string());
        }

        if self.max_in_flight_buffers == 0 {
            return Err("At least one in-flight transfer buffer is required".to_string());
        }

        Ok(())
    }

    /// Opening criterion derived from this configuration
    pub fn criterion(&self) -> kernel::OpeningCriterion {
        kernel::OpeningCriterion {
            theta: self.theta,
            period: if self.periodic { Some(self.period) } else { None },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = WalkConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.criterion().period.is_none());
    }

    #[test]
    fn test_validation_theta() {
        let mut config = WalkConfig::default();
        config.theta = 0.0;
        assert!(config.validate().is_err());

        config.theta = 0.5;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_periodic_period() {
        let mut config = WalkConfig {
            periodic: true,
            period: [1.0, -1.0, 1.0],
            ..WalkConfig::default()
        };
        assert!(config.validate().is_err());

        config.period = [1.0, 1.0, 1.0];
        assert!(config.validate().is_ok());
        assert_eq!(config.criterion().period, Some([1.0, 1.0, 1.0]));
    }

    #[test]
    fn test_validation_thresholds() {
        let mut config = WalkConfig::default();
        config.node_flush_threshold = 0;
        assert!(config.validate().is_err());

        config.node_flush_threshold = 1;
        config.particle_flush_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_with_defaults() {
        let json = r#"{ "theta": 0.55, "periodic": false }"#;
        let config: WalkConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.theta, 0.55);
        assert_eq!(config.node_flush_threshold, default_node_threshold());
        assert!(config.validate().is_ok());
    }
}
