//! Configuration for the dataset engine.
//!
//! Built with [`EngineConfig::builder()`] and validated on `build()`.

use serde::{Deserialize, Serialize};

/// Default fraction of sampled values that must parse for a column to count as SMILES.
pub const DEFAULT_SMILES_THRESHOLD: f64 = 0.8;

/// Default number of non-empty values sampled per column during detection.
pub const DEFAULT_SMILES_SAMPLE: usize = 50;

/// Configuration for [`DatasetEngine`](crate::DatasetEngine).
///
/// # Example
///
/// ```rust,ignore
/// use chemml_processing::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .smiles_detection_threshold(0.9)
///     .max_history(200)
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fraction (0.0 - 1.0) of sampled values that must parse as SMILES.
    /// Default: 0.8
    pub smiles_detection_threshold: f64,

    /// Non-empty values inspected per column during detection.
    /// Default: 50
    pub smiles_detection_sample: usize,

    /// Tag detected SMILES columns of the initial dataset.
    /// Default: true
    pub auto_tag_smiles: bool,

    /// Upper bound on retained history entries. Past the bound the oldest
    /// entry can no longer be undone, but stays in the session log.
    /// Default: None (unbounded)
    pub max_history: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            smiles_detection_threshold: DEFAULT_SMILES_THRESHOLD,
            smiles_detection_sample: DEFAULT_SMILES_SAMPLE,
            auto_tag_smiles: true,
            max_history: None,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !(0.0..=1.0).contains(&self.smiles_detection_threshold) {
            return Err(ConfigValidationError::InvalidThreshold {
                field: "smiles_detection_threshold".to_string(),
                value: self.smiles_detection_threshold,
            });
        }

        if self.smiles_detection_sample == 0 {
            return Err(ConfigValidationError::ZeroCount {
                field: "smiles_detection_sample".to_string(),
            });
        }

        if self.max_history == Some(0) {
            return Err(ConfigValidationError::ZeroCount {
                field: "max_history".to_string(),
            });
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid threshold for '{field}': {value} (must be between 0.0 and 1.0)")]
    InvalidThreshold { field: String, value: f64 },

    #[error("Invalid value for '{field}': must be at least 1")]
    ZeroCount { field: String },
}

/// Builder for [`EngineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    smiles_detection_threshold: Option<f64>,
    smiles_detection_sample: Option<usize>,
    auto_tag_smiles: Option<bool>,
    max_history: Option<usize>,
}

impl EngineConfigBuilder {
    #[must_use]
    pub fn smiles_detection_threshold(mut self, threshold: f64) -> Self {
        self.smiles_detection_threshold = Some(threshold);
        self
    }

    #[must_use]
    pub fn smiles_detection_sample(mut self, sample: usize) -> Self {
        self.smiles_detection_sample = Some(sample);
        self
    }

    /// Enable or disable tagging of detected SMILES columns on engine creation.
    #[must_use]
    pub fn auto_tag_smiles(mut self, enable: bool) -> Self {
        self.auto_tag_smiles = Some(enable);
        self
    }

    #[must_use]
    pub fn max_history(mut self, entries: usize) -> Self {
        self.max_history = Some(entries);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Result<EngineConfig, ConfigValidationError> {
        let config = EngineConfig {
            smiles_detection_threshold: self
                .smiles_detection_threshold
                .unwrap_or(DEFAULT_SMILES_THRESHOLD),
            smiles_detection_sample: self
                .smiles_detection_sample
                .unwrap_or(DEFAULT_SMILES_SAMPLE),
            auto_tag_smiles: self.auto_tag_smiles.unwrap_or(true),
            max_history: self.max_history,
        };

        config.validate()?;
        Ok(config)
    }
}
