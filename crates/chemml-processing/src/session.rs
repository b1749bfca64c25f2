//! Replayable record of the operations applied in a session.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::operations::Operation;

/// Current on-disk version of [`SessionLog`].
///
/// Version 2 added `config`. Version 1 logs still load and replay under the
/// default configuration.
pub const SESSION_LOG_VERSION: u32 = 2;

/// Resolved operations in application order, plus the engine configuration
/// they ran under. Replaying them against the initial dataset with that
/// configuration reproduces the final one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLog {
    pub version: u32,
    #[serde(default)]
    pub config: EngineConfig,
    pub operations: Vec<Operation>,
}

impl SessionLog {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self {
            version: SESSION_LOG_VERSION,
            config: EngineConfig::default(),
            operations,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn is_supported(&self) -> bool {
        (1..=SESSION_LOG_VERSION).contains(&self.version)
    }
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chem::DescriptorKind;
    use crate::operations::RowPolicy;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_json_round_trip() {
        let log = SessionLog::new(vec![
            Operation::canonicalize("smiles", RowPolicy::SetMissing),
            Operation::add_descriptor("smiles", DescriptorKind::MolecularWeight),
        ]);
        let json = log.to_json().unwrap();
        assert!(json.contains("\"version\": 2"));
        assert_eq!(SessionLog::from_json(&json).unwrap(), log);
    }

    #[test]
    fn test_config_round_trips() {
        let config = EngineConfig::builder()
            .auto_tag_smiles(false)
            .smiles_detection_threshold(0.5)
            .max_history(3)
            .build()
            .unwrap();
        let log = SessionLog::new(vec![Operation::drop_column("x")]).with_config(config.clone());
        let back = SessionLog::from_json(&log.to_json().unwrap()).unwrap();
        assert_eq!(back.config, config);
    }

    #[test]
    fn test_version_one_log_uses_default_config() {
        let json = r#"{"version": 1, "operations": [{"op": "drop_column", "column": "x"}]}"#;
        let log = SessionLog::from_json(json).unwrap();
        assert!(log.is_supported());
        assert_eq!(log.config, EngineConfig::default());
        assert_eq!(log.operations, vec![Operation::drop_column("x")]);
    }

    #[test]
    fn test_version_check() {
        let mut log = SessionLog::default();
        assert!(log.is_supported());
        log.version = 99;
        assert!(!log.is_supported());
        log.version = 0;
        assert!(!log.is_supported());
    }
}
