use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapter::AdapterConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("review_consensus_count must be at least 1, got 0")]
    ReviewConsensusCountZero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusStrategy {
    Majority,
    Unanimous,
    Weighted,
}

/// Every configuration key the runtime reads, plus the ambient fields
/// (`log_level`, `logs_dir`, `snapshot_dir`, `http_bind_addr`). Loadable
/// from YAML with every field
/// defaulted, matching the source project's layered config-with-defaults
/// convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub adapters: Vec<AdapterConfig>,
    pub adapter_order: Vec<String>,
    pub role_execution_timeout_seconds: u64,
    pub review_consensus_count: u32,
    pub review_consensus_strategy: ConsensusStrategy,
    pub default_max_sub_task_depth: u32,
    pub event_buffer_size: usize,
    pub max_retries_per_task: u32,
    pub adapter_circuit_threshold: u32,
    pub adapter_circuit_duration_seconds: u64,
    pub quality_concern_retry_threshold: u32,
    pub log_level: String,
    pub logs_dir: PathBuf,
    pub snapshot_dir: PathBuf,
    pub http_bind_addr: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            adapters: Vec::new(),
            adapter_order: Vec::new(),
            role_execution_timeout_seconds: 300,
            review_consensus_count: 1,
            review_consensus_strategy: ConsensusStrategy::Majority,
            default_max_sub_task_depth: 3,
            event_buffer_size: 200,
            max_retries_per_task: 3,
            adapter_circuit_threshold: 3,
            adapter_circuit_duration_seconds: 5 * 60,
            quality_concern_retry_threshold: 2,
            log_level: "info".to_string(),
            logs_dir: PathBuf::from("./logs"),
            snapshot_dir: PathBuf::from("./.taskmesh/snapshots"),
            http_bind_addr: "127.0.0.1:8099".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Rejects configuration values that would make the runtime's
    /// invariants unsatisfiable rather than letting them fail silently
    /// partway through a task's lifecycle.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.review_consensus_count == 0 {
            return Err(ConfigError::ReviewConsensusCountZero);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_max_sub_task_depth_is_within_cap() {
        let cfg = RuntimeConfig::default();
        assert!(cfg.default_max_sub_task_depth <= 10);
    }

    #[test]
    fn default_review_consensus_count_is_single_reviewer() {
        assert_eq!(RuntimeConfig::default().review_consensus_count, 1);
    }

    #[test]
    fn validate_rejects_zero_review_consensus_count() {
        let mut cfg = RuntimeConfig::default();
        cfg.review_consensus_count = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_accepts_default_config() {
        assert!(RuntimeConfig::default().validate().is_ok());
    }
}
