use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxKind {
    Host,
    Docker,
    AppleContainer,
}

/// Reified form of the adapter command-template contract
/// ("Adapter command surface"): `<binary> [<flags>] <prompt placeholder>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default = "default_sandbox")]
    pub sandbox: SandboxKind,
    /// Fixed per-adapter prior used by the Quality Evaluator, clamped to
    /// `[0.5, 0.85]`; `0.5` for an adapter not present here.
    #[serde(default = "default_reliability_prior")]
    pub reliability_prior: f64,
}

fn default_sandbox() -> SandboxKind {
    SandboxKind::Host
}

fn default_reliability_prior() -> f64 {
    0.5
}

impl AdapterConfig {
    pub fn reliability_prior(&self) -> f64 {
        self.reliability_prior.clamp(0.5, 0.85)
    }
}
