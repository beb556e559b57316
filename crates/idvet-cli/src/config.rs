use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use idvet_ingest::PipelineConfig;
use idvet_merge::MergeConfig;
use idvet_throttle::VerifierConfig;
use serde::{Deserialize, Serialize};

/// Settings for the in-process verification service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    pub latency_ms: u64,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self { latency_ms: 5 }
    }
}

impl SimulatedConfig {
    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

/// Everything `idvet run` can be configured with. Missing sections and keys
/// fall back to their defaults.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub verifier: VerifierConfig,
    pub merge: MergeConfig,
    pub pipeline: PipelineConfig,
    pub simulated: SimulatedConfig,
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Defaults, or the file at `path` when one is given.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
