use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reader::Layout;

/// Configuration for the ingest pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Column layout of the input.
    pub layout: Layout,
    /// Records processed concurrently.
    pub max_in_flight: usize,
    /// Give up on a record whose verification takes longer than this.
    pub verify_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            layout: Layout::Standard,
            max_in_flight: 64,
            verify_timeout_ms: 3_000,
        }
    }
}

impl PipelineConfig {
    pub fn verify_timeout(&self) -> Duration {
        Duration::from_millis(self.verify_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.layout, Layout::Standard);
        assert_eq!(config.max_in_flight, 64);
        assert_eq!(config.verify_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn layout_deserializes_kebab_case() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "layout": "no-password" }"#).unwrap();
        assert_eq!(config.layout, Layout::NoPassword);
        assert_eq!(config.max_in_flight, 64);
    }
}
