use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::admission::AdmissionGate;
use crate::backpressure::BackpressureGate;
use crate::batch::{BatchingVerifier, Batcher};
use crate::error::{VerifyError, VerifyResult};
use crate::verifier::SharedVerifier;

/// The closed set of strategies that can sit in front of a verifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Call the verifier directly.
    Direct,
    /// Bound concurrent calls with a permit pool.
    #[default]
    Admission,
    /// Fixed queue plus worker pool; reject when full.
    Backpressure,
    /// Coalesce items with a generation barrier.
    Barrier,
    /// Coalesce items with a phaser and a fetcher loop.
    Phase,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::Direct,
        Strategy::Admission,
        Strategy::Backpressure,
        Strategy::Barrier,
        Strategy::Phase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Direct => "direct",
            Strategy::Admission => "admission",
            Strategy::Backpressure => "backpressure",
            Strategy::Barrier => "barrier",
            Strategy::Phase => "phase",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = VerifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| VerifyError::InvalidThrottle(format!("unknown strategy '{s}'")))
    }
}

/// Target size and flush timeout shared by both batching strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            timeout: Duration::from_millis(50),
        }
    }
}

/// Configuration for the verification layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Which strategy wraps the verifier.
    pub strategy: Strategy,
    /// Permits for the admission strategy.
    pub permits: usize,
    /// Workers for the backpressure strategy.
    pub workers: usize,
    /// Queue slots for the backpressure strategy.
    pub queue_capacity: usize,
    /// Target items per delegate call for the batching strategies.
    pub batch_size: usize,
    /// Flush a partial batch after this many milliseconds.
    pub batch_timeout_ms: u64,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            permits: 8,
            workers: 8,
            queue_capacity: 64,
            batch_size: 10,
            batch_timeout_ms: 50,
        }
    }
}

impl VerifierConfig {
    pub fn batch(&self) -> BatchConfig {
        BatchConfig {
            batch_size: self.batch_size,
            timeout: Duration::from_millis(self.batch_timeout_ms),
        }
    }

    /// Reject settings that would leave a strategy without capacity.
    pub fn validate(&self) -> VerifyResult<()> {
        let zero = match self.strategy {
            Strategy::Direct => None,
            Strategy::Admission => (self.permits == 0).then_some("permits"),
            Strategy::Backpressure => {
                if self.workers == 0 {
                    Some("workers")
                } else if self.queue_capacity == 0 {
                    Some("queue_capacity")
                } else {
                    None
                }
            }
            Strategy::Barrier | Strategy::Phase => (self.batch_size == 0).then_some("batch_size"),
        };
        match zero {
            Some(field) => Err(VerifyError::InvalidThrottle(format!(
                "{field} must be at least 1 for the {} strategy",
                self.strategy
            ))),
            None => Ok(()),
        }
    }

    /// Wrap `delegate` in the configured strategy.
    ///
    /// Strategies that spawn tasks must be built inside a Tokio runtime.
    pub fn build(&self, delegate: SharedVerifier) -> VerifyResult<SharedVerifier> {
        self.validate()?;
        let verifier: SharedVerifier = match self.strategy {
            Strategy::Direct => delegate,
            Strategy::Admission => Arc::new(AdmissionGate::new(delegate, self.permits)),
            Strategy::Backpressure => Arc::new(BackpressureGate::new(
                delegate,
                self.workers,
                self.queue_capacity,
            )?),
            Strategy::Barrier => Arc::new(BatchingVerifier::new(Batcher::barrier(
                delegate,
                self.batch(),
            )?)),
            Strategy::Phase => Arc::new(BatchingVerifier::new(Batcher::phase(
                delegate,
                self.batch(),
            )?)),
        };
        Ok(verifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Recorder;

    #[test]
    fn defaults() {
        let config = VerifierConfig::default();
        assert_eq!(config.strategy, Strategy::Admission);
        assert_eq!(config.permits, 8);
        assert_eq!(config.workers, 8);
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.batch().batch_size, 10);
        assert_eq!(config.batch().timeout, Duration::from_millis(50));
    }

    #[test]
    fn strategy_parses_and_displays() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.as_str().parse::<Strategy>().unwrap(), strategy);
        }
        assert!("fastest".parse::<Strategy>().is_err());
    }

    #[test]
    fn strategy_serializes_kebab_case() {
        let json = serde_json::to_string(&Strategy::Backpressure).unwrap();
        assert_eq!(json, "\"backpressure\"");
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: VerifierConfig =
            serde_json::from_str(r#"{ "strategy": "phase", "batch_size": 25 }"#).unwrap();
        assert_eq!(config.strategy, Strategy::Phase);
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.permits, 8);
    }

    #[test]
    fn zero_capacity_is_invalid() {
        let config = VerifierConfig {
            strategy: Strategy::Backpressure,
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = VerifierConfig {
            strategy: Strategy::Direct,
            permits: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn build_names_each_strategy() {
        for strategy in Strategy::ALL {
            let config = VerifierConfig {
                strategy,
                ..Default::default()
            };
            let verifier = config.build(Recorder::new()).unwrap();
            let expected = match strategy {
                Strategy::Direct => "recorder",
                Strategy::Admission => "admission",
                Strategy::Backpressure => "backpressure",
                Strategy::Barrier => "barrier-batch",
                Strategy::Phase => "phase-batch",
            };
            assert_eq!(verifier.name(), expected);
            verifier.close().await;
        }
    }
}
