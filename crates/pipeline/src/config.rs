//! Pipeline configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry and threshold settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Attempts per dispatch, including the first
    pub max_attempts: u32,
    /// Minimum score for every semantic dimension
    pub semantic_threshold: f64,
    /// Minimum score for every artifact dimension
    pub artifact_threshold: f64,
    /// Bound on the executor call and on each evaluator tier
    #[serde(with = "secs")]
    pub attempt_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            semantic_threshold: 0.65,
            artifact_threshold: 0.8,
            attempt_timeout: Duration::from_secs(300), // 5 minutes
        }
    }
}

impl PipelineConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max attempts. Zero is treated as one.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the semantic threshold.
    pub fn with_semantic_threshold(mut self, threshold: f64) -> Self {
        self.semantic_threshold = threshold;
        self
    }

    /// Set the artifact threshold.
    pub fn with_artifact_threshold(mut self, threshold: f64) -> Self {
        self.artifact_threshold = threshold;
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }
}

/// Durations as (fractional) seconds.
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
