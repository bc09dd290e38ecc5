//! Runtime configuration.
//!
//! Per-scene limits live in the scene descriptors; this covers the values
//! that apply to the whole runtime.

use serde::{Deserialize, Serialize};

/// Default RNG seed.
pub const DEFAULT_SEED: u64 = 0x5eed;

/// Runtime-wide tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Seed for trigger timing and sound/position selection
    pub seed: u64,
    /// System-wide voice budget across all scenes
    pub max_voices: usize,
    /// Seconds a request may stay unacknowledged before it is failed
    pub stale_request_timeout: f64,
    /// Seconds past the expected end before a playing voice is failed (None = never)
    pub overrun_grace: Option<f64>,
    /// Interval timer pre-roll rounds on activation
    pub warm_up_count: u32,
    /// Seconds a continuous element waits after a failed start
    pub failure_backoff: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            max_voices: 32,
            stale_request_timeout: 2.0,
            overrun_grace: Some(5.0),
            warm_up_count: 3,
            failure_backoff: 1.0,
        }
    }
}

impl RuntimeConfig {
    /// With seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// With system voice budget.
    #[must_use]
    pub fn with_max_voices(mut self, max_voices: usize) -> Self {
        self.max_voices = max_voices;
        self
    }

    /// With stale request timeout.
    #[must_use]
    pub fn with_stale_request_timeout(mut self, seconds: f64) -> Self {
        self.stale_request_timeout = seconds;
        self
    }

    /// With overrun grace.
    #[must_use]
    pub fn with_overrun_grace(mut self, seconds: Option<f64>) -> Self {
        self.overrun_grace = seconds;
        self
    }

    /// With warm-up rounds.
    #[must_use]
    pub fn with_warm_up_count(mut self, rounds: u32) -> Self {
        self.warm_up_count = rounds;
        self
    }

    /// With failure backoff.
    #[must_use]
    pub fn with_failure_backoff(mut self, seconds: f64) -> Self {
        self.failure_backoff = seconds;
        self
    }

    /// Clamp values into their valid ranges.
    pub fn validate(&mut self) {
        self.max_voices = self.max_voices.clamp(1, 4096);
        self.stale_request_timeout = clamp_seconds(self.stale_request_timeout, 0.01, 600.0, 2.0);
        self.overrun_grace = self.overrun_grace.map(|g| clamp_seconds(g, 0.0, 3600.0, 5.0));
        self.warm_up_count = self.warm_up_count.min(16);
        self.failure_backoff = clamp_seconds(self.failure_backoff, 0.0, 600.0, 1.0);
    }
}

fn clamp_seconds(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.seed, DEFAULT_SEED);
        assert_eq!(config.max_voices, 32);
        assert_eq!(config.warm_up_count, 3);
        assert_eq!(config.overrun_grace, Some(5.0));
    }

    #[test]
    fn test_validate_clamps() {
        let mut config = RuntimeConfig {
            max_voices: 0,
            stale_request_timeout: -1.0,
            overrun_grace: Some(f64::NAN),
            warm_up_count: 100,
            failure_backoff: 1e9,
            ..RuntimeConfig::default()
        };
        config.validate();

        assert_eq!(config.max_voices, 1);
        assert!((config.stale_request_timeout - 0.01).abs() < f64::EPSILON);
        assert_eq!(config.overrun_grace, Some(5.0));
        assert_eq!(config.warm_up_count, 16);
        assert!((config.failure_backoff - 600.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: RuntimeConfig = toml::from_str("max_voices = 8\nseed = 42").expect("valid toml");
        assert_eq!(config.max_voices, 8);
        assert_eq!(config.seed, 42);
        assert!((config.stale_request_timeout - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = RuntimeConfig::default().with_seed(7).with_overrun_grace(Some(3.0));
        let text = toml::to_string_pretty(&config).expect("serializes");
        let back: RuntimeConfig = toml::from_str(&text).expect("parses");
        assert_eq!(back, config);
    }
}
