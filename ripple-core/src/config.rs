//! Runtime configuration.
//!
//! The runtime has a single tunable today: the number of scheduler rounds a
//! drain may run before propagation is declared divergent.
//!
//! # Defaults
//!
//! | Field | Default | Environment override |
//! |-------|---------|----------------------|
//! | `max_rounds` | 10 000 | `RIPPLE_MAX_ROUNDS` |
//!
//! A configuration is installed per thread with
//! [`configure`](crate::configure); every thread starts with
//! [`RuntimeConfig::default()`].

use crate::error::{ReactiveError, Result};

/// Environment variable name for the drain round cap.
pub const ENV_MAX_ROUNDS: &str = "RIPPLE_MAX_ROUNDS";

/// Default cap on scheduler rounds per drain.
pub const DEFAULT_MAX_ROUNDS: usize = 10_000;

/// Settings that drive the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Maximum number of drain rounds before
    /// [`ReactiveError::PropagationDiverged`] is raised.
    pub max_rounds: usize,
}

impl RuntimeConfig {
    /// Set the round cap.
    #[must_use]
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Normalize configuration values to safe defaults.
    pub fn normalize(&mut self) {
        if self.max_rounds == 0 {
            self.max_rounds = 1;
        }
    }

    /// Build a configuration from the defaults plus any environment
    /// overrides that are set.
    ///
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(ENV_MAX_ROUNDS) {
            config.apply_max_rounds(&raw)?;
        }
        config.normalize();
        Ok(config)
    }

    fn apply_max_rounds(&mut self, raw: &str) -> Result<()> {
        self.max_rounds = raw
            .trim()
            .parse()
            .map_err(|_| ReactiveError::InvalidConfig {
                key: ENV_MAX_ROUNDS,
                value: raw.to_string(),
            })?;
        Ok(())
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_round_cap() {
        assert_eq!(RuntimeConfig::default().max_rounds, 10_000);
    }

    #[test]
    fn normalize_rejects_zero_rounds() {
        let mut config = RuntimeConfig::default().with_max_rounds(0);
        config.normalize();
        assert_eq!(config.max_rounds, 1);
    }

    #[test]
    fn parse_override() {
        let mut config = RuntimeConfig::default();
        config.apply_max_rounds(" 42 ").unwrap();
        assert_eq!(config.max_rounds, 42);

        let err = config.apply_max_rounds("many").unwrap_err();
        assert!(matches!(err, ReactiveError::InvalidConfig { key: ENV_MAX_ROUNDS, .. }));
        assert_eq!(config.max_rounds, 42);
    }
}
