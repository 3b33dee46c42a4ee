//! Configuration for the rotation manager

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RotationError, RotationResult};

/// Shortest secret [`RotationConfig::secret_length`] may ask for
pub const MIN_SECRET_LENGTH: usize = 8;

/// Tunables of the rotation manager
///
/// Durations are written in humantime form (`"5s"`, `"1h 30m"`) when the
/// config is loaded from a file. Missing fields fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RotationConfig {
    /// How often the ticker drains due rotations (default 5s)
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,

    /// Deadline for each provider call and each store access (default 30s)
    #[serde(with = "humantime_serde")]
    pub operation_timeout: Duration,

    /// Shortest rotation period a role may declare (default 5s)
    #[serde(with = "humantime_serde")]
    pub min_rotation_period: Duration,

    /// Length of generated secrets (default 20)
    pub secret_length: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(30),
            min_rotation_period: Duration::from_secs(5),
            secret_length: 20,
        }
    }
}

impl RotationConfig {
    /// Set the ticker interval
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the per-operation deadline
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Set the minimum role rotation period
    pub fn with_min_rotation_period(mut self, period: Duration) -> Self {
        self.min_rotation_period = period;
        self
    }

    /// Set the generated secret length
    pub fn with_secret_length(mut self, length: usize) -> Self {
        self.secret_length = length;
        self
    }

    /// Check that every value is usable
    pub fn validate(&self) -> RotationResult<()> {
        let invalid = |reason: String| Err(RotationError::InvalidConfig { reason });

        if self.tick_interval.is_zero() {
            return invalid("tick_interval must be greater than zero".into());
        }
        if self.operation_timeout.is_zero() {
            return invalid("operation_timeout must be greater than zero".into());
        }
        // Zero would let a failing role be retried in a tight loop.
        if self.min_rotation_period.is_zero() {
            return invalid("min_rotation_period must be greater than zero".into());
        }
        if self.secret_length < MIN_SECRET_LENGTH {
            return invalid(format!(
                "secret_length must be at least {MIN_SECRET_LENGTH}, got {}",
                self.secret_length
            ));
        }
        Ok(())
    }
}
