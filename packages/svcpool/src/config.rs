use std::time::Duration;

use serde::{Deserialize, Serialize};
use svcpool_core::ArityPolicy;

/// Sizing and call behaviour of one instance pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Instances created eagerly when the pool starts.
    pub minimum_instances: usize,
    /// Upper bound on live instances (idle + leased + being created).
    pub maximum_instances: usize,
    /// How long a call may wait for a free instance. `None` waits indefinitely.
    pub acquire_timeout: Option<Duration>,
    /// Handling of arguments beyond the resolved operation's arity.
    pub arity_policy: ArityPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            minimum_instances: 2,
            maximum_instances: 10,
            acquire_timeout: None,
            arity_policy: ArityPolicy::Strict,
        }
    }
}

impl PoolConfig {
    /// Checks the sizing bounds.
    ///
    /// # Errors
    ///
    /// Returns a [`PoolConfigError`] when `maximum_instances` is zero or
    /// smaller than `minimum_instances`.
    pub fn validate(&self) -> Result<(), PoolConfigError> {
        if self.maximum_instances == 0 {
            return Err(PoolConfigError::ZeroMaximum);
        }
        if self.minimum_instances > self.maximum_instances {
            return Err(PoolConfigError::MinimumExceedsMaximum {
                minimum: self.minimum_instances,
                maximum: self.maximum_instances,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolConfigError {
    #[error("maximum_instances must be at least 1")]
    ZeroMaximum,
    #[error("minimum_instances ({minimum}) exceeds maximum_instances ({maximum})")]
    MinimumExceedsMaximum { minimum: usize, maximum: usize },
}

/// Registry-wide defaults applied to every pool it creates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub pool: PoolConfig,
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn pool_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.minimum_instances, 2);
        assert_eq!(config.maximum_instances, 10);
        assert!(config.acquire_timeout.is_none());
        assert_eq!(config.arity_policy, ArityPolicy::Strict);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_maximum_is_invalid() {
        let config = PoolConfig {
            minimum_instances: 0,
            maximum_instances: 0,
            ..PoolConfig::default()
        };
        assert_eq!(config.validate(), Err(PoolConfigError::ZeroMaximum));
    }

    #[test]
    fn minimum_above_maximum_is_invalid() {
        let config = PoolConfig {
            minimum_instances: 5,
            maximum_instances: 3,
            ..PoolConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(PoolConfigError::MinimumExceedsMaximum {
                minimum: 5,
                maximum: 3
            })
        );
    }

    #[test]
    fn equal_bounds_are_valid() {
        let config = PoolConfig {
            minimum_instances: 4,
            maximum_instances: 4,
            ..PoolConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    proptest! {
        #[test]
        fn validate_accepts_exactly_consistent_bounds(minimum in 0usize..64, maximum in 0usize..64) {
            let config = PoolConfig {
                minimum_instances: minimum,
                maximum_instances: maximum,
                ..PoolConfig::default()
            };
            prop_assert_eq!(config.validate().is_ok(), maximum >= 1 && minimum <= maximum);
        }
    }
}
