//! Poll configuration and layered defaults.
//!
//! Effective poll options are resolved in three layers, highest first:
//!
//! 1. instance overrides (`Interactor::timeout`, `Convergence::interval`, ...)
//! 2. type defaults (`TypeOptions` carried by a `TypeDescriptor`)
//! 3. global defaults (`PollConfig::default()`, or `Defaults` loaded from YAML
//!    or the environment)

use crate::result::{InteractorError, InteractorResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default poll timeout (2 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Default polling interval (10ms)
pub const DEFAULT_INTERVAL_MS: u64 = 10;

/// Default stability window (none)
pub const DEFAULT_REMAINS_MS: u64 = 0;

/// Environment variable overriding the global timeout
pub const ENV_TIMEOUT_MS: &str = "INTERACTOR_TIMEOUT_MS";

/// Environment variable overriding the global interval
pub const ENV_INTERVAL_MS: &str = "INTERACTOR_INTERVAL_MS";

/// Environment variable overriding the global stability window
pub const ENV_REMAINS_MS: &str = "INTERACTOR_REMAINS_MS";

/// Configuration for a single poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    /// Total timeout; `None` polls forever
    pub timeout: Option<Duration>,
    /// Spacing between predicate invocations
    pub interval: Duration,
    /// Continuous window the predicate must keep passing before resolving
    pub remains: Duration,
    /// Reject on the first failure instead of retrying
    #[serde(default)]
    pub fail_fast: bool,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_millis(DEFAULT_TIMEOUT_MS)),
            interval: Duration::from_millis(DEFAULT_INTERVAL_MS),
            remains: Duration::from_millis(DEFAULT_REMAINS_MS),
            fail_fast: false,
        }
    }
}

impl PollConfig {
    /// Create a config with the given timeout and default interval
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self::default().with_timeout(timeout)
    }

    /// Set the timeout. A zero duration disables the bound.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = if timeout.is_zero() {
            None
        } else {
            Some(timeout)
        };
        self
    }

    /// Poll without a timeout
    #[must_use]
    pub const fn unbounded(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// Set the poll interval
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the stability window
    #[must_use]
    pub const fn with_remains(mut self, remains: Duration) -> Self {
        self.remains = remains;
        self
    }

    /// Reject on the first failed invocation. Combined with a stability
    /// window this means the predicate must hold for the whole window.
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Short timeout, tight polling
    #[must_use]
    pub const fn fast() -> Self {
        Self {
            timeout: Some(Duration::from_millis(200)),
            interval: Duration::from_millis(2),
            remains: Duration::ZERO,
            fail_fast: false,
        }
    }

    /// Long timeout, relaxed polling
    #[must_use]
    pub const fn slow() -> Self {
        Self {
            timeout: Some(Duration::from_secs(30)),
            interval: Duration::from_millis(100),
            remains: Duration::ZERO,
            fail_fast: false,
        }
    }

    /// Apply overrides on top of this config
    #[must_use]
    pub fn merged(self, overrides: &PollOverrides) -> Self {
        Self {
            timeout: overrides.timeout.unwrap_or(self.timeout),
            interval: overrides.interval.unwrap_or(self.interval),
            remains: overrides.remains.unwrap_or(self.remains),
            fail_fast: self.fail_fast,
        }
    }
}

/// Partial poll options; unset fields fall through to the next layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOverrides {
    /// Timeout override (`Some(None)` disables the bound)
    pub timeout: Option<Option<Duration>>,
    /// Interval override
    pub interval: Option<Duration>,
    /// Stability window override
    pub remains: Option<Duration>,
}

impl PollOverrides {
    /// No overrides
    #[must_use]
    pub const fn none() -> Self {
        Self {
            timeout: None,
            interval: None,
            remains: None,
        }
    }

    /// Override the timeout. A zero duration disables the bound.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(if timeout.is_zero() {
            None
        } else {
            Some(timeout)
        });
        self
    }

    /// Override the interval
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Override the stability window
    #[must_use]
    pub const fn with_remains(mut self, remains: Duration) -> Self {
        self.remains = Some(remains);
        self
    }

    /// Layer `self` over `lower`: fields set here win
    #[must_use]
    pub fn over(self, lower: &Self) -> Self {
        Self {
            timeout: self.timeout.or(lower.timeout),
            interval: self.interval.or(lower.interval),
            remains: self.remains.or(lower.remains),
        }
    }

    /// Whether no field is set
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.timeout.is_none() && self.interval.is_none() && self.remains.is_none()
    }
}

/// Global defaults as stored on disk or in the environment.
///
/// ```yaml
/// timeout_ms: 4000   # 0 disables the timeout
/// interval_ms: 20
/// remains_ms: 0
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    /// Timeout in milliseconds (0 = unbounded)
    pub timeout_ms: u64,
    /// Interval in milliseconds
    pub interval_ms: u64,
    /// Stability window in milliseconds
    pub remains_ms: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            interval_ms: DEFAULT_INTERVAL_MS,
            remains_ms: DEFAULT_REMAINS_MS,
        }
    }
}

impl Defaults {
    /// Parse defaults from a YAML document
    pub fn from_yaml_str(yaml: &str) -> InteractorResult<Self> {
        let defaults: Self = serde_yaml_ng::from_str(yaml)?;
        defaults.validate()?;
        Ok(defaults)
    }

    /// Load defaults from a YAML file
    pub fn load(path: impl AsRef<Path>) -> InteractorResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Read defaults from `INTERACTOR_*_MS` environment variables, keeping
    /// built-in values for unset variables
    pub fn from_env() -> InteractorResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Defaults::from_env`] with an injectable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> InteractorResult<Self> {
        let read = |key: &str, fallback: u64| -> InteractorResult<u64> {
            match lookup(key) {
                Some(raw) => raw.trim().parse().map_err(|_| InteractorError::Config {
                    message: format!("{key} must be a whole number of milliseconds, got {raw:?}"),
                }),
                None => Ok(fallback),
            }
        };
        let base = Self::default();
        let defaults = Self {
            timeout_ms: read(ENV_TIMEOUT_MS, base.timeout_ms)?,
            interval_ms: read(ENV_INTERVAL_MS, base.interval_ms)?,
            remains_ms: read(ENV_REMAINS_MS, base.remains_ms)?,
        };
        defaults.validate()?;
        Ok(defaults)
    }

    fn validate(&self) -> InteractorResult<()> {
        if self.interval_ms == 0 {
            return Err(InteractorError::Config {
                message: "interval_ms must be greater than zero".into(),
            });
        }
        Ok(())
    }

    /// Convert to a poll config
    #[must_use]
    pub fn to_poll_config(&self) -> PollConfig {
        PollConfig::default()
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_interval(Duration::from_millis(self.interval_ms))
            .with_remains(Duration::from_millis(self.remains_ms))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    mod poll_config {
        use super::*;

        #[test]
        fn test_default() {
            let config = PollConfig::default();
            assert_eq!(config.timeout, Some(Duration::from_millis(2000)));
            assert_eq!(config.interval, Duration::from_millis(10));
            assert_eq!(config.remains, Duration::ZERO);
        }

        #[test]
        fn test_zero_timeout_is_unbounded() {
            let config = PollConfig::default().with_timeout(Duration::ZERO);
            assert_eq!(config.timeout, None);
        }

        #[test]
        fn test_presets() {
            assert_eq!(PollConfig::fast().timeout, Some(Duration::from_millis(200)));
            assert_eq!(PollConfig::slow().interval, Duration::from_millis(100));
        }

        #[test]
        fn test_merged_prefers_overrides() {
            let overrides = PollOverrides::none()
                .with_timeout(Duration::from_millis(50))
                .with_remains(Duration::from_millis(5));
            let config = PollConfig::default().merged(&overrides);
            assert_eq!(config.timeout, Some(Duration::from_millis(50)));
            assert_eq!(config.interval, Duration::from_millis(10));
            assert_eq!(config.remains, Duration::from_millis(5));
        }

        #[test]
        fn test_fail_fast_survives_merge() {
            let config = PollConfig::default().with_fail_fast(true);
            assert!(config.merged(&PollOverrides::none()).fail_fast);
            assert!(!PollConfig::default().fail_fast);
        }
    }

    mod overrides {
        use super::*;

        #[test]
        fn test_instance_beats_type() {
            let instance = PollOverrides::none().with_timeout(Duration::from_millis(50));
            let type_level = PollOverrides::none()
                .with_timeout(Duration::from_millis(500))
                .with_interval(Duration::from_millis(1));
            let layered = instance.over(&type_level);
            assert_eq!(layered.timeout, Some(Some(Duration::from_millis(50))));
            assert_eq!(layered.interval, Some(Duration::from_millis(1)));
            assert_eq!(layered.remains, None);
        }

        #[test]
        fn test_zero_override_disables_timeout() {
            let overrides = PollOverrides::none().with_timeout(Duration::ZERO);
            let config = PollConfig::default().merged(&overrides);
            assert_eq!(config.timeout, None);
        }

        #[test]
        fn test_is_empty() {
            assert!(PollOverrides::none().is_empty());
            assert!(!PollOverrides::none().with_interval(Duration::from_millis(1)).is_empty());
        }
    }

    mod defaults {
        use super::*;

        #[test]
        fn test_from_yaml() {
            let defaults = Defaults::from_yaml_str("timeout_ms: 4000\ninterval_ms: 20\n").unwrap();
            assert_eq!(defaults.timeout_ms, 4000);
            assert_eq!(defaults.interval_ms, 20);
            assert_eq!(defaults.remains_ms, 0);
        }

        #[test]
        fn test_from_yaml_zero_interval_rejected() {
            let err = Defaults::from_yaml_str("interval_ms: 0").unwrap_err();
            assert!(matches!(err, InteractorError::Config { .. }));
        }

        #[test]
        fn test_from_lookup() {
            let env: HashMap<&str, &str> =
                [(ENV_TIMEOUT_MS, "0"), (ENV_REMAINS_MS, "30")].into_iter().collect();
            let defaults =
                Defaults::from_lookup(|key| env.get(key).map(|v| (*v).to_string())).unwrap();
            let config = defaults.to_poll_config();
            assert_eq!(config.timeout, None);
            assert_eq!(config.interval, Duration::from_millis(10));
            assert_eq!(config.remains, Duration::from_millis(30));
        }

        #[test]
        fn test_from_lookup_rejects_garbage() {
            let err = Defaults::from_lookup(|key| {
                (key == ENV_INTERVAL_MS).then(|| "soon".to_string())
            })
            .unwrap_err();
            assert!(err.message().contains(ENV_INTERVAL_MS));
        }

        #[test]
        fn test_load_missing_file() {
            let err = Defaults::load("/definitely/not/here.yaml").unwrap_err();
            assert!(matches!(err, InteractorError::Config { .. }));
        }
    }
}
