//! Runner configuration
//!
//! Defines the timer period, simulation speed and capacity limits used
//! when driving pipeline runs.

use std::time::Duration;

use clipcraft_core::tracker::DEFAULT_PROGRESS_STEP;

/// Runner configuration
///
/// Intervals and speeds are configurable so the same pipeline can be
/// watched in real time or fast-forwarded in demos and tests.
#[derive(Debug, Clone)]
pub struct Config {
    /// How often each run's timer fires
    pub tick_interval: Duration,

    /// Simulated seconds of stage work per real second
    pub time_scale: f64,

    /// Percentage added by each tracker advance
    pub progress_step: u8,

    /// Maximum number of runs being driven at once
    pub max_concurrent_runs: usize,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new() -> Self {
        Self {
            tick_interval: Duration::from_millis(500),
            time_scale: 60.0,
            progress_step: DEFAULT_PROGRESS_STEP,
            max_concurrent_runs: 4,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - CLIPCRAFT_TICK_MS (optional, milliseconds, default: 500)
    /// - CLIPCRAFT_TIME_SCALE (optional, default: 60.0)
    /// - CLIPCRAFT_PROGRESS_STEP (optional, percent, default: 25)
    /// - CLIPCRAFT_MAX_CONCURRENT_RUNS (optional, default: 4)
    ///
    /// A variable that is set but does not parse is an error.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::new();

        let tick_interval = env_parse::<u64>("CLIPCRAFT_TICK_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.tick_interval);

        let time_scale = env_parse::<f64>("CLIPCRAFT_TIME_SCALE")?.unwrap_or(defaults.time_scale);

        let progress_step =
            env_parse::<u8>("CLIPCRAFT_PROGRESS_STEP")?.unwrap_or(defaults.progress_step);

        let max_concurrent_runs = env_parse::<usize>("CLIPCRAFT_MAX_CONCURRENT_RUNS")?
            .unwrap_or(defaults.max_concurrent_runs);

        Ok(Self {
            tick_interval,
            time_scale,
            progress_step,
            max_concurrent_runs,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tick_interval.is_zero() {
            anyhow::bail!("tick_interval must be greater than 0");
        }

        if !self.time_scale.is_finite() || self.time_scale <= 0.0 {
            anyhow::bail!("time_scale must be a positive number");
        }

        if self.progress_step == 0 || self.progress_step > 100 {
            anyhow::bail!("progress_step must be between 1 and 100");
        }

        if self.max_concurrent_runs == 0 {
            anyhow::bail!("max_concurrent_runs must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

fn env_parse<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.tick_interval, Duration::from_millis(500));
        assert_eq!(config.progress_step, 25);
        assert_eq!(config.max_concurrent_runs, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        // Valid config should pass
        assert!(config.validate().is_ok());

        config.tick_interval = Duration::ZERO;
        assert!(config.validate().is_err());
        config.tick_interval = Duration::from_millis(100);

        config.time_scale = 0.0;
        assert!(config.validate().is_err());
        config.time_scale = f64::NAN;
        assert!(config.validate().is_err());
        config.time_scale = 1.0;

        config.progress_step = 0;
        assert!(config.validate().is_err());
        config.progress_step = 101;
        assert!(config.validate().is_err());
        config.progress_step = 10;

        config.max_concurrent_runs = 0;
        assert!(config.validate().is_err());
        config.max_concurrent_runs = 1;

        assert!(config.validate().is_ok());
    }
}
