//! Configuration module
//!
//! Builds the runner configuration from the environment and command-line
//! overrides.

use anyhow::{Context, Result};
use clipcraft_runner::Config;
use std::time::Duration;
use tracing::info;

/// Settings given on the command line; `None` keeps the environment value
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub tick_ms: Option<u64>,
    pub time_scale: Option<f64>,
    pub progress_step: Option<u8>,
}

/// Loads configuration from the environment, falling back to defaults,
/// then applies overrides
pub fn load_config(overrides: &Overrides) -> Result<Config> {
    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            info!("Failed to load config from environment ({}), using defaults", e);
            Config::default()
        }
    };

    if let Some(tick_ms) = overrides.tick_ms {
        config.tick_interval = Duration::from_millis(tick_ms);
    }
    if let Some(time_scale) = overrides.time_scale {
        config.time_scale = time_scale;
    }
    if let Some(step) = overrides.progress_step {
        config.progress_step = step;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_applied() {
        let config = load_config(&Overrides {
            tick_ms: Some(50),
            time_scale: Some(120.0),
            progress_step: Some(10),
        })
        .unwrap();

        assert_eq!(config.tick_interval, Duration::from_millis(50));
        assert_eq!(config.time_scale, 120.0);
        assert_eq!(config.progress_step, 10);
    }

    #[test]
    fn test_invalid_override_rejected() {
        let result = load_config(&Overrides {
            tick_ms: Some(0),
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
