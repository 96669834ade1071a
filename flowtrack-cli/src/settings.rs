//! Tracker configuration loading for the CLI
//!
//! Values are layered: built-in defaults, then an optional configuration
//! file, then `FLOWTRACK_*` environment variables, then command-line flags.

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use flowtrack_core::TrackerConfig;
use log::debug;
use std::path::Path;

/// Prefix of the environment variables read, e.g. `FLOWTRACK_MAX_FLOWS`.
pub const ENV_PREFIX: &str = "FLOWTRACK";

/// Build the tracker configuration from all sources.
pub fn load_tracker_config(path: Option<&Path>, max_flows: Option<u32>) -> Result<TrackerConfig> {
    let defaults = TrackerConfig::default();

    let mut builder = Config::builder()
        .set_default("max_flows", i64::from(defaults.max_flows))
        .context("Failed to set configuration defaults")?;

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }
    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX));

    if let Some(max_flows) = max_flows {
        builder = builder
            .set_override("max_flows", i64::from(max_flows))
            .context("Failed to apply --max-flows")?;
    }

    let tracker_config: TrackerConfig = builder
        .build()
        .context("Failed to read tracker configuration")?
        .try_deserialize()
        .context("Invalid tracker configuration")?;

    tracker_config
        .validate()
        .context("Invalid tracker configuration")?;

    debug!("Tracker configuration: {:?}", tracker_config);
    Ok(tracker_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_flag_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "max_flows = 64").unwrap();

        let config = load_tracker_config(Some(file.path()), None).unwrap();
        assert_eq!(config.max_flows, 64);

        let config = load_tracker_config(Some(file.path()), Some(8)).unwrap();
        assert_eq!(config.max_flows, 8);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(load_tracker_config(Some(path.as_path()), None).is_err());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(load_tracker_config(None, Some(0)).is_err());
    }
}
