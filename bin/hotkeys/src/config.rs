use std::path::PathBuf;

use anyhow::{Context as _, Error as GenericError};
use clap::{Args, Parser};
use figment::{
    providers::{Env, Format as _, Serialized, Yaml},
    Figment,
};
use hotkeys_aggregator::AggregatorConfiguration;
use serde::Serialize;

/// Prefix for environment variables that override configuration settings.
///
/// Nested settings are separated by a double underscore, for example `HOTKEYS_SKETCH_ERROR_BOUNDS__EPSILON`.
const ENV_PREFIX: &str = "HOTKEYS_";

/// Environment variables under `ENV_PREFIX` which control logging rather than aggregation.
const LOGGING_ENV_KEYS: &[&str] = &["log_level", "log_format_json"];

/// Reads `key [count]` lines from standard input and periodically prints the most frequent keys.
///
/// Each emission is printed as a single line of `key:count` pairs, in ascending order of estimated count. When input
/// is exhausted, or on Ctrl-C, any emission not yet printed is printed, followed by the entries accumulated since the
/// last emission.
#[derive(Clone, Debug, Parser)]
#[command(version)]
pub struct Cli {
    /// Path to a YAML configuration file.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,
}

/// Command-line overrides, which take precedence over the configuration file and environment.
#[derive(Args, Clone, Debug, Default, Serialize)]
pub struct Overrides {
    /// Number of keys to track.
    #[arg(long, short = 'k')]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,

    /// How often to print the current top keys, in milliseconds.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emit_interval_ms: Option<u64>,

    /// Whether to clear all counts after each emission.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_on_emit: Option<bool>,

    /// Maximum number of events waiting to be processed.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_capacity: Option<usize>,

    /// Maximum number of emissions waiting to be printed.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emission_buffer: Option<usize>,

    /// Number of rows in the frequency sketch.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sketch_depth: Option<usize>,

    /// Number of counters per row in the frequency sketch.
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sketch_width: Option<usize>,
}

/// Loads the aggregator configuration.
///
/// Sources are layered in the following order, with later sources taking precedence: built-in defaults, the
/// configuration file (if any), `HOTKEYS_`-prefixed environment variables, and finally command-line overrides.
pub fn load_configuration(cli: &Cli) -> Result<AggregatorConfiguration, GenericError> {
    let mut figment = Figment::from(Serialized::defaults(AggregatorConfiguration::with_defaults()));

    if let Some(path) = &cli.config {
        if !path.exists() {
            anyhow::bail!("Configuration file '{}' does not exist.", path.display());
        }
        figment = figment.admerge(Yaml::file(path));
    }

    let config: AggregatorConfiguration = figment
        .admerge(Env::prefixed(ENV_PREFIX).ignore(LOGGING_ENV_KEYS).split("__"))
        .admerge(Serialized::defaults(&cli.overrides))
        .extract()
        .context("Failed to load configuration.")?;

    config.validate().context("Invalid configuration.")?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("hotkeys").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_without_sources() {
        Jail::expect_with(|_| {
            let config = load_configuration(&cli(&[])).unwrap();
            assert_eq!(config, AggregatorConfiguration::with_defaults());
            Ok(())
        });
    }

    #[test]
    fn sources_are_layered() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "hotkeys.yaml",
                "top_k: 3\nemit_interval_ms: 250\nsketch_width: 2048\nsketch_error_bounds:\n  epsilon: 0.01\n  delta: 0.99\n",
            )?;
            jail.set_env("HOTKEYS_EMIT_INTERVAL_MS", "750");
            jail.set_env("HOTKEYS_SKETCH_ERROR_BOUNDS__DELTA", "0.5");
            jail.set_env("HOTKEYS_LOG_LEVEL", "debug");

            let config = load_configuration(&cli(&["--config", "hotkeys.yaml", "--top-k", "5"])).unwrap();
            assert_eq!(config.top_k, 5);
            assert_eq!(config.emit_interval_ms, 750);
            assert_eq!(config.sketch_width, 2048);
            assert_eq!(config.sketch_depth, 5);
            assert!(config.reset_on_emit);

            let bounds = config.sketch_error_bounds.unwrap();
            assert_eq!((bounds.epsilon, bounds.delta), (0.01, 0.5));
            Ok(())
        });
    }

    #[test]
    fn boolean_override() {
        Jail::expect_with(|_| {
            let config = load_configuration(&cli(&["--reset-on-emit", "false"])).unwrap();
            assert!(!config.reset_on_emit);
            Ok(())
        });
    }

    #[test]
    fn invalid_values_are_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("HOTKEYS_QUEUE_CAPACITY", "0");
            assert!(load_configuration(&cli(&[])).is_err());

            jail.set_env("HOTKEYS_QUEUE_CAPACITY", "lots");
            assert!(load_configuration(&cli(&[])).is_err());
            Ok(())
        });
    }

    #[test]
    fn missing_file_is_an_error() {
        Jail::expect_with(|_| {
            assert!(load_configuration(&cli(&["--config", "missing.yaml"])).is_err());
            Ok(())
        });
    }
}
