//! The YAML configuration of the sluice binary.
//!
//! A config names the namespace, the reporting interval, the filter and the
//! publisher, plus the optional knobs with their defaults. Validation that
//! needs no backend happens at load time.
use std::{fs, net::SocketAddr, path::Path, time::Duration};

use rustc_hash::FxHashMap;
use serde::Deserialize;

use crate::{
    filter, publish,
    reporter::{self, DurationUnit, PreviousCounterValues},
};

/// Errors produced by [`Config`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error for a serde [`serde_yaml`].
    #[error("Failed to deserialize yaml: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    /// Error for IO operations when reading the config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The reporting interval was zero.
    #[error("reporting_interval_milliseconds must be greater than zero")]
    ZeroInterval,
    /// The filter configuration is invalid.
    #[error("Invalid filter: {0}")]
    Filter(#[from] filter::Error),
    /// A static dimension has an empty name.
    #[error("Static dimension names must not be empty, found one with value {value:?}")]
    EmptyDimensionName {
        /// The value paired with the empty name
        value: String,
    },
}

fn default_reporting_interval() -> u64 {
    60_000
}

/// Main configuration struct for this program
#[derive(Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// The namespace every data point is published under
    pub namespace: String,
    /// The period on which reporting cycles run.
    #[serde(default = "default_reporting_interval")]
    pub reporting_interval_milliseconds: u64,
    /// Dimensions attached to every data point
    #[serde(default)]
    pub static_dimensions: FxHashMap<String, String>,
    /// The unit timer durations are reported in
    #[serde(default)]
    pub duration_unit: DurationUnit,
    /// Whether counters are cleared or diffed
    #[serde(default)]
    pub counter_mode: CounterMode,
    /// Which data points are published
    #[serde(default)]
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub filter: filter::Config,
    /// Where batches are sent
    #[serde(with = "serde_yaml::with::singleton_map_recursive")]
    pub publisher: publish::Config,
    /// The method by which to express sluice's own telemetry
    pub telemetry: Option<Telemetry>,
}

/// How counters are read, as configured. See [`reporter::CounterMode`].
#[derive(Debug, Default, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum CounterMode {
    /// Clear counters on every read.
    #[default]
    Clear,
    /// Report the change since the previous cycle, never clearing.
    Delta,
}

impl From<CounterMode> for reporter::CounterMode {
    fn from(mode: CounterMode) -> Self {
        match mode {
            CounterMode::Clear => reporter::CounterMode::Clear,
            CounterMode::Delta => reporter::CounterMode::Delta(PreviousCounterValues::new()),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(deny_unknown_fields)]
/// Defines the manner of sluice's telemetry.
pub struct Telemetry {
    /// Address and port for the prometheus exporter
    pub prometheus_addr: SocketAddr,
}

impl Config {
    /// Parse and validate a config from YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML does not describe a config or the config
    /// fails validation.
    pub fn from_yaml_str(contents: &str) -> Result<Self, Error> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate the config file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or [`Config::from_yaml_str`]
    /// fails.
    pub fn from_path(path: &Path) -> Result<Self, Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// The reporting interval as a [`Duration`].
    #[must_use]
    pub fn reporting_interval(&self) -> Duration {
        Duration::from_millis(self.reporting_interval_milliseconds)
    }

    fn validate(&self) -> Result<(), Error> {
        if self.reporting_interval_milliseconds == 0 {
            return Err(Error::ZeroInterval);
        }
        if let Some(value) = self.static_dimensions.get("") {
            return Err(Error::EmptyDimensionName {
                value: value.clone(),
            });
        }
        filter::Configured::new(self.filter.clone())?;
        Ok(())
    }
}
