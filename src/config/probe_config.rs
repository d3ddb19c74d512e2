use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use super::ConfigError;
use super::duration::parse_duration;

/// Contents of the optional targets file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetsFile {
    /// Targets to probe. An empty list is valid and starts no probe loops.
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// One target as written in the targets file.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// The URL to probe with a GET request.
    pub url: String,

    /// Probe interval, e.g. `15s`. Falls back to `INTERVAL`.
    #[serde(default)]
    pub interval: Option<String>,

    /// Per-request timeout, e.g. `5s`; `0` waits forever. Falls back to `TIMEOUT`.
    #[serde(default)]
    pub timeout: Option<String>,
}

/// A validated probe destination. Read-only once loaded and shared by every
/// attempt against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// The URL exactly as configured; used as the metric label.
    pub name: String,
    pub url: Url,
    pub interval: Duration,
    /// Zero means no timeout.
    pub timeout: Duration,
}

impl Target {
    pub fn new(url: &str, interval: Duration, timeout: Duration) -> Result<Self, ConfigError> {
        let name = url.trim().to_string();
        let parsed = Url::parse(&name).map_err(|source| ConfigError::InvalidUrl {
            url: name.clone(),
            source,
        })?;

        match parsed.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(ConfigError::UnsupportedScheme {
                    url: name,
                    scheme: scheme.to_string(),
                });
            }
        }
        if parsed.host().is_none() {
            return Err(ConfigError::MissingHost { url: name });
        }
        if interval.is_zero() {
            return Err(ConfigError::ZeroInterval { url: name });
        }

        Ok(Self {
            name,
            url: parsed,
            interval,
            timeout,
        })
    }

    /// The request deadline, if any.
    pub fn deadline(&self) -> Option<Duration> {
        (!self.timeout.is_zero()).then_some(self.timeout)
    }

    pub fn is_tls(&self) -> bool {
        self.url.scheme() == "https"
    }
}

impl TargetConfig {
    /// Validate into a [`Target`], filling in the process-wide defaults.
    pub fn into_target(
        self,
        default_interval: Duration,
        default_timeout: Duration,
    ) -> Result<Target, ConfigError> {
        let interval = match &self.interval {
            Some(value) => parse_duration("interval", value)?,
            None => default_interval,
        };
        let timeout = match &self.timeout {
            Some(value) => parse_duration("timeout", value)?,
            None => default_timeout,
        };
        Target::new(&self.url, interval, timeout)
    }
}

/// Read and parse a targets file.
pub fn read_targets_file(path: &Path) -> Result<TargetsFile, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    parse_targets(&contents).map_err(|source| ConfigError::InvalidYaml {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_targets(yaml: &str) -> Result<TargetsFile, serde_yaml::Error> {
    // An empty document deserializes to null rather than a mapping.
    if yaml.trim().is_empty() {
        return Ok(TargetsFile::default());
    }
    serde_yaml::from_str(yaml)
}
