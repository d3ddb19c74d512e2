use std::path::PathBuf;

use thiserror::Error;

pub mod app_config;
pub mod duration;
pub mod probe_config;

pub use app_config::{AppConfig, load_config, setup_resolver, setup_tls_connector};
pub use probe_config::Target;

/// Startup configuration problems. All of them are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no targets configured: set URL_1 or CONFIG_FILE")]
    MissingTarget,

    #[error("invalid duration for {key}: {value:?}")]
    InvalidDuration {
        key: String,
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("probe interval for {url} must be greater than zero")]
    ZeroInterval { url: String },

    #[error("invalid target URL {url:?}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported scheme {scheme:?} in {url}; only http and https can be probed")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("target URL {url} has no host")]
    MissingHost { url: String },

    #[error("failed to read {}", path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {}", path.display())]
    InvalidYaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid listen address for {key}: {value:?}")]
    InvalidListenAddress { key: String, value: String },

    #[error("invalid DNS host {0:?}")]
    InvalidDnsHost(String),

    #[error("failed to read system resolver configuration")]
    Resolver(#[source] std::io::Error),

    #[error("failed to build TLS connector")]
    Tls(#[from] native_tls::Error),
}
