use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use tokio_native_tls::TlsConnector as TokioTlsConnector;
use trust_dns_resolver::{
    TokioAsyncResolver,
    config::{NameServerConfig, NameServerConfigGroup, Protocol, ResolverConfig, ResolverOpts},
    system_conf::read_system_conf,
};

use super::ConfigError;
use super::duration::parse_duration;
use super::probe_config::{Target, read_targets_file};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(15);
const DEFAULT_LISTEN: &str = ":8080";
const DEFAULT_METRICS_LISTEN: &str = ":8088";
const DEFAULT_NAMESPACE: &str = "connprobe";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub targets: Vec<Target>,
    pub listen: SocketAddr,
    pub metrics_listen: SocketAddr,
    /// Always starts and ends with `/`.
    pub routes_mount_path: String,
    pub node_name: String,
    pub dns_hosts: Vec<String>,
    pub tls_insecure_skip_verify: bool,
    pub metrics_namespace: String,
}

/// Load the application configuration from the environment (and `.env`).
///
/// Targets come from `URL_1`, `URL_2`, ... and, when `CONFIG_FILE` is set,
/// from the targets file as well. `INTERVAL` and `TIMEOUT` apply to every
/// target that does not set its own.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let _ = dotenvy::dotenv();
    AppConfig::from_lookup(|key| env::var(key).ok())
}

impl AppConfig {
    /// Build the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let interval = match get("INTERVAL") {
            Some(value) => parse_duration("INTERVAL", &value)?,
            None => DEFAULT_INTERVAL,
        };
        let timeout = match get("TIMEOUT") {
            Some(value) => parse_duration("TIMEOUT", &value)?,
            None => Duration::ZERO,
        };

        let mut targets = Vec::new();
        for index in 1.. {
            let Some(url) = get(&format!("URL_{index}")) else {
                break;
            };
            targets.push(Target::new(&url, interval, timeout)?);
        }

        let config_file = get("CONFIG_FILE").map(PathBuf::from);
        if let Some(path) = &config_file {
            let file = read_targets_file(path)?;
            for target in file.targets {
                targets.push(target.into_target(interval, timeout)?);
            }
        }

        // A targets file may legitimately list nothing; an unconfigured
        // process may not.
        if targets.is_empty() && config_file.is_none() {
            return Err(ConfigError::MissingTarget);
        }

        let listen = parse_listen_address(
            "LISTEN",
            &get("LISTEN").unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
        )?;
        let metrics_listen = parse_listen_address(
            "METRICS_LISTEN",
            &get("METRICS_LISTEN").unwrap_or_else(|| DEFAULT_METRICS_LISTEN.to_string()),
        )?;

        let dns_hosts = get("DNS_HOSTS")
            .map(|hosts| {
                hosts
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let tls_insecure_skip_verify = get("TLS_INSECURE_SKIP_VERIFY")
            .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(AppConfig {
            targets,
            listen,
            metrics_listen,
            routes_mount_path: normalize_mount_path(get("ROUTES_MOUNT_PATH").as_deref()),
            node_name: get("K8S_NODE_NAME").unwrap_or_else(|| "unknown".to_string()),
            dns_hosts,
            tls_insecure_skip_verify,
            metrics_namespace: get("METRICS_NAMESPACE")
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
        })
    }

    /// Path the health route is served on.
    pub fn health_path(&self) -> String {
        format!("{}health", self.routes_mount_path)
    }
}

/// Accepts `host:port` socket addresses and the `:port` shorthand for all
/// interfaces.
pub fn parse_listen_address(key: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    let value = value.trim();
    let candidate = match value.strip_prefix(':') {
        Some(port) => format!("0.0.0.0:{port}"),
        None => value.to_string(),
    };
    candidate
        .parse()
        .map_err(|_| ConfigError::InvalidListenAddress {
            key: key.to_string(),
            value: value.to_string(),
        })
}

fn normalize_mount_path(path: Option<&str>) -> String {
    let trimmed = path.unwrap_or("/").trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

/// Setup the TLS connector used for every probe handshake.
pub fn setup_tls_connector(accept_invalid_certs: bool) -> Result<TokioTlsConnector, ConfigError> {
    let mut builder = native_tls::TlsConnector::builder();
    builder.danger_accept_invalid_certs(accept_invalid_certs);
    let connector = builder.build()?;
    Ok(TokioTlsConnector::from(connector))
}

/// Setup the DNS resolver used for every probe.
///
/// With no hosts given, the system configuration (`/etc/resolv.conf`,
/// including search domains and `ndots`) is used, so probes resolve names
/// the same way the workloads on this node do. Hosts are `ip` or `ip:port`.
/// The answer cache is disabled: every probe must hit the nameserver.
pub fn setup_resolver(dns_hosts: &[String]) -> Result<TokioAsyncResolver, ConfigError> {
    let (resolver_config, mut opts) = if dns_hosts.is_empty() {
        read_system_conf().map_err(ConfigError::Resolver)?
    } else {
        let mut name_servers = NameServerConfigGroup::new();
        for host in dns_hosts {
            let socket_addr = parse_dns_host(host)?;
            for protocol in [Protocol::Udp, Protocol::Tcp] {
                name_servers.push(NameServerConfig {
                    socket_addr,
                    protocol,
                    tls_dns_name: None,
                    trust_negative_responses: false,
                    bind_addr: None,
                });
            }
        }
        (
            ResolverConfig::from_parts(None, vec![], name_servers),
            ResolverOpts::default(),
        )
    };

    opts.cache_size = 0;
    Ok(TokioAsyncResolver::tokio(resolver_config, opts))
}

fn parse_dns_host(host: &str) -> Result<SocketAddr, ConfigError> {
    if let Ok(addr) = host.parse::<SocketAddr>() {
        return Ok(addr);
    }
    host.parse::<IpAddr>()
        .map(|ip| SocketAddr::new(ip, 53))
        .map_err(|_| ConfigError::InvalidDnsHost(host.to_string()))
}
