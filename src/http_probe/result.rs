use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use trust_dns_resolver::error::ResolveError;
use uuid::Uuid;

use super::phase::ReachedState;
use super::trace::PhaseEvent;

/// Why an attempt ended without an HTTP response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("DNS lookup for {host} failed")]
    Dns {
        host: String,
        #[source]
        source: ResolveError,
    },

    #[error("DNS lookup for {host} returned no addresses")]
    NoAddresses { host: String },

    #[error("TCP connect to {addr} failed")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS handshake with {host} failed")]
    Tls {
        host: String,
        #[source]
        source: native_tls::Error,
    },

    #[error("could not build request")]
    Request(#[from] hyper::http::Error),

    #[error("HTTP exchange failed")]
    Http(#[from] hyper::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

/// Everything known about one finished attempt. Built for the attempt log
/// line and then dropped; nothing here is retained.
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub id: Uuid,
    pub url: String,
    pub started_at: DateTime<Utc>,
    pub events: Vec<PhaseEvent>,
    pub reached: ReachedState,
    pub http_status: Option<u16>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl ProbeReport {
    /// Space separated `phase@elapsed(detail)` list.
    pub fn trace_summary(&self) -> String {
        self.events
            .iter()
            .map(|event| event.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
