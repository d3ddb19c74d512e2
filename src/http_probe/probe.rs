use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use hyper::header::{CONNECTION, HOST, USER_AGENT};
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_native_tls::TlsConnector as TokioTlsConnector;
use trust_dns_resolver::TokioAsyncResolver;
use url::{Host, Url};
use uuid::Uuid;
use x509_parser::parse_x509_certificate;

use super::prelude::*;
use super::report;
use super::stream::TracedStream;
use crate::config::Target;
use crate::metrics::MetricsSink;

/// Executes single instrumented requests and counts their outcome.
///
/// Every attempt resolves, connects and (for https) handshakes from scratch:
/// nothing is pooled, so each probe measures the full cost of reaching the
/// target. The resolver and TLS connector are read-only configuration.
pub struct Prober {
    resolver: TokioAsyncResolver,
    tls: TokioTlsConnector,
    sink: Arc<MetricsSink>,
    user_agent: String,
}

impl Prober {
    pub fn new(resolver: TokioAsyncResolver, tls: TokioTlsConnector, sink: Arc<MetricsSink>) -> Self {
        Self {
            resolver,
            tls,
            sink,
            user_agent: format!("http-connection-probe/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn sink(&self) -> &Arc<MetricsSink> {
        &self.sink
    }

    /// Run one attempt against `target`, classify it, count it and log it.
    ///
    /// Never fails: every attempt ends in exactly one reached state and one
    /// counter increment.
    pub async fn probe(&self, target: &Target) -> ProbeReport {
        let id = Uuid::new_v4();
        let started_at = Utc::now();
        let tracer = Tracer::new();

        let exchange = self.exchange(target, tracer.clone());
        let outcome = match target.deadline() {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(outcome) => outcome,
                Err(_) => Err(TransportError::Timeout(limit)),
            },
            None => exchange.await,
        };

        let recorder = tracer.into_recorder();
        let reached = classify(&outcome, recorder.last_recorded());
        self.sink.inc(&target.name, reached);

        let (http_status, error) = match &outcome {
            Ok(status) => (Some(status.as_u16()), None),
            Err(err) => (None, Some(report(err))),
        };
        let report = ProbeReport {
            id,
            url: target.name.clone(),
            started_at,
            elapsed: recorder.elapsed(),
            events: recorder.events().to_vec(),
            reached,
            http_status,
            error,
        };
        log_report(&report);
        report
    }

    async fn exchange(&self, target: &Target, tracer: Tracer) -> Result<StatusCode, TransportError> {
        let url = &target.url;
        let host = host_name(url);
        let port = url.port_or_known_default().unwrap_or(80);

        tracer.record_with(ConnectionPhase::GetConn, || format!("{host}:{port}"));

        let addrs = self.resolve(url, port, &tracer).await?;
        let stream = connect(&addrs, &tracer).await?;

        if !target.is_tls() {
            return self.send(stream, url, tracer).await;
        }

        tracer.record(ConnectionPhase::TlsHandshakeStart);
        match self.tls.connect(&host, stream).await {
            Ok(tls_stream) => {
                tracer.record_with(ConnectionPhase::TlsHandshakeDone, || describe_tls(&tls_stream));
                self.send(tls_stream, url, tracer).await
            }
            Err(source) => {
                tracer.record_with(ConnectionPhase::TlsHandshakeDone, || format!("error: {source}"));
                Err(TransportError::Tls { host, source })
            }
        }
    }

    /// Resolve the target host. IP literals skip resolution entirely, so no
    /// DNS phases are recorded for them.
    async fn resolve(
        &self,
        url: &Url,
        port: u16,
        tracer: &Tracer,
    ) -> Result<Vec<SocketAddr>, TransportError> {
        let domain = match url.host() {
            Some(Host::Domain(domain)) => domain,
            Some(Host::Ipv4(ip)) => return Ok(vec![SocketAddr::new(ip.into(), port)]),
            Some(Host::Ipv6(ip)) => return Ok(vec![SocketAddr::new(ip.into(), port)]),
            None => {
                return Err(TransportError::NoAddresses {
                    host: String::new(),
                });
            }
        };

        tracer.record_with(ConnectionPhase::DnsStart, || domain);
        match self.resolver.lookup_ip(domain).await {
            Ok(lookup) => {
                let addrs: Vec<SocketAddr> =
                    lookup.iter().map(|ip| SocketAddr::new(ip, port)).collect();
                tracer.record_with(ConnectionPhase::DnsDone, || {
                    addrs
                        .iter()
                        .map(|addr| addr.ip().to_string())
                        .collect::<Vec<_>>()
                        .join(",")
                });
                if addrs.is_empty() {
                    return Err(TransportError::NoAddresses {
                        host: domain.to_string(),
                    });
                }
                Ok(addrs)
            }
            Err(source) => {
                tracer.record_with(ConnectionPhase::DnsDone, || format!("error: {source}"));
                Err(TransportError::Dns {
                    host: domain.to_string(),
                    source,
                })
            }
        }
    }

    /// Write one GET over a fresh HTTP/1.1 connection and wait for the
    /// response head. The connection is driven inside this future and
    /// dropped with it, so it is never reused.
    async fn send<S>(&self, stream: S, url: &Url, tracer: Tracer) -> Result<StatusCode, TransportError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let request = build_request(url, &self.user_agent)?;
        let header_fields = request
            .headers()
            .keys()
            .map(|name| name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        let io = TokioIo::new(TracedStream::new(stream, tracer.clone(), header_fields));
        let (mut sender, connection) = hyper::client::conn::http1::handshake(io).await?;
        tracer.record(ConnectionPhase::GotConn);

        let response = sender.send_request(request);
        tokio::pin!(response);

        let response = tokio::select! {
            biased;
            result = &mut response => result?,
            result = connection => {
                // The connection may finish (or fail reading the body) in the
                // same poll that delivered the response head.
                let closed = result.err();
                match (&mut response).await {
                    Ok(response) => response,
                    Err(err) => return Err(closed.unwrap_or(err).into()),
                }
            }
        };

        Ok(response.status())
    }
}

fn build_request(url: &Url, user_agent: &str) -> Result<Request<String>, TransportError> {
    let path = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    };
    let host = url.host_str().unwrap_or_default();
    let authority = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let request = Request::get(path)
        .header(HOST, authority)
        .header(USER_AGENT, user_agent)
        .header(CONNECTION, "close")
        .body(String::new())?;
    Ok(request)
}

/// Host as used for resolution and SNI: IPv6 literals without brackets.
fn host_name(url: &Url) -> String {
    match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(ip)) => ip.to_string(),
        Some(Host::Ipv6(ip)) => ip.to_string(),
        None => String::new(),
    }
}

/// Try each resolved address in order until one accepts.
async fn connect(addrs: &[SocketAddr], tracer: &Tracer) -> Result<TcpStream, TransportError> {
    let Some(first) = addrs.first() else {
        return Err(TransportError::NoAddresses {
            host: String::new(),
        });
    };
    tracer.record_with(ConnectionPhase::ConnectStart, || format!("tcp {first}"));

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                tracer.record_with(ConnectionPhase::ConnectDone, || format!("tcp {addr}"));
                return Ok(stream);
            }
            Err(source) => last_error = Some((*addr, source)),
        }
    }

    let (addr, source) = match last_error {
        Some(failure) => failure,
        None => {
            return Err(TransportError::NoAddresses {
                host: String::new(),
            });
        }
    };
    tracer.record_with(ConnectionPhase::ConnectDone, || format!("tcp {addr} error: {source}"));
    Err(TransportError::Connect {
        addr: addr.to_string(),
        source,
    })
}

fn describe_tls<S>(stream: &tokio_native_tls::TlsStream<S>) -> String
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let der = stream
        .get_ref()
        .peer_certificate()
        .ok()
        .flatten()
        .and_then(|cert| cert.to_der().ok());

    match der.as_deref().and_then(cert_validity_days) {
        Some(days) => format!("peer certificate valid for {days}d"),
        None => "no peer certificate".to_string(),
    }
}

/// Whole days until the certificate's `notAfter`; negative once expired.
fn cert_validity_days(der: &[u8]) -> Option<i64> {
    let (_, parsed) = parse_x509_certificate(der).ok()?;
    let not_after = parsed.validity().not_after.timestamp();
    Some((not_after - Utc::now().timestamp()) / 86400)
}

fn log_report(report: &ProbeReport) {
    let elapsed_ms = format!("{:.2}", report.elapsed.as_secs_f64() * 1000.0);
    let started_at = report.started_at.to_rfc3339();
    let trace = report.trace_summary();

    if report.reached.is_completed() {
        tracing::info!(
            attempt = %report.id,
            url = %report.url,
            started_at = %started_at,
            state = %report.reached,
            status = ?report.http_status,
            elapsed_ms = %elapsed_ms,
            trace = %trace,
            "HTTP request reached state"
        );
    } else {
        tracing::warn!(
            attempt = %report.id,
            url = %report.url,
            started_at = %started_at,
            state = %report.reached,
            status = ?report.http_status,
            error = report.error.as_deref().unwrap_or(""),
            elapsed_ms = %elapsed_ms,
            trace = %trace,
            "HTTP request reached state"
        );
    }
}
