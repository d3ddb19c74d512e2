//! The two HTTP surfaces: Prometheus exposition and the health endpoint.
//!
//! Neither consults probe state beyond reading the sink; the health payload
//! is static apart from the node name.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::metrics::MetricsSink;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("{name} server stopped")]
    Serve {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub node: String,
}

/// Router serving `GET /metrics` from `sink`.
pub fn metrics_router(sink: Arc<MetricsSink>) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .with_state(sink)
        .layer(TraceLayer::new_for_http())
}

/// Router serving the health payload on `health_path`.
pub fn health_router(health_path: &str, node_name: &str) -> Router {
    let status = Arc::new(HealthStatus {
        status: "OK".to_string(),
        node: node_name.to_string(),
    });
    Router::new()
        .route(health_path, get(health))
        .with_state(status)
        .layer(TraceLayer::new_for_http())
}

async fn metrics(State(sink): State<Arc<MetricsSink>>) -> Response {
    match sink.render() {
        Ok(body) => ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

async fn health(State(status): State<Arc<HealthStatus>>) -> Json<HealthStatus> {
    Json(status.as_ref().clone())
}

pub async fn bind(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

/// Serve `router` until `shutdown` resolves or the listener fails.
pub async fn serve<F>(
    name: &'static str,
    listener: TcpListener,
    router: Router,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(server = name, address = %addr, "Listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|source| ServerError::Serve { name, source })
}
