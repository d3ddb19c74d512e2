use std::process::ExitCode;
use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use http_connection_probe::{
    config::{ConfigError, load_config, setup_resolver, setup_tls_connector},
    http_probe::{prelude::Prober, report},
    metrics::{BuildInfo, MetricsSink},
    scheduler::Scheduler,
    server::{self, ServerError},
};

#[derive(Debug, Error)]
enum StartupError {
    #[error("configuration error")]
    Config(#[from] ConfigError),

    #[error("failed to register metrics")]
    Metrics(#[from] prometheus::Error),

    #[error(transparent)]
    Server(#[from] ServerError),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "http_connection_probe=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %report(&err), "Exiting");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), StartupError> {
    let build = BuildInfo::current();
    let config = load_config()?;

    tracing::info!(
        version = %build.version,
        revision = %build.revision,
        branch = %build.branch,
        build_time = %build.build_time,
        node = %config.node_name,
        "Starting http-connection-probe"
    );
    for target in &config.targets {
        tracing::info!(
            url = %target.name,
            interval = ?target.interval,
            timeout = ?target.deadline(),
            "Configured target"
        );
    }
    tracing::info!(
        dns_hosts = ?config.dns_hosts,
        tls_insecure_skip_verify = config.tls_insecure_skip_verify,
        listen = %config.listen,
        metrics_listen = %config.metrics_listen,
        health_path = %config.health_path(),
        "Configuration loaded"
    );

    let sink = Arc::new(MetricsSink::new(&config.metrics_namespace)?);
    sink.register_build_info(&build)?;

    let resolver = setup_resolver(&config.dns_hosts)?;
    let tls = setup_tls_connector(config.tls_insecure_skip_verify)?;
    let prober = Arc::new(Prober::new(resolver, tls, sink.clone()));

    let health_listener = server::bind(config.listen).await?;
    let metrics_listener = server::bind(config.metrics_listen).await?;

    let scheduler = Scheduler::new(prober, config.targets.clone()).start();
    if scheduler.target_count() == 0 {
        tracing::warn!("No targets configured; serving endpoints only");
    }

    let health = server::serve(
        "health",
        health_listener,
        server::health_router(&config.health_path(), &config.node_name),
        std::future::pending(),
    );
    let metrics = server::serve(
        "metrics",
        metrics_listener,
        server::metrics_router(sink),
        std::future::pending(),
    );

    let result = tokio::select! {
        result = health => result,
        result = metrics => result,
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received; abandoning in-flight probes");
            Ok(())
        }
    };

    scheduler.shutdown();
    scheduler.join().await;
    result.map_err(StartupError::from)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
