//! ---
//! ems_section: "03-persistence-logging"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Metrics collection and export utilities."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::core::Collector;
use prometheus::{Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

mod daemon;
mod fleet;

pub use daemon::{DaemonMetrics, StartupReport};
pub use fleet::{FleetMetrics, PollOutcome};

pub type SharedRegistry = Arc<Registry>;

pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Register `collector` and hand it back for recording.
pub(crate) fn registered<C>(registry: &Registry, collector: C) -> Result<C>
where
    C: Collector + Clone + 'static,
{
    let name = collector
        .desc()
        .first()
        .map(|desc| desc.fq_name.clone())
        .unwrap_or_default();
    registry
        .register(Box::new(collector.clone()))
        .with_context(|| format!("failed to register metric {name}"))?;
    Ok(collector)
}

/// Render every family in `registry` in the Prometheus text format.
pub fn render(registry: &Registry) -> Result<String> {
    TextEncoder::new()
        .encode_to_string(&registry.gather())
        .context("failed to encode metrics")
}

/// Serve `registry` at `/metrics` on `addr`. Port `0` picks a free port;
/// [`MetricsServer::addr`] reports the bound one.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get({
            let registry = registry.clone();
            move || metrics_handler(registry.clone())
        }),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .with_context(|| "failed to configure metrics listener as non-blocking")?;
    let bound = std_listener
        .local_addr()
        .with_context(|| "failed to read metrics listener address")?;
    let listener = TcpListener::from_std(std_listener)
        .with_context(|| "failed to convert std listener into tokio listener")?;

    info!(address = %bound, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let handle: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr: bound,
        shutdown: Some(shutdown_tx),
        task: handle,
    })
}

async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    match render(&registry) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("metrics encoding error"),
            )
                .into_response()
        }
    }
}

/// Handle to the running HTTP exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and await task completion.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(err),
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

pub use prometheus;

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn exporter_serves_registered_families() {
        let registry = new_registry();
        let fleet = FleetMetrics::new(registry.clone()).unwrap();
        fleet.record_poll("pm-1", PollOutcome::Ok, 0.01);

        let server = spawn_http_server(registry, SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        assert_ne!(server.addr().port(), 0);

        let mut stream = TcpStream::connect(server.addr()).await.unwrap();
        stream
            .write_all(b"GET /metrics HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("pmfleet_polls_total"));
        server.shutdown().await.unwrap();
    }
}
