//! HTTP exposition of relay metrics
//!
//! Serves [`SiteMetrics`] in Prometheus text format at `GET /metrics`
//! until the cancellation token fires.

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::app::services::metrics::SiteMetrics;
use crate::constants::METRICS_PATH;
use crate::{Error, Result};

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Bind the metrics listener
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::io(format!("Failed to bind metrics endpoint on {}", addr), e))
}

/// Router with the metrics route
pub fn router(metrics: Arc<SiteMetrics>) -> Router {
    Router::new()
        .route(METRICS_PATH, get(render_metrics))
        .with_state(metrics)
}

async fn render_metrics(State(metrics): State<Arc<SiteMetrics>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, CONTENT_TYPE)],
        metrics.render_prometheus(),
    )
}

/// Serve metrics on an already bound listener until `cancel` fires
pub async fn serve_listener(
    listener: TcpListener,
    metrics: Arc<SiteMetrics>,
    cancel: CancellationToken,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Serving metrics on http://{}{}", addr, METRICS_PATH);
    }

    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| Error::io("Metrics server failed", e))
}
