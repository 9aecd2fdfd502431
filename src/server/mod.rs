pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::{http::Method, Router};
use tower_http::cors::{Any, CorsLayer};

use crate::error::{Error, Result};
use crate::metrics::MetricSource;
use crate::SitePulse;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";

/// The full HTTP application with state attached.
pub fn app<S: MetricSource + 'static>(pulse: SitePulse<S>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    routes::router::<S>()
        .layer(cors)
        .with_state(Arc::new(pulse))
}

/// Serve the API on `addr` until Ctrl-C.
pub async fn serve<S: MetricSource + 'static>(pulse: SitePulse<S>, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Config(format!("cannot bind {addr}: {e}")))?;
    match listener.local_addr() {
        Ok(local) => log::info!("Listening on http://{local}"),
        Err(_) => log::info!("Listening on {addr}"),
    }

    axum::serve(listener, app(pulse))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Other(format!("server error: {e}")))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Could not install Ctrl-C handler: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutting down");
}
