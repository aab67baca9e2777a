//! Metrics exposition server.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::metrics::Recorder;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub recorder: Arc<Recorder>,
}

/// HTTP server exposing the Prometheus scrape endpoint.
pub struct Server {
    state: AppState,
    port: u16,
}

impl Server {
    pub fn new(port: u16, recorder: Arc<Recorder>) -> Self {
        Self {
            state: AppState { recorder },
            port,
        }
    }

    fn routes(&self) -> Router {
        Router::new()
            .route("/metrics", get(handle_metrics))
            .with_state(self.state.clone())
    }

    /// Serve until `shutdown` resolves.
    ///
    /// A bind failure is returned to the caller; it is the one fatal error
    /// class in the process.
    pub async fn start<F>(
        &self,
        shutdown: F,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let router = self.routes();

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Metrics server listening on http://{}/metrics", addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

async fn handle_metrics(State(state): State<AppState>) -> Response {
    match state.recorder.render() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
