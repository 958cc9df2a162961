//! Control API Server

use super::{api::ControlApi, handlers::AppState, types::ApiAuthConfig};
use crate::{metrics::Metrics, pool::Pool, Result};
use anyhow::Context;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Control API server
pub struct ControlServer {
    bind_addr: SocketAddr,
    app_state: AppState,
    auth_config: ApiAuthConfig,
}

impl ControlServer {
    /// Create a new control server
    pub fn new(
        bind_addr: SocketAddr,
        pool: Arc<Pool>,
        metrics: Arc<Metrics>,
        auth_config: ApiAuthConfig,
    ) -> Self {
        let app_state = AppState {
            pool,
            metrics,
            start_time: SystemTime::now(),
        };

        Self {
            bind_addr,
            app_state,
            auth_config,
        }
    }

    /// Start the control API server. Serves until the shutdown signal
    /// arrives, then finishes in-flight requests and returns.
    pub async fn start(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("Starting control API server on {}", self.bind_addr);

        let app = ControlApi::create_router(self.app_state, self.auth_config);

        let listener = TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("Failed to bind control API server to {}", self.bind_addr))?;

        info!("Control API server listening on {}", self.bind_addr);

        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Control API server shutting down");
        });
        if let Err(e) = serve.await {
            error!("Control API server error: {}", e);
            return Err(e.into());
        }

        Ok(())
    }

    /// Create a router for testing
    pub fn create_test_router(&self) -> Router {
        ControlApi::create_router(self.app_state.clone(), self.auth_config.clone())
    }
}
