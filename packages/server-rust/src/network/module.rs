//! HTTP server lifecycle with deferred startup.
//!
//! `new()` allocates shared state, `start()` binds the listener and
//! `serve()` accepts calls until shutdown. Between `start()` and `serve()`
//! the caller knows the bound port but no call is answered yet.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    call_handler, health_handler, liveness_handler, readiness_handler, AppState,
};
use super::middleware::{build_health_timeout, build_http_layers};
use super::shutdown::ShutdownController;
use crate::service::Dispatcher;

/// Serves one [`Dispatcher`] over HTTP.
///
/// Routes:
/// - `POST /call` -- call envelope exchange (`MsgPack`)
/// - `GET /health` -- detailed health JSON
/// - `GET /health/live` -- liveness check
/// - `GET /health/ready` -- readiness check
pub struct NetworkModule {
    config: NetworkConfig,
    dispatcher: Dispatcher,
    node_id: Arc<str>,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, dispatcher: Dispatcher, node_id: impl Into<Arc<str>>) -> Self {
        Self {
            config,
            dispatcher,
            node_id: node_id.into(),
            listener: None,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    /// Shared shutdown controller, for health checks or triggering shutdown
    /// from elsewhere in the process.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Assembles the axum router with all routes and middleware.
    pub fn build_router(&self) -> Router {
        let state = AppState {
            dispatcher: self.dispatcher.clone(),
            shutdown: Arc::clone(&self.shutdown),
            node_id: Arc::clone(&self.node_id),
            start_time: Instant::now(),
        };

        let health = Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .layer(build_health_timeout(&self.config));

        Router::new()
            .route("/call", post(call_handler))
            .merge(health)
            .layer(build_http_layers(&self.config))
            .with_state(state)
    }

    /// Binds the TCP listener and returns the bound port, which differs from
    /// the configured one when that is 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves calls until `shutdown` completes, then drains.
    ///
    /// After the signal the health state moves to `Draining`, new calls are
    /// refused with 503, and in-flight calls get up to `drain_timeout` to
    /// finish before the state moves to `Stopped`.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first or the server hits
    /// a fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();
        let controller = Arc::clone(&self.shutdown);

        controller.set_ready();
        info!(node_id = %self.node_id, "serving ALO RPC calls");

        let on_signal = Arc::clone(&controller);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                on_signal.trigger_shutdown();
            })
            .await?;

        controller.trigger_shutdown();
        if controller.wait_for_drain(self.config.drain_timeout).await {
            info!("all in-flight calls drained");
        } else {
            warn!(
                in_flight = controller.in_flight_count(),
                "drain timeout expired with calls still in flight"
            );
        }
        Ok(())
    }
}
