//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router with the relay, status and fixture handlers
//! - Wire up tracing middleware
//! - Start the relay before serving and stop it once the listener drains

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower_http::trace::TraceLayer;

use crate::config::ListenerConfig;
use crate::http::{status, websocket};
use crate::lifecycle::{Assembly, Shutdown};
use crate::provider::FixtureSet;
use crate::relay::Relay;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub relay: Relay,
    pub fixtures: Arc<FixtureSet>,
    pub max_connections: usize,
    /// One permit per open WebSocket connection.
    pub connection_limit: Arc<Semaphore>,
}

/// HTTP/WebSocket front of a relay.
pub struct RelayServer {
    router: Router,
    relay: Relay,
}

impl RelayServer {
    pub fn new(assembly: Assembly, listener: &ListenerConfig) -> Self {
        let state = AppState {
            relay: assembly.relay.clone(),
            fixtures: assembly.fixtures,
            max_connections: listener.max_connections,
            connection_limit: Arc::new(Semaphore::new(listener.max_connections)),
        };
        Self {
            router: Self::build_router(&listener.path, state),
            relay: assembly.relay,
        }
    }

    fn build_router(path: &str, state: AppState) -> Router {
        Router::new()
            .route(path, get(websocket::ws_handler))
            .route("/status", get(status::status_handler))
            .route("/fixtures/{name}/events/{event}", post(status::emit_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
    }

    /// The router alone, for driving handlers without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    /// Start discovery and serve until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Relay server starting");

        self.relay.start();

        let relay = self.relay.clone();
        let result = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await;

        relay.stop();
        relay.discovery_finished().await;
        tracing::info!("Relay server stopped");
        result
    }
}
