//! HTTP transport for the relay.
//!
//! # Data Flow
//! ```text
//! browser frame / CLI
//!     → server.rs (Axum router, connection cap, graceful shutdown)
//!     → websocket.rs (one attached endpoint per socket, text frames ↔ Relay)
//!     → status.rs (GET /status, fixture event injection)
//! ```

pub mod server;
pub mod status;
pub mod websocket;

pub use server::{AppState, RelayServer};
