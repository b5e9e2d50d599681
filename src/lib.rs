//! Wallet provider relay library.
//!
//! Bridges wallet provider objects living in a host scope to embedded frames
//! that cannot reach them directly. Frames attach as endpoints and speak a
//! small JSON message protocol: the relay announces discovered providers,
//! forwards method calls and fans provider events out to subscribers.

// Core subsystems
pub mod config;
pub mod endpoint;
pub mod protocol;
pub mod provider;
pub mod relay;

// Transport
pub mod http;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::schema::RelayConfig;
pub use http::RelayServer;
pub use lifecycle::Shutdown;
pub use provider::{Provider, ProviderScope};
pub use relay::Relay;
