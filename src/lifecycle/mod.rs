//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Build scope + fixtures → Create relay → Serve → relay.start()
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting frames → relay.stop() → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Discovery starts only once the listener is bound
//! - The relay is always stopped explicitly; nothing relies on drop order

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{assemble, Assembly};
