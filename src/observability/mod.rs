//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! relay, transport, discovery produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stdout (tracing-subscriber fmt layer)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields (provider, endpoint, request_id) over formatted text
//! - Metric recording is a no-op until an exporter is installed

pub mod logging;
pub mod metrics;
