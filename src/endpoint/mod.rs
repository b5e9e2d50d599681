//! Endpoint subsystem: the frames attached to a relay.
//!
//! # Data Flow
//! ```text
//! transport accepts a frame
//!     → directory.rs attach(origin) → EndpointId + outbound receiver
//!     → relay addresses the endpoint by id (directed) or origin (broadcast)
//!     → transport drains the receiver onto the wire
//!
//! frame goes away
//!     → directory.rs detach(id) → relay forgets its subscriptions
//! ```
//!
//! # Design Decisions
//! - Endpoints are opaque ids, never transport objects
//! - Delivery failures are per endpoint and never abort a fan-out

pub mod directory;

pub use directory::{DeliveryError, EndpointDirectory, EndpointId};
