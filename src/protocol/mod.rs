//! Wire protocol spoken between the relay and embedded frames.
//!
//! # Data Flow
//! ```text
//! frame → relay:  PROVIDER_ACKNOWLEDGMENT | CALL_METHOD | SUBSCRIBE_EVENT | UNSUBSCRIBE_EVENT
//!     → message.rs (lenient parse, MalformedMessage keeps the requestId when present)
//!     → Inbound
//!
//! relay → frame:  PROVIDER_METADATA | METHOD_RESPONSE | EVENT_TRIGGER
//!     ← Outbound (serde, `type` discriminator, camelCase fields)
//! ```
//!
//! # Design Decisions
//! - Messages unrelated to the relay are ignored, not rejected
//! - Provider names are `name` or `parent.child` (names.rs)
//! - Origins are normalised through `url` before comparison (origin.rs)

pub mod message;
pub mod names;
pub mod origin;

pub use message::{parse_inbound, Inbound, MalformedMessage, Outbound, RequestId};
pub use names::ProviderPath;
pub use origin::{Origin, OriginError, TargetOrigin};
