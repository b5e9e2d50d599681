//! Host-side wallet providers.
//!
//! # Data Flow
//! ```text
//! host / extension
//!     → scope.rs (ProviderScope: name → provider, change notification)
//!     → adapter.rs (ProviderHandle: capability probe, error mapping)
//!     → relay (discovery, calls, event wiring)
//!
//! fixture.rs: config-defined providers for development and tests
//! ```
//!
//! # Design Decisions
//! - Providers are trait objects; optional capabilities (events, nested
//!   providers) default to absent
//! - A method either returns a value now, returns one later, or fails now
//! - Only the adapter inspects capabilities; the relay never does

pub mod adapter;
pub mod fixture;
pub mod scope;

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

pub use adapter::ProviderHandle;
pub use fixture::{FixtureProvider, FixtureSet};
pub use scope::ProviderScope;

/// Failure reported by a provider. The message is what frames see.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// What a successful method dispatch hands back.
pub enum Invocation {
    /// Value available immediately.
    Ready(Value),
    /// Value (or rejection) delivered later.
    Deferred(BoxFuture<'static, ProviderResult<Value>>),
}

impl Invocation {
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = ProviderResult<Value>> + Send + 'static,
    {
        Self::Deferred(Box::pin(future))
    }
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Self::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Callback a provider invokes for each occurrence of a subscribed event.
pub type EventCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Optional event capability (`on(event, callback)`).
pub trait EventSource: Send + Sync {
    fn on(&self, event: &str, callback: EventCallback) -> ProviderResult<()>;
}

/// A wallet provider living on the host scope.
pub trait Provider: Send + Sync {
    /// Own callable members, in declaration order.
    fn methods(&self) -> Vec<String>;

    /// Dispatch a call. `Err` is a synchronous failure.
    fn invoke(&self, method: &str, args: Vec<Value>) -> ProviderResult<Invocation>;

    fn events(&self) -> Option<&dyn EventSource> {
        None
    }

    /// A provider object hanging off this one (e.g. `XverseProviders.BitcoinProvider`).
    fn nested(&self, _name: &str) -> Option<Arc<dyn Provider>> {
        None
    }
}
