//! Relay error kinds.

use thiserror::Error;

use crate::protocol::{MalformedMessage, ProviderPath};

/// Errors raised while servicing a frame's request.
///
/// The `Display` text is what a METHOD_RESPONSE carries in `error`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RelayError {
    /// Target name does not resolve on the host scope.
    #[error("provider not found: {0}")]
    ProviderAbsent(ProviderPath),

    /// Member missing or not callable.
    #[error("method not found: {provider}.{method}")]
    MethodNotFound { provider: ProviderPath, method: String },

    /// Provider failed synchronously or rejected later; carries its message.
    #[error("{0}")]
    InvocationFailure(String),

    /// Inbound message missing required fields.
    #[error(transparent)]
    MalformedMessage(#[from] MalformedMessage),
}

impl RelayError {
    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProviderAbsent(_) => "provider_absent",
            Self::MethodNotFound { .. } => "method_not_found",
            Self::InvocationFailure(_) => "invocation_failure",
            Self::MalformedMessage(_) => "malformed_message",
        }
    }
}
