//! Endpoint origins and the relay's target-origin policy.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use url::Url;

/// Errors produced while parsing an origin string.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OriginError {
    /// Input is not an absolute URL.
    #[error("invalid origin '{input}': {reason}")]
    Invalid { input: String, reason: String },

    /// Opaque origins cannot be targeted.
    #[error("origin '{0}' is opaque and cannot be used as a target")]
    Opaque(String),
}

/// Serialized origin of an endpoint: `scheme://host[:port]`, or `null`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin(String);

impl Origin {
    /// The opaque origin used by sandboxed frames and header-less clients.
    pub fn opaque() -> Self {
        Self("null".to_string())
    }

    /// Parse and normalise an origin (path, query and default ports are dropped).
    pub fn parse(input: &str) -> Result<Self, OriginError> {
        let trimmed = input.trim();
        if trimmed == "null" {
            return Ok(Self::opaque());
        }

        let url = Url::parse(trimmed).map_err(|e| OriginError::Invalid {
            input: input.to_string(),
            reason: e.to_string(),
        })?;

        let origin = url.origin();
        if !origin.is_tuple() {
            return Ok(Self::opaque());
        }
        Ok(Self(origin.ascii_serialization()))
    }

    /// Origin taken from an `Origin` request header; anything unusable is opaque.
    pub fn from_header(value: Option<&str>) -> Self {
        value
            .and_then(|v| Self::parse(v).ok())
            .unwrap_or_else(Self::opaque)
    }

    pub fn is_opaque(&self) -> bool {
        self.0 == "null"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which endpoint origins the relay addresses and accepts messages from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TargetOrigin {
    /// `*`: every endpoint.
    #[default]
    Any,
    /// A single trusted origin.
    Exact(Origin),
}

impl TargetOrigin {
    pub fn parse(input: &str) -> Result<Self, OriginError> {
        if input.trim() == "*" {
            return Ok(Self::Any);
        }
        let origin = Origin::parse(input)?;
        if origin.is_opaque() {
            return Err(OriginError::Opaque(input.to_string()));
        }
        Ok(Self::Exact(origin))
    }

    /// Opaque endpoint origins only match the wildcard.
    pub fn matches(&self, origin: &Origin) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => !origin.is_opaque() && expected == origin,
        }
    }
}

impl fmt::Display for TargetOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Exact(origin) => origin.fmt(f),
        }
    }
}

impl Serialize for TargetOrigin {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TargetOrigin {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
