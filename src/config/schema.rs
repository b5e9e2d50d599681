//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::TargetOrigin;

/// Root configuration for the provider relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Discovery and protocol settings.
    pub relay: RelaySettings,

    /// WebSocket listener for frames.
    pub listener: ListenerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Development providers installed on the scope at startup.
    pub fixtures: Vec<FixtureConfig>,
}

/// Protocol settings for a relay instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Origin endpoints must have to be addressed (`*` for any).
    pub target_origin: TargetOrigin,

    /// Discovery polling interval in milliseconds.
    pub poll_interval_ms: u64,

    /// Discovery stops after this many seconds regardless of acknowledgments.
    pub discovery_timeout_secs: u64,

    /// Send already-published metadata to endpoints that attach later.
    pub replay_on_attach: bool,

    /// Outbound messages buffered per endpoint; an endpoint that falls this
    /// far behind is detached.
    pub endpoint_queue: usize,

    /// Allow-listed provider names.
    pub providers: Vec<ProviderEntry>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            target_origin: TargetOrigin::Any,
            poll_interval_ms: 250,
            discovery_timeout_secs: 30,
            replay_on_attach: true,
            endpoint_queue: 1024,
            providers: default_providers(),
        }
    }
}

/// One allow-listed provider name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ProviderEntry {
    /// Name on the host scope.
    pub name: String,

    /// Nested provider published separately as `name.nested`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested: Option<String>,
}

impl ProviderEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nested: None,
        }
    }

    pub fn with_nested(name: impl Into<String>, nested: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nested: Some(nested.into()),
        }
    }

    /// Qualified `name.nested` address, when a nested provider is configured.
    pub fn nested_name(&self) -> Option<String> {
        self.nested
            .as_ref()
            .map(|child| format!("{}.{}", self.name, child))
    }
}

fn default_providers() -> Vec<ProviderEntry> {
    vec![
        ProviderEntry::new("unisat"),
        ProviderEntry::with_nested("XverseProviders", "BitcoinProvider"),
        ProviderEntry::new("magicEden"),
        ProviderEntry::new("okxwallet"),
        ProviderEntry::new("LeatherProvider"),
        ProviderEntry::new("phantom"),
        ProviderEntry::new("OrangeWalletProviders"),
    ]
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8645").
    pub bind_address: String,

    /// Maximum concurrently attached frames.
    pub max_connections: usize,

    /// WebSocket upgrade path.
    pub path: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8645".to_string(),
            max_connections: 256,
            path: "/relay".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9645".to_string(),
        }
    }
}

/// A development provider defined in config.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FixtureConfig {
    /// Scope name (or child name when used as `nested`).
    pub name: String,

    #[serde(default)]
    pub methods: Vec<FixtureMethodConfig>,

    /// Events the fixture can emit; non-empty enables `on`.
    #[serde(default)]
    pub events: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested: Option<Box<FixtureConfig>>,
}

/// Canned behaviour of one fixture method.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FixtureMethodConfig {
    pub name: String,

    /// JSON value to resolve with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Failure message; exclusive with `result`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Settle asynchronously after this delay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
}
