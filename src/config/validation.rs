//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic, including origins)
//! - Validate value ranges (intervals > 0, interval inside the discovery window)
//! - Detect duplicate or unaddressable provider and fixture names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::{FixtureConfig, RelayConfig};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("relay.poll_interval_ms must be greater than 0")]
    ZeroPollInterval,

    #[error("relay.discovery_timeout_secs must be greater than 0")]
    ZeroDiscoveryTimeout,

    #[error("relay.poll_interval_ms ({poll_interval_ms}) must be shorter than the {timeout_secs}s discovery window")]
    PollOutlastsDiscovery { poll_interval_ms: u64, timeout_secs: u64 },

    #[error("relay.endpoint_queue must be greater than 0")]
    ZeroEndpointQueue,

    #[error("provider names must not be empty")]
    EmptyProviderName,

    #[error("provider name '{0}' must not contain '.'")]
    DottedProviderName(String),

    #[error("provider '{0}' is listed more than once")]
    DuplicateProvider(String),

    #[error("nested provider '{nested}' of '{provider}' must be non-empty and dot-free")]
    InvalidNestedName { provider: String, nested: String },

    #[error("listener.path '{0}' must start with '/'")]
    InvalidListenerPath(String),

    #[error("listener.max_connections must be greater than 0")]
    ZeroMaxConnections,

    #[error("fixture names must be non-empty and dot-free (got '{0}')")]
    InvalidFixtureName(String),

    #[error("fixture '{0}' is defined more than once")]
    DuplicateFixture(String),

    #[error("fixture method '{fixture}.{method}' sets both result and error")]
    AmbiguousFixtureMethod { fixture: String, method: String },
}

fn valid_segment(name: &str) -> bool {
    !name.is_empty() && !name.contains('.')
}

/// Check a parsed config, collecting every problem.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let relay = &config.relay;

    if relay.poll_interval_ms == 0 {
        errors.push(ValidationError::ZeroPollInterval);
    }
    if relay.discovery_timeout_secs == 0 {
        errors.push(ValidationError::ZeroDiscoveryTimeout);
    }
    if relay.poll_interval_ms > 0
        && relay.discovery_timeout_secs > 0
        && relay.poll_interval_ms >= relay.discovery_timeout_secs.saturating_mul(1000)
    {
        errors.push(ValidationError::PollOutlastsDiscovery {
            poll_interval_ms: relay.poll_interval_ms,
            timeout_secs: relay.discovery_timeout_secs,
        });
    }

    if relay.endpoint_queue == 0 {
        errors.push(ValidationError::ZeroEndpointQueue);
    }

    let mut seen = HashSet::new();
    for entry in &relay.providers {
        if entry.name.is_empty() {
            errors.push(ValidationError::EmptyProviderName);
            continue;
        }
        if entry.name.contains('.') {
            errors.push(ValidationError::DottedProviderName(entry.name.clone()));
        }
        if !seen.insert(entry.name.as_str()) {
            errors.push(ValidationError::DuplicateProvider(entry.name.clone()));
        }
        if let Some(nested) = &entry.nested {
            if !valid_segment(nested) {
                errors.push(ValidationError::InvalidNestedName {
                    provider: entry.name.clone(),
                    nested: nested.clone(),
                });
            }
        }
    }

    if !config.listener.path.starts_with('/') {
        errors.push(ValidationError::InvalidListenerPath(config.listener.path.clone()));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }

    let mut fixture_names = HashSet::new();
    for fixture in &config.fixtures {
        if !fixture_names.insert(fixture.name.as_str()) {
            errors.push(ValidationError::DuplicateFixture(fixture.name.clone()));
        }
        validate_fixture(fixture, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_fixture(fixture: &FixtureConfig, errors: &mut Vec<ValidationError>) {
    if !valid_segment(&fixture.name) {
        errors.push(ValidationError::InvalidFixtureName(fixture.name.clone()));
    }
    for method in &fixture.methods {
        if method.result.is_some() && method.error.is_some() {
            errors.push(ValidationError::AmbiguousFixtureMethod {
                fixture: fixture.name.clone(),
                method: method.name.clone(),
            });
        }
    }
    if let Some(nested) = &fixture.nested {
        validate_fixture(nested, errors);
    }
}
