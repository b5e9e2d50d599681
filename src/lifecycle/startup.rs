//! Startup assembly.
//!
//! # Responsibilities
//! - Build the provider scope and install config fixtures on it
//! - Create the relay over that scope

use std::sync::Arc;

use crate::config::RelayConfig;
use crate::provider::{FixtureSet, ProviderScope};
use crate::relay::Relay;

/// The pieces a server needs, wired together but not yet started.
pub struct Assembly {
    pub relay: Relay,
    pub fixtures: Arc<FixtureSet>,
}

pub fn assemble(config: &RelayConfig) -> Assembly {
    let scope = ProviderScope::new();
    let fixtures = FixtureSet::from_configs(&config.fixtures);
    fixtures.install(&scope);

    tracing::info!(
        allow_listed = config.relay.providers.len(),
        fixtures = fixtures.len(),
        "Relay assembled"
    );

    Assembly {
        relay: Relay::new(config.relay.clone(), scope),
        fixtures: Arc::new(fixtures),
    }
}
