//! Provider discovery and metadata publication.
//!
//! # Responsibilities
//! - Periodically look up allow-listed names on the scope
//! - Publish metadata once per name (parent and nested separately)
//! - Stop on full acknowledgment, on the discovery deadline, or on `stop()`

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::config::schema::ProviderEntry;
use crate::observability::metrics;
use crate::protocol::{Outbound, ProviderPath};
use crate::provider::{Provider, ProviderHandle};
use crate::relay::{DiscoveryPhase, Relay};

pub(crate) async fn run(relay: Relay, mut signal: watch::Receiver<Option<DiscoveryPhase>>) {
    let settings = relay.settings().clone();
    let scope = relay.scope().clone();

    let mut ticker = time::interval(Duration::from_millis(settings.poll_interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let deadline = time::sleep(Duration::from_secs(settings.discovery_timeout_secs));
    tokio::pin!(deadline);

    tracing::info!(
        providers = settings.providers.len(),
        poll_interval_ms = settings.poll_interval_ms,
        timeout_secs = settings.discovery_timeout_secs,
        "Provider discovery starting"
    );

    let outcome = loop {
        tokio::select! {
            biased;
            _ = &mut deadline => break DiscoveryPhase::TimedOut,
            changed = signal.changed() => {
                match changed {
                    Ok(()) => {
                        if let Some(phase) = *signal.borrow_and_update() {
                            break phase;
                        }
                    }
                    Err(_) => break DiscoveryPhase::Stopped,
                }
            }
            _ = ticker.tick() => {
                if relay.scan() {
                    break DiscoveryPhase::Complete;
                }
            }
            _ = scope.changed() => {
                if relay.scan() {
                    break DiscoveryPhase::Complete;
                }
            }
        }
    };

    relay.finish_discovery(outcome);
}

impl Relay {
    /// One discovery pass. Returns true once every allow-listed name is acknowledged.
    pub(crate) fn scan(&self) -> bool {
        let providers = &self.inner.settings.providers;
        let pending: Vec<&ProviderEntry> = {
            let state = self.lock_state();
            if !state.is_discovering() {
                return false;
            }
            if state.all_acknowledged(providers) {
                return true;
            }
            providers.iter().filter(|p| state.is_pending(p)).collect()
        };

        for entry in pending {
            if let Some(provider) = self.inner.scope.get(&entry.name) {
                self.publish(entry, provider);
            }
        }
        false
    }

    /// Publish whichever of `entry`'s parent and nested provider are new.
    ///
    /// A nested provider that shows up after its parent is published on a
    /// later pass.
    fn publish(&self, entry: &ProviderEntry, provider: Arc<dyn Provider>) {
        let root = ProviderHandle::new(ProviderPath::root(&entry.name), provider);
        let mut candidates = vec![(entry.name.clone(), root.clone())];
        if let Some(child) = entry.nested.as_deref() {
            match root.nested(child) {
                Some(nested) => candidates.push((nested.path().to_string(), nested)),
                None => tracing::trace!(
                    provider = %entry.name,
                    nested = child,
                    "Nested provider not present yet"
                ),
            }
        }
        // Provider code runs outside the lock.
        let messages: Vec<(String, Outbound)> = candidates
            .into_iter()
            .map(|(name, handle)| {
                let message = Outbound::metadata(handle.path().clone(), handle.method_names());
                (name, message)
            })
            .collect();

        // Broadcast under the lock so a concurrent attach sees either the
        // replay or the broadcast, never both.
        let mut state = self.lock_state();
        if !state.is_discovering() {
            return;
        }
        for (name, message) in messages {
            if state.is_settled(&name) {
                continue;
            }
            state.detected.insert(name);
            let delivered = self
                .inner
                .endpoints
                .broadcast(&self.inner.settings.target_origin, &message);
            if let Outbound::ProviderMetadata { provider_name, methods } = &message {
                tracing::info!(
                    provider = %provider_name,
                    methods = ?methods,
                    endpoints = delivered,
                    "Provider metadata published"
                );
                metrics::record_metadata_published(&provider_name.to_string());
            }
            state.published.push(message);
        }
    }

    pub(crate) fn finish_discovery(&self, outcome: DiscoveryPhase) {
        let mut state = self.lock_state();
        if state.phase == DiscoveryPhase::Running {
            state.phase = outcome;
        }
        tracing::info!(
            outcome = ?state.phase,
            detected = state.detected.len(),
            acknowledged = state.acknowledged.len(),
            "Provider discovery finished"
        );
    }
}
