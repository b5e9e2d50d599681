//! The relay: discovery, metadata publication, call forwarding and event fan-out.
//!
//! # Data Flow
//! ```text
//! start()
//!     → discovery.rs loop (interval tick | scope change)
//!     → scan allow-list → publish PROVIDER_METADATA to matching endpoints
//!     → ends on: all acknowledged | discovery timeout | stop()
//!
//! handle_message(endpoint, json)
//!     → origin check → protocol::parse_inbound
//!     → PROVIDER_ACKNOWLEDGMENT → acknowledged set
//!     → CALL_METHOD             → calls.rs → exactly one METHOD_RESPONSE
//!     → SUBSCRIBE_EVENT         → events.rs (one provider subscription per pair)
//!     → UNSUBSCRIBE_EVENT       → events.rs
//!
//! provider event → events.rs fan-out → EVENT_TRIGGER per subscribed endpoint
//! ```
//!
//! # Design Decisions
//! - All state lives on one `Relay` value; no globals
//! - State sits behind one short-lived lock, never held across an await
//! - Detected and acknowledged names are never forgotten while the relay lives

pub mod calls;
pub mod discovery;
pub mod error;
pub mod events;
pub mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::schema::RelaySettings;
use crate::endpoint::{EndpointDirectory, EndpointId};
use crate::observability::metrics;
use crate::protocol::{parse_inbound, Inbound, Origin, Outbound, ProviderPath};
use crate::provider::ProviderScope;

pub use error::RelayError;
pub use state::{DiscoveryPhase, RelayStatus, SubscriptionStatus};

use state::RelayState;

/// An endpoint's registration: its id and the messages addressed to it.
#[derive(Debug)]
pub struct Attachment {
    pub id: EndpointId,
    pub messages: mpsc::Receiver<Outbound>,
}

/// Bridge between a provider scope and attached frames.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<Inner>,
}

struct Inner {
    settings: RelaySettings,
    scope: ProviderScope,
    endpoints: EndpointDirectory,
    state: Mutex<RelayState>,
    discovery_signal: watch::Sender<Option<DiscoveryPhase>>,
    discovery_task: Mutex<Option<JoinHandle<()>>>,
}

impl Relay {
    pub fn new(settings: RelaySettings, scope: ProviderScope) -> Self {
        let (discovery_signal, _) = watch::channel(None);
        let endpoints = EndpointDirectory::with_capacity(settings.endpoint_queue);
        Self {
            inner: Arc::new(Inner {
                settings,
                scope,
                endpoints,
                state: Mutex::new(RelayState::default()),
                discovery_signal,
                discovery_task: Mutex::new(None),
            }),
        }
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.inner.settings
    }

    pub fn scope(&self) -> &ProviderScope {
        &self.inner.scope
    }

    pub fn endpoints(&self) -> &EndpointDirectory {
        &self.inner.endpoints
    }

    /// Begin discovery. Must run inside a Tokio runtime; later calls are ignored.
    pub fn start(&self) {
        {
            let mut state = self.lock_state();
            if state.phase != DiscoveryPhase::Idle || state.stopped {
                tracing::warn!(phase = ?state.phase, "Relay already started");
                return;
            }
            state.phase = DiscoveryPhase::Running;
        }

        let signal = self.inner.discovery_signal.subscribe();
        let task = tokio::spawn(discovery::run(self.clone(), signal));
        *self
            .inner
            .discovery_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task);

        tracing::info!(target_origin = %self.inner.settings.target_origin, "Relay started");
    }

    /// Tear down discovery and forget every subscriber. Idempotent.
    ///
    /// Underlying provider subscriptions stay registered and become no-ops.
    pub fn stop(&self) {
        let cleared = {
            let mut state = self.lock_state();
            if state.stopped {
                return;
            }
            state.stopped = true;
            if matches!(state.phase, DiscoveryPhase::Idle | DiscoveryPhase::Running) {
                state.phase = DiscoveryPhase::Stopped;
            }
            state.listeners.clear_subscribers()
        };
        self.inner
            .discovery_signal
            .send_replace(Some(DiscoveryPhase::Stopped));

        tracing::info!(subscriptions_cleared = cleared, "Relay stopped");
    }

    /// Wait for the discovery task to exit (after timeout, completion or stop).
    pub async fn discovery_finished(&self) {
        let task = self
            .inner
            .discovery_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Discovery task failed");
            }
        }
    }

    /// Register an endpoint. Metadata already published is replayed to it
    /// when `replay_on_attach` is set and its origin is targeted.
    pub fn attach(&self, origin: Origin) -> Attachment {
        let state = self.lock_state();
        let (id, messages) = self.inner.endpoints.attach(origin.clone());

        let mut replayed = 0;
        if self.inner.settings.replay_on_attach
            && !state.stopped
            && self.inner.settings.target_origin.matches(&origin)
        {
            for message in &state.published {
                if self.inner.endpoints.send(id, message.clone()).is_ok() {
                    replayed += 1;
                }
            }
        }
        drop(state);

        metrics::set_attached_endpoints(self.inner.endpoints.len());
        tracing::info!(endpoint = %id, origin = %origin, replayed, "Endpoint attached");
        Attachment { id, messages }
    }

    /// Remove an endpoint and every subscription it held.
    ///
    /// Also clears subscriptions of an endpoint the directory already dropped
    /// for falling behind.
    pub fn detach(&self, id: EndpointId) {
        let removed = self.inner.endpoints.detach(id);
        let subscriptions = self.lock_state().listeners.remove_endpoint(id);
        metrics::set_attached_endpoints(self.inner.endpoints.len());
        if removed || subscriptions > 0 {
            tracing::info!(endpoint = %id, subscriptions, "Endpoint detached");
        }
    }

    /// Entry point for raw text frames.
    pub fn handle_text(&self, from: EndpointId, text: &str) {
        match serde_json::from_str::<Value>(text) {
            Ok(raw) => self.handle_message(from, &raw),
            Err(e) => {
                metrics::record_dropped("invalid_json");
                tracing::warn!(endpoint = %from, error = %e, "Dropping non-JSON message");
            }
        }
    }

    /// Entry point for decoded messages from an attached endpoint.
    pub fn handle_message(&self, from: EndpointId, raw: &Value) {
        if self.lock_state().stopped {
            tracing::debug!(endpoint = %from, "Relay stopped, message ignored");
            return;
        }

        let Some(origin) = self.inner.endpoints.origin(from) else {
            tracing::debug!(endpoint = %from, "Message from detached endpoint ignored");
            return;
        };
        if !self.inner.settings.target_origin.matches(&origin) {
            metrics::record_dropped("origin");
            tracing::debug!(endpoint = %from, origin = %origin, "Message from untrusted origin ignored");
            return;
        }

        match parse_inbound(raw) {
            Ok(Some(message)) => self.dispatch(from, message),
            Ok(None) => tracing::trace!(endpoint = %from, "Ignoring message not addressed to the relay"),
            Err(malformed) => {
                metrics::record_dropped("malformed");
                tracing::warn!(endpoint = %from, error = %malformed, "Malformed relay message");
                if let Some(request_id) = malformed.request_id.clone() {
                    self.respond(from, request_id, Err(RelayError::from(malformed)));
                }
            }
        }
    }

    /// Act on a parsed message.
    pub fn dispatch(&self, from: EndpointId, message: Inbound) {
        match message {
            Inbound::ProviderAcknowledgment { provider_name } => self.acknowledge(&provider_name),
            Inbound::CallMethod {
                provider_name,
                method_name,
                args,
                request_id,
            } => self.call_method(from, provider_name, method_name, args, request_id),
            Inbound::SubscribeEvent {
                provider_name,
                event_name,
            } => {
                if let Err(e) = self.subscribe(from, provider_name.clone(), event_name.clone()) {
                    tracing::warn!(
                        endpoint = %from,
                        provider = %provider_name,
                        event = %event_name,
                        error = %e,
                        "Event subscription rejected"
                    );
                }
            }
            Inbound::UnsubscribeEvent {
                provider_name,
                event_name,
            } => self.unsubscribe(from, provider_name, event_name),
        }
    }

    fn acknowledge(&self, path: &ProviderPath) {
        let known = self.inner.settings.providers.iter().any(|p| {
            p.name == path.root_name()
                && (path.child_name().is_none() || p.nested.as_deref() == path.child_name())
        });
        if !known {
            tracing::debug!(provider = %path, "Acknowledgment for unlisted provider ignored");
            return;
        }

        let complete = {
            let mut state = self.lock_state();
            state.acknowledged.insert(path.to_string());
            let complete =
                state.is_discovering() && state.all_acknowledged(&self.inner.settings.providers);
            if complete {
                state.phase = DiscoveryPhase::Complete;
            }
            complete
        };

        metrics::record_acknowledgment();
        tracing::info!(provider = %path, "Acknowledgment received");

        if complete {
            tracing::info!("All providers acknowledged, stopping discovery");
            self.inner
                .discovery_signal
                .send_replace(Some(DiscoveryPhase::Complete));
        }
    }

    pub fn status(&self) -> RelayStatus {
        let state = self.lock_state();
        RelayStatus {
            phase: state.phase,
            stopped: state.stopped,
            target_origin: self.inner.settings.target_origin.to_string(),
            detected: state.detected.iter().cloned().collect(),
            acknowledged: state.acknowledged.iter().cloned().collect(),
            subscriptions: state
                .listeners
                .entries()
                .map(|(key, subscribers)| SubscriptionStatus {
                    provider: key.provider.to_string(),
                    event: key.event.clone(),
                    subscribers,
                })
                .collect(),
            endpoints: self.inner.endpoints.len(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RelayState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ProviderEntry;
    use crate::provider::{Invocation, Provider, ProviderResult};
    use serde_json::json;

    struct Unisat;

    impl Provider for Unisat {
        fn methods(&self) -> Vec<String> {
            vec!["getAddress".into()]
        }

        fn invoke(&self, _method: &str, _args: Vec<Value>) -> ProviderResult<Invocation> {
            Ok(Invocation::Ready(json!("bc1qexample")))
        }
    }

    fn relay_with(providers: Vec<ProviderEntry>) -> Relay {
        let settings = RelaySettings {
            providers,
            ..RelaySettings::default()
        };
        Relay::new(settings, ProviderScope::new())
    }

    #[tokio::test]
    async fn test_ready_call_answers_inline() {
        let relay = relay_with(vec![ProviderEntry::new("unisat")]);
        relay.scope().install("unisat", Arc::new(Unisat));
        let mut frame = relay.attach(Origin::opaque());

        relay.handle_message(
            frame.id,
            &json!({"type": "CALL_METHOD", "providerName": "unisat", "methodName": "getAddress", "args": [], "requestId": "r1"}),
        );

        assert_eq!(
            frame.messages.try_recv().unwrap(),
            Outbound::success("r1".into(), json!("bc1qexample"))
        );
    }

    #[tokio::test]
    async fn test_acknowledgment_filtering() {
        let relay = relay_with(vec![ProviderEntry::with_nested("XverseProviders", "BitcoinProvider")]);
        let frame = relay.attach(Origin::opaque());

        for name in ["XverseProviders.BitcoinProvider", "XverseProviders.Other", "stranger"] {
            relay.handle_message(frame.id, &json!({"type": "PROVIDER_ACKNOWLEDGMENT", "providerName": name}));
        }
        assert_eq!(relay.status().acknowledged, vec!["XverseProviders.BitcoinProvider"]);
    }

    #[tokio::test]
    async fn test_untrusted_origin_ignored() {
        let mut settings = RelaySettings::default();
        settings.target_origin = crate::protocol::TargetOrigin::parse("https://app.example").unwrap();
        let relay = Relay::new(settings, ProviderScope::new());
        relay.scope().install("unisat", Arc::new(Unisat));

        let mut stranger = relay.attach(Origin::parse("https://evil.example").unwrap());
        relay.handle_message(
            stranger.id,
            &json!({"type": "CALL_METHOD", "providerName": "unisat", "methodName": "getAddress", "requestId": "r1"}),
        );
        assert!(stranger.messages.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent_and_blocks_start() {
        let relay = relay_with(vec![ProviderEntry::new("unisat")]);
        relay.stop();
        relay.stop();
        relay.start();
        assert_eq!(relay.status().phase, DiscoveryPhase::Stopped);
        assert!(relay.status().stopped);
    }
}
