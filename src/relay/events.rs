//! Event subscription registry and fan-out.
//!
//! One underlying provider subscription exists per (provider, event) for the
//! life of the relay. Frames only join or leave the fan-out set; the provider
//! callback looks the set up at delivery time, so an emptied set makes the
//! callback a no-op instead of requiring an unsubscribe on the provider.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use serde_json::Value;

use crate::endpoint::{DeliveryError, EndpointId};
use crate::observability::metrics;
use crate::protocol::{Outbound, ProviderPath};
use crate::provider::EventCallback;
use crate::relay::{Relay, RelayError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct EventKey {
    pub provider: ProviderPath,
    pub event: String,
}

impl EventKey {
    pub fn new(provider: ProviderPath, event: impl Into<String>) -> Self {
        Self {
            provider,
            event: event.into(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ListenerRegistry {
    subscribers: BTreeMap<EventKey, BTreeSet<EndpointId>>,
    /// Pairs with a live underlying provider subscription.
    wired: HashSet<EventKey>,
}

impl ListenerRegistry {
    /// Returns false if the endpoint was already subscribed.
    pub fn add(&mut self, key: EventKey, endpoint: EndpointId) -> bool {
        self.subscribers.entry(key).or_default().insert(endpoint)
    }

    /// Removes the entry once its last subscriber leaves.
    pub fn remove(&mut self, key: &EventKey, endpoint: EndpointId) -> bool {
        let Some(set) = self.subscribers.get_mut(key) else {
            return false;
        };
        let removed = set.remove(&endpoint);
        if set.is_empty() {
            self.subscribers.remove(key);
        }
        removed
    }

    /// Drop `endpoint` from every set. Returns how many sets it left.
    pub fn remove_endpoint(&mut self, endpoint: EndpointId) -> usize {
        let mut left = 0;
        self.subscribers.retain(|_, set| {
            if set.remove(&endpoint) {
                left += 1;
            }
            !set.is_empty()
        });
        left
    }

    pub fn snapshot(&self, key: &EventKey) -> Vec<EndpointId> {
        self.subscribers
            .get(key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &EventKey) -> bool {
        self.subscribers.contains_key(key)
    }

    /// True when this call claimed the wiring for `key`.
    pub fn mark_wired(&mut self, key: &EventKey) -> bool {
        self.wired.insert(key.clone())
    }

    /// Wiring for `key` failed: release the claim and drop every subscriber
    /// that joined meanwhile. Returns how many were dropped.
    pub fn abandon(&mut self, key: &EventKey) -> usize {
        self.wired.remove(key);
        self.subscribers.remove(key).map(|set| set.len()).unwrap_or(0)
    }

    pub fn is_wired(&self, key: &EventKey) -> bool {
        self.wired.contains(key)
    }

    /// Forget all subscribers; wiring stays since providers keep their callbacks.
    pub fn clear_subscribers(&mut self) -> usize {
        let cleared = self.subscribers.len();
        self.subscribers.clear();
        cleared
    }

    pub fn entries(&self) -> impl Iterator<Item = (&EventKey, usize)> {
        self.subscribers.iter().map(|(k, set)| (k, set.len()))
    }
}

impl Relay {
    pub(crate) fn subscribe(
        &self,
        from: EndpointId,
        provider_name: ProviderPath,
        event_name: String,
    ) -> Result<(), RelayError> {
        let handle = self
            .inner
            .scope
            .resolve(&provider_name)
            .ok_or_else(|| RelayError::ProviderAbsent(provider_name.clone()))?;
        if !handle.supports_events() {
            return Err(RelayError::MethodNotFound {
                provider: provider_name,
                method: "on".to_string(),
            });
        }

        let key = EventKey::new(provider_name, event_name);
        let needs_wiring = {
            let mut state = self.lock_state();
            if state.stopped {
                return Ok(());
            }
            state.listeners.add(key.clone(), from);
            state.listeners.mark_wired(&key)
        };

        if needs_wiring {
            // Outside the lock: providers may fire synchronously from `on`.
            if let Err(e) = handle.subscribe(&key.event, self.event_callback(key.clone())) {
                let dropped = self.lock_state().listeners.abandon(&key);
                tracing::debug!(provider = %key.provider, event = %key.event, dropped, "Provider event wiring failed");
                return Err(e);
            }
            tracing::info!(provider = %key.provider, event = %key.event, "Provider event subscription registered");
        }

        tracing::debug!(endpoint = %from, provider = %key.provider, event = %key.event, "Endpoint subscribed");
        Ok(())
    }

    pub(crate) fn unsubscribe(&self, from: EndpointId, provider_name: ProviderPath, event_name: String) {
        let key = EventKey::new(provider_name, event_name);
        let removed = self.lock_state().listeners.remove(&key, from);
        if removed {
            tracing::debug!(endpoint = %from, provider = %key.provider, event = %key.event, "Endpoint unsubscribed");
        } else {
            tracing::debug!(endpoint = %from, provider = %key.provider, event = %key.event, "Unsubscribe for unknown subscription ignored");
        }
    }

    fn event_callback(&self, key: EventKey) -> EventCallback {
        let relay = Arc::downgrade(&self.inner);
        Arc::new(move |data: Value| {
            if let Some(inner) = relay.upgrade() {
                Relay { inner }.fan_out(&key, data);
            }
        })
    }

    /// Deliver one occurrence to a snapshot of the subscriber set.
    pub(crate) fn fan_out(&self, key: &EventKey, data: Value) -> usize {
        let recipients = self.lock_state().listeners.snapshot(key);
        if recipients.is_empty() {
            tracing::trace!(provider = %key.provider, event = %key.event, "Event with no subscribers dropped");
            return 0;
        }

        let message = Outbound::event(key.provider.clone(), key.event.clone(), data);
        let mut delivered = 0;
        for id in recipients {
            match self.inner.endpoints.send(id, message.clone()) {
                Ok(()) => {
                    delivered += 1;
                    metrics::record_event_delivered(&key.provider.to_string(), &key.event);
                }
                Err(e) => {
                    tracing::warn!(endpoint = %id, provider = %key.provider, event = %key.event, error = %e, "Event delivery failed");
                    if matches!(e, DeliveryError::Overflow(_)) {
                        self.detach(id);
                    }
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    use crate::config::schema::RelaySettings;
    use crate::endpoint::EndpointDirectory;
    use crate::protocol::Origin;
    use crate::provider::{
        EventSource, Invocation, Provider, ProviderError, ProviderResult, ProviderScope,
    };

    /// Refuses every listener, letting a second frame subscribe mid-registration.
    #[derive(Default)]
    struct RefusingProvider {
        peer: OnceLock<(Relay, EndpointId)>,
    }

    impl Provider for RefusingProvider {
        fn methods(&self) -> Vec<String> {
            vec![]
        }

        fn invoke(&self, _method: &str, _args: Vec<Value>) -> ProviderResult<Invocation> {
            Ok(Invocation::Ready(Value::Null))
        }

        fn events(&self) -> Option<&dyn EventSource> {
            Some(self)
        }
    }

    impl EventSource for RefusingProvider {
        fn on(&self, event: &str, _callback: EventCallback) -> ProviderResult<()> {
            if let Some((relay, peer)) = self.peer.get() {
                relay
                    .subscribe(*peer, ProviderPath::root("okxwallet"), event.to_string())
                    .unwrap();
            }
            Err(ProviderError::new("listener registration refused"))
        }
    }

    fn ids(n: usize) -> Vec<EndpointId> {
        let directory = EndpointDirectory::new();
        (0..n).map(|_| directory.attach(Origin::opaque()).0).collect()
    }

    #[test]
    fn test_add_remove_prunes_empty_entries() {
        let mut registry = ListenerRegistry::default();
        let key = EventKey::new(ProviderPath::root("unisat"), "accountsChanged");
        let e = ids(2);

        assert!(registry.add(key.clone(), e[0]));
        assert!(!registry.add(key.clone(), e[0]));
        assert!(registry.add(key.clone(), e[1]));
        assert_eq!(registry.snapshot(&key), vec![e[0], e[1]]);

        assert!(registry.remove(&key, e[0]));
        assert!(registry.contains(&key));
        assert!(registry.remove(&key, e[1]));
        assert!(!registry.contains(&key));
        assert!(!registry.remove(&key, e[1]));
    }

    #[test]
    fn test_remove_endpoint_everywhere() {
        let mut registry = ListenerRegistry::default();
        let a = EventKey::new(ProviderPath::root("unisat"), "accountsChanged");
        let b = EventKey::new(ProviderPath::root("unisat"), "networkChanged");
        let e = ids(2);

        registry.add(a.clone(), e[0]);
        registry.add(b.clone(), e[0]);
        registry.add(b.clone(), e[1]);

        assert_eq!(registry.remove_endpoint(e[0]), 2);
        assert!(!registry.contains(&a));
        assert_eq!(registry.snapshot(&b), vec![e[1]]);
    }

    #[test]
    fn test_abandon_drops_everyone() {
        let mut registry = ListenerRegistry::default();
        let key = EventKey::new(ProviderPath::root("unisat"), "accountsChanged");
        let e = ids(2);

        assert!(registry.mark_wired(&key));
        registry.add(key.clone(), e[0]);
        registry.add(key.clone(), e[1]);

        assert_eq!(registry.abandon(&key), 2);
        assert!(!registry.contains(&key));
        assert!(!registry.is_wired(&key));
        assert_eq!(registry.abandon(&key), 0);
    }

    #[test]
    fn test_failed_wiring_drops_subscribers_that_joined_meanwhile() {
        let provider = Arc::new(RefusingProvider::default());
        let scope = ProviderScope::new();
        scope.install("okxwallet", provider.clone());
        let relay = Relay::new(RelaySettings::default(), scope);
        let first = relay.attach(Origin::opaque());
        let second = relay.attach(Origin::opaque());
        assert!(provider.peer.set((relay.clone(), second.id)).is_ok());

        let result = relay.subscribe(first.id, ProviderPath::root("okxwallet"), "accountsChanged".into());
        assert!(matches!(result, Err(RelayError::InvocationFailure(_))));

        let key = EventKey::new(ProviderPath::root("okxwallet"), "accountsChanged");
        let state = relay.lock_state();
        assert!(state.listeners.snapshot(&key).is_empty());
        assert!(!state.listeners.is_wired(&key));
    }

    #[test]
    fn test_wiring_survives_clear() {
        let mut registry = ListenerRegistry::default();
        let key = EventKey::new(ProviderPath::root("phantom"), "connect");
        assert!(registry.mark_wired(&key));
        assert!(!registry.mark_wired(&key));

        registry.add(key.clone(), ids(1)[0]);
        assert_eq!(registry.clear_subscribers(), 1);
        assert!(registry.is_wired(&key));
        assert_eq!(registry.entries().count(), 0);
    }
}
