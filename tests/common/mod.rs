//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::Receiver;

use provider_relay::config::{ProviderEntry, RelaySettings};
use provider_relay::protocol::{Origin, Outbound, TargetOrigin};
use provider_relay::provider::{
    EventCallback, EventSource, Invocation, Provider, ProviderError, ProviderResult,
};

/// How a scripted method answers.
#[derive(Clone)]
pub enum Reply {
    Ready(Value),
    Throw(String),
    Resolve(Duration, Value),
    Reject(Duration, String),
    Panic,
}

/// Provider whose methods, events and nested child are set up by the test.
#[derive(Default)]
pub struct ScriptedProvider {
    methods: Vec<(String, Reply)>,
    events: Option<Vec<String>>,
    listeners: Mutex<HashMap<String, Vec<EventCallback>>>,
    registrations: Mutex<HashMap<String, usize>>,
    nested: Option<(String, Arc<ScriptedProvider>)>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, name: &str, reply: Reply) -> Self {
        self.methods.push((name.to_string(), reply));
        self
    }

    /// Give the provider an event capability accepting `events`.
    pub fn events(mut self, events: &[&str]) -> Self {
        self.events = Some(events.iter().map(|e| e.to_string()).collect());
        self
    }

    pub fn nested(mut self, name: &str, child: ScriptedProvider) -> Self {
        self.nested = Some((name.to_string(), Arc::new(child)));
        self
    }

    pub fn nested_child(&self) -> Option<Arc<ScriptedProvider>> {
        self.nested.as_ref().map(|(_, child)| child.clone())
    }

    /// Fire `event` at every registered callback. Returns how many ran.
    pub fn emit(&self, event: &str, data: Value) -> usize {
        let callbacks = self
            .listeners
            .lock()
            .unwrap()
            .get(event)
            .cloned()
            .unwrap_or_default();
        for callback in &callbacks {
            callback(data.clone());
        }
        callbacks.len()
    }

    /// How many times `on(event, ..)` was called on this provider.
    pub fn registrations(&self, event: &str) -> usize {
        self.registrations.lock().unwrap().get(event).copied().unwrap_or(0)
    }
}

impl Provider for ScriptedProvider {
    fn methods(&self) -> Vec<String> {
        self.methods.iter().map(|(name, _)| name.clone()).collect()
    }

    fn invoke(&self, method: &str, _args: Vec<Value>) -> ProviderResult<Invocation> {
        let reply = self
            .methods
            .iter()
            .find(|(name, _)| name == method)
            .map(|(_, reply)| reply.clone())
            .ok_or_else(|| ProviderError::new(format!("{} is not a function", method)))?;

        match reply {
            Reply::Ready(value) => Ok(Invocation::Ready(value)),
            Reply::Throw(message) => Err(ProviderError::new(message)),
            Reply::Resolve(delay, value) => Ok(Invocation::deferred(async move {
                tokio::time::sleep(delay).await;
                Ok(value)
            })),
            Reply::Reject(delay, message) => Ok(Invocation::deferred(async move {
                tokio::time::sleep(delay).await;
                Err(ProviderError::new(message))
            })),
            Reply::Panic => Ok(Invocation::deferred(explode())),
        }
    }

    fn events(&self) -> Option<&dyn EventSource> {
        self.events.as_ref().map(|_| self as &dyn EventSource)
    }

    fn nested(&self, name: &str) -> Option<Arc<dyn Provider>> {
        match &self.nested {
            Some((child, provider)) if child == name => Some(provider.clone() as Arc<dyn Provider>),
            _ => None,
        }
    }
}

async fn explode() -> ProviderResult<Value> {
    panic!("provider blew up")
}

impl EventSource for ScriptedProvider {
    fn on(&self, event: &str, callback: EventCallback) -> ProviderResult<()> {
        let declared = self.events.as_ref().is_some_and(|events| events.iter().any(|e| e == event));
        if !declared {
            return Err(ProviderError::new(format!("unknown event {}", event)));
        }
        *self.registrations.lock().unwrap().entry(event.to_string()).or_insert(0) += 1;
        self.listeners
            .lock()
            .unwrap()
            .entry(event.to_string())
            .or_default()
            .push(callback);
        Ok(())
    }
}

/// Relay settings with a short poll and the given allow-list.
pub fn settings(providers: Vec<ProviderEntry>) -> RelaySettings {
    RelaySettings {
        target_origin: TargetOrigin::Any,
        poll_interval_ms: 100,
        discovery_timeout_secs: 5,
        replay_on_attach: true,
        endpoint_queue: 64,
        providers,
    }
}

pub fn origin(url: &str) -> Origin {
    Origin::parse(url).unwrap()
}

/// Next message for an endpoint, failing the test if none arrives in a minute.
pub async fn next(messages: &mut Receiver<Outbound>) -> Outbound {
    tokio::time::timeout(Duration::from_secs(60), messages.recv())
        .await
        .expect("timed out waiting for a relay message")
        .expect("endpoint channel closed")
}

/// Assert nothing arrives for `wait`.
pub async fn assert_silent(messages: &mut Receiver<Outbound>, wait: Duration) {
    if let Ok(Some(message)) = tokio::time::timeout(wait, messages.recv()).await {
        panic!("unexpected relay message: {:?}", message);
    }
}

/// Everything already queued for an endpoint.
pub fn drain(messages: &mut Receiver<Outbound>) -> Vec<Outbound> {
    let mut out = Vec::new();
    while let Ok(message) = messages.try_recv() {
        out.push(message);
    }
    out
}

/// Provider names from the metadata messages in `messages`, in order.
pub fn metadata_names(messages: &[Outbound]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|m| match m {
            Outbound::ProviderMetadata { provider_name, .. } => Some(provider_name.to_string()),
            _ => None,
        })
        .collect()
}
