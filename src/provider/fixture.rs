//! Config-defined providers.
//!
//! A fixture answers each declared method with a canned result or failure and
//! can emit its declared events on demand (see the `/fixtures` HTTP route).
//! Methods without a delay settle synchronously; with a delay they settle as a
//! deferred value, so both provider shapes can be exercised from a browser.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::config::schema::{FixtureConfig, FixtureMethodConfig};
use crate::provider::{
    EventCallback, EventSource, Invocation, Provider, ProviderError, ProviderResult, ProviderScope,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FixtureError {
    #[error("fixture '{0}' not found")]
    UnknownFixture(String),

    #[error("fixture '{fixture}' does not declare event '{event}'")]
    UndeclaredEvent { fixture: String, event: String },
}

pub struct FixtureProvider {
    name: String,
    methods: Vec<FixtureMethodConfig>,
    events: Vec<String>,
    listeners: Mutex<HashMap<String, Vec<EventCallback>>>,
    nested: Option<(String, Arc<FixtureProvider>)>,
}

impl FixtureProvider {
    pub fn from_config(config: &FixtureConfig) -> Self {
        let nested = config
            .nested
            .as_ref()
            .map(|child| (child.name.clone(), Arc::new(Self::from_config(child))));

        Self {
            name: config.name.clone(),
            methods: config.methods.clone(),
            events: config.events.clone(),
            listeners: Mutex::new(HashMap::new()),
            nested,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declares_event(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == event)
    }

    /// Fire `event` to every registered callback. Returns how many ran.
    pub fn emit(&self, event: &str, data: Value) -> Result<usize, FixtureError> {
        if !self.declares_event(event) {
            return Err(FixtureError::UndeclaredEvent {
                fixture: self.name.clone(),
                event: event.to_string(),
            });
        }

        // Run callbacks outside the lock; they may subscribe again.
        let callbacks: Vec<EventCallback> = {
            let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
            listeners.get(event).cloned().unwrap_or_default()
        };
        for callback in &callbacks {
            callback(data.clone());
        }

        tracing::debug!(fixture = %self.name, event, listeners = callbacks.len(), "Fixture event emitted");
        Ok(callbacks.len())
    }

    /// Number of callbacks registered through `on` for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        let listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.get(event).map(Vec::len).unwrap_or(0)
    }

    fn nested_fixture(&self) -> Option<&(String, Arc<FixtureProvider>)> {
        self.nested.as_ref()
    }
}

impl Provider for FixtureProvider {
    fn methods(&self) -> Vec<String> {
        self.methods.iter().map(|m| m.name.clone()).collect()
    }

    fn invoke(&self, method: &str, _args: Vec<Value>) -> ProviderResult<Invocation> {
        let Some(spec) = self.methods.iter().find(|m| m.name == method) else {
            return Err(ProviderError::new(format!("{} is not a function", method)));
        };

        let outcome = match &spec.error {
            Some(message) => Err(ProviderError::new(message.clone())),
            None => Ok(spec.result.clone().unwrap_or(Value::Null)),
        };

        match spec.delay_ms {
            Some(delay) => Ok(Invocation::deferred(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                outcome
            })),
            None => outcome.map(Invocation::Ready),
        }
    }

    fn events(&self) -> Option<&dyn EventSource> {
        if self.events.is_empty() {
            None
        } else {
            Some(self)
        }
    }

    fn nested(&self, name: &str) -> Option<Arc<dyn Provider>> {
        match &self.nested {
            Some((child, provider)) if child == name => Some(provider.clone() as Arc<dyn Provider>),
            _ => None,
        }
    }
}

impl EventSource for FixtureProvider {
    fn on(&self, event: &str, callback: EventCallback) -> ProviderResult<()> {
        if !self.declares_event(event) {
            return Err(ProviderError::new(format!("unsupported event: {}", event)));
        }
        let mut listeners = self.listeners.lock().unwrap_or_else(|e| e.into_inner());
        listeners.entry(event.to_string()).or_default().push(callback);
        Ok(())
    }
}

/// All fixtures of a config, addressable by scope name or `parent.child`.
#[derive(Default)]
pub struct FixtureSet {
    fixtures: HashMap<String, Arc<FixtureProvider>>,
    roots: Vec<String>,
}

impl FixtureSet {
    pub fn from_configs(configs: &[FixtureConfig]) -> Self {
        let mut set = Self::default();
        for config in configs {
            let fixture = Arc::new(FixtureProvider::from_config(config));
            if let Some((child, nested)) = fixture.nested_fixture() {
                set.fixtures
                    .insert(format!("{}.{}", config.name, child), nested.clone());
            }
            set.roots.push(config.name.clone());
            set.fixtures.insert(config.name.clone(), fixture);
        }
        set
    }

    /// Put every top-level fixture on `scope`.
    pub fn install(&self, scope: &ProviderScope) {
        for name in &self.roots {
            if let Some(fixture) = self.fixtures.get(name) {
                scope.install(name.clone(), fixture.clone() as Arc<dyn Provider>);
                tracing::info!(fixture = %name, methods = ?fixture.methods(), "Fixture provider installed");
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<FixtureProvider>> {
        self.fixtures.get(name).cloned()
    }

    pub fn emit(&self, name: &str, event: &str, data: Value) -> Result<usize, FixtureError> {
        self.get(name)
            .ok_or_else(|| FixtureError::UnknownFixture(name.to_string()))?
            .emit(event, data)
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}
