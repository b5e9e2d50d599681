//! The host scope providers are installed into.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Notify;

use crate::protocol::ProviderPath;
use crate::provider::{Provider, ProviderHandle};

/// Name → provider table shared between the host and the relay.
///
/// Installing or removing a provider wakes the discovery loop, the same way a
/// page mutation would.
#[derive(Clone, Default)]
pub struct ProviderScope {
    inner: Arc<DashMap<String, Arc<dyn Provider>>>,
    changed: Arc<Notify>,
}

impl ProviderScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `provider` under `name`, returning whatever was there before.
    pub fn install(&self, name: impl Into<String>, provider: Arc<dyn Provider>) -> Option<Arc<dyn Provider>> {
        let name = name.into();
        tracing::debug!(provider = %name, "Provider installed on scope");
        let previous = self.inner.insert(name, provider);
        self.changed.notify_one();
        previous
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn Provider>> {
        let removed = self.inner.remove(name).map(|(_, p)| p);
        if removed.is_some() {
            self.changed.notify_one();
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.inner.get(name).map(|r| r.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// Resolve a possibly nested address to a handle.
    pub fn resolve(&self, path: &ProviderPath) -> Option<ProviderHandle> {
        let root = ProviderHandle::new(ProviderPath::root(path.root_name()), self.get(path.root_name())?);
        match path.child_name() {
            Some(child) => root.nested(child),
            None => Some(root),
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// Completes after the next install/remove (a stored permit counts).
    pub async fn changed(&self) {
        self.changed.notified().await;
    }
}
