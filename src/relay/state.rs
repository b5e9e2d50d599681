//! Mutable relay state and its status snapshot.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::config::schema::ProviderEntry;
use crate::protocol::Outbound;
use crate::relay::events::ListenerRegistry;

/// Where the discovery loop is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryPhase {
    /// `start()` not called yet.
    #[default]
    Idle,
    Running,
    /// Every allow-listed provider acknowledged.
    Complete,
    /// Discovery window elapsed.
    TimedOut,
    /// Relay stopped before discovery finished.
    Stopped,
}

/// Everything the relay mutates, behind one lock.
#[derive(Debug, Default)]
pub(crate) struct RelayState {
    /// Qualified names (`parent` and `parent.child` tracked separately).
    pub detected: BTreeSet<String>,
    pub acknowledged: BTreeSet<String>,
    /// Metadata messages already broadcast, replayed to late endpoints.
    pub published: Vec<Outbound>,
    pub listeners: ListenerRegistry,
    pub phase: DiscoveryPhase,
    pub stopped: bool,
}

impl RelayState {
    pub fn is_discovering(&self) -> bool {
        !self.stopped && self.phase == DiscoveryPhase::Running
    }

    /// Published or acknowledged; either way discovery is done with `name`.
    pub fn is_settled(&self, name: &str) -> bool {
        self.detected.contains(name) || self.acknowledged.contains(name)
    }

    /// Whether the parent, or its configured nested provider, still needs publishing.
    pub fn is_pending(&self, entry: &ProviderEntry) -> bool {
        !self.is_settled(&entry.name)
            || entry
                .nested_name()
                .is_some_and(|nested| !self.is_settled(&nested))
    }

    /// Vacuously true for an empty allow-list.
    pub fn all_acknowledged(&self, providers: &[ProviderEntry]) -> bool {
        providers.iter().all(|p| self.acknowledged.contains(&p.name))
    }
}

/// Point-in-time view of a relay, served on `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct RelayStatus {
    pub phase: DiscoveryPhase,
    pub stopped: bool,
    pub target_origin: String,
    pub detected: Vec<String>,
    pub acknowledged: Vec<String>,
    pub subscriptions: Vec<SubscriptionStatus>,
    pub endpoints: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionStatus {
    pub provider: String,
    pub event: String,
    pub subscribers: usize,
}
