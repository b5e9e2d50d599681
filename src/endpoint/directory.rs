//! Directory of attached endpoints.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::protocol::{Origin, Outbound, TargetOrigin};

/// Queue depth used by [`EndpointDirectory::new`].
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Ids only need to be unique for the life of the process.
static ENDPOINT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque handle of an attached endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(u64);

impl EndpointId {
    fn next() -> Self {
        Self(ENDPOINT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint-{}", self.0)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("{0} is not attached")]
    Detached(EndpointId),

    #[error("{0} stopped receiving")]
    Closed(EndpointId),

    #[error("{0} fell behind and was detached")]
    Overflow(EndpointId),
}

struct Endpoint {
    origin: Origin,
    tx: mpsc::Sender<Outbound>,
}

/// Attached endpoints keyed by id, each with a bounded outbound queue.
#[derive(Clone)]
pub struct EndpointDirectory {
    inner: Arc<DashMap<EndpointId, Endpoint>>,
    capacity: usize,
}

impl Default for EndpointDirectory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }
}

impl EndpointDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// `capacity` is clamped to at least one message.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Register an endpoint; messages for it arrive on the returned receiver.
    pub fn attach(&self, origin: Origin) -> (EndpointId, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = EndpointId::next();
        self.inner.insert(id, Endpoint { origin, tx });
        (id, rx)
    }

    pub fn detach(&self, id: EndpointId) -> bool {
        self.inner.remove(&id).is_some()
    }

    pub fn origin(&self, id: EndpointId) -> Option<Origin> {
        self.inner.get(&id).map(|e| e.origin.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Directed delivery to one endpoint.
    ///
    /// Never waits: an endpoint whose queue is full is detached, which closes
    /// its receiver once the queued messages are drained.
    pub fn send(&self, id: EndpointId, message: Outbound) -> Result<(), DeliveryError> {
        let sent = {
            let endpoint = self.inner.get(&id).ok_or(DeliveryError::Detached(id))?;
            endpoint.tx.try_send(message)
        };
        match sent {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(DeliveryError::Closed(id)),
            Err(TrySendError::Full(_)) => {
                self.inner.remove(&id);
                tracing::warn!(endpoint = %id, capacity = self.capacity, "Endpoint queue full, detaching");
                Err(DeliveryError::Overflow(id))
            }
        }
    }

    /// Deliver to every endpoint whose origin matches `target`.
    ///
    /// Returns the number of endpoints reached; failures are logged and skipped.
    pub fn broadcast(&self, target: &TargetOrigin, message: &Outbound) -> usize {
        let recipients: Vec<EndpointId> = self
            .inner
            .iter()
            .filter(|e| target.matches(&e.value().origin))
            .map(|e| *e.key())
            .collect();

        let mut delivered = 0;
        for id in recipients {
            match self.send(id, message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(endpoint = %id, kind = message.kind(), error = %e, "Broadcast delivery failed"),
            }
        }
        delivered
    }
}
