//! Capability adapter between the relay and host providers.
//!
//! # Responsibilities
//! - Enumerate the callable surface advertised to frames
//! - Refuse calls to members the provider does not declare
//! - Map provider failures onto relay error kinds
//! - Reach nested providers and the optional event capability

use std::sync::Arc;

use serde_json::Value;

use crate::protocol::ProviderPath;
use crate::provider::{EventCallback, Invocation, Provider};
use crate::relay::RelayError;

/// Member name advertised for providers with an event capability.
const EVENT_MEMBER: &str = "on";

/// A resolved provider together with the address it was resolved under.
#[derive(Clone)]
pub struct ProviderHandle {
    path: ProviderPath,
    inner: Arc<dyn Provider>,
}

impl ProviderHandle {
    pub fn new(path: ProviderPath, inner: Arc<dyn Provider>) -> Self {
        Self { path, inner }
    }

    pub fn path(&self) -> &ProviderPath {
        &self.path
    }

    /// Declared methods, plus `on` when the provider can emit events.
    pub fn method_names(&self) -> Vec<String> {
        let mut names = self.inner.methods();
        if self.supports_events() && !names.iter().any(|n| n == EVENT_MEMBER) {
            names.push(EVENT_MEMBER.to_string());
        }
        names
    }

    pub fn is_callable(&self, method: &str) -> bool {
        self.inner.methods().iter().any(|m| m == method)
    }

    pub fn call(&self, method: &str, args: Vec<Value>) -> Result<Invocation, RelayError> {
        if !self.is_callable(method) {
            return Err(RelayError::MethodNotFound {
                provider: self.path.clone(),
                method: method.to_string(),
            });
        }

        self.inner
            .invoke(method, args)
            .map_err(|e| RelayError::InvocationFailure(e.message().to_string()))
    }

    /// Nested provider `child`, addressed as `root.child`.
    pub fn nested(&self, child: &str) -> Option<ProviderHandle> {
        let nested = self.inner.nested(child)?;
        Some(ProviderHandle::new(
            ProviderPath::nested(self.path.root_name(), child),
            nested,
        ))
    }

    pub fn supports_events(&self) -> bool {
        self.inner.events().is_some()
    }

    /// Register one underlying listener for `event`.
    pub fn subscribe(&self, event: &str, callback: EventCallback) -> Result<(), RelayError> {
        let Some(source) = self.inner.events() else {
            return Err(RelayError::MethodNotFound {
                provider: self.path.clone(),
                method: EVENT_MEMBER.to_string(),
            });
        };

        source
            .on(event, callback)
            .map_err(|e| RelayError::InvocationFailure(e.message().to_string()))
    }
}

impl std::fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("path", &self.path)
            .field("methods", &self.inner.methods())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{EventSource, ProviderError, ProviderResult};
    use serde_json::json;
    use std::sync::Mutex;

    struct Plain;

    impl Provider for Plain {
        fn methods(&self) -> Vec<String> {
            vec!["connect".into(), "explode".into()]
        }

        fn invoke(&self, method: &str, _args: Vec<Value>) -> ProviderResult<Invocation> {
            match method {
                "connect" => Ok(Invocation::Ready(json!(true))),
                _ => Err(ProviderError::new("boom")),
            }
        }
    }

    #[derive(Default)]
    struct Eventful {
        registered: Mutex<Vec<String>>,
    }

    impl EventSource for Eventful {
        fn on(&self, event: &str, _callback: EventCallback) -> ProviderResult<()> {
            self.registered.lock().unwrap().push(event.to_string());
            Ok(())
        }
    }

    impl Provider for Eventful {
        fn methods(&self) -> Vec<String> {
            vec!["getAddress".into()]
        }

        fn invoke(&self, _method: &str, _args: Vec<Value>) -> ProviderResult<Invocation> {
            Ok(Invocation::Ready(json!("bc1q")))
        }

        fn events(&self) -> Option<&dyn EventSource> {
            Some(self)
        }
    }

    #[test]
    fn test_method_names_include_on_for_event_sources() {
        let plain = ProviderHandle::new(ProviderPath::root("plain"), Arc::new(Plain));
        assert_eq!(plain.method_names(), vec!["connect", "explode"]);

        let eventful = ProviderHandle::new(ProviderPath::root("unisat"), Arc::new(Eventful::default()));
        assert_eq!(eventful.method_names(), vec!["getAddress", "on"]);
    }

    #[test]
    fn test_call_error_mapping() {
        let handle = ProviderHandle::new(ProviderPath::root("plain"), Arc::new(Plain));

        assert!(matches!(handle.call("connect", vec![]), Ok(Invocation::Ready(v)) if v == json!(true)));
        assert_eq!(
            handle.call("explode", vec![]).unwrap_err(),
            RelayError::InvocationFailure("boom".into())
        );
        assert!(matches!(
            handle.call("missing", vec![]),
            Err(RelayError::MethodNotFound { .. })
        ));
        // `on` is advertised for event sources but never callable remotely.
        let eventful = ProviderHandle::new(ProviderPath::root("unisat"), Arc::new(Eventful::default()));
        assert!(matches!(eventful.call("on", vec![]), Err(RelayError::MethodNotFound { .. })));
    }

    #[test]
    fn test_subscribe_requires_event_capability() {
        let plain = ProviderHandle::new(ProviderPath::root("plain"), Arc::new(Plain));
        let callback: EventCallback = Arc::new(|_: Value| {});
        assert!(plain.subscribe("accountsChanged", callback.clone()).is_err());

        let provider = Arc::new(Eventful::default());
        let handle = ProviderHandle::new(ProviderPath::root("unisat"), provider.clone());
        handle.subscribe("accountsChanged", callback).unwrap();
        assert_eq!(*provider.registered.lock().unwrap(), vec!["accountsChanged"]);
    }
}
