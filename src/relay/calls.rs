//! CALL_METHOD servicing.
//!
//! Every request that carries a usable `requestId` gets exactly one
//! METHOD_RESPONSE on the endpoint it came from, whatever happens to the call.

use serde_json::Value;

use crate::endpoint::{DeliveryError, EndpointId};
use crate::observability::metrics;
use crate::protocol::{Outbound, ProviderPath, RequestId};
use crate::provider::Invocation;
use crate::relay::{Relay, RelayError};

impl Relay {
    pub(crate) fn call_method(
        &self,
        from: EndpointId,
        provider_name: ProviderPath,
        method_name: String,
        args: Vec<Value>,
        request_id: RequestId,
    ) {
        tracing::debug!(
            endpoint = %from,
            provider = %provider_name,
            method = %method_name,
            request_id = %request_id,
            args = args.len(),
            "Method call received"
        );

        let invocation = self
            .inner
            .scope
            .resolve(&provider_name)
            .ok_or_else(|| RelayError::ProviderAbsent(provider_name.clone()))
            .and_then(|handle| handle.call(&method_name, args));

        match invocation {
            Err(e) => self.respond(from, request_id, Err(e)),
            Ok(Invocation::Ready(value)) => self.respond(from, request_id, Ok(value)),
            Ok(Invocation::Deferred(future)) => {
                let relay = self.clone();
                tokio::spawn(async move {
                    // Run the provider future in its own task so a panic still answers.
                    let outcome = match tokio::spawn(future).await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(e)) => Err(RelayError::InvocationFailure(e.message().to_string())),
                        Err(join) => Err(RelayError::InvocationFailure(format!(
                            "{} aborted: {}",
                            method_name, join
                        ))),
                    };
                    relay.respond(from, request_id, outcome);
                });
            }
        }
    }

    pub(crate) fn respond(&self, to: EndpointId, request_id: RequestId, outcome: Result<Value, RelayError>) {
        let message = match outcome {
            Ok(value) => {
                metrics::record_call("ok");
                Outbound::success(request_id.clone(), value)
            }
            Err(e) => {
                metrics::record_call(e.kind());
                tracing::debug!(endpoint = %to, request_id = %request_id, error = %e, "Method call failed");
                Outbound::failure(request_id.clone(), e.to_string())
            }
        };

        if let Err(e) = self.inner.endpoints.send(to, message) {
            tracing::warn!(endpoint = %to, request_id = %request_id, error = %e, "Method response undeliverable");
            if matches!(e, DeliveryError::Overflow(_)) {
                self.detach(to);
            }
        }
    }
}
