//! Relay message kinds and inbound parsing.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::protocol::names::ProviderPath;

/// Caller-chosen correlation token, echoed back verbatim (string or number).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Value);

impl RequestId {
    /// Any string (including `""`) or number is a token.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(_) | Value::Number(_) => Some(Self(value.clone())),
            _ => None,
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<&str> for RequestId {
    fn from(token: &str) -> Self {
        Self(Value::String(token.to_string()))
    }
}

impl From<String> for RequestId {
    fn from(token: String) -> Self {
        Self(Value::String(token))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other),
        }
    }
}

/// Messages a frame sends to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Inbound {
    #[serde(rename_all = "camelCase")]
    ProviderAcknowledgment { provider_name: ProviderPath },

    #[serde(rename_all = "camelCase")]
    CallMethod {
        provider_name: ProviderPath,
        method_name: String,
        #[serde(default)]
        args: Vec<Value>,
        request_id: RequestId,
    },

    #[serde(rename_all = "camelCase")]
    SubscribeEvent {
        provider_name: ProviderPath,
        event_name: String,
    },

    #[serde(rename_all = "camelCase")]
    UnsubscribeEvent {
        provider_name: ProviderPath,
        event_name: String,
    },
}

/// Messages the relay sends to frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outbound {
    #[serde(rename_all = "camelCase")]
    ProviderMetadata {
        provider_name: ProviderPath,
        methods: Vec<String>,
    },

    /// Exactly one of `result` / `error` is present; use [`Outbound::success`]
    /// and [`Outbound::failure`] to build it.
    #[serde(rename_all = "camelCase")]
    MethodResponse {
        request_id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    EventTrigger {
        provider_name: ProviderPath,
        event_name: String,
        #[serde(default)]
        data: Value,
    },
}

impl Outbound {
    pub fn metadata(provider_name: ProviderPath, methods: Vec<String>) -> Self {
        Self::ProviderMetadata {
            provider_name,
            methods,
        }
    }

    /// A `null` result is still sent as `"result": null`.
    pub fn success(request_id: RequestId, result: Value) -> Self {
        Self::MethodResponse {
            request_id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(request_id: RequestId, error: impl Into<String>) -> Self {
        Self::MethodResponse {
            request_id,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn event(provider_name: ProviderPath, event_name: impl Into<String>, data: Value) -> Self {
        Self::EventTrigger {
            provider_name,
            event_name: event_name.into(),
            data,
        }
    }

    /// Wire name of the message kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProviderMetadata { .. } => "PROVIDER_METADATA",
            Self::MethodResponse { .. } => "METHOD_RESPONSE",
            Self::EventTrigger { .. } => "EVENT_TRIGGER",
        }
    }
}

/// An inbound relay message that is missing or mistyping required fields.
///
/// `request_id` is kept whenever the sender supplied a usable one, so a
/// CALL_METHOD can still be answered.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("malformed {kind} message: {reason}")]
pub struct MalformedMessage {
    pub kind: String,
    pub reason: String,
    pub request_id: Option<RequestId>,
}

/// Parse an inbound message.
///
/// Returns `Ok(None)` for traffic that is not addressed to the relay (non-objects,
/// no `type`, unknown `type`); the channel is shared with unrelated senders.
pub fn parse_inbound(raw: &Value) -> Result<Option<Inbound>, MalformedMessage> {
    let Some(obj) = raw.as_object() else {
        return Ok(None);
    };
    let Some(kind) = obj.get("type").and_then(Value::as_str) else {
        return Ok(None);
    };

    let request_id = match kind {
        "CALL_METHOD" => obj.get("requestId").and_then(RequestId::from_value),
        _ => None,
    };
    let malformed = |reason: String| MalformedMessage {
        kind: kind.to_string(),
        reason,
        request_id: request_id.clone(),
    };

    let message = match kind {
        "PROVIDER_ACKNOWLEDGMENT" => Inbound::ProviderAcknowledgment {
            provider_name: provider_field(obj).map_err(malformed)?,
        },
        "CALL_METHOD" => {
            let provider_name = provider_field(obj).map_err(malformed)?;
            let method_name = required_str(obj, "methodName").map_err(malformed)?;
            let args = match obj.get("args") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(items)) => items.clone(),
                Some(_) => return Err(malformed("args must be an array".to_string())),
            };
            let Some(request_id) = request_id.clone() else {
                return Err(malformed("missing or invalid requestId".to_string()));
            };
            Inbound::CallMethod {
                provider_name,
                method_name: method_name.to_string(),
                args,
                request_id,
            }
        }
        "SUBSCRIBE_EVENT" | "UNSUBSCRIBE_EVENT" => {
            let provider_name = provider_field(obj).map_err(malformed)?;
            let event_name = required_str(obj, "eventName").map_err(malformed)?.to_string();
            if kind == "SUBSCRIBE_EVENT" {
                Inbound::SubscribeEvent {
                    provider_name,
                    event_name,
                }
            } else {
                Inbound::UnsubscribeEvent {
                    provider_name,
                    event_name,
                }
            }
        }
        _ => return Ok(None),
    };

    Ok(Some(message))
}

fn required_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a str, String> {
    match obj.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(Value::String(_)) => Err(format!("{} is empty", key)),
        Some(_) => Err(format!("{} must be a string", key)),
        None => Err(format!("missing {}", key)),
    }
}

fn provider_field(obj: &Map<String, Value>) -> Result<ProviderPath, String> {
    let raw = required_str(obj, "providerName")?;
    ProviderPath::parse(raw).ok_or_else(|| format!("invalid providerName '{}'", raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_call_method() {
        let raw = json!({
            "type": "CALL_METHOD",
            "providerName": "XverseProviders.BitcoinProvider",
            "methodName": "request",
            "args": ["getAccounts", {"purposes": ["payment"]}],
            "requestId": "r7",
        });

        let parsed = parse_inbound(&raw).unwrap().unwrap();
        match parsed {
            Inbound::CallMethod {
                provider_name,
                method_name,
                args,
                request_id,
            } => {
                assert_eq!(provider_name, ProviderPath::nested("XverseProviders", "BitcoinProvider"));
                assert_eq!(method_name, "request");
                assert_eq!(args.len(), 2);
                assert_eq!(request_id, RequestId::from("r7"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_missing_args_defaults_to_empty() {
        let raw = json!({"type": "CALL_METHOD", "providerName": "unisat", "methodName": "getAddress", "requestId": 4});
        let parsed = parse_inbound(&raw).unwrap().unwrap();
        assert!(matches!(parsed, Inbound::CallMethod { ref args, .. } if args.is_empty()));
    }

    #[test]
    fn test_malformed_call_keeps_request_id() {
        let raw = json!({"type": "CALL_METHOD", "providerName": "unisat", "args": [], "requestId": "r1"});
        let err = parse_inbound(&raw).unwrap_err();
        assert_eq!(err.request_id, Some(RequestId::from("r1")));
        assert!(err.reason.contains("methodName"));

        let raw = json!({"type": "CALL_METHOD", "providerName": "unisat", "methodName": "x", "args": "nope", "requestId": "r2"});
        let err = parse_inbound(&raw).unwrap_err();
        assert_eq!(err.request_id, Some(RequestId::from("r2")));
    }

    #[test]
    fn test_empty_string_request_id_is_a_token() {
        let raw = json!({"type": "CALL_METHOD", "providerName": "unisat", "methodName": "getAddress", "requestId": ""});
        let parsed = parse_inbound(&raw).unwrap().unwrap();
        assert!(matches!(parsed, Inbound::CallMethod { ref request_id, .. } if *request_id == RequestId::from("")));

        assert!(RequestId::from_value(&json!(true)).is_none());
        assert!(RequestId::from_value(&json!(null)).is_none());
    }

    #[test]
    fn test_malformed_call_without_request_id() {
        let raw = json!({"type": "CALL_METHOD", "providerName": "unisat", "methodName": "x"});
        let err = parse_inbound(&raw).unwrap_err();
        assert!(err.request_id.is_none());
    }

    #[test]
    fn test_unrelated_traffic_ignored() {
        assert_eq!(parse_inbound(&json!("hello")).unwrap(), None);
        assert_eq!(parse_inbound(&json!({"foo": 1})).unwrap(), None);
        assert_eq!(parse_inbound(&json!({"type": "webpackOk"})).unwrap(), None);
    }

    #[test]
    fn test_outbound_wire_shape() {
        let msg = Outbound::metadata(ProviderPath::root("unisat"), vec!["getAddress".into(), "on".into()]);
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "PROVIDER_METADATA", "providerName": "unisat", "methods": ["getAddress", "on"]})
        );

        let ok = Outbound::success(RequestId::from("r1"), Value::Null);
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"type": "METHOD_RESPONSE", "requestId": "r1", "result": null})
        );

        let err = Outbound::failure(RequestId::from("r2"), "User rejected");
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({"type": "METHOD_RESPONSE", "requestId": "r2", "error": "User rejected"})
        );
    }

    #[test]
    fn test_inbound_serializes_for_clients() {
        let msg = Inbound::SubscribeEvent {
            provider_name: ProviderPath::root("unisat"),
            event_name: "accountsChanged".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "SUBSCRIBE_EVENT");
        assert_eq!(parse_inbound(&value).unwrap(), Some(msg));
    }
}
