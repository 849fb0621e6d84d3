//! Request and response envelopes.
//!
//! Frames are JSON documents. A request names the target service and method
//! and carries the arguments as a JSON value (a positional array for
//! multi-argument methods). The response echoes the correlation id and holds
//! either the result value or a [`RemoteFault`].

use drpc_core::{RemoteFault, RpcError, RpcResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Identifies one in-flight call. Serialized as a hyphenated UUID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub correlation_id: CorrelationId,
    pub service: String,
    pub method: String,
    #[serde(default)]
    pub args: Value,
}

impl RpcRequest {
    pub fn new(
        correlation_id: CorrelationId,
        service: impl Into<String>,
        method: impl Into<String>,
        args: Value,
    ) -> Self {
        Self {
            correlation_id,
            service: service.into(),
            method: method.into(),
            args,
        }
    }

    pub fn to_frame(&self) -> RpcResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| RpcError::Serialization(e.to_string()))
    }

    pub fn from_frame(frame: &[u8]) -> RpcResult<Self> {
        serde_json::from_slice(frame)
            .map_err(|e| RpcError::Protocol(format!("malformed request: {}", e)))
    }
}

/// Result carried by a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success(Value),
    Fault(RemoteFault),
}

impl Outcome {
    pub fn into_result(self) -> Result<Value, RemoteFault> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Fault(fault) => Err(fault),
        }
    }
}

impl From<Result<Value, RemoteFault>> for Outcome {
    fn from(result: Result<Value, RemoteFault>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(fault) => Outcome::Fault(fault),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub correlation_id: CorrelationId,
    pub outcome: Outcome,
}

impl RpcResponse {
    pub fn new(correlation_id: CorrelationId, outcome: impl Into<Outcome>) -> Self {
        Self {
            correlation_id,
            outcome: outcome.into(),
        }
    }

    pub fn to_frame(&self) -> RpcResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| RpcError::Serialization(e.to_string()))
    }

    /// Parse an inbound response. Anything that is not a well-formed
    /// response envelope is a protocol error.
    pub fn from_frame(frame: &[u8]) -> RpcResult<Self> {
        serde_json::from_slice(frame)
            .map_err(|e| RpcError::Protocol(format!("malformed response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_correlation_ids_are_unique() {
        let a = CorrelationId::new();
        let b = CorrelationId::new();
        assert_ne!(a, b);
        assert_eq!(serde_json::to_value(a).unwrap(), json!(a.to_string()));
    }

    #[test]
    fn test_request_frame_shape() {
        let id = CorrelationId::new();
        let request = RpcRequest::new(id, "Greeter", "greet", json!(["ada"]));
        let frame: Value = serde_json::from_slice(&request.to_frame().unwrap()).unwrap();

        assert_eq!(frame["correlation_id"], json!(id.to_string()));
        assert_eq!(frame["service"], "Greeter");
        assert_eq!(frame["method"], "greet");
        assert_eq!(frame["args"], json!(["ada"]));
    }

    #[test]
    fn test_response_outcomes() {
        let id = CorrelationId::new();
        let ok = RpcResponse::new(id, Ok::<_, RemoteFault>(json!("hi")));
        let parsed = RpcResponse::from_frame(&ok.to_frame().unwrap()).unwrap();
        assert_eq!(parsed.outcome.into_result(), Ok(json!("hi")));

        let fault = RpcResponse::new(id, Err::<Value, _>(RemoteFault::internal("db down")));
        let parsed = RpcResponse::from_frame(&fault.to_frame().unwrap()).unwrap();
        assert_eq!(
            parsed.outcome.into_result(),
            Err(RemoteFault::internal("db down"))
        );
    }

    #[test]
    fn test_malformed_frames_are_protocol_errors() {
        assert!(matches!(
            RpcResponse::from_frame(b"not json"),
            Err(RpcError::Protocol(_))
        ));

        let bad_id = br#"{"correlation_id":"42","outcome":{"success":null}}"#;
        assert!(matches!(
            RpcResponse::from_frame(bad_id),
            Err(RpcError::Protocol(_))
        ));

        let no_outcome = format!(r#"{{"correlation_id":"{}"}}"#, CorrelationId::new());
        assert!(matches!(
            RpcResponse::from_frame(no_outcome.as_bytes()),
            Err(RpcError::Protocol(_))
        ));

        assert!(matches!(
            RpcRequest::from_frame(br#"{"service":"x"}"#),
            Err(RpcError::Protocol(_))
        ));
    }
}
