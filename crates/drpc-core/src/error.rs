//! Error types for drpc operations.
//!
//! Each concern gets its own enum so callers can tell a store outage apart
//! from a malformed payload or a remote application failure.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for coordination store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for remote invocations.
pub type RpcResult<T> = Result<T, RpcError>;

/// Errors reported by the coordination store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Coordination store unavailable: {0}")]
    Unavailable(String),

    #[error("Node already exists: {0}")]
    NodeExists(String),

    #[error("Node does not exist: {0}")]
    NoNode(String),

    #[error("Node has children: {0}")]
    NotEmpty(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Operation rejected on {path}: {reason}")]
    Rejected { path: String, reason: String },

    #[error("Store session expired")]
    SessionExpired,
}

/// Errors from registry operations.
#[derive(Error, Debug, Clone)]
pub enum RegistryError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid registry entry: {0}")]
    InvalidEntry(String),
}

impl From<serde_json::Error> for RegistryError {
    fn from(e: serde_json::Error) -> Self {
        RegistryError::Serialization(e.to_string())
    }
}

/// An application-level failure reported by the remote side of a call.
///
/// Travels inside response envelopes, so it is plain serialisable data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFault {
    /// Category of the failure, e.g. `UnknownMethod` or an application kind.
    pub kind: String,
    /// Human readable description.
    pub message: String,
}

impl RemoteFault {
    pub const UNKNOWN_SERVICE: &'static str = "UnknownService";
    pub const UNKNOWN_METHOD: &'static str = "UnknownMethod";
    pub const BAD_ARGUMENTS: &'static str = "BadArguments";
    pub const INTERNAL: &'static str = "Internal";

    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn unknown_service(service: &str) -> Self {
        Self::new(Self::UNKNOWN_SERVICE, format!("no service named {}", service))
    }

    pub fn unknown_method(service: &str, method: &str) -> Self {
        Self::new(
            Self::UNKNOWN_METHOD,
            format!("service {} has no method {}", service, method),
        )
    }

    pub fn bad_arguments(message: impl Into<String>) -> Self {
        Self::new(Self::BAD_ARGUMENTS, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Self::INTERNAL, message)
    }
}

impl fmt::Display for RemoteFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RemoteFault {}

/// Errors from remote invocations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    #[error("Channel is not open")]
    ChannelClosed,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Call {service}.{method} timed out after {timeout_ms}ms")]
    Timeout {
        service: String,
        method: String,
        timeout_ms: u64,
    },

    #[error("Remote fault: {0}")]
    Remote(RemoteFault),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unknown method {service}.{method}")]
    UnknownMethod { service: String, method: String },

    #[error("Correlation id already pending: {0}")]
    DuplicateCorrelationId(String),
}

impl RpcError {
    /// Whether the call never reached the network.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            RpcError::ChannelClosed
                | RpcError::Serialization(_)
                | RpcError::UnknownMethod { .. }
                | RpcError::DuplicateCorrelationId(_)
        )
    }
}

impl From<RemoteFault> for RpcError {
    fn from(fault: RemoteFault) -> Self {
        RpcError::Remote(fault)
    }
}

/// Failure returned by a service-update listener.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Listener failed: {0}")]
pub struct ListenerError(pub String);

/// Configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

impl ConfigError {
    pub fn invalid(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_wraps_into_registry_error() {
        let err: RegistryError = StoreError::NoNode("/drpc/a".to_string()).into();
        assert!(matches!(err, RegistryError::Store(StoreError::NoNode(_))));
        assert_eq!(err.to_string(), "Store error: Node does not exist: /drpc/a");
    }

    #[test]
    fn test_remote_fault_display() {
        let fault = RemoteFault::unknown_method("Greeter", "shout");
        assert_eq!(fault.kind, RemoteFault::UNKNOWN_METHOD);
        assert_eq!(
            fault.to_string(),
            "UnknownMethod: service Greeter has no method shout"
        );
    }

    #[test]
    fn test_rpc_error_locality() {
        assert!(RpcError::ChannelClosed.is_local());
        assert!(RpcError::Serialization("bad".into()).is_local());
        assert!(!RpcError::Protocol("bad frame".into()).is_local());
        assert!(!RpcError::Timeout {
            service: "s".into(),
            method: "m".into(),
            timeout_ms: 10,
        }
        .is_local());
    }
}
