//! Registry entries.
//!
//! A [`RegistryEntry`] describes one registration: which application owns it,
//! which logical service it is about, and where that process can be reached.
//! Whether it is a provider or a consumer is decided by the branch it is
//! written under, see [`Role`].

use crate::error::{RegistryError, RegistryResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Branch of a service namespace an entry lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Process serving the service.
    Provider,
    /// Process calling the service.
    Consumer,
}

impl Role {
    /// Name of the store branch holding entries of this role.
    pub fn branch(&self) -> &'static str {
        match self {
            Role::Provider => "providers",
            Role::Consumer => "consumers",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Provider => write!(f, "provider"),
            Role::Consumer => write!(f, "consumer"),
        }
    }
}

/// One registration record as stored in the coordination store.
///
/// The payload uses the field names `applicationName`, `serviceName`, `ip`,
/// `port` and `attr`, so entries written by other drpc processes decode
/// unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    /// Owning process or application.
    pub application_name: String,
    /// Logical service identity.
    pub service_name: String,
    /// Host the process listens on.
    pub ip: String,
    /// TCP port the process listens on.
    pub port: u16,
    /// Free-form metadata.
    #[serde(default, rename = "attr")]
    pub attributes: HashMap<String, Value>,
}

impl RegistryEntry {
    /// Create an entry with no metadata.
    pub fn new(
        application_name: impl Into<String>,
        service_name: impl Into<String>,
        ip: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            application_name: application_name.into(),
            service_name: service_name.into(),
            ip: ip.into(),
            port,
            attributes: HashMap::new(),
        }
    }

    /// Add a metadata attribute, replacing any previous value for the key.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Network location, also used as the store node name.
    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// Check the invariants an entry must hold before it is written.
    pub fn validate(&self, role: Role) -> RegistryResult<()> {
        if self.service_name.trim().is_empty() {
            return Err(RegistryError::InvalidEntry("serviceName is empty".into()));
        }
        if self.application_name.trim().is_empty() {
            return Err(RegistryError::InvalidEntry(
                "applicationName is empty".into(),
            ));
        }
        if self.ip.trim().is_empty() {
            return Err(RegistryError::InvalidEntry("ip is empty".into()));
        }
        // Service names and addresses become single path segments.
        if self.service_name.contains('/') {
            return Err(RegistryError::InvalidEntry(format!(
                "serviceName {} contains '/'",
                self.service_name
            )));
        }
        if self.ip.contains('/') {
            return Err(RegistryError::InvalidEntry(format!(
                "ip {} contains '/'",
                self.ip
            )));
        }
        if role == Role::Provider && self.port == 0 {
            return Err(RegistryError::InvalidEntry(format!(
                "provider {} has port 0",
                self.service_name
            )));
        }
        Ok(())
    }

    /// Serialize into the structured-text node payload.
    pub fn to_payload(&self) -> RegistryResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a node payload.
    pub fn from_payload(payload: &[u8]) -> RegistryResult<Self> {
        Ok(serde_json::from_slice(payload)?)
    }
}

impl fmt::Display for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}:{} ({})",
            self.service_name, self.ip, self.port, self.application_name
        )
    }
}
