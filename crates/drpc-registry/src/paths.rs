//! Registry path model.

use drpc_core::{RegistryConfig, RegistryEntry, Role};

/// Computes store paths for services and their registrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryPaths {
    root: String,
}

impl RegistryPaths {
    pub const DEFAULT_ROOT: &'static str = "/drpc";

    /// `root` must be absolute and without a trailing slash.
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(config.root.clone())
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// `{root}/{service}`
    pub fn service(&self, service_name: &str) -> String {
        format!("{}/{}", self.root, service_name)
    }

    /// `{root}/{service}/providers` or `{root}/{service}/consumers`
    pub fn branch(&self, service_name: &str, role: Role) -> String {
        format!("{}/{}", self.service(service_name), role.branch())
    }

    pub fn provider_branch(&self, service_name: &str) -> String {
        self.branch(service_name, Role::Provider)
    }

    pub fn consumer_branch(&self, service_name: &str) -> String {
        self.branch(service_name, Role::Consumer)
    }

    /// `{branch}/{ip}:{port}`
    pub fn node(&self, entry: &RegistryEntry, role: Role) -> String {
        format!(
            "{}/{}",
            self.branch(&entry.service_name, role),
            entry.address()
        )
    }

    pub fn provider_node(&self, entry: &RegistryEntry) -> String {
        self.node(entry, Role::Provider)
    }

    pub fn consumer_node(&self, entry: &RegistryEntry) -> String {
        self.node(entry, Role::Consumer)
    }
}

impl Default for RegistryPaths {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ROOT)
    }
}
