//! The coordination store capability consumed by the registry.
//!
//! Any ordered, hierarchical key-value store with session-scoped ephemeral
//! nodes and one-shot child watches fits behind [`HierarchicalStore`].
//! [`crate::MemoryStore`] is the in-process implementation.

use async_trait::async_trait;
use drpc_core::{StoreError, StoreResult};
use std::fmt;

/// Lifetime of a created node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CreateMode {
    /// Survives the creating session.
    Persistent,
    /// Removed by the store when the creating session ends.
    Ephemeral,
}

/// What caused a watch to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    /// A child was added under or removed from the watched node.
    ChildrenChanged,
    /// The watched node itself was deleted.
    NodeDeleted,
}

/// Notification handed to a watch callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    /// The watched path.
    pub path: String,
    pub kind: WatchEventKind,
}

impl fmt::Display for WatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} on {}", self.kind, self.path)
    }
}

/// Callback installed by [`HierarchicalStore::watch_children`].
///
/// Runs on whatever thread the store dispatches notifications from.
pub type WatchCallback = Box<dyn FnOnce(WatchEvent) + Send + 'static>;

/// Hierarchical key-value store with ephemeral nodes and child watches.
///
/// Paths are absolute, `/`-separated, without a trailing slash.
#[async_trait]
pub trait HierarchicalStore: Send + Sync {
    /// Whether a node exists at `path`.
    async fn exists_node(&self, path: &str) -> StoreResult<bool>;

    /// Create a node. Missing ancestors are created as empty persistent nodes.
    ///
    /// Fails with [`StoreError::NodeExists`] if the node is already present.
    async fn create_node(&self, path: &str, data: &[u8], mode: CreateMode) -> StoreResult<()>;

    /// Delete a childless node.
    ///
    /// Fails with [`StoreError::NoNode`] if absent and [`StoreError::NotEmpty`]
    /// if it has children.
    async fn delete_node(&self, path: &str) -> StoreResult<()>;

    /// Payload of a node.
    async fn get_node_data(&self, path: &str) -> StoreResult<Vec<u8>>;

    /// Names (not full paths) of a node's children, in store order.
    async fn list_children(&self, path: &str) -> StoreResult<Vec<String>>;

    /// Install a one-shot watch on the children of `path`.
    ///
    /// The callback fires at most once; it must be installed again to keep
    /// observing. It may also never fire, e.g. when the session ends, in which
    /// case the store drops it.
    async fn watch_children(&self, path: &str, callback: WatchCallback) -> StoreResult<()>;
}

/// Reject paths that are not absolute, have empty segments or a trailing slash.
pub fn validate_path(path: &str) -> StoreResult<()> {
    if path == "/" {
        return Ok(());
    }
    if !path.starts_with('/') || path.ends_with('/') || path[1..].split('/').any(str::is_empty) {
        return Err(StoreError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Parent of a validated path; `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of a validated path.
pub fn node_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path() {
        assert!(validate_path("/").is_ok());
        assert!(validate_path("/drpc").is_ok());
        assert!(validate_path("/drpc/svc/providers/10.0.0.1:80").is_ok());

        for bad in ["", "drpc", "/drpc/", "//drpc", "/drpc//svc"] {
            assert_eq!(
                validate_path(bad),
                Err(StoreError::InvalidPath(bad.to_string())),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn test_parent_and_name() {
        assert_eq!(parent_path("/"), None);
        assert_eq!(parent_path("/drpc"), Some("/"));
        assert_eq!(parent_path("/drpc/svc/providers"), Some("/drpc/svc"));
        assert_eq!(node_name("/drpc/svc/providers/10.0.0.1:80"), "10.0.0.1:80");
        assert_eq!(node_name("/drpc"), "drpc");
    }
}
