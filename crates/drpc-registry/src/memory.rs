//! In-process coordination store.
//!
//! [`MemoryStore`] holds the node tree; each [`MemorySession`] obtained from
//! [`MemoryStore::connect`] plays the part of one client connection. Ephemeral
//! nodes belong to the session that created them and disappear when it
//! expires, which is how a crashed provider looks to everyone else.
//!
//! Watches are one-shot and are invoked on the thread performing the change,
//! after the tree lock has been released.

use crate::store::{
    node_name, parent_path, validate_path, CreateMode, HierarchicalStore, WatchCallback,
    WatchEvent, WatchEventKind,
};
use async_trait::async_trait;
use drpc_core::{StoreError, StoreResult};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

type SessionId = u64;

struct Node {
    data: Vec<u8>,
    mode: CreateMode,
    owner: SessionId,
    children: BTreeSet<String>,
}

impl Node {
    fn new(data: Vec<u8>, mode: CreateMode, owner: SessionId) -> Self {
        Self {
            data,
            mode,
            owner,
            children: BTreeSet::new(),
        }
    }
}

struct StoreState {
    nodes: HashMap<String, Node>,
    watches: HashMap<String, Vec<(SessionId, WatchCallback)>>,
    live_sessions: HashSet<SessionId>,
    next_session: SessionId,
}

type Fired = Vec<(WatchEvent, WatchCallback)>;

impl StoreState {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert("/".to_string(), Node::new(Vec::new(), CreateMode::Persistent, 0));
        Self {
            nodes,
            watches: HashMap::new(),
            live_sessions: HashSet::new(),
            next_session: 1,
        }
    }

    fn take_watches(&mut self, path: &str, kind: WatchEventKind, fired: &mut Fired) {
        if let Some(callbacks) = self.watches.remove(path) {
            for (_, callback) in callbacks {
                fired.push((
                    WatchEvent {
                        path: path.to_string(),
                        kind,
                    },
                    callback,
                ));
            }
        }
    }

    fn insert(&mut self, path: &str, node: Node, fired: &mut Fired) {
        if let Some(parent) = parent_path(path) {
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                parent_node.children.insert(node_name(path).to_string());
            }
            self.take_watches(parent, WatchEventKind::ChildrenChanged, fired);
        }
        self.nodes.insert(path.to_string(), node);
    }

    fn remove(&mut self, path: &str, fired: &mut Fired) {
        self.nodes.remove(path);
        self.take_watches(path, WatchEventKind::NodeDeleted, fired);
        if let Some(parent) = parent_path(path) {
            if let Some(parent_node) = self.nodes.get_mut(parent) {
                parent_node.children.remove(node_name(path));
            }
            self.take_watches(parent, WatchEventKind::ChildrenChanged, fired);
        }
    }
}

struct Shared {
    state: Mutex<StoreState>,
    unavailable: AtomicBool,
}

fn fire(fired: Fired) {
    for (event, callback) in fired {
        debug!(event = %event, "Firing watch");
        callback(event);
    }
}

/// The shared node tree.
#[derive(Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(StoreState::new()),
                unavailable: AtomicBool::new(false),
            }),
        }
    }

    /// Open a new session against this store.
    pub fn connect(&self) -> MemorySession {
        let mut state = self.shared.state.lock();
        let id = state.next_session;
        state.next_session += 1;
        state.live_sessions.insert(id);
        MemorySession {
            id,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Make every operation fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of nodes, including the root.
    pub fn node_count(&self) -> usize {
        self.shared.state.lock().nodes.len()
    }

    /// Number of armed watches on a path.
    pub fn watch_count(&self, path: &str) -> usize {
        self.shared
            .state
            .lock()
            .watches
            .get(path)
            .map_or(0, Vec::len)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// One client session on a [`MemoryStore`].
pub struct MemorySession {
    id: SessionId,
    shared: Arc<Shared>,
}

impl MemorySession {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// End the session: its ephemeral nodes are deleted, watchers of their
    /// parents are notified, and watches it installed are dropped unfired.
    pub fn expire(&self) {
        let mut fired = Vec::new();
        {
            let mut state = self.shared.state.lock();
            if !state.live_sessions.remove(&self.id) {
                return;
            }

            // Drop this session's watches first so its own deletions don't fire them.
            for callbacks in state.watches.values_mut() {
                callbacks.retain(|(owner, _)| *owner != self.id);
            }
            state.watches.retain(|_, callbacks| !callbacks.is_empty());

            let mut owned: Vec<String> = state
                .nodes
                .iter()
                .filter(|(_, node)| node.mode == CreateMode::Ephemeral && node.owner == self.id)
                .map(|(path, _)| path.clone())
                .collect();
            owned.sort();
            for path in &owned {
                state.remove(path, &mut fired);
            }
            debug!(session = self.id, removed = owned.len(), "Session expired");
        }
        fire(fired);
    }

    pub fn is_live(&self) -> bool {
        self.shared.state.lock().live_sessions.contains(&self.id)
    }

    fn check(&self, state: &StoreState) -> StoreResult<()> {
        if self.shared.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store marked unavailable".into()));
        }
        if !state.live_sessions.contains(&self.id) {
            return Err(StoreError::SessionExpired);
        }
        Ok(())
    }
}

#[async_trait]
impl HierarchicalStore for MemorySession {
    async fn exists_node(&self, path: &str) -> StoreResult<bool> {
        validate_path(path)?;
        let state = self.shared.state.lock();
        self.check(&state)?;
        Ok(state.nodes.contains_key(path))
    }

    async fn create_node(&self, path: &str, data: &[u8], mode: CreateMode) -> StoreResult<()> {
        validate_path(path)?;
        if path == "/" {
            return Err(StoreError::NodeExists(path.to_string()));
        }

        let mut fired = Vec::new();
        {
            let mut state = self.shared.state.lock();
            self.check(&state)?;
            if state.nodes.contains_key(path) {
                return Err(StoreError::NodeExists(path.to_string()));
            }

            // Collect missing ancestors, nearest first.
            let mut missing = Vec::new();
            let mut cursor = parent_path(path);
            while let Some(ancestor) = cursor {
                match state.nodes.get(ancestor) {
                    Some(node) if node.mode == CreateMode::Ephemeral => {
                        return Err(StoreError::Rejected {
                            path: path.to_string(),
                            reason: format!("ephemeral node {} cannot have children", ancestor),
                        });
                    }
                    Some(_) => break,
                    None => missing.push(ancestor.to_string()),
                }
                cursor = parent_path(ancestor);
            }

            for ancestor in missing.iter().rev() {
                state.insert(
                    ancestor,
                    Node::new(Vec::new(), CreateMode::Persistent, self.id),
                    &mut fired,
                );
            }
            state.insert(path, Node::new(data.to_vec(), mode, self.id), &mut fired);
        }
        fire(fired);
        Ok(())
    }

    async fn delete_node(&self, path: &str) -> StoreResult<()> {
        validate_path(path)?;
        let mut fired = Vec::new();
        {
            let mut state = self.shared.state.lock();
            self.check(&state)?;
            match state.nodes.get(path) {
                None => return Err(StoreError::NoNode(path.to_string())),
                Some(node) if !node.children.is_empty() => {
                    return Err(StoreError::NotEmpty(path.to_string()))
                }
                Some(_) if path == "/" => {
                    return Err(StoreError::Rejected {
                        path: path.to_string(),
                        reason: "the root cannot be deleted".into(),
                    })
                }
                Some(_) => {}
            }
            state.remove(path, &mut fired);
        }
        fire(fired);
        Ok(())
    }

    async fn get_node_data(&self, path: &str) -> StoreResult<Vec<u8>> {
        validate_path(path)?;
        let state = self.shared.state.lock();
        self.check(&state)?;
        state
            .nodes
            .get(path)
            .map(|node| node.data.clone())
            .ok_or_else(|| StoreError::NoNode(path.to_string()))
    }

    async fn list_children(&self, path: &str) -> StoreResult<Vec<String>> {
        validate_path(path)?;
        let state = self.shared.state.lock();
        self.check(&state)?;
        state
            .nodes
            .get(path)
            .map(|node| node.children.iter().cloned().collect())
            .ok_or_else(|| StoreError::NoNode(path.to_string()))
    }

    async fn watch_children(&self, path: &str, callback: WatchCallback) -> StoreResult<()> {
        validate_path(path)?;
        let mut state = self.shared.state.lock();
        self.check(&state)?;
        if !state.nodes.contains_key(path) {
            return Err(StoreError::NoNode(path.to_string()));
        }
        state
            .watches
            .entry(path.to_string())
            .or_default()
            .push((self.id, callback));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn watcher() -> (WatchCallback, mpsc::Receiver<WatchEvent>) {
        let (tx, rx) = mpsc::channel();
        let callback: WatchCallback = Box::new(move |event| {
            let _ = tx.send(event);
        });
        (callback, rx)
    }

    #[tokio::test]
    async fn test_create_creates_parents() {
        let store = MemoryStore::new();
        let session = store.connect();

        session
            .create_node("/drpc/svc/providers/a:1", b"x", CreateMode::Ephemeral)
            .await
            .unwrap();

        assert!(session.exists_node("/drpc").await.unwrap());
        assert!(session.exists_node("/drpc/svc/providers").await.unwrap());
        assert_eq!(
            session.get_node_data("/drpc/svc/providers/a:1").await.unwrap(),
            b"x"
        );
        assert_eq!(store.node_count(), 5);
    }

    #[tokio::test]
    async fn test_create_existing_fails() {
        let store = MemoryStore::new();
        let session = store.connect();

        session.create_node("/a", b"", CreateMode::Persistent).await.unwrap();
        let err = session
            .create_node("/a", b"", CreateMode::Persistent)
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NodeExists("/a".into()));
    }

    #[tokio::test]
    async fn test_ephemeral_cannot_have_children() {
        let store = MemoryStore::new();
        let session = store.connect();

        session.create_node("/e", b"", CreateMode::Ephemeral).await.unwrap();
        let err = session
            .create_node("/e/child", b"", CreateMode::Persistent)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected { .. }));
    }

    #[tokio::test]
    async fn test_delete_semantics() {
        let store = MemoryStore::new();
        let session = store.connect();

        assert_eq!(
            session.delete_node("/missing").await.unwrap_err(),
            StoreError::NoNode("/missing".into())
        );

        session.create_node("/a/b", b"", CreateMode::Persistent).await.unwrap();
        assert_eq!(
            session.delete_node("/a").await.unwrap_err(),
            StoreError::NotEmpty("/a".into())
        );

        session.delete_node("/a/b").await.unwrap();
        session.delete_node("/a").await.unwrap();
        assert!(!session.exists_node("/a").await.unwrap());
    }

    #[tokio::test]
    async fn test_children_are_sorted() {
        let store = MemoryStore::new();
        let session = store.connect();

        for name in ["c", "a", "b"] {
            session
                .create_node(&format!("/p/{}", name), b"", CreateMode::Persistent)
                .await
                .unwrap();
        }
        assert_eq!(session.list_children("/p").await.unwrap(), vec!["a", "b", "c"]);
        assert!(session.list_children("/missing").await.is_err());
    }

    #[tokio::test]
    async fn test_child_watch_fires_once() {
        let store = MemoryStore::new();
        let session = store.connect();
        session.create_node("/p", b"", CreateMode::Persistent).await.unwrap();

        let (callback, rx) = watcher();
        session.watch_children("/p", callback).await.unwrap();
        assert_eq!(store.watch_count("/p"), 1);

        session.create_node("/p/a", b"", CreateMode::Persistent).await.unwrap();
        session.create_node("/p/b", b"", CreateMode::Persistent).await.unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.path, "/p");
        assert_eq!(event.kind, WatchEventKind::ChildrenChanged);
        assert!(rx.try_recv().is_err());
        assert_eq!(store.watch_count("/p"), 0);
    }

    #[tokio::test]
    async fn test_data_change_of_child_does_not_fire() {
        let store = MemoryStore::new();
        let session = store.connect();
        session.create_node("/p/a", b"", CreateMode::Persistent).await.unwrap();

        let (callback, rx) = watcher();
        session.watch_children("/p", callback).await.unwrap();
        session.create_node("/p/a/deep", b"", CreateMode::Persistent).await.unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_watch_on_missing_node_fails() {
        let store = MemoryStore::new();
        let session = store.connect();
        let (callback, _rx) = watcher();
        assert!(matches!(
            session.watch_children("/nope", callback).await,
            Err(StoreError::NoNode(_))
        ));
    }

    #[tokio::test]
    async fn test_expire_removes_ephemeral_nodes_and_notifies() {
        let store = MemoryStore::new();
        let observer = store.connect();
        let provider = store.connect();

        provider
            .create_node("/svc/providers/a:1", b"", CreateMode::Ephemeral)
            .await
            .unwrap();

        let (callback, rx) = watcher();
        observer.watch_children("/svc/providers", callback).await.unwrap();

        provider.expire();

        assert!(!observer.exists_node("/svc/providers/a:1").await.unwrap());
        assert!(observer.exists_node("/svc/providers").await.unwrap());
        assert_eq!(rx.try_recv().unwrap().path, "/svc/providers");
        assert!(!provider.is_live());
        assert_eq!(
            provider.exists_node("/svc").await.unwrap_err(),
            StoreError::SessionExpired
        );
    }

    #[tokio::test]
    async fn test_expire_drops_own_watches() {
        let store = MemoryStore::new();
        let session = store.connect();
        session.create_node("/p", b"", CreateMode::Persistent).await.unwrap();

        let (callback, rx) = watcher();
        session.watch_children("/p", callback).await.unwrap();
        session.expire();

        assert_eq!(store.watch_count("/p"), 0);
        assert_eq!(rx.try_recv(), Err(mpsc::TryRecvError::Disconnected));
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = MemoryStore::new();
        let session = store.connect();

        store.set_unavailable(true);
        assert!(matches!(
            session.exists_node("/").await,
            Err(StoreError::Unavailable(_))
        ));

        store.set_unavailable(false);
        assert!(session.exists_node("/").await.unwrap());
    }

    #[test]
    fn test_expired_session_rejects_operations() {
        let store = MemoryStore::new();
        let session = store.connect();
        session.expire();

        assert!(!session.is_live());
        let result = tokio_test::block_on(session.create_node("/x", b"", CreateMode::Persistent));
        assert_eq!(result, Err(StoreError::SessionExpired));
        assert!(tokio_test::block_on(store.connect().list_children("/")).unwrap().is_empty());
    }
}
