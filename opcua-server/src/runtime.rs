//! Process level runtime
//!
//! The runtime replaces a hidden global singleton with an explicit object:
//! it maps server handles to live instances, keeps the named context
//! registry and holds the node lifecycle hook shared by all its servers.
//! Several runtimes can coexist, which keeps servers independently
//! testable.

use crate::config::ServerConfig;
use crate::context::{DefaultNodeLifecycle, NodeContext, NodeLifecycle};
use crate::server::{NoExtension, Server, ServerExtension};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Opaque handle of a server within its runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServerHandle(u64);

impl ServerHandle {
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server#{}", self.0)
    }
}

/// Owner of the handle registry, context registry and lifecycle hook
pub struct Runtime {
    servers: RwLock<HashMap<ServerHandle, Weak<Server>>>,
    contexts: RwLock<HashMap<String, Arc<dyn NodeContext>>>,
    lifecycle: RwLock<Arc<dyn NodeLifecycle>>,
    next_handle: AtomicU64,
}

impl Runtime {
    /// Initialise a runtime
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            servers: RwLock::new(HashMap::new()),
            contexts: RwLock::new(HashMap::new()),
            lifecycle: RwLock::new(Arc::new(DefaultNodeLifecycle)),
            next_handle: AtomicU64::new(1),
        })
    }

    /// Create and register a server
    pub fn create_server(self: &Arc<Self>, config: ServerConfig) -> Arc<Server> {
        self.create_server_with_extension(config, Arc::new(NoExtension))
    }

    /// Create and register a server with `initialise`/`process` hooks
    pub fn create_server_with_extension(
        self: &Arc<Self>,
        config: ServerConfig,
        extension: Arc<dyn ServerExtension>,
    ) -> Arc<Server> {
        let handle = ServerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let server = Arc::new(Server::new(self.clone(), handle, config, extension));
        self.servers.write().insert(handle, Arc::downgrade(&server));
        log::debug!("Registered {}", handle);
        server
    }

    /// Recover a live server from its handle
    pub fn find_server(&self, handle: ServerHandle) -> Option<Arc<Server>> {
        self.servers.read().get(&handle).and_then(Weak::upgrade)
    }

    /// Remove a handle from the registry, `false` if it was not registered
    pub(crate) fn unregister_server(&self, handle: ServerHandle) -> bool {
        let removed = self.servers.write().remove(&handle).is_some();
        if removed {
            log::debug!("Unregistered {}", handle);
        }
        removed
    }

    /// Number of registered servers
    pub fn server_count(&self) -> usize {
        self.servers.read().len()
    }

    /// Register a context under its own name, replacing any previous one
    pub fn register_context(&self, context: Arc<dyn NodeContext>) -> Option<Arc<dyn NodeContext>> {
        let name = context.name().to_string();
        self.contexts.write().insert(name, context)
    }

    pub fn find_context(&self, name: &str) -> Option<Arc<dyn NodeContext>> {
        self.contexts.read().get(name).cloned()
    }

    pub fn remove_context(&self, name: &str) -> bool {
        self.contexts.write().remove(name).is_some()
    }

    /// Install the global node lifecycle hook
    pub fn set_node_lifecycle(&self, lifecycle: Arc<dyn NodeLifecycle>) {
        *self.lifecycle.write() = lifecycle;
    }

    pub fn node_lifecycle(&self) -> Arc<dyn NodeLifecycle> {
        self.lifecycle.read().clone()
    }

    /// Terminate every live server and clear the registries
    pub fn shutdown(&self) {
        let servers: Vec<Arc<Server>> = self
            .servers
            .read()
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        for server in servers {
            server.terminate();
        }
        self.servers.write().clear();
        self.contexts.write().clear();
        log::info!("Runtime shut down");
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("servers", &self.server_count())
            .field("contexts", &self.contexts.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::LifecycleEvent;
    use opcua_core::UaResult;

    struct Named(&'static str);

    impl NodeContext for Named {
        fn name(&self) -> &str {
            self.0
        }
    }

    struct Rejecting;

    impl NodeLifecycle for Rejecting {
        fn construct(
            &self,
            _event: &LifecycleEvent,
            _proposed: Option<Arc<dyn NodeContext>>,
        ) -> UaResult<Option<Arc<dyn NodeContext>>> {
            Err(opcua_core::StatusCode::BAD_USER_ACCESS_DENIED.into())
        }

        fn destruct(&self, _event: &LifecycleEvent, _context: Option<&Arc<dyn NodeContext>>) {}
    }

    #[test]
    fn test_handle_registry() {
        let runtime = Runtime::new();
        let a = runtime.create_server(ServerConfig::default());
        let b = runtime.create_server(ServerConfig::default());
        assert_ne!(a.handle(), b.handle());
        assert_eq!(runtime.server_count(), 2);
        assert!(runtime.find_server(a.handle()).is_some());

        a.terminate();
        assert!(runtime.find_server(a.handle()).is_none());
        assert_eq!(runtime.server_count(), 1);

        let handle = b.handle();
        drop(b);
        assert!(runtime.find_server(handle).is_none());
    }

    #[test]
    fn test_runtimes_are_independent() {
        let first = Runtime::new();
        let second = Runtime::new();
        let server = first.create_server(ServerConfig::default());
        assert!(second.find_server(server.handle()).is_none());
        first.shutdown();
        assert_eq!(first.server_count(), 0);
    }

    #[test]
    fn test_context_registry() {
        let runtime = Runtime::new();
        assert!(runtime.register_context(Arc::new(Named("meter"))).is_none());
        assert!(runtime.register_context(Arc::new(Named("meter"))).is_some());
        assert_eq!(runtime.find_context("meter").map(|c| c.name().to_string()), Some("meter".into()));
        assert!(runtime.remove_context("meter"));
        assert!(runtime.find_context("meter").is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_hook_can_veto() {
        let runtime = Runtime::new();
        let server = runtime.create_server(ServerConfig::default());
        runtime.set_node_lifecycle(Arc::new(Rejecting));
        let err = server
            .add_folder(&opcua_core::ids::objects_folder(), "Vetoed", &opcua_core::NodeId::null(), 1)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), opcua_core::StatusCode::BAD_USER_ACCESS_DENIED);
        let space_has_it = server
            .get_child(&opcua_core::ids::objects_folder(), "Vetoed")
            .await
            .is_ok();
        assert!(!space_has_it);
    }
}
