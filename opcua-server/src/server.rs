//! Server instance and processing loop
//!
//! A [`Server`] owns one address space and everything hanging off it:
//! method handlers, repeated callbacks, discovery registrations, sessions,
//! history and event subscribers. Remote requests, callback firings and
//! the `process` extension hook all run on the single processing loop
//! started by [`Server::start`], one after the other.

use crate::access_control::{AccessControl, DefaultAccessControl, UsernamePasswordLogin};
use crate::address_space::AddressSpace;
use crate::config::ServerConfig;
use crate::context::DataSource;
use crate::discovery::{DiscoveryRegistration, ServerOnNetwork};
use crate::events::EventNotification;
use crate::history::HistoryStore;
use crate::method::MethodRegistry;
use crate::runtime::{Runtime, ServerHandle};
use crate::scheduler::{RepeatedCallback, SchedulerHandle};
use crate::session::{PendingRequest, ServerConnector, SessionTable};
use async_trait::async_trait;
use opcua_core::{NodeId, RegisteredServer, StatusCode, UaResult};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, Notify};

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle state of a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerState {
    /// Constructed, `initialise` not run yet
    #[default]
    Created,
    /// Initialised and ready to start
    Configured,
    /// Claimed by a `start` call that has not entered the loop yet
    Starting,
    /// Processing loop active
    Running,
    /// Processing loop exited
    Stopped,
}

impl ServerState {
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, ServerState::Running)
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerState::Created => write!(f, "Created"),
            ServerState::Configured => write!(f, "Configured"),
            ServerState::Starting => write!(f, "Starting"),
            ServerState::Running => write!(f, "Running"),
            ServerState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Application hooks into the server lifecycle
#[async_trait]
pub trait ServerExtension: Send + Sync {
    /// Called once before the first start, typically to build the address space
    async fn initialise(&self, _server: &Arc<Server>) -> UaResult<()> {
        Ok(())
    }

    /// Called once per loop iteration
    async fn process(&self, _server: &Arc<Server>) {}
}

pub(crate) struct NoExtension;

impl ServerExtension for NoExtension {}

/// Status of the most recent public operation
#[derive(Debug, Default)]
pub(crate) struct LastError(Mutex<StatusCode>);

impl LastError {
    pub fn set(&self, code: StatusCode) {
        *self.0.lock() = code;
    }

    pub fn get(&self) -> StatusCode {
        *self.0.lock()
    }
}

/// Observer of registrations received while acting as a directory
pub type RegisterServerCallback = Box<dyn Fn(&RegisteredServer) + Send + Sync>;

/// Observer of mDNS server records: `(record, is_server_announce, is_txt_received)`
pub type ServerOnNetworkCallback = Box<dyn Fn(&ServerOnNetwork, bool, bool) + Send + Sync>;

/// An OPC UA server instance
pub struct Server {
    handle: ServerHandle,
    runtime: Arc<Runtime>,
    config: RwLock<ServerConfig>,
    pub(crate) space: tokio::sync::RwLock<AddressSpace>,
    pub(crate) methods: Mutex<MethodRegistry>,
    pub(crate) data_sources: Mutex<HashMap<NodeId, Arc<dyn DataSource>>>,
    scheduler: SchedulerHandle,
    wake: Arc<Notify>,
    callbacks: Mutex<HashMap<String, RepeatedCallback>>,
    pub(crate) discovery: Mutex<BTreeMap<u64, DiscoveryRegistration>>,
    access_control: RwLock<Arc<dyn AccessControl>>,
    logins: RwLock<Vec<UsernamePasswordLogin>>,
    pub(crate) sessions: Mutex<SessionTable>,
    pub(crate) history: Mutex<HistoryStore>,
    pub(crate) events: broadcast::Sender<EventNotification>,
    extension: Arc<dyn ServerExtension>,
    state: Mutex<ServerState>,
    initialised: tokio::sync::OnceCell<()>,
    running: AtomicBool,
    requests: mpsc::Sender<PendingRequest>,
    request_rx: tokio::sync::Mutex<mpsc::Receiver<PendingRequest>>,
    pub(crate) last_error: LastError,
    register_server_callback: Mutex<Option<Arc<RegisterServerCallback>>>,
    server_on_network_callback: Mutex<Option<Arc<ServerOnNetworkCallback>>>,
    terminated: AtomicBool,
}

impl Server {
    pub(crate) fn new(
        runtime: Arc<Runtime>,
        handle: ServerHandle,
        config: ServerConfig,
        extension: Arc<dyn ServerExtension>,
    ) -> Self {
        let wake = Arc::new(Notify::new());
        let (requests, request_rx) = mpsc::channel(config.request_queue_capacity.max(1));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            handle,
            runtime,
            space: tokio::sync::RwLock::new(AddressSpace::new(&config.application_uri)),
            methods: Mutex::new(MethodRegistry::default()),
            data_sources: Mutex::new(HashMap::new()),
            scheduler: SchedulerHandle::new(wake.clone()),
            wake,
            callbacks: Mutex::new(HashMap::new()),
            discovery: Mutex::new(BTreeMap::new()),
            access_control: RwLock::new(Arc::new(DefaultAccessControl::new())),
            logins: RwLock::new(Vec::new()),
            sessions: Mutex::new(SessionTable::new(config.max_sessions)),
            history: Mutex::new(HistoryStore::new()),
            events,
            extension,
            state: Mutex::new(ServerState::Created),
            initialised: tokio::sync::OnceCell::new(),
            running: AtomicBool::new(false),
            requests,
            request_rx: tokio::sync::Mutex::new(request_rx),
            last_error: LastError::default(),
            register_server_callback: Mutex::new(None),
            server_on_network_callback: Mutex::new(None),
            terminated: AtomicBool::new(false),
            config: RwLock::new(config),
        }
    }

    pub fn handle(&self) -> ServerHandle {
        self.handle
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Snapshot of the configuration
    pub fn config(&self) -> ServerConfig {
        self.config.read().clone()
    }

    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    /// Check if the processing loop is (still) meant to run
    pub fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    /// Entry point for the protocol engine
    pub fn connector(&self) -> ServerConnector {
        ServerConnector::new(self.requests.clone())
    }

    /// Status of the most recent public operation
    pub fn last_error(&self) -> StatusCode {
        self.last_error.get()
    }

    /// Check if the most recent public operation succeeded
    pub fn last_ok(&self) -> bool {
        self.last_error.get().is_good()
    }

    pub(crate) fn record<T>(&self, result: &UaResult<T>) {
        self.last_error.set(match result {
            Ok(_) => StatusCode::GOOD,
            Err(e) => e.status_code(),
        });
    }

    // ---- configuration ----

    pub fn set_mdns_server_name(&self, name: &str) {
        self.config.write().mdns_server_name = Some(name.to_string());
    }

    pub fn set_custom_hostname(&self, hostname: &str) {
        self.config.write().custom_hostname = Some(hostname.to_string());
    }

    /// Change the application URI; namespace 1 follows it
    pub async fn set_server_uri(&self, uri: &str) {
        self.config.write().application_uri = uri.to_string();
        self.space.write().await.set_application_uri(uri);
    }

    /// Namespace index of `uri`, registering it if new
    pub async fn add_namespace(&self, uri: &str) -> u16 {
        self.space.write().await.add_namespace(uri)
    }

    pub async fn namespaces(&self) -> Vec<String> {
        self.space.write().await.namespaces().to_vec()
    }

    /// Registration record describing this server
    pub fn registered_server(&self) -> RegisteredServer {
        let config = self.config.read();
        RegisteredServer {
            server_uri: config.application_uri.clone(),
            product_uri: config.product_uri.clone(),
            server_names: vec![config.application_name.as_str().into()],
            server_type: opcua_core::ApplicationType::Server,
            gateway_server_uri: None,
            discovery_urls: config.effective_discovery_urls(),
            semaphore_file_path: None,
            is_online: true,
        }
    }

    // ---- access control ----

    pub fn access_control(&self) -> Arc<dyn AccessControl> {
        self.access_control.read().clone()
    }

    /// Select the policy consulted for remote requests
    pub fn set_access_control(&self, access_control: Arc<dyn AccessControl>) {
        *self.access_control.write() = access_control;
    }

    /// The username/password table used by simple login
    pub fn logins(&self) -> Vec<UsernamePasswordLogin> {
        self.logins.read().clone()
    }

    pub fn add_login(&self, username: &str, password: &str) {
        self.logins
            .write()
            .push(UsernamePasswordLogin::new(username, password));
    }

    /// Install the default policy with simple login over [`Server::logins`]
    pub fn enable_simple_login(&self) {
        let policy = DefaultAccessControl::with_logins(self.logins());
        self.set_access_control(Arc::new(policy));
    }

    // ---- named repeated callbacks ----

    /// Store a callback under a name, replacing (and stopping) any previous one
    pub fn add_repeated_callback(&self, name: &str, callback: RepeatedCallback) {
        self.callbacks.lock().insert(name.to_string(), callback);
    }

    /// Store an unstarted callback over a closure
    pub fn add_repeated_callback_fn<F>(&self, name: &str, interval_ms: u64, f: F)
    where
        F: Fn(&Arc<Server>, u64) -> UaResult<()> + Send + Sync + 'static,
    {
        let callback = RepeatedCallback::from_fn(self, interval_ms, f);
        self.add_repeated_callback(name, callback);
    }

    /// Stop and drop a named callback
    pub fn remove_repeated_callback(&self, name: &str) -> bool {
        self.callbacks.lock().remove(name).is_some()
    }

    /// Run `f` on a named callback
    pub fn with_repeated_callback<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut RepeatedCallback) -> R,
    ) -> Option<R> {
        self.callbacks.lock().get_mut(name).map(f)
    }

    // ---- observers ----

    /// Observe registrations accepted by a directory this server hosts
    ///
    /// See [`Server::host_discovery_server`].
    pub fn set_register_server_callback(&self, callback: RegisterServerCallback) {
        *self.register_server_callback.lock() = Some(Arc::new(callback));
    }

    /// Observe network records of servers announced through a hosted
    /// directory, or reported by an mDNS collaborator
    pub fn set_server_on_network_callback(&self, callback: ServerOnNetworkCallback) {
        *self.server_on_network_callback.lock() = Some(Arc::new(callback));
    }

    /// Report a registration received by this server acting as a directory
    pub fn notify_register_server(&self, server: &RegisteredServer) {
        let callback = self.register_server_callback.lock().clone();
        if let Some(callback) = callback {
            callback(server);
        }
    }

    /// Report an mDNS server record observed on the network
    pub fn notify_server_on_network(
        &self,
        record: &ServerOnNetwork,
        is_server_announce: bool,
        is_txt_received: bool,
    ) {
        let callback = self.server_on_network_callback.lock().clone();
        if let Some(callback) = callback {
            callback(record, is_server_announce, is_txt_received);
        }
    }

    // ---- lifecycle ----

    /// Run the `initialise` hook once; `Created` moves to `Configured`
    ///
    /// Concurrent callers wait for the one running the hook. A failed hook
    /// runs again on the next call.
    pub async fn initialise(self: &Arc<Self>) -> UaResult<()> {
        let result = self
            .initialised
            .get_or_try_init(|| self.extension.initialise(self))
            .await
            .map(|_| ());
        if result.is_ok() {
            let mut state = self.state.lock();
            if *state == ServerState::Created {
                *state = ServerState::Configured;
            }
        }
        self.record(&result);
        result
    }

    /// Move `Created`/`Configured` to `Starting` in one step
    fn claim_start(&self) -> UaResult<()> {
        let mut state = self.state.lock();
        let startable = matches!(*state, ServerState::Created | ServerState::Configured)
            && !self.terminated.load(Ordering::SeqCst);
        if !startable {
            return Err(StatusCode::BAD_INVALID_STATE.into());
        }
        *state = ServerState::Starting;
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Run the processing loop until [`Server::stop`] is called
    ///
    /// Each iteration services at most one pending request, fires the due
    /// repeated callbacks and invokes the `process` hook. Only one call can
    /// own the loop; a stopped server cannot be started again.
    ///
    /// # Errors
    /// `BadInvalidState` if the server is starting, running, stopped or
    /// terminated; the `initialise` hook's error for a server that was not
    /// configured
    pub async fn start(self: &Arc<Self>) -> UaResult<()> {
        if let Err(e) = self.claim_start() {
            self.last_error.set(e.status_code());
            return Err(e);
        }
        if let Err(e) = self.initialise().await {
            let mut state = self.state.lock();
            if *state == ServerState::Starting {
                *state = ServerState::Created;
            }
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        let mut requests = self.request_rx.lock().await;
        {
            let mut state = self.state.lock();
            if *state == ServerState::Starting {
                *state = ServerState::Running;
            }
        }
        self.last_error.set(StatusCode::GOOD);
        log::info!("Server {} started", self.handle);

        while self.running() {
            let wait = self.next_wait();
            tokio::select! {
                pending = requests.recv() => {
                    if let Some(pending) = pending {
                        self.process_pending(pending).await;
                    }
                }
                _ = tokio::time::sleep(wait) => {}
                _ = self.wake.notified() => {}
            }
            if !self.running() {
                break;
            }
            self.fire_due_callbacks().await;
            self.extension.process(self).await;
        }

        *self.state.lock() = ServerState::Stopped;
        log::info!("Server {} stopped", self.handle);
        Ok(())
    }

    fn next_wait(&self) -> Duration {
        let max_wait = Duration::from_millis(self.config.read().max_iteration_wait_ms.max(1));
        match self.scheduler.next_deadline() {
            Some(deadline) => deadline
                .saturating_duration_since(Instant::now())
                .min(max_wait),
            None => max_wait,
        }
    }

    async fn fire_due_callbacks(self: &Arc<Self>) {
        for (id, handler) in self.scheduler.due(Instant::now()) {
            if let Err(e) = handler.on_tick(self, id).await {
                log::error!("Repeated callback {} failed: {}", id, e);
            }
        }
    }

    /// Ask the processing loop to exit after its current iteration
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Release everything the server holds; safe to call more than once
    ///
    /// Stops the loop, the named callbacks and the periodic registrations,
    /// closes all sessions and removes the server from its runtime.
    pub fn terminate(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop();
        self.callbacks.lock().clear();
        self.discovery.lock().clear();
        self.scheduler.clear();
        let sessions = self.sessions.lock().drain();
        let access_control = self.access_control();
        for session in &sessions {
            access_control.close_session(session);
        }
        self.runtime.unregister_server(self.handle);
        if self.state() != ServerState::Running {
            *self.state.lock() = ServerState::Stopped;
        }
        log::info!("Server {} terminated", self.handle);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("handle", &self.handle)
            .field("state", &self.state())
            .field("last_error", &self.last_error())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::sleep;

    struct Counting {
        initialised: AtomicUsize,
        processed: AtomicUsize,
    }

    #[async_trait]
    impl ServerExtension for Counting {
        async fn initialise(&self, server: &Arc<Server>) -> UaResult<()> {
            self.initialised.fetch_add(1, Ordering::SeqCst);
            server
                .add_folder(&opcua_core::ids::objects_folder(), "Boot", &opcua_core::NodeId::null(), 0)
                .await?;
            Ok(())
        }

        async fn process(&self, _server: &Arc<Server>) {
            self.processed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn server() -> Arc<Server> {
        Runtime::new().create_server(ServerConfig::default().with_max_iteration_wait_ms(10))
    }

    #[tokio::test]
    async fn test_start_stop() {
        let runtime = Runtime::new();
        let ext = Arc::new(Counting {
            initialised: AtomicUsize::new(0),
            processed: AtomicUsize::new(0),
        });
        let server = runtime.create_server_with_extension(
            ServerConfig::default().with_max_iteration_wait_ms(10),
            ext.clone(),
        );
        assert_eq!(server.state(), ServerState::Created);

        let task = tokio::spawn({
            let server = server.clone();
            async move { server.start().await }
        });
        sleep(Duration::from_millis(100)).await;
        assert_eq!(server.state(), ServerState::Running);
        assert!(server.running());

        server.stop();
        task.await.unwrap().unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
        assert_eq!(ext.initialised.load(Ordering::SeqCst), 1);
        assert!(ext.processed.load(Ordering::SeqCst) > 0);
        assert!(server
            .get_child(&opcua_core::ids::objects_folder(), "Boot")
            .await
            .is_ok());

        let err = server.start().await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_INVALID_STATE);
    }

    /// Yields inside `initialise` so a second start can interleave
    struct Yielding {
        initialised: AtomicUsize,
    }

    #[async_trait]
    impl ServerExtension for Yielding {
        async fn initialise(&self, _server: &Arc<Server>) -> UaResult<()> {
            tokio::task::yield_now().await;
            self.initialised.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_concurrent_start_runs_one_loop() {
        let ext = Arc::new(Yielding {
            initialised: AtomicUsize::new(0),
        });
        let server = Runtime::new().create_server_with_extension(
            ServerConfig::default().with_max_iteration_wait_ms(10),
            ext.clone(),
        );
        let first = tokio::spawn({
            let server = server.clone();
            async move { server.start().await }
        });
        let second = tokio::spawn({
            let server = server.clone();
            async move { server.start().await }
        });
        sleep(Duration::from_millis(100)).await;
        assert_eq!(server.state(), ServerState::Running);

        server.stop();
        let results = [first.await.unwrap(), second.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let rejected = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(rejected.status_code(), StatusCode::BAD_INVALID_STATE);

        sleep(Duration::from_millis(50)).await;
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(!server.running());
        assert_eq!(ext.initialised.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_during_initialise() {
        let server = Runtime::new().create_server_with_extension(
            ServerConfig::default().with_max_iteration_wait_ms(10),
            Arc::new(Yielding {
                initialised: AtomicUsize::new(0),
            }),
        );
        let task = tokio::spawn({
            let server = server.clone();
            async move { server.start().await }
        });
        tokio::task::yield_now().await;
        assert_eq!(server.state(), ServerState::Starting);
        server.stop();
        task.await.unwrap().unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(server.start().await.is_err());
    }

    #[tokio::test]
    async fn test_scheduler_fires_on_loop() {
        let server = server();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        server.add_repeated_callback_fn("tick", 100, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let task = tokio::spawn({
            let server = server.clone();
            async move { server.start().await }
        });

        let id = server
            .with_repeated_callback("tick", |cb| {
                cb.start().map(|_| cb.id())
            })
            .unwrap()
            .unwrap();
        assert_ne!(id, 0);
        sleep(Duration::from_millis(550)).await;
        server.with_repeated_callback("tick", |cb| cb.stop()).unwrap().unwrap();
        let count = fired.load(Ordering::SeqCst);
        assert!((4..=6).contains(&count), "fired {count} times");

        sleep(Duration::from_millis(250)).await;
        assert_eq!(fired.load(Ordering::SeqCst), count);
        server.stop();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failing_callback_keeps_loop_alive() {
        let server = server();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let mut cb = RepeatedCallback::from_fn(&server, 20, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(StatusCode::BAD_INTERNAL_ERROR.into())
        });
        cb.start().unwrap();
        let task = tokio::spawn({
            let server = server.clone();
            async move { server.start().await }
        });
        sleep(Duration::from_millis(150)).await;
        assert!(fired.load(Ordering::SeqCst) >= 2);
        assert!(server.running());
        server.stop();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let server = server();
        server.add_repeated_callback_fn("idle", 1000, |_, _| Ok(()));
        server.with_repeated_callback("idle", |cb| cb.start()).unwrap().unwrap();
        let mut owned = RepeatedCallback::from_fn(&server, 1000, |_, _| Ok(()));
        owned.start().unwrap();
        assert_eq!(server.scheduler().len(), 2);

        server.terminate();
        server.terminate();
        assert!(server.is_terminated());
        assert!(!owned.is_running());
        assert_eq!(server.scheduler().len(), 0);
        assert_eq!(server.runtime().server_count(), 0);
        assert!(server.start().await.is_err());
    }

    #[test]
    fn test_simple_login_uses_login_table() {
        use crate::access_control::{SessionContext, UserIdentity};

        let server = server();
        server.add_login("operator", "pw");
        server.enable_simple_login();
        let session = SessionContext {
            session_id: opcua_core::NodeId::numeric(1, 1),
            authentication_token: opcua_core::NodeId::numeric(1, 2),
            identity: UserIdentity::user_name("operator", "pw"),
        };
        assert!(server.access_control().activate_session(&session).is_good());
    }

    #[test]
    fn test_observers() {
        let server = server();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        server.set_register_server_callback(Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        server.notify_register_server(&server.registered_server());
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(server.registered_server().server_uri, "urn:opcua-rs:server");
    }
}
