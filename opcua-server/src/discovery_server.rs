//! In-process local discovery server
//!
//! Keeps the registrations servers send it and answers FindServers and
//! FindServersOnNetwork. It is reached through [`LoopbackChannel`], a
//! [`DiscoveryChannel`] that calls straight into it, so a
//! [`Client`](opcua_client::Client) can register a server without a
//! network.
//!
//! A directory hosted by a [`Server`] (see [`Server::host_discovery_server`])
//! reports every accepted registration to that server's register-server and
//! server-on-network observers.

use crate::discovery::ServerOnNetwork;
use crate::server::{RegisterServerCallback, Server};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opcua_client::DiscoveryChannel;
use opcua_core::{RegisteredServer, StatusCode, UaError, UaResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Registrations not renewed within this period are dropped
pub const DEFAULT_CLEANUP_TIMEOUT_SECS: u64 = 3600;

struct Registration {
    server: RegisteredServer,
    last_seen: DateTime<Utc>,
}

struct LdsState {
    endpoint_url: String,
    online: bool,
    cleanup_timeout: Duration,
    registrations: BTreeMap<String, Registration>,
    on_network: BTreeMap<String, ServerOnNetwork>,
    next_record_id: u32,
    callback: Option<Arc<RegisterServerCallback>>,
    host: Option<Weak<Server>>,
}

impl LdsState {
    /// Network record for a registered server, keeping its record id
    fn announce(&mut self, server: &RegisteredServer) -> ServerOnNetwork {
        let record_id = match self.on_network.get(&server.server_uri) {
            Some(existing) => existing.record_id,
            None => {
                self.next_record_id += 1;
                self.next_record_id
            }
        };
        let record = ServerOnNetwork {
            record_id,
            server_name: server
                .server_names
                .first()
                .map(|name| name.text.clone())
                .unwrap_or_default(),
            discovery_url: server.discovery_urls.first().cloned().unwrap_or_default(),
            server_capabilities: Vec::new(),
        };
        self.on_network
            .insert(server.server_uri.clone(), record.clone());
        record
    }

    /// Drop registrations past the cleanup timeout or without their
    /// semaphore file, with their network records
    fn purge(&mut self) {
        let now = Utc::now();
        let timeout = chrono::Duration::from_std(self.cleanup_timeout)
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        self.registrations.retain(|uri, r| {
            let expired = now - r.last_seen > timeout;
            let orphaned = r
                .server
                .semaphore_file_path
                .as_deref()
                .is_some_and(|p| !Path::new(p).exists());
            if expired || orphaned {
                log::info!("Dropping stale registration of {}", uri);
            }
            !(expired || orphaned)
        });
        let registrations = &self.registrations;
        self.on_network
            .retain(|uri, _| registrations.contains_key(uri));
    }
}

/// Local discovery server
///
/// Clones share the same registration table.
#[derive(Clone)]
pub struct LocalDiscoveryServer {
    state: Arc<Mutex<LdsState>>,
}

impl LocalDiscoveryServer {
    pub fn new(endpoint_url: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(LdsState {
                endpoint_url: endpoint_url.to_string(),
                online: true,
                cleanup_timeout: Duration::from_secs(DEFAULT_CLEANUP_TIMEOUT_SECS),
                registrations: BTreeMap::new(),
                on_network: BTreeMap::new(),
                next_record_id: 0,
                callback: None,
                host: None,
            })),
        }
    }

    pub fn with_cleanup_timeout(self, timeout: Duration) -> Self {
        self.state.lock().cleanup_timeout = timeout;
        self
    }

    pub fn endpoint_url(&self) -> String {
        self.state.lock().endpoint_url.clone()
    }

    /// Take the endpoint off or back on the network
    pub fn set_online(&self, online: bool) {
        self.state.lock().online = online;
    }

    /// Observe every accepted RegisterServer request
    pub fn set_register_server_callback(&self, callback: RegisterServerCallback) {
        self.state.lock().callback = Some(Arc::new(callback));
    }

    /// Report accepted registrations to `server`'s observers
    ///
    /// Only a weak reference is kept; a dropped server is skipped.
    pub fn attach(&self, server: &Arc<Server>) {
        self.state.lock().host = Some(Arc::downgrade(server));
    }

    /// A fresh channel to this server
    pub fn channel(&self) -> LoopbackChannel {
        LoopbackChannel {
            lds: self.clone(),
            connected: false,
        }
    }

    /// Handle one RegisterServer request
    ///
    /// # Errors
    /// - `BadServerUriInvalid` for an empty server uri
    /// - `BadServerNameMissing` if no server name is given
    /// - `BadDiscoveryUrlMissing` for an online record without discovery urls
    /// - `BadSemaphoreFileMissing` if the named semaphore file does not exist
    pub fn register(&self, server: &RegisteredServer) -> UaResult<()> {
        if server.server_uri.is_empty() {
            return Err(StatusCode::BAD_SERVER_URI_INVALID.into());
        }
        if server.server_names.is_empty() {
            return Err(StatusCode::BAD_SERVER_NAME_MISSING.into());
        }
        if server.is_online && server.discovery_urls.is_empty() {
            return Err(StatusCode::BAD_DISCOVERY_URL_MISSING.into());
        }
        if let Some(path) = &server.semaphore_file_path {
            if server.is_online && !Path::new(path).exists() {
                return Err(StatusCode::BAD_SEMAPHORE_FILE_MISSING.into());
            }
        }

        let (callback, host, record) = {
            let mut state = self.state.lock();
            let record = if server.is_online {
                state.registrations.insert(
                    server.server_uri.clone(),
                    Registration {
                        server: server.clone(),
                        last_seen: Utc::now(),
                    },
                );
                log::debug!("Registered server {}", server.server_uri);
                Some(state.announce(server))
            } else {
                if state.registrations.remove(&server.server_uri).is_some() {
                    log::debug!("Unregistered server {}", server.server_uri);
                }
                state.on_network.remove(&server.server_uri)
            };
            let host = state.host.as_ref().and_then(Weak::upgrade);
            (state.callback.clone(), host, record)
        };

        if let Some(callback) = callback {
            callback(server);
        }
        if let Some(host) = host {
            host.notify_register_server(server);
            if let Some(record) = &record {
                host.notify_server_on_network(record, server.is_online, server.is_online);
            }
        }
        Ok(())
    }

    /// Servers with a live registration
    ///
    /// Entries whose semaphore file vanished or that were not renewed
    /// within the cleanup timeout are purged first.
    pub fn registered_servers(&self) -> Vec<RegisteredServer> {
        let mut state = self.state.lock();
        state.purge();
        state.registrations.values().map(|r| r.server.clone()).collect()
    }

    /// FindServersOnNetwork: records with an id of at least `starting_record_id`
    ///
    /// # Arguments
    /// * `starting_record_id` - Lowest record id to return
    /// * `max_records` - Upper bound on the result, 0 for no limit
    pub fn find_servers_on_network(
        &self,
        starting_record_id: u32,
        max_records: usize,
    ) -> Vec<ServerOnNetwork> {
        let mut state = self.state.lock();
        state.purge();
        let mut records: Vec<ServerOnNetwork> = state
            .on_network
            .values()
            .filter(|r| r.record_id >= starting_record_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.record_id);
        if max_records > 0 {
            records.truncate(max_records);
        }
        records
    }

    /// FindServers: all registered servers, or those whose uri is listed
    pub fn find_servers(&self, server_uris: &[&str]) -> Vec<RegisteredServer> {
        self.registered_servers()
            .into_iter()
            .filter(|s| server_uris.is_empty() || server_uris.contains(&s.server_uri.as_str()))
            .collect()
    }

    /// Stored registrations, stale ones included
    pub fn registration_count(&self) -> usize {
        self.state.lock().registrations.len()
    }

    fn check_reachable(&self, endpoint_url: Option<&str>) -> UaResult<()> {
        let state = self.state.lock();
        let reachable = state.online && endpoint_url.is_none_or(|url| url == state.endpoint_url);
        if reachable {
            Ok(())
        } else {
            Err(UaError::Connection(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{} is not reachable", endpoint_url.unwrap_or(&state.endpoint_url)),
            )))
        }
    }
}

impl fmt::Debug for LocalDiscoveryServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LocalDiscoveryServer")
            .field("endpoint_url", &state.endpoint_url)
            .field("online", &state.online)
            .field("registrations", &state.registrations.len())
            .finish()
    }
}

impl Server {
    /// Act as a local discovery server on this server's discovery url
    ///
    /// Registrations the directory accepts are reported to the callbacks
    /// set with [`Server::set_register_server_callback`] and
    /// [`Server::set_server_on_network_callback`].
    pub fn host_discovery_server(self: &Arc<Self>) -> LocalDiscoveryServer {
        let config = self.config();
        let endpoint_url = config
            .effective_discovery_urls()
            .into_iter()
            .next()
            .unwrap_or_else(|| format!("opc.tcp://localhost:{}", config.port));
        let lds = LocalDiscoveryServer::new(&endpoint_url);
        lds.attach(self);
        log::info!("Server {} hosts a discovery server at {}", self.handle(), endpoint_url);
        lds
    }
}

/// Channel calling directly into a [`LocalDiscoveryServer`]
#[derive(Debug)]
pub struct LoopbackChannel {
    lds: LocalDiscoveryServer,
    connected: bool,
}

#[async_trait]
impl DiscoveryChannel for LoopbackChannel {
    async fn connect(&mut self, endpoint_url: &str) -> UaResult<()> {
        self.lds.check_reachable(Some(endpoint_url))?;
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> UaResult<()> {
        self.connected = false;
        Ok(())
    }

    async fn register_server(&mut self, server: &RegisteredServer) -> UaResult<()> {
        if !self.connected {
            return Err(StatusCode::BAD_SERVER_NOT_CONNECTED.into());
        }
        if let Err(e) = self.lds.check_reachable(None) {
            self.connected = false;
            return Err(e);
        }
        self.lds.register(server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcua_client::Client;
    use opcua_core::LocalizedText;

    fn record(uri: &str) -> RegisteredServer {
        RegisteredServer {
            server_uri: uri.to_string(),
            product_uri: "urn:product".to_string(),
            server_names: vec![LocalizedText::from(uri)],
            discovery_urls: vec!["opc.tcp://localhost:4840".to_string()],
            is_online: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_register_validation() {
        let lds = LocalDiscoveryServer::new("opc.tcp://lds:4840");
        let err = lds.register(&record("")).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_SERVER_URI_INVALID);

        let mut nameless = record("urn:a");
        nameless.server_names.clear();
        assert_eq!(
            lds.register(&nameless).unwrap_err().status_code(),
            StatusCode::BAD_SERVER_NAME_MISSING
        );

        let mut no_urls = record("urn:a");
        no_urls.discovery_urls.clear();
        assert_eq!(
            lds.register(&no_urls).unwrap_err().status_code(),
            StatusCode::BAD_DISCOVERY_URL_MISSING
        );

        let mut missing = record("urn:a");
        missing.semaphore_file_path = Some("/nonexistent/opcua/semaphore".to_string());
        assert_eq!(
            lds.register(&missing).unwrap_err().status_code(),
            StatusCode::BAD_SEMAPHORE_FILE_MISSING
        );
        assert_eq!(lds.registration_count(), 0);
    }

    #[test]
    fn test_semaphore_removal_drops_registration() {
        let lds = LocalDiscoveryServer::new("opc.tcp://lds:4840");
        let path = std::env::temp_dir().join(format!("opcua-semaphore-{}", rand::random::<u64>()));
        std::fs::write(&path, b"").unwrap();

        let mut server = record("urn:a");
        server.semaphore_file_path = Some(path.to_string_lossy().into_owned());
        lds.register(&server).unwrap();
        lds.register(&record("urn:b")).unwrap();
        assert_eq!(lds.registered_servers().len(), 2);

        std::fs::remove_file(&path).unwrap();
        let remaining = lds.registered_servers();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].server_uri, "urn:b");
    }

    #[test]
    fn test_cleanup_timeout_and_find_servers() {
        let lds = LocalDiscoveryServer::new("opc.tcp://lds:4840");
        lds.register(&record("urn:a")).unwrap();
        lds.register(&record("urn:b")).unwrap();
        assert_eq!(lds.find_servers(&["urn:b"]).len(), 1);
        assert_eq!(lds.find_servers(&[]).len(), 2);

        let lds = lds.with_cleanup_timeout(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(5));
        assert!(lds.registered_servers().is_empty());
        assert_eq!(lds.registration_count(), 0);
    }

    #[test]
    fn test_callback_may_reenter_directory() {
        let lds = LocalDiscoveryServer::new("opc.tcp://lds:4840");
        let counts = Arc::new(Mutex::new(Vec::new()));
        lds.set_register_server_callback(Box::new({
            let lds = lds.clone();
            let counts = counts.clone();
            move |_: &RegisteredServer| counts.lock().push(lds.registered_servers().len())
        }));
        lds.register(&record("urn:a")).unwrap();
        lds.register(&record("urn:b")).unwrap();
        assert_eq!(*counts.lock(), vec![1, 2]);
    }

    #[test]
    fn test_servers_on_network() {
        let lds = LocalDiscoveryServer::new("opc.tcp://lds:4840");
        lds.register(&record("urn:a")).unwrap();
        lds.register(&record("urn:b")).unwrap();
        lds.register(&record("urn:a")).unwrap();

        let records = lds.find_servers_on_network(0, 0);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record_id, 1);
        assert_eq!(records[0].server_name, "urn:a");
        assert_eq!(records[0].discovery_url, "opc.tcp://localhost:4840");
        assert_eq!(records[1].record_id, 2);
        assert_eq!(lds.find_servers_on_network(2, 0).len(), 1);
        assert_eq!(lds.find_servers_on_network(0, 1).len(), 1);

        let mut offline = record("urn:a");
        offline.is_online = false;
        lds.register(&offline).unwrap();
        assert_eq!(lds.find_servers_on_network(0, 0).len(), 1);
    }

    #[tokio::test]
    async fn test_hosting_server_observes_registrations() {
        use crate::config::ServerConfig;
        use crate::runtime::Runtime;

        let runtime = Runtime::new();
        let directory = runtime.create_server(
            ServerConfig::default().with_discovery_url("opc.tcp://directory:4840"),
        );
        let registered = Arc::new(Mutex::new(Vec::new()));
        let announced = Arc::new(Mutex::new(Vec::new()));
        directory.set_register_server_callback(Box::new({
            let registered = registered.clone();
            move |s: &RegisteredServer| registered.lock().push((s.server_uri.clone(), s.is_online))
        }));
        directory.set_server_on_network_callback(Box::new({
            let announced = announced.clone();
            move |r: &ServerOnNetwork, is_announce: bool, _txt: bool| {
                announced.lock().push((r.record_id, is_announce))
            }
        }));
        let lds = directory.host_discovery_server();
        assert_eq!(lds.endpoint_url(), "opc.tcp://directory:4840");

        let plant = runtime.create_server(ServerConfig::default().with_application_uri("urn:plant"));
        let client = Client::new(lds.channel());
        client.connect("opc.tcp://directory:4840").await.unwrap();
        plant.register_discovery(&client, None).await.unwrap();
        plant.unregister_discovery(&client).await.unwrap();

        assert_eq!(
            *registered.lock(),
            vec![("urn:plant".to_string(), true), ("urn:plant".to_string(), false)]
        );
        assert_eq!(*announced.lock(), vec![(1, true), (1, false)]);

        drop(directory);
        plant.register_discovery(&client, None).await.unwrap();
        assert_eq!(registered.lock().len(), 2);
    }

    #[test]
    fn test_callback_and_unregister() {
        let lds = LocalDiscoveryServer::new("opc.tcp://lds:4840");
        let seen = Arc::new(Mutex::new(Vec::new()));
        lds.set_register_server_callback(Box::new({
            let seen = seen.clone();
            move |s: &RegisteredServer| seen.lock().push((s.server_uri.clone(), s.is_online))
        }));
        lds.register(&record("urn:a")).unwrap();
        let mut offline = record("urn:a");
        offline.is_online = false;
        lds.register(&offline).unwrap();
        assert_eq!(lds.registration_count(), 0);
        assert_eq!(
            *seen.lock(),
            vec![("urn:a".to_string(), true), ("urn:a".to_string(), false)]
        );
    }

    #[tokio::test]
    async fn test_loopback_client() {
        let lds = LocalDiscoveryServer::new("opc.tcp://lds:4840");
        let client = Client::new(lds.channel());
        assert!(client.connect("opc.tcp://elsewhere:4840").await.is_err());
        assert!(!client.is_connected());

        client.connect("opc.tcp://lds:4840").await.unwrap();
        client.register_server(&record("urn:a")).await.unwrap();
        assert_eq!(lds.registration_count(), 1);

        lds.set_online(false);
        let err = client.register_server(&record("urn:a")).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_COMMUNICATION_ERROR);
        assert!(!client.is_connected());
    }
}
