//! Registration with a discovery server
//!
//! One-shot registration goes through a caller supplied [`Client`]. The
//! periodic form wraps the same call in a [`RepeatedCallback`] that runs
//! on the processing loop and reconnects the client when needed.

use crate::scheduler::{RepeatedCallback, RepeatedCallbackHandler};
use crate::server::Server;
use async_trait::async_trait;
use opcua_client::Client;
use opcua_core::{RegisteredServer, StatusCode, UaResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Server record announced over mDNS
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerOnNetwork {
    pub record_id: u32,
    pub server_name: String,
    pub discovery_url: String,
    pub server_capabilities: Vec<String>,
}

/// An active periodic registration
pub struct DiscoveryRegistration {
    pub server_url: String,
    pub semaphore_file_path: Option<String>,
    callback: RepeatedCallback,
}

impl DiscoveryRegistration {
    /// Id of the repeated callback doing the registration
    pub fn scheduler_id(&self) -> u64 {
        self.callback.id()
    }

    pub fn interval_ms(&self) -> u64 {
        self.callback.interval_ms()
    }
}

impl fmt::Debug for DiscoveryRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryRegistration")
            .field("server_url", &self.server_url)
            .field("semaphore_file_path", &self.semaphore_file_path)
            .field("scheduler_id", &self.scheduler_id())
            .finish()
    }
}

/// Tick handler of a periodic registration
struct PeriodicRegistration {
    server_url: String,
    client: Client,
    semaphore_file_path: Option<String>,
}

#[async_trait]
impl RepeatedCallbackHandler for PeriodicRegistration {
    async fn on_tick(&self, server: &Arc<Server>, _id: u64) -> UaResult<()> {
        if !self.client.is_connected() {
            self.client.connect(&self.server_url).await?;
        }
        server
            .send_registration(&self.client, self.semaphore_file_path.as_deref())
            .await
    }
}

impl Server {
    fn discovery_record(&self, semaphore_file_path: Option<&str>, is_online: bool) -> RegisteredServer {
        RegisteredServer {
            semaphore_file_path: semaphore_file_path.map(str::to_string),
            is_online,
            ..self.registered_server()
        }
    }

    /// Register once with the discovery server `client` is connected to
    ///
    /// # Arguments
    /// * `client` - Connected client
    /// * `semaphore_file_path` - File whose removal withdraws the registration
    ///
    /// # Errors
    /// Whatever the client reports; nothing is retried
    pub async fn register_discovery(
        &self,
        client: &Client,
        semaphore_file_path: Option<&str>,
    ) -> UaResult<()> {
        let result = self.send_registration(client, semaphore_file_path).await;
        self.record(&result);
        result
    }

    /// Register without touching [`Server::last_error`]
    async fn send_registration(
        &self,
        client: &Client,
        semaphore_file_path: Option<&str>,
    ) -> UaResult<()> {
        let record = self.discovery_record(semaphore_file_path, true);
        let result = client.register_server(&record).await;
        match &result {
            Ok(()) => log::info!(
                "Registered {} with {}",
                record.server_uri,
                client.endpoint_url().unwrap_or_default()
            ),
            Err(e) => log::warn!("Registering {} failed: {}", record.server_uri, e),
        }
        result
    }

    /// Withdraw this server from the discovery server `client` is connected to
    ///
    /// A running periodic registration is not stopped by this call.
    pub async fn unregister_discovery(&self, client: &Client) -> UaResult<()> {
        let record = self.discovery_record(None, false);
        let result = client.register_server(&record).await;
        match &result {
            Ok(()) => log::info!("Unregistered {}", record.server_uri),
            Err(e) => log::warn!("Unregistering {} failed: {}", record.server_uri, e),
        }
        self.record(&result);
        result
    }

    /// Register with `server_url` on a fixed period
    ///
    /// # Arguments
    /// * `server_url` - Discovery endpoint, used to (re)connect `client`
    /// * `client` - Client owned by the registration from now on
    /// * `interval_ms` - Period between registrations
    /// * `delay_first_ms` - Delay before the first registration
    ///
    /// # Returns
    /// The scheduler id, needed by [`Server::remove_periodic_server_register`]
    pub fn add_periodic_server_register(
        &self,
        server_url: &str,
        client: Client,
        interval_ms: u64,
        delay_first_ms: u64,
        semaphore_file_path: Option<&str>,
    ) -> UaResult<u64> {
        let handler = PeriodicRegistration {
            server_url: server_url.to_string(),
            client,
            semaphore_file_path: semaphore_file_path.map(str::to_string),
        };
        let mut callback =
            RepeatedCallback::from_handler(self.scheduler().clone(), interval_ms, Arc::new(handler));
        let result = callback.start_with_delay(delay_first_ms).map(|()| callback.id());
        self.record(&result);
        let id = result?;
        self.discovery.lock().insert(
            id,
            DiscoveryRegistration {
                server_url: server_url.to_string(),
                semaphore_file_path: semaphore_file_path.map(str::to_string),
                callback,
            },
        );
        log::debug!("Periodic registration {} with {} every {} ms", id, server_url, interval_ms);
        Ok(id)
    }

    /// Stop a periodic registration
    ///
    /// # Errors
    /// `BadNotFound` if `id` names no periodic registration
    pub fn remove_periodic_server_register(&self, id: u64) -> UaResult<()> {
        let removed = self.discovery.lock().remove(&id);
        let result = match removed {
            Some(mut registration) => registration.callback.stop(),
            None => Err(StatusCode::BAD_NOT_FOUND.into()),
        };
        self.record(&result);
        result
    }

    /// Active periodic registrations as `(scheduler id, server url)`
    pub fn periodic_server_registers(&self) -> Vec<(u64, String)> {
        self.discovery
            .lock()
            .iter()
            .map(|(id, r)| (*id, r.server_url.clone()))
            .collect()
    }
}
