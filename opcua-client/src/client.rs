use crate::channel::DiscoveryChannel;
use opcua_core::{RegisteredServer, StatusCode, UaError, UaResult};
use parking_lot::Mutex as SyncMutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Upper bound for a single connect or register round trip
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5000,
        }
    }
}

/// Connection state of a [`Client`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection (initial state)
    #[default]
    Disconnected,
    /// Connect in progress
    Connecting,
    /// Connected and ready for requests
    Connected,
    /// The last connect or request failed on the transport level
    Failed,
}

impl ConnectionState {
    /// Check if the connection is ready for requests
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Default)]
struct ClientStatus {
    state: ConnectionState,
    endpoint_url: Option<String>,
    last_error: StatusCode,
}

/// Client handle
///
/// Cloning is cheap and every clone talks through the same channel. Calls
/// are serialized by the client's own lock.
#[derive(Clone)]
pub struct Client {
    channel: Arc<Mutex<Box<dyn DiscoveryChannel>>>,
    status: Arc<SyncMutex<ClientStatus>>,
    config: ClientConfig,
}

impl Client {
    /// Create a client over the given channel
    pub fn new(channel: impl DiscoveryChannel + 'static) -> Self {
        Self::with_config(channel, ClientConfig::default())
    }

    /// Create a client with an explicit configuration
    pub fn with_config(channel: impl DiscoveryChannel + 'static, config: ClientConfig) -> Self {
        Self {
            channel: Arc::new(Mutex::new(Box::new(channel))),
            status: Arc::new(SyncMutex::new(ClientStatus::default())),
            config,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.status.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_ready()
    }

    /// Endpoint of the current or last connection
    pub fn endpoint_url(&self) -> Option<String> {
        self.status.lock().endpoint_url.clone()
    }

    /// Status of the most recent call
    pub fn last_error(&self) -> StatusCode {
        self.status.lock().last_error
    }

    /// Connect to a discovery endpoint
    ///
    /// # Errors
    /// Returns the channel error, or `Timeout` if the round trip exceeds
    /// `request_timeout_ms`
    pub async fn connect(&self, endpoint_url: &str) -> UaResult<()> {
        let mut channel = self.channel.lock().await;
        {
            let mut status = self.status.lock();
            status.state = ConnectionState::Connecting;
            status.endpoint_url = Some(endpoint_url.to_string());
        }
        let result = self.with_timeout(channel.connect(endpoint_url)).await;
        let mut status = self.status.lock();
        match &result {
            Ok(()) => {
                status.state = ConnectionState::Connected;
                status.last_error = StatusCode::GOOD;
                log::debug!("Connected to {}", endpoint_url);
            }
            Err(e) => {
                status.state = ConnectionState::Failed;
                status.last_error = e.status_code();
                log::warn!("Connect to {} failed: {}", endpoint_url, e);
            }
        }
        result
    }

    /// Disconnect from the endpoint
    pub async fn disconnect(&self) -> UaResult<()> {
        let mut channel = self.channel.lock().await;
        let result = self.with_timeout(channel.disconnect()).await;
        let mut status = self.status.lock();
        status.state = ConnectionState::Disconnected;
        status.last_error = match &result {
            Ok(()) => StatusCode::GOOD,
            Err(e) => e.status_code(),
        };
        result
    }

    /// Send a RegisterServer request
    ///
    /// # Errors
    /// `BadServerNotConnected` if the client is not connected; transport
    /// failures also move the client to [`ConnectionState::Failed`] so that
    /// the next caller reconnects first
    pub async fn register_server(&self, server: &RegisteredServer) -> UaResult<()> {
        let mut channel = self.channel.lock().await;
        if !self.is_connected() {
            self.status.lock().last_error = StatusCode::BAD_SERVER_NOT_CONNECTED;
            return Err(StatusCode::BAD_SERVER_NOT_CONNECTED.into());
        }
        let result = self.with_timeout(channel.register_server(server)).await;
        let mut status = self.status.lock();
        match &result {
            Ok(()) => status.last_error = StatusCode::GOOD,
            Err(e) => {
                status.last_error = e.status_code();
                if matches!(e, UaError::Connection(_) | UaError::Timeout) {
                    status.state = ConnectionState::Failed;
                }
            }
        }
        result
    }

    async fn with_timeout<T>(&self, fut: impl Future<Output = UaResult<T>>) -> UaResult<T> {
        let limit = Duration::from_millis(self.config.request_timeout_ms);
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(UaError::Timeout),
        }
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status.lock();
        f.debug_struct("Client")
            .field("state", &status.state)
            .field("endpoint_url", &status.endpoint_url)
            .field("last_error", &status.last_error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MockDiscoveryChannel;
    use tokio_test::{assert_err, assert_ok};

    fn registration() -> RegisteredServer {
        RegisteredServer {
            server_uri: "urn:test".to_string(),
            is_online: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_connect_and_register() {
        let mut channel = MockDiscoveryChannel::new();
        channel
            .expect_connect()
            .withf(|url| url.to_string() == "opc.tcp://localhost:4840")
            .times(1)
            .returning(|_| Ok(()));
        channel
            .expect_register_server()
            .withf(|server| server.server_uri == "urn:test" && server.is_online)
            .times(1)
            .returning(|_| Ok(()));

        let client = Client::new(channel);
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_ok!(client.connect("opc.tcp://localhost:4840").await);
        assert!(client.is_connected());
        assert_eq!(
            client.endpoint_url().as_deref(),
            Some("opc.tcp://localhost:4840")
        );
        assert_ok!(client.register_server(&registration()).await);
        assert_eq!(client.last_error(), StatusCode::GOOD);
    }

    #[tokio::test]
    async fn test_register_requires_connection() {
        let mut channel = MockDiscoveryChannel::new();
        channel.expect_register_server().times(0);

        let client = Client::new(channel);
        let err = client.register_server(&registration()).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_SERVER_NOT_CONNECTED);
        assert_eq!(client.last_error(), StatusCode::BAD_SERVER_NOT_CONNECTED);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let mut channel = MockDiscoveryChannel::new();
        channel
            .expect_connect()
            .returning(|_| Err(StatusCode::BAD_COMMUNICATION_ERROR.into()));

        let client = Client::new(channel);
        assert_err!(client.connect("opc.tcp://nowhere:4840").await);
        assert_eq!(client.state(), ConnectionState::Failed);
        assert_eq!(client.last_error(), StatusCode::BAD_COMMUNICATION_ERROR);
    }

    #[tokio::test]
    async fn test_transport_error_marks_failed() {
        let mut channel = MockDiscoveryChannel::new();
        channel.expect_connect().returning(|_| Ok(()));
        channel.expect_register_server().returning(|_| {
            Err(UaError::Connection(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "reset",
            )))
        });

        let client = Client::new(channel);
        assert_ok!(client.connect("opc.tcp://localhost:4840").await);
        assert_err!(client.register_server(&registration()).await);
        assert_eq!(client.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn test_disconnect() {
        let mut channel = MockDiscoveryChannel::new();
        channel.expect_connect().returning(|_| Ok(()));
        channel.expect_disconnect().times(1).returning(|| Ok(()));

        let client = Client::new(channel);
        assert_ok!(client.connect("opc.tcp://localhost:4840").await);
        assert_ok!(client.disconnect().await);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}
