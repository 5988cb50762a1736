use async_trait::async_trait;
use opcua_core::{RegisteredServer, UaResult};

/// Transport to a discovery endpoint
///
/// Implementations perform the actual secure-channel handshake and encode
/// the RegisterServer request; the rest of the workspace only sees the
/// outcome of each call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DiscoveryChannel: Send {
    /// Open a connection to the endpoint at `endpoint_url`
    async fn connect(&mut self, endpoint_url: &str) -> UaResult<()>;

    /// Close the current connection
    async fn disconnect(&mut self) -> UaResult<()>;

    /// Send one RegisterServer request over the open connection
    ///
    /// `server.is_online == false` unregisters the server.
    async fn register_server(&mut self, server: &RegisteredServer) -> UaResult<()>;
}
