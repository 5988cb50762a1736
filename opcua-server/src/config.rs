//! Server configuration

use serde::{Deserialize, Serialize};

/// Server configuration
///
/// Namespace 1 of the address space is the application URI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP port announced in the default discovery URL
    pub port: u16,
    pub application_uri: String,
    pub product_uri: String,
    pub application_name: String,
    /// Hostname used in discovery URLs instead of the local one
    pub custom_hostname: Option<String>,
    /// Name announced via mDNS
    pub mdns_server_name: Option<String>,
    /// Explicit discovery URLs; derived from hostname and port when empty
    pub discovery_urls: Vec<String>,
    /// Longest idle wait of the processing loop
    pub max_iteration_wait_ms: u64,
    /// Capacity of the inbound request queue
    pub request_queue_capacity: usize,
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 4840,
            application_uri: "urn:opcua-rs:server".to_string(),
            product_uri: "urn:opcua-rs".to_string(),
            application_name: "opcua-rs server".to_string(),
            custom_hostname: None,
            mdns_server_name: None,
            discovery_urls: Vec::new(),
            max_iteration_wait_ms: 50,
            request_queue_capacity: 256,
            max_sessions: 100,
        }
    }
}

impl ServerConfig {
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_application_uri(mut self, uri: impl Into<String>) -> Self {
        self.application_uri = uri.into();
        self
    }

    pub fn with_product_uri(mut self, uri: impl Into<String>) -> Self {
        self.product_uri = uri.into();
        self
    }

    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    pub fn with_custom_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.custom_hostname = Some(hostname.into());
        self
    }

    pub fn with_mdns_server_name(mut self, name: impl Into<String>) -> Self {
        self.mdns_server_name = Some(name.into());
        self
    }

    pub fn with_discovery_url(mut self, url: impl Into<String>) -> Self {
        self.discovery_urls.push(url.into());
        self
    }

    pub fn with_max_iteration_wait_ms(mut self, ms: u64) -> Self {
        self.max_iteration_wait_ms = ms;
        self
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    /// Discovery URLs announced by the server
    pub fn effective_discovery_urls(&self) -> Vec<String> {
        if !self.discovery_urls.is_empty() {
            return self.discovery_urls.clone();
        }
        let host = self.custom_hostname.as_deref().unwrap_or("localhost");
        vec![format!("opc.tcp://{}:{}", host, self.port)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 4840);
        assert_eq!(config.max_iteration_wait_ms, 50);
        assert_eq!(config.effective_discovery_urls(), vec!["opc.tcp://localhost:4840"]);
    }

    #[test]
    fn test_discovery_urls() {
        let config = ServerConfig::default()
            .with_custom_hostname("plc-7")
            .with_port(4841);
        assert_eq!(config.effective_discovery_urls(), vec!["opc.tcp://plc-7:4841"]);

        let config = config.with_discovery_url("opc.tcp://gateway:4840");
        assert_eq!(config.effective_discovery_urls(), vec!["opc.tcp://gateway:4840"]);
    }
}
