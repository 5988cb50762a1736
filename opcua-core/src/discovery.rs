use crate::qualified_name::LocalizedText;
use serde::{Deserialize, Serialize};

/// Application type announced to a discovery server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ApplicationType {
    #[default]
    Server,
    Client,
    ClientAndServer,
    DiscoveryServer,
}

/// Registration record sent to a discovery server
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegisteredServer {
    pub server_uri: String,
    pub product_uri: String,
    pub server_names: Vec<LocalizedText>,
    pub server_type: ApplicationType,
    pub gateway_server_uri: Option<String>,
    pub discovery_urls: Vec<String>,
    pub semaphore_file_path: Option<String>,
    pub is_online: bool,
}
