//! Node identifiers
//!
//! A [`NodeId`] names exactly one node inside an address space. The text
//! form follows the usual `ns=<index>;<kind>=<value>` notation, where the
//! namespace prefix is left out for namespace 0.

use crate::error::{UaError, UaResult};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

static NODE_ID_PATTERN: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^(?:ns=(\d+);)?([isgb])=(.*)$").ok());

/// Identifier part of a [`NodeId`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Identifier {
    Numeric(u32),
    String(String),
    Guid(Uuid),
    ByteString(#[serde(with = "serde_bytes")] Vec<u8>),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric(v) => write!(f, "i={}", v),
            Identifier::String(v) => write!(f, "s={}", v),
            Identifier::Guid(v) => write!(f, "g={}", v),
            Identifier::ByteString(v) => {
                write!(f, "b=")?;
                for byte in v {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

/// Identifier of a node within one address space
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub namespace_index: u16,
    pub identifier: Identifier,
}

impl NodeId {
    /// Create a numeric node id
    pub fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: Identifier::Numeric(value),
        }
    }

    /// Create a string node id
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: Identifier::String(value.into()),
        }
    }

    /// Create a GUID node id
    pub fn guid(namespace_index: u16, value: Uuid) -> Self {
        Self {
            namespace_index,
            identifier: Identifier::Guid(value),
        }
    }

    /// Create an opaque (byte string) node id
    pub fn byte_string(namespace_index: u16, value: impl Into<Vec<u8>>) -> Self {
        Self {
            namespace_index,
            identifier: Identifier::ByteString(value.into()),
        }
    }

    /// Numeric node id in namespace 0
    pub fn ns0(value: u32) -> Self {
        Self::numeric(0, value)
    }

    /// The null node id (`i=0`)
    ///
    /// Passed as a requested id it asks for an automatically assigned id,
    /// returned from a lookup it means "absent".
    pub fn null() -> Self {
        Self::numeric(0, 0)
    }

    /// Check if this is the null node id
    pub fn is_null(&self) -> bool {
        if self.namespace_index != 0 {
            return false;
        }
        match &self.identifier {
            Identifier::Numeric(v) => *v == 0,
            Identifier::String(v) => v.is_empty(),
            Identifier::Guid(v) => v.is_nil(),
            Identifier::ByteString(v) => v.is_empty(),
        }
    }

    /// Check if the identifier asks for automatic assignment
    ///
    /// This is the case for numeric identifier 0 in any namespace, so that
    /// `ns=2;i=0` requests an id in namespace 2.
    pub fn is_auto_assign(&self) -> bool {
        matches!(self.identifier, Identifier::Numeric(0))
    }

    /// Numeric identifier, if this is a numeric node id
    pub fn as_numeric(&self) -> Option<u32> {
        match self.identifier {
            Identifier::Numeric(v) => Some(v),
            _ => None,
        }
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_index == 0 {
            write!(f, "{}", self.identifier)
        } else {
            write!(f, "ns={};{}", self.namespace_index, self.identifier)
        }
    }
}

impl FromStr for NodeId {
    type Err = UaError;

    /// Parse `ns=2;i=1001`, `s=Name`, `ns=1;g=<uuid>` or `b=<hex>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pattern = NODE_ID_PATTERN
            .as_ref()
            .ok_or_else(|| UaError::InvalidData("NodeId pattern unavailable".to_string()))?;
        let caps = pattern
            .captures(s.trim())
            .ok_or_else(|| UaError::InvalidData(format!("Invalid NodeId: {}", s)))?;

        let namespace_index = match caps.get(1) {
            Some(ns) => ns
                .as_str()
                .parse::<u16>()
                .map_err(|_| UaError::InvalidData(format!("Invalid namespace index: {}", s)))?,
            None => 0,
        };
        let value = caps.get(3).map(|m| m.as_str()).unwrap_or_default();

        let identifier = match caps.get(2).map(|m| m.as_str()) {
            Some("i") => Identifier::Numeric(
                value
                    .parse()
                    .map_err(|_| UaError::InvalidData(format!("Invalid numeric identifier: {}", s)))?,
            ),
            Some("s") => Identifier::String(value.to_string()),
            Some("g") => Identifier::Guid(
                Uuid::parse_str(value)
                    .map_err(|e| UaError::InvalidData(format!("Invalid GUID {}: {}", value, e)))?,
            ),
            Some("b") => Identifier::ByteString(decode_hex(value)?),
            _ => return Err(UaError::InvalidData(format!("Invalid NodeId: {}", s))),
        };

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

fn decode_hex(s: &str) -> UaResult<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(UaError::InvalidData(format!("Odd length hex string: {}", s)));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            s.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| UaError::InvalidData(format!("Invalid hex string: {}", s)))
        })
        .collect()
}

impl From<u32> for NodeId {
    fn from(value: u32) -> Self {
        NodeId::ns0(value)
    }
}

impl From<(u16, u32)> for NodeId {
    fn from((ns, value): (u16, u32)) -> Self {
        NodeId::numeric(ns, value)
    }
}

impl From<(u16, &str)> for NodeId {
    fn from((ns, value): (u16, &str)) -> Self {
        NodeId::string(ns, value)
    }
}

/// Node id that may point into another server or namespace table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpandedNodeId {
    pub node_id: NodeId,
    pub namespace_uri: Option<String>,
    pub server_index: u32,
}

impl ExpandedNodeId {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            namespace_uri: None,
            server_index: 0,
        }
    }

    /// Check if the target lives in the local address space
    pub fn is_local(&self) -> bool {
        self.server_index == 0 && self.namespace_uri.is_none()
    }
}

impl From<NodeId> for ExpandedNodeId {
    fn from(node_id: NodeId) -> Self {
        ExpandedNodeId::new(node_id)
    }
}

impl From<&NodeId> for ExpandedNodeId {
    fn from(node_id: &NodeId) -> Self {
        ExpandedNodeId::new(node_id.clone())
    }
}

impl fmt::Display for ExpandedNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.server_index != 0 {
            write!(f, "svr={};", self.server_index)?;
        }
        if let Some(uri) = &self.namespace_uri {
            write!(f, "nsu={};{}", uri, self.node_id.identifier)
        } else {
            write!(f, "{}", self.node_id)
        }
    }
}
