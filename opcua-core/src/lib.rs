//! Core types and utilities for the OPC UA address space
//!
//! This crate provides the identity model (node ids, names, variants),
//! status codes, the attribute catalogue and error handling used
//! throughout the workspace.

pub mod attribute;
pub mod data_value;
pub mod discovery;
pub mod error;
pub mod ids;
pub mod node_class;
pub mod node_id;
pub mod qualified_name;
pub mod status_code;
pub mod variant;

pub use attribute::{access_level, write_mask, AttributeId};
pub use data_value::DataValue;
pub use discovery::{ApplicationType, RegisteredServer};
pub use error::{status_to_result, UaError, UaResult};
pub use node_class::NodeClass;
pub use node_id::{ExpandedNodeId, Identifier, NodeId};
pub use qualified_name::{LocalizedText, QualifiedName};
pub use status_code::StatusCode;
pub use variant::{Variant, VariantArray, VariantType, VariantValue};
