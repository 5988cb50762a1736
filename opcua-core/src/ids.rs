//! Well-known namespace 0 node ids

use crate::node_id::NodeId;

/// Objects, folders and other instance nodes
pub mod objects {
    pub const ROOT_FOLDER: u32 = 84;
    pub const OBJECTS_FOLDER: u32 = 85;
    pub const TYPES_FOLDER: u32 = 86;
    pub const VIEWS_FOLDER: u32 = 87;
    pub const OBJECT_TYPES_FOLDER: u32 = 88;
    pub const VARIABLE_TYPES_FOLDER: u32 = 89;
    pub const DATA_TYPES_FOLDER: u32 = 90;
    pub const REFERENCE_TYPES_FOLDER: u32 = 91;
    pub const MODELLING_RULE_MANDATORY: u32 = 78;
    pub const SERVER: u32 = 2253;
}

/// Reference types
pub mod reference_types {
    pub const REFERENCES: u32 = 31;
    pub const NON_HIERARCHICAL_REFERENCES: u32 = 32;
    pub const HIERARCHICAL_REFERENCES: u32 = 33;
    pub const HAS_CHILD: u32 = 34;
    pub const ORGANIZES: u32 = 35;
    pub const HAS_EVENT_SOURCE: u32 = 36;
    pub const HAS_MODELLING_RULE: u32 = 37;
    pub const HAS_TYPE_DEFINITION: u32 = 40;
    pub const AGGREGATES: u32 = 44;
    pub const HAS_SUBTYPE: u32 = 45;
    pub const HAS_PROPERTY: u32 = 46;
    pub const HAS_COMPONENT: u32 = 47;
    pub const HAS_NOTIFIER: u32 = 48;
    pub const HAS_ORDERED_COMPONENT: u32 = 49;
}

/// Object and variable types
pub mod types {
    pub const BASE_OBJECT_TYPE: u32 = 58;
    pub const FOLDER_TYPE: u32 = 61;
    pub const BASE_VARIABLE_TYPE: u32 = 62;
    pub const BASE_DATA_VARIABLE_TYPE: u32 = 63;
    pub const PROPERTY_TYPE: u32 = 68;
    pub const BASE_EVENT_TYPE: u32 = 2041;
}

/// Data types
pub mod data_types {
    pub const BOOLEAN: u32 = 1;
    pub const SBYTE: u32 = 2;
    pub const BYTE: u32 = 3;
    pub const INT16: u32 = 4;
    pub const UINT16: u32 = 5;
    pub const INT32: u32 = 6;
    pub const UINT32: u32 = 7;
    pub const INT64: u32 = 8;
    pub const UINT64: u32 = 9;
    pub const FLOAT: u32 = 10;
    pub const DOUBLE: u32 = 11;
    pub const STRING: u32 = 12;
    pub const DATE_TIME: u32 = 13;
    pub const GUID: u32 = 14;
    pub const BYTE_STRING: u32 = 15;
    pub const NODE_ID: u32 = 17;
    pub const STATUS_CODE: u32 = 19;
    pub const QUALIFIED_NAME: u32 = 20;
    pub const LOCALIZED_TEXT: u32 = 21;
    pub const BASE_DATA_TYPE: u32 = 24;
    pub const NUMBER: u32 = 26;
    pub const INTEGER: u32 = 27;
    pub const UINTEGER: u32 = 28;
}

pub fn root_folder() -> NodeId {
    NodeId::ns0(objects::ROOT_FOLDER)
}

pub fn objects_folder() -> NodeId {
    NodeId::ns0(objects::OBJECTS_FOLDER)
}

pub fn server() -> NodeId {
    NodeId::ns0(objects::SERVER)
}

pub fn organizes() -> NodeId {
    NodeId::ns0(reference_types::ORGANIZES)
}

pub fn has_component() -> NodeId {
    NodeId::ns0(reference_types::HAS_COMPONENT)
}

pub fn has_ordered_component() -> NodeId {
    NodeId::ns0(reference_types::HAS_ORDERED_COMPONENT)
}

pub fn has_property() -> NodeId {
    NodeId::ns0(reference_types::HAS_PROPERTY)
}

pub fn has_subtype() -> NodeId {
    NodeId::ns0(reference_types::HAS_SUBTYPE)
}

pub fn has_type_definition() -> NodeId {
    NodeId::ns0(reference_types::HAS_TYPE_DEFINITION)
}

pub fn has_modelling_rule() -> NodeId {
    NodeId::ns0(reference_types::HAS_MODELLING_RULE)
}

pub fn hierarchical_references() -> NodeId {
    NodeId::ns0(reference_types::HIERARCHICAL_REFERENCES)
}

pub fn folder_type() -> NodeId {
    NodeId::ns0(types::FOLDER_TYPE)
}

pub fn base_object_type() -> NodeId {
    NodeId::ns0(types::BASE_OBJECT_TYPE)
}

pub fn base_data_variable_type() -> NodeId {
    NodeId::ns0(types::BASE_DATA_VARIABLE_TYPE)
}

pub fn property_type() -> NodeId {
    NodeId::ns0(types::PROPERTY_TYPE)
}

pub fn base_event_type() -> NodeId {
    NodeId::ns0(types::BASE_EVENT_TYPE)
}

pub fn modelling_rule_mandatory() -> NodeId {
    NodeId::ns0(objects::MODELLING_RULE_MANDATORY)
}

pub fn base_data_type() -> NodeId {
    NodeId::ns0(data_types::BASE_DATA_TYPE)
}
