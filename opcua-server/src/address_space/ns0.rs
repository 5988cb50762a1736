//! Namespace 0 bootstrap
//!
//! Only the subset of the standard namespace that the server itself
//! relies on is created: the folder skeleton, the Server object, the
//! reference type tree, the base object/variable types and the built-in
//! data type tree.

use super::node::{
    DataTypeAttributes, Node, NodeAttributes, ObjectAttributes, ObjectTypeAttributes,
    ReferenceTypeAttributes, VariableTypeAttributes,
};
use super::AddressSpace;
use opcua_core::ids::{self, data_types, objects, reference_types, types};
use opcua_core::{LocalizedText, NodeId, QualifiedName};

fn insert(space: &mut AddressSpace, id: u32, name: &str, attributes: NodeAttributes) -> NodeId {
    let node_id = NodeId::ns0(id);
    space.insert_node(Node::new(node_id.clone(), QualifiedName::new(0, name), attributes));
    node_id
}

fn folder(space: &mut AddressSpace, id: u32, name: &str, parent: Option<u32>) {
    let node_id = insert(space, id, name, NodeAttributes::Object(ObjectAttributes::default()));
    space.link(&node_id, &ids::has_type_definition(), &ids::folder_type());
    if let Some(parent) = parent {
        space.link(&NodeId::ns0(parent), &ids::organizes(), &node_id);
    }
}

fn subtype(space: &mut AddressSpace, parent: u32, child: u32) {
    space.link(&NodeId::ns0(parent), &ids::has_subtype(), &NodeId::ns0(child));
}

fn reference_type(
    space: &mut AddressSpace,
    id: u32,
    name: &str,
    inverse_name: Option<&str>,
    is_abstract: bool,
    symmetric: bool,
) {
    let attributes = ReferenceTypeAttributes {
        is_abstract,
        symmetric,
        inverse_name: inverse_name.map(LocalizedText::from),
        ..Default::default()
    };
    insert(space, id, name, NodeAttributes::ReferenceType(attributes));
}

fn object_type(space: &mut AddressSpace, id: u32, name: &str, is_abstract: bool) {
    let attributes = ObjectTypeAttributes {
        is_abstract,
        ..Default::default()
    };
    insert(space, id, name, NodeAttributes::ObjectType(attributes));
}

fn data_type(space: &mut AddressSpace, id: u32, name: &str, is_abstract: bool) {
    let attributes = DataTypeAttributes {
        is_abstract,
        ..Default::default()
    };
    insert(space, id, name, NodeAttributes::DataType(attributes));
}

pub(super) fn populate(space: &mut AddressSpace) {
    use reference_types::*;

    // reference types
    let refs: [(u32, &str, Option<&str>, bool, bool); 14] = [
        (REFERENCES, "References", None, true, true),
        (HIERARCHICAL_REFERENCES, "HierarchicalReferences", None, true, false),
        (NON_HIERARCHICAL_REFERENCES, "NonHierarchicalReferences", None, true, false),
        (HAS_CHILD, "HasChild", None, true, false),
        (ORGANIZES, "Organizes", Some("OrganizedBy"), false, false),
        (HAS_EVENT_SOURCE, "HasEventSource", Some("EventSourceOf"), false, false),
        (AGGREGATES, "Aggregates", None, true, false),
        (HAS_SUBTYPE, "HasSubtype", Some("SubtypeOf"), false, false),
        (HAS_COMPONENT, "HasComponent", Some("ComponentOf"), false, false),
        (HAS_PROPERTY, "HasProperty", Some("PropertyOf"), false, false),
        (HAS_ORDERED_COMPONENT, "HasOrderedComponent", Some("OrderedComponentOf"), false, false),
        (HAS_NOTIFIER, "HasNotifier", Some("NotifierOf"), false, false),
        (HAS_TYPE_DEFINITION, "HasTypeDefinition", Some("TypeDefinitionOf"), false, false),
        (HAS_MODELLING_RULE, "HasModellingRule", Some("ModellingRuleOf"), false, false),
    ];
    for (id, name, inverse, is_abstract, symmetric) in refs {
        reference_type(space, id, name, inverse, is_abstract, symmetric);
    }
    for (parent, child) in [
        (REFERENCES, HIERARCHICAL_REFERENCES),
        (REFERENCES, NON_HIERARCHICAL_REFERENCES),
        (HIERARCHICAL_REFERENCES, HAS_CHILD),
        (HIERARCHICAL_REFERENCES, ORGANIZES),
        (HIERARCHICAL_REFERENCES, HAS_EVENT_SOURCE),
        (HAS_CHILD, AGGREGATES),
        (HAS_CHILD, HAS_SUBTYPE),
        (AGGREGATES, HAS_COMPONENT),
        (AGGREGATES, HAS_PROPERTY),
        (HAS_COMPONENT, HAS_ORDERED_COMPONENT),
        (HAS_EVENT_SOURCE, HAS_NOTIFIER),
        (NON_HIERARCHICAL_REFERENCES, HAS_TYPE_DEFINITION),
        (NON_HIERARCHICAL_REFERENCES, HAS_MODELLING_RULE),
    ] {
        subtype(space, parent, child);
    }

    // object and variable types
    object_type(space, types::BASE_OBJECT_TYPE, "BaseObjectType", false);
    object_type(space, types::FOLDER_TYPE, "FolderType", false);
    object_type(space, types::BASE_EVENT_TYPE, "BaseEventType", true);
    subtype(space, types::BASE_OBJECT_TYPE, types::FOLDER_TYPE);
    subtype(space, types::BASE_OBJECT_TYPE, types::BASE_EVENT_TYPE);

    for (id, name, is_abstract) in [
        (types::BASE_VARIABLE_TYPE, "BaseVariableType", true),
        (types::BASE_DATA_VARIABLE_TYPE, "BaseDataVariableType", false),
        (types::PROPERTY_TYPE, "PropertyType", false),
    ] {
        let attributes = VariableTypeAttributes {
            is_abstract,
            ..Default::default()
        };
        insert(space, id, name, NodeAttributes::VariableType(attributes));
    }
    subtype(space, types::BASE_VARIABLE_TYPE, types::BASE_DATA_VARIABLE_TYPE);
    subtype(space, types::BASE_VARIABLE_TYPE, types::PROPERTY_TYPE);

    // data types
    let data: [(u32, &str, bool, u32); 22] = [
        (data_types::BASE_DATA_TYPE, "BaseDataType", true, 0),
        (data_types::BOOLEAN, "Boolean", false, data_types::BASE_DATA_TYPE),
        (data_types::NUMBER, "Number", true, data_types::BASE_DATA_TYPE),
        (data_types::STRING, "String", false, data_types::BASE_DATA_TYPE),
        (data_types::DATE_TIME, "DateTime", false, data_types::BASE_DATA_TYPE),
        (data_types::GUID, "Guid", false, data_types::BASE_DATA_TYPE),
        (data_types::BYTE_STRING, "ByteString", false, data_types::BASE_DATA_TYPE),
        (data_types::NODE_ID, "NodeId", false, data_types::BASE_DATA_TYPE),
        (data_types::STATUS_CODE, "StatusCode", false, data_types::BASE_DATA_TYPE),
        (data_types::QUALIFIED_NAME, "QualifiedName", false, data_types::BASE_DATA_TYPE),
        (data_types::LOCALIZED_TEXT, "LocalizedText", false, data_types::BASE_DATA_TYPE),
        (data_types::INTEGER, "Integer", true, data_types::NUMBER),
        (data_types::UINTEGER, "UInteger", true, data_types::NUMBER),
        (data_types::FLOAT, "Float", false, data_types::NUMBER),
        (data_types::DOUBLE, "Double", false, data_types::NUMBER),
        (data_types::SBYTE, "SByte", false, data_types::INTEGER),
        (data_types::INT16, "Int16", false, data_types::INTEGER),
        (data_types::INT32, "Int32", false, data_types::INTEGER),
        (data_types::INT64, "Int64", false, data_types::INTEGER),
        (data_types::BYTE, "Byte", false, data_types::UINTEGER),
        (data_types::UINT16, "UInt16", false, data_types::UINTEGER),
        (data_types::UINT32, "UInt32", false, data_types::UINTEGER),
    ];
    for (id, name, is_abstract, parent) in data {
        data_type(space, id, name, is_abstract);
        if parent != 0 {
            subtype(space, parent, id);
        }
    }
    data_type(space, data_types::UINT64, "UInt64", false);
    subtype(space, data_types::UINTEGER, data_types::UINT64);

    // folder skeleton
    folder(space, objects::ROOT_FOLDER, "Root", None);
    folder(space, objects::OBJECTS_FOLDER, "Objects", Some(objects::ROOT_FOLDER));
    folder(space, objects::TYPES_FOLDER, "Types", Some(objects::ROOT_FOLDER));
    folder(space, objects::VIEWS_FOLDER, "Views", Some(objects::ROOT_FOLDER));
    folder(space, objects::OBJECT_TYPES_FOLDER, "ObjectTypes", Some(objects::TYPES_FOLDER));
    folder(space, objects::VARIABLE_TYPES_FOLDER, "VariableTypes", Some(objects::TYPES_FOLDER));
    folder(space, objects::DATA_TYPES_FOLDER, "DataTypes", Some(objects::TYPES_FOLDER));
    folder(space, objects::REFERENCE_TYPES_FOLDER, "ReferenceTypes", Some(objects::TYPES_FOLDER));

    space.link(
        &NodeId::ns0(objects::OBJECT_TYPES_FOLDER),
        &ids::organizes(),
        &ids::base_object_type(),
    );
    space.link(
        &NodeId::ns0(objects::VARIABLE_TYPES_FOLDER),
        &ids::organizes(),
        &NodeId::ns0(types::BASE_VARIABLE_TYPE),
    );
    space.link(
        &NodeId::ns0(objects::DATA_TYPES_FOLDER),
        &ids::organizes(),
        &ids::base_data_type(),
    );
    space.link(
        &NodeId::ns0(objects::REFERENCE_TYPES_FOLDER),
        &ids::organizes(),
        &NodeId::ns0(REFERENCES),
    );

    // server object and modelling rule
    insert(
        space,
        objects::SERVER,
        "Server",
        NodeAttributes::Object(ObjectAttributes {
            event_notifier: 1,
            ..Default::default()
        }),
    );
    space.link(&ids::objects_folder(), &ids::organizes(), &ids::server());
    space.link(&ids::server(), &ids::has_type_definition(), &ids::base_object_type());

    insert(
        space,
        objects::MODELLING_RULE_MANDATORY,
        "Mandatory",
        NodeAttributes::Object(ObjectAttributes::default()),
    );
    space.link(
        &ids::modelling_rule_mandatory(),
        &ids::has_type_definition(),
        &ids::base_object_type(),
    );
}
