//! Address space
//!
//! The address space owns every node of a server together with the
//! reference edge list between them. It is a plain data structure: the
//! server wraps it in its lock, runs the lifecycle hooks around node
//! creation and deletion, and consults access control before calling in.

pub mod browse;
pub mod node;
mod ns0;
pub mod reference;

use crate::context::NodeContext;
use node::{AddNodesItem, Node, NodeAttributes, NodeBody};
use opcua_core::ids::{self, data_types};
use opcua_core::{
    AttributeId, ExpandedNodeId, NodeClass, NodeId, QualifiedName, StatusCode, UaResult, Variant,
};
use reference::{Reference, ReferenceTable};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub use browse::{
    BrowseDescription, BrowseDirection, BrowsePath, BrowsePathResult, BrowsePathTarget,
    BrowseResult, NodeIdMap, NodeTree, ReferenceDescription, TreeNode,
};

/// URI of namespace 0
pub const OPC_UA_NAMESPACE_URI: &str = "http://opcfoundation.org/UA/";

/// First numeric identifier handed out by automatic assignment
const FIRST_AUTO_ID: u32 = 50_000;

/// Graph of nodes and references owned by one server
#[derive(Debug)]
pub struct AddressSpace {
    nodes: HashMap<NodeId, Node>,
    references: ReferenceTable,
    namespaces: Vec<String>,
    next_numeric: HashMap<u16, u32>,
}

impl AddressSpace {
    /// Create an address space holding the namespace 0 bootstrap nodes
    ///
    /// `application_uri` becomes namespace 1.
    pub fn new(application_uri: &str) -> Self {
        let mut space = Self {
            nodes: HashMap::new(),
            references: ReferenceTable::default(),
            namespaces: vec![OPC_UA_NAMESPACE_URI.to_string(), application_uri.to_string()],
            next_numeric: HashMap::new(),
        };
        ns0::populate(&mut space);
        space
    }

    pub fn namespaces(&self) -> &[String] {
        &self.namespaces
    }

    /// Index of a namespace URI, appending it if it is new
    pub fn add_namespace(&mut self, uri: &str) -> u16 {
        if let Some(index) = self.namespace_index(uri) {
            return index;
        }
        self.namespaces.push(uri.to_string());
        (self.namespaces.len() - 1) as u16
    }

    pub fn namespace_index(&self, uri: &str) -> Option<u16> {
        self.namespaces
            .iter()
            .position(|ns| ns == uri)
            .map(|index| index as u16)
    }

    /// Replace the URI of namespace 1 (the application namespace)
    pub(crate) fn set_application_uri(&mut self, uri: &str) {
        if let Some(ns) = self.namespaces.get_mut(1) {
            *ns = uri.to_string();
        }
    }

    pub fn node(&self, node_id: &NodeId) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    pub(crate) fn node_mut(&mut self, node_id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(node_id)
    }

    pub(crate) fn find(&self, node_id: &NodeId) -> UaResult<&Node> {
        self.nodes
            .get(node_id)
            .ok_or_else(|| StatusCode::BAD_NODE_ID_UNKNOWN.into())
    }

    pub(crate) fn find_mut(&mut self, node_id: &NodeId) -> UaResult<&mut Node> {
        self.nodes
            .get_mut(node_id)
            .ok_or_else(|| StatusCode::BAD_NODE_ID_UNKNOWN.into())
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.nodes.contains_key(node_id)
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// References held by `node_id`, both directions
    pub fn references(&self, node_id: &NodeId) -> Vec<Reference> {
        self.references
            .entries(node_id)
            .iter()
            .map(|e| Reference {
                source: node_id.clone(),
                reference_type: e.reference_type.clone(),
                target: e.target.clone(),
                is_forward: e.is_forward,
            })
            .collect()
    }

    /// Every edge entry of the graph
    pub fn all_references(&self) -> Vec<Reference> {
        self.references.all()
    }

    /// Check if `sub_type` equals `super_type` or derives from it via HasSubtype
    pub fn is_subtype_of(&self, sub_type: &NodeId, super_type: &NodeId) -> bool {
        let has_subtype = ids::has_subtype();
        let mut visited = HashSet::new();
        let mut current = sub_type.clone();
        loop {
            if &current == super_type {
                return true;
            }
            if !visited.insert(current.clone()) {
                return false;
            }
            let parent = self
                .references
                .entries(&current)
                .iter()
                .find(|e| !e.is_forward && e.reference_type == has_subtype && e.target.is_local())
                .map(|e| e.target.node_id.clone());
            match parent {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Check if a reference type is HierarchicalReferences or one of its subtypes
    pub fn is_hierarchical(&self, reference_type: &NodeId) -> bool {
        self.is_subtype_of(reference_type, &ids::hierarchical_references())
    }

    fn is_reference_type(&self, node_id: &NodeId) -> bool {
        self.node(node_id)
            .is_some_and(|n| n.node_class() == NodeClass::ReferenceType)
    }

    /// Type definition target of an instance node
    pub fn type_definition(&self, node_id: &NodeId) -> Option<NodeId> {
        let has_type_definition = ids::has_type_definition();
        self.references
            .entries(node_id)
            .iter()
            .find(|e| e.is_forward && e.reference_type == has_type_definition)
            .map(|e| e.target.node_id.clone())
    }

    /// Check if a value may be stored in a variable of the given DataType and rank
    pub fn value_matches(&self, value: &Variant, data_type: &NodeId, value_rank: i32) -> bool {
        let Some(actual) = value.data_type() else {
            return true;
        };
        let rank_ok = match value_rank {
            -1 => !value.is_array(),
            r if r >= 1 => value.is_array(),
            _ => true,
        };
        rank_ok && self.is_subtype_of(&actual, data_type)
    }

    /// Pick the node id for a new node
    fn assign_node_id(&mut self, requested: &NodeId, fallback_ns: u16) -> UaResult<NodeId> {
        if !requested.is_auto_assign() {
            if usize::from(requested.namespace_index) >= self.namespaces.len() {
                return Err(StatusCode::BAD_NODE_ID_REJECTED.into());
            }
            if self.nodes.contains_key(requested) {
                return Err(StatusCode::BAD_NODE_ID_EXISTS.into());
            }
            return Ok(requested.clone());
        }

        let ns = match (requested.namespace_index, fallback_ns) {
            (0, 0) => 1,
            (0, ns) => ns,
            (ns, _) => ns,
        };
        if usize::from(ns) >= self.namespaces.len() {
            return Err(StatusCode::BAD_NODE_ID_REJECTED.into());
        }
        let counter = self.next_numeric.entry(ns).or_insert(FIRST_AUTO_ID);
        loop {
            let candidate = NodeId::numeric(ns, *counter);
            *counter = counter.wrapping_add(1).max(FIRST_AUTO_ID);
            if !self.nodes.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
    }

    fn check_type_definition(&self, class: NodeClass, type_definition: &NodeId) -> UaResult<NodeId> {
        let (default, expected) = match class {
            NodeClass::Object => (ids::base_object_type(), NodeClass::ObjectType),
            NodeClass::Variable => (ids::base_data_variable_type(), NodeClass::VariableType),
            _ => return Ok(NodeId::null()),
        };
        let type_definition = if type_definition.is_null() {
            default
        } else {
            type_definition.clone()
        };
        match self.node(&type_definition) {
            Some(node) if node.node_class() == expected => Ok(type_definition),
            _ => Err(StatusCode::BAD_TYPE_DEFINITION_INVALID.into()),
        }
    }

    fn check_initial_value(&self, attributes: &NodeAttributes) -> UaResult<()> {
        if let NodeAttributes::Variable(a) = attributes {
            if !self.value_matches(&a.value, &a.data_type, a.value_rank) {
                return Err(StatusCode::BAD_TYPE_MISMATCH.into());
            }
        }
        Ok(())
    }

    /// Create a node below a parent
    ///
    /// # Errors
    /// - `BadBrowseNameInvalid` for an empty browse name
    /// - `BadNodeIdExists` / `BadNodeIdRejected` for an unusable requested id
    /// - `BadParentNodeIdInvalid` if the parent does not exist
    /// - `BadReferenceTypeIdInvalid` if the reference type is not a ReferenceType node
    /// - `BadTypeDefinitionInvalid` for a missing or wrong type definition
    /// - `BadTypeMismatch` if the initial value does not fit the DataType
    pub fn add_node(&mut self, item: AddNodesItem) -> UaResult<NodeId> {
        if item.browse_name.is_empty() {
            return Err(StatusCode::BAD_BROWSE_NAME_INVALID.into());
        }
        if !item.requested_new_node_id.is_auto_assign() && self.contains(&item.requested_new_node_id) {
            return Err(StatusCode::BAD_NODE_ID_EXISTS.into());
        }
        if !self.contains(&item.parent_node_id) {
            return Err(StatusCode::BAD_PARENT_NODE_ID_INVALID.into());
        }
        if !self.is_reference_type(&item.reference_type_id) {
            return Err(StatusCode::BAD_REFERENCE_TYPE_ID_INVALID.into());
        }
        let class = item.node_attributes.node_class();
        let type_definition = self.check_type_definition(class, &item.type_definition)?;
        self.check_initial_value(&item.node_attributes)?;

        let node_id =
            self.assign_node_id(&item.requested_new_node_id, item.browse_name.namespace_index)?;
        self.nodes.insert(
            node_id.clone(),
            Node::new(node_id.clone(), item.browse_name, item.node_attributes),
        );
        self.link(&item.parent_node_id, &item.reference_type_id, &node_id);
        if !type_definition.is_null() {
            self.link(&node_id, &ids::has_type_definition(), &type_definition);
        }
        Ok(node_id)
    }

    /// Create a node that has no parent, such as a transient event node
    pub(crate) fn add_detached_node(
        &mut self,
        requested: &NodeId,
        browse_name: QualifiedName,
        attributes: NodeAttributes,
        type_definition: &NodeId,
    ) -> UaResult<NodeId> {
        if browse_name.is_empty() {
            return Err(StatusCode::BAD_BROWSE_NAME_INVALID.into());
        }
        let type_definition = self.check_type_definition(attributes.node_class(), type_definition)?;
        self.check_initial_value(&attributes)?;
        let node_id = self.assign_node_id(requested, browse_name.namespace_index)?;
        self.nodes.insert(
            node_id.clone(),
            Node::new(node_id.clone(), browse_name, attributes),
        );
        if !type_definition.is_null() {
            self.link(&node_id, &ids::has_type_definition(), &type_definition);
        }
        Ok(node_id)
    }

    /// Insert a node without any validation (namespace 0 bootstrap)
    pub(crate) fn insert_node(&mut self, node: Node) {
        self.nodes.insert(node.node_id.clone(), node);
    }

    /// Add a forward edge and its inverse mirror between two local nodes
    pub(crate) fn link(&mut self, source: &NodeId, reference_type: &NodeId, target: &NodeId) {
        self.references
            .insert(source, reference_type, &ExpandedNodeId::from(target), true);
        self.references
            .insert(target, reference_type, &ExpandedNodeId::from(source), false);
    }

    /// Remove a node
    ///
    /// The node's own edge entries always go with it. With
    /// `delete_references` the mirrored entries held by other nodes are
    /// removed as well, so no edge names the node afterwards. Hierarchical
    /// children are not deleted.
    pub fn delete_node(&mut self, node_id: &NodeId, delete_references: bool) -> UaResult<Node> {
        let node = self
            .nodes
            .remove(node_id)
            .ok_or(StatusCode::BAD_NODE_ID_UNKNOWN)?;
        self.references.remove_source(node_id);
        if delete_references {
            self.references.remove_targeting(node_id);
        }
        Ok(node)
    }

    /// Add a reference between two nodes
    ///
    /// For a local target the inverse entry is recorded on the target too.
    pub fn add_reference(
        &mut self,
        source: &NodeId,
        reference_type: &NodeId,
        target: &ExpandedNodeId,
        is_forward: bool,
    ) -> UaResult<()> {
        if !self.contains(source) {
            return Err(StatusCode::BAD_SOURCE_NODE_ID_INVALID.into());
        }
        if !self.is_reference_type(reference_type) {
            return Err(StatusCode::BAD_REFERENCE_TYPE_ID_INVALID.into());
        }
        if target.is_local() && !self.contains(&target.node_id) {
            return Err(StatusCode::BAD_TARGET_NODE_ID_INVALID.into());
        }
        if !self.references.insert(source, reference_type, target, is_forward) {
            return Err(StatusCode::BAD_DUPLICATE_REFERENCE_NOT_ALLOWED.into());
        }
        if target.is_local() {
            self.references.insert(
                &target.node_id,
                reference_type,
                &ExpandedNodeId::from(source),
                !is_forward,
            );
        }
        Ok(())
    }

    /// Delete a reference, and with `delete_bidirectional` its mirror entry
    pub fn delete_reference(
        &mut self,
        source: &NodeId,
        reference_type: &NodeId,
        is_forward: bool,
        target: &ExpandedNodeId,
        delete_bidirectional: bool,
    ) -> UaResult<()> {
        if !self.contains(source) {
            return Err(StatusCode::BAD_SOURCE_NODE_ID_INVALID.into());
        }
        if !self.references.remove(source, reference_type, target, is_forward) {
            return Err(StatusCode::BAD_NOT_FOUND.into());
        }
        if delete_bidirectional && target.is_local() {
            self.references.remove(
                &target.node_id,
                reference_type,
                &ExpandedNodeId::from(source),
                !is_forward,
            );
        }
        Ok(())
    }

    /// Read one attribute of a node
    pub fn read_attribute(&self, node_id: &NodeId, attribute: AttributeId) -> UaResult<Variant> {
        self.find(node_id)?.attribute(attribute)
    }

    /// Check that `value` fits the DataType and ValueRank of a variable
    ///
    /// # Errors
    /// - `BadAttributeIdInvalid` if the node has no Value attribute
    /// - `BadTypeMismatch` if the value does not fit
    pub(crate) fn check_value(&self, node_id: &NodeId, value: &Variant) -> UaResult<()> {
        let fits = match self.find(node_id)?.body() {
            NodeBody::Variable {
                data_type,
                value_rank,
                ..
            }
            | NodeBody::VariableType {
                data_type,
                value_rank,
                ..
            } => self.value_matches(value, data_type, *value_rank),
            _ => return Err(StatusCode::BAD_ATTRIBUTE_ID_INVALID.into()),
        };
        if fits {
            Ok(())
        } else {
            Err(StatusCode::BAD_TYPE_MISMATCH.into())
        }
    }

    /// Write one attribute of a node
    ///
    /// Value writes must fit the node's DataType and ValueRank.
    pub fn write_attribute(
        &mut self,
        node_id: &NodeId,
        attribute: AttributeId,
        value: Variant,
    ) -> UaResult<()> {
        if attribute == AttributeId::Value {
            self.check_value(node_id, &value)?;
        }
        if attribute == AttributeId::DataType {
            let data_type = value.as_node_id().map_err(|_| StatusCode::BAD_TYPE_MISMATCH)?;
            let is_data_type = self
                .node(data_type)
                .is_some_and(|n| n.node_class() == NodeClass::DataType);
            if !is_data_type {
                return Err(StatusCode::BAD_TYPE_MISMATCH.into());
            }
        }
        self.find_mut(node_id)?.set_attribute(attribute, value)
    }

    pub fn node_context(&self, node_id: &NodeId) -> UaResult<Option<Arc<dyn NodeContext>>> {
        Ok(self.find(node_id)?.context.clone())
    }

    pub fn set_node_context(
        &mut self,
        node_id: &NodeId,
        context: Option<Arc<dyn NodeContext>>,
    ) -> UaResult<()> {
        self.find_mut(node_id)?.context = context;
        Ok(())
    }

    /// Check if a DataType id names one of the built-in numeric types
    pub fn is_numeric_type(&self, data_type: &NodeId) -> bool {
        self.is_subtype_of(data_type, &NodeId::ns0(data_types::NUMBER))
    }

    /// Check if `object_id` references `method_id` with a hierarchical reference
    pub fn has_component(&self, object_id: &NodeId, method_id: &NodeId) -> bool {
        let target = ExpandedNodeId::from(method_id);
        self.references.entries(object_id).iter().any(|e| {
            e.is_forward && e.target == target && self.is_hierarchical(&e.reference_type)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::node::{ObjectAttributes, VariableAttributes};
    use super::*;
    use opcua_core::ids::objects;

    fn folder_item(parent: NodeId, name: &str) -> AddNodesItem {
        AddNodesItem {
            parent_node_id: parent,
            reference_type_id: ids::organizes(),
            requested_new_node_id: NodeId::null(),
            browse_name: QualifiedName::new(1, name),
            node_attributes: NodeAttributes::Object(ObjectAttributes::default()),
            type_definition: ids::folder_type(),
        }
    }

    #[test]
    fn test_bootstrap() {
        let space = AddressSpace::new("urn:test");
        assert!(space.contains(&ids::objects_folder()));
        assert!(space.contains(&ids::server()));
        assert_eq!(space.namespaces().len(), 2);
        assert!(space.is_hierarchical(&ids::has_ordered_component()));
        assert!(space.is_hierarchical(&ids::organizes()));
        assert!(!space.is_hierarchical(&ids::has_type_definition()));
        assert!(space.is_subtype_of(&NodeId::ns0(data_types::INT32), &NodeId::ns0(data_types::NUMBER)));
        assert!(space.is_numeric_type(&NodeId::ns0(data_types::DOUBLE)));
    }

    #[test]
    fn test_add_node_auto_assign() {
        let mut space = AddressSpace::new("urn:test");
        let a = space.add_node(folder_item(ids::objects_folder(), "A")).unwrap();
        let b = space.add_node(folder_item(ids::objects_folder(), "B")).unwrap();
        assert_eq!(a, NodeId::numeric(1, 50_000));
        assert_eq!(b, NodeId::numeric(1, 50_001));
        assert_eq!(space.type_definition(&a), Some(ids::folder_type()));
    }

    #[test]
    fn test_add_node_validation() {
        let mut space = AddressSpace::new("urn:test");

        let mut item = folder_item(NodeId::numeric(1, 9), "A");
        assert_eq!(
            space.add_node(item.clone()).unwrap_err().status_code(),
            StatusCode::BAD_PARENT_NODE_ID_INVALID
        );

        item.parent_node_id = ids::objects_folder();
        item.browse_name = QualifiedName::new(1, "");
        assert_eq!(
            space.add_node(item.clone()).unwrap_err().status_code(),
            StatusCode::BAD_BROWSE_NAME_INVALID
        );

        item.browse_name = QualifiedName::new(1, "A");
        item.requested_new_node_id = ids::server();
        assert_eq!(
            space.add_node(item.clone()).unwrap_err().status_code(),
            StatusCode::BAD_NODE_ID_EXISTS
        );

        item.requested_new_node_id = NodeId::null();
        item.reference_type_id = ids::objects_folder();
        assert_eq!(
            space.add_node(item.clone()).unwrap_err().status_code(),
            StatusCode::BAD_REFERENCE_TYPE_ID_INVALID
        );

        item.reference_type_id = ids::organizes();
        item.type_definition = ids::base_data_variable_type();
        assert_eq!(
            space.add_node(item).unwrap_err().status_code(),
            StatusCode::BAD_TYPE_DEFINITION_INVALID
        );
    }

    #[test]
    fn test_value_type_checks() {
        let mut space = AddressSpace::new("urn:test");
        let id = space
            .add_node(AddNodesItem {
                parent_node_id: ids::objects_folder(),
                reference_type_id: ids::has_component(),
                requested_new_node_id: NodeId::string(1, "Level"),
                browse_name: QualifiedName::new(1, "Level"),
                node_attributes: NodeAttributes::Variable(VariableAttributes::for_value(1.5f64)),
                type_definition: NodeId::null(),
            })
            .unwrap();

        space
            .write_attribute(&id, AttributeId::Value, Variant::from(2.5f64))
            .unwrap();
        let err = space
            .write_attribute(&id, AttributeId::Value, Variant::from("high"))
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_TYPE_MISMATCH);
        space
            .write_attribute(&id, AttributeId::Value, Variant::Empty)
            .unwrap();
    }

    #[test]
    fn test_references() {
        let mut space = AddressSpace::new("urn:test");
        let a = space.add_node(folder_item(ids::objects_folder(), "A")).unwrap();
        let b = space.add_node(folder_item(ids::objects_folder(), "B")).unwrap();
        let target = ExpandedNodeId::from(&b);

        space.add_reference(&a, &ids::organizes(), &target, true).unwrap();
        assert_eq!(
            space
                .add_reference(&a, &ids::organizes(), &target, true)
                .unwrap_err()
                .status_code(),
            StatusCode::BAD_DUPLICATE_REFERENCE_NOT_ALLOWED
        );
        assert!(space
            .references(&b)
            .iter()
            .any(|r| !r.is_forward && r.target.node_id == a));

        space
            .delete_reference(&a, &ids::organizes(), true, &target, true)
            .unwrap();
        assert!(!space.references(&b).iter().any(|r| r.target.node_id == a));
        assert_eq!(
            space
                .delete_reference(&a, &ids::organizes(), true, &target, true)
                .unwrap_err()
                .status_code(),
            StatusCode::BAD_NOT_FOUND
        );
    }

    #[test]
    fn test_delete_node_removes_all_edges() {
        let mut space = AddressSpace::new("urn:test");
        let a = space.add_node(folder_item(ids::objects_folder(), "A")).unwrap();
        space.delete_node(&a, true).unwrap();
        assert!(!space.contains(&a));
        let target = ExpandedNodeId::from(&a);
        assert!(space
            .all_references()
            .iter()
            .all(|r| r.source != a && r.target != target));
        assert!(space.contains(&NodeId::ns0(objects::OBJECTS_FOLDER)));
    }

    #[test]
    fn test_add_namespace() {
        let mut space = AddressSpace::new("urn:test");
        assert_eq!(space.add_namespace("urn:other"), 2);
        assert_eq!(space.add_namespace("urn:other"), 2);
        assert_eq!(space.namespace_index("urn:test"), Some(1));
    }
}
