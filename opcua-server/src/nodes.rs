//! Node management on a server
//!
//! The local API acts as the administrator: it bypasses the access
//! control policy but runs the global lifecycle hooks for every node it
//! creates or deletes. Every call takes the address space lock once and
//! records its status for [`Server::last_error`].

use crate::access_control::SessionContext;
use crate::address_space::browse::{
    BrowseDescription, BrowsePath, BrowsePathResult, BrowseResult, NodeIdMap, NodeTree,
};
use crate::address_space::node::{
    AddNodesItem, DataTypeAttributes, NodeAttributes, ObjectAttributes, ObjectTypeAttributes,
    ReferenceTypeAttributes, VariableAttributes, VariableTypeAttributes, ViewAttributes,
};
use crate::address_space::reference::Reference;
use crate::address_space::AddressSpace;
use crate::context::{DataSource, LifecycleEvent, NodeContext};
use crate::server::Server;
use opcua_core::{
    access_level, ids, AttributeId, ExpandedNodeId, NodeClass, NodeId, QualifiedName, StatusCode,
    UaResult, Variant, VariantValue,
};
use std::sync::Arc;

impl Server {
    /// Namespace for a new node: explicit, else the parent's, never 0
    pub(crate) fn resolve_namespace(parent: &NodeId, ns: u16) -> u16 {
        match (ns, parent.namespace_index) {
            (0, 0) => 1,
            (0, inherited) => inherited,
            (explicit, _) => explicit,
        }
    }

    /// Insert a node and run the construction hook; the caller holds the lock
    ///
    /// A failing hook removes the node again.
    pub(crate) fn insert_node(
        &self,
        space: &mut AddressSpace,
        session: &SessionContext,
        item: AddNodesItem,
        context: Option<Arc<dyn NodeContext>>,
    ) -> UaResult<NodeId> {
        let node_id = space.add_node(item)?;
        let event = LifecycleEvent {
            server: self.handle(),
            session_id: session.session_id.clone(),
            node_id: node_id.clone(),
        };
        match self.runtime().node_lifecycle().construct(&event, context) {
            Ok(context) => {
                space.set_node_context(&node_id, context)?;
                log::debug!("Added node {}", node_id);
                Ok(node_id)
            }
            Err(e) => {
                if let Err(rollback) = space.delete_node(&node_id, true) {
                    log::warn!("Failed to roll back node {}: {}", node_id, rollback);
                }
                log::debug!("Construction of {} rejected: {}", node_id, e);
                Err(e)
            }
        }
    }

    /// Run the destruction hook and delete a node; the caller holds the lock
    pub(crate) fn remove_node(
        &self,
        space: &mut AddressSpace,
        session: &SessionContext,
        node_id: &NodeId,
        delete_references: bool,
    ) -> UaResult<()> {
        let context = space.node_context(node_id)?;
        let event = LifecycleEvent {
            server: self.handle(),
            session_id: session.session_id.clone(),
            node_id: node_id.clone(),
        };
        self.runtime().node_lifecycle().destruct(&event, context.as_ref());
        space.delete_node(node_id, delete_references)?;
        self.methods.lock().remove(node_id);
        self.data_sources.lock().remove(node_id);
        self.history.lock().remove_node(node_id);
        log::debug!("Deleted node {}", node_id);
        Ok(())
    }

    async fn add_item(
        &self,
        item: AddNodesItem,
        context: Option<Arc<dyn NodeContext>>,
    ) -> UaResult<NodeId> {
        let result = {
            let mut space = self.space.write().await;
            self.insert_node(&mut space, &SessionContext::admin(), item, context)
        };
        self.record(&result);
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn item(
        parent: &NodeId,
        reference_type: NodeId,
        requested: &NodeId,
        name: &str,
        ns: u16,
        attributes: NodeAttributes,
        type_definition: NodeId,
    ) -> AddNodesItem {
        AddNodesItem {
            parent_node_id: parent.clone(),
            reference_type_id: reference_type,
            requested_new_node_id: requested.clone(),
            browse_name: QualifiedName::new(Self::resolve_namespace(parent, ns), name),
            node_attributes: attributes,
            type_definition,
        }
    }

    /// Add a node from a fully specified request
    pub async fn add_node(
        &self,
        item: AddNodesItem,
        context: Option<Arc<dyn NodeContext>>,
    ) -> UaResult<NodeId> {
        self.add_item(item, context).await
    }

    /// Add a folder organized by `parent`
    ///
    /// # Arguments
    /// * `parent` - Parent node
    /// * `name` - Browse name and display name
    /// * `requested` - Requested id, null for automatic assignment
    /// * `ns` - Namespace index, 0 inherits the parent's
    pub async fn add_folder(
        &self,
        parent: &NodeId,
        name: &str,
        requested: &NodeId,
        ns: u16,
    ) -> UaResult<NodeId> {
        let item = Self::folder_item(parent, name, requested, ns);
        self.add_item(item, None).await
    }

    fn folder_item(parent: &NodeId, name: &str, requested: &NodeId, ns: u16) -> AddNodesItem {
        Self::item(
            parent,
            ids::organizes(),
            requested,
            name,
            ns,
            NodeAttributes::Object(ObjectAttributes::default()),
            ids::folder_type(),
        )
    }

    /// Add a readable and writable variable holding `value`
    pub async fn add_variable(
        &self,
        parent: &NodeId,
        name: &str,
        value: impl Into<Variant>,
        requested: &NodeId,
        context: Option<Arc<dyn NodeContext>>,
        ns: u16,
    ) -> UaResult<NodeId> {
        let attributes = VariableAttributes::for_value(value)
            .with_access_level(access_level::CURRENT_READ | access_level::CURRENT_WRITE);
        self.add_variable_with(parent, name, attributes, requested, context, ns)
            .await
    }

    /// Add a variable with explicit attributes
    pub async fn add_variable_with(
        &self,
        parent: &NodeId,
        name: &str,
        attributes: VariableAttributes,
        requested: &NodeId,
        context: Option<Arc<dyn NodeContext>>,
        ns: u16,
    ) -> UaResult<NodeId> {
        let item = Self::item(
            parent,
            ids::organizes(),
            requested,
            name,
            ns,
            NodeAttributes::Variable(attributes),
            ids::base_data_variable_type(),
        );
        self.add_item(item, context).await
    }

    /// Add a variable of type `T`, bound to the context registered as `context_name`
    ///
    /// # Errors
    /// `BadNotFound` if no context is registered under `context_name`
    pub async fn add_variable_as<T: VariantValue>(
        &self,
        parent: &NodeId,
        name: &str,
        requested: &NodeId,
        context_name: &str,
        ns: u16,
    ) -> UaResult<NodeId> {
        let Some(context) = self.runtime().find_context(context_name) else {
            self.last_error.set(StatusCode::BAD_NOT_FOUND);
            return Err(StatusCode::BAD_NOT_FOUND.into());
        };
        self.add_variable(parent, name, T::default(), requested, Some(context), ns)
            .await
    }

    /// Add a variable whose writes are kept in the history store
    pub async fn add_historical_variable(
        &self,
        parent: &NodeId,
        name: &str,
        value: impl Into<Variant>,
        requested: &NodeId,
        context: Option<Arc<dyn NodeContext>>,
        ns: u16,
    ) -> UaResult<NodeId> {
        let attributes = VariableAttributes::for_value(value)
            .with_access_level(
                access_level::CURRENT_READ
                    | access_level::CURRENT_WRITE
                    | access_level::HISTORY_READ
                    | access_level::HISTORY_WRITE,
            )
            .with_historizing(true);
        self.add_variable_with(parent, name, attributes, requested, context, ns)
            .await
    }

    /// Add a variable whose value lives in `source`
    ///
    /// Reads and writes of the Value attribute are served by the source.
    /// The value in `attributes` is never returned; its DataType and
    /// ValueRank still type-check writes before they reach the source.
    #[allow(clippy::too_many_arguments)]
    pub async fn add_data_source_variable(
        &self,
        parent: &NodeId,
        name: &str,
        attributes: VariableAttributes,
        requested: &NodeId,
        source: Arc<dyn DataSource>,
        context: Option<Arc<dyn NodeContext>>,
        ns: u16,
    ) -> UaResult<NodeId> {
        let item = Self::item(
            parent,
            ids::organizes(),
            requested,
            name,
            ns,
            NodeAttributes::Variable(attributes),
            ids::base_data_variable_type(),
        );
        let result = {
            let mut space = self.space.write().await;
            self.insert_node(&mut space, &SessionContext::admin(), item, context)
                .inspect(|node_id| {
                    self.data_sources.lock().insert(node_id.clone(), source);
                })
        };
        self.record(&result);
        result
    }

    /// Data source bound to a variable
    pub(crate) fn data_source(&self, node_id: &NodeId) -> Option<Arc<dyn DataSource>> {
        self.data_sources.lock().get(node_id).cloned()
    }

    /// Add a property (HasProperty, PropertyType) to `parent`
    pub async fn add_property(
        &self,
        parent: &NodeId,
        name: &str,
        value: impl Into<Variant>,
        requested: &NodeId,
        context: Option<Arc<dyn NodeContext>>,
        ns: u16,
    ) -> UaResult<NodeId> {
        let item = Self::item(
            parent,
            ids::has_property(),
            requested,
            name,
            ns,
            NodeAttributes::Variable(VariableAttributes::for_value(value)),
            ids::property_type(),
        );
        self.add_item(item, context).await
    }

    /// Add a BaseObjectType object organized by `parent`
    pub async fn add_object(
        &self,
        parent: &NodeId,
        name: &str,
        requested: &NodeId,
        context: Option<Arc<dyn NodeContext>>,
        ns: u16,
    ) -> UaResult<NodeId> {
        self.add_instance(name, requested, parent, &ids::base_object_type(), context, ns)
            .await
    }

    /// Add an object of type `type_id` organized by `parent`
    pub async fn add_instance(
        &self,
        name: &str,
        requested: &NodeId,
        parent: &NodeId,
        type_id: &NodeId,
        context: Option<Arc<dyn NodeContext>>,
        ns: u16,
    ) -> UaResult<NodeId> {
        let item = Self::item(
            parent,
            ids::organizes(),
            requested,
            name,
            ns,
            NodeAttributes::Object(ObjectAttributes::default()),
            type_id.clone(),
        );
        self.add_item(item, context).await
    }

    /// Add an ObjectType derived from `parent`
    pub async fn add_object_type(
        &self,
        parent: &NodeId,
        name: &str,
        requested: &NodeId,
        attributes: ObjectTypeAttributes,
        context: Option<Arc<dyn NodeContext>>,
        ns: u16,
    ) -> UaResult<NodeId> {
        let item = Self::item(
            parent,
            ids::has_subtype(),
            requested,
            name,
            ns,
            NodeAttributes::ObjectType(attributes),
            NodeId::null(),
        );
        self.add_item(item, context).await
    }

    /// Add a VariableType derived from `parent`
    pub async fn add_variable_type(
        &self,
        parent: &NodeId,
        name: &str,
        requested: &NodeId,
        attributes: VariableTypeAttributes,
        ns: u16,
    ) -> UaResult<NodeId> {
        let item = Self::item(
            parent,
            ids::has_subtype(),
            requested,
            name,
            ns,
            NodeAttributes::VariableType(attributes),
            NodeId::null(),
        );
        self.add_item(item, None).await
    }

    /// Add a ReferenceType derived from `parent`
    pub async fn add_reference_type(
        &self,
        parent: &NodeId,
        name: &str,
        requested: &NodeId,
        attributes: ReferenceTypeAttributes,
        ns: u16,
    ) -> UaResult<NodeId> {
        let item = Self::item(
            parent,
            ids::has_subtype(),
            requested,
            name,
            ns,
            NodeAttributes::ReferenceType(attributes),
            NodeId::null(),
        );
        self.add_item(item, None).await
    }

    /// Add a DataType derived from `parent`
    pub async fn add_data_type(
        &self,
        parent: &NodeId,
        name: &str,
        requested: &NodeId,
        attributes: DataTypeAttributes,
        ns: u16,
    ) -> UaResult<NodeId> {
        let item = Self::item(
            parent,
            ids::has_subtype(),
            requested,
            name,
            ns,
            NodeAttributes::DataType(attributes),
            NodeId::null(),
        );
        self.add_item(item, None).await
    }

    /// Add a View organized by `parent`
    pub async fn add_view(
        &self,
        parent: &NodeId,
        name: &str,
        requested: &NodeId,
        attributes: ViewAttributes,
        ns: u16,
    ) -> UaResult<NodeId> {
        let item = Self::item(
            parent,
            ids::organizes(),
            requested,
            name,
            ns,
            NodeAttributes::View(attributes),
            NodeId::null(),
        );
        self.add_item(item, None).await
    }

    pub async fn add_reference(
        &self,
        source: &NodeId,
        reference_type: &NodeId,
        target: &ExpandedNodeId,
        is_forward: bool,
    ) -> UaResult<()> {
        let result = self
            .space
            .write()
            .await
            .add_reference(source, reference_type, target, is_forward);
        self.record(&result);
        result
    }

    pub async fn delete_reference(
        &self,
        source: &NodeId,
        reference_type: &NodeId,
        is_forward: bool,
        target: &ExpandedNodeId,
        delete_bidirectional: bool,
    ) -> UaResult<()> {
        let result = self.space.write().await.delete_reference(
            source,
            reference_type,
            is_forward,
            target,
            delete_bidirectional,
        );
        self.record(&result);
        result
    }

    /// Delete one node
    ///
    /// Descendants are left alone; see [`Server::delete_tree`].
    pub async fn delete_node(&self, node_id: &NodeId, delete_references: bool) -> UaResult<()> {
        let result = {
            let mut space = self.space.write().await;
            self.remove_node(&mut space, &SessionContext::admin(), node_id, delete_references)
        };
        self.record(&result);
        result
    }

    /// Delete a node and its whole hierarchical subtree, leaves first
    pub async fn delete_tree(&self, node_id: &NodeId) -> UaResult<()> {
        let result = {
            let mut space = self.space.write().await;
            space.subtree_post_order(node_id).and_then(|order| {
                order.iter().try_for_each(|id| {
                    self.remove_node(&mut space, &SessionContext::admin(), id, true)
                })
            })
        };
        self.record(&result);
        result
    }

    /// Attach the Mandatory modelling rule to a node
    pub async fn mark_mandatory(&self, node_id: &NodeId) -> UaResult<()> {
        self.add_reference(
            node_id,
            &ids::has_modelling_rule(),
            &ExpandedNodeId::from(ids::modelling_rule_mandatory()),
            true,
        )
        .await
    }

    /// Walk `path` from `start`, creating missing folders
    ///
    /// Running it again with the same path returns the same leaf and adds
    /// nothing.
    pub async fn create_folder_path<S: AsRef<str>>(
        &self,
        start: &NodeId,
        path: &[S],
        ns: u16,
    ) -> UaResult<NodeId> {
        let result = {
            let mut space = self.space.write().await;
            self.folder_path_locked(&mut space, start, path, ns)
        };
        self.record(&result);
        result
    }

    fn folder_path_locked<S: AsRef<str>>(
        &self,
        space: &mut AddressSpace,
        start: &NodeId,
        path: &[S],
        ns: u16,
    ) -> UaResult<NodeId> {
        space.find(start)?;
        let mut current = start.clone();
        for segment in path {
            let segment = segment.as_ref();
            current = match space.get_child(&current, segment) {
                Ok(child) => child,
                Err(_) => {
                    let item = Self::folder_item(&current, segment, &NodeId::null(), ns);
                    self.insert_node(space, &SessionContext::admin(), item, None)?
                }
            };
        }
        Ok(current)
    }

    /// Materialize a dotted path below `parent` with a variable at the leaf
    ///
    /// Intermediate segments become folders. An existing leaf variable gets
    /// `value` written, otherwise a new variable is created.
    pub async fn create_browse_path(
        &self,
        parent: &NodeId,
        dotted_path: &str,
        value: impl Into<Variant>,
        ns: u16,
    ) -> UaResult<NodeId> {
        let value = value.into();
        let result = {
            let mut space = self.space.write().await;
            self.browse_path_locked(&mut space, parent, dotted_path, value, ns)
        };
        self.record(&result);
        result
    }

    fn browse_path_locked(
        &self,
        space: &mut AddressSpace,
        parent: &NodeId,
        dotted_path: &str,
        value: Variant,
        ns: u16,
    ) -> UaResult<NodeId> {
        let segments: Vec<&str> = dotted_path.split('.').collect();
        let Some((leaf, folders)) = segments.split_last() else {
            return Err(StatusCode::BAD_BROWSE_NAME_INVALID.into());
        };
        if segments.iter().any(|s| s.is_empty()) {
            return Err(StatusCode::BAD_BROWSE_NAME_INVALID.into());
        }
        let folder = self.folder_path_locked(space, parent, folders, ns)?;
        if let Ok(existing) = space.get_child(&folder, leaf) {
            if space.find(&existing)?.node_class() == NodeClass::Variable {
                self.write_locked(space, &existing, AttributeId::Value, value)?;
                return Ok(existing);
            }
            return Err(StatusCode::BAD_NODE_CLASS_INVALID.into());
        }
        let attributes = VariableAttributes::for_value(value)
            .with_access_level(access_level::CURRENT_READ | access_level::CURRENT_WRITE);
        let item = Self::item(
            &folder,
            ids::organizes(),
            &NodeId::null(),
            leaf,
            ns,
            NodeAttributes::Variable(attributes),
            ids::base_data_variable_type(),
        );
        self.insert_node(space, &SessionContext::admin(), item, None)
    }

    // ---- browsing ----

    pub async fn browse(&self, description: &BrowseDescription) -> BrowseResult {
        let result = self.space.write().await.browse(description);
        self.last_error.set(result.status_code);
        result
    }

    pub async fn browse_tree(&self, root: &NodeId, tree: &mut NodeTree) -> UaResult<()> {
        let result = self.space.write().await.browse_tree(root, tree);
        self.record(&result);
        result
    }

    pub async fn browse_tree_map(&self, root: &NodeId, map: &mut NodeIdMap) -> UaResult<()> {
        let result = self.space.write().await.browse_tree_map(root, map);
        self.record(&result);
        result
    }

    pub async fn browse_children(&self, node_id: &NodeId) -> UaResult<NodeIdMap> {
        let result = self.space.write().await.browse_children(node_id);
        self.record(&result);
        result
    }

    pub async fn get_child(&self, node_id: &NodeId, name: &str) -> UaResult<NodeId> {
        let result = self.space.write().await.get_child(node_id, name);
        self.record(&result);
        result
    }

    pub async fn node_id_from_path<S: AsRef<str>>(
        &self,
        start: &NodeId,
        path: &[S],
    ) -> UaResult<NodeId> {
        let result = self.space.write().await.node_id_from_path(start, path);
        self.record(&result);
        result
    }

    pub async fn browse_simplified_browse_path(
        &self,
        origin: &NodeId,
        path: &[QualifiedName],
    ) -> BrowsePathResult {
        let result = self
            .space
            .write()
            .await
            .browse_simplified_browse_path(origin, path);
        self.last_error.set(result.status_code);
        result
    }

    pub async fn translate_browse_path_to_node_ids(&self, path: &BrowsePath) -> BrowsePathResult {
        let result = self.space.write().await.translate_browse_path_to_node_ids(path);
        self.last_error.set(result.status_code);
        result
    }

    /// References held by a node, both directions
    pub async fn references(&self, node_id: &NodeId) -> Vec<Reference> {
        self.space.write().await.references(node_id)
    }

    /// Every edge entry of the address space
    pub async fn all_references(&self) -> Vec<Reference> {
        self.space.write().await.all_references()
    }

    pub async fn contains_node(&self, node_id: &NodeId) -> bool {
        self.space.write().await.contains(node_id)
    }

    pub async fn node_count(&self) -> usize {
        self.space.write().await.len()
    }

    /// Browse name of a node as `(text, namespace index)`
    pub async fn browse_name(&self, node_id: &NodeId) -> UaResult<(String, u16)> {
        let result = self
            .space
            .write()
            .await
            .find(node_id)
            .map(|n| (n.browse_name().name.clone(), n.browse_name().namespace_index));
        self.record(&result);
        result
    }

    pub async fn set_browse_name(&self, node_id: &NodeId, ns: u16, name: &str) -> UaResult<()> {
        self.write_browse_name(node_id, QualifiedName::new(ns, name))
            .await
    }

    pub async fn get_node_context(
        &self,
        node_id: &NodeId,
    ) -> UaResult<Option<Arc<dyn NodeContext>>> {
        let result = self.space.write().await.node_context(node_id);
        self.record(&result);
        result
    }

    pub async fn set_node_context(
        &self,
        node_id: &NodeId,
        context: Option<Arc<dyn NodeContext>>,
    ) -> UaResult<()> {
        let result = self.space.write().await.set_node_context(node_id, context);
        self.record(&result);
        result
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ServerConfig;
    use crate::context::{LifecycleEvent, NodeContext, NodeLifecycle};
    use crate::runtime::Runtime;
    use crate::server::Server;
    use opcua_core::{ids, ExpandedNodeId, NodeId, StatusCode, UaResult, Variant};
    use parking_lot::Mutex;
    use std::sync::Arc;

    fn server() -> Arc<Server> {
        Runtime::new().create_server(ServerConfig::default())
    }

    struct Recorder {
        created: Mutex<Vec<NodeId>>,
        deleted: Mutex<Vec<NodeId>>,
    }

    impl NodeLifecycle for Recorder {
        fn construct(
            &self,
            event: &LifecycleEvent,
            proposed: Option<Arc<dyn NodeContext>>,
        ) -> UaResult<Option<Arc<dyn NodeContext>>> {
            self.created.lock().push(event.node_id.clone());
            Ok(proposed)
        }

        fn destruct(&self, event: &LifecycleEvent, _context: Option<&Arc<dyn NodeContext>>) {
            self.deleted.lock().push(event.node_id.clone());
        }
    }

    struct Tagged;

    impl NodeContext for Tagged {
        fn name(&self) -> &str {
            "tagged"
        }
    }

    #[tokio::test]
    async fn test_create_folder_path_is_idempotent() {
        let server = server();
        let root = ids::objects_folder();
        let before = server.node_count().await;
        let first = server
            .create_folder_path(&root, &["Site", "Area", "Line"], 0)
            .await
            .unwrap();
        let after_first = server.node_count().await;
        let second = server
            .create_folder_path(&root, &["Site", "Area", "Line"], 0)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(after_first - before, 3);
        assert_eq!(server.node_count().await, after_first);
        assert_eq!(first.namespace_index, 1);
    }

    #[tokio::test]
    async fn test_namespace_inheritance() {
        let server = server();
        let ns = server.add_namespace("urn:plant").await;
        let area = server
            .add_folder(&ids::objects_folder(), "Area", &NodeId::null(), ns)
            .await
            .unwrap();
        assert_eq!(area.namespace_index, ns);
        let cell = server
            .add_folder(&area, "Cell", &NodeId::null(), 0)
            .await
            .unwrap();
        assert_eq!(cell.namespace_index, ns);
        assert_eq!(server.browse_name(&cell).await.unwrap(), ("Cell".to_string(), ns));
    }

    #[tokio::test]
    async fn test_add_failures_set_last_error() {
        let server = server();
        let err = server
            .add_folder(&NodeId::numeric(1, 4242), "Orphan", &NodeId::null(), 0)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_PARENT_NODE_ID_INVALID);
        assert_eq!(server.last_error(), StatusCode::BAD_PARENT_NODE_ID_INVALID);

        let fixed = NodeId::string(1, "Fixed");
        server
            .add_folder(&ids::objects_folder(), "Fixed", &fixed, 0)
            .await
            .unwrap();
        assert!(server.last_ok());
        let dup = server
            .add_folder(&ids::objects_folder(), "Fixed", &fixed, 0)
            .await
            .unwrap_err();
        assert_eq!(dup.status_code(), StatusCode::BAD_NODE_ID_EXISTS);
    }

    #[tokio::test]
    async fn test_delete_node_removes_reachability() {
        let server = server();
        let parent = server
            .add_folder(&ids::objects_folder(), "Parent", &NodeId::null(), 0)
            .await
            .unwrap();
        let child = server
            .add_variable(&parent, "Child", 1i32, &NodeId::null(), None, 0)
            .await
            .unwrap();
        server.mark_mandatory(&child).await.unwrap();

        server.delete_node(&child, true).await.unwrap();
        assert!(server.last_ok());
        assert!(!server.contains_node(&child).await);
        assert!(server.browse_children(&parent).await.unwrap().is_empty());
        let target = ExpandedNodeId::from(&child);
        assert!(server
            .all_references()
            .await
            .iter()
            .all(|r| r.source != child && r.target != target));

        let again = server.delete_node(&child, true).await.unwrap_err();
        assert_eq!(again.status_code(), StatusCode::BAD_NODE_ID_UNKNOWN);
    }

    #[tokio::test]
    async fn test_delete_tree_and_hooks() {
        let runtime = Runtime::new();
        let recorder = Arc::new(Recorder {
            created: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
        });
        runtime.set_node_lifecycle(recorder.clone());
        let server = runtime.create_server(ServerConfig::default());

        let leaf = server
            .create_folder_path(&ids::objects_folder(), &["A", "B", "C"], 0)
            .await
            .unwrap();
        let top = server.get_child(&ids::objects_folder(), "A").await.unwrap();
        assert_eq!(recorder.created.lock().len(), 3);

        server.delete_tree(&top).await.unwrap();
        let deleted = recorder.deleted.lock().clone();
        assert_eq!(deleted.len(), 3);
        assert_eq!(deleted[0], leaf);
        assert_eq!(deleted[2], top);
        assert!(!server.contains_node(&leaf).await);
    }

    #[tokio::test]
    async fn test_create_browse_path_updates_leaf() {
        let server = server();
        let root = ids::objects_folder();
        let id = server
            .create_browse_path(&root, "Boiler.Drum.Level", 1.5f64, 0)
            .await
            .unwrap();
        let again = server
            .create_browse_path(&root, "Boiler.Drum.Level", 2.5f64, 0)
            .await
            .unwrap();
        assert_eq!(id, again);
        assert_eq!(server.read_value(&id).await.unwrap(), Variant::from(2.5f64));
        assert_eq!(
            server
                .node_id_from_path(&root, &["Boiler", "Drum", "Level"])
                .await
                .unwrap(),
            id
        );
        assert!(server.create_browse_path(&root, "Boiler..Level", 0i32, 0).await.is_err());
    }

    #[tokio::test]
    async fn test_typed_variable_with_named_context() {
        let server = server();
        server.runtime().register_context(Arc::new(Tagged));
        let id = server
            .add_variable_as::<f64>(&ids::objects_folder(), "Temp", &NodeId::null(), "tagged", 0)
            .await
            .unwrap();
        assert_eq!(server.read_value(&id).await.unwrap(), Variant::from(0.0f64));
        let context = server.get_node_context(&id).await.unwrap();
        assert_eq!(context.map(|c| c.name().to_string()), Some("tagged".to_string()));

        let missing = server
            .add_variable_as::<i32>(&ids::objects_folder(), "X", &NodeId::null(), "absent", 0)
            .await
            .unwrap_err();
        assert_eq!(missing.status_code(), StatusCode::BAD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_properties_instances_and_types() {
        let server = server();
        let pump_type = server
            .add_object_type(
                &ids::base_object_type(),
                "PumpType",
                &NodeId::null(),
                Default::default(),
                None,
                0,
            )
            .await
            .unwrap();
        let pump = server
            .add_instance("Pump1", &NodeId::null(), &ids::objects_folder(), &pump_type, None, 0)
            .await
            .unwrap();
        let serial = server
            .add_property(&pump, "Serial", "P-001", &NodeId::null(), None, 0)
            .await
            .unwrap();
        assert_eq!(server.read_value(&serial).await.unwrap(), Variant::from("P-001"));

        let refs = server.references(&pump).await;
        assert!(refs
            .iter()
            .any(|r| r.reference_type == ids::has_type_definition() && r.target.node_id == pump_type));
        assert!(refs
            .iter()
            .any(|r| r.reference_type == ids::has_property() && r.target.node_id == serial));

        let err = server
            .add_instance("Bad", &NodeId::null(), &ids::objects_folder(), &serial, None, 0)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_TYPE_DEFINITION_INVALID);
    }

    #[tokio::test]
    async fn test_set_browse_name() {
        let server = server();
        let id = server
            .add_folder(&ids::objects_folder(), "Old", &NodeId::null(), 0)
            .await
            .unwrap();
        server.set_browse_name(&id, 1, "New").await.unwrap();
        assert_eq!(server.get_child(&ids::objects_folder(), "New").await.unwrap(), id);
        assert!(server.set_browse_name(&id, 1, "").await.is_err());
    }
}
