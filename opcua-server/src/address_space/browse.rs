//! Browsing and path resolution
//!
//! Tree views are computed on demand from the edge list by following
//! forward references whose type derives from HierarchicalReferences.
//! Cycles and shared targets are legal in the graph, so every walk keeps
//! a visited set and reports each node once.

use super::AddressSpace;
use opcua_core::{
    ExpandedNodeId, LocalizedText, NodeClass, NodeId, QualifiedName, StatusCode, UaResult,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Flat mapping from dotted browse path to node id
pub type NodeIdMap = BTreeMap<String, NodeId>;

/// Direction of references returned by a browse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BrowseDirection {
    #[default]
    Forward,
    Inverse,
    Both,
}

impl BrowseDirection {
    fn accepts(&self, is_forward: bool) -> bool {
        match self {
            BrowseDirection::Forward => is_forward,
            BrowseDirection::Inverse => !is_forward,
            BrowseDirection::Both => true,
        }
    }
}

/// Parameters of one browse operation
#[derive(Debug, Clone)]
pub struct BrowseDescription {
    pub node_id: NodeId,
    pub browse_direction: BrowseDirection,
    /// Null accepts every reference type
    pub reference_type_id: NodeId,
    pub include_subtypes: bool,
    /// Bit mask of NodeClass values, 0 accepts every class
    pub node_class_mask: u32,
}

impl BrowseDescription {
    /// Forward hierarchical browse of one node
    pub fn hierarchical(node_id: NodeId) -> Self {
        Self {
            node_id,
            browse_direction: BrowseDirection::Forward,
            reference_type_id: opcua_core::ids::hierarchical_references(),
            include_subtypes: true,
            node_class_mask: 0,
        }
    }
}

/// One reference returned by a browse
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceDescription {
    pub reference_type_id: NodeId,
    pub is_forward: bool,
    pub node_id: ExpandedNodeId,
    pub browse_name: QualifiedName,
    pub display_name: LocalizedText,
    /// `None` for remote targets
    pub node_class: Option<NodeClass>,
    pub type_definition: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct BrowseResult {
    pub status_code: StatusCode,
    pub references: Vec<ReferenceDescription>,
}

/// A relative path of browse names from a starting node
#[derive(Debug, Clone)]
pub struct BrowsePath {
    pub starting_node: NodeId,
    pub relative_path: Vec<QualifiedName>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrowsePathTarget {
    pub target_id: ExpandedNodeId,
    /// `u32::MAX` when the whole path was resolved
    pub remaining_path_index: u32,
}

#[derive(Debug, Clone)]
pub struct BrowsePathResult {
    pub status_code: StatusCode,
    pub targets: Vec<BrowsePathTarget>,
}

impl BrowsePathResult {
    fn failed(status_code: StatusCode) -> Self {
        Self {
            status_code,
            targets: Vec::new(),
        }
    }
}

/// One node of a browsed tree
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub name: String,
    pub node_id: NodeId,
    pub children: BTreeMap<String, TreeNode>,
}

impl TreeNode {
    fn new(name: impl Into<String>, node_id: NodeId) -> Self {
        Self {
            name: name.into(),
            node_id,
            children: BTreeMap::new(),
        }
    }

    fn flatten_into(&self, prefix: &str, map: &mut NodeIdMap) {
        for (name, child) in &self.children {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{prefix}.{name}")
            };
            map.insert(path.clone(), child.node_id.clone());
            child.flatten_into(&path, map);
        }
    }
}

/// In-memory mirror of a hierarchical subgraph
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTree {
    root: TreeNode,
}

impl NodeTree {
    pub fn new(root: NodeId) -> Self {
        Self {
            root: TreeNode::new("", root),
        }
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    /// Node at a dotted path relative to the root
    pub fn find(&self, path: &str) -> Option<&TreeNode> {
        if path.is_empty() {
            return Some(&self.root);
        }
        path.split('.')
            .try_fold(&self.root, |node, segment| node.children.get(segment))
    }

    /// Flat dotted-path view of the tree, root excluded
    pub fn paths(&self) -> NodeIdMap {
        let mut map = NodeIdMap::new();
        self.root.flatten_into("", &mut map);
        map
    }

    /// Number of nodes below the root
    pub fn len(&self) -> usize {
        fn count(node: &TreeNode) -> usize {
            node.children.values().map(|c| 1 + count(c)).sum()
        }
        count(&self.root)
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }
}

impl AddressSpace {
    /// Local targets of forward hierarchical references, in insertion order
    pub(crate) fn hierarchical_children(&self, node_id: &NodeId) -> Vec<NodeId> {
        self.references
            .entries(node_id)
            .iter()
            .filter(|e| e.is_forward && e.target.is_local())
            .filter(|e| self.is_hierarchical(&e.reference_type))
            .filter(|e| self.contains(&e.target.node_id))
            .map(|e| e.target.node_id.clone())
            .collect()
    }

    /// Browse the references of one node
    pub fn browse(&self, description: &BrowseDescription) -> BrowseResult {
        if !self.contains(&description.node_id) {
            return BrowseResult {
                status_code: StatusCode::BAD_NODE_ID_UNKNOWN,
                references: Vec::new(),
            };
        }
        let filter = &description.reference_type_id;
        if !filter.is_null() && self.node(filter).map(|n| n.node_class()) != Some(NodeClass::ReferenceType) {
            return BrowseResult {
                status_code: StatusCode::BAD_REFERENCE_TYPE_ID_INVALID,
                references: Vec::new(),
            };
        }

        let references = self
            .references
            .entries(&description.node_id)
            .iter()
            .filter(|e| description.browse_direction.accepts(e.is_forward))
            .filter(|e| {
                filter.is_null()
                    || &e.reference_type == filter
                    || (description.include_subtypes && self.is_subtype_of(&e.reference_type, filter))
            })
            .filter_map(|e| {
                let target = e.target.is_local().then(|| self.node(&e.target.node_id)).flatten();
                let class = target.map(|n| n.node_class());
                let class_bits = class.map(|c| c.value()).unwrap_or(0);
                if description.node_class_mask != 0 && description.node_class_mask & class_bits == 0 {
                    return None;
                }
                Some(ReferenceDescription {
                    reference_type_id: e.reference_type.clone(),
                    is_forward: e.is_forward,
                    node_id: e.target.clone(),
                    browse_name: target.map(|n| n.browse_name().clone()).unwrap_or_default(),
                    display_name: target.map(|n| n.display_name().clone()).unwrap_or_default(),
                    node_class: class,
                    type_definition: target.and_then(|n| self.type_definition(n.node_id())),
                })
            })
            .collect();

        BrowseResult {
            status_code: StatusCode::GOOD,
            references,
        }
    }

    /// Children of a node keyed by browse name text
    ///
    /// Siblings sharing a name collapse to the first one, the child
    /// [`AddressSpace::get_child`] would return.
    pub fn browse_children(&self, node_id: &NodeId) -> UaResult<NodeIdMap> {
        self.find(node_id)?;
        let mut children = NodeIdMap::new();
        for child in self.hierarchical_children(node_id) {
            let Some(node) = self.node(&child) else {
                continue;
            };
            let name = &node.browse_name().name;
            if children.contains_key(name) {
                log::debug!("{} has more than one child named {}", node_id, name);
                continue;
            }
            children.insert(name.clone(), child);
        }
        Ok(children)
    }

    /// First hierarchical child of `node_id` whose browse name text is `name`
    pub fn get_child(&self, node_id: &NodeId, name: &str) -> UaResult<NodeId> {
        self.find(node_id)?;
        self.hierarchical_children(node_id)
            .into_iter()
            .find(|child| {
                self.node(child)
                    .is_some_and(|n| n.browse_name().name == name)
            })
            .ok_or_else(|| StatusCode::BAD_NOT_FOUND.into())
    }

    /// Follow a path of browse name texts from `start`
    pub fn node_id_from_path<S: AsRef<str>>(&self, start: &NodeId, path: &[S]) -> UaResult<NodeId> {
        path.iter()
            .try_fold(start.clone(), |node, segment| self.get_child(&node, segment.as_ref()))
    }

    /// Mirror the hierarchical subgraph below `root` into `tree`
    ///
    /// Tree entries are keyed by browse name text, so of several siblings
    /// with the same name only the first is mirrored.
    pub fn browse_tree(&self, root: &NodeId, tree: &mut NodeTree) -> UaResult<()> {
        let root_node = self.find(root)?;
        tree.root = TreeNode::new(root_node.browse_name().name.clone(), root.clone());
        let mut visited = HashSet::from([root.clone()]);
        self.fill_tree(&mut tree.root, &mut visited);
        Ok(())
    }

    fn fill_tree(&self, parent: &mut TreeNode, visited: &mut HashSet<NodeId>) {
        for child in self.hierarchical_children(&parent.node_id) {
            let Some(node) = self.node(&child) else {
                continue;
            };
            let name = node.browse_name().name.clone();
            if parent.children.contains_key(&name) {
                log::debug!("{} has more than one child named {}", parent.node_id, name);
                continue;
            }
            if !visited.insert(child.clone()) {
                continue;
            }
            let mut entry = TreeNode::new(name.clone(), child);
            self.fill_tree(&mut entry, visited);
            parent.children.insert(name, entry);
        }
    }

    /// Flat form of [`AddressSpace::browse_tree`]
    pub fn browse_tree_map(&self, root: &NodeId, map: &mut NodeIdMap) -> UaResult<()> {
        let mut tree = NodeTree::new(root.clone());
        self.browse_tree(root, &mut tree)?;
        map.extend(tree.paths());
        Ok(())
    }

    /// Every node of the hierarchical subtree below and including `root`,
    /// children before their parents
    pub fn subtree_post_order(&self, root: &NodeId) -> UaResult<Vec<NodeId>> {
        self.find(root)?;
        let mut visited = HashSet::from([root.clone()]);
        let mut order = Vec::new();
        self.post_order(root, &mut visited, &mut order);
        Ok(order)
    }

    fn post_order(&self, node_id: &NodeId, visited: &mut HashSet<NodeId>, order: &mut Vec<NodeId>) {
        for child in self.hierarchical_children(node_id) {
            if visited.insert(child.clone()) {
                self.post_order(&child, visited, order);
            }
        }
        order.push(node_id.clone());
    }

    /// Resolve a relative path of qualified names from `origin`
    ///
    /// Only forward hierarchical references to Object and Variable nodes
    /// are followed.
    pub fn browse_simplified_browse_path(
        &self,
        origin: &NodeId,
        path: &[QualifiedName],
    ) -> BrowsePathResult {
        if path.is_empty() {
            return BrowsePathResult::failed(StatusCode::BAD_NOTHING_TO_DO);
        }
        if path.iter().any(QualifiedName::is_empty) {
            return BrowsePathResult::failed(StatusCode::BAD_BROWSE_NAME_INVALID);
        }
        if !self.contains(origin) {
            return BrowsePathResult::failed(StatusCode::BAD_NODE_ID_UNKNOWN);
        }

        let mut current = vec![origin.clone()];
        for name in path {
            let mut next = Vec::new();
            for node_id in &current {
                for child in self.hierarchical_children(node_id) {
                    let matches = self.node(&child).is_some_and(|n| {
                        matches!(n.node_class(), NodeClass::Object | NodeClass::Variable)
                            && n.browse_name() == name
                    });
                    if matches && !next.contains(&child) {
                        next.push(child);
                    }
                }
            }
            if next.is_empty() {
                return BrowsePathResult::failed(StatusCode::BAD_NO_MATCH);
            }
            current = next;
        }

        BrowsePathResult {
            status_code: StatusCode::GOOD,
            targets: current
                .into_iter()
                .map(|id| BrowsePathTarget {
                    target_id: ExpandedNodeId::from(id),
                    remaining_path_index: u32::MAX,
                })
                .collect(),
        }
    }

    /// Service form of [`AddressSpace::browse_simplified_browse_path`]
    pub fn translate_browse_path_to_node_ids(&self, path: &BrowsePath) -> BrowsePathResult {
        self.browse_simplified_browse_path(&path.starting_node, &path.relative_path)
    }
}
