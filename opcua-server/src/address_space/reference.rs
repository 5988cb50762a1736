//! Reference edge list
//!
//! Edges are stored per source node. A forward edge A→B between two local
//! nodes is mirrored by an inverse entry on B, so both ends can be browsed
//! without scanning the whole table.

use opcua_core::{ExpandedNodeId, NodeId};
use std::collections::HashMap;

/// A directed, typed edge as seen from its source node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub source: NodeId,
    pub reference_type: NodeId,
    pub target: ExpandedNodeId,
    pub is_forward: bool,
}

/// Request to add a reference
#[derive(Debug, Clone)]
pub struct AddReferencesItem {
    pub source_node_id: NodeId,
    pub reference_type_id: NodeId,
    pub is_forward: bool,
    pub target_node_id: ExpandedNodeId,
}

/// Request to delete a node
#[derive(Debug, Clone)]
pub struct DeleteNodesItem {
    pub node_id: NodeId,
    pub delete_target_references: bool,
}

/// Request to delete a reference
#[derive(Debug, Clone)]
pub struct DeleteReferencesItem {
    pub source_node_id: NodeId,
    pub reference_type_id: NodeId,
    pub is_forward: bool,
    pub target_node_id: ExpandedNodeId,
    pub delete_bidirectional: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReferenceEntry {
    pub reference_type: NodeId,
    pub target: ExpandedNodeId,
    pub is_forward: bool,
}

#[derive(Debug, Default)]
pub(crate) struct ReferenceTable {
    edges: HashMap<NodeId, Vec<ReferenceEntry>>,
}

impl ReferenceTable {
    /// Insert an edge entry, `false` if the same entry already exists
    pub fn insert(
        &mut self,
        source: &NodeId,
        reference_type: &NodeId,
        target: &ExpandedNodeId,
        is_forward: bool,
    ) -> bool {
        let entry = ReferenceEntry {
            reference_type: reference_type.clone(),
            target: target.clone(),
            is_forward,
        };
        let list = self.edges.entry(source.clone()).or_default();
        if list.contains(&entry) {
            return false;
        }
        list.push(entry);
        true
    }

    pub fn contains(
        &self,
        source: &NodeId,
        reference_type: &NodeId,
        target: &ExpandedNodeId,
        is_forward: bool,
    ) -> bool {
        self.edges.get(source).is_some_and(|list| {
            list.iter().any(|e| {
                e.is_forward == is_forward && &e.reference_type == reference_type && &e.target == target
            })
        })
    }

    /// Remove one edge entry, `false` if nothing matched
    pub fn remove(
        &mut self,
        source: &NodeId,
        reference_type: &NodeId,
        target: &ExpandedNodeId,
        is_forward: bool,
    ) -> bool {
        let Some(list) = self.edges.get_mut(source) else {
            return false;
        };
        let before = list.len();
        list.retain(|e| {
            !(e.is_forward == is_forward && &e.reference_type == reference_type && &e.target == target)
        });
        let removed = list.len() != before;
        if list.is_empty() {
            self.edges.remove(source);
        }
        removed
    }

    /// Entries held by `source`
    pub fn entries(&self, source: &NodeId) -> &[ReferenceEntry] {
        self.edges.get(source).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Drop every entry held by `source` and return them
    pub fn remove_source(&mut self, source: &NodeId) -> Vec<ReferenceEntry> {
        self.edges.remove(source).unwrap_or_default()
    }

    /// Drop every entry in other nodes whose target is `target`
    pub fn remove_targeting(&mut self, target: &NodeId) {
        let target = ExpandedNodeId::from(target);
        self.edges.retain(|_, list| {
            list.retain(|e| e.target != target);
            !list.is_empty()
        });
    }

    /// All edges of the graph, as seen from their sources
    pub fn all(&self) -> Vec<Reference> {
        self.edges
            .iter()
            .flat_map(|(source, list)| {
                list.iter().map(move |e| Reference {
                    source: source.clone(),
                    reference_type: e.reference_type.clone(),
                    target: e.target.clone(),
                    is_forward: e.is_forward,
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_duplicate() {
        let mut table = ReferenceTable::default();
        let a = NodeId::numeric(1, 1);
        let b = ExpandedNodeId::from(NodeId::numeric(1, 2));
        let organizes = NodeId::ns0(35);

        assert!(table.insert(&a, &organizes, &b, true));
        assert!(!table.insert(&a, &organizes, &b, true));
        assert!(table.insert(&a, &organizes, &b, false));
        assert_eq!(table.len(), 2);
        assert!(table.contains(&a, &organizes, &b, true));
    }

    #[test]
    fn test_remove() {
        let mut table = ReferenceTable::default();
        let a = NodeId::numeric(1, 1);
        let b = NodeId::numeric(1, 2);
        let organizes = NodeId::ns0(35);
        table.insert(&a, &organizes, &ExpandedNodeId::from(&b), true);
        table.insert(&b, &organizes, &ExpandedNodeId::from(&a), false);

        assert!(!table.remove(&a, &organizes, &ExpandedNodeId::from(&b), false));
        table.remove_targeting(&a);
        assert!(table.entries(&b).is_empty());
        assert_eq!(table.remove_source(&a).len(), 1);
        assert!(table.all().is_empty());
    }
}
