// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-memory address space.
//!
//! # Structure
//!
//! ```text
//! Root (i=84)
//! ├── Objects (i=85)
//! │   ├── Server (i=2253)
//! │   └── <root folder>            ns=2;s=Root
//! │       ├── Name                 ns=2;s=Root.Name
//! │       └── People               ns=2;s=Root.People     (container folder)
//! │           └── People[0]        ns=2;s=Root.People[0]
//! ├── Types (i=86)
//! └── Views (i=87)
//! ```
//!
//! The store is indexed three ways: by [`NodeHandle`], by [`NodeId`] and,
//! for variables, by the [`PropertyKey`] of the property they mirror.
//! Structural edits are serialized by the engine; value updates go
//! straight to the per-node lock of the target variable.

mod factory;
mod node;

pub use factory::{DisplayConfig, NodeFactory, NodeSpec, VariableSpec};
pub use node::{
    NodeAttributes, NodeHandle, NodeReference, ProtocolNode, VariableNode, WriteHook,
};

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{trace, warn};
use trellis_core::{PropertyKey, Value};

use crate::error::{NodeError, SyncResult};
use crate::types::{well_known, DataValue, NodeId, NodeKind, QualifiedName};

const DATA_CHANGE_CAPACITY: usize = 1024;

/// A value update of one variable node.
#[derive(Debug, Clone, Serialize)]
pub struct DataChangeNotification {
    /// Updated node.
    pub node_id: NodeId,
    /// New value.
    pub value: DataValue,
}

// =============================================================================
// AddressSpace
// =============================================================================

/// The node store exposed to protocol sessions.
pub struct AddressSpace {
    next_handle: AtomicU64,
    nodes: DashMap<NodeHandle, Arc<ProtocolNode>>,
    by_id: DashMap<NodeId, NodeHandle>,
    variables: DashMap<PropertyKey, NodeHandle>,
    data_changes: broadcast::Sender<DataChangeNotification>,
    objects_folder: NodeHandle,
}

impl AddressSpace {
    /// Creates an address space holding the standard folders.
    pub fn new() -> Self {
        let (data_changes, _) = broadcast::channel(DATA_CHANGE_CAPACITY);
        let mut space = Self {
            next_handle: AtomicU64::new(1),
            nodes: DashMap::new(),
            by_id: DashMap::new(),
            variables: DashMap::new(),
            data_changes,
            objects_folder: NodeHandle::new(0),
        };

        let root = space.seed(NodeId::ROOT_FOLDER, "Root", None);
        let objects = space.seed(NodeId::OBJECTS_FOLDER, "Objects", Some(root));
        space.seed(NodeId::TYPES_FOLDER, "Types", Some(root));
        space.seed(NodeId::VIEWS_FOLDER, "Views", Some(root));
        space.seed(NodeId::SERVER, "Server", Some(objects));
        space.objects_folder = objects;
        space
    }

    fn seed(&self, node_id: NodeId, name: &str, parent: Option<NodeHandle>) -> NodeHandle {
        let handle = self.allocate_handle();
        let (kind, type_definition) = if node_id == NodeId::SERVER {
            (NodeKind::Object, NodeId::numeric(0, 2004))
        } else {
            (NodeKind::Folder, well_known::FOLDER_TYPE)
        };
        let attributes = NodeAttributes {
            node_id: node_id.clone(),
            browse_name: QualifiedName::new(0, name),
            display_name: name.to_string(),
            description: None,
            type_definition,
            write_mask: 0,
            parent,
            path_derived: false,
            references: Vec::new(),
        };
        self.nodes
            .insert(handle, Arc::new(ProtocolNode::new(handle, kind, attributes, None)));
        self.by_id.insert(node_id, handle);
        if let Some(parent) = parent {
            self.add_reference(parent, well_known::ORGANIZES, handle);
        }
        handle
    }

    pub(crate) fn allocate_handle(&self) -> NodeHandle {
        NodeHandle::new(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Returns the Objects folder handle.
    pub fn objects_folder(&self) -> NodeHandle {
        self.objects_folder
    }

    /// Returns a node by handle.
    pub fn get(&self, handle: NodeHandle) -> Option<Arc<ProtocolNode>> {
        self.nodes.get(&handle).map(|entry| entry.value().clone())
    }

    /// Returns a node by id.
    pub fn find(&self, node_id: &NodeId) -> Option<Arc<ProtocolNode>> {
        let handle = self.handle_of(node_id)?;
        self.get(handle)
    }

    /// Returns the handle currently holding `node_id`.
    pub fn handle_of(&self, node_id: &NodeId) -> Option<NodeHandle> {
        self.by_id.get(node_id).map(|entry| *entry.value())
    }

    /// Returns `true` if a node with this id exists.
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.by_id.contains_key(node_id)
    }

    /// Returns the children of a node with the reference type leading to each.
    pub fn children(&self, handle: NodeHandle) -> Vec<(NodeId, Arc<ProtocolNode>)> {
        let Some(node) = self.get(handle) else {
            return Vec::new();
        };
        node.references()
            .into_iter()
            .filter_map(|r| self.get(r.target).map(|child| (r.reference_type, child)))
            .collect()
    }

    /// Returns the variable mirroring a property.
    pub fn variable_for(&self, key: &PropertyKey) -> Option<Arc<ProtocolNode>> {
        let handle = self.variables.get(key).map(|entry| *entry.value())?;
        self.get(handle)
    }

    /// Returns the number of nodes, standard nodes included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the store holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns the number of nodes in `namespace_index`.
    pub fn count_in_namespace(&self, namespace_index: u16) -> usize {
        self.by_id
            .iter()
            .filter(|entry| entry.key().namespace_index == namespace_index)
            .count()
    }

    // =========================================================================
    // Values
    // =========================================================================

    /// Applies a value to the variable mirroring `key`.
    ///
    /// Returns `false` if no registered variable mirrors the property; the
    /// update is then dropped.
    pub fn update_value(&self, key: &PropertyKey, value: Value, source_timestamp: DateTime<Utc>) -> bool {
        let Some(node) = self.variable_for(key) else {
            trace!(property = %key, "No variable for value update");
            return false;
        };
        self.update_node_value(&node, value, source_timestamp)
    }

    pub(crate) fn update_node_value(
        &self,
        node: &ProtocolNode,
        value: Value,
        source_timestamp: DateTime<Utc>,
    ) -> bool {
        let Some(variable) = node.variable() else {
            return false;
        };
        match variable.update(value, source_timestamp) {
            Some(value) => {
                let _ = self.data_changes.send(DataChangeNotification {
                    node_id: node.node_id(),
                    value,
                });
                true
            }
            None => false,
        }
    }

    /// Subscribes to variable value updates.
    pub fn subscribe_data_changes(&self) -> broadcast::Receiver<DataChangeNotification> {
        self.data_changes.subscribe()
    }

    // =========================================================================
    // Structure
    // =========================================================================

    /// Inserts a node and links it under `parent`.
    pub(crate) fn insert(
        &self,
        node: ProtocolNode,
        parent: Option<(NodeHandle, NodeId)>,
    ) -> SyncResult<Arc<ProtocolNode>> {
        let node = Arc::new(node);
        let node_id = node.node_id();
        match self.by_id.entry(node_id) {
            Entry::Occupied(entry) => return Err(NodeError::exists(entry.key()).into()),
            Entry::Vacant(entry) => {
                entry.insert(node.handle());
            }
        }
        self.nodes.insert(node.handle(), node.clone());
        if let Some((parent, reference_type)) = parent {
            self.add_reference(parent, reference_type, node.handle());
        }
        Ok(node)
    }

    pub(crate) fn register_variable(&self, key: PropertyKey, handle: NodeHandle) {
        self.variables.insert(key, handle);
    }

    /// Adds a forward reference `source → target`.
    pub(crate) fn add_reference(&self, source: NodeHandle, reference_type: NodeId, target: NodeHandle) {
        if let Some(node) = self.get(source) {
            node.update_attributes(|attributes| {
                if !attributes.references.iter().any(|r| r.target == target) {
                    attributes.references.push(NodeReference {
                        reference_type,
                        target,
                    });
                }
            });
        }
    }

    /// Removes the forward reference `source → target`.
    pub(crate) fn remove_reference(&self, source: NodeHandle, target: NodeHandle) -> bool {
        let Some(node) = self.get(source) else {
            return false;
        };
        node.update_attributes(|attributes| {
            let before = attributes.references.len();
            attributes.references.retain(|r| r.target != target);
            attributes.references.len() != before
        })
    }

    /// Removes `root` and every descendant for which `keep` is `false`.
    ///
    /// Kept descendants stay in the store; only the edge leading to them
    /// from a removed node disappears. Returns the removed nodes.
    pub(crate) fn remove_subtree(
        &self,
        root: NodeHandle,
        keep: impl Fn(NodeHandle) -> bool,
    ) -> Vec<Arc<ProtocolNode>> {
        if let Some(parent) = self.get(root).and_then(|node| node.parent()) {
            self.remove_reference(parent, root);
        }

        let mut removed = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![root];
        while let Some(handle) = stack.pop() {
            if !visited.insert(handle) {
                continue;
            }
            if handle != root && keep(handle) {
                continue;
            }
            let Some((_, node)) = self.nodes.remove(&handle) else {
                continue;
            };
            self.by_id.remove_if(&node.node_id(), |_, h| *h == handle);
            if let Some(variable) = node.variable() {
                variable.unregister();
                if let Some(source) = variable.source() {
                    self.variables.remove_if(&source.key(), |_, h| *h == handle);
                }
            }
            stack.extend(node.references().into_iter().map(|r| r.target));
            removed.push(node);
        }
        removed
    }

    /// Re-keys nodes to new ids.
    ///
    /// All old ids are released before any new id is claimed, so renames
    /// within one batch may swap ids. Returns the number of renamed nodes.
    pub(crate) fn rekey(&self, renames: &[(NodeHandle, NodeId)]) -> usize {
        for (handle, _) in renames {
            if let Some(node) = self.get(*handle) {
                self.by_id.remove_if(&node.node_id(), |_, h| h == handle);
            }
        }

        let mut renamed = 0;
        for (handle, node_id) in renames {
            let Some(node) = self.get(*handle) else {
                continue;
            };
            let claimed = match self.by_id.entry(node_id.clone()) {
                Entry::Occupied(_) => false,
                Entry::Vacant(entry) => {
                    entry.insert(*handle);
                    true
                }
            };
            if claimed {
                node.update_attributes(|attributes| attributes.node_id = node_id.clone());
                renamed += 1;
            } else {
                warn!(node_id = %node_id, handle = %handle, "Re-key target already in use");
                self.by_id.entry(node.node_id()).or_insert(*handle);
            }
        }
        renamed
    }

    /// Removes every node outside the standard namespace.
    pub(crate) fn clear(&self) {
        let handles: Vec<NodeHandle> = self
            .nodes
            .iter()
            .filter(|entry| !entry.value().node_id().is_standard())
            .map(|entry| *entry.key())
            .collect();

        for handle in handles {
            if let Some((_, node)) = self.nodes.remove(&handle) {
                if let Some(variable) = node.variable() {
                    variable.unregister();
                }
                self.by_id.remove_if(&node.node_id(), |_, h| *h == handle);
            }
        }
        self.variables.clear();

        let live: HashSet<NodeHandle> = self.nodes.iter().map(|entry| *entry.key()).collect();
        for entry in self.nodes.iter() {
            entry.value().update_attributes(|attributes| {
                attributes.references.retain(|r| live.contains(&r.target));
            });
        }
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressSpace")
            .field("nodes", &self.nodes.len())
            .field("variables", &self.variables.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccessLevel;

    fn object(space: &AddressSpace, parent: NodeHandle, id: &str) -> Arc<ProtocolNode> {
        NodeFactory::new(space)
            .create_object(parent, NodeSpec::path_derived(NodeId::string(2, id), QualifiedName::new(2, id)))
            .unwrap()
    }

    #[test]
    fn test_standard_folders_seeded() {
        let space = AddressSpace::new();
        assert!(space.contains(&NodeId::ROOT_FOLDER));
        assert!(space.contains(&NodeId::SERVER));
        let root = space.handle_of(&NodeId::ROOT_FOLDER).unwrap();
        let names: Vec<String> = space
            .children(root)
            .into_iter()
            .map(|(_, n)| n.browse_name().name)
            .collect();
        assert_eq!(names, vec!["Objects", "Types", "Views"]);
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let space = AddressSpace::new();
        let objects = space.objects_folder();
        object(&space, objects, "A");
        let err = NodeFactory::new(&space)
            .create_object(objects, NodeSpec::path_derived(NodeId::string(2, "A"), QualifiedName::new(2, "A")))
            .unwrap_err();
        assert_eq!(err.status_code(), crate::types::StatusCode::BAD_NODE_ID_EXISTS);
    }

    #[test]
    fn test_remove_subtree_keeps_marked_nodes() {
        let space = AddressSpace::new();
        let objects = space.objects_folder();
        let a = object(&space, objects, "A");
        let b = object(&space, a.handle(), "A.B");
        let shared = object(&space, a.handle(), "A.S");

        let removed = space.remove_subtree(a.handle(), |h| h == shared.handle());
        assert_eq!(removed.len(), 2);
        assert!(!space.contains(&NodeId::string(2, "A")));
        assert!(!space.contains(&b.node_id()));
        assert!(space.contains(&shared.node_id()));
        assert!(space.children(objects).iter().all(|(_, n)| n.handle() != a.handle()));
    }

    #[test]
    fn test_rekey_swaps_within_batch() {
        let space = AddressSpace::new();
        let objects = space.objects_folder();
        let x = object(&space, objects, "X[0]");
        let y = object(&space, objects, "X[1]");

        let renamed = space.rekey(&[
            (x.handle(), NodeId::string(2, "X[1]")),
            (y.handle(), NodeId::string(2, "X[0]")),
        ]);
        assert_eq!(renamed, 2);
        assert_eq!(space.handle_of(&NodeId::string(2, "X[1]")), Some(x.handle()));
        assert_eq!(space.handle_of(&NodeId::string(2, "X[0]")), Some(y.handle()));
    }

    #[test]
    fn test_value_update_after_removal_is_noop() {
        let space = AddressSpace::new();
        let objects = space.objects_folder();
        let node = NodeFactory::new(&space)
            .create_variable(
                objects,
                NodeSpec::path_derived(NodeId::string(2, "V"), QualifiedName::new(2, "V")),
                VariableSpec::new(Value::Int32(1), AccessLevel::read_only()),
            )
            .unwrap();
        let mut changes = space.subscribe_data_changes();

        assert!(space.update_node_value(&node, Value::Int32(2), Utc::now()));
        assert_eq!(changes.try_recv().unwrap().value.value, Value::Int32(2));

        space.remove_subtree(node.handle(), |_| false);
        assert!(!space.update_node_value(&node, Value::Int32(3), Utc::now()));
        assert!(node.variable().unwrap().read().is_none());
        assert!(changes.try_recv().is_err());
    }

    #[test]
    fn test_clear_keeps_standard_nodes() {
        let space = AddressSpace::new();
        let objects = space.objects_folder();
        let a = object(&space, objects, "A");
        object(&space, a.handle(), "A.B");
        let before = space.count_in_namespace(0);

        space.clear();
        assert_eq!(space.count_in_namespace(2), 0);
        assert_eq!(space.count_in_namespace(0), before);
        assert_eq!(space.children(objects).len(), 1);
    }
}
