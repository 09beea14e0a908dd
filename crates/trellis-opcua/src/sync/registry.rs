// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Reference-counted subject ↔ node bindings.
//!
//! A subject has at most one node, however many child slots hold it. Each
//! slot is recorded as a [`SlotEdge`] on the subject's binding, so the
//! reference count is simply the number of edges:
//!
//! ```text
//!   Team#1.People[0] ──┐
//!                      ├──► Person#7 ──► node @42   (edges: 2)
//!   Team#1.Lead ───────┘
//! ```
//!
//! The first edge is the primary one: it decides the node's parent, browse
//! name and path-derived id. When it goes away the next edge is promoted
//! and the node is re-keyed to that edge's path.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};
use trellis_config::PropertyNodeConfig;
use trellis_core::{Subject, SubjectId};

use super::paths;
use super::processor::Rename;
use super::StructuralScope;
use crate::address_space::NodeHandle;
use crate::error::SyncResult;
use crate::types::{ModelChangeVerb, NodeId};

// =============================================================================
// Slots
// =============================================================================

/// Position of a child within its parent property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SlotKey {
    /// The graph root.
    Root,
    /// A reference property.
    Single,
    /// A collection entry.
    Index(usize),
    /// A dictionary entry.
    Key(String),
}

impl SlotKey {
    /// Returns the collection index, if any.
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::Index(index) => Some(*index),
            _ => None,
        }
    }
}

/// Where a subject is attached: parent subject, property and position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChildSlot {
    /// Parent subject; `None` for the root.
    pub parent: Option<SubjectId>,
    /// Parent property.
    pub property: String,
    /// Position within the property.
    pub key: SlotKey,
}

impl ChildSlot {
    /// The root slot.
    pub fn root() -> Self {
        Self {
            parent: None,
            property: String::new(),
            key: SlotKey::Root,
        }
    }

    /// A child slot of `parent.property`.
    pub fn new(parent: SubjectId, property: impl Into<String>, key: SlotKey) -> Self {
        Self {
            parent: Some(parent),
            property: property.into(),
            key,
        }
    }

    /// Returns `true` for the root slot.
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub(crate) fn is_in(&self, parent: SubjectId, property: &str) -> bool {
        self.parent == Some(parent) && self.property == property
    }
}

impl fmt::Display for ChildSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(parent) = self.parent else {
            return write!(f, "root");
        };
        match &self.key {
            SlotKey::Root | SlotKey::Single => write!(f, "{}.{}", parent, self.property),
            SlotKey::Index(index) => write!(f, "{}.{}[{}]", parent, self.property, index),
            SlotKey::Key(key) => write!(f, "{}.{}[{}]", parent, self.property, key),
        }
    }
}

/// One live slot holding a subject, with the node edge it produced.
#[derive(Debug, Clone)]
pub(crate) struct SlotEdge {
    pub slot: ChildSlot,
    pub anchor: NodeHandle,
    pub reference_type: NodeId,
    pub path: String,
    pub browse_name: String,
}

/// Mirror of a structural property's children, in graph order.
#[derive(Debug, Clone)]
pub(crate) enum SlotTable {
    Single(Option<SubjectId>),
    Sequence(Vec<SubjectId>),
    Keyed(BTreeMap<String, SubjectId>),
}

impl SlotTable {
    pub fn entries(&self) -> Vec<(SlotKey, SubjectId)> {
        match self {
            Self::Single(child) => child.iter().map(|c| (SlotKey::Single, *c)).collect(),
            Self::Sequence(items) => items
                .iter()
                .enumerate()
                .map(|(i, c)| (SlotKey::Index(i), *c))
                .collect(),
            Self::Keyed(items) => items
                .iter()
                .map(|(k, c)| (SlotKey::Key(k.clone()), *c))
                .collect(),
        }
    }
}

/// Nodes and children of one structural property of a bound subject.
#[derive(Debug, Clone)]
pub(crate) struct PropertyNodes {
    /// Node receiving the property's children.
    pub anchor: NodeHandle,
    /// Container folder, when the property has one.
    pub container: Option<NodeHandle>,
    /// Path prefix of the property's children.
    pub base_path: String,
    /// Browse name prefix of the property's children.
    pub browse_base: String,
    /// Reference type from the anchor to each child.
    pub reference_type: NodeId,
    pub slots: SlotTable,
}

/// A subject's binding to its node.
#[derive(Debug)]
pub(crate) struct SubjectBinding {
    pub subject: Arc<Subject>,
    pub node: NodeHandle,
    /// `false` when the subject is mapped onto a standard folder.
    pub owns_node: bool,
    /// Value property presented by the node itself, if any.
    pub presented_by: Option<String>,
    pub edges: Vec<SlotEdge>,
    pub properties: HashMap<String, PropertyNodes>,
    pub path: String,
}

impl SubjectBinding {
    /// Number of live slots holding the subject.
    pub fn ref_count(&self) -> usize {
        self.edges.len()
    }
}

// =============================================================================
// SubjectNodeRegistry
// =============================================================================

/// Bidirectional map between bound subjects and their nodes.
#[derive(Debug, Default)]
pub struct SubjectNodeRegistry {
    bindings: HashMap<SubjectId, SubjectBinding>,
    nodes: HashMap<NodeHandle, SubjectId>,
    containers: HashMap<NodeHandle, (SubjectId, String)>,
}

impl SubjectNodeRegistry {
    /// Returns the number of slots holding `subject` (0 when unbound).
    pub fn ref_count(&self, subject: SubjectId) -> usize {
        self.bindings.get(&subject).map_or(0, SubjectBinding::ref_count)
    }

    /// Returns `true` if the subject has a node.
    pub fn is_bound(&self, subject: SubjectId) -> bool {
        self.bindings.contains_key(&subject)
    }

    /// Returns the node of a bound subject.
    pub fn node_of(&self, subject: SubjectId) -> Option<NodeHandle> {
        self.bindings.get(&subject).map(|b| b.node)
    }

    /// Returns the subject bound to `node`.
    pub fn subject_at(&self, node: NodeHandle) -> Option<SubjectId> {
        self.nodes.get(&node).copied()
    }

    /// Returns the subject and property owning a container folder.
    pub fn container_owner(&self, node: NodeHandle) -> Option<(SubjectId, &str)> {
        self.containers
            .get(&node)
            .map(|(subject, property)| (*subject, property.as_str()))
    }

    /// Returns every slot currently holding `subject`, primary first.
    pub fn slots_of(&self, subject: SubjectId) -> Vec<ChildSlot> {
        self.bindings
            .get(&subject)
            .map(|b| b.edges.iter().map(|e| e.slot.clone()).collect())
            .unwrap_or_default()
    }

    /// Returns the number of bound subjects.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns `true` if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub(crate) fn get(&self, subject: SubjectId) -> Option<&SubjectBinding> {
        self.bindings.get(&subject)
    }

    pub(crate) fn get_mut(&mut self, subject: SubjectId) -> Option<&mut SubjectBinding> {
        self.bindings.get_mut(&subject)
    }

    pub(crate) fn bindings_mut(&mut self) -> impl Iterator<Item = &mut SubjectBinding> {
        self.bindings.values_mut()
    }

    pub(crate) fn insert(&mut self, binding: SubjectBinding) {
        self.nodes.insert(binding.node, binding.subject.id());
        self.bindings.insert(binding.subject.id(), binding);
    }

    pub(crate) fn remove(&mut self, subject: SubjectId) -> Option<SubjectBinding> {
        let binding = self.bindings.remove(&subject)?;
        self.nodes.remove(&binding.node);
        for nodes in binding.properties.values() {
            if let Some(container) = nodes.container {
                self.containers.remove(&container);
            }
        }
        Some(binding)
    }

    pub(crate) fn register_property(&mut self, subject: SubjectId, property: &str, nodes: PropertyNodes) {
        if let Some(container) = nodes.container {
            self.containers
                .insert(container, (subject, property.to_string()));
        }
        if let Some(binding) = self.bindings.get_mut(&subject) {
            binding.properties.insert(property.to_string(), nodes);
        }
    }

    /// Returns every subject some chain of live slots leads to from the
    /// root.
    pub(crate) fn reachable(&self) -> HashSet<SubjectId> {
        let mut children: HashMap<SubjectId, Vec<SubjectId>> = HashMap::new();
        let mut queue = VecDeque::new();
        for (id, binding) in &self.bindings {
            for edge in &binding.edges {
                match edge.slot.parent {
                    None => queue.push_back(*id),
                    Some(parent) => children.entry(parent).or_default().push(*id),
                }
            }
        }

        let mut reachable = HashSet::new();
        while let Some(current) = queue.pop_front() {
            if reachable.insert(current) {
                queue.extend(children.get(&current).into_iter().flatten().copied());
            }
        }
        reachable
    }

    pub(crate) fn clear(&mut self) {
        self.bindings.clear();
        self.nodes.clear();
        self.containers.clear();
    }
}

// =============================================================================
// Bind / Unbind
// =============================================================================

/// Where a newly bound subject's node goes and how it is named.
pub(crate) struct Placement<'c> {
    pub anchor: NodeHandle,
    pub path: String,
    pub browse_name: String,
    pub reference_type: NodeId,
    /// Overrides of the parent property.
    pub config: Option<&'c PropertyNodeConfig>,
    /// Whether the override's node id and display names apply to this
    /// child. Only single references carry them; collection and dictionary
    /// entries are always path-derived.
    pub explicit: bool,
}

/// Result of [`StructuralScope::bind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BindOutcome {
    pub node: NodeHandle,
    /// `true` if the node was created by this call.
    pub first: bool,
}

/// A subject that lost a slot but still has others.
///
/// Whether it is still reachable is decided once the whole structural
/// operation has been applied, see [`StructuralScope::settle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LostSlot {
    pub subject: SubjectId,
    /// The lost slot was the primary one.
    pub primary: bool,
}

/// Result of [`StructuralScope::unbind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UnbindOutcome {
    /// The subject held no such slot.
    NotBound,
    /// Only the edge from this slot was removed.
    EdgeRemoved { node: NodeHandle },
    /// The last slot was removed together with the node.
    Deleted { node: NodeHandle },
}

impl StructuralScope<'_> {
    /// Binds `subject` into `slot`.
    ///
    /// An already bound subject only gains an edge; the caller must not
    /// build its children again.
    pub(crate) fn bind(
        &mut self,
        subject: &Arc<Subject>,
        slot: ChildSlot,
        placement: Placement<'_>,
    ) -> SyncResult<BindOutcome> {
        let shared = self.shared;
        let edge = SlotEdge {
            slot,
            anchor: placement.anchor,
            reference_type: placement.reference_type.clone(),
            path: placement.path.clone(),
            browse_name: placement.browse_name.clone(),
        };

        if let Some(binding) = self.state.registry.get_mut(subject.id()) {
            shared
                .space
                .add_reference(edge.anchor, edge.reference_type.clone(), binding.node);
            debug!(subject = %subject, slot = %edge.slot, references = binding.edges.len() + 1, "Subject bound to additional slot");
            binding.edges.push(edge);
            let node = binding.node;
            if let Some(existing) = shared.space.get(node) {
                shared.queue_node_change(
                    existing.node_id(),
                    Some(existing.type_definition()),
                    ModelChangeVerb::REFERENCE_ADDED,
                );
            }
            return Ok(BindOutcome { node, first: false });
        }

        let (node, presented_by) = self.create_subject_node(subject, &placement)?;
        trace!(subject = %subject, node = %node, "Subject bound");
        shared.queue_node_change(
            node.node_id(),
            Some(node.type_definition()),
            ModelChangeVerb::NODE_ADDED,
        );
        self.state.registry.insert(SubjectBinding {
            subject: subject.clone(),
            node: node.handle(),
            owns_node: true,
            presented_by,
            edges: vec![edge],
            properties: HashMap::new(),
            path: placement.path,
        });
        Ok(BindOutcome {
            node: node.handle(),
            first: true,
        })
    }

    /// Removes `slot` from the subject's live slots.
    ///
    /// Deletes the node and every descendant node once no slot holds the
    /// subject. A subject left with slots is queued for [`Self::settle`].
    pub(crate) fn unbind(&mut self, subject: SubjectId, slot: &ChildSlot) -> UnbindOutcome {
        let shared = self.shared;
        let Some(binding) = self.state.registry.get_mut(subject) else {
            trace!(subject = %subject, slot = %slot, "Unbind of unbound subject ignored");
            return UnbindOutcome::NotBound;
        };
        let Some(position) = binding.edges.iter().position(|e| &e.slot == slot) else {
            trace!(subject = %subject, slot = %slot, "Unbind of unknown slot ignored");
            return UnbindOutcome::NotBound;
        };
        let edge = binding.edges.remove(position);
        let node = binding.node;
        if !binding.edges.iter().any(|e| e.anchor == edge.anchor) {
            shared.space.remove_reference(edge.anchor, node);
        }

        if !binding.edges.is_empty() {
            let references = binding.edges.len();
            if let Some(existing) = shared.space.get(node) {
                shared.queue_node_change(
                    existing.node_id(),
                    Some(existing.type_definition()),
                    ModelChangeVerb::REFERENCE_DELETED,
                );
            }
            self.state.lost.push(LostSlot {
                subject,
                primary: position == 0,
            });
            debug!(subject = %subject, slot = %slot, references, "Subject edge removed");
            return UnbindOutcome::EdgeRemoved { node };
        }

        self.delete_binding(subject);
        UnbindOutcome::Deleted { node }
    }

    /// Finishes a structural operation: deletes subjects that lost their
    /// last path from the root (cycles) and moves the others off lost
    /// primary slots.
    ///
    /// Reachability is computed once per operation. Deleting unreachable
    /// subjects never disconnects a reachable one, so the set stays valid
    /// while the queue drains.
    pub(crate) fn settle(&mut self) {
        if self.state.lost.is_empty() {
            return;
        }
        let reachable = self.state.registry.reachable();
        let mut promote = Vec::new();
        while let Some(lost) = self.state.lost.pop() {
            if !self.state.registry.is_bound(lost.subject) {
                continue;
            }
            if !reachable.contains(&lost.subject) {
                debug!(subject = %lost.subject, "Unreachable subject collected");
                self.delete_binding(lost.subject);
            } else if lost.primary && !promote.contains(&lost.subject) {
                promote.push(lost.subject);
            }
        }
        for subject in promote {
            if self.state.registry.is_bound(subject) {
                self.promote_primary(subject);
            }
        }
    }

    fn promote_primary(&mut self, subject: SubjectId) {
        let Some(binding) = self.state.registry.get_mut(subject) else {
            return;
        };
        // An edge from inside the subject's own subtree cannot carry its path.
        let choice = binding
            .edges
            .iter()
            .position(|e| paths::replace_prefix(&e.path, &binding.path, "").is_none())
            .unwrap_or(0);
        if choice >= binding.edges.len() {
            return;
        }
        let primary = binding.edges.remove(choice);
        binding.edges.insert(0, primary.clone());
        if let Some(node) = self.shared.space.get(binding.node) {
            node.update_attributes(|attributes| attributes.parent = Some(primary.anchor));
        }
        self.rekey(vec![Rename {
            subject,
            path: primary.path,
            browse_name: primary.browse_name,
        }]);
    }

    fn delete_binding(&mut self, subject: SubjectId) {
        let shared = self.shared;
        let Some(binding) = self.state.registry.remove(subject) else {
            return;
        };
        for edge in &binding.edges {
            shared.space.remove_reference(edge.anchor, binding.node);
        }

        for (property, nodes) in &binding.properties {
            for (key, child) in nodes.slots.entries() {
                self.unbind(child, &ChildSlot::new(subject, property.clone(), key));
            }
        }

        let registry = &self.state.registry;
        if binding.owns_node {
            let deleted = shared.space.get(binding.node);
            shared
                .space
                .remove_subtree(binding.node, |h| registry.subject_at(h).is_some());
            if let Some(node) = deleted {
                shared.queue_node_change(
                    node.node_id(),
                    Some(node.type_definition()),
                    ModelChangeVerb::NODE_DELETED,
                );
            }
        } else {
            for (_, child) in shared.space.children(binding.node) {
                if !child.node_id().is_standard() && registry.subject_at(child.handle()).is_none() {
                    shared
                        .space
                        .remove_subtree(child.handle(), |h| registry.subject_at(h).is_some());
                }
            }
        }
        debug!(subject = %binding.subject, "Subject node deleted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_display() {
        let parent = SubjectId::new(3);
        assert_eq!(ChildSlot::root().to_string(), "root");
        assert_eq!(
            ChildSlot::new(parent, "People", SlotKey::Index(2)).to_string(),
            "#3.People[2]"
        );
        assert_eq!(
            ChildSlot::new(parent, "Tags", SlotKey::Key("a".into())).to_string(),
            "#3.Tags[a]"
        );
    }

    #[test]
    fn test_slot_table_entries() {
        let a = SubjectId::new(1);
        let b = SubjectId::new(2);
        let table = SlotTable::Sequence(vec![a, b]);
        assert_eq!(
            table.entries(),
            vec![(SlotKey::Index(0), a), (SlotKey::Index(1), b)]
        );
        assert!(SlotTable::Single(None).entries().is_empty());
    }

    #[test]
    fn test_empty_registry() {
        let registry = SubjectNodeRegistry::default();
        assert_eq!(registry.ref_count(SubjectId::new(1)), 0);
        assert!(registry.reachable().is_empty());
        assert!(registry.is_empty());
    }
}
