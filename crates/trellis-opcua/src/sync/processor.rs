// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Applies structural graph events to the address space.
//!
//! # Re-indexing
//!
//! Collection entries are named by position. After an insert, removal or
//! move every entry whose position changed is renamed in one batch:
//!
//! ```text
//! remove index 1 of [C0, C1, C2, C3]
//!
//!   C0  X[0]  ─────────────  X[0]   (untouched)
//!   C1  X[1]  ─── deleted
//!   C2  X[2]  ── rename ──►  X[1]   same node, new id and browse name
//!   C3  X[3]  ── rename ──►  X[2]
//! ```
//!
//! A rename rewrites the path-derived ids of the whole subtree with one
//! longest-prefix pass over the old ids, so renames inside a batch never
//! chain into each other.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, trace, warn};
use trellis_core::{CollectionChange, DictionaryChange, GraphEvent, PropertyRef, Subject, SubjectId};

use super::paths::{index_browse_name, index_path, replace_prefix};
use super::registry::{ChildSlot, SlotKey, SlotTable};
use super::StructuralScope;
use crate::address_space::NodeHandle;
use crate::error::SyncResult;
use crate::types::{ModelChangeVerb, NodeId};

/// New primary path and browse name of a bound subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Rename {
    pub subject: SubjectId,
    pub path: String,
    pub browse_name: String,
}

/// New position of one edge of a bound subject.
#[derive(Debug, Clone)]
struct EdgeMove {
    subject: SubjectId,
    edge: usize,
    key: SlotKey,
    path: String,
    browse_name: String,
}

impl StructuralScope<'_> {
    /// Applies one structural event.
    ///
    /// Value events are not structural and are ignored here.
    pub(crate) fn apply_event(&mut self, event: &GraphEvent) -> SyncResult<()> {
        let result = self.apply_structural(event);
        self.settle();
        result
    }

    fn apply_structural(&mut self, event: &GraphEvent) -> SyncResult<()> {
        match event {
            GraphEvent::SubjectAttached { subject } => self.attach_root(subject),
            GraphEvent::SubjectDetached { subject } => {
                self.detach_root(subject);
                Ok(())
            }
            GraphEvent::CollectionChanged { property, change } => self.apply_collection(property, change),
            GraphEvent::DictionaryChanged { property, change } => self.apply_dictionary(property, change),
            GraphEvent::ReferenceChanged {
                property,
                previous: _,
                current,
            } => self.apply_reference(property, current.as_ref()),
            GraphEvent::ValueChanged { .. } => Ok(()),
        }
    }

    fn slots_mut(&mut self, property: &PropertyRef) -> Option<&mut SlotTable> {
        self.state
            .registry
            .get_mut(property.subject().id())
            .and_then(|b| b.properties.get_mut(property.name()))
            .map(|nodes| &mut nodes.slots)
    }

    // =========================================================================
    // Collections
    // =========================================================================

    fn apply_collection(&mut self, property: &PropertyRef, change: &CollectionChange) -> SyncResult<()> {
        let parent = property.subject();
        let name = property.name();
        let Some(SlotTable::Sequence(items)) = self.slots_mut(property) else {
            trace!(property = %property, "Collection change on unbound subject ignored");
            return Ok(());
        };

        match change {
            CollectionChange::Insert { index, child } => {
                let index = (*index).min(items.len());
                items.insert(index, child.id());
                self.reindex(parent.id(), name, Some(index));
                self.attach_child(parent, name, SlotKey::Index(index), child)
            }
            CollectionChange::Remove { index, child } => {
                let index = if items.get(*index) == Some(&child.id()) {
                    *index
                } else {
                    match items.iter().position(|id| *id == child.id()) {
                        Some(position) => position,
                        None => {
                            debug!(property = %property, index, "Removal of untracked entry ignored");
                            return Ok(());
                        }
                    }
                };
                items.remove(index);
                self.unbind(child.id(), &ChildSlot::new(parent.id(), name, SlotKey::Index(index)));
                self.reindex(parent.id(), name, None);
                Ok(())
            }
            CollectionChange::Move { from, to } => {
                if *from >= items.len() || *to >= items.len() {
                    debug!(property = %property, from, to, "Stale move ignored");
                    return Ok(());
                }
                let id = items.remove(*from);
                items.insert(*to, id);
                self.reindex(parent.id(), name, None);
                Ok(())
            }
        }
    }

    /// Renames the entries of a collection whose position changed.
    ///
    /// `inserted` is a position that has no edge yet and is skipped.
    fn reindex(&mut self, parent: SubjectId, property: &str, inserted: Option<usize>) {
        let registry = &self.state.registry;
        let Some(nodes) = registry.get(parent).and_then(|b| b.properties.get(property)) else {
            return;
        };
        let SlotTable::Sequence(items) = &nodes.slots else {
            return;
        };

        let mut positions: HashMap<SubjectId, Vec<usize>> = HashMap::new();
        for (index, id) in items.iter().enumerate() {
            if Some(index) != inserted {
                positions.entry(*id).or_default().push(index);
            }
        }

        let mut renames = Vec::new();
        let mut moves = Vec::new();
        for (subject, new_positions) in positions {
            let Some(binding) = registry.get(subject) else {
                continue;
            };
            let mut edges: Vec<(usize, usize)> = binding
                .edges
                .iter()
                .enumerate()
                .filter(|(_, e)| e.slot.is_in(parent, property))
                .filter_map(|(edge, e)| e.slot.key.index().map(|old| (old, edge)))
                .collect();
            edges.sort_unstable();

            for ((old, edge), new) in edges.into_iter().zip(new_positions) {
                if old == new {
                    continue;
                }
                let path = index_path(&nodes.base_path, new);
                let browse_name = index_browse_name(&nodes.browse_base, new);
                if edge == 0 {
                    renames.push(Rename {
                        subject,
                        path: path.clone(),
                        browse_name: browse_name.clone(),
                    });
                }
                moves.push(EdgeMove {
                    subject,
                    edge,
                    key: SlotKey::Index(new),
                    path,
                    browse_name,
                });
            }
        }

        if moves.is_empty() {
            return;
        }
        debug!(parent = %parent, property, moved = moves.len(), renamed = renames.len(), "Collection re-indexed");
        self.rekey_with(renames, moves);
    }

    // =========================================================================
    // Dictionaries / References
    // =========================================================================

    fn apply_dictionary(&mut self, property: &PropertyRef, change: &DictionaryChange) -> SyncResult<()> {
        let parent = property.subject();
        let name = property.name();
        let Some(SlotTable::Keyed(items)) = self.slots_mut(property) else {
            trace!(property = %property, "Dictionary change on unbound subject ignored");
            return Ok(());
        };

        match change {
            DictionaryChange::Insert { key, child, replaced } => {
                if key.is_empty() {
                    warn!(property = %property, "Dictionary entry with empty key skipped");
                    return Ok(());
                }
                let previous = items.insert(key.clone(), child.id());
                let replaced = replaced.as_ref().map(|r| r.id()).or(previous);
                let slot = ChildSlot::new(parent.id(), name, SlotKey::Key(key.clone()));
                if let Some(replaced) = replaced {
                    self.unbind(replaced, &slot);
                }
                self.attach_child(parent, name, slot.key, child)
            }
            DictionaryChange::Remove { key, child } => {
                if items.remove(key).is_none() {
                    return Ok(());
                }
                self.unbind(child.id(), &ChildSlot::new(parent.id(), name, SlotKey::Key(key.clone())));
                Ok(())
            }
        }
    }

    fn apply_reference(&mut self, property: &PropertyRef, current: Option<&Arc<Subject>>) -> SyncResult<()> {
        let parent = property.subject();
        let name = property.name();
        let Some(SlotTable::Single(slot)) = self.slots_mut(property) else {
            trace!(property = %property, "Reference change on unbound subject ignored");
            return Ok(());
        };

        let previous = std::mem::replace(slot, current.map(|c| c.id()));
        if let Some(previous) = previous {
            self.unbind(previous, &ChildSlot::new(parent.id(), name, SlotKey::Single));
        }
        match current {
            Some(child) => self.attach_child(parent, name, SlotKey::Single, child),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Re-keying
    // =========================================================================

    /// Moves subjects to new primary paths and browse names.
    pub(crate) fn rekey(&mut self, renames: Vec<Rename>) {
        self.rekey_with(renames, Vec::new());
    }

    fn rekey_with(&mut self, renames: Vec<Rename>, moves: Vec<EdgeMove>) {
        let shared = self.shared;
        let space = &shared.space;

        let mut prefixes: Vec<(String, String)> = Vec::new();
        let mut renamed: Vec<NodeHandle> = Vec::new();
        for rename in &renames {
            let Some(binding) = self.state.registry.get(rename.subject) else {
                continue;
            };
            if binding.path != rename.path {
                prefixes.push((binding.path.clone(), rename.path.clone()));
            }
            if let Some(node) = space.get(binding.node) {
                node.update_attributes(|attributes| {
                    if attributes.browse_name.name != rename.browse_name {
                        if attributes.display_name == attributes.browse_name.name {
                            attributes.display_name = rename.browse_name.clone();
                        }
                        attributes.browse_name.name = rename.browse_name.clone();
                    }
                });
            }
            renamed.push(binding.node);
        }
        prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        let map = |value: &str| {
            prefixes
                .iter()
                .find_map(|(old, new)| replace_prefix(value, old, new))
        };

        if !prefixes.is_empty() {
            let mut batch: Vec<(NodeHandle, NodeId)> = Vec::new();
            let mut visited = HashSet::new();
            let mut stack = renamed.clone();
            while let Some(handle) = stack.pop() {
                if !visited.insert(handle) {
                    continue;
                }
                let Some(node) = space.get(handle) else {
                    continue;
                };
                let attributes = node.attributes();
                if attributes.path_derived {
                    if let Some(new) = attributes.node_id.as_string().and_then(map) {
                        batch.push((handle, NodeId::string(attributes.node_id.namespace_index, new)));
                    }
                }
                stack.extend(
                    attributes
                        .references
                        .iter()
                        .map(|r| r.target)
                        .filter(|target| space.get(*target).and_then(|c| c.parent()) == Some(handle)),
                );
            }
            let count = space.rekey(&batch);
            trace!(nodes = count, "Nodes re-keyed");

            for binding in self.state.registry.bindings_mut() {
                if let Some(path) = map(&binding.path) {
                    binding.path = path;
                }
                for edge in &mut binding.edges {
                    if let Some(path) = map(&edge.path) {
                        edge.path = path;
                    }
                }
                for nodes in binding.properties.values_mut() {
                    if let Some(path) = map(&nodes.base_path) {
                        nodes.base_path = path;
                    }
                }
            }
        }

        for edge_move in moves {
            let Some(edge) = self
                .state
                .registry
                .get_mut(edge_move.subject)
                .and_then(|b| b.edges.get_mut(edge_move.edge))
            else {
                continue;
            };
            edge.slot.key = edge_move.key;
            edge.path = edge_move.path;
            edge.browse_name = edge_move.browse_name;
        }

        for handle in renamed {
            if let Some(node) = space.get(handle) {
                shared.queue_node_change(
                    node.node_id(),
                    Some(node.type_definition()),
                    ModelChangeVerb::REFERENCE_ADDED | ModelChangeVerb::REFERENCE_DELETED,
                );
            }
        }
    }
}
