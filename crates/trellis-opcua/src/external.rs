// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Remote AddNodes / DeleteNodes requests.
//!
//! Requests never touch the address space directly. They are translated
//! into graph mutations and applied through the subject context, which
//! raises the same events application code would and lets the structural
//! processor build or remove the nodes.
//!
//! The engine mutex is only held to look up bindings and is always released
//! before the context is called.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;
use trellis_config::CollectionStructure;
use trellis_core::{GraphMutation, MutationOutcome, PropertyKind, Subject};

use crate::engine::EngineInner;
use crate::error::{StructuralError, SyncError, SyncResult};
use crate::sync::paths::index_browse_name;
use crate::sync::SlotKey;
use crate::types::{NodeId, StatusCode};

/// One item of an AddNodes request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddNodesItem {
    /// Node that will hold the new node.
    pub parent_node_id: NodeId,
    /// Requested browse name.
    pub browse_name: String,
    /// Registered type identifier of the subject to create.
    pub type_definition: String,
}

impl AddNodesItem {
    /// Creates a request item.
    pub fn new(parent_node_id: NodeId, browse_name: impl Into<String>, type_definition: impl Into<String>) -> Self {
        Self {
            parent_node_id,
            browse_name: browse_name.into(),
            type_definition: type_definition.into(),
        }
    }
}

/// Outcome of one AddNodes item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddNodesResult {
    /// Item status.
    pub status_code: StatusCode,
    /// Id of the created node on success.
    pub added_node_id: Option<NodeId>,
}

impl AddNodesResult {
    pub(crate) fn from_result(result: SyncResult<NodeId>) -> Self {
        match result {
            Ok(node_id) => Self {
                status_code: StatusCode::GOOD,
                added_node_id: Some(node_id),
            },
            Err(e) => Self {
                status_code: e.status_code(),
                added_node_id: None,
            },
        }
    }
}

// =============================================================================
// AddNode
// =============================================================================

/// Creates a subject of the requested type and inserts it below the parent.
pub(crate) fn add_node(engine: &EngineInner, item: &AddNodesItem) -> SyncResult<NodeId> {
    let types = engine.node_management()?;
    let registered = types
        .resolve(&item.type_definition)
        .ok_or_else(|| StructuralError::unknown_type(&item.type_definition))?;

    let (parent, property) = resolve_parent(engine, &item.parent_node_id)?;
    let child = registered.instantiate(&engine.shared.context);
    let (name, mutation) = accepting_property(engine, &parent, property.as_deref(), &child, item)?;

    debug!(parent = %parent, property = %name, child = %child, "Adding node for remote request");
    match engine.shared.context.mutate(&parent, &name, mutation)? {
        MutationOutcome::Applied => {}
        MutationOutcome::Ignored => {
            return Err(SyncError::unexpected(format!("insert into {parent}.{name} was ignored")));
        }
    }

    let handle = engine.structure.lock().registry.node_of(child.id());
    handle
        .and_then(|h| engine.shared.space.get(h))
        .map(|node| node.node_id())
        .ok_or_else(|| SyncError::unexpected(format!("{child} was inserted but not mirrored")))
}

/// Maps the parent node to a subject, and a container folder to the
/// property it holds.
fn resolve_parent(engine: &EngineInner, parent: &NodeId) -> SyncResult<(Arc<Subject>, Option<String>)> {
    let handle = engine
        .shared
        .space
        .handle_of(parent)
        .ok_or_else(|| StructuralError::unknown_parent(parent))?;
    let state = engine.structure.lock();
    let registry = &state.registry;

    if let Some(binding) = registry.subject_at(handle).and_then(|s| registry.get(s)) {
        return Ok((binding.subject.clone(), None));
    }
    if let Some((owner, property)) = registry.container_owner(handle) {
        if let Some(binding) = registry.get(owner) {
            return Ok((binding.subject.clone(), Some(property.to_string())));
        }
    }
    Err(StructuralError::unknown_parent(parent).into())
}

/// Finds the first property of `parent`, in declared order, that accepts
/// `child` under the requested browse name.
fn accepting_property(
    engine: &EngineInner,
    parent: &Arc<Subject>,
    restrict: Option<&str>,
    child: &Arc<Subject>,
    item: &AddNodesItem,
) -> SyncResult<(String, GraphMutation)> {
    let config = &engine.shared.config;
    let browse_name = item.browse_name.as_str();
    let mut rejected_type = None;

    for descriptor in parent.subject_type().properties() {
        let name = descriptor.name();
        match restrict {
            Some(restrict) if restrict != name => continue,
            None if descriptor.is_attribute() => continue,
            _ => {}
        }
        if !descriptor.kind().is_structural() {
            continue;
        }
        if !descriptor.accepts(child.type_name()) {
            rejected_type = Some(descriptor.element_type().unwrap_or_default().to_string());
            continue;
        }

        let browse_base = config
            .property(parent.type_name(), name)
            .and_then(|c| c.browse_name.clone())
            .unwrap_or_else(|| name.to_string());

        let mutation = match descriptor.kind() {
            PropertyKind::Collection => {
                // Entries may always be named after the next position;
                // container folders also take any other name.
                let next = browse_name == index_browse_name(&browse_base, parent.child_count(name)?);
                let accepts = match config.collection_structure(parent.type_name(), name) {
                    CollectionStructure::Container => restrict.is_some() || next,
                    CollectionStructure::Flat => next,
                };
                accepts.then(|| GraphMutation::Insert {
                    index: None,
                    child: child.clone(),
                })
            }
            PropertyKind::Dictionary => {
                // On the owner, names of other slots are not taken as keys.
                let free = !browse_name.is_empty()
                    && (restrict.is_some() || !names_slot(engine, parent, browse_name))
                    && !parent.dictionary(name)?.iter().any(|(key, _)| key == browse_name);
                free.then(|| GraphMutation::SetKey {
                    key: browse_name.to_string(),
                    child: child.clone(),
                })
            }
            PropertyKind::Reference => {
                let named = browse_name == name || browse_name == browse_base;
                (named && parent.reference(name)?.is_none())
                    .then(|| GraphMutation::SetReference(Some(child.clone())))
            }
            PropertyKind::Value => None,
        };
        if let Some(mutation) = mutation {
            return Ok((name.to_string(), mutation));
        }
    }

    match (restrict, rejected_type) {
        (Some(property), Some(expected)) => Err(StructuralError::TypeMismatch {
            message: format!(
                "{}.{} holds {}, not {}",
                parent.type_name(),
                property,
                expected,
                child.type_name()
            ),
        }
        .into()),
        _ => Err(StructuralError::no_accepting_property(&item.parent_node_id, browse_name).into()),
    }
}

/// Returns `true` if `browse_name` names a reference of `parent` or an
/// entry position of one of its collections.
fn names_slot(engine: &EngineInner, parent: &Subject, browse_name: &str) -> bool {
    let config = &engine.shared.config;
    parent
        .subject_type()
        .properties()
        .iter()
        .filter(|d| !d.is_attribute())
        .any(|descriptor| {
            let name = descriptor.name();
            let base = config
                .property(parent.type_name(), name)
                .and_then(|c| c.browse_name.as_deref())
                .unwrap_or(name);
            match descriptor.kind() {
                PropertyKind::Reference => browse_name == name || browse_name == base,
                PropertyKind::Collection => browse_name
                    .strip_prefix(base)
                    .and_then(|rest| rest.strip_prefix('['))
                    .is_some_and(|rest| rest.ends_with(']')),
                PropertyKind::Dictionary | PropertyKind::Value => false,
            }
        })
}

// =============================================================================
// DeleteNode
// =============================================================================

/// Removes the subject bound to `node_id` from every slot holding it.
pub(crate) fn delete_node(engine: &EngineInner, node_id: &NodeId) -> SyncResult<()> {
    if !engine.shared.config.enable_external_node_management {
        return Err(StructuralError::unsupported("remote node management is disabled").into());
    }

    let removals = {
        let handle = engine
            .shared
            .space
            .handle_of(node_id)
            .ok_or_else(|| StructuralError::not_found(node_id))?;
        let state = engine.structure.lock();
        let registry = &state.registry;
        let binding = registry
            .subject_at(handle)
            .and_then(|s| registry.get(s))
            .ok_or_else(|| StructuralError::not_found(node_id))?;

        let mut removals = Vec::with_capacity(binding.edges.len());
        for edge in &binding.edges {
            let Some(parent) = edge.slot.parent.and_then(|p| registry.get(p)) else {
                return Err(StructuralError::unsupported("the root node cannot be deleted").into());
            };
            let mutation = match &edge.slot.key {
                SlotKey::Index(_) => GraphMutation::RemoveItem(binding.subject.clone()),
                SlotKey::Key(key) => GraphMutation::RemoveKey(key.clone()),
                SlotKey::Single => GraphMutation::SetReference(None),
                SlotKey::Root => continue,
            };
            removals.push((parent.subject.clone(), edge.slot.property.clone(), mutation));
        }
        removals
    };

    debug!(node_id = %node_id, slots = removals.len(), "Deleting node for remote request");
    for (parent, property, mutation) in removals {
        engine.shared.context.mutate(&parent, &property, mutation)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_from_error_has_no_node() {
        let ok = AddNodesResult::from_result(Ok(NodeId::string(2, "Root.Members[0]")));
        assert_eq!(ok.status_code, StatusCode::GOOD);

        let err = AddNodesResult::from_result(Err(StructuralError::unknown_type("Dragon").into()));
        assert_eq!(err.status_code, StatusCode::BAD_TYPE_DEFINITION_INVALID);
        assert_eq!(err.added_node_id, None);

        let json = serde_json::to_value(&err).unwrap();
        assert!(json["added_node_id"].is_null());
    }

    #[test]
    fn test_item_from_json() {
        let item = AddNodesItem::new(NodeId::string(2, "Root.Roles"), "ops", "Person");
        let json = serde_json::to_string(&item).unwrap();
        let parsed: AddNodesItem = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, item);
    }
}
