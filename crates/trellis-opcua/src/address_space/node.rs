// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Protocol nodes held by the [`AddressSpace`](super::AddressSpace).
//!
//! A node's identity is its [`NodeHandle`], allocated once and never
//! reused. The [`NodeId`] is an attribute and may change when a
//! path-derived node is re-indexed.
//!
//! Variable values live behind a per-node lock ([`VariableNode`]) that is
//! independent of any structural lock. Once a node has been removed from
//! the address space its variable is marked unregistered and further
//! updates are silently dropped.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use trellis_core::{PropertyRef, Value};

use crate::error::SyncResult;
use crate::types::{AccessLevel, DataValue, NodeId, NodeKind, QualifiedName, StatusCode};

/// Stable identity of a node for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(u64);

impl NodeHandle {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value.
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Forwards a protocol write to the source property.
///
/// Arguments are the written value and its source timestamp.
pub type WriteHook = Arc<dyn Fn(Value, DateTime<Utc>) -> SyncResult<()> + Send + Sync>;

/// A forward hierarchical reference to a child node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReference {
    /// Reference type.
    pub reference_type: NodeId,
    /// Target node.
    pub target: NodeHandle,
}

/// Mutable attributes of a node.
#[derive(Debug, Clone)]
pub struct NodeAttributes {
    /// Current node id.
    pub node_id: NodeId,
    /// Browse name.
    pub browse_name: QualifiedName,
    /// Display name.
    pub display_name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Type definition.
    pub type_definition: NodeId,
    /// Write mask (no attribute is writable).
    pub write_mask: u32,
    /// Primary parent.
    pub parent: Option<NodeHandle>,
    /// Whether the node id was derived from the graph path.
    pub path_derived: bool,
    /// Forward references to child nodes.
    pub references: Vec<NodeReference>,
}

// =============================================================================
// VariableNode
// =============================================================================

#[derive(Debug)]
struct VariableState {
    value: Value,
    source_timestamp: DateTime<Utc>,
    server_timestamp: DateTime<Utc>,
    status: StatusCode,
    registered: bool,
}

/// Value part of a variable node.
pub struct VariableNode {
    data_type: NodeId,
    value_rank: i32,
    access_level: AccessLevel,
    source: Option<PropertyRef>,
    write_hook: Option<WriteHook>,
    state: Mutex<VariableState>,
}

impl VariableNode {
    pub(crate) fn new(
        data_type: NodeId,
        access_level: AccessLevel,
        initial: Value,
        source_timestamp: DateTime<Utc>,
        source: Option<PropertyRef>,
        write_hook: Option<WriteHook>,
    ) -> Self {
        Self {
            data_type,
            value_rank: -1,
            access_level,
            source,
            write_hook,
            state: Mutex::new(VariableState {
                value: initial,
                source_timestamp,
                server_timestamp: Utc::now(),
                status: StatusCode::GOOD,
                registered: true,
            }),
        }
    }

    /// Returns the data type.
    pub fn data_type(&self) -> &NodeId {
        &self.data_type
    }

    /// Returns the value rank (-1 for scalars).
    pub fn value_rank(&self) -> i32 {
        self.value_rank
    }

    /// Returns the access level.
    pub fn access_level(&self) -> AccessLevel {
        self.access_level
    }

    /// Returns the property this variable mirrors.
    pub fn source(&self) -> Option<&PropertyRef> {
        self.source.as_ref()
    }

    pub(crate) fn write_hook(&self) -> Option<&WriteHook> {
        self.write_hook.as_ref()
    }

    /// Reads the current value, or `None` once the node was removed.
    pub fn read(&self) -> Option<DataValue> {
        let state = self.state.lock();
        state.registered.then(|| DataValue {
            value: state.value.clone(),
            status: state.status,
            source_timestamp: state.source_timestamp,
            server_timestamp: state.server_timestamp,
        })
    }

    /// Stores a new value.
    ///
    /// Returns `None` without touching state when the node is no longer
    /// registered.
    pub fn update(&self, value: Value, source_timestamp: DateTime<Utc>) -> Option<DataValue> {
        let mut state = self.state.lock();
        if !state.registered {
            return None;
        }
        state.value = value;
        state.source_timestamp = source_timestamp;
        state.server_timestamp = Utc::now();
        state.status = StatusCode::GOOD;
        Some(DataValue {
            value: state.value.clone(),
            status: state.status,
            source_timestamp: state.source_timestamp,
            server_timestamp: state.server_timestamp,
        })
    }

    /// Returns `true` while the node is part of the address space.
    pub fn is_registered(&self) -> bool {
        self.state.lock().registered
    }

    pub(crate) fn unregister(&self) {
        self.state.lock().registered = false;
    }
}

impl fmt::Debug for VariableNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariableNode")
            .field("data_type", &self.data_type)
            .field("access_level", &self.access_level)
            .field("source", &self.source)
            .field("writable_hook", &self.write_hook.is_some())
            .finish()
    }
}

// =============================================================================
// ProtocolNode
// =============================================================================

/// A node of the address space.
#[derive(Debug)]
pub struct ProtocolNode {
    handle: NodeHandle,
    kind: NodeKind,
    created_at: DateTime<Utc>,
    attributes: RwLock<NodeAttributes>,
    variable: Option<VariableNode>,
}

impl ProtocolNode {
    pub(crate) fn new(
        handle: NodeHandle,
        kind: NodeKind,
        attributes: NodeAttributes,
        variable: Option<VariableNode>,
    ) -> Self {
        Self {
            handle,
            kind,
            created_at: Utc::now(),
            attributes: RwLock::new(attributes),
            variable,
        }
    }

    /// Returns the node handle.
    #[inline]
    pub fn handle(&self) -> NodeHandle {
        self.handle
    }

    /// Returns the node kind.
    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Returns when the node was created.
    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the current node id.
    pub fn node_id(&self) -> NodeId {
        self.attributes.read().node_id.clone()
    }

    /// Returns the browse name.
    pub fn browse_name(&self) -> QualifiedName {
        self.attributes.read().browse_name.clone()
    }

    /// Returns the display name.
    pub fn display_name(&self) -> String {
        self.attributes.read().display_name.clone()
    }

    /// Returns the type definition.
    pub fn type_definition(&self) -> NodeId {
        self.attributes.read().type_definition.clone()
    }

    /// Returns the primary parent.
    pub fn parent(&self) -> Option<NodeHandle> {
        self.attributes.read().parent
    }

    /// Returns a copy of all attributes.
    pub fn attributes(&self) -> NodeAttributes {
        self.attributes.read().clone()
    }

    /// Returns the forward references to children.
    pub fn references(&self) -> Vec<NodeReference> {
        self.attributes.read().references.clone()
    }

    /// Returns the variable part for variable nodes.
    pub fn variable(&self) -> Option<&VariableNode> {
        self.variable.as_ref()
    }

    pub(crate) fn update_attributes<R>(&self, f: impl FnOnce(&mut NodeAttributes) -> R) -> R {
        f(&mut self.attributes.write())
    }
}

impl fmt::Display for ProtocolNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attributes = self.attributes.read();
        write!(
            f,
            "{} {} ({})",
            self.kind, attributes.browse_name, attributes.node_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable() -> VariableNode {
        VariableNode::new(
            NodeId::numeric(0, 6),
            AccessLevel::read_write(),
            Value::Int32(1),
            Utc::now(),
            None,
            None,
        )
    }

    #[test]
    fn test_update_returns_stored_value() {
        let node = variable();
        let stamp = Utc::now();
        let written = node.update(Value::Int32(7), stamp).unwrap();
        assert_eq!(written.value, Value::Int32(7));
        assert_eq!(written.source_timestamp, stamp);
        assert_eq!(written.status, StatusCode::GOOD);
        assert_eq!(node.read().unwrap().value, Value::Int32(7));
    }

    #[test]
    fn test_update_after_unregister_is_dropped() {
        let node = variable();
        node.unregister();
        assert!(!node.is_registered());
        assert!(node.update(Value::Int32(7), Utc::now()).is_none());
        assert!(node.read().is_none());
    }
}
