// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Constructors for folder, object and variable nodes.
//!
//! The factory knows nothing about subjects: callers pass fully resolved
//! identifiers and the factory builds, links and indexes the node.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use trellis_core::{PropertyRef, Value};

use super::node::{NodeAttributes, NodeHandle, ProtocolNode, VariableNode, WriteHook};
use super::AddressSpace;
use crate::error::SyncResult;
use crate::types::{well_known, data_type_of, AccessLevel, NodeId, NodeKind, QualifiedName};

/// Display metadata of a node.
#[derive(Debug, Clone, Default)]
pub struct DisplayConfig {
    /// Display name; the browse name is used when absent.
    pub display_name: Option<String>,
    /// Description.
    pub description: Option<String>,
}

/// Identity and linkage of a node to create.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    /// Node id.
    pub node_id: NodeId,
    /// Browse name.
    pub browse_name: QualifiedName,
    /// Type definition; the kind's default when absent.
    pub type_definition: Option<NodeId>,
    /// Reference type from the parent; `HasComponent` when absent.
    pub reference_type: Option<NodeId>,
    /// Whether `node_id` follows the graph path.
    pub path_derived: bool,
    /// Display metadata.
    pub display: DisplayConfig,
}

impl NodeSpec {
    /// Creates a spec with an explicitly configured id.
    pub fn new(node_id: NodeId, browse_name: QualifiedName) -> Self {
        Self {
            node_id,
            browse_name,
            type_definition: None,
            reference_type: None,
            path_derived: false,
            display: DisplayConfig::default(),
        }
    }

    /// Creates a spec whose id follows the graph path.
    pub fn path_derived(node_id: NodeId, browse_name: QualifiedName) -> Self {
        Self {
            path_derived: true,
            ..Self::new(node_id, browse_name)
        }
    }

    /// Sets the type definition.
    pub fn with_type_definition(mut self, type_definition: NodeId) -> Self {
        self.type_definition = Some(type_definition);
        self
    }

    /// Sets the reference type from the parent.
    pub fn with_reference_type(mut self, reference_type: NodeId) -> Self {
        self.reference_type = Some(reference_type);
        self
    }

    /// Sets display metadata.
    pub fn with_display(mut self, display: DisplayConfig) -> Self {
        self.display = display;
        self
    }
}

/// Value settings of a variable to create.
#[derive(Clone)]
pub struct VariableSpec {
    /// Initial value.
    pub initial: Value,
    /// Timestamp of the initial value.
    pub source_timestamp: DateTime<Utc>,
    /// Data type; inferred from `initial` when absent.
    pub data_type: Option<NodeId>,
    /// Access level.
    pub access_level: AccessLevel,
    /// Property mirrored by the variable.
    pub source: Option<PropertyRef>,
    /// Forwards protocol writes.
    pub write_hook: Option<WriteHook>,
}

impl VariableSpec {
    /// Creates a detached variable spec.
    pub fn new(initial: Value, access_level: AccessLevel) -> Self {
        Self {
            initial,
            source_timestamp: Utc::now(),
            data_type: None,
            access_level,
            source: None,
            write_hook: None,
        }
    }
}

/// Builds nodes into an [`AddressSpace`].
#[derive(Debug, Clone, Copy)]
pub struct NodeFactory<'a> {
    space: &'a AddressSpace,
}

impl<'a> NodeFactory<'a> {
    /// Creates a factory for `space`.
    pub fn new(space: &'a AddressSpace) -> Self {
        Self { space }
    }

    /// Creates a folder node under `parent`.
    pub fn create_folder(&self, parent: NodeHandle, spec: NodeSpec) -> SyncResult<Arc<ProtocolNode>> {
        self.create(parent, NodeKind::Folder, spec, None)
    }

    /// Creates an object node under `parent`.
    pub fn create_object(&self, parent: NodeHandle, spec: NodeSpec) -> SyncResult<Arc<ProtocolNode>> {
        self.create(parent, NodeKind::Object, spec, None)
    }

    /// Creates a variable node under `parent` and indexes it by its source
    /// property.
    pub fn create_variable(
        &self,
        parent: NodeHandle,
        spec: NodeSpec,
        variable: VariableSpec,
    ) -> SyncResult<Arc<ProtocolNode>> {
        let key = variable.source.as_ref().map(PropertyRef::key);
        let data_type = variable
            .data_type
            .unwrap_or_else(|| data_type_of(&variable.initial));
        let value = VariableNode::new(
            data_type,
            variable.access_level,
            variable.initial,
            variable.source_timestamp,
            variable.source,
            variable.write_hook,
        );
        let node = self.create(parent, NodeKind::Variable, spec, Some(value))?;
        if let Some(key) = key {
            self.space.register_variable(key, node.handle());
        }
        Ok(node)
    }

    fn create(
        &self,
        parent: NodeHandle,
        kind: NodeKind,
        spec: NodeSpec,
        variable: Option<VariableNode>,
    ) -> SyncResult<Arc<ProtocolNode>> {
        let type_definition = spec.type_definition.unwrap_or(match kind {
            NodeKind::Folder => well_known::FOLDER_TYPE,
            NodeKind::Object => well_known::BASE_OBJECT_TYPE,
            NodeKind::Variable => well_known::BASE_DATA_VARIABLE_TYPE,
        });
        let reference_type = spec.reference_type.unwrap_or(well_known::HAS_COMPONENT);
        let attributes = NodeAttributes {
            display_name: spec
                .display
                .display_name
                .unwrap_or_else(|| spec.browse_name.name.clone()),
            description: spec.display.description,
            node_id: spec.node_id,
            browse_name: spec.browse_name,
            type_definition,
            write_mask: 0,
            parent: Some(parent),
            path_derived: spec.path_derived,
            references: Vec::new(),
        };

        let node = ProtocolNode::new(self.space.allocate_handle(), kind, attributes, variable);
        let node = self.space.insert(node, Some((parent, reference_type)))?;
        tracing::trace!(node = %node, parent = %parent, "Node created");
        Ok(node)
    }
}
