// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Structural synchronization between the subject graph and the address
//! space.
//!
//! # Components
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ StructuralScope  (exists only while the structural lock is held) │
//! │                                                                  │
//! │  processor ── graph events ──► builder ──► registry (bind/unbind)│
//! │      │                            │             │                │
//! │      └── re-index / re-key ───────┴─────────────┤                │
//! │                                                 ▼                │
//! │                         NodeFactory / AddressSpace / Publisher   │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every structural method is defined on [`StructuralScope`], which can
//! only be created from a `&mut StructuralState`. Holding the engine's
//! structural mutex is therefore the only way to reach them, and nested
//! helpers never lock again.

pub(crate) mod builder;
pub(crate) mod paths;
pub(crate) mod processor;
pub(crate) mod registry;

use std::sync::Arc;

use trellis_config::ServerConfig;
use tracing::trace;
use trellis_core::{SubjectContext, SubjectId, TypeRegistry};

use crate::address_space::AddressSpace;
use crate::identifiers::{IdentifierCategory, IdentifierResolver};
use crate::publisher::ChangePublisher;
use crate::types::{ModelChangeVerb, NamespaceTable, NodeId};

pub use paths::resolve_property_path;
pub use registry::{ChildSlot, SlotKey, SubjectNodeRegistry};

use registry::LostSlot;

/// Collaborators shared by every structural operation of one engine.
pub(crate) struct EngineShared {
    pub config: Arc<ServerConfig>,
    pub context: SubjectContext,
    pub space: Arc<AddressSpace>,
    pub namespaces: Arc<NamespaceTable>,
    pub resolver: IdentifierResolver,
    pub publisher: ChangePublisher,
    pub namespace_index: u16,
}

impl EngineShared {
    pub fn new(config: Arc<ServerConfig>, context: SubjectContext) -> Self {
        let namespaces = Arc::new(NamespaceTable::new());
        namespaces.register(&format!("urn:trellis:{}", config.application_name));
        let namespace_index = namespaces.register(&config.namespace_uri);
        for ty in &config.subject_types {
            if let Some(uri) = &ty.namespace_uri {
                namespaces.register(uri);
            }
        }
        for property in &config.properties {
            if let Some(uri) = &property.namespace_uri {
                namespaces.register(uri);
            }
        }

        Self {
            resolver: IdentifierResolver::new(namespaces.clone()),
            space: Arc::new(AddressSpace::new()),
            publisher: ChangePublisher::new(),
            config,
            context,
            namespaces,
            namespace_index,
        }
    }

    /// Makes every registered type with a node id identifier findable by
    /// its subject type name, so `subject_types` entries can name it with a
    /// namespace hint.
    pub fn load_type_nodes(&self, types: &TypeRegistry) {
        for registered in types.iter() {
            let Ok(node_id) = registered.identifier().parse::<NodeId>() else {
                continue;
            };
            trace!(
                subject_type = registered.subject_type().name(),
                node_id = %node_id,
                "Type node loaded"
            );
            self.resolver
                .load_node(IdentifierCategory::ObjectType, registered.subject_type().name(), node_id);
        }
    }

    /// Returns the namespace index for an optional override URI.
    pub fn namespace_for(&self, uri: Option<&str>) -> u16 {
        uri.and_then(|uri| self.namespaces.index_of(uri))
            .unwrap_or(self.namespace_index)
    }

    /// Queues one structural change for the next flush.
    pub fn queue_node_change(&self, node_id: NodeId, type_definition: Option<NodeId>, verb: ModelChangeVerb) {
        self.publisher.queue_change(node_id, type_definition, verb);
    }
}

/// Mutable structural state, guarded by the engine's structural mutex.
#[derive(Debug, Default)]
pub(crate) struct StructuralState {
    pub registry: SubjectNodeRegistry,
    pub root: Option<SubjectId>,
    /// Subjects to revisit when the current operation settles.
    pub lost: Vec<LostSlot>,
}

impl StructuralState {
    pub fn clear(&mut self) {
        self.registry.clear();
        self.root = None;
        self.lost.clear();
    }
}

/// A structural operation in progress.
pub(crate) struct StructuralScope<'a> {
    pub state: &'a mut StructuralState,
    pub shared: &'a EngineShared,
}

impl<'a> StructuralScope<'a> {
    pub fn new(state: &'a mut StructuralState, shared: &'a EngineShared) -> Self {
        Self { state, shared }
    }
}
