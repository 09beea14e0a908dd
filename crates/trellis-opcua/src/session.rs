// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client sessions.
//!
//! A session is the request boundary of the engine. Every service call is
//! checked against the session and engine state, and any failure, including
//! a panic raised while serving it, is logged and returned as a status code
//! instead of escaping to the caller.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use trellis_core::Value;
use uuid::Uuid;

use crate::address_space::{DataChangeNotification, NodeAttributes};
use crate::engine::EngineInner;
use crate::error::{NodeError, SessionError, SyncError, SyncResult};
use crate::external::{add_node, delete_node, AddNodesItem, AddNodesResult};
use crate::publisher::ModelChangeNotification;
use crate::types::{DataValue, NodeId, NodeKind, QualifiedName, StatusCode};

/// One entry of a Browse response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceDescription {
    /// Reference type from the browsed node.
    pub reference_type: NodeId,
    /// Target node.
    pub node_id: NodeId,
    /// Target browse name.
    pub browse_name: QualifiedName,
    /// Target display name.
    pub display_name: String,
    /// Target node class.
    pub node_class: NodeKind,
    /// Target type definition.
    pub type_definition: NodeId,
}

/// A client session on a running engine.
pub struct Session {
    id: Uuid,
    engine: Arc<EngineInner>,
    closed: AtomicBool,
}

impl Session {
    /// Wraps an already admitted session slot.
    pub(crate) fn new(engine: Arc<EngineInner>) -> Self {
        let id = Uuid::new_v4();
        debug!(session = %id, "Session opened");
        Self {
            id,
            engine,
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the session id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns `true` once the session was closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Closes the session and releases its slot.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.engine.sessions.fetch_sub(1, Ordering::SeqCst);
            debug!(session = %self.id, "Session closed");
        }
    }

    fn check(&self) -> SyncResult<()> {
        if self.is_closed() {
            return Err(SessionError::Closed {
                session_id: self.id.to_string(),
            }
            .into());
        }
        if !self.engine.is_active() {
            return Err(SessionError::Shutdown.into());
        }
        Ok(())
    }

    /// Runs one service call behind the session checks.
    fn serve<T>(&self, service: &str, call: impl FnOnce(&EngineInner) -> SyncResult<T>) -> SyncResult<T> {
        self.check()?;
        let engine = &*self.engine;
        let result = match catch_unwind(AssertUnwindSafe(|| call(engine))) {
            Ok(result) => result,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!(session = %self.id, service, "Service call panicked");
                Err(SyncError::unexpected(message))
            }
        };
        if let Err(e) = &result {
            e.log(service);
        }
        result
    }

    // =========================================================================
    // View services
    // =========================================================================

    /// Lists the forward hierarchical references of a node.
    pub fn browse(&self, node_id: &NodeId) -> SyncResult<Vec<ReferenceDescription>> {
        self.serve("browse", |engine| {
            let space = &engine.shared.space;
            let handle = space.handle_of(node_id).ok_or_else(|| SyncError::node_unknown(node_id))?;
            Ok(space
                .children(handle)
                .into_iter()
                .map(|(reference_type, child)| {
                    let attributes = child.attributes();
                    ReferenceDescription {
                        reference_type,
                        node_id: attributes.node_id,
                        browse_name: attributes.browse_name,
                        display_name: attributes.display_name,
                        node_class: child.kind(),
                        type_definition: attributes.type_definition,
                    }
                })
                .collect())
        })
    }

    /// Returns the attributes of a node.
    pub fn node_attributes(&self, node_id: &NodeId) -> SyncResult<NodeAttributes> {
        self.serve("node_attributes", |engine| {
            engine
                .shared
                .space
                .find(node_id)
                .map(|node| node.attributes())
                .ok_or_else(|| SyncError::node_unknown(node_id))
        })
    }

    // =========================================================================
    // Attribute services
    // =========================================================================

    /// Reads the value of a variable.
    pub fn read(&self, node_id: &NodeId) -> SyncResult<DataValue> {
        self.serve("read", |engine| {
            let node = engine
                .shared
                .space
                .find(node_id)
                .ok_or_else(|| SyncError::node_unknown(node_id))?;
            let variable = node.variable().ok_or_else(|| NodeError::NotReadable {
                node_id: node_id.to_string(),
            })?;
            variable.read().ok_or_else(|| SyncError::node_unknown(node_id))
        })
    }

    /// Writes the value of a variable.
    ///
    /// The value is forwarded to the source property first; the variable
    /// is only updated when the graph accepted it.
    pub fn write(&self, node_id: &NodeId, value: Value) -> SyncResult<()> {
        self.serve("write", |engine| {
            let space = &engine.shared.space;
            let node = space.find(node_id).ok_or_else(|| SyncError::node_unknown(node_id))?;
            let not_writable = || NodeError::NotWritable {
                node_id: node_id.to_string(),
            };
            let variable = node.variable().ok_or_else(not_writable)?;
            if !variable.access_level().is_writable() {
                return Err(not_writable().into());
            }
            let hook = variable.write_hook().ok_or_else(not_writable)?;

            let current = variable.read().ok_or_else(|| SyncError::node_unknown(node_id))?;
            if !value.is_compatible_with(&current.value) {
                return Err(NodeError::TypeMismatch {
                    node_id: node_id.to_string(),
                    expected: current.value.type_name().to_string(),
                    actual: value.type_name().to_string(),
                }
                .into());
            }

            let written_at = Utc::now();
            hook(value.clone(), written_at)?;
            space.update_node_value(&node, value, written_at);
            Ok(())
        })
    }

    // =========================================================================
    // Node management services
    // =========================================================================

    /// Creates subjects for each item and returns one result per item.
    pub fn add_nodes(&self, items: &[AddNodesItem]) -> SyncResult<Vec<AddNodesResult>> {
        self.check()?;
        Ok(items
            .iter()
            .map(|item| AddNodesResult::from_result(self.serve("add_nodes", |engine| add_node(engine, item))))
            .collect())
    }

    /// Removes the subjects bound to each node and returns one status per
    /// node.
    pub fn delete_nodes(&self, node_ids: &[NodeId]) -> SyncResult<Vec<StatusCode>> {
        self.check()?;
        Ok(node_ids
            .iter()
            .map(|node_id| match self.serve("delete_nodes", |engine| delete_node(engine, node_id)) {
                Ok(()) => StatusCode::GOOD,
                Err(e) => e.status_code(),
            })
            .collect())
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Subscribes to structural change notifications.
    pub fn subscribe_model_changes(&self) -> SyncResult<broadcast::Receiver<Arc<ModelChangeNotification>>> {
        self.check()?;
        Ok(self.engine.shared.publisher.subscribe())
    }

    /// Subscribes to variable value updates.
    pub fn subscribe_data_changes(&self) -> SyncResult<broadcast::Receiver<DataChangeNotification>> {
        self.check()?;
        Ok(self.engine.shared.space.subscribe_data_changes())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}
