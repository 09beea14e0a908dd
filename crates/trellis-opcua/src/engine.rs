// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The synchronization engine.
//!
//! # Lifecycle
//!
//! ```text
//!            start(root)                         shutdown()
//!  Stopped ──────────────► Running ─────────────────────────► Stopped
//!             │                │                      │
//!             │ register       │ graph events         │ deregister listener
//!             │ listener and   │  structural ─► lock  │ stop flush loop
//!             │ build the      │  values ─► buffer    │ clear registry,
//!             │ address space  │                      │ nodes and queue
//!             │ atomically     │ sessions             │ refuse sessions
//! ```
//!
//! # Locking
//!
//! Structural events arrive while the context's structure lock is held, and
//! the engine then takes its own structural mutex. Code that mutates the
//! graph on behalf of a client must therefore never hold the engine mutex
//! while calling into the context.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info};
use trellis_config::ServerConfig;
use trellis_core::{
    ChangeOrigin, GraphEvent, GraphListener, ListenerGuard, Subject, SubjectContext, SubjectId,
    TypeRegistry,
};

use crate::address_space::{AddressSpace, DataChangeNotification, ProtocolNode};
use crate::error::{
    ConfigurationError, SessionError, StartupError, StructuralError, SyncError, SyncResult,
};
use crate::publisher::ModelChangeNotification;
use crate::session::Session;
use crate::sync::paths::property_path;
use crate::sync::{resolve_property_path, EngineShared, StructuralScope, StructuralState};
use crate::types::{NamespaceTable, NodeId};
use crate::values::{FlushLoop, ValueChangeBuffer};

/// Resources held while the engine runs.
struct Running {
    _listener: ListenerGuard,
    flush: Option<FlushLoop>,
}

pub(crate) struct EngineInner {
    pub shared: EngineShared,
    pub structure: Mutex<StructuralState>,
    pub types: Option<Arc<TypeRegistry>>,
    values: Arc<ValueChangeBuffer>,
    running: Mutex<Option<Running>>,
    active: AtomicBool,
    pub sessions: AtomicUsize,
    management_warned: AtomicBool,
}

impl EngineInner {
    /// Returns `true` while sessions may be served.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Returns the type registry when remote node management is usable.
    ///
    /// A misconfiguration is logged once and then rejected silently.
    pub fn node_management(&self) -> SyncResult<&TypeRegistry> {
        if !self.shared.config.enable_external_node_management {
            return Err(StructuralError::unsupported("remote node management is disabled").into());
        }
        match &self.types {
            Some(types) => Ok(types),
            None => {
                if !self.management_warned.swap(true, Ordering::Relaxed) {
                    SyncError::from(ConfigurationError::MissingTypeRegistry)
                        .log("node management");
                }
                Err(StructuralError::unsupported("no type registry configured").into())
            }
        }
    }

    fn handle_event(&self, event: &GraphEvent) {
        if !self.is_active() {
            return;
        }
        match event {
            GraphEvent::ValueChanged {
                property,
                value,
                changed_at,
                origin,
            } => {
                // Protocol writes update their node themselves and supersede
                // any older local value still buffered.
                if matches!(origin, ChangeOrigin::Protocol { .. }) {
                    self.values.discard(&property.key());
                    return;
                }
                if self.shared.config.buffer_time_ms == 0 {
                    self.shared
                        .space
                        .update_value(&property.key(), value.clone(), *changed_at);
                } else {
                    self.values.push(property.key(), value.clone(), *changed_at);
                }
            }
            _ => {
                let mut state = self.structure.lock();
                if !self.is_active() {
                    return;
                }
                if let Err(e) = StructuralScope::new(&mut state, &self.shared).apply_event(event) {
                    e.log(event.name());
                }
                self.shared.publisher.flush();
            }
        }
    }
}

struct EngineListener {
    engine: Weak<EngineInner>,
}

impl GraphListener for EngineListener {
    fn on_graph_event(&self, event: &GraphEvent) {
        if let Some(engine) = self.engine.upgrade() {
            engine.handle_event(event);
        }
    }
}

// =============================================================================
// SynchronizationEngine
// =============================================================================

/// Mirrors one subject graph onto an address space.
///
/// # Example
///
/// ```rust,ignore
/// let engine = SynchronizationEngine::new(config, context.clone());
/// engine.start(root.clone()).await?;
///
/// let session = engine.open_session()?;
/// let value = session.read(&"ns=2;s=Root.Name".parse()?)?;
///
/// engine.shutdown().await;
/// ```
#[derive(Clone)]
pub struct SynchronizationEngine {
    inner: Arc<EngineInner>,
}

impl SynchronizationEngine {
    /// Creates a stopped engine without remote node management.
    pub fn new(config: impl Into<Arc<ServerConfig>>, context: SubjectContext) -> Self {
        Self::build(config.into(), context, None)
    }

    /// Creates a stopped engine able to instantiate subjects for AddNodes.
    pub fn with_type_registry(
        config: impl Into<Arc<ServerConfig>>,
        context: SubjectContext,
        types: Arc<TypeRegistry>,
    ) -> Self {
        Self::build(config.into(), context, Some(types))
    }

    fn build(config: Arc<ServerConfig>, context: SubjectContext, types: Option<Arc<TypeRegistry>>) -> Self {
        let shared = EngineShared::new(config, context);
        if let Some(types) = &types {
            shared.load_type_nodes(types);
        }
        Self {
            inner: Arc::new(EngineInner {
                shared,
                structure: Mutex::new(StructuralState::default()),
                types,
                values: Arc::new(ValueChangeBuffer::new()),
                running: Mutex::new(None),
                active: AtomicBool::new(false),
                sessions: AtomicUsize::new(0),
                management_warned: AtomicBool::new(false),
            }),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Builds the address space for `root` and starts following the graph.
    ///
    /// The listener is registered and the initial build runs under the
    /// context's structure lock, so no structural change is missed or
    /// applied twice.
    pub async fn start(&self, root: Arc<Subject>) -> SyncResult<()> {
        let mut running = self.inner.running.lock();
        if running.is_some() {
            return Err(StartupError::AlreadyRunning.into());
        }

        let listener = Arc::new(EngineListener {
            engine: Arc::downgrade(&self.inner),
        });
        let inner = &self.inner;
        let (guard, built) = inner.shared.context.subscribe_with(listener, || {
            inner.active.store(true, Ordering::SeqCst);
            let mut state = inner.structure.lock();
            let built = StructuralScope::new(&mut state, &inner.shared).attach_root(&root);
            inner.shared.publisher.flush();
            built
        });

        if let Err(e) = built {
            inner.active.store(false, Ordering::SeqCst);
            drop(guard);
            self.clear();
            return Err(e);
        }

        let period = inner.shared.config.buffer_time();
        let flush = (!period.is_zero())
            .then(|| FlushLoop::start(inner.values.clone(), inner.shared.space.clone(), period));
        *running = Some(Running {
            _listener: guard,
            flush,
        });
        info!(
            application = %inner.shared.config.application_name,
            root = %root,
            subjects = self.subject_count(),
            "Synchronization engine started"
        );
        Ok(())
    }

    /// Stops following the graph and releases every binding and node.
    ///
    /// Structural work already in progress completes first. New sessions
    /// and requests on open sessions are refused from here on.
    pub async fn shutdown(&self) {
        let running = self.inner.running.lock().take();
        let Some(running) = running else {
            return;
        };
        self.inner.active.store(false, Ordering::SeqCst);

        let Running {
            _listener: listener,
            flush,
        } = running;
        drop(listener);
        if let Some(flush) = flush {
            flush.stop().await;
        }
        self.clear();
        info!("Synchronization engine stopped");
    }

    fn clear(&self) {
        let mut state = self.inner.structure.lock();
        state.clear();
        self.inner.shared.space.clear();
        self.inner.shared.publisher.clear();
        self.inner.values.clear();
        debug!("Engine state cleared");
    }

    /// Returns `true` between a successful start and shutdown.
    pub fn is_running(&self) -> bool {
        self.inner.is_active()
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Opens a client session.
    pub fn open_session(&self) -> SyncResult<Session> {
        if !self.inner.is_active() {
            return Err(SessionError::Shutdown.into());
        }
        let max = self.inner.shared.config.max_sessions;
        let admitted = self
            .inner
            .sessions
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |open| (open < max).then_some(open + 1));
        if admitted.is_err() {
            return Err(SessionError::TooMany { max }.into());
        }
        Ok(Session::new(self.inner.clone()))
    }

    /// Returns the number of open sessions.
    pub fn session_count(&self) -> usize {
        self.inner.sessions.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Returns the address space.
    pub fn address_space(&self) -> &Arc<AddressSpace> {
        &self.inner.shared.space
    }

    /// Returns the namespace table.
    pub fn namespaces(&self) -> &Arc<NamespaceTable> {
        &self.inner.shared.namespaces
    }

    /// Returns the namespace index of subject nodes.
    pub fn namespace_index(&self) -> u16 {
        self.inner.shared.namespace_index
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.inner.shared.config
    }

    /// Returns the subject context being mirrored.
    pub fn context(&self) -> &SubjectContext {
        &self.inner.shared.context
    }

    /// Subscribes to structural change notifications.
    pub fn subscribe_model_changes(&self) -> broadcast::Receiver<Arc<ModelChangeNotification>> {
        self.inner.shared.publisher.subscribe()
    }

    /// Subscribes to variable value updates.
    pub fn subscribe_data_changes(&self) -> broadcast::Receiver<DataChangeNotification> {
        self.inner.shared.space.subscribe_data_changes()
    }

    /// Returns the number of bound subjects.
    pub fn subject_count(&self) -> usize {
        self.inner.structure.lock().registry.len()
    }

    /// Returns how many live slots hold `subject` (0 when unbound).
    pub fn ref_count(&self, subject: SubjectId) -> usize {
        self.inner.structure.lock().registry.ref_count(subject)
    }

    /// Returns the node of a bound subject.
    pub fn node_of(&self, subject: SubjectId) -> Option<Arc<ProtocolNode>> {
        let handle = self.inner.structure.lock().registry.node_of(subject)?;
        self.inner.shared.space.get(handle)
    }

    /// Returns the id of a bound subject's node.
    pub fn node_id_of(&self, subject: SubjectId) -> Option<NodeId> {
        self.node_of(subject).map(|node| node.node_id())
    }

    /// Returns the graph path of the property a variable mirrors, e.g.
    /// `Children[2].FirstName`.
    pub fn property_path_of(&self, node_id: &NodeId) -> Option<String> {
        let node = self.inner.shared.space.find(node_id)?;
        let source = node.variable()?.source()?.clone();
        let state = self.inner.structure.lock();
        property_path(&state.registry, source.subject().id(), source.name())
    }

    /// Returns the id of the variable mirroring the property at `path`.
    pub fn resolve_path(&self, path: &str) -> Option<NodeId> {
        let root = {
            let state = self.inner.structure.lock();
            let root = state.root?;
            state.registry.get(root)?.subject.clone()
        };
        let property = resolve_property_path(&root, path)?;
        self.inner
            .shared
            .space
            .variable_for(&property.key())
            .map(|node| node.node_id())
    }

    /// Returns the number of properties with a buffered value.
    pub fn pending_values(&self) -> usize {
        self.inner.values.len()
    }
}

impl std::fmt::Debug for SynchronizationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SynchronizationEngine")
            .field("running", &self.is_running())
            .field("sessions", &self.session_count())
            .field("space", &self.inner.shared.space)
            .finish()
    }
}
