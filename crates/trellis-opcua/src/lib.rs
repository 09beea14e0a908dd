// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA address-space synchronization for Trellis subject graphs.
//!
//! This crate mirrors a live subject graph onto an in-memory OPC UA address
//! space and keeps both sides consistent while either one changes:
//!
//! - Subjects become Object nodes, value properties become Variables,
//!   collections and dictionaries become folders or flat children.
//! - Structural graph changes are applied incrementally; collection entries
//!   are re-indexed so browse names and ids stay positional.
//! - A subject reachable through several slots owns exactly one node and is
//!   removed only when its last slot goes away.
//! - Value changes are coalesced and flushed on a fixed period.
//! - Client writes and AddNodes/DeleteNodes requests flow back into the
//!   graph through the subject context.
//!
//! # Error Handling
//!
//! ```text
//! SyncError
//! ├── Structural    - Rejected AddNodes/DeleteNodes requests
//! ├── Node          - Address-space store failures
//! ├── Session       - Session lifecycle errors
//! ├── Startup       - Endpoint failures while starting
//! ├── Configuration - Invalid settings or identifiers
//! └── Graph         - Errors reported by the subject graph
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_opcua::SynchronizationEngine;
//!
//! let engine = SynchronizationEngine::new(config.server, context.clone());
//! engine.start(root).await?;
//!
//! let session = engine.open_session()?;
//! for reference in session.browse(&engine.node_id_of(root_id).unwrap())? {
//!     println!("{} {}", reference.node_id, reference.browse_name);
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod address_space;
pub mod engine;
pub mod error;
pub mod external;
pub mod host;
pub mod identifiers;
pub mod publisher;
pub mod session;
pub mod sync;
pub mod types;
pub mod values;

pub use error::{
    ConfigurationError, ErrorCode, ErrorSeverity, NodeError, SessionError, StartupError,
    StructuralError, SyncError, SyncResult,
};

pub use types::{
    AccessLevel, DataValue, ModelChangeVerb, NamespaceTable, NodeId, NodeIdentifier, NodeKind,
    QualifiedName, StatusCode,
};

pub use address_space::{
    AddressSpace, DataChangeNotification, NodeAttributes, NodeHandle, ProtocolNode, VariableNode,
};

pub use engine::SynchronizationEngine;
pub use external::{AddNodesItem, AddNodesResult};
pub use host::{EngineHost, LocalEndpoint, ServerEndpoint};
pub use identifiers::{IdentifierCategory, IdentifierResolver};
pub use publisher::{ModelChange, ModelChangeNotification};
pub use session::{ReferenceDescription, Session};
pub use sync::{resolve_property_path, ChildSlot, SlotKey};
pub use values::ValueChangeBuffer;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
