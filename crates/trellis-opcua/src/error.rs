// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the synchronization engine.
//!
//! Every error maps to an OPC UA [`StatusCode`] so that failures surface at
//! the protocol boundary as status values rather than crashes.
//!
//! # Error Categories
//!
//! ```text
//! SyncError
//! ├── Structural    - Rejected AddNodes/DeleteNodes requests
//! ├── Node          - Address-space store failures
//! ├── Session       - Session lifecycle errors
//! ├── Startup       - Endpoint failures while starting (retryable)
//! ├── Configuration - Invalid settings or identifiers
//! └── Graph         - Errors reported by the subject graph
//! ```
//!
//! # Examples
//!
//! ```
//! use trellis_opcua::error::{SyncError, StructuralError};
//! use trellis_opcua::types::StatusCode;
//!
//! let error = SyncError::from(StructuralError::unknown_type("ns=2;s=RobotType"));
//! assert_eq!(error.status_code(), StatusCode::BAD_TYPE_DEFINITION_INVALID);
//! assert!(!error.is_retryable());
//! ```

use std::fmt;

use thiserror::Error;
use tracing::Level;
use trellis_core::GraphError;

use crate::types::StatusCode;

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

// =============================================================================
// SyncError - Main Error Type
// =============================================================================

/// The main error type of the synchronization engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A remote structural request was rejected.
    #[error("{0}")]
    Structural(#[from] StructuralError),

    /// An address-space operation failed.
    #[error("{0}")]
    Node(#[from] NodeError),

    /// Session lifecycle errors.
    #[error("{0}")]
    Session(#[from] SessionError),

    /// Startup failures.
    #[error("{0}")]
    Startup(#[from] StartupError),

    /// Configuration errors.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// The subject graph refused an operation.
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),
}

impl SyncError {
    // =========================================================================
    // Factory Methods
    // =========================================================================

    /// Creates an error for an unexpected failure at a protocol boundary.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Structural(StructuralError::Unexpected {
            message: message.into(),
        })
    }

    /// Creates a node-not-found error.
    pub fn node_unknown(node_id: impl fmt::Display) -> Self {
        Self::Node(NodeError::unknown(node_id))
    }

    /// Creates an invalid node id error.
    pub fn invalid_node_id(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration(ConfigurationError::invalid_node_id(node_id, reason))
    }

    // =========================================================================
    // Error Classification
    // =========================================================================

    /// Returns the OPC UA status code reported to clients.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Structural(e) => e.status_code(),
            Self::Node(e) => e.status_code(),
            Self::Session(e) => e.status_code(),
            Self::Startup(_) => StatusCode::BAD_INTERNAL_ERROR,
            Self::Configuration(e) => e.status_code(),
            Self::Graph(e) => graph_status(e),
        }
    }

    /// Returns `true` if retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Startup(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Structural(e) => e.severity(),
            Self::Node(_) => ErrorSeverity::Warning,
            Self::Session(_) => ErrorSeverity::Info,
            Self::Startup(e) => e.severity(),
            Self::Configuration(_) => ErrorSeverity::Critical,
            Self::Graph(_) => ErrorSeverity::Warning,
        }
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Structural(_) => "structural",
            Self::Node(_) => "node",
            Self::Session(_) => "session",
            Self::Startup(_) => "startup",
            Self::Configuration(_) => "configuration",
            Self::Graph(_) => "graph",
        }
    }

    /// Returns a unique error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Structural(e) => e.error_code(),
            Self::Node(e) => e.error_code(),
            Self::Session(e) => e.error_code(),
            Self::Startup(e) => e.error_code(),
            Self::Configuration(e) => e.error_code(),
            Self::Graph(e) => match e {
                GraphError::UnknownProperty { .. } => ErrorCode::new(6, 1),
                GraphError::KindMismatch { .. } => ErrorCode::new(6, 2),
                GraphError::TypeMismatch { .. } => ErrorCode::new(6, 3),
                GraphError::NotWritable { .. } => ErrorCode::new(6, 4),
            },
        }
    }

    /// Returns the tracing level for this error.
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Logs this error with appropriate level and context.
    pub fn log(&self, context: &str) {
        let code = self.error_code();
        match self.tracing_level() {
            Level::ERROR => tracing::error!(
                error_code = %code,
                category = self.category(),
                context = context,
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                error_code = %code,
                category = self.category(),
                context = context,
                "{self}"
            ),
            _ => tracing::debug!(
                error_code = %code,
                category = self.category(),
                context = context,
                "{self}"
            ),
        }
    }
}

fn graph_status(error: &GraphError) -> StatusCode {
    match error {
        GraphError::UnknownProperty { .. } => StatusCode::BAD_NODE_ID_UNKNOWN,
        GraphError::KindMismatch { .. } => StatusCode::BAD_REFERENCE_NOT_ALLOWED,
        GraphError::TypeMismatch { .. } => StatusCode::BAD_TYPE_MISMATCH,
        GraphError::NotWritable { .. } => StatusCode::BAD_NOT_WRITABLE,
    }
}

// =============================================================================
// StructuralError
// =============================================================================

/// Rejections of remote AddNodes/DeleteNodes requests.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StructuralError {
    /// Remote node management is disabled or not configured.
    #[error("Remote node management unsupported: {reason}")]
    Unsupported {
        /// Why the request cannot be served.
        reason: String,
    },

    /// The requested type is not registered.
    #[error("Unknown type definition: {type_id}")]
    UnknownType {
        /// Requested type identifier.
        type_id: String,
    },

    /// The parent node does not map to a subject.
    #[error("Parent node cannot hold subjects: {parent}")]
    UnknownParent {
        /// Requested parent node id.
        parent: String,
    },

    /// No property of the parent subject accepts the new node.
    #[error("No property of {parent} accepts '{browse_name}'")]
    NoAcceptingProperty {
        /// Parent node id.
        parent: String,
        /// Requested browse name.
        browse_name: String,
    },

    /// The new subject's type is incompatible with the target property.
    #[error("Type mismatch: {message}")]
    TypeMismatch {
        /// Details.
        message: String,
    },

    /// The node to delete is not bound to a subject.
    #[error("Node not found: {node_id}")]
    NotFound {
        /// Requested node id.
        node_id: String,
    },

    /// Any other failure inside a protocol-facing call.
    #[error("Unexpected failure: {message}")]
    Unexpected {
        /// Details.
        message: String,
    },
}

impl StructuralError {
    /// Creates an unsupported error.
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Self::Unsupported {
            reason: reason.into(),
        }
    }

    /// Creates an unknown type error.
    pub fn unknown_type(type_id: impl Into<String>) -> Self {
        Self::UnknownType {
            type_id: type_id.into(),
        }
    }

    /// Creates an unknown parent error.
    pub fn unknown_parent(parent: impl fmt::Display) -> Self {
        Self::UnknownParent {
            parent: parent.to_string(),
        }
    }

    /// Creates a no-accepting-property error.
    pub fn no_accepting_property(parent: impl fmt::Display, browse_name: impl Into<String>) -> Self {
        Self::NoAcceptingProperty {
            parent: parent.to_string(),
            browse_name: browse_name.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(node_id: impl fmt::Display) -> Self {
        Self::NotFound {
            node_id: node_id.to_string(),
        }
    }

    /// Returns the OPC UA status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unsupported { .. } => StatusCode::BAD_SERVICE_UNSUPPORTED,
            Self::UnknownType { .. } => StatusCode::BAD_TYPE_DEFINITION_INVALID,
            Self::UnknownParent { .. } => StatusCode::BAD_PARENT_NODE_ID_INVALID,
            Self::NoAcceptingProperty { .. } => StatusCode::BAD_REFERENCE_NOT_ALLOWED,
            Self::TypeMismatch { .. } => StatusCode::BAD_TYPE_MISMATCH,
            Self::NotFound { .. } => StatusCode::BAD_NODE_ID_UNKNOWN,
            Self::Unexpected { .. } => StatusCode::BAD_UNEXPECTED_ERROR,
        }
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Unexpected { .. } => ErrorSeverity::Error,
            Self::Unsupported { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Info,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Unsupported { .. } => ErrorCode::new(1, 1),
            Self::UnknownType { .. } => ErrorCode::new(1, 2),
            Self::UnknownParent { .. } => ErrorCode::new(1, 3),
            Self::NoAcceptingProperty { .. } => ErrorCode::new(1, 4),
            Self::TypeMismatch { .. } => ErrorCode::new(1, 5),
            Self::NotFound { .. } => ErrorCode::new(1, 6),
            Self::Unexpected { .. } => ErrorCode::new(1, 0xFF),
        }
    }
}

// =============================================================================
// NodeError
// =============================================================================

/// Failures of the address-space store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodeError {
    /// A node with the same id already exists.
    #[error("Node already exists: {node_id}")]
    Exists {
        /// Conflicting node id.
        node_id: String,
    },

    /// No node with this id exists.
    #[error("Node not found: {node_id}")]
    Unknown {
        /// Requested node id.
        node_id: String,
    },

    /// The node's value cannot be written.
    #[error("Node is not writable: {node_id}")]
    NotWritable {
        /// Target node id.
        node_id: String,
    },

    /// The node has no value to read.
    #[error("Node is not readable: {node_id}")]
    NotReadable {
        /// Target node id.
        node_id: String,
    },

    /// A written value does not match the variable's data type.
    #[error("Type mismatch writing {node_id}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Target node id.
        node_id: String,
        /// Current value type.
        expected: String,
        /// Written value type.
        actual: String,
    },
}

impl NodeError {
    /// Creates a node-exists error.
    pub fn exists(node_id: impl fmt::Display) -> Self {
        Self::Exists {
            node_id: node_id.to_string(),
        }
    }

    /// Creates a node-unknown error.
    pub fn unknown(node_id: impl fmt::Display) -> Self {
        Self::Unknown {
            node_id: node_id.to_string(),
        }
    }

    /// Returns the OPC UA status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Exists { .. } => StatusCode::BAD_NODE_ID_EXISTS,
            Self::Unknown { .. } => StatusCode::BAD_NODE_ID_UNKNOWN,
            Self::NotWritable { .. } => StatusCode::BAD_NOT_WRITABLE,
            Self::NotReadable { .. } => StatusCode::BAD_NOT_READABLE,
            Self::TypeMismatch { .. } => StatusCode::BAD_TYPE_MISMATCH,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Exists { .. } => ErrorCode::new(2, 1),
            Self::Unknown { .. } => ErrorCode::new(2, 2),
            Self::NotWritable { .. } => ErrorCode::new(2, 3),
            Self::NotReadable { .. } => ErrorCode::new(2, 4),
            Self::TypeMismatch { .. } => ErrorCode::new(2, 5),
        }
    }
}

// =============================================================================
// SessionError
// =============================================================================

/// Session lifecycle errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The engine is shutting down or stopped.
    #[error("Server is shutting down")]
    Shutdown,

    /// The session was closed.
    #[error("Session closed: {session_id}")]
    Closed {
        /// Session id.
        session_id: String,
    },

    /// The session limit has been reached.
    #[error("Too many sessions (max {max})")]
    TooMany {
        /// Configured maximum.
        max: usize,
    },
}

impl SessionError {
    /// Returns the OPC UA status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Shutdown => StatusCode::BAD_SHUTDOWN,
            Self::Closed { .. } => StatusCode::BAD_SESSION_CLOSED,
            Self::TooMany { .. } => StatusCode::BAD_TOO_MANY_SESSIONS,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Shutdown => ErrorCode::new(3, 1),
            Self::Closed { .. } => ErrorCode::new(3, 2),
            Self::TooMany { .. } => ErrorCode::new(3, 3),
        }
    }
}

// =============================================================================
// StartupError
// =============================================================================

/// Failures while bringing the engine up.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StartupError {
    /// The endpoint could not be opened.
    #[error("Endpoint '{endpoint}' unavailable: {message}")]
    EndpointUnavailable {
        /// Endpoint description.
        endpoint: String,
        /// Details.
        message: String,
    },

    /// Certificate material could not be loaded.
    #[error("Certificate error: {message}")]
    Certificate {
        /// Details.
        message: String,
    },

    /// The engine is already running.
    #[error("Engine is already running")]
    AlreadyRunning,

    /// The endpoint stopped while serving.
    #[error("Endpoint '{endpoint}' failed: {message}")]
    EndpointFailed {
        /// Endpoint description.
        endpoint: String,
        /// Details.
        message: String,
    },
}

impl StartupError {
    /// Creates an endpoint-unavailable error.
    pub fn endpoint_unavailable(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EndpointUnavailable {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Returns `true` for transient failures.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::AlreadyRunning)
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::AlreadyRunning => ErrorSeverity::Error,
            _ => ErrorSeverity::Warning,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::EndpointUnavailable { .. } => ErrorCode::new(4, 1),
            Self::Certificate { .. } => ErrorCode::new(4, 2),
            Self::AlreadyRunning => ErrorCode::new(4, 3),
            Self::EndpointFailed { .. } => ErrorCode::new(4, 4),
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Configuration and identifier errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// A node id string could not be parsed.
    #[error("Invalid node id '{node_id}': {reason}")]
    InvalidNodeId {
        /// Offending text.
        node_id: String,
        /// Why it is invalid.
        reason: String,
    },

    /// A namespace URI is not registered.
    #[error("Unknown namespace: {uri}")]
    UnknownNamespace {
        /// Namespace URI.
        uri: String,
    },

    /// Remote node management is enabled without a type registry.
    #[error("Remote node management is enabled but no type registry is configured")]
    MissingTypeRegistry,
}

impl ConfigurationError {
    /// Creates an invalid node id error.
    pub fn invalid_node_id(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    /// Returns the OPC UA status code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidNodeId { .. } => StatusCode::BAD_NODE_ID_INVALID,
            Self::UnknownNamespace { .. } => StatusCode::BAD_NODE_ID_INVALID,
            Self::MissingTypeRegistry => StatusCode::BAD_SERVICE_UNSUPPORTED,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidNodeId { .. } => ErrorCode::new(5, 1),
            Self::UnknownNamespace { .. } => ErrorCode::new(5, 2),
            Self::MissingTypeRegistry => ErrorCode::new(5, 3),
        }
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational - expected rejection.
    Info,
    /// Warning - action may be required.
    Warning,
    /// Error - action required, but recoverable.
    Error,
    /// Critical - immediate action required.
    Critical,
}

impl ErrorSeverity {
    /// Converts to tracing level.
    pub fn to_tracing_level(self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error => Level::ERROR,
            Self::Critical => Level::ERROR,
        }
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Structured error code.
///
/// Format: `TR-XXYY` where XX is category and YY is specific error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category.
    pub category: u8,
    /// Specific error within category.
    pub code: u8,
}

impl ErrorCode {
    /// Creates a new error code.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }

    /// Returns the full error code as a u16.
    pub fn as_u16(&self) -> u16 {
        ((self.category as u16) << 8) | (self.code as u16)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TR-{:02X}{:02X}", self.category, self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_status_mapping() {
        let cases = [
            (StructuralError::unsupported("disabled"), StatusCode::BAD_SERVICE_UNSUPPORTED),
            (StructuralError::unknown_type("X"), StatusCode::BAD_TYPE_DEFINITION_INVALID),
            (StructuralError::unknown_parent("ns=2;s=A"), StatusCode::BAD_PARENT_NODE_ID_INVALID),
            (
                StructuralError::no_accepting_property("ns=2;s=A", "People[6]"),
                StatusCode::BAD_REFERENCE_NOT_ALLOWED,
            ),
            (StructuralError::not_found("ns=2;s=A"), StatusCode::BAD_NODE_ID_UNKNOWN),
        ];
        for (error, status) in cases {
            assert_eq!(SyncError::from(error).status_code(), status);
        }
    }

    #[test]
    fn test_graph_error_mapping() {
        let error = SyncError::from(GraphError::type_mismatch("People", "Person", "Robot"));
        assert_eq!(error.status_code(), StatusCode::BAD_TYPE_MISMATCH);
        assert_eq!(error.category(), "graph");
    }

    #[test]
    fn test_startup_retryable() {
        let error = SyncError::from(StartupError::endpoint_unavailable("local", "port busy"));
        assert!(error.is_retryable());
        assert!(!SyncError::from(StartupError::AlreadyRunning).is_retryable());
        assert!(!SyncError::from(SessionError::Shutdown).is_retryable());
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::new(1, 4).to_string(), "TR-0104");
        assert_eq!(ErrorCode::new(1, 4).as_u16(), 0x0104);
        assert_eq!(
            SyncError::from(StructuralError::unknown_type("X")).error_code().to_string(),
            "TR-0102"
        );
    }

    #[test]
    fn test_severity_levels() {
        assert_eq!(ErrorSeverity::Critical.to_tracing_level(), Level::ERROR);
        assert_eq!(
            SyncError::from(ConfigurationError::MissingTypeRegistry).severity(),
            ErrorSeverity::Critical
        );
    }
}
