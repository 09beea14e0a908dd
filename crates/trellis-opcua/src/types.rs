// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA protocol types used by the address space.
//!
//! - **NodeId**: All four OPC UA node identifier types with parsing
//! - **NamespaceTable**: Namespace URI ↔ index mapping, used to resolve
//!   expanded `nsu=` identifiers
//! - **QualifiedName / NodeKind / AccessLevel**: node metadata
//! - **StatusCode**: protocol status values returned to clients
//! - **ModelChangeVerb**: structural change verbs
//! - **well_known**: standard node ids (folders, reference types,
//!   type definitions and data types)
//!
//! # Examples
//!
//! ```
//! use trellis_opcua::types::{NodeId, NamespaceTable};
//!
//! let node_id: NodeId = "ns=2;s=Root.People[0]".parse().unwrap();
//! assert_eq!(node_id.as_string(), Some("Root.People[0]"));
//!
//! let table = NamespaceTable::new();
//! let index = table.register("urn:trellis:subjects");
//! let expanded = table.parse_expanded("nsu=urn:trellis:subjects;s=Root").unwrap();
//! assert_eq!(expanded, NodeId::string(index, "Root"));
//! ```

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use trellis_core::Value;
use uuid::Uuid;

use crate::error::{ConfigurationError, SyncError};

// =============================================================================
// NodeId
// =============================================================================

/// OPC UA Node Identifier.
///
/// A NodeId uniquely identifies a node within the address space.
/// It consists of a namespace index and an identifier which can be
/// numeric, string, GUID, or opaque (byte string).
///
/// # Examples
///
/// ```
/// use trellis_opcua::types::NodeId;
///
/// let numeric = NodeId::numeric(0, 85);
/// assert_eq!(numeric, NodeId::OBJECTS_FOLDER);
///
/// let parsed: NodeId = "ns=2;s=Root.Name".parse().unwrap();
/// assert_eq!(parsed.to_string(), "ns=2;s=Root.Name");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Creates a numeric node ID.
    #[inline]
    pub const fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node ID.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Creates a GUID node ID.
    #[inline]
    pub fn guid(namespace_index: u16, value: Uuid) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Guid(value),
        }
    }

    /// Creates an opaque node ID.
    #[inline]
    pub fn opaque(namespace_index: u16, value: Vec<u8>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Opaque(value),
        }
    }

    // =========================================================================
    // Standard Node IDs
    // =========================================================================

    /// Root folder (i=84).
    pub const ROOT_FOLDER: NodeId = NodeId::numeric(0, 84);

    /// Objects folder (i=85).
    pub const OBJECTS_FOLDER: NodeId = NodeId::numeric(0, 85);

    /// Types folder (i=86).
    pub const TYPES_FOLDER: NodeId = NodeId::numeric(0, 86);

    /// Views folder (i=87).
    pub const VIEWS_FOLDER: NodeId = NodeId::numeric(0, 87);

    /// Server object (i=2253).
    pub const SERVER: NodeId = NodeId::numeric(0, 2253);

    // =========================================================================
    // Predicates
    // =========================================================================

    /// Returns `true` if this is a numeric node ID.
    #[inline]
    pub const fn is_numeric(&self) -> bool {
        matches!(self.identifier, NodeIdentifier::Numeric(_))
    }

    /// Returns `true` if this is a string node ID.
    #[inline]
    pub const fn is_string(&self) -> bool {
        matches!(self.identifier, NodeIdentifier::String(_))
    }

    /// Returns `true` if this node lives in the standard namespace.
    #[inline]
    pub const fn is_standard(&self) -> bool {
        self.namespace_index == 0
    }

    /// Returns `true` if this is the null node ID (ns=0;i=0).
    pub fn is_null(&self) -> bool {
        self.namespace_index == 0 && matches!(self.identifier, NodeIdentifier::Numeric(0))
    }

    /// Returns the null node ID.
    #[inline]
    pub const fn null() -> Self {
        Self::numeric(0, 0)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Returns the numeric value if this is a numeric node ID.
    pub fn as_numeric(&self) -> Option<u32> {
        match self.identifier {
            NodeIdentifier::Numeric(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the string value if this is a string node ID.
    pub fn as_string(&self) -> Option<&str> {
        match &self.identifier {
            NodeIdentifier::String(v) => Some(v),
            _ => None,
        }
    }

    // =========================================================================
    // Conversion
    // =========================================================================

    /// Converts to the OPC UA string format.
    ///
    /// Format: `ns=<namespace>;{i|s|g|b}=<identifier>`, with the `ns=` part
    /// omitted for namespace 0.
    pub fn to_opc_string(&self) -> String {
        if self.namespace_index == 0 {
            self.identifier.to_string()
        } else {
            format!("ns={};{}", self.namespace_index, self.identifier)
        }
    }

    fn invalid(s: &str, reason: impl Into<String>) -> SyncError {
        SyncError::Configuration(ConfigurationError::invalid_node_id(s, reason))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_opc_string())
    }
}

impl FromStr for NodeId {
    type Err = SyncError;

    /// Parses a NodeId from OPC UA string format.
    ///
    /// Supported formats:
    /// - `ns=2;i=1001` (numeric)
    /// - `ns=2;s=MyNode` (string)
    /// - `ns=2;g=550e8400-e29b-41d4-a716-446655440000` (GUID)
    /// - `ns=2;b=SGVsbG8=` (opaque, base64 encoded)
    /// - `i=1001` / `s=MyNode` (namespace 0)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();

        let (namespace_index, identifier_part) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns, id) = rest
                    .split_once(';')
                    .ok_or_else(|| Self::invalid(s, "Missing identifier after namespace"))?;
                let ns: u16 = ns
                    .parse()
                    .map_err(|_| Self::invalid(s, "Invalid namespace index"))?;
                (ns, id)
            }
            None => (0, s),
        };

        Ok(Self {
            namespace_index,
            identifier: parse_identifier(s, identifier_part)?,
        })
    }
}

fn parse_identifier(full: &str, part: &str) -> Result<NodeIdentifier, SyncError> {
    if let Some(id) = part.strip_prefix("i=") {
        let value: u32 = id
            .parse()
            .map_err(|_| NodeId::invalid(full, "Invalid numeric identifier"))?;
        Ok(NodeIdentifier::Numeric(value))
    } else if let Some(id) = part.strip_prefix("s=") {
        Ok(NodeIdentifier::String(id.to_string()))
    } else if let Some(id) = part.strip_prefix("g=") {
        let uuid = Uuid::parse_str(id)
            .map_err(|e| NodeId::invalid(full, format!("Invalid GUID: {}", e)))?;
        Ok(NodeIdentifier::Guid(uuid))
    } else if let Some(id) = part.strip_prefix("b=") {
        let bytes = BASE64
            .decode(id)
            .map_err(|e| NodeId::invalid(full, format!("Invalid base64: {}", e)))?;
        Ok(NodeIdentifier::Opaque(bytes))
    } else {
        Err(NodeId::invalid(
            full,
            "Unknown identifier type. Expected i=, s=, g=, or b=",
        ))
    }
}

// =============================================================================
// NodeIdentifier
// =============================================================================

/// OPC UA node identifier types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeIdentifier {
    /// Numeric identifier (used for standard nodes).
    Numeric(u32),

    /// String identifier (used for path-derived subject nodes).
    String(String),

    /// GUID identifier.
    Guid(Uuid),

    /// Opaque identifier (application-specific byte array).
    Opaque(Vec<u8>),
}

impl NodeIdentifier {
    /// Returns the identifier type prefix for OPC UA string format.
    pub const fn type_prefix(&self) -> char {
        match self {
            Self::Numeric(_) => 'i',
            Self::String(_) => 's',
            Self::Guid(_) => 'g',
            Self::Opaque(_) => 'b',
        }
    }
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "i={}", v),
            Self::String(v) => write!(f, "s={}", v),
            Self::Guid(v) => write!(f, "g={}", v),
            Self::Opaque(v) => write!(f, "b={}", BASE64.encode(v)),
        }
    }
}

// =============================================================================
// NamespaceTable
// =============================================================================

/// URI of the OPC UA standard namespace (index 0).
pub const STANDARD_NAMESPACE_URI: &str = "http://opcfoundation.org/UA/";

/// Namespace URI table of one server instance.
///
/// Index 0 is always the standard namespace. Registering a URI twice
/// returns the existing index.
#[derive(Debug)]
pub struct NamespaceTable {
    uris: RwLock<Vec<String>>,
}

impl NamespaceTable {
    /// Creates a table holding only the standard namespace.
    pub fn new() -> Self {
        Self {
            uris: RwLock::new(vec![STANDARD_NAMESPACE_URI.to_string()]),
        }
    }

    /// Registers a namespace URI and returns its index.
    pub fn register(&self, uri: &str) -> u16 {
        if let Some(index) = self.index_of(uri) {
            return index;
        }
        let mut uris = self.uris.write();
        if let Some(index) = uris.iter().position(|u| u == uri) {
            return index as u16;
        }
        uris.push(uri.to_string());
        (uris.len() - 1) as u16
    }

    /// Returns the index of a registered URI.
    pub fn index_of(&self, uri: &str) -> Option<u16> {
        self.uris
            .read()
            .iter()
            .position(|u| u == uri)
            .map(|i| i as u16)
    }

    /// Returns the URI at `index`.
    pub fn uri(&self, index: u16) -> Option<String> {
        self.uris.read().get(index as usize).cloned()
    }

    /// Returns all registered URIs in index order.
    pub fn uris(&self) -> Vec<String> {
        self.uris.read().clone()
    }

    /// Parses an expanded node id of the form `nsu=<uri>;<identifier>`.
    ///
    /// The URI must already be registered.
    pub fn parse_expanded(&self, s: &str) -> Result<NodeId, SyncError> {
        let s = s.trim();
        let rest = s
            .strip_prefix("nsu=")
            .ok_or_else(|| NodeId::invalid(s, "Expected nsu= prefix"))?;
        let (uri, identifier) = rest
            .rsplit_once(';')
            .ok_or_else(|| NodeId::invalid(s, "Missing identifier after namespace URI"))?;
        let namespace_index = self.index_of(uri).ok_or_else(|| {
            SyncError::Configuration(ConfigurationError::UnknownNamespace {
                uri: uri.to_string(),
            })
        })?;
        Ok(NodeId {
            namespace_index,
            identifier: parse_identifier(s, identifier)?,
        })
    }
}

impl Default for NamespaceTable {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Node Metadata
// =============================================================================

/// A browse name qualified by its namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Namespace index.
    pub namespace_index: u16,
    /// Name.
    pub name: String,
}

impl QualifiedName {
    /// Creates a qualified name.
    pub fn new(namespace_index: u16, name: impl Into<String>) -> Self {
        Self {
            namespace_index,
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace_index == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}:{}", self.namespace_index, self.name)
        }
    }
}

/// The three node kinds the engine creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Object node typed as a folder.
    Folder,
    /// Object node representing a subject.
    Object,
    /// Variable node representing a value property.
    Variable,
}

impl NodeKind {
    /// Returns the protocol node class name.
    pub const fn node_class(&self) -> &'static str {
        match self {
            Self::Folder | Self::Object => "Object",
            Self::Variable => "Variable",
        }
    }

    /// Returns `true` for variable nodes.
    #[inline]
    pub const fn is_variable(&self) -> bool {
        matches!(self, Self::Variable)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Folder => "Folder",
            Self::Object => "Object",
            Self::Variable => "Variable",
        };
        write!(f, "{}", name)
    }
}

/// Variable access level bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccessLevel(u8);

impl AccessLevel {
    /// Current value is readable.
    pub const CURRENT_READ: u8 = 0x01;
    /// Current value is writable.
    pub const CURRENT_WRITE: u8 = 0x02;

    /// Read-only access.
    pub const fn read_only() -> Self {
        Self(Self::CURRENT_READ)
    }

    /// Read-write access.
    pub const fn read_write() -> Self {
        Self(Self::CURRENT_READ | Self::CURRENT_WRITE)
    }

    /// Derives the access level from property writability.
    pub const fn for_writable(writable: bool) -> Self {
        if writable {
            Self::read_write()
        } else {
            Self::read_only()
        }
    }

    /// Returns the raw bits.
    #[inline]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Returns `true` if the current value may be written.
    #[inline]
    pub const fn is_writable(&self) -> bool {
        self.0 & Self::CURRENT_WRITE != 0
    }
}

// =============================================================================
// StatusCode
// =============================================================================

/// OPC UA status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Good.
    pub const GOOD: StatusCode = StatusCode(0x0000_0000);
    /// BadUnexpectedError.
    pub const BAD_UNEXPECTED_ERROR: StatusCode = StatusCode(0x8001_0000);
    /// BadInternalError.
    pub const BAD_INTERNAL_ERROR: StatusCode = StatusCode(0x8002_0000);
    /// BadServiceUnsupported.
    pub const BAD_SERVICE_UNSUPPORTED: StatusCode = StatusCode(0x800B_0000);
    /// BadShutdown.
    pub const BAD_SHUTDOWN: StatusCode = StatusCode(0x800C_0000);
    /// BadUserAccessDenied.
    pub const BAD_USER_ACCESS_DENIED: StatusCode = StatusCode(0x801F_0000);
    /// BadSessionClosed.
    pub const BAD_SESSION_CLOSED: StatusCode = StatusCode(0x8026_0000);
    /// BadNodeIdInvalid.
    pub const BAD_NODE_ID_INVALID: StatusCode = StatusCode(0x8033_0000);
    /// BadNodeIdUnknown.
    pub const BAD_NODE_ID_UNKNOWN: StatusCode = StatusCode(0x8034_0000);
    /// BadNotReadable.
    pub const BAD_NOT_READABLE: StatusCode = StatusCode(0x803A_0000);
    /// BadNotWritable.
    pub const BAD_NOT_WRITABLE: StatusCode = StatusCode(0x803B_0000);
    /// BadNotSupported.
    pub const BAD_NOT_SUPPORTED: StatusCode = StatusCode(0x803D_0000);
    /// BadTooManySessions.
    pub const BAD_TOO_MANY_SESSIONS: StatusCode = StatusCode(0x8056_0000);
    /// BadParentNodeIdInvalid.
    pub const BAD_PARENT_NODE_ID_INVALID: StatusCode = StatusCode(0x805B_0000);
    /// BadReferenceNotAllowed.
    pub const BAD_REFERENCE_NOT_ALLOWED: StatusCode = StatusCode(0x805C_0000);
    /// BadNodeIdRejected.
    pub const BAD_NODE_ID_REJECTED: StatusCode = StatusCode(0x805D_0000);
    /// BadNodeIdExists.
    pub const BAD_NODE_ID_EXISTS: StatusCode = StatusCode(0x805E_0000);
    /// BadNodeClassInvalid.
    pub const BAD_NODE_CLASS_INVALID: StatusCode = StatusCode(0x805F_0000);
    /// BadBrowseNameInvalid.
    pub const BAD_BROWSE_NAME_INVALID: StatusCode = StatusCode(0x8060_0000);
    /// BadTypeDefinitionInvalid.
    pub const BAD_TYPE_DEFINITION_INVALID: StatusCode = StatusCode(0x8063_0000);
    /// BadTypeMismatch.
    pub const BAD_TYPE_MISMATCH: StatusCode = StatusCode(0x8074_0000);

    /// Returns `true` for good status codes.
    #[inline]
    pub const fn is_good(&self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// Returns `true` for bad status codes.
    #[inline]
    pub const fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Returns the symbolic name.
    pub const fn name(&self) -> &'static str {
        match self.0 {
            0x0000_0000 => "Good",
            0x8001_0000 => "BadUnexpectedError",
            0x8002_0000 => "BadInternalError",
            0x800B_0000 => "BadServiceUnsupported",
            0x800C_0000 => "BadShutdown",
            0x801F_0000 => "BadUserAccessDenied",
            0x8026_0000 => "BadSessionClosed",
            0x8033_0000 => "BadNodeIdInvalid",
            0x8034_0000 => "BadNodeIdUnknown",
            0x803A_0000 => "BadNotReadable",
            0x803B_0000 => "BadNotWritable",
            0x803D_0000 => "BadNotSupported",
            0x8056_0000 => "BadTooManySessions",
            0x805B_0000 => "BadParentNodeIdInvalid",
            0x805C_0000 => "BadReferenceNotAllowed",
            0x805D_0000 => "BadNodeIdRejected",
            0x805E_0000 => "BadNodeIdExists",
            0x805F_0000 => "BadNodeClassInvalid",
            0x8060_0000 => "BadBrowseNameInvalid",
            0x8063_0000 => "BadTypeDefinitionInvalid",
            0x8074_0000 => "BadTypeMismatch",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.0)
    }
}

// =============================================================================
// ModelChangeVerb
// =============================================================================

/// Verb bits of a model change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelChangeVerb(u8);

impl ModelChangeVerb {
    /// A node was added.
    pub const NODE_ADDED: ModelChangeVerb = ModelChangeVerb(0x01);
    /// A node was deleted.
    pub const NODE_DELETED: ModelChangeVerb = ModelChangeVerb(0x02);
    /// A reference was added.
    pub const REFERENCE_ADDED: ModelChangeVerb = ModelChangeVerb(0x04);
    /// A reference was deleted.
    pub const REFERENCE_DELETED: ModelChangeVerb = ModelChangeVerb(0x08);
    /// The node's data type changed.
    pub const DATA_TYPE_CHANGED: ModelChangeVerb = ModelChangeVerb(0x10);

    /// Returns the raw bits.
    #[inline]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    /// Returns `true` if every bit of `other` is set.
    #[inline]
    pub const fn contains(&self, other: ModelChangeVerb) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ModelChangeVerb {
    type Output = ModelChangeVerb;

    fn bitor(self, rhs: Self) -> Self::Output {
        ModelChangeVerb(self.0 | rhs.0)
    }
}

impl fmt::Display for ModelChangeVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(ModelChangeVerb, &str); 5] = [
            (ModelChangeVerb::NODE_ADDED, "NodeAdded"),
            (ModelChangeVerb::NODE_DELETED, "NodeDeleted"),
            (ModelChangeVerb::REFERENCE_ADDED, "ReferenceAdded"),
            (ModelChangeVerb::REFERENCE_DELETED, "ReferenceDeleted"),
            (ModelChangeVerb::DATA_TYPE_CHANGED, "DataTypeChanged"),
        ];
        let mut first = true;
        for (verb, name) in NAMES {
            if self.contains(verb) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

// =============================================================================
// DataValue
// =============================================================================

/// A variable value with status and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
    /// Current value.
    pub value: Value,
    /// Value status.
    pub status: StatusCode,
    /// When the value changed at its source.
    pub source_timestamp: DateTime<Utc>,
    /// When the server recorded the value.
    pub server_timestamp: DateTime<Utc>,
}

impl DataValue {
    /// Creates a good data value.
    pub fn new(value: Value, source_timestamp: DateTime<Utc>) -> Self {
        Self {
            value,
            status: StatusCode::GOOD,
            source_timestamp,
            server_timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// Well-known node ids
// =============================================================================

/// Standard node ids from namespace 0.
pub mod well_known {
    use super::NodeId;

    /// References (i=31).
    pub const REFERENCES: NodeId = NodeId::numeric(0, 31);
    /// HierarchicalReferences (i=33).
    pub const HIERARCHICAL_REFERENCES: NodeId = NodeId::numeric(0, 33);
    /// HasChild (i=34).
    pub const HAS_CHILD: NodeId = NodeId::numeric(0, 34);
    /// Organizes (i=35).
    pub const ORGANIZES: NodeId = NodeId::numeric(0, 35);
    /// HasTypeDefinition (i=40).
    pub const HAS_TYPE_DEFINITION: NodeId = NodeId::numeric(0, 40);
    /// Aggregates (i=44).
    pub const AGGREGATES: NodeId = NodeId::numeric(0, 44);
    /// HasProperty (i=46).
    pub const HAS_PROPERTY: NodeId = NodeId::numeric(0, 46);
    /// HasComponent (i=47).
    pub const HAS_COMPONENT: NodeId = NodeId::numeric(0, 47);

    /// BaseObjectType (i=58).
    pub const BASE_OBJECT_TYPE: NodeId = NodeId::numeric(0, 58);
    /// FolderType (i=61).
    pub const FOLDER_TYPE: NodeId = NodeId::numeric(0, 61);
    /// BaseDataVariableType (i=63).
    pub const BASE_DATA_VARIABLE_TYPE: NodeId = NodeId::numeric(0, 63);
    /// PropertyType (i=68).
    pub const PROPERTY_TYPE: NodeId = NodeId::numeric(0, 68);

    /// BaseDataType (i=24).
    pub const BASE_DATA_TYPE: NodeId = NodeId::numeric(0, 24);

    /// GeneralModelChangeEventType (i=2133).
    pub const GENERAL_MODEL_CHANGE_EVENT_TYPE: NodeId = NodeId::numeric(0, 2133);
}

/// Returns the standard data type id matching a value's variant.
pub fn data_type_of(value: &Value) -> NodeId {
    let id = match value {
        Value::Bool(_) => 1,
        Value::Int16(_) => 4,
        Value::UInt16(_) => 5,
        Value::Int32(_) => 6,
        Value::UInt32(_) => 7,
        Value::Int64(_) => 8,
        Value::UInt64(_) => 9,
        Value::Float32(_) => 10,
        Value::Float64(_) => 11,
        Value::String(_) => 12,
        Value::DateTime(_) => 13,
        Value::Bytes(_) => 15,
        Value::Null => 24,
    };
    NodeId::numeric(0, id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_parse_and_display() {
        let cases = [
            "i=85",
            "ns=2;s=Root.People[0].FirstName",
            "ns=3;g=550e8400-e29b-41d4-a716-446655440000",
            "ns=1;b=SGVsbG8=",
        ];
        for case in cases {
            let node_id: NodeId = case.parse().unwrap();
            assert_eq!(node_id.to_string(), case);
        }
    }

    #[test]
    fn test_node_id_parse_errors() {
        assert!("ns=x;i=1".parse::<NodeId>().is_err());
        assert!("ns=2".parse::<NodeId>().is_err());
        assert!("q=1".parse::<NodeId>().is_err());
        let err = "i=abc".parse::<NodeId>().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_NODE_ID_INVALID);
    }

    #[test]
    fn test_node_id_predicates() {
        assert!(NodeId::null().is_null());
        assert!(NodeId::OBJECTS_FOLDER.is_standard());
        assert!(NodeId::OBJECTS_FOLDER.is_numeric());
        assert_eq!(NodeId::OBJECTS_FOLDER.as_numeric(), Some(85));
        assert!(!NodeId::string(2, "A").is_standard());
    }

    #[test]
    fn test_namespace_table() {
        let table = NamespaceTable::new();
        assert_eq!(table.index_of(STANDARD_NAMESPACE_URI), Some(0));
        let a = table.register("urn:a");
        assert_eq!(table.register("urn:a"), a);
        assert_eq!(table.uri(a).as_deref(), Some("urn:a"));
        assert_eq!(
            table.parse_expanded("nsu=urn:a;i=7").unwrap(),
            NodeId::numeric(a, 7)
        );
        let err = table.parse_expanded("nsu=urn:missing;s=X").unwrap_err();
        assert!(matches!(
            err,
            SyncError::Configuration(ConfigurationError::UnknownNamespace { .. })
        ));
    }

    #[test]
    fn test_status_code_names() {
        assert!(StatusCode::GOOD.is_good());
        assert!(StatusCode::BAD_NODE_ID_UNKNOWN.is_bad());
        assert_eq!(
            StatusCode::BAD_REFERENCE_NOT_ALLOWED.to_string(),
            "BadReferenceNotAllowed (0x805C0000)"
        );
    }

    #[test]
    fn test_model_change_verb_display() {
        let verb = ModelChangeVerb::REFERENCE_ADDED | ModelChangeVerb::REFERENCE_DELETED;
        assert_eq!(verb.to_string(), "ReferenceAdded|ReferenceDeleted");
        assert_eq!(ModelChangeVerb::NODE_DELETED.to_string(), "NodeDeleted");
    }

    #[test]
    fn test_access_level() {
        assert!(AccessLevel::for_writable(true).is_writable());
        assert!(!AccessLevel::for_writable(false).is_writable());
        assert_eq!(AccessLevel::read_write().bits(), 0x03);
    }

    #[test]
    fn test_data_type_of() {
        assert_eq!(data_type_of(&Value::Float64(1.0)), NodeId::numeric(0, 11));
        assert_eq!(data_type_of(&Value::Null), well_known::BASE_DATA_TYPE);
    }
}
