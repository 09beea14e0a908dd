// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Resolution of configured identifiers to node ids.
//!
//! Configuration names types, reference types and data types as plain
//! strings (`"HasComponent"`, `"ns=2;i=1001"`, `"nsu=urn:x;s=PumpType"`).
//! [`IdentifierResolver`] turns them into [`NodeId`]s in this order:
//!
//! ```text
//! 1. cache                    (positive and negative results)
//! 2. browse-name lookup       (only with a namespace hint, same category)
//! 3. "ns=..;x=.." node id
//! 4. "nsu=..;x=.." expanded node id
//! 5. static table             (per IdentifierCategory)
//! ```
//!
//! A failed resolution is logged once per distinct
//! `(identifier, namespace hint, category)` key.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::{debug, warn};

use crate::types::{NamespaceTable, NodeId, STANDARD_NAMESPACE_URI};

/// What kind of node an identifier is expected to name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierCategory {
    /// Object type definitions.
    ObjectType,
    /// Variable type definitions.
    VariableType,
    /// Reference types.
    ReferenceType,
    /// Data types.
    DataType,
}

impl IdentifierCategory {
    /// Returns the category name for logging.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ObjectType => "object_type",
            Self::VariableType => "variable_type",
            Self::ReferenceType => "reference_type",
            Self::DataType => "data_type",
        }
    }

    fn table(&self) -> &'static HashMap<&'static str, u32> {
        match self {
            Self::ObjectType => &OBJECT_TYPES,
            Self::VariableType => &VARIABLE_TYPES,
            Self::ReferenceType => &REFERENCE_TYPES,
            Self::DataType => &DATA_TYPES,
        }
    }
}

// =============================================================================
// Static tables
// =============================================================================

static OBJECT_TYPES: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    HashMap::from([
        ("BaseObjectType", 58),
        ("FolderType", 61),
        ("BaseEventType", 2041),
        ("BaseModelChangeEventType", 2132),
        ("GeneralModelChangeEventType", 2133),
        ("ServerType", 2004),
    ])
});

static VARIABLE_TYPES: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    HashMap::from([
        ("BaseVariableType", 62),
        ("BaseDataVariableType", 63),
        ("PropertyType", 68),
        ("AnalogItemType", 2368),
        ("DataItemType", 2365),
    ])
});

static REFERENCE_TYPES: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    HashMap::from([
        ("References", 31),
        ("NonHierarchicalReferences", 32),
        ("HierarchicalReferences", 33),
        ("HasChild", 34),
        ("Organizes", 35),
        ("HasEventSource", 36),
        ("HasModellingRule", 37),
        ("HasEncoding", 38),
        ("HasDescription", 39),
        ("HasTypeDefinition", 40),
        ("GeneratesEvent", 41),
        ("Aggregates", 44),
        ("HasSubtype", 45),
        ("HasProperty", 46),
        ("HasComponent", 47),
        ("HasNotifier", 48),
        ("HasOrderedComponent", 49),
    ])
});

static DATA_TYPES: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    HashMap::from([
        ("Boolean", 1),
        ("SByte", 2),
        ("Byte", 3),
        ("Int16", 4),
        ("UInt16", 5),
        ("Int32", 6),
        ("UInt32", 7),
        ("Int64", 8),
        ("UInt64", 9),
        ("Float", 10),
        ("Double", 11),
        ("String", 12),
        ("DateTime", 13),
        ("Guid", 14),
        ("ByteString", 15),
        ("BaseDataType", 24),
        ("Number", 26),
    ])
});

const CATEGORIES: [IdentifierCategory; 4] = [
    IdentifierCategory::ObjectType,
    IdentifierCategory::VariableType,
    IdentifierCategory::ReferenceType,
    IdentifierCategory::DataType,
];

// =============================================================================
// IdentifierResolver
// =============================================================================

/// (category, namespace index, browse name)
type LoadedKey = (IdentifierCategory, u16, String);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ResolveKey {
    identifier: String,
    namespace_hint: Option<String>,
    category: IdentifierCategory,
}

/// Cached resolver for configured identifiers.
#[derive(Debug)]
pub struct IdentifierResolver {
    namespaces: Arc<NamespaceTable>,

    /// Browse-name index of loaded nodes.
    loaded: DashMap<LoadedKey, NodeId>,

    cache: DashMap<ResolveKey, Option<NodeId>>,
}

impl IdentifierResolver {
    /// Creates a resolver with the standard namespace nodes loaded.
    pub fn new(namespaces: Arc<NamespaceTable>) -> Self {
        let loaded = DashMap::new();
        for category in CATEGORIES {
            for (name, id) in category.table() {
                loaded.insert((category, 0, (*name).to_string()), NodeId::numeric(0, *id));
            }
        }
        Self {
            namespaces,
            loaded,
            cache: DashMap::new(),
        }
    }

    /// Makes a node findable by browse name in its namespace.
    ///
    /// Must happen before the name is first resolved; earlier results stay
    /// cached.
    pub fn load_node(&self, category: IdentifierCategory, browse_name: impl Into<String>, node_id: NodeId) {
        self.loaded
            .insert((category, node_id.namespace_index, browse_name.into()), node_id);
    }

    /// Resolves `identifier`, returning `None` if it names nothing known.
    pub fn resolve(
        &self,
        identifier: &str,
        namespace_hint: Option<&str>,
        category: IdentifierCategory,
    ) -> Option<NodeId> {
        let key = ResolveKey {
            identifier: identifier.to_string(),
            namespace_hint: namespace_hint.map(str::to_string),
            category,
        };

        match self.cache.entry(key) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let resolved = self.resolve_uncached(identifier, namespace_hint, category);
                match &resolved {
                    Some(node_id) => debug!(
                        identifier,
                        category = category.as_str(),
                        node_id = %node_id,
                        "Identifier resolved"
                    ),
                    None => warn!(
                        identifier,
                        namespace = namespace_hint.unwrap_or_default(),
                        category = category.as_str(),
                        "Identifier could not be resolved"
                    ),
                }
                entry.insert(resolved.clone());
                resolved
            }
        }
    }

    /// Resolves `identifier`, falling back to `default` when it is absent
    /// or unknown.
    pub fn resolve_or(
        &self,
        identifier: Option<&str>,
        namespace_hint: Option<&str>,
        category: IdentifierCategory,
        default: NodeId,
    ) -> NodeId {
        identifier
            .and_then(|id| self.resolve(id, namespace_hint, category))
            .unwrap_or(default)
    }

    /// Returns the number of cached keys.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn resolve_uncached(
        &self,
        identifier: &str,
        namespace_hint: Option<&str>,
        category: IdentifierCategory,
    ) -> Option<NodeId> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return None;
        }

        if let Some(uri) = namespace_hint {
            let index = if uri == STANDARD_NAMESPACE_URI {
                Some(0)
            } else {
                self.namespaces.index_of(uri)
            };
            if let Some(node_id) = index.and_then(|ns| {
                self.loaded
                    .get(&(category, ns, identifier.to_string()))
                    .map(|entry| entry.value().clone())
            }) {
                return Some(node_id);
            }
        }

        if identifier.contains('=') && !identifier.starts_with("nsu=") {
            if let Ok(node_id) = identifier.parse::<NodeId>() {
                return Some(node_id);
            }
        }

        if identifier.starts_with("nsu=") {
            if let Ok(node_id) = self.namespaces.parse_expanded(identifier) {
                return Some(node_id);
            }
        }

        category
            .table()
            .get(identifier)
            .map(|id| NodeId::numeric(0, *id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> (Arc<NamespaceTable>, IdentifierResolver) {
        let namespaces = Arc::new(NamespaceTable::new());
        let resolver = IdentifierResolver::new(namespaces.clone());
        (namespaces, resolver)
    }

    #[test]
    fn test_static_table_per_category() {
        let (_, resolver) = resolver();
        assert_eq!(
            resolver.resolve("HasComponent", None, IdentifierCategory::ReferenceType),
            Some(NodeId::numeric(0, 47))
        );
        assert_eq!(
            resolver.resolve("Double", None, IdentifierCategory::DataType),
            Some(NodeId::numeric(0, 11))
        );
        assert_eq!(
            resolver.resolve("HasComponent", None, IdentifierCategory::DataType),
            None
        );
    }

    #[test]
    fn test_parse_node_id_forms() {
        let (namespaces, resolver) = resolver();
        let ns = namespaces.register("urn:types");
        assert_eq!(
            resolver.resolve("ns=2;i=1001", None, IdentifierCategory::ObjectType),
            Some(NodeId::numeric(2, 1001))
        );
        assert_eq!(
            resolver.resolve("nsu=urn:types;s=PumpType", None, IdentifierCategory::ObjectType),
            Some(NodeId::string(ns, "PumpType"))
        );
        assert_eq!(
            resolver.resolve("i=63", None, IdentifierCategory::VariableType),
            Some(NodeId::numeric(0, 63))
        );
    }

    #[test]
    fn test_browse_name_lookup_with_hint() {
        let (namespaces, resolver) = resolver();
        let ns = namespaces.register("urn:types");
        resolver.load_node(IdentifierCategory::ObjectType, "PumpType", NodeId::numeric(ns, 5001));

        assert_eq!(
            resolver.resolve("PumpType", Some("urn:types"), IdentifierCategory::ObjectType),
            Some(NodeId::numeric(ns, 5001))
        );
        assert_eq!(
            resolver.resolve("PumpType", None, IdentifierCategory::ObjectType),
            None
        );
        assert_eq!(
            resolver.resolve("FolderType", Some(STANDARD_NAMESPACE_URI), IdentifierCategory::ObjectType),
            Some(NodeId::numeric(0, 61))
        );
    }

    #[test]
    fn test_browse_name_lookup_respects_category() {
        let (namespaces, resolver) = resolver();
        let ns = namespaces.register("urn:types");
        resolver.load_node(IdentifierCategory::VariableType, "Pump", NodeId::numeric(ns, 6001));

        assert_eq!(
            resolver.resolve("Pump", Some("urn:types"), IdentifierCategory::ObjectType),
            None
        );
        assert_eq!(
            resolver.resolve("HasComponent", Some(STANDARD_NAMESPACE_URI), IdentifierCategory::ObjectType),
            None
        );
        assert_eq!(
            resolver.resolve_or(
                Some("HasComponent"),
                Some(STANDARD_NAMESPACE_URI),
                IdentifierCategory::ObjectType,
                NodeId::numeric(0, 58),
            ),
            NodeId::numeric(0, 58)
        );
        assert_eq!(
            resolver.resolve("HasComponent", Some(STANDARD_NAMESPACE_URI), IdentifierCategory::ReferenceType),
            Some(NodeId::numeric(0, 47))
        );
    }

    #[test]
    fn test_negative_results_cached() {
        let (_, resolver) = resolver();
        assert_eq!(resolver.resolve("Nope", None, IdentifierCategory::ObjectType), None);
        assert_eq!(resolver.resolve("Nope", None, IdentifierCategory::ObjectType), None);
        assert_eq!(resolver.cached(), 1);
        assert_eq!(resolver.resolve("Nope", Some("urn:x"), IdentifierCategory::ObjectType), None);
        assert_eq!(resolver.cached(), 2);
    }

    #[test]
    fn test_resolve_or_default() {
        let (_, resolver) = resolver();
        let default = NodeId::numeric(0, 47);
        assert_eq!(
            resolver.resolve_or(None, None, IdentifierCategory::ReferenceType, default.clone()),
            default
        );
        assert_eq!(
            resolver.resolve_or(Some("Organizes"), None, IdentifierCategory::ReferenceType, default),
            NodeId::numeric(0, 35)
        );
    }
}
