// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Builds the node subtree of a bound subject.
//!
//! | Property kind | Nodes                                                  |
//! |---------------|--------------------------------------------------------|
//! | Value         | Variable, attributes nested below it                   |
//! | Reference     | child Object (or Variable when presented as a scalar)  |
//! | Collection    | Container folder or flat siblings `Name[i]`            |
//! | Dictionary    | Container folder, entries named by key                 |
//!
//! A failing property is logged with its path and skipped; the rest of the
//! subject keeps building.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use trellis_config::{CollectionStructure, PropertyNodeConfig};
use trellis_core::{PropertyDescriptor, PropertyKind, PropertyRef, Subject};

use super::paths::{index_browse_name, index_path, key_path, member_path};
use super::registry::{
    ChildSlot, Placement, PropertyNodes, SlotEdge, SlotKey, SlotTable, SubjectBinding,
};
use super::StructuralScope;
use crate::address_space::{
    DisplayConfig, NodeFactory, NodeHandle, NodeSpec, ProtocolNode, VariableSpec, WriteHook,
};
use crate::error::SyncResult;
use crate::identifiers::IdentifierCategory;
use crate::types::{well_known, AccessLevel, ModelChangeVerb, NodeId, QualifiedName};

/// Path of the root subject when it is mapped onto the Objects folder.
pub(crate) const DEFAULT_ROOT_PATH: &str = "Root";

impl StructuralScope<'_> {
    // =========================================================================
    // Root
    // =========================================================================

    /// Binds `root` and builds the whole address space below it.
    ///
    /// Attaching the current root again is a no-op. Only one root is
    /// mirrored; further roots are ignored.
    pub(crate) fn attach_root(&mut self, root: &Arc<Subject>) -> SyncResult<()> {
        if let Some(current) = self.state.root {
            if current != root.id() {
                debug!(root = %root, current = %current, "Additional root ignored");
            }
            return Ok(());
        }

        let shared = self.shared;
        let objects = shared.space.objects_folder();
        let (node, owns_node, path) = match &shared.config.root_folder_name {
            Some(name) => {
                let ns = shared.namespace_index;
                let spec = NodeSpec::path_derived(NodeId::string(ns, name.as_str()), QualifiedName::new(ns, name.as_str()))
                    .with_reference_type(well_known::ORGANIZES);
                let folder = NodeFactory::new(&shared.space).create_folder(objects, spec)?;
                shared.queue_node_change(
                    folder.node_id(),
                    Some(folder.type_definition()),
                    ModelChangeVerb::NODE_ADDED,
                );
                (folder.handle(), true, name.clone())
            }
            None => (objects, false, DEFAULT_ROOT_PATH.to_string()),
        };

        self.state.registry.insert(SubjectBinding {
            subject: root.clone(),
            node,
            owns_node,
            presented_by: None,
            edges: vec![SlotEdge {
                slot: ChildSlot::root(),
                anchor: objects,
                reference_type: well_known::ORGANIZES,
                path: path.clone(),
                browse_name: path.clone(),
            }],
            properties: HashMap::new(),
            path: path.clone(),
        });
        self.state.root = Some(root.id());
        self.build_properties(root);
        info!(root = %root, path = %path, nodes = shared.space.len(), "Address space built");
        Ok(())
    }

    /// Unbinds the root and everything only it reaches.
    pub(crate) fn detach_root(&mut self, root: &Arc<Subject>) {
        if self.state.root != Some(root.id()) {
            debug!(subject = %root, "Detach of unmirrored root ignored");
            return;
        }
        self.unbind(root.id(), &ChildSlot::root());
        self.state.root = None;
        info!(root = %root, "Address space cleared");
    }

    // =========================================================================
    // Subjects
    // =========================================================================

    /// Binds `child` into `parent.property` at `key` and builds it when the
    /// node is new.
    pub(crate) fn attach_child(
        &mut self,
        parent: &Arc<Subject>,
        property: &str,
        key: SlotKey,
        child: &Arc<Subject>,
    ) -> SyncResult<()> {
        let shared = self.shared;
        let Some(nodes) = self
            .state
            .registry
            .get(parent.id())
            .and_then(|b| b.properties.get(property))
        else {
            debug!(parent = %parent, property, "Child of unbuilt property ignored");
            return Ok(());
        };

        let (path, browse_name) = match &key {
            SlotKey::Root | SlotKey::Single => (nodes.base_path.clone(), nodes.browse_base.clone()),
            SlotKey::Index(index) => (
                index_path(&nodes.base_path, *index),
                index_browse_name(&nodes.browse_base, *index),
            ),
            SlotKey::Key(k) => (key_path(&nodes.base_path, k), k.clone()),
        };
        let placement = Placement {
            anchor: nodes.anchor,
            reference_type: nodes.reference_type.clone(),
            config: shared.config.property(parent.type_name(), property),
            explicit: key == SlotKey::Single,
            path,
            browse_name,
        };

        let outcome = self.bind(child, ChildSlot::new(parent.id(), property, key), placement)?;
        if outcome.first {
            self.build_properties(child);
        }
        Ok(())
    }

    /// Creates the node of a newly bound subject.
    ///
    /// Returns the node and, when the subject is presented as a scalar, the
    /// value property the node mirrors.
    pub(crate) fn create_subject_node(
        &self,
        subject: &Arc<Subject>,
        placement: &Placement<'_>,
    ) -> SyncResult<(Arc<ProtocolNode>, Option<String>)> {
        let config = placement.config;
        let identity = config.filter(|_| placement.explicit);
        let spec = self
            .node_spec(&placement.path, &placement.browse_name, config, identity)?
            .with_reference_type(placement.reference_type.clone());
        let factory = NodeFactory::new(&self.shared.space);

        if let Some(value_property) = config.and_then(|c| c.value_property.as_deref()) {
            match subject.descriptor(value_property) {
                Ok(descriptor) if descriptor.kind() == PropertyKind::Value => {
                    let type_definition =
                        self.type_definition(identity, IdentifierCategory::VariableType, well_known::BASE_DATA_VARIABLE_TYPE);
                    let variable = self.variable_spec(subject, descriptor, config)?;
                    let node = factory.create_variable(
                        placement.anchor,
                        spec.with_type_definition(type_definition),
                        variable,
                    )?;
                    return Ok((node, Some(value_property.to_string())));
                }
                _ => warn!(
                    subject = %subject,
                    property = value_property,
                    path = %placement.path,
                    "Presented value property missing, creating object"
                ),
            }
        }

        let type_definition = self.object_type_of(subject, identity);
        let node = factory.create_object(placement.anchor, spec.with_type_definition(type_definition))?;
        Ok((node, None))
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Builds every non-attribute property of a freshly bound subject.
    pub(crate) fn build_properties(&mut self, subject: &Arc<Subject>) {
        let Some(binding) = self.state.registry.get(subject.id()) else {
            return;
        };
        let node = binding.node;
        let path = binding.path.clone();
        let presented_by = binding.presented_by.clone();
        let subject_type = subject.subject_type().clone();

        for descriptor in subject_type.properties() {
            if descriptor.is_attribute() || presented_by.as_deref() == Some(descriptor.name()) {
                continue;
            }
            let browse_name = self
                .shared
                .config
                .property(subject.type_name(), descriptor.name())
                .and_then(|c| c.browse_name.clone())
                .unwrap_or_else(|| descriptor.name().to_string());
            let base = member_path(&path, &browse_name);
            if let Err(e) = self.build_property(subject, descriptor, node, &base, &browse_name) {
                warn!(subject = %subject, path = %base, error = %e, "Property build failed, skipping");
            }
        }

        if let Some(value_property) = presented_by {
            self.build_attributes(subject, &value_property, node, &path);
        }
    }

    fn build_property(
        &mut self,
        subject: &Arc<Subject>,
        descriptor: &PropertyDescriptor,
        anchor: NodeHandle,
        base: &str,
        browse_name: &str,
    ) -> SyncResult<()> {
        let shared = self.shared;
        let name = descriptor.name();
        let config = shared.config.property(subject.type_name(), name);

        match descriptor.kind() {
            PropertyKind::Value => {
                let default_reference = if descriptor.is_attribute() {
                    well_known::HAS_PROPERTY
                } else {
                    well_known::HAS_COMPONENT
                };
                let default_type = if descriptor.is_attribute() {
                    well_known::PROPERTY_TYPE
                } else {
                    well_known::BASE_DATA_VARIABLE_TYPE
                };
                let spec = self
                    .node_spec(base, browse_name, config, config)?
                    .with_reference_type(self.reference_type(config.and_then(|c| c.reference_type.as_deref()), default_reference))
                    .with_type_definition(self.type_definition(config, IdentifierCategory::VariableType, default_type));
                let variable = self.variable_spec(subject, descriptor, config)?;
                let node = NodeFactory::new(&shared.space).create_variable(anchor, spec, variable)?;
                self.build_attributes(subject, name, node.handle(), base);
            }

            PropertyKind::Reference => {
                let child = subject.reference(name)?;
                self.register_property(subject, name, PropertyNodes {
                    anchor,
                    container: None,
                    base_path: base.to_string(),
                    browse_base: browse_name.to_string(),
                    reference_type: self.reference_type(config.and_then(|c| c.reference_type.as_deref()), well_known::HAS_COMPONENT),
                    slots: SlotTable::Single(child.as_ref().map(|c| c.id())),
                });
                if let Some(child) = child {
                    self.attach_child(subject, name, SlotKey::Single, &child)?;
                }
            }

            PropertyKind::Collection => {
                let structure = shared.config.collection_structure(subject.type_name(), name);
                let children = subject.collection(name)?;
                let (anchor, container) = match structure {
                    CollectionStructure::Container => {
                        let folder = self.create_container(anchor, base, browse_name, config)?;
                        (folder, Some(folder))
                    }
                    CollectionStructure::Flat => (anchor, None),
                };
                self.register_property(subject, name, PropertyNodes {
                    anchor,
                    container,
                    base_path: base.to_string(),
                    browse_base: browse_name.to_string(),
                    reference_type: self.reference_type(config.and_then(|c| c.item_reference_type.as_deref()), well_known::HAS_COMPONENT),
                    slots: SlotTable::Sequence(children.iter().map(|c| c.id()).collect()),
                });
                if let Some(folder) = container {
                    self.build_attributes(subject, name, folder, base);
                }
                for (index, child) in children.iter().enumerate() {
                    if let Err(e) = self.attach_child(subject, name, SlotKey::Index(index), child) {
                        warn!(subject = %child, path = %index_path(base, index), error = %e, "Collection entry build failed");
                    }
                }
            }

            PropertyKind::Dictionary => {
                let folder = self.create_container(anchor, base, browse_name, config)?;
                let mut entries = BTreeMap::new();
                let mut children = Vec::new();
                for (key, child) in subject.dictionary(name)? {
                    if key.is_empty() {
                        warn!(subject = %subject, path = %base, "Dictionary entry with empty key skipped");
                        continue;
                    }
                    entries.insert(key.clone(), child.id());
                    children.push((key, child));
                }
                self.register_property(subject, name, PropertyNodes {
                    anchor: folder,
                    container: Some(folder),
                    base_path: base.to_string(),
                    browse_base: browse_name.to_string(),
                    reference_type: self.reference_type(config.and_then(|c| c.item_reference_type.as_deref()), well_known::HAS_COMPONENT),
                    slots: SlotTable::Keyed(entries),
                });
                self.build_attributes(subject, name, folder, base);
                for (key, child) in children {
                    if let Err(e) = self.attach_child(subject, name, SlotKey::Key(key.clone()), &child) {
                        warn!(subject = %child, path = %key_path(base, &key), error = %e, "Dictionary entry build failed");
                    }
                }
            }
        }
        Ok(())
    }

    /// Builds the attributes of `owner` below `anchor`.
    fn build_attributes(&mut self, subject: &Arc<Subject>, owner: &str, anchor: NodeHandle, owner_path: &str) {
        let subject_type = subject.subject_type().clone();
        for attribute in subject_type.attributes_of(owner) {
            let Some(name) = attribute.attribute_name() else {
                continue;
            };
            let base = member_path(owner_path, name);
            if let Err(e) = self.build_property(subject, attribute, anchor, &base, name) {
                warn!(subject = %subject, path = %base, error = %e, "Attribute build failed, skipping");
            }
        }
    }

    fn create_container(
        &self,
        anchor: NodeHandle,
        base: &str,
        browse_name: &str,
        config: Option<&PropertyNodeConfig>,
    ) -> SyncResult<NodeHandle> {
        let spec = self
            .node_spec(base, browse_name, config, config)?
            .with_reference_type(self.reference_type(config.and_then(|c| c.reference_type.as_deref()), well_known::HAS_COMPONENT));
        let folder = NodeFactory::new(&self.shared.space).create_folder(anchor, spec)?;
        self.shared.queue_node_change(
            folder.node_id(),
            Some(folder.type_definition()),
            ModelChangeVerb::NODE_ADDED,
        );
        Ok(folder.handle())
    }

    fn register_property(&mut self, subject: &Arc<Subject>, property: &str, nodes: PropertyNodes) {
        self.state.registry.register_property(subject.id(), property, nodes);
    }

    // =========================================================================
    // Node settings
    // =========================================================================

    fn node_spec(
        &self,
        path: &str,
        browse_name: &str,
        config: Option<&PropertyNodeConfig>,
        identity: Option<&PropertyNodeConfig>,
    ) -> SyncResult<NodeSpec> {
        let shared = self.shared;
        let ns = shared.namespace_for(config.and_then(|c| c.namespace_uri.as_deref()));
        let browse_name = QualifiedName::new(ns, browse_name);
        let spec = match identity.and_then(|c| c.node_identifier.as_deref()) {
            Some(identifier) => NodeSpec::new(self.parse_identifier(identifier, ns)?, browse_name),
            None => NodeSpec::path_derived(NodeId::string(ns, path), browse_name),
        };
        Ok(spec.with_display(DisplayConfig {
            display_name: identity.and_then(|c| c.display_name.clone()),
            description: identity.and_then(|c| c.description.clone()),
        }))
    }

    fn parse_identifier(&self, identifier: &str, ns: u16) -> SyncResult<NodeId> {
        if identifier.starts_with("nsu=") {
            self.shared.namespaces.parse_expanded(identifier)
        } else if identifier.contains('=') {
            identifier.parse()
        } else {
            Ok(NodeId::string(ns, identifier))
        }
    }

    fn reference_type(&self, identifier: Option<&str>, default: NodeId) -> NodeId {
        self.shared
            .resolver
            .resolve_or(identifier, None, IdentifierCategory::ReferenceType, default)
    }

    fn type_definition(
        &self,
        config: Option<&PropertyNodeConfig>,
        category: IdentifierCategory,
        default: NodeId,
    ) -> NodeId {
        let Some(config) = config else {
            return default;
        };
        self.shared.resolver.resolve_or(
            config.type_definition.as_deref(),
            config.namespace_uri.as_deref(),
            category,
            default,
        )
    }

    fn object_type_of(&self, subject: &Subject, identity: Option<&PropertyNodeConfig>) -> NodeId {
        let resolver = &self.shared.resolver;
        identity
            .and_then(|c| {
                let type_definition = c.type_definition.as_deref()?;
                resolver.resolve(type_definition, c.namespace_uri.as_deref(), IdentifierCategory::ObjectType)
            })
            .or_else(|| {
                let ty = self.shared.config.subject_type(subject.type_name())?;
                resolver.resolve(&ty.type_definition, ty.namespace_uri.as_deref(), IdentifierCategory::ObjectType)
            })
            .unwrap_or(well_known::BASE_OBJECT_TYPE)
    }

    fn variable_spec(
        &self,
        subject: &Arc<Subject>,
        descriptor: &PropertyDescriptor,
        config: Option<&PropertyNodeConfig>,
    ) -> SyncResult<VariableSpec> {
        let (initial, changed_at) = subject.value_with_timestamp(descriptor.name())?;
        let source = PropertyRef::new(subject.clone(), descriptor.name());
        let data_type = config
            .and_then(|c| c.data_type.as_deref())
            .and_then(|id| {
                let namespace = config.and_then(|c| c.namespace_uri.as_deref());
                self.shared.resolver.resolve(id, namespace, IdentifierCategory::DataType)
            });

        let mut spec = VariableSpec::new(initial, AccessLevel::for_writable(descriptor.is_writable()));
        spec.source_timestamp = changed_at;
        spec.data_type = data_type;
        if descriptor.is_writable() {
            spec.write_hook = Some(self.write_hook(source.clone()));
        }
        spec.source = Some(source);
        Ok(spec)
    }

    fn write_hook(&self, property: PropertyRef) -> WriteHook {
        let context = self.shared.context.clone();
        Arc::new(move |value, changed_at| {
            context.set_value_from_protocol(&property, changed_at, Utc::now(), value)?;
            Ok(())
        })
    }
}
