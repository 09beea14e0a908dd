// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! A small organisation model shared by the integration tests:
//!
//! ```text
//! Team (root folder "Root")
//! ├── Name      value, writable
//! ├── Lead      reference -> Person
//! ├── Members   collection of Person (container folder)
//! ├── People    collection of Person (flat)
//! └── Roles     dictionary of Person
//!
//! Person
//! ├── FirstName value, writable
//! ├── Age       value, read-only
//! ├── Children  collection of Person (container folder)
//! └── Mentor    reference -> Person
//! ```

#![allow(dead_code)]

use std::sync::Arc;

use trellis_config::{CollectionStructure, PropertyNodeConfig, ServerConfig};
use trellis_core::{
    GraphMutation, MutationOutcome, PropertyDescriptor, Subject, SubjectContext, SubjectType,
    TypeRegistry, Value,
};
use trellis_opcua::{NodeId, SynchronizationEngine};

/// Namespace index of subject nodes with the default configuration.
pub const NS: u16 = 2;

/// Returns the path-derived id of a subject node.
pub fn sid(path: &str) -> NodeId {
    NodeId::string(NS, path)
}

// =============================================================================
// Types
// =============================================================================

/// Fixture providing the model's subject types.
pub struct ModelFixtures;

impl ModelFixtures {
    /// The `Person` type.
    pub fn person() -> Arc<SubjectType> {
        Arc::new(
            SubjectType::new("Person")
                .with_property(PropertyDescriptor::value("FirstName").writable())
                .with_property(PropertyDescriptor::value("Age"))
                .with_property(PropertyDescriptor::collection("Children").of_type("Person"))
                .with_property(PropertyDescriptor::reference("Mentor").of_type("Person")),
        )
    }

    /// The `Team` root type.
    pub fn team() -> Arc<SubjectType> {
        Arc::new(
            SubjectType::new("Team")
                .with_property(PropertyDescriptor::value("Name").writable())
                .with_property(PropertyDescriptor::reference("Lead").of_type("Person"))
                .with_property(PropertyDescriptor::collection("Members").of_type("Person"))
                .with_property(PropertyDescriptor::collection("People").of_type("Person"))
                .with_property(PropertyDescriptor::dictionary("Roles").of_type("Person")),
        )
    }

    /// A type no property of the model accepts.
    pub fn robot() -> Arc<SubjectType> {
        Arc::new(SubjectType::new("Robot").with_property(PropertyDescriptor::value("Serial")))
    }

    /// Registry used for AddNodes requests.
    pub fn registry() -> Arc<TypeRegistry> {
        let mut registry = TypeRegistry::new();
        registry.register("Person", Self::person());
        registry.register("Robot", Self::robot());
        Arc::new(registry)
    }

    /// Default server settings with `Team.People` laid out flat.
    pub fn config() -> ServerConfig {
        let mut people = PropertyNodeConfig::new("Team", "People");
        people.collection_structure = Some(CollectionStructure::Flat);
        ServerConfig {
            properties: vec![people],
            ..ServerConfig::default()
        }
    }

    /// Settings with remote node management enabled.
    pub fn managed_config() -> ServerConfig {
        ServerConfig {
            enable_external_node_management: true,
            ..Self::config()
        }
    }
}

// =============================================================================
// Model
// =============================================================================

/// A live graph and the context it belongs to.
pub struct Model {
    pub context: SubjectContext,
    pub root: Arc<Subject>,
}

impl Model {
    /// Creates an empty team named `Alpha`.
    pub fn new() -> Self {
        let context = SubjectContext::new();
        let root = context.create_subject(ModelFixtures::team());
        context.set_value(&root, "Name", "Alpha").unwrap();
        Self { context, root }
    }

    /// Creates a detached person.
    pub fn person(&self, first_name: &str) -> Arc<Subject> {
        let person = self.context.create_subject(ModelFixtures::person());
        self.context.set_value(&person, "FirstName", first_name).unwrap();
        self.context.set_value(&person, "Age", Value::Int32(30)).unwrap();
        person
    }

    /// Appends new people named `names` to `subject.property`.
    pub fn add_people(&self, subject: &Arc<Subject>, property: &str, names: &[&str]) -> Vec<Arc<Subject>> {
        names
            .iter()
            .map(|name| {
                let person = self.person(name);
                let outcome = self.context.append(subject, property, person.clone()).unwrap();
                assert_eq!(outcome, MutationOutcome::Applied);
                person
            })
            .collect()
    }

    /// Moves a collection entry.
    pub fn move_entry(&self, subject: &Arc<Subject>, property: &str, from: usize, to: usize) {
        self.context
            .mutate(subject, property, GraphMutation::Move { from, to })
            .unwrap();
    }
}

/// Starts an engine with `config` on a fresh model.
pub async fn start(config: ServerConfig) -> (SynchronizationEngine, Model) {
    let model = Model::new();
    let engine = SynchronizationEngine::with_type_registry(config, model.context.clone(), ModelFixtures::registry());
    engine.start(model.root.clone()).await.unwrap();
    (engine, model)
}
