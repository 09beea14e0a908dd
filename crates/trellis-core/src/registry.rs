// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Registry of externally addressable subject types.
//!
//! Remote clients ask for new objects by a type identifier (for example
//! `"ns=2;s=PersonType"` or just `"Person"`). The registry maps each
//! identifier to a [`SubjectType`] and a factory that builds a fresh subject
//! for it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::context::SubjectContext;
use crate::subject::{Subject, SubjectType};

/// Builds a new subject inside a context.
pub type SubjectFactory = Arc<dyn Fn(&SubjectContext) -> Arc<Subject> + Send + Sync>;

/// A type that can be instantiated by identifier.
#[derive(Clone)]
pub struct RegisteredType {
    identifier: String,
    subject_type: Arc<SubjectType>,
    factory: SubjectFactory,
}

impl RegisteredType {
    /// Returns the external identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Returns the subject type produced by the factory.
    pub fn subject_type(&self) -> &Arc<SubjectType> {
        &self.subject_type
    }

    /// Creates a new, detached subject.
    pub fn instantiate(&self, context: &SubjectContext) -> Arc<Subject> {
        (self.factory)(context)
    }
}

impl fmt::Debug for RegisteredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredType")
            .field("identifier", &self.identifier)
            .field("subject_type", &self.subject_type.name())
            .finish()
    }
}

/// Maps external type identifiers to subject factories.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, RegisteredType>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a type whose subjects start with default property state.
    pub fn register(&mut self, identifier: impl Into<String>, subject_type: Arc<SubjectType>) -> &mut Self {
        let ty = subject_type.clone();
        self.register_with(identifier, subject_type, move |ctx| ctx.create_subject(ty.clone()))
    }

    /// Registers a type with a custom factory.
    pub fn register_with<F>(
        &mut self,
        identifier: impl Into<String>,
        subject_type: Arc<SubjectType>,
        factory: F,
    ) -> &mut Self
    where
        F: Fn(&SubjectContext) -> Arc<Subject> + Send + Sync + 'static,
    {
        let identifier = identifier.into();
        self.types.insert(
            identifier.clone(),
            RegisteredType {
                identifier,
                subject_type,
                factory: Arc::new(factory),
            },
        );
        self
    }

    /// Looks up a type by identifier.
    pub fn resolve(&self, identifier: &str) -> Option<&RegisteredType> {
        self.types.get(identifier)
    }

    /// Iterates over the registered types in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredType> {
        self.types.values()
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
