// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subjects, their types and property state.
//!
//! # Structure
//!
//! ```text
//! SubjectType ("Person")
//! ├── FirstName        Value (writable)
//! ├── FirstName@Unit   Value attribute of FirstName
//! ├── Father           Reference -> Person
//! ├── Children         Collection -> Person
//! └── Pets             Dictionary -> Pet
//!
//! Subject (id = 7, type = Person)
//! └── state: [PropertyState; 5]   one slot per declared property
//! ```
//!
//! A subject's identity is its [`SubjectId`]; two subjects with identical
//! property values are still different subjects. Subjects are shared through
//! `Arc`, so the same subject may appear in several child slots. Graph cycles
//! built from `Arc` links are never collected; detach them explicitly.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};
use crate::value::Value;

// =============================================================================
// SubjectId
// =============================================================================

/// Identity of a subject within one [`SubjectContext`](crate::SubjectContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectId(u64);

impl SubjectId {
    /// Creates a subject id from its raw value.
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// PropertyKind / PropertyDescriptor
// =============================================================================

/// The four shapes a property can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    /// Scalar value.
    Value,
    /// Zero or one child subject.
    Reference,
    /// Ordered list of child subjects.
    Collection,
    /// String-keyed map of child subjects.
    Dictionary,
}

impl PropertyKind {
    /// Returns `true` for kinds that hold child subjects.
    #[inline]
    pub fn is_structural(self) -> bool {
        !matches!(self, Self::Value)
    }

    /// Returns the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Reference => "reference",
            Self::Collection => "collection",
            Self::Dictionary => "dictionary",
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Declaration of one property on a [`SubjectType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    name: String,
    kind: PropertyKind,
    writable: bool,
    element_type: Option<String>,
    attribute: Option<(String, String)>,
}

impl PropertyDescriptor {
    fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
            writable: false,
            element_type: None,
            attribute: None,
        }
    }

    /// Declares a scalar value property.
    pub fn value(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Value)
    }

    /// Declares a single-child reference property.
    pub fn reference(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Reference)
    }

    /// Declares an ordered collection property.
    pub fn collection(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Collection)
    }

    /// Declares a string-keyed dictionary property.
    pub fn dictionary(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Dictionary)
    }

    /// Declares an attribute nested under another property.
    ///
    /// The attribute's property name is `"{owner}@{attribute}"`.
    pub fn attribute(owner: impl Into<String>, attribute: impl Into<String>, kind: PropertyKind) -> Self {
        let owner = owner.into();
        let attribute = attribute.into();
        let mut descriptor = Self::new(format!("{owner}@{attribute}"), kind);
        descriptor.attribute = Some((owner, attribute));
        descriptor
    }

    /// Marks the property as writable from the protocol side.
    pub fn writable(mut self) -> Self {
        self.writable = true;
        self
    }

    /// Restricts child subjects to the given type name.
    pub fn of_type(mut self, type_name: impl Into<String>) -> Self {
        self.element_type = Some(type_name.into());
        self
    }

    /// Returns the property name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the property kind.
    #[inline]
    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    /// Returns `true` if protocol writes are accepted.
    #[inline]
    pub fn is_writable(&self) -> bool {
        self.writable
    }

    /// Returns the accepted child type, if restricted.
    #[inline]
    pub fn element_type(&self) -> Option<&str> {
        self.element_type.as_deref()
    }

    /// Returns `true` if this property is an attribute of another property.
    #[inline]
    pub fn is_attribute(&self) -> bool {
        self.attribute.is_some()
    }

    /// Returns the owning property name for attributes.
    pub fn attribute_of(&self) -> Option<&str> {
        self.attribute.as_ref().map(|(owner, _)| owner.as_str())
    }

    /// Returns the attribute's own name (without the owner prefix).
    pub fn attribute_name(&self) -> Option<&str> {
        self.attribute.as_ref().map(|(_, name)| name.as_str())
    }

    /// Returns `true` if a subject of `type_name` may be placed in this property.
    pub fn accepts(&self, type_name: &str) -> bool {
        self.element_type
            .as_deref()
            .map_or(true, |expected| expected == type_name)
    }
}

// =============================================================================
// SubjectType
// =============================================================================

/// A named set of property declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectType {
    name: String,
    properties: Vec<PropertyDescriptor>,
}

impl SubjectType {
    /// Creates an empty subject type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    /// Adds a property declaration.
    pub fn with_property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    /// Returns the type name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns all properties in declaration order.
    #[inline]
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    /// Returns the position and declaration of a property.
    pub fn property(&self, name: &str) -> Option<(usize, &PropertyDescriptor)> {
        self.properties
            .iter()
            .enumerate()
            .find(|(_, p)| p.name == name)
    }

    /// Returns the attributes nested directly under `owner`.
    pub fn attributes_of<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a PropertyDescriptor> + 'a {
        self.properties
            .iter()
            .filter(move |p| p.attribute_of() == Some(owner))
    }

    fn lookup(&self, name: &str) -> GraphResult<(usize, &PropertyDescriptor)> {
        self.property(name)
            .ok_or_else(|| GraphError::unknown_property(&self.name, name))
    }
}

// =============================================================================
// Subject
// =============================================================================

#[derive(Debug, Clone)]
pub(crate) enum PropertyState {
    Value {
        value: Value,
        changed_at: DateTime<Utc>,
    },
    Reference(Option<Arc<Subject>>),
    Collection(Vec<Arc<Subject>>),
    Dictionary(BTreeMap<String, Arc<Subject>>),
}

impl PropertyState {
    fn initial(kind: PropertyKind, now: DateTime<Utc>) -> Self {
        match kind {
            PropertyKind::Value => Self::Value {
                value: Value::Null,
                changed_at: now,
            },
            PropertyKind::Reference => Self::Reference(None),
            PropertyKind::Collection => Self::Collection(Vec::new()),
            PropertyKind::Dictionary => Self::Dictionary(BTreeMap::new()),
        }
    }
}

/// A node of the live object graph.
pub struct Subject {
    id: SubjectId,
    subject_type: Arc<SubjectType>,
    state: RwLock<Vec<PropertyState>>,
}

impl Subject {
    pub(crate) fn new(id: SubjectId, subject_type: Arc<SubjectType>) -> Self {
        let now = Utc::now();
        let state = subject_type
            .properties()
            .iter()
            .map(|p| PropertyState::initial(p.kind(), now))
            .collect();
        Self {
            id,
            subject_type,
            state: RwLock::new(state),
        }
    }

    /// Returns the subject id.
    #[inline]
    pub fn id(&self) -> SubjectId {
        self.id
    }

    /// Returns the subject type.
    #[inline]
    pub fn subject_type(&self) -> &Arc<SubjectType> {
        &self.subject_type
    }

    /// Returns the subject type name.
    #[inline]
    pub fn type_name(&self) -> &str {
        self.subject_type.name()
    }

    /// Returns the declaration of a property.
    pub fn descriptor(&self, name: &str) -> GraphResult<&PropertyDescriptor> {
        self.subject_type.lookup(name).map(|(_, p)| p)
    }

    /// Reads a value property.
    pub fn value(&self, name: &str) -> GraphResult<Value> {
        self.value_with_timestamp(name).map(|(v, _)| v)
    }

    /// Reads a value property together with its last change time.
    pub fn value_with_timestamp(&self, name: &str) -> GraphResult<(Value, DateTime<Utc>)> {
        let index = self.expect_kind(name, PropertyKind::Value)?;
        match &self.state.read()[index] {
            PropertyState::Value { value, changed_at } => Ok((value.clone(), *changed_at)),
            _ => unreachable!("property state matches declared kind"),
        }
    }

    /// Reads a reference property.
    pub fn reference(&self, name: &str) -> GraphResult<Option<Arc<Subject>>> {
        let index = self.expect_kind(name, PropertyKind::Reference)?;
        match &self.state.read()[index] {
            PropertyState::Reference(child) => Ok(child.clone()),
            _ => unreachable!("property state matches declared kind"),
        }
    }

    /// Reads a collection property in order.
    pub fn collection(&self, name: &str) -> GraphResult<Vec<Arc<Subject>>> {
        let index = self.expect_kind(name, PropertyKind::Collection)?;
        match &self.state.read()[index] {
            PropertyState::Collection(items) => Ok(items.clone()),
            _ => unreachable!("property state matches declared kind"),
        }
    }

    /// Reads a dictionary property, ordered by key.
    pub fn dictionary(&self, name: &str) -> GraphResult<Vec<(String, Arc<Subject>)>> {
        let index = self.expect_kind(name, PropertyKind::Dictionary)?;
        match &self.state.read()[index] {
            PropertyState::Dictionary(items) => Ok(items
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()),
            _ => unreachable!("property state matches declared kind"),
        }
    }

    /// Returns the number of children a structural property currently holds.
    pub fn child_count(&self, name: &str) -> GraphResult<usize> {
        let (index, _) = self.subject_type.lookup(name)?;
        Ok(match &self.state.read()[index] {
            PropertyState::Value { .. } => 0,
            PropertyState::Reference(child) => usize::from(child.is_some()),
            PropertyState::Collection(items) => items.len(),
            PropertyState::Dictionary(items) => items.len(),
        })
    }

    pub(crate) fn expect_kind(&self, name: &str, expected: PropertyKind) -> GraphResult<usize> {
        let (index, descriptor) = self.subject_type.lookup(name)?;
        if descriptor.kind() != expected {
            return Err(GraphError::kind_mismatch(name, expected, descriptor.kind()));
        }
        Ok(index)
    }

    /// Runs `f` against one property slot under the subject's write lock.
    pub(crate) fn with_state_mut<R>(&self, index: usize, f: impl FnOnce(&mut PropertyState) -> R) -> R {
        let mut state = self.state.write();
        f(&mut state[index])
    }
}

impl fmt::Debug for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject")
            .field("id", &self.id)
            .field("type", &self.subject_type.name())
            .finish()
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.subject_type.name(), self.id)
    }
}

// =============================================================================
// PropertyRef
// =============================================================================

/// A property of a specific subject.
#[derive(Clone)]
pub struct PropertyRef {
    subject: Arc<Subject>,
    name: Arc<str>,
}

impl PropertyRef {
    /// Creates a property reference.
    pub fn new(subject: Arc<Subject>, name: impl Into<Arc<str>>) -> Self {
        Self {
            subject,
            name: name.into(),
        }
    }

    /// Returns the owning subject.
    #[inline]
    pub fn subject(&self) -> &Arc<Subject> {
        &self.subject
    }

    /// Returns the property name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the hashable identity of this property.
    pub fn key(&self) -> PropertyKey {
        PropertyKey::new(self.subject.id(), self.name.as_ref())
    }

    /// Returns the property declaration.
    pub fn descriptor(&self) -> GraphResult<&PropertyDescriptor> {
        self.subject.descriptor(&self.name)
    }
}

impl fmt::Debug for PropertyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.subject, self.name)
    }
}

impl fmt::Display for PropertyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.subject, self.name)
    }
}

/// Hashable identity of a subject property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyKey {
    /// Owning subject.
    pub subject: SubjectId,
    /// Property name.
    pub name: String,
}

impl PropertyKey {
    /// Creates a property key.
    pub fn new(subject: SubjectId, name: impl Into<String>) -> Self {
        Self {
            subject,
            name: name.into(),
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.subject, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person_type() -> Arc<SubjectType> {
        Arc::new(
            SubjectType::new("Person")
                .with_property(PropertyDescriptor::value("FirstName").writable())
                .with_property(PropertyDescriptor::attribute("FirstName", "Unit", PropertyKind::Value))
                .with_property(PropertyDescriptor::collection("Children").of_type("Person"))
                .with_property(PropertyDescriptor::reference("Father").of_type("Person")),
        )
    }

    #[test]
    fn test_initial_state() {
        let subject = Subject::new(SubjectId::new(1), person_type());
        assert_eq!(subject.value("FirstName").unwrap(), Value::Null);
        assert!(subject.collection("Children").unwrap().is_empty());
        assert!(subject.reference("Father").unwrap().is_none());
        assert_eq!(subject.child_count("Children").unwrap(), 0);
    }

    #[test]
    fn test_kind_checks() {
        let subject = Subject::new(SubjectId::new(1), person_type());
        assert!(matches!(
            subject.collection("FirstName"),
            Err(GraphError::KindMismatch { .. })
        ));
        assert!(matches!(
            subject.value("Missing"),
            Err(GraphError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn test_attribute_descriptor() {
        let ty = person_type();
        let attrs: Vec<_> = ty.attributes_of("FirstName").collect();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].name(), "FirstName@Unit");
        assert_eq!(attrs[0].attribute_name(), Some("Unit"));
        assert!(attrs[0].is_attribute());
    }

    #[test]
    fn test_accepts() {
        let any = PropertyDescriptor::collection("Items");
        let people = PropertyDescriptor::collection("People").of_type("Person");
        assert!(any.accepts("Machine"));
        assert!(people.accepts("Person"));
        assert!(!people.accepts("Machine"));
    }
}
