// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The subject context: creates subjects, applies mutations and dispatches
//! change events to listeners.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       SubjectContext                         │
//! │                                                              │
//! │  set_value / set_value_from_protocol ──► ValueChanged ───┐   │
//! │                                                          │   │
//! │  mutate ──┬─ structure lock ─┬─ apply to subject state   │   │
//! │           │                  └─ dispatch structural ─────┤   │
//! │           └─ (released)                                  ▼   │
//! │                                        ┌──────────────────┐  │
//! │                                        │  GraphListener*  │  │
//! │                                        └──────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Structural mutations and their dispatch happen under one re-entrant
//! structure lock, so listeners see structural events in the order the
//! mutations were applied. A listener may mutate the graph from inside a
//! callback on the same thread.

use std::collections::btree_map::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, ReentrantMutex, RwLock};

use crate::error::{GraphError, GraphResult};
use crate::event::{ChangeOrigin, CollectionChange, DictionaryChange, GraphEvent, GraphListener};
use crate::subject::{PropertyKind, PropertyRef, PropertyState, Subject, SubjectId, SubjectType};
use crate::value::Value;

// =============================================================================
// Mutations
// =============================================================================

/// A structural mutation applied through [`SubjectContext::mutate`].
#[derive(Debug, Clone)]
pub enum GraphMutation {
    /// Inserts into a collection; `None` appends.
    Insert {
        /// Target position.
        index: Option<usize>,
        /// Inserted subject.
        child: Arc<Subject>,
    },
    /// Removes the collection entry at `index`.
    RemoveAt(usize),
    /// Removes the first collection entry holding `child`.
    RemoveItem(Arc<Subject>),
    /// Moves a collection entry.
    Move {
        /// Current position.
        from: usize,
        /// Target position.
        to: usize,
    },
    /// Stores a dictionary entry.
    SetKey {
        /// Entry key.
        key: String,
        /// Stored subject.
        child: Arc<Subject>,
    },
    /// Removes a dictionary entry.
    RemoveKey(String),
    /// Replaces a reference.
    SetReference(Option<Arc<Subject>>),
}

impl GraphMutation {
    fn required_kind(&self) -> PropertyKind {
        match self {
            Self::Insert { .. } | Self::RemoveAt(_) | Self::RemoveItem(_) | Self::Move { .. } => {
                PropertyKind::Collection
            }
            Self::SetKey { .. } | Self::RemoveKey(_) => PropertyKind::Dictionary,
            Self::SetReference(_) => PropertyKind::Reference,
        }
    }

    fn child(&self) -> Option<&Arc<Subject>> {
        match self {
            Self::Insert { child, .. } | Self::SetKey { child, .. } => Some(child),
            Self::SetReference(child) => child.as_ref(),
            _ => None,
        }
    }
}

/// Result of a structural mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The graph changed and listeners were notified.
    Applied,
    /// Nothing changed (stale index, missing key or no-op).
    Ignored,
}

// =============================================================================
// SubjectContext
// =============================================================================

struct ContextInner {
    next_subject: AtomicU64,
    next_listener: AtomicU64,
    listeners: RwLock<Vec<(u64, Arc<dyn GraphListener>)>>,
    structure: ReentrantMutex<()>,
    roots: Mutex<Vec<Arc<Subject>>>,
}

/// Owns subject identity allocation and event dispatch for one graph.
#[derive(Clone)]
pub struct SubjectContext {
    inner: Arc<ContextInner>,
}

impl SubjectContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ContextInner {
                next_subject: AtomicU64::new(1),
                next_listener: AtomicU64::new(1),
                listeners: RwLock::new(Vec::new()),
                structure: ReentrantMutex::new(()),
                roots: Mutex::new(Vec::new()),
            }),
        }
    }

    // =========================================================================
    // Subjects
    // =========================================================================

    /// Creates a detached subject of the given type.
    pub fn create_subject(&self, subject_type: Arc<SubjectType>) -> Arc<Subject> {
        let id = SubjectId::new(self.inner.next_subject.fetch_add(1, Ordering::Relaxed));
        Arc::new(Subject::new(id, subject_type))
    }

    /// Makes `subject` a graph root and notifies listeners.
    pub fn attach_root(&self, subject: Arc<Subject>) {
        let _structure = self.inner.structure.lock();
        {
            let mut roots = self.inner.roots.lock();
            if roots.iter().any(|r| r.id() == subject.id()) {
                return;
            }
            roots.push(subject.clone());
        }
        self.dispatch(&GraphEvent::SubjectAttached { subject });
    }

    /// Removes `subject` from the graph roots and notifies listeners.
    pub fn detach_root(&self, subject: &Arc<Subject>) {
        let _structure = self.inner.structure.lock();
        let removed = {
            let mut roots = self.inner.roots.lock();
            let before = roots.len();
            roots.retain(|r| r.id() != subject.id());
            roots.len() != before
        };
        if removed {
            self.dispatch(&GraphEvent::SubjectDetached {
                subject: subject.clone(),
            });
        }
    }

    /// Returns the current roots.
    pub fn roots(&self) -> Vec<Arc<Subject>> {
        self.inner.roots.lock().clone()
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Registers a listener until the returned guard is dropped.
    pub fn register_listener(&self, listener: Arc<dyn GraphListener>) -> ListenerGuard {
        self.subscribe_with(listener, || ()).0
    }

    /// Registers a listener and runs `init` before any further structural
    /// event can be dispatched.
    ///
    /// Use this to take a consistent snapshot of the graph: every structural
    /// mutation either happened before `init` or is delivered to `listener`
    /// after it.
    pub fn subscribe_with<R>(
        &self,
        listener: Arc<dyn GraphListener>,
        init: impl FnOnce() -> R,
    ) -> (ListenerGuard, R) {
        let _structure = self.inner.structure.lock();
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.write().push((id, listener));
        let guard = ListenerGuard {
            context: Arc::downgrade(&self.inner),
            id,
        };
        (guard, init())
    }

    /// Returns the number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    fn dispatch(&self, event: &GraphEvent) {
        let listeners: Vec<_> = self
            .inner
            .listeners
            .read()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        tracing::trace!(event = %event, listeners = listeners.len(), "Dispatching graph event");
        for listener in listeners {
            listener.on_graph_event(event);
        }
    }

    // =========================================================================
    // Values
    // =========================================================================

    /// Writes a value property from application code.
    pub fn set_value(&self, subject: &Arc<Subject>, name: &str, value: impl Into<Value>) -> GraphResult<()> {
        let value = value.into();
        let now = Utc::now();
        self.write_value(subject, name, value, now, ChangeOrigin::Local)
    }

    /// Writes a value property on behalf of a protocol client.
    ///
    /// Fails with [`GraphError::NotWritable`] for read-only properties.
    pub fn set_value_from_protocol(
        &self,
        property: &PropertyRef,
        changed_at: DateTime<Utc>,
        received_at: DateTime<Utc>,
        value: Value,
    ) -> GraphResult<()> {
        let descriptor = property.descriptor()?;
        if !descriptor.is_writable() {
            return Err(GraphError::NotWritable {
                property: property.name().to_string(),
            });
        }
        self.write_value(
            property.subject(),
            property.name(),
            value,
            changed_at,
            ChangeOrigin::Protocol { received_at },
        )
    }

    fn write_value(
        &self,
        subject: &Arc<Subject>,
        name: &str,
        value: Value,
        changed_at: DateTime<Utc>,
        origin: ChangeOrigin,
    ) -> GraphResult<()> {
        let index = subject.expect_kind(name, PropertyKind::Value)?;
        subject.with_state_mut(index, |state| {
            *state = PropertyState::Value {
                value: value.clone(),
                changed_at,
            };
        });
        self.dispatch(&GraphEvent::ValueChanged {
            property: PropertyRef::new(subject.clone(), name),
            value,
            changed_at,
            origin,
        });
        Ok(())
    }

    // =========================================================================
    // Structure
    // =========================================================================

    /// Applies a structural mutation and notifies listeners.
    ///
    /// Out-of-range indexes and missing keys are ignored. A child whose type
    /// the property does not accept is rejected with
    /// [`GraphError::TypeMismatch`] and nothing changes.
    pub fn mutate(
        &self,
        subject: &Arc<Subject>,
        name: &str,
        mutation: GraphMutation,
    ) -> GraphResult<MutationOutcome> {
        let index = subject.expect_kind(name, mutation.required_kind())?;
        if let Some(child) = mutation.child() {
            let descriptor = subject.descriptor(name)?;
            if !descriptor.accepts(child.type_name()) {
                return Err(GraphError::type_mismatch(
                    name,
                    descriptor.element_type().unwrap_or_default(),
                    child.type_name(),
                ));
            }
        }

        let _structure = self.inner.structure.lock();
        let property = PropertyRef::new(subject.clone(), name);
        let event = subject.with_state_mut(index, |state| apply(state, property, mutation));

        match event {
            Some(event) => {
                self.dispatch(&event);
                Ok(MutationOutcome::Applied)
            }
            None => {
                tracing::debug!(subject = %subject, property = name, "Mutation ignored");
                Ok(MutationOutcome::Ignored)
            }
        }
    }

    /// Appends `child` to a collection.
    pub fn append(&self, subject: &Arc<Subject>, name: &str, child: Arc<Subject>) -> GraphResult<MutationOutcome> {
        self.mutate(subject, name, GraphMutation::Insert { index: None, child })
    }

    /// Removes the collection entry at `index`.
    pub fn remove_at(&self, subject: &Arc<Subject>, name: &str, index: usize) -> GraphResult<MutationOutcome> {
        self.mutate(subject, name, GraphMutation::RemoveAt(index))
    }

    /// Stores a dictionary entry.
    pub fn insert_key(
        &self,
        subject: &Arc<Subject>,
        name: &str,
        key: impl Into<String>,
        child: Arc<Subject>,
    ) -> GraphResult<MutationOutcome> {
        self.mutate(
            subject,
            name,
            GraphMutation::SetKey {
                key: key.into(),
                child,
            },
        )
    }

    /// Replaces a reference.
    pub fn set_reference(
        &self,
        subject: &Arc<Subject>,
        name: &str,
        child: Option<Arc<Subject>>,
    ) -> GraphResult<MutationOutcome> {
        self.mutate(subject, name, GraphMutation::SetReference(child))
    }
}

impl Default for SubjectContext {
    fn default() -> Self {
        Self::new()
    }
}

fn apply(state: &mut PropertyState, property: PropertyRef, mutation: GraphMutation) -> Option<GraphEvent> {
    match (state, mutation) {
        (PropertyState::Collection(items), GraphMutation::Insert { index, child }) => {
            let index = index.unwrap_or(items.len());
            if index > items.len() {
                return None;
            }
            items.insert(index, child.clone());
            Some(GraphEvent::CollectionChanged {
                property,
                change: CollectionChange::Insert { index, child },
            })
        }
        (PropertyState::Collection(items), GraphMutation::RemoveAt(index)) => {
            if index >= items.len() {
                return None;
            }
            let child = items.remove(index);
            Some(GraphEvent::CollectionChanged {
                property,
                change: CollectionChange::Remove { index, child },
            })
        }
        (PropertyState::Collection(items), GraphMutation::RemoveItem(child)) => {
            let index = items.iter().position(|c| c.id() == child.id())?;
            let child = items.remove(index);
            Some(GraphEvent::CollectionChanged {
                property,
                change: CollectionChange::Remove { index, child },
            })
        }
        (PropertyState::Collection(items), GraphMutation::Move { from, to }) => {
            if from >= items.len() || to >= items.len() || from == to {
                return None;
            }
            let child = items.remove(from);
            items.insert(to, child);
            Some(GraphEvent::CollectionChanged {
                property,
                change: CollectionChange::Move { from, to },
            })
        }
        (PropertyState::Dictionary(items), GraphMutation::SetKey { key, child }) => {
            let replaced = match items.entry(key.clone()) {
                Entry::Occupied(mut entry) => {
                    if entry.get().id() == child.id() {
                        return None;
                    }
                    Some(entry.insert(child.clone()))
                }
                Entry::Vacant(entry) => {
                    entry.insert(child.clone());
                    None
                }
            };
            Some(GraphEvent::DictionaryChanged {
                property,
                change: DictionaryChange::Insert { key, child, replaced },
            })
        }
        (PropertyState::Dictionary(items), GraphMutation::RemoveKey(key)) => {
            let child = items.remove(&key)?;
            Some(GraphEvent::DictionaryChanged {
                property,
                change: DictionaryChange::Remove { key, child },
            })
        }
        (PropertyState::Reference(slot), GraphMutation::SetReference(current)) => {
            let unchanged = match (slot.as_ref(), current.as_ref()) {
                (Some(a), Some(b)) => a.id() == b.id(),
                (None, None) => true,
                _ => false,
            };
            if unchanged {
                return None;
            }
            let previous = std::mem::replace(slot, current.clone());
            Some(GraphEvent::ReferenceChanged {
                property,
                previous,
                current,
            })
        }
        _ => None,
    }
}

// =============================================================================
// ListenerGuard
// =============================================================================

/// Deregisters a listener when dropped.
#[must_use = "the listener is removed when the guard is dropped"]
pub struct ListenerGuard {
    context: Weak<ContextInner>,
    id: u64,
}

impl ListenerGuard {
    /// Deregisters the listener now.
    pub fn release(self) {}
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(context) = self.context.upgrade() {
            context.listeners.write().retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerGuard").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::PropertyDescriptor;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl GraphListener for Recorder {
        fn on_graph_event(&self, event: &GraphEvent) {
            let entry = match event {
                GraphEvent::CollectionChanged { change, .. } => match change {
                    CollectionChange::Insert { index, .. } => format!("insert {index}"),
                    CollectionChange::Remove { index, .. } => format!("remove {index}"),
                    CollectionChange::Move { from, to } => format!("move {from}->{to}"),
                },
                other => other.name().to_string(),
            };
            self.events.lock().push(entry);
        }
    }

    fn types() -> (Arc<SubjectType>, Arc<SubjectType>) {
        let person = Arc::new(
            SubjectType::new("Person")
                .with_property(PropertyDescriptor::value("Name").writable())
                .with_property(PropertyDescriptor::value("Age")),
        );
        let team = Arc::new(
            SubjectType::new("Team")
                .with_property(PropertyDescriptor::collection("People").of_type("Person"))
                .with_property(PropertyDescriptor::dictionary("Roles"))
                .with_property(PropertyDescriptor::reference("Lead").of_type("Person")),
        );
        (person, team)
    }

    #[test]
    fn test_subject_ids_are_unique() {
        let ctx = SubjectContext::new();
        let (person, _) = types();
        let a = ctx.create_subject(person.clone());
        let b = ctx.create_subject(person);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_collection_mutations_dispatch_in_order() {
        let ctx = SubjectContext::new();
        let (person, team) = types();
        let recorder = Arc::new(Recorder::default());
        let _guard = ctx.register_listener(recorder.clone());

        let t = ctx.create_subject(team);
        let p1 = ctx.create_subject(person.clone());
        let p2 = ctx.create_subject(person);
        ctx.append(&t, "People", p1).unwrap();
        ctx.append(&t, "People", p2).unwrap();
        ctx.mutate(&t, "People", GraphMutation::Move { from: 1, to: 0 }).unwrap();
        ctx.remove_at(&t, "People", 0).unwrap();

        assert_eq!(
            *recorder.events.lock(),
            vec!["insert 0", "insert 1", "move 1->0", "remove 0"]
        );
    }

    #[test]
    fn test_stale_index_is_ignored() {
        let ctx = SubjectContext::new();
        let (_, team) = types();
        let t = ctx.create_subject(team);
        assert_eq!(ctx.remove_at(&t, "People", 3).unwrap(), MutationOutcome::Ignored);
        assert_eq!(
            ctx.mutate(&t, "People", GraphMutation::Move { from: 0, to: 1 }).unwrap(),
            MutationOutcome::Ignored
        );
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let ctx = SubjectContext::new();
        let (_, team) = types();
        let t = ctx.create_subject(team.clone());
        let other = ctx.create_subject(team);
        let err = ctx.append(&t, "People", other).unwrap_err();
        assert!(err.is_type_mismatch());
        assert!(t.collection("People").unwrap().is_empty());
    }

    #[test]
    fn test_protocol_write_requires_writable() {
        let ctx = SubjectContext::new();
        let (person, _) = types();
        let p = ctx.create_subject(person);
        let now = Utc::now();

        let name = PropertyRef::new(p.clone(), "Name");
        ctx.set_value_from_protocol(&name, now, now, Value::from("Ada")).unwrap();
        assert_eq!(p.value("Name").unwrap(), Value::from("Ada"));

        let age = PropertyRef::new(p.clone(), "Age");
        assert!(matches!(
            ctx.set_value_from_protocol(&age, now, now, Value::Int32(3)),
            Err(GraphError::NotWritable { .. })
        ));
    }

    #[test]
    fn test_dictionary_replace_reports_previous() {
        let ctx = SubjectContext::new();
        let (person, team) = types();
        let t = ctx.create_subject(team);
        let a = ctx.create_subject(person.clone());
        let b = ctx.create_subject(person);

        let seen = Arc::new(Mutex::new(None));
        struct Capture(Arc<Mutex<Option<SubjectId>>>);
        impl GraphListener for Capture {
            fn on_graph_event(&self, event: &GraphEvent) {
                if let GraphEvent::DictionaryChanged {
                    change: DictionaryChange::Insert { replaced: Some(old), .. },
                    ..
                } = event
                {
                    *self.0.lock() = Some(old.id());
                }
            }
        }
        let _guard = ctx.register_listener(Arc::new(Capture(seen.clone())));

        ctx.insert_key(&t, "Roles", "owner", a.clone()).unwrap();
        ctx.insert_key(&t, "Roles", "owner", b).unwrap();
        assert_eq!(*seen.lock(), Some(a.id()));
    }

    #[test]
    fn test_listener_guard_deregisters() {
        let ctx = SubjectContext::new();
        let guard = ctx.register_listener(Arc::new(Recorder::default()));
        assert_eq!(ctx.listener_count(), 1);
        drop(guard);
        assert_eq!(ctx.listener_count(), 0);
    }

    #[test]
    fn test_attach_root_is_idempotent() {
        let ctx = SubjectContext::new();
        let (_, team) = types();
        let recorder = Arc::new(Recorder::default());
        let _guard = ctx.register_listener(recorder.clone());
        let t = ctx.create_subject(team);
        ctx.attach_root(t.clone());
        ctx.attach_root(t.clone());
        ctx.detach_root(&t);
        ctx.detach_root(&t);
        assert_eq!(
            *recorder.events.lock(),
            vec!["subject_attached", "subject_detached"]
        );
    }
}
