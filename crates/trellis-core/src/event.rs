// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Change events emitted by a [`SubjectContext`](crate::SubjectContext).

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::subject::{PropertyRef, Subject};
use crate::value::Value;

/// Where a value change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Application code wrote the property.
    Local,
    /// A protocol client wrote the property.
    Protocol {
        /// When the write reached the server.
        received_at: DateTime<Utc>,
    },
}

/// Structural change to a collection property.
#[derive(Debug, Clone)]
pub enum CollectionChange {
    /// `child` was inserted at `index`.
    Insert {
        /// Position after insertion.
        index: usize,
        /// Inserted subject.
        child: Arc<Subject>,
    },
    /// `child` was removed from `index`.
    Remove {
        /// Position before removal.
        index: usize,
        /// Removed subject.
        child: Arc<Subject>,
    },
    /// The entry at `from` now sits at `to`.
    Move {
        /// Previous position.
        from: usize,
        /// New position.
        to: usize,
    },
}

/// Structural change to a dictionary property.
#[derive(Debug, Clone)]
pub enum DictionaryChange {
    /// `child` was stored under `key`, replacing `replaced` if any.
    Insert {
        /// Entry key.
        key: String,
        /// Stored subject.
        child: Arc<Subject>,
        /// Subject previously stored under the key.
        replaced: Option<Arc<Subject>>,
    },
    /// The entry under `key` was removed.
    Remove {
        /// Entry key.
        key: String,
        /// Removed subject.
        child: Arc<Subject>,
    },
}

/// An event delivered to every registered [`GraphListener`].
#[derive(Debug, Clone)]
pub enum GraphEvent {
    /// A root subject became part of the graph.
    SubjectAttached {
        /// Attached root.
        subject: Arc<Subject>,
    },
    /// A root subject left the graph.
    SubjectDetached {
        /// Detached root.
        subject: Arc<Subject>,
    },
    /// A value property changed.
    ValueChanged {
        /// Changed property.
        property: PropertyRef,
        /// New value.
        value: Value,
        /// Change timestamp.
        changed_at: DateTime<Utc>,
        /// Change origin.
        origin: ChangeOrigin,
    },
    /// A collection property changed.
    CollectionChanged {
        /// Changed property.
        property: PropertyRef,
        /// What happened.
        change: CollectionChange,
    },
    /// A dictionary property changed.
    DictionaryChanged {
        /// Changed property.
        property: PropertyRef,
        /// What happened.
        change: DictionaryChange,
    },
    /// A reference property changed.
    ReferenceChanged {
        /// Changed property.
        property: PropertyRef,
        /// Previous child.
        previous: Option<Arc<Subject>>,
        /// Current child.
        current: Option<Arc<Subject>>,
    },
}

impl GraphEvent {
    /// Returns `true` for events that change graph shape.
    pub fn is_structural(&self) -> bool {
        !matches!(self, Self::ValueChanged { .. })
    }

    /// Returns the event name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SubjectAttached { .. } => "subject_attached",
            Self::SubjectDetached { .. } => "subject_detached",
            Self::ValueChanged { .. } => "value_changed",
            Self::CollectionChanged { .. } => "collection_changed",
            Self::DictionaryChanged { .. } => "dictionary_changed",
            Self::ReferenceChanged { .. } => "reference_changed",
        }
    }
}

impl fmt::Display for GraphEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SubjectAttached { subject } | Self::SubjectDetached { subject } => {
                write!(f, "{} {}", self.name(), subject)
            }
            Self::ValueChanged { property, .. }
            | Self::CollectionChanged { property, .. }
            | Self::DictionaryChanged { property, .. }
            | Self::ReferenceChanged { property, .. } => write!(f, "{} {}", self.name(), property),
        }
    }
}

/// Receives graph events.
///
/// Structural events are delivered while the context's structure lock is
/// held, one at a time and in mutation order. Value events are delivered
/// from whichever thread performed the write.
pub trait GraphListener: Send + Sync {
    /// Handles one event.
    fn on_graph_event(&self, event: &GraphEvent);
}
