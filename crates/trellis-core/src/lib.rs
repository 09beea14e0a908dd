// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # trellis-core
//!
//! The observable subject graph mirrored by the Trellis address-space engine.
//!
//! - **Value**: scalar property values
//! - **Subject**: typed graph nodes with value, reference, collection and
//!   dictionary properties
//! - **Context**: subject creation, mutations and change dispatch
//! - **Registry**: identifier → subject factory mapping for remote creation
//! - **Retry**: exponential backoff for restart loops
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use trellis_core::{PropertyDescriptor, SubjectContext, SubjectType};
//!
//! let person = Arc::new(
//!     SubjectType::new("Person")
//!         .with_property(PropertyDescriptor::value("Name").writable())
//!         .with_property(PropertyDescriptor::collection("Children").of_type("Person")),
//! );
//!
//! let ctx = SubjectContext::new();
//! let parent = ctx.create_subject(person.clone());
//! let child = ctx.create_subject(person);
//! ctx.set_value(&child, "Name", "Ada").unwrap();
//! ctx.append(&parent, "Children", child).unwrap();
//! assert_eq!(parent.collection("Children").unwrap().len(), 1);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod context;
pub mod error;
pub mod event;
pub mod registry;
pub mod retry;
pub mod subject;
pub mod value;

pub use context::{GraphMutation, ListenerGuard, MutationOutcome, SubjectContext};
pub use error::{GraphError, GraphResult};
pub use event::{ChangeOrigin, CollectionChange, DictionaryChange, GraphEvent, GraphListener};
pub use registry::{RegisteredType, SubjectFactory, TypeRegistry};
pub use retry::{BackoffTracker, ExponentialBackoff, RetryConfig, RetryDecision};
pub use subject::{
    PropertyDescriptor, PropertyKey, PropertyKind, PropertyRef, Subject, SubjectId, SubjectType,
};
pub use value::Value;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
