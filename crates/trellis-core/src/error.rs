// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Errors raised by the subject graph.
//!
//! ```text
//! GraphError
//! ├── UnknownProperty - property name not declared by the subject type
//! ├── KindMismatch    - mutation does not fit the property kind
//! ├── TypeMismatch    - child subject type rejected by the property
//! └── NotWritable     - protocol write to a read-only property
//! ```

use thiserror::Error;

use crate::subject::PropertyKind;

/// Result type for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors produced while reading or mutating the subject graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    /// The subject type does not declare the property.
    #[error("Type '{type_name}' has no property '{property}'")]
    UnknownProperty {
        /// Subject type name.
        type_name: String,
        /// Requested property name.
        property: String,
    },

    /// The requested operation does not apply to the property kind.
    #[error("Property '{property}' is a {actual} property, expected {expected}")]
    KindMismatch {
        /// Property name.
        property: String,
        /// Kind the operation requires.
        expected: PropertyKind,
        /// Kind the property declares.
        actual: PropertyKind,
    },

    /// The child subject's type is not accepted by the property.
    #[error("Property '{property}' accepts '{expected}' subjects, got '{actual}'")]
    TypeMismatch {
        /// Property name.
        property: String,
        /// Accepted element type.
        expected: String,
        /// Offered subject type.
        actual: String,
    },

    /// The property is read-only for protocol writes.
    #[error("Property '{property}' is not writable")]
    NotWritable {
        /// Property name.
        property: String,
    },
}

impl GraphError {
    /// Creates an unknown property error.
    pub fn unknown_property(type_name: impl Into<String>, property: impl Into<String>) -> Self {
        Self::UnknownProperty {
            type_name: type_name.into(),
            property: property.into(),
        }
    }

    /// Creates a kind mismatch error.
    pub fn kind_mismatch(
        property: impl Into<String>,
        expected: PropertyKind,
        actual: PropertyKind,
    ) -> Self {
        Self::KindMismatch {
            property: property.into(),
            expected,
            actual,
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(
        property: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            property: property.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Returns `true` for errors caused by an incompatible child type.
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphError::type_mismatch("People", "Person", "Machine");
        assert_eq!(
            err.to_string(),
            "Property 'People' accepts 'Person' subjects, got 'Machine'"
        );
        assert!(err.is_type_mismatch());

        let err = GraphError::kind_mismatch("Name", PropertyKind::Collection, PropertyKind::Value);
        assert!(err.to_string().contains("value property"));
    }
}
