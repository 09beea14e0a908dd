// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration schema definitions for Trellis.
//!
//! # Structure
//!
//! ```text
//! TrellisConfig
//! ├── server     - Address-space layout and behaviour
//! │   ├── subject_types  - Type definition per subject type
//! │   └── properties     - Per-property node overrides (type + property)
//! ├── host       - Restart backoff
//! └── logging    - Log level and format
//! ```

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use trellis_core::RetryConfig;

use crate::error::{ConfigError, ConfigResult};

// =============================================================================
// Root Configuration
// =============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrellisConfig {
    /// Address-space settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Host restart settings.
    #[serde(default)]
    pub host: RetryConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TrellisConfig {
    /// Validates the entire configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.server.validate()?;

        if self.host.initial_delay.is_zero() {
            return Err(ConfigError::validation(
                "host.initial_delay",
                "must be greater than zero",
            ));
        }
        if self.host.max_delay < self.host.initial_delay {
            return Err(ConfigError::validation(
                "host.max_delay",
                "must not be smaller than host.initial_delay",
            ));
        }
        if self.host.multiplier < 1.0 {
            return Err(ConfigError::validation(
                "host.multiplier",
                "must be at least 1.0",
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

/// How collection children are laid out in the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionStructure {
    /// Children sit directly under the parent as `Name[i]`.
    Flat,
    /// Children sit under a folder named after the property.
    #[default]
    Container,
}

/// Address-space settings consumed read-only by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Application name reported to clients.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Namespace URI for every node the engine creates.
    #[serde(default = "default_namespace_uri")]
    pub namespace_uri: String,

    /// Name of the folder created under Objects for the root subject.
    ///
    /// When unset, the root subject's children are placed directly under
    /// the Objects folder.
    #[serde(default = "default_root_folder_name")]
    pub root_folder_name: Option<String>,

    /// Interval for flushing buffered value changes (0 = apply immediately).
    #[serde(default = "default_buffer_time_ms")]
    pub buffer_time_ms: u64,

    /// Whether remote clients may add or delete nodes.
    #[serde(default)]
    pub enable_external_node_management: bool,

    /// Layout for collections without an explicit override.
    #[serde(default)]
    pub default_collection_structure: CollectionStructure,

    /// Maximum number of concurrently open sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Type definition overrides per subject type.
    #[serde(default)]
    pub subject_types: Vec<SubjectTypeConfig>,

    /// Node overrides per subject property.
    #[serde(default)]
    pub properties: Vec<PropertyNodeConfig>,
}

fn default_application_name() -> String {
    "Trellis".to_string()
}

fn default_namespace_uri() -> String {
    "urn:trellis:subjects".to_string()
}

fn default_root_folder_name() -> Option<String> {
    Some("Root".to_string())
}

fn default_buffer_time_ms() -> u64 {
    0
}

fn default_max_sessions() -> usize {
    100
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            application_name: default_application_name(),
            namespace_uri: default_namespace_uri(),
            root_folder_name: default_root_folder_name(),
            buffer_time_ms: default_buffer_time_ms(),
            enable_external_node_management: false,
            default_collection_structure: CollectionStructure::default(),
            max_sessions: default_max_sessions(),
            subject_types: Vec::new(),
            properties: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Validates the server configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.namespace_uri.trim().is_empty() {
            return Err(ConfigError::validation(
                "server.namespace_uri",
                "cannot be empty",
            ));
        }
        if let Some(name) = &self.root_folder_name {
            if name.trim().is_empty() {
                return Err(ConfigError::validation(
                    "server.root_folder_name",
                    "cannot be empty; omit it to use the Objects folder",
                ));
            }
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::validation(
                "server.max_sessions",
                "must be greater than zero",
            ));
        }
        let mut seen = HashSet::new();
        for (index, property) in self.properties.iter().enumerate() {
            property.validate(index)?;
            if !seen.insert((property.subject_type.as_str(), property.property.as_str())) {
                return Err(ConfigError::validation(
                    format!("server.properties[{index}]"),
                    format!(
                        "duplicate override for {}.{}",
                        property.subject_type, property.property
                    ),
                ));
            }
        }
        for (index, ty) in self.subject_types.iter().enumerate() {
            if ty.name.trim().is_empty() || ty.type_definition.trim().is_empty() {
                return Err(ConfigError::validation(
                    format!("server.subject_types[{index}]"),
                    "name and type_definition cannot be empty",
                ));
            }
        }
        Ok(())
    }

    /// Returns the value flush interval.
    pub fn buffer_time(&self) -> Duration {
        Duration::from_millis(self.buffer_time_ms)
    }

    /// Returns the override for a property, if any.
    pub fn property(&self, type_name: &str, property: &str) -> Option<&PropertyNodeConfig> {
        self.properties
            .iter()
            .find(|p| p.subject_type == type_name && p.property == property)
    }

    /// Returns the type override for a subject type, if any.
    pub fn subject_type(&self, type_name: &str) -> Option<&SubjectTypeConfig> {
        self.subject_types.iter().find(|t| t.name == type_name)
    }

    /// Returns the effective layout of a collection property.
    pub fn collection_structure(&self, type_name: &str, property: &str) -> CollectionStructure {
        self.property(type_name, property)
            .and_then(|p| p.collection_structure)
            .unwrap_or(self.default_collection_structure)
    }
}

/// Type definition for objects created from one subject type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubjectTypeConfig {
    /// Subject type name.
    pub name: String,

    /// Object type identifier (name, node id or expanded node id).
    pub type_definition: String,

    /// Namespace hint used to look the identifier up by browse name.
    #[serde(default)]
    pub namespace_uri: Option<String>,
}

/// Per-property node overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertyNodeConfig {
    /// Subject type declaring the property.
    pub subject_type: String,

    /// Property name.
    pub property: String,

    /// Explicit node id instead of the path-derived one.
    #[serde(default)]
    pub node_identifier: Option<String>,

    /// Browse name instead of the property name.
    #[serde(default)]
    pub browse_name: Option<String>,

    /// Display name instead of the browse name.
    #[serde(default)]
    pub display_name: Option<String>,

    /// Node description.
    #[serde(default)]
    pub description: Option<String>,

    /// Reference type from the parent to this node.
    #[serde(default)]
    pub reference_type: Option<String>,

    /// Reference type from a container to its items.
    #[serde(default)]
    pub item_reference_type: Option<String>,

    /// Type definition for the created node.
    #[serde(default)]
    pub type_definition: Option<String>,

    /// Data type override for variables.
    #[serde(default)]
    pub data_type: Option<String>,

    /// Namespace hint for identifier lookups in this entry.
    #[serde(default)]
    pub namespace_uri: Option<String>,

    /// Layout for collection properties.
    #[serde(default)]
    pub collection_structure: Option<CollectionStructure>,

    /// Presents a referenced subject as a variable holding this property.
    #[serde(default)]
    pub value_property: Option<String>,
}

impl PropertyNodeConfig {
    /// Creates an empty override for one property.
    pub fn new(subject_type: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            subject_type: subject_type.into(),
            property: property.into(),
            ..Default::default()
        }
    }

    fn validate(&self, index: usize) -> ConfigResult<()> {
        if self.subject_type.trim().is_empty() || self.property.trim().is_empty() {
            return Err(ConfigError::validation(
                format!("server.properties[{index}]"),
                "subject_type and property cannot be empty",
            ));
        }
        let non_empty = [
            ("node_identifier", &self.node_identifier),
            ("browse_name", &self.browse_name),
            ("value_property", &self.value_property),
        ];
        for (field, value) in non_empty {
            if value.as_deref().map_or(false, |v| v.trim().is_empty()) {
                return Err(ConfigError::validation(
                    format!("server.properties[{index}].{field}"),
                    "cannot be empty",
                ));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Log format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Returns the filter directive for this level.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// Parses a level name.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Compact single-line text.
    Compact,
    /// JSON for log aggregation.
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrellisConfig::default();
        config.validate().unwrap();
        assert_eq!(config.server.root_folder_name.as_deref(), Some("Root"));
        assert_eq!(
            config.server.default_collection_structure,
            CollectionStructure::Container
        );
        assert!(!config.server.enable_external_node_management);
    }

    #[test]
    fn test_collection_structure_override() {
        let mut server = ServerConfig::default();
        server.properties.push(PropertyNodeConfig {
            collection_structure: Some(CollectionStructure::Flat),
            ..PropertyNodeConfig::new("Team", "People")
        });
        assert_eq!(
            server.collection_structure("Team", "People"),
            CollectionStructure::Flat
        );
        assert_eq!(
            server.collection_structure("Team", "Machines"),
            CollectionStructure::Container
        );
    }

    #[test]
    fn test_invalid_property_override() {
        let mut config = TrellisConfig::default();
        config.server.properties.push(PropertyNodeConfig::default());
        let err = config.validate().unwrap_err();
        assert!(err.is_validation());

        let mut config = TrellisConfig::default();
        config.server.properties.push(PropertyNodeConfig::new("Team", "People"));
        config.server.properties.push(PropertyNodeConfig::new("Team", "People"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_root_folder_rejected() {
        let mut config = TrellisConfig::default();
        config.server.root_folder_name = Some("  ".to_string());
        assert!(config.validate().is_err());

        config.server.root_folder_name = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_bounds() {
        let mut config = TrellisConfig::default();
        config.host.max_delay = Duration::from_millis(10);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("verbose"), None);
    }
}
