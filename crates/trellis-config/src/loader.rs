// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading for Trellis.
//!
//! # Loading Pipeline
//!
//! 1. Read the YAML/TOML/JSON file
//! 2. Resolve `${VAR}` / `${VAR:default}` placeholders
//! 3. Parse into [`TrellisConfig`]
//! 4. Apply environment variable overrides
//! 5. Validate
//!
//! # Environment Variable Override
//!
//! ```text
//! TRELLIS_SERVER_NAMESPACE_URI=urn:plant:line-1
//! TRELLIS_SERVER_ROOT_FOLDER_NAME=Line1
//! TRELLIS_SERVER_BUFFER_TIME_MS=50
//! TRELLIS_SERVER_ENABLE_EXTERNAL_NODE_MANAGEMENT=true
//! TRELLIS_LOG_LEVEL=debug
//! ```

use std::env;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::schema::{LogLevel, TrellisConfig};

// =============================================================================
// ConfigLoader
// =============================================================================

/// Configuration loader for Trellis.
///
/// # Examples
///
/// ```no_run
/// use trellis_config::loader::ConfigLoader;
///
/// let config = ConfigLoader::new().load("trellis.yaml").unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Environment variable prefix.
    env_prefix: String,

    /// Whether to resolve environment variables.
    resolve_env_vars: bool,
}

impl ConfigLoader {
    /// Creates a new configuration loader with default settings.
    pub fn new() -> Self {
        Self {
            env_prefix: "TRELLIS".to_string(),
            resolve_env_vars: true,
        }
    }

    /// Sets the environment variable prefix.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables environment variable resolution.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Loads configuration from a file.
    ///
    /// The format is chosen by extension: `.yaml`/`.yml`, `.toml` or `.json`.
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<TrellisConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        let format = ConfigFormat::from_path(path)?;

        let content = if self.resolve_env_vars {
            self.resolve_env_placeholders(&content)
        } else {
            content
        };

        let mut config: TrellisConfig = parse_str(&content, format).map_err(|e| match e {
            ConfigError::Serialization { message } => ConfigError::parse(path, message),
            other => other,
        })?;

        self.finish(&mut config)?;
        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Loads configuration from a string.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<TrellisConfig> {
        let mut config = parse_str(content, format)?;
        self.finish(&mut config)?;
        Ok(config)
    }

    fn finish(&self, config: &mut TrellisConfig) -> ConfigResult<()> {
        if self.resolve_env_vars {
            self.apply_env_overrides(config)?;
        }
        config.validate()?;
        debug!(
            namespace = %config.server.namespace_uri,
            properties = config.server.properties.len(),
            subject_types = config.server.subject_types.len(),
            "Configuration validated"
        );
        Ok(())
    }

    /// Resolves `${VAR_NAME}` and `${VAR_NAME:default}` placeholders.
    fn resolve_env_placeholders(&self, content: &str) -> String {
        let mut result = String::with_capacity(content.len());
        let mut rest = content;

        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                result.push_str(&rest[start..]);
                return result;
            };

            let placeholder = &after[..end];
            let (name, default) = match placeholder.split_once(':') {
                Some((name, default)) => (name, Some(default)),
                None => (placeholder, None),
            };

            match (env::var(name), default) {
                (Ok(value), _) => result.push_str(&value),
                (Err(_), Some(default)) => result.push_str(default),
                (Err(_), None) => {
                    warn!("Environment variable '{}' not found", name);
                    result.push_str(&rest[start..start + 2 + end + 1]);
                }
            }
            rest = &after[end + 1..];
        }

        result.push_str(rest);
        result
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&self, config: &mut TrellisConfig) -> ConfigResult<()> {
        let var = |suffix: &str| {
            let name = format!("{}_{}", self.env_prefix, suffix);
            env::var(&name).ok().map(|value| (name, value))
        };

        if let Some((_, value)) = var("SERVER_NAMESPACE_URI") {
            config.server.namespace_uri = value;
        }
        if let Some((_, value)) = var("SERVER_ROOT_FOLDER_NAME") {
            config.server.root_folder_name = if value.is_empty() { None } else { Some(value) };
        }
        if let Some((name, value)) = var("SERVER_BUFFER_TIME_MS") {
            config.server.buffer_time_ms = value
                .parse()
                .map_err(|_| ConfigError::invalid_env_var(name, "expected a number of milliseconds"))?;
        }
        if let Some((_, value)) = var("SERVER_ENABLE_EXTERNAL_NODE_MANAGEMENT") {
            config.server.enable_external_node_management = parse_bool(&value);
        }
        if let Some((name, value)) = var("LOG_LEVEL") {
            config.logging.level = LogLevel::parse(&value)
                .ok_or_else(|| ConfigError::invalid_env_var(name, "expected trace|debug|info|warn|error"))?;
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigError::UnsupportedFormat {
                extension: other.to_string(),
            }),
            None => Err(ConfigError::UnsupportedFormat {
                extension: "(no extension)".to_string(),
            }),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_str(content: &str, format: ConfigFormat) -> ConfigResult<TrellisConfig> {
    match format {
        ConfigFormat::Yaml => yaml_parse(content),
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
        }
    }
}

/// YAML parsing through the `config` crate.
fn yaml_parse<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
    let config = config::Config::builder()
        .add_source(config::File::from_str(content, config::FileFormat::Yaml))
        .build()
        .map_err(|e| ConfigError::serialization(e.to_string()))?;

    config
        .try_deserialize()
        .map_err(|e| ConfigError::serialization(e.to_string()))
}

/// Parses a string to bool.
fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "true" | "1" | "yes" | "on" | "enabled"
    )
}

// =============================================================================
// Convenience Functions
// =============================================================================

/// Loads configuration from a file with default settings.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<TrellisConfig> {
    ConfigLoader::new().load(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("config.yml")).unwrap(),
            ConfigFormat::Yaml
        );
        assert_eq!(
            ConfigFormat::from_path(Path::new("config.toml")).unwrap(),
            ConfigFormat::Toml
        );
        assert!(ConfigFormat::from_path(Path::new("config.txt")).is_err());
        assert!(ConfigFormat::from_path(Path::new("config")).is_err());
    }

    #[test]
    fn test_env_placeholder_with_default() {
        let loader = ConfigLoader::new();
        let result = loader.resolve_env_placeholders("uri: ${TRELLIS_TEST_MISSING_VAR:urn:x}");
        assert_eq!(result, "uri: urn:x");
    }

    #[test]
    fn test_env_placeholder_unresolved_kept() {
        let loader = ConfigLoader::new();
        let result = loader.resolve_env_placeholders("a: ${TRELLIS_TEST_MISSING_VAR} b: ${open");
        assert_eq!(result, "a: ${TRELLIS_TEST_MISSING_VAR} b: ${open");
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool("On"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("0"));
    }

    #[test]
    fn test_load_from_str_json() {
        let json = r#"{"server": {"namespace_uri": "urn:json", "buffer_time_ms": 25}}"#;
        let config = ConfigLoader::new()
            .with_env_vars(false)
            .load_from_str(json, ConfigFormat::Json)
            .unwrap();
        assert_eq!(config.server.namespace_uri, "urn:json");
        assert_eq!(config.server.buffer_time_ms, 25);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let json = r#"{"server": {"namespace": "urn:typo"}}"#;
        let result = ConfigLoader::new()
            .with_env_vars(false)
            .load_from_str(json, ConfigFormat::Json);
        assert!(result.is_err());
    }
}
