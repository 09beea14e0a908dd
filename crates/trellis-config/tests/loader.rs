// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! File-based loading tests.

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;
use trellis_config::{
    CollectionStructure, ConfigError, ConfigFormat, ConfigLoader, LogLevel,
};

const YAML: &str = r#"
server:
  namespace_uri: urn:plant:line-1
  root_folder_name: Line1
  buffer_time_ms: 50
  enable_external_node_management: true
  default_collection_structure: flat
  subject_types:
    - name: Person
      type_definition: PersonType
      namespace_uri: urn:plant:types
  properties:
    - subject_type: Team
      property: People
      collection_structure: container
      item_reference_type: Organizes
    - subject_type: Person
      property: FirstName
      browse_name: GivenName

host:
  initial_delay: 200
  max_delay: 5000
  reset_after: 30000

logging:
  level: debug
  format: json
"#;

fn write_temp(content: &str, suffix: &str) -> NamedTempFile {
    let mut file = NamedTempFile::with_suffix(suffix).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_yaml_file() {
    let file = write_temp(YAML, ".yaml");
    let config = ConfigLoader::new()
        .with_env_prefix("TRELLIS_TEST_YAML")
        .load(file.path())
        .unwrap();

    let server = &config.server;
    assert_eq!(server.namespace_uri, "urn:plant:line-1");
    assert_eq!(server.root_folder_name.as_deref(), Some("Line1"));
    assert_eq!(server.buffer_time(), Duration::from_millis(50));
    assert!(server.enable_external_node_management);
    assert_eq!(server.collection_structure("Team", "People"), CollectionStructure::Container);
    assert_eq!(server.collection_structure("Team", "Robots"), CollectionStructure::Flat);
    assert_eq!(
        server.property("Person", "FirstName").and_then(|p| p.browse_name.as_deref()),
        Some("GivenName")
    );
    assert_eq!(
        server.subject_type("Person").map(|t| t.type_definition.as_str()),
        Some("PersonType")
    );

    assert_eq!(config.host.initial_delay, Duration::from_millis(200));
    assert_eq!(config.host.reset_after, Duration::from_secs(30));
    assert_eq!(config.logging.level, LogLevel::Debug);
}

#[test]
fn test_load_toml_file() {
    let toml = r#"
[server]
namespace_uri = "urn:toml"
max_sessions = 4

[[server.properties]]
subject_type = "Machine"
property = "Speed"
node_identifier = "ns=2;s=Machine.Speed"
"#;
    let file = write_temp(toml, ".toml");
    let config = ConfigLoader::new()
        .with_env_prefix("TRELLIS_TEST_TOML")
        .load(file.path())
        .unwrap();
    assert_eq!(config.server.max_sessions, 4);
    assert_eq!(
        config
            .server
            .property("Machine", "Speed")
            .and_then(|p| p.node_identifier.as_deref()),
        Some("ns=2;s=Machine.Speed")
    );
}

#[test]
fn test_env_overrides() {
    std::env::set_var("TRELLIS_TEST_ENV_SERVER_ROOT_FOLDER_NAME", "");
    std::env::set_var("TRELLIS_TEST_ENV_SERVER_BUFFER_TIME_MS", "75");
    std::env::set_var("TRELLIS_TEST_ENV_LOG_LEVEL", "warn");

    let config = ConfigLoader::new()
        .with_env_prefix("TRELLIS_TEST_ENV")
        .load_from_str("{}", ConfigFormat::Json)
        .unwrap();
    assert_eq!(config.server.root_folder_name, None);
    assert_eq!(config.server.buffer_time_ms, 75);
    assert_eq!(config.logging.level, LogLevel::Warn);

    std::env::set_var("TRELLIS_TEST_ENV_SERVER_BUFFER_TIME_MS", "soon");
    let err = ConfigLoader::new()
        .with_env_prefix("TRELLIS_TEST_ENV")
        .load_from_str("{}", ConfigFormat::Json)
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));
}

#[test]
fn test_missing_file() {
    let err = ConfigLoader::new().load("/nonexistent/trellis.yaml").unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound { .. }));
}

#[test]
fn test_invalid_yaml_reports_path() {
    let file = write_temp("server: [unterminated", ".yaml");
    let err = ConfigLoader::new().load(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}
