// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use trellis_config::TrellisConfig;

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};

/// Executes the `validate` command.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let config_path = cli
        .config
        .as_ref()
        .ok_or_else(|| BinError::config("no configuration file given (use -c <path>)"))?;

    if !config_path.exists() {
        return Err(BinError::Configuration(format!(
            "Configuration file not found: {}",
            config_path.display()
        )));
    }

    let config = trellis_config::load_config(config_path)
        .map_err(|e| BinError::from(e).with_context("Configuration validation failed"))?;
    let warnings = collect_warnings(&config);
    let server = &config.server;

    match args.format {
        OutputFormat::Text => {
            println!("✓ Configuration is valid: {}", config_path.display());
            println!();
            println!("Summary:");
            println!("  Application:       {}", server.application_name);
            println!("  Namespace:         {}", server.namespace_uri);
            println!(
                "  Root folder:       {}",
                server.root_folder_name.as_deref().unwrap_or("(Objects folder)")
            );
            println!("  Value buffer:      {} ms", server.buffer_time_ms);
            println!("  Node management:   {}", enabled(server.enable_external_node_management));
            println!("  Max sessions:      {}", server.max_sessions);
            println!("  Type overrides:    {}", server.subject_types.len());
            println!("  Property overrides: {}", server.properties.len());

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &warnings {
                    println!("  ⚠ {}", warning);
                }
            }

            if args.show_config {
                println!();
                println!("Parsed configuration:");
                let json = serde_json::to_string_pretty(&config)
                    .unwrap_or_else(|_| "(serialization error)".to_string());
                println!("{json}");
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": config_path.display().to_string(),
                "summary": {
                    "application_name": server.application_name,
                    "namespace_uri": server.namespace_uri,
                    "root_folder_name": server.root_folder_name,
                    "buffer_time_ms": server.buffer_time_ms,
                    "external_node_management": server.enable_external_node_management,
                    "max_sessions": server.max_sessions,
                    "subject_type_overrides": server.subject_types.len(),
                    "property_overrides": server.properties.len(),
                },
                "warnings": warnings,
                "config": if args.show_config { Some(&config) } else { None },
            });
            let json = serde_json::to_string_pretty(&output)
                .map_err(|e| BinError::runtime(format!("failed to encode result: {e}")))?;
            println!("{json}");
        }
    }

    if args.strict && !warnings.is_empty() {
        return Err(BinError::Configuration(format!(
            "Strict mode: {} warning(s) found",
            warnings.len()
        )));
    }

    Ok(())
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}

/// Settings that are valid but probably not intended.
pub fn collect_warnings(config: &TrellisConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let server = &config.server;

    if server.enable_external_node_management {
        warnings.push("Remote node management is enabled; clients can create and delete subjects".to_string());
    }
    if config.host.max_attempts == 0 {
        warnings.push("host.max_attempts is 0; the engine is restarted forever".to_string());
    }
    for property in &server.properties {
        if property.value_property.is_some() && property.collection_structure.is_some() {
            warnings.push(format!(
                "{}.{} sets both value_property and collection_structure; only one applies",
                property.subject_type, property.property
            ));
        }
        if property.node_identifier.is_some() && property.collection_structure.is_some() {
            warnings.push(format!(
                "{}.{}: node_identifier only applies to the container folder",
                property.subject_type, property.property
            ));
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_config::{CollectionStructure, PropertyNodeConfig};

    #[test]
    fn test_default_config_warnings() {
        let mut config = TrellisConfig::default();
        config.host.max_attempts = 5;
        assert!(collect_warnings(&config).is_empty());

        config.host.max_attempts = 0;
        assert_eq!(collect_warnings(&config).len(), 1);
    }

    #[test]
    fn test_conflicting_property_override() {
        let mut config = TrellisConfig::default();
        config.host.max_attempts = 5;
        let mut property = PropertyNodeConfig::new("Plant", "Lines");
        property.value_property = Some("Name".to_string());
        property.collection_structure = Some(CollectionStructure::Flat);
        config.server.properties.push(property);

        let warnings = collect_warnings(&config);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("Plant.Lines"));
    }
}
