// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # trellis-config
//!
//! Configuration management for the Trellis address-space engine.
//!
//! - **Schema**: serde-backed configuration structures with validation
//! - **Loader**: YAML/TOML/JSON files, `${VAR}` placeholders and
//!   `TRELLIS_*` environment overrides
//!
//! ## Example
//!
//! ```rust,ignore
//! use trellis_config::{ConfigLoader, CollectionStructure};
//!
//! let config = ConfigLoader::new().load("trellis.yaml")?;
//! let layout = config.server.collection_structure("Team", "People");
//! assert_eq!(layout, CollectionStructure::Container);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_config, ConfigFormat, ConfigLoader};
pub use schema::{
    CollectionStructure, LogFormat, LogLevel, LoggingConfig, PropertyNodeConfig, ServerConfig,
    SubjectTypeConfig, TrellisConfig,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
