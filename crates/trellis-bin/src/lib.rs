// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # trellis-bin
//!
//! Command-line host for the Trellis synchronization engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         main.rs                              │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                    ┌──────▼──────┐
//!                    │    cli.rs   │
//!                    └──────┬──────┘
//!                           │
//!               ┌───────────┼───────────┐
//!               ▼           ▼           ▼
//!        ┌──────────┐ ┌──────────┐ ┌──────────┐
//!        │ commands │ │ runtime  │ │ logging  │
//!        └────┬─────┘ └────┬─────┘ └──────────┘
//!             │            │
//!             │     ┌──────▼──────┐
//!             │     │  shutdown   │
//!             │     └─────────────┘
//!        ┌────▼─────┐
//!        │   demo   │  plant model served by run/browse
//!        └──────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Serve the demo plant (default command)
//! trellis
//!
//! # Serve with a configuration file, readings every 250 ms
//! trellis -c /etc/trellis/trellis.yaml run --tick-ms 250
//!
//! # Validate configuration
//! trellis -c trellis.yaml validate --strict
//!
//! # Print the mirrored address space
//! trellis browse -n "ns=2;s=Root.Lines[0]" -f json
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod cli;
pub mod commands;
pub mod demo;
pub mod error;
pub mod logging;
pub mod runtime;
pub mod shutdown;

// =============================================================================
// Re-exports
// =============================================================================

pub use cli::{Cli, Commands};
pub use error::{BinError, BinResult};
pub use logging::{init_from_cli, init_logging};
pub use runtime::{RuntimeBuilder, TrellisRuntime};
pub use shutdown::ShutdownCoordinator;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
