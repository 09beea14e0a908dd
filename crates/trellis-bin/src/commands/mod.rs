// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.
//!
//! - `run`: Serve the demo model
//! - `validate`: Validate configuration file
//! - `browse`: Print the mirrored address space
//! - `version`: Show version information

mod browse;
mod run;
mod validate;
mod version;

pub use browse::{browse, collect, render_text, BrowseEntry};
pub use run::run;
pub use validate::{collect_warnings, validate};
pub use version::version;

use crate::cli::{Cli, Commands};
use crate::error::BinResult;

/// Executes the appropriate command based on CLI arguments.
pub async fn execute(cli: Cli) -> BinResult<()> {
    match cli.effective_command() {
        Commands::Run(args) => run::run(&cli, args).await,
        Commands::Validate(args) => validate::validate(&cli, args),
        Commands::Browse(args) => browse::browse(&cli, args).await,
        Commands::Version => version::version(&cli),
    }
}
