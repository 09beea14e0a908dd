// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `version` command.

use crate::cli::Cli;
use crate::error::BinResult;

/// Displays version information for every crate.
pub fn version(_cli: &Cli) -> BinResult<()> {
    println!("Trellis - address-space synchronization for live subject graphs");
    println!();
    println!("Version Information:");
    println!("  trellis-bin:    {}", env!("CARGO_PKG_VERSION"));
    println!("  trellis-core:   {}", trellis_core::VERSION);
    println!("  trellis-config: {}", trellis_config::VERSION);
    println!("  trellis-opcua:  {}", trellis_opcua::VERSION);
    println!();
    println!("Build Information:");
    println!("  Target:         {}", std::env::consts::ARCH);
    println!("  OS:             {}", std::env::consts::OS);
    println!();
    println!("License: PolyForm Noncommercial License 1.0.0");
    println!("Copyright (c) 2025 Sylvex. All rights reserved.");

    Ok(())
}
