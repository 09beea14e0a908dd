// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `run` command.

use std::time::Duration;

use tracing::info;

use crate::cli::{Cli, RunArgs};
use crate::error::BinResult;
use crate::runtime::RuntimeBuilder;

/// Serves the demo plant until a shutdown signal.
pub async fn run(cli: &Cli, args: RunArgs) -> BinResult<()> {
    info!("Starting Trellis engine host...");

    let mut builder = RuntimeBuilder::new()
        .simulation((!args.no_simulation).then(|| Duration::from_millis(args.tick_ms)));
    if let Some(path) = &cli.config {
        builder = builder.config_path(path);
    }

    builder.build()?.run().await
}
