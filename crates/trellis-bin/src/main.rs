// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Trellis command-line entry point.

use trellis_bin::error::report_error_and_exit;
use trellis_bin::{commands, init_from_cli, Cli};

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();
    if let Err(e) = init_from_cli(&cli) {
        report_error_and_exit(e);
    }
    if let Err(e) = commands::execute(cli).await {
        report_error_and_exit(e);
    }
}
