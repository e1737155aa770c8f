// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `ap` CLI.
//!
//! `ap validate <project>` runs read-only preflight; `ap start <project>`
//! runs the orchestrator until SIGINT/SIGTERM.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod app;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "ap", about = "Autonomous coding-agent orchestrator", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run read-only preflight checks against a project
    Validate {
        /// Path to the project repository
        project_path: PathBuf,
    },
    /// Start the orchestrator for a project
    Start {
        /// Path to the project repository
        project_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Validate { project_path } => app::validate(&project_path).await,
        Commands::Start { project_path } => app::start(&project_path).await,
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {}", ap_core::sanitize(&format!("{err:#}")));
            ExitCode::FAILURE
        }
    }
}
