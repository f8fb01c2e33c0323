//! cocosbuild CLI: staged Cocos Creator to Android APK build pipeline.
//!
//! Drives git, Cocos Creator, and the Gradle wrapper through named stages
//! and exits with a status CI jobs can branch on.

mod commands;

use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => return Ok(commands::usage_error(&e)),
    };
    commands::init_tracing(&cli);
    commands::run(cli).await
}
