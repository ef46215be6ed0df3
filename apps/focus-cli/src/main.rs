//! FocusForge CLI binary entry point.
//!
//! Initializes the tracing subscriber, parses command-line arguments with
//! clap, and dispatches to the selected subcommand via [`Cli::run`].

mod cli;
mod logging;
mod tui;

use anyhow::Result;
use clap::Parser;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let home = focus_core::focusforge_home();

    // Clean old trace files (best-effort, before tracing is initialized).
    logging::cleanup_old_logs(&home);

    let _guard = logging::init_tracing(&home, cli.is_interactive())?;

    cli.run(&home).await
}
