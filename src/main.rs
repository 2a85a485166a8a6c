//! # finledger entry point
//!
//! ```text
//! main()
//!   │
//!   ├─> Parse CLI arguments (clap)
//!   ├─> Merge them over the JSON config file
//!   ├─> Initialize logging (console + rotating files)
//!   └─> Run the subcommand on a current-thread Tokio runtime
//! ```
//!
//! ```bash
//! finledger run --database-path wh.db --source-path Inputs/ACT --output-path gold
//! finledger ledger --database-path wh.db
//! ```

#![warn(clippy::all, rust_2018_idioms)]

mod cli;

use anyhow::{Context as _, Result};
use clap::Parser as _;

fn main() -> Result<()> {
    let mut cli = cli::Cli::parse();
    let config = cli.resolve_config()?;

    finledger::logging::init(config.log_dir.as_deref())?;

    // Every statement against the warehouse is serialized on this one thread.
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?
        .block_on(cli::run_command(&cli.command, &config))
}
