//! StoreSync CLI
//!
//! Command-line tools for trying sync requests against fixture files.
//!
//! A fixture is a JSON file holding type declarations and a store snapshot:
//!
//! ```json
//! {
//!   "types": [{"tag": "Tag", "clientType": "tag"}],
//!   "store": {"entities": {"Tag": [{"id": 1, "name": "sf"}]}, "joins": {}}
//! }
//! ```
//!
//! # Commands
//!
//! - `apply` - Run a sync request against a fixture and print the response
//! - `check` - Validate a fixture and report eager relation cycles

mod commands;

use clap::{Parser, Subcommand};
use commands::apply::ApplyOptions;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// StoreSync command-line tools.
#[derive(Parser)]
#[command(name = "storesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a sync request against a fixture
    Apply {
        /// Fixture file with type declarations and store contents
        #[arg(short, long)]
        fixture: PathBuf,

        /// Request body file
        #[arg(short, long)]
        request: PathBuf,

        /// Act as this user id (anonymous if omitted)
        #[arg(short, long)]
        actor: Option<u64>,

        /// Write the fixture with the post-request store here
        #[arg(short, long)]
        save: Option<PathBuf>,

        /// Indent the response
        #[arg(long)]
        pretty: bool,
    },

    /// Validate a fixture
    Check {
        /// Fixture file
        #[arg(short, long)]
        fixture: PathBuf,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Apply {
            fixture,
            request,
            actor,
            save,
            pretty,
        } => {
            let options = ApplyOptions { actor, pretty };
            commands::apply::run(&fixture, &request, &options, save.as_deref())?;
        }
        Commands::Check { fixture } => {
            commands::check::run(&fixture)?;
        }
        Commands::Version => {
            println!("StoreSync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("StoreSync Core v{}", storesync_core::VERSION);
        }
    }

    Ok(())
}
