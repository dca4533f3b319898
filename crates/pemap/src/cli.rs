//! CLI definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "pemap")]
#[command(about = "Map and run PE images from memory")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (only show errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default tracing directive for the selected verbosity.
    pub const fn log_directive(&self) -> &'static str {
        if self.verbose {
            "pemap=debug"
        } else if self.silent {
            "pemap=error"
        } else {
            "pemap=info"
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print headers, sections, relocations, imports, exports and POGO data
    Inspect {
        /// Input PE file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
    /// Map a PE file into executable memory
    Load {
        /// Input PE file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Run the entry point after mapping
        #[arg(long)]
        execute: bool,

        /// Skip the instruction cache flush
        #[arg(long)]
        no_flush: bool,

        /// Map away from the preferred base even without relocations
        #[arg(long)]
        allow_relocation_skip: bool,
    },
}
