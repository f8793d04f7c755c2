//! CLI argument parsing for revstore

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "revstore")]
#[command(author, version, about = "Inspect and edit svnwatch revision watermarks", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Watermark file (overrides config)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List every recorded watermark
    List,

    /// Show the watermark for one repository
    Get {
        /// Repository id
        #[arg(required = true)]
        repo: String,
    },

    /// Set a watermark to an exact revision (may move it backwards)
    Set {
        /// Repository id
        #[arg(required = true)]
        repo: String,

        /// Revision number
        #[arg(required = true)]
        revision: u64,
    },

    /// Forget a repository so its next check starts from revision 0
    Reset {
        /// Repository id
        #[arg(required = true)]
        repo: String,
    },
}
