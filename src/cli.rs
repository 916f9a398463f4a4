use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "minidrive")]
#[command(about = "Mirrors a local directory tree into PostgreSQL and back", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Sync the configured directory with the database until Ctrl-C
    Run,
    /// Import new files and directories from disk into the database once
    Import,
    /// Restore files missing on disk from the database once
    Restore,
    /// Create the database tables and the new-file trigger
    Provision,
    /// Print the stored directory hierarchy
    Tree,
    /// List stored files in a directory
    Ls {
        /// Directory below the mirror root; the root when omitted
        path: Option<String>,
    },
    /// Print configuration values
    PrintConfig,
}
