//! Command-line arguments

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Default storage directory, relative to the working directory
pub(crate) const DEFAULT_DIR: &str = ".linkdeck";

#[derive(Parser, Debug)]
#[command(
    name = "linkdeck",
    version,
    about = "Offline-first link workspace with server sync",
    arg_required_else_help = true
)]
pub(crate) struct Cli {
    /// Debug-level logging
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    pub(crate) verbose: bool,

    /// Errors only
    #[arg(short, long, global = true, action = ArgAction::SetTrue)]
    pub(crate) quiet: bool,

    /// Disable colored log output
    #[arg(long, global = true)]
    pub(crate) no_color: bool,

    /// TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    pub(crate) config: Option<PathBuf>,

    /// Storage directory (overrides `storage.dir`)
    #[arg(long, global = true, value_name = "DIR")]
    pub(crate) dir: Option<PathBuf>,

    /// Sync endpoint (overrides `remote.endpoint`)
    #[arg(long, global = true, value_name = "URL")]
    pub(crate) endpoint: Option<String>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    /// Print the workspace
    Show {
        /// Print the raw JSON state
        #[arg(long)]
        json: bool,
    },
    /// Add a link to the free pool
    Add {
        url: String,
        /// Display label; derived from the host when omitted
        #[arg(long, short)]
        label: Option<String>,
    },
    /// Remove a link, free or pinned
    Remove { url: String },
    /// Create a pinned group
    Group { label: String },
    /// Pin a link into a group
    Pin { url: String, group_id: String },
    /// Move a pinned link back to the free pool
    Unpin { url: String, group_id: String },
    /// Reconcile with the server and push pending changes
    Sync,
}
