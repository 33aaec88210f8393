use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "jellympv",
    version,
    about = "Send Jellyfin play/resume clicks to a local mpv through path mappings"
)]
pub struct Cli {
    /// Config file to use instead of the per-user default
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Prompt for the server address, API key and user id again
    Setup {
        #[arg(long)]
        origin: Option<String>,
    },
    /// Print the local path and player URI for a server path
    Map { path: String },
    /// Look up an item's server path through PlaybackInfo
    Resolve {
        item_id: String,
        #[arg(long)]
        play: bool,
    },
    /// Hand a path to the external player
    Play {
        path: String,
        /// Treat PATH as a server path and map it first
        #[arg(long)]
        remote: bool,
    },
    /// Hijack and augment a page snapshot once and report what was found
    Scan { snapshot: PathBuf },
    /// Load a page snapshot and follow host events until they end
    Watch {
        snapshot: PathBuf,
        /// JSON-lines event file, `-` for stdin
        #[arg(long, default_value = "-")]
        events: String,
        /// Page origin offered as the default server address
        #[arg(long)]
        origin: Option<String>,
    },
}
