//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// imggate - Authenticated caching gateway for imgproxy
///
/// Verifies weekly-rotated request signatures and keeps transformed
/// images in a content-addressed on-disk cache, fetching each image
/// from the backend at most once.
#[derive(Parser, Debug)]
#[command(name = "imggate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "IMGGATE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the caching gateway server
    Serve(ServeArgs),

    /// Bulk-import images listed in a text file
    Import(ImportArgs),

    /// Show or edit configuration
    Config(ConfigArgs),
}

/// Arguments for the serve command
#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on (overrides config)
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Cache root directory (overrides config)
    #[arg(long)]
    pub root_dir: Option<PathBuf>,
}

/// Arguments for the import command
#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    /// Text file with image URLs, one per line
    pub file: PathBuf,

    /// Directory to store images at (defaults to the configured cache root)
    #[arg(long)]
    pub dest: Option<PathBuf>,

    /// Maximum concurrent fetches
    #[arg(short = 'j', long)]
    pub workers: Option<usize>,

    /// Cache bucket to import into
    #[arg(long)]
    pub bucket: Option<String>,

    /// Do not do multiple requests at the same time
    #[arg(short = 'x', long)]
    pub no_parallel: bool,
}

/// Arguments for the config command
#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Config action to perform
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Print the config file path
    Path,

    /// Write a default config file if none exists
    Init,
}
