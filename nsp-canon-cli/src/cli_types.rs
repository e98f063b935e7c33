//! CLI type definitions: the top-level parser, processing flags and the
//! config subcommand.

use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "nsp-canon")]
#[command(about = "Validate and repackage eShop NSP archives", long_about = None)]
#[command(args_conflicts_with_subcommands = true, subcommand_negates_reqs = true)]
pub(crate) struct Cli {
    /// Only show warnings and errors (suppress normal output)
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Enable verbose/debug logging (timestamps + debug-level messages)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write log output to a file (ANSI codes stripped)
    #[arg(long, global = true)]
    pub logfile: Option<PathBuf>,

    #[command(flatten)]
    pub process: ProcessArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Flags for validating and repackaging archives.
#[derive(Args, Clone, Debug)]
#[command(group(ArgGroup::new("action").args(["extract", "standard", "rename"])))]
pub(crate) struct ProcessArgs {
    /// Archives, CDN directories, or directories containing either
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Extract the package contents into a directory
    #[arg(short = 'x', long)]
    pub extract: bool,

    /// Also extract tickets, certificates and loose files
    #[arg(long, requires = "extract")]
    pub extract_all: bool,

    /// Write each sub-container's decrypted header next to it
    #[arg(long, requires = "extract")]
    pub dump_headers: bool,

    /// Rebuild the archive in standard form
    #[arg(short = 's', long, visible_alias = "convert")]
    pub standard: bool,

    /// Rebuild even when the archive is already standard
    #[arg(long)]
    pub force_convert: bool,

    /// Keep delta fragments when rebuilding
    #[arg(long)]
    pub keep_deltas: bool,

    /// Rename the archive to its canonical name
    #[arg(short, long)]
    pub rename: bool,

    /// Show planned actions without executing
    #[arg(short = 'n', long = "dryrun", visible_alias = "dry-run")]
    pub dry_run: bool,

    /// Replace existing output files
    #[arg(long)]
    pub overwrite: bool,

    /// Skip sub-container hash checks
    #[arg(long, conflicts_with = "force_hash")]
    pub skip_hash: bool,

    /// Hash sub-containers even when the package already failed
    #[arg(long)]
    pub force_hash: bool,

    /// Only check archive structure and padding
    #[arg(long)]
    pub check_padding: bool,

    /// Remove the source once the output is written
    #[arg(long)]
    pub delete_source: bool,

    /// Accept add-on content that ships without a ticket
    #[arg(long)]
    pub allow_unlicensed_addon: bool,

    /// Descend into subdirectories
    #[arg(short = 'R', long)]
    pub recursive: bool,

    /// Output directory (default: next to each source)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Keyset file (default: ~/.switch/prod.keys)
    #[arg(long)]
    pub keys: Option<PathBuf>,

    /// Directory of title database JSON files
    #[arg(long)]
    pub titledb: Option<PathBuf>,

    /// Reference copy of the common certificate chain
    #[arg(long)]
    pub cert: Option<PathBuf>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Inspect the settings file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Show configured paths and where they come from
    Show,

    /// Print the settings file path
    Path,
}
