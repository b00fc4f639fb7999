//! Command-line interface definitions for the `replika` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `replika` binary.
#[derive(Debug, Parser)]
#[command(
    name = "replika",
    version,
    about = "Replicate a machine image to many accounts concurrently",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Copy the configured source images into every target account.
    #[command(
        name = "copy",
        about = "Copy the configured source images into every target account"
    )]
    Copy(CopyCommand),
}

/// Arguments for the `replika copy` subcommand.
///
/// Flags override the matching `replika.toml` or `REPLIKA_*` settings for
/// this run only.
#[derive(Debug, Default, Parser)]
pub(crate) struct CopyCommand {
    /// Maximum number of copies in flight; 0 copies to every account at once.
    #[arg(long, value_name = "N")]
    pub(crate) concurrency: Option<usize>,
    /// Write a JSON manifest of the successful copies to this path.
    #[arg(long, value_name = "PATH")]
    pub(crate) manifest_output: Option<String>,
    /// Wait for every copy to reach the available state.
    #[arg(long)]
    pub(crate) ensure_available: bool,
}
