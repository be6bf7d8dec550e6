//! assetsync: push a working tree of assets to a remote store.
//!
//! # Usage
//!
//! ```text
//! assetsync replace [FILENAMES]... [--root DIR] [--remote DIR]
//!                   [--rate-capacity N --rate-drain F]
//!                   [--on-load-failure skip|warn|abort] [--queue-depth N]
//!                   [--dry-run] [--json] [--verbose]
//! ```

mod commands;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};

use assetsync_core::LoadFailurePolicy;
use commands::replace::ReplaceArgs;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "assetsync",
    version,
    about = "Reconcile local assets with a remote store at a controlled rate",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Make the remote store match the working root, or upload named files.
    Replace(ReplaceArgs),
}

// ---------------------------------------------------------------------------
// LoadFailurePolicy argument
// ---------------------------------------------------------------------------

/// Thin wrapper so clap can parse `LoadFailurePolicy` from CLI args.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadFailurePolicyArg(pub LoadFailurePolicy);

impl FromStr for LoadFailurePolicyArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self(LoadFailurePolicy::Skip)),
            "warn" => Ok(Self(LoadFailurePolicy::Warn)),
            "abort" => Ok(Self(LoadFailurePolicy::Abort)),
            other => Err(format!(
                "unknown load failure policy '{other}'; expected: skip, warn, abort"
            )),
        }
    }
}

impl fmt::Display for LoadFailurePolicyArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            LoadFailurePolicy::Skip => "skip",
            LoadFailurePolicy::Warn => "warn",
            LoadFailurePolicy::Abort => "abort",
        };
        f.write_str(name)
    }
}

impl From<LoadFailurePolicyArg> for LoadFailurePolicy {
    fn from(p: LoadFailurePolicyArg) -> Self {
        p.0
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Replace(args) => args.run(),
    }
}
