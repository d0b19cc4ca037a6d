//! CLI argument definitions using clap
//!
//! Commands:
//! - docshape paths --schema <catalog>
//! - docshape resolve --schema <catalog> --path <path>
//! - docshape check-filter --schema <catalog>
//! - docshape check-update --schema <catalog>
//! - docshape check-pipeline --schema <catalog>

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// docshape - schema-checked filters, updates and pipelines
#[derive(Parser, Debug)]
#[command(name = "docshape")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct SchemaArgs {
    /// Path to the schema catalog file
    #[arg(long)]
    pub schema: PathBuf,

    /// Collection to check against (required when the catalog has several)
    #[arg(long)]
    pub collection: Option<String>,

    /// Path to configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List every path the schema admits
    Paths {
        #[command(flatten)]
        target: SchemaArgs,

        /// Include positional placeholder patterns
        #[arg(long)]
        placeholders: bool,
    },

    /// Resolve one dot path and print its type
    Resolve {
        #[command(flatten)]
        target: SchemaArgs,

        /// Dot path to resolve
        #[arg(long)]
        path: String,

        /// Accept `$`, `$[]` and `$[id]` segments
        #[arg(long)]
        placeholders: bool,

        /// Report values reached through arrays as arrays
        #[arg(long)]
        check_in_array: bool,
    },

    /// Validate a filter document read from stdin
    CheckFilter {
        #[command(flatten)]
        target: SchemaArgs,
    },

    /// Validate an update document or update pipeline read from stdin
    CheckUpdate {
        #[command(flatten)]
        target: SchemaArgs,
    },

    /// Validate an aggregation pipeline read from stdin
    CheckPipeline {
        #[command(flatten)]
        target: SchemaArgs,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
