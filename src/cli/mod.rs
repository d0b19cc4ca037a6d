//! CLI module for docshape
//!
//! Provides command-line interface for:
//! - paths: List the paths a collection admits
//! - resolve: Resolve one dot path to its type
//! - check-filter / check-update / check-pipeline: Validate a document read from stdin

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command, SchemaArgs};
pub use commands::{
    check_filter, check_pipeline, check_update, init_logging, paths, resolve_type, run,
    run_command, Target,
};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{error_envelope, ok_envelope, read_document, read_request, write_error, write_response};
