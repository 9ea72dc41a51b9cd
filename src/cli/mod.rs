//! CLI module for clausetree
//!
//! Provides command-line interface for:
//! - query: validate and auto-correct a query
//! - aggs: validate and auto-correct an aggregation declaration
//! - tabular: flatten an aggregation response into rows
//! - normalize: turn an aggregation response into a normalized tree

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{normalize_aggs, normalize_query, normalize_response, run, run_command, tabular, Context};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{read_document, read_request, write_error, write_response};
