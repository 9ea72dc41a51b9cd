//! CLI argument definitions using clap
//!
//! Commands:
//! - clausetree query [--mappings <path>]
//! - clausetree aggs [--mappings <path>]
//! - clausetree tabular --aggs <path> [--mappings <path>] [--grouped-by <name>]
//! - clausetree normalize --aggs <path> [--mappings <path>]

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Builds, validates and auto-corrects search queries and aggregations
#[derive(Parser, Debug)]
#[command(name = "clausetree")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate and auto-correct a query read from stdin
    Query {
        /// Mapping declaration, overrides the configured one
        #[arg(long)]
        mappings: Option<PathBuf>,
    },

    /// Validate and auto-correct an aggregation declaration read from stdin
    Aggs {
        /// Mapping declaration, overrides the configured one
        #[arg(long)]
        mappings: Option<PathBuf>,
    },

    /// Turn an aggregation response read from stdin into rows
    Tabular {
        /// Aggregation declaration the response was produced by
        #[arg(long)]
        aggs: PathBuf,

        /// Mapping declaration, overrides the configured one
        #[arg(long)]
        mappings: Option<PathBuf>,

        /// Aggregation whose buckets become rows
        #[arg(long)]
        grouped_by: Option<String>,
    },

    /// Turn an aggregation response read from stdin into a normalized tree
    Normalize {
        /// Aggregation declaration the response was produced by
        #[arg(long)]
        aggs: PathBuf,

        /// Mapping declaration, overrides the configured one
        #[arg(long)]
        mappings: Option<PathBuf>,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
