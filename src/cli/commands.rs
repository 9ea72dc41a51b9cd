//! CLI command implementations
//!
//! Each command reads one JSON document from stdin and writes one envelope to
//! stdout. Failures are reported in the envelope and returned to the caller.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::aggs::Aggs;
use crate::config::BuilderConfig;
use crate::mappings::Mappings;
use crate::query::Query;
use crate::response::{AggResponse, TabularOptions};

use super::args::{Cli, Command};
use super::errors::CliResult;
use super::io::{read_document, read_request, write_error, write_response};

/// Configuration and mappings a command runs with
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub config: BuilderConfig,
    pub mappings: Option<Arc<Mappings>>,
}

impl Context {
    /// Loads the configuration file, then the mappings; an explicit mappings
    /// path wins over the configured one
    pub fn load(config_path: Option<&Path>, mappings_path: Option<&Path>) -> CliResult<Self> {
        let config = match config_path {
            Some(path) => BuilderConfig::load(path)?,
            None => BuilderConfig::default(),
        };
        let mappings = match mappings_path {
            Some(path) => Some(Mappings::from_file(path)?),
            None => config.load_mappings()?,
        };
        Ok(Self {
            config,
            mappings: mappings.map(Arc::new),
        })
    }

    fn query(&self) -> Query {
        let query = Query::new().with_config(&self.config);
        match &self.mappings {
            Some(mappings) => query.with_mappings(Arc::clone(mappings)),
            None => query,
        }
    }

    fn aggs(&self) -> Aggs {
        let aggs = Aggs::new().with_config(&self.config);
        match &self.mappings {
            Some(mappings) => aggs.with_mappings(Arc::clone(mappings)),
            None => aggs,
        }
    }
}

/// Parse args and run
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    run_command(cli)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cli: Cli) -> CliResult<()> {
    let config = cli.config.as_deref();
    let result = match &cli.command {
        Command::Query { mappings } => Context::load(config, mappings.as_deref())
            .and_then(|ctx| normalize_query(&ctx, &read_request()?)),
        Command::Aggs { mappings } => Context::load(config, mappings.as_deref())
            .and_then(|ctx| normalize_aggs(&ctx, &read_request()?)),
        Command::Tabular {
            aggs,
            mappings,
            grouped_by,
        } => Context::load(config, mappings.as_deref()).and_then(|ctx| {
            let declaration = read_document(aggs)?;
            tabular(&ctx, &declaration, &read_request()?, grouped_by.as_deref())
        }),
        Command::Normalize { aggs, mappings } => {
            Context::load(config, mappings.as_deref()).and_then(|ctx| {
                let declaration = read_document(aggs)?;
                normalize_response(&ctx, &declaration, &read_request()?)
            })
        }
    };

    match result {
        Ok(data) => write_response(data),
        Err(e) => {
            write_error(e.code_str(), e.message())?;
            Err(e)
        }
    }
}

/// Validated and auto-corrected query DSL
pub fn normalize_query(ctx: &Context, input: &Value) -> CliResult<Value> {
    let query = ctx.query().query(input.clone())?;
    info!(clauses = query.tree().len(), "query normalized");
    Ok(query.to_json().unwrap_or(Value::Null))
}

/// Validated and auto-corrected aggregation declaration
pub fn normalize_aggs(ctx: &Context, input: &Value) -> CliResult<Value> {
    let aggs = ctx.aggs().aggs(input.clone(), None)?;
    info!(aggregations = aggs.tree().len().saturating_sub(1), "aggregations normalized");
    Ok(aggs.to_json())
}

/// Rows of an aggregation response
pub fn tabular(ctx: &Context, declaration: &Value, raw: &Value, grouped_by: Option<&str>) -> CliResult<Value> {
    let aggs = ctx.aggs().aggs(declaration.clone(), None)?;
    let response = AggResponse::parse(&aggs, raw)?;
    let mut options = TabularOptions::from(&ctx.config.tabular);
    options.grouped_by = grouped_by.map(str::to_string);
    let table = response.to_tabular(&options)?;
    info!(rows = table.len(), "response flattened");
    Ok(serde_json::to_value(table)?)
}

/// Normalized tree of an aggregation response
pub fn normalize_response(ctx: &Context, declaration: &Value, raw: &Value) -> CliResult<Value> {
    let aggs = ctx.aggs().aggs(declaration.clone(), None)?;
    Ok(AggResponse::parse(&aggs, raw)?.to_normalized())
}
