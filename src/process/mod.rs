// src/process/mod.rs
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info, instrument};

use crate::{
    config::JobConfig,
    fetch::{self, InputPattern, SourceObject},
    normalize::{parse_line, NormalizedRecord},
    sink::{self, TableRef},
};

pub mod convert;
pub mod date_parser;

/// What a finished run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub objects: usize,
    pub rows: u64,
    pub table: String,
}

/// Normalize every data line of every object, in parallel, keeping input order.
pub fn normalize_objects(objects: &[SourceObject]) -> Vec<NormalizedRecord> {
    objects
        .par_iter()
        .flat_map_iter(|obj| obj.data_lines().map(parse_line))
        .collect()
}

/// Run `normalize_objects` on a dedicated pool when a worker count is set.
fn normalize_with_workers(
    objects: &[SourceObject],
    workers: Option<usize>,
) -> Result<Vec<NormalizedRecord>> {
    match workers {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .context("building normalize thread pool")?;
            Ok(pool.install(|| normalize_objects(objects)))
        }
        None => Ok(normalize_objects(objects)),
    }
}

/// Read → normalize → replace table contents.
#[instrument(level = "info", skip(config), fields(input = %config.input, output = %config.output))]
pub async fn run(config: &JobConfig) -> Result<RunSummary> {
    let start = Instant::now();

    // resolve both ends up front so a bad identifier fails before any I/O
    let pattern = InputPattern::parse(&config.input)?;
    let table = TableRef::parse(&config.output)?;
    let workers = config.engine.max_workers()?;
    if !config.engine.raw().is_empty() {
        debug!(options = ?config.engine.raw(), "engine options");
    }

    let objects = fetch::read_objects(&pattern, config.credentials.as_deref()).await?;
    let object_count = objects.len();

    let records = tokio::task::spawn_blocking(move || normalize_with_workers(&objects, workers))
        .await
        .context("normalize stage panicked")??;
    info!(rows = records.len(), elapsed = ?start.elapsed(), "normalized");

    let rows = sink::write_truncate(&table, records, config)
        .await
        .with_context(|| format!("writing {}", table))?;

    info!(objects = object_count, rows, table = %table, elapsed = ?start.elapsed(), "job complete");
    Ok(RunSummary {
        objects: object_count,
        rows,
        table: table.to_string(),
    })
}
