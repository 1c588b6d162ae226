// src/sink/mod.rs

use anyhow::{bail, Result};
use std::{fmt, path::PathBuf};

use crate::config::JobConfig;
use crate::normalize::NormalizedRecord;

pub mod bigquery;
pub mod parquet;

pub use bigquery::BigQueryTable;

/// Destination named by `--output`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableRef {
    /// A local Parquet file standing in for the table.
    Parquet(PathBuf),
    BigQuery(BigQueryTable),
}

impl TableRef {
    /// `*.parquet` is a local file; anything else is `[project:]dataset.table`.
    pub fn parse(output: &str) -> Result<Self> {
        let output = output.trim();
        if output.is_empty() {
            bail!("empty output table");
        }
        if output.to_ascii_lowercase().ends_with(".parquet") {
            return Ok(TableRef::Parquet(PathBuf::from(output)));
        }
        BigQueryTable::parse(output).map(TableRef::BigQuery)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableRef::Parquet(p) => write!(f, "{}", p.display()),
            TableRef::BigQuery(t) => write!(f, "{}", t),
        }
    }
}

/// Replace the contents of `table` with `records`, creating it if needed.
/// Returns the number of rows written.
pub async fn write_truncate(
    table: &TableRef,
    records: Vec<NormalizedRecord>,
    config: &JobConfig,
) -> Result<u64> {
    match table {
        TableRef::Parquet(path) => {
            let path = path.clone();
            let schema = config.schema.clone();
            tokio::task::spawn_blocking(move || parquet::write_truncate(&path, &records, &schema))
                .await?
        }
        TableRef::BigQuery(t) => bigquery::write_truncate(t, &records, config).await,
    }
}
