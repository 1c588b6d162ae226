// src/sink/parquet.rs

use anyhow::{Context, Result};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{
    fs::{self, File},
    path::Path,
};
use tracing::{info, instrument};

use crate::normalize::NormalizedRecord;
use crate::process::convert::records_to_batch;
use crate::schema::Column;

/// Write `records` to `path` as a single Parquet file, replacing any previous
/// file. Type errors are raised before the existing file is touched; the new
/// file is written to a temp path and renamed into place.
#[instrument(level = "info", skip(path, records, columns), fields(path = %path.display(), rows = records.len()))]
pub fn write_truncate(path: &Path, records: &[NormalizedRecord], columns: &[Column]) -> Result<u64> {
    let batch = records_to_batch(records, columns)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating output directory {}", parent.display()))?;
    }

    let temp_path = path.with_extension("parquet.tmp");
    let file = File::create(&temp_path)
        .with_context(|| format!("creating {}", temp_path.display()))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .context("creating parquet writer")?;
    writer.write(&batch).context("writing batch to parquet")?;
    writer.close().context("closing parquet writer")?;

    fs::rename(&temp_path, path)
        .with_context(|| format!("renaming {} -> {}", temp_path.display(), path.display()))?;

    let rows = batch.num_rows() as u64;
    info!(rows, "replaced table contents");
    Ok(rows)
}
