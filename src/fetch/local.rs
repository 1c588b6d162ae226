// src/fetch/local.rs

use anyhow::{Context, Result};
use glob::glob;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

use super::SourceObject;

/// Read every regular file matching the glob `pattern`, in path order.
pub async fn read_matching(pattern: &str) -> Result<Vec<SourceObject>> {
    let mut paths: Vec<PathBuf> = glob(pattern)
        .with_context(|| format!("Failed to read glob pattern '{}'", pattern))?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut objects = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        debug!(file = %path.display(), bytes = bytes.len(), "read local object");
        objects.push(SourceObject {
            name: path.display().to_string(),
            contents: String::from_utf8_lossy(&bytes).into_owned(),
        });
    }
    Ok(objects)
}
