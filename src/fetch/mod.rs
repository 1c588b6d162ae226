// src/fetch/mod.rs

use anyhow::{bail, Result};
use std::path::Path;
use tracing::{info, instrument};

pub mod gcs;
pub mod local;

/// Where input objects come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputPattern {
    /// A filesystem glob, e.g. `data/*.AX.csv`.
    Local(String),
    /// `gs://bucket/<glob>`; `pattern` is the object-name glob.
    Gcs { bucket: String, pattern: String },
}

impl InputPattern {
    pub fn parse(input: &str) -> Result<Self> {
        match input.strip_prefix("gs://") {
            Some(rest) => {
                let Some((bucket, pattern)) = rest.split_once('/') else {
                    bail!("`{}` has no object pattern after the bucket", input);
                };
                if bucket.is_empty() || pattern.is_empty() {
                    bail!("`{}` needs both a bucket and an object pattern", input);
                }
                Ok(InputPattern::Gcs {
                    bucket: bucket.to_string(),
                    pattern: pattern.to_string(),
                })
            }
            None => {
                if input.trim().is_empty() {
                    bail!("empty input pattern");
                }
                Ok(InputPattern::Local(input.to_string()))
            }
        }
    }
}

/// One input object, fully read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceObject {
    pub name: String,
    pub contents: String,
}

impl SourceObject {
    /// Data lines of this object: header dropped, line endings stripped.
    pub fn data_lines(&self) -> impl Iterator<Item = &str> {
        data_lines(&self.contents)
    }
}

/// Lines after the first. `\n` and `\r\n` endings are stripped and a final
/// newline does not produce an empty trailing line.
pub fn data_lines(contents: &str) -> impl Iterator<Item = &str> {
    contents.lines().skip(1)
}

/// Longest literal prefix of a glob, i.e. everything before the first
/// wildcard character.
pub(crate) fn literal_prefix(pattern: &str) -> &str {
    let end = pattern.find(['*', '?', '[']).unwrap_or(pattern.len());
    &pattern[..end]
}

/// Read every object matching `pattern`, sorted by name.
/// Matching nothing is an error.
#[instrument(level = "info", skip(credentials))]
pub async fn read_objects(
    pattern: &InputPattern,
    credentials: Option<&Path>,
) -> Result<Vec<SourceObject>> {
    let objects = match pattern {
        InputPattern::Local(glob) => local::read_matching(glob).await?,
        InputPattern::Gcs { bucket, pattern } => {
            let client = gcs::make_client(credentials).await?;
            gcs::read_matching(&client, bucket, pattern).await?
        }
    };
    if objects.is_empty() {
        bail!("no input objects match {:?}", pattern);
    }
    let bytes: usize = objects.iter().map(|o| o.contents.len()).sum();
    info!(objects = objects.len(), bytes, "read input objects");
    Ok(objects)
}
