// src/fetch/gcs.rs

use anyhow::{Context, Result};
use futures::{stream, StreamExt, TryStreamExt};
use glob::{MatchOptions, Pattern};
use google_cloud_storage::{
    client::{google_cloud_auth::credentials::CredentialsFile, Client, ClientConfig},
    http::objects::{download::Range, get::GetObjectRequest, list::ListObjectsRequest},
};
use std::path::Path;
use tracing::{debug, info, instrument};

use super::{literal_prefix, SourceObject};

/// Concurrent object downloads.
const DOWNLOAD_CONCURRENCY: usize = 8;

/// Build a GCS client, from an explicit key file if one is configured,
/// otherwise from application default credentials.
pub async fn make_client(credentials: Option<&Path>) -> Result<Client> {
    let config = match credentials {
        Some(path) => {
            let file = CredentialsFile::new_from_file(path.to_string_lossy().into_owned())
                .await
                .with_context(|| format!("loading credentials from {}", path.display()))?;
            ClientConfig::default()
                .with_credentials(file)
                .await
                .context("authenticating GCS client")?
        }
        None => ClientConfig::default()
            .with_auth()
            .await
            .context("authenticating GCS client")?,
    };
    Ok(Client::new(config))
}

/// Glob match on object names. `*` does not cross `/`.
pub fn object_matches(pattern: &Pattern, name: &str) -> bool {
    let opts = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };
    pattern.matches_with(name, opts)
}

/// List every object name in `bucket` starting with `prefix`, across pages.
async fn list_names(client: &Client, bucket: &str, prefix: &str) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut page_token = None;
    loop {
        let req = ListObjectsRequest {
            bucket: bucket.to_string(),
            prefix: Some(prefix.to_string()),
            page_token: page_token.take(),
            ..Default::default()
        };
        let resp = client
            .list_objects(&req)
            .await
            .with_context(|| format!("listing gs://{}/{}", bucket, prefix))?;
        names.extend(resp.items.unwrap_or_default().into_iter().map(|o| o.name));
        match resp.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => break,
        }
    }
    Ok(names)
}

/// Download every object in `bucket` whose name matches `pattern`, sorted by name.
#[instrument(level = "info", skip(client))]
pub async fn read_matching(client: &Client, bucket: &str, pattern: &str) -> Result<Vec<SourceObject>> {
    let glob = Pattern::new(pattern).with_context(|| format!("bad object pattern '{}'", pattern))?;
    let prefix = literal_prefix(pattern);

    let mut names: Vec<String> = list_names(client, bucket, prefix)
        .await?
        .into_iter()
        .filter(|n| object_matches(&glob, n))
        .collect();
    names.sort();
    info!(matched = names.len(), prefix, "listed objects");

    stream::iter(names)
        .map(|name| async move {
            let req = GetObjectRequest {
                bucket: bucket.to_string(),
                object: name.clone(),
                ..Default::default()
            };
            let bytes = client
                .download_object(&req, &Range::default())
                .await
                .with_context(|| format!("downloading gs://{}/{}", bucket, name))?;
            debug!(object = %name, bytes = bytes.len(), "downloaded");
            Ok::<_, anyhow::Error>(SourceObject {
                name: format!("gs://{}/{}", bucket, name),
                contents: String::from_utf8_lossy(&bytes).into_owned(),
            })
        })
        .buffered(DOWNLOAD_CONCURRENCY)
        .try_collect()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn star_stays_within_one_level() -> Result<()> {
        let p = Pattern::new("*.AX.csv")?;
        assert!(object_matches(&p, "CBA.AX.csv"));
        assert!(!object_matches(&p, "archive/CBA.AX.csv"));
        assert!(!object_matches(&p, "AAPL.US.csv"));

        let p = Pattern::new("prices/**/*.csv")?;
        assert!(object_matches(&p, "prices/2020/01/CBA.csv"));
        Ok(())
    }

    #[tokio::test]
    #[ignore] // needs a real bucket and credentials
    async fn test_read_bucket() -> Result<()> {
        let bucket = std::env::var("GCS_TEST_BUCKET")?;
        let client = make_client(None).await?;
        let objects = read_matching(&client, &bucket, "*.csv").await?;
        assert!(!objects.is_empty());
        Ok(())
    }
}
