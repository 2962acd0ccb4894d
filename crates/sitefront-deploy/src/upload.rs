//! Website upload: sync a build output directory into its origin bucket.
//!
//! Every file under the build directory is uploaded with a guessed
//! content type, then objects that no longer exist locally are deleted.
//! Deleted objects become noncurrent versions and expire through the
//! bucket's lifecycle rule.

use crate::error::UploadError;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Concurrent object uploads per site.
pub const UPLOAD_CONCURRENCY: usize = 8;

/// S3 `DeleteObjects` accepts at most this many keys per request.
const DELETE_BATCH_SIZE: usize = 1000;

/// A local file and the object key it is uploaded under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAsset {
    pub key: String,
    pub path: PathBuf,
    pub content_type: String,
}

/// What a sync changed in the bucket.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct SyncReceipt {
    pub uploaded: usize,
    pub deleted: usize,
}

/// Object storage operations the sync needs.
#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Every current object key in the bucket.
    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>, UploadError>;

    async fn put_object(&self, bucket: &str, asset: &LocalAsset) -> Result<(), UploadError>;

    async fn delete_keys(&self, bucket: &str, keys: &[String]) -> Result<(), UploadError>;
}

/// Walk `root` and map every regular file to an object key.
///
/// Keys use `/` separators relative to `root`; results are sorted by key.
pub fn collect_assets(root: &Path) -> Result<Vec<LocalAsset>, UploadError> {
    if !root.is_dir() {
        return Err(UploadError::MissingSource(root.display().to_string()));
    }

    let mut assets = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| UploadError::Read {
            path: root.display().to_string(),
            reason: e.to_string(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.into_path();
        let relative = path.strip_prefix(root).map_err(|e| UploadError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let content_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .to_string();

        assets.push(LocalAsset {
            key,
            path,
            content_type,
        });
    }

    assets.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(assets)
}

/// Keys present in the bucket but not in `assets`, sorted.
pub fn stale_keys(existing: &[String], assets: &[LocalAsset]) -> Vec<String> {
    let local: HashSet<&str> = assets.iter().map(|a| a.key.as_str()).collect();
    let mut stale: Vec<String> = existing
        .iter()
        .filter(|key| !local.contains(key.as_str()))
        .cloned()
        .collect();
    stale.sort();
    stale
}

/// Upload everything under `source` to `bucket`, then prune stale objects.
///
/// An empty build directory is refused rather than pruning the live site.
pub async fn sync_directory(
    store: &dyn BucketStore,
    bucket: &str,
    source: &Path,
) -> Result<SyncReceipt, UploadError> {
    let assets = collect_assets(source)?;
    if assets.is_empty() {
        return Err(UploadError::EmptySource(source.display().to_string()));
    }

    info!(bucket, source = %source.display(), files = assets.len(), "Uploading website files");
    stream::iter(&assets)
        .map(|asset| store.put_object(bucket, asset))
        .buffer_unordered(UPLOAD_CONCURRENCY)
        .try_collect::<Vec<()>>()
        .await?;

    let stale = stale_keys(&store.list_keys(bucket).await?, &assets);
    if !stale.is_empty() {
        debug!(bucket, count = stale.len(), "Pruning stale objects");
        store.delete_keys(bucket, &stale).await?;
    }

    Ok(SyncReceipt {
        uploaded: assets.len(),
        deleted: stale.len(),
    })
}

/// Bucket store backed by the AWS SDK.
#[derive(Debug, Clone)]
pub struct S3BucketStore {
    client: Client,
}

impl S3BucketStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the default AWS credential and region chain.
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self::new(Client::new(&config))
    }
}

fn api_error<E>(err: E) -> UploadError
where
    E: std::error::Error,
{
    UploadError::Api(DisplayErrorContext(&err).to_string())
}

#[async_trait]
impl BucketStore for S3BucketStore {
    async fn list_keys(&self, bucket: &str) -> Result<Vec<String>, UploadError> {
        let mut pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .into_paginator()
            .send();

        let mut keys = Vec::new();
        while let Some(page) = pages.next().await {
            let page = page.map_err(api_error)?;
            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|obj| obj.key().map(str::to_string)),
            );
        }
        Ok(keys)
    }

    async fn put_object(&self, bucket: &str, asset: &LocalAsset) -> Result<(), UploadError> {
        let body = ByteStream::from_path(&asset.path)
            .await
            .map_err(|e| UploadError::Read {
                path: asset.path.display().to_string(),
                reason: e.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(bucket)
            .key(&asset.key)
            .content_type(&asset.content_type)
            .body(body)
            .send()
            .await
            .map_err(api_error)?;

        debug!(bucket, key = %asset.key, "Uploaded object");
        Ok(())
    }

    async fn delete_keys(&self, bucket: &str, keys: &[String]) -> Result<(), UploadError> {
        for batch in keys.chunks(DELETE_BATCH_SIZE) {
            let objects = batch
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| UploadError::Request(e.to_string()))?;
            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .map_err(|e| UploadError::Request(e.to_string()))?;

            let response = self
                .client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(api_error)?;

            if !response.errors().is_empty() {
                return Err(UploadError::Api(format!(
                    "{} of {} objects could not be deleted from {}",
                    response.errors().len(),
                    batch.len(),
                    bucket
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::InMemoryBucketStore;
    use std::fs;

    fn site_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("index.html"), "<html></html>").expect("index");
        fs::create_dir_all(dir.path().join("assets/js")).expect("nested dir");
        fs::write(dir.path().join("assets/js/app.js"), "console.log(1)").expect("js");
        fs::write(dir.path().join("assets/site.css"), "body{}").expect("css");
        dir
    }

    #[test]
    fn test_collect_assets_keys_and_content_types() {
        let dir = site_dir();
        let assets = collect_assets(dir.path()).expect("collect");

        let keys: Vec<&str> = assets.iter().map(|a| a.key.as_str()).collect();
        assert_eq!(keys, vec!["assets/js/app.js", "assets/site.css", "index.html"]);
        assert_eq!(assets[1].content_type, "text/css");
        assert_eq!(assets[2].content_type, "text/html");
    }

    #[test]
    fn test_collect_assets_requires_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = collect_assets(&dir.path().join("missing")).expect_err("missing dir");
        assert!(matches!(err, UploadError::MissingSource(_)));
    }

    #[test]
    fn test_stale_keys_excludes_local_files() {
        let dir = site_dir();
        let assets = collect_assets(dir.path()).expect("collect");
        let existing = vec![
            "index.html".to_string(),
            "old/page.html".to_string(),
            "assets/app.1234.js".to_string(),
        ];
        assert_eq!(
            stale_keys(&existing, &assets),
            vec!["assets/app.1234.js", "old/page.html"]
        );
    }

    #[tokio::test]
    async fn test_sync_uploads_then_prunes() {
        let dir = site_dir();
        let store = InMemoryBucketStore::new().with_object("site-bucket", "old/page.html");

        let receipt = sync_directory(&store, "site-bucket", dir.path())
            .await
            .expect("sync");

        assert_eq!(receipt, SyncReceipt { uploaded: 3, deleted: 1 });
        assert_eq!(
            store.keys("site-bucket"),
            vec!["assets/js/app.js", "assets/site.css", "index.html"]
        );
    }

    #[tokio::test]
    async fn test_sync_refuses_empty_build_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = InMemoryBucketStore::new().with_object("site-bucket", "index.html");

        let err = sync_directory(&store, "site-bucket", dir.path())
            .await
            .expect_err("empty source");

        assert!(matches!(err, UploadError::EmptySource(_)));
        assert_eq!(store.keys("site-bucket"), vec!["index.html"], "Live site untouched");
    }
}
