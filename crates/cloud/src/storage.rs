//! Cold storage for backup archives.
//!
//! [`S3Storage`] targets any S3-compatible endpoint; [`DirectoryStorage`]
//! copies archives into a local or mounted directory (NFS, attached volume).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;

use crate::error::CloudError;

/// Destination for archives copied off the control host.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Short name used in logs and error messages.
    fn name(&self) -> &'static str;

    /// Store `local` under `name`; returns the object's URL.
    async fn upload(&self, local: &Path, name: &str) -> Result<String, CloudError>;

    /// Fetch the object at `url` into `local`.
    async fn download(&self, url: &str, local: &Path) -> Result<(), CloudError>;

    /// Delete the object at `url`. Deleting a missing object is not an error.
    async fn delete(&self, url: &str) -> Result<(), CloudError>;
}

// ---------------------------------------------------------------------------
// S3
// ---------------------------------------------------------------------------

pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

impl S3Storage {
    /// Build a client from the standard AWS environment (`AWS_ACCESS_KEY_ID`,
    /// `AWS_REGION`, profiles, ...), optionally against a custom endpoint.
    pub async fn new(bucket: String, prefix: String, endpoint: Option<String>) -> Self {
        let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    fn key_for(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{name}", self.prefix)
        }
    }
}

/// Split `s3://bucket/key` into its parts.
pub fn parse_s3_url(url: &str) -> Result<(&str, &str), CloudError> {
    url.strip_prefix("s3://")
        .and_then(|rest| rest.split_once('/'))
        .filter(|(bucket, key)| !bucket.is_empty() && !key.is_empty())
        .ok_or_else(|| CloudError::Malformed(format!("not an s3:// object url: {url}")))
}

#[async_trait]
impl ObjectStorage for S3Storage {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn upload(&self, local: &Path, name: &str) -> Result<String, CloudError> {
        let key = self.key_for(name);
        let body = ByteStream::from_path(local)
            .await
            .map_err(|e| CloudError::Storage(e.to_string()))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .send()
            .await
            .map_err(|e| CloudError::Storage(format!("put {key}: {e}")))?;

        let url = format!("s3://{}/{key}", self.bucket);
        tracing::info!(url = %url, "Archive uploaded");
        Ok(url)
    }

    async fn download(&self, url: &str, local: &Path) -> Result<(), CloudError> {
        let (bucket, key) = parse_s3_url(url)?;
        let object = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| CloudError::Storage(format!("get {key}: {e}")))?;

        let mut reader = object.body.into_async_read();
        let mut file = tokio::fs::File::create(local).await?;
        tokio::io::copy(&mut reader, &mut file).await?;
        Ok(())
    }

    async fn delete(&self, url: &str) -> Result<(), CloudError> {
        let (bucket, key) = parse_s3_url(url)?;
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| CloudError::Storage(format!("delete {key}: {e}")))?;
        tracing::info!(url, "Archive deleted from cloud storage");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Stores archives in a directory, addressed as `file://` URLs.
pub struct DirectoryStorage {
    root: PathBuf,
}

impl DirectoryStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, url: &str) -> Result<PathBuf, CloudError> {
        let path = url
            .strip_prefix("file://")
            .map(PathBuf::from)
            .ok_or_else(|| CloudError::Malformed(format!("not a file:// url: {url}")))?;
        if !path.starts_with(&self.root) {
            return Err(CloudError::Malformed(format!("{url} is outside the storage root")));
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectStorage for DirectoryStorage {
    fn name(&self) -> &'static str {
        "directory"
    }

    async fn upload(&self, local: &Path, name: &str) -> Result<String, CloudError> {
        if name.contains('/') || name.starts_with('.') {
            return Err(CloudError::Malformed(format!("invalid object name '{name}'")));
        }
        tokio::fs::create_dir_all(&self.root).await?;
        let target = self.root.join(name);
        tokio::fs::copy(local, &target).await?;
        Ok(format!("file://{}", target.display()))
    }

    async fn download(&self, url: &str, local: &Path) -> Result<(), CloudError> {
        tokio::fs::copy(self.path_for(url)?, local).await?;
        Ok(())
    }

    async fn delete(&self, url: &str) -> Result<(), CloudError> {
        match tokio::fs::remove_file(self.path_for(url)?).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
