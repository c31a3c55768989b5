//! Cloud storage destinations (S3, R2, GCS, Azure, local)

use crate::error::{Error, Result};
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use std::sync::Arc;

/// Remote location files are synced to
#[derive(Debug, Clone)]
pub struct CloudDestination {
    /// The object store implementation
    store: Arc<dyn ObjectStore>,
    /// Base path prefix within the bucket/container
    prefix: String,
    /// Original URL scheme for logging
    scheme: String,
}

impl CloudDestination {
    /// Parse a destination URL and create appropriate object store
    ///
    /// Supported formats:
    /// - `s3://bucket/path/` - AWS S3
    /// - `r2://bucket/path/` - Cloudflare R2 (S3-compatible)
    /// - `gs://bucket/path/` - Google Cloud Storage
    /// - `az://container/path/` - Azure Blob Storage
    /// - `/local/path/` or `./path/` - Local filesystem
    pub fn parse(url: &str) -> Result<Self> {
        if url.starts_with("s3://") {
            Self::parse_s3(url, false)
        } else if url.starts_with("r2://") {
            Self::parse_s3(url, true)
        } else if url.starts_with("gs://") {
            Self::parse_gcs(url)
        } else if url.starts_with("az://") {
            Self::parse_azure(url)
        } else {
            Self::parse_local(url)
        }
    }

    /// Wrap an already constructed store
    pub fn from_store(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into().trim_matches('/').to_string(),
            scheme: "memory".to_string(),
        }
    }

    fn parse_s3(url: &str, is_r2: bool) -> Result<Self> {
        let scheme = if is_r2 { "r2" } else { "s3" };
        let (bucket, prefix) = split_bucket(url, scheme)?;

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);

        // R2 needs an account endpoint; AWS_ENDPOINT is already read by from_env()
        if is_r2 {
            if let Ok(endpoint) = std::env::var("R2_ENDPOINT_URL") {
                builder = builder.with_endpoint(endpoint);
            }
        }

        let store = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to create {scheme} client: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            prefix,
            scheme: scheme.to_string(),
        })
    }

    fn parse_gcs(url: &str) -> Result<Self> {
        let (bucket, prefix) = split_bucket(url, "gs")?;

        let store = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| Error::config(format!("Failed to create GCS client: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            prefix,
            scheme: "gs".to_string(),
        })
    }

    fn parse_azure(url: &str) -> Result<Self> {
        let (container, prefix) = split_bucket(url, "az")?;

        let store = MicrosoftAzureBuilder::from_env()
            .with_container_name(container)
            .build()
            .map_err(|e| Error::config(format!("Failed to create Azure client: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            prefix,
            scheme: "az".to_string(),
        })
    }

    fn parse_local(path: &str) -> Result<Self> {
        let path = path.strip_prefix("file://").unwrap_or(path);

        std::fs::create_dir_all(path)
            .map_err(|e| Error::config(format!("Failed to create directory {path}: {e}")))?;

        let store = LocalFileSystem::new_with_prefix(path)
            .map_err(|e| Error::config(format!("Failed to create local store: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            prefix: String::new(),
            scheme: "file".to_string(),
        })
    }

    /// Check if this is a cloud destination (not local)
    pub fn is_cloud(&self) -> bool {
        !matches!(self.scheme.as_str(), "file" | "memory")
    }

    /// Get the scheme (s3, r2, gs, az, file, memory)
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Get the key prefix inside the bucket
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Object key for a path relative to the destination
    pub fn object_path(&self, relative: &str) -> ObjectPath {
        let relative = relative.trim_start_matches('/');
        if self.prefix.is_empty() {
            ObjectPath::from(relative)
        } else {
            ObjectPath::from(format!("{}/{relative}", self.prefix.trim_end_matches('/')))
        }
    }

    /// Size of the remote object, or `None` if it does not exist
    pub async fn size_of(&self, relative: &str) -> Result<Option<usize>> {
        match self.store.head(&self.object_path(relative)).await {
            Ok(meta) => Ok(Some(meta.size)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(Error::ObjectStore(e)),
        }
    }

    /// Write bytes to a path relative to the destination
    ///
    /// Returns the full remote location for logging.
    pub async fn put(&self, relative: &str, data: Bytes) -> Result<String> {
        let path = self.object_path(relative);
        self.store.put(&path, data.into()).await?;
        Ok(format!("{}://{path}", self.scheme))
    }
}

/// Split `scheme://bucket/prefix` into its bucket and prefix
fn split_bucket<'a>(url: &'a str, scheme: &str) -> Result<(&'a str, String)> {
    let without_scheme = url
        .strip_prefix(&format!("{scheme}://"))
        .ok_or_else(|| Error::config(format!("Invalid {scheme} URL: {url}")))?;

    let (bucket, prefix) = match without_scheme.find('/') {
        Some(idx) => (
            &without_scheme[..idx],
            without_scheme[idx + 1..].trim_end_matches('/').to_string(),
        ),
        None => (without_scheme, String::new()),
    };

    if bucket.is_empty() {
        return Err(Error::config(format!("Missing bucket in {scheme} URL: {url}")));
    }
    Ok((bucket, prefix))
}
