//! Directory upload to a cloud destination
//!
//! Walks a local directory, filters files through include patterns and
//! uploads them with bounded concurrency. Objects whose remote size already
//! equals the local size are skipped, so re-running an upload is cheap.

use super::cloud::CloudDestination;
use crate::error::{Error, Result};
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Default number of files in flight
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 8;

/// Glob patterns selecting which relative paths are uploaded
///
/// `*` matches within one path segment, `?` matches one character and `**`
/// matches across segments. An empty pattern set matches everything.
#[derive(Debug, Clone, Default)]
pub struct IncludePatterns {
    patterns: Vec<Regex>,
}

impl IncludePatterns {
    /// Compile a set of glob patterns
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                Regex::new(&glob_to_regex(p))
                    .map_err(|e| Error::invalid_value("include", format!("{p}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Match every file
    pub fn all() -> Self {
        Self::default()
    }

    /// Whether a `/`-separated relative path is selected
    pub fn matches(&self, relative: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|re| re.is_match(relative))
    }
}

fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("^");
    let mut chars = glob.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' if chars.peek() == Some(&'*') => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    chars.next();
                    out.push_str("(?:.*/)?");
                } else {
                    out.push_str(".*");
                }
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    out.push('$');
    out
}

/// What happened to one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileAction {
    Uploaded,
    Skipped,
}

/// Files handled by one directory upload, as relative paths
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UploadSummary {
    /// Files written to the destination
    pub uploaded: Vec<String>,
    /// Files already present with the same size
    pub skipped: Vec<String>,
}

impl UploadSummary {
    /// Total files considered
    pub fn total(&self) -> usize {
        self.uploaded.len() + self.skipped.len()
    }
}

/// Uploads local directories to a destination
#[derive(Debug, Clone)]
pub struct Uploader {
    destination: CloudDestination,
    concurrency: usize,
}

impl Uploader {
    /// Create an uploader for a destination
    pub fn new(destination: CloudDestination) -> Self {
        Self {
            destination,
            concurrency: DEFAULT_UPLOAD_CONCURRENCY,
        }
    }

    /// Set the number of files uploaded concurrently
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Get the destination
    pub fn destination(&self) -> &CloudDestination {
        &self.destination
    }

    /// Upload every selected file under `local_dir`
    ///
    /// Every file is attempted. If any fails, the call returns
    /// `Error::Upload` with the number of failures and the first error in
    /// path order.
    pub async fn upload_dir(
        &self,
        local_dir: impl AsRef<Path>,
        include: &IncludePatterns,
    ) -> Result<UploadSummary> {
        let local_dir = local_dir.as_ref();
        if !local_dir.is_dir() {
            return Err(Error::not_found(local_dir));
        }

        let files: Vec<(String, PathBuf)> = list_files(local_dir)?
            .into_iter()
            .filter(|(relative, _)| include.matches(relative))
            .collect();
        let total = files.len();

        tracing::info!(
            "Uploading {total} files from {} to {}://{}",
            local_dir.display(),
            self.destination.scheme(),
            self.destination.prefix()
        );

        let mut results: Vec<(String, Result<FileAction>)> = stream::iter(files)
            .map(|(relative, local)| async move {
                let result = self.upload_file(&relative, &local).await;
                (relative, result)
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        results.sort_by(|a, b| a.0.cmp(&b.0));

        let mut summary = UploadSummary::default();
        let mut failures = Vec::new();
        for (relative, result) in results {
            match result {
                Ok(FileAction::Uploaded) => summary.uploaded.push(relative),
                Ok(FileAction::Skipped) => summary.skipped.push(relative),
                Err(e) => {
                    tracing::error!("Upload of {relative} failed: {e}");
                    failures.push(format!("{relative}: {e}"));
                }
            }
        }

        if let Some(first_error) = failures.first() {
            return Err(Error::Upload {
                failed: failures.len(),
                total,
                first_error: first_error.clone(),
            });
        }

        tracing::info!(
            "Upload complete: {} uploaded, {} skipped",
            summary.uploaded.len(),
            summary.skipped.len()
        );
        Ok(summary)
    }

    async fn upload_file(&self, relative: &str, local: &Path) -> Result<FileAction> {
        let local_size = tokio::fs::metadata(local).await?.len() as usize;
        if self.destination.size_of(relative).await? == Some(local_size) {
            tracing::debug!("Skipping {relative}, remote size matches ({local_size} bytes)");
            return Ok(FileAction::Skipped);
        }

        let data = tokio::fs::read(local).await?;
        let location = self.destination.put(relative, Bytes::from(data)).await?;
        tracing::debug!("Uploaded {} to {location}", local.display());
        Ok(FileAction::Uploaded)
    }
}

/// Every regular file under `root` as `(relative path with '/', absolute path)`, sorted
fn list_files(root: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let relative = path
                    .strip_prefix(root)
                    .map_err(|e| Error::Other(e.to_string()))?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((relative, path));
            }
        }
    }
    files.sort();
    Ok(files)
}
