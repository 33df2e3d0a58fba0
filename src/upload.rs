// src/upload.rs

//! Hand-off of finished files to a publishing target.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::config::UploadSection;
use crate::errors::{RenderkitError, Result};
use crate::media::BoxFuture;
use crate::types::is_plain_name;

/// Publishes a batch of local files.
///
/// Returns one URL per input, in input order, or fails the whole batch.
pub trait Uploader: Send + Sync {
    fn upload_batch<'a>(
        &'a self,
        platform: &'a str,
        files: &'a [(PathBuf, String)],
    ) -> BoxFuture<'a, Result<Vec<String>>>;
}

/// Copies files under `<root>/<platform>/` and serves them from `base_url`.
#[derive(Debug, Clone)]
pub struct LocalUploader {
    root: PathBuf,
    base_url: String,
}

impl LocalUploader {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(cfg: &UploadSection) -> Self {
        Self::new(cfg.root.clone(), cfg.base_url.clone())
    }

    async fn copy_all(&self, platform: &str, files: &[(PathBuf, String)], copied: &mut Vec<PathBuf>) -> Result<Vec<String>> {
        let target_dir = self.root.join(platform);
        tokio::fs::create_dir_all(&target_dir)
            .await
            .map_err(|e| RenderkitError::Upload(format!("{}: {e}", target_dir.display())))?;

        let mut urls = Vec::with_capacity(files.len());
        for (local, remote_name) in files {
            if !is_plain_name(remote_name) {
                return Err(RenderkitError::Upload(format!(
                    "remote name must be a plain file name: {remote_name}"
                )));
            }
            let dest = target_dir.join(remote_name);
            tokio::fs::copy(local, &dest).await.map_err(|e| {
                RenderkitError::Upload(format!("{} -> {}: {e}", local.display(), dest.display()))
            })?;
            copied.push(dest);
            urls.push(format!("{}/{platform}/{remote_name}", self.base_url));
        }
        Ok(urls)
    }
}

impl Uploader for LocalUploader {
    fn upload_batch<'a>(
        &'a self,
        platform: &'a str,
        files: &'a [(PathBuf, String)],
    ) -> BoxFuture<'a, Result<Vec<String>>> {
        Box::pin(async move {
            let mut copied = Vec::new();
            match self.copy_all(platform, files, &mut copied).await {
                Ok(urls) => {
                    info!(platform = %platform, files = urls.len(), "uploaded batch");
                    Ok(urls)
                }
                Err(e) => {
                    for path in &copied {
                        if let Err(rm) = tokio::fs::remove_file(path).await {
                            warn!(path = %path.display(), error = %rm, "could not roll back upload");
                        }
                    }
                    Err(e)
                }
            }
        })
    }
}
