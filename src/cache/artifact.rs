// src/cache/artifact.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::{CacheKey, CacheRecord, CacheStore};
use crate::errors::Result;
use crate::types::generate_id;

/// Self-healing map from [`CacheKey`] to a file on disk.
///
/// A record is only served while its path opens as a regular file. Any
/// failure (missing, a directory, permissions, transient I/O) deletes the record and reports a
/// miss.
#[derive(Clone)]
pub struct ArtifactCache {
    store: Arc<dyn CacheStore>,
}

impl ArtifactCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub async fn lookup(&self, key: &CacheKey) -> Result<Option<PathBuf>> {
        let Some(record) = self.store.get(key)? else {
            debug!(provider = %key.provider, variant = %key.variant, "cache miss");
            return Ok(None);
        };

        match open_regular_file(&record.path).await {
            Ok(()) => {
                debug!(artifact = %record.artifact_id, path = %record.path.display(), "cache hit");
                Ok(Some(record.path))
            }
            Err(e) => {
                info!(
                    artifact = %record.artifact_id,
                    path = %record.path.display(),
                    error = %e,
                    "cached file unreadable; dropping record"
                );
                self.store.delete(key)?;
                Ok(None)
            }
        }
    }

    /// Record `path` for `key`. The file is assumed to exist.
    pub fn store(&self, key: CacheKey, path: &Path) -> Result<CacheRecord> {
        let artifact_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .unwrap_or_else(generate_id);
        let record = CacheRecord {
            key,
            artifact_id,
            path: path.to_path_buf(),
        };
        self.store.insert(record.clone())?;
        Ok(record)
    }
}

/// Directories open fine on Linux, so the file type is checked too.
async fn open_regular_file(path: &Path) -> std::io::Result<()> {
    let file = tokio::fs::File::open(path).await?;
    if file.metadata().await?.is_file() {
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "not a regular file",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;

    #[tokio::test]
    async fn vanished_file_heals_the_record() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryCacheStore::new());
        let cache = ArtifactCache::new(store.clone());
        let key = CacheKey::for_text("hello", "p", "v");
        let file = tmp.path().join("a.mp3");
        tokio::fs::write(&file, b"mp3").await.unwrap();

        let record = cache.store(key.clone(), &file).unwrap();
        assert_eq!(record.artifact_id, "a");
        assert_eq!(cache.lookup(&key).await.unwrap(), Some(file.clone()));

        tokio::fs::remove_file(&file).await.unwrap();
        assert_eq!(cache.lookup(&key).await.unwrap(), None);
        assert!(store.get(&key).unwrap().is_none());
    }
}
