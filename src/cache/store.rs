// src/cache/store.rs

//! Point lookup / insert / delete storage for cache records.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::CacheKey;
use crate::errors::Result;

/// Relative path (from the audio directory) of the file-backed index.
pub const CACHE_INDEX_PATH: &str = ".renderkit/tts-cache";

/// One stored mapping from key to artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub key: CacheKey,
    pub artifact_id: String,
    pub path: PathBuf,
}

/// Abstract storage for cache records.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>>;
    /// Insert or replace the record for `record.key`.
    fn insert(&self, record: CacheRecord) -> Result<()>;
    /// Returns whether a record was removed.
    fn delete(&self, key: &CacheKey) -> Result<bool>;
}

/// Records kept in memory only.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    map: Mutex<HashMap<CacheKey, CacheRecord>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self) -> Result<std::sync::MutexGuard<'_, HashMap<CacheKey, CacheRecord>>> {
        self.map
            .lock()
            .map_err(|_| anyhow!("cache store lock poisoned").into())
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>> {
        Ok(self.map()?.get(key).cloned())
    }

    fn insert(&self, record: CacheRecord) -> Result<()> {
        debug!(artifact = %record.artifact_id, "stored cache record (memory)");
        self.map()?.insert(record.key.clone(), record);
        Ok(())
    }

    fn delete(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.map()?.remove(key).is_some())
    }
}

/// Records kept as JSON lines in `<root>/.renderkit/tts-cache`.
///
/// Every operation re-reads the file, so several processes sharing the
/// directory see each other's writes (last writer wins).
#[derive(Debug)]
pub struct FileCacheStore {
    root: PathBuf,
    io: Mutex<()>,
}

impl FileCacheStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            io: Mutex::new(()),
        }
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(CACHE_INDEX_PATH)
    }

    fn with_records<T>(
        &self,
        f: impl FnOnce(&mut Vec<CacheRecord>) -> (T, bool),
    ) -> Result<T> {
        let _guard = self
            .io
            .lock()
            .map_err(|_| anyhow!("cache store lock poisoned"))?;
        let path = self.index_path();
        let mut records = load_records(&path)?;
        let (value, dirty) = f(&mut records);
        if dirty {
            save_records(&path, &records)?;
        }
        Ok(value)
    }
}

impl CacheStore for FileCacheStore {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheRecord>> {
        self.with_records(|records| (records.iter().find(|r| &r.key == key).cloned(), false))
    }

    fn insert(&self, record: CacheRecord) -> Result<()> {
        let artifact = record.artifact_id.clone();
        self.with_records(|records| {
            records.retain(|r| r.key != record.key);
            records.push(record);
            ((), true)
        })?;
        info!(artifact = %artifact, "stored cache record (file)");
        Ok(())
    }

    fn delete(&self, key: &CacheKey) -> Result<bool> {
        self.with_records(|records| {
            let before = records.len();
            records.retain(|r| &r.key != key);
            let removed = records.len() < before;
            (removed, removed)
        })
    }
}

fn load_records(path: &Path) -> Result<Vec<CacheRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("opening cache index at {:?}", path))?;
    let reader = BufReader::new(file);

    let mut records = Vec::new();
    for (idx, line_res) in reader.lines().enumerate() {
        let line = line_res.with_context(|| format!("reading cache index at {:?}", path))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<CacheRecord>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => warn!(line = idx + 1, error = %e, "skipping malformed cache record"),
        }
    }
    Ok(records)
}

fn save_records(path: &Path, records: &[CacheRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating cache index directory at {:?}", parent))?;
    }
    let tmp = path.with_extension("tmp");
    {
        let file = File::create(&tmp)
            .with_context(|| format!("creating cache index at {:?}", tmp))?;
        let mut writer = BufWriter::new(file);
        for record in records {
            let line = serde_json::to_string(record).context("encoding cache record")?;
            writeln!(writer, "{line}").context("writing cache index")?;
        }
        writer.flush().context("flushing cache index")?;
    }
    fs::rename(&tmp, path).with_context(|| format!("replacing cache index at {:?}", path))?;
    Ok(())
}
