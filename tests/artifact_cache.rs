// tests/artifact_cache.rs

mod common;
use crate::common::init_tracing;

use std::path::PathBuf;
use std::sync::Arc;

use renderkit::cache::{ArtifactCache, CacheKey, CacheStore, FileCacheStore, MemoryCacheStore};

fn stores(root: &std::path::Path) -> Vec<(&'static str, Arc<dyn CacheStore>)> {
    vec![
        ("memory", Arc::new(MemoryCacheStore::new())),
        ("file", Arc::new(FileCacheStore::new(root.join("index")))),
    ]
}

#[tokio::test]
async fn lookup_store_and_self_heal() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();

    for (name, store) in stores(tmp.path()) {
        let cache = ArtifactCache::new(Arc::clone(&store));
        let key = CacheKey::for_text(&format!("scenario c {name}"), "minimax", "voice-a");
        let file = tmp.path().join(format!("{name}-a.mp3"));

        assert_eq!(cache.lookup(&key).await.unwrap(), None, "{name}: fresh key");

        tokio::fs::write(&file, b"audio").await.unwrap();
        cache.store(key.clone(), &file).unwrap();
        assert_eq!(cache.lookup(&key).await.unwrap(), Some(file.clone()), "{name}: hit");

        tokio::fs::remove_file(&file).await.unwrap();
        assert_eq!(cache.lookup(&key).await.unwrap(), None, "{name}: healed");
        assert!(store.get(&key).unwrap().is_none(), "{name}: record removed");

        tokio::fs::write(&file, b"audio again").await.unwrap();
        cache.store(key.clone(), &file).unwrap();
        assert_eq!(cache.lookup(&key).await.unwrap(), Some(file), "{name}: restored");
    }
}

#[tokio::test]
async fn different_variant_misses() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let cache = ArtifactCache::new(Arc::new(MemoryCacheStore::new()));
    let file = tmp.path().join("a.mp3");
    tokio::fs::write(&file, b"audio").await.unwrap();

    cache
        .store(CacheKey::for_text("same text", "minimax", "voice-a"), &file)
        .unwrap();

    let other_voice = CacheKey::for_text("same text", "minimax", "voice-b");
    let other_provider = CacheKey::for_text("same text", "other", "voice-a");
    assert_eq!(cache.lookup(&other_voice).await.unwrap(), None);
    assert_eq!(cache.lookup(&other_provider).await.unwrap(), None);
}

#[tokio::test]
async fn unreadable_path_is_treated_as_missing() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
    let cache = ArtifactCache::new(Arc::clone(&store));
    let key = CacheKey::for_text("x", "p", "v");

    // A path under a regular file can never be opened.
    let blocker = tmp.path().join("blocker");
    tokio::fs::write(&blocker, b"").await.unwrap();
    let bogus: PathBuf = blocker.join("a.mp3");
    cache.store(key.clone(), &bogus).unwrap();

    assert_eq!(cache.lookup(&key).await.unwrap(), None);
    assert!(store.get(&key).unwrap().is_none());
}

#[tokio::test]
async fn record_pointing_at_a_directory_is_a_miss() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let store: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
    let cache = ArtifactCache::new(Arc::clone(&store));
    let key = CacheKey::for_text("dir", "p", "v");

    let dir = tmp.path().join("audio.mp3");
    tokio::fs::create_dir(&dir).await.unwrap();
    cache.store(key.clone(), &dir).unwrap();

    assert_eq!(cache.lookup(&key).await.unwrap(), None);
    assert!(store.get(&key).unwrap().is_none());
    assert!(dir.is_dir());
}

#[tokio::test]
async fn file_store_records_survive_a_new_cache() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("a.mp3");
    tokio::fs::write(&file, b"audio").await.unwrap();
    let key = CacheKey::for_text("persist me", "minimax", "v");

    {
        let cache = ArtifactCache::new(Arc::new(FileCacheStore::new(tmp.path())));
        cache.store(key.clone(), &file).unwrap();
    }

    let cache = ArtifactCache::new(Arc::new(FileCacheStore::new(tmp.path())));
    assert_eq!(cache.lookup(&key).await.unwrap(), Some(file));
}
