// src/cache/mod.rs

//! Content-addressed artifact cache and the speech-synthesis front that
//! uses it.

pub mod artifact;
pub mod key;
pub mod speech;
pub mod store;

pub use artifact::ArtifactCache;
pub use key::{CacheKey, content_digest};
pub use speech::{CommandSpeechProvider, SpeechOutput, SpeechProvider, SpeechRequest, SpeechService};
pub use store::{CACHE_INDEX_PATH, CacheRecord, CacheStore, FileCacheStore, MemoryCacheStore};
