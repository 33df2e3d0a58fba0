// src/media/mod.rs

//! Contract with the media encoding library.
//!
//! The core never touches encoder internals. It talks to a [`MediaBackend`]
//! which hands out [`NativeHandle`]s for live HLS streams and offers the
//! one-shot helpers (merge, probe, thumbnail, standalone segmenting).
//!
//! - [`handle`] wraps a native handle in a single-owner [`StreamHandle`]
//!   whose state makes double finish / append-after-close unrepresentable.
//! - [`ffmpeg`] is the production backend, driving the `ffmpeg` and
//!   `ffprobe` binaries through [`crate::exec`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use crate::errors::Result;

pub mod ffmpeg;
pub mod handle;

pub use ffmpeg::FfmpegBackend;
pub use handle::{CloseOutcome, StreamHandle};

/// Boxed future returned by backend operations (keeps the trait object-safe).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Opaque reference to encoder state owned by a [`MediaBackend`].
///
/// Deliberately neither `Clone` nor `Copy`: `stream_finish` and
/// `stream_free` take it by value, so a handle can be released once.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct NativeHandle(u64);

impl NativeHandle {
    /// Only backends should mint handles.
    pub fn from_raw(raw: u64) -> Self {
        NativeHandle(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Parameters for a live, append-only HLS stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HlsStreamSpec {
    pub manifest_path: PathBuf,
    /// Full path pattern for segment files, e.g. `data/hls/42/c_%03d.ts`.
    pub segment_pattern: String,
    pub start_number: u32,
    pub segment_duration_secs: u32,
}

/// Parameters for turning one finished file into a standalone HLS rendition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HlsSplitSpec {
    pub manifest_path: PathBuf,
    pub input: PathBuf,
    pub segment_pattern: String,
    pub segment_duration_secs: u32,
}

/// Operations the core needs from the media library.
///
/// Handle-based calls must preserve append order per handle. Implementations
/// release a handle's resources inside `stream_finish` even when writing the
/// end marker fails.
pub trait MediaBackend: Send + Sync {
    fn stream_init<'a>(&'a self, spec: &'a HlsStreamSpec) -> BoxFuture<'a, Result<NativeHandle>>;

    fn stream_append<'a>(
        &'a self,
        handle: &'a NativeHandle,
        media: &'a Path,
    ) -> BoxFuture<'a, Result<()>>;

    /// Write the end marker to `manifest` and release the handle.
    fn stream_finish<'a>(
        &'a self,
        handle: NativeHandle,
        manifest: &'a Path,
    ) -> BoxFuture<'a, Result<()>>;

    /// Release the handle without touching any manifest.
    fn stream_free(&self, handle: NativeHandle);

    /// Segment `spec.input` into a standalone playlist; returns the manifest path.
    fn split_to_hls<'a>(&'a self, spec: &'a HlsSplitSpec) -> BoxFuture<'a, Result<PathBuf>>;

    /// Concatenate `inputs` (in order) into `output`. `Ok(false)` when the
    /// tool ran but could not produce the file.
    fn merge<'a>(&'a self, inputs: &'a [PathBuf], output: &'a Path) -> BoxFuture<'a, Result<bool>>;

    /// Duration of a media file in seconds.
    fn duration<'a>(&'a self, media: &'a Path) -> BoxFuture<'a, Result<f64>>;

    /// Save the last video frame as an image; returns the tool's exit code.
    fn save_last_frame<'a>(&'a self, media: &'a Path, output: &'a Path)
    -> BoxFuture<'a, Result<i32>>;

    fn add_watermark<'a>(
        &'a self,
        input: &'a Path,
        output: &'a Path,
        text: &'a str,
    ) -> BoxFuture<'a, Result<()>>;

    /// Write the audio track of `input` as mp3, preceded by `leading_silence_secs`
    /// of silence (zero for none).
    fn extract_audio<'a>(
        &'a self,
        input: &'a Path,
        output: &'a Path,
        leading_silence_secs: f64,
    ) -> BoxFuture<'a, Result<()>>;
}
