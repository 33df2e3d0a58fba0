// src/media/ffmpeg.rs

//! [`MediaBackend`] backed by the `ffmpeg` / `ffprobe` command-line tools.
//!
//! Live streams are emulated: each append re-runs the HLS muxer with
//! `append_list`, continuing the segment numbering recorded for the handle.
//! Finishing writes `#EXT-X-ENDLIST` to the manifest.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::MediaSection;
use crate::errors::{RenderkitError, Result};
use crate::exec::{ProcessOutcome, ProcessSpec, path_arg, run_process};
use crate::media::{BoxFuture, HlsSplitSpec, HlsStreamSpec, MediaBackend, NativeHandle};

const END_MARKER: &str = "#EXT-X-ENDLIST";

/// Per-handle state of an emulated live stream.
#[derive(Debug, Clone)]
struct LiveStream {
    manifest: PathBuf,
    segment_pattern: String,
    start_number: u32,
    next_segment: u32,
    segment_duration_secs: u32,
}

#[derive(Debug)]
pub struct FfmpegBackend {
    ffmpeg: String,
    ffprobe: String,
    timeout: Duration,
    watermark_font_size: u32,
    next_handle: AtomicU64,
    streams: Mutex<HashMap<u64, LiveStream>>,
}

impl FfmpegBackend {
    pub fn new(cfg: &MediaSection) -> Self {
        Self {
            ffmpeg: cfg.ffmpeg.clone(),
            ffprobe: cfg.ffprobe.clone(),
            timeout: Duration::from_secs(cfg.timeout_secs),
            watermark_font_size: cfg.watermark_font_size,
            next_handle: AtomicU64::new(1),
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// Number of handles not yet finished or freed.
    pub fn open_streams(&self) -> usize {
        self.streams().len()
    }

    /// The map is never held across an await.
    fn streams(&self) -> MutexGuard<'_, HashMap<u64, LiveStream>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Paths in `args` are resolved against the current directory.
    async fn run_tool(&self, program: &str, args: Vec<String>) -> Result<ProcessOutcome> {
        let spec = ProcessSpec::new(program, ".", self.timeout).args(args);
        run_process(&spec).await
    }

    async fn run_ffmpeg(&self, args: Vec<String>, output: &Path) -> Result<ProcessOutcome> {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RenderkitError::io_at(parent, e))?;
        }
        let mut full = vec!["-y".to_string(), "-loglevel".to_string(), "error".to_string()];
        full.extend(args);
        self.run_tool(&self.ffmpeg, full).await
    }

    async fn append_inner(&self, handle: &NativeHandle, media: &Path) -> Result<()> {
        let stream = self
            .streams()
            .get(&handle.raw())
            .cloned()
            .ok_or_else(|| RenderkitError::Media(format!("unknown stream handle {}", handle.raw())))?;

        let existing = tokio::fs::read_to_string(&stream.manifest)
            .await
            .unwrap_or_default();
        let mut flags = String::from("omit_endlist+discont_start");
        if existing.contains("#EXTM3U") {
            flags.push_str("+append_list");
        }

        let args = vec![
            "-i".to_string(),
            path_arg(media),
            "-c".to_string(),
            "copy".to_string(),
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            stream.segment_duration_secs.to_string(),
            "-hls_list_size".to_string(),
            "0".to_string(),
            "-start_number".to_string(),
            stream.next_segment.to_string(),
            "-hls_segment_filename".to_string(),
            stream.segment_pattern.clone(),
            "-hls_flags".to_string(),
            flags,
            path_arg(&stream.manifest),
        ];
        let outcome = self.run_ffmpeg(args, &stream.manifest).await?;
        ensure_success("ffmpeg hls append", &outcome)?;

        let manifest = tokio::fs::read_to_string(&stream.manifest)
            .await
            .map_err(|e| RenderkitError::io_at(&stream.manifest, e))?;
        let segments = count_segments(&manifest);

        if let Some(live) = self.streams().get_mut(&handle.raw()) {
            live.next_segment = live.start_number + segments;
            debug!(handle = handle.raw(), next_segment = live.next_segment, "stream advanced");
        }
        Ok(())
    }

    async fn finish_inner(&self, handle: NativeHandle, manifest: &Path) -> Result<()> {
        let stream = self.streams().remove(&handle.raw());
        let duration = stream.map(|s| s.segment_duration_secs).unwrap_or(2);

        let mut contents = tokio::fs::read_to_string(manifest)
            .await
            .map_err(|e| RenderkitError::io_at(manifest, e))?;
        if contents.contains(END_MARKER) {
            return Ok(());
        }
        if !contents.contains("#EXTM3U") {
            contents = format!("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:{duration}\n");
        }
        if !contents.ends_with('\n') {
            contents.push('\n');
        }
        contents.push_str(END_MARKER);
        contents.push('\n');
        tokio::fs::write(manifest, contents)
            .await
            .map_err(|e| RenderkitError::io_at(manifest, e))?;
        info!(handle = handle.raw(), manifest = %manifest.display(), "wrote end marker");
        Ok(())
    }

    async fn merge_inner(&self, inputs: &[PathBuf], output: &Path) -> Result<bool> {
        if inputs.is_empty() {
            return Ok(false);
        }
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RenderkitError::io_at(parent, e))?;
        }

        // The concat demuxer resolves relative entries against the list file.
        let list_path = output.with_extension("concat.txt");
        let mut list = String::new();
        for input in inputs {
            let absolute = std::path::absolute(input).map_err(|e| RenderkitError::io_at(input, e))?;
            list.push_str(&format!("file '{}'\n", escape_concat_path(&absolute)));
        }
        tokio::fs::write(&list_path, list)
            .await
            .map_err(|e| RenderkitError::io_at(&list_path, e))?;

        let args = vec![
            "-f".to_string(),
            "concat".to_string(),
            "-safe".to_string(),
            "0".to_string(),
            "-i".to_string(),
            path_arg(&list_path),
            "-c".to_string(),
            "copy".to_string(),
            path_arg(output),
        ];
        let outcome = self.run_ffmpeg(args, output).await;
        if let Err(e) = tokio::fs::remove_file(&list_path).await {
            debug!(error = %e, "could not remove concat list");
        }
        let outcome = outcome?;
        if !outcome.success() {
            warn!(exit_code = outcome.exit_code, stderr = %outcome.stderr, "ffmpeg merge failed");
        }
        Ok(outcome.success())
    }

    async fn duration_inner(&self, media: &Path) -> Result<f64> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-show_entries".to_string(),
            "format=duration".to_string(),
            "-of".to_string(),
            "default=noprint_wrappers=1:nokey=1".to_string(),
            path_arg(media),
        ];
        let outcome = self.run_tool(&self.ffprobe, args).await?;
        ensure_success("ffprobe", &outcome)?;
        outcome.stdout.trim().parse::<f64>().map_err(|e| {
            RenderkitError::Media(format!(
                "ffprobe returned unparsable duration '{}': {e}",
                outcome.stdout.trim()
            ))
        })
    }
}

impl MediaBackend for FfmpegBackend {
    fn stream_init<'a>(&'a self, spec: &'a HlsStreamSpec) -> BoxFuture<'a, Result<NativeHandle>> {
        Box::pin(async move {
            if let Some(parent) = spec.manifest_path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| RenderkitError::io_at(parent, e))?;
            }
            let raw = self.next_handle.fetch_add(1, Ordering::Relaxed);
            self.streams().insert(
                raw,
                LiveStream {
                    manifest: spec.manifest_path.clone(),
                    segment_pattern: spec.segment_pattern.clone(),
                    start_number: spec.start_number,
                    next_segment: spec.start_number,
                    segment_duration_secs: spec.segment_duration_secs,
                },
            );
            info!(handle = raw, manifest = %spec.manifest_path.display(), "initialized live stream");
            Ok(NativeHandle::from_raw(raw))
        })
    }

    fn stream_append<'a>(
        &'a self,
        handle: &'a NativeHandle,
        media: &'a Path,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.append_inner(handle, media))
    }

    fn stream_finish<'a>(
        &'a self,
        handle: NativeHandle,
        manifest: &'a Path,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.finish_inner(handle, manifest))
    }

    fn stream_free(&self, handle: NativeHandle) {
        self.streams().remove(&handle.raw());
        info!(handle = handle.raw(), "freed live stream");
    }

    fn split_to_hls<'a>(&'a self, spec: &'a HlsSplitSpec) -> BoxFuture<'a, Result<PathBuf>> {
        Box::pin(async move {
            let args = vec![
                "-i".to_string(),
                path_arg(&spec.input),
                "-c".to_string(),
                "copy".to_string(),
                "-f".to_string(),
                "hls".to_string(),
                "-hls_time".to_string(),
                spec.segment_duration_secs.to_string(),
                "-hls_list_size".to_string(),
                "0".to_string(),
                "-hls_segment_filename".to_string(),
                spec.segment_pattern.clone(),
                path_arg(&spec.manifest_path),
            ];
            let outcome = self.run_ffmpeg(args, &spec.manifest_path).await?;
            ensure_success("ffmpeg hls split", &outcome)?;
            Ok(spec.manifest_path.clone())
        })
    }

    fn merge<'a>(&'a self, inputs: &'a [PathBuf], output: &'a Path) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.merge_inner(inputs, output))
    }

    fn duration<'a>(&'a self, media: &'a Path) -> BoxFuture<'a, Result<f64>> {
        Box::pin(self.duration_inner(media))
    }

    fn save_last_frame<'a>(
        &'a self,
        media: &'a Path,
        output: &'a Path,
    ) -> BoxFuture<'a, Result<i32>> {
        Box::pin(async move {
            let args = vec![
                "-sseof".to_string(),
                "-1".to_string(),
                "-i".to_string(),
                path_arg(media),
                "-update".to_string(),
                "1".to_string(),
                "-frames:v".to_string(),
                "1".to_string(),
                "-q:v".to_string(),
                "2".to_string(),
                path_arg(output),
            ];
            let outcome = self.run_ffmpeg(args, output).await?;
            Ok(outcome.exit_code)
        })
    }

    fn add_watermark<'a>(
        &'a self,
        input: &'a Path,
        output: &'a Path,
        text: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let filter = format!(
                "drawtext=text={}:fontsize={}:fontcolor=white@0.6:x=w-tw-20:y=h-th-20",
                escape_drawtext(text),
                self.watermark_font_size
            );
            let args = vec![
                "-i".to_string(),
                path_arg(input),
                "-vf".to_string(),
                filter,
                "-c:a".to_string(),
                "copy".to_string(),
                path_arg(output),
            ];
            let outcome = self.run_ffmpeg(args, output).await?;
            ensure_success("ffmpeg watermark", &outcome)
        })
    }

    fn extract_audio<'a>(
        &'a self,
        input: &'a Path,
        output: &'a Path,
        leading_silence_secs: f64,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut args = vec![
                "-i".to_string(),
                path_arg(input),
                "-vn".to_string(),
            ];
            if let Some(filter) = silence_filter(leading_silence_secs) {
                args.push("-af".to_string());
                args.push(filter);
            }
            args.extend([
                "-acodec".to_string(),
                "libmp3lame".to_string(),
                "-q:a".to_string(),
                "2".to_string(),
                path_arg(output),
            ]);
            let outcome = self.run_ffmpeg(args, output).await?;
            ensure_success("ffmpeg audio extract", &outcome)
        })
    }
}

/// `adelay` on every channel, in whole milliseconds.
fn silence_filter(secs: f64) -> Option<String> {
    let millis = (secs * 1000.0).round();
    (millis >= 1.0).then(|| format!("adelay={}:all=1", millis as u64))
}

fn ensure_success(tool: &str, outcome: &ProcessOutcome) -> Result<()> {
    if outcome.success() {
        return Ok(());
    }
    Err(RenderkitError::Media(format!(
        "{tool} exited with {} (timed_out={}): {}",
        outcome.exit_code,
        outcome.timed_out,
        outcome.stderr.trim()
    )))
}

/// Number of media segments listed in an HLS playlist.
fn count_segments(manifest: &str) -> u32 {
    manifest
        .lines()
        .filter(|line| line.starts_with("#EXTINF"))
        .count() as u32
}

/// Quote a path for the concat demuxer's `file '...'` syntax.
fn escape_concat_path(path: &Path) -> String {
    path.to_string_lossy().replace('\'', r"'\''")
}

/// Escape text for an unquoted `drawtext=text=` option value.
fn escape_drawtext(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '\'' | ':' | ',' | ';' | '[' | ']' | '=' | '%') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
