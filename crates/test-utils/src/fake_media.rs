use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use renderkit::errors::{RenderkitError, Result};
use renderkit::media::{BoxFuture, HlsSplitSpec, HlsStreamSpec, MediaBackend, NativeHandle};

/// One call into the media backend, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaCall {
    Init { handle: u64, manifest: PathBuf },
    Append { handle: u64, media: PathBuf },
    Finish { handle: u64, manifest: PathBuf },
    Free { handle: u64 },
    Split { manifest: PathBuf, input: PathBuf },
    Merge { inputs: Vec<PathBuf>, output: PathBuf },
    Duration { media: PathBuf },
    LastFrame { media: PathBuf, output: PathBuf },
    Watermark { input: PathBuf, output: PathBuf, text: String },
    ExtractAudio { input: PathBuf, output: PathBuf, silence_secs: f64 },
}

/// A media backend that:
/// - records every call in order
/// - writes plausible files (manifest lines, merged bytes, frames)
/// - tracks how many appends ran at the same time.
#[derive(Default)]
pub struct RecordingMediaBackend {
    calls: Arc<Mutex<Vec<MediaCall>>>,
    manifests: Mutex<HashMap<u64, PathBuf>>,
    next_handle: AtomicU64,
    append_delay: Option<Duration>,
    fail_merge: AtomicBool,
    fail_watermark: AtomicBool,
    /// Reported by `duration`; 2.0 until set.
    duration_secs: Mutex<Option<f64>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingMediaBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every append for `delay` to widen race windows.
    pub fn with_append_delay(mut self, delay: Duration) -> Self {
        self.append_delay = Some(delay);
        self
    }

    pub fn fail_merge(&self, fail: bool) {
        self.fail_merge.store(fail, Ordering::SeqCst);
    }

    pub fn fail_watermark(&self, fail: bool) {
        self.fail_watermark.store(fail, Ordering::SeqCst);
    }

    pub fn set_duration(&self, secs: f64) {
        *self.duration_secs.lock().unwrap() = Some(secs);
    }

    pub fn calls(&self) -> Vec<MediaCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn appends(&self) -> Vec<PathBuf> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MediaCall::Append { media, .. } => Some(media),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&MediaCall) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    /// Highest number of appends observed running concurrently.
    pub fn max_concurrent_appends(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: MediaCall) {
        self.calls.lock().unwrap().push(call);
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

impl MediaBackend for RecordingMediaBackend {
    fn stream_init<'a>(&'a self, spec: &'a HlsStreamSpec) -> BoxFuture<'a, Result<NativeHandle>> {
        Box::pin(async move {
            let raw = self.next_handle.fetch_add(1, Ordering::SeqCst) + 1;
            self.manifests
                .lock()
                .unwrap()
                .insert(raw, spec.manifest_path.clone());
            self.record(MediaCall::Init {
                handle: raw,
                manifest: spec.manifest_path.clone(),
            });
            Ok(NativeHandle::from_raw(raw))
        })
    }

    fn stream_append<'a>(
        &'a self,
        handle: &'a NativeHandle,
        media: &'a Path,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.append_delay {
                tokio::time::sleep(delay).await;
            }

            let manifest = self.manifests.lock().unwrap().get(&handle.raw()).cloned();
            let result = match manifest {
                Some(manifest) => {
                    let name = media.file_name().unwrap_or_default().to_string_lossy();
                    append_line(&manifest, &format!("#EXTINF:2.000,\n{name}\n"))
                }
                None => Err(RenderkitError::Media(format!(
                    "append on released handle {}",
                    handle.raw()
                ))),
            };
            self.record(MediaCall::Append {
                handle: handle.raw(),
                media: media.to_path_buf(),
            });
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }

    fn stream_finish<'a>(
        &'a self,
        handle: NativeHandle,
        manifest: &'a Path,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.manifests.lock().unwrap().remove(&handle.raw());
            self.record(MediaCall::Finish {
                handle: handle.raw(),
                manifest: manifest.to_path_buf(),
            });
            append_line(manifest, "#EXT-X-ENDLIST\n")
        })
    }

    fn stream_free(&self, handle: NativeHandle) {
        self.manifests.lock().unwrap().remove(&handle.raw());
        self.record(MediaCall::Free {
            handle: handle.raw(),
        });
    }

    fn split_to_hls<'a>(&'a self, spec: &'a HlsSplitSpec) -> BoxFuture<'a, Result<PathBuf>> {
        Box::pin(async move {
            self.record(MediaCall::Split {
                manifest: spec.manifest_path.clone(),
                input: spec.input.clone(),
            });
            ensure_parent(&spec.manifest_path)?;
            std::fs::write(
                &spec.manifest_path,
                "#EXTM3U\n#EXTINF:10.000,\nmain_000.ts\n#EXT-X-ENDLIST\n",
            )?;
            Ok(spec.manifest_path.clone())
        })
    }

    fn merge<'a>(&'a self, inputs: &'a [PathBuf], output: &'a Path) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            self.record(MediaCall::Merge {
                inputs: inputs.to_vec(),
                output: output.to_path_buf(),
            });
            if self.fail_merge.load(Ordering::SeqCst) {
                return Ok(false);
            }
            ensure_parent(output)?;
            let mut bytes = Vec::new();
            for input in inputs {
                bytes.extend(std::fs::read(input)?);
            }
            std::fs::write(output, bytes)?;
            Ok(true)
        })
    }

    fn duration<'a>(&'a self, media: &'a Path) -> BoxFuture<'a, Result<f64>> {
        Box::pin(async move {
            self.record(MediaCall::Duration {
                media: media.to_path_buf(),
            });
            Ok(self.duration_secs.lock().unwrap().unwrap_or(2.0))
        })
    }

    fn save_last_frame<'a>(
        &'a self,
        media: &'a Path,
        output: &'a Path,
    ) -> BoxFuture<'a, Result<i32>> {
        Box::pin(async move {
            self.record(MediaCall::LastFrame {
                media: media.to_path_buf(),
                output: output.to_path_buf(),
            });
            ensure_parent(output)?;
            std::fs::write(output, b"jpg")?;
            Ok(0)
        })
    }

    fn add_watermark<'a>(
        &'a self,
        input: &'a Path,
        output: &'a Path,
        text: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record(MediaCall::Watermark {
                input: input.to_path_buf(),
                output: output.to_path_buf(),
                text: text.to_string(),
            });
            if self.fail_watermark.load(Ordering::SeqCst) {
                return Err(RenderkitError::Media("watermark refused".to_string()));
            }
            std::fs::copy(input, output)?;
            Ok(())
        })
    }

    fn extract_audio<'a>(
        &'a self,
        input: &'a Path,
        output: &'a Path,
        leading_silence_secs: f64,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record(MediaCall::ExtractAudio {
                input: input.to_path_buf(),
                output: output.to_path_buf(),
                silence_secs: leading_silence_secs,
            });
            std::fs::write(output, b"mp3")?;
            Ok(())
        })
    }
}
