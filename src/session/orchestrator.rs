// src/session/orchestrator.rs

//! Session lifecycle: start, render under the session lock, finish.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{ConfigFile, StreamSection};
use crate::errors::{RenderkitError, Result};
use crate::media::{CloseOutcome, HlsSplitSpec, MediaBackend};
use crate::render::{RenderExecutor, RenderResult, RenderTask, StreamDelivery};
use crate::session::{ManifestInfo, OutputLayout, SessionRegistry, StripedLocks};
use crate::types::{SessionId, check_id};
use crate::upload::Uploader;

const MERGED_NAME: &str = "origin_main.mp4";
const WATERMARKED_NAME: &str = "main.mp4";
const AUDIO_NAME: &str = "main.mp3";
/// Audio of videos longer than this gets leading silence.
const SILENCE_THRESHOLD_SECS: f64 = 120.0;
/// One second of silence per this many seconds past the threshold.
const SILENCE_DIVISOR: f64 = 100.0;
const DETACHED_INPUT_NAME: &str = "main.mp4";
const DETACHED_MANIFEST_NAME: &str = "main.m3u8";
const DETACHED_SEGMENT_PATTERN: &str = "main_%03d.ts";

/// One render appended to a live session, kept until the session finishes.
#[derive(Debug, Clone)]
struct SessionArtifact {
    video: PathBuf,
    stills: Vec<PathBuf>,
}

/// Post-processing wanted when a session finishes.
#[derive(Debug, Clone, Default)]
pub struct FinishRequest {
    pub session_id: SessionId,
    /// Merge the session's artifacts (in completion order) into one video.
    pub merge: bool,
    pub watermark: Option<String>,
    pub extract_audio: bool,
    /// Upload the final files to this platform.
    pub upload_platform: Option<String>,
}

impl FinishRequest {
    pub fn new(session_id: impl Into<SessionId>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Self::default()
        }
    }

    fn wants_video(&self) -> bool {
        self.merge || self.watermark.is_some() || self.extract_audio || self.upload_platform.is_some()
    }
}

/// What `finish` did. Post-processing failures land in `errors`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FinishReport {
    pub session_id: SessionId,
    /// `None` when no live stream was registered for the session.
    pub stream: Option<CloseOutcome>,
    pub combined_video: Option<PathBuf>,
    pub duration_seconds: Option<f64>,
    pub audio: Option<PathBuf>,
    /// Ordered still frames for a slide deck.
    pub slides: Vec<PathBuf>,
    pub uploaded_urls: Vec<String>,
    pub errors: Vec<String>,
}

pub struct SessionOrchestrator {
    registry: SessionRegistry,
    locks: StripedLocks,
    executor: RenderExecutor,
    media: Arc<dyn MediaBackend>,
    layout: OutputLayout,
    stream: StreamSection,
    uploader: Option<Arc<dyn Uploader>>,
    artifacts: Mutex<HashMap<SessionId, Vec<SessionArtifact>>>,
}

impl SessionOrchestrator {
    pub fn new(cfg: &ConfigFile, media: Arc<dyn MediaBackend>) -> Result<Self> {
        let layout = OutputLayout::from_config(cfg);
        Ok(Self {
            registry: SessionRegistry::new(Arc::clone(&media), layout.clone(), cfg.stream.clone()),
            locks: StripedLocks::new(cfg.config.lock_stripes),
            executor: RenderExecutor::new(cfg, Arc::clone(&media))?,
            media,
            layout,
            stream: cfg.stream.clone(),
            uploader: None,
            artifacts: Mutex::new(HashMap::new()),
        })
    }

    pub fn with_uploader(mut self, uploader: Arc<dyn Uploader>) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn locks(&self) -> &StripedLocks {
        &self.locks
    }

    /// Open a live stream for `session_id`.
    pub async fn start(&self, session_id: &str) -> Result<ManifestInfo> {
        self.locks
            .with_session_lock(session_id, || async {
                let info = self.registry.start(session_id).await?;
                self.artifacts.lock().await.remove(session_id);
                Ok::<_, RenderkitError>(info)
            })
            .await
    }

    /// Render `task` while holding its session's lock, then deliver the
    /// artifact to the live stream, or to a detached rendition when the
    /// session has no live stream.
    pub async fn render(&self, task: &RenderTask) -> Result<RenderResult> {
        task.check_ids()?;
        self.locks
            .with_session_lock(&task.session_id, || self.render_locked(task))
            .await
    }

    async fn render_locked(&self, task: &RenderTask) -> Result<RenderResult> {
        let mut result = self.executor.execute(task).await?;
        let Some(artifact) = result.artifact_path.clone() else {
            return Ok(result);
        };

        let Some(shared) = self.registry.get(&task.session_id).await else {
            // No live session: nothing will finish this id, so nothing is recorded.
            result.delivery = Some(StreamDelivery::Detached {
                manifest: self.detach(task, &artifact).await?,
            });
            return Ok(result);
        };

        let manifest = {
            let mut handle = shared.lock().await;
            handle.append(self.media.as_ref(), &artifact).await?;
            handle.manifest_path().to_path_buf()
        };
        result.delivery = Some(StreamDelivery::Live { manifest });

        let stills = if result.images.is_empty() {
            result.thumbnail.iter().cloned().collect()
        } else {
            result.images.clone()
        };
        self.artifacts
            .lock()
            .await
            .entry(task.session_id.clone())
            .or_default()
            .push(SessionArtifact {
                video: artifact,
                stills,
            });
        Ok(result)
    }

    /// Copy the artifact to `hls/<task_id>/main.mp4` and segment it there.
    async fn detach(&self, task: &RenderTask, artifact: &Path) -> Result<PathBuf> {
        let dir = self.layout.detached_dir(&task.task_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| RenderkitError::io_at(&dir, e))?;
        let input = dir.join(DETACHED_INPUT_NAME);
        tokio::fs::copy(artifact, &input)
            .await
            .map_err(|e| RenderkitError::io_at(&input, e))?;

        let spec = HlsSplitSpec {
            manifest_path: dir.join(DETACHED_MANIFEST_NAME),
            input,
            segment_pattern: dir
                .join(DETACHED_SEGMENT_PATTERN)
                .to_string_lossy()
                .into_owned(),
            segment_duration_secs: self.stream.detached_segment_duration_secs,
        };
        let manifest = self.media.split_to_hls(&spec).await?;
        info!(
            session = %task.session_id,
            task = %task.task_id,
            manifest = %manifest.display(),
            "wrote detached rendition"
        );
        Ok(manifest)
    }

    /// Close the session's stream, then run the requested post-processing.
    ///
    /// Unknown sessions are not an error. Once the stream is closed, later
    /// failures are collected in [`FinishReport::errors`] and never undo it.
    pub async fn finish(&self, request: &FinishRequest) -> Result<FinishReport> {
        check_id("session", &request.session_id)?;
        self.locks
            .with_session_lock(&request.session_id, || self.finish_locked(request))
            .await
    }

    async fn finish_locked(&self, request: &FinishRequest) -> Result<FinishReport> {
        let session_id = request.session_id.as_str();
        let stream = self.registry.finish(session_id).await?;
        let artifacts = self
            .artifacts
            .lock()
            .await
            .remove(session_id)
            .unwrap_or_default();

        let mut report = FinishReport {
            session_id: session_id.to_string(),
            stream,
            slides: artifacts.iter().flat_map(|a| a.stills.iter().cloned()).collect(),
            ..FinishReport::default()
        };

        if artifacts.is_empty() || !request.wants_video() {
            return Ok(report);
        }

        if let Err(e) = self.post_process(request, &artifacts, &mut report).await {
            warn!(session = %session_id, error = %e, "post-processing failed");
            report.errors.push(e.to_string());
        }
        info!(
            session = %session_id,
            stream = ?report.stream,
            errors = report.errors.len(),
            "session finish complete"
        );
        Ok(report)
    }

    async fn post_process(
        &self,
        request: &FinishRequest,
        artifacts: &[SessionArtifact],
        report: &mut FinishReport,
    ) -> Result<()> {
        let out_dir = self.layout.combined_dir(&request.session_id);
        tokio::fs::create_dir_all(&out_dir)
            .await
            .map_err(|e| RenderkitError::io_at(&out_dir, e))?;

        let inputs: Vec<PathBuf> = artifacts.iter().map(|a| a.video.clone()).collect();
        let merged = out_dir.join(MERGED_NAME);
        if !self.media.merge(&inputs, &merged).await? {
            return Err(RenderkitError::Media(format!(
                "could not merge {} artifacts for session {}",
                inputs.len(),
                request.session_id
            )));
        }

        let mut video = merged;
        if let Some(text) = &request.watermark {
            let marked = out_dir.join(WATERMARKED_NAME);
            match self.media.add_watermark(&video, &marked, text).await {
                Ok(()) => video = marked,
                Err(e) => report.errors.push(format!("watermark: {e}")),
            }
        }
        report.combined_video = Some(video.clone());

        match self.media.duration(&video).await {
            Ok(secs) => report.duration_seconds = Some(secs),
            Err(e) => report.errors.push(format!("duration: {e}")),
        }

        if request.extract_audio {
            let audio = out_dir.join(AUDIO_NAME);
            let silence = leading_silence_secs(report.duration_seconds);
            match self.media.extract_audio(&video, &audio, silence).await {
                Ok(()) => report.audio = Some(audio),
                Err(e) => report.errors.push(format!("audio: {e}")),
            }
        }

        if let Some(platform) = &request.upload_platform {
            let Some(uploader) = &self.uploader else {
                report.errors.push("upload: no uploader configured".to_string());
                return Ok(());
            };
            let mut files = vec![(video, format!("{}.mp4", request.session_id))];
            if let Some(audio) = &report.audio {
                files.push((audio.clone(), format!("{}.mp3", request.session_id)));
            }
            match uploader.upload_batch(platform, &files).await {
                Ok(urls) => report.uploaded_urls = urls,
                Err(e) => report.errors.push(format!("upload: {e}")),
            }
        }
        Ok(())
    }
}

/// Silence placed before the extracted audio of a `duration`-second video.
fn leading_silence_secs(duration: Option<f64>) -> f64 {
    match duration {
        Some(secs) if secs > SILENCE_THRESHOLD_SECS => (secs - SILENCE_THRESHOLD_SECS) / SILENCE_DIVISOR,
        _ => 0.0,
    }
}
