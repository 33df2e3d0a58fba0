// src/render/executor.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{ConfigFile, RendererSection};
use crate::errors::{RenderkitError, Result};
use crate::exec::{ProcessSpec, expand_template, path_arg, run_process};
use crate::media::MediaBackend;
use crate::render::discovery::ArtifactLocator;
use crate::render::task::{RenderResult, RenderStatus, RenderTask};
use crate::session::OutputLayout;

/// File the auxiliary input is written to, next to the script.
pub const AUX_FILE_NAME: &str = "figure.txt";

/// Rewritten to the absolute path of [`AUX_FILE_NAME`].
pub const FIGURE_PLACEHOLDER: &str = "#(figure_path)";

/// Rewritten to the absolute media directory of the task.
pub const OUTPUT_PLACEHOLDER: &str = "#(output_path)";

/// Name of the file several scene outputs are merged into.
pub const COMBINED_SCENE_NAME: &str = "CombinedScene.mp4";

const MEDIA_DIR_NAME: &str = "media";
const SUBTITLE_PATH: &str = "script/script.txt";

/// Runs render tasks and publishes their artifacts into the session tree.
pub struct RenderExecutor {
    renderer: RendererSection,
    work_root: PathBuf,
    layout: OutputLayout,
    locator: ArtifactLocator,
    media: Arc<dyn MediaBackend>,
}

impl RenderExecutor {
    pub fn new(cfg: &ConfigFile, media: Arc<dyn MediaBackend>) -> Result<Self> {
        Ok(Self {
            renderer: cfg.renderer.clone(),
            work_root: cfg.config.work_dir.clone(),
            layout: OutputLayout::from_config(cfg),
            locator: ArtifactLocator::new(&cfg.renderer.artifact_glob)?,
            media,
        })
    }

    /// Scratch directory of one task: `<work_dir>/<session_id>/<task_id>`.
    pub fn task_dir(&self, task: &RenderTask) -> PathBuf {
        self.work_root.join(&task.session_id).join(&task.task_id)
    }

    /// Run `task` to completion.
    ///
    /// Script failure, timeout and a missing artifact come back as
    /// `Ok(RenderResult)` with the matching [`RenderStatus`]. `Err` means the
    /// environment failed: directories or files could not be written, the
    /// renderer could not be started, or the artifact could not be moved.
    pub async fn execute(&self, task: &RenderTask) -> Result<RenderResult> {
        task.check_ids()?;
        let work_dir = absolute(&self.task_dir(task))?;
        let media_dir = work_dir.join(MEDIA_DIR_NAME);
        create_dir(&media_dir).await?;

        let script_path = work_dir.join(&self.renderer.source_file);
        let source = self.materialize_source(task, &work_dir, &media_dir).await?;
        write_file(&script_path, source.as_bytes()).await?;

        info!(
            session = %task.session_id,
            task = %task.task_id,
            quality = %task.quality,
            timeout_secs = task.timeout_secs,
            "starting render"
        );

        let args = expand_template(
            &self.renderer.args,
            &[
                ("quality", task.quality.as_flag().to_string()),
                ("fps", self.renderer.fps.to_string()),
                ("media_dir", path_arg(&media_dir)),
                ("script", path_arg(&script_path)),
                ("work_dir", path_arg(&work_dir)),
            ],
        );
        let spec = ProcessSpec::new(
            self.renderer.program.clone(),
            work_dir.clone(),
            Duration::from_secs(task.timeout_secs),
        )
        .args(args)
        .pass_env(&self.renderer.pass_env)
        .envs(&self.renderer.env);

        let outcome = run_process(&spec).await?;
        let mut result = RenderResult::from_outcome(task, outcome);

        if result.status != RenderStatus::ArtifactNotFound {
            warn!(
                session = %task.session_id,
                task = %task.task_id,
                exit_code = result.exit_code,
                timed_out = result.timed_out,
                "render process failed"
            );
            return Ok(result);
        }

        let found = self.locator.locate(&media_dir)?;
        if found.is_empty() {
            warn!(
                session = %task.session_id,
                task = %task.task_id,
                media_dir = %media_dir.display(),
                "artifact not found after successful render"
            );
            return Ok(result);
        }

        let scenes_dir = self.layout.scenes_dir(&task.session_id);
        create_dir(&scenes_dir).await?;

        let produced = if found.len() == 1 {
            found[0].clone()
        } else {
            result.images = self.capture_scene_frames(task, &found, &scenes_dir).await;
            let combined = media_dir.join(COMBINED_SCENE_NAME);
            if !self.media.merge(&found, &combined).await? {
                return Err(RenderkitError::Media(format!(
                    "could not combine {} scene files for task {}",
                    found.len(),
                    task.task_id
                )));
            }
            debug!(task = %task.task_id, scenes = found.len(), "combined scene files");
            combined
        };

        let artifact = scenes_dir.join(artifact_name(&task.task_id, &produced));
        relocate(&produced, &artifact).await?;

        result.duration_seconds = match self.media.duration(&artifact).await {
            Ok(secs) => Some(secs),
            Err(e) => {
                warn!(task = %task.task_id, error = %e, "could not probe artifact duration");
                None
            }
        };
        result.thumbnail = self
            .save_frame(&artifact, &scenes_dir.join(format!("{}.jpg", task.task_id)))
            .await;
        result.subtitle_text = read_optional(&media_dir.join(SUBTITLE_PATH)).await?;
        result.artifact_path = Some(artifact);
        result.status = RenderStatus::Succeeded;

        info!(
            session = %task.session_id,
            task = %task.task_id,
            artifact = ?result.artifact_path,
            "render succeeded"
        );
        Ok(result)
    }

    /// Write the aux file if any and rewrite path placeholders in the source.
    async fn materialize_source(
        &self,
        task: &RenderTask,
        work_dir: &Path,
        media_dir: &Path,
    ) -> Result<String> {
        let mut source = task
            .source_code
            .replace(OUTPUT_PLACEHOLDER, &path_arg(media_dir));

        if let Some(aux) = &task.aux_input {
            let aux_path = work_dir.join(AUX_FILE_NAME);
            write_file(&aux_path, aux.as_bytes()).await?;
            source = source.replace(FIGURE_PLACEHOLDER, &path_arg(&aux_path));
        }
        Ok(source)
    }

    async fn capture_scene_frames(
        &self,
        task: &RenderTask,
        scenes: &[PathBuf],
        out_dir: &Path,
    ) -> Vec<PathBuf> {
        let mut images = Vec::with_capacity(scenes.len());
        for (idx, scene) in scenes.iter().enumerate() {
            let out = out_dir.join(format!("{}_{idx:03}.jpg", task.task_id));
            if let Some(image) = self.save_frame(scene, &out).await {
                images.push(image);
            }
        }
        images
    }

    /// Last frame of `media` saved to `out`; `None` on any failure.
    async fn save_frame(&self, media: &Path, out: &Path) -> Option<PathBuf> {
        match self.media.save_last_frame(media, out).await {
            Ok(0) => Some(out.to_path_buf()),
            Ok(code) => {
                warn!(media = %media.display(), exit_code = code, "frame capture failed");
                None
            }
            Err(e) => {
                warn!(media = %media.display(), error = %e, "frame capture failed");
                None
            }
        }
    }
}

/// `<task_id>.<ext>`, keeping the produced file's extension.
fn artifact_name(task_id: &str, produced: &Path) -> String {
    match produced.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{task_id}.{}", ext.to_ascii_lowercase()),
        None => format!("{task_id}.mp4"),
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| RenderkitError::io_at(path, e))
}

async fn create_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| RenderkitError::io_at(path, e))
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| RenderkitError::io_at(path, e))
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(RenderkitError::io_at(path, e)),
    }
}

/// Move `from` to `to`, copying when a rename cannot cross filesystems.
pub(crate) async fn relocate(from: &Path, to: &Path) -> Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to)
        .await
        .map_err(|e| RenderkitError::io_at(to, e))?;
    if let Err(e) = tokio::fs::remove_file(from).await {
        debug!(path = %from.display(), error = %e, "could not remove relocated source");
    }
    Ok(())
}
