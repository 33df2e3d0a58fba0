#![allow(dead_code)]

use std::path::{Path, PathBuf};

use renderkit::config::{ConfigFile, RawConfigFile, TaskConfig, UploadSection};
use renderkit::render::RenderTask;
use renderkit::types::{CacheStoreMode, Quality};

/// Builder for `ConfigFile` rooted in a scratch directory.
///
/// The renderer is `sh <script> <media_dir>`, so task sources are shell
/// scripts that receive the media directory as `$1`.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(root: &Path) -> Self {
        let mut config = RawConfigFile::default();
        config.config.data_dir = root.join("data");
        config.config.work_dir = root.join("work");
        config.config.default_timeout_secs = 10;
        config.renderer.program = "sh".to_string();
        config.renderer.args = vec!["{script}".to_string(), "{media_dir}".to_string()];
        config.renderer.source_file = "render.sh".to_string();
        config.renderer.env.clear();
        config.renderer.pass_env = vec!["PATH".to_string()];
        config.tts.audio_dir = root.join("audio");
        config.tts.store = CacheStoreMode::Memory;
        Self { config }
    }

    pub fn lock_stripes(mut self, n: usize) -> Self {
        self.config.config.lock_stripes = n;
        self
    }

    pub fn renderer_env(mut self, key: &str, value: &str) -> Self {
        self.config
            .renderer
            .env
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn tts_store(mut self, mode: CacheStoreMode) -> Self {
        self.config.tts.store = mode;
        self
    }

    pub fn fallback_audio(mut self, path: &Path) -> Self {
        self.config.tts.fallback_audio = Some(path.to_path_buf());
        self
    }

    pub fn upload(mut self, root: &Path, base_url: &str) -> Self {
        self.config.upload = Some(UploadSection {
            root: root.to_path_buf(),
            base_url: base_url.to_string(),
        });
        self
    }

    pub fn with_task(mut self, name: &str, source: &str) -> Self {
        self.config.task.insert(
            name.to_string(),
            TaskConfig {
                source: PathBuf::from(source),
                quality: None,
                timeout_secs: None,
                aux_input: None,
            },
        );
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// Builder for `RenderTask`.
pub struct RenderTaskBuilder {
    task: RenderTask,
}

impl RenderTaskBuilder {
    pub fn new(session_id: &str, task_id: &str) -> Self {
        Self {
            task: RenderTask {
                task_id: task_id.to_string(),
                session_id: session_id.to_string(),
                source_code: String::new(),
                quality: Quality::Low,
                timeout_secs: 10,
                aux_input: None,
            },
        }
    }

    pub fn source(mut self, script: impl Into<String>) -> Self {
        self.task.source_code = script.into();
        self
    }

    pub fn quality(mut self, quality: Quality) -> Self {
        self.task.quality = quality;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.task.timeout_secs = secs;
        self
    }

    pub fn aux(mut self, data: impl Into<String>) -> Self {
        self.task.aux_input = Some(data.into());
        self
    }

    pub fn build(self) -> RenderTask {
        self.task
    }
}

/// Shell script that writes each of `files` into `$1/<dir>/`.
pub fn scene_script(dir: &str, files: &[&str]) -> String {
    let mut script = format!("set -e\nmkdir -p \"$1/{dir}\"\n");
    for file in files {
        script.push_str(&format!("printf '%s' '{file}' > \"$1/{dir}/{file}\"\n"));
    }
    script
}

/// Shell script producing a single scene in the first candidate directory.
pub fn single_scene_script(name: &str) -> String {
    scene_script("videos/480p30", &[name])
}
