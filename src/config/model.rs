// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::types::{CacheStoreMode, Quality};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [config]
/// data_dir = "data"
/// lock_stripes = 1024
///
/// [renderer]
/// program = "manim"
///
/// [task.intro]
/// source = "scenes/intro.py"
/// quality = "l"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawConfigFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub renderer: RendererSection,

    #[serde(default)]
    pub stream: StreamSection,

    #[serde(default)]
    pub media: MediaSection,

    #[serde(default)]
    pub tts: TtsSection,

    #[serde(default)]
    pub upload: Option<UploadSection>,

    /// Batch render jobs from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated configuration. Only constructible through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub config: ConfigSection,
    pub renderer: RendererSection,
    pub stream: StreamSection,
    pub media: MediaSection,
    pub tts: TtsSection,
    pub upload: Option<UploadSection>,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            config: raw.config,
            renderer: raw.renderer,
            stream: raw.stream,
            media: raw.media,
            tts: raw.tts,
            upload: raw.upload,
            task: raw.task,
        }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Root of the published output tree (`hls/`, `scenes/`, `combined/`).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Root of the per-session, per-task scratch directories.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Size of the striped session lock pool.
    #[serde(default = "default_lock_stripes")]
    pub lock_stripes: usize,

    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,

    #[serde(default)]
    pub default_quality: Quality,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("scripts")
}

fn default_lock_stripes() -> usize {
    1024
}

fn default_timeout_secs() -> u64 {
    590
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            work_dir: default_work_dir(),
            lock_stripes: default_lock_stripes(),
            default_timeout_secs: default_timeout_secs(),
            default_quality: Quality::default(),
        }
    }
}

/// `[renderer]` section: how the external rendering tool is invoked.
///
/// `args` is an argv template. Placeholders: `{quality}`, `{fps}`,
/// `{media_dir}`, `{script}`, `{work_dir}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RendererSection {
    #[serde(default = "default_renderer_program")]
    pub program: String,

    #[serde(default = "default_renderer_args")]
    pub args: Vec<String>,

    #[serde(default = "default_fps")]
    pub fps: u32,

    /// File name the task source is written to inside its working directory.
    #[serde(default = "default_source_file")]
    pub source_file: String,

    /// Pattern (matched case-insensitively) for produced media files.
    #[serde(default = "default_artifact_glob")]
    pub artifact_glob: String,

    /// Variables set on the renderer process.
    #[serde(default = "default_renderer_env")]
    pub env: BTreeMap<String, String>,

    /// Parent-process variables passed through unchanged. Nothing else leaks.
    #[serde(default = "default_pass_env")]
    pub pass_env: Vec<String>,
}

fn default_renderer_program() -> String {
    "manim".to_string()
}

fn default_renderer_args() -> Vec<String> {
    [
        "-q{quality}",
        "--fps",
        "{fps}",
        "--progress_bar",
        "none",
        "--verbosity",
        "WARNING",
        "--media_dir",
        "{media_dir}",
        "{script}",
        "-a",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_fps() -> u32 {
    10
}

fn default_source_file() -> String {
    "script.py".to_string()
}

fn default_artifact_glob() -> String {
    "*.mp4".to_string()
}

fn default_renderer_env() -> BTreeMap<String, String> {
    let mut env = BTreeMap::new();
    env.insert("PYTHONIOENCODING".to_string(), "utf-8".to_string());
    env
}

fn default_pass_env() -> Vec<String> {
    vec!["PATH".to_string(), "HOME".to_string(), "LANG".to_string()]
}

impl Default for RendererSection {
    fn default() -> Self {
        Self {
            program: default_renderer_program(),
            args: default_renderer_args(),
            fps: default_fps(),
            source_file: default_source_file(),
            artifact_glob: default_artifact_glob(),
            env: default_renderer_env(),
            pass_env: default_pass_env(),
        }
    }
}

/// `[stream]` section: HLS parameters for live and detached renditions.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSection {
    #[serde(default = "default_manifest_name")]
    pub manifest_name: String,

    #[serde(default = "default_segment_pattern")]
    pub segment_pattern: String,

    #[serde(default)]
    pub start_number: u32,

    #[serde(default = "default_segment_duration_secs")]
    pub segment_duration_secs: u32,

    #[serde(default = "default_detached_segment_duration_secs")]
    pub detached_segment_duration_secs: u32,
}

fn default_manifest_name() -> String {
    "main.m3u8".to_string()
}

fn default_segment_pattern() -> String {
    "c_%03d.ts".to_string()
}

fn default_segment_duration_secs() -> u32 {
    2
}

fn default_detached_segment_duration_secs() -> u32 {
    10
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            manifest_name: default_manifest_name(),
            segment_pattern: default_segment_pattern(),
            start_number: 0,
            segment_duration_secs: default_segment_duration_secs(),
            detached_segment_duration_secs: default_detached_segment_duration_secs(),
        }
    }
}

/// `[media]` section: external ffmpeg tooling.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaSection {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,

    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,

    #[serde(default = "default_media_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_watermark_font_size")]
    pub watermark_font_size: u32,
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_media_timeout_secs() -> u64 {
    600
}

fn default_watermark_font_size() -> u32 {
    24
}

impl Default for MediaSection {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            timeout_secs: default_media_timeout_secs(),
            watermark_font_size: default_watermark_font_size(),
        }
    }
}

/// `[tts]` section: speech synthesis behind the artifact cache.
#[derive(Debug, Clone, Deserialize)]
pub struct TtsSection {
    /// Directory holding synthesized audio and the file-backed cache index.
    #[serde(default = "default_audio_dir")]
    pub audio_dir: PathBuf,

    #[serde(default)]
    pub store: CacheStoreMode,

    /// Returned (never cached) when a provider fails.
    #[serde(default)]
    pub fallback_audio: Option<PathBuf>,

    #[serde(default = "default_provider")]
    pub default_provider: String,

    #[serde(default = "default_voice")]
    pub default_voice: String,

    /// Voice used when the input contains Han characters.
    #[serde(default = "default_voice_han")]
    pub default_voice_han: String,

    #[serde(default)]
    pub provider: BTreeMap<String, ProviderConfig>,
}

fn default_audio_dir() -> PathBuf {
    PathBuf::from("cache")
}

fn default_provider() -> String {
    "minimax".to_string()
}

fn default_voice() -> String {
    "English_magnetic_voiced_man".to_string()
}

fn default_voice_han() -> String {
    "Chinese (Mandarin)_Gentleman".to_string()
}

impl Default for TtsSection {
    fn default() -> Self {
        Self {
            audio_dir: default_audio_dir(),
            store: CacheStoreMode::default(),
            fallback_audio: None,
            default_provider: default_provider(),
            default_voice: default_voice(),
            default_voice_han: default_voice_han(),
            provider: BTreeMap::new(),
        }
    }
}

/// `[tts.provider.<name>]`: a command-line synthesizer.
///
/// `args` placeholders: `{text}`, `{voice}`, `{output}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider_timeout_secs() -> u64 {
    120
}

/// `[upload]` section for the local-directory uploader.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadSection {
    pub root: PathBuf,
    pub base_url: String,
}

/// `[task.<name>]` section: one batch render job.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Path of the script to execute.
    pub source: PathBuf,

    #[serde(default)]
    pub quality: Option<Quality>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Optional side-channel file copied next to the script.
    #[serde(default)]
    pub aux_input: Option<PathBuf>,
}

impl TaskConfig {
    pub fn effective_quality(&self, default: Quality) -> Quality {
        self.quality.unwrap_or(default)
    }

    pub fn effective_timeout_secs(&self, default: u64) -> u64 {
        self.timeout_secs.unwrap_or(default)
    }
}
