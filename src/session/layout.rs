// src/session/layout.rs

//! On-disk output tree shared by every component that publishes files.
//!
//! ```text
//! <data_dir>/hls/<session_id>/main.m3u8      live manifest + c_NNN.ts
//! <data_dir>/hls/<task_id>/main.m3u8         detached rendition
//! <data_dir>/scenes/<session_id>/<task>.mp4  relocated render artifacts
//! <data_dir>/combined/<session_id>/          finish post-processing output
//! ```

use std::path::{Path, PathBuf};

use crate::config::ConfigFile;

#[derive(Debug, Clone)]
pub struct OutputLayout {
    data_dir: PathBuf,
    manifest_name: String,
}

impl OutputLayout {
    pub fn new(data_dir: impl Into<PathBuf>, manifest_name: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            manifest_name: manifest_name.into(),
        }
    }

    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::new(cfg.config.data_dir.clone(), cfg.stream.manifest_name.clone())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn hls_dir(&self, session_id: &str) -> PathBuf {
        self.data_dir.join("hls").join(session_id)
    }

    pub fn scenes_dir(&self, session_id: &str) -> PathBuf {
        self.data_dir.join("scenes").join(session_id)
    }

    pub fn combined_dir(&self, session_id: &str) -> PathBuf {
        self.data_dir.join("combined").join(session_id)
    }

    pub fn session_manifest(&self, session_id: &str) -> PathBuf {
        self.hls_dir(session_id).join(&self.manifest_name)
    }

    /// Standalone rendition of one task; shares the `hls/` root with sessions.
    pub fn detached_dir(&self, task_id: &str) -> PathBuf {
        self.data_dir.join("hls").join(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_rooted_per_category() {
        let layout = OutputLayout::new("data", "main.m3u8");
        assert_eq!(layout.hls_dir("s1"), PathBuf::from("data/hls/s1"));
        assert_eq!(layout.scenes_dir("s1"), PathBuf::from("data/scenes/s1"));
        assert_eq!(layout.combined_dir("s1"), PathBuf::from("data/combined/s1"));
        assert_eq!(
            layout.session_manifest("s1"),
            PathBuf::from("data/hls/s1/main.m3u8")
        );
        assert_eq!(layout.detached_dir("t9"), PathBuf::from("data/hls/t9"));
    }
}
