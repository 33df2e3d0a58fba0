#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use renderkit::config::ConfigFile;
use renderkit::media::MediaBackend;
use renderkit::session::SessionOrchestrator;

pub use renderkit_test_utils::builders::{
    ConfigFileBuilder, RenderTaskBuilder, scene_script, single_scene_script,
};
pub use renderkit_test_utils::fake_media::{MediaCall, RecordingMediaBackend};
pub use renderkit_test_utils::fake_speech::CountingSpeechProvider;
pub use renderkit_test_utils::{init_tracing, with_timeout};

/// Orchestrator over `cfg` with a shared recording backend.
pub fn orchestrator(
    cfg: &ConfigFile,
    media: &Arc<RecordingMediaBackend>,
) -> SessionOrchestrator {
    let backend: Arc<dyn MediaBackend> = media.clone();
    SessionOrchestrator::new(cfg, backend).expect("orchestrator builds from test config")
}

/// Default test config rooted at `root`.
pub fn test_config(root: &Path) -> ConfigFile {
    ConfigFileBuilder::new(root).build()
}
