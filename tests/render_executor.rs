// tests/render_executor.rs

mod common;
use crate::common::{
    ConfigFileBuilder, MediaCall, RecordingMediaBackend, RenderTaskBuilder, init_tracing,
    scene_script, single_scene_script,
};

use std::path::Path;
use std::sync::Arc;

use renderkit::config::ConfigFile;
use renderkit::media::MediaBackend;
use renderkit::render::{RenderExecutor, RenderStatus};

fn executor(cfg: &ConfigFile) -> (RenderExecutor, Arc<RecordingMediaBackend>) {
    let media = Arc::new(RecordingMediaBackend::new());
    let backend: Arc<dyn MediaBackend> = media.clone();
    (RenderExecutor::new(cfg, backend).unwrap(), media)
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

#[tokio::test]
async fn single_scene_is_relocated_into_session_scenes() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = ConfigFileBuilder::new(tmp.path()).build();
    let (exec, media) = executor(&cfg);
    let task = RenderTaskBuilder::new("s1", "t1")
        .source(single_scene_script("Scene.mp4"))
        .build();

    let result = exec.execute(&task).await.unwrap();

    assert_eq!(result.status, RenderStatus::Succeeded);
    assert_eq!(result.exit_code, 0);
    let artifact = result.artifact_path.clone().unwrap();
    assert_eq!(artifact, tmp.path().join("data/scenes/s1/t1.mp4"));
    assert_eq!(read(&artifact), "Scene.mp4");
    assert_eq!(result.duration_seconds, Some(2.0));
    assert_eq!(result.thumbnail, Some(tmp.path().join("data/scenes/s1/t1.jpg")));
    assert!(result.images.is_empty());
    assert_eq!(media.count(|c| matches!(c, MediaCall::Merge { .. })), 0);

    // Scratch tree is kept for debugging.
    assert!(tmp.path().join("work/s1/t1/render.sh").is_file());
}

#[tokio::test]
async fn multiple_scenes_are_merged_in_name_order() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = ConfigFileBuilder::new(tmp.path()).build();
    let (exec, media) = executor(&cfg);
    let task = RenderTaskBuilder::new("s1", "t2")
        .source(scene_script("videos/720p15", &["b.mp4", "a.mp4", "c.MP4"]))
        .build();

    let result = exec.execute(&task).await.unwrap();

    assert!(result.succeeded());
    assert_eq!(read(result.artifact_path.as_ref().unwrap()), "a.mp4b.mp4c.MP4");
    assert_eq!(result.images.len(), 3);

    let merged: Vec<String> = media
        .calls()
        .into_iter()
        .find_map(|c| match c {
            MediaCall::Merge { inputs, .. } => Some(inputs),
            _ => None,
        })
        .unwrap()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(merged, vec!["a.mp4", "b.mp4", "c.MP4"]);
}

#[tokio::test]
async fn earlier_candidate_directory_wins() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = ConfigFileBuilder::new(tmp.path()).build();
    let (exec, _media) = executor(&cfg);
    let script = format!(
        "{}{}",
        scene_script("videos/1080p10", &["late.mp4"]),
        scene_script("videos/480p15", &["early.mp4"])
    );
    let task = RenderTaskBuilder::new("s1", "t3").source(script).build();

    let result = exec.execute(&task).await.unwrap();

    assert_eq!(read(result.artifact_path.as_ref().unwrap()), "early.mp4");
}

#[tokio::test]
async fn nested_script_directory_is_a_candidate() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = ConfigFileBuilder::new(tmp.path()).build();
    let (exec, _media) = executor(&cfg);
    let task = RenderTaskBuilder::new("s1", "t4")
        .source(scene_script("videos/script/720p30", &["Nested.mp4"]))
        .build();

    let result = exec.execute(&task).await.unwrap();
    assert_eq!(read(result.artifact_path.as_ref().unwrap()), "Nested.mp4");
}

#[tokio::test]
async fn failing_script_reports_output_and_no_artifact() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = ConfigFileBuilder::new(tmp.path()).build();
    let (exec, media) = executor(&cfg);
    let task = RenderTaskBuilder::new("s1", "bad")
        .source("echo 'NameError: Scene' >&2\nexit 1\n")
        .build();

    let result = exec.execute(&task).await.unwrap();

    assert_eq!(result.status, RenderStatus::ProcessFailed);
    assert_eq!(result.exit_code, 1);
    assert!(result.stderr.contains("NameError"));
    assert!(result.artifact_path.is_none());
    assert!(media.calls().is_empty());
}

#[tokio::test]
async fn runaway_script_times_out() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = ConfigFileBuilder::new(tmp.path()).build();
    let (exec, _media) = executor(&cfg);
    let task = RenderTaskBuilder::new("s1", "slow")
        .source("exec sleep 30\n")
        .timeout_secs(1)
        .build();

    let started = std::time::Instant::now();
    let result = exec.execute(&task).await.unwrap();

    assert_eq!(result.status, RenderStatus::TimedOut);
    assert!(result.timed_out);
    assert!(result.artifact_path.is_none());
    assert!(started.elapsed() < std::time::Duration::from_secs(5));
}

#[tokio::test]
async fn clean_exit_without_media_is_artifact_not_found() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = ConfigFileBuilder::new(tmp.path()).build();
    let (exec, _media) = executor(&cfg);
    let task = RenderTaskBuilder::new("s1", "empty")
        .source("echo rendered nothing\n")
        .build();

    let result = exec.execute(&task).await.unwrap();

    assert_eq!(result.status, RenderStatus::ArtifactNotFound);
    assert_eq!(result.exit_code, 0);
    assert!(result.artifact_path.is_none());
    assert_eq!(result.stdout.trim(), "rendered nothing");
}

#[tokio::test]
async fn placeholders_aux_input_and_subtitle() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = ConfigFileBuilder::new(tmp.path()).build();
    let (exec, _media) = executor(&cfg);
    let script = r##"set -e
mkdir -p "#(output_path)/videos/480p30" "#(output_path)/script"
cp "#(figure_path)" "#(output_path)/script/script.txt"
printf 'v' > "#(output_path)/videos/480p30/S.mp4"
"##;
    let task = RenderTaskBuilder::new("s1", "aux")
        .source(script)
        .aux("subtitle line")
        .build();

    let result = exec.execute(&task).await.unwrap();

    assert!(result.succeeded(), "stderr: {}", result.stderr);
    assert_eq!(result.subtitle_text.as_deref(), Some("subtitle line"));
    assert!(tmp.path().join("work/s1/aux/figure.txt").is_file());
    let written = read(&tmp.path().join("work/s1/aux/render.sh"));
    assert!(!written.contains("#(output_path)"));
    assert!(!written.contains("#(figure_path)"));
}

#[tokio::test]
async fn unwritable_work_dir_is_an_io_error() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let blocker = tmp.path().join("blocker");
    std::fs::write(&blocker, b"").unwrap();
    let mut raw = ConfigFileBuilder::new(tmp.path()).raw();
    raw.config.work_dir = blocker;
    let cfg = ConfigFile::try_from(raw).unwrap();
    let (exec, _media) = executor(&cfg);
    let task = RenderTaskBuilder::new("s1", "t1")
        .source(single_scene_script("Scene.mp4"))
        .build();

    let err = exec.execute(&task).await.unwrap_err();
    assert!(err.is_io(), "expected io error, got {err:?}");
}

#[tokio::test]
async fn task_id_with_separators_is_rejected_before_writing() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = ConfigFileBuilder::new(tmp.path()).build();
    let (exec, _media) = executor(&cfg);
    let task = RenderTaskBuilder::new("s1", "nested/t1")
        .source(single_scene_script("Scene.mp4"))
        .build();

    let err = exec.execute(&task).await.unwrap_err();
    assert!(!err.is_io());
    assert!(err.to_string().contains("nested/t1"));
    assert!(!tmp.path().join("work").exists());
}
