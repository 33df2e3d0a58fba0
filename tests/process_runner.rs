// tests/process_runner.rs

mod common;
use crate::common::init_tracing;

use std::time::{Duration, Instant};

use renderkit::errors::RenderkitError;
use renderkit::exec::{ProcessSpec, TIMEOUT_EXIT_CODE, run_process};

fn sh(dir: &std::path::Path, script: &str, timeout: Duration) -> ProcessSpec {
    ProcessSpec::new("sh", dir, timeout).args(["-c", script])
}

#[tokio::test]
async fn captures_exit_code_and_both_streams() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();

    let outcome = run_process(&sh(
        tmp.path(),
        "echo out; echo err >&2; exit 3",
        Duration::from_secs(5),
    ))
    .await
    .unwrap();

    assert_eq!(outcome.exit_code, 3);
    assert_eq!(outcome.stdout.trim(), "out");
    assert_eq!(outcome.stderr.trim(), "err");
    assert!(!outcome.timed_out);
    assert!(!outcome.success());
}

#[tokio::test]
async fn process_ignoring_termination_is_killed_at_deadline() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let started = Instant::now();

    let outcome = run_process(&sh(
        tmp.path(),
        "echo begun; trap '' TERM INT; while :; do sleep 0.1; done",
        Duration::from_secs(1),
    ))
    .await
    .unwrap();

    assert!(outcome.timed_out);
    assert_eq!(outcome.exit_code, TIMEOUT_EXIT_CODE);
    assert_eq!(outcome.stdout.trim(), "begun");
    assert!(
        started.elapsed() < Duration::from_secs(4),
        "took {:?}",
        started.elapsed()
    );
}

#[cfg(unix)]
#[tokio::test]
async fn timeout_kills_background_descendants_too() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let marker = tmp.path().join("marker");

    let outcome = run_process(&sh(
        tmp.path(),
        &format!("(sleep 2; touch '{}') & wait", marker.display()),
        Duration::from_secs(1),
    ))
    .await
    .unwrap();
    assert!(outcome.timed_out);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!marker.exists(), "descendant outlived the timeout kill");
}

#[tokio::test]
async fn only_allow_listed_environment_reaches_the_child() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();

    let spec = sh(
        tmp.path(),
        "echo \"${HOME:-unset}|${RK_OVERLAY:-unset}\"",
        Duration::from_secs(5),
    )
    .env("RK_OVERLAY", "yes");
    let outcome = run_process(&spec).await.unwrap();

    assert!(outcome.success());
    assert_eq!(outcome.stdout.trim(), "unset|yes");
}

#[tokio::test]
async fn working_directory_is_created_and_kept() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let nested = tmp.path().join("a/b/c");

    let outcome = run_process(&sh(&nested, "pwd; touch made", Duration::from_secs(5)))
        .await
        .unwrap();

    assert!(outcome.success());
    assert!(nested.join("made").is_file());
}

#[tokio::test]
async fn missing_program_is_a_spawn_error() {
    init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let spec = ProcessSpec::new("renderkit-no-such-program", tmp.path(), Duration::from_secs(1));

    match run_process(&spec).await {
        Err(RenderkitError::Spawn { program, .. }) => {
            assert_eq!(program, "renderkit-no-such-program")
        }
        other => panic!("expected Spawn error, got {other:?}"),
    }
}
